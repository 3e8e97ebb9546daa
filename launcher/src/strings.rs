//! String table baked into the launcher binary.
//!
//! Each entry is a fixed-size slot that starts out holding a `@@LAUNCHER_*@@`
//! marker. `finalize-launcher` locates the marker in the compiled file and
//! overwrites the slot with NUL-padded UTF-8 text. A slot still holding its
//! marker falls back to the built-in default.
//!
//! Marker names and slot sizes must match `finalize-launcher/src/main.rs`.

use std::ptr;

use crate::platform;

const MARKER_PREFIX: &[u8] = b"@@LAUNCHER_";

const NAME_SIZE: usize = 128;
const RUNTIME_HOME_SIZE: usize = 1024;
const RUNTIME_VERSION_SIZE: usize = 64;
const MESSAGE_SIZE: usize = 512;

const fn slot<const N: usize>(marker: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let mut i = 0;
    while i < marker.len() {
        out[i] = marker[i];
        i += 1;
    }
    out
}

#[used]
#[cfg_attr(target_os = "linux", link_section = ".launcher_strings")]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__launcher")]
static NAME_SLOT: [u8; NAME_SIZE] = slot(b"@@LAUNCHER_NAME@@");

#[used]
#[cfg_attr(target_os = "linux", link_section = ".launcher_strings")]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__launcher")]
static RUNTIME_HOME_SLOT: [u8; RUNTIME_HOME_SIZE] = slot(b"@@LAUNCHER_RUNTIME_HOME@@");

#[used]
#[cfg_attr(target_os = "linux", link_section = ".launcher_strings")]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__launcher")]
static RUNTIME_VERSION_SLOT: [u8; RUNTIME_VERSION_SIZE] = slot(b"@@LAUNCHER_RUNTIME_VERSION@@");

#[used]
#[cfg_attr(target_os = "linux", link_section = ".launcher_strings")]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__launcher")]
static MSG_HOME_NOT_FOUND_SLOT: [u8; MESSAGE_SIZE] = slot(b"@@LAUNCHER_MSG_HOME_NOT_FOUND@@");

#[used]
#[cfg_attr(target_os = "linux", link_section = ".launcher_strings")]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__launcher")]
static MSG_LIBRARY_NOT_FOUND_SLOT: [u8; MESSAGE_SIZE] = slot(b"@@LAUNCHER_MSG_LIBRARY_NOT_FOUND@@");

#[used]
#[cfg_attr(target_os = "linux", link_section = ".launcher_strings")]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__launcher")]
static MSG_SYMBOL_NOT_FOUND_SLOT: [u8; MESSAGE_SIZE] = slot(b"@@LAUNCHER_MSG_SYMBOL_NOT_FOUND@@");

#[used]
#[cfg_attr(target_os = "linux", link_section = ".launcher_strings")]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__launcher")]
static MSG_ARCHIVE_NOT_FOUND_SLOT: [u8; MESSAGE_SIZE] = slot(b"@@LAUNCHER_MSG_ARCHIVE_NOT_FOUND@@");

const DEFAULT_NAME: &str = "Launcher";
const DEFAULT_RUNTIME_VERSION: &str = "python311";
const DEFAULT_MSG_HOME_NOT_FOUND: &str =
    "The runtime distribution required by this application was not found. \
     Please reinstall the application.";
const DEFAULT_MSG_LIBRARY_NOT_FOUND: &str =
    "The runtime library could not be loaded. Please reinstall the application.";
const DEFAULT_MSG_SYMBOL_NOT_FOUND: &str =
    "The runtime library is incompatible with this launcher.";
const DEFAULT_MSG_ARCHIVE_NOT_FOUND: &str =
    "The application code is missing from this executable.";

/// User-facing messages, one per terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    HomeNotFound,
    LibraryNotFound,
    SymbolNotFound,
    ArchiveNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTable {
    /// Title for dialogs.
    pub name: String,
    /// Location of the runtime, may reference environment variables.
    pub runtime_home: String,
    /// Base name of both the runtime library and its standard-library zip.
    pub runtime_version: String,
    pub home_not_found: String,
    pub library_not_found: String,
    pub symbol_not_found: String,
    pub archive_not_found: String,
}

impl Default for StringTable {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            runtime_home: platform::DEFAULT_RUNTIME_HOME.to_string(),
            runtime_version: DEFAULT_RUNTIME_VERSION.to_string(),
            home_not_found: DEFAULT_MSG_HOME_NOT_FOUND.to_string(),
            library_not_found: DEFAULT_MSG_LIBRARY_NOT_FOUND.to_string(),
            symbol_not_found: DEFAULT_MSG_SYMBOL_NOT_FOUND.to_string(),
            archive_not_found: DEFAULT_MSG_ARCHIVE_NOT_FOUND.to_string(),
        }
    }
}

impl StringTable {
    /// Read the table from this binary's own slots.
    pub fn embedded() -> Self {
        // Volatile reads: the slots are rewritten on disk after compilation,
        // their initializers must not be folded into the code.
        let name = unsafe { ptr::read_volatile(ptr::addr_of!(NAME_SLOT)) };
        let runtime_home = unsafe { ptr::read_volatile(ptr::addr_of!(RUNTIME_HOME_SLOT)) };
        let runtime_version = unsafe { ptr::read_volatile(ptr::addr_of!(RUNTIME_VERSION_SLOT)) };
        let home_not_found = unsafe { ptr::read_volatile(ptr::addr_of!(MSG_HOME_NOT_FOUND_SLOT)) };
        let library_not_found =
            unsafe { ptr::read_volatile(ptr::addr_of!(MSG_LIBRARY_NOT_FOUND_SLOT)) };
        let symbol_not_found =
            unsafe { ptr::read_volatile(ptr::addr_of!(MSG_SYMBOL_NOT_FOUND_SLOT)) };
        let archive_not_found =
            unsafe { ptr::read_volatile(ptr::addr_of!(MSG_ARCHIVE_NOT_FOUND_SLOT)) };

        let defaults = Self::default();
        Self {
            name: slot_value(&name).unwrap_or(defaults.name),
            runtime_home: slot_value(&runtime_home).unwrap_or(defaults.runtime_home),
            runtime_version: slot_value(&runtime_version).unwrap_or(defaults.runtime_version),
            home_not_found: slot_value(&home_not_found).unwrap_or(defaults.home_not_found),
            library_not_found: slot_value(&library_not_found)
                .unwrap_or(defaults.library_not_found),
            symbol_not_found: slot_value(&symbol_not_found).unwrap_or(defaults.symbol_not_found),
            archive_not_found: slot_value(&archive_not_found)
                .unwrap_or(defaults.archive_not_found),
        }
    }

    pub fn message(&self, id: MessageId) -> &str {
        match id {
            MessageId::HomeNotFound => &self.home_not_found,
            MessageId::LibraryNotFound => &self.library_not_found,
            MessageId::SymbolNotFound => &self.symbol_not_found,
            MessageId::ArchiveNotFound => &self.archive_not_found,
        }
    }
}

// Check if slot is still in template state
fn is_template_placeholder(slot: &[u8]) -> bool {
    slot.starts_with(MARKER_PREFIX)
}

/// Text of a patched slot, `None` for an untouched or blank one.
fn slot_value(slot: &[u8]) -> Option<String> {
    if is_template_placeholder(slot) {
        return None;
    }
    let len = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    if len == 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&slot[..len]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patched<const N: usize>(value: &[u8]) -> [u8; N] {
        let mut out = [0u8; N];
        out[..value.len()].copy_from_slice(value);
        out
    }

    #[test]
    fn test_unpatched_slot_uses_default() {
        let slot: [u8; 64] = slot(b"@@LAUNCHER_RUNTIME_VERSION@@");
        assert_eq!(slot_value(&slot), None);
    }

    #[test]
    fn test_patched_slot_stops_at_nul() {
        let slot: [u8; 64] = patched(b"python312");
        assert_eq!(slot_value(&slot).as_deref(), Some("python312"));
    }

    #[test]
    fn test_blank_slot_uses_default() {
        let slot = [0u8; 32];
        assert_eq!(slot_value(&slot), None);
    }

    #[test]
    fn test_full_slot_without_terminator() {
        let slot: [u8; 4] = *b"abcd";
        assert_eq!(slot_value(&slot).as_deref(), Some("abcd"));
    }

    #[test]
    fn test_embedded_table_falls_back_to_defaults() {
        // The test binary is never finalized, so every slot holds its marker.
        assert_eq!(StringTable::embedded(), StringTable::default());
    }

    #[test]
    fn test_message_lookup() {
        let table = StringTable {
            archive_not_found: "no app".to_string(),
            ..StringTable::default()
        };
        assert_eq!(table.message(MessageId::ArchiveNotFound), "no app");
        assert_eq!(
            table.message(MessageId::HomeNotFound),
            DEFAULT_MSG_HOME_NOT_FOUND
        );
    }
}
