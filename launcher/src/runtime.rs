//! Loading the runtime's shared library and resolving its entry points.

use std::env::consts::DLL_SUFFIX;
use std::ffi::{c_int, c_void, OsStr};
use std::path::Path;

use libloading::Library;
use tracing::debug;

use crate::error::BootstrapError;
use crate::home::RuntimeHome;
use crate::paths::compose_path;
use crate::platform::{self, WideChar};

pub type SetStringFn = unsafe extern "C" fn(*const WideChar);
pub type MainFn = unsafe extern "C" fn(c_int, *mut *mut WideChar) -> c_int;

/// What a required symbol is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRole {
    Main,
    SetProgramName,
    SetHome,
    SetSearchPath,
}

impl EntryRole {
    /// Name the runtime exports this entry point under.
    pub const fn symbol_name(self) -> &'static str {
        match self {
            EntryRole::Main => "Py_Main",
            EntryRole::SetProgramName => "Py_SetProgramName",
            EntryRole::SetHome => "Py_SetPythonHome",
            EntryRole::SetSearchPath => "Py_SetPath",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequiredSymbol {
    pub name: &'static str,
    pub role: EntryRole,
}

impl RequiredSymbol {
    const fn new(role: EntryRole) -> Self {
        Self {
            name: role.symbol_name(),
            role,
        }
    }
}

/// Every symbol the launcher needs; a runtime missing any of them is unusable.
pub const REQUIRED_SYMBOLS: &[RequiredSymbol] = &[
    RequiredSymbol::new(EntryRole::Main),
    RequiredSymbol::new(EntryRole::SetProgramName),
    RequiredSymbol::new(EntryRole::SetHome),
    RequiredSymbol::new(EntryRole::SetSearchPath),
];

/// Anything symbols can be looked up in.
pub trait SymbolSource {
    fn lookup(&self, name: &str) -> Option<*const c_void>;
}

impl<T: SymbolSource + ?Sized> SymbolSource for &T {
    fn lookup(&self, name: &str) -> Option<*const c_void> {
        (**self).lookup(name)
    }
}

impl SymbolSource for Library {
    fn lookup(&self, name: &str) -> Option<*const c_void> {
        let symbol = unsafe { self.get::<*const c_void>(name.as_bytes()) }.ok()?;
        Some(*symbol)
    }
}

pub trait RuntimeLoader {
    type Library: SymbolSource;

    /// Open the library at `path`, or describe why it could not be opened.
    fn load(&self, path: &Path) -> Result<Self::Library, String>;
}

impl<T: RuntimeLoader + ?Sized> RuntimeLoader for &T {
    type Library = T::Library;

    fn load(&self, path: &Path) -> Result<Self::Library, String> {
        (**self).load(path)
    }
}

/// Loads through the OS dynamic loader.
///
/// The library is leaked: the runtime stays mapped until the process exits
/// and is never unloaded by the launcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLoader;

impl RuntimeLoader for DynamicLoader {
    type Library = &'static Library;

    fn load(&self, path: &Path) -> Result<Self::Library, String> {
        let library = open_library(path).map_err(|e| e.to_string())?;
        Ok(Box::leak(Box::new(library)))
    }
}

/// Extension modules the runtime loads later link against its symbols
/// without naming the library, so they must be in the global scope.
#[cfg(unix)]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }.map(Library::from)
}

#[cfg(windows)]
fn open_library(path: &Path) -> Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}

/// Outcome of looking up every entry of [`REQUIRED_SYMBOLS`].
#[derive(Debug, Default)]
pub struct SymbolResolution {
    pub resolved: Vec<(EntryRole, *const c_void)>,
    pub missing: Vec<&'static str>,
}

/// Look up each required symbol independently, recording all that are absent.
pub fn resolve_symbols<S: SymbolSource + ?Sized>(source: &S) -> SymbolResolution {
    let mut resolution = SymbolResolution::default();
    for symbol in REQUIRED_SYMBOLS {
        match source.lookup(symbol.name) {
            Some(address) if !address.is_null() => {
                resolution.resolved.push((symbol.role, address));
            }
            _ => resolution.missing.push(symbol.name),
        }
    }
    resolution
}

impl SymbolResolution {
    fn address(&self, role: EntryRole) -> Result<*const c_void, BootstrapError> {
        self.resolved
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, address)| *address)
            .ok_or_else(|| BootstrapError::SymbolNotFound {
                symbols: vec![role.symbol_name()],
            })
    }

    /// All-or-nothing: any missing symbol fails the whole resolution.
    pub fn into_entry_points(self) -> Result<EntryPoints, BootstrapError> {
        if !self.missing.is_empty() {
            return Err(BootstrapError::SymbolNotFound {
                symbols: self.missing,
            });
        }

        let main = self.address(EntryRole::Main)?;
        let program_name = self.address(EntryRole::SetProgramName)?;
        let home = self.address(EntryRole::SetHome)?;
        let search_path = self.address(EntryRole::SetSearchPath)?;

        // The table pairs each name with the signature the runtime exports.
        unsafe {
            Ok(EntryPoints {
                main: std::mem::transmute::<*const c_void, MainFn>(main),
                set_program_name: std::mem::transmute::<*const c_void, SetStringFn>(program_name),
                set_home: std::mem::transmute::<*const c_void, SetStringFn>(home),
                set_search_path: std::mem::transmute::<*const c_void, SetStringFn>(search_path),
            })
        }
    }
}

/// Resolved entry points of a loaded runtime.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints {
    main: MainFn,
    set_program_name: SetStringFn,
    set_home: SetStringFn,
    set_search_path: SetStringFn,
}

impl EntryPoints {
    /// # Safety
    /// The runtime keeps the pointer, `value` must outlive every use of the runtime.
    pub unsafe fn set_program_name(&self, value: &WideString) {
        (self.set_program_name)(value.as_ptr());
    }

    /// # Safety
    /// Same contract as [`EntryPoints::set_program_name`].
    pub unsafe fn set_home(&self, value: &WideString) {
        (self.set_home)(value.as_ptr());
    }

    /// # Safety
    /// Same contract as [`EntryPoints::set_program_name`].
    pub unsafe fn set_search_path(&self, value: &WideString) {
        (self.set_search_path)(value.as_ptr());
    }

    /// Run the runtime to completion and return its exit code.
    ///
    /// # Safety
    /// Must be called after the setters, at most once per process.
    pub unsafe fn main(&self, args: &mut [WideString]) -> i32 {
        let mut argv: Vec<*mut WideChar> = args.iter_mut().map(|a| a.as_mut_ptr()).collect();
        let argc = argv.len() as c_int;
        argv.push(std::ptr::null_mut());
        (self.main)(argc, argv.as_mut_ptr())
    }
}

/// A runtime library whose required entry points have all been found.
pub struct LoadedRuntime<L> {
    pub library: L,
    pub entry_points: EntryPoints,
}

/// Open `<home>/<version_tag><DLL_SUFFIX>` and resolve [`REQUIRED_SYMBOLS`].
pub fn load_runtime<L: RuntimeLoader>(
    loader: &L,
    home: &RuntimeHome,
    version_tag: &str,
) -> Result<LoadedRuntime<L::Library>, BootstrapError> {
    let library_path = compose_path(&home.path, version_tag, DLL_SUFFIX)?;
    debug!(path = %library_path.display(), "loading runtime library");

    let library = loader
        .load(&library_path)
        .map_err(|reason| BootstrapError::LibraryNotFound {
            home: home.path.clone(),
            path: library_path,
            reason,
        })?;

    let entry_points = resolve_symbols(&library).into_entry_points()?;
    debug!(count = REQUIRED_SYMBOLS.len(), "resolved runtime entry points");

    Ok(LoadedRuntime {
        library,
        entry_points,
    })
}

/// NUL-terminated string in the runtime's `wchar_t` encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideString(Vec<WideChar>);

impl WideString {
    pub fn new(s: impl AsRef<OsStr>) -> Self {
        let mut buf = platform::encode_wide(s.as_ref());
        buf.push(0);
        Self(buf)
    }

    pub fn as_ptr(&self) -> *const WideChar {
        self.0.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut WideChar {
        self.0.as_mut_ptr()
    }

    /// Characters without the terminator.
    pub fn as_slice(&self) -> &[WideChar] {
        &self.0[..self.0.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLibrary, FakeLoader};
    use std::path::PathBuf;

    fn home_at(path: &str) -> RuntimeHome {
        RuntimeHome {
            template: path.to_string(),
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_table_lists_each_role_once() {
        for role in [
            EntryRole::Main,
            EntryRole::SetProgramName,
            EntryRole::SetHome,
            EntryRole::SetSearchPath,
        ] {
            assert_eq!(REQUIRED_SYMBOLS.iter().filter(|s| s.role == role).count(), 1);
        }
    }

    #[test]
    fn test_complete_library_resolves() {
        let resolution = resolve_symbols(&FakeLibrary::complete());
        assert!(resolution.missing.is_empty());
        assert_eq!(resolution.resolved.len(), REQUIRED_SYMBOLS.len());
        assert!(resolution.into_entry_points().is_ok());
    }

    #[test]
    fn test_every_missing_symbol_is_reported() {
        let library = FakeLibrary::without(&["Py_SetPath", "Py_Main"]);
        let resolution = resolve_symbols(&library);
        assert_eq!(resolution.missing, vec!["Py_Main", "Py_SetPath"]);
        assert_eq!(resolution.resolved.len(), 2);

        match resolution.into_entry_points() {
            Err(BootstrapError::SymbolNotFound { symbols }) => {
                assert_eq!(symbols, vec!["Py_Main", "Py_SetPath"]);
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_resolution_without_a_role_names_its_symbol() {
        let complete = resolve_symbols(&FakeLibrary::complete());
        let resolution = SymbolResolution {
            resolved: complete
                .resolved
                .into_iter()
                .filter(|(role, _)| *role != EntryRole::SetHome)
                .collect(),
            missing: Vec::new(),
        };

        match resolution.into_entry_points() {
            Err(err @ BootstrapError::SymbolNotFound { .. }) => {
                assert!(err.to_string().contains("Py_SetPythonHome not found"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_library_path_is_composed_from_home_and_version() {
        let loader = FakeLoader::missing();
        let home = home_at("/opt/rt");
        let err = load_runtime(&loader, &home, "python311").err().unwrap();
        match err {
            BootstrapError::LibraryNotFound { home, path, .. } => {
                assert_eq!(home, PathBuf::from("/opt/rt"));
                assert_eq!(
                    path,
                    PathBuf::from(format!("/opt/rt{}python311{}", std::path::MAIN_SEPARATOR, DLL_SUFFIX))
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            loader.requested(),
            vec![PathBuf::from(format!(
                "/opt/rt{}python311{}",
                std::path::MAIN_SEPARATOR,
                DLL_SUFFIX
            ))]
        );
    }

    #[test]
    fn test_incomplete_library_fails_to_load() {
        let loader = FakeLoader::with(FakeLibrary::without(&["Py_SetPythonHome"]));
        let err = load_runtime(&loader, &home_at("/opt/rt"), "python311")
            .err()
            .unwrap();
        assert!(err.to_string().contains("Py_SetPythonHome not found"));
    }

    #[test]
    fn test_dynamic_loader_reports_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join(format!("absent{}", DLL_SUFFIX));
        let err = DynamicLoader.load(&missing).err().unwrap();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_wide_string_is_terminated() {
        let wide = WideString::new("-I");
        assert_eq!(wide.as_slice(), &[b'-' as WideChar, b'I' as WideChar]);
        assert_eq!(unsafe { *wide.as_ptr().add(2) }, 0);
        assert!(WideString::new("").as_slice().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_undecodable_bytes_become_lone_surrogates() {
        use std::os::unix::ffi::OsStrExt;

        let wide = WideString::new(OsStr::from_bytes(b"nu\xff"));
        assert_eq!(wide.as_slice(), &[b'n' as WideChar, b'u' as WideChar, 0xDCFF]);
    }
}
