//! Process environment changes made before the runtime library is loaded.

use std::env;
use std::ffi::OsString;
use std::path::Path;

use tracing::debug;

use crate::error::PathError;
use crate::platform;

/// Put `home` in front of the library search path held in `var`.
///
/// Runs before the runtime library is opened. On Windows the loader reads
/// `PATH` at load time, so the runtime's dependent DLLs resolve from the home.
/// glibc and dyld read their variables only at process start, so on Linux
/// and macOS the change reaches processes the runtime starts, not this one's
/// own loads. Either way it stays for the rest of the process.
pub fn patch_search_path(var: &str, home: &Path) -> Result<OsString, PathError> {
    let mut value = home.as_os_str().to_os_string();
    match env::var_os(var) {
        Some(previous) if !previous.is_empty() => {
            value.push(platform::PATH_LIST_SEPARATOR.to_string());
            value.push(previous);
        }
        _ => {}
    }

    let len = platform::native_len(&value);
    if len > platform::MAX_ENV_VALUE_LEN {
        return Err(PathError::TooLong {
            what: "library search path",
            value: value.to_string_lossy().into_owned(),
            len,
            limit: platform::MAX_ENV_VALUE_LEN,
        });
    }

    debug!(var, value = %value.to_string_lossy(), "patched library search path");
    env::set_var(var, &value);
    Ok(value)
}
