// Windows: LoadLibrary resolves dependent DLLs through PATH, wchar_t is UTF-16.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

use windows_sys::Win32::UI::WindowsAndMessaging::{MessageBoxW, MB_ICONSTOP, MB_OK};

pub const LIBRARY_SEARCH_PATH_VAR: &str = "PATH";

/// Separator between entries of a search-path list (library or module path).
pub const PATH_LIST_SEPARATOR: char = ';';

/// Upper bound for extended-length paths, in UTF-16 units.
pub const MAX_PATH_LEN: usize = 32767;

/// SetEnvironmentVariable rejects values of 32767 characters or more.
pub const MAX_ENV_VALUE_LEN: usize = 32766;

pub const DEFAULT_RUNTIME_HOME: &str = "%SELF%\\python3-minimal";

pub type WideChar = u16;

pub fn encode_wide(s: &OsStr) -> Vec<WideChar> {
    s.encode_wide().collect()
}

/// Length as the OS measures it for path and environment limits (UTF-16 units).
pub fn native_len(s: &OsStr) -> usize {
    s.encode_wide().count()
}

fn to_wide_nul(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

/// Modal error box for users that started the application without a console.
pub fn show_message(title: &str, text: &str) {
    let title = to_wide_nul(title);
    let text = to_wide_nul(text);
    unsafe {
        MessageBoxW(
            std::ptr::null_mut(),
            text.as_ptr(),
            title.as_ptr(),
            MB_OK | MB_ICONSTOP,
        );
    }
}
