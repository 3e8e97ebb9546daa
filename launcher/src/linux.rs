// Linux: the dynamic loader consults LD_LIBRARY_PATH, wchar_t is 32 bits.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

pub const LIBRARY_SEARCH_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// Separator between entries of a search-path list (library or module path).
pub const PATH_LIST_SEPARATOR: char = ':';

/// PATH_MAX from <linux/limits.h>.
pub const MAX_PATH_LEN: usize = 4096;

/// MAX_ARG_STRLEN: the kernel refuses single environment strings above 32 pages.
pub const MAX_ENV_VALUE_LEN: usize = 131072;

pub const DEFAULT_RUNTIME_HOME: &str = "%SELF%/python3-minimal";

pub type WideChar = u32;

/// Bytes that are not UTF-8 become lone surrogates U+DC80..U+DCFF, the
/// same mapping the runtime's locale decoder applies to `argv`.
pub fn encode_wide(s: &OsStr) -> Vec<WideChar> {
    let mut out = Vec::with_capacity(s.len());
    for chunk in s.as_bytes().utf8_chunks() {
        out.extend(chunk.valid().chars().map(|c| c as WideChar));
        out.extend(chunk.invalid().iter().map(|&b| 0xDC00 + WideChar::from(b)));
    }
    out
}

/// There is no desktop surface to pop a dialog on, the text goes to stderr.
pub fn show_message(title: &str, text: &str) {
    eprintln!("{}: {}", title, text);
}

/// Length as the OS measures it for path and environment limits (bytes).
pub fn native_len(s: &OsStr) -> usize {
    s.len()
}
