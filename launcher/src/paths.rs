//! String and filesystem helpers used while locating the runtime.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::PathError;
use crate::platform;

/// Everything before the last `/` or `\`. Empty when `path` has no separator.
pub fn strip_filename(path: &OsStr) -> &OsStr {
    let bytes = path.as_encoded_bytes();
    match bytes.iter().rposition(|&b| b == b'/' || b == b'\\') {
        // Splitting right before an ASCII byte keeps both halves valid.
        Some(pos) => unsafe { OsStr::from_encoded_bytes_unchecked(&bytes[..pos]) },
        None => OsStr::new(""),
    }
}

/// `base` + separator + `name` + `extension`, refusing results the OS could not open.
pub fn compose_path(base: &Path, name: &str, extension: &str) -> Result<PathBuf, PathError> {
    let mut path = OsString::with_capacity(base.as_os_str().len() + 1 + name.len() + extension.len());
    path.push(base);
    path.push(MAIN_SEPARATOR.to_string());
    path.push(name);
    path.push(extension);
    check_len("path", path, platform::MAX_PATH_LEN).map(PathBuf::from)
}

pub fn directory_exists(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Expand environment references using the current process environment.
pub fn expand_environment_refs(template: &str) -> Result<OsString, PathError> {
    expand_with(template, |name| env::var_os(name))
}

/// Expand `%NAME%` (and `$NAME`, `${NAME}` on Unix) through `lookup`.
/// References `lookup` cannot resolve are kept verbatim. Substituted values
/// are copied as OS strings, so non-UTF-8 directories survive.
pub fn expand_with<F>(template: &str, lookup: F) -> Result<OsString, PathError>
where
    F: Fn(&str) -> Option<OsString>,
{
    let mut expanded = OsString::with_capacity(template.len());
    let mut last = 0;
    for caps in reference_pattern().captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        let name = caps
            .name("percent")
            .or_else(|| caps.name("braced"))
            .or_else(|| caps.name("bare"))
            .map(|m| m.as_str())
            .unwrap_or_default();

        expanded.push(&template[last..whole.start()]);
        match lookup(name) {
            Some(value) => expanded.push(value),
            None => expanded.push(whole.as_str()),
        }
        last = whole.end();
    }
    expanded.push(&template[last..]);
    check_len("expanded string", expanded, platform::MAX_ENV_VALUE_LEN)
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let pattern = if cfg!(windows) {
            r"%(?P<percent>[^%=]+)%"
        } else {
            r"%(?P<percent>[^%=]+)%|\$\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)\}|\$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)"
        };
        Regex::new(pattern).expect("reference pattern is valid")
    })
}

/// Make `path` absolute against `anchor`, folding `.` and `..` without
/// touching the filesystem.
pub fn absolutize(anchor: &Path, path: &Path) -> PathBuf {
    let joined = anchor.join(path);
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn check_len(what: &'static str, value: OsString, limit: usize) -> Result<OsString, PathError> {
    let len = platform::native_len(&value);
    if len > limit {
        return Err(PathError::TooLong {
            what,
            value: value.to_string_lossy().into_owned(),
            len,
            limit,
        });
    }
    Ok(value)
}
