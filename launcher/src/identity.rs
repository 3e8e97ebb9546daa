//! Where the launcher itself lives.

use std::env;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::paths::strip_filename;

/// Variable through which the runtime and its scripts find sibling resources.
pub const SELF_VAR: &str = "SELF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfPath {
    /// Absolute path of the running executable.
    pub path: PathBuf,
    /// `path` with the filename removed.
    pub dir: PathBuf,
}

impl SelfPath {
    /// Ask the OS for the running executable. A failure is not fatal here:
    /// the empty path simply makes a later step fail with a clear message.
    pub fn resolve() -> Self {
        match env::current_exe() {
            Ok(exe) => Self::from_path(&exe),
            Err(e) => {
                warn!(error = %e, "could not determine own executable path");
                Self::from_path(Path::new(""))
            }
        }
    }

    pub fn from_path(path: &Path) -> Self {
        let dir = PathBuf::from(strip_filename(path.as_os_str()));
        Self {
            path: path.to_path_buf(),
            dir,
        }
    }

    /// Export the directory as `SELF`, inherited by everything started later.
    pub fn publish(&self) {
        debug!(dir = %self.dir.display(), "publishing {}", SELF_VAR);
        env::set_var(SELF_VAR, &self.dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_is_prefix_of_path() {
        let me = SelfPath::from_path(Path::new("/opt/app/launcher"));
        assert_eq!(me.dir, Path::new("/opt/app"));
        assert!(me.path.starts_with(&me.dir));
        assert_ne!(me.path, me.dir);
    }

    #[test]
    fn test_resolve_points_at_test_binary() {
        let me = SelfPath::resolve();
        let exe = env::current_exe().unwrap();
        assert_eq!(me.path, exe);
        assert_eq!(me.dir, exe.parent().unwrap());
    }

    #[test]
    fn test_publish_sets_self() {
        let _guard = crate::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let me = SelfPath::resolve();
        me.publish();
        assert_eq!(env::var_os(SELF_VAR).unwrap(), me.dir.as_os_str());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_location_is_kept_verbatim() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = Path::new("/opt").join(OsStr::from_bytes(b"nu\xff"));
        let me = SelfPath::from_path(&dir.join("app"));
        assert_eq!(me.dir, dir);
        assert_eq!(me.path, dir.join("app"));
    }
}
