//! Locating the embedded runtime's installation directory.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::BootstrapError;
use crate::identity::{SelfPath, SELF_VAR};
use crate::paths::{absolutize, directory_exists, expand_with};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeHome {
    /// Template as read from the string table.
    pub template: String,
    /// Absolute, existing directory.
    pub path: PathBuf,
}

impl RuntimeHome {
    /// Expand `template`, anchor it at the launcher's directory and require
    /// the result to be a directory.
    ///
    /// `%SELF%` is answered from `me` directly rather than from the
    /// environment, so the result does not depend on who published it last.
    pub fn resolve(template: &str, me: &SelfPath) -> Result<Self, BootstrapError> {
        let expanded = expand_with(template, |name| {
            if name == SELF_VAR {
                Some(me.dir.clone().into_os_string())
            } else {
                env::var_os(name)
            }
        })?;

        let anchor = if me.dir.as_os_str().is_empty() {
            env::current_dir().unwrap_or_default()
        } else {
            me.dir.clone()
        };
        let path = absolutize(&anchor, Path::new(&expanded));
        debug!(template, path = %path.display(), "resolved runtime home");

        if !directory_exists(&path) {
            return Err(BootstrapError::HomeNotFound { path });
        }

        Ok(Self {
            template: template.to_string(),
            path,
        })
    }
}
