//! Failure taxonomy of the bootstrap sequence.
//!
//! Every variant is terminal. The `Display` text is the console diagnostic,
//! [`BootstrapError::message_id`] selects the string-table message shown to
//! users without a console.

use std::path::PathBuf;

use thiserror::Error;

use crate::strings::MessageId;

/// Exit code for failures other than a missing runtime home.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code when the runtime home directory does not exist.
pub const EXIT_HOME_NOT_FOUND: i32 = 3;

/// A composed string did not fit the platform limit.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("{what} exceeds {limit} characters ({len}): {value}")]
    TooLong {
        what: &'static str,
        value: String,
        len: usize,
        limit: usize,
    },
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("ERROR runtime distribution not found!\nDirectory not found: {}", .path.display())]
    HomeNotFound { path: PathBuf },

    #[error(
        "Runtime is expected in: {}\n\nERROR runtime library not found!\nFile not found: {} ({reason})",
        .home.display(),
        .path.display()
    )]
    LibraryNotFound {
        home: PathBuf,
        path: PathBuf,
        reason: String,
    },

    #[error("ERROR runtime library is incompatible!\n{} not found", .symbols.join(", "))]
    SymbolNotFound { symbols: Vec<&'static str> },

    #[error("ERROR application not found!\nNo zip data appended to file: {}", .path.display())]
    ArchiveNotFound { path: PathBuf },

    #[error("ERROR {0}")]
    Path(#[from] PathError),
}

impl BootstrapError {
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::HomeNotFound { .. } => EXIT_HOME_NOT_FOUND,
            _ => EXIT_FAILURE,
        }
    }

    /// Message for the modal dialog; overlong paths have no dedicated text.
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            BootstrapError::HomeNotFound { .. } => Some(MessageId::HomeNotFound),
            BootstrapError::LibraryNotFound { .. } => Some(MessageId::LibraryNotFound),
            BootstrapError::SymbolNotFound { .. } => Some(MessageId::SymbolNotFound),
            BootstrapError::ArchiveNotFound { .. } => Some(MessageId::ArchiveNotFound),
            BootstrapError::Path(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let home = BootstrapError::HomeNotFound {
            path: PathBuf::from("/opt/app/rt"),
        };
        assert_eq!(home.exit_code(), 3);

        let symbol = BootstrapError::SymbolNotFound {
            symbols: vec!["Py_SetPath"],
        };
        assert_eq!(symbol.exit_code(), 1);

        let archive = BootstrapError::ArchiveNotFound {
            path: PathBuf::from("/opt/app/app"),
        };
        assert_eq!(archive.exit_code(), 1);
    }

    #[test]
    fn test_diagnostics_name_the_culprit() {
        let err = BootstrapError::SymbolNotFound {
            symbols: vec!["Py_SetPath"],
        };
        assert!(err.to_string().contains("Py_SetPath not found"));

        let err = BootstrapError::LibraryNotFound {
            home: PathBuf::from("/opt/rt"),
            path: PathBuf::from("/opt/rt/python311.so"),
            reason: "cannot open shared object file".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("Runtime is expected in: /opt/rt"));
        assert!(text.contains("File not found: /opt/rt/python311.so"));
    }

    #[test]
    fn test_path_error_has_no_dialog_text() {
        let err = BootstrapError::from(PathError::TooLong {
            what: "library path",
            value: "x".repeat(8),
            len: 8,
            limit: 4,
        });
        assert_eq!(err.exit_code(), 1);
        assert!(err.message_id().is_none());
    }
}
