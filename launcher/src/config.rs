//! Run-time knobs read from the environment.
//!
//! Build-time settings (runtime location, names, messages) live in the
//! string table; these only change how the launcher reports.

use std::env;

pub const LAUNCHER_LOG: &str = "LAUNCHER_LOG";
pub const LAUNCHER_QUIET: &str = "LAUNCHER_QUIET";
pub const LAUNCHER_NO_DIALOG: &str = "LAUNCHER_NO_DIALOG";

const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    /// `tracing` filter directive.
    pub log_level: String,
    /// Only errors are logged.
    pub quiet: bool,
    /// Suppress the modal error message (headless runs, test harnesses).
    pub no_dialog: bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            quiet: false,
            no_dialog: false,
        }
    }
}

impl LauncherConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            log_level: lookup(LAUNCHER_LOG)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.log_level),
            quiet: lookup(LAUNCHER_QUIET).is_some_and(|v| is_truthy(&v)),
            no_dialog: lookup(LAUNCHER_NO_DIALOG).is_some_and(|v| is_truthy(&v)),
        }
    }

    /// Filter actually installed: quiet wins over any configured level.
    pub fn effective_filter(&self) -> &str {
        if self.quiet {
            "error"
        } else {
            &self.log_level
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
