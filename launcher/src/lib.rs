//! Bootstrap launcher for an embedded runtime.
//!
//! The executable doubles as a zip archive: the application is appended to
//! it and handed to the runtime as the module to run. [`bootstrap::Bootstrap`]
//! drives the whole sequence; the other modules are its steps.

#[cfg(target_os = "linux")]
#[path = "linux.rs"]
pub mod platform;

#[cfg(target_os = "macos")]
#[path = "macos.rs"]
pub mod platform;

#[cfg(target_os = "windows")]
#[path = "windows.rs"]
pub mod platform;

pub mod archive;
pub mod bootstrap;
pub mod config;
pub mod environment;
pub mod error;
pub mod home;
pub mod identity;
pub mod logging;
pub mod paths;
pub mod report;
pub mod runtime;
pub mod strings;

#[cfg(test)]
mod testing;

/// Serializes tests that touch `SELF` or the fake runtime's call log.
#[cfg(test)]
static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
