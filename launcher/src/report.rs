//! Telling the user why the launch failed.

use tracing::error;

use crate::config::LauncherConfig;
use crate::error::BootstrapError;
use crate::platform;
use crate::strings::StringTable;

/// Console diagnostic first, then the modal message for users without a console.
pub fn report_failure(err: &BootstrapError, strings: &StringTable, config: &LauncherConfig) {
    eprintln!("{}", err);
    error!(exit_code = err.exit_code(), "bootstrap failed");

    if config.no_dialog {
        return;
    }
    if let Some(id) = err.message_id() {
        platform::show_message(&strings.name, strings.message(id));
    }
}
