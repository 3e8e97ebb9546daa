//! Tracing setup. Diagnostics meant for users go through `report`, not here.

use std::io::IsTerminal;

use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::LauncherConfig;

/// Install a stderr subscriber filtered by `LAUNCHER_LOG` / `LAUNCHER_QUIET`.
pub fn init(config: &LauncherConfig) {
    let filter = EnvFilter::try_new(config.effective_filter())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(wants_color(&std::io::stderr()))
                .with_target(false)
                .without_time(),
        )
        .try_init();
}

/// Escape codes only for a terminal; redirected output stays plain text.
fn wants_color(stream: &impl IsTerminal) -> bool {
    stream.is_terminal()
}
