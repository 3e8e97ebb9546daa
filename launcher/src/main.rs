use std::process;

use embedded_launcher::bootstrap::Bootstrap;
use embedded_launcher::config::LauncherConfig;
use embedded_launcher::runtime::DynamicLoader;
use embedded_launcher::strings::StringTable;
use embedded_launcher::{logging, report};

fn main() {
    let config = LauncherConfig::from_env();
    logging::init(&config);

    let strings = StringTable::embedded();
    let code = match Bootstrap::new(&strings, DynamicLoader).run() {
        Ok(code) => code,
        Err(err) => {
            report::report_failure(&err, &strings, &config);
            err.exit_code()
        }
    };
    process::exit(code);
}
