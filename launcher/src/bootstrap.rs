//! The fixed bootstrap sequence.
//!
//! Each step is a gate: the first failure ends the launch with its own
//! diagnostic and exit code. Nothing is retried or rolled back.
//!
//! 1. resolve the launcher's own path and publish `SELF`
//! 2. resolve the runtime home (exit 3 if it is missing)
//! 3. prefix the library search path with the home
//! 4. load the runtime library and resolve its entry points
//! 5. build the [`RuntimeConfig`]
//! 6. hand the config to the runtime through its setters
//! 7. check that an archive is appended to the launcher
//! 8. run the runtime's main with [`RuntimeArgs`]

use std::ffi::OsString;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::archive::has_appended_archive;
use crate::environment::patch_search_path;
use crate::error::BootstrapError;
use crate::home::RuntimeHome;
use crate::identity::SelfPath;
use crate::paths::compose_path;
use crate::platform;
use crate::runtime::{load_runtime, RuntimeLoader, WideString};
use crate::strings::StringTable;

/// Asks the runtime to ignore user site-packages and `PYTHON*` variables.
pub const ISOLATION_FLAG: &str = "-I";

/// Settings handed to the runtime before its main entry point runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub program_name: PathBuf,
    pub home: PathBuf,
    /// The home itself and `<home>/<version>.zip`, where the runtime finds
    /// its standard library landmark.
    pub module_search_path: Vec<PathBuf>,
}

impl RuntimeConfig {
    pub fn new(me: &SelfPath, home: &RuntimeHome, version_tag: &str) -> Result<Self, BootstrapError> {
        let landmark_archive = compose_path(&home.path, version_tag, ".zip")?;
        Ok(Self {
            program_name: me.path.clone(),
            module_search_path: vec![home.path.clone(), landmark_archive],
            home: home.path.clone(),
        })
    }

    pub fn search_path_string(&self) -> OsString {
        let mut joined = OsString::new();
        for (i, entry) in self.module_search_path.iter().enumerate() {
            if i > 0 {
                joined.push(platform::PATH_LIST_SEPARATOR.to_string());
            }
            joined.push(entry);
        }
        joined
    }
}

/// Argument vector for the runtime's main entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeArgs {
    /// argv[0] stays empty; the program name was set separately.
    pub program_slot: String,
    pub isolation_flag: &'static str,
    /// The launcher itself: its appended zip is the module to run.
    pub module_path: PathBuf,
    /// Passed through so the boot code can find the runtime installation.
    pub home_path: PathBuf,
}

impl RuntimeArgs {
    pub fn new(me: &SelfPath, home: &RuntimeHome) -> Self {
        Self {
            program_slot: String::new(),
            isolation_flag: ISOLATION_FLAG,
            module_path: me.path.clone(),
            home_path: home.path.clone(),
        }
    }

    pub fn to_vec(&self) -> Vec<OsString> {
        vec![
            OsString::from(&self.program_slot),
            OsString::from(self.isolation_flag),
            self.module_path.clone().into_os_string(),
            self.home_path.clone().into_os_string(),
        ]
    }
}

pub struct Bootstrap<'a, L> {
    strings: &'a StringTable,
    loader: L,
    self_path: Option<SelfPath>,
    search_path_var: String,
}

impl<'a, L: RuntimeLoader> Bootstrap<'a, L> {
    pub fn new(strings: &'a StringTable, loader: L) -> Self {
        Self {
            strings,
            loader,
            self_path: None,
            search_path_var: platform::LIBRARY_SEARCH_PATH_VAR.to_string(),
        }
    }

    /// Use `me` instead of asking the OS for the running executable.
    pub fn with_self_path(mut self, me: SelfPath) -> Self {
        self.self_path = Some(me);
        self
    }

    /// Patch `var` instead of the platform's library search path.
    pub fn with_search_path_var(mut self, var: impl Into<String>) -> Self {
        self.search_path_var = var.into();
        self
    }

    /// Run all steps; `Ok` carries the runtime's own exit code.
    pub fn run(self) -> Result<i32, BootstrapError> {
        let Self {
            strings,
            loader,
            self_path,
            search_path_var,
        } = self;

        let me = self_path.unwrap_or_else(SelfPath::resolve);
        debug!(path = %me.path.display(), "launcher location");
        me.publish();

        let home = RuntimeHome::resolve(&strings.runtime_home, &me)?;

        patch_search_path(&search_path_var, &home.path)?;

        let runtime = load_runtime(&loader, &home, &strings.runtime_version)?;
        let entry_points = runtime.entry_points;

        let config = RuntimeConfig::new(&me, &home, &strings.runtime_version)?;
        debug!(?config, "configuring runtime");

        // The runtime stores these pointers; the buffers live until main returns.
        let program_name = WideString::new(&config.program_name);
        let runtime_home = WideString::new(&config.home);
        let search_path = WideString::new(config.search_path_string());
        unsafe {
            entry_points.set_program_name(&program_name);
            entry_points.set_home(&runtime_home);
            entry_points.set_search_path(&search_path);
        }

        if !has_appended_archive(&me.path) {
            return Err(BootstrapError::ArchiveNotFound { path: me.path });
        }

        let args = RuntimeArgs::new(&me, &home);
        let mut argv: Vec<WideString> = args.to_vec().iter().map(WideString::new).collect();
        info!(
            module = %args.module_path.display(),
            home = %args.home_path.display(),
            "starting runtime"
        );
        let code = unsafe { entry_points.main(&mut argv) };
        debug!(code, "runtime finished");

        drop((program_name, runtime_home, search_path, runtime));
        Ok(code)
    }
}
