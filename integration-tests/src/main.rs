//! Test runner for the embedded launcher
//!
//! This test runner validates the launcher end to end by:
//! 1. Building a runtime home around a stand-in runtime library
//! 2. Using the finalizer to bake settings into a launcher and append an archive
//! 3. Running the finalized launcher and checking its exit code and diagnostics
//! 4. Parsing the JSON report the fake runtime prints from its main entry point
//!
//! Usage: test-runner --launcher <path> --finalizer <path> --runtime-lib <path>
//!                    --partial-runtime-lib <path> [--work-dir <dir>]

use std::env;
use std::env::consts::{DLL_SUFFIX, EXE_SUFFIX};
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::process::{Command, ExitCode};

use serde_json::Value;

#[cfg(windows)]
const SEARCH_PATH_VAR: &str = "PATH";
#[cfg(target_os = "macos")]
const SEARCH_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(any(windows, target_os = "macos")))]
const SEARCH_PATH_VAR: &str = "LD_LIBRARY_PATH";

#[cfg(windows)]
const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: char = ':';

/// Runtime version tag baked into every launcher
const RUNTIME_VERSION: &str = "python311";

/// Directory name of the runtime home, next to the launcher
const RUNTIME_DIR: &str = "rt";

/// Previous search path value handed to the launcher (Unix only, Windows needs its PATH)
#[cfg(not(windows))]
const PREVIOUS_SEARCH_PATH: &str = "/previous/lib";

const EXIT_FAILURE: i32 = 1;
const EXIT_HOME_NOT_FOUND: i32 = 3;

/// Test configuration
struct TestConfig {
    /// Path to the unpatched launcher binary
    launcher_path: PathBuf,
    /// Path to the finalize-launcher binary
    finalizer_path: PathBuf,
    /// Stand-in runtime exporting every entry point
    runtime_lib: PathBuf,
    /// Stand-in runtime missing Py_SetPath
    partial_runtime_lib: PathBuf,
    /// Working directory for test artifacts
    work_dir: PathBuf,
}

/// One launcher with its (optional) runtime home
struct LauncherSetup {
    /// Directory holding the launcher
    dir: PathBuf,
    /// The finalized launcher
    launcher: PathBuf,
    /// Where the launcher will look for its runtime
    home: PathBuf,
}

/// Result of one launcher run
struct RunOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl TestConfig {
    fn from_args() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();

        let mut launcher_path = None;
        let mut finalizer_path = None;
        let mut runtime_lib = None;
        let mut partial_runtime_lib = None;
        let mut work_dir = None;

        let mut i = 1;
        while i < args.len() {
            let value = || {
                args.get(i + 1)
                    .map(PathBuf::from)
                    .ok_or(format!("{} requires a value", args[i]))
            };
            match args[i].as_str() {
                "--launcher" => launcher_path = Some(value()?),
                "--finalizer" => finalizer_path = Some(value()?),
                "--runtime-lib" => runtime_lib = Some(value()?),
                "--partial-runtime-lib" => partial_runtime_lib = Some(value()?),
                "--work-dir" => work_dir = Some(value()?),
                "--help" | "-h" => {
                    println!("Usage: test-runner --launcher <path> --finalizer <path> --runtime-lib <path> --partial-runtime-lib <path> [--work-dir <dir>]");
                    println!();
                    println!("Options:");
                    println!("  --launcher             Path to the unpatched launcher binary");
                    println!("  --finalizer            Path to finalize-launcher binary");
                    println!("  --runtime-lib          Path to the fake runtime library");
                    println!("  --partial-runtime-lib  Path to the runtime library missing Py_SetPath");
                    println!("  --work-dir             Working directory for test artifacts (default: temp dir)");
                    std::process::exit(0);
                }
                _ => {
                    return Err(format!("Unknown argument: {}", args[i]));
                }
            }
            i += 2;
        }

        let launcher_path = launcher_path.ok_or("--launcher is required")?;
        let finalizer_path = finalizer_path.ok_or("--finalizer is required")?;
        let runtime_lib = runtime_lib.ok_or("--runtime-lib is required")?;
        let partial_runtime_lib = partial_runtime_lib.ok_or("--partial-runtime-lib is required")?;
        let work_dir = work_dir.unwrap_or_else(|| env::temp_dir().join("launcher-tests"));

        // Validate paths exist
        for (what, path) in [
            ("Launcher", &launcher_path),
            ("Finalizer", &finalizer_path),
            ("Runtime library", &runtime_lib),
            ("Partial runtime library", &partial_runtime_lib),
        ] {
            if !path.exists() {
                return Err(format!("{} not found: {}", what, path.display()));
            }
        }

        Ok(Self {
            launcher_path,
            finalizer_path,
            runtime_lib,
            partial_runtime_lib,
            work_dir,
        })
    }
}

/// The launcher reports paths based on its resolved executable path,
/// so symlinks in the work dir (e.g. /tmp on macOS) have to be resolved too.
#[cfg(not(windows))]
fn real_path(path: &Path) -> Result<PathBuf, String> {
    fs::canonicalize(path).map_err(|e| format!("Failed to resolve {}: {}", path.display(), e))
}

#[cfg(windows)]
fn real_path(path: &Path) -> Result<PathBuf, String> {
    Ok(path.to_path_buf())
}

impl LauncherSetup {
    /// Create an empty scenario directory
    fn new(config: &TestConfig, name: &str) -> Result<Self, String> {
        let dir = config.work_dir.join(name);
        fs::create_dir_all(&dir).map_err(|e| format!("Failed to create test dir: {}", e))?;
        let dir = real_path(&dir)?;

        Ok(Self {
            launcher: dir.join(format!("app{}", EXE_SUFFIX)),
            home: dir.join(RUNTIME_DIR),
            dir,
        })
    }

    /// Create the runtime home directory
    fn create_home(&self) -> Result<(), String> {
        fs::create_dir_all(&self.home).map_err(|e| format!("Failed to create runtime home: {}", e))
    }

    /// Install a runtime library under the name the launcher composes
    fn install_runtime(&self, library: &Path) -> Result<PathBuf, String> {
        self.create_home()?;
        let dest = self.home.join(format!("{}{}", RUNTIME_VERSION, DLL_SUFFIX));
        fs::copy(library, &dest).map_err(|e| format!("Failed to install runtime library: {}", e))?;
        Ok(dest)
    }

    fn launcher_str(&self) -> String {
        self.launcher.to_string_lossy().into_owned()
    }

    fn home_str(&self) -> String {
        self.home.to_string_lossy().into_owned()
    }
}

/// Finalize a launcher for the given setup
fn finalize_launcher(config: &TestConfig, setup: &LauncherSetup, with_archive: bool) -> Result<(), String> {
    let script = setup.dir.join("main.py");
    fs::write(&script, "print('hello from the archive')\n")
        .map_err(|e| format!("Failed to write script: {}", e))?;

    let mut cmd = Command::new(&config.finalizer_path);
    cmd.arg("--template").arg(&config.launcher_path);
    cmd.arg("--output").arg(&setup.launcher);
    cmd.arg("--name").arg("Launcher Tests");
    cmd.arg("--runtime-home").arg(format!("%SELF%{}{}", MAIN_SEPARATOR, RUNTIME_DIR));
    cmd.arg("--runtime-version").arg(RUNTIME_VERSION);
    if with_archive {
        cmd.arg("--main").arg(&script);
    } else {
        cmd.arg("--no-archive");
    }

    let output = cmd.output().map_err(|e| format!("Failed to run finalizer: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("Finalizer failed: {}", stderr));
    }

    Ok(())
}

/// Run a launcher and capture its output
fn run_launcher(setup: &LauncherSetup, runtime_exit_code: i32) -> Result<RunOutput, String> {
    let mut cmd = Command::new(&setup.launcher);
    cmd.env("LAUNCHER_NO_DIALOG", "1");
    cmd.env("LAUNCHER_LOG", "debug");
    cmd.env("FAKE_RUNTIME_EXIT_CODE", runtime_exit_code.to_string());
    cmd.env_remove("SELF");
    #[cfg(not(windows))]
    {
        cmd.env(SEARCH_PATH_VAR, PREVIOUS_SEARCH_PATH);
    }

    let output = cmd.output().map_err(|e| format!("Failed to run launcher: {}", e))?;

    Ok(RunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

fn expect_exit(run: &RunOutput, expected: i32) -> Result<(), String> {
    if run.exit_code != expected {
        return Err(format!(
            "Expected exit code {} but got {}\nstdout: {}\nstderr: {}",
            expected, run.exit_code, run.stdout, run.stderr
        ));
    }
    Ok(())
}

/// The JSON line the fake runtime prints from Py_Main
fn parse_report(stdout: &str) -> Result<Value, String> {
    let line = stdout
        .lines()
        .find(|l| l.trim_start().starts_with('{'))
        .ok_or(format!("No runtime report in output: {}", stdout))?;
    serde_json::from_str(line).map_err(|e| format!("Invalid runtime report ({}): {}", e, line))
}

fn report_str<'a>(report: &'a Value, key: &str) -> Result<&'a str, String> {
    report[key]
        .as_str()
        .ok_or(format!("Report field {} missing: {}", key, report))
}

/// Scenario A: the runtime home does not exist
fn test_home_not_found(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: home_not_found");

    let setup = LauncherSetup::new(config, "test_home_not_found")?;
    finalize_launcher(config, &setup, true)?;

    let run = run_launcher(&setup, 0)?;
    expect_exit(&run, EXIT_HOME_NOT_FOUND)?;

    if !run.stderr.contains("runtime distribution not found") {
        return Err(format!("Missing home diagnostic: {}", run.stderr));
    }
    if !run.stderr.contains(&setup.home_str()) {
        return Err(format!("Diagnostic does not name {}: {}", setup.home_str(), run.stderr));
    }
    // Aborts before the environment is touched
    if run.stderr.contains("patched library search path") {
        return Err(format!("Search path patched before home check: {}", run.stderr));
    }

    println!("    PASS (exit 3 before any environment change)");
    Ok(())
}

/// Scenario B: the home exists but the runtime library does not
fn test_library_not_found(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: library_not_found");

    let setup = LauncherSetup::new(config, "test_library_not_found")?;
    setup.create_home()?;
    finalize_launcher(config, &setup, true)?;

    let run = run_launcher(&setup, 0)?;
    expect_exit(&run, EXIT_FAILURE)?;

    let expected_lib = setup.home.join(format!("{}{}", RUNTIME_VERSION, DLL_SUFFIX));
    if !run.stderr.contains("runtime library not found") {
        return Err(format!("Missing library diagnostic: {}", run.stderr));
    }
    if !run.stderr.contains(&*expected_lib.to_string_lossy()) {
        return Err(format!("Diagnostic does not name {}: {}", expected_lib.display(), run.stderr));
    }
    // The search path was already prefixed when loading failed
    if !run.stderr.contains("patched library search path") || !run.stderr.contains(&setup.home_str()) {
        return Err(format!("Search path was not patched: {}", run.stderr));
    }

    println!("    PASS (exit 1, search path already patched)");
    Ok(())
}

/// Scenario C: the runtime lacks one required entry point
fn test_symbol_not_found(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: symbol_not_found");

    let setup = LauncherSetup::new(config, "test_symbol_not_found")?;
    setup.install_runtime(&config.partial_runtime_lib)?;
    finalize_launcher(config, &setup, true)?;

    let run = run_launcher(&setup, 0)?;
    expect_exit(&run, EXIT_FAILURE)?;

    if !run.stderr.contains("Py_SetPath not found") {
        return Err(format!("Diagnostic does not name Py_SetPath: {}", run.stderr));
    }
    for present in ["Py_Main", "Py_SetProgramName", "Py_SetPythonHome"] {
        if run.stderr.contains(&format!("{} not found", present))
            || run.stderr.contains(&format!("{},", present))
        {
            return Err(format!("{} wrongly reported missing: {}", present, run.stderr));
        }
    }
    if run.stderr.contains("must not be reached") {
        return Err("Entry point was called despite the missing symbol".to_string());
    }

    println!("    PASS (exit 1, only Py_SetPath reported)");
    Ok(())
}

/// Scenario D: everything resolves but no archive is appended
fn test_archive_not_found(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: archive_not_found");

    let setup = LauncherSetup::new(config, "test_archive_not_found")?;
    setup.install_runtime(&config.runtime_lib)?;
    finalize_launcher(config, &setup, false)?;

    let run = run_launcher(&setup, 0)?;
    expect_exit(&run, EXIT_FAILURE)?;

    if !run.stderr.contains("No zip data appended to file") {
        return Err(format!("Missing archive diagnostic: {}", run.stderr));
    }
    if !run.stderr.contains(&setup.launcher_str()) {
        return Err(format!("Diagnostic does not name {}: {}", setup.launcher_str(), run.stderr));
    }
    if parse_report(&run.stdout).is_ok() {
        return Err(format!("Runtime main ran without an archive: {}", run.stdout));
    }

    println!("    PASS (exit 1, runtime main not called)");
    Ok(())
}

/// Scenario E: the full handoff
fn test_runtime_handoff(config: &TestConfig) -> Result<(), String> {
    println!("  Running test: runtime_handoff");

    let setup = LauncherSetup::new(config, "test_runtime_handoff")?;
    setup.install_runtime(&config.runtime_lib)?;
    finalize_launcher(config, &setup, true)?;

    let run = run_launcher(&setup, 42)?;
    expect_exit(&run, 42)?;

    let report = parse_report(&run.stdout)?;
    let launcher = setup.launcher_str();
    let home = setup.home_str();

    let argv: Vec<&str> = report["argv"]
        .as_array()
        .ok_or(format!("Report has no argv: {}", report))?
        .iter()
        .filter_map(Value::as_str)
        .collect();
    let expected_argv = ["", "-I", launcher.as_str(), home.as_str()];
    if argv != expected_argv {
        return Err(format!("Expected argv {:?} but got {:?}", expected_argv, argv));
    }

    if report_str(&report, "program_name")? != launcher {
        return Err(format!("Program name is not the launcher: {}", report));
    }
    if report_str(&report, "home")? != home {
        return Err(format!("Home mismatch: {}", report));
    }

    let landmark = setup.home.join(format!("{}.zip", RUNTIME_VERSION));
    let expected_path = format!("{}{}{}", home, PATH_LIST_SEPARATOR, landmark.display());
    if report_str(&report, "path")? != expected_path {
        return Err(format!("Expected module search path {} in: {}", expected_path, report));
    }

    if report_str(&report, "self_dir")? != setup.dir.to_string_lossy() {
        return Err(format!("SELF is not the launcher directory: {}", report));
    }

    let search_path = report_str(&report, "search_path")?;
    if !search_path.starts_with(&format!("{}{}", home, PATH_LIST_SEPARATOR)) {
        return Err(format!("{} is not prefixed with the home: {}", SEARCH_PATH_VAR, search_path));
    }
    #[cfg(not(windows))]
    {
        if !search_path.ends_with(PREVIOUS_SEARCH_PATH) {
            return Err(format!("{} lost its previous value: {}", SEARCH_PATH_VAR, search_path));
        }
    }

    // Extension modules resolve the runtime's symbols from the global scope
    #[cfg(not(windows))]
    {
        if report["global_symbols"].as_bool() != Some(true) {
            return Err(format!("Runtime symbols are not globally visible: {}", report));
        }
    }

    println!("    PASS (argv, config, global symbols and exit code propagated)");
    Ok(())
}

fn main() -> ExitCode {
    println!("=== Embedded Launcher Test Suite ===");
    println!();

    let config = match TestConfig::from_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            return ExitCode::from(1);
        }
    };

    // Clean and recreate work directory
    if config.work_dir.exists() {
        if let Err(e) = fs::remove_dir_all(&config.work_dir) {
            eprintln!("Warning: Failed to clean work dir: {}", e);
        }
    }
    if let Err(e) = fs::create_dir_all(&config.work_dir) {
        eprintln!("Error: Failed to create work dir: {}", e);
        return ExitCode::from(1);
    }

    println!("Configuration:");
    println!("  Launcher:        {}", config.launcher_path.display());
    println!("  Finalizer:       {}", config.finalizer_path.display());
    println!("  Runtime:         {}", config.runtime_lib.display());
    println!("  Partial runtime: {}", config.partial_runtime_lib.display());
    println!("  Work dir:        {}", config.work_dir.display());
    println!();

    let tests: Vec<(&str, fn(&TestConfig) -> Result<(), String>)> = vec![
        ("home_not_found", test_home_not_found),
        ("library_not_found", test_library_not_found),
        ("symbol_not_found", test_symbol_not_found),
        ("archive_not_found", test_archive_not_found),
        ("runtime_handoff", test_runtime_handoff),
    ];

    let mut passed = 0;
    let mut failed = 0;

    println!("Running {} tests...", tests.len());
    println!();

    for (name, test_fn) in &tests {
        match test_fn(&config) {
            Ok(()) => {
                passed += 1;
            }
            Err(e) => {
                println!("  FAILED ({}): {}", name, e);
                failed += 1;
            }
        }
    }

    println!();
    println!("=== Results ===");
    println!("Passed: {}", passed);
    println!("Failed: {}", failed);
    println!();

    if failed > 0 {
        ExitCode::from(1)
    } else {
        println!("All tests passed!");
        ExitCode::SUCCESS
    }
}
