//! Stand-in for the runtime's shared library.
//!
//! Exports the four entry points the launcher needs. The setters record
//! their argument; `Py_Main` prints everything it received as one JSON line
//! on stdout and returns `FAKE_RUNTIME_EXIT_CODE` (default 0).

#![allow(non_snake_case)]

use std::env;
use std::ffi::c_int;
use std::sync::Mutex;

use serde::Serialize;

#[cfg(windows)]
type WideChar = u16;
#[cfg(not(windows))]
type WideChar = u32;

#[cfg(windows)]
const SEARCH_PATH_VAR: &str = "PATH";
#[cfg(target_os = "macos")]
const SEARCH_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(any(windows, target_os = "macos")))]
const SEARCH_PATH_VAR: &str = "LD_LIBRARY_PATH";

const EXIT_CODE_VAR: &str = "FAKE_RUNTIME_EXIT_CODE";

#[derive(Debug, Default, Clone, Serialize)]
struct Received {
    program_name: Option<String>,
    home: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    program_name: Option<String>,
    home: Option<String>,
    path: Option<String>,
    argv: Vec<String>,
    self_dir: Option<String>,
    search_path: Option<String>,
    /// Whether `Py_Main` resolves from the global scope, as extension
    /// modules need. `None` where the loader has no such scope.
    global_symbols: Option<bool>,
}

static RECEIVED: Mutex<Received> = Mutex::new(Received {
    program_name: None,
    home: None,
    path: None,
});

/// Look the symbol up through the main program's handle, which searches
/// everything loaded with `RTLD_GLOBAL`.
#[cfg(unix)]
fn globally_visible(symbol: &[u8]) -> Option<bool> {
    let this = libloading::os::unix::Library::this();
    Some(unsafe { this.get::<*const std::ffi::c_void>(symbol) }.is_ok())
}

#[cfg(windows)]
fn globally_visible(_symbol: &[u8]) -> Option<bool> {
    None
}

#[cfg(windows)]
fn decode(units: &[WideChar]) -> String {
    String::from_utf16_lossy(units)
}

#[cfg(not(windows))]
fn decode(units: &[WideChar]) -> String {
    units
        .iter()
        .map(|&u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Read a NUL-terminated wide string.
unsafe fn read_wide(ptr: *const WideChar) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    Some(decode(std::slice::from_raw_parts(ptr, len)))
}

fn record(update: impl FnOnce(&mut Received)) {
    let mut received = RECEIVED.lock().unwrap_or_else(|e| e.into_inner());
    update(&mut received);
}

#[no_mangle]
pub unsafe extern "C" fn Py_SetProgramName(name: *const WideChar) {
    let value = read_wide(name);
    record(|r| r.program_name = value);
}

#[no_mangle]
pub unsafe extern "C" fn Py_SetPythonHome(home: *const WideChar) {
    let value = read_wide(home);
    record(|r| r.home = value);
}

#[no_mangle]
pub unsafe extern "C" fn Py_SetPath(path: *const WideChar) {
    let value = read_wide(path);
    record(|r| r.path = value);
}

#[no_mangle]
pub unsafe extern "C" fn Py_Main(argc: c_int, argv: *mut *mut WideChar) -> c_int {
    let mut args = Vec::new();
    if !argv.is_null() {
        for i in 0..usize::try_from(argc).unwrap_or(0) {
            args.push(read_wide(*argv.add(i)).unwrap_or_default());
        }
    }

    let received = RECEIVED
        .lock()
        .map(|r| r.clone())
        .unwrap_or_else(|e| e.into_inner().clone());
    let report = Report {
        program_name: received.program_name,
        home: received.home,
        path: received.path,
        argv: args,
        self_dir: env::var("SELF").ok(),
        search_path: env::var(SEARCH_PATH_VAR).ok(),
        global_symbols: globally_visible(b"Py_Main"),
    };

    match serde_json::to_string(&report) {
        Ok(line) => println!("{}", line),
        Err(e) => {
            eprintln!("fake runtime: cannot encode report: {}", e);
            return 70;
        }
    }

    env::var(EXIT_CODE_VAR)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}
