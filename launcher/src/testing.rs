//! Stand-in runtime used by unit tests.
//!
//! The entry points are plain `extern "C"` functions that record every call
//! in a process-wide log. Tests reading the log hold `crate::ENV_LOCK`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use crate::platform::WideChar;
use crate::runtime::{MainFn, RuntimeLoader, SetStringFn, SymbolSource, REQUIRED_SYMBOLS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ProgramName(String),
    Home(String),
    SearchPath(String),
    Main(Vec<String>),
}

static CALLS: Mutex<Vec<Call>> = Mutex::new(Vec::new());
static MAIN_EXIT_CODE: AtomicI32 = AtomicI32::new(0);

fn record(call: Call) {
    CALLS.lock().unwrap_or_else(|e| e.into_inner()).push(call);
}

/// Clear the log and choose what the fake main returns.
pub fn reset(exit_code: i32) {
    CALLS.lock().unwrap_or_else(|e| e.into_inner()).clear();
    MAIN_EXIT_CODE.store(exit_code, Ordering::SeqCst);
}

pub fn calls() -> Vec<Call> {
    CALLS.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

unsafe fn decode(ptr: *const WideChar) -> String {
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    let units = std::slice::from_raw_parts(ptr, len);
    #[cfg(windows)]
    {
        String::from_utf16_lossy(units)
    }
    #[cfg(not(windows))]
    {
        units
            .iter()
            .map(|&u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

unsafe extern "C" fn fake_set_program_name(value: *const WideChar) {
    record(Call::ProgramName(decode(value)));
}

unsafe extern "C" fn fake_set_home(value: *const WideChar) {
    record(Call::Home(decode(value)));
}

unsafe extern "C" fn fake_set_search_path(value: *const WideChar) {
    record(Call::SearchPath(decode(value)));
}

unsafe extern "C" fn fake_main(argc: c_int, argv: *mut *mut WideChar) -> c_int {
    let args = (0..argc as usize)
        .map(|i| decode(*argv.add(i)))
        .collect();
    record(Call::Main(args));
    MAIN_EXIT_CODE.load(Ordering::SeqCst)
}

/// Symbol table of the fake runtime.
#[derive(Debug, Clone)]
pub struct FakeLibrary {
    symbols: HashMap<&'static str, *const c_void>,
}

impl FakeLibrary {
    pub fn complete() -> Self {
        let mut symbols = HashMap::new();
        symbols.insert("Py_Main", fake_main as MainFn as *const c_void);
        symbols.insert(
            "Py_SetProgramName",
            fake_set_program_name as SetStringFn as *const c_void,
        );
        symbols.insert("Py_SetPythonHome", fake_set_home as SetStringFn as *const c_void);
        symbols.insert("Py_SetPath", fake_set_search_path as SetStringFn as *const c_void);
        assert_eq!(symbols.len(), REQUIRED_SYMBOLS.len());
        Self { symbols }
    }

    pub fn without(names: &[&str]) -> Self {
        let mut library = Self::complete();
        library.symbols.retain(|name, _| !names.contains(name));
        library
    }
}

impl SymbolSource for FakeLibrary {
    fn lookup(&self, name: &str) -> Option<*const c_void> {
        self.symbols.get(name).copied()
    }
}

/// Hands out a fixed [`FakeLibrary`], or fails like a missing file.
pub struct FakeLoader {
    library: Option<FakeLibrary>,
    requested: RefCell<Vec<PathBuf>>,
}

impl FakeLoader {
    pub fn with(library: FakeLibrary) -> Self {
        Self {
            library: Some(library),
            requested: RefCell::new(Vec::new()),
        }
    }

    pub fn missing() -> Self {
        Self {
            library: None,
            requested: RefCell::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<PathBuf> {
        self.requested.borrow().clone()
    }
}

impl RuntimeLoader for FakeLoader {
    type Library = FakeLibrary;

    fn load(&self, path: &Path) -> Result<FakeLibrary, String> {
        self.requested.borrow_mut().push(path.to_path_buf());
        self.library
            .clone()
            .ok_or_else(|| "No such file or directory".to_string())
    }
}
