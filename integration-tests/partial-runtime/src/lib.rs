//! Stand-in runtime that lacks `Py_SetPath`. Loading it must fail before
//! any entry point is called.

#![allow(non_snake_case)]

use std::ffi::c_int;

#[cfg(windows)]
type WideChar = u16;
#[cfg(not(windows))]
type WideChar = u32;

#[no_mangle]
pub extern "C" fn Py_SetProgramName(_name: *const WideChar) {}

#[no_mangle]
pub extern "C" fn Py_SetPythonHome(_home: *const WideChar) {}

#[no_mangle]
pub extern "C" fn Py_Main(_argc: c_int, _argv: *mut *mut WideChar) -> c_int {
    eprintln!("partial runtime: Py_Main must not be reached");
    99
}
