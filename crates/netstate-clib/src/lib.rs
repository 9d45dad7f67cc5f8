//! C ABI for netstate.
//!
//! See `include/netstate.h`. Every buffer handed out is a `CString` released
//! through the matching `*_free` function.

use std::ffi::{CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use libc::{c_char, c_int};
use netstate::{Error, ErrorKind, NetworkState};

pub const NETSTATE_PASS: c_int = 0;
pub const NETSTATE_FAIL: c_int = 1;

fn into_c(text: impl Into<Vec<u8>>) -> *mut c_char {
    let mut bytes = text.into();
    bytes.retain(|b| *b != 0);
    CString::new(bytes).unwrap_or_default().into_raw()
}

/// Write a failure to the error outputs.
///
/// # Safety
///
/// Both pointers must be valid for writes.
unsafe fn fail(
    err_kind: *mut *mut c_char,
    err_msg: *mut *mut c_char,
    kind: ErrorKind,
    msg: String,
) -> c_int {
    unsafe {
        *err_kind = into_c(kind.as_str());
        *err_msg = into_c(msg);
    }
    NETSTATE_FAIL
}

/// Run `f`, turning errors and panics into error outputs.
///
/// # Safety
///
/// Both pointers must be valid for writes.
unsafe fn guard<F>(err_kind: *mut *mut c_char, err_msg: *mut *mut c_char, f: F) -> c_int
where
    F: FnOnce() -> Result<(), Error>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => NETSTATE_PASS,
        Ok(Err(e)) => unsafe { fail(err_kind, err_msg, e.kind(), e.to_string()) },
        Err(_) => unsafe {
            fail(
                err_kind,
                err_msg,
                ErrorKind::Bug,
                "panic in netstate".into(),
            )
        },
    }
}

/// Retrieve the current network state as a JSON document.
///
/// # Safety
///
/// `state`, `err_kind` and `err_msg` must each be NULL or valid for writes.
/// NULL output pointers fail without writing anything.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn netstate_retrieve(
    state: *mut *mut c_char,
    err_kind: *mut *mut c_char,
    err_msg: *mut *mut c_char,
) -> c_int {
    if state.is_null() || err_kind.is_null() || err_msg.is_null() {
        return NETSTATE_FAIL;
    }
    unsafe {
        *state = ptr::null_mut();
        *err_kind = ptr::null_mut();
        *err_msg = ptr::null_mut();
    }

    let mut document = None;
    let rc = unsafe {
        guard(err_kind, err_msg, || {
            document = Some(NetworkState::retrieve()?.serialize()?);
            Ok(())
        })
    };
    if let Some(document) = document {
        unsafe { *state = into_c(document) };
    }
    rc
}

/// Apply the desired-state JSON document `state`.
///
/// # Safety
///
/// `state` must be NULL or a NUL-terminated string. `err_kind` and `err_msg`
/// must each be NULL or valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn netstate_apply(
    state: *const c_char,
    err_kind: *mut *mut c_char,
    err_msg: *mut *mut c_char,
) -> c_int {
    if err_kind.is_null() || err_msg.is_null() {
        return NETSTATE_FAIL;
    }
    unsafe {
        *err_kind = ptr::null_mut();
        *err_msg = ptr::null_mut();
    }

    if state.is_null() {
        return unsafe {
            fail(
                err_kind,
                err_msg,
                ErrorKind::SchemaError,
                "document is NULL".into(),
            )
        };
    }
    let document = match unsafe { CStr::from_ptr(state) }.to_str() {
        Ok(document) => document,
        Err(e) => {
            return unsafe {
                fail(
                    err_kind,
                    err_msg,
                    ErrorKind::SchemaError,
                    format!("document is not valid UTF-8: {}", e),
                )
            };
        }
    };

    unsafe {
        guard(err_kind, err_msg, || {
            NetworkState::parse(document)?.apply()?;
            Ok(())
        })
    }
}

/// Release a document returned by [`netstate_retrieve`].
///
/// # Safety
///
/// `state` must be NULL or a pointer returned by this library and not yet
/// released.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn netstate_state_free(state: *mut c_char) {
    if !state.is_null() {
        drop(unsafe { CString::from_raw(state) });
    }
}

/// Release an error kind.
///
/// # Safety
///
/// As for [`netstate_state_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn netstate_err_kind_free(err_kind: *mut c_char) {
    if !err_kind.is_null() {
        drop(unsafe { CString::from_raw(err_kind) });
    }
}

/// Release an error message.
///
/// # Safety
///
/// As for [`netstate_state_free`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn netstate_err_msg_free(err_msg: *mut c_char) {
    if !err_msg.is_null() {
        drop(unsafe { CString::from_raw(err_msg) });
    }
}
