//! FFI bindings for Drive Sense
//!
//! This module provides C-compatible functions for calling Drive Sense from other
//! languages. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `drive_free_string`.

use chrono::Utc;
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::classifier::CentroidClassifier;
use crate::config::{ExtractorConfig, DEFAULT_WINDOW_SIZE};
use crate::pipeline::{readings_to_verdicts, DriveProcessor};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Helper to convert a Vec<String> to a JSON array string
fn vec_to_json_array(vec: Vec<String>) -> String {
    // Each string is already valid JSON, so we join them as array elements
    format!("[{}]", vec.join(","))
}

fn window_or_default(window_size: i32) -> usize {
    if window_size <= 0 {
        DEFAULT_WINDOW_SIZE
    } else {
        window_size as usize
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Classify NDJSON reading events with a JSON model and return a verdict JSON array.
///
/// # Safety
/// - `ndjson` and `model_json` must be valid null-terminated C strings.
/// - `window_size <= 0` selects the default window.
/// - Returns a newly allocated string that must be freed with `drive_free_string`.
/// - Returns NULL on error; call `drive_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn drive_readings_to_verdicts(
    ndjson: *const c_char,
    model_json: *const c_char,
    window_size: i32,
) -> *mut c_char {
    clear_last_error();

    let Some(ndjson_str) = cstr_to_string(ndjson) else {
        set_last_error("Invalid NDJSON string pointer");
        return ptr::null_mut();
    };

    let Some(model_str) = cstr_to_string(model_json) else {
        set_last_error("Invalid model string pointer");
        return ptr::null_mut();
    };

    match readings_to_verdicts(&ndjson_str, &model_str, window_or_default(window_size)) {
        Ok(verdicts) => string_to_cstr(&vec_to_json_array(verdicts)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a DriveProcessor
pub struct DriveProcessorHandle {
    processor: DriveProcessor,
}

/// Create a new DriveProcessor from a nearest-centroid model.
///
/// # Safety
/// - `model_json` must be a valid null-terminated C string.
/// - `window_size <= 0` selects the default window.
/// - Returns a pointer that must be freed with `drive_processor_free`.
/// - Returns NULL on error; call `drive_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn drive_processor_new(
    model_json: *const c_char,
    window_size: i32,
) -> *mut DriveProcessorHandle {
    clear_last_error();

    let Some(model_str) = cstr_to_string(model_json) else {
        set_last_error("Invalid model string pointer");
        return ptr::null_mut();
    };

    let processor = CentroidClassifier::from_json(&model_str).and_then(|classifier| {
        let config = ExtractorConfig::with_window_size(window_or_default(window_size));
        DriveProcessor::with_classifier(&config, classifier)
    });

    match processor {
        Ok(processor) => Box::into_raw(Box::new(DriveProcessorHandle { processor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a DriveProcessor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `drive_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn drive_processor_free(processor: *mut DriveProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Process one JSON reading event and return the verdict JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `drive_processor_new`.
/// - `reading_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `drive_free_string`.
/// - Returns NULL on error; call `drive_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn drive_processor_process(
    processor: *const DriveProcessorHandle,
    reading_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;

    let Some(json_str) = cstr_to_string(reading_json) else {
        set_last_error("Invalid reading string pointer");
        return ptr::null_mut();
    };

    match handle.processor.process_json(&json_str) {
        Ok(verdict) => string_to_cstr(&verdict),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// End a vehicle session.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `drive_processor_new`.
/// - `vehicle_id` must be a valid null-terminated C string.
/// - Returns 1 if the session existed, 0 if it did not, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn drive_processor_end_session(
    processor: *const DriveProcessorHandle,
    vehicle_id: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &*processor;

    let Some(id) = cstr_to_string(vehicle_id) else {
        set_last_error("Invalid vehicle_id string pointer");
        return -1;
    };

    i32::from(handle.processor.end_session(&id))
}

/// Save a vehicle's rolling history to JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `drive_processor_new`.
/// - `vehicle_id` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `drive_free_string`.
/// - Returns NULL on error; call `drive_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn drive_processor_save_session(
    processor: *const DriveProcessorHandle,
    vehicle_id: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &*processor;

    let Some(id) = cstr_to_string(vehicle_id) else {
        set_last_error("Invalid vehicle_id string pointer");
        return ptr::null_mut();
    };

    match handle.processor.save_session(&id) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Restore a vehicle's rolling history from JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `drive_processor_new`.
/// - `vehicle_id` and `json` must be valid null-terminated C strings.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `drive_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn drive_processor_load_session(
    processor: *const DriveProcessorHandle,
    vehicle_id: *const c_char,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &*processor;

    let Some(id) = cstr_to_string(vehicle_id) else {
        set_last_error("Invalid vehicle_id string pointer");
        return -1;
    };

    let Some(json_str) = cstr_to_string(json) else {
        set_last_error("Invalid JSON string pointer");
        return -1;
    };

    match handle.processor.load_session(&id, &json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Drop sessions idle for longer than the configured timeout.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `drive_processor_new`.
/// - Returns the number of sessions dropped, or -1 on error.
#[no_mangle]
pub unsafe extern "C" fn drive_processor_expire_idle(processor: *const DriveProcessorHandle) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &*processor;
    let expired = handle.processor.expire_idle(Utc::now());
    i32::try_from(expired.len()).unwrap_or(i32::MAX)
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Drive Sense functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Drive Sense function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn drive_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Drive Sense call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn drive_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Drive Sense library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn drive_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
