//! The C entry points Unreal drives.
//!
//! These implement the debugger interface API from the UDK documentation.
//! Every entry point runs through [`check_service`] first: calls made while
//! no client is connected are dropped, and the check doubles as the restart
//! path after an I/O failure.

#![allow(non_snake_case)]

use std::borrow::Cow;
use std::ffi::{c_char, c_int, c_void, CStr};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::service::{self, check_service};

/// The one and only signal Unreal gives that debugging has ended on its side
/// (for example via the `toggledebugger` console command): this exact log
/// line arrives through `AddLineToLog`. There is no dedicated entry point
/// for it.
pub const DETACH_LOG_LINE: &str = "Log: Detaching UnrealScript Debugger (currently detached)";

unsafe fn cstr<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

/// Called by Unreal when the debugger starts to provide the command callback.
#[no_mangle]
pub extern "C" fn SetCallback(callback: *mut c_void) {
    service::set_callback(callback);
}

static FIRST_SHOW: AtomicBool = AtomicBool::new(true);

/// Unreal invokes this both once during startup and on every break, with no
/// argument to tell the cases apart. The first call after load is the
/// initialization signal and is swallowed; everything after is a genuine
/// break notification.
#[no_mangle]
pub extern "C" fn ShowDllForm() {
    service::with_service(|svc| {
        if FIRST_SHOW.swap(false, Ordering::SeqCst) {
            return;
        }
        svc.show_dll_form();
    });
}

#[no_mangle]
pub extern "C" fn BuildHierarchy() {
    service::with_service(|svc| svc.build_hierarchy());
}

#[no_mangle]
pub extern "C" fn ClearHierarchy() {
    service::with_service(|svc| svc.clear_hierarchy());
}

#[no_mangle]
pub extern "C" fn AddClassToHierarchy(class_name: *const c_char) {
    let class_name = unsafe { cstr(class_name) };
    service::with_service(|svc| svc.add_class_to_hierarchy(&class_name));
}

/// Legacy alias for [`ClearAWatch`]; some engine builds still call it.
#[no_mangle]
pub extern "C" fn ClearWatch(watch_kind: c_int) {
    service::with_service(|svc| svc.clear_a_watch(watch_kind));
}

#[no_mangle]
pub extern "C" fn ClearAWatch(watch_kind: c_int) {
    service::with_service(|svc| svc.clear_a_watch(watch_kind));
}

/// The only entry point with a return value; see the service documentation
/// for the index assignment scheme.
#[no_mangle]
pub extern "C" fn AddAWatch(
    watch_kind: c_int,
    parent: c_int,
    name: *const c_char,
    value: *const c_char,
) -> c_int {
    let name = unsafe { cstr(name) };
    let value = unsafe { cstr(value) };
    service::with_service(|svc| svc.add_a_watch(watch_kind, parent, &name, &value)).unwrap_or(0)
}

#[no_mangle]
pub extern "C" fn LockList(watch_kind: c_int) {
    service::with_service(|svc| svc.lock_list(watch_kind));
}

#[no_mangle]
pub extern "C" fn UnlockList(watch_kind: c_int) {
    service::with_service(|svc| svc.unlock_list(watch_kind));
}

#[no_mangle]
pub extern "C" fn AddBreakpoint(class_name: *const c_char, line_number: c_int) {
    let class_name = unsafe { cstr(class_name) };
    service::with_service(|svc| svc.add_breakpoint(&class_name, line_number));
}

#[no_mangle]
pub extern "C" fn RemoveBreakpoint(class_name: *const c_char, line_number: c_int) {
    let class_name = unsafe { cstr(class_name) };
    service::with_service(|svc| svc.remove_breakpoint(&class_name, line_number));
}

/// Announces the source class for the current frame; arrives before
/// `ShowDllForm` when the debugger breaks.
#[no_mangle]
pub extern "C" fn EditorLoadClass(class_name: *const c_char) {
    let class_name = unsafe { cstr(class_name) };
    service::with_service(|svc| svc.editor_load_class(&class_name));
}

#[no_mangle]
pub extern "C" fn EditorGotoLine(line_number: c_int, highlight: c_int) {
    service::with_service(|svc| svc.editor_goto_line(line_number, highlight));
}

#[no_mangle]
pub extern "C" fn AddLineToLog(text: *const c_char) {
    let text = unsafe { cstr(text) };
    let shutting_down = service::with_service(|svc| {
        svc.add_line_to_log(&text);

        // Note this fires only for host-initiated detach: when the client
        // sent `stopdebugging`, the state is already `shutdown` by the time
        // Unreal echoes the log line, so `with_service` never reaches here.
        if text == DETACH_LOG_LINE {
            svc.begin_shutdown();
            true
        } else {
            false
        }
    })
    .unwrap_or(false);

    // Unreal will not call us again after detaching, so run the teardown half
    // of the state machine now instead of waiting for the next entry point.
    if shutting_down {
        check_service();
    }
}

#[no_mangle]
pub extern "C" fn CallStackClear() {
    service::with_service(|svc| svc.call_stack_clear());
}

#[no_mangle]
pub extern "C" fn CallStackAdd(entry: *const c_char) {
    let entry = unsafe { cstr(entry) };
    service::with_service(|svc| svc.call_stack_add(&entry));
}

#[no_mangle]
pub extern "C" fn SetCurrentObjectName(object_name: *const c_char) {
    let object_name = unsafe { cstr(object_name) };
    service::with_service(|svc| svc.set_current_object_name(&object_name));
}

/// Documented as unused by the engine.
#[no_mangle]
pub extern "C" fn DebugWindowState(_state: c_int) {}
