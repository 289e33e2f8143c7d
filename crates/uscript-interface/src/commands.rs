//! Inbound command handling.
//!
//! Commands arrive as structured wire messages and leave as the console
//! strings Unreal accepts through its callback. The structure exists for
//! validation: a command that fails to decode is a protocol error, whereas a
//! raw string pass-through would hand arbitrary network input to the game.

use std::sync::Mutex;

use uscript_wire::{Command, WireError};

use crate::service::{invoke_callback, ServiceState, StateCell, WatchState};

pub(crate) fn dispatch_command(
    body: &[u8],
    state: &StateCell,
    watch: &Mutex<WatchState>,
) -> Result<(), WireError> {
    let command = Command::decode(body)?;
    tracing::debug!(target: "uscript.interface", ?command, "dispatching command");

    match command {
        Command::AddBreakpoint { class_name, line } => {
            invoke_callback(&format!("addbreakpoint {class_name} {line}"));
        }
        Command::RemoveBreakpoint { class_name, line } => {
            invoke_callback(&format!("removebreakpoint {class_name} {line}"));
        }
        Command::AddWatch { var_name } => {
            invoke_callback(&format!("addwatch {var_name}"));
        }
        Command::RemoveWatch { var_name } => {
            invoke_callback(&format!("removewatch {var_name}"));
        }
        Command::ClearWatch => invoke_callback("clearwatch"),
        Command::ChangeStack { stack_id } => {
            invoke_callback(&format!("changestack {stack_id}"));
        }
        Command::SetDataWatch { var_name } => {
            invoke_callback(&format!("setdatawatch {var_name}"));
        }
        Command::BreakOnNone { value } => {
            invoke_callback(if value { "breakonnone 1" } else { "breakonnone 0" });
        }
        Command::Break => invoke_callback("break"),
        Command::StopDebugging => {
            // Flip to shutdown before the callback: Unreal reacts by emitting
            // the detach log line, and the AddLineToLog entry point must see
            // the service already shutting down rather than restart it.
            state.set(ServiceState::Shutdown);
            invoke_callback("stopdebugging");
        }
        Command::Go => invoke_callback("go"),
        Command::StepInto => invoke_callback("stepinto"),
        Command::StepOver => invoke_callback("stepover"),
        Command::StepOutOf => invoke_callback("stepoutof"),
        Command::ToggleWatchInfo { send_watch_info } => {
            // Not a real Unreal command: the client uses this to silence the
            // very expensive watch resends while it switches stack frames for
            // line info. A lock/unlock pair straddling the toggle would wedge
            // the batch, so pending buffers are discarded on disable.
            let mut ws = watch.lock().unwrap_or_else(|e| e.into_inner());
            ws.send_watch_info = send_watch_info;
            if !send_watch_info {
                ws.pending = Default::default();
            }
        }
    }

    Ok(())
}
