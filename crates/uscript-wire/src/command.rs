use crate::codec::{string_len, WireError, WireReader, WireWriter};

/// A debugger command sent from the adapter to the interface. The interface
/// re-encodes each one as the matching console string for Unreal's callback,
/// except for [`Command::ToggleWatchInfo`], which only changes interface
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddBreakpoint { class_name: String, line: i32 },
    RemoveBreakpoint { class_name: String, line: i32 },
    AddWatch { var_name: String },
    RemoveWatch { var_name: String },
    ClearWatch,
    ChangeStack { stack_id: i32 },
    SetDataWatch { var_name: String },
    BreakOnNone { value: bool },
    Break,
    StopDebugging,
    Go,
    StepInto,
    StepOver,
    StepOutOf,
    ToggleWatchInfo { send_watch_info: bool },
}

const KIND_ADD_BREAKPOINT: u8 = 0;
const KIND_REMOVE_BREAKPOINT: u8 = 1;
const KIND_ADD_WATCH: u8 = 2;
const KIND_REMOVE_WATCH: u8 = 3;
const KIND_CLEAR_WATCH: u8 = 4;
const KIND_CHANGE_STACK: u8 = 5;
const KIND_SET_DATA_WATCH: u8 = 6;
const KIND_BREAK_ON_NONE: u8 = 7;
const KIND_BREAK: u8 = 8;
const KIND_STOP_DEBUGGING: u8 = 9;
const KIND_GO: u8 = 10;
const KIND_STEP_INTO: u8 = 11;
const KIND_STEP_OVER: u8 = 12;
const KIND_STEP_OUT_OF: u8 = 13;
const KIND_TOGGLE_WATCH_INFO: u8 = 14;

impl Command {
    fn kind(&self) -> u8 {
        match self {
            Command::AddBreakpoint { .. } => KIND_ADD_BREAKPOINT,
            Command::RemoveBreakpoint { .. } => KIND_REMOVE_BREAKPOINT,
            Command::AddWatch { .. } => KIND_ADD_WATCH,
            Command::RemoveWatch { .. } => KIND_REMOVE_WATCH,
            Command::ClearWatch => KIND_CLEAR_WATCH,
            Command::ChangeStack { .. } => KIND_CHANGE_STACK,
            Command::SetDataWatch { .. } => KIND_SET_DATA_WATCH,
            Command::BreakOnNone { .. } => KIND_BREAK_ON_NONE,
            Command::Break => KIND_BREAK,
            Command::StopDebugging => KIND_STOP_DEBUGGING,
            Command::Go => KIND_GO,
            Command::StepInto => KIND_STEP_INTO,
            Command::StepOver => KIND_STEP_OVER,
            Command::StepOutOf => KIND_STEP_OUT_OF,
            Command::ToggleWatchInfo { .. } => KIND_TOGGLE_WATCH_INFO,
        }
    }

    fn encoded_len(&self) -> usize {
        1 + match self {
            Command::ClearWatch
            | Command::Break
            | Command::StopDebugging
            | Command::Go
            | Command::StepInto
            | Command::StepOver
            | Command::StepOutOf => 0,
            Command::AddBreakpoint { class_name, .. }
            | Command::RemoveBreakpoint { class_name, .. } => string_len(class_name) + 4,
            Command::AddWatch { var_name }
            | Command::RemoveWatch { var_name }
            | Command::SetDataWatch { var_name } => string_len(var_name),
            Command::ChangeStack { .. } => 4,
            Command::BreakOnNone { .. } | Command::ToggleWatchInfo { .. } => 1,
        }
    }

    /// Serialize to a message body (kind byte followed by the fields).
    pub fn encode(&self) -> Vec<u8> {
        let len = self.encoded_len();
        let mut w = WireWriter::with_capacity(len);
        w.write_u8(self.kind());
        match self {
            Command::ClearWatch
            | Command::Break
            | Command::StopDebugging
            | Command::Go
            | Command::StepInto
            | Command::StepOver
            | Command::StepOutOf => {}
            Command::AddBreakpoint { class_name, line }
            | Command::RemoveBreakpoint { class_name, line } => {
                w.write_string(class_name);
                w.write_i32(*line);
            }
            Command::AddWatch { var_name }
            | Command::RemoveWatch { var_name }
            | Command::SetDataWatch { var_name } => w.write_string(var_name),
            Command::ChangeStack { stack_id } => w.write_i32(*stack_id),
            Command::BreakOnNone { value } => w.write_bool(*value),
            Command::ToggleWatchInfo { send_watch_info } => w.write_bool(*send_watch_info),
        }
        w.finish(len)
    }

    /// Deserialize a message body. The body must be consumed exactly.
    pub fn decode(body: &[u8]) -> Result<Command, WireError> {
        let mut r = WireReader::new(body);
        let kind = r.read_u8()?;
        let command = match kind {
            KIND_ADD_BREAKPOINT => Command::AddBreakpoint {
                class_name: r.read_string()?,
                line: r.read_i32()?,
            },
            KIND_REMOVE_BREAKPOINT => Command::RemoveBreakpoint {
                class_name: r.read_string()?,
                line: r.read_i32()?,
            },
            KIND_ADD_WATCH => Command::AddWatch {
                var_name: r.read_string()?,
            },
            KIND_REMOVE_WATCH => Command::RemoveWatch {
                var_name: r.read_string()?,
            },
            KIND_CLEAR_WATCH => Command::ClearWatch,
            KIND_CHANGE_STACK => Command::ChangeStack {
                stack_id: r.read_i32()?,
            },
            KIND_SET_DATA_WATCH => Command::SetDataWatch {
                var_name: r.read_string()?,
            },
            KIND_BREAK_ON_NONE => Command::BreakOnNone {
                value: r.read_bool()?,
            },
            KIND_BREAK => Command::Break,
            KIND_STOP_DEBUGGING => Command::StopDebugging,
            KIND_GO => Command::Go,
            KIND_STEP_INTO => Command::StepInto,
            KIND_STEP_OVER => Command::StepOver,
            KIND_STEP_OUT_OF => Command::StepOutOf,
            KIND_TOGGLE_WATCH_INFO => Command::ToggleWatchInfo {
                send_watch_info: r.read_bool()?,
            },
            kind => {
                return Err(WireError::UnknownKind {
                    domain: "command",
                    kind,
                })
            }
        };
        r.finish()?;
        Ok(command)
    }
}
