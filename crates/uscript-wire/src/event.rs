use crate::codec::{string_len, WireError, WireReader, WireWriter};
use crate::WatchKind;

/// One variable inside an `unlock_list` batch.
///
/// `index` is the value the interface returned to Unreal from `AddAWatch`;
/// `parent` is the index of the enclosing variable, or -1 for a top-level one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    pub parent: i32,
    pub index: i32,
    pub name: String,
    pub value: String,
}

impl Watch {
    fn encoded_len(&self) -> usize {
        4 + 4 + string_len(&self.name) + string_len(&self.value)
    }

    fn encode(&self, w: &mut WireWriter) {
        w.write_i32(self.parent);
        w.write_i32(self.index);
        w.write_string(&self.name);
        w.write_string(&self.value);
    }

    fn decode(r: &mut WireReader<'_>) -> Result<Watch, WireError> {
        Ok(Watch {
            parent: r.read_i32()?,
            index: r.read_i32()?,
            name: r.read_string()?,
            value: r.read_string()?,
        })
    }
}

/// A debug event sent from the interface to the adapter. Each variant maps
/// 1:1 onto one of the entry points Unreal invokes on the interface, except
/// that `AddAWatch` calls are batched into [`Event::UnlockList`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ShowDllForm,
    BuildHierarchy,
    ClearHierarchy,
    AddClassToHierarchy {
        class_name: String,
    },
    LockList {
        kind: WatchKind,
    },
    UnlockList {
        kind: WatchKind,
        watches: Vec<Watch>,
    },
    ClearAWatch {
        kind: WatchKind,
    },
    AddBreakpoint {
        class_name: String,
        line: i32,
    },
    RemoveBreakpoint {
        class_name: String,
        line: i32,
    },
    EditorLoadClass {
        class_name: String,
    },
    EditorGotoLine {
        line: i32,
        highlight: bool,
    },
    AddLineToLog {
        text: String,
    },
    CallStackClear,
    CallStackAdd {
        entry: String,
    },
    SetCurrentObjectName {
        object_name: String,
    },
    Terminated,
}

const KIND_SHOW_DLL_FORM: u8 = 0;
const KIND_BUILD_HIERARCHY: u8 = 1;
const KIND_CLEAR_HIERARCHY: u8 = 2;
const KIND_ADD_CLASS_TO_HIERARCHY: u8 = 3;
const KIND_LOCK_LIST: u8 = 4;
const KIND_UNLOCK_LIST: u8 = 5;
const KIND_CLEAR_A_WATCH: u8 = 6;
const KIND_ADD_BREAKPOINT: u8 = 7;
const KIND_REMOVE_BREAKPOINT: u8 = 8;
const KIND_EDITOR_LOAD_CLASS: u8 = 9;
const KIND_EDITOR_GOTO_LINE: u8 = 10;
const KIND_ADD_LINE_TO_LOG: u8 = 11;
const KIND_CALL_STACK_CLEAR: u8 = 12;
const KIND_CALL_STACK_ADD: u8 = 13;
const KIND_SET_CURRENT_OBJECT_NAME: u8 = 14;
const KIND_TERMINATED: u8 = 15;

impl Event {
    fn kind(&self) -> u8 {
        match self {
            Event::ShowDllForm => KIND_SHOW_DLL_FORM,
            Event::BuildHierarchy => KIND_BUILD_HIERARCHY,
            Event::ClearHierarchy => KIND_CLEAR_HIERARCHY,
            Event::AddClassToHierarchy { .. } => KIND_ADD_CLASS_TO_HIERARCHY,
            Event::LockList { .. } => KIND_LOCK_LIST,
            Event::UnlockList { .. } => KIND_UNLOCK_LIST,
            Event::ClearAWatch { .. } => KIND_CLEAR_A_WATCH,
            Event::AddBreakpoint { .. } => KIND_ADD_BREAKPOINT,
            Event::RemoveBreakpoint { .. } => KIND_REMOVE_BREAKPOINT,
            Event::EditorLoadClass { .. } => KIND_EDITOR_LOAD_CLASS,
            Event::EditorGotoLine { .. } => KIND_EDITOR_GOTO_LINE,
            Event::AddLineToLog { .. } => KIND_ADD_LINE_TO_LOG,
            Event::CallStackClear => KIND_CALL_STACK_CLEAR,
            Event::CallStackAdd { .. } => KIND_CALL_STACK_ADD,
            Event::SetCurrentObjectName { .. } => KIND_SET_CURRENT_OBJECT_NAME,
            Event::Terminated => KIND_TERMINATED,
        }
    }

    fn encoded_len(&self) -> usize {
        1 + match self {
            Event::ShowDllForm
            | Event::BuildHierarchy
            | Event::ClearHierarchy
            | Event::CallStackClear
            | Event::Terminated => 0,
            Event::AddClassToHierarchy { class_name } => string_len(class_name),
            Event::LockList { .. } | Event::ClearAWatch { .. } => 4,
            Event::UnlockList { watches, .. } => {
                4 + 4 + watches.iter().map(Watch::encoded_len).sum::<usize>()
            }
            Event::AddBreakpoint { class_name, .. } | Event::RemoveBreakpoint { class_name, .. } => {
                string_len(class_name) + 4
            }
            Event::EditorLoadClass { class_name } => string_len(class_name),
            Event::EditorGotoLine { .. } => 4 + 1,
            Event::AddLineToLog { text } => string_len(text),
            Event::CallStackAdd { entry } => string_len(entry),
            Event::SetCurrentObjectName { object_name } => string_len(object_name),
        }
    }

    /// Serialize to a message body (kind byte followed by the fields).
    pub fn encode(&self) -> Vec<u8> {
        let len = self.encoded_len();
        let mut w = WireWriter::with_capacity(len);
        w.write_u8(self.kind());
        match self {
            Event::ShowDllForm
            | Event::BuildHierarchy
            | Event::ClearHierarchy
            | Event::CallStackClear
            | Event::Terminated => {}
            Event::AddClassToHierarchy { class_name } => w.write_string(class_name),
            Event::LockList { kind } | Event::ClearAWatch { kind } => w.write_i32(kind.as_raw()),
            Event::UnlockList { kind, watches } => {
                w.write_i32(kind.as_raw());
                w.write_i32(watches.len() as i32);
                for watch in watches {
                    watch.encode(&mut w);
                }
            }
            Event::AddBreakpoint { class_name, line }
            | Event::RemoveBreakpoint { class_name, line } => {
                w.write_string(class_name);
                w.write_i32(*line);
            }
            Event::EditorLoadClass { class_name } => w.write_string(class_name),
            Event::EditorGotoLine { line, highlight } => {
                w.write_i32(*line);
                w.write_bool(*highlight);
            }
            Event::AddLineToLog { text } => w.write_string(text),
            Event::CallStackAdd { entry } => w.write_string(entry),
            Event::SetCurrentObjectName { object_name } => w.write_string(object_name),
        }
        w.finish(len)
    }

    /// Deserialize a message body. The body must be consumed exactly.
    pub fn decode(body: &[u8]) -> Result<Event, WireError> {
        let mut r = WireReader::new(body);
        let kind = r.read_u8()?;
        let event = match kind {
            KIND_SHOW_DLL_FORM => Event::ShowDllForm,
            KIND_BUILD_HIERARCHY => Event::BuildHierarchy,
            KIND_CLEAR_HIERARCHY => Event::ClearHierarchy,
            KIND_ADD_CLASS_TO_HIERARCHY => Event::AddClassToHierarchy {
                class_name: r.read_string()?,
            },
            KIND_LOCK_LIST => Event::LockList {
                kind: read_watch_kind(&mut r)?,
            },
            KIND_UNLOCK_LIST => {
                let kind = read_watch_kind(&mut r)?;
                let count = r.read_i32()?;
                if count < 0 {
                    return Err(WireError::NegativeLength(count));
                }
                let mut watches = Vec::with_capacity(count.min(1024) as usize);
                for _ in 0..count {
                    watches.push(Watch::decode(&mut r)?);
                }
                Event::UnlockList { kind, watches }
            }
            KIND_CLEAR_A_WATCH => Event::ClearAWatch {
                kind: read_watch_kind(&mut r)?,
            },
            KIND_ADD_BREAKPOINT => Event::AddBreakpoint {
                class_name: r.read_string()?,
                line: r.read_i32()?,
            },
            KIND_REMOVE_BREAKPOINT => Event::RemoveBreakpoint {
                class_name: r.read_string()?,
                line: r.read_i32()?,
            },
            KIND_EDITOR_LOAD_CLASS => Event::EditorLoadClass {
                class_name: r.read_string()?,
            },
            KIND_EDITOR_GOTO_LINE => Event::EditorGotoLine {
                line: r.read_i32()?,
                highlight: r.read_bool()?,
            },
            KIND_ADD_LINE_TO_LOG => Event::AddLineToLog {
                text: r.read_string()?,
            },
            KIND_CALL_STACK_CLEAR => Event::CallStackClear,
            KIND_CALL_STACK_ADD => Event::CallStackAdd {
                entry: r.read_string()?,
            },
            KIND_SET_CURRENT_OBJECT_NAME => Event::SetCurrentObjectName {
                object_name: r.read_string()?,
            },
            KIND_TERMINATED => Event::Terminated,
            kind => {
                return Err(WireError::UnknownKind {
                    domain: "event",
                    kind,
                })
            }
        };
        r.finish()?;
        Ok(event)
    }
}

fn read_watch_kind(r: &mut WireReader<'_>) -> Result<WatchKind, WireError> {
    let raw = r.read_i32()?;
    WatchKind::from_raw(raw).ok_or(WireError::InvalidWatchKind(raw))
}
