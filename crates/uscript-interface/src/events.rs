//! Entry-point to event translation.
//!
//! With the exception of `add_a_watch` every mapping is a direct construction
//! of the matching event. Watches are the special case: Unreal expects an
//! index back from `AddAWatch` immediately, and sends large bursts of them
//! between `LockList`/`UnlockList`, so they are assigned locally and batched
//! into the `unlock_list` event instead of being sent one by one.

use uscript_wire::{Event, Watch, WatchKind};

use crate::service::Service;

impl Service {
    pub fn show_dll_form(&self) {
        self.send_event(&Event::ShowDllForm);
    }

    pub fn build_hierarchy(&self) {
        self.send_event(&Event::BuildHierarchy);
    }

    pub fn clear_hierarchy(&self) {
        self.send_event(&Event::ClearHierarchy);
    }

    pub fn add_class_to_hierarchy(&self, class_name: &str) {
        self.send_event(&Event::AddClassToHierarchy {
            class_name: class_name.to_owned(),
        });
    }

    pub fn clear_a_watch(&self, watch_kind: i32) {
        let Some(kind) = WatchKind::from_raw(watch_kind) else {
            tracing::warn!(target: "uscript.interface", watch_kind, "ignoring ClearAWatch with unknown kind");
            return;
        };

        {
            let mut ws = self.watch.lock().unwrap_or_else(|e| e.into_inner());
            ws.indices[kind.index()] = 1;
            if !ws.send_watch_info {
                return;
            }
            if let Some(pending) = ws.pending[kind.index()].as_mut() {
                pending.clear();
            }
        }

        self.send_event(&Event::ClearAWatch { kind });
    }

    /// The one entry point that returns a value. The index assigned here is
    /// how Unreal refers to this variable as the parent of later ones; the
    /// client rebuilds the tree from the (parent, index) pairs inside the
    /// `unlock_list` batch. Indices are handed out even while watch traffic
    /// is suppressed so they stay consistent across toggles.
    pub fn add_a_watch(&self, watch_kind: i32, parent: i32, name: &str, value: &str) -> i32 {
        let Some(kind) = WatchKind::from_raw(watch_kind) else {
            tracing::warn!(target: "uscript.interface", watch_kind, "ignoring AddAWatch with unknown kind");
            return 0;
        };

        let mut ws = self.watch.lock().unwrap_or_else(|e| e.into_inner());
        let index = ws.indices[kind.index()];
        ws.indices[kind.index()] += 1;

        if ws.send_watch_info {
            if let Some(pending) = ws.pending[kind.index()].as_mut() {
                pending.push(Watch {
                    parent,
                    index,
                    name: name.to_owned(),
                    value: value.to_owned(),
                });
            }
        }

        index
    }

    pub fn lock_list(&self, watch_kind: i32) {
        let Some(kind) = WatchKind::from_raw(watch_kind) else {
            tracing::warn!(target: "uscript.interface", watch_kind, "ignoring LockList with unknown kind");
            return;
        };

        {
            let mut ws = self.watch.lock().unwrap_or_else(|e| e.into_inner());
            if !ws.send_watch_info {
                return;
            }
            ws.pending[kind.index()] = Some(Vec::new());
        }

        self.send_event(&Event::LockList { kind });
    }

    pub fn unlock_list(&self, watch_kind: i32) {
        let Some(kind) = WatchKind::from_raw(watch_kind) else {
            tracing::warn!(target: "uscript.interface", watch_kind, "ignoring UnlockList with unknown kind");
            return;
        };

        let watches = {
            let mut ws = self.watch.lock().unwrap_or_else(|e| e.into_inner());
            if !ws.send_watch_info {
                return;
            }
            ws.pending[kind.index()].take().unwrap_or_default()
        };

        self.send_event(&Event::UnlockList { kind, watches });
    }

    pub fn add_breakpoint(&self, class_name: &str, line: i32) {
        self.send_event(&Event::AddBreakpoint {
            class_name: class_name.to_owned(),
            line,
        });
    }

    pub fn remove_breakpoint(&self, class_name: &str, line: i32) {
        self.send_event(&Event::RemoveBreakpoint {
            class_name: class_name.to_owned(),
            line,
        });
    }

    pub fn editor_load_class(&self, class_name: &str) {
        self.send_event(&Event::EditorLoadClass {
            class_name: class_name.to_owned(),
        });
    }

    pub fn editor_goto_line(&self, line: i32, highlight: i32) {
        self.send_event(&Event::EditorGotoLine {
            line,
            highlight: highlight != 0,
        });
    }

    pub fn add_line_to_log(&self, text: &str) {
        self.send_event(&Event::AddLineToLog {
            text: text.to_owned(),
        });
    }

    pub fn call_stack_clear(&self) {
        self.send_event(&Event::CallStackClear);
    }

    pub fn call_stack_add(&self, entry: &str) {
        self.send_event(&Event::CallStackAdd {
            entry: entry.to_owned(),
        });
    }

    pub fn set_current_object_name(&self, object_name: &str) {
        self.send_event(&Event::SetCurrentObjectName {
            object_name: object_name.to_owned(),
        });
    }
}
