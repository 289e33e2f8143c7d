//! The debugger model.
//!
//! Unreal pushes its state at the adapter (call-stack rebuilds, watch
//! batches, line updates) without being asked; the editor pulls state out
//! through DAP whenever it likes. This model holds the meeting point: the
//! finalized call stack with per-frame watch trees, the breakpoint map, and
//! the one-shot signals that let a request handler park until the events it
//! asked for have arrived.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

use uscript_wire::{Event, WatchKind};

use crate::signal::Signal;

/// Unreal exposes exactly one script thread; DAP wants an id for it.
pub const UNREAL_THREAD_ID: i64 = 1;

pub const UNREAL_THREAD_NAME: &str = "UnrealScript";

/// Where the event dispatcher routes the signals it fires; request handlers
/// set the state before sending a probe command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebuggerState {
    #[default]
    Normal,
    WaitingForFrameLine,
    WaitingForFrameWatches,
    WaitingForUserWatches,
    WaitingForAddBreakpoint,
    Busy,
}

/// Notifications the DAP layer turns into editor-facing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugNotification {
    /// The debugger stopped at a breakpoint (or finished a step).
    Stopped,
    /// A line of game log output.
    Output(String),
    /// The interface ended the session.
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchNode {
    pub name: String,
    pub type_name: String,
    pub value: String,
    pub parent: i32,
    pub children: Vec<usize>,
}

impl WatchNode {
    fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            type_name: String::new(),
            value: String::new(),
            parent: -1,
            children: Vec::new(),
        }
    }
}

/// A flat watch list forming an implicit tree: element 0 is a synthetic root
/// whose children are the top-level variables, and every other element sits
/// at the index Unreal was told when the watch was added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchList {
    nodes: Vec<WatchNode>,
}

impl WatchList {
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&WatchNode> {
        self.nodes.get(index)
    }

    /// Insert a watch at its assigned index, linking it into its parent's
    /// child list (-1 parents the synthetic root).
    pub fn insert(&mut self, index: i32, parent: i32, full_name: &str, value: &str) {
        if index < 1 {
            tracing::warn!(target: "uscript.dap", index, full_name, "ignoring watch with invalid index");
            return;
        }
        if self.nodes.is_empty() {
            self.nodes.push(WatchNode::placeholder("ROOT"));
        }

        let index = index as usize;
        if self.nodes.len() <= index {
            self.nodes.resize(index + 1, WatchNode::placeholder("<unknown>"));
        }

        let (name, type_name) = split_watch_name(full_name);
        self.nodes[index] = WatchNode {
            name,
            type_name,
            value: value.to_owned(),
            parent,
            children: Vec::new(),
        };

        if parent >= 1 && (parent as usize) < self.nodes.len() {
            self.nodes[parent as usize].children.push(index);
        } else if parent == -1 {
            self.nodes[0].children.push(index);
        }
    }

    /// Find a top-level variable by its parsed name.
    pub fn find_root_child(&self, name: &str) -> Option<(usize, &WatchNode)> {
        self.nodes
            .first()?
            .children
            .iter()
            .filter_map(|&child| self.nodes.get(child).map(|node| (child, node)))
            .find(|(_, node)| node.name == name)
    }
}

/// Unreal watch names arrive as `"Name ( Type, Address )"`; keep the name
/// and the type, drop the address. An unparseable name is kept whole.
fn split_watch_name(full_name: &str) -> (String, String) {
    if let Some(open) = full_name.find('(') {
        let name = full_name[..open].trim_end();
        let rest = &full_name[open + 1..];
        if let Some(comma) = rest.find(',') {
            if !name.is_empty() {
                return (name.to_owned(), rest[..comma].trim().to_owned());
            }
        }
    }
    tracing::debug!(target: "uscript.dap", full_name, "watch name did not parse, keeping verbatim");
    (full_name.to_owned(), String::new())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackFrame {
    pub class_name: String,
    pub function_name: String,
    pub line_number: i32,
    pub local_watches: WatchList,
    pub global_watches: WatchList,
    pub user_watches: WatchList,
    pub fetched_watches: bool,
}

impl StackFrame {
    pub fn watches(&self, kind: WatchKind) -> &WatchList {
        match kind {
            WatchKind::Local => &self.local_watches,
            WatchKind::Global => &self.global_watches,
            WatchKind::User => &self.user_watches,
        }
    }

    pub fn watches_mut(&mut self, kind: WatchKind) -> &mut WatchList {
        match kind {
            WatchKind::Local => &mut self.local_watches,
            WatchKind::Global => &mut self.global_watches,
            WatchKind::User => &mut self.user_watches,
        }
    }
}

/// The mutable model. Held behind the [`Debugger`] mutex; never locked
/// across an await point.
#[derive(Debug)]
pub struct DebuggerModel {
    /// Always at least one element. Before a stack is finalized, element 0
    /// is the placeholder accumulating the class/line/watch data Unreal
    /// sends ahead of the call stack; afterwards index 0 is the innermost
    /// frame.
    pub callstack: Vec<StackFrame>,
    /// The frame inbound frame-scoped events apply to: 0 after a break,
    /// elsewhere while a `change_stack` probe is in flight.
    pub current_frame: usize,
    pub state: DebuggerState,
    /// Balance of `lock_list` events against `unlock_list`; watch signals
    /// fire only when it returns to zero.
    pub lock_depth: i32,
    /// Upper-cased class name to breakpoint lines, mirrored from the
    /// interface's confirmation events.
    pub breakpoints: HashMap<String, Vec<i32>>,
    /// Whether the interface is currently sending watch traffic (the last
    /// `toggle_watch_info` value this side sent).
    pub watch_info_enabled: bool,
    pub terminated: bool,
}

impl Default for DebuggerModel {
    fn default() -> Self {
        Self {
            callstack: vec![StackFrame::default()],
            current_frame: 0,
            state: DebuggerState::Normal,
            lock_depth: 0,
            breakpoints: HashMap::new(),
            watch_info_enabled: true,
            terminated: false,
        }
    }
}

impl DebuggerModel {
    pub fn current_frame_mut(&mut self) -> &mut StackFrame {
        let index = self.current_frame.min(self.callstack.len() - 1);
        &mut self.callstack[index]
    }

    /// Unreal populates the placeholder frame (class, line, watches) before
    /// sending the call stack bottom-up. Fold the placeholder's data into the
    /// innermost frame, flip the stack so index 0 is innermost, and drop the
    /// placeholder.
    pub fn finalize_callstack(&mut self) {
        if self.callstack.len() > 1 {
            let line = self.callstack[0].line_number;
            let locals = std::mem::take(&mut self.callstack[0].local_watches);
            let globals = std::mem::take(&mut self.callstack[0].global_watches);

            let innermost = self.callstack.last_mut().expect("non-empty call stack");
            innermost.line_number = line;
            innermost.local_watches = locals;
            innermost.global_watches = globals;

            self.callstack.reverse();
            self.callstack.pop();
        }

        if let Some(top) = self.callstack.first_mut() {
            top.fetched_watches = true;
        }
        self.current_frame = 0;
    }

    /// Call stack entries arrive as `"Function Pkg.Class:Func"`. The kind
    /// word is dropped, the rest splits into class and function.
    pub fn push_callstack_entry(&mut self, entry: &str) {
        let name = match entry.split_once(' ') {
            Some((kind, rest)) => {
                if kind != "Function" {
                    tracing::warn!(target: "uscript.dap", entry, "unknown call stack entry kind");
                }
                rest
            }
            None => entry,
        };

        let (class_name, function_name) = match name.split_once(':') {
            Some((class, function)) => (class.to_owned(), function.to_owned()),
            None => {
                tracing::warn!(target: "uscript.dap", entry, "call stack entry has no function name");
                (name.to_owned(), String::new())
            }
        };

        self.callstack.push(StackFrame {
            class_name,
            function_name,
            ..StackFrame::default()
        });
    }
}

/// Signals that turn asynchronous debugger events into synchronous DAP
/// responses. One-shot with explicit reset; see [`Signal`].
#[derive(Default)]
pub struct Signals {
    pub breakpoint_hit: Signal,
    pub line_received: Signal,
    pub watches_received: Signal,
    pub user_watches_received: Signal,
    pub breakpoint_added: Signal,
}

impl Signals {
    /// Wake every waiter; used on termination so nothing stays parked.
    fn fire_all(&self) {
        self.breakpoint_hit.fire();
        self.line_received.fire();
        self.watches_received.fire();
        self.user_watches_received.fire();
        self.breakpoint_added.fire();
    }
}

enum WatchSignal {
    Frame,
    User,
}

pub struct Debugger {
    model: Mutex<DebuggerModel>,
    pub signals: Signals,
    notifications: mpsc::UnboundedSender<DebugNotification>,
}

impl Debugger {
    pub fn new(notifications: mpsc::UnboundedSender<DebugNotification>) -> Self {
        Self {
            model: Mutex::new(DebuggerModel::default()),
            signals: Signals::default(),
            notifications,
        }
    }

    pub fn model(&self) -> MutexGuard<'_, DebuggerModel> {
        self.model.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_terminated(&self) -> bool {
        self.model().terminated
    }

    /// Mark the session dead, wake every parked waiter, and tell the DAP
    /// layer. Idempotent: only the first call notifies.
    pub fn notify_terminated(&self) {
        let already = {
            let mut model = self.model();
            std::mem::replace(&mut model.terminated, true)
        };
        self.signals.fire_all();
        if !already {
            let _ = self.notifications.send(DebugNotification::Terminated);
        }
    }

    /// Apply one inbound event. Runs on the wire-client read task; model
    /// updates happen under the lock, signal fires and notifications after
    /// it is released.
    pub fn handle_event(&self, event: Event) {
        tracing::trace!(target: "uscript.dap", ?event, "applying event");
        match event {
            Event::ShowDllForm => {
                {
                    let mut model = self.model();
                    model.finalize_callstack();
                    model.state = DebuggerState::Normal;
                }
                self.signals.breakpoint_hit.fire();
                let _ = self.notifications.send(DebugNotification::Stopped);
            }

            // The class hierarchy has no DAP surface.
            Event::BuildHierarchy | Event::ClearHierarchy | Event::AddClassToHierarchy { .. } => {}

            Event::LockList { .. } => {
                self.model().lock_depth += 1;
            }

            Event::UnlockList { kind, watches } => {
                let fire = {
                    let mut model = self.model();
                    let frame = model.current_frame_mut();
                    let list = frame.watches_mut(kind);
                    for watch in &watches {
                        list.insert(watch.index, watch.parent, &watch.name, &watch.value);
                    }

                    model.lock_depth = (model.lock_depth - 1).max(0);
                    if model.lock_depth == 0 {
                        match model.state {
                            DebuggerState::WaitingForFrameWatches => Some(WatchSignal::Frame),
                            DebuggerState::WaitingForUserWatches => Some(WatchSignal::User),
                            _ => None,
                        }
                    } else {
                        None
                    }
                };
                match fire {
                    Some(WatchSignal::Frame) => self.signals.watches_received.fire(),
                    Some(WatchSignal::User) => self.signals.user_watches_received.fire(),
                    None => {}
                }
            }

            Event::ClearAWatch { kind } => {
                self.model().current_frame_mut().watches_mut(kind).clear();
            }

            Event::AddBreakpoint { class_name, line } => {
                let fire = {
                    let mut model = self.model();
                    let lines = model.breakpoints.entry(class_name.to_uppercase()).or_default();
                    if !lines.contains(&line) {
                        lines.push(line);
                    }
                    model.state == DebuggerState::WaitingForAddBreakpoint
                };
                if fire {
                    self.signals.breakpoint_added.fire();
                }
            }

            Event::RemoveBreakpoint { class_name, line } => {
                let mut model = self.model();
                let upper = class_name.to_uppercase();
                if let Some(lines) = model.breakpoints.get_mut(&upper) {
                    lines.retain(|&l| l != line);
                    if lines.is_empty() {
                        model.breakpoints.remove(&upper);
                    }
                }
            }

            Event::EditorLoadClass { class_name } => {
                self.model().current_frame_mut().class_name = class_name;
            }

            Event::EditorGotoLine { line, .. } => {
                self.model().current_frame_mut().line_number = line;
            }

            // The last event of a stack switch; with watch traffic disabled
            // it is the only way to know the line information has arrived.
            Event::SetCurrentObjectName { .. } => {
                let fire = self.model().state == DebuggerState::WaitingForFrameLine;
                if fire {
                    self.signals.line_received.fire();
                }
            }

            Event::AddLineToLog { text } => {
                let _ = self.notifications.send(DebugNotification::Output(text));
            }

            // Keep element 0: the class/line/watches accumulated on it belong
            // to the innermost frame of the stack about to be rebuilt.
            Event::CallStackClear => {
                self.model().callstack.truncate(1);
            }

            Event::CallStackAdd { entry } => {
                self.model().push_callstack_entry(&entry);
            }

            Event::Terminated => {
                self.notify_terminated();
            }
        }
    }
}
