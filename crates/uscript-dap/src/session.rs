//! A live debug session: the debugger model plus the wire client, and the
//! probe round-trips between them.
//!
//! A probe is a command followed by a wait on the signal its reply events
//! fire. Unreal only reports a frame's line number and watches when asked to
//! switch to that frame, so stack traces and scopes for outer frames are
//! populated lazily here. Requests hold the session lock for their whole
//! handling (the server keeps the session behind an async mutex), which
//! serializes probes; event dispatch bypasses that lock entirely.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use uscript_wire::{default_port, Command, WatchKind};

use crate::client::InterfaceClient;
use crate::debugger::{DebugNotification, Debugger, DebuggerState};
use crate::signal::Signal;
use crate::sourcemap::SourceMap;
use crate::varref::VarRefError;

/// How long to wait for the interface to answer a probe before giving up on
/// the request.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("debug session terminated")]
    Terminated,

    #[error("timed out waiting for the debugger interface")]
    Timeout,

    #[error("frame {0} is out of range")]
    InvalidFrame(usize),

    #[error("unknown variables reference {0}")]
    UnknownVariablesReference(i64),

    #[error(transparent)]
    VarRef(#[from] VarRefError),
}

/// A frame as reported to DAP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub index: usize,
    pub class_name: String,
    pub function_name: String,
    pub line: i32,
}

/// A variable as reported to DAP; `index` addresses the node for child
/// expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSnapshot {
    pub index: usize,
    pub name: String,
    pub type_name: String,
    pub value: String,
    pub has_children: bool,
}

pub struct DebugSession {
    debugger: Arc<Debugger>,
    client: InterfaceClient,
    source_map: SourceMap,
}

/// Loopback address of the interface service.
pub fn interface_addr(port: Option<u16>) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port.unwrap_or_else(default_port)))
}

impl DebugSession {
    pub async fn connect(
        addr: SocketAddr,
        source_map: SourceMap,
        notifications: mpsc::UnboundedSender<DebugNotification>,
    ) -> io::Result<DebugSession> {
        let debugger = Arc::new(Debugger::new(notifications));
        let client = InterfaceClient::connect(addr, debugger.clone()).await?;
        Ok(DebugSession {
            debugger,
            client,
            source_map,
        })
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    pub fn debugger(&self) -> &Arc<Debugger> {
        &self.debugger
    }

    pub fn shutdown(&self) {
        self.client.shutdown();
    }

    async fn wait(&self, signal: &Signal) -> Result<(), SessionError> {
        let shutdown_token = self.client.shutdown_token();
        let waited = tokio::select! {
            _ = shutdown_token.cancelled() => Err(SessionError::Terminated),
            res = tokio::time::timeout(PROBE_TIMEOUT, signal.wait()) => {
                res.map(|_| ()).map_err(|_| SessionError::Timeout)
            }
        };
        waited?;
        if self.debugger.is_terminated() {
            return Err(SessionError::Terminated);
        }
        Ok(())
    }

    /// Send `toggle_watch_info` only on actual transitions; the interface
    /// remembers the flag.
    fn set_watch_info(&self, enabled: bool) {
        {
            let mut model = self.debugger.model();
            if model.watch_info_enabled == enabled {
                return;
            }
            model.watch_info_enabled = enabled;
        }
        self.client.send(&Command::ToggleWatchInfo {
            send_watch_info: enabled,
        });
    }

    fn reset_state(&self) {
        self.debugger.model().state = DebuggerState::Normal;
    }

    /// Stack frames for a DAP stackTrace request, populating missing line
    /// numbers first. Returns the page of frames and the total frame count.
    pub async fn stack_trace(
        &self,
        start: usize,
        levels: Option<usize>,
    ) -> Result<(Vec<FrameSnapshot>, usize), SessionError> {
        let (total, missing) = {
            let model = self.debugger.model();
            let total = model.callstack.len();
            let end = levels
                .map(|levels| start.saturating_add(levels).min(total))
                .unwrap_or(total);
            let missing: Vec<usize> = (start.min(total)..end)
                .filter(|&index| index != 0 && model.callstack[index].line_number == 0)
                .collect();
            (total, missing)
        };

        if !missing.is_empty() {
            let populated = self.populate_frame_lines(&missing).await;
            if populated.is_err() {
                self.reset_state();
            }
            populated?;
        }

        let model = self.debugger.model();
        let end = levels
            .map(|levels| start.saturating_add(levels).min(model.callstack.len()))
            .unwrap_or(model.callstack.len());
        let frames = (start.min(model.callstack.len())..end)
            .map(|index| {
                let frame = &model.callstack[index];
                FrameSnapshot {
                    index,
                    class_name: frame.class_name.clone(),
                    function_name: frame.function_name.clone(),
                    line: frame.line_number,
                }
            })
            .collect();
        Ok((frames, total))
    }

    /// Fetch line numbers for the given frames by switching Unreal's stack to
    /// each in turn. Watch traffic is silenced for the duration: a stack
    /// switch otherwise resends every watch list, which is very expensive,
    /// and the line number comes from `editor_goto_line` regardless.
    async fn populate_frame_lines(&self, frames: &[usize]) -> Result<(), SessionError> {
        let signals = &self.debugger.signals;
        self.set_watch_info(false);

        for &index in frames {
            {
                let mut model = self.debugger.model();
                if index >= model.callstack.len() {
                    return Err(SessionError::InvalidFrame(index));
                }
                model.state = DebuggerState::WaitingForFrameLine;
                model.current_frame = index;
            }
            signals.line_received.reset();
            self.client.send(&Command::ChangeStack {
                stack_id: index as i32,
            });
            self.wait(&signals.line_received).await?;
            signals.line_received.reset();
        }

        // Put Unreal back on the top frame; the editor's selection has not
        // changed, only our probing did.
        {
            let mut model = self.debugger.model();
            model.state = DebuggerState::WaitingForFrameLine;
            model.current_frame = 0;
        }
        signals.line_received.reset();
        self.client.send(&Command::ChangeStack { stack_id: 0 });
        self.wait(&signals.line_received).await?;
        signals.line_received.reset();

        self.reset_state();
        self.set_watch_info(true);
        Ok(())
    }

    /// Make sure a frame's watch lists are populated, switching Unreal's
    /// stack to it when they are not. The switched-to frame stays current;
    /// execution control resets the focus to the top frame.
    pub async fn ensure_frame_watches(&self, frame: usize) -> Result<(), SessionError> {
        {
            let model = self.debugger.model();
            let snapshot = model
                .callstack
                .get(frame)
                .ok_or(SessionError::InvalidFrame(frame))?;
            if snapshot.fetched_watches {
                return Ok(());
            }
        }

        self.fetch_frame_watches(frame).await
    }

    async fn fetch_frame_watches(&self, frame: usize) -> Result<(), SessionError> {
        let signals = &self.debugger.signals;
        self.set_watch_info(true);
        {
            let mut model = self.debugger.model();
            if frame >= model.callstack.len() {
                return Err(SessionError::InvalidFrame(frame));
            }
            model.state = DebuggerState::WaitingForFrameWatches;
            model.current_frame = frame;
        }
        signals.watches_received.reset();
        self.client.send(&Command::ChangeStack {
            stack_id: frame as i32,
        });

        let waited = self.wait(&signals.watches_received).await;
        signals.watches_received.reset();
        if waited.is_err() {
            self.reset_state();
        }
        waited?;

        let mut model = self.debugger.model();
        if let Some(snapshot) = model.callstack.get_mut(frame) {
            snapshot.fetched_watches = true;
        }
        model.state = DebuggerState::Normal;
        Ok(())
    }

    /// The children of a watch node, for DAP scopes/variables.
    pub fn variable_children(
        &self,
        frame: usize,
        node: usize,
        kind: WatchKind,
    ) -> Result<Vec<VariableSnapshot>, SessionError> {
        let model = self.debugger.model();
        let snapshot = model
            .callstack
            .get(frame)
            .ok_or(SessionError::InvalidFrame(frame))?;
        let list = snapshot.watches(kind);
        if list.is_empty() && node == 0 {
            // An empty list has no synthetic root yet; no variables.
            return Ok(Vec::new());
        }
        let parent = list
            .node(node)
            .ok_or(SessionError::UnknownVariablesReference(node as i64))?;

        Ok(parent
            .children
            .iter()
            .filter_map(|&child| list.node(child).map(|node| (child, node)))
            .map(|(index, node)| VariableSnapshot {
                index,
                name: node.name.clone(),
                type_name: node.type_name.clone(),
                value: node.value.clone(),
                has_children: !node.children.is_empty(),
            })
            .collect())
    }

    /// Evaluate a watch expression in a frame: reuse a matching user watch if
    /// one is already registered, otherwise register it and wait for Unreal
    /// to send its value. `None` means Unreal did not produce a value, i.e.
    /// the expression is not watchable.
    pub async fn evaluate_watch(
        &self,
        frame: usize,
        expression: &str,
    ) -> Result<Option<VariableSnapshot>, SessionError> {
        // Unreal evaluates user watches against its current stack frame, so
        // the frame must be both fetched and current.
        let needs_switch = {
            let model = self.debugger.model();
            let snapshot = model
                .callstack
                .get(frame)
                .ok_or(SessionError::InvalidFrame(frame))?;
            !snapshot.fetched_watches || model.current_frame != frame
        };
        if needs_switch {
            self.fetch_frame_watches(frame).await?;
        }

        if let Some(hit) = self.find_user_watch(frame, expression) {
            return Ok(Some(hit));
        }

        let signals = &self.debugger.signals;
        self.debugger.model().state = DebuggerState::WaitingForUserWatches;
        signals.user_watches_received.reset();
        self.client.send(&Command::AddWatch {
            var_name: expression.to_owned(),
        });

        let waited = self.wait(&signals.user_watches_received).await;
        signals.user_watches_received.reset();
        self.reset_state();
        waited?;

        Ok(self.find_user_watch(frame, expression))
    }

    fn find_user_watch(&self, frame: usize, expression: &str) -> Option<VariableSnapshot> {
        let model = self.debugger.model();
        let (index, node) = model
            .callstack
            .get(frame)?
            .user_watches
            .find_root_child(expression)?;
        Some(VariableSnapshot {
            index,
            name: node.name.clone(),
            type_name: node.type_name.clone(),
            value: node.value.clone(),
            has_children: !node.children.is_empty(),
        })
    }

    /// Replace the breakpoints of one class. Existing lines are removed
    /// (no confirmation comes back for removals), then each requested line is
    /// added and awaited; a line is verified when the interface's
    /// confirmation event landed it in the map.
    pub async fn set_breakpoints(
        &self,
        class_name: &str,
        lines: &[i32],
    ) -> Result<Vec<(i32, bool)>, SessionError> {
        let upper = class_name.to_uppercase();
        let existing = {
            self.debugger
                .model()
                .breakpoints
                .get(&upper)
                .cloned()
                .unwrap_or_default()
        };
        for line in existing {
            self.client.send(&Command::RemoveBreakpoint {
                class_name: class_name.to_owned(),
                line,
            });
        }

        let signals = &self.debugger.signals;
        let mut results = Vec::with_capacity(lines.len());
        for &line in lines {
            self.debugger.model().state = DebuggerState::WaitingForAddBreakpoint;
            signals.breakpoint_added.reset();
            self.client.send(&Command::AddBreakpoint {
                class_name: class_name.to_owned(),
                line,
            });

            let waited = self.wait(&signals.breakpoint_added).await;
            signals.breakpoint_added.reset();
            self.reset_state();
            match waited {
                Ok(()) => {}
                // No confirmation within the window reads as "not verified",
                // not as a failed request.
                Err(SessionError::Timeout) => {}
                Err(err) => return Err(err),
            }

            let verified = self
                .debugger
                .model()
                .breakpoints
                .get(&upper)
                .is_some_and(|lines| lines.contains(&line));
            results.push((line, verified));
        }

        Ok(results)
    }

    /// Resume-style commands (`go`, steps, `break`): focus returns to the top
    /// frame, watch traffic is re-enabled for the next break, and the model
    /// goes busy until `show_dll_form` announces the stop.
    pub fn execution_control(&self, command: Command) {
        {
            let mut model = self.debugger.model();
            model.current_frame = 0;
            model.state = DebuggerState::Busy;
        }
        self.set_watch_info(true);
        self.debugger.signals.breakpoint_hit.reset();
        self.client.send(&command);
    }

    /// DAP disconnect: ask the interface to stop debugging. The interface
    /// answers with `terminated` once Unreal detaches.
    pub fn disconnect(&self) {
        self.client.send(&Command::StopDebugging);
    }
}
