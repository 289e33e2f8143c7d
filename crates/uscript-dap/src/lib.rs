//! Debug Adapter Protocol server for the UnrealScript debugger interface.
//!
//! Unreal's debugger API is push-driven and stateless: the game announces
//! breaks, watch batches, and call-stack rebuilds as they happen, and accepts
//! a handful of console commands back. DAP is pull-driven and stateful: the
//! editor asks for stack traces, scopes, and variables whenever it likes.
//! This crate owns the model that bridges the two: a call stack with
//! per-frame watch trees, a breakpoint map, and the one-shot signals that
//! turn asynchronous debugger events into synchronous DAP responses.

pub mod client;
pub mod dap;
pub mod debugger;
pub mod server;
pub mod session;
pub mod signal;
pub mod sourcemap;
pub mod varref;

pub use crate::debugger::{DebugNotification, Debugger};
pub use crate::session::{DebugSession, SessionError};
