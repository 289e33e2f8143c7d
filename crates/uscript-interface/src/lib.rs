//! Debugger interface library for UnrealScript.
//!
//! Unreal loads this library and drives it through a fixed set of C entry
//! points (see [`entry`]). The library contains almost no debug logic of its
//! own: it runs a small TCP service that accepts a single debug-adapter
//! client, forwards entry-point calls to it as serialized events, and turns
//! the commands it receives back into the console strings Unreal accepts
//! through its callback function.
//!
//! The one piece of real state kept here is watch batching: `AddAWatch` must
//! return an index to Unreal immediately, so indices are assigned locally and
//! the watch records are buffered between `LockList`/`UnlockList` and shipped
//! as a single batch.

mod commands;
mod events;
mod io;

pub mod entry;
pub mod service;

pub use entry::DETACH_LOG_LINE;
pub use service::{check_service, state, Service, ServiceState};
