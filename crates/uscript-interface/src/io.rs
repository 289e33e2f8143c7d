//! The I/O reactor.
//!
//! One worker thread owns a current-thread runtime for the lifetime of the
//! service. It accepts a single client, then runs a framed read loop
//! (commands in) and a queue-driven write loop (events out) until the
//! connection dies or the service is cancelled. Any I/O failure while
//! connected flips the state to `stopped`; the next entry-point call tears
//! the service down and starts a fresh one.

use std::sync::{Arc, Mutex};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use uscript_wire::{read_frame, write_frame, SendQueue, WireError};

use crate::commands::dispatch_command;
use crate::service::{ServiceState, StateCell, WatchState};

pub(crate) fn run_reactor(
    listener: std::net::TcpListener,
    state: &'static StateCell,
    queue: Arc<SendQueue>,
    wake: Arc<Notify>,
    watch: Arc<Mutex<WatchState>>,
    cancel: CancellationToken,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(target: "uscript.interface", %err, "failed to build I/O runtime");
            state.set(ServiceState::Stopped);
            return;
        }
    };

    runtime.block_on(reactor_main(listener, state, queue, wake, watch, cancel));
}

async fn reactor_main(
    listener: std::net::TcpListener,
    state: &'static StateCell,
    queue: Arc<SendQueue>,
    wake: Arc<Notify>,
    watch: Arc<Mutex<WatchState>>,
    cancel: CancellationToken,
) {
    let listener = match tokio::net::TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(target: "uscript.interface", %err, "failed to register listener");
            state.set(ServiceState::Stopped);
            return;
        }
    };

    let stream = tokio::select! {
        _ = cancel.cancelled() => return,
        accepted = listener.accept() => match accepted {
            Ok((stream, peer)) => {
                tracing::info!(target: "uscript.interface", %peer, "debug client connected");
                stream
            }
            Err(err) => {
                tracing::error!(target: "uscript.interface", %err, "accept failed");
                state.set(ServiceState::Stopped);
                return;
            }
        },
    };
    let _ = stream.set_nodelay(true);
    // One client at a time: stop listening while this connection is live. A
    // replacement listener comes with the next service instance.
    drop(listener);
    state.set(ServiceState::Connected);

    let (mut reader, mut writer) = stream.into_split();

    let read_side = async {
        let result = read_loop(&mut reader, state, &watch, &cancel).await;
        if let Err(err) = &result {
            tracing::error!(target: "uscript.interface", %err, "command read loop failed");
        }
        // Unblock the writer whether this was an error or a clean shutdown.
        cancel.cancel();
        wake.notify_one();
        result
    };

    let write_side = async {
        let result = write_loop(&mut writer, &queue, &wake, &cancel).await;
        if let Err(err) = &result {
            tracing::error!(target: "uscript.interface", %err, "event write loop failed");
            cancel.cancel();
        }
        result
    };

    let (read_result, write_result) = tokio::join!(read_side, write_side);

    // A shutdown in progress keeps its state; anything else that killed the
    // connection leaves the service restartable.
    if (read_result.is_err() || write_result.is_err()) && state.get() == ServiceState::Connected {
        state.set(ServiceState::Stopped);
    }
}

async fn read_loop(
    reader: &mut OwnedReadHalf,
    state: &StateCell,
    watch: &Mutex<WatchState>,
    cancel: &CancellationToken,
) -> Result<(), WireError> {
    loop {
        let body = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = read_frame(reader) => read?,
        };
        let Some(body) = body else {
            return Err(WireError::ConnectionClosed);
        };
        dispatch_command(&body, state, watch)?;
    }
}

async fn write_loop(
    writer: &mut OwnedWriteHalf,
    queue: &SendQueue,
    wake: &Notify,
    cancel: &CancellationToken,
) -> Result<(), WireError> {
    loop {
        // Register for a wake-up before the empty check so a push landing in
        // between is not lost.
        let wakeup = wake.notified();
        if let Some(message) = queue.front() {
            write_frame(writer, &message).await?;
            queue.pop();
            continue;
        }
        tokio::select! {
            _ = cancel.cancelled() => {
                // The shutdown path queues `terminated` right before
                // cancelling; flush whatever is still pending so it reaches
                // the client.
                while let Some(message) = queue.front() {
                    write_frame(writer, &message).await?;
                    queue.pop();
                }
                return Ok(());
            }
            _ = wakeup => {}
        }
    }
}
