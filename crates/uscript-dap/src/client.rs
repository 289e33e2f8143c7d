//! Wire client: the adapter's side of the interface connection.
//!
//! A read task decodes inbound events straight into the debugger model; a
//! write task drains the command queue. Either side failing ends the session
//! (the interface restarts itself; this process does not).

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use uscript_wire::{read_frame, write_frame, Command, Event, SendQueue};

use crate::debugger::Debugger;

pub struct InterfaceClient {
    queue: Arc<SendQueue>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
}

impl InterfaceClient {
    /// Connect to the interface and start pumping events into `debugger`.
    pub async fn connect(addr: SocketAddr, debugger: Arc<Debugger>) -> io::Result<InterfaceClient> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        tracing::info!(target: "uscript.dap", %addr, "connected to debugger interface");

        let (reader, writer) = stream.into_split();
        let queue = Arc::new(SendQueue::new());
        let wake = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        tokio::spawn(read_loop(reader, debugger, shutdown.clone()));
        tokio::spawn(write_loop(
            writer,
            queue.clone(),
            wake.clone(),
            shutdown.clone(),
        ));

        Ok(InterfaceClient {
            queue,
            wake,
            shutdown,
        })
    }

    /// Queue a command; wakes the writer when it was idle.
    pub fn send(&self, command: &Command) {
        tracing::debug!(target: "uscript.dap", ?command, "sending command");
        if self.queue.push(command.encode()) {
            self.wake.notify_one();
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.wake.notify_one();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

async fn read_loop(mut reader: OwnedReadHalf, debugger: Arc<Debugger>, shutdown: CancellationToken) {
    loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => return,
            read = read_frame(&mut reader) => read,
        };

        match read {
            Ok(Some(body)) => match Event::decode(&body) {
                Ok(event) => debugger.handle_event(event),
                Err(err) => {
                    tracing::error!(target: "uscript.dap", %err, "event decode failed");
                    break;
                }
            },
            Ok(None) => {
                tracing::info!(target: "uscript.dap", "interface closed the connection");
                break;
            }
            Err(err) => {
                tracing::error!(target: "uscript.dap", %err, "event read failed");
                break;
            }
        }
    }

    debugger.notify_terminated();
    shutdown.cancel();
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    queue: Arc<SendQueue>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
) {
    loop {
        let wakeup = wake.notified();
        if let Some(message) = queue.front() {
            if let Err(err) = write_frame(&mut writer, &message).await {
                tracing::error!(target: "uscript.dap", %err, "command write failed");
                shutdown.cancel();
                return;
            }
            queue.pop();
            continue;
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                // Flush what is queued; `stop_debugging` is typically the
                // last command and must still go out.
                while let Some(message) = queue.front() {
                    if write_frame(&mut writer, &message).await.is_err() {
                        return;
                    }
                    queue.pop();
                }
                return;
            }
            _ = wakeup => {}
        }
    }
}
