use std::ffi::{c_void, CString};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use uscript_wire::{Event, SendQueue, Watch, WATCH_KIND_COUNT};

pub use uscript_wire::{default_port, DEFAULT_PORT, PORT_ENV_VAR};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Not running, or torn down after an error. Any interaction with the
    /// service will destroy whatever is left and start a new one.
    Stopped,
    /// Listening, no client connected yet.
    Disconnected,
    /// Connected to a debug client.
    Connected,
    /// The client (or the host, via the detach log line) requested shutdown.
    /// The service is stopped and must not be restarted.
    Shutdown,
}

/// Lock-free view of the service state, readable from any thread.
pub struct StateCell(AtomicU8);

impl StateCell {
    pub const fn new(state: ServiceState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> ServiceState {
        match self.0.load(Ordering::SeqCst) {
            0 => ServiceState::Stopped,
            1 => ServiceState::Disconnected,
            2 => ServiceState::Connected,
            _ => ServiceState::Shutdown,
        }
    }

    pub fn set(&self, state: ServiceState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

static GLOBAL_STATE: StateCell = StateCell::new(ServiceState::Stopped);

/// Current state of the process-wide service.
pub fn state() -> ServiceState {
    GLOBAL_STATE.get()
}

// The callback function provided by Unreal. It is set once by `SetCallback`
// and invoked from whichever thread handles inbound commands.
type UnrealCallback = unsafe extern "C" fn(*const std::ffi::c_char);

static CALLBACK: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());

pub(crate) fn set_callback(cb: *mut c_void) {
    CALLBACK.store(cb, Ordering::SeqCst);
}

/// Hand a command string to Unreal through the registered callback.
pub(crate) fn invoke_callback(command: &str) {
    let ptr = CALLBACK.load(Ordering::SeqCst);
    if ptr.is_null() {
        tracing::warn!(target: "uscript.interface", command, "dropping command: no callback registered");
        return;
    }
    let Ok(cstr) = CString::new(command) else {
        tracing::warn!(target: "uscript.interface", command, "dropping command: interior NUL");
        return;
    };
    let callback: UnrealCallback = unsafe { std::mem::transmute(ptr) };
    unsafe { callback(cstr.as_ptr()) };
}

/// Mutable watch-batching state, shared between the host threads that invoke
/// entry points and the I/O task (which flips `send_watch_info` when handling
/// `toggle_watch_info` commands).
pub(crate) struct WatchState {
    /// Next index to assign per watch kind; reset to 1 by `clear_a_watch`.
    pub indices: [i32; WATCH_KIND_COUNT],
    /// Batches accumulating between a `lock_list` and its `unlock_list`.
    pub pending: [Option<Vec<Watch>>; WATCH_KIND_COUNT],
    /// When false, all watch traffic is suppressed on the wire. Indices keep
    /// advancing so the values returned to Unreal stay consistent.
    pub send_watch_info: bool,
}

impl Default for WatchState {
    fn default() -> Self {
        Self {
            indices: [1; WATCH_KIND_COUNT],
            pending: Default::default(),
            send_watch_info: true,
        }
    }
}

/// A running debugger service: the listener, the I/O worker thread, and the
/// outgoing event queue. Exactly one exists at a time in production, owned by
/// the module-level slot behind [`check_service`].
pub struct Service {
    state: &'static StateCell,
    local_addr: SocketAddr,
    pub(crate) queue: Arc<SendQueue>,
    pub(crate) wake: Arc<Notify>,
    pub(crate) watch: Arc<Mutex<WatchState>>,
    cancel: CancellationToken,
    worker: Option<thread::JoinHandle<()>>,
}

impl Service {
    /// Bind the listener and spawn the I/O worker against the process-wide
    /// state cell; the state moves to `Disconnected` on success.
    pub fn bind(port: u16) -> io::Result<Service> {
        Self::bind_with_state(port, &GLOBAL_STATE)
    }

    /// Bind against a fresh state cell instead of the process-wide one so
    /// multiple services can coexist inside one test process.
    pub fn bind_isolated(port: u16) -> io::Result<Service> {
        let state: &'static StateCell = Box::leak(Box::new(StateCell::new(ServiceState::Stopped)));
        Self::bind_with_state(port, state)
    }

    fn bind_with_state(port: u16, state: &'static StateCell) -> io::Result<Service> {
        init_tracing();

        let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, port))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let queue = Arc::new(SendQueue::new());
        let wake = Arc::new(Notify::new());
        let watch = Arc::new(Mutex::new(WatchState::default()));
        let cancel = CancellationToken::new();

        let worker = thread::Builder::new().name("uscript-dbg-io".into()).spawn({
            let queue = queue.clone();
            let wake = wake.clone();
            let watch = watch.clone();
            let cancel = cancel.clone();
            move || crate::io::run_reactor(listener, state, queue, wake, watch, cancel)
        })?;

        state.set(ServiceState::Disconnected);
        tracing::info!(target: "uscript.interface", %local_addr, "debugger service listening");

        Ok(Service {
            state,
            local_addr,
            queue,
            wake,
            watch,
            cancel,
            worker: Some(worker),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ServiceState {
        self.state.get()
    }

    /// Queue an event for the client. If the queue was idle this wakes the
    /// writer; otherwise a send is already in flight and will chain into this
    /// one.
    pub(crate) fn send_event(&self, event: &Event) {
        tracing::trace!(target: "uscript.interface", ?event, "queueing event");
        if self.queue.push(event.encode()) {
            self.wake.notify_one();
        }
    }

    /// Host-initiated shutdown: tell the client the session is over and mark
    /// the service unrestartable. The queued `terminated` event is drained by
    /// the writer before the reactor exits.
    pub fn begin_shutdown(&self) {
        tracing::info!(target: "uscript.interface", "debugger detached, shutting down service");
        self.send_event(&Event::Terminated);
        self.state.set(ServiceState::Shutdown);
    }

    /// Stop the reactor and reclaim the worker. Safe to call more than once.
    /// When invoked from the worker itself (a fatal error path), the join is
    /// skipped and the thread unwinds on its own.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.wake.notify_one();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == thread::current().id() {
                return;
            }
            let _ = worker.join();
        }
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop();
    }
}

static SERVICE: Mutex<Option<Service>> = Mutex::new(None);

/// Gate called at the top of every entry point. Returns true only when a
/// client is connected; otherwise it advances the state machine: a stopped
/// service is destroyed and relaunched, a shut-down service is destroyed for
/// good.
pub fn check_service() -> bool {
    match state() {
        ServiceState::Connected => true,
        ServiceState::Disconnected => false,
        ServiceState::Stopped => {
            let mut slot = SERVICE.lock().unwrap_or_else(|e| e.into_inner());
            // Another entry point may have restarted the service while we
            // waited for the slot.
            if GLOBAL_STATE.get() != ServiceState::Stopped {
                return GLOBAL_STATE.get() == ServiceState::Connected;
            }
            if let Some(mut old) = slot.take() {
                old.stop();
            }
            match Service::bind(default_port()) {
                Ok(service) => *slot = Some(service),
                Err(err) => {
                    tracing::error!(target: "uscript.interface", %err, "failed to start debugger service");
                }
            }
            false
        }
        ServiceState::Shutdown => {
            let mut slot = SERVICE.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(mut old) = slot.take() {
                old.stop();
            }
            false
        }
    }
}

/// Run `f` against the live service when one is connected; drops the call
/// otherwise (after letting `check_service` attempt recovery).
pub(crate) fn with_service<R>(f: impl FnOnce(&Service) -> R) -> Option<R> {
    if !check_service() {
        return None;
    }
    let slot = SERVICE.lock().unwrap_or_else(|e| e.into_inner());
    slot.as_ref().map(f)
}

/// Address the process-wide service is listening on, if it exists.
pub fn local_addr() -> Option<SocketAddr> {
    let slot = SERVICE.lock().unwrap_or_else(|e| e.into_inner());
    slot.as_ref().map(|s| s.local_addr())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    // The host process may have no console and certainly has no subscriber of
    // its own; install one on first use and ignore failure if something beat
    // us to it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
