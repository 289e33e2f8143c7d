use std::ffi::{c_char, c_void, CStr};
use std::sync::Mutex;
use std::time::Duration;

use tokio::net::TcpStream;

use uscript_interface::{entry, Service, ServiceState};
use uscript_wire::{read_frame, write_frame, Command, Event};

pub const TIMEOUT: Duration = Duration::from_secs(10);

// One process-wide recorder stands in for Unreal's callback. Tests share it
// (the callback pointer is process state), so assertions filter for the
// strings the test itself produced.
static RECORDED: Mutex<Vec<String>> = Mutex::new(Vec::new());

unsafe extern "C" fn record_callback(text: *const c_char) {
    let text = CStr::from_ptr(text).to_string_lossy().into_owned();
    RECORDED.lock().unwrap().push(text);
}

/// Route the Unreal callback into the shared recorder.
pub fn install_recorder() {
    let callback: unsafe extern "C" fn(*const c_char) = record_callback;
    entry::SetCallback(callback as usize as *mut c_void);
}

pub fn recorded() -> Vec<String> {
    RECORDED.lock().unwrap().clone()
}

/// Wait until the recorder holds a command string matching `pred`.
pub async fn wait_for_callback(pred: impl Fn(&str) -> bool) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if recorded().iter().any(|c| pred(c)) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for callback, recorded so far: {:?}",
            recorded()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_state(service: &Service, want: ServiceState) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while service.state() != want {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for service state {want:?}, still {:?}",
            service.state()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Connect a debug-client socket and wait until the service observed it.
pub async fn connect(service: &Service) -> TcpStream {
    let stream = TcpStream::connect(service.local_addr())
        .await
        .expect("connect to service");
    stream.set_nodelay(true).ok();
    wait_for_state(service, ServiceState::Connected).await;
    stream
}

pub async fn read_event(stream: &mut TcpStream) -> Event {
    let body = tokio::time::timeout(TIMEOUT, read_frame(stream))
        .await
        .expect("timed out reading event")
        .expect("read event frame")
        .expect("connection closed while waiting for event");
    Event::decode(&body).expect("decode event")
}

pub async fn send_command(stream: &mut TcpStream, command: &Command) {
    write_frame(stream, &command.encode())
        .await
        .expect("write command frame");
}
