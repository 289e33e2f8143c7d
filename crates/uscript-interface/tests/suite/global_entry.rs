//! The one test that exercises the process-wide entry points end to end:
//! restart after a protocol error and the magic-log-line shutdown. It is a
//! single test because the entry points, the service slot, and the
//! `ShowDllForm` first-call flag are process state.

use std::ffi::CString;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::util::{install_recorder, TIMEOUT};

use uscript_interface::service::{self, PORT_ENV_VAR};
use uscript_interface::{entry, ServiceState, DETACH_LOG_LINE};
use uscript_wire::{read_frame, Event, Watch, WatchKind};

fn cstring(s: &str) -> CString {
    CString::new(s).unwrap()
}

async fn wait_global_state(want: ServiceState) {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while service::state() != want {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for global state {want:?}, still {:?}",
            service::state()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn read_global_event(stream: &mut TcpStream) -> Event {
    let body = tokio::time::timeout(TIMEOUT, read_frame(stream))
        .await
        .expect("timed out reading event")
        .expect("read event frame")
        .expect("connection closed while waiting for event");
    Event::decode(&body).expect("decode event")
}

#[tokio::test]
async fn entry_points_drive_the_whole_lifecycle() {
    // An ephemeral port keeps the test isolated from anything real on 10077.
    std::env::set_var(PORT_ENV_VAR, "0");
    install_recorder();

    // First touch: stopped -> a fresh service comes up listening, the call
    // itself is dropped.
    entry::ShowDllForm();
    assert_eq!(service::state(), ServiceState::Disconnected);
    let addr = service::local_addr().expect("service bound");

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.set_nodelay(true).ok();
    wait_global_state(ServiceState::Connected).await;

    // The first ShowDllForm that reaches the service is the initialization
    // signal and is swallowed; the break sequence after it flows through.
    entry::ShowDllForm();
    entry::ClearHierarchy();
    entry::EditorLoadClass(cstring("MyGame.PlayerController").as_ptr());
    entry::EditorGotoLine(42, 1);
    entry::LockList(0);
    assert_eq!(
        entry::AddAWatch(
            0,
            -1,
            cstring("i ( Int, 0x0 )").as_ptr(),
            cstring("5").as_ptr()
        ),
        1
    );
    entry::UnlockList(0);
    entry::CallStackClear();
    entry::CallStackAdd(cstring("Function MyGame.PlayerController:Update").as_ptr());
    entry::ShowDllForm();

    assert_eq!(read_global_event(&mut stream).await, Event::ClearHierarchy);
    assert_eq!(
        read_global_event(&mut stream).await,
        Event::EditorLoadClass {
            class_name: "MyGame.PlayerController".into()
        }
    );
    assert_eq!(
        read_global_event(&mut stream).await,
        Event::EditorGotoLine {
            line: 42,
            highlight: true
        }
    );
    assert_eq!(
        read_global_event(&mut stream).await,
        Event::LockList {
            kind: WatchKind::Local
        }
    );
    assert_eq!(
        read_global_event(&mut stream).await,
        Event::UnlockList {
            kind: WatchKind::Local,
            watches: vec![Watch {
                parent: -1,
                index: 1,
                name: "i ( Int, 0x0 )".into(),
                value: "5".into(),
            }],
        }
    );
    assert_eq!(read_global_event(&mut stream).await, Event::CallStackClear);
    assert_eq!(
        read_global_event(&mut stream).await,
        Event::CallStackAdd {
            entry: "Function MyGame.PlayerController:Update".into()
        }
    );
    assert_eq!(read_global_event(&mut stream).await, Event::ShowDllForm);

    // Protocol failure: a garbage frame kills the connection, the service
    // stops, and the next entry point restarts it from scratch.
    stream.write_all(&1u32.to_le_bytes()).await.unwrap();
    stream.write_all(&[0xEE]).await.unwrap();
    stream.flush().await.unwrap();
    drop(stream);
    wait_global_state(ServiceState::Stopped).await;

    entry::BuildHierarchy(); // dropped, but it restarts the service
    assert_eq!(service::state(), ServiceState::Disconnected);
    let addr = service::local_addr().expect("service bound after restart");

    let mut stream = TcpStream::connect(addr).await.expect("reconnect");
    stream.set_nodelay(true).ok();
    wait_global_state(ServiceState::Connected).await;

    // Host-initiated detach: the magic log line is forwarded, followed by
    // terminated, and the service shuts down for good.
    entry::AddLineToLog(cstring(DETACH_LOG_LINE).as_ptr());

    assert_eq!(
        read_global_event(&mut stream).await,
        Event::AddLineToLog {
            text: DETACH_LOG_LINE.into()
        }
    );
    assert_eq!(read_global_event(&mut stream).await, Event::Terminated);
    assert_eq!(service::state(), ServiceState::Shutdown);
    assert!(
        service::local_addr().is_none(),
        "shutdown destroys the service"
    );

    // Shut down means shut down: further entry points never restart it.
    entry::ClearHierarchy();
    assert_eq!(service::state(), ServiceState::Shutdown);
    assert!(service::local_addr().is_none());
}
