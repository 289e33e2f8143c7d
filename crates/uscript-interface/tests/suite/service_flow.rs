use super::util::{connect, read_event, wait_for_state, TIMEOUT};

use tokio::io::AsyncWriteExt;

use uscript_interface::{Service, ServiceState};
use uscript_wire::Event;

#[tokio::test]
async fn undecodable_command_stops_the_service() {
    let service = Service::bind_isolated(0).expect("bind");
    let mut stream = connect(&service).await;

    // A framed body with an unknown command kind is a protocol error, fatal
    // to the connection.
    stream.write_all(&1u32.to_le_bytes()).await.unwrap();
    stream.write_all(&[0xEE]).await.unwrap();
    stream.flush().await.unwrap();

    wait_for_state(&service, ServiceState::Stopped).await;
}

#[tokio::test]
async fn truncated_header_stops_the_service() {
    let service = Service::bind_isolated(0).expect("bind");
    let mut stream = connect(&service).await;

    // Two bytes of a four-byte length prefix, then EOF.
    stream.write_all(&[0x10, 0x00]).await.unwrap();
    stream.flush().await.unwrap();
    drop(stream);

    wait_for_state(&service, ServiceState::Stopped).await;
}

#[tokio::test]
async fn client_disconnect_stops_the_service() {
    let service = Service::bind_isolated(0).expect("bind");
    let stream = connect(&service).await;
    drop(stream);

    wait_for_state(&service, ServiceState::Stopped).await;
}

#[tokio::test]
async fn shutdown_drains_the_terminated_event() {
    let service = Service::bind_isolated(0).expect("bind");
    let mut stream = connect(&service).await;

    service.add_line_to_log("Log: something ordinary");
    service.begin_shutdown();

    assert_eq!(
        read_event(&mut stream).await,
        Event::AddLineToLog {
            text: "Log: something ordinary".into()
        }
    );
    assert_eq!(read_event(&mut stream).await, Event::Terminated);
    assert_eq!(service.state(), ServiceState::Shutdown);
}

#[tokio::test]
async fn second_connection_is_not_served_while_connected() {
    let service = Service::bind_isolated(0).expect("bind");
    let addr = service.local_addr();
    let mut stream = connect(&service).await;

    // The listener is gone once a client is accepted; a second connect must
    // not be served. Either the connect fails outright or the socket is dead.
    if let Ok(mut second) = tokio::net::TcpStream::connect(addr).await {
        use tokio::io::AsyncReadExt;
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(TIMEOUT, second.read(&mut buf)).await;
        assert!(
            matches!(read, Ok(Ok(0)) | Ok(Err(_))),
            "second connection should see EOF or an error"
        );
    }

    // The first connection keeps working.
    service.build_hierarchy();
    assert_eq!(read_event(&mut stream).await, Event::BuildHierarchy);
}
