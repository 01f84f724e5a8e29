//! End-to-end behaviour of `ServerConnection` against loopback servers.

use std::time::Duration;

use dro_net::{
    ConnectionConfig, ConnectionEvent, ConnectionState, EventReceiver, Packet, ProtocolKind,
    ServerConnection, ServerDescriptor, TransportKind,
};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn tcp_server(port: u16) -> ServerDescriptor {
    ServerDescriptor::new("127.0.0.1", port, 0, ProtocolKind::Stream).named("tcp test")
}

fn ws_server(port: u16) -> ServerDescriptor {
    ServerDescriptor::new("127.0.0.1", 0, port, ProtocolKind::Message).named("ws test")
}

/// Pump the connection until it publishes something.
async fn next_event(
    connection: &mut ServerConnection,
    events: &mut EventReceiver,
) -> ConnectionEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(event) = events.try_recv() {
                return event;
            }
            connection.pump().await;
        }
    })
    .await
    .expect("timed out waiting for connection event")
}

/// Pump the connection for `duration` and return everything it published.
async fn collect_for(
    connection: &mut ServerConnection,
    events: &mut EventReceiver,
    duration: Duration,
) -> Vec<ConnectionEvent> {
    let deadline = Instant::now() + duration;
    while timeout_at(deadline, connection.pump()).await.is_ok() {}

    let mut published = Vec::new();
    while let Ok(event) = events.try_recv() {
        published.push(event);
    }
    published
}

async fn wait_for_state(
    connection: &mut ServerConnection,
    events: &mut EventReceiver,
    wanted: ConnectionState,
) {
    loop {
        if next_event(connection, events).await == ConnectionEvent::StateChanged(wanted) {
            return;
        }
    }
}

fn state(state: ConnectionState) -> ConnectionEvent {
    ConnectionEvent::StateChanged(state)
}

fn packet(packet: Packet) -> ConnectionEvent {
    ConnectionEvent::PacketReceived(packet)
}

#[tokio::test]
async fn test_stream_packets_survive_arbitrary_write_boundaries() {
    let (listener, port) = listener().await;
    let (mut connection, mut events) = ServerConnection::new(ConnectionConfig::default());

    connection.connect(tcp_server(port));
    let (mut server, _) = listener.accept().await.unwrap();

    assert_eq!(
        next_event(&mut connection, &mut events).await,
        state(ConnectionState::Connecting)
    );
    assert_eq!(
        next_event(&mut connection, &mut events).await,
        state(ConnectionState::Connected)
    );
    assert!(connection.is_connected());

    tokio::spawn(async move {
        for chunk in ["MS#test", "ing#1#%CT#4", "#", "%"] {
            server.write_all(chunk.as_bytes()).await.unwrap();
            server.flush().await.unwrap();
            sleep(Duration::from_millis(20)).await;
        }
        // Hold the socket until the test is done.
        sleep(Duration::from_secs(5)).await;
    });

    assert_eq!(
        next_event(&mut connection, &mut events).await,
        packet(Packet::new("MS", ["testing", "1"]))
    );
    assert_eq!(
        next_event(&mut connection, &mut events).await,
        packet(Packet::new("CT", ["4"]))
    );
}

#[tokio::test]
async fn test_message_transport_feeds_the_same_buffering() {
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        for text in ["MS#testing#1#%CT#", "4#%"] {
            socket.send(Message::Text(text.to_string().into())).await.unwrap();
        }
        while socket.next().await.is_some() {}
    });

    let (mut connection, mut events) = ServerConnection::new(ConnectionConfig::default());
    connection.connect(ws_server(port));
    assert_eq!(connection.transport_kind(), Some(TransportKind::Message));

    wait_for_state(&mut connection, &mut events, ConnectionState::Connected).await;
    assert_eq!(
        next_event(&mut connection, &mut events).await,
        packet(Packet::new("MS", ["testing", "1"]))
    );
    assert_eq!(
        next_event(&mut connection, &mut events).await,
        packet(Packet::new("CT", ["4"]))
    );
}

#[tokio::test]
async fn test_send_writes_encoded_packet_over_websocket() {
    let (listener, port) = listener().await;
    let (received_tx, mut received_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = socket.next().await {
            let _ = received_tx.send(message);
        }
    });

    let (mut connection, mut events) = ServerConnection::new(ConnectionConfig::default());
    connection.connect(ws_server(port));
    wait_for_state(&mut connection, &mut events, ConnectionState::Connected).await;

    connection.send(&Packet::new("CT", ["Naegi", "", "hello"]));

    let message = timeout(Duration::from_secs(5), received_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&message.into_data()[..], b"CT#Naegi##hello#%");
}

#[tokio::test]
async fn test_connect_timeout_settles_at_not_connected_once() {
    // Accepts TCP but never answers the WebSocket upgrade.
    let (listener, port) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        sleep(Duration::from_secs(10)).await;
        drop(stream);
    });

    let config = ConnectionConfig {
        connect_timeout: Duration::from_millis(200),
        ..ConnectionConfig::default()
    };
    let (mut connection, mut events) = ServerConnection::new(config);
    connection.connect(ws_server(port));

    let started = Instant::now();
    assert_eq!(
        next_event(&mut connection, &mut events).await,
        state(ConnectionState::Connecting)
    );
    assert_eq!(
        next_event(&mut connection, &mut events).await,
        state(ConnectionState::NotConnected)
    );
    assert!(started.elapsed() >= Duration::from_millis(150));

    let later = collect_for(&mut connection, &mut events, Duration::from_millis(400)).await;
    assert!(
        later.is_empty(),
        "unexpected events after timeout: {later:?}"
    );
    assert_eq!(connection.state(), ConnectionState::NotConnected);
    assert_eq!(connection.transport_kind(), None);
}

#[tokio::test]
async fn test_disconnect_right_after_connect_leaves_nothing_live() {
    let (listener, port) = listener().await;
    let (mut connection, mut events) = ServerConnection::new(ConnectionConfig::default());

    connection.connect(tcp_server(port));
    connection.disconnect();

    let _accepted = timeout(Duration::from_millis(500), listener.accept()).await;
    let published = collect_for(&mut connection, &mut events, Duration::from_millis(300)).await;

    assert!(published.is_empty(), "stale events leaked: {published:?}");
    assert_eq!(connection.state(), ConnectionState::NotConnected);
    assert!(!connection.is_connected());
    assert_eq!(connection.transport_kind(), None);
}

#[tokio::test]
async fn test_switching_protocol_tears_down_previous_transport() {
    let (ws_listener, ws_port) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = ws_listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        // Keep talking until the client goes away.
        loop {
            if socket.send(Message::Text("OLD#%".to_string().into())).await.is_err() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    });
    let (tcp_listener, tcp_port) = listener().await;

    let (mut connection, mut events) = ServerConnection::new(ConnectionConfig::default());
    connection.connect(ws_server(ws_port));
    wait_for_state(&mut connection, &mut events, ConnectionState::Connected).await;
    while events.try_recv().is_ok() {}

    connection.connect(tcp_server(tcp_port));
    assert_eq!(connection.transport_kind(), Some(TransportKind::Stream));
    let (mut tcp, _) = tcp_listener.accept().await.unwrap();

    assert_eq!(
        next_event(&mut connection, &mut events).await,
        state(ConnectionState::NotConnected)
    );
    assert_eq!(
        next_event(&mut connection, &mut events).await,
        state(ConnectionState::Connecting)
    );
    assert_eq!(
        next_event(&mut connection, &mut events).await,
        state(ConnectionState::Connected)
    );

    tcp.write_all(b"NEW#1#%").await.unwrap();
    let published = collect_for(&mut connection, &mut events, Duration::from_millis(300)).await;
    assert_eq!(published, vec![packet(Packet::new("NEW", ["1"]))]);
}

#[tokio::test]
async fn test_remote_close_reports_error_then_disconnects() {
    let (listener, port) = listener().await;
    let (mut connection, mut events) = ServerConnection::new(ConnectionConfig::default());

    connection.connect(tcp_server(port));
    let (mut server, _) = listener.accept().await.unwrap();
    wait_for_state(&mut connection, &mut events, ConnectionState::Connected).await;

    server.write_all(b"BB#bye#%").await.unwrap();
    drop(server);

    assert_eq!(
        next_event(&mut connection, &mut events).await,
        packet(Packet::new("BB", ["bye"]))
    );
    match next_event(&mut connection, &mut events).await {
        ConnectionEvent::SocketError(message) => {
            assert!(message.starts_with("Server<tcp test (127.0.0.1:"), "{message}");
            assert!(message.ends_with("error: the remote host closed the connection"));
        }
        other => panic!("expected socket error, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut connection, &mut events).await,
        state(ConnectionState::NotConnected)
    );
    assert!(!connection.is_connected());
}

#[tokio::test]
async fn test_refused_connection_reports_error() {
    let (listener, port) = listener().await;
    drop(listener);
    let (mut connection, mut events) = ServerConnection::new(ConnectionConfig::default());

    connection.connect(tcp_server(port));

    assert_eq!(
        next_event(&mut connection, &mut events).await,
        state(ConnectionState::Connecting)
    );
    assert!(matches!(
        next_event(&mut connection, &mut events).await,
        ConnectionEvent::SocketError(_)
    ));
    assert_eq!(
        next_event(&mut connection, &mut events).await,
        state(ConnectionState::NotConnected)
    );
}

#[tokio::test]
async fn test_send_while_disconnected_never_reaches_a_transport() {
    let (listener, port) = listener().await;
    let (mut connection, mut events) = ServerConnection::new(ConnectionConfig::default());

    // Connecting but not yet connected: the packet must not be queued.
    connection.connect(tcp_server(port));
    connection.send(&Packet::new("CT", ["early"]));
    let (mut server, _) = listener.accept().await.unwrap();
    wait_for_state(&mut connection, &mut events, ConnectionState::Connected).await;

    connection.send(&Packet::new("CT", ["late"]));
    let mut received = vec![0u8; "CT#late#%".len()];
    server.read_exact(&mut received).await.unwrap();
    assert_eq!(received, b"CT#late#%");
}

#[tokio::test]
async fn test_reconnect_to_same_server_starts_fresh() {
    let (listener, port) = listener().await;
    let (mut connection, mut events) = ServerConnection::new(ConnectionConfig::default());

    connection.connect(tcp_server(port));
    let (mut first, _) = listener.accept().await.unwrap();
    wait_for_state(&mut connection, &mut events, ConnectionState::Connected).await;
    // Leave a partial unit in the receive buffer.
    first.write_all(b"MS#half").await.unwrap();
    let _ = collect_for(&mut connection, &mut events, Duration::from_millis(100)).await;

    connection.connect(tcp_server(port));
    let (mut second, _) = listener.accept().await.unwrap();
    wait_for_state(&mut connection, &mut events, ConnectionState::Connected).await;

    second.write_all(b"CT#4#%").await.unwrap();
    assert_eq!(
        next_event(&mut connection, &mut events).await,
        packet(Packet::new("CT", ["4"]))
    );

    // The first socket is shut down by the client.
    let mut buf = [0u8; 1];
    let closed = timeout(Duration::from_secs(5), first.read(&mut buf)).await.unwrap();
    assert!(matches!(closed, Ok(0) | Err(_)));
}
