//! WebSocket message transport.
//!
//! Every inbound text or binary message is forwarded as one data chunk.
//! Message boundaries are not protocol-unit boundaries; the receive buffer
//! reassembles units exactly as it does for the stream transport.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::{
    Link, SocketState, TaskContext, TransportError, TransportEvent, TransportOptions,
    shutdown_requested,
};

/// Handle to a WebSocket transport task.
#[derive(Debug)]
pub struct MessageTransport {
    pub(super) link: Link,
}

impl MessageTransport {
    /// Spawn the task opening `ws://address:port`.
    pub fn open(
        address: &str,
        port: u16,
        generation: u64,
        events: mpsc::UnboundedSender<TransportEvent>,
        options: TransportOptions,
    ) -> Self {
        let url = format!("ws://{address}:{port}");
        let link = Link::spawn(generation, events, options, move |context| run(url, context));
        Self { link }
    }
}

async fn run(url: String, context: TaskContext) {
    let TaskContext {
        sink,
        mut outbound,
        mut shutdown,
        ..
    } = context;

    tracing::debug!("opening {url}");
    sink.state(SocketState::Connecting);

    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = shutdown_requested(&mut shutdown) => {
            sink.state(SocketState::Unconnected);
            return;
        }
    };

    let socket = match connected {
        Ok((socket, _response)) => socket,
        Err(error) => {
            sink.error(TransportError::WebSocket(error));
            sink.state(SocketState::Unconnected);
            return;
        }
    };
    sink.state(SocketState::Connected);

    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            message = read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => sink.data(text.as_bytes().to_vec()),
                    Some(Ok(Message::Binary(bytes))) => sink.data(bytes.to_vec()),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "server closed the websocket");
                        break;
                    }
                    // Ping/pong are answered by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        sink.error(TransportError::WebSocket(error));
                        break;
                    }
                    None => break,
                }
            }
            Some(bytes) = outbound.recv() => {
                if let Err(error) = write.send(Message::Binary(bytes.into())).await {
                    sink.error(TransportError::WebSocket(error));
                    break;
                }
            }
            _ = shutdown_requested(&mut shutdown) => {
                sink.state(SocketState::Closing);
                while let Ok(bytes) = outbound.try_recv() {
                    if write.send(Message::Binary(bytes.into())).await.is_err() {
                        break;
                    }
                }
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: String::new().into(),
                };
                let _ = write.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }

    sink.state(SocketState::Unconnected);
}
