//! TCP byte-stream transport.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, lookup_host};
use tokio::sync::mpsc;

use super::{
    EventSink, Link, SocketState, TaskContext, TransportError, TransportEvent, TransportOptions,
    shutdown_requested,
};

/// Handle to a TCP transport task.
#[derive(Debug)]
pub struct StreamTransport {
    pub(super) link: Link,
}

impl StreamTransport {
    /// Spawn the task connecting to `address:port`.
    pub fn open(
        address: &str,
        port: u16,
        generation: u64,
        events: mpsc::UnboundedSender<TransportEvent>,
        options: TransportOptions,
    ) -> Self {
        let address = address.to_owned();
        let link = Link::spawn(generation, events, options, move |context| {
            run(address, port, context)
        });
        Self { link }
    }
}

async fn run(address: String, port: u16, context: TaskContext) {
    let TaskContext {
        sink,
        mut outbound,
        mut shutdown,
        options,
    } = context;

    sink.state(SocketState::HostLookup);
    let connected = tokio::select! {
        result = establish(&address, port, &sink) => result,
        _ = shutdown_requested(&mut shutdown) => {
            sink.state(SocketState::Unconnected);
            return;
        }
    };

    let stream = match connected {
        Ok(stream) => stream,
        Err(error) => {
            sink.error(error);
            sink.state(SocketState::Unconnected);
            return;
        }
    };

    if options.tcp_nodelay
        && let Err(error) = stream.set_nodelay(true)
    {
        tracing::debug!("failed to set TCP_NODELAY: {error}");
    }
    sink.state(SocketState::Connected);

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; options.read_buffer_size.max(1)];

    loop {
        tokio::select! {
            result = reader.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        sink.error(TransportError::Closed);
                        break;
                    }
                    Ok(n) => sink.data(buf[..n].to_vec()),
                    Err(error) => {
                        sink.error(TransportError::Io(error));
                        break;
                    }
                }
            }
            Some(bytes) = outbound.recv() => {
                if let Err(error) = writer.write_all(&bytes).await {
                    sink.error(TransportError::Io(error));
                    break;
                }
            }
            _ = shutdown_requested(&mut shutdown) => {
                sink.state(SocketState::Closing);
                // Flush anything queued before the close request.
                while let Ok(bytes) = outbound.try_recv() {
                    if writer.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                let _ = writer.shutdown().await;
                break;
            }
        }
    }

    sink.state(SocketState::Unconnected);
}

/// Resolve `address` and connect to the first address that accepts.
async fn establish(
    address: &str,
    port: u16,
    sink: &EventSink,
) -> Result<TcpStream, TransportError> {
    let candidates: Vec<SocketAddr> = lookup_host((address, port))
        .await
        .map_err(TransportError::Resolve)?
        .collect();
    if candidates.is_empty() {
        return Err(TransportError::HostNotFound(address.to_owned()));
    }

    sink.state(SocketState::Connecting);

    let mut last_error = TransportError::HostNotFound(address.to_owned());
    for candidate in candidates {
        match TcpStream::connect(candidate).await {
            Ok(stream) => return Ok(stream),
            Err(error) => {
                tracing::debug!("connect to {candidate} failed: {error}");
                last_error = TransportError::Connect(error);
            }
        }
    }
    Err(last_error)
}
