//! Per-connection I/O handle.
//!
//! A connection is split in two. The reader half is owned by whichever
//! activity currently drives the client (the session, then the match receive
//! activity). Outgoing messages go through a cloneable [`Outbound`] into an
//! unbounded queue drained by one writer task, so frames never interleave and
//! senders never wait on a slow client.

use log::{debug, error, warn};
use shared::{read_envelope, write_envelope, Envelope, ProtocolError, ServerMessage};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub type ConnectionId = u32;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Sending side of a connection.
#[derive(Debug, Clone)]
pub struct Outbound {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl Outbound {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a message. Returns `false` once the writer has stopped.
    pub fn send(&self, message: &ServerMessage) -> bool {
        let envelope = match message.to_envelope() {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Connection {}: cannot encode {}: {}", self.id, message.tag(), e);
                return false;
            }
        };
        self.tx.send(envelope).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct Connection {
    id: ConnectionId,
    peer: String,
    reader: BoxedReader,
    outbound: Outbound,
}

impl Connection {
    /// Wraps a reader/writer pair and spawns the writer task.
    pub fn new<R, W>(id: ConnectionId, peer: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(id, writer, rx));

        Self {
            id,
            peer: peer.into(),
            reader: Box::new(reader),
            outbound: Outbound { id, tx },
        }
    }

    pub fn from_tcp(id: ConnectionId, stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Connection {}: failed to set TCP_NODELAY: {}", id, e);
        }

        let (reader, writer) = stream.into_split();
        Self::new(id, peer, reader, writer)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn recv(&mut self) -> Result<Envelope, ProtocolError> {
        read_envelope(&mut self.reader).await
    }

    pub fn send(&self, message: &ServerMessage) -> bool {
        self.outbound.send(message)
    }

    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }
}

/// Drains the outbound queue until every sender is dropped or a write fails.
/// Dropping the writer afterwards closes the write half.
async fn write_loop<W>(id: ConnectionId, mut writer: W, mut rx: mpsc::UnboundedReceiver<Envelope>)
where
    W: AsyncWrite + Send + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        if let Err(e) = write_envelope(&mut writer, &envelope).await {
            if e.is_disconnect() {
                debug!("Connection {}: peer went away while writing", id);
            } else {
                warn!("Connection {}: write failed: {}", id, e);
            }
            break;
        }
    }
    debug!("Connection {}: writer stopped", id);
}
