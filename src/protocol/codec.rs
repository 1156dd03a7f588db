//! Line-delimited JSON framing over TCP.
//!
//! Each frame is one `Message` serialized with `serde_json` and terminated by `\n`.

use super::types::Message;
use crate::error::{ClusterError, Result};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec};

/// Upper bound on a single frame; segment payloads can be large.
pub const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

type Transport = Framed<TcpStream, LinesCodec>;

pub fn encode(message: &Message) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode(line: &str) -> Result<Message> {
    Ok(serde_json::from_str(line)?)
}

/// A framed connection used for both request/response and long-lived sessions.
pub struct Connection {
    framed: Transport,
    peer: String,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            framed: Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH)),
            peer,
        }
    }

    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| ClusterError::connection_lost(addr, e))?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let line = encode(message)?;
        self.framed.send(line).await?;
        Ok(())
    }

    /// `Ok(None)` means the peer closed the stream cleanly.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        match self.framed.next().await {
            Some(Ok(line)) => decode(&line).map(Some),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Splits into independently owned halves so one task can read while
    /// another writes.
    pub fn split(self) -> (MessageWriter, MessageReader) {
        let (sink, stream) = self.framed.split();
        (
            MessageWriter {
                sink,
                peer: self.peer.clone(),
            },
            MessageReader {
                stream,
                peer: self.peer,
            },
        )
    }
}

pub struct MessageWriter {
    sink: SplitSink<Transport, String>,
    peer: String,
}

impl MessageWriter {
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let line = encode(message)?;
        self.sink.send(line).await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}

pub struct MessageReader {
    stream: SplitStream<Transport>,
    peer: String,
}

impl MessageReader {
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn recv(&mut self) -> Result<Option<Message>> {
        match self.stream.next().await {
            Some(Ok(line)) => decode(&line).map(Some),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

/// Drains `outbound` into `writer` until every sender is dropped or a write
/// fails, then closes the sink.
///
/// Senders never wait on the socket: backpressure from a slow peer stays
/// inside this task.
pub fn spawn_writer(
    mut writer: MessageWriter,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if let Err(e) = writer.send(&message).await {
                tracing::warn!(
                    "Failed to write {} to {}: {}",
                    message.type_name(),
                    writer.peer,
                    e
                );
                break;
            }
        }
        let _ = writer.close().await;
        tracing::debug!("Writer for {} finished", writer.peer);
    })
}
