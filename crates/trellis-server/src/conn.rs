//! Message-level adapter over one WebSocket connection.
//!
//! Converts frames to application messages on the way in and messages
//! to Binary frames on the way out, with the transform pipeline applied
//! on both paths. The transport is split into independent read and
//! write halves so one connection supports one reader plus one writer
//! concurrently; a pending read never blocks a write. The adapter has
//! no internal locking beyond that: callers must keep to one reader
//! and one writer per connection.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::ws::{Message as Frame, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{timeout_at, Instant};
use tracing::error;

use trellis_core::{Message, MessagePool, Transform};

/// One adapted WebSocket connection.
pub struct Conn {
    reader: ConnReader,
    writer: ConnWriter,
}

impl Conn {
    pub fn new(socket: WebSocket, transform: Arc<dyn Transform>, pool: Arc<dyn MessagePool>) -> Self {
        let (sink, stream) = socket.split();
        Self {
            reader: ConnReader {
                stream,
                transform: Arc::clone(&transform),
                pool,
                read_deadline: None,
            },
            writer: ConnWriter {
                sink,
                transform,
                buf: Vec::new(),
                frames_sent: 0,
            },
        }
    }

    /// Read one frame and turn it into an application message.
    ///
    /// `Ok(None)` means a control frame arrived and the caller should
    /// retry. A Close frame or stream end is `ConnError::Closed`. An
    /// empty Text/Binary payload is a hard `ConnError::EndOfStream`,
    /// and a failing `Message::reset` propagates as `ConnError::Parse`.
    pub async fn read_message(&mut self) -> Result<Option<Box<dyn Message>>, ConnError> {
        self.reader.read_message().await
    }

    /// Serialize `msg` and send it as one Binary frame.
    ///
    /// A message that serializes to zero bytes is a silent no-op: no
    /// transport write happens. Receivers distinguish content by the
    /// message body, never by the frame type.
    pub async fn write_message(&mut self, msg: &dyn Message) -> Result<(), ConnError> {
        self.writer.write_message(msg).await
    }

    /// Set the read deadline. There is no separate write deadline; the
    /// single combined timeout applies to reads only.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.reader.set_deadline(deadline);
    }

    /// Number of frames actually written to the transport.
    pub fn frames_sent(&self) -> u64 {
        self.writer.frames_sent()
    }

    /// Split into the two halves so a reader and a writer can run
    /// concurrently on the same connection.
    pub fn split(self) -> (ConnReader, ConnWriter) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("read_deadline", &self.reader.read_deadline)
            .field("frames_sent", &self.writer.frames_sent)
            .finish()
    }
}

/// Inbound half: frames in, application messages out.
pub struct ConnReader {
    stream: SplitStream<WebSocket>,
    transform: Arc<dyn Transform>,
    pool: Arc<dyn MessagePool>,
    read_deadline: Option<Instant>,
}

impl ConnReader {
    pub async fn read_message(&mut self) -> Result<Option<Box<dyn Message>>, ConnError> {
        let frame = self.next_frame().await?;
        match frame {
            Frame::Close(_) => Err(ConnError::Closed),
            Frame::Ping(_) | Frame::Pong(_) => Ok(None),
            Frame::Text(text) => self.accept_payload(text.into_bytes()).map(Some),
            Frame::Binary(data) => self.accept_payload(data).map(Some),
        }
    }

    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.read_deadline = deadline;
    }

    async fn next_frame(&mut self) -> Result<Frame, ConnError> {
        let received = match self.read_deadline {
            Some(at) => timeout_at(at, self.stream.next())
                .await
                .map_err(|_| ConnError::DeadlineExceeded)?,
            None => self.stream.next().await,
        };
        match received {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(err)) => {
                error!("websocket transport error: {err}");
                Err(ConnError::Transport(err))
            }
            None => Err(ConnError::Closed),
        }
    }

    fn accept_payload(&self, wire: Vec<u8>) -> Result<Box<dyn Message>, ConnError> {
        if wire.is_empty() {
            return Err(ConnError::EndOfStream);
        }
        let app = self.transform.encode(&wire).map_err(ConnError::Transform)?;
        let mut msg = self.pool.acquire();
        msg.reset(&app).map_err(ConnError::Parse)?;
        Ok(msg)
    }
}

/// Outbound half: application messages in, Binary frames out.
pub struct ConnWriter {
    sink: SplitSink<WebSocket, Frame>,
    transform: Arc<dyn Transform>,
    /// Reusable output buffer, cleared on every write exit path.
    buf: Vec<u8>,
    frames_sent: u64,
}

impl ConnWriter {
    pub async fn write_message(&mut self, msg: &dyn Message) -> Result<(), ConnError> {
        let result = self.write_buffered(msg).await;
        self.buf.clear();
        result
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    async fn write_buffered(&mut self, msg: &dyn Message) -> Result<(), ConnError> {
        msg.serialize(&mut self.buf).map_err(|err| {
            error!("message serialize failed: {err}");
            ConnError::Serialize(err)
        })?;
        if self.buf.is_empty() {
            return Ok(());
        }
        let wire = self.transform.decode(&self.buf).map_err(|err| {
            error!("outbound transform failed: {err}");
            ConnError::Transform(err)
        })?;
        self.sink.send(Frame::Binary(wire)).await?;
        self.frames_sent += 1;
        Ok(())
    }
}

// The adapter is message oriented, not a byte stream. These impls are
// inert (zero bytes, no error) and exist only to satisfy interfaces
// shaped around generic streams.
impl AsyncRead for Conn {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for Conn {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(0))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Connection-level errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Close frame received or the transport ended; terminal.
    #[error("connection closed")]
    Closed,
    /// Empty payload on a data frame; end of stream, not a message.
    #[error("end of stream")]
    EndOfStream,
    #[error("read deadline exceeded")]
    DeadlineExceeded,
    /// Transform hook failed; the connection stays open.
    #[error("transform failed: {0}")]
    Transform(#[source] anyhow::Error),
    #[error("message reset failed: {0}")]
    Parse(#[source] anyhow::Error),
    #[error("message serialize failed: {0}")]
    Serialize(#[source] anyhow::Error),
    #[error("websocket transport error: {0}")]
    Transport(#[from] axum::Error),
}

impl ConnError {
    /// True for errors that end the connection's read path.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnError::Closed | ConnError::EndOfStream)
    }
}
