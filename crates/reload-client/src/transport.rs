//! Transport boundary consumed by the reload manager, plus a Unix domain
//! socket implementation.
//!
//! # Wire format
//!
//! Length-prefixed frames: `[u32 LE length][u8 type][payload]`, where
//! `length` counts the type byte and the payload.

use std::{
    future::Future,
    io,
    sync::atomic::{AtomicBool, Ordering},
};

use reload_core::{LinkStatus, Message, TransportError};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::{
        UnixStream,
        unix::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

/// Largest accepted frame, type byte included.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Opens transport handles for a named channel.
pub trait Connector: Send + Sync + 'static {
    type Handle: TransportHandle;

    fn connect(
        &self,
        channel: &str,
    ) -> impl Future<Output = Result<Self::Handle, TransportError>> + Send;
}

/// An open bidirectional typed-message channel.
///
/// `read` and `write` may run concurrently from different tasks. `close` is
/// idempotent and makes a pending or future `read` fail with
/// [`TransportError::Closed`].
pub trait TransportHandle: Send + Sync + 'static {
    fn read(&self) -> impl Future<Output = Result<Message, TransportError>> + Send;

    fn write(&self, message: &Message) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn close(&self);

    fn status(&self) -> LinkStatus;
}

/// Connects to a watcher listening on a Unix domain socket path.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixSocketConnector;

impl Connector for UnixSocketConnector {
    type Handle = UnixSocketHandle;

    async fn connect(&self, channel: &str) -> Result<UnixSocketHandle, TransportError> {
        let stream = UnixStream::connect(channel)
            .await
            .map_err(TransportError::Connect)?;
        Ok(UnixSocketHandle::new(stream))
    }
}

#[derive(Debug)]
pub struct UnixSocketHandle {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    closed: CancellationToken,
    peer_gone: AtomicBool,
}

impl UnixSocketHandle {
    pub fn new(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: CancellationToken::new(),
            peer_gone: AtomicBool::new(false),
        }
    }
}

impl TransportHandle for UnixSocketHandle {
    async fn read(&self) -> Result<Message, TransportError> {
        let mut reader = self.reader.lock().await;
        let result = tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TransportError::Closed),
            frame = read_frame(&mut *reader) => frame,
        };
        if matches!(result, Err(TransportError::Closed)) {
            self.peer_gone.store(true, Ordering::Release);
        }
        result
    }

    async fn write(&self, message: &Message) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let frame = encode_frame(message)?;
        let mut writer = self.writer.lock().await;
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(TransportError::Closed),
            written = writer.write_all(&frame) => written.map_err(TransportError::from),
        }
    }

    fn close(&self) {
        self.closed.cancel();
    }

    fn status(&self) -> LinkStatus {
        if self.closed.is_cancelled() || self.peer_gone.load(Ordering::Acquire) {
            LinkStatus::Disconnected
        } else {
            LinkStatus::Connected
        }
    }
}

pub(crate) fn encode_frame(message: &Message) -> Result<Vec<u8>, TransportError> {
    let len = message.payload().len() + 1;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }
    let mut frame = Vec::with_capacity(4 + len);
    frame.extend_from_slice(&(len as u32).to_le_bytes());
    frame.push(message.tag());
    frame.extend_from_slice(message.payload());
    Ok(frame)
}

pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Message, TransportError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32_le().await {
        Ok(len) => len as usize,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(TransportError::Closed);
        }
        Err(err) => return Err(err.into()),
    };
    if len == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "frame without type byte").into());
    }
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let tag = reader.read_u8().await?;
    let mut payload = vec![0; len - 1];
    reader.read_exact(&mut payload).await?;
    Ok(Message::raw(tag, payload))
}
