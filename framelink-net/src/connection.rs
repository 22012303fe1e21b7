//! Framed connection over a TCP stream.
//!
//! A `FramedConnection` owns exactly one socket and turns its byte
//! stream into whole messages: every message travels as a 4-byte
//! little-endian length prefix followed by the payload. Receiving is
//! autonomous (a spawned task drives header → payload → dispatch in a
//! loop); sending is caller-driven and serialized on a per-connection
//! writer lock, so concurrent sends never interleave frames on the
//! wire.

use crate::config::ConnectionConfig;
use crate::error::NetError;
use crate::events::{ConnectResult, ConnectionEvents};
use bytes::{Bytes, BytesMut};
use framelink_protocol::{decode_header, encode_frame, encode_header, FrameError, HEADER_SIZE};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A connection carrying length-prefixed messages over TCP.
///
/// Cheaply cloneable handle; clones refer to the same underlying
/// connection.
#[derive(Clone)]
pub struct FramedConnection {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectionConfig,
    events: Arc<dyn ConnectionEvents>,
    /// Write half of the stream. Held across a whole frame write.
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Is the connection established?
    connected: AtomicBool,
    /// Terminal once true; checked before touching the socket on every
    /// entry point.
    closed: AtomicBool,
    /// Guards the exactly-once disconnected notification.
    disconnect_notified: AtomicBool,
    receive_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    peer_addr: parking_lot::Mutex<Option<SocketAddr>>,
}

impl Inner {
    fn check_open(&self) -> Result<(), NetError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NetError::Closed);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(NetError::NotConnected);
        }
        Ok(())
    }

    /// Converges every teardown path on the terminal state and fires
    /// the disconnected notification at most once per lifetime.
    fn finish_disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        if !self.disconnect_notified.swap(true, Ordering::SeqCst) {
            self.events.on_disconnected();
        }
    }

    fn abort_receive_task(&self) {
        if let Some(handle) = self.receive_task.lock().take() {
            handle.abort();
        }
    }
}

impl FramedConnection {
    /// Creates a new, unconnected connection. The observer is
    /// registered here, before any I/O can fire.
    pub fn new(config: ConnectionConfig, events: Arc<dyn ConnectionEvents>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                events,
                writer: Mutex::new(None),
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                disconnect_notified: AtomicBool::new(false),
                receive_task: parking_lot::Mutex::new(None),
                peer_addr: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// Wraps an already-accepted socket. The connection is marked
    /// connected and its receive loop starts before this returns.
    pub fn from_accepted(
        stream: TcpStream,
        config: ConnectionConfig,
        events: Arc<dyn ConnectionEvents>,
    ) -> Self {
        if config.nodelay {
            stream.set_nodelay(true).ok();
        }
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();

        let conn = Self {
            inner: Arc::new(Inner {
                config,
                events,
                writer: Mutex::new(Some(write_half)),
                connected: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                disconnect_notified: AtomicBool::new(false),
                receive_task: parking_lot::Mutex::new(None),
                peer_addr: parking_lot::Mutex::new(peer),
            }),
        };
        conn.spawn_receive_loop(read_half);
        conn
    }

    /// Connects to the peer, bounded by the configured connect timeout.
    ///
    /// On success the connection is marked connected and the receive
    /// loop is running before this returns. On failure the error is
    /// returned and the connection stays unconnected.
    pub async fn connect(&self, addr: SocketAddr) -> Result<(), NetError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(NetError::Closed);
        }
        if self.inner.connected.load(Ordering::SeqCst) {
            return Err(NetError::AlreadyConnected);
        }

        tracing::debug!("connecting to {}", addr);
        let stream = tokio::time::timeout(
            self.inner.config.connect_timeout,
            TcpStream::connect(addr),
        )
        .await
        .map_err(|_| NetError::Timeout)?
        .map_err(NetError::Io)?;
        tracing::debug!("connected to {}", addr);

        if self.inner.config.nodelay {
            stream.set_nodelay(true).ok();
        }
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();

        *self.inner.writer.lock().await = Some(write_half);
        *self.inner.peer_addr.lock() = peer;
        self.inner.connected.store(true, Ordering::SeqCst);
        self.spawn_receive_loop(read_half);

        Ok(())
    }

    /// Starts a connect in the background and returns immediately. The
    /// outcome is delivered exactly once via
    /// [`ConnectionEvents::on_connect_result`].
    pub fn connect_async(&self, addr: SocketAddr) {
        let conn = self.clone();
        tokio::spawn(async move {
            let result = match conn.connect(addr).await {
                Ok(()) => ConnectResult {
                    connected: true,
                    error: None,
                },
                Err(e) => {
                    tracing::debug!("async connect to {} failed: {}", addr, e);
                    ConnectResult {
                        connected: false,
                        error: Some(e),
                    }
                }
            };
            conn.inner.events.on_connect_result(result);
        });
    }

    /// Sends a payload as one frame, built in a single contiguous
    /// buffer and written in one call under the writer lock.
    pub async fn send(&self, payload: &[u8]) -> Result<(), NetError> {
        self.inner.check_open()?;
        let frame = encode_frame(payload)?;

        let mut guard = self.inner.writer.lock().await;
        let writer = guard.as_mut().ok_or(NetError::NotConnected)?;
        if let Err(e) = writer.write_all(&frame).await {
            tracing::debug!("write failed: {}", e);
            self.inner.finish_disconnect();
            return Err(NetError::Io(e));
        }
        tracing::trace!("sent {} byte message", payload.len());
        Ok(())
    }

    /// Sends a payload as two sequential writes (header, then payload)
    /// with no intermediate frame buffer. The writer lock is held for
    /// both writes, so the frame cannot interleave with other sends.
    pub async fn send_unbuffered(&self, payload: &[u8]) -> Result<(), NetError> {
        self.inner.check_open()?;
        let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
            size: payload.len(),
        })?;
        let header = encode_header(len);

        let mut guard = self.inner.writer.lock().await;
        let writer = guard.as_mut().ok_or(NetError::NotConnected)?;
        let result = async {
            writer.write_all(&header).await?;
            writer.write_all(payload).await
        }
        .await;
        if let Err(e) = result {
            tracing::debug!("write failed: {}", e);
            self.inner.finish_disconnect();
            return Err(NetError::Io(e));
        }
        tracing::trace!("sent {} byte message", payload.len());
        Ok(())
    }

    /// Orderly disconnect: shuts the write half down (FIN), stops the
    /// receive loop and fires the disconnected notification. Valid only
    /// while connected; calling it on an unconnected connection is a
    /// caller error.
    pub async fn disconnect(&self) -> Result<(), NetError> {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return Err(NetError::NotConnected);
        }

        tracing::debug!("disconnecting");
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.inner.abort_receive_task();
        self.inner.finish_disconnect();
        Ok(())
    }

    /// Releases the socket resources. Idempotent; operations invoked
    /// after close fail fast on the closed flag without touching the
    /// socket. Disposal alone does not fire the disconnected
    /// notification.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        tracing::debug!("closing connection");

        let writer = self.inner.writer.lock().await.take();
        self.inner.abort_receive_task();
        if let Some(mut writer) = writer {
            let _ = writer.shutdown().await;
        }
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Returns whether the connection reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Remote address of the peer, when connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        *self.inner.peer_addr.lock()
    }

    fn spawn_receive_loop(&self, reader: OwnedReadHalf) {
        let conn = self.clone();
        let handle = tokio::spawn(async move {
            conn.receive_loop(reader).await;
        });
        *self.inner.receive_task.lock() = Some(handle);
    }

    /// Drives header → payload → dispatch until the peer disconnects,
    /// an I/O fault occurs or the connection is disposed. Exclusively
    /// owns the read half and the scratch buffer, so the receive path
    /// needs no locking.
    async fn receive_loop(self, mut reader: OwnedReadHalf) {
        let mut scratch = vec![0u8; self.inner.config.read_buffer_size];

        loop {
            if self.inner.closed.load(Ordering::SeqCst) {
                return;
            }
            match read_message(&mut reader, &mut scratch).await {
                Ok(Some(payload)) => {
                    tracing::trace!("received {} byte message", payload.len());
                    self.inner.events.on_message(payload);
                }
                Ok(None) => {
                    tracing::debug!("connection closed by peer");
                    self.inner.finish_disconnect();
                    return;
                }
                Err(e) => {
                    tracing::debug!("read error: {}", e);
                    self.inner.finish_disconnect();
                    return;
                }
            }
        }
    }
}

/// Reads one length-prefixed message from `reader`.
///
/// Returns `Ok(None)` when the peer closed the stream before sending
/// any header byte. A close inside a message surfaces as
/// `UnexpectedEof`; the caller treats both as disconnection.
async fn read_message<R>(reader: &mut R, scratch: &mut [u8]) -> io::Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    // AwaitingHeader: request exactly the header.
    let mut header = [0u8; HEADER_SIZE];
    let n = reader.read(&mut header).await?;
    if n == 0 {
        return Ok(None);
    }
    if n < HEADER_SIZE {
        // The length prefix itself can split across segment boundaries;
        // complete the remaining header bytes exactly before decoding.
        reader.read_exact(&mut header[n..]).await?;
    }
    let declared = decode_header(header) as usize;

    // AwaitingPayload: accumulate until the declared length is reached,
    // each read capped at the scratch capacity. The accumulator never
    // grows past the declared length.
    let mut accumulator = BytesMut::with_capacity(declared);
    let mut remaining = declared;
    while remaining > 0 {
        let want = remaining.min(scratch.len());
        let n = reader.read(&mut scratch[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream closed mid-message",
            ));
        }
        accumulator.extend_from_slice(&scratch[..n]);
        remaining -= n;
    }

    Ok(Some(accumulator.freeze()))
}
