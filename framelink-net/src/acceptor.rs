//! Connection acceptor.
//!
//! Listens on a port and wraps every incoming socket as a
//! pre-connected [`FramedConnection`] whose receive loop is already
//! running by the time the acceptance notification fires.

use crate::config::AcceptorConfig;
use crate::connection::FramedConnection;
use crate::error::NetError;
use crate::events::{Accepted, AcceptorEvents};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;

/// Accepts inbound TCP connections and produces framed connections.
///
/// Cheaply cloneable handle; clones refer to the same acceptor.
#[derive(Clone)]
pub struct Acceptor {
    inner: Arc<Inner>,
}

struct Inner {
    config: AcceptorConfig,
    events: Arc<dyn AcceptorEvents>,
    running: AtomicBool,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
    accept_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Acceptor {
    /// Creates a new acceptor. The observer is registered here, before
    /// the listener exists.
    pub fn new(config: AcceptorConfig, events: Arc<dyn AcceptorEvents>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                events,
                running: AtomicBool::new(false),
                local_addr: parking_lot::Mutex::new(None),
                accept_task: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// Binds the listening socket and starts the accept loop. Fails
    /// with `AlreadyRunning` if the acceptor is running. Must be called
    /// from within a tokio runtime.
    pub fn start(&self, bind_addr: SocketAddr) -> Result<(), NetError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(NetError::AlreadyRunning);
        }

        let listener = match listen(bind_addr, self.inner.config.backlog) {
            Ok(listener) => listener,
            Err(e) => {
                self.inner.running.store(false, Ordering::SeqCst);
                return Err(NetError::Io(e));
            }
        };
        let local_addr = listener.local_addr().map_err(|e| {
            self.inner.running.store(false, Ordering::SeqCst);
            NetError::Io(e)
        })?;
        *self.inner.local_addr.lock() = Some(local_addr);
        tracing::info!("listening on {}", local_addr);

        let acceptor = self.clone();
        let handle = tokio::spawn(async move {
            acceptor.accept_loop(listener).await;
        });
        *self.inner.accept_task.lock() = Some(handle);

        Ok(())
    }

    /// Stops the accept loop and closes the listening socket. Fails
    /// with `NotRunning` if the acceptor is not running. The acceptor
    /// may be started again afterwards.
    pub fn stop(&self) -> Result<(), NetError> {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Err(NetError::NotRunning);
        }
        tracing::info!("acceptor stopping");
        if let Some(handle) = self.inner.accept_task.lock().take() {
            // Dropping the aborted task drops the listener, closing the
            // socket.
            handle.abort();
        }
        *self.inner.local_addr.lock() = None;
        Ok(())
    }

    /// Returns whether the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// The bound local address while running. Reports the actual port
    /// for port-0 binds.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.local_addr.lock()
    }

    /// Accepts continuously; each accepted socket is wrapped and
    /// announced, then the loop immediately re-arms for the next
    /// client.
    async fn accept_loop(self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, remote_addr)) => {
                    tracing::info!("accepted connection from {}", remote_addr);
                    // The per-connection observer is obtained before the
                    // receive loop starts, so a message the peer sends
                    // immediately is delivered to it.
                    let events = self.inner.events.connection_events(remote_addr);
                    let connection = FramedConnection::from_accepted(
                        stream,
                        self.inner.config.connection.clone(),
                        events,
                    );
                    self.inner.events.on_accepted(Accepted {
                        connection,
                        remote_addr,
                    });
                }
                Err(e) => {
                    if !self.inner.running.load(Ordering::SeqCst) {
                        return;
                    }
                    tracing::error!("accept error: {}", e);
                }
            }
        }
    }
}

fn listen(bind_addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let socket = match bind_addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(bind_addr)?;
    socket.listen(backlog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ConnectResult, ConnectionEvents};
    use bytes::Bytes;
    use framelink_protocol::encode_frame;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    enum ServerEvent {
        Accepted(SocketAddr),
        Message(Bytes),
        Disconnected,
    }

    struct ForwardingEvents {
        tx: mpsc::UnboundedSender<ServerEvent>,
    }

    impl ConnectionEvents for ForwardingEvents {
        fn on_connect_result(&self, _result: ConnectResult) {}

        fn on_message(&self, payload: Bytes) {
            let _ = self.tx.send(ServerEvent::Message(payload));
        }

        fn on_disconnected(&self) {
            let _ = self.tx.send(ServerEvent::Disconnected);
        }
    }

    struct TestAcceptorEvents {
        tx: mpsc::UnboundedSender<ServerEvent>,
        connections: parking_lot::Mutex<Vec<FramedConnection>>,
    }

    impl TestAcceptorEvents {
        fn channel() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    tx,
                    connections: parking_lot::Mutex::new(Vec::new()),
                }),
                rx,
            )
        }
    }

    impl AcceptorEvents for TestAcceptorEvents {
        fn connection_events(&self, _remote_addr: SocketAddr) -> Arc<dyn ConnectionEvents> {
            Arc::new(ForwardingEvents {
                tx: self.tx.clone(),
            })
        }

        fn on_accepted(&self, accepted: Accepted) {
            self.connections.lock().push(accepted.connection.clone());
            let _ = self.tx.send(ServerEvent::Accepted(accepted.remote_addr));
        }
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_accepted_connection_receives_immediately() {
        init_tracing();
        let (events, mut rx) = TestAcceptorEvents::channel();
        let acceptor = Acceptor::new(AcceptorConfig::default(), events);
        acceptor.start("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = acceptor.local_addr().unwrap();

        // The client sends as soon as the socket opens; no extra start
        // call happens on the server side.
        let mut client = TcpStream::connect(addr).await.unwrap();
        let frame = encode_frame(b"hello").unwrap();
        client.write_all(&frame).await.unwrap();

        let mut accepted = false;
        let mut message = None;
        for _ in 0..2 {
            match recv(&mut rx).await {
                ServerEvent::Accepted(remote) => {
                    assert_eq!(remote, client.local_addr().unwrap());
                    accepted = true;
                }
                ServerEvent::Message(payload) => message = Some(payload),
                ServerEvent::Disconnected => panic!("unexpected disconnect"),
            }
        }
        assert!(accepted);
        assert_eq!(&message.expect("no message received")[..], b"hello");

        acceptor.stop().unwrap();
    }

    #[tokio::test]
    async fn test_server_send_has_length_prefixed_wire_format() {
        use bytes::BytesMut;
        use framelink_protocol::split_frame;
        use tokio::io::AsyncReadExt;

        let (events, mut rx) = TestAcceptorEvents::channel();
        let acceptor = Acceptor::new(AcceptorConfig::default(), events.clone());
        acceptor.start("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = acceptor.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(recv(&mut rx).await, ServerEvent::Accepted(_)));

        let server_conn = events.connections.lock()[0].clone();
        server_conn.send(b"welcome").await.unwrap();

        // Read the raw bytes the peer actually sees and split them as
        // frames.
        let mut wire = BytesMut::new();
        let mut buf = [0u8; 64];
        let payload = loop {
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "stream closed before a whole frame arrived");
            wire.extend_from_slice(&buf[..n]);
            if let Some(payload) = split_frame(&mut wire) {
                break payload;
            }
        };
        assert_eq!(&payload[..], b"welcome");
        assert!(wire.is_empty());

        acceptor.stop().unwrap();
    }

    #[tokio::test]
    async fn test_accepts_multiple_clients() {
        let (events, mut rx) = TestAcceptorEvents::channel();
        let acceptor = Acceptor::new(AcceptorConfig::default(), events.clone());
        acceptor.start("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = acceptor.local_addr().unwrap();

        let a = TcpStream::connect(addr).await.unwrap();
        let b = TcpStream::connect(addr).await.unwrap();

        for _ in 0..2 {
            assert!(matches!(recv(&mut rx).await, ServerEvent::Accepted(_)));
        }
        assert_eq!(events.connections.lock().len(), 2);

        drop(a);
        drop(b);
        acceptor.stop().unwrap();
    }

    #[tokio::test]
    async fn test_peer_vanishing_mid_message_disconnects_once() {
        let (events, mut rx) = TestAcceptorEvents::channel();
        let acceptor = Acceptor::new(AcceptorConfig::default(), events);
        acceptor.start("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = acceptor.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(recv(&mut rx).await, ServerEvent::Accepted(_)));

        // Header promises ten bytes; only two ever arrive.
        client
            .write_all(&[0x0A, 0x00, 0x00, 0x00, b'h', b'i'])
            .await
            .unwrap();
        drop(client);

        assert!(matches!(recv(&mut rx).await, ServerEvent::Disconnected));
        // No message was delivered and the notification fired only once.
        assert!(rx.try_recv().is_err());
        acceptor.stop().unwrap();
    }

    #[tokio::test]
    async fn test_start_twice_is_caller_error() {
        let (events, _rx) = TestAcceptorEvents::channel();
        let acceptor = Acceptor::new(AcceptorConfig::default(), events);
        acceptor.start("127.0.0.1:0".parse().unwrap()).unwrap();

        assert!(matches!(
            acceptor.start("127.0.0.1:0".parse().unwrap()),
            Err(NetError::AlreadyRunning)
        ));
        acceptor.stop().unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_not_running_is_caller_error() {
        let (events, _rx) = TestAcceptorEvents::channel();
        let acceptor = Acceptor::new(AcceptorConfig::default(), events);
        assert!(matches!(acceptor.stop(), Err(NetError::NotRunning)));
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let (events, mut rx) = TestAcceptorEvents::channel();
        let acceptor = Acceptor::new(AcceptorConfig::default(), events);

        acceptor.start("127.0.0.1:0".parse().unwrap()).unwrap();
        assert!(acceptor.is_running());
        acceptor.stop().unwrap();
        assert!(!acceptor.is_running());
        assert!(acceptor.local_addr().is_none());

        acceptor.start("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = acceptor.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        assert!(matches!(recv(&mut rx).await, ServerEvent::Accepted(_)));
        acceptor.stop().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_acceptor_stopped() {
        let (events, _rx) = TestAcceptorEvents::channel();
        let first = Acceptor::new(AcceptorConfig::default(), events);
        first.start("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();

        // SO_REUSEADDR does not allow two live listeners on one port.
        let (other_events, _other_rx) = TestAcceptorEvents::channel();
        let second = Acceptor::new(AcceptorConfig::default(), other_events);
        assert!(matches!(second.start(addr), Err(NetError::Io(_))));
        assert!(!second.is_running());

        first.stop().unwrap();
    }
}
