//! Notification records and observer traits.
//!
//! Collaborators register an observer at construction time; delivery is
//! synchronous on whichever task completes the triggering operation, so
//! handlers should hand heavy work off rather than block the receive
//! loop.

use crate::connection::FramedConnection;
use crate::error::NetError;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;

/// Outcome of a non-blocking connect, delivered exactly once.
#[derive(Debug)]
pub struct ConnectResult {
    /// Whether the connection was established.
    pub connected: bool,
    /// The captured failure when `connected` is false.
    pub error: Option<NetError>,
}

/// An accepted inbound connection, delivered by the acceptor.
pub struct Accepted {
    /// The new connection; its receive loop is already running.
    pub connection: FramedConnection,
    /// Remote address of the peer.
    pub remote_addr: SocketAddr,
}

/// Observer for a single framed connection.
///
/// All methods default to no-ops so collaborators implement only what
/// they consume.
pub trait ConnectionEvents: Send + Sync + 'static {
    /// Result of a `connect_async` call.
    fn on_connect_result(&self, _result: ConnectResult) {}

    /// A whole message arrived from the peer.
    fn on_message(&self, _payload: Bytes) {}

    /// The connection reached its terminal state. Fires at most once.
    fn on_disconnected(&self) {}
}

/// Observer for the connection acceptor.
pub trait AcceptorEvents: Send + Sync + 'static {
    /// Supplies the event observer for a connection about to be
    /// accepted from `remote_addr`. Called before the connection's
    /// receive loop starts, so messages the peer sends immediately are
    /// delivered to the returned observer.
    fn connection_events(&self, remote_addr: SocketAddr) -> Arc<dyn ConnectionEvents>;

    /// A new inbound connection was accepted and wrapped.
    fn on_accepted(&self, accepted: Accepted);
}
