//! # framelink-net
//!
//! TCP transport for framelink.
//!
//! This crate provides:
//! - `FramedConnection`: one TCP connection carrying length-prefixed
//!   messages, with an autonomous receive loop and caller-driven sends
//! - `Acceptor`: listens on a port and wraps every incoming connection
//!   as a pre-connected `FramedConnection`
//! - Observer traits and notification records for connection outcomes,
//!   received messages, disconnects and accepted connections

pub mod acceptor;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;

pub use acceptor::Acceptor;
pub use config::{AcceptorConfig, ConnectionConfig};
pub use connection::FramedConnection;
pub use error::NetError;
pub use events::{Accepted, AcceptorEvents, ConnectResult, ConnectionEvents};
