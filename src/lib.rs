//! # framelink
//!
//! Length-prefixed message framing over TCP.
//!
//! framelink delivers discrete, variable-length messages over a byte
//! stream, hiding partial-read and partial-write reassembly from
//! callers. A [`FramedConnection`] owns one socket, drives its own
//! receive loop and reports whole messages, connection outcomes and
//! disconnects through an observer; an [`Acceptor`] produces
//! pre-connected framed connections from a listening port.
//!
//! The wire format is symmetric in both directions: a 4-byte
//! little-endian length prefix followed by the payload bytes.

pub use framelink_net::{
    Accepted, Acceptor, AcceptorConfig, AcceptorEvents, ConnectResult, ConnectionConfig,
    ConnectionEvents, FramedConnection, NetError,
};
pub use framelink_protocol::{
    decode_header, encode_frame, encode_header, split_frame, FrameError, HEADER_SIZE,
};
