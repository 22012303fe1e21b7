//! # framelink-protocol
//!
//! Wire format for framelink.
//!
//! This crate provides:
//! - The 4-byte little-endian length prefix preceding every message
//! - Frame encoding (`header ++ payload` in one contiguous buffer)
//! - Frame splitting for consumers that buffer raw stream bytes
//!
//! The format is symmetric in both directions and carries no fields
//! beyond the length prefix:
//!
//! ```text
//! +-------------------+----------------------------+
//! | payload length    | payload                    |
//! | 4 bytes, LE u32   | length bytes               |
//! +-------------------+----------------------------+
//! ```

pub mod error;
pub mod frame;

pub use error::FrameError;
pub use frame::{decode_header, encode_frame, encode_header, split_frame, HEADER_SIZE};
