//! # EM Protocol Codec
//!
//! This crate implements the wire level of the EM charging-station protocol:
//! the datagram frame codec with its checksum, the command-code table, the
//! scaled field readers used by the payload handlers, and the protocol's
//! timestamp and charge-id conventions.

pub mod command;
pub mod datagram;
pub mod error;
pub mod time;
pub mod wire;

pub use command::Command;
pub use datagram::Datagram;
pub use error::{CodecError, CodecResult};
