//! # Core Protocol Components
//!
//! Low-level packet handling: the wire format, its framing, and the
//! streaming parser that reassembles frames from a byte stream.
//!
//! ## Components
//! - **Hamming**: single-error correction for the packet control field
//! - **Frame**: SLIP/KISS byte stuffing with a trailing `END` delimiter
//! - **Packet**: sparse field encoding selected by the control field, CRC32 trailer
//! - **Parser**: byte-at-a-time frame reassembly with a bounded buffer
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! escape([Control(2)] [present fields...] [CRC(4)]) END
//! ```
//!
//! ## Limits
//! - Strings are at most 255 bytes, data at most 65535 bytes
//! - The parser buffer is bounded; oversized frames are discarded

pub mod codec;
pub mod frame;
pub mod hamming;
pub mod packet;
pub mod parser;
