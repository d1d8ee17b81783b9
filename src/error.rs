//! # Error Types
//!
//! Error handling for the ALN codec, parser, router and transports.
//!
//! ## Error Categories
//! - **Frame errors**: parser buffer overflow, length-prefixed fields running
//!   past the available bytes, non UTF-8 strings, oversized fields
//! - **Integrity**: CRC mismatch, reported on the decoded packet rather than
//!   raised by the decoder
//! - **Routing**: no provider for a service, no route to an address, a next
//!   hop that is neither local nor the destination
//! - **Dispatch**: the destination is local but nothing handles the packet
//! - **I/O and configuration**
//!
//! ## Example Usage
//! ```rust
//! use aln_mesh::core::packet::Packet;
//! use aln_mesh::error::{AlnError, Result};
//!
//! fn decode(bytes: &[u8]) -> Result<Packet> {
//!     let packet = Packet::from_bytes(bytes)?;
//!     packet.verify_crc()?;
//!     Ok(packet)
//! }
//!
//! match decode(&[0x00]) {
//!     Err(e) if e.is_frame_error() => {}
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Primary error type for all ALN operations
#[derive(Error, Debug)]
pub enum AlnError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame exceeds parser buffer capacity of {capacity} bytes")]
    BufferOverflow { capacity: usize },

    #[error("truncated {field} field: need {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{field} field is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("{field} field too long: {len} bytes (max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("empty frame")]
    EmptyFrame,

    #[error("CRC mismatch: transmitted {transmitted:#010x}, computed {computed:#010x}")]
    CrcMismatch { transmitted: u32, computed: u32 },

    #[error("no service providers discovered for '{0}'")]
    NoServiceProviders(String),

    #[error("no route to '{0}'")]
    NoRoute(String),

    #[error("packet has neither a destination nor a service")]
    MissingDestination,

    #[error("packet is unroutable; next hop '{next_hop}' is not this node")]
    Unroutable { next_hop: String },

    #[error("service '{service}' not registered (context {context_id})")]
    UnregisteredService { service: String, context_id: u16 },

    #[error("all context ids are in use")]
    ContextsExhausted,

    #[error("invalid net state packet: {0}")]
    InvalidNetState(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AlnError {
    /// True for malformed-frame conditions the parser recovers from by
    /// discarding the in-progress frame.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            AlnError::BufferOverflow { .. }
                | AlnError::Truncated { .. }
                | AlnError::InvalidUtf8 { .. }
                | AlnError::FieldTooLong { .. }
                | AlnError::EmptyFrame
        )
    }

    /// True when the router could not resolve where a packet goes.
    pub fn is_unroutable(&self) -> bool {
        matches!(
            self,
            AlnError::NoServiceProviders(_)
                | AlnError::NoRoute(_)
                | AlnError::MissingDestination
                | AlnError::Unroutable { .. }
        )
    }
}

/// Type alias for Results using AlnError
pub type Result<T> = std::result::Result<T, AlnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(AlnError::BufferOverflow { capacity: 4 }.is_frame_error());
        assert!(AlnError::EmptyFrame.is_frame_error());
        assert!(!AlnError::EmptyFrame.is_unroutable());
        assert!(AlnError::NoRoute("b".into()).is_unroutable());
        assert!(AlnError::Unroutable {
            next_hop: "x".into()
        }
        .is_unroutable());
        assert!(!AlnError::CrcMismatch {
            transmitted: 1,
            computed: 2
        }
        .is_frame_error());
    }

    #[test]
    fn messages_carry_context() {
        let e = AlnError::UnregisteredService {
            service: "ping".into(),
            context_id: 7,
        };
        assert_eq!(e.to_string(), "service 'ping' not registered (context 7)");
        let e = AlnError::CrcMismatch {
            transmitted: 0xdeadbeef,
            computed: 1,
        };
        assert!(e.to_string().contains("0xdeadbeef"));
    }
}
