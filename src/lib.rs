//! # ALN Mesh
//!
//! Application Layer Network: a routing overlay where nodes with string
//! addresses exchange packets addressed to nodes or to named services,
//! across any mix of point-to-point channels.
//!
//! ## Layers
//! - [`core`]: Hamming-protected control field, packet codec, SLIP framing,
//!   streaming parser and a Tokio codec
//! - [`protocol`]: ROUTE / SERVICE / QUERY payloads and local dispatch
//! - [`router`]: forwarding plus distance-vector route and service discovery
//! - [`transport`]: in-process, byte-stream and TCP channels
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics
//!
//! ## Example
//! ```rust
//! use aln_mesh::{LocalChannel, Packet, Router};
//! use std::sync::{Arc, Mutex};
//!
//! let a = Router::new("a");
//! let b = Router::new("b");
//!
//! let got = Arc::new(Mutex::new(Vec::new()));
//! let sink = got.clone();
//! b.register_service("echo", move |p: Packet| sink.lock().unwrap().push(p.data))
//!     .unwrap();
//!
//! let (left, right) = LocalChannel::pair();
//! a.add_channel(left);
//! b.add_channel(right);
//!
//! a.send(Packet::to_service("echo", b"hello".to_vec())).unwrap();
//! assert_eq!(got.lock().unwrap().as_slice(), &[b"hello".to_vec()]);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod router;
pub mod transport;
pub mod utils;

pub use config::AlnConfig;
pub use core::codec::FrameCodec;
pub use core::packet::Packet;
pub use core::parser::Parser;
pub use error::{AlnError, Result};
pub use router::Router;
pub use transport::{Channel, ChannelId, LimitedChannel, LocalChannel, StreamChannel};
pub use utils::init_logging;
