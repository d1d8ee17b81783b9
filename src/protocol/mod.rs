//! # Protocol Layer
//!
//! Control-packet formats for sharing network state, and local delivery of
//! packets addressed to this node.
//!
//! ## Components
//! - **Net state**: ROUTE / SERVICE / QUERY payload builders and parsers
//! - **Dispatcher**: service handlers by name, response handlers by context id

pub mod dispatcher;
pub mod net_state;

#[cfg(test)]
mod tests;
