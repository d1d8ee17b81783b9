//! # Stream Parser
//!
//! Reassembles packets from arbitrarily chunked transport reads. Unescaping
//! and accumulation happen in one pass over the raw bytes.
//!
//! - `END` finalizes the accumulated bytes as a packet, in either state.
//! - After `ESC`, `ESC_END`/`ESC_ESC` append the literal byte; any other byte
//!   is dropped.
//! - A frame growing past the buffer capacity yields `BufferOverflow`; the
//!   rest of that frame is discarded up to the next `END`.

use tracing::{trace, warn};

use crate::core::frame::{END, ESC, ESC_END, ESC_ESC};
use crate::core::packet::{Packet, MAX_PACKET_SIZE};
use crate::error::{AlnError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Buffering,
    Escaped,
}

/// Byte-at-a-time frame parser with a bounded accumulation buffer.
#[derive(Debug)]
pub struct Parser {
    state: State,
    buffer: Vec<u8>,
    capacity: usize,
    discarding: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Parser sized for the largest encodable packet.
    pub fn new() -> Self {
        Self::with_capacity(MAX_PACKET_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: State::Buffering,
            buffer: Vec::new(),
            capacity,
            discarding: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes accumulated for the frame in progress.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::Buffering;
        self.discarding = false;
    }

    /// Consume one byte. Returns `Some` when the byte completed a frame or
    /// overflowed the buffer.
    pub fn push(&mut self, b: u8) -> Option<Result<Packet>> {
        if b == END {
            return self.finish();
        }
        if self.discarding {
            return None;
        }
        match self.state {
            State::Escaped => {
                self.state = State::Buffering;
                match b {
                    ESC_END => self.append(END),
                    ESC_ESC => self.append(ESC),
                    other => {
                        trace!(byte = other, "unexpected byte after escape, dropped");
                        None
                    }
                }
            }
            State::Buffering if b == ESC => {
                self.state = State::Escaped;
                None
            }
            State::Buffering => self.append(b),
        }
    }

    /// Consume a chunk and return every completed frame or error, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Packet>> {
        bytes.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Consume a chunk, handing each decoded packet to `on_packet`. Malformed
    /// frames are logged and skipped.
    pub fn ingest<F>(&mut self, bytes: &[u8], mut on_packet: F)
    where
        F: FnMut(Packet),
    {
        for b in bytes {
            match self.push(*b) {
                Some(Ok(packet)) => on_packet(packet),
                Some(Err(e)) => warn!(error = %e, "discarding malformed frame"),
                None => {}
            }
        }
    }

    fn append(&mut self, b: u8) -> Option<Result<Packet>> {
        if self.buffer.len() >= self.capacity {
            let capacity = self.capacity;
            self.buffer.clear();
            self.state = State::Buffering;
            self.discarding = true;
            return Some(Err(AlnError::BufferOverflow { capacity }));
        }
        self.buffer.push(b);
        None
    }

    fn finish(&mut self) -> Option<Result<Packet>> {
        let discarded = self.discarding;
        self.discarding = false;
        self.state = State::Buffering;
        if discarded || self.buffer.is_empty() {
            self.buffer.clear();
            return None;
        }
        let result = Packet::from_bytes(&self.buffer);
        self.buffer.clear();
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame;

    fn sample() -> Packet {
        Packet {
            service: "echo".into(),
            dest_addr: "node-b".into(),
            context_id: 0xC0DB,
            data: vec![END, ESC, ESC_END, 0x00, ESC_ESC],
            ..Packet::default()
        }
    }

    #[test]
    fn single_frame() {
        let mut parser = Parser::new();
        let out = parser.feed(&sample().to_frame().unwrap());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), &sample());
        assert_eq!(parser.buffered(), 0);
    }

    #[test]
    fn byte_at_a_time() {
        let mut parser = Parser::new();
        let mut got = Vec::new();
        for b in sample().to_frame().unwrap() {
            parser.ingest(&[b], |p| got.push(p));
        }
        assert_eq!(got, vec![sample()]);
    }

    #[test]
    fn back_to_back_frames() {
        let mut stream = sample().to_frame().unwrap();
        let second = Packet::to_service("other", b"x".to_vec());
        stream.extend(second.to_frame().unwrap());
        let mut parser = Parser::new();
        let out: Vec<Packet> = parser.feed(&stream).into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(out, vec![sample(), second]);
    }

    #[test]
    fn repeated_delimiters_are_ignored() {
        let mut stream = vec![END, END];
        stream.extend(sample().to_frame().unwrap());
        stream.push(END);
        let mut parser = Parser::new();
        assert_eq!(parser.feed(&stream).len(), 1);
    }

    #[test]
    fn end_after_escape_terminates_frame() {
        let mut parser = Parser::new();
        let mut bytes = frame::escape(&sample().to_bytes().unwrap());
        bytes.push(ESC);
        bytes.push(END);
        let out = parser.feed(&bytes);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), &sample());
        assert_eq!(parser.state, State::Buffering);
    }

    #[test]
    fn overflow_discards_until_next_delimiter() {
        let mut parser = Parser::with_capacity(8);
        let mut stream = vec![0x11; 20];
        stream.push(END);
        stream.extend(Packet::new().to_frame().unwrap());
        let out = parser.feed(&stream);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(AlnError::BufferOverflow { capacity: 8 })));
        assert_eq!(out[1].as_ref().unwrap(), &Packet::new());
    }

    #[test]
    fn malformed_frame_then_recovery() {
        let mut parser = Parser::new();
        // control word announcing a service string that is not there
        let cf = crate::core::hamming::encode(crate::core::packet::CF_SERVICE);
        let mut stream = cf.to_be_bytes().to_vec();
        stream.push(END);
        stream.extend(sample().to_frame().unwrap());
        let mut got = Vec::new();
        parser.ingest(&stream, |p| got.push(p));
        assert_eq!(got, vec![sample()]);
    }
}
