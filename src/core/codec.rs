//! # Frame Codec
//!
//! `tokio_util::codec` adapter around [`Parser`], so any `AsyncRead +
//! AsyncWrite` can be wrapped in `Framed<T, FrameCodec>`.
//!
//! Malformed frames never end the stream: they are logged and skipped, the
//! same way the parser resynchronizes on the next delimiter.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::core::packet::Packet;
use crate::core::parser::Parser;
use crate::error::AlnError;

#[derive(Debug, Default)]
pub struct FrameCodec {
    parser: Parser,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec whose parser rejects frames longer than `max_frame_size`.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            parser: Parser::with_capacity(max_frame_size),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Packet;
    type Error = AlnError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, AlnError> {
        let mut consumed = 0;
        while consumed < src.len() {
            let b = src[consumed];
            consumed += 1;
            match self.parser.push(b) {
                Some(Ok(packet)) => {
                    src.advance(consumed);
                    return Ok(Some(packet));
                }
                Some(Err(e)) => warn!(error = %e, "discarding malformed frame"),
                None => {}
            }
        }
        // Everything seen so far lives in the parser's buffer.
        src.advance(consumed);
        Ok(None)
    }
}

impl Encoder<Packet> for FrameCodec {
    type Error = AlnError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), AlnError> {
        let framed = item.to_frame()?;
        dst.reserve(framed.len());
        dst.put_slice(&framed);
        Ok(())
    }
}
