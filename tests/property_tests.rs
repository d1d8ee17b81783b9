//! Property-based tests using proptest
//!
//! These tests check codec, framing and parser invariants over randomly
//! generated packets and byte streams.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use aln_mesh::core::frame::{self, END, ESC};
use aln_mesh::core::hamming;
use aln_mesh::core::packet::{CrcCheck, Packet};
use aln_mesh::core::parser::Parser;
use proptest::prelude::*;

fn arb_packet() -> impl Strategy<Value = Packet> {
    (
        any::<u8>(),
        "[a-z0-9.-]{0,16}",
        "[a-z0-9-]{0,16}",
        "[a-z0-9-]{0,16}",
        "[a-z0-9-]{0,16}",
        any::<u16>(),
        any::<u32>(),
        any::<u16>(),
        any::<u8>(),
        prop::collection::vec(any::<u8>(), 0..512),
    )
        .prop_map(
            |(net_type, service, src, dest, next, seq, ack, ctx, data_type, data)| Packet {
                net_type,
                service,
                src_addr: src,
                dest_addr: dest,
                next_addr: next,
                seq_num: seq,
                ack_block: ack,
                context_id: ctx,
                data_type,
                data,
                ..Packet::default()
            },
        )
}

// Property: any packet within limits survives encode and decode
proptest! {
    #[test]
    fn prop_packet_roundtrip(packet in arb_packet()) {
        let bytes = packet.to_bytes().expect("within limits");
        let decoded = Packet::from_bytes(&bytes).expect("decodes");
        prop_assert!(matches!(decoded.crc, CrcCheck::Valid(_)));
        prop_assert_eq!(decoded, packet);
    }
}

// Property: encoding is deterministic
proptest! {
    #[test]
    fn prop_encoding_deterministic(packet in arb_packet()) {
        prop_assert_eq!(packet.to_bytes().unwrap(), packet.clone().to_bytes().unwrap());
    }
}

// Property: framing never leaves a raw END inside the frame and deframes back
proptest! {
    #[test]
    fn prop_frame_roundtrip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        let framed = frame::frame(&data);
        prop_assert_eq!(framed.last(), Some(&END));
        prop_assert!(!framed[..framed.len() - 1].contains(&END));
        prop_assert_eq!(frame::deframe(&framed), data);
    }
}

// Property: every byte of a frame is escaped or passed through, never both
proptest! {
    #[test]
    fn prop_escape_length(data in prop::collection::vec(any::<u8>(), 0..1024)) {
        let specials = data.iter().filter(|&&b| b == END || b == ESC).count();
        prop_assert_eq!(frame::escape(&data).len(), data.len() + specials);
    }
}

// Property: a single flipped bit in the control codeword is corrected
proptest! {
    #[test]
    fn prop_hamming_single_bit_correction(value in 0u16..=hamming::DATA_MASK, bit in 0u32..16) {
        let codeword = hamming::encode(value);
        prop_assert_eq!(hamming::decode(codeword), value);
        prop_assert_eq!(hamming::decode(codeword ^ (1 << bit)), value);
    }
}

// Property: the parser yields the same packets however the stream is chunked
proptest! {
    #[test]
    fn prop_parser_chunking_invariant(
        packets in prop::collection::vec(arb_packet(), 1..6),
        chunk in 1usize..64,
    ) {
        let stream: Vec<u8> = packets
            .iter()
            .flat_map(|p| p.to_frame().unwrap())
            .collect();

        let mut whole = Parser::new();
        let all_at_once: Vec<Packet> = whole
            .feed(&stream)
            .into_iter()
            .map(|r| r.expect("valid frame"))
            .collect();

        let mut chunked = Parser::new();
        let mut pieces = Vec::new();
        for part in stream.chunks(chunk) {
            pieces.extend(chunked.feed(part).into_iter().map(|r| r.expect("valid frame")));
        }

        prop_assert_eq!(&all_at_once, &packets);
        prop_assert_eq!(&pieces, &packets);
        prop_assert_eq!(chunked.buffered(), 0);
    }
}

// Property: arbitrary bytes never panic the parser and never exceed its bound
proptest! {
    #[test]
    fn prop_parser_total_on_garbage(
        bytes in prop::collection::vec(any::<u8>(), 0..4096),
        capacity in 8usize..256,
    ) {
        let mut parser = Parser::with_capacity(capacity);
        let _ = parser.feed(&bytes);
        prop_assert!(parser.buffered() <= capacity);
    }
}
