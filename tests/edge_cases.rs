//! Malformed input and boundary conditions for the codec and parser

#![allow(clippy::expect_used, clippy::unwrap_used)]

use aln_mesh::core::frame::{self, END, ESC, ESC_END};
use aln_mesh::core::hamming;
use aln_mesh::core::packet::{
    CrcCheck, Packet, CF_CRC, CF_DATA, CF_DEST_ADDR, MAX_DATA_LEN, MAX_STRING_LEN,
};
use aln_mesh::core::parser::Parser;
use aln_mesh::AlnError;

fn control(flags: u16) -> [u8; 2] {
    hamming::encode(flags).to_be_bytes()
}

#[test]
fn string_length_past_end_is_truncated() {
    let mut bytes = control(CF_DEST_ADDR).to_vec();
    bytes.extend_from_slice(&[10, b'a', b'b']);
    assert!(matches!(
        Packet::from_bytes(&bytes),
        Err(AlnError::Truncated {
            field: "dest_addr",
            needed: 10,
            ..
        })
    ));
}

#[test]
fn data_length_past_end_is_truncated() {
    let mut bytes = control(CF_DATA).to_vec();
    bytes.extend_from_slice(&[0x01, 0x00, 1, 2, 3]);
    let err = Packet::from_bytes(&bytes).unwrap_err();
    assert!(err.is_frame_error(), "{err}");
}

#[test]
fn missing_crc_bytes_is_truncated() {
    let mut bytes = control(CF_CRC).to_vec();
    bytes.extend_from_slice(&[0xAA, 0xBB]);
    assert!(matches!(
        Packet::from_bytes(&bytes),
        Err(AlnError::Truncated { .. })
    ));
}

#[test]
fn single_byte_frame_is_rejected() {
    let err = Packet::from_bytes(&[0x07]).unwrap_err();
    assert!(err.is_frame_error());
}

#[test]
fn invalid_utf8_address_is_rejected() {
    let mut bytes = control(CF_DEST_ADDR).to_vec();
    bytes.extend_from_slice(&[2, 0xFF, 0xFE]);
    assert!(matches!(
        Packet::from_bytes(&bytes),
        Err(AlnError::InvalidUtf8 { field: "dest_addr" })
    ));
}

#[test]
fn field_limits_are_enforced_on_encode() {
    let ok = Packet {
        dest_addr: "d".repeat(MAX_STRING_LEN),
        data: vec![7; MAX_DATA_LEN],
        ..Packet::default()
    };
    let decoded = Packet::from_bytes(&ok.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded, ok);

    let long_addr = Packet {
        dest_addr: "d".repeat(MAX_STRING_LEN + 1),
        ..Packet::default()
    };
    assert!(matches!(
        long_addr.to_bytes(),
        Err(AlnError::FieldTooLong { field: "dest_addr", .. })
    ));

    let long_data = Packet {
        data: vec![0; MAX_DATA_LEN + 1],
        ..Packet::default()
    };
    assert!(matches!(
        long_data.to_bytes(),
        Err(AlnError::FieldTooLong { field: "data", .. })
    ));
}

#[test]
fn corrupted_crc_still_decodes() {
    let packet = Packet {
        dest_addr: "b".into(),
        data: b"abc".to_vec(),
        ..Packet::default()
    };
    let mut bytes = packet.to_bytes().unwrap();
    let n = bytes.len();
    bytes[n - 2] ^= 0x80;

    let decoded = Packet::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, packet);
    assert!(matches!(decoded.crc, CrcCheck::Mismatch { .. }));
    assert!(matches!(
        decoded.verify_crc(),
        Err(AlnError::CrcMismatch { .. })
    ));
}

#[test]
fn corrupted_payload_flags_crc() {
    let packet = Packet {
        dest_addr: "b".into(),
        data: b"abc".to_vec(),
        ..Packet::default()
    };
    let mut bytes = packet.to_bytes().unwrap();
    let n = bytes.len();
    bytes[n - 5] = b'z';
    let decoded = Packet::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.data, b"abz");
    assert!(decoded.verify_crc().is_err());
}

#[test]
fn end_after_escape_terminates_frame() {
    let packet = Packet {
        dest_addr: "x".into(),
        ..Packet::default()
    };
    let mut stream = frame::escape(&packet.to_bytes().unwrap());
    stream.push(ESC);
    stream.push(END);
    stream.extend(packet.to_frame().unwrap());

    let mut parser = Parser::new();
    let results = parser.feed(&stream);
    assert_eq!(results.len(), 2);
    // the dangling escape is dropped, the frame still decodes
    assert_eq!(results[0].as_ref().unwrap(), &packet);
    assert_eq!(results[1].as_ref().unwrap(), &packet);
}

#[test]
fn unknown_escape_byte_is_dropped() {
    let bytes = Packet {
        service: "s".into(),
        ..Packet::default()
    }
    .to_bytes()
    .unwrap();
    let mut framed = vec![bytes[0], ESC, 0x41];
    framed.extend_from_slice(&frame::escape(&bytes[1..]));
    framed.push(END);
    assert_eq!(frame::deframe(&framed), bytes);
    let results = Parser::new().feed(&framed);
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
}

#[test]
fn overflow_discards_until_next_delimiter() {
    let small = Packet {
        dest_addr: "n".into(),
        ..Packet::default()
    };
    let big = Packet {
        data: vec![0x55; 200],
        ..Packet::default()
    };
    let capacity = small.to_bytes().unwrap().len() + 4;

    let mut stream = big.to_frame().unwrap();
    stream.extend(small.to_frame().unwrap());

    let mut parser = Parser::with_capacity(capacity);
    let results = parser.feed(&stream);
    assert_eq!(results.len(), 2);
    assert!(matches!(
        results[0],
        Err(AlnError::BufferOverflow { capacity: c }) if c == capacity
    ));
    assert_eq!(results[1].as_ref().unwrap(), &small);
    assert_eq!(parser.buffered(), 0);
}

#[test]
fn escaped_delimiters_do_not_split_frames() {
    let packet = Packet {
        data: vec![END, ESC, END, ESC_END],
        ..Packet::default()
    };
    let framed = packet.to_frame().unwrap();
    assert_eq!(framed.iter().filter(|&&b| b == END).count(), 1);
    let results = Parser::new().feed(&framed);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap().data, vec![END, ESC, END, ESC_END]);
}

#[test]
fn noise_between_frames_is_recovered() {
    let packet = Packet {
        src_addr: "s".into(),
        ..Packet::default()
    };
    let mut stream = vec![END, END, 0x01, END];
    stream.extend(packet.to_frame().unwrap());
    let mut parser = Parser::new();
    let results = parser.feed(&stream);
    let good: Vec<_> = results.into_iter().filter_map(Result::ok).collect();
    assert_eq!(good, vec![packet]);
}
