//! SLIP/KISS style byte stuffing.
//!
//! A frame is the escaped packet bytes followed by one unescaped `END`.
//! There is no leading delimiter: the previous frame's `END` is the start
//! boundary of the next.

/// Frame delimiter.
pub const END: u8 = 0xC0;
/// Escape marker.
pub const ESC: u8 = 0xDB;
/// Escaped `END` (follows `ESC`).
pub const ESC_END: u8 = 0xDC;
/// Escaped `ESC` (follows `ESC`).
pub const ESC_ESC: u8 = 0xDD;

/// Escape literal `END` and `ESC` bytes of `data` into `out`.
pub fn escape_into(data: &[u8], out: &mut Vec<u8>) {
    for &b in data {
        match b {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(b),
        }
    }
}

/// Escape `data` without appending a delimiter.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    escape_into(data, &mut out);
    out
}

/// Escape `data` and terminate it with `END`.
pub fn frame(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8 + 1);
    escape_into(data, &mut out);
    out.push(END);
    out
}

/// Reverse `frame` for a single frame.
///
/// Stops at the first `END`; a trailing delimiter is optional. An `ESC`
/// followed by anything other than `ESC_END`/`ESC_ESC` drops both bytes,
/// matching the streaming parser.
pub fn deframe(framed: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(framed.len());
    let mut escaped = false;
    for &b in framed {
        if b == END {
            break;
        }
        if escaped {
            match b {
                ESC_END => out.push(END),
                ESC_ESC => out.push(ESC),
                _ => {}
            }
            escaped = false;
        } else if b == ESC {
            escaped = true;
        } else {
            out.push(b);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_end_and_esc() {
        assert_eq!(escape(&[END]), vec![ESC, ESC_END]);
        assert_eq!(escape(&[ESC]), vec![ESC, ESC_ESC]);
        assert_eq!(escape(b"plain"), b"plain".to_vec());
    }

    #[test]
    fn frame_appends_single_delimiter() {
        let framed = frame(&[1, END, 2]);
        assert_eq!(framed, vec![1, ESC, ESC_END, 2, END]);
        assert_eq!(framed.iter().filter(|&&b| b == END).count(), 1);
    }

    #[test]
    fn deframe_all_byte_values() {
        let data: Vec<u8> = (0..=255).collect();
        assert_eq!(deframe(&frame(&data)), data);
    }

    #[test]
    fn deframe_drops_bad_escape() {
        assert_eq!(deframe(&[1, ESC, 0x42, 2, END]), vec![1, 2]);
    }
}
