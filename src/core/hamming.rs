//! Hamming(15,11) protection for the packet control field.
//!
//! The 11 low bits (`0x07FF`) carry the field-presence flags. Four parity
//! bits are placed at `0x1000`, `0x2000`, `0x4000` and `0x8000`; bit `0x0800`
//! is always zero. Decoding corrects a single flipped data bit. There is no
//! error detection: two or more flipped bits may decode to a wrong value.

/// Mask of the data bits carried by the codeword.
pub const DATA_MASK: u16 = 0x07FF;

// Generator masks, one per parity bit.
const G_P1: u16 = 0x071D;
const G_P2: u16 = 0x04DB;
const G_P3: u16 = 0x01B7;
const G_P4: u16 = 0x026F;

// Parity-check masks over the full 16-bit codeword.
const H_S1: u16 = 0x826F;
const H_S2: u16 = 0x41B7;
const H_S3: u16 = 0x24DB;
const H_S4: u16 = 0x171D;

/// Parity (0 or 1) of the set bits in `n`.
#[inline]
pub fn parity(n: u16) -> u16 {
    (n.count_ones() & 1) as u16
}

/// Encode the 11 data bits of `value` into a 15-bit codeword.
/// Bits outside `DATA_MASK` are ignored.
pub fn encode(value: u16) -> u16 {
    (value & DATA_MASK)
        | (parity(value & G_P1) << 12)
        | (parity(value & G_P2) << 13)
        | (parity(value & G_P3) << 14)
        | (parity(value & G_P4) << 15)
}

/// Four-bit error syndrome of a received codeword. Zero means no
/// correctable data-bit error was detected.
pub fn syndrome(codeword: u16) -> u8 {
    (parity(codeword & H_S1)
        | (parity(codeword & H_S2) << 1)
        | (parity(codeword & H_S3) << 2)
        | (parity(codeword & H_S4) << 3)) as u8
}

/// Data bit to flip for a given syndrome.
fn correction(syndrome: u8) -> u16 {
    match syndrome {
        0x0F => 0x0001,
        0x07 => 0x0002,
        0x0B => 0x0004,
        0x0D => 0x0008,
        0x0E => 0x0010,
        0x03 => 0x0020,
        0x05 => 0x0040,
        0x06 => 0x0080,
        0x0A => 0x0100,
        0x09 => 0x0200,
        0x0C => 0x0400,
        _ => 0,
    }
}

/// Decode a codeword, correcting at most one flipped data bit, and return
/// the 11 data bits.
pub fn decode(codeword: u16) -> u16 {
    (codeword ^ correction(syndrome(codeword))) & DATA_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_known_values() {
        // all eleven flags set except crc
        assert_eq!(encode(0x07FE) & DATA_MASK, 0x07FE);
        assert_eq!(encode(0), 0);
        // parity bits never land on 0x0800
        for v in 0..=DATA_MASK {
            assert_eq!(encode(v) & 0x0800, 0);
        }
    }

    #[test]
    fn clean_codewords_have_zero_syndrome() {
        for v in 0..=DATA_MASK {
            assert_eq!(syndrome(encode(v)), 0, "value {v:#06x}");
            assert_eq!(decode(encode(v)), v);
        }
    }

    #[test]
    fn corrects_every_single_data_bit_flip() {
        for v in 0..=DATA_MASK {
            let cw = encode(v);
            for bit in 0..11 {
                assert_eq!(decode(cw ^ (1 << bit)), v, "value {v:#06x} bit {bit}");
            }
        }
    }

    #[test]
    fn parity_bit_flip_leaves_data_intact() {
        let v = 0x0523;
        let cw = encode(v);
        for bit in 12..16 {
            assert_eq!(decode(cw ^ (1 << bit)), v);
        }
    }

    #[test]
    fn parity_counts_ones() {
        assert_eq!(parity(0), 0);
        assert_eq!(parity(0b1011), 1);
        assert_eq!(parity(0xFFFF), 0);
    }
}
