//! # ALN Packet
//!
//! A sparse record: only fields holding a non-default value are put on the
//! wire. Which fields follow is announced by an 11-bit presence word,
//! Hamming(15,11) encoded into the leading 2-byte control field.
//!
//! ## Wire Format
//! ```text
//! [control(2)] [net(1)] [srv(1+n)] [src(1+n)] [dst(1+n)] [nxt(1+n)]
//! [seq(2)] [ack(4)] [ctx(2)] [typ(1)] [data(2+n)] [crc(4)]
//! ```
//! All integers are big-endian. Strings are UTF-8 with a one-byte length
//! prefix. A field set to its zero value is indistinguishable from an
//! absent one.

use std::fmt;

use crate::core::{frame, hamming};
use crate::error::{AlnError, Result};

/// Presence flag for the net type byte.
pub const CF_NET_TYPE: u16 = 0x0400;
/// Presence flag for the service name.
pub const CF_SERVICE: u16 = 0x0200;
/// Presence flag for the source address.
pub const CF_SRC_ADDR: u16 = 0x0100;
/// Presence flag for the destination address.
pub const CF_DEST_ADDR: u16 = 0x0080;
/// Presence flag for the next-hop address.
pub const CF_NEXT_ADDR: u16 = 0x0040;
/// Presence flag for the sequence number.
pub const CF_SEQ_NUM: u16 = 0x0020;
/// Presence flag for the acknowledge block.
pub const CF_ACK_BLOCK: u16 = 0x0010;
/// Presence flag for the context id.
pub const CF_CONTEXT_ID: u16 = 0x0008;
/// Presence flag for the data type byte.
pub const CF_DATA_TYPE: u16 = 0x0004;
/// Presence flag for the data blob.
pub const CF_DATA: u16 = 0x0002;
/// Presence flag for the trailing CRC32.
pub const CF_CRC: u16 = 0x0001;

/// Net sub-type of an ordinary data packet.
pub const NET_DATA: u8 = 0x00;
/// Route advertisement or withdrawal.
pub const NET_ROUTE: u8 = 0x01;
/// Service capacity advertisement or withdrawal.
pub const NET_SERVICE: u8 = 0x02;
/// Request for the peer's full route and service tables.
pub const NET_QUERY: u8 = 0x03;

/// Longest string field.
pub const MAX_STRING_LEN: usize = u8::MAX as usize;
/// Longest data blob.
pub const MAX_DATA_LEN: usize = u16::MAX as usize;
/// Largest possible unframed packet.
pub const MAX_PACKET_SIZE: usize =
    2 + 1 + 4 * (1 + MAX_STRING_LEN) + 2 + 4 + 2 + 1 + 2 + MAX_DATA_LEN + 4;

/// Control sub-type carried in the net type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetType {
    Data,
    Route,
    Service,
    Query,
    Unknown(u8),
}

impl From<u8> for NetType {
    fn from(value: u8) -> Self {
        match value {
            NET_DATA => NetType::Data,
            NET_ROUTE => NetType::Route,
            NET_SERVICE => NetType::Service,
            NET_QUERY => NetType::Query,
            other => NetType::Unknown(other),
        }
    }
}

/// Outcome of checking the trailing CRC of a decoded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrcCheck {
    /// Built locally, or received without a CRC field.
    #[default]
    Absent,
    /// Transmitted CRC matches the computed one.
    Valid(u32),
    /// Transmitted CRC does not match; the packet is still delivered.
    Mismatch { transmitted: u32, computed: u32 },
}

/// One ALN packet.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    pub net_type: u8,
    pub service: String,
    pub src_addr: String,
    pub dest_addr: String,
    pub next_addr: String,
    pub seq_num: u16,
    pub ack_block: u32,
    pub context_id: u16,
    pub data_type: u8,
    pub data: Vec<u8>,
    /// Result of CRC validation on decode. Not part of packet identity.
    pub crc: CrcCheck,
}

impl PartialEq for Packet {
    fn eq(&self, other: &Self) -> bool {
        self.net_type == other.net_type
            && self.service == other.service
            && self.src_addr == other.src_addr
            && self.dest_addr == other.dest_addr
            && self.next_addr == other.next_addr
            && self.seq_num == other.seq_num
            && self.ack_block == other.ack_block
            && self.context_id == other.context_id
            && self.data_type == other.data_type
            && self.data == other.data
    }
}

impl Eq for Packet {}

impl Packet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data packet addressed to whichever nodes provide `service`.
    pub fn to_service(service: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            service: service.into(),
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn net(&self) -> NetType {
        NetType::from(self.net_type)
    }

    /// Control packets carry protocol bookkeeping rather than application data.
    pub fn is_control(&self) -> bool {
        self.net_type != NET_DATA
    }

    /// The value transports enqueue to stop their send worker.
    pub fn is_sentinel(&self) -> bool {
        self.net_type == NET_DATA && self.dest_addr.is_empty() && self.service.is_empty()
    }

    /// Presence bits for every non-default content field. The CRC bit is
    /// added at encode time.
    pub fn control_flags(&self) -> u16 {
        let mut cf = 0u16;
        if self.net_type != 0 {
            cf |= CF_NET_TYPE;
        }
        if !self.service.is_empty() {
            cf |= CF_SERVICE;
        }
        if !self.src_addr.is_empty() {
            cf |= CF_SRC_ADDR;
        }
        if !self.dest_addr.is_empty() {
            cf |= CF_DEST_ADDR;
        }
        if !self.next_addr.is_empty() {
            cf |= CF_NEXT_ADDR;
        }
        if self.seq_num != 0 {
            cf |= CF_SEQ_NUM;
        }
        if self.ack_block != 0 {
            cf |= CF_ACK_BLOCK;
        }
        if self.context_id != 0 {
            cf |= CF_CONTEXT_ID;
        }
        if self.data_type != 0 {
            cf |= CF_DATA_TYPE;
        }
        if !self.data.is_empty() {
            cf |= CF_DATA;
        }
        cf
    }

    /// Hamming encoded presence word, without the CRC bit.
    pub fn control_field(&self) -> u16 {
        hamming::encode(self.control_flags())
    }

    /// Fail with `CrcMismatch` if the decoded CRC did not validate.
    pub fn verify_crc(&self) -> Result<()> {
        match self.crc {
            CrcCheck::Mismatch {
                transmitted,
                computed,
            } => Err(AlnError::CrcMismatch {
                transmitted,
                computed,
            }),
            _ => Ok(()),
        }
    }

    /// Serialize to unframed bytes, CRC included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        check_len("service", self.service.len(), MAX_STRING_LEN)?;
        check_len("src_addr", self.src_addr.len(), MAX_STRING_LEN)?;
        check_len("dest_addr", self.dest_addr.len(), MAX_STRING_LEN)?;
        check_len("next_addr", self.next_addr.len(), MAX_STRING_LEN)?;
        check_len("data", self.data.len(), MAX_DATA_LEN)?;

        let cf = self.control_flags() | CF_CRC;
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&hamming::encode(cf).to_be_bytes());

        if cf & CF_NET_TYPE != 0 {
            buf.push(self.net_type);
        }
        if cf & CF_SERVICE != 0 {
            put_str(&mut buf, &self.service);
        }
        if cf & CF_SRC_ADDR != 0 {
            put_str(&mut buf, &self.src_addr);
        }
        if cf & CF_DEST_ADDR != 0 {
            put_str(&mut buf, &self.dest_addr);
        }
        if cf & CF_NEXT_ADDR != 0 {
            put_str(&mut buf, &self.next_addr);
        }
        if cf & CF_SEQ_NUM != 0 {
            buf.extend_from_slice(&self.seq_num.to_be_bytes());
        }
        if cf & CF_ACK_BLOCK != 0 {
            buf.extend_from_slice(&self.ack_block.to_be_bytes());
        }
        if cf & CF_CONTEXT_ID != 0 {
            buf.extend_from_slice(&self.context_id.to_be_bytes());
        }
        if cf & CF_DATA_TYPE != 0 {
            buf.push(self.data_type);
        }
        if cf & CF_DATA != 0 {
            buf.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
            buf.extend_from_slice(&self.data);
        }
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_be_bytes());
        Ok(buf)
    }

    /// Serialize and byte-stuff into a single `END` terminated frame.
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        Ok(frame::frame(&self.to_bytes()?))
    }

    /// Decode unframed packet bytes.
    ///
    /// The control field is Hamming corrected before its bits are read. A CRC
    /// mismatch is recorded in `crc` and does not fail the decode.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(AlnError::EmptyFrame);
        }
        let mut r = Reader::new(bytes);
        let cf = hamming::decode(r.u16("control")?);
        let mut p = Packet::default();

        if cf & CF_NET_TYPE != 0 {
            p.net_type = r.u8("net_type")?;
        }
        if cf & CF_SERVICE != 0 {
            p.service = r.string("service")?;
        }
        if cf & CF_SRC_ADDR != 0 {
            p.src_addr = r.string("src_addr")?;
        }
        if cf & CF_DEST_ADDR != 0 {
            p.dest_addr = r.string("dest_addr")?;
        }
        if cf & CF_NEXT_ADDR != 0 {
            p.next_addr = r.string("next_addr")?;
        }
        if cf & CF_SEQ_NUM != 0 {
            p.seq_num = r.u16("seq_num")?;
        }
        if cf & CF_ACK_BLOCK != 0 {
            p.ack_block = r.u32("ack_block")?;
        }
        if cf & CF_CONTEXT_ID != 0 {
            p.context_id = r.u16("context_id")?;
        }
        if cf & CF_DATA_TYPE != 0 {
            p.data_type = r.u8("data_type")?;
        }
        if cf & CF_DATA != 0 {
            let len = r.u16("data_len")? as usize;
            p.data = r.take("data", len)?.to_vec();
        }
        if cf & CF_CRC != 0 {
            let covered = r.offset;
            let transmitted = r.u32("crc")?;
            let computed = crc32fast::hash(&bytes[..covered]);
            p.crc = if transmitted == computed {
                CrcCheck::Valid(transmitted)
            } else {
                CrcCheck::Mismatch {
                    transmitted,
                    computed,
                }
            };
        }
        Ok(p)
    }

    fn encoded_len(&self) -> usize {
        let opt_str = |s: &str| if s.is_empty() { 0 } else { 1 + s.len() };
        2 + 1
            + opt_str(&self.service)
            + opt_str(&self.src_addr)
            + opt_str(&self.dest_addr)
            + opt_str(&self.next_addr)
            + 2
            + 4
            + 2
            + 1
            + 2
            + self.data.len()
            + 4
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cf = self.control_flags();
        let mut parts = vec![format!("cf:0x{:04x}", self.control_field())];
        if cf & CF_NET_TYPE != 0 {
            parts.push(format!("net:{}", self.net_type));
        }
        if cf & CF_SERVICE != 0 {
            parts.push(format!("srv:{}", self.service));
        }
        if cf & CF_SRC_ADDR != 0 {
            parts.push(format!("src:{}", self.src_addr));
        }
        if cf & CF_DEST_ADDR != 0 {
            parts.push(format!("dst:{}", self.dest_addr));
        }
        if cf & CF_NEXT_ADDR != 0 {
            parts.push(format!("nxt:{}", self.next_addr));
        }
        if cf & CF_SEQ_NUM != 0 {
            parts.push(format!("seq:{}", self.seq_num));
        }
        if cf & CF_ACK_BLOCK != 0 {
            parts.push(format!("ack:0x{:x}", self.ack_block));
        }
        if cf & CF_CONTEXT_ID != 0 {
            parts.push(format!("ctx:{}", self.context_id));
        }
        if cf & CF_DATA_TYPE != 0 {
            parts.push(format!("typ:{}", self.data_type));
        }
        if cf & CF_DATA != 0 {
            parts.push(format!("len:{}", self.data.len()));
        }
        f.write_str(&parts.join(","))
    }
}

fn check_len(field: &'static str, len: usize, max: usize) -> Result<()> {
    if len > max {
        return Err(AlnError::FieldTooLong { field, len, max });
    }
    Ok(())
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.push(s.len() as u8);
    buf.extend_from_slice(s.as_bytes());
}

/// Bounds-checked cursor over a packet buffer.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, field: &'static str, n: usize) -> Result<&'a [u8]> {
        let available = self.bytes.len() - self.offset;
        if n > available {
            return Err(AlnError::Truncated {
                field,
                needed: n,
                available,
            });
        }
        let out = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.take(field, 1)?[0])
    }

    fn u16(&mut self, field: &'static str) -> Result<u16> {
        let b = self.take(field, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, field: &'static str) -> Result<u32> {
        let b = self.take(field, 4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self, field: &'static str) -> Result<String> {
        let len = self.u8(field)? as usize;
        let raw = self.take(field, len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| AlnError::InvalidUtf8 { field })
    }
}
