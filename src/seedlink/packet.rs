//! SeedLink 4 packet framing.
//!
//! ```text
//! offset  size  field
//!      0     2  "SE"
//!      2     1  format, '3' for miniseed3, 'J' for JSON info
//!      3     1  subformat, 'D' for data
//!      4     4  payload length, u32 little endian
//!      8     8  sequence number, i64 little endian, negative when none
//!     16     1  station id length
//!     17     n  station id, NET_STA
//!   17+n     m  payload
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::link_error::LinkError;

pub const SIGNATURE: [u8; 2] = [b'S', b'E'];
pub const PACKET_HEADER_SIZE: usize = 17;

/// What a packet carries. Only data packets are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// A miniseed3 waveform record.
    Data,
    /// An INFO response or error.
    Info,
    /// Any other format, kept as `(format, subformat)`.
    Other(u8, u8),
}

impl PacketKind {
    fn from_codes(format: u8, subformat: u8) -> PacketKind {
        match (format, subformat) {
            (b'3', b'D') => PacketKind::Data,
            (b'J', _) => PacketKind::Info,
            _ => PacketKind::Other(format, subformat),
        }
    }

    fn codes(&self) -> (u8, u8) {
        match self {
            PacketKind::Data => (b'3', b'D'),
            PacketKind::Info => (b'J', b'I'),
            PacketKind::Other(format, subformat) => (*format, *subformat),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    /// `NET_STA` of the station the packet belongs to.
    pub station: String,
    pub sequence: Option<u64>,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn data(station: &str, sequence: u64, payload: Vec<u8>) -> Packet {
        Packet {
            kind: PacketKind::Data,
            station: station.to_string(),
            sequence: Some(sequence),
            payload,
        }
    }

    /// Parses one packet from the front of `buf`. Returns the packet and the number of bytes
    /// it used, or `None` when `buf` does not yet hold a whole packet.
    pub fn parse(buf: &[u8]) -> Result<Option<(Packet, usize)>, LinkError> {
        if buf.len() < PACKET_HEADER_SIZE {
            return Ok(None);
        }
        if buf[0..2] != SIGNATURE {
            return Err(LinkError::Protocol(format!(
                "bad packet signature {:02x}{:02x}",
                buf[0], buf[1]
            )));
        }
        let kind = PacketKind::from_codes(buf[2], buf[3]);
        let payload_length = LittleEndian::read_u32(&buf[4..8]) as usize;
        let sequence = LittleEndian::read_i64(&buf[8..16]);
        let station_length = buf[16] as usize;
        let total = PACKET_HEADER_SIZE + station_length + payload_length;
        if buf.len() < total {
            return Ok(None);
        }
        let station_end = PACKET_HEADER_SIZE + station_length;
        let station = String::from_utf8(buf[PACKET_HEADER_SIZE..station_end].to_vec())
            .map_err(|e| LinkError::Protocol(format!("station id not UTF8: {}", e)))?;
        let packet = Packet {
            kind,
            station,
            sequence: u64::try_from(sequence).ok(),
            payload: buf[station_end..total].to_vec(),
        };
        Ok(Some((packet, total)))
    }

    /// Serializes the packet as a server would send it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let (format, subformat) = self.kind.codes();
        let mut out = Vec::with_capacity(PACKET_HEADER_SIZE + self.station.len() + self.payload.len());
        out.extend_from_slice(&SIGNATURE);
        out.push(format);
        out.push(subformat);
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        let sequence = self.sequence.map(|s| s as i64).unwrap_or(-1);
        out.extend_from_slice(&sequence.to_le_bytes());
        out.push(self.station.len() as u8);
        out.extend_from_slice(self.station.as_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}
