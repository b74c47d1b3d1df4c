//! RTP fixed header parsing
//!
//! RTP Header (RFC 3550):
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           synchronization source (SSRC) identifier            |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |            contributing source (CSRC) identifiers             |
//! |                             ....                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Only the header is inspected; the packet is forwarded untouched.

use bytes::Buf;

/// Size of the fixed RTP header
pub const RTP_HEADER_SIZE: usize = 12;

/// RTP version carried by every valid packet
pub const RTP_VERSION: u8 = 2;

/// RTP header parse error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtpError {
    /// Shorter than the fixed header
    TooShort(usize),
    /// Version field is not 2
    BadVersion(u8),
    /// CSRC list or extension runs past the end of the packet
    Truncated,
    /// Padding length exceeds the payload
    BadPadding,
}

impl std::fmt::Display for RtpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RtpError::TooShort(len) => write!(f, "RTP packet too short: {} bytes", len),
            RtpError::BadVersion(v) => write!(f, "Unsupported RTP version: {}", v),
            RtpError::Truncated => write!(f, "RTP header truncated"),
            RtpError::BadPadding => write!(f, "Invalid RTP padding"),
        }
    }
}

impl std::error::Error for RtpError {}

/// Parsed RTP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    /// Offset of the payload from the start of the packet
    pub header_len: usize,
    /// Payload length, excluding padding
    pub payload_len: usize,
}

impl RtpHeader {
    /// Parse and validate the header of a packet
    pub fn parse(packet: &[u8]) -> Result<Self, RtpError> {
        if packet.len() < RTP_HEADER_SIZE {
            return Err(RtpError::TooShort(packet.len()));
        }

        let mut buf = packet;
        let b0 = buf.get_u8();
        let b1 = buf.get_u8();

        let version = b0 >> 6;
        if version != RTP_VERSION {
            return Err(RtpError::BadVersion(version));
        }
        let padding = b0 & 0x20 != 0;
        let extension = b0 & 0x10 != 0;
        let csrc_count = (b0 & 0x0F) as usize;

        let sequence = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        let mut header_len = RTP_HEADER_SIZE + csrc_count * 4;
        if packet.len() < header_len {
            return Err(RtpError::Truncated);
        }

        if extension {
            // 16-bit profile id, 16-bit length in 32-bit words
            if packet.len() < header_len + 4 {
                return Err(RtpError::Truncated);
            }
            let mut ext = &packet[header_len + 2..header_len + 4];
            let words = ext.get_u16() as usize;
            header_len += 4 + words * 4;
            if packet.len() < header_len {
                return Err(RtpError::Truncated);
            }
        }

        let mut payload_len = packet.len() - header_len;
        if padding {
            let pad = packet[packet.len() - 1] as usize;
            if pad == 0 || pad > payload_len {
                return Err(RtpError::BadPadding);
            }
            payload_len -= pad;
        }

        Ok(Self {
            marker: b1 & 0x80 != 0,
            payload_type: b1 & 0x7F,
            sequence,
            timestamp,
            ssrc,
            header_len,
            payload_len,
        })
    }
}

/// Extends 16-bit RTP sequence numbers to 32 bits across wraparound
#[derive(Debug, Default)]
pub struct SequenceExtender {
    last: Option<u16>,
    cycles: u32,
}

impl SequenceExtender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extended sequence number for `seq`
    ///
    /// Late packets from before a wrap keep the previous cycle.
    pub fn extend(&mut self, seq: u16) -> u32 {
        let Some(last) = self.last else {
            self.last = Some(seq);
            return seq as u32;
        };

        let forward = seq.wrapping_sub(last);
        if forward < 0x8000 {
            // In order (or a forward jump)
            if seq < last {
                self.cycles = self.cycles.wrapping_add(1);
            }
            self.last = Some(seq);
            (self.cycles << 16) | seq as u32
        } else {
            // Reordered packet behind the highest seen; nothing precedes cycle 0
            let cycles = if seq > last {
                self.cycles.saturating_sub(1)
            } else {
                self.cycles
            };
            (cycles << 16) | seq as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(b0: u8, seq: u16, extra: &[u8]) -> Vec<u8> {
        let mut p = vec![b0, 0xE0];
        p.extend_from_slice(&seq.to_be_bytes());
        p.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        p.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        p.extend_from_slice(extra);
        p
    }

    #[test]
    fn test_parse_basic() {
        let p = packet(0x80, 1234, &[0x65, 0x88, 0x84]);
        let header = RtpHeader::parse(&p).unwrap();

        assert!(header.marker);
        assert_eq!(header.payload_type, 96);
        assert_eq!(header.sequence, 1234);
        assert_eq!(header.timestamp, 0x0001_0000);
        assert_eq!(header.ssrc, 0xDEAD_BEEF);
        assert_eq!(header.header_len, 12);
        assert_eq!(header.payload_len, 3);
    }

    #[test]
    fn test_parse_rejects_short_and_bad_version() {
        assert_eq!(RtpHeader::parse(&[0x80; 4]), Err(RtpError::TooShort(4)));

        let p = packet(0x40, 1, &[]);
        assert_eq!(RtpHeader::parse(&p), Err(RtpError::BadVersion(1)));
    }

    #[test]
    fn test_parse_csrc_and_extension() {
        // CC=1, X=1: one CSRC, then a one-word extension
        let mut extra = vec![0, 0, 0, 1];
        extra.extend_from_slice(&[0xBE, 0xDE, 0x00, 0x01]);
        extra.extend_from_slice(&[0x10, 0xFF, 0x00, 0x00]);
        extra.extend_from_slice(&[0x41, 0x9A]);
        let p = packet(0x91, 7, &extra);

        let header = RtpHeader::parse(&p).unwrap();
        assert_eq!(header.header_len, 12 + 4 + 4 + 4);
        assert_eq!(header.payload_len, 2);
    }

    #[test]
    fn test_parse_truncated_extension() {
        let p = packet(0x90, 7, &[0xBE, 0xDE, 0x00, 0x04]);
        assert_eq!(RtpHeader::parse(&p), Err(RtpError::Truncated));
    }

    #[test]
    fn test_parse_padding() {
        let p = packet(0xA0, 9, &[0x41, 0x00, 0x00, 0x03]);
        let header = RtpHeader::parse(&p).unwrap();
        assert_eq!(header.payload_len, 1);

        let bad = packet(0xA0, 9, &[0x41, 0x09]);
        assert_eq!(RtpHeader::parse(&bad), Err(RtpError::BadPadding));
    }

    #[test]
    fn test_extend_in_order() {
        let mut u = SequenceExtender::new();
        assert_eq!(u.extend(10), 10);
        assert_eq!(u.extend(11), 11);
        assert_eq!(u.extend(12), 12);
    }

    #[test]
    fn test_extend_wraparound() {
        let mut u = SequenceExtender::new();
        assert_eq!(u.extend(65534), 65534);
        assert_eq!(u.extend(65535), 65535);
        assert_eq!(u.extend(0), 65536);
        assert_eq!(u.extend(1), 65537);
    }

    #[test]
    fn test_extend_reordered_across_wrap() {
        let mut u = SequenceExtender::new();
        u.extend(65535);
        assert_eq!(u.extend(1), 65537);
        // Late packet from before the wrap
        assert_eq!(u.extend(65534), 65534);
        assert_eq!(u.extend(2), 65538);
    }

    #[test]
    fn test_extend_late_packet_before_first() {
        let mut u = SequenceExtender::new();
        assert_eq!(u.extend(5), 5);
        // Sent before the first packet we saw, from the previous cycle
        assert_eq!(u.extend(65533), 65533);
        assert_eq!(u.extend(6), 6);
    }
}
