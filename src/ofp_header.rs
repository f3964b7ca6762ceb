use std::io::Cursor;
use std::mem::size_of;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::DecodeError;
use crate::openflow0x04::MsgCode;

/// Wire version byte for OpenFlow 1.3.
pub const OFP_VERSION: u8 = 0x04;

/// OpenFlow Header
///
/// The first fields of every OpenFlow message, no matter the protocol version.
/// This is parsed to determine version, type, and length of the remaining
/// message, so that it can be properly handled. Over UDP one datagram carries
/// exactly one header-plus-body, so `length` must equal the datagram size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Return the byte-size of an `OfpHeader`.
    pub fn size() -> usize {
        size_of::<u8>() * 2 + size_of::<u16>() + size_of::<u32>()
    }

    /// Fills a message buffer with the header fields of an `OfpHeader`.
    pub fn marshal(bytes: &mut Vec<u8>, header: OfpHeader) {
        bytes.write_u8(header.version()).unwrap();
        bytes.write_u8(header.typ).unwrap();
        bytes.write_u16::<BigEndian>(header.length).unwrap();
        bytes.write_u32::<BigEndian>(header.xid()).unwrap();
    }

    /// Parse the leading 8 bytes of `buf` into an `OfpHeader`.
    ///
    /// Fails with `TooShort` on anything under 8 bytes and never reads past
    /// the end of the buffer.
    pub fn parse(buf: &[u8]) -> Result<OfpHeader, DecodeError> {
        if buf.len() < Self::size() {
            return Err(DecodeError::TooShort {
                need: Self::size(),
                have: buf.len(),
            });
        }
        let mut bytes = Cursor::new(buf);
        Ok(OfpHeader {
            version: bytes.read_u8()?,
            typ: bytes.read_u8()?,
            length: bytes.read_u16::<BigEndian>()?,
            xid: bytes.read_u32::<BigEndian>()?,
        })
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the OpenFlow message type code of a header, if it names one
    /// this engine knows about.
    pub fn type_code(&self) -> Option<MsgCode> {
        MsgCode::from_u8(self.typ)
    }

    /// Return the raw `type` byte of a header.
    pub fn type_byte(&self) -> u8 {
        self.typ
    }

    /// Return the `length` field of a header. Includes the length of the
    /// header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Return the `xid` field of a header, the transaction id associated with
    /// this message. Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let hdr = OfpHeader::new(OFP_VERSION, MsgCode::Hello as u8, 8, 42);
        let mut bytes = vec![];
        OfpHeader::marshal(&mut bytes, hdr);
        assert_eq!(bytes.len(), OfpHeader::size());
        let parsed = OfpHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, hdr);
        assert_eq!(parsed.type_code(), Some(MsgCode::Hello));
    }

    #[test]
    fn header_too_short() {
        for len in 0..8 {
            let buf = vec![0u8; len];
            match OfpHeader::parse(&buf) {
                Err(DecodeError::TooShort { .. }) => (),
                other => panic!("expected TooShort, got {:?}", other),
            }
        }
    }

    #[test]
    fn unknown_type_code() {
        let hdr = OfpHeader::new(OFP_VERSION, 0xee, 8, 0);
        assert_eq!(hdr.type_code(), None);
        assert_eq!(hdr.type_byte(), 0xee);
    }
}
