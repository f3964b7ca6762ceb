use crate::error::{DecodeError, EncodeError};
use crate::ofp_header::OfpHeader;

/// OpenFlow Message
///
/// Version-agnostic API for handling OpenFlow messages at the byte-buffer
/// level. Marshal and parse are total: malformed input surfaces as a typed
/// error, oversized output as an `EncodeError`.
pub trait OfpMessage: Sized {
    /// Return the byte-size of an `OfpMessage`.
    fn size_of(msg: &Self) -> usize;
    /// Create an `OfpHeader` for the given transaction id and OpenFlow message.
    fn header_of(xid: u32, msg: &Self) -> OfpHeader;
    /// Return a marshaled buffer containing an OpenFlow header and the message
    /// `msg`.
    fn marshal(xid: u32, msg: Self) -> Result<Vec<u8>, EncodeError>;
    /// Returns a pair `(u32, OfpMessage)` of the transaction id and OpenFlow
    /// message parsed from the given OpenFlow header `header`, and body buffer
    /// `buf`.
    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Self), DecodeError>;
}
