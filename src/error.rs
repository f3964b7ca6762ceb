use std::io;
use thiserror::Error;

/// Failure to parse a byte buffer into an OpenFlow message.
///
/// Decoding operates on attacker- or corruption-controlled input, so every
/// malformed buffer must surface as one of these variants rather than a panic
/// or an out-of-bounds read. The message is dropped; session state is
/// unaffected.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer too short: need {need} bytes, have {have}")]
    TooShort { need: usize, have: usize },

    #[error("header length {header} disagrees with buffer length {actual}")]
    LengthMismatch { header: usize, actual: usize },

    #[error("unsupported OpenFlow version 0x{0:02x}")]
    UnsupportedVersion(u8),

    #[error("malformed TLV: {0}")]
    MalformedTlv(&'static str),
}

impl From<io::Error> for DecodeError {
    /// Cursor reads only fail when the buffer runs out.
    fn from(_: io::Error) -> DecodeError {
        DecodeError::TooShort { need: 0, have: 0 }
    }
}

/// Failure to marshal a message into wire bytes.
///
/// Every inner length field (match, action, instruction) is bounded by the
/// total message length, so the datagram-limit check covers them all.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    #[error("message length {0} exceeds the 65535-byte datagram limit")]
    TooLong(usize),
}

/// Socket-level failure. Fatal to the process, per the error taxonomy:
/// nothing at the session layer can recover a dead socket.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to bind UDP socket: {0}")]
    Bind(#[source] io::Error),

    #[error("socket send failed: {0}")]
    Send(#[source] io::Error),

    #[error("socket receive failed: {0}")]
    Recv(#[source] io::Error),
}

/// Top-level error for the controller binary.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
}

pub type Result<T> = std::result::Result<T, Error>;
