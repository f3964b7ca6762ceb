//! Minimal Ethernet frame inspection.
//!
//! The learning switch only ever needs the source and destination MAC of the
//! frame embedded in a PACKET_IN; anything past the Ethernet header is opaque
//! payload that gets replayed verbatim in PACKET_OUT.

use std::fmt;

/// A MAC address as it appears on the wire.
pub type MacAddr = [u8; 6];

/// Minimum parseable Ethernet header: dst (6) + src (6) + ethertype (2).
const ETH_HEADER_LEN: usize = 14;

/// Render a MAC in the conventional colon-separated form for log lines.
pub fn mac_to_string(mac: &MacAddr) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// The link-layer view of a frame carried by PACKET_IN.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EthernetFrame {
    pub dl_dst: MacAddr,
    pub dl_src: MacAddr,
    pub ethertype: u16,
}

impl EthernetFrame {
    /// Parse the Ethernet header off the front of `buf`. Returns `None` when
    /// the buffer cannot hold a full header; a truncated frame is dropped by
    /// the caller, never an error worth tearing anything down over.
    pub fn parse(buf: &[u8]) -> Option<EthernetFrame> {
        if buf.len() < ETH_HEADER_LEN {
            return None;
        }
        let mut dl_dst = [0; 6];
        let mut dl_src = [0; 6];
        dl_dst.copy_from_slice(&buf[0..6]);
        dl_src.copy_from_slice(&buf[6..12]);
        let ethertype = u16::from_be_bytes([buf[12], buf[13]]);
        Some(EthernetFrame {
            dl_dst,
            dl_src,
            ethertype,
        })
    }

    /// Whether the destination is a group (broadcast/multicast) address.
    pub fn is_group_dst(&self) -> bool {
        self.dl_dst[0] & 1 == 1
    }
}

impl fmt::Debug for EthernetFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EthernetFrame")
            .field("dl_dst", &mac_to_string(&self.dl_dst))
            .field("dl_src", &mac_to_string(&self.dl_src))
            .field("ethertype", &format_args!("0x{:04x}", self.ethertype))
            .finish()
    }
}
