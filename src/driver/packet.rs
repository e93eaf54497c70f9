//! Outbound RTP sequencing, and the voice server's UDP control packets.
//!
//! Packet layouts come from [`discortp`]; this module only fills in the fields
//! this client sends, and validates what the server sends back.

use crate::constants::*;
use discortp::{
    discord::{IpDiscoveryPacket, IpDiscoveryType, MutableIpDiscoveryPacket, MutableKeepalivePacket},
    rtp::{MutableRtpPacket, RtpPacket},
    Packet,
};
use std::{
    net::IpAddr,
    num::Wrapping,
    str::{self, FromStr},
};

/// Length of the IP discovery body, counted from after the length field.
const DISCOVERY_BODY_LEN: u16 = 70;

/// Width of the NUL-padded address field of an IP discovery packet.
const DISCOVERY_ADDRESS_LEN: usize = 64;

/// Fixed RTP header fields written by this client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RtpHeader {
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    /// Writes this header at the start of `packet`, as version 2 with no padding,
    /// extension or CSRCs.
    ///
    /// Returns `None` if `packet` cannot hold a fixed RTP header.
    pub fn write(self, packet: &mut [u8]) -> Option<()> {
        let mut rtp = MutableRtpPacket::new(packet)?;

        rtp.set_version(RTP_VERSION);
        rtp.set_padding(0);
        rtp.set_extension(0);
        rtp.set_csrc_count(0);
        rtp.set_marker(0);
        rtp.set_payload_type(RTP_PROFILE_TYPE);
        rtp.set_sequence(self.sequence.into());
        rtp.set_timestamp(self.timestamp.into());
        rtp.set_ssrc(self.ssrc);

        Some(())
    }

    pub fn to_bytes(self) -> [u8; RTP_HEADER_LEN] {
        let mut out = [0u8; RTP_HEADER_LEN];
        // The buffer is exactly one fixed header long.
        let _ = self.write(&mut out);
        out
    }
}

/// Per-stream sequence number and timestamp generator.
///
/// Both counters wrap, and are randomly seeded on creation.
#[derive(Clone, Debug)]
pub struct PacketSequence {
    sequence: Wrapping<u16>,
    timestamp: Wrapping<u32>,
    ssrc: u32,
}

impl PacketSequence {
    pub fn new(ssrc: u32) -> Self {
        Self::starting_at(ssrc, rand::random(), rand::random())
    }

    pub fn starting_at(ssrc: u32, sequence: u16, timestamp: u32) -> Self {
        Self {
            sequence: Wrapping(sequence),
            timestamp: Wrapping(timestamp),
            ssrc,
        }
    }

    /// Returns the header for the next packet, then advances by one frame.
    pub fn next_header(&mut self) -> RtpHeader {
        let out = RtpHeader {
            sequence: self.sequence.0,
            timestamp: self.timestamp.0,
            ssrc: self.ssrc,
        };

        self.sequence += Wrapping(1);
        self.timestamp += Wrapping(MONO_FRAME_SIZE as u32);

        out
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }
}

/// Number of leading bytes of `rtp` sent in the clear: the fixed header and its CSRCs.
///
/// Returns `None` if the packet is too short to hold the CSRCs it declares.
pub fn rtp_header_len(rtp: &RtpPacket<'_>) -> Option<usize> {
    let len = RTP_HEADER_LEN + 4 * usize::from(rtp.get_csrc_count());
    (rtp.packet().len() >= len).then_some(len)
}

/// Whether `rtp` is an Opus packet of the version and profile this client speaks.
pub fn rtp_valid(rtp: &RtpPacket<'_>) -> bool {
    rtp.get_version() == RTP_VERSION && rtp.get_payload_type() == RTP_PROFILE_TYPE
}

/// Builds the UDP keepalive sent while the transmit path is idle.
pub fn keepalive(ssrc: u32) -> [u8; KEEPALIVE_LEN] {
    let mut out = [0u8; KEEPALIVE_LEN];
    if let Some(mut ka) = MutableKeepalivePacket::new(&mut out[..]) {
        ka.set_ssrc(ssrc);
    }
    out
}

/// Errors from parsing an IP discovery response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiscoveryError {
    /// Wrong length or packet type.
    IllegalResponse,
    /// Address was not NUL-terminated, not ASCII, or not an IP address.
    IllegalIp,
}

fn discovery_packet(
    pkt_type: IpDiscoveryType,
    ssrc: u32,
    address: &[u8],
    port: u16,
) -> [u8; IP_DISCOVERY_LEN] {
    let mut out = [0u8; IP_DISCOVERY_LEN];

    // Keep at least one NUL after the address.
    let mut address_field = [0u8; DISCOVERY_ADDRESS_LEN];
    let len = address.len().min(DISCOVERY_ADDRESS_LEN - 1);
    address_field[..len].copy_from_slice(&address[..len]);

    if let Some(mut view) = MutableIpDiscoveryPacket::new(&mut out[..]) {
        view.set_pkt_type(pkt_type);
        view.set_length(DISCOVERY_BODY_LEN);
        view.set_ssrc(ssrc);
        view.set_address(&address_field);
        view.set_port(port);
    }

    out
}

/// Builds an IP discovery request for `ssrc`.
pub fn discovery_request(ssrc: u32) -> [u8; IP_DISCOVERY_LEN] {
    discovery_packet(IpDiscoveryType::Request, ssrc, &[], 0)
}

/// Builds an IP discovery response, as sent by the voice server.
pub fn discovery_response(ssrc: u32, address: IpAddr, port: u16) -> [u8; IP_DISCOVERY_LEN] {
    discovery_packet(
        IpDiscoveryType::Response,
        ssrc,
        address.to_string().as_bytes(),
        port,
    )
}

/// Extracts our externally visible address and port from a discovery response.
pub fn parse_discovery_response(raw: &[u8]) -> Result<(IpAddr, u16), DiscoveryError> {
    let view = IpDiscoveryPacket::new(raw).ok_or(DiscoveryError::IllegalResponse)?;

    if view.get_pkt_type() != IpDiscoveryType::Response {
        return Err(DiscoveryError::IllegalResponse);
    }

    // A spoofed response may have no NUL at all, so scan rather than assume.
    let address_raw = view.get_address_raw();
    let nul_byte_index = address_raw
        .iter()
        .position(|&b| b == 0)
        .ok_or(DiscoveryError::IllegalIp)?;

    let address_str =
        str::from_utf8(&address_raw[..nul_byte_index]).map_err(|_| DiscoveryError::IllegalIp)?;
    let address = IpAddr::from_str(address_str).map_err(|_| DiscoveryError::IllegalIp)?;

    Ok((address, view.get_port()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use discortp::demux::{demux, Demuxed};
    use std::net::Ipv4Addr;

    #[test]
    fn header_layout() {
        let header = RtpHeader {
            sequence: 0x0102,
            timestamp: 0x0304_0506,
            ssrc: 0x0708_090a,
        }
        .to_bytes();

        assert_eq!(header, [0x80, 0x78, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);

        let rtp = RtpPacket::new(&header).unwrap();
        assert!(rtp_valid(&rtp));
        assert_eq!(u16::from(rtp.get_sequence()), 0x0102);
        assert_eq!(u32::from(rtp.get_timestamp()), 0x0304_0506);
        assert_eq!(rtp.get_ssrc(), 0x0708_090a);
        assert_eq!(rtp.get_extension(), 0);
        assert_eq!(rtp_header_len(&rtp), Some(RTP_HEADER_LEN));
    }

    #[test]
    fn short_buffers_take_no_header() {
        let mut buf = [0u8; RTP_HEADER_LEN - 1];

        assert!(RtpHeader {
            sequence: 1,
            timestamp: 1,
            ssrc: 1,
        }
        .write(&mut buf)
        .is_none());
    }

    #[test]
    fn declared_csrcs_must_fit() {
        let mut pkt = RtpHeader {
            sequence: 1,
            timestamp: 1,
            ssrc: 1,
        }
        .to_bytes()
        .to_vec();
        pkt[0] |= 2;

        assert_eq!(rtp_header_len(&RtpPacket::new(&pkt).unwrap()), None);

        pkt.extend_from_slice(&[0u8; 8]);
        assert_eq!(
            rtp_header_len(&RtpPacket::new(&pkt).unwrap()),
            Some(RTP_HEADER_LEN + 8)
        );
    }

    #[test]
    fn sequence_and_timestamp_wrap_monotonically() {
        let mut seq = PacketSequence::starting_at(1, u16::MAX - 2, u32::MAX - 1500);
        let mut last = seq.next_header();

        for _ in 0..10 {
            let next = seq.next_header();
            assert_eq!(next.sequence, last.sequence.wrapping_add(1));
            assert_eq!(next.timestamp, last.timestamp.wrapping_add(960));
            // Modular distance never goes backwards.
            assert!(next.sequence.wrapping_sub(last.sequence) < 1 << 15);
            last = next;
        }

        assert_eq!(last.sequence, 7);
    }

    #[test]
    fn discovery_round_trip() {
        let req = discovery_request(0xdead_beef);
        assert_eq!(&req[..8], &[0, 1, 0, 70, 0xde, 0xad, 0xbe, 0xef]);
        assert!(req[8..].iter().all(|&b| b == 0));

        let resp = discovery_response(0xdead_beef, Ipv4Addr::new(203, 0, 113, 9).into(), 50_004);
        let (addr, port) = parse_discovery_response(&resp).unwrap();

        assert_eq!(addr, IpAddr::from(Ipv4Addr::new(203, 0, 113, 9)));
        assert_eq!(port, 50_004);
    }

    #[test]
    fn discovery_rejects_bad_responses() {
        let req = discovery_request(1);
        assert_eq!(parse_discovery_response(&req), Err(DiscoveryError::IllegalResponse));
        assert_eq!(parse_discovery_response(&req[..10]), Err(DiscoveryError::IllegalResponse));

        let mut no_nul = discovery_response(1, Ipv4Addr::LOCALHOST.into(), 1);
        no_nul[8..72].fill(b'1');
        assert_eq!(parse_discovery_response(&no_nul), Err(DiscoveryError::IllegalIp));

        let mut garbage = discovery_response(1, Ipv4Addr::LOCALHOST.into(), 1);
        garbage[8..12].copy_from_slice(b"abc\0");
        assert_eq!(parse_discovery_response(&garbage), Err(DiscoveryError::IllegalIp));
    }

    #[test]
    fn keepalives_are_not_rtp() {
        let ka = keepalive(0x0102_0304);
        assert_eq!(ka, [1, 2, 3, 4]);

        assert!(!matches!(demux(&ka), Demuxed::Rtp(_)));

        let header = PacketSequence::new(5).next_header().to_bytes();
        assert!(matches!(demux(&header), Demuxed::Rtp(rtp) if rtp.get_ssrc() == 5));
    }
}
