//! Demuxing of Ogg-encapsulated Opus streams.

use super::error::OggError;
use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;
use tracing::{trace, warn};

const CAPTURE: &[u8; 4] = b"OggS";
const PAGE_HEADER_LEN: usize = 27;
const CONTINUED_PACKET: u8 = 0x01;
const LACING_CONTINUES: u8 = 255;
const OPUS_HEAD: &[u8] = b"OpusHead";
const OPUS_TAGS: &[u8] = b"OpusTags";

/// Incremental Ogg page parser yielding the Opus audio packets of the first
/// logical stream.
///
/// Packets may span page boundaries. The `OpusHead` and `OpusTags` header
/// packets are skipped, as are pages belonging to other logical streams.
#[derive(Debug, Default)]
pub(crate) struct OggDemuxer {
    buf: BytesMut,
    partial: BytesMut,
    packets: VecDeque<Bytes>,
    serial: Option<u32>,
}

impl OggDemuxer {
    pub(crate) fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the next complete audio packet, or `None` if more input is needed.
    pub(crate) fn next_packet(&mut self) -> Result<Option<Bytes>, OggError> {
        loop {
            if let Some(pkt) = self.packets.pop_front() {
                return Ok(Some(pkt));
            }

            if !self.parse_page()? {
                return Ok(None);
            }
        }
    }

    /// Whether buffered bytes remain which never formed a complete packet.
    pub(crate) fn has_remainder(&self) -> bool {
        !(self.buf.is_empty() && self.partial.is_empty())
    }

    fn parse_page(&mut self) -> Result<bool, OggError> {
        if self.buf.len() < PAGE_HEADER_LEN {
            return Ok(false);
        }

        if &self.buf[..4] != CAPTURE {
            return Err(OggError::BadCapture);
        }

        if self.buf[4] != 0 {
            return Err(OggError::UnsupportedVersion(self.buf[4]));
        }

        let header_type = self.buf[5];
        let serial = LittleEndian::read_u32(&self.buf[14..18]);
        let n_segments = self.buf[26] as usize;
        let header_len = PAGE_HEADER_LEN + n_segments;

        if self.buf.len() < header_len {
            return Ok(false);
        }

        let lacing = self.buf[PAGE_HEADER_LEN..header_len].to_vec();
        let body_len: usize = lacing.iter().map(|&l| l as usize).sum();

        if self.buf.len() < header_len + body_len {
            return Ok(false);
        }

        self.buf.advance(header_len);
        let body = self.buf.split_to(body_len).freeze();

        let stream = *self.serial.get_or_insert(serial);
        if stream != serial {
            trace!("Skipping page of foreign Ogg stream {serial}.");
            return Ok(true);
        }

        if header_type & CONTINUED_PACKET == 0 && !self.partial.is_empty() {
            warn!("Ogg packet was not continued onto the next page; discarding.");
            self.partial.clear();
        }

        let mut offset = 0;
        for len in lacing {
            let len = len as usize;
            self.partial.extend_from_slice(&body[offset..offset + len]);
            offset += len;

            if len != LACING_CONTINUES as usize {
                let packet = self.partial.split().freeze();
                if !(packet.starts_with(OPUS_HEAD) || packet.starts_with(OPUS_TAGS)) {
                    self.packets.push_back(packet);
                }
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds one Ogg page holding `segments` (already split at lacing boundaries).
    pub(crate) fn page(continued: bool, serial: u32, lacing: &[u8], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(CAPTURE);
        out.push(0);
        out.push(if continued { CONTINUED_PACKET } else { 0 });
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&serial.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        out.push(lacing.len() as u8);
        out.extend_from_slice(lacing);
        out.extend_from_slice(body);
        out
    }

    /// A minimal Ogg Opus stream: header pages, then one page per packet.
    pub(crate) fn opus_stream(packets: &[&[u8]]) -> Vec<u8> {
        let mut out = page(false, 7, &[19], b"OpusHead\x01\x02\x00\x00\x80\xbb\x00\x00\x00\x00\x00");
        out.extend(page(false, 7, &[8], OPUS_TAGS));
        for pkt in packets {
            out.extend(page(false, 7, &[pkt.len() as u8], pkt));
        }
        out
    }

    #[test]
    fn skips_headers_and_yields_packets() {
        let mut demux = OggDemuxer::default();
        demux.push(&opus_stream(&[b"abc", b"defg"]));

        assert_eq!(demux.next_packet().unwrap().as_deref(), Some(&b"abc"[..]));
        assert_eq!(demux.next_packet().unwrap().as_deref(), Some(&b"defg"[..]));
        assert_eq!(demux.next_packet().unwrap(), None);
        assert!(!demux.has_remainder());
    }

    #[test]
    fn packet_spans_pages_and_segments() {
        let big = vec![9u8; 300];
        let mut first = page(false, 1, &[255], &big[..255]);
        let second = page(true, 1, &[45, 2], &[&big[255..], &b"xy"[..]].concat());
        first.extend(second);

        let mut demux = OggDemuxer::default();

        // Feed in arbitrary small chunks, crossing every boundary.
        for chunk in first.chunks(7) {
            demux.push(chunk);
        }

        assert_eq!(demux.next_packet().unwrap().as_deref(), Some(&big[..]));
        assert_eq!(demux.next_packet().unwrap().as_deref(), Some(&b"xy"[..]));
        assert_eq!(demux.next_packet().unwrap(), None);
    }

    #[test]
    fn incomplete_page_waits_for_more() {
        let data = page(false, 3, &[4], b"abcd");
        let mut demux = OggDemuxer::default();

        demux.push(&data[..data.len() - 1]);
        assert_eq!(demux.next_packet().unwrap(), None);
        assert!(demux.has_remainder());

        demux.push(&data[data.len() - 1..]);
        assert_eq!(demux.next_packet().unwrap().as_deref(), Some(&b"abcd"[..]));
    }

    #[test]
    fn foreign_streams_are_ignored() {
        let mut data = page(false, 3, &[2], b"ok");
        data.extend(page(false, 4, &[2], b"no"));

        let mut demux = OggDemuxer::default();
        demux.push(&data);

        assert_eq!(demux.next_packet().unwrap().as_deref(), Some(&b"ok"[..]));
        assert_eq!(demux.next_packet().unwrap(), None);
    }

    #[test]
    fn garbage_is_rejected() {
        let mut demux = OggDemuxer::default();
        demux.push(&[0u8; 40]);
        assert_eq!(demux.next_packet(), Err(OggError::BadCapture));
    }
}
