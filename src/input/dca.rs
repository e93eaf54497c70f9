//! Demuxing of length-prefixed Opus streams, with an optional DCA1 header.

use super::error::DcaError;
use byteorder::{ByteOrder, LittleEndian};
use bytes::{Buf, Bytes, BytesMut};
use serde::Deserialize;
use tracing::debug;

const MAGIC: &[u8; 4] = b"DCA1";

#[derive(Debug, Default)]
enum Stage {
    #[default]
    Header,
    Frames,
}

#[derive(Debug, Default)]
pub(crate) struct DcaDemuxer {
    buf: BytesMut,
    stage: Stage,
}

impl DcaDemuxer {
    pub(crate) fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub(crate) fn has_remainder(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Returns the next Opus packet, or `None` if more input is needed.
    ///
    /// Once the stream has ended, `eof` lets a short stream with no header resolve.
    pub(crate) fn next_packet(&mut self, eof: bool) -> Result<Option<Bytes>, DcaError> {
        if let Stage::Header = self.stage {
            if !self.skip_header(eof)? {
                return Ok(None);
            }
        }

        if self.buf.len() < 2 {
            return Ok(None);
        }

        let len = LittleEndian::read_i16(&self.buf[..2]);
        if len < 0 {
            return Err(DcaError::InvalidSize(len.into()));
        }

        let len = len as usize;
        if self.buf.len() < 2 + len {
            return Ok(None);
        }

        self.buf.advance(2);
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    fn skip_header(&mut self, eof: bool) -> Result<bool, DcaError> {
        if self.buf.len() < MAGIC.len() {
            if eof {
                self.stage = Stage::Frames;
            }
            return Ok(eof);
        }

        if &self.buf[..4] != MAGIC {
            self.stage = Stage::Frames;
            return Ok(true);
        }

        if self.buf.len() < 8 {
            return Ok(false);
        }

        let size = LittleEndian::read_i32(&self.buf[4..8]);

        // Sanity check
        if size < 2 {
            return Err(DcaError::InvalidSize(size));
        }

        let size = size as usize;
        if self.buf.len() < 8 + size {
            return Ok(false);
        }

        self.buf.advance(8);
        let raw_json = self.buf.split_to(size);
        let metadata: DcaMetadata =
            serde_json::from_slice(&raw_json).map_err(DcaError::InvalidMetadata)?;
        let (title, artist) = metadata
            .info
            .map(|i| (i.title, i.artist))
            .unwrap_or_default();
        debug!(
            "DCA stream: {}Hz, {} channel(s), title {:?}, artist {:?}.",
            metadata.opus.sample_rate, metadata.opus.channels, title, artist
        );

        self.stage = Stage::Frames;
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct DcaMetadata {
    opus: Opus,
    info: Option<Info>,
}

#[derive(Debug, Deserialize)]
struct Opus {
    sample_rate: u32,
    channels: u8,
}

#[derive(Debug, Deserialize)]
struct Info {
    title: Option<String>,
    artist: Option<String>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn frames(packets: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for pkt in packets {
            out.extend_from_slice(&(pkt.len() as i16).to_le_bytes());
            out.extend_from_slice(pkt);
        }
        out
    }

    #[test]
    fn headerless_stream() {
        let mut demux = DcaDemuxer::default();
        demux.push(&frames(&[b"hello", b"opus"]));

        assert_eq!(demux.next_packet(false).unwrap().as_deref(), Some(&b"hello"[..]));
        assert_eq!(demux.next_packet(false).unwrap().as_deref(), Some(&b"opus"[..]));
        assert_eq!(demux.next_packet(true).unwrap(), None);
        assert!(!demux.has_remainder());
    }

    #[test]
    fn dca1_header_is_skipped() {
        let json = br#"{"opus":{"sample_rate":48000,"channels":2},"info":{"title":"t","artist":null}}"#;
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&(json.len() as i32).to_le_bytes());
        data.extend_from_slice(json);
        data.extend(frames(&[b"abc"]));

        let mut demux = DcaDemuxer::default();
        for chunk in data.chunks(3) {
            demux.push(chunk);
        }

        assert_eq!(demux.next_packet(false).unwrap().as_deref(), Some(&b"abc"[..]));
    }

    #[test]
    fn split_frame_waits() {
        let data = frames(&[b"abcdef"]);
        let mut demux = DcaDemuxer::default();

        demux.push(&data[..4]);
        assert_eq!(demux.next_packet(false).unwrap(), None);
        demux.push(&data[4..]);
        assert_eq!(demux.next_packet(false).unwrap().as_deref(), Some(&b"abcdef"[..]));
    }

    #[test]
    fn negative_length_is_an_error() {
        let mut demux = DcaDemuxer::default();
        demux.push(&frames(&[b"ok"]));
        demux.push(&(-5i16).to_le_bytes());

        assert!(demux.next_packet(false).unwrap().is_some());
        assert!(matches!(demux.next_packet(false), Err(DcaError::InvalidSize(-5))));
    }
}
