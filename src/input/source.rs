use super::{
    dca::DcaDemuxer,
    error::Result,
    ogg::OggDemuxer,
    pcm::PcmEncoder,
    Codec,
    Frame,
    FrameResult,
    Reader,
};
use crate::constants::DEFAULT_BITRATE;
use audiopus::Bitrate;
use tracing::trace;

/// Bytes requested from a [`Reader`] per refill.
const READ_CHUNK: usize = 4096;

enum SourceState {
    Ogg(OggDemuxer),
    Dca(DcaDemuxer),
    Pcm {
        sample_rate: u32,
        channels: u8,
        encoder: Option<PcmEncoder>,
    },
}

/// A stream of 20ms Opus frames, built from an [`Input`](super::Input).
///
/// Opus containers are demuxed without decoding. PCM is encoded lazily, so the
/// bitrate set before the first frame is used from the start.
///
/// Sources are polled by the frame pacer once per frame, shortly after the
/// previous frame has been sent.
pub struct Source {
    reader: Reader,
    state: SourceState,
    bitrate: Bitrate,
    eof: bool,
}

impl Source {
    pub(crate) fn new(reader: Reader, codec: Codec) -> Self {
        let state = match codec {
            Codec::Ogg => SourceState::Ogg(OggDemuxer::default()),
            Codec::Dca => SourceState::Dca(DcaDemuxer::default()),
            Codec::Pcm {
                sample_rate,
                channels,
            } => SourceState::Pcm {
                sample_rate,
                channels,
                encoder: None,
            },
        };

        Self {
            reader,
            state,
            bitrate: DEFAULT_BITRATE,
            eof: false,
        }
    }

    fn try_frame(&mut self) -> Result<Option<Frame>> {
        let eof = self.eof;

        Ok(match &mut self.state {
            SourceState::Ogg(demux) => demux.next_packet()?.map(Frame::audio),
            SourceState::Dca(demux) => demux.next_packet(eof)?.map(Frame::audio),
            SourceState::Pcm { encoder, .. } => match encoder {
                Some(encoder) => encoder.next_frame(eof)?,
                None => None,
            },
        })
    }

    fn push(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.state {
            SourceState::Ogg(demux) => demux.push(data),
            SourceState::Dca(demux) => demux.push(data),
            SourceState::Pcm {
                sample_rate,
                channels,
                encoder,
            } => {
                if encoder.is_none() {
                    *encoder = Some(PcmEncoder::new(*sample_rate, *channels, self.bitrate)?);
                }
                if let Some(encoder) = encoder {
                    encoder.push(data)?;
                }
            },
        }

        Ok(())
    }

    fn has_remainder(&self) -> bool {
        match &self.state {
            SourceState::Ogg(demux) => demux.has_remainder(),
            SourceState::Dca(demux) => demux.has_remainder(),
            SourceState::Pcm { .. } => false,
        }
    }

    /// Pulls the next frame, or reports that the stream has finished.
    pub(crate) async fn next_frame(&mut self) -> Result<FrameResult> {
        loop {
            if let Some(frame) = self.try_frame()? {
                return Ok(FrameResult::Frame(frame));
            }

            if self.eof {
                if self.has_remainder() {
                    trace!("Discarding trailing bytes of truncated stream.");
                }
                return Ok(FrameResult::EndOfSource);
            }

            match self.reader.read(READ_CHUNK).await? {
                Some(bytes) => self.push(&bytes)?,
                None => self.eof = true,
            }
        }
    }

    /// Changes the encoder bitrate. Only PCM sources encode audio.
    pub(crate) fn set_bitrate(&mut self, bitrate: Bitrate) -> Result<()> {
        self.bitrate = bitrate;

        match &mut self.state {
            SourceState::Pcm {
                encoder: Some(encoder),
                ..
            } => encoder.set_bitrate(bitrate),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{
        dca::tests::frames,
        error::Error,
        ogg::tests::opus_stream,
        pcm::make_pcm_sine,
        FrameKind,
        Input,
    };

    async fn collect(source: &mut Source) -> Result<Vec<Frame>> {
        let mut out = vec![];
        loop {
            match source.next_frame().await? {
                FrameResult::Frame(f) => out.push(f),
                FrameResult::EndOfSource => return Ok(out),
            }
        }
    }

    #[tokio::test]
    async fn ogg_memory_input_yields_packets_then_ends() {
        let data = opus_stream(&[b"one", b"two", b"three"]);
        let mut source = Input::memory(data, Codec::Ogg).into_source();

        let frames = collect(&mut source).await.unwrap();
        let payloads: Vec<&[u8]> = frames.iter().map(|f| &f.payload[..]).collect();
        assert_eq!(payloads, vec![&b"one"[..], b"two", b"three"]);
        assert!(frames.iter().all(|f| f.kind == FrameKind::Audio));

        assert_eq!(source.next_frame().await.unwrap(), FrameResult::EndOfSource);
    }

    #[tokio::test]
    async fn dca_memory_input() {
        let data = frames(&[b"abc", b"de"]);
        let mut source = Input::memory(data, Codec::Dca).into_source();

        let frames = collect(&mut source).await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[1].payload[..], b"de");
    }

    #[tokio::test]
    async fn pcm_ends_on_short_frame() {
        let data = make_pcm_sine(960 * 3 + 100, 48_000);
        let mut source = Input::memory(data, Codec::Pcm {
            sample_rate: 48_000,
            channels: 2,
        })
        .into_source();

        let frames = collect(&mut source).await.unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[3].kind, FrameKind::Short);
    }

    #[tokio::test]
    async fn garbage_is_an_encoding_error() {
        let mut source = Input::memory(vec![0x42u8; 512], Codec::Ogg).into_source();

        assert!(matches!(source.next_frame().await, Err(Error::Ogg(_))));
    }

    #[tokio::test]
    async fn empty_input_ends_immediately() {
        let mut source = Input::memory(Vec::<u8>::new(), Codec::Dca).into_source();

        assert_eq!(source.next_frame().await.unwrap(), FrameResult::EndOfSource);
    }
}
