//! Encoding of raw signed 16-bit PCM into 20ms Opus frames.

use super::{
    error::{Error, Result},
    Frame,
    FrameKind,
};
use crate::constants::*;
use audiopus::{coder::Encoder as OpusEncoder, Application as CodingMode, Bitrate, Channels};
use bytes::Bytes;
use rubato::{FftFixedIn, Resampler};
use std::collections::VecDeque;

/// Input frames handed to the resampler at once.
const RESAMPLE_CHUNK: usize = 1024;

/// Converts an interleaved `i16` LE byte stream at any rate into 48kHz stereo
/// Opus frames.
pub(crate) struct PcmEncoder {
    channels: usize,
    encoder: OpusEncoder,
    resampler: Option<FftFixedIn<f32>>,
    carry: Option<u8>,
    /// Planar samples at the source rate, awaiting resampling.
    pending: Vec<Vec<f32>>,
    /// Interleaved stereo samples at 48kHz, awaiting encoding.
    out: VecDeque<f32>,
    packet: Vec<u8>,
}

impl PcmEncoder {
    pub(crate) fn new(sample_rate: u32, channels: u8, bitrate: Bitrate) -> Result<Self> {
        let channels = channels.clamp(1, 2) as usize;

        let mut encoder = OpusEncoder::new(SAMPLE_RATE, Channels::Stereo, CodingMode::Audio)?;
        encoder.set_bitrate(bitrate)?;

        let resampler = if sample_rate as usize == SAMPLE_RATE_RAW {
            None
        } else {
            Some(
                FftFixedIn::<f32>::new(
                    sample_rate as usize,
                    SAMPLE_RATE_RAW,
                    RESAMPLE_CHUNK,
                    2,
                    channels,
                )
                .map_err(|e| Error::Resample(Box::new(e)))?,
            )
        };

        Ok(Self {
            channels,
            encoder,
            resampler,
            carry: None,
            pending: vec![Vec::new(); channels],
            out: VecDeque::new(),
            packet: vec![0u8; VOICE_PACKET_MAX],
        })
    }

    pub(crate) fn set_bitrate(&mut self, bitrate: Bitrate) -> Result<()> {
        self.encoder.set_bitrate(bitrate).map_err(Into::into)
    }

    pub(crate) fn push(&mut self, data: &[u8]) -> Result<()> {
        let mut bytes = Vec::with_capacity(data.len() + 1);
        bytes.extend(self.carry.take());
        bytes.extend_from_slice(data);

        if bytes.len() % 2 == 1 {
            self.carry = bytes.pop();
        }

        for (i, sample) in bytes.chunks_exact(2).enumerate() {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            self.pending[i % self.channels].push(f32::from(value) / f32::from(i16::MAX));
        }

        self.resample(false)
    }

    /// Produces the next frame, if enough audio is buffered.
    ///
    /// Once `eof` is set, the final partial frame is zero-padded and returned as
    /// [`FrameKind::Short`].
    pub(crate) fn next_frame(&mut self, eof: bool) -> Result<Option<Frame>> {
        if eof {
            self.resample(true)?;
        }

        let kind = if self.out.len() >= STEREO_FRAME_SIZE {
            FrameKind::Audio
        } else if eof && !self.out.is_empty() {
            self.out.resize(STEREO_FRAME_SIZE, 0.0);
            FrameKind::Short
        } else {
            return Ok(None);
        };

        let samples: Vec<f32> = self.out.drain(..STEREO_FRAME_SIZE).collect();
        let len = self.encoder.encode_float(&samples[..], &mut self.packet[..])?;

        Ok(Some(Frame {
            payload: Bytes::copy_from_slice(&self.packet[..len]),
            kind,
        }))
    }

    fn resample(&mut self, flush: bool) -> Result<()> {
        let Some(resampler) = self.resampler.as_mut() else {
            let frames = buffered_frames(&self.pending);
            let planar: Vec<Vec<f32>> =
                self.pending.iter_mut().map(|ch| ch.drain(..frames).collect()).collect();
            interleave_stereo(&mut self.out, &planar, frames);
            return Ok(());
        };

        loop {
            let needed = resampler.input_frames_next();
            let available = buffered_frames(&self.pending);

            let chunk: Vec<Vec<f32>> = if available >= needed {
                self.pending
                    .iter_mut()
                    .map(|ch| ch.drain(..needed).collect())
                    .collect()
            } else if flush && available > 0 {
                self.pending
                    .iter_mut()
                    .map(|ch| ch.drain(..available).collect())
                    .collect()
            } else {
                return Ok(());
            };

            let resampled = if chunk[0].len() == needed {
                resampler.process(&chunk, None)
            } else {
                resampler.process_partial(Some(&chunk[..]), None)
            }
            .map_err(|e| Error::Resample(Box::new(e)))?;

            let frames = resampled.first().map_or(0, Vec::len);
            interleave_stereo(&mut self.out, &resampled, frames);
        }
    }
}

/// Complete multi-channel frames waiting at the source rate.
fn buffered_frames(pending: &[Vec<f32>]) -> usize {
    pending.iter().map(Vec::len).min().unwrap_or(0)
}

/// Appends planar mono or stereo audio to `out` as interleaved stereo.
fn interleave_stereo(out: &mut VecDeque<f32>, planar: &[Vec<f32>], frames: usize) {
    out.reserve(2 * frames);
    for i in 0..frames {
        let left = planar[0][i];
        let right = planar.get(1).map_or(left, |ch| ch[i]);
        out.push_back(left);
        out.push_back(right);
    }
}

/// Generates `frames` samples of interleaved stereo `i16` LE sine at 440Hz.
#[cfg(test)]
pub(crate) fn make_pcm_sine(frames: usize, sample_rate: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(frames * 4);
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let v = ((t * 440.0 * std::f32::consts::TAU).sin() * 8_000.0) as i16;
        out.extend_from_slice(&v.to_le_bytes());
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
