//! Raw audio input data streams and sources.
//!
//! An [`Input`] combines metadata with:
//!  * a byte stream, via [`Reader`],
//!  * a [`Codec`], describing how that byte stream becomes Opus frames.
//!
//! Ogg Opus and DCA streams are passed through frame-by-frame without decoding.
//! Raw PCM is resampled and encoded in-crate. Any other format must be converted
//! first, e.g. by [`Input::ffmpeg`].

mod child;
mod dca;
pub mod error;
mod ffmpeg;
mod metadata;
mod ogg;
mod pcm;
pub mod reader;
mod source;

pub use self::{
    child::ChildContainer,
    error::{Error, Result},
    metadata::Metadata,
    reader::Reader,
    source::Source,
};

use crate::constants::SILENT_FRAME;
use bytes::Bytes;
use std::path::PathBuf;

/// Framing and encoding of a [`Reader`]'s byte stream.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Codec {
    /// Ogg-encapsulated Opus, as produced by `ffmpeg -f opus`.
    Ogg,
    /// Opus packets prefixed by their `i16` LE length, optionally following a
    /// `DCA1` metadata header.
    Dca,
    /// Interleaved signed 16-bit little-endian PCM.
    ///
    /// Mono input is upmixed, and other sample rates are resampled to 48kHz.
    Pcm { sample_rate: u32, channels: u8 },
}

/// How an [`Input`] was created, used to open the same audio again.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Origin {
    Memory(Bytes, Codec),
    File(PathBuf, Codec),
    Ffmpeg(PathBuf),
}

impl Origin {
    /// Opens a fresh [`Input`] over the same audio.
    pub async fn open(&self) -> Result<Input> {
        match self {
            Origin::Memory(bytes, codec) => Ok(Input::memory(bytes.clone(), *codec)),
            Origin::File(path, codec) => Input::file(path.clone(), *codec).await,
            Origin::Ffmpeg(path) => Input::ffmpeg(path).await,
        }
    }
}

/// An audio source, which can be turned into a stream of 20ms Opus frames.
#[derive(Debug)]
pub struct Input {
    /// Byte stream holding the audio.
    pub reader: Reader,
    /// Encoding of [`Self::reader`].
    pub codec: Codec,
    /// Descriptive information about the stream.
    pub metadata: Metadata,
    origin: Option<Origin>,
}

impl Input {
    /// Wraps an in-memory buffer.
    pub fn memory(bytes: impl Into<Bytes>, codec: Codec) -> Self {
        let bytes = bytes.into();

        Self {
            reader: Reader::from(bytes.clone()),
            codec,
            metadata: Metadata::default(),
            origin: Some(Origin::Memory(bytes, codec)),
        }
    }

    /// Opens a file on the local filesystem.
    pub async fn file(path: impl Into<PathBuf>, codec: Codec) -> Result<Self> {
        let path = path.into();
        let file = tokio::fs::File::open(&path).await?;

        Ok(Self {
            reader: Reader::File(file),
            codec,
            metadata: Metadata {
                source_url: Some(path.display().to_string()),
                ..Default::default()
            },
            origin: Some(Origin::File(path, codec)),
        })
    }

    /// Wraps any other byte stream. Such inputs cannot be replayed from history.
    pub fn from_reader(reader: Reader, codec: Codec) -> Self {
        Self {
            reader,
            codec,
            metadata: Metadata::default(),
            origin: None,
        }
    }

    /// Replaces this input's metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// How to reopen this input, if possible.
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.as_ref()
    }

    /// Consumes this input, producing a frame source.
    pub fn into_source(self) -> Source {
        Source::new(self.reader, self.codec)
    }
}

/// One 20ms unit of Opus audio.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Frame {
    pub payload: Bytes,
    pub kind: FrameKind,
}

impl Frame {
    /// A complete frame of Opus audio.
    pub fn audio(payload: Bytes) -> Self {
        Self {
            payload,
            kind: FrameKind::Audio,
        }
    }

    /// The Opus encoding of 20ms of silence.
    pub fn silence() -> Self {
        Self {
            payload: Bytes::from_static(&SILENT_FRAME),
            kind: FrameKind::Silence,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FrameKind {
    /// A complete frame of audio.
    Audio,
    /// The final frame of a PCM stream, padded with silence.
    Short,
    /// Inserted silence.
    Silence,
}

/// Result of polling a [`Source`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FrameResult {
    Frame(Frame),
    EndOfSource,
}
