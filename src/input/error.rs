//! Errors caused by input creation and frame extraction.

use audiopus::Error as OpusError;
use serde_json::Error as JsonError;
use std::{error::Error as StdError, fmt, io::Error as IoError};

/// An error returned when opening an [`Input`], or pulling frames from one.
///
/// [`Input`]: super::Input
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An error occurred while demuxing a DCA stream.
    Dca(DcaError),
    /// An error occurred while reading, or opening a file.
    Io(IoError),
    /// An error occurred while demuxing an Ogg stream.
    Ogg(OggError),
    /// An error occurred within the Opus codec.
    Opus(OpusError),
    /// The PCM resampler could not be built, or failed mid-stream.
    Resample(Box<dyn StdError + Send + Sync>),
    /// Apparently failed to create stdout.
    Stdout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Dca(e) => write!(f, "invalid DCA stream: {e}"),
            Error::Io(e) => write!(f, "i/o failure: {e}"),
            Error::Ogg(e) => write!(f, "invalid Ogg stream: {e}"),
            Error::Opus(e) => write!(f, "opus failure: {e}"),
            Error::Resample(e) => write!(f, "resampler failure: {e}"),
            Error::Stdout => write!(f, "child process had no stdout"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Dca(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Ogg(e) => Some(e),
            Error::Opus(e) => Some(e),
            Error::Resample(e) => Some(e.as_ref()),
            Error::Stdout => None,
        }
    }
}

impl From<DcaError> for Error {
    fn from(e: DcaError) -> Self {
        Error::Dca(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Error {
        Error::Io(e)
    }
}

impl From<OggError> for Error {
    fn from(e: OggError) -> Self {
        Error::Ogg(e)
    }
}

impl From<OpusError> for Error {
    fn from(e: OpusError) -> Error {
        Error::Opus(e)
    }
}

/// An error returned while reading a DCA stream.
#[derive(Debug)]
#[non_exhaustive]
pub enum DcaError {
    /// The JSON metadata block in the file header could not be parsed.
    InvalidMetadata(JsonError),
    /// Invalid header or frame length.
    InvalidSize(i32),
}

impl fmt::Display for DcaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DcaError::InvalidMetadata(e) => write!(f, "bad metadata block: {e}"),
            DcaError::InvalidSize(n) => write!(f, "illegal length prefix {n}"),
        }
    }
}

impl StdError for DcaError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DcaError::InvalidMetadata(e) => Some(e),
            DcaError::InvalidSize(_) => None,
        }
    }
}

/// An error returned while demuxing Ogg pages.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum OggError {
    /// A page did not begin with the `OggS` capture pattern.
    BadCapture,
    /// A page declared an unsupported stream structure version.
    UnsupportedVersion(u8),
}

impl fmt::Display for OggError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OggError::BadCapture => write!(f, "missing page capture pattern"),
            OggError::UnsupportedVersion(v) => write!(f, "unsupported page version {v}"),
        }
    }
}

impl StdError for OggError {}

/// Convenience type for fallible return of [`Input`]s and frames.
///
/// [`Input`]: super::Input
pub type Result<T> = std::result::Result<T, Error>;
