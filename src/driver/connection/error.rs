//! Connection errors and convenience types.

use crate::{
    driver::{
        crypto::InvalidKeyLength,
        packet::DiscoveryError,
        tasks::{error::Recipient, message::*},
    },
    model::CloseCode,
    ws::Error as WsError,
};
use flume::SendError;
use serde_json::Error as JsonError;
use std::{error::Error as StdError, fmt, io::Error as IoError};

/// Errors encountered while connecting to a voice server over the driver.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The driver hung up an internal signaller, either due to another connection attempt
    /// or a crash.
    AttemptDiscarded,
    /// The negotiated secret key could not build a cipher.
    Crypto(InvalidKeyLength),
    /// Server did not return the expected crypto mode during negotiation.
    CryptoModeInvalid,
    /// None of the configured crypto modes were offered by the server.
    CryptoModeUnavailable,
    /// An indicator that an endpoint URL was invalid.
    EndpointUrl,
    /// The voice server's hello/ready (or resume) handshake was violated.
    ExpectedHandshake,
    /// The voice server failed to correctly respond to IP discovery.
    IllegalDiscoveryResponse,
    /// Could not parse the voice server's view of our IP.
    IllegalIp,
    /// Miscellaneous I/O error.
    Io(IoError),
    /// JSON (de)serialization error.
    Json(JsonError),
    /// Failed to message other background tasks after connection establishment.
    InterconnectFailure(Recipient),
    /// The handshake did not complete within the configured timeout.
    TimedOut,
    /// Error communicating with the voice server over websocket.
    Ws(WsError),
}

impl Error {
    /// Whether this error was a rejection or violation of the voice handshake itself.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            Error::Crypto(_)
                | Error::CryptoModeInvalid
                | Error::CryptoModeUnavailable
                | Error::ExpectedHandshake
                | Error::IllegalDiscoveryResponse
                | Error::IllegalIp
        )
    }

    /// Whether another attempt with identical connection info might succeed.
    pub fn should_retry(&self) -> bool {
        match self {
            Error::Ws(e) => !self
                .close_code()
                .map_or(false, |code| code.is_terminal())
                && !matches!(e, WsError::UnexpectedBinaryMessage(_)),
            Error::Io(_)
            | Error::Json(_)
            | Error::ExpectedHandshake
            | Error::IllegalDiscoveryResponse
            | Error::IllegalIp
            | Error::InterconnectFailure(_)
            | Error::TimedOut => true,
            _ => false,
        }
    }

    /// The voice server's close code, if the websocket was closed with a known one.
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            Error::Ws(e) => e.close_code().and_then(|c| CloseCode::try_from(c).ok()),
            _ => None,
        }
    }
}

impl From<InvalidKeyLength> for Error {
    fn from(e: InvalidKeyLength) -> Self {
        Error::Crypto(e)
    }
}

impl From<DiscoveryError> for Error {
    fn from(e: DiscoveryError) -> Self {
        match e {
            DiscoveryError::IllegalResponse => Error::IllegalDiscoveryResponse,
            DiscoveryError::IllegalIp => Error::IllegalIp,
        }
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Error {
        Error::Io(e)
    }
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

impl From<SendError<WsMessage>> for Error {
    fn from(_e: SendError<WsMessage>) -> Error {
        Error::InterconnectFailure(Recipient::Ws)
    }
}

impl From<SendError<PacerMessage>> for Error {
    fn from(_e: SendError<PacerMessage>) -> Error {
        Error::InterconnectFailure(Recipient::Pacer)
    }
}

impl From<SendError<EventMessage>> for Error {
    fn from(_e: SendError<EventMessage>) -> Error {
        Error::InterconnectFailure(Recipient::Event)
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Error {
        Error::Ws(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to connect to voice server: ")?;
        match self {
            Error::AttemptDiscarded => write!(f, "connection attempt was aborted/discarded"),
            Error::Crypto(e) => write!(f, "{e}"),
            Error::CryptoModeInvalid => write!(f, "server changed negotiated encryption mode"),
            Error::CryptoModeUnavailable => write!(f, "server did not offer chosen encryption mode"),
            Error::EndpointUrl => write!(f, "endpoint URL received from gateway was invalid"),
            Error::ExpectedHandshake => write!(f, "voice initialisation protocol was violated"),
            Error::IllegalDiscoveryResponse => write!(f, "illegal UDP discovery response"),
            Error::IllegalIp => write!(f, "IP discovery/NAT punching response had bad IP value"),
            Error::Io(e) => write!(f, "{e}"),
            Error::Json(e) => write!(f, "{e}"),
            Error::InterconnectFailure(e) => write!(f, "failed to contact other task ({e:?})"),
            Error::TimedOut => write!(f, "handshake timed out"),
            Error::Ws(e) => write!(f, "websocket issue ({e})."),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Crypto(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Ws(e) => Some(e),
            _ => None,
        }
    }
}

/// Convenience type for voice connection errors.
pub type Result<T> = std::result::Result<T, Error>;
