//! Driver and gateway error handling.

pub use crate::driver::connection::error::Error as ConnectionError;
use std::{error::Error, fmt};

/// Error returned when a manager or call handler is unable to join a voice channel,
/// or to keep a session alive.
#[derive(Debug)]
#[non_exhaustive]
pub enum JoinError {
    /// No available gateway connection was provided to send voice state update messages.
    NoSender,
    /// Tried to leave a [`Call`] which was not found.
    ///
    /// [`Call`]: crate::Call
    NoCall,
    /// Connection details were not received from the host in time, or the join was
    /// superseded by a later request.
    Dropped,
    /// The voice server handshake did not complete within the configured timeout.
    TimedOut,
    /// The driver failed to establish a voice connection.
    Driver(ConnectionError),
    /// Every reconnection attempt failed, and the session was abandoned.
    SessionLost,
    /// The host's gateway reported an error when sending a voice state update.
    Host(String),
}

impl JoinError {
    /// Indicates whether this failure may be retried with the same parameters.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::TimedOut | Self::Dropped => true,
            Self::Driver(e) => e.should_retry(),
            _ => false,
        }
    }

    /// Indicates whether this failure came from a rejected handshake with the voice server.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Driver(e) if e.is_handshake())
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to join voice channel: ")?;
        match self {
            JoinError::NoSender => write!(f, "no gateway destination"),
            JoinError::NoCall => write!(f, "tried to leave a non-existent call"),
            JoinError::Dropped => write!(f, "request was cancelled/dropped"),
            JoinError::TimedOut => write!(f, "gateway response from host timed out"),
            JoinError::Driver(e) => write!(f, "establishing connection failed: {e}"),
            JoinError::SessionLost => write!(f, "session lost after exhausting reconnect attempts"),
            JoinError::Host(e) => write!(f, "host gateway failure: {e}"),
        }
    }
}

impl Error for JoinError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            JoinError::Driver(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConnectionError> for JoinError {
    fn from(e: ConnectionError) -> Self {
        JoinError::Driver(e)
    }
}

/// Convenience type for voice connection and call errors.
pub type JoinResult<T> = Result<T, JoinError>;
