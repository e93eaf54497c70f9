//! Lifecycle of a voice gateway session.

use std::{error::Error, fmt};

/// Lifecycle states of the voice control channel.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum GatewayState {
    /// No session exists.
    #[default]
    Disconnected,
    /// The websocket is being opened, awaiting `Hello`.
    Connecting,
    /// `Identify` has been sent.
    Identifying,
    /// `Ready` received; transport negotiation is in progress.
    AwaitingReady,
    /// Session description received: media may flow.
    Ready,
    /// A new websocket is open and `Resume` has been sent.
    Resuming,
    /// A resume failed, and a fresh connection will be attempted.
    Reconnecting,
    /// The websocket was lost or closed.
    Closed,
}

/// Inputs which move a [`GatewayState`] forward.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GatewayTransition {
    /// Begin opening a fresh websocket.
    Open,
    /// `Hello` received and `Identify` sent.
    Identify,
    /// `Ready` received.
    Ready,
    /// `SessionDescription` received.
    SessionDescription,
    /// Begin resuming the last session over a new websocket.
    Resume,
    /// `Resumed` received.
    Resumed,
    /// The socket failed, timed out, or was closed by the server.
    Lost,
    /// Give up on resumption in favour of a fresh connection.
    Retry,
    /// Leave the session.
    Disconnect,
}

/// Attempted a transition which is invalid from the current state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IllegalTransition {
    pub from: GatewayState,
    pub transition: GatewayTransition,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal gateway transition {:?} from {:?}", self.transition, self.from)
    }
}

impl Error for IllegalTransition {}

impl GatewayState {
    /// Applies `transition`, returning the new state.
    pub fn transition(self, transition: GatewayTransition) -> Result<Self, IllegalTransition> {
        use GatewayState as S;
        use GatewayTransition as T;

        let next = match (self, transition) {
            (_, T::Disconnect) => S::Disconnected,
            (S::Disconnected | S::Reconnecting | S::Closed, T::Open) => S::Connecting,
            (S::Connecting, T::Identify) => S::Identifying,
            (S::Identifying, T::Ready) => S::AwaitingReady,
            (S::AwaitingReady, T::SessionDescription) => S::Ready,
            (S::Closed | S::Reconnecting, T::Resume) => S::Resuming,
            (S::Resuming, T::Resumed) => S::Ready,
            (S::Disconnected, T::Lost) => S::Disconnected,
            (_, T::Lost) => S::Closed,
            (S::Closed | S::Resuming, T::Retry) => S::Reconnecting,
            (from, transition) => return Err(IllegalTransition { from, transition }),
        };

        Ok(next)
    }

    /// Whether media may be sent in this state.
    pub fn is_ready(self) -> bool {
        self == GatewayState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use GatewayState as S;
    use GatewayTransition as T;

    fn walk(start: GatewayState, steps: &[GatewayTransition]) -> Result<GatewayState, IllegalTransition> {
        steps.iter().try_fold(start, |s, t| s.transition(*t))
    }

    #[test]
    fn full_handshake() {
        let end = walk(S::Disconnected, &[T::Open, T::Identify, T::Ready, T::SessionDescription]);
        assert_eq!(end, Ok(S::Ready));
    }

    #[test]
    fn resume_then_fallback() {
        assert_eq!(walk(S::Ready, &[T::Lost, T::Resume, T::Resumed]), Ok(S::Ready));

        let end = walk(S::Ready, &[
            T::Lost,
            T::Resume,
            T::Lost,
            T::Retry,
            T::Open,
            T::Identify,
            T::Ready,
            T::SessionDescription,
        ]);
        assert_eq!(end, Ok(S::Ready));
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        assert_eq!(
            S::Disconnected.transition(T::Ready),
            Err(IllegalTransition {
                from: S::Disconnected,
                transition: T::Ready,
            })
        );
        assert!(S::Connecting.transition(T::SessionDescription).is_err());
        assert!(S::Ready.transition(T::Identify).is_err());
        assert!(S::Disconnected.transition(T::Resume).is_err());
        assert!(S::Ready.transition(T::Open).is_err());
    }

    #[test]
    fn disconnect_always_allowed() {
        for s in [S::Connecting, S::Identifying, S::AwaitingReady, S::Ready, S::Resuming, S::Closed] {
            assert_eq!(s.transition(T::Disconnect), Ok(S::Disconnected));
        }
    }
}
