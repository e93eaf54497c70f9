use super::PlayMode;
use crate::constants::TIMESTEP_LENGTH;
use std::time::Duration;

/// State of a [`Track`] object, passed to event handlers and readable at any
/// time through [`TrackHandle::state`].
///
/// [`Track`]: super::Track
/// [`TrackHandle::state`]: super::TrackHandle::state
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TrackState {
    /// Play status (e.g., active, paused, stopped) of this track.
    pub playing: PlayMode,
    /// Amount of audio sent from this track.
    pub position: Duration,
}

impl TrackState {
    pub(crate) fn step_frame(&mut self) {
        self.position += TIMESTEP_LENGTH;
    }
}
