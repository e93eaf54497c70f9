/// Playback status of a track.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PlayMode {
    /// The track is currently playing.
    #[default]
    Play,
    /// The track is currently paused, and may be resumed.
    Pause,
    /// The track has been manually stopped, and cannot be restarted.
    Stop,
    /// The track has naturally ended, and cannot be restarted.
    End,
    /// The track's source failed mid-stream, and cannot be restarted.
    Errored,
}

impl PlayMode {
    /// Returns whether the track has irreversibly stopped.
    pub fn is_done(self) -> bool {
        matches!(self, PlayMode::Stop | PlayMode::End | PlayMode::Errored)
    }

    pub(crate) fn change_to(self, other: Self) -> PlayMode {
        use PlayMode::*;

        // A finished track cannot be restarted.
        match self {
            Play | Pause => other,
            state => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finished_tracks_stay_finished() {
        assert_eq!(PlayMode::Pause.change_to(PlayMode::Play), PlayMode::Play);
        assert_eq!(PlayMode::Stop.change_to(PlayMode::Play), PlayMode::Stop);
        assert_eq!(PlayMode::Errored.change_to(PlayMode::Pause), PlayMode::Errored);
        assert!(PlayMode::End.is_done());
        assert!(!PlayMode::Pause.is_done());
    }
}
