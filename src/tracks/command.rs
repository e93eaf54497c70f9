use crate::events::EventData;
use std::fmt;

/// A request from a [`TrackHandle`] to modify or act upon a [`Track`].
///
/// [`Track`]: super::Track
/// [`TrackHandle`]: super::TrackHandle
pub enum TrackCommand {
    /// Set the track's play_mode to play/resume.
    Play,
    /// Set the track's play_mode to pause.
    Pause,
    /// Stop the target track. This cannot be undone.
    Stop,
    /// Register an event on this track.
    AddEvent(EventData),
}

impl fmt::Debug for TrackCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackCommand::Play => write!(f, "TrackCommand::Play"),
            TrackCommand::Pause => write!(f, "TrackCommand::Pause"),
            TrackCommand::Stop => write!(f, "TrackCommand::Stop"),
            TrackCommand::AddEvent(evt) => write!(f, "TrackCommand::AddEvent({evt:?})"),
        }
    }
}
