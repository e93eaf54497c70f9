use super::*;

/// Track and voice core events.
///
/// Untimed events persist while the `action` in [`EventData`]
/// returns `None`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UntimedEvent {
    /// Untimed events belonging to a track, such as state changes or its end.
    Track(TrackEvent),
    /// Untimed events belonging to the global context, such as session changes,
    /// client speaking updates, or received voice data.
    Core(CoreEvent),
}

impl From<TrackEvent> for UntimedEvent {
    fn from(evt: TrackEvent) -> Self {
        UntimedEvent::Track(evt)
    }
}

impl From<CoreEvent> for UntimedEvent {
    fn from(evt: CoreEvent) -> Self {
        UntimedEvent::Core(evt)
    }
}
