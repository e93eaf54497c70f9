/// Track events correspond to changes of state in a queued track.
///
/// Track events persist while the `action` in [`EventData`]
/// returns `None`.
///
/// [`EventData`]: super::EventData
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TrackEvent {
    /// The attached track has begun sending audio.
    Start,
    /// The attached track has ended, either naturally or by being cut short.
    End,
    /// The attached track's source failed, ending the track.
    Error,
    /// The attached track has been paused.
    Pause,
    /// The attached track has been resumed after a pause.
    Play,
}
