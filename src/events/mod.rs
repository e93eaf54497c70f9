//! Events relating to tracks, the voice session, and other callers.

mod context;
mod core;
mod data;
mod store;
mod track;
mod untimed;

pub use self::{context::*, core::*, data::*, store::*, track::*, untimed::*};

use async_trait::async_trait;

/// Trait to handle an event which can be fired per-track, or globally.
///
/// These may be feasibly reused between several event sources.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Respond to one received event.
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event>;
}

/// Classes of event which may occur, triggering a handler
/// at the local (track-specific) or global level.
///
/// Event handlers themselves are described in [`EventData::new`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Event {
    /// Track events correspond to changes of a track's state, such as
    /// starting, pausing, or finishing.
    ///
    /// Track events persist while the handler returns `None`.
    Track(TrackEvent),
    /// Core events describe the voice session and other users in the call.
    ///
    /// These persist while the handler returns `None`. Core events **must** be
    /// applied globally, as attaching them to a track is a no-op.
    Core(CoreEvent),
    /// Cancels the event, if it was intended to persist.
    Cancel,
}

impl Event {
    pub(crate) fn is_global_only(&self) -> bool {
        matches!(self, Self::Core(_))
    }
}

impl From<TrackEvent> for Event {
    fn from(evt: TrackEvent) -> Self {
        Event::Track(evt)
    }
}

impl From<CoreEvent> for Event {
    fn from(evt: CoreEvent) -> Self {
        Event::Core(evt)
    }
}
