//! Live, controllable audio instances.
//!
//! Tracks add control and event data around the frame streams offered by
//! [`Input`], where each represents one entry in a call's playback queue.
//!
//! To prevent locking and stalling of the driver, tracks are controlled using a
//! [`TrackHandle`], returned when a track is queued. These handles remotely send
//! commands to the driver's core task to control playback and register events.
//!
//! [`Input`]: crate::input::Input

mod command;
mod error;
mod handle;
mod mode;
mod queue;
mod state;

pub use self::{command::*, error::*, handle::*, mode::*, state::*};
pub(crate) use self::queue::*;

use crate::{
    events::{Event, EventData, EventHandler, EventStore},
    input::{Input, Metadata, Origin, Source},
};
use parking_lot::Mutex;
use std::{fmt, sync::Arc};

/// Unique identifier of a track within a process.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TrackId(u64);

impl TrackId {
    fn new() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Why a track stopped sending audio.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum TrackEndReason {
    /// The source ran out of frames.
    Finished,
    /// The track was skipped, stopped, or replaced.
    Cut,
    /// The source failed to produce a frame.
    Errored(String),
}

/// Control object for audio playback.
///
/// Build one from an [`Input`] (or with [`Track::from`]) to register events or
/// start paused before queueing it with [`Driver::enqueue`]. Once queued, access
/// occurs via the returned [`TrackHandle`].
///
/// [`Driver::enqueue`]: crate::driver::Driver::enqueue
pub struct Track {
    pub(crate) id: TrackId,
    pub(crate) source: Source,
    pub(crate) state: Arc<Mutex<TrackState>>,

    /// List of events attached to this audio track.
    ///
    /// This may be used to add additional events to a track
    /// before it is sent to the driver.
    pub events: EventStore,

    pub(crate) origin: Option<Origin>,
    pub(crate) metadata: Metadata,
}

impl Track {
    /// Wraps an [`Input`]. Inputs built from files or memory may later be replayed
    /// from the call's history.
    pub fn new(input: Input) -> Self {
        let origin = input.origin().cloned();
        let metadata = input.metadata.clone();

        Self {
            id: TrackId::new(),
            source: input.into_source(),
            state: Default::default(),
            events: EventStore::new_local(),
            origin,
            metadata,
        }
    }

    /// Sets this track to begin paused once it reaches the head of the queue.
    #[must_use]
    pub fn paused(self) -> Self {
        self.state.lock().playing = PlayMode::Pause;
        self
    }

    /// Attach an event handler to this track, before it is queued.
    pub fn add_event<F: EventHandler + 'static>(&mut self, event: Event, action: F) {
        self.events.add_event(EventData::new(event, action));
    }

    /// Returns the unique identifier of this track.
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Returns the metadata of this track's source.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub(crate) fn state(&self) -> TrackState {
        *self.state.lock()
    }
}

impl From<Input> for Track {
    fn from(input: Input) -> Self {
        Self::new(input)
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("source", &"<frame source>")
            .field("state", &self.state())
            .field("events", &self.events)
            .field("origin", &self.origin)
            .field("metadata", &self.metadata)
            .finish()
    }
}
