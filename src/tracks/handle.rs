use super::*;
use crate::{
    driver::tasks::message::CoreMessage,
    events::{Event, EventData, EventHandler},
    input::Metadata,
};
use flume::Sender;
use parking_lot::Mutex;
use std::sync::Arc;

/// Handle for safe control of a [`Track`] from other threads, outside
/// of the frame pacing and voice handling context.
///
/// Commands are applied by the driver's core task. Almost all method calls here
/// are fallible; in most cases, this will be because the underlying [`Track`]
/// has finished.
#[derive(Clone, Debug)]
pub struct TrackHandle {
    inner: Arc<InnerHandle>,
}

#[derive(Debug)]
struct InnerHandle {
    id: TrackId,
    state: Arc<Mutex<TrackState>>,
    metadata: Metadata,
    core: Sender<CoreMessage>,
}

impl TrackHandle {
    pub(crate) fn new(track: &Track, core: Sender<CoreMessage>) -> Self {
        Self {
            inner: Arc::new(InnerHandle {
                id: track.id,
                state: track.state.clone(),
                metadata: track.metadata.clone(),
                core,
            }),
        }
    }

    /// Unpauses an audio track.
    pub fn play(&self) -> TrackResult<()> {
        self.send(TrackCommand::Play)
    }

    /// Pauses an audio track.
    pub fn pause(&self) -> TrackResult<()> {
        self.send(TrackCommand::Pause)
    }

    /// Stops an audio track, removing it from the queue if it has not yet begun.
    ///
    /// This is *final*, and will cause the driver to fire
    /// a [`TrackEvent::End`] event.
    ///
    /// [`TrackEvent::End`]: crate::events::TrackEvent::End
    pub fn stop(&self) -> TrackResult<()> {
        self.send(TrackCommand::Stop)
    }

    /// Attach an event handler to an audio track. These will receive [`EventContext::Track`].
    ///
    /// Core events cannot be attached to a track.
    ///
    /// [`EventContext::Track`]: crate::events::EventContext::Track
    pub fn add_event<F: EventHandler + 'static>(&self, event: Event, action: F) -> TrackResult<()> {
        if event.is_global_only() {
            return Err(ControlError::InvalidTrackEvent);
        }

        self.send(TrackCommand::AddEvent(EventData::new(event, action)))
    }

    /// Returns a snapshot of this track's play state and position.
    pub fn state(&self) -> TrackState {
        *self.inner.state.lock()
    }

    /// Returns the unique identifier of this track.
    pub fn id(&self) -> TrackId {
        self.inner.id
    }

    /// Returns the metadata of this track's source.
    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    /// Moves the shared play state, unless the track has already finished.
    ///
    /// Returns whether the mode changed.
    pub(crate) fn set_mode(&self, mode: PlayMode) -> bool {
        let mut state = self.inner.state.lock();
        let old = state.playing;
        state.playing = old.change_to(mode);

        old != state.playing
    }

    fn send(&self, cmd: TrackCommand) -> TrackResult<()> {
        if self.state().playing.is_done() {
            return Err(ControlError::Finished);
        }

        self.inner
            .core
            .send(CoreMessage::Track(self.inner.id, cmd))
            .map_err(|_| ControlError::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Codec, Input};

    #[test]
    fn commands_reach_the_core() {
        let (tx, rx) = flume::unbounded();
        let track = Track::new(Input::memory(Vec::<u8>::new(), Codec::Ogg));
        let handle = TrackHandle::new(&track, tx);

        handle.pause().unwrap();

        match rx.try_recv() {
            Ok(CoreMessage::Track(id, TrackCommand::Pause)) => assert_eq!(id, track.id()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn finished_tracks_reject_commands() {
        let (tx, _rx) = flume::unbounded();
        let track = Track::new(Input::memory(Vec::<u8>::new(), Codec::Ogg));
        let handle = TrackHandle::new(&track, tx);

        track.state.lock().playing = PlayMode::End;

        assert_eq!(handle.play(), Err(ControlError::Finished));
    }

    #[test]
    fn core_events_are_rejected() {
        struct Nop;

        #[async_trait::async_trait]
        impl EventHandler for Nop {
            async fn act(&self, _: &crate::events::EventContext<'_>) -> Option<Event> {
                None
            }
        }

        let (tx, _rx) = flume::unbounded();
        let track = Track::new(Input::memory(Vec::<u8>::new(), Codec::Ogg));
        let handle = TrackHandle::new(&track, tx);

        assert_eq!(
            handle.add_event(crate::events::CoreEvent::VoicePacket.into(), Nop),
            Err(ControlError::InvalidTrackEvent)
        );
    }
}
