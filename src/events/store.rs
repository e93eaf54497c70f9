use super::*;
use crate::tracks::{TrackHandle, TrackId};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Storage for [`EventData`], designed to be used for both local and global contexts.
#[derive(Debug, Default)]
pub struct EventStore {
    untimed: HashMap<UntimedEvent, Vec<EventData>>,
    local_only: bool,
}

impl EventStore {
    /// Creates a new event store to be used globally.
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a new event store to be used within a [`Track`].
    ///
    /// [`Track`]: crate::tracks::Track
    pub fn new_local() -> Self {
        EventStore {
            local_only: true,
            ..Default::default()
        }
    }

    /// Add an event to this store.
    ///
    /// Core events added to a track's local store are discarded.
    pub fn add_event(&mut self, evt: EventData) {
        if self.local_only && evt.event.is_global_only() {
            return;
        }

        let key = match evt.event {
            Event::Core(c) => c.into(),
            Event::Track(t) => t.into(),
            Event::Cancel => return,
        };

        self.untimed.entry(key).or_default().push(evt);
    }

    /// Returns whether any handlers are registered for an event.
    pub fn has_handlers(&self, event: UntimedEvent) -> bool {
        self.untimed.get(&event).map_or(false, |v| !v.is_empty())
    }

    /// Processes all events attached to the given track event.
    pub(crate) async fn process_untimed(
        &mut self,
        untimed_event: UntimedEvent,
        ctx: EventContext<'_>,
    ) {
        let Some(mut events) = self.untimed.remove(&untimed_event) else {
            return;
        };

        let mut i = 0;
        while i < events.len() {
            // Only remove/readd if the event type changes (i.e., Some AND new != old)
            match events[i].action.act(&ctx).await {
                Some(new_evt_type) if new_evt_type != events[i].event => {
                    let mut evt = events.remove(i);
                    trace!("Handler changed from {:?} to {:?}.", evt.event, new_evt_type);

                    evt.event = new_evt_type;
                    self.add_event(evt);
                },
                _ => i += 1,
            }
        }

        // Handlers re-registered under this event while it was removed.
        if let Some(readded) = self.untimed.remove(&untimed_event) {
            events.extend(readded);
        }

        if !events.is_empty() {
            self.untimed.insert(untimed_event, events);
        }
    }
}

/// Event handlers for a whole call, and for each of its live tracks.
#[derive(Debug, Default)]
pub(crate) struct GlobalEvents {
    pub(crate) store: EventStore,
    tracks: HashMap<TrackId, (EventStore, TrackHandle)>,
}

impl GlobalEvents {
    pub(crate) fn add_event(&mut self, evt: EventData) {
        self.store.add_event(evt);
    }

    pub(crate) fn add_track(&mut self, id: TrackId, store: EventStore, handle: TrackHandle) {
        self.tracks.insert(id, (store, handle));
    }

    pub(crate) fn add_track_event(&mut self, id: TrackId, evt: EventData) {
        if let Some((store, _)) = self.tracks.get_mut(&id) {
            store.add_event(evt);
        }
    }

    pub(crate) fn remove_track(&mut self, id: TrackId) {
        self.tracks.remove(&id);
    }

    pub(crate) fn remove_all_tracks(&mut self) {
        self.tracks.clear();
    }

    pub(crate) async fn fire_core_event(&mut self, evt: CoreEvent, ctx: EventContext<'_>) {
        self.store.process_untimed(evt.into(), ctx).await;
    }

    /// Runs a track's own handlers, then any global handlers for the same event.
    pub(crate) async fn fire_track_event(&mut self, id: TrackId, evt: TrackEvent) {
        let Some((local, handle)) = self.tracks.get_mut(&id) else {
            debug!("Dropping {:?} for unknown track {:?}.", evt, id);
            return;
        };

        let state = handle.state();
        let untimed = evt.into();
        let pair = [(&state, &*handle)];

        local.process_untimed(untimed, EventContext::Track(&pair[..])).await;

        self.store
            .process_untimed(untimed, EventContext::Track(&pair[..]))
            .await;
    }
}
