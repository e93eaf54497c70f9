use super::{Track, TrackHandle, TrackId};
use crate::input::{Metadata, Origin};
use rand::seq::SliceRandom;
use std::collections::VecDeque;

/// A track waiting for its turn, alongside the handle given out for it.
#[derive(Debug)]
pub(crate) struct QueuedTrack {
    pub track: Track,
    pub handle: TrackHandle,
}

#[derive(Debug)]
struct Current {
    handle: TrackHandle,
    replay: Option<(Origin, Metadata)>,
}

/// Ordered playback of tracks, with a bounded history of finished entries.
///
/// Owned by the driver's core task: the head is only taken once the pacer
/// reports the previous track has ended.
#[derive(Debug)]
pub(crate) struct PlaybackQueue {
    pending: VecDeque<QueuedTrack>,
    current: Option<Current>,
    history: VecDeque<(Origin, Metadata)>,
    history_len: usize,
}

impl PlaybackQueue {
    pub fn new(history_len: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            history: VecDeque::with_capacity(history_len),
            history_len,
        }
    }

    pub fn push(&mut self, entry: QueuedTrack) {
        self.pending.push_back(entry);
    }

    pub fn push_front(&mut self, entry: QueuedTrack) {
        self.pending.push_front(entry);
    }

    /// Whether a track is currently handed to the pacer.
    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&TrackHandle> {
        self.current.as_ref().map(|c| &c.handle)
    }

    pub fn is_current(&self, id: TrackId) -> bool {
        self.current().map_or(false, |h| h.id() == id)
    }

    /// Takes the head of the queue as the current track.
    ///
    /// Must only be called once any previous track has been finished.
    pub fn next(&mut self) -> Option<Track> {
        let QueuedTrack { track, handle } = self.pending.pop_front()?;

        self.current = Some(Current {
            handle,
            replay: track
                .origin
                .clone()
                .map(|origin| (origin, track.metadata.clone())),
        });

        Some(track)
    }

    /// Clears the current track, recording it in history if `remember` is set
    /// and it can be reopened.
    pub fn finish_current(&mut self, remember: bool) -> Option<TrackHandle> {
        let Current { handle, replay } = self.current.take()?;

        if let (true, Some(entry)) = (remember, replay) {
            self.history.push_back(entry);
            self.trim_history();
        }

        Some(handle)
    }

    /// Randomises the order of all pending entries. The current track is unaffected.
    pub fn shuffle(&mut self) {
        self.pending
            .make_contiguous()
            .shuffle(&mut rand::thread_rng());
    }

    /// Removes all pending entries, leaving the current track and history.
    pub fn clear(&mut self) -> Vec<QueuedTrack> {
        self.pending.drain(..).collect()
    }

    pub fn remove(&mut self, id: TrackId) -> Option<QueuedTrack> {
        let idx = self.pending.iter().position(|e| e.track.id == id)?;
        self.pending.remove(idx)
    }

    #[cfg(test)]
    pub fn contains(&self, id: TrackId) -> bool {
        self.pending.iter().any(|e| e.track.id == id)
    }

    /// Removes the most recently finished entry from history.
    pub fn take_previous(&mut self) -> Option<(Origin, Metadata)> {
        self.history.pop_back()
    }

    /// Metadata of finished tracks, oldest first.
    pub fn history(&self) -> Vec<Metadata> {
        self.history.iter().map(|(_, m)| m.clone()).collect()
    }

    /// Handles of the current track followed by all pending tracks, in play order.
    pub fn handles(&self) -> Vec<TrackHandle> {
        self.current()
            .into_iter()
            .chain(self.pending.iter().map(|e| &e.handle))
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn set_history_len(&mut self, history_len: usize) {
        self.history_len = history_len;
        self.trim_history();
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.history_len {
            self.history.pop_front();
        }
    }
}
