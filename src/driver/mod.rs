//! Runner for a voice connection.
//!
//! The [`Driver`] owns a set of background tasks for one call: a core task which
//! holds the playback queue and (re)connects to the voice server, a pacer which
//! sends one frame every 20ms, an event task, and the websocket and UDP tasks of
//! each live connection.
//!
//! Most users will reach these methods through a [`Call`], via `Deref`.
//!
//! [`Call`]: crate::Call

pub(crate) mod connection;
pub mod crypto;
pub mod gateway;
pub mod packet;
pub mod retry;
pub mod schedule;
mod stats;
pub(crate) mod tasks;

pub use self::{
    connection::error::{Error as ConnectionError, Result as ConnectionResult},
    crypto::CryptoMode,
    gateway::GatewayState,
    retry::{ExponentialBackoff, Retry, Strategy},
    stats::TransportStats,
};
pub use crate::config::Config;

use crate::{
    events::{EventData, EventHandler},
    input::Metadata,
    tracks::{Track, TrackHandle},
    Bitrate,
    ConnectionInfo,
    Event,
};
use flume::{SendError, Sender};
use tasks::message::CoreMessage;
use tracing::instrument;

/// The control object for a voice connection, handling connection,
/// playback and event registration.
#[derive(Debug)]
pub struct Driver {
    config: Config,
    self_mute: bool,
    sender: Sender<CoreMessage>,
    stats: TransportStats,
}

impl Driver {
    /// Creates a new voice driver.
    ///
    /// This will create the core voice tasks in the background, and so must be
    /// called from within a tokio runtime.
    #[inline]
    pub fn new(config: Config) -> Self {
        let stats = TransportStats::default();
        let sender = Self::start_inner(config.clone(), stats.clone());

        Driver {
            config,
            self_mute: false,
            sender,
            stats,
        }
    }

    fn start_inner(config: Config, stats: TransportStats) -> Sender<CoreMessage> {
        let (tx, rx) = flume::unbounded();

        tasks::start(config, rx, tx.clone(), stats);

        tx
    }

    /// Connects to a voice channel using the specified server.
    ///
    /// Any existing connection is closed first, so a driver holds at most one
    /// session.
    #[instrument(skip(self))]
    pub async fn connect(&mut self, info: ConnectionInfo) -> ConnectionResult<()> {
        let (tx, rx) = flume::bounded(1);

        self.raw_connect(info, tx);

        rx.recv_async()
            .await
            .unwrap_or(Err(ConnectionError::AttemptDiscarded))
    }

    /// Starts a connection, reporting its outcome on `tx`.
    pub(crate) fn raw_connect(&mut self, info: ConnectionInfo, tx: Sender<ConnectionResult<()>>) {
        self.send(CoreMessage::ConnectWithResult(info, tx));
    }

    /// Leaves the current voice channel, disconnecting from it.
    ///
    /// This does *not* forget settings, like whether to be self-muted, nor does it
    /// clear the queue.
    #[instrument(skip(self))]
    pub fn leave(&mut self) {
        self.send(CoreMessage::Disconnect);
    }

    /// Sets whether the current connection is to be muted.
    ///
    /// Queued audio keeps advancing while muted.
    #[instrument(skip(self))]
    pub fn mute(&mut self, mute: bool) {
        self.self_mute = mute;
        self.send(CoreMessage::Mute(mute));
    }

    /// Returns whether the driver is muted.
    pub fn is_mute(&self) -> bool {
        self.self_mute
    }

    /// Adds a track to the end of the queue, returning a handle to control it.
    ///
    /// Playback starts immediately if nothing else is playing.
    #[instrument(skip(self, track))]
    pub fn enqueue(&mut self, track: impl Into<Track>) -> TrackHandle {
        let track = track.into();
        let handle = TrackHandle::new(&track, self.sender.clone());

        self.send(CoreMessage::Enqueue(track, handle.clone()));

        handle
    }

    /// Plays a track, stopping the current track and discarding the rest of the queue.
    #[instrument(skip(self, track))]
    pub fn play_only(&mut self, track: impl Into<Track>) -> TrackHandle {
        let track = track.into();
        let handle = TrackHandle::new(&track, self.sender.clone());

        self.send(CoreMessage::PlayOnly(track, handle.clone()));

        handle
    }

    /// Ends the current track early, moving on to the next.
    ///
    /// The queue advances once the current track has stopped sending audio.
    pub fn skip(&mut self) {
        self.send(CoreMessage::Skip);
    }

    /// Returns to the most recently finished track, cutting the current one.
    ///
    /// Only tracks built from memory, files, or `ffmpeg` are remembered.
    pub fn previous(&mut self) {
        self.send(CoreMessage::Previous);
    }

    /// Randomises the order of the tracks waiting in the queue.
    pub fn shuffle(&mut self) {
        self.send(CoreMessage::Shuffle);
    }

    /// Pauses the current track.
    pub fn pause(&mut self) {
        self.send(CoreMessage::Pause);
    }

    /// Resumes the current track.
    pub fn resume(&mut self) {
        self.send(CoreMessage::Resume);
    }

    /// Stops the current track and removes every queued track.
    pub fn stop(&mut self) {
        self.send(CoreMessage::Stop);
    }

    /// Removes every queued track, leaving the current one playing.
    pub fn clear_queue(&mut self) {
        self.send(CoreMessage::ClearQueue);
    }

    /// Returns handles to the current track, followed by every queued track.
    pub async fn queue(&mut self) -> Vec<TrackHandle> {
        let (tx, rx) = flume::bounded(1);
        self.send(CoreMessage::Queue(tx));

        rx.recv_async().await.unwrap_or_default()
    }

    /// Returns the metadata of recently finished tracks, oldest first.
    pub async fn history(&mut self) -> Vec<Metadata> {
        let (tx, rx) = flume::bounded(1);
        self.send(CoreMessage::History(tx));

        rx.recv_async().await.unwrap_or_default()
    }

    /// Attach a global event handler to this driver's session.
    ///
    /// Track events registered here fire for every track.
    pub fn add_global_event<F: EventHandler + 'static>(&mut self, event: Event, action: F) {
        self.send(CoreMessage::AddEvent(EventData::new(event, action)));
    }

    /// Sets the bitrate used when encoding raw PCM inputs.
    pub fn set_bitrate(&mut self, bitrate: Bitrate) {
        self.send(CoreMessage::SetBitrate(bitrate));
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sets a new configuration, taking effect for the next connection attempt.
    pub fn set_config(&mut self, config: Config) {
        self.config = config.clone();
        self.send(CoreMessage::SetConfig(config));
    }

    /// Returns packet counters for this driver's voice connections.
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Sends a message to the core task, restarting it if it has exited.
    fn send(&mut self, status: CoreMessage) {
        if let Err(SendError(status)) = self.sender.send(status) {
            self.sender = Self::start_inner(self.config.clone(), self.stats.clone());

            let _ = self.sender.send(status);
        }
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl Drop for Driver {
    /// Leaves the current connected voice channel, if connected to one, and
    /// forgets all configurations relevant to this driver.
    fn drop(&mut self) {
        let _ = self.sender.send(CoreMessage::Poison);
    }
}
