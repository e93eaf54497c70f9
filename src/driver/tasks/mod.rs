pub mod error;
mod events;
pub(crate) mod message;
pub(crate) mod pacer;
pub(crate) mod udp_rx;
pub(crate) mod udp_tx;
pub(crate) mod ws;

use super::{
    connection::{error::Error as ConnectionError, Connection},
    stats::TransportStats,
    Config,
};
use crate::{
    events::{
        CoreContext,
        DisconnectKind,
        DisconnectReason,
        EventStore,
        InternalConnect,
        InternalDisconnect,
        TrackEvent,
    },
    tracks::{
        PlayMode,
        PlaybackQueue,
        QueuedTrack,
        Track,
        TrackCommand,
        TrackEndReason,
        TrackHandle,
        TrackId,
    },
    ConnectionInfo,
};
use error::Recipient;
use flume::{Receiver, RecvError, Sender};
use futures::future::{BoxFuture, FutureExt};
use message::*;
use pacer::Pacer;
use std::future;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

pub(crate) fn start(
    config: Config,
    rx: Receiver<CoreMessage>,
    tx: Sender<CoreMessage>,
    stats: TransportStats,
) {
    tokio::spawn(async move {
        info!("Driver started.");
        runner(config, rx, tx, stats).await;
        info!("Driver finished.");
    });
}

fn start_internals(core: Sender<CoreMessage>, config: &Config) -> Interconnect {
    let (evt_tx, evt_rx) = flume::unbounded();
    let (pacer_tx, pacer_rx) = flume::unbounded();

    let interconnect = Interconnect {
        core,
        events: evt_tx,
        pacer: pacer_tx,
    };

    let ic = interconnect.clone();
    tokio::spawn(async move {
        info!("Event processor started.");
        events::runner(ic, evt_rx).await;
        info!("Event processor finished.");
    });

    let pacer = Pacer::new(interconnect.clone(), pacer_rx, config.clone());
    tokio::spawn(pacer::runner(pacer));

    interconnect
}

/// Result of a connection attempt, along with the interconnect it finished on.
///
/// Attempts may replace a crashed event task, so the core adopts this
/// interconnect once the attempt completes.
struct Attempt {
    interconnect: Interconnect,
    result: Result<Connection, ConnectionError>,
}

enum AttemptKind {
    /// A caller is waiting on the outcome.
    Connect(Sender<Result<(), ConnectionError>>),
    /// Recovery of a session which was previously live.
    Reconnect,
}

/// A connection attempt, polled by the run loop alongside incoming messages.
struct PendingAttempt {
    info: ConnectionInfo,
    kind: AttemptKind,
    task: BoxFuture<'static, Attempt>,
}

/// Per-call control task: owns the live connection and the playback queue.
struct Core {
    config: Config,
    conn: Option<Connection>,
    interconnect: Interconnect,
    pending: Option<PendingAttempt>,
    queue: PlaybackQueue,
    stats: TransportStats,
}

impl Core {
    async fn handle(&mut self, msg: CoreMessage) {
        use CoreMessage::*;

        match msg {
            ConnectWithResult(info, tx) => {
                // A new session (including a channel move) always replaces the old one.
                self.cancel_pending();
                if self.drop_connection().is_some() {
                    debug!("Dropped previous connection before connecting.");
                }

                let task = connect_with_retry(
                    info.clone(),
                    self.interconnect.clone(),
                    self.config.clone(),
                    self.stats.clone(),
                );
                self.start_attempt(info, AttemptKind::Connect(tx), task.boxed());
            },
            Disconnect =>
                if let Some((info, kind)) = self.cancel_pending() {
                    self.fire(CoreContext::DriverDisconnect(disconnect_data(
                        &info,
                        kind,
                        Some(DisconnectReason::AttemptDiscarded),
                    )));
                } else if let Some(info) = self.drop_connection() {
                    self.fire(CoreContext::DriverDisconnect(disconnect_data(
                        &info,
                        DisconnectKind::Runtime,
                        None,
                    )));
                },
            Enqueue(track, handle) => {
                self.enqueue(track, handle, false);
                self.play_next();
            },
            PlayOnly(track, handle) => {
                self.clear_pending();
                self.enqueue(track, handle, false);
                self.advance();
            },
            Skip => self.advance(),
            Previous => self.previous().await,
            Shuffle => self.queue.shuffle(),
            Stop => {
                self.clear_pending();
                self.stop_current();
            },
            Pause => self.pause_current(),
            Resume => self.resume_current(),
            Queue(tx) => {
                let _ = tx.send(self.queue.handles());
            },
            History(tx) => {
                let _ = tx.send(self.queue.history());
            },
            ClearQueue => self.clear_pending(),
            CoreMessage::Track(id, cmd) => self.track_command(id, cmd),
            SetBitrate(bitrate) => {
                let _ = self.interconnect.pacer.send(PacerMessage::SetBitrate(bitrate));
            },
            SetConfig(config) => {
                self.queue.set_history_len(config.history_len);
                let _ = self
                    .interconnect
                    .pacer
                    .send(PacerMessage::SetConfig(config.clone()));
                self.config = config;
            },
            Mute(muted) => {
                let _ = self.interconnect.pacer.send(PacerMessage::Mute(muted));
            },
            AddEvent(evt) => {
                let _ = self.interconnect.events.send(EventMessage::AddGlobalEvent(evt));
            },
            // Failures reported by the tasks of a connection being replaced.
            Reconnect | FullReconnect if self.pending.is_some() => {
                debug!("Ignoring {:?} while a connection attempt is in flight.", msg);
            },
            Reconnect =>
                if let Some(conn) = self.conn.take() {
                    self.fire(CoreContext::Reconnecting);

                    let info = conn.info.clone();
                    let task = resume(
                        conn,
                        self.interconnect.clone(),
                        self.config.clone(),
                        self.stats.clone(),
                    );
                    self.start_attempt(info, AttemptKind::Reconnect, task.boxed());
                },
            FullReconnect =>
                if let Some(info) = self.drop_connection() {
                    self.fire(CoreContext::Reconnecting);

                    let task = connect_with_retry(
                        info.clone(),
                        self.interconnect.clone(),
                        self.config.clone(),
                        self.stats.clone(),
                    );
                    self.start_attempt(info, AttemptKind::Reconnect, task.boxed());
                },
            Terminated(code) =>
                if let Some(info) = self.drop_connection() {
                    warn!("Voice server ended the session: {:?}.", code);
                    self.fire(CoreContext::DriverDisconnect(disconnect_data(
                        &info,
                        DisconnectKind::Runtime,
                        Some(DisconnectReason::WsClosed(Some(code))),
                    )));
                },
            TrackEnded(id, reason) => self.track_ended(id, reason),
            // Handled by the run loop.
            Poison => {},
        }
    }

    fn fire(&self, ctx: CoreContext) {
        let _ = self.interconnect.events.send(EventMessage::FireCoreEvent(ctx));
    }

    fn fire_track(&self, id: TrackId, evt: TrackEvent) {
        let _ = self
            .interconnect
            .events
            .send(EventMessage::FireTrackEvent(id, evt));
    }

    /// Closes the live connection, if any, returning the info it was built from.
    fn drop_connection(&mut self) -> Option<ConnectionInfo> {
        let info = self.conn.take()?.info.clone();
        let _ = self.interconnect.pacer.send(PacerMessage::DropConn);

        Some(info)
    }

    fn start_attempt(
        &mut self,
        info: ConnectionInfo,
        kind: AttemptKind,
        task: BoxFuture<'static, Attempt>,
    ) {
        self.pending = Some(PendingAttempt { info, kind, task });
    }

    /// Abandons any in-flight connection attempt, returning the info it was for and
    /// the kind of disconnect this amounts to.
    fn cancel_pending(&mut self) -> Option<(ConnectionInfo, DisconnectKind)> {
        let PendingAttempt { info, kind, task } = self.pending.take()?;

        // Closes any connection the attempt was resuming.
        drop(task);
        let _ = self.interconnect.pacer.send(PacerMessage::DropConn);

        debug!("Abandoned in-flight connection attempt.");

        let kind = match kind {
            AttemptKind::Connect(tx) => {
                let _ = tx.send(Err(ConnectionError::AttemptDiscarded));
                DisconnectKind::Connect
            },
            AttemptKind::Reconnect => DisconnectKind::Reconnect,
        };

        Some((info, kind))
    }

    fn finish_attempt(&mut self, attempt: Attempt) {
        let Some(PendingAttempt { info, kind, .. }) = self.pending.take() else {
            return;
        };

        self.interconnect = attempt.interconnect;

        match (kind, attempt.result) {
            (AttemptKind::Connect(tx), Ok(conn)) => {
                self.fire(CoreContext::DriverConnect(connect_data(&conn)));
                self.conn = Some(conn);

                // Other side may not be listening: this is fine.
                let _ = tx.send(Ok(()));
            },
            (AttemptKind::Connect(tx), Err(e)) => {
                error!("Failed to connect to voice server: {}.", e);
                self.fire(CoreContext::DriverDisconnect(disconnect_data(
                    &info,
                    DisconnectKind::Connect,
                    Some((&e).into()),
                )));

                let _ = tx.send(Err(e));
            },
            (AttemptKind::Reconnect, Ok(conn)) => {
                self.fire(CoreContext::DriverReconnect(connect_data(&conn)));
                self.conn = Some(conn);
            },
            (AttemptKind::Reconnect, Err(e)) => {
                error!("Catastrophic connection failure. Stopping. {:?}", e);

                self.fire(CoreContext::SessionLost(disconnect_data(
                    &info,
                    DisconnectKind::Reconnect,
                    Some((&e).into()),
                )));

                self.clear_pending();
                self.stop_current();
            },
        }
    }

    /// Registers a track's events and places it in the queue.
    fn enqueue(&mut self, mut track: Track, handle: TrackHandle, front: bool) {
        let events = std::mem::replace(&mut track.events, EventStore::new_local());
        let _ = self
            .interconnect
            .events
            .send(EventMessage::AddTrack(track.id, events, handle.clone()));

        let entry = QueuedTrack { track, handle };
        if front {
            self.queue.push_front(entry);
        } else {
            self.queue.push(entry);
        }
    }

    /// Hands the head of the queue to the pacer, if nothing is playing.
    fn play_next(&mut self) {
        if self.queue.is_playing() {
            return;
        }

        if let Some(track) = self.queue.next() {
            let id = track.id;
            let paused = track.state().playing == PlayMode::Pause;

            let _ = self.interconnect.pacer.send(PacerMessage::Play(track));
            self.fire_track(id, TrackEvent::Start);
            if paused {
                self.fire_track(id, TrackEvent::Pause);
            }
        }
    }

    /// Ends the current track early; the queue moves on once the pacer confirms.
    fn advance(&mut self) {
        if self.queue.is_playing() {
            let _ = self.interconnect.pacer.send(PacerMessage::Cut);
        } else {
            self.play_next();
        }
    }

    async fn previous(&mut self) {
        let Some((origin, metadata)) = self.queue.take_previous() else {
            debug!("No finished tracks to return to.");
            return;
        };

        match origin.open().await {
            Ok(input) => {
                let track = Track::new(input.with_metadata(metadata));
                let handle = TrackHandle::new(&track, self.interconnect.core.clone());

                self.enqueue(track, handle, true);
                self.advance();
            },
            Err(e) => warn!("Failed to reopen previous track: {}.", e),
        }
    }

    fn track_ended(&mut self, id: TrackId, reason: TrackEndReason) {
        if !self.queue.is_current(id) {
            debug!("Ignoring end of stale track {}.", id);
            return;
        }

        let errored = matches!(reason, TrackEndReason::Errored(_));
        if let Some(handle) = self.queue.finish_current(!errored) {
            let mode = if errored { PlayMode::Errored } else { PlayMode::End };
            handle.set_mode(mode);

            if errored {
                self.fire_track(id, TrackEvent::Error);
            }
            self.finish_track_events(id);
        }

        self.play_next();
    }

    fn finish_track_events(&self, id: TrackId) {
        self.fire_track(id, TrackEvent::End);
        let _ = self.interconnect.events.send(EventMessage::RemoveTrack(id));
    }

    /// Stops the current track immediately, without recording it in history.
    fn stop_current(&mut self) {
        if let Some(handle) = self.queue.finish_current(false) {
            handle.set_mode(PlayMode::Stop);
            let _ = self.interconnect.pacer.send(PacerMessage::Cut);
            self.finish_track_events(handle.id());
        }
    }

    fn clear_pending(&mut self) {
        for QueuedTrack { handle, .. } in self.queue.clear() {
            handle.set_mode(PlayMode::Stop);
            self.finish_track_events(handle.id());
        }
    }

    fn pause_current(&mut self) {
        if let Some(handle) = self.queue.current() {
            if handle.set_mode(PlayMode::Pause) {
                let _ = self.interconnect.pacer.send(PacerMessage::Pause);
                self.fire_track(handle.id(), TrackEvent::Pause);
            }
        }
    }

    fn resume_current(&mut self) {
        if let Some(handle) = self.queue.current() {
            if handle.set_mode(PlayMode::Play) {
                let _ = self.interconnect.pacer.send(PacerMessage::Resume);
                self.fire_track(handle.id(), TrackEvent::Play);
            }
        }
    }

    fn track_command(&mut self, id: TrackId, cmd: TrackCommand) {
        let is_current = self.queue.is_current(id);

        match cmd {
            TrackCommand::Play if is_current => self.resume_current(),
            TrackCommand::Pause if is_current => self.pause_current(),
            TrackCommand::Stop if is_current => {
                self.stop_current();
                self.play_next();
            },
            TrackCommand::Play | TrackCommand::Pause => {
                let (mode, evt) = match cmd {
                    TrackCommand::Play => (PlayMode::Play, TrackEvent::Play),
                    _ => (PlayMode::Pause, TrackEvent::Pause),
                };

                // Queued tracks pick up their mode when they start.
                let handle = self
                    .queue
                    .handles()
                    .into_iter()
                    .find(|h| h.id() == id);
                if let Some(handle) = handle {
                    if handle.set_mode(mode) {
                        self.fire_track(id, evt);
                    }
                }
            },
            TrackCommand::Stop =>
                if let Some(QueuedTrack { handle, .. }) = self.queue.remove(id) {
                    handle.set_mode(PlayMode::Stop);
                    self.finish_track_events(id);
                },
            TrackCommand::AddEvent(evt) => {
                let _ = self
                    .interconnect
                    .events
                    .send(EventMessage::AddTrackEvent(id, evt));
            },
        }
    }
}

/// Attempts a full handshake, retrying transient failures according to
/// `Config::driver_retry`.
async fn connect_with_retry(
    info: ConnectionInfo,
    mut interconnect: Interconnect,
    config: Config,
    stats: TransportStats,
) -> Attempt {
    let mut attempt = 0;
    let mut last_wait = None;

    loop {
        let err = match Connection::new(info.clone(), &interconnect, &config, &stats).await {
            Ok(conn) =>
                return Attempt {
                    interconnect,
                    result: Ok(conn),
                },
            Err(e) => e,
        };

        if let ConnectionError::InterconnectFailure(Recipient::Event) = err {
            interconnect.restart_volatile_internals();
        } else if !err.should_retry() {
            return Attempt {
                interconnect,
                result: Err(err),
            };
        }

        match config.driver_retry.retry_in(attempt, last_wait) {
            Some(wait) => {
                warn!(attempt, ?wait, "Connection attempt failed: {}.", err);
                sleep(wait).await;

                attempt += 1;
                last_wait = Some(wait);
            },
            None =>
                return Attempt {
                    interconnect,
                    result: Err(err),
                },
        }
    }
}

/// Tries to resume a session once, then falls back to full connections.
#[instrument(skip_all)]
async fn resume(
    mut conn: Connection,
    mut interconnect: Interconnect,
    config: Config,
    stats: TransportStats,
) -> Attempt {
    let res = match conn.reconnect(&config).await {
        Err(ConnectionError::InterconnectFailure(Recipient::Event)) => {
            interconnect.restart_volatile_internals();
            conn.update_interconnect(&interconnect);

            conn.reconnect(&config).await
        },
        res => res,
    };

    match res {
        Ok(()) => Attempt {
            interconnect,
            result: Ok(conn),
        },
        Err(e) => {
            warn!("Resume failed, falling back to a full connection: {}.", e);

            let info = conn.info.clone();
            drop(conn);
            let _ = interconnect.pacer.send(PacerMessage::DropConn);

            connect_with_retry(info, interconnect, config, stats).await
        },
    }
}

async fn attempt_or_pend(pending: Option<&mut PendingAttempt>) -> Attempt {
    match pending {
        Some(pending) => (&mut pending.task).await,
        None => future::pending().await,
    }
}

fn connect_data(conn: &Connection) -> InternalConnect {
    InternalConnect {
        channel_id: conn.info.channel_id,
        guild_id: conn.info.guild_id,
        session_id: conn.info.session_id.clone(),
        server: conn.info.endpoint.clone(),
        ssrc: conn.ssrc,
    }
}

fn disconnect_data(
    info: &ConnectionInfo,
    kind: DisconnectKind,
    reason: Option<DisconnectReason>,
) -> InternalDisconnect {
    InternalDisconnect {
        kind,
        reason,
        channel_id: Some(info.channel_id),
        guild_id: info.guild_id,
        session_id: info.session_id.clone(),
    }
}

#[instrument(skip(config, rx, tx, stats))]
async fn runner(
    config: Config,
    rx: Receiver<CoreMessage>,
    tx: Sender<CoreMessage>,
    stats: TransportStats,
) {
    let interconnect = start_internals(tx, &config);

    let mut core = Core {
        queue: PlaybackQueue::new(config.history_len),
        config,
        conn: None,
        interconnect,
        pending: None,
        stats,
    };

    loop {
        tokio::select! {
            msg = rx.recv_async() => match msg {
                Ok(CoreMessage::Poison) | Err(RecvError::Disconnected) => break,
                Ok(msg) => core.handle(msg).await,
            },
            attempt = attempt_or_pend(core.pending.as_mut()) => core.finish_attempt(attempt),
        }
    }

    info!("Main thread exited");
    core.cancel_pending();
    core.conn = None;
    core.interconnect.poison_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        driver::retry::{Retry, Strategy},
        id::{ChannelId, GuildId, UserId},
        input::{Codec, Input, Metadata},
    };
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::time::timeout;

    fn spawn_core() -> Sender<CoreMessage> {
        let (tx, rx) = flume::unbounded();
        start(Config::default(), rx, tx.clone(), TransportStats::default());
        tx
    }

    fn memory_track(title: &str) -> (Track, TrackHandle) {
        let (tx, _rx) = flume::unbounded();
        let input = Input::memory(Bytes::new(), Codec::Dca).with_metadata(Metadata {
            title: Some(title.into()),
            ..Default::default()
        });
        let track = Track::new(input);
        let handle = TrackHandle::new(&track, tx);
        (track, handle)
    }

    async fn queue_titles(core: &Sender<CoreMessage>) -> Vec<String> {
        let (tx, rx) = flume::bounded(1);
        core.send(CoreMessage::Queue(tx)).unwrap();
        rx.recv_async()
            .await
            .unwrap()
            .iter()
            .filter_map(|h| h.metadata().title.clone())
            .collect()
    }

    async fn history_titles(core: &Sender<CoreMessage>) -> Vec<String> {
        let (tx, rx) = flume::bounded(1);
        core.send(CoreMessage::History(tx)).unwrap();
        rx.recv_async()
            .await
            .unwrap()
            .into_iter()
            .filter_map(|m| m.title)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_queue_and_ends_tracks() {
        let core = spawn_core();

        let mut handles = vec![];
        for name in ["a", "b", "c"] {
            let (track, handle) = memory_track(name);
            core.send(CoreMessage::Enqueue(track, handle.clone())).unwrap();
            handles.push(handle);
        }

        assert_eq!(queue_titles(&core).await, vec!["a", "b", "c"]);

        core.send(CoreMessage::Stop).unwrap();
        assert!(queue_titles(&core).await.is_empty());
        assert!(handles.iter().all(|h| h.state().playing == PlayMode::Stop));
        assert!(history_titles(&core).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_track_current_mode() {
        let core = spawn_core();
        let (track, handle) = memory_track("a");
        core.send(CoreMessage::Enqueue(track, handle.clone())).unwrap();

        core.send(CoreMessage::Pause).unwrap();
        queue_titles(&core).await;
        assert_eq!(handle.state().playing, PlayMode::Pause);

        core.send(CoreMessage::Resume).unwrap();
        queue_titles(&core).await;
        assert_eq!(handle.state().playing, PlayMode::Play);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_a_queued_track_removes_it() {
        let core = spawn_core();
        let (a, ha) = memory_track("a");
        let (b, hb) = memory_track("b");
        core.send(CoreMessage::Enqueue(a, ha)).unwrap();
        core.send(CoreMessage::Enqueue(b, hb.clone())).unwrap();

        core.send(CoreMessage::Track(hb.id(), TrackCommand::Stop)).unwrap();

        assert_eq!(queue_titles(&core).await, vec!["a"]);
        assert_eq!(hb.state().playing, PlayMode::Stop);
    }

    #[tokio::test(start_paused = true)]
    async fn end_of_source_advances_and_records_history() {
        let core = spawn_core();
        let (a, ha) = memory_track("a");
        let (b, hb) = memory_track("b");
        core.send(CoreMessage::Enqueue(a, ha.clone())).unwrap();
        core.send(CoreMessage::Enqueue(b, hb.clone())).unwrap();

        // Without a connection the pacer holds the head; report its end directly.
        core.send(CoreMessage::TrackEnded(ha.id(), TrackEndReason::Finished))
            .unwrap();

        assert_eq!(queue_titles(&core).await, vec!["b"]);
        assert_eq!(history_titles(&core).await, vec!["a"]);
        assert_eq!(ha.state().playing, PlayMode::End);

        // Ends of tracks which are no longer current change nothing.
        core.send(CoreMessage::TrackEnded(ha.id(), TrackEndReason::Finished))
            .unwrap();
        assert_eq!(queue_titles(&core).await, vec!["b"]);

        core.send(CoreMessage::TrackEnded(hb.id(), TrackEndReason::Errored("bad".into())))
            .unwrap();
        assert!(queue_titles(&core).await.is_empty());
        assert_eq!(history_titles(&core).await, vec!["a"]);
        assert_eq!(hb.state().playing, PlayMode::Errored);
    }

    #[tokio::test(start_paused = true)]
    async fn previous_requeues_latest_history_entry() {
        let core = spawn_core();
        let (a, ha) = memory_track("a");
        let (b, hb) = memory_track("b");
        core.send(CoreMessage::Enqueue(a, ha.clone())).unwrap();
        core.send(CoreMessage::Enqueue(b, hb.clone())).unwrap();
        core.send(CoreMessage::TrackEnded(ha.id(), TrackEndReason::Finished))
            .unwrap();

        core.send(CoreMessage::Previous).unwrap();

        // "b" is cut, so "a" plays next, with "b" remembered in its place.
        let current = {
            let (tx, rx) = flume::bounded(1);
            core.send(CoreMessage::Queue(tx)).unwrap();
            rx.recv_async().await.unwrap()
        };
        assert_eq!(current[0].id(), hb.id());
        assert_eq!(current[1].metadata().title.as_deref(), Some("a"));
        assert_ne!(current[1].id(), ha.id());

        core.send(CoreMessage::TrackEnded(hb.id(), TrackEndReason::Cut))
            .unwrap();
        assert_eq!(queue_titles(&core).await, vec!["a"]);
        assert_eq!(history_titles(&core).await, vec!["b"]);
    }

    #[tokio::test]
    async fn connection_attempts_do_not_stall_commands() {
        let (tx, rx) = flume::unbounded();
        let config = Config::default()
            .driver_retry(Retry::new(Strategy::Every(Duration::from_secs(60)), None));
        start(config, rx, tx.clone(), TransportStats::default());

        // Nothing listens here, so the attempt settles into a long backoff.
        let info = ConnectionInfo::new(
            GuildId(1),
            ChannelId(2),
            UserId(3),
            "ws://127.0.0.1:1",
            "sess",
            "token",
        );
        let (res_tx, res_rx) = flume::bounded(1);
        tx.send(CoreMessage::ConnectWithResult(info, res_tx)).unwrap();

        let (track, handle) = memory_track("a");
        tx.send(CoreMessage::Enqueue(track, handle)).unwrap();
        let titles = timeout(Duration::from_millis(500), queue_titles(&tx))
            .await
            .unwrap();
        assert_eq!(titles, vec!["a"]);

        tx.send(CoreMessage::Disconnect).unwrap();
        let res = timeout(Duration::from_millis(500), res_rx.recv_async())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(res, Err(ConnectionError::AttemptDiscarded)));
    }

    #[tokio::test]
    async fn new_connections_replace_in_flight_attempts() {
        let (tx, rx) = flume::unbounded();
        let config = Config::default()
            .driver_retry(Retry::new(Strategy::Every(Duration::from_secs(60)), None));
        start(config, rx, tx.clone(), TransportStats::default());

        let info = |session: &str| {
            ConnectionInfo::new(
                GuildId(1),
                ChannelId(2),
                UserId(3),
                "ws://127.0.0.1:1",
                session,
                "token",
            )
        };

        let (first_tx, first_rx) = flume::bounded(1);
        tx.send(CoreMessage::ConnectWithResult(info("one"), first_tx))
            .unwrap();
        let (second_tx, second_rx) = flume::bounded(1);
        tx.send(CoreMessage::ConnectWithResult(info("two"), second_tx))
            .unwrap();

        let res = timeout(Duration::from_millis(500), first_rx.recv_async())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(res, Err(ConnectionError::AttemptDiscarded)));
        assert!(second_rx.is_empty());

        tx.send(CoreMessage::Poison).unwrap();
    }
}
