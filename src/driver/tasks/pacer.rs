use super::message::*;
use crate::{
    constants::*,
    driver::schedule::Schedule,
    input::{Frame, FrameResult, Result as InputResult, Source},
    tracks::{PlayMode, Track, TrackEndReason, TrackId, TrackState},
    Bitrate,
    Config,
};
use flume::{Receiver, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

/// The track whose frames are currently being sent.
struct Playing {
    id: TrackId,
    source: Source,
    state: Arc<Mutex<TrackState>>,
}

/// Pulls frames from the active track and hands one to the transmit task on every
/// slot of a fixed 20ms schedule.
pub(crate) struct Pacer {
    bitrate: Bitrate,
    config: Config,
    conn: Option<PacerConnection>,
    interconnect: Interconnect,
    rx: Receiver<PacerMessage>,
    schedule: Schedule,

    current: Option<Playing>,
    pending: Option<Frame>,
    paused: bool,
    muted: bool,
    speaking: bool,

    silence_remaining: u8,
    mute_silence_remaining: u8,
}

impl Pacer {
    pub(crate) fn new(interconnect: Interconnect, rx: Receiver<PacerMessage>, config: Config) -> Self {
        Self {
            bitrate: config.bitrate,
            config,
            conn: None,
            interconnect,
            rx,
            schedule: Schedule::new(Instant::now(), TIMESTEP_LENGTH),

            current: None,
            pending: None,
            paused: false,
            muted: false,
            speaking: false,

            silence_remaining: 0,
            mute_silence_remaining: 0,
        }
    }

    #[instrument(skip(self))]
    async fn run(&mut self) {
        let mut was_active = false;

        loop {
            let active = self.has_output();
            if active && !was_active {
                self.schedule.reanchor(Instant::now());
            }
            was_active = active;

            let want_frame = self.silence_remaining == 0
                && self.pending.is_none()
                && !self.paused
                && self.current.is_some();
            let want_send = active && (self.silence_remaining > 0 || self.pending.is_some());
            let deadline = self.schedule.deadline();

            tokio::select! {
                biased;
                msg = self.rx.recv_async() => match msg {
                    Ok(PacerMessage::Poison) | Err(_) => break,
                    Ok(msg) => self.handle_message(msg),
                },
                _ = sleep_until(deadline), if want_send => {
                    self.send_slot();
                    self.schedule.advance(Instant::now());
                },
                res = next_frame_or_pend(self.current.as_mut()), if want_frame => {
                    self.on_frame(res);
                },
            }
        }

        if self.schedule.late_slots() > 0 {
            debug!("Pacer forfeited {} late slots.", self.schedule.late_slots());
        }
    }

    /// Whether there is, or shortly will be, a frame to send on each slot.
    fn has_output(&self) -> bool {
        self.conn.is_some()
            && (self.silence_remaining > 0 || (self.current.is_some() && !self.paused))
    }

    fn handle_message(&mut self, msg: PacerMessage) {
        use PacerMessage::*;

        match msg {
            SetConn(conn) => {
                self.conn = Some(conn);
                self.speaking = false;
            },
            DropConn => {
                self.conn = None;
                self.speaking = false;
                self.silence_remaining = 0;
            },
            Play(track) => {
                if self.current.is_some() {
                    self.end_current(TrackEndReason::Cut);
                }
                self.start(track);
            },
            Cut => self.end_current(TrackEndReason::Cut),
            Pause =>
                if self.current.is_some() && !self.paused {
                    self.paused = true;
                    self.start_silence();
                },
            Resume => self.paused = false,
            Mute(muted) => {
                if muted && !self.muted {
                    if self.speaking {
                        self.mute_silence_remaining = self.config.silence_frames;
                    }
                    if self.mute_silence_remaining == 0 {
                        self.set_speaking(false);
                    }
                }
                self.muted = muted;
            },
            SetBitrate(bitrate) => {
                self.bitrate = bitrate;
                if let Some(current) = self.current.as_mut() {
                    if let Err(e) = current.source.set_bitrate(bitrate) {
                        warn!("Failed to change bitrate of track {}: {:?}.", current.id, e);
                    }
                }
            },
            SetConfig(config) => self.config = config,
            ReplaceInterconnect(i) => self.interconnect = i,
            Poison => {},
        }
    }

    fn start(&mut self, track: Track) {
        let Track {
            id,
            mut source,
            state,
            ..
        } = track;

        if let Err(e) = source.set_bitrate(self.bitrate) {
            warn!("Failed to set bitrate of track {}: {:?}.", id, e);
        }

        self.paused = state.lock().playing == PlayMode::Pause;
        self.pending = None;
        self.current = Some(Playing { id, source, state });

        debug!("Now sending track {}.", id);
    }

    fn on_frame(&mut self, res: InputResult<FrameResult>) {
        match res {
            Ok(FrameResult::Frame(frame)) => self.pending = Some(frame),
            Ok(FrameResult::EndOfSource) => self.end_current(TrackEndReason::Finished),
            Err(e) => {
                warn!("Track source failed: {}.", e);
                self.end_current(TrackEndReason::Errored(e.to_string()));
            },
        }
    }

    fn end_current(&mut self, reason: TrackEndReason) {
        let Some(playing) = self.current.take() else {
            return;
        };

        self.pending = None;
        self.paused = false;

        debug!("Track {} ended: {:?}.", playing.id, reason);
        if self
            .interconnect
            .core
            .send(CoreMessage::TrackEnded(playing.id, reason))
            .is_err()
        {
            error!("Core task has exited, dropping track end.");
        }

        self.start_silence();
    }

    /// Queues the trailing silence frames sent whenever audio stops.
    fn start_silence(&mut self) {
        if !self.speaking || self.muted {
            return;
        }

        self.silence_remaining = self.config.silence_frames;
        if self.silence_remaining == 0 {
            self.set_speaking(false);
        }
    }

    fn send_slot(&mut self) {
        if self.silence_remaining > 0 {
            self.silence_remaining -= 1;
            self.transmit(Frame::silence());

            if self.silence_remaining == 0 && (self.current.is_none() || self.paused) {
                self.set_speaking(false);
            }
        } else if let Some(frame) = self.pending.take() {
            if let Some(current) = &self.current {
                current.state.lock().step_frame();
            }

            if !self.muted {
                self.set_speaking(true);
                self.transmit(frame);
            } else if self.mute_silence_remaining > 0 {
                self.mute_silence_remaining -= 1;
                self.transmit(Frame::silence());

                if self.mute_silence_remaining == 0 {
                    self.set_speaking(false);
                }
            }
        }
    }

    fn transmit(&self, frame: Frame) {
        let Some(conn) = &self.conn else {
            return;
        };

        match conn.udp_tx.try_send(UdpTxMessage::Packet(frame)) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                trace!("Transmit queue full, dropping frame.");
                conn.stats.dropped();
            },
            Err(TrySendError::Disconnected(_)) => {
                trace!("Transmit task has exited, dropping frame.");
            },
        }
    }

    fn set_speaking(&mut self, speaking: bool) {
        if self.speaking == speaking {
            return;
        }

        self.speaking = speaking;
        if let Some(conn) = &self.conn {
            let _ = conn.ws.send(WsMessage::Speaking(speaking));
        }
    }
}

async fn next_frame_or_pend(current: Option<&mut Playing>) -> InputResult<FrameResult> {
    match current {
        Some(playing) => playing.source.next_frame().await,
        None => std::future::pending().await,
    }
}

#[instrument(skip(pacer))]
pub(crate) async fn runner(mut pacer: Pacer) {
    info!("Pacer started.");
    pacer.run().await;
    info!("Pacer finished.");
}
