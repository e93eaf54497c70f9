use super::message::*;
use crate::{
    driver::gateway::{GatewayState, GatewayTransition},
    events::CoreContext,
    model::{
        id::UserId,
        payload::{Heartbeat, Speaking},
        CloseCode,
        Event as GatewayEvent,
        SpeakingState,
    },
    ws::{Error as WsError, Inbound, ReceiverExt, SenderExt, WsStream},
    Config,
};
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use rand::random;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

/// Websocket half of a live connection: heartbeats, inbound events and
/// speaking updates, all driven from one `select!` loop.
pub(crate) struct WsTask {
    interconnect: Interconnect,
    rx: Receiver<WsMessage>,
    udp_rx: Sender<UdpRxMessage>,
    ws_client: Option<WsStream>,
    state: GatewayState,

    ssrc: u32,
    heartbeat_interval: Duration,
    max_missed_heartbeats: u32,
    close_timeout: Duration,

    /// Speaking flags as last sent on the current socket.
    speaking: SpeakingState,
    /// Microphone flag most recently asked for by the pacer.
    wants_speaking: bool,
    /// Audio SSRCs of other users, as announced by the server.
    ssrcs: HashMap<UserId, u32>,
    last_heartbeat: Option<(u64, Instant)>,
    missed_heartbeats: u32,
    last_seq: Arc<Mutex<Option<u64>>>,
}

impl WsTask {
    pub(crate) fn new(
        interconnect: Interconnect,
        rx: Receiver<WsMessage>,
        udp_rx: Sender<UdpRxMessage>,
        ws_client: WsStream,
        ssrc: u32,
        heartbeat_interval: f64,
        config: &Config,
        last_seq: Arc<Mutex<Option<u64>>>,
    ) -> Self {
        Self {
            interconnect,
            rx,
            udp_rx,
            ws_client: Some(ws_client),
            state: GatewayState::Ready,

            ssrc,
            heartbeat_interval: Duration::from_secs_f64(heartbeat_interval / 1000.0),
            max_missed_heartbeats: config.max_missed_heartbeats,
            close_timeout: config.close_timeout,

            speaking: SpeakingState::empty(),
            wants_speaking: false,
            ssrcs: HashMap::new(),
            last_heartbeat: None,
            missed_heartbeats: 0,
            last_seq,
        }
    }

    #[instrument(skip(self))]
    async fn run(&mut self) {
        let mut next_heartbeat = self.next_heartbeat();

        loop {
            let mut lost = None;

            let hb = time::sleep_until(next_heartbeat);

            tokio::select! {
                _ = hb => {
                    next_heartbeat = self.next_heartbeat();
                    lost = self.heartbeat().await;
                }
                ws_msg = recv_or_pend(self.ws_client.as_mut()) => {
                    match ws_msg {
                        Err(WsError::Json(e)) => {
                            warn!("Unexpected JSON {:?}.", e);
                        },
                        Err(e) => {
                            error!("Error processing ws {:?}.", e);
                            lost = Some(loss_action(&e));
                        },
                        Ok(Some(Inbound { event, seq })) => {
                            if seq.is_some() {
                                *self.last_seq.lock() = seq;
                            }
                            self.process_ws(event);
                        },
                        Ok(None) => {},
                    }
                }
                inner_msg = self.rx.recv_async() => {
                    match inner_msg {
                        Ok(WsMessage::Ws(data)) => {
                            self.ws_client = Some(*data);
                            self.resumed();
                            next_heartbeat = self.next_heartbeat();
                            lost = self.sync_speaking().await;
                        },
                        Ok(WsMessage::ReplaceInterconnect(i)) => {
                            self.interconnect = i;
                        },
                        Ok(WsMessage::SetKeepalive(keepalive)) => {
                            self.heartbeat_interval = Duration::from_secs_f64(keepalive / 1000.0);
                            next_heartbeat = self.next_heartbeat();
                        },
                        Ok(WsMessage::Speaking(is_speaking)) => {
                            self.wants_speaking = is_speaking;
                            lost = self.sync_speaking().await;
                        },
                        Err(_) | Ok(WsMessage::Poison) => {
                            break;
                        },
                    }
                }
            }

            if let Some(msg) = lost {
                self.lose(msg);
            }
        }

        self.close().await;
    }

    fn next_heartbeat(&self) -> Instant {
        Instant::now() + self.heartbeat_interval
    }

    /// Sends a heartbeat, or reports the connection lost if too many have gone
    /// unacknowledged.
    async fn heartbeat(&mut self) -> Option<CoreMessage> {
        if !self.state.is_ready() {
            return None;
        }

        if let Some((nonce, _)) = self.last_heartbeat {
            self.missed_heartbeats += 1;
            warn!(
                "Heartbeat {} unacknowledged ({}/{}).",
                nonce, self.missed_heartbeats, self.max_missed_heartbeats
            );

            if self.missed_heartbeats >= self.max_missed_heartbeats {
                error!("Voice server stopped acknowledging heartbeats.");
                return Some(CoreMessage::Reconnect);
            }
        }

        let nonce = random::<u64>();
        self.last_heartbeat = Some((nonce, Instant::now()));
        let seq_ack = *self.last_seq.lock();

        trace!("Sent heartbeat {:?}", self.speaking);

        let client = self.ws_client.as_mut()?;
        match client
            .send_json(&GatewayEvent::from(Heartbeat { nonce, seq_ack }))
            .await
        {
            Ok(()) => None,
            Err(e) => {
                error!("Heartbeat send failure {:?}.", e);
                Some(loss_action(&e))
            },
        }
    }

    /// Sends the pacer's latest speaking request, if the server has not yet seen it.
    ///
    /// Requests made while the socket is down are held until the next resume.
    async fn sync_speaking(&mut self) -> Option<CoreMessage> {
        if self.speaking.microphone() == self.wants_speaking || !self.state.is_ready() {
            return None;
        }

        let client = self.ws_client.as_mut()?;

        self.speaking.set(SpeakingState::MICROPHONE, self.wants_speaking);
        info!("Changing to {:?}", self.speaking);

        let res = client
            .send_json(&GatewayEvent::from(Speaking {
                delay: Some(0),
                speaking: self.speaking,
                ssrc: self.ssrc,
                user_id: None,
            }))
            .await;

        match res {
            Ok(()) => None,
            Err(e) => {
                error!("Issue sending speaking update {:?}.", e);
                Some(loss_action(&e))
            },
        }
    }

    fn process_ws(&mut self, value: GatewayEvent) {
        let ctx = match value {
            GatewayEvent::Speaking(ev) => {
                if let Some(user_id) = ev.user_id {
                    self.ssrcs.insert(user_id, ev.ssrc);
                }
                CoreContext::SpeakingStateUpdate(ev)
            },
            GatewayEvent::ClientsConnect(ev) => CoreContext::ClientsConnect(ev),
            GatewayEvent::ClientConnect(ev) => {
                if ev.audio_ssrc != 0 {
                    self.ssrcs.insert(ev.user_id, ev.audio_ssrc);
                }
                CoreContext::ClientConnect(ev)
            },
            GatewayEvent::ClientDisconnect(ev) => {
                if let Some(ssrc) = self.ssrcs.remove(&ev.user_id) {
                    let _ = self.udp_rx.send(UdpRxMessage::ClientDisconnect(ssrc));
                }
                CoreContext::ClientDisconnect(ev)
            },
            GatewayEvent::HeartbeatAck(ev) => {
                match self.last_heartbeat.take() {
                    Some((nonce, sent)) if nonce == ev.nonce => {
                        self.missed_heartbeats = 0;
                        trace!("Heartbeat ACK received after {:?}.", sent.elapsed());
                    },
                    Some((nonce, sent)) => {
                        warn!("Heartbeat nonce mismatch! Expected {}, saw {}.", nonce, ev.nonce);
                        self.last_heartbeat = Some((nonce, sent));
                    },
                    None => {},
                }
                return;
            },
            GatewayEvent::Unknown(op) => {
                trace!("Ignoring message with unknown opcode {}.", op);
                return;
            },
            other => {
                trace!("Received other websocket data: {:?}", other);
                return;
            },
        };

        let _ = self.interconnect.events.send(EventMessage::FireCoreEvent(ctx));
    }

    /// Drops the current socket, and asks the core task to restore the session.
    fn lose(&mut self, msg: CoreMessage) {
        if let Ok(state) = self.state.transition(GatewayTransition::Lost) {
            self.state = state;
        }

        self.ws_client = None;
        self.last_heartbeat = None;
        self.missed_heartbeats = 0;

        debug!("Control channel lost: requesting {:?}.", msg);
        let _ = self.interconnect.core.send(msg);
    }

    /// Adopts a socket resumed by the core task.
    fn resumed(&mut self) {
        let steps = [
            GatewayTransition::Lost,
            GatewayTransition::Resume,
            GatewayTransition::Resumed,
        ];

        match steps.iter().try_fold(self.state, |s, t| s.transition(*t)) {
            Ok(state) => self.state = state,
            Err(e) => warn!("Ignoring resumed socket: {e}."),
        }

        self.last_heartbeat = None;
        self.missed_heartbeats = 0;
        // The server forgets our speaking state across sockets.
        self.speaking = SpeakingState::empty();
    }

    async fn close(&mut self) {
        if let Some(mut client) = self.ws_client.take() {
            match time::timeout(self.close_timeout, client.close(None)).await {
                Ok(Ok(())) => debug!("Websocket closed cleanly."),
                Ok(Err(e)) => debug!("Websocket close failed: {:?}.", e),
                Err(_) => debug!("Websocket close timed out."),
            }
        }

        if let Ok(state) = self.state.transition(GatewayTransition::Disconnect) {
            self.state = state;
        }
    }
}

async fn recv_or_pend(client: Option<&mut WsStream>) -> Result<Option<Inbound>, WsError> {
    match client {
        Some(client) => client.recv_json().await,
        None => std::future::pending().await,
    }
}

/// Chooses how the core task should react to a websocket failure.
fn loss_action(err: &WsError) -> CoreMessage {
    match err.close_code().map(CloseCode::try_from) {
        Some(Ok(code)) if code.should_resume() => CoreMessage::Reconnect,
        Some(Ok(code)) if code.is_terminal() => CoreMessage::Terminated(code),
        Some(Ok(_)) => CoreMessage::FullReconnect,
        // Abnormal closure, or a code outside the voice protocol.
        Some(Err(_)) | None => CoreMessage::Reconnect,
    }
}

/// Runs the websocket task until poisoned, returning its final gateway state.
#[instrument(skip(task))]
pub(crate) async fn runner(mut task: WsTask) -> GatewayState {
    info!("WS thread started.");
    task.run().await;
    info!("WS thread finished.");

    task.state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::payload::{ClientConnect, ClientDisconnect};
    use futures::{SinkExt, StreamExt};
    use serde_json::Value;
    use std::borrow::Cow;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::{
        protocol::{frame::coding::CloseCode as WsCode, CloseFrame},
        Message,
    };
    use url::Url;

    struct Harness {
        task: WsTask,
        core_rx: Receiver<CoreMessage>,
        _events_rx: Receiver<EventMessage>,
        _pacer_rx: Receiver<PacerMessage>,
        udp_rx: Receiver<UdpRxMessage>,
        heartbeats: Receiver<u64>,
        ws_tx: Sender<WsMessage>,
    }

    /// Spawns a websocket server which records heartbeats, acknowledging them if `ack` is set.
    async fn harness(ack: bool, interval_ms: f64) -> Harness {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (hb_tx, hb_rx) = flume::unbounded();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["op"] == 3 {
                    let nonce = value["d"]["t"].as_u64().unwrap();
                    let _ = hb_tx.send(nonce);
                    if ack {
                        let reply = format!(r#"{{"op":6,"d":{{"t":{nonce}}}}}"#);
                        ws.send(Message::Text(reply)).await.unwrap();
                    }
                }
            }
        });

        let url = Url::parse(&format!("ws://{addr}")).unwrap();
        let client = crate::ws::create_client(url).await.unwrap();

        harness_with(client, interval_ms, hb_rx)
    }

    fn harness_with(client: WsStream, interval_ms: f64, heartbeats: Receiver<u64>) -> Harness {
        let (core_tx, core_rx) = flume::unbounded();
        let (events_tx, events_rx) = flume::unbounded();
        let (pacer_tx, pacer_rx) = flume::unbounded();
        let (udp_rx_tx, udp_rx) = flume::unbounded();
        let (ws_tx, ws_rx) = flume::unbounded();

        let interconnect = Interconnect {
            core: core_tx,
            events: events_tx,
            pacer: pacer_tx,
        };

        let task = WsTask::new(
            interconnect,
            ws_rx,
            udp_rx_tx,
            client,
            1,
            interval_ms,
            &Config::default(),
            Default::default(),
        );

        Harness {
            task,
            core_rx,
            _events_rx: events_rx,
            _pacer_rx: pacer_rx,
            udp_rx,
            heartbeats,
            ws_tx,
        }
    }

    /// Spawns a websocket server which reports `(connection, flags)` for every speaking
    /// update. The first connection is closed with 4015 after its first update.
    async fn speaking_server() -> (Url, Receiver<(usize, u64)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = flume::unbounded();

        tokio::spawn(async move {
            for conn in 0usize.. {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let tx = tx.clone();

                tokio::spawn(async move {
                    while let Some(Ok(Message::Text(text))) = ws.next().await {
                        let value: Value = serde_json::from_str(&text).unwrap();
                        if value["op"] != 5 {
                            continue;
                        }

                        let _ = tx.send((conn, value["d"]["speaking"].as_u64().unwrap()));
                        if conn == 0 {
                            let _ = ws
                                .close(Some(CloseFrame {
                                    code: WsCode::from(4015),
                                    reason: Cow::Borrowed(""),
                                }))
                                .await;
                        }
                    }
                });
            }
        });

        (Url::parse(&format!("ws://{addr}")).unwrap(), rx)
    }

    #[tokio::test]
    async fn closes_after_two_missed_acks() {
        let h = harness(false, 20.0).await;
        let handle = tokio::spawn(runner(h.task));

        let msg = h.core_rx.recv_async().await.unwrap();
        assert!(matches!(msg, CoreMessage::Reconnect));

        // One heartbeat per interval until the second miss.
        assert_eq!(h.heartbeats.drain().count(), 2);

        h.ws_tx.send(WsMessage::Poison).unwrap();
        assert_eq!(handle.await.unwrap(), GatewayState::Disconnected);
    }

    #[tokio::test]
    async fn acknowledged_heartbeats_keep_session() {
        let h = harness(true, 10.0).await;
        let handle = tokio::spawn(runner(h.task));

        for _ in 0..5 {
            h.heartbeats.recv_async().await.unwrap();
        }
        assert!(h.core_rx.is_empty());

        h.ws_tx.send(WsMessage::Poison).unwrap();
        assert_eq!(handle.await.unwrap(), GatewayState::Disconnected);
    }

    #[tokio::test]
    async fn speaking_is_restored_after_resume() {
        let (url, updates) = speaking_server().await;
        let client = crate::ws::create_client(url.clone()).await.unwrap();
        let h = harness_with(client, 60_000.0, flume::unbounded().1);
        let handle = tokio::spawn(runner(h.task));

        h.ws_tx.send(WsMessage::Speaking(true)).unwrap();
        assert_eq!(updates.recv_async().await.unwrap(), (0, 1));
        assert!(matches!(
            h.core_rx.recv_async().await.unwrap(),
            CoreMessage::Reconnect
        ));

        // The pacer does not repeat itself: the new socket must still learn the flag.
        let resumed = crate::ws::create_client(url).await.unwrap();
        h.ws_tx.send(WsMessage::Ws(Box::new(resumed))).unwrap();
        assert_eq!(updates.recv_async().await.unwrap(), (1, 1));

        h.ws_tx.send(WsMessage::Speaking(false)).unwrap();
        assert_eq!(updates.recv_async().await.unwrap(), (1, 0));
        assert!(updates.is_empty());

        h.ws_tx.send(WsMessage::Poison).unwrap();
        assert_eq!(handle.await.unwrap(), GatewayState::Disconnected);
    }

    #[tokio::test]
    async fn departing_users_release_their_ssrc() {
        let mut h = harness(true, 60_000.0).await;

        h.task.process_ws(GatewayEvent::ClientConnect(ClientConnect {
            audio_ssrc: 55,
            user_id: UserId(9),
            video_ssrc: 0,
        }));
        h.task.process_ws(GatewayEvent::Speaking(Speaking {
            delay: None,
            speaking: SpeakingState::MICROPHONE,
            ssrc: 56,
            user_id: Some(UserId(10)),
        }));

        for user in [10, 9, 11] {
            h.task.process_ws(GatewayEvent::ClientDisconnect(ClientDisconnect {
                user_id: UserId(user),
            }));
        }

        let released: Vec<u32> = h
            .udp_rx
            .drain()
            .filter_map(|msg| match msg {
                UdpRxMessage::ClientDisconnect(ssrc) => Some(ssrc),
                _ => None,
            })
            .collect();
        assert_eq!(released, vec![56, 55]);
    }

    #[test]
    fn close_codes_pick_recovery() {
        let closed = |code: u16| {
            WsError::WsClosed(Some(CloseFrame {
                code: WsCode::from(code),
                reason: Cow::Borrowed(""),
            }))
        };

        assert!(matches!(loss_action(&closed(4015)), CoreMessage::Reconnect));
        assert!(matches!(loss_action(&closed(4009)), CoreMessage::Reconnect));
        assert!(matches!(
            loss_action(&closed(4014)),
            CoreMessage::Terminated(CloseCode::Disconnected)
        ));
        assert!(matches!(loss_action(&closed(4006)), CoreMessage::FullReconnect));
        assert!(matches!(loss_action(&closed(1006)), CoreMessage::Reconnect));
        assert!(matches!(loss_action(&WsError::WsClosed(None)), CoreMessage::Reconnect));
    }
}
