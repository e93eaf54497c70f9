//! A scripted voice server: a websocket endpoint which walks clients through
//! Hello, Ready and SessionDescription, and a UDP socket which answers IP
//! discovery and records every RTP packet.
//!
//! A [`Script`] picks how the server misbehaves once the first session is up.

#![allow(dead_code)]

use chorus::{
    driver::packet::discovery_response,
    model::{
        payload::{HeartbeatAck, Hello, Ready, SessionDescription},
        CloseCode,
        Event,
    },
};
use flume::{Receiver, Sender};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_tungstenite::{
    tungstenite::{
        protocol::{frame::coding::CloseCode as WsCloseCode, CloseFrame},
        Message,
    },
    WebSocketStream,
};

pub const KEY: [u8; 32] = [0x5a; 32];
pub const SSRC: u32 = 0xC0FFEE;
pub const MODE: &str = "aead_aes256_gcm_rtpsize";

/// How the server treats sessions after the first handshake completes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Script {
    /// Every session is served until the client leaves.
    #[default]
    Steady,
    /// The first session is closed with 4015 once negotiated. Resumes succeed.
    DropThenResume,
    /// The first session is closed with 4015 once negotiated. Resumes are closed
    /// with 4006, so the client must identify again.
    DropThenRejectResume,
    /// The first session is closed with 4015 once negotiated, and every later
    /// connection is refused.
    DropThenRefuse,
    /// Every connection is refused.
    RefuseAll,
}

impl Script {
    fn drops_first_session(self) -> bool {
        matches!(
            self,
            Self::DropThenResume | Self::DropThenRejectResume | Self::DropThenRefuse
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    Identified { session_id: String },
    ResumeAttempted { session_id: String },
    Selected { mode: String },
    Speaking(bool),
    Closed { session_id: String },
    Rtp(Vec<u8>),
}

/// Routes the library's `tracing` output to the test harness, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counters shared by every session of one server.
#[derive(Default)]
struct Tally {
    /// Sessions identified or resumed, and not yet closed.
    open: AtomicUsize,
    /// Identify messages seen.
    identifies: AtomicUsize,
    /// Websocket connections accepted.
    accepted: AtomicUsize,
}

pub struct VoiceServer {
    pub endpoint: String,
    events: Receiver<ServerEvent>,
    backlog: Mutex<Vec<ServerEvent>>,
    tally: Arc<Tally>,
}

impl VoiceServer {
    pub async fn start() -> Self {
        Self::start_with(Script::Steady).await
    }

    pub async fn start_with(script: Script) -> Self {
        init_tracing();

        let tcp = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let udp = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let endpoint = format!("ws://{}", tcp.local_addr().unwrap());
        let udp_port = udp.local_addr().unwrap().port();

        let (tx, events) = flume::unbounded();
        let tally = Arc::new(Tally::default());

        tokio::spawn(serve_udp(udp, tx.clone()));
        tokio::spawn(serve_ws(tcp, udp_port, tx, tally.clone(), script));

        Self {
            endpoint,
            events,
            backlog: Mutex::new(vec![]),
            tally,
        }
    }

    /// Number of websocket sessions which have identified or resumed, and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.tally.open.load(Ordering::SeqCst)
    }

    /// Number of fresh handshakes begun, across all sessions.
    pub fn identifies(&self) -> usize {
        self.tally.identifies.load(Ordering::SeqCst)
    }

    /// Number of websocket connections attempted, refused or not.
    pub fn connections(&self) -> usize {
        self.tally.accepted.load(Ordering::SeqCst)
    }

    /// Waits for the oldest event matching `pred`.
    ///
    /// Events which do not match are kept for later calls.
    pub async fn expect(&self, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
        {
            let mut backlog = self.backlog.lock();
            if let Some(idx) = backlog.iter().position(&pred) {
                return backlog.remove(idx);
            }
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let evt = self.events.recv_async().await.unwrap();
                if pred(&evt) {
                    break evt;
                }
                self.backlog.lock().push(evt);
            }
        })
        .await
        .expect("voice server did not see the expected event")
    }

    pub async fn expect_closed(&self, session: &str) {
        self.expect(|e| matches!(e, ServerEvent::Closed { session_id } if session_id == session))
            .await;
    }

    pub async fn expect_identified(&self, session: &str) {
        self.expect(
            |e| matches!(e, ServerEvent::Identified { session_id } if session_id == session),
        )
        .await;
    }
}

async fn serve_udp(udp: UdpSocket, events: Sender<ServerEvent>) {
    let mut buf = [0u8; 1500];

    while let Ok((len, peer)) = udp.recv_from(&mut buf).await {
        match len {
            74 if buf[..2] == [0, 1] => {
                let SocketAddr::V4(peer) = peer else { continue };
                let resp = discovery_response(SSRC, (*peer.ip()).into(), peer.port());
                let _ = udp.send_to(&resp, peer).await;
            },
            // Keepalives.
            0..=8 => {},
            _ => {
                let _ = events.send(ServerEvent::Rtp(buf[..len].to_vec()));
            },
        }
    }
}

async fn serve_ws(
    listener: TcpListener,
    udp_port: u16,
    events: Sender<ServerEvent>,
    tally: Arc<Tally>,
    script: Script,
) {
    while let Ok((stream, _)) = listener.accept().await {
        let seen = tally.accepted.fetch_add(1, Ordering::SeqCst);

        let refuse = match script {
            Script::RefuseAll => true,
            Script::DropThenRefuse => seen > 0,
            _ => false,
        };
        if refuse {
            drop(stream);
            continue;
        }

        tokio::spawn(serve_session(
            stream,
            udp_port,
            events.clone(),
            tally.clone(),
            script,
        ));
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, event: impl Into<Event>) {
    let text = serde_json::to_string(&event.into()).unwrap();
    let _ = ws.send(Message::Text(text)).await;
}

async fn close_with(ws: &mut WebSocketStream<TcpStream>, code: CloseCode) {
    let _ = ws
        .close(Some(CloseFrame {
            code: WsCloseCode::from(u16::from(code)),
            reason: "".into(),
        }))
        .await;
}

async fn serve_session(
    stream: TcpStream,
    udp_port: u16,
    events: Sender<ServerEvent>,
    tally: Arc<Tally>,
    script: Script,
) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    send(&mut ws, Hello {
        heartbeat_interval: 30_000.0,
    })
    .await;

    let mut session: Option<String> = None;

    while let Some(Ok(msg)) = ws.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let Ok(event) = serde_json::from_str::<Event>(&text) else {
            continue;
        };

        match event {
            Event::Identify(id) => {
                tally.identifies.fetch_add(1, Ordering::SeqCst);
                tally.open.fetch_add(1, Ordering::SeqCst);
                session = Some(id.session_id.clone());
                let _ = events.send(ServerEvent::Identified {
                    session_id: id.session_id,
                });

                send(&mut ws, Ready {
                    ip: Ipv4Addr::LOCALHOST.into(),
                    modes: vec![MODE.into(), "xsalsa20_poly1305".into()],
                    port: udp_port,
                    ssrc: SSRC,
                })
                .await;
            },
            Event::SelectProtocol(select) => {
                let mode = select.data.mode.clone();
                let _ = events.send(ServerEvent::Selected { mode: mode.clone() });

                send(&mut ws, SessionDescription {
                    mode,
                    secret_key: KEY.to_vec(),
                })
                .await;

                if script.drops_first_session() && tally.identifies.load(Ordering::SeqCst) == 1 {
                    close_with(&mut ws, CloseCode::VoiceServerCrash).await;
                }
            },
            Event::Resume(resume) => {
                let _ = events.send(ServerEvent::ResumeAttempted {
                    session_id: resume.session_id.clone(),
                });

                if script == Script::DropThenRejectResume {
                    close_with(&mut ws, CloseCode::SessionInvalid).await;
                } else {
                    tally.open.fetch_add(1, Ordering::SeqCst);
                    session = Some(resume.session_id);
                    send(&mut ws, Event::Resumed).await;
                }
            },
            Event::Heartbeat(hb) => {
                send(&mut ws, HeartbeatAck { nonce: hb.nonce }).await;
            },
            Event::Speaking(s) => {
                let _ = events.send(ServerEvent::Speaking(s.speaking.microphone()));
            },
            _ => {},
        }
    }

    if let Some(session_id) = session {
        tally.open.fetch_sub(1, Ordering::SeqCst);
        let _ = events.send(ServerEvent::Closed { session_id });
    }
}
