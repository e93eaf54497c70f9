pub mod error;

use super::{
    crypto::{Cipher, CryptoMode, KEY_SIZE},
    gateway::{GatewayState, GatewayTransition},
    packet::{discovery_request, parse_discovery_response},
    stats::TransportStats,
    tasks::{error::Recipient, message::*, udp_rx, udp_tx, ws as ws_task},
};
use crate::{
    constants::*,
    model::{
        payload::{Hello, Identify, Ready, Resume, SelectProtocol},
        Event as GatewayEvent,
        ProtocolData,
    },
    ws::{self, Inbound, ReceiverExt, SenderExt, WsStream},
    Config,
    ConnectionInfo,
};
use error::{Error, Result};
use flume::Sender;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, Secret};
use std::{fmt, future::Future, net::SocketAddr, sync::Arc};
use tokio::{net::UdpSocket, time::timeout};
use tracing::{debug, info, instrument};
use url::Url;

/// Negotiated media transport for one full handshake.
///
/// A resume keeps the existing value.
pub(crate) struct TransportParameters {
    pub mode: CryptoMode,
    pub key: Secret<[u8; KEY_SIZE]>,
    pub addr: SocketAddr,
    pub ssrc: u32,
}

impl TransportParameters {
    pub(crate) fn cipher(&self) -> Result<Cipher> {
        Ok(Cipher::new(self.mode, self.key.expose_secret())?)
    }
}

impl fmt::Debug for TransportParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportParameters")
            .field("mode", &self.mode)
            .field("key", &"<secret>")
            .field("addr", &self.addr)
            .field("ssrc", &self.ssrc)
            .finish()
    }
}

/// A live voice session: one websocket task and one pair of UDP tasks.
///
/// Dropping a connection poisons all three tasks.
pub(crate) struct Connection {
    pub(crate) info: ConnectionInfo,
    pub(crate) ssrc: u32,
    pub(crate) mode: CryptoMode,
    pub(crate) ws: Sender<WsMessage>,
    udp_rx: Sender<UdpRxMessage>,
    udp_tx: Sender<UdpTxMessage>,
    last_seq: Arc<Mutex<Option<u64>>>,
}

impl Connection {
    /// Performs a full handshake with the voice server, bounded by
    /// [`Config::gateway_timeout`].
    pub(crate) async fn new(
        info: ConnectionInfo,
        interconnect: &Interconnect,
        config: &Config,
        stats: &TransportStats,
    ) -> Result<Connection> {
        bounded(config, Self::new_inner(info, interconnect, config, stats)).await
    }

    #[instrument(skip(info, interconnect, config, stats), fields(endpoint = %info.endpoint))]
    async fn new_inner(
        mut info: ConnectionInfo,
        interconnect: &Interconnect,
        config: &Config,
        stats: &TransportStats,
    ) -> Result<Connection> {
        let url = generate_url(&mut info.endpoint)?;
        let last_seq = Arc::new(Mutex::new(None));

        let mut state = transition(GatewayState::Disconnected, GatewayTransition::Open)?;
        let mut client = ws::create_client(url).await?;

        let hello = loop {
            match recv(&mut client, &last_seq).await? {
                GatewayEvent::Hello(h) => break h,
                other => {
                    debug!("Expected hello; got: {:?}", other);

                    return Err(Error::ExpectedHandshake);
                },
            }
        };

        client
            .send_json(&GatewayEvent::from(Identify {
                server_id: info.guild_id.into(),
                session_id: info.session_id.clone(),
                token: info.token.expose_secret().clone(),
                user_id: info.user_id.into(),
            }))
            .await?;
        state = transition(state, GatewayTransition::Identify)?;

        let ready = loop {
            match recv(&mut client, &last_seq).await? {
                GatewayEvent::Ready(r) => break r,
                GatewayEvent::HeartbeatAck(_) => {},
                other => {
                    debug!("Expected ready; got: {:?}", other);

                    return Err(Error::ExpectedHandshake);
                },
            }
        };
        state = transition(state, GatewayTransition::Ready)?;

        let mode = CryptoMode::negotiate(&config.crypto_preference, &ready.modes)
            .ok_or(Error::CryptoModeUnavailable)?;

        let udp = UdpSocket::bind("0.0.0.0:0").await?;
        udp.connect((ready.ip, ready.port)).await?;

        let (address, port) = ip_discovery(&udp, &ready).await?;

        client
            .send_json(&GatewayEvent::from(SelectProtocol::udp(ProtocolData {
                address,
                mode: mode.to_request_str().into(),
                port,
            })))
            .await?;

        let key = init_key(&mut client, mode, &last_seq).await?;
        state = transition(state, GatewayTransition::SessionDescription)?;

        let params = TransportParameters {
            mode,
            key,
            addr: SocketAddr::from((ready.ip, ready.port)),
            ssrc: ready.ssrc,
        };
        let cipher = params.cipher()?;

        info!("Connected to: {}", info.endpoint);
        info!("WS heartbeat duration {}ms.", hello.heartbeat_interval);
        debug!(?params, ?state, "Transport negotiated.");

        let (ws_msg_tx, ws_msg_rx) = flume::unbounded();
        let (udp_sender_msg_tx, udp_sender_msg_rx) = flume::bounded(config.udp_channel_capacity);
        let (udp_receiver_msg_tx, udp_receiver_msg_rx) = flume::unbounded();
        let udp = Arc::new(udp);

        interconnect.pacer.send(PacerMessage::SetConn(PacerConnection {
            udp_tx: udp_sender_msg_tx.clone(),
            ws: ws_msg_tx.clone(),
            stats: stats.clone(),
        }))?;

        let ssrc = params.ssrc;

        tokio::spawn(ws_task::runner(ws_task::WsTask::new(
            interconnect.clone(),
            ws_msg_rx,
            udp_receiver_msg_tx.clone(),
            client,
            ssrc,
            hello.heartbeat_interval,
            config,
            last_seq.clone(),
        )));

        tokio::spawn(udp_rx::runner(
            interconnect.clone(),
            udp_receiver_msg_rx,
            cipher.clone(),
            mode,
            config.clone(),
            udp.clone(),
            stats.clone(),
        ));

        tokio::spawn(udp_tx::runner(
            interconnect.clone(),
            udp_sender_msg_rx,
            params,
            cipher,
            udp,
            stats.clone(),
        ));

        Ok(Connection {
            info,
            ssrc,
            mode,
            ws: ws_msg_tx,
            udp_rx: udp_receiver_msg_tx,
            udp_tx: udp_sender_msg_tx,
            last_seq,
        })
    }

    /// Resumes the session over a fresh websocket, keeping the UDP transport.
    pub(crate) async fn reconnect(&mut self, config: &Config) -> Result<()> {
        bounded(config, self.reconnect_inner()).await
    }

    #[instrument(skip(self))]
    async fn reconnect_inner(&mut self) -> Result<()> {
        // A resume only replaces the control channel.
        if self.udp_tx.is_disconnected() {
            return Err(Error::InterconnectFailure(Recipient::UdpTx));
        }

        let url = generate_url(&mut self.info.endpoint)?;

        let mut state = transition(GatewayState::Closed, GatewayTransition::Resume)?;
        let mut client = ws::create_client(url).await?;

        let seq_ack = *self.last_seq.lock();

        client
            .send_json(&GatewayEvent::from(Resume {
                server_id: self.info.guild_id.into(),
                session_id: self.info.session_id.clone(),
                token: self.info.token.expose_secret().clone(),
                seq_ack,
            }))
            .await?;

        let mut hello: Option<Hello> = None;
        let mut resumed = false;

        while hello.is_none() || !resumed {
            match recv(&mut client, &self.last_seq).await? {
                GatewayEvent::Resumed => resumed = true,
                GatewayEvent::Hello(h) => hello = Some(h),
                other => {
                    debug!("Expected resumed/hello; got: {:?}", other);

                    return Err(Error::ExpectedHandshake);
                },
            }
        }
        state = transition(state, GatewayTransition::Resumed)?;

        if let Some(hello) = hello {
            self.ws
                .send(WsMessage::SetKeepalive(hello.heartbeat_interval))?;
        }
        self.ws.send(WsMessage::Ws(Box::new(client)))?;

        info!(?state, "Reconnected to: {}", &self.info.endpoint);
        Ok(())
    }

    /// Points every task of this connection at a replacement set of channels.
    pub(crate) fn update_interconnect(&self, interconnect: &Interconnect) {
        let _ = self
            .ws
            .send(WsMessage::ReplaceInterconnect(interconnect.clone()));
        let _ = self
            .udp_rx
            .send(UdpRxMessage::ReplaceInterconnect(interconnect.clone()));
        let _ = self
            .udp_tx
            .try_send(UdpTxMessage::ReplaceInterconnect(interconnect.clone()));
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.ws.send(WsMessage::Poison);
        let _ = self.udp_rx.send(UdpRxMessage::Poison);
        // A full channel means the transmit task is alive but busy; the closed
        // socket stops it once the other tasks exit.
        let _ = self.udp_tx.try_send(UdpTxMessage::Poison);

        info!("Disconnected");
    }
}

async fn bounded<T>(config: &Config, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match config.gateway_timeout {
        Some(t) => timeout(t, fut).await.map_err(|_| Error::TimedOut)?,
        None => fut.await,
    }
}

fn transition(state: GatewayState, step: GatewayTransition) -> Result<GatewayState> {
    state.transition(step).map_err(|e| {
        debug!("{e}");
        Error::ExpectedHandshake
    })
}

/// Receives the next event, recording its sequence number.
async fn recv(client: &mut WsStream, last_seq: &Mutex<Option<u64>>) -> Result<GatewayEvent> {
    loop {
        if let Some(Inbound { event, seq }) = client.recv_json().await? {
            if seq.is_some() {
                *last_seq.lock() = seq;
            }

            return Ok(event);
        }
    }
}

/// Follows the voice server's IP discovery procedure, in case NAT tunnelling is needed.
async fn ip_discovery(udp: &UdpSocket, ready: &Ready) -> Result<(std::net::IpAddr, u16)> {
    let mut bytes = discovery_request(ready.ssrc);

    udp.send(&bytes).await?;

    let len = udp.recv(&mut bytes).await?;

    Ok(parse_discovery_response(&bytes[..len])?)
}

pub(crate) fn generate_url(endpoint: &mut String) -> Result<Url> {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        return Url::parse(endpoint).or(Err(Error::EndpointUrl));
    }

    if endpoint.ends_with(":80") {
        let len = endpoint.len();

        endpoint.truncate(len - 3);
    }

    Url::parse(&format!("wss://{}/?v={}", endpoint, VOICE_GATEWAY_VERSION))
        .or(Err(Error::EndpointUrl))
}

#[inline]
async fn init_key(
    client: &mut WsStream,
    mode: CryptoMode,
    last_seq: &Mutex<Option<u64>>,
) -> Result<Secret<[u8; KEY_SIZE]>> {
    loop {
        match recv(client, last_seq).await? {
            GatewayEvent::SessionDescription(desc) => {
                if desc.mode != mode.to_request_str() {
                    return Err(Error::CryptoModeInvalid);
                }

                let len = desc.secret_key.len();
                let key: [u8; KEY_SIZE] = desc
                    .secret_key
                    .try_into()
                    .map_err(|_| Error::Crypto(super::crypto::InvalidKeyLength(len)))?;

                return Ok(Secret::new(key));
            },
            other => {
                debug!("Expected ready for key; got: op{}/v{:?}", other.op(), other);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_endpoints_get_scheme_and_version() {
        let mut endpoint = String::from("voice.example.com:80");
        let url = generate_url(&mut endpoint).unwrap();

        assert_eq!(endpoint, "voice.example.com");
        assert_eq!(url.as_str(), "wss://voice.example.com/?v=8");
    }

    #[test]
    fn explicit_schemes_are_kept() {
        let mut endpoint = String::from("ws://127.0.0.1:4567/voice");
        let url = generate_url(&mut endpoint).unwrap();

        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.port(), Some(4567));
    }

    #[test]
    fn transport_parameters_hide_key() {
        let params = TransportParameters {
            mode: CryptoMode::Aes256Gcm,
            key: Secret::new([0xAB; KEY_SIZE]),
            addr: "127.0.0.1:5000".parse().unwrap(),
            ssrc: 9,
        };

        let dbg = format!("{params:?}");
        assert!(dbg.contains("<secret>"));
        assert!(!dbg.contains("171"));
        assert!(params.cipher().is_ok());
    }
}
