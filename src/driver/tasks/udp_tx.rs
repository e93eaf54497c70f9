use super::message::*;
use crate::{
    constants::*,
    driver::{
        connection::TransportParameters,
        crypto::{encrypt_packet, Cipher, CryptoState},
        packet::{keepalive, PacketSequence},
        stats::TransportStats,
    },
};
use flume::Receiver;
use std::{io::ErrorKind, sync::Arc};
use tokio::{
    net::UdpSocket,
    time::{timeout_at, Instant},
};
use tracing::{error, info, instrument, trace, warn};

struct UdpTx {
    cipher: Cipher,
    crypto: CryptoState,
    sequence: PacketSequence,
    socket: Arc<UdpSocket>,
    stats: TransportStats,
    rx: Receiver<UdpTxMessage>,
}

impl UdpTx {
    async fn run(&mut self, interconnect: &mut Interconnect) {
        let keepalive_bytes = keepalive(self.sequence.ssrc());
        let mut ka_time = Instant::now() + UDP_KEEPALIVE_GAP;

        loop {
            use UdpTxMessage::*;
            match timeout_at(ka_time, self.rx.recv_async()).await {
                Err(_) => {
                    trace!("Sending UDP keepalive.");
                    if let Err(e) = self.socket.send(&keepalive_bytes[..]).await {
                        error!("Fatal UDP keepalive send error: {:?}.", e);
                        let _ = interconnect.core.send(CoreMessage::Reconnect);
                        break;
                    }
                    ka_time += UDP_KEEPALIVE_GAP;
                },
                Ok(Ok(Packet(frame))) =>
                    if !self.send_frame(&frame.payload) {
                        let _ = interconnect.core.send(CoreMessage::Reconnect);
                        break;
                    },
                Ok(Ok(ReplaceInterconnect(i))) => *interconnect = i,
                Ok(Err(_)) | Ok(Ok(Poison)) => break,
            }
        }
    }

    /// Returns `false` if the socket can no longer be written to.
    fn send_frame(&mut self, payload: &[u8]) -> bool {
        let header = self.sequence.next_header().to_bytes();

        let packet = match encrypt_packet(&self.cipher, &mut self.crypto, &header, payload) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to encrypt outbound frame: {}.", e);
                self.stats.dropped();
                return true;
            },
        };

        match self.socket.try_send(&packet) {
            Ok(_) => {
                self.stats.sent();
                true
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                trace!("UDP send buffer full, dropping frame.");
                self.stats.dropped();
                true
            },
            Err(e) => {
                error!("Fatal UDP packet send error: {:?}.", e);
                false
            },
        }
    }
}

#[instrument(skip(interconnect, rx, params, cipher, socket, stats))]
pub(crate) async fn runner(
    mut interconnect: Interconnect,
    rx: Receiver<UdpTxMessage>,
    params: TransportParameters,
    cipher: Cipher,
    socket: Arc<UdpSocket>,
    stats: TransportStats,
) {
    info!("UDP transmit handle started.");

    let mut state = UdpTx {
        cipher,
        crypto: CryptoState::from(params.mode),
        sequence: PacketSequence::new(params.ssrc),
        socket,
        stats,
        rx,
    };

    state.run(&mut interconnect).await;

    info!("UDP transmit handle stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{
        crypto::{decrypt_packet, CryptoMode, KEY_SIZE},
        packet::{rtp_header_len, rtp_valid},
    };
    use crate::input::Frame;
    use bytes::Bytes;
    use discortp::rtp::RtpPacket;
    use secrecy::Secret;
    use std::time::Duration;

    async fn socket_pair() -> (Arc<UdpSocket>, UdpSocket) {
        let local = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let remote = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        local.connect(remote.local_addr().unwrap()).await.unwrap();
        (Arc::new(local), remote)
    }

    fn interconnect() -> (Interconnect, Receiver<CoreMessage>) {
        let (core, core_rx) = flume::unbounded();
        let (events, _) = flume::unbounded();
        let (pacer, _) = flume::unbounded();
        (Interconnect { core, events, pacer }, core_rx)
    }

    #[tokio::test]
    async fn frames_are_sealed_in_sequence() {
        let (local, remote) = socket_pair().await;
        let key = [7u8; KEY_SIZE];
        let mode = CryptoMode::Aes256Gcm;
        let params = TransportParameters {
            mode,
            key: Secret::new(key),
            addr: remote.local_addr().unwrap(),
            ssrc: 0xfeed,
        };
        let cipher = params.cipher().unwrap();
        let stats = TransportStats::default();
        let (ic, _core_rx) = interconnect();
        let (tx, rx) = flume::bounded(8);

        let handle = tokio::spawn(runner(ic, rx, params, cipher.clone(), local, stats.clone()));

        tx.send_async(UdpTxMessage::Packet(Frame::audio(Bytes::from_static(b"first"))))
            .await
            .unwrap();
        tx.send_async(UdpTxMessage::Packet(Frame::audio(Bytes::from_static(b"second"))))
            .await
            .unwrap();

        let mut buf = [0u8; VOICE_PACKET_MAX];
        let mut seen = vec![];
        for _ in 0..2 {
            let len = tokio::time::timeout(Duration::from_secs(1), remote.recv(&mut buf))
                .await
                .unwrap()
                .unwrap();
            let view = RtpPacket::new(&buf[..len]).unwrap();
            assert_eq!(view.get_ssrc(), 0xfeed);
            assert!(rtp_valid(&view));
            let header_len = rtp_header_len(&view).unwrap();
            let plain = decrypt_packet(&cipher, mode, &buf[..len], header_len).unwrap();
            seen.push((
                u16::from(view.get_sequence()),
                u32::from(view.get_timestamp()),
                plain,
            ));
        }

        assert_eq!(seen[1].0, seen[0].0.wrapping_add(1));
        assert_eq!(seen[1].1, seen[0].1.wrapping_add(MONO_FRAME_SIZE as u32));
        assert_eq!(seen[0].2, b"first");
        assert_eq!(seen[1].2, b"second");

        tx.send_async(UdpTxMessage::Poison).await.unwrap();
        handle.await.unwrap();
        assert_eq!(stats.packets_sent(), 2);
        assert_eq!(stats.packets_dropped(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_socket_sends_keepalives() {
        let (local, remote) = socket_pair().await;
        let params = TransportParameters {
            mode: CryptoMode::Lite,
            key: Secret::new([1u8; KEY_SIZE]),
            addr: remote.local_addr().unwrap(),
            ssrc: 42,
        };
        let cipher = params.cipher().unwrap();
        let (ic, _core_rx) = interconnect();
        let (tx, rx) = flume::bounded(8);

        let handle = tokio::spawn(runner(ic, rx, params, cipher, local, TransportStats::default()));

        let mut buf = [0u8; 16];
        let len = remote.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &keepalive(42)[..]);

        tx.send_async(UdpTxMessage::Poison).await.unwrap();
        handle.await.unwrap();
    }
}
