use super::{
    error::{Error, Result},
    message::*,
};
use crate::{
    constants::*,
    driver::{
        crypto::{decrypt_packet, Cipher, CryptoMode},
        packet::{rtp_header_len, rtp_valid},
        stats::TransportStats,
    },
    events::{CoreContext, InternalVoicePacket},
    Config,
};
use audiopus::{coder::Decoder as OpusDecoder, Channels};
use byteorder::{ByteOrder, NetworkEndian};
use discortp::{
    demux::{demux, Demuxed},
    rtp::{RtpExtensionPacket, RtpPacket},
    PacketSize,
};
use flume::Receiver;
use std::{collections::HashMap, sync::Arc};
use tokio::net::UdpSocket;
use tracing::{error, info, instrument, trace, warn};

/// Widest reorder window representable by [`ReorderWindow`].
const MAX_REORDER_WINDOW: u16 = 64;

/// Outcome of admitting a sequence number into a [`ReorderWindow`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Admission {
    /// Newest packet so far; `missed` sequence numbers were skipped over.
    InOrder { missed: u16 },
    /// An older, previously unseen packet within the window.
    Late,
    /// Duplicate, or too old to be of use.
    Stale,
}

/// Sliding record of which recent sequence numbers have been seen.
///
/// Bit `i` of `seen` marks `newest - i`.
#[derive(Clone, Debug)]
struct ReorderWindow {
    newest: u16,
    seen: u64,
    size: u16,
}

impl ReorderWindow {
    fn new(first: u16, size: u16) -> Self {
        Self {
            newest: first,
            seen: 1,
            size: size.clamp(1, MAX_REORDER_WINDOW),
        }
    }

    fn admit(&mut self, seq: u16) -> Admission {
        let ahead = seq.wrapping_sub(self.newest);

        if ahead == 0 {
            Admission::Stale
        } else if ahead < (1 << 15) {
            self.seen = if u32::from(ahead) >= u64::BITS {
                0
            } else {
                self.seen << ahead
            };
            self.seen |= 1;
            self.newest = seq;

            Admission::InOrder { missed: ahead - 1 }
        } else {
            let behind = self.newest.wrapping_sub(seq);
            let bit = 1u64 << behind.min(MAX_REORDER_WINDOW - 1);

            if behind >= self.size || self.seen & bit != 0 {
                Admission::Stale
            } else {
                self.seen |= bit;
                Admission::Late
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum SpeakingDelta {
    Same,
    Start,
    Stop,
}

struct SsrcState {
    silent_frame_count: u16,
    decoder: OpusDecoder,
    window: ReorderWindow,
}

impl SsrcState {
    fn new(seq: u16, window: u16) -> Result<Self> {
        Ok(Self {
            // Makes the first speech packet fire an event.
            silent_frame_count: 5,
            decoder: OpusDecoder::new(SAMPLE_RATE, Channels::Stereo)?,
            window: ReorderWindow::new(seq, window),
        })
    }

    /// Decodes an in-order packet, concealing any skipped frames first.
    ///
    /// Late packets are passed through without audio, as the decoder has moved past
    /// them.
    fn process(&mut self, admission: Admission, opus: &[u8]) -> Result<(SpeakingDelta, Option<Vec<i16>>)> {
        let missed = match admission {
            Admission::InOrder { missed } => missed,
            _ => return Ok((SpeakingDelta::Same, None)),
        };

        let mut out = vec![0; STEREO_FRAME_SIZE];

        for _ in 0..missed.min(MAX_REORDER_WINDOW) {
            let missing_frame: Option<&[u8]> = None;
            if let Err(e) = self.decoder.decode(missing_frame, &mut out[..], false) {
                warn!("Issue while decoding for missed packet: {:?}.", e);
            }
        }

        let audio_len = self
            .decoder
            .decode(Some(opus), &mut out[..], false)
            .map_err(|e| {
                error!("Failed to decode received packet: {:?}.", e);
                e
            })?;

        // Sample count is per channel.
        out.truncate(2 * audio_len);

        let delta = if opus.len() == SILENT_FRAME.len() {
            let old = self.silent_frame_count;
            self.silent_frame_count = self.silent_frame_count.saturating_add(1 + missed);

            if self.silent_frame_count >= 5 && old < 5 {
                SpeakingDelta::Stop
            } else {
                SpeakingDelta::Same
            }
        } else {
            let out = if self.silent_frame_count >= 5 {
                SpeakingDelta::Start
            } else {
                SpeakingDelta::Same
            };
            self.silent_frame_count = 0;
            out
        };

        Ok((delta, Some(out)))
    }
}

struct UdpRx {
    cipher: Cipher,
    decoder_map: HashMap<u32, SsrcState>,
    mode: CryptoMode,
    packet_buffer: [u8; VOICE_PACKET_MAX],
    reorder_window: u16,
    rx: Receiver<UdpRxMessage>,
    socket: Arc<UdpSocket>,
    stats: TransportStats,
}

impl UdpRx {
    #[instrument(skip(self, interconnect))]
    async fn run(&mut self, interconnect: &mut Interconnect) {
        loop {
            tokio::select! {
                res = self.socket.recv(&mut self.packet_buffer[..]) => match res {
                    Ok(len) => self.process_udp_message(interconnect, len),
                    Err(e) => {
                        error!("Fatal UDP receive error: {:?}.", e);
                        let _ = interconnect.core.send(CoreMessage::Reconnect);
                        break;
                    },
                },
                msg = self.rx.recv_async() => {
                    use UdpRxMessage::*;
                    match msg {
                        Ok(ReplaceInterconnect(i)) => {
                            *interconnect = i;
                        },
                        Ok(ClientDisconnect(ssrc)) => {
                            if self.decoder_map.remove(&ssrc).is_some() {
                                trace!("Dropped decoder state for SSRC {}.", ssrc);
                            }
                        },
                        Ok(Poison) | Err(_) => break,
                    }
                },
            }
        }
    }

    fn process_udp_message(&mut self, interconnect: &Interconnect, len: usize) {
        // Errors here are never fatal to the connection: received packets are
        // adversarial, and a bad one is simply dropped.
        let is_rtp = match demux(&self.packet_buffer[..len]) {
            Demuxed::Rtp(_) => true,
            Demuxed::Rtcp(_) => {
                trace!("Ignoring RTCP packet.");
                false
            },
            Demuxed::FailedParse(t) => {
                trace!("Failed to parse message of type {:?}.", t);
                false
            },
            _ => {
                trace!("Ignoring non-RTP datagram of {} bytes.", len);
                false
            },
        };

        if is_rtp {
            if let Err(e) = self.process_rtp(interconnect, len) {
                trace!("Dropped RTP packet: {:?}.", e);
            }
        }
    }

    fn process_rtp(&mut self, interconnect: &Interconnect, len: usize) -> Result<()> {
        let packet = &self.packet_buffer[..len];
        let rtp = RtpPacket::new(packet).ok_or(Error::IllegalVoicePacket)?;

        if !rtp_valid(&rtp) {
            warn!("Illegal RTP message received.");
            return Err(Error::IllegalVoicePacket);
        }

        let clear_len = rtp_header_len(&rtp).ok_or(Error::IllegalVoicePacket)?;
        let has_extension = rtp.get_extension() != 0;
        let ext_in_clear = has_extension && self.mode.is_aead();
        let ssrc = rtp.get_ssrc();

        // The `rtpsize` modes leave the extension preamble in the clear, as part of
        // the associated data.
        let header_len = if ext_in_clear { clear_len + 4 } else { clear_len };

        let plain = match decrypt_packet(&self.cipher, self.mode, packet, header_len) {
            Ok(p) => p,
            Err(e) => {
                self.stats.auth_failed();
                warn!("RTP authentication failed for SSRC {}.", ssrc);
                return Err(e.into());
            },
        };

        let start = if ext_in_clear {
            let words = packet
                .get(clear_len + 2..clear_len + 4)
                .map(NetworkEndian::read_u16)
                .ok_or(Error::IllegalVoicePacket)?;
            4 * words as usize
        } else if has_extension {
            RtpExtensionPacket::new(&plain)
                .map(|pkt| pkt.packet_size())
                .ok_or_else(|| {
                    error!("Extension packet indicated, but insufficient space.");
                    Error::IllegalVoicePacket
                })?
        } else {
            0
        };

        let opus = plain.get(start..).ok_or(Error::IllegalVoicePacket)?;
        let sequence: u16 = rtp.get_sequence().into();
        let timestamp: u32 = rtp.get_timestamp().into();

        let (entry, admission) = match self.decoder_map.entry(ssrc) {
            std::collections::hash_map::Entry::Occupied(e) => {
                let entry = e.into_mut();
                let admission = entry.window.admit(sequence);
                (entry, admission)
            },
            std::collections::hash_map::Entry::Vacant(e) => (
                e.insert(SsrcState::new(sequence, self.reorder_window)?),
                Admission::InOrder { missed: 0 },
            ),
        };

        if admission == Admission::Stale {
            self.stats.stale();
            trace!("Stale packet {} from SSRC {}.", sequence, ssrc);
            return Ok(());
        }

        self.stats.received();

        let (delta, audio) = entry.process(admission, opus)?;

        match delta {
            SpeakingDelta::Start | SpeakingDelta::Stop => {
                let _ = interconnect.events.send(EventMessage::FireCoreEvent(
                    CoreContext::SpeakingUpdate {
                        ssrc,
                        speaking: delta == SpeakingDelta::Start,
                    },
                ));
            },
            SpeakingDelta::Same => {},
        }

        let _ = interconnect.events.send(EventMessage::FireCoreEvent(
            CoreContext::VoicePacket(InternalVoicePacket {
                ssrc,
                sequence,
                timestamp,
                payload: opus.to_vec(),
                audio,
            }),
        ));

        Ok(())
    }
}

#[instrument(skip(interconnect, rx, cipher, config, socket, stats))]
pub(crate) async fn runner(
    mut interconnect: Interconnect,
    rx: Receiver<UdpRxMessage>,
    cipher: Cipher,
    mode: CryptoMode,
    config: Config,
    socket: Arc<UdpSocket>,
    stats: TransportStats,
) {
    info!("UDP receive handle started.");

    let mut state = UdpRx {
        cipher,
        decoder_map: Default::default(),
        mode,
        packet_buffer: [0u8; VOICE_PACKET_MAX],
        reorder_window: config.reorder_window,
        rx,
        socket,
        stats,
    };

    state.run(&mut interconnect).await;

    info!("UDP receive handle stopped.");
}
