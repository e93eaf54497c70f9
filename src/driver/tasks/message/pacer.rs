use super::{Interconnect, UdpTxMessage, WsMessage};
use crate::{
    driver::{Config, TransportStats},
    tracks::Track,
    Bitrate,
};
use flume::Sender;

/// Outbound halves of a live connection, as seen by the pacer.
#[derive(Clone, Debug)]
pub(crate) struct PacerConnection {
    pub udp_tx: Sender<UdpTxMessage>,
    pub ws: Sender<WsMessage>,
    pub stats: TransportStats,
}

#[allow(clippy::large_enum_variant)]
pub(crate) enum PacerMessage {
    SetConn(PacerConnection),
    DropConn,
    /// Start sending a new track. Only sent while the pacer is idle.
    Play(Track),
    /// End the current track early.
    Cut,
    Pause,
    Resume,
    Mute(bool),
    SetBitrate(Bitrate),
    SetConfig(Config),
    ReplaceInterconnect(Interconnect),

    Poison,
}
