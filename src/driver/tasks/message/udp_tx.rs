use super::Interconnect;
use crate::input::Frame;

pub(crate) enum UdpTxMessage {
    Packet(Frame),
    ReplaceInterconnect(Interconnect),

    Poison,
}
