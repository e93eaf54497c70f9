use super::Interconnect;

pub(crate) enum UdpRxMessage {
    ReplaceInterconnect(Interconnect),
    /// A remote user left; forget decoder state for their SSRC.
    ClientDisconnect(u32),

    Poison,
}
