use super::Interconnect;
use crate::ws::WsStream;

pub(crate) enum WsMessage {
    /// A freshly resumed socket, replacing the failed one.
    Ws(Box<WsStream>),
    ReplaceInterconnect(Interconnect),
    SetKeepalive(f64),
    Speaking(bool),

    Poison,
}
