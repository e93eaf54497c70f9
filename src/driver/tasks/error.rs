use audiopus::Error as OpusError;

/// Background task a message could not be delivered to.
#[derive(Debug)]
#[non_exhaustive]
pub enum Recipient {
    Core,
    Event,
    Pacer,
    UdpRx,
    UdpTx,
    Ws,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while handling a single received packet.
///
/// None of these reach the application: the packet is logged and dropped.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Received an illegal voice packet on the voice UDP socket.
    IllegalVoicePacket,
    Opus(OpusError),
}

impl From<OpusError> for Error {
    fn from(e: OpusError) -> Error {
        Error::Opus(e)
    }
}
