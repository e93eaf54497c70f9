use serde::{Deserialize, Serialize};

use crate::protocol_data::ProtocolData;

/// Opcode 1: tells the server where to send media and which cipher to use.
///
/// Answered with a `SessionDescription` carrying the secret key.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct SelectProtocol {
    pub data: ProtocolData,
    /// Always `"udp"`; no other transport is offered.
    pub protocol: String,
}

impl SelectProtocol {
    /// Selects the UDP transport described by `data`.
    pub fn udp(data: ProtocolData) -> Self {
        Self {
            data,
            protocol: "udp".into(),
        }
    }
}
