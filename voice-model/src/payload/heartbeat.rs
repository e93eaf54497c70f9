use serde::{Deserialize, Serialize};

/// Periodic keepalive sent by the client.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Heartbeat {
    /// Nonce echoed back by the server in its [`HeartbeatAck`].
    ///
    /// [`HeartbeatAck`]: super::HeartbeatAck
    #[serde(rename = "t")]
    pub nonce: u64,
    /// Sequence number of the last sequenced message received from the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq_ack: Option<u64>,
}
