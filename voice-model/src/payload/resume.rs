use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::GuildId;

/// Sent by the client after a disconnect to attempt to resume a session.
#[derive(Clone, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Resume {
    /// GuildId which the target voice channel belongs to.
    pub server_id: GuildId,
    /// Session being resumed.
    pub session_id: String,
    /// Token originally used to identify the session.
    pub token: String,
    /// Sequence number of the last sequenced message received before the disconnect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq_ack: Option<u64>,
}

impl fmt::Debug for Resume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resume")
            .field("server_id", &self.server_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .field("seq_ack", &self.seq_ack)
            .finish()
    }
}
