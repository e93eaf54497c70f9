use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::*;

/// Used to begin a voice websocket connection.
#[derive(Clone, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Identify {
    /// GuildId which the target voice channel belongs to.
    pub server_id: GuildId,
    /// UserId of the client who is connecting.
    pub user_id: UserId,
    /// Authentication session issued to the client alongside its voice state.
    pub session_id: String,
    /// Authentication token issued to the client alongside the voice server's endpoint.
    pub token: String,
}

impl fmt::Debug for Identify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identify")
            .field("server_id", &self.server_id)
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .finish()
    }
}
