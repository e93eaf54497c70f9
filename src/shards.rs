//! Handlers for sending voice state updates through the host's own gateway connection.

use crate::{
    error::{JoinError, JoinResult},
    id::{ChannelId, GuildId},
};
use async_trait::async_trait;
use flume::Sender;
use serde_json::{json, Value};
use std::{fmt, sync::Arc};
use tracing::debug;

/// Trait for host gateway implementations able to update the client's voice state.
///
/// The host is then expected to feed the resulting voice state and voice server
/// updates back via [`Manager::process_state_update`] and
/// [`Manager::process_server_update`].
///
/// [`Manager::process_state_update`]: crate::Manager::process_state_update
/// [`Manager::process_server_update`]: crate::Manager::process_server_update
#[async_trait]
pub trait VoiceUpdate {
    /// Send a voice update message to the inner shard handle.
    async fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        self_deaf: bool,
        self_mute: bool,
    ) -> JoinResult<()>;
}

/// A destination for voice state updates.
#[derive(Clone)]
#[non_exhaustive]
pub enum Shard {
    /// A channel which accepts raw gateway payloads (opcode 4 voice state updates).
    Json(Sender<Value>),
    /// Handle to any host implementing [`VoiceUpdate`].
    Generic(Arc<dyn VoiceUpdate + Send + Sync>),
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shard::Json(_) => f.write_str("Shard::Json"),
            Shard::Generic(_) => f.write_str("Shard::Generic"),
        }
    }
}

#[async_trait]
impl VoiceUpdate for Shard {
    async fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        self_deaf: bool,
        self_mute: bool,
    ) -> JoinResult<()> {
        debug!(%guild_id, ?channel_id, self_deaf, self_mute, "Sending voice state update.");

        match self {
            Shard::Json(tx) => {
                let map = json!({
                    "op": 4,
                    "d": {
                        "channel_id": channel_id.map(|c| c.0.to_string()),
                        "guild_id": guild_id.0.to_string(),
                        "self_deaf": self_deaf,
                        "self_mute": self_mute,
                    }
                });

                tx.send_async(map).await.map_err(|_| JoinError::NoSender)
            },
            Shard::Generic(g) =>
                g.update_voice_state(guild_id, channel_id, self_deaf, self_mute).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn json_shard_emits_voice_state_update() {
        let (tx, rx) = flume::unbounded();
        let shard = Shard::Json(tx);

        shard
            .update_voice_state(GuildId(10), Some(ChannelId(20)), false, true)
            .await
            .unwrap();

        let msg = rx.recv_async().await.unwrap();
        assert_eq!(msg["op"], 4);
        assert_eq!(msg["d"]["guild_id"], "10");
        assert_eq!(msg["d"]["channel_id"], "20");
        assert_eq!(msg["d"]["self_mute"], true);
    }

    #[tokio::test]
    async fn json_shard_without_receiver_fails() {
        let (tx, rx) = flume::unbounded::<Value>();
        drop(rx);

        let shard = Shard::Json(tx);
        let res = shard.update_voice_state(GuildId(1), None, false, false).await;

        assert!(matches!(res, Err(JoinError::NoSender)));
    }
}
