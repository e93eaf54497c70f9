use crate::id::{ChannelId, GuildId, UserId};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

#[derive(Clone, Debug)]
pub(crate) enum ConnectionProgress {
    Complete(ConnectionInfo),
    Incomplete(Partial),
}

impl ConnectionProgress {
    pub(crate) fn new(guild_id: GuildId, user_id: UserId, channel_id: ChannelId) -> Self {
        ConnectionProgress::Incomplete(Partial {
            channel_id,
            guild_id,
            user_id,
            ..Default::default()
        })
    }

    pub(crate) fn channel_id(&self) -> ChannelId {
        match self {
            ConnectionProgress::Complete(c) => c.channel_id,
            ConnectionProgress::Incomplete(p) => p.channel_id,
        }
    }

    pub(crate) fn info(&self) -> Option<ConnectionInfo> {
        match self {
            ConnectionProgress::Complete(c) => Some(c.clone()),
            ConnectionProgress::Incomplete(_) => None,
        }
    }

    /// Returns `true` if this update completed the connection info, or changed a
    /// completed session in a way which needs a fresh connection.
    pub(crate) fn apply_state_update(&mut self, session_id: String, channel_id: ChannelId) -> bool {
        use ConnectionProgress::*;
        match self {
            Complete(c) => {
                let should_reconn = c.session_id != session_id || c.channel_id != channel_id;
                c.session_id = session_id;
                c.channel_id = channel_id;
                should_reconn
            },
            Incomplete(i) => i
                .apply_state_update(session_id, channel_id)
                .map(|info| {
                    *self = Complete(info);
                })
                .is_some(),
        }
    }

    /// Returns `true` under the same conditions as [`Self::apply_state_update`].
    pub(crate) fn apply_server_update(&mut self, endpoint: String, token: String) -> bool {
        use ConnectionProgress::*;
        match self {
            Complete(c) => {
                let should_reconn =
                    c.endpoint != endpoint || c.token.expose_secret().as_str() != token;

                c.endpoint = endpoint;
                c.token = SecretString::new(token);

                should_reconn
            },
            Incomplete(i) => i
                .apply_server_update(endpoint, token)
                .map(|info| {
                    *self = Complete(info);
                })
                .is_some(),
        }
    }
}

/// Parameters and information needed to start communicating with a voice server.
#[derive(Clone)]
pub struct ConnectionInfo {
    /// ID of the voice channel being joined, if it is known.
    pub channel_id: ChannelId,
    /// URL of the voice websocket gateway server assigned to this call.
    pub endpoint: String,
    /// ID of the target voice channel's parent guild.
    pub guild_id: GuildId,
    /// Unique string describing this session for validation/authentication purposes.
    pub session_id: String,
    /// Ephemeral secret used to validate the above session.
    pub token: SecretString,
    /// UserID of this client.
    pub user_id: UserId,
}

impl ConnectionInfo {
    pub fn new(
        guild_id: GuildId,
        channel_id: ChannelId,
        user_id: UserId,
        endpoint: impl Into<String>,
        session_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            channel_id,
            endpoint: endpoint.into(),
            guild_id,
            session_id: session_id.into(),
            token: SecretString::new(token.into()),
            user_id,
        }
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("channel_id", &self.channel_id)
            .field("endpoint", &self.endpoint)
            .field("guild_id", &self.guild_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[derive(Clone, Default)]
pub(crate) struct Partial {
    pub channel_id: ChannelId,
    pub endpoint: Option<String>,
    pub guild_id: GuildId,
    pub session_id: Option<String>,
    pub token: Option<String>,
    pub user_id: UserId,
}

impl fmt::Debug for Partial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partial")
            .field("channel_id", &self.channel_id)
            .field("endpoint", &self.endpoint)
            .field("session_id", &self.session_id)
            .field("token_is_some", &self.token.is_some())
            .finish()
    }
}

impl Partial {
    fn finalise(&mut self) -> Option<ConnectionInfo> {
        if self.endpoint.is_none() || self.session_id.is_none() || self.token.is_none() {
            return None;
        }

        let endpoint = self.endpoint.take()?;
        let session_id = self.session_id.take()?;
        let token = self.token.take()?;

        Some(ConnectionInfo {
            channel_id: self.channel_id,
            endpoint,
            guild_id: self.guild_id,
            session_id,
            token: SecretString::new(token),
            user_id: self.user_id,
        })
    }

    fn apply_state_update(
        &mut self,
        session_id: String,
        channel_id: ChannelId,
    ) -> Option<ConnectionInfo> {
        self.session_id = Some(session_id);
        self.channel_id = channel_id;

        self.finalise()
    }

    fn apply_server_update(&mut self, endpoint: String, token: String) -> Option<ConnectionInfo> {
        self.endpoint = Some(endpoint);
        self.token = Some(token);

        self.finalise()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_in_either_order() {
        let mut a = ConnectionProgress::new(GuildId(1), UserId(2), ChannelId(3));
        assert!(!a.apply_state_update("sess".into(), ChannelId(3)));
        assert!(a.apply_server_update("voice.example:443".into(), "tok".into()));
        assert!(a.info().is_some());

        let mut b = ConnectionProgress::new(GuildId(1), UserId(2), ChannelId(3));
        assert!(!b.apply_server_update("voice.example:443".into(), "tok".into()));
        assert!(b.apply_state_update("sess".into(), ChannelId(3)));

        let info = b.info().unwrap();
        assert_eq!(info.session_id, "sess");
        assert_eq!(info.token.expose_secret(), "tok");
    }

    #[test]
    fn unchanged_update_does_not_reconnect() {
        let mut p = ConnectionProgress::new(GuildId(1), UserId(2), ChannelId(3));
        p.apply_state_update("sess".into(), ChannelId(3));
        p.apply_server_update("voice.example".into(), "tok".into());

        assert!(!p.apply_server_update("voice.example".into(), "tok".into()));
        assert!(p.apply_server_update("voice2.example".into(), "tok".into()));
    }

    #[test]
    fn debug_hides_token() {
        let info = ConnectionInfo::new(
            GuildId(1),
            ChannelId(2),
            UserId(3),
            "voice.example",
            "sess",
            "very-secret",
        );

        assert!(!format!("{info:?}").contains("very-secret"));
    }
}
