use crate::{
    driver::Config,
    error::{JoinError, JoinResult},
    handler::Call,
    id::{ChannelId, GuildId, UserId},
    shards::Shard,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// The manager is responsible for the creation and storage of [`Call`]s,
/// one per guild, and for routing the host's voice state and voice server
/// updates to them.
///
/// Each call sits behind its own async mutex, so concurrent `join` and
/// `leave` requests for one guild are applied one at a time, while separate
/// guilds never contend.
#[derive(Debug)]
pub struct Manager {
    calls: DashMap<GuildId, Arc<Mutex<Call>>>,
    config: RwLock<Config>,
    shard: Shard,
    user_id: UserId,
}

impl Manager {
    /// Creates a new manager, sending voice state updates to `shard` on behalf
    /// of the user `user_id`.
    pub fn new(shard: Shard, user_id: impl Into<UserId>) -> Arc<Self> {
        Self::from_config(shard, user_id, Config::default())
    }

    /// Creates a new manager whose calls all start from the given configuration.
    pub fn from_config(shard: Shard, user_id: impl Into<UserId>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            calls: DashMap::new(),
            config: RwLock::new(config),
            shard,
            user_id: user_id.into(),
        })
    }

    /// Retrieves a [`Call`] for the given guild, if one already exists.
    pub fn get<G: Into<GuildId>>(&self, guild_id: G) -> Option<Arc<Mutex<Call>>> {
        let guild_id = guild_id.into();

        self.calls.get(&guild_id).map(|c| c.value().clone())
    }

    /// Retrieves a [`Call`] for the given guild, creating a new one if
    /// none is found.
    ///
    /// This will not join any calls, or cause connection state to change.
    #[inline]
    pub fn get_or_insert<G: Into<GuildId>>(&self, guild_id: G) -> Arc<Mutex<Call>> {
        self.get_or_insert_inner(guild_id.into())
    }

    fn get_or_insert_inner(&self, guild_id: GuildId) -> Arc<Mutex<Call>> {
        self.calls
            .entry(guild_id)
            .or_insert_with(|| {
                let config = self.config.read().clone();

                Arc::new(Mutex::new(Call::new(
                    guild_id,
                    self.shard.clone(),
                    self.user_id,
                    config,
                )))
            })
            .value()
            .clone()
    }

    /// Sets the configuration used by calls created from now on.
    pub fn set_config(&self, new_config: Config) {
        *self.config.write() = new_config;
    }

    /// Connects to a target by retrieving its relevant [`Call`] and
    /// connecting, or creating the handler if required.
    ///
    /// This can also switch to the given channel, if a handler already exists
    /// for the target and the current connected channel is not equal to the
    /// given channel. The driver closes the old session before opening the new
    /// one, so at most one voice connection exists per guild.
    ///
    /// The provided channel _must_ be in the provided guild. This is _not_
    /// checked by the library, and will result in an error.
    ///
    /// The returned result completes once the driver is connected, or once the
    /// host's updates time out or every connection attempt has failed.
    #[inline]
    pub async fn join<C, G>(&self, guild_id: G, channel_id: C) -> JoinResult<Arc<Mutex<Call>>>
    where
        C: Into<ChannelId>,
        G: Into<GuildId>,
    {
        self.join_inner(guild_id.into(), channel_id.into()).await
    }

    #[instrument(skip(self))]
    async fn join_inner(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> JoinResult<Arc<Mutex<Call>>> {
        let call = self.get_or_insert_inner(guild_id);

        // The host's replies need this lock, so it must not be held while waiting.
        let join = {
            let mut handler = call.lock().await;
            handler.join(channel_id).await?
        };

        join.result().await.map(|()| call)
    }

    /// Retrieves the [`Call`] for the given target and leaves the associated
    /// voice channel, if connected.
    ///
    /// This will _not_ drop the handler, and will preserve it and its settings.
    /// Leaving a guild with no call succeeds without doing anything.
    #[inline]
    pub async fn leave<G: Into<GuildId>>(&self, guild_id: G) -> JoinResult<()> {
        self.leave_inner(guild_id.into()).await
    }

    #[instrument(skip(self))]
    async fn leave_inner(&self, guild_id: GuildId) -> JoinResult<()> {
        match self.get(guild_id) {
            Some(call) => {
                let mut handler = call.lock().await;
                handler.leave().await
            },
            None => Ok(()),
        }
    }

    /// Retrieves the [`Call`] for the given target and leaves the associated
    /// voice channel, if connected.
    ///
    /// The handler is then dropped, removing settings for the target, and
    /// stopping its driver.
    ///
    /// An Error is returned if a [`Call`] for the given [`GuildId`] did not exist.
    #[inline]
    pub async fn remove<G: Into<GuildId>>(&self, guild_id: G) -> JoinResult<()> {
        self.remove_inner(guild_id.into()).await
    }

    #[instrument(skip(self))]
    async fn remove_inner(&self, guild_id: GuildId) -> JoinResult<()> {
        let (_, call) = self.calls.remove(&guild_id).ok_or(JoinError::NoCall)?;

        let mut handler = call.lock().await;
        handler.leave().await
    }

    /// Feeds a voice state update from the host's gateway to the relevant call.
    ///
    /// Updates for other users, or for guilds without a call, are ignored.
    #[instrument(skip(self, session_id))]
    pub async fn process_state_update(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        session_id: String,
        channel_id: Option<ChannelId>,
    ) {
        if user_id != self.user_id {
            return;
        }

        if let Some(call) = self.get(guild_id) {
            let mut handler = call.lock().await;
            handler.update_state(session_id, channel_id);
        }
    }

    /// Feeds a voice server update from the host's gateway to the relevant call.
    ///
    /// A missing endpoint means the voice server is being reallocated, and a
    /// second update will follow.
    #[instrument(skip(self, token))]
    pub async fn process_server_update(
        &self,
        guild_id: GuildId,
        endpoint: Option<String>,
        token: String,
    ) {
        let Some(endpoint) = endpoint else {
            debug!("Voice server is being reallocated.");
            return;
        };

        if let Some(call) = self.get(guild_id) {
            let mut handler = call.lock().await;
            handler.update_server(endpoint, token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn manager() -> (Arc<Manager>, flume::Receiver<Value>) {
        let (tx, rx) = flume::unbounded();

        (Manager::new(Shard::Json(tx), UserId(7)), rx)
    }

    #[tokio::test]
    async fn leaving_an_unknown_guild_is_a_no_op() {
        let (manager, rx) = manager();

        manager.leave(GuildId(1)).await.unwrap();

        assert!(manager.get(GuildId(1)).is_none());
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn removing_an_unknown_guild_fails() {
        let (manager, _rx) = manager();

        assert!(matches!(
            manager.remove(GuildId(1)).await,
            Err(JoinError::NoCall)
        ));
    }

    #[tokio::test]
    async fn one_call_per_guild() {
        let (manager, _rx) = manager();

        let a = manager.get_or_insert(GuildId(1));
        let b = manager.get_or_insert(GuildId(1));
        let c = manager.get_or_insert(GuildId(2));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn updates_for_other_users_are_ignored() {
        let (manager, _rx) = manager();
        let call = manager.get_or_insert(GuildId(1));
        let _join = call.lock().await.join(ChannelId(2)).await.unwrap();

        manager
            .process_state_update(GuildId(1), UserId(8), "sess".into(), Some(ChannelId(2)))
            .await;
        manager
            .process_server_update(GuildId(1), Some("127.0.0.1:9".into()), "tok".into())
            .await;

        assert!(call.lock().await.current_connection().is_none());

        manager
            .process_state_update(GuildId(1), UserId(7), "sess".into(), Some(ChannelId(2)))
            .await;

        assert!(call.lock().await.current_connection().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn join_without_host_reply_times_out() {
        let (manager, rx) = manager();

        let res = manager.join(GuildId(1), ChannelId(2)).await;

        assert!(matches!(res, Err(JoinError::TimedOut)));
        assert_eq!(rx.recv_async().await.unwrap()["d"]["channel_id"], "2");
    }
}
