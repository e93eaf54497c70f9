use crate::{
    driver::{Config, ConnectionError, ConnectionResult, Driver},
    error::{JoinError, JoinResult},
    id::{ChannelId, GuildId, UserId},
    info::{ConnectionInfo, ConnectionProgress},
    shards::{Shard, VoiceUpdate},
};
use flume::{Receiver, Sender};
use std::{
    ops::{Deref, DerefMut},
    time::Duration,
};
use tracing::{debug, instrument, warn};

#[derive(Clone, Debug)]
struct Return {
    gateway: Sender<()>,
    driver: Sender<ConnectionResult<()>>,
}

/// The outcome of a [`Call::join`] request.
///
/// The host must first deliver the voice state and voice server updates for the
/// new channel, which is bounded by [`Config::gateway_timeout`]. The driver then
/// connects, retrying according to [`Config::driver_retry`].
#[derive(Debug)]
#[must_use = "a join completes in the background, and its result is only seen by awaiting it"]
pub struct Join {
    gateway: Receiver<()>,
    driver: Receiver<ConnectionResult<()>>,
    timeout: Option<Duration>,
}

impl Join {
    /// Waits until the call is connected, or has failed to connect.
    pub async fn result(self) -> JoinResult<()> {
        let gateway = self.gateway.recv_async();

        let gateway = match self.timeout {
            Some(t) => tokio::time::timeout(t, gateway)
                .await
                .map_err(|_| JoinError::TimedOut)?,
            None => gateway.await,
        };

        gateway.map_err(|_| JoinError::Dropped)?;

        match self.driver.recv_async().await {
            Ok(Ok(())) => Ok(()),
            // Retryable failures only reach the joiner once the retry budget is spent.
            Ok(Err(e)) if e.should_retry() => {
                warn!("Giving up on voice connection: {}", e);
                Err(JoinError::SessionLost)
            },
            Ok(Err(e)) => Err(JoinError::Driver(e)),
            Err(_) => Err(JoinError::Dropped),
        }
    }
}

/// The call handler is responsible for a single voice connection, acting
/// as a clean API above the inner state and gateway message management.
///
/// It also owns the [`Driver`] for this session, and all of its playback
/// methods are available through `Deref`.
///
/// Look into the [`Manager`] for a slightly higher-level interface for managing
/// the existence of calls.
///
/// [`Manager`]: crate::Manager
#[derive(Debug)]
pub struct Call {
    connection: Option<(ConnectionProgress, Return)>,

    /// The internal controller of the voice connection monitor thread.
    driver: Driver,

    guild_id: GuildId,
    /// Whether the current handler is set to deafen voice connections.
    self_deaf: bool,
    /// Whether the current handler is set to mute voice connections.
    self_mute: bool,
    user_id: UserId,
    /// Will be set when a `Call` is made via the [`new`][`Call::new`]
    /// method.
    ///
    /// When set via [`standalone`][`Call::standalone`], it will not be
    /// present.
    ws: Option<Shard>,
}

impl Call {
    /// Creates a new Call, which will send out voice state updates via
    /// the given shard.
    ///
    /// This must be called from within a tokio runtime.
    #[inline]
    pub fn new(guild_id: GuildId, ws: Shard, user_id: UserId, config: Config) -> Self {
        Self::new_raw(guild_id, Some(ws), user_id, config)
    }

    /// Creates a new standalone Call, which is not connected to any host gateway.
    ///
    /// Actions such as muting, deafening, and switching channels will not
    /// be announced to the host, and the connection details must be supplied
    /// through [`update_state`] and [`update_server`].
    ///
    /// For most use cases you do not want this.
    ///
    /// [`update_state`]: Call::update_state
    /// [`update_server`]: Call::update_server
    #[inline]
    pub fn standalone(guild_id: GuildId, user_id: UserId, config: Config) -> Self {
        Self::new_raw(guild_id, None, user_id, config)
    }

    fn new_raw(guild_id: GuildId, ws: Option<Shard>, user_id: UserId, config: Config) -> Self {
        Call {
            connection: None,
            driver: Driver::new(config),
            guild_id,
            self_deaf: false,
            self_mute: false,
            user_id,
            ws,
        }
    }

    fn do_connect(&mut self) {
        if let Some((ConnectionProgress::Complete(c), ret)) = &self.connection {
            // It's okay if the joiner hung up.
            let _ = ret.gateway.send(());
            self.driver.raw_connect(c.clone(), ret.driver.clone());
        }
    }

    /// Sets whether the current connection is to be deafened.
    ///
    /// If there is no live voice connection, then this only acts as a settings
    /// update for future connections.
    ///
    /// **Note**: Unlike in the official client, you _can_ be deafened while
    /// not being muted.
    #[instrument(skip(self))]
    pub async fn deafen(&mut self, deaf: bool) -> JoinResult<()> {
        self.self_deaf = deaf;

        self.update().await
    }

    /// Returns whether the current connection is self-deafened in this server.
    pub fn is_deaf(&self) -> bool {
        self.self_deaf
    }

    /// Connect or switch to the given voice channel by its Id.
    ///
    /// Any previous join which has not yet completed is abandoned, and its
    /// [`Join`] resolves to [`JoinError::Dropped`].
    #[instrument(skip(self))]
    pub async fn join(&mut self, channel_id: ChannelId) -> JoinResult<Join> {
        let (gateway_tx, gateway_rx) = flume::bounded(1);
        let (driver_tx, driver_rx) = flume::bounded(1);

        self.connection = Some((
            ConnectionProgress::new(self.guild_id, self.user_id, channel_id),
            Return {
                gateway: gateway_tx,
                driver: driver_tx,
            },
        ));

        let timeout = self.driver.config().gateway_timeout;

        self.update().await.map(|_| Join {
            gateway: gateway_rx,
            driver: driver_rx,
            timeout,
        })
    }

    /// Returns the current voice connection details for this Call,
    /// if available.
    pub fn current_connection(&self) -> Option<ConnectionInfo> {
        self.connection.as_ref().and_then(|(progress, _)| progress.info())
    }

    /// Returns `id` of the channel, if connected or connecting to any.
    pub fn current_channel(&self) -> Option<ChannelId> {
        self.connection
            .as_ref()
            .map(|(progress, _)| progress.channel_id())
    }

    /// Returns the ID of the guild this call belongs to.
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Leaves the current voice channel, disconnecting from it.
    ///
    /// This does _not_ forget settings, like whether to be self-deafened or
    /// self-muted.
    ///
    /// Leaving a call which is not connected does nothing to the driver, but
    /// still informs the host.
    #[instrument(skip(self))]
    pub async fn leave(&mut self) -> JoinResult<()> {
        self.leave_local();

        self.update().await
    }

    fn leave_local(&mut self) {
        if self.connection.take().is_some() {
            self.driver.leave();
        }
    }

    /// Sets whether the current connection is to be muted.
    ///
    /// If there is no live voice connection, then this only acts as a settings
    /// update for future connections.
    #[instrument(skip(self))]
    pub async fn mute(&mut self, mute: bool) -> JoinResult<()> {
        self.self_mute = mute;
        self.driver.mute(mute);

        self.update().await
    }

    /// Returns whether the current connection is self-muted in this server.
    pub fn is_mute(&self) -> bool {
        self.self_mute
    }

    /// Updates the voice server data.
    ///
    /// You should only need to use this if you initialized the `Call` via
    /// [`standalone`].
    ///
    /// Once both halves of the connection details are known, or whenever
    /// they change afterwards, the driver (re)connects.
    ///
    /// [`standalone`]: Call::standalone
    #[instrument(skip(self, token))]
    pub fn update_server(&mut self, endpoint: String, token: String) {
        let try_conn = if let Some((progress, _)) = self.connection.as_mut() {
            progress.apply_server_update(endpoint, token)
        } else {
            false
        };

        if try_conn {
            self.do_connect();
        }
    }

    /// Updates the internal voice state of the current user.
    ///
    /// A `None` channel means the host has removed this user from voice, so the
    /// driver disconnects.
    ///
    /// You should only need to use this if you initialized the `Call` via
    /// [`standalone`].
    ///
    /// [`standalone`]: Call::standalone
    #[instrument(skip(self))]
    pub fn update_state(&mut self, session_id: String, channel_id: Option<ChannelId>) {
        let Some(channel_id) = channel_id else {
            debug!("Host reports no voice channel, leaving.");
            self.leave_local();
            return;
        };

        let try_conn = if let Some((progress, _)) = self.connection.as_mut() {
            progress.apply_state_update(session_id, channel_id)
        } else {
            false
        };

        if try_conn {
            self.do_connect();
        }
    }

    /// Send an update for the current session to the host.
    ///
    /// Does nothing if initialized via [`standalone`].
    ///
    /// [`standalone`]: Call::standalone
    async fn update(&mut self) -> JoinResult<()> {
        if let Some(ws) = self.ws.as_ref() {
            ws.update_voice_state(
                self.guild_id,
                self.current_channel(),
                self.self_deaf,
                self.self_mute,
            )
            .await
        } else {
            Ok(())
        }
    }
}

impl Deref for Call {
    type Target = Driver;

    fn deref(&self) -> &Self::Target {
        &self.driver
    }
}

impl DerefMut for Call {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_with_shard() -> (Call, Receiver<serde_json::Value>) {
        let (tx, rx) = flume::unbounded();
        let call = Call::new(GuildId(1), Shard::Json(tx), UserId(2), Config::default());

        (call, rx)
    }

    #[tokio::test]
    async fn join_announces_channel_to_host() {
        let (mut call, rx) = call_with_shard();

        let _join = call.join(ChannelId(3)).await.unwrap();

        let msg = rx.recv_async().await.unwrap();
        assert_eq!(msg["d"]["channel_id"], "3");
        assert_eq!(call.current_channel(), Some(ChannelId(3)));
        assert!(call.current_connection().is_none());

        call.leave().await.unwrap();

        let msg = rx.recv_async().await.unwrap();
        assert!(msg["d"]["channel_id"].is_null());
        assert_eq!(call.current_channel(), None);
    }

    #[tokio::test]
    async fn connection_completes_after_both_updates() {
        let (mut call, _rx) = call_with_shard();
        let _join = call.join(ChannelId(3)).await.unwrap();

        call.update_server("127.0.0.1:9".into(), "tok".into());
        assert!(call.current_connection().is_none());

        call.update_state("sess".into(), Some(ChannelId(3)));
        let info = call.current_connection().unwrap();
        assert_eq!(info.session_id, "sess");
        assert_eq!(info.endpoint, "127.0.0.1:9");
    }

    #[tokio::test]
    async fn host_removal_leaves_call() {
        let (mut call, _rx) = call_with_shard();
        let _join = call.join(ChannelId(3)).await.unwrap();

        call.update_state("sess".into(), None);

        assert_eq!(call.current_channel(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn join_times_out_without_host_updates() {
        let (mut call, _rx) = call_with_shard();
        let join = call.join(ChannelId(3)).await.unwrap();

        assert!(matches!(join.result().await, Err(JoinError::TimedOut)));
    }

    #[tokio::test]
    async fn superseded_join_is_dropped() {
        let (mut call, _rx) = call_with_shard();
        let first = call.join(ChannelId(3)).await.unwrap();
        let _second = call.join(ChannelId(4)).await.unwrap();

        assert!(matches!(first.result().await, Err(JoinError::Dropped)));
    }

    fn settled(result: ConnectionResult<()>) -> Join {
        let (gateway_tx, gateway) = flume::bounded(1);
        let (driver_tx, driver) = flume::bounded(1);
        gateway_tx.send(()).unwrap();
        driver_tx.send(result).unwrap();

        Join {
            gateway,
            driver,
            timeout: None,
        }
    }

    #[tokio::test]
    async fn driver_failures_are_classified() {
        assert!(settled(Ok(())).result().await.is_ok());

        assert!(matches!(
            settled(Err(ConnectionError::CryptoModeUnavailable)).result().await,
            Err(JoinError::Driver(ConnectionError::CryptoModeUnavailable))
        ));

        assert!(matches!(
            settled(Err(ConnectionError::TimedOut)).result().await,
            Err(JoinError::SessionLost)
        ));
    }
}
