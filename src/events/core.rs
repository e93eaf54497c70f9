/// Voice core events occur on changes to the session, and on receipt of
/// voice packets and gateway messages.
///
/// Core events persist while the `action` in [`EventData`]
/// returns `None`.
///
/// [`EventData`]: super::EventData
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum CoreEvent {
    /// Fires when this driver successfully connects to a voice channel.
    DriverConnect,
    /// Fires when this driver successfully reconnects after a network error.
    DriverReconnect,
    /// Fires when this driver fails to connect to, or drops from, a voice channel.
    DriverDisconnect,
    /// Fires when the control channel fails and a reconnection begins.
    Reconnecting,
    /// Fires once every reconnection attempt has failed, and the session is abandoned.
    SessionLost,
    /// Fired on receipt of a speaking state update from another host.
    ///
    /// Note: this will fire when a user starts speaking for the first time,
    /// or changes their capabilities.
    SpeakingStateUpdate,
    /// Fires when a source starts speaking, or stops speaking
    /// (*i.e.*, 5 consecutive silent frames).
    SpeakingUpdate,
    /// Fires on receipt of a voice packet from another stream in the voice call.
    ///
    /// As RTP packets do not map to users, SSRCs must be mapped back using
    /// the user IDs seen through client connection or speaking state updates.
    VoicePacket,
    /// Fires whenever users connect to the same channel as this client, including
    /// the list of users already present when the session began.
    ClientConnect,
    /// Fires whenever a user disconnects from the same channel as this client.
    ClientDisconnect,
}
