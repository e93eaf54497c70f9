use super::*;
use crate::{
    error::ConnectionError,
    id::{ChannelId, GuildId},
    model::{
        payload::{ClientConnect, ClientDisconnect, ClientsConnect, Speaking},
        CloseCode,
    },
    tracks::{TrackHandle, TrackState},
};

/// Information about which tracks or data fired an event.
///
/// [`Track`] events may be local or global, and have no tracks
/// if fired on the global context via [`Driver::add_global_event`].
///
/// [`Track`]: crate::tracks::Track
/// [`Driver::add_global_event`]: crate::driver::Driver::add_global_event
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum EventContext<'a> {
    /// Track event context, passed to events created via [`TrackHandle::add_event`]
    /// or relevant global events.
    Track(&'a [(&'a TrackState, &'a TrackHandle)]),
    /// The driver connected to a voice channel.
    DriverConnect(ConnectData<'a>),
    /// The driver reconnected to a voice channel after a failure.
    DriverReconnect(ConnectData<'a>),
    /// The driver failed to connect, or left, a voice channel.
    DriverDisconnect(DisconnectData<'a>),
    /// The control channel failed, and the driver is trying to restore it.
    Reconnecting,
    /// Every reconnection attempt failed. Playback has stopped and the queue is empty.
    SessionLost(DisconnectData<'a>),
    /// Speaking state update, typically describing how another voice
    /// user is transmitting audio data. Clients must send at least one such
    /// packet to allow SSRC/UserID matching.
    SpeakingStateUpdate(Speaking),
    /// Speaking state transition, describing whether a given source has started/stopped
    /// transmitting. This fires in response to a silent burst, or the first packet
    /// breaking such a burst.
    SpeakingUpdate {
        /// Synchronisation Source of the user who has begun speaking.
        ///
        /// This must be combined with another event class to map this back to
        /// its original UserId.
        ssrc: u32,
        /// Whether this user is currently speaking.
        speaking: bool,
    },
    /// Opus audio packet, received from another stream.
    VoicePacket(VoiceData<'a>),
    /// Users already present in the channel when this session began.
    ClientsConnect(&'a ClientsConnect),
    /// Fired whenever a client connects to a call for the first time, allowing SSRC/UserID
    /// matching.
    ClientConnect(ClientConnect),
    /// Fired whenever a client disconnects.
    ClientDisconnect(ClientDisconnect),
}

/// Voice connection details gathered at setup/reinstantiation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct ConnectData<'a> {
    /// ID of the voice channel being joined.
    pub channel_id: ChannelId,
    /// ID of the target voice channel's parent guild.
    pub guild_id: GuildId,
    /// Unique string describing this session for validation/authentication purposes.
    pub session_id: &'a str,
    /// The domain name of the voice server.
    pub server: &'a str,
    /// The RTP SSRC assigned to this client by the voice server.
    pub ssrc: u32,
}

/// Voice connection details gathered at termination or failure.
///
/// In the event of a failure, this event data is gathered after
/// a reconnection strategy has exhausted all of its attempts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct DisconnectData<'a> {
    /// The location that a voice connection was terminated.
    pub kind: DisconnectKind,
    /// The cause of any connection failure.
    ///
    /// If `None`, then this disconnect was requested by the user.
    pub reason: Option<DisconnectReason>,
    /// ID of the voice channel being left, if known.
    pub channel_id: Option<ChannelId>,
    /// ID of the target voice channel's parent guild.
    pub guild_id: GuildId,
    /// Unique string describing this session for validation/authentication purposes.
    pub session_id: &'a str,
}

/// The location that a voice connection was terminated.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum DisconnectKind {
    /// The voice driver failed to connect to the server.
    Connect,
    /// The voice driver failed to reconnect to the server.
    Reconnect,
    /// The voice connection was terminated mid-session by either
    /// the user or the voice server.
    Runtime,
}

/// The reason that a voice connection failed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// This (re)connection attempt was dropped due to another request.
    AttemptDiscarded,
    /// The voice server rejected or broke the handshake.
    ProtocolViolation,
    /// A voice connection was not established in the specified time.
    TimedOut,
    /// A websocket or UDP socket failed.
    Io,
    /// Internal task communication failed.
    Internal,
    /// The websocket was closed by the server, with the given close code if any.
    WsClosed(Option<CloseCode>),
}

impl From<&ConnectionError> for DisconnectReason {
    fn from(e: &ConnectionError) -> Self {
        use ConnectionError::*;

        match e {
            AttemptDiscarded => Self::AttemptDiscarded,
            CryptoModeInvalid
            | CryptoModeUnavailable
            | EndpointUrl
            | ExpectedHandshake
            | IllegalDiscoveryResponse
            | IllegalIp
            | Json(_)
            | Crypto(_) => Self::ProtocolViolation,
            Io(_) => Self::Io,
            InterconnectFailure(_) => Self::Internal,
            TimedOut => Self::TimedOut,
            Ws(_) => Self::WsClosed(e.close_code()),
        }
    }
}

/// An Opus packet received from another user, after decryption.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct VoiceData<'a> {
    /// Synchronisation source of the sender.
    pub ssrc: u32,
    /// RTP sequence number of this packet.
    pub sequence: u16,
    /// RTP timestamp of this packet.
    pub timestamp: u32,
    /// The decrypted Opus payload, with any RTP header extension removed.
    pub payload: &'a [u8],
    /// Decoded stereo audio from this packet.
    ///
    /// `None` if this packet arrived out of order, and so was not decoded.
    pub audio: &'a Option<Vec<i16>>,
}

#[derive(Clone, Debug)]
pub(crate) struct InternalConnect {
    pub channel_id: ChannelId,
    pub guild_id: GuildId,
    pub session_id: String,
    pub server: String,
    pub ssrc: u32,
}

#[derive(Clone, Debug)]
pub(crate) struct InternalDisconnect {
    pub kind: DisconnectKind,
    pub reason: Option<DisconnectReason>,
    pub channel_id: Option<ChannelId>,
    pub guild_id: GuildId,
    pub session_id: String,
}

#[derive(Clone, Debug)]
pub(crate) struct InternalVoicePacket {
    pub ssrc: u32,
    pub sequence: u16,
    pub timestamp: u32,
    pub payload: Vec<u8>,
    pub audio: Option<Vec<i16>>,
}

#[derive(Clone, Debug)]
pub(crate) enum CoreContext {
    DriverConnect(InternalConnect),
    DriverReconnect(InternalConnect),
    DriverDisconnect(InternalDisconnect),
    Reconnecting,
    SessionLost(InternalDisconnect),
    SpeakingStateUpdate(Speaking),
    SpeakingUpdate { ssrc: u32, speaking: bool },
    VoicePacket(InternalVoicePacket),
    ClientsConnect(ClientsConnect),
    ClientConnect(ClientConnect),
    ClientDisconnect(ClientDisconnect),
}

impl<'a> From<&'a InternalConnect> for ConnectData<'a> {
    fn from(val: &'a InternalConnect) -> Self {
        Self {
            channel_id: val.channel_id,
            guild_id: val.guild_id,
            session_id: &val.session_id,
            server: &val.server,
            ssrc: val.ssrc,
        }
    }
}

impl<'a> From<&'a InternalDisconnect> for DisconnectData<'a> {
    fn from(val: &'a InternalDisconnect) -> Self {
        Self {
            kind: val.kind,
            reason: val.reason,
            channel_id: val.channel_id,
            guild_id: val.guild_id,
            session_id: &val.session_id,
        }
    }
}

impl<'a> From<&'a InternalVoicePacket> for VoiceData<'a> {
    fn from(val: &'a InternalVoicePacket) -> Self {
        Self {
            ssrc: val.ssrc,
            sequence: val.sequence,
            timestamp: val.timestamp,
            payload: &val.payload,
            audio: &val.audio,
        }
    }
}

impl CoreContext {
    pub(crate) fn to_user_context(&self) -> EventContext<'_> {
        use CoreContext::*;

        match self {
            DriverConnect(evt) => EventContext::DriverConnect(evt.into()),
            DriverReconnect(evt) => EventContext::DriverReconnect(evt.into()),
            DriverDisconnect(evt) => EventContext::DriverDisconnect(evt.into()),
            Reconnecting => EventContext::Reconnecting,
            SessionLost(evt) => EventContext::SessionLost(evt.into()),
            SpeakingStateUpdate(evt) => EventContext::SpeakingStateUpdate(*evt),
            SpeakingUpdate { ssrc, speaking } => EventContext::SpeakingUpdate {
                ssrc: *ssrc,
                speaking: *speaking,
            },
            VoicePacket(evt) => EventContext::VoicePacket(evt.into()),
            ClientsConnect(evt) => EventContext::ClientsConnect(evt),
            ClientConnect(evt) => EventContext::ClientConnect(*evt),
            ClientDisconnect(evt) => EventContext::ClientDisconnect(*evt),
        }
    }
}

impl EventContext<'_> {
    /// Retreive the event class for an event (i.e., when matching)
    /// an event against the registered listeners.
    pub fn to_core_event(&self) -> Option<CoreEvent> {
        use EventContext::*;

        match self {
            DriverConnect(_) => Some(CoreEvent::DriverConnect),
            DriverReconnect(_) => Some(CoreEvent::DriverReconnect),
            DriverDisconnect(_) => Some(CoreEvent::DriverDisconnect),
            Reconnecting => Some(CoreEvent::Reconnecting),
            SessionLost(_) => Some(CoreEvent::SessionLost),
            SpeakingStateUpdate(_) => Some(CoreEvent::SpeakingStateUpdate),
            SpeakingUpdate { .. } => Some(CoreEvent::SpeakingUpdate),
            VoicePacket(_) => Some(CoreEvent::VoicePacket),
            ClientsConnect(_) | ClientConnect(_) => Some(CoreEvent::ClientConnect),
            ClientDisconnect(_) => Some(CoreEvent::ClientDisconnect),
            Track(_) => None,
        }
    }
}
