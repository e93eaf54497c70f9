use crate::{
    driver::{connection::error::Result as ConnectionResult, Config},
    events::EventData,
    input::Metadata,
    model::CloseCode,
    tracks::{Track, TrackCommand, TrackEndReason, TrackHandle, TrackId},
    Bitrate,
    ConnectionInfo,
};
use flume::Sender;

#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
pub(crate) enum CoreMessage {
    ConnectWithResult(ConnectionInfo, Sender<ConnectionResult<()>>),
    Disconnect,
    Enqueue(Track, TrackHandle),
    PlayOnly(Track, TrackHandle),
    Skip,
    Previous,
    Shuffle,
    Stop,
    Pause,
    Resume,
    Queue(Sender<Vec<TrackHandle>>),
    History(Sender<Vec<Metadata>>),
    ClearQueue,
    Track(TrackId, TrackCommand),
    SetBitrate(Bitrate),
    SetConfig(Config),
    Mute(bool),
    AddEvent(EventData),
    /// The control channel failed in a way which permits a resume.
    Reconnect,
    /// The control channel failed, and the session must be rebuilt.
    FullReconnect,
    /// The voice server ended the session.
    Terminated(CloseCode),
    TrackEnded(TrackId, TrackEndReason),
    Poison,
}
