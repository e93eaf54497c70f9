use crate::{
    events::{CoreContext, EventData, EventStore, TrackEvent},
    tracks::{TrackHandle, TrackId},
};

pub(crate) enum EventMessage {
    AddGlobalEvent(EventData),
    AddTrack(TrackId, EventStore, TrackHandle),
    AddTrackEvent(TrackId, EventData),
    FireCoreEvent(CoreContext),
    FireTrackEvent(TrackId, TrackEvent),
    RemoveTrack(TrackId),
    RemoveAllTracks,

    Poison,
}
