use super::message::*;
use crate::events::GlobalEvents;
use flume::Receiver;
use tracing::{debug, info, instrument, trace, warn};

#[instrument(skip(_interconnect, evt_rx))]
pub(crate) async fn runner(_interconnect: Interconnect, evt_rx: Receiver<EventMessage>) {
    let mut global = GlobalEvents::default();

    loop {
        use EventMessage::*;
        match evt_rx.recv_async().await {
            Ok(AddGlobalEvent(data)) => {
                info!("Global event added.");
                global.add_event(data);
            },
            Ok(AddTrack(id, store, handle)) => {
                debug!("Event state for track {} added.", id);
                global.add_track(id, store, handle);
            },
            Ok(AddTrackEvent(id, data)) => {
                debug!("Adding event to track {}.", id);
                global.add_track_event(id, data);
            },
            Ok(FireCoreEvent(ctx)) => {
                let ctx = ctx.to_user_context();
                let Some(evt) = ctx.to_core_event() else {
                    warn!("Event thread was passed a non-core event in FireCoreEvent.");
                    continue;
                };

                trace!("Firing core event {:?}.", evt);

                global.fire_core_event(evt, ctx).await;
            },
            Ok(FireTrackEvent(id, evt)) => {
                trace!("Firing {:?} for track {}.", evt, id);
                global.fire_track_event(id, evt).await;
            },
            Ok(RemoveTrack(id)) => {
                debug!("Event state for track {} removed.", id);
                global.remove_track(id);
            },
            Ok(RemoveAllTracks) => {
                info!("Event state for all tracks removed.");
                global.remove_all_tracks();
            },
            Err(_) | Ok(Poison) => {
                break;
            },
        }
    }

    info!("Event thread exited.");
}
