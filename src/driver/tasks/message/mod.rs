mod core;
mod events;
mod pacer;
mod udp_rx;
mod udp_tx;
mod ws;

pub(crate) use self::{core::*, events::*, pacer::*, udp_rx::*, udp_tx::*, ws::*};

use flume::Sender;
use tracing::info;

#[derive(Clone, Debug)]
pub(crate) struct Interconnect {
    pub core: Sender<CoreMessage>,
    pub events: Sender<EventMessage>,
    pub pacer: Sender<PacerMessage>,
}

impl Interconnect {
    pub fn poison(&self) {
        let _ = self.events.send(EventMessage::Poison);
    }

    pub fn poison_all(&self) {
        self.poison();
        let _ = self.pacer.send(PacerMessage::Poison);
    }

    /// Replaces a crashed event task, and informs the pacer of the new target.
    pub fn restart_volatile_internals(&mut self) {
        self.poison();

        let (evt_tx, evt_rx) = flume::unbounded();

        self.events = evt_tx;

        let ic = self.clone();
        tokio::spawn(async move {
            info!("Event processor restarted.");
            super::events::runner(ic, evt_rx).await;
            info!("Event processor finished.");
        });

        let _ = self
            .pacer
            .send(PacerMessage::ReplaceInterconnect(self.clone()));
    }
}
