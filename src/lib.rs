//! # Chorus
//!
//! Chorus is an async voice client for the voice servers of real-time chat
//! platforms. It offers:
//! * A gateway frontend ([`Manager`] and [`Call`]) which asks the host's own
//!   gateway connection to join voice channels, and turns the host's voice
//!   state and voice server updates into live sessions.
//! * A driver ([`Driver`]) which performs the voice websocket handshake,
//!   heartbeats and resumes, negotiates an encrypted RTP transport, and paces
//!   Opus frames onto it every 20ms.
//! * A playback queue with per-track and global events, fed by Opus passthrough
//!   (Ogg, DCA) or PCM encoding, with `ffmpeg` for anything else.
//!
//! The library never installs a `tracing` subscriber; all diagnostics are
//! emitted through the `tracing` facade.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chorus::{id::*, input::{Codec, Input}, shards::Shard, Manager};
//!
//! # async fn run(gateway: flume::Sender<serde_json::Value>) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = Manager::new(Shard::Json(gateway), UserId(1));
//!
//! // The host must feed its voice state and voice server updates to
//! // `Manager::process_state_update` and `Manager::process_server_update`.
//! let call = manager.join(GuildId(2), ChannelId(3)).await?;
//!
//! let mut call = call.lock().await;
//! call.enqueue(Input::file("song.ogg", Codec::Ogg).await?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod driver;
pub mod error;
pub mod events;
mod handler;
pub mod id;
pub(crate) mod info;
pub mod input;
mod manager;
pub mod shards;
pub mod tracks;
mod ws;

pub use audiopus::{self as opus, Bitrate};
pub use chorus_model as model;
pub use discortp as packet;

pub use crate::{
    config::Config,
    driver::Driver,
    error::ConnectionError,
    events::{CoreEvent, Event, EventContext, EventHandler, TrackEvent},
    handler::{Call, Join},
    info::ConnectionInfo,
    manager::Manager,
};
