//! Mappings of messages exchanged over a voice server's control channel, with implementations for
//! (de)serialisation.
#![deny(rustdoc::broken_intra_doc_links)]

mod close_code;
pub mod constants;
mod event;
pub mod id;
mod opcode;
pub mod payload;
mod protocol_data;
mod speaking_state;
mod util;

pub use self::close_code::CloseCode;
pub use self::event::{Envelope, Event};
pub use self::opcode::Opcode;
pub use self::protocol_data::ProtocolData;
pub use self::speaking_state::SpeakingState;
