use super::Event;
use crate::payload::*;

macro_rules! event_from {
    ($($payload:ident),* $(,)?) => {
        $(
            impl From<$payload> for Event {
                fn from(i: $payload) -> Self {
                    Event::$payload(i)
                }
            }
        )*
    };
}

event_from!(
    Identify,
    SelectProtocol,
    Ready,
    Heartbeat,
    SessionDescription,
    Speaking,
    HeartbeatAck,
    Resume,
    Hello,
    ClientsConnect,
    ClientConnect,
    ClientDisconnect,
);
