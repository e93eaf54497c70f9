mod from;

use serde::de::{Deserializer, Error as DeError, IgnoredAny, MapAccess, Visitor};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::opcode::Opcode;
use crate::payload::*;

/// A representation of data received for voice gateway events.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Event {
    /// Used to begin a voice websocket connection.
    Identify(Identify),
    /// Used to select the voice protocol and encryption mechanism.
    SelectProtocol(SelectProtocol),
    /// Server's response to the client's Identify operation. Contains session-specific
    /// information, e.g. SSRC, and supported encryption modes.
    Ready(Ready),
    /// Periodic messages used to keep the websocket connection alive.
    Heartbeat(Heartbeat),
    /// Server's confirmation of a negotiated encryption scheme.
    SessionDescription(SessionDescription),
    /// A voice event denoting that someone is speaking.
    Speaking(Speaking),
    /// Acknowledgement from the server for a prior voice heartbeat.
    HeartbeatAck(HeartbeatAck),
    /// Sent by the client after a disconnect to attempt to resume a session.
    Resume(Resume),
    /// Used to determine how often the client must send a heartbeat.
    Hello(Hello),
    /// Message received if a Resume request was successful.
    Resumed,
    /// Users already present in the channel when the session began.
    ClientsConnect(ClientsConnect),
    /// Status update in the current channel, indicating that a user has connected.
    ClientConnect(ClientConnect),
    /// Status update in the current channel, indicating that a user has disconnected.
    ClientDisconnect(ClientDisconnect),
    /// A message with an opcode this crate does not model. Its body is discarded.
    Unknown(u8),
}

impl Event {
    /// The opcode of this event, or the raw opcode value for [`Event::Unknown`].
    pub fn op(&self) -> u8 {
        match self {
            Self::Unknown(op) => *op,
            other => other.kind().map_or(u8::MAX, |op| op as u8),
        }
    }

    /// Returns `None` for events whose opcode is not modelled.
    pub fn kind(&self) -> Option<Opcode> {
        use Event::*;
        Some(match self {
            Identify(_) => Opcode::Identify,
            SelectProtocol(_) => Opcode::SelectProtocol,
            Ready(_) => Opcode::Ready,
            Heartbeat(_) => Opcode::Heartbeat,
            SessionDescription(_) => Opcode::SessionDescription,
            Speaking(_) => Opcode::Speaking,
            HeartbeatAck(_) => Opcode::HeartbeatAck,
            Resume(_) => Opcode::Resume,
            Hello(_) => Opcode::Hello,
            Resumed => Opcode::Resumed,
            ClientsConnect(_) => Opcode::ClientsConnect,
            ClientConnect(_) => Opcode::ClientConnect,
            ClientDisconnect(_) => Opcode::ClientDisconnect,
            Unknown(_) => return None,
        })
    }
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("Event", 2)?;

        s.serialize_field("op", &self.op())?;

        use Event::*;
        match self {
            Identify(e) => s.serialize_field("d", e)?,
            SelectProtocol(e) => s.serialize_field("d", e)?,
            Ready(e) => s.serialize_field("d", e)?,
            Heartbeat(e) => s.serialize_field("d", e)?,
            SessionDescription(e) => s.serialize_field("d", e)?,
            Speaking(e) => s.serialize_field("d", e)?,
            HeartbeatAck(e) => s.serialize_field("d", e)?,
            Resume(e) => s.serialize_field("d", e)?,
            Hello(e) => s.serialize_field("d", e)?,
            ClientsConnect(e) => s.serialize_field("d", e)?,
            ClientConnect(e) => s.serialize_field("d", e)?,
            ClientDisconnect(e) => s.serialize_field("d", e)?,
            Resumed | Unknown(_) => s.serialize_field("d", &None::<()>)?,
        }

        s.end()
    }
}

/// Sequencing information carried alongside an event body.
///
/// Parsed separately from [`Event`] so that the body visitor stays independent of
/// framing fields. Every other key is ignored.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Envelope {
    #[serde(default)]
    pub seq: Option<u64>,
}

enum Body<'de> {
    Parsed(Event),
    Raw(&'de RawValue),
}

fn parse_body<'de, A>(op: u8, map: &mut A) -> Result<Event, A::Error>
where
    A: MapAccess<'de>,
{
    let Ok(op) = Opcode::try_from(op) else {
        map.next_value::<IgnoredAny>()?;
        return Ok(Event::Unknown(op));
    };

    Ok(match op {
        Opcode::Identify => map.next_value::<Identify>()?.into(),
        Opcode::SelectProtocol => map.next_value::<SelectProtocol>()?.into(),
        Opcode::Ready => map.next_value::<Ready>()?.into(),
        Opcode::Heartbeat => map.next_value::<Heartbeat>()?.into(),
        Opcode::SessionDescription => map.next_value::<SessionDescription>()?.into(),
        Opcode::Speaking => map.next_value::<Speaking>()?.into(),
        Opcode::HeartbeatAck => map.next_value::<HeartbeatAck>()?.into(),
        Opcode::Resume => map.next_value::<Resume>()?.into(),
        Opcode::Hello => map.next_value::<Hello>()?.into(),
        Opcode::Resumed => {
            map.next_value::<IgnoredAny>()?;
            Event::Resumed
        },
        Opcode::ClientsConnect => map.next_value::<ClientsConnect>()?.into(),
        Opcode::ClientConnect => map.next_value::<ClientConnect>()?.into(),
        Opcode::ClientDisconnect => map.next_value::<ClientDisconnect>()?.into(),
    })
}

fn parse_raw(op: u8, d: &RawValue) -> serde_json::Result<Event> {
    let Ok(op) = Opcode::try_from(op) else {
        return Ok(Event::Unknown(op));
    };

    let d = d.get();
    match op {
        Opcode::Identify => serde_json::from_str::<Identify>(d).map(Into::into),
        Opcode::SelectProtocol => serde_json::from_str::<SelectProtocol>(d).map(Into::into),
        Opcode::Ready => serde_json::from_str::<Ready>(d).map(Into::into),
        Opcode::Heartbeat => serde_json::from_str::<Heartbeat>(d).map(Into::into),
        Opcode::HeartbeatAck => serde_json::from_str::<HeartbeatAck>(d).map(Into::into),
        Opcode::SessionDescription => serde_json::from_str::<SessionDescription>(d).map(Into::into),
        Opcode::Speaking => serde_json::from_str::<Speaking>(d).map(Into::into),
        Opcode::Resume => serde_json::from_str::<Resume>(d).map(Into::into),
        Opcode::Hello => serde_json::from_str::<Hello>(d).map(Into::into),
        Opcode::Resumed => Ok(Event::Resumed),
        Opcode::ClientsConnect => serde_json::from_str::<ClientsConnect>(d).map(Into::into),
        Opcode::ClientConnect => serde_json::from_str::<ClientConnect>(d).map(Into::into),
        Opcode::ClientDisconnect => serde_json::from_str::<ClientDisconnect>(d).map(Into::into),
    }
}

struct EventVisitor;

impl<'de> Visitor<'de> for EventVisitor {
    type Value = Event;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a map with at least two keys ('d', 'op')")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut body: Option<Body<'de>> = None;
        let mut op: Option<u8> = None;

        // Every key is consumed, so trailing fields after "d" never truncate the parse.
        while let Some(key) = map.next_key::<&str>()? {
            match key {
                "op" => {
                    if op.is_some() {
                        return Err(DeError::duplicate_field("op"));
                    }
                    op = Some(map.next_value::<u8>()?);
                },
                "d" => {
                    if body.is_some() {
                        return Err(DeError::duplicate_field("d"));
                    }
                    body = Some(match op {
                        Some(op) => Body::Parsed(parse_body(op, &mut map)?),
                        None => Body::Raw(map.next_value::<&RawValue>()?),
                    });
                },
                _ => {
                    map.next_value::<IgnoredAny>()?;
                },
            }
        }

        let op = op.ok_or_else(|| DeError::missing_field("op"))?;

        match body {
            Some(Body::Parsed(event)) => Ok(event),
            Some(Body::Raw(raw)) => parse_raw(op, raw).map_err(DeError::custom),
            None if op == Opcode::Resumed as u8 => Ok(Event::Resumed),
            None => Err(DeError::missing_field("d")),
        }
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(EventVisitor)
    }
}
