use std::fmt;

use serde::de::{Deserializer, Error as DeError, IgnoredAny, MapAccess, Visitor};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

/// Acknowledgement from the server for a prior voice heartbeat.
///
/// Older protocol versions send the nonce as a bare integer, which is also accepted.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct HeartbeatAck {
    pub nonce: u64,
}

struct AckVisitor;

impl<'de> Visitor<'de> for AckVisitor {
    type Value = HeartbeatAck;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a nonce, or a map containing the nonce under 't'")
    }

    fn visit_u64<E: DeError>(self, nonce: u64) -> Result<Self::Value, E> {
        Ok(HeartbeatAck {
            nonce,
        })
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut nonce = None;

        while let Some(key) = map.next_key::<String>()? {
            if key == "t" {
                nonce = Some(map.next_value::<u64>()?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }

        nonce
            .map(|nonce| HeartbeatAck {
                nonce,
            })
            .ok_or_else(|| DeError::missing_field("t"))
    }
}

impl<'de> Deserialize<'de> for HeartbeatAck {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(AckVisitor)
    }
}

impl Serialize for HeartbeatAck {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("HeartbeatAck", 1)?;
        s.serialize_field("t", &self.nonce)?;
        s.end()
    }
}
