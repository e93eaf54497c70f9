use bitflags::bitflags;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

bitflags! {
    /// How a participant is currently transmitting, as carried by speaking updates.
    ///
    /// Unknown bits sent by the server are dropped on receipt.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct SpeakingState: u8 {
        /// Voice audio, shown with a speaking indicator.
        const MICROPHONE = 1;

        /// Audio accompanying a screen share. No indicator is shown.
        const SOUNDSHARE = 1 << 1;

        /// Other speakers are attenuated while this one talks.
        const PRIORITY = 1 << 2;
    }
}

impl SpeakingState {
    /// Whether voice audio is flowing, which is the only flag this client sets itself.
    pub fn microphone(self) -> bool {
        self.contains(Self::MICROPHONE)
    }

    pub fn soundshare(self) -> bool {
        self.contains(Self::SOUNDSHARE)
    }

    pub fn priority(self) -> bool {
        self.contains(Self::PRIORITY)
    }
}

// Sent as a bare integer rather than bitflags' default representation.
impl<'de> Deserialize<'de> for SpeakingState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_bits_truncate(u8::deserialize(deserializer)?))
    }
}

impl Serialize for SpeakingState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.bits())
    }
}
