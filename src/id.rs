//! Newtypes around IDs used by the host platform.

use chorus_model::id::{GuildId as ModelGuild, UserId as ModelUser};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// ID of a voice/text channel in a guild.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChannelId(pub u64);

/// ID of a guild (group of users and channels).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GuildId(pub u64);

/// ID of a user.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UserId(pub u64);

macro_rules! impl_id {
    ($($name:ident),*) => {
        $(
            impl Display for $name {
                fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
                    Display::fmt(&self.0, f)
                }
            }

            impl From<u64> for $name {
                fn from(id: u64) -> Self {
                    Self(id)
                }
            }
        )*
    };
}

impl_id!(ChannelId, GuildId, UserId);

impl From<GuildId> for ModelGuild {
    fn from(id: GuildId) -> Self {
        Self(id.0)
    }
}

impl From<UserId> for ModelUser {
    fn from(id: UserId) -> Self {
        Self(id.0)
    }
}

impl From<ModelUser> for UserId {
    fn from(id: ModelUser) -> Self {
        Self(id.0)
    }
}
