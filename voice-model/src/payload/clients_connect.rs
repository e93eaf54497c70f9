use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Sent once after a session is established, listing users already present in the channel.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ClientsConnect {
    pub user_ids: Vec<UserId>,
}
