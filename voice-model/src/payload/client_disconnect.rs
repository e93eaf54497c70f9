use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Opcode 13: another participant left the call.
///
/// Any SSRC previously announced for this user may be reassigned afterwards.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct ClientDisconnect {
    pub user_id: UserId,
}
