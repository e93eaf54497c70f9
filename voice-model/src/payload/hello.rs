use serde::{Deserialize, Serialize};

/// Opcode 8: first message on every control connection, fresh or resumed.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Hello {
    /// Heartbeat period in milliseconds. May be fractional.
    pub heartbeat_interval: f64,
}
