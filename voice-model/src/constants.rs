//! Protocol constants shared by both ends of a voice control channel.

/// Control channel protocol version spoken by this crate.
pub const GATEWAY_VERSION: u8 = 8;

/// Transport protocol named during protocol selection.
pub const UDP_PROTOCOL: &str = "udp";
