use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Where the voice server should send media, and how it must be sealed.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct ProtocolData {
    /// Our external address, as reported by the server's IP discovery reply.
    pub address: IpAddr,
    /// Wire name of the encryption mode picked from the `Ready` offer, e.g.
    /// `"aead_aes256_gcm_rtpsize"`.
    pub mode: String,
    /// Our external UDP port, from the same discovery reply.
    pub port: u16,
}
