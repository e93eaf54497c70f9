//! Encryption schemes supported by the voice server's secure RTP negotiation.

use aes_gcm::Aes256Gcm;
use byteorder::{ByteOrder, NetworkEndian};
use chacha20poly1305::XChaCha20Poly1305;
use rand::Rng;
use std::{error::Error as StdError, fmt, num::Wrapping, str::FromStr};
use xsalsa20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadInPlace, KeyInit, Payload},
    XSalsa20Poly1305,
};

use crate::constants::RTP_HEADER_LEN;

/// Length of every authentication tag used by the supported modes.
pub const TAG_SIZE: usize = 16;

/// Length of the secret key negotiated for every supported mode.
pub const KEY_SIZE: usize = 32;

const XSALSA_NONCE_SIZE: usize = 24;
const AES_GCM_NONCE_SIZE: usize = 12;
const XCHACHA_NONCE_SIZE: usize = 24;
const COUNTER_NONCE_SIZE: usize = 4;

/// Packet encryption modes offered by voice servers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CryptoMode {
    /// AES-256-GCM over the RTP payload, authenticating the RTP header.
    ///
    /// A 4-byte incrementing counter is appended to each packet and used as the nonce.
    Aes256Gcm,
    /// XChaCha20-Poly1305 over the RTP payload, authenticating the RTP header.
    ///
    /// A 4-byte incrementing counter is appended to each packet and used as the nonce.
    XChaCha20Poly1305,
    /// XSalsa20-Poly1305 with a 4-byte incrementing counter appended to each packet.
    Lite,
    /// XSalsa20-Poly1305 with 24 random bytes appended to each packet.
    Suffix,
    /// XSalsa20-Poly1305 using the RTP header as the nonce.
    ///
    /// Equivalent to a nonce of at most 6B at no extra packet overhead:
    /// the RTP sequence number and timestamp are the varying quantities.
    Normal,
}

impl CryptoMode {
    /// Every mode, in the default order of preference.
    pub const DEFAULT_PREFERENCE: [CryptoMode; 5] = [
        CryptoMode::Aes256Gcm,
        CryptoMode::XChaCha20Poly1305,
        CryptoMode::Lite,
        CryptoMode::Suffix,
        CryptoMode::Normal,
    ];

    /// Returns the name of a mode as it will appear during negotiation.
    pub fn to_request_str(self) -> &'static str {
        use CryptoMode::*;
        match self {
            Aes256Gcm => "aead_aes256_gcm_rtpsize",
            XChaCha20Poly1305 => "aead_xchacha20_poly1305_rtpsize",
            Lite => "xsalsa20_poly1305_lite",
            Suffix => "xsalsa20_poly1305_suffix",
            Normal => "xsalsa20_poly1305",
        }
    }

    /// Picks the first entry of `preference` that the server offered.
    pub fn negotiate<T: AsRef<str>>(preference: &[CryptoMode], offered: &[T]) -> Option<Self> {
        preference
            .iter()
            .copied()
            .find(|mode| offered.iter().any(|s| s.as_ref() == mode.to_request_str()))
    }

    /// Whether the RTP header is authenticated as additional data.
    pub fn is_aead(self) -> bool {
        matches!(self, CryptoMode::Aes256Gcm | CryptoMode::XChaCha20Poly1305)
    }

    /// Size of the full nonce consumed by the cipher.
    pub fn nonce_size(self) -> usize {
        use CryptoMode::*;
        match self {
            Aes256Gcm => AES_GCM_NONCE_SIZE,
            XChaCha20Poly1305 => XCHACHA_NONCE_SIZE,
            Lite | Suffix | Normal => XSALSA_NONCE_SIZE,
        }
    }

    /// Returns the number of bytes occupied by the encryption scheme
    /// which fall before the payload.
    pub fn payload_prefix_len(self) -> usize {
        if self.is_aead() {
            0
        } else {
            TAG_SIZE
        }
    }

    /// Returns the number of bytes occupied by the encryption scheme
    /// which fall after the payload.
    pub fn payload_suffix_len(self) -> usize {
        use CryptoMode::*;
        match self {
            Aes256Gcm | XChaCha20Poly1305 => TAG_SIZE + COUNTER_NONCE_SIZE,
            Lite => COUNTER_NONCE_SIZE,
            Suffix => XSALSA_NONCE_SIZE,
            Normal => 0,
        }
    }

    /// Number of nonce bytes carried on the wire at the end of each packet.
    pub fn wire_nonce_len(self) -> usize {
        use CryptoMode::*;
        match self {
            Aes256Gcm | XChaCha20Poly1305 | Lite => COUNTER_NONCE_SIZE,
            Suffix => XSALSA_NONCE_SIZE,
            Normal => 0,
        }
    }

    /// Calculates the number of additional bytes required compared
    /// to an unencrypted payload.
    pub fn payload_overhead(self) -> usize {
        self.payload_prefix_len() + self.payload_suffix_len()
    }

    /// Expands the bytes carried on the wire (or the RTP header, in [`CryptoMode::Normal`])
    /// into the full nonce for this mode.
    fn full_nonce(self, header: &[u8], wire: &[u8]) -> [u8; XSALSA_NONCE_SIZE] {
        let mut nonce = [0u8; XSALSA_NONCE_SIZE];
        let src = match self {
            CryptoMode::Normal => &header[..header.len().min(RTP_HEADER_LEN)],
            _ => wire,
        };
        let len = src.len().min(self.nonce_size());
        nonce[..len].copy_from_slice(&src[..len]);
        nonce
    }
}

impl fmt::Display for CryptoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_request_str())
    }
}

impl FromStr for CryptoMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::DEFAULT_PREFERENCE
            .into_iter()
            .find(|m| m.to_request_str() == s)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// A mode name which does not correspond to any [`CryptoMode`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown encryption mode {:?}", self.0)
    }
}

impl StdError for UnknownMode {}

/// A packet failed to decrypt or authenticate. Carries no detail, so that a forged
/// packet learns nothing about why it was rejected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AuthenticationError;

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("packet failed authentication")
    }
}

impl StdError for AuthenticationError {}

/// Key material was not exactly [`KEY_SIZE`] bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InvalidKeyLength(pub usize);

impl fmt::Display for InvalidKeyLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected a {KEY_SIZE}-byte key, got {} bytes", self.0)
    }
}

impl StdError for InvalidKeyLength {}

/// A keyed cipher for one of the supported primitive constructions.
#[derive(Clone)]
pub enum Cipher {
    XSalsa20Poly1305(XSalsa20Poly1305),
    Aes256Gcm(Box<Aes256Gcm>),
    XChaCha20Poly1305(XChaCha20Poly1305),
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cipher::XSalsa20Poly1305(_) => "XSalsa20Poly1305",
            Cipher::Aes256Gcm(_) => "Aes256Gcm",
            Cipher::XChaCha20Poly1305(_) => "XChaCha20Poly1305",
        };
        f.debug_tuple("Cipher").field(&name).finish()
    }
}

impl Cipher {
    /// Builds the cipher matching `mode` from a negotiated secret key.
    pub fn new(mode: CryptoMode, key: &[u8]) -> Result<Self, InvalidKeyLength> {
        let bad_len = |_| InvalidKeyLength(key.len());

        Ok(match mode {
            CryptoMode::Aes256Gcm =>
                Cipher::Aes256Gcm(Box::new(Aes256Gcm::new_from_slice(key).map_err(bad_len)?)),
            CryptoMode::XChaCha20Poly1305 =>
                Cipher::XChaCha20Poly1305(XChaCha20Poly1305::new_from_slice(key).map_err(bad_len)?),
            CryptoMode::Lite | CryptoMode::Suffix | CryptoMode::Normal =>
                Cipher::XSalsa20Poly1305(XSalsa20Poly1305::new_from_slice(key).map_err(bad_len)?),
        })
    }

    /// Encrypts `payload`, returning every byte which follows `header` on the wire.
    ///
    /// `wire_nonce` holds the nonce bytes appended to the packet; it is ignored in
    /// [`CryptoMode::Normal`], where the header is the nonce.
    pub fn encrypt(
        &self,
        mode: CryptoMode,
        header: &[u8],
        payload: &[u8],
        wire_nonce: &[u8],
    ) -> Result<Vec<u8>, AuthenticationError> {
        let nonce = mode.full_nonce(header, wire_nonce);
        let mut out = Vec::with_capacity(payload.len() + mode.payload_overhead());

        match self {
            Cipher::XSalsa20Poly1305(c) => {
                out.extend_from_slice(&[0u8; TAG_SIZE]);
                out.extend_from_slice(payload);
                let tag = c
                    .encrypt_in_place_detached(
                        GenericArray::from_slice(&nonce[..XSALSA_NONCE_SIZE]),
                        b"",
                        &mut out[TAG_SIZE..],
                    )
                    .map_err(|_| AuthenticationError)?;
                out[..TAG_SIZE].copy_from_slice(&tag);
            },
            Cipher::Aes256Gcm(c) => {
                let sealed = c
                    .encrypt(GenericArray::from_slice(&nonce[..AES_GCM_NONCE_SIZE]), Payload {
                        msg: payload,
                        aad: header,
                    })
                    .map_err(|_| AuthenticationError)?;
                out.extend_from_slice(&sealed);
            },
            Cipher::XChaCha20Poly1305(c) => {
                let sealed = c
                    .encrypt(GenericArray::from_slice(&nonce[..XCHACHA_NONCE_SIZE]), Payload {
                        msg: payload,
                        aad: header,
                    })
                    .map_err(|_| AuthenticationError)?;
                out.extend_from_slice(&sealed);
            },
        }

        out.extend_from_slice(&wire_nonce[..mode.wire_nonce_len()]);

        Ok(out)
    }

    /// Authenticates and decrypts `body` (every byte after `header`), returning the plaintext.
    pub fn decrypt(
        &self,
        mode: CryptoMode,
        header: &[u8],
        body: &[u8],
    ) -> Result<Vec<u8>, AuthenticationError> {
        if body.len() < mode.payload_overhead() {
            return Err(AuthenticationError);
        }

        let (sealed, wire_nonce) = body.split_at(body.len() - mode.wire_nonce_len());
        let nonce = mode.full_nonce(header, wire_nonce);

        match self {
            Cipher::XSalsa20Poly1305(c) => {
                let (tag, ciphertext) = sealed.split_at(TAG_SIZE);
                let mut out = ciphertext.to_vec();
                c.decrypt_in_place_detached(
                    GenericArray::from_slice(&nonce[..XSALSA_NONCE_SIZE]),
                    b"",
                    &mut out,
                    GenericArray::from_slice(tag),
                )
                .map_err(|_| AuthenticationError)?;
                Ok(out)
            },
            Cipher::Aes256Gcm(c) => c
                .decrypt(GenericArray::from_slice(&nonce[..AES_GCM_NONCE_SIZE]), Payload {
                    msg: sealed,
                    aad: header,
                })
                .map_err(|_| AuthenticationError),
            Cipher::XChaCha20Poly1305(c) => c
                .decrypt(GenericArray::from_slice(&nonce[..XCHACHA_NONCE_SIZE]), Payload {
                    msg: sealed,
                    aad: header,
                })
                .map_err(|_| AuthenticationError),
        }
    }
}

/// Nonce bytes produced for a single outbound packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WireNonce {
    bytes: [u8; XSALSA_NONCE_SIZE],
    len: usize,
}

impl WireNonce {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

/// Outbound nonce source for one transmit session.
///
/// Counter modes start from a random value and wrap; suffix mode draws fresh random
/// bytes for every packet; normal mode relies on the RTP header never repeating.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CryptoState {
    mode: CryptoMode,
    counter: Wrapping<u32>,
}

impl From<CryptoMode> for CryptoState {
    fn from(mode: CryptoMode) -> Self {
        Self {
            mode,
            counter: Wrapping(rand::random::<u32>()),
        }
    }
}

impl CryptoState {
    pub fn kind(&self) -> CryptoMode {
        self.mode
    }

    /// Produces the nonce bytes for the next packet.
    pub fn next_nonce(&mut self) -> WireNonce {
        let mut bytes = [0u8; XSALSA_NONCE_SIZE];
        let len = self.mode.wire_nonce_len();

        match self.mode {
            CryptoMode::Aes256Gcm | CryptoMode::XChaCha20Poly1305 | CryptoMode::Lite => {
                NetworkEndian::write_u32(&mut bytes[..COUNTER_NONCE_SIZE], self.counter.0);
                self.counter += Wrapping(1);
            },
            CryptoMode::Suffix => rand::thread_rng().fill(&mut bytes[..]),
            CryptoMode::Normal => {},
        }

        WireNonce { bytes, len }
    }
}

/// Encrypts a whole packet: `header | sealed payload | wire nonce`.
pub fn encrypt_packet(
    cipher: &Cipher,
    state: &mut CryptoState,
    header: &[u8],
    payload: &[u8],
) -> Result<Vec<u8>, AuthenticationError> {
    let nonce = state.next_nonce();
    let body = cipher.encrypt(state.kind(), header, payload, nonce.as_slice())?;

    let mut out = Vec::with_capacity(header.len() + body.len());
    out.extend_from_slice(header);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decrypts a whole packet whose first `header_len` bytes are sent in the clear.
pub fn decrypt_packet(
    cipher: &Cipher,
    mode: CryptoMode,
    packet: &[u8],
    header_len: usize,
) -> Result<Vec<u8>, AuthenticationError> {
    if packet.len() < header_len {
        return Err(AuthenticationError);
    }

    let (header, body) = packet.split_at(header_len);
    cipher.decrypt(mode, header, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::packet::PacketSequence;
    use std::collections::HashSet;

    const KEY: [u8; KEY_SIZE] = [7u8; KEY_SIZE];

    fn packet(mode: CryptoMode, seq: &mut PacketSequence, state: &mut CryptoState) -> Vec<u8> {
        let cipher = Cipher::new(mode, &KEY).unwrap();
        let header = seq.next_header().to_bytes();
        encrypt_packet(&cipher, state, &header, b"some opus payload").unwrap()
    }

    #[test]
    fn round_trip_every_mode() {
        for mode in CryptoMode::DEFAULT_PREFERENCE {
            let cipher = Cipher::new(mode, &KEY).unwrap();
            let mut seq = PacketSequence::new(1234);
            let mut state = CryptoState::from(mode);

            let header = seq.next_header().to_bytes();
            let pkt = encrypt_packet(&cipher, &mut state, &header, b"hello there").unwrap();

            assert_eq!(pkt.len(), RTP_HEADER_LEN + 11 + mode.payload_overhead(), "{mode}");
            assert_eq!(&pkt[..RTP_HEADER_LEN], &header[..]);

            let plain = decrypt_packet(&cipher, mode, &pkt, RTP_HEADER_LEN).unwrap();
            assert_eq!(plain, b"hello there", "{mode}");
        }
    }

    #[test]
    fn tampering_is_detected() {
        for mode in CryptoMode::DEFAULT_PREFERENCE {
            let cipher = Cipher::new(mode, &KEY).unwrap();
            let mut seq = PacketSequence::new(1234);
            let mut state = CryptoState::from(mode);
            let header = seq.next_header().to_bytes();
            let pkt = encrypt_packet(&cipher, &mut state, &header, b"hello there").unwrap();

            // Flip one bit in the sealed region.
            let mut body_flip = pkt.clone();
            body_flip[RTP_HEADER_LEN + 2] ^= 1;
            assert_eq!(
                decrypt_packet(&cipher, mode, &body_flip, RTP_HEADER_LEN),
                Err(AuthenticationError),
                "{mode}"
            );

            // Where the header is the nonce or the AAD, it is covered as well.
            if mode.is_aead() || mode == CryptoMode::Normal {
                let mut header_flip = pkt.clone();
                header_flip[3] ^= 1;
                assert!(
                    decrypt_packet(&cipher, mode, &header_flip, RTP_HEADER_LEN).is_err(),
                    "{mode}"
                );
            }

            assert!(decrypt_packet(&cipher, mode, &pkt[..RTP_HEADER_LEN + 3], RTP_HEADER_LEN)
                .is_err());
        }
    }

    #[test]
    fn wrong_key_is_rejected() {
        let mode = CryptoMode::Aes256Gcm;
        let cipher = Cipher::new(mode, &KEY).unwrap();
        let other = Cipher::new(mode, &[8u8; KEY_SIZE]).unwrap();
        let mut state = CryptoState::from(mode);
        let header = PacketSequence::new(1).next_header().to_bytes();

        let pkt = encrypt_packet(&cipher, &mut state, &header, b"x").unwrap();
        assert!(decrypt_packet(&other, mode, &pkt, RTP_HEADER_LEN).is_err());
    }

    #[test]
    fn nonces_never_repeat() {
        const N: usize = 5_000;

        for mode in CryptoMode::DEFAULT_PREFERENCE {
            let mut seq = PacketSequence::starting_at(99, u16::MAX - 100, 0);
            let mut state = CryptoState::from(mode);
            let mut seen = HashSet::with_capacity(N);

            for _ in 0..N {
                let pkt = packet(mode, &mut seq, &mut state);
                let nonce = match mode {
                    CryptoMode::Normal => pkt[..RTP_HEADER_LEN].to_vec(),
                    _ => pkt[pkt.len() - mode.wire_nonce_len()..].to_vec(),
                };
                assert!(seen.insert(nonce), "repeated nonce in {mode}");
            }
        }
    }

    #[test]
    fn counter_wraps() {
        let mut state = CryptoState {
            mode: CryptoMode::Lite,
            counter: Wrapping(u32::MAX),
        };

        assert_eq!(state.next_nonce().as_slice(), &[0xff, 0xff, 0xff, 0xff]);
        assert_eq!(state.next_nonce().as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn negotiation_follows_preference() {
        let offered = ["xsalsa20_poly1305", "aead_xchacha20_poly1305_rtpsize"];

        assert_eq!(
            CryptoMode::negotiate(&CryptoMode::DEFAULT_PREFERENCE, &offered),
            Some(CryptoMode::XChaCha20Poly1305)
        );
        assert_eq!(
            CryptoMode::negotiate(&[CryptoMode::Normal, CryptoMode::Lite], &offered),
            Some(CryptoMode::Normal)
        );
        assert_eq!(CryptoMode::negotiate(&[CryptoMode::Suffix], &offered), None);
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in CryptoMode::DEFAULT_PREFERENCE {
            assert_eq!(mode.to_request_str().parse::<CryptoMode>(), Ok(mode));
        }
        assert!("aead_aes256_gcm".parse::<CryptoMode>().is_err());
    }

    #[test]
    fn bad_key_length() {
        assert_eq!(Cipher::new(CryptoMode::Lite, &[0u8; 16]).err(), Some(InvalidKeyLength(16)));
    }
}
