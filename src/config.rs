use crate::driver::{retry::Retry, CryptoMode};
use crate::constants::DEFAULT_BITRATE;
use audiopus::Bitrate;
use std::time::Duration;

/// Configuration for drivers and calls.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Config {
    /// Encryption modes to request from the voice server, most preferred first.
    ///
    /// The first entry advertised by the server in its `Ready` payload is chosen.
    ///
    /// *Defaults to [`CryptoMode::DEFAULT_PREFERENCE`].*
    pub crypto_preference: Vec<CryptoMode>,
    /// Time to wait for the whole voice server handshake to complete.
    ///
    /// `None` waits forever.
    ///
    /// *Defaults to 10 seconds.*
    pub gateway_timeout: Option<Duration>,
    /// Time allowed for a graceful websocket close before the stream is dropped.
    ///
    /// *Defaults to 1 second.*
    pub close_timeout: Duration,
    /// Number of consecutive unacknowledged heartbeats after which the control channel
    /// is considered dead.
    ///
    /// *Defaults to 2.*
    pub max_missed_heartbeats: u32,
    /// Connection retry logic for the driver.
    ///
    /// This governs the initial connection as well as full reconnections after a
    /// failed resume.
    pub driver_retry: Retry,
    /// Bitrate used when encoding raw PCM inputs.
    ///
    /// *Defaults to 128kbps.*
    pub bitrate: Bitrate,
    /// Number of finished tracks remembered by the queue for [`previous`].
    ///
    /// *Defaults to 20.*
    ///
    /// [`previous`]: crate::driver::Driver::previous
    pub history_len: usize,
    /// Width of the window (in RTP sequence numbers) behind the newest packet of a
    /// remote stream, within which late packets are still accepted.
    ///
    /// *Defaults to 32.*
    pub reorder_window: u16,
    /// Number of silent frames sent whenever audio stops or pauses.
    ///
    /// *Defaults to 5.*
    pub silence_frames: u8,
    /// Number of frames which may wait for transmission before new ones are dropped.
    ///
    /// *Defaults to 64.*
    pub udp_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crypto_preference: CryptoMode::DEFAULT_PREFERENCE.to_vec(),
            gateway_timeout: Some(Duration::from_secs(10)),
            close_timeout: Duration::from_secs(1),
            max_missed_heartbeats: 2,
            driver_retry: Retry::default(),
            bitrate: DEFAULT_BITRATE,
            history_len: 20,
            reorder_window: 32,
            silence_frames: 5,
            udp_channel_capacity: 64,
        }
    }
}

impl Config {
    /// Sets this `Config`'s preferred encryption modes.
    #[must_use]
    pub fn crypto_preference(mut self, crypto_preference: Vec<CryptoMode>) -> Self {
        self.crypto_preference = crypto_preference;
        self
    }

    /// Sets this `Config`'s handshake timeout.
    #[must_use]
    pub fn gateway_timeout(mut self, gateway_timeout: Option<Duration>) -> Self {
        self.gateway_timeout = gateway_timeout;
        self
    }

    /// Sets this `Config`'s websocket close timeout.
    #[must_use]
    pub fn close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Sets this `Config`'s heartbeat miss limit.
    #[must_use]
    pub fn max_missed_heartbeats(mut self, max_missed_heartbeats: u32) -> Self {
        self.max_missed_heartbeats = max_missed_heartbeats;
        self
    }

    /// Sets this `Config`'s driver retry configuration.
    #[must_use]
    pub fn driver_retry(mut self, driver_retry: Retry) -> Self {
        self.driver_retry = driver_retry;
        self
    }

    /// Sets this `Config`'s encoder bitrate.
    #[must_use]
    pub fn bitrate(mut self, bitrate: Bitrate) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Sets this `Config`'s queue history length.
    #[must_use]
    pub fn history_len(mut self, history_len: usize) -> Self {
        self.history_len = history_len;
        self
    }

    /// Sets this `Config`'s reorder window.
    #[must_use]
    pub fn reorder_window(mut self, reorder_window: u16) -> Self {
        self.reorder_window = reorder_window;
        self
    }

    /// Sets this `Config`'s trailing silence length.
    #[must_use]
    pub fn silence_frames(mut self, silence_frames: u8) -> Self {
        self.silence_frames = silence_frames;
        self
    }

    /// Sets this `Config`'s transmit buffer size.
    #[must_use]
    pub fn udp_channel_capacity(mut self, udp_channel_capacity: usize) -> Self {
        self.udp_channel_capacity = udp_channel_capacity.max(1);
        self
    }
}
