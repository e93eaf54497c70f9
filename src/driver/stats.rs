use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Transport counters shared between a call and its UDP tasks.
///
/// Counters accumulate across reconnections.
#[derive(Clone, Debug, Default)]
pub struct TransportStats {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    packets_sent: AtomicU64,
    packets_dropped: AtomicU64,
    auth_failures: AtomicU64,
    packets_received: AtomicU64,
    stale_packets: AtomicU64,
}

macro_rules! counter {
    ($($get:ident, $incr:ident;)*) => {
        $(
            pub fn $get(&self) -> u64 {
                self.inner.$get.load(Ordering::Relaxed)
            }

            pub(crate) fn $incr(&self) {
                self.inner.$get.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl TransportStats {
    counter! {
        packets_sent, sent;
        packets_dropped, dropped;
        auth_failures, auth_failed;
        packets_received, received;
        stale_packets, stale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_counters() {
        let stats = TransportStats::default();
        let task_view = stats.clone();

        task_view.sent();
        task_view.sent();
        task_view.dropped();
        task_view.stale();

        assert_eq!(stats.packets_sent(), 2);
        assert_eq!(stats.packets_dropped(), 1);
        assert_eq!(stats.stale_packets(), 1);
        assert_eq!(stats.auth_failures(), 0);
        assert_eq!(stats.packets_received(), 0);
    }
}
