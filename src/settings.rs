//! # Gossiper Settings
//!
//! Configuration for one gossip shell: round interval, jitter, ACK
//! timeout, and the peer-discovery mode. The effective interval for each
//! round is sampled as `mean * (1 + uniform(-f, +f))` with the jitter
//! factor `f` clamped to `[0, 1]`.

use std::time::Duration;

use rand::Rng;

use crate::discovery::PeerDiscovery;

/// Default mean interval between gossip rounds.
pub const DEFAULT_GOSSIP_INTERVAL: Duration = Duration::from_secs(1);

/// Default jitter factor applied to every sampled interval.
pub const DEFAULT_INTERVAL_JITTER: f64 = 0.25;

/// Default timeout for the per-gossip ACK wait.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// Shell mailbox capacity.
pub(crate) const SHELL_MAILBOX: usize = 1000;

/// Configuration for one gossip shell.
pub struct GossiperSettings<E> {
    /// Mean interval between gossip rounds.
    pub gossip_interval: Duration,
    /// Randomization factor `f` in `[0, 1]`; each round fires after
    /// `gossip_interval * (1 + uniform(-f, +f))`. Values outside the range
    /// are clamped at sampling time.
    pub interval_jitter: f64,
    /// How long a round waits for a peer to acknowledge one gossip before
    /// logging and moving on.
    pub ack_timeout: Duration,
    /// Where peers come from.
    pub discovery: PeerDiscovery<E>,
}

impl<E> Default for GossiperSettings<E> {
    fn default() -> Self {
        Self {
            gossip_interval: DEFAULT_GOSSIP_INTERVAL,
            interval_jitter: DEFAULT_INTERVAL_JITTER,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            discovery: PeerDiscovery::Manual,
        }
    }
}

impl<E> GossiperSettings<E> {
    /// Settings with the given mean round interval, everything else
    /// default.
    pub fn with_interval(gossip_interval: Duration) -> Self {
        Self {
            gossip_interval,
            ..Self::default()
        }
    }

    /// Sample the effective interval for the next round.
    pub fn sample_interval(&self) -> Duration {
        sample_interval(self.gossip_interval, self.interval_jitter)
    }
}

/// Sample `mean * (1 + uniform(-f, +f))` with `f` clamped to `[0, 1]`.
pub(crate) fn sample_interval(mean: Duration, jitter: f64) -> Duration {
    let f = jitter.clamp(0.0, 1.0);
    if f == 0.0 {
        return mean;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-f..=f);
    mean.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let settings: GossiperSettings<u64> = GossiperSettings::default();
        assert_eq!(settings.gossip_interval, DEFAULT_GOSSIP_INTERVAL);
        assert_eq!(settings.interval_jitter, DEFAULT_INTERVAL_JITTER);
        assert_eq!(settings.ack_timeout, DEFAULT_ACK_TIMEOUT);
    }

    #[test]
    fn sampled_intervals_stay_within_bounds() {
        let mean = Duration::from_millis(1000);
        let f = 0.25;
        let lo = mean.mul_f64(1.0 - f);
        let hi = mean.mul_f64(1.0 + f);

        for _ in 0..1000 {
            let sampled = sample_interval(mean, f);
            assert!(sampled >= lo, "sampled {sampled:?} below {lo:?}");
            assert!(sampled <= hi, "sampled {sampled:?} above {hi:?}");
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        let mean = Duration::from_millis(250);
        for _ in 0..10 {
            assert_eq!(sample_interval(mean, 0.0), mean);
        }
    }

    #[test]
    fn out_of_range_jitter_is_clamped() {
        let mean = Duration::from_millis(100);
        for _ in 0..1000 {
            let sampled = sample_interval(mean, 3.0);
            assert!(sampled <= mean.mul_f64(2.0));
        }
        for _ in 0..10 {
            assert_eq!(sample_interval(mean, -1.0), mean);
        }
    }
}
