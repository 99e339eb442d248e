// ── Reconnect backoff ──
//
// `delay = min(max, base * 1.5^attempt)`, jittered by ±20% and floored at
// `base`. The attempt counter only moves forward until a successful open
// resets it.

use std::time::Duration;

const GROWTH_FACTOR: f64 = 1.5;
const JITTER_RATIO: f64 = 0.2;

/// Exponential backoff configuration for socket reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt, and the floor for every
    /// jittered delay. Default: 1s.
    pub base_delay: Duration,

    /// Upper bound on the unjittered delay. Default: 30s.
    pub max_delay: Duration,

    /// Reconnects scheduled before the transport gives up and parks in
    /// `Error`. Default: 20.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 20,
        }
    }
}

/// Attempt counter plus delay calculation.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Reconnects scheduled since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// `true` once `max_attempts` reconnects have been scheduled.
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.config.max_attempts
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Compute the next delay with random jitter and advance the counter.
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with(rand::random::<f64>())
    }

    /// Like [`next_delay`](Self::next_delay), with the random draw in
    /// `[0, 1)` supplied by the caller.
    pub fn next_delay_with(&mut self, unit: f64) -> Duration {
        let delay = jittered(&self.config, self.attempt, unit);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }
}

/// The capped exponential delay for `attempt`, before jitter.
pub fn unjittered(config: &ReconnectConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = config.base_delay.as_secs_f64() * GROWTH_FACTOR.powi(exponent);
    let capped = raw.min(config.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped)
}

/// Apply `±JITTER_RATIO` to the unjittered delay using `unit` in `[0, 1)`,
/// never going below `base_delay`.
pub fn jittered(config: &ReconnectConfig, attempt: u32, unit: f64) -> Duration {
    let delay = unjittered(config, attempt).as_secs_f64();
    let spread = delay * JITTER_RATIO * (2.0 * unit.clamp(0.0, 1.0) - 1.0);
    let floored = (delay + spread).max(config.base_delay.as_secs_f64());
    Duration::from_secs_f64(floored)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 20);
    }

    #[test]
    fn unjittered_grows_by_one_and_a_half() {
        let config = ReconnectConfig::default();
        assert_eq!(unjittered(&config, 0), Duration::from_millis(1000));
        assert_eq!(unjittered(&config, 1), Duration::from_millis(1500));
        assert_eq!(unjittered(&config, 2), Duration::from_millis(2250));
    }

    #[test]
    fn unjittered_is_monotonic_and_capped() {
        let config = ReconnectConfig::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let d = unjittered(&config, attempt);
            assert!(d >= previous, "attempt {attempt}: {d:?} < {previous:?}");
            assert!(d <= config.max_delay, "attempt {attempt}: {d:?} above cap");
            previous = d;
        }
        assert_eq!(unjittered(&config, 39), config.max_delay);
    }

    #[test]
    fn jitter_stays_within_twenty_percent_and_above_base() {
        let config = ReconnectConfig::default();
        for attempt in 0..25 {
            let center = unjittered(&config, attempt).as_secs_f64();
            for unit in [0.0, 0.1, 0.25, 0.5, 0.75, 0.9, 0.999_999] {
                let d = jittered(&config, attempt, unit).as_secs_f64();
                assert!(d >= config.base_delay.as_secs_f64() - 1e-9);
                assert!(d <= center * 1.2 + 1e-9, "attempt {attempt} unit {unit}: {d}");
                let lower = (center * 0.8).max(config.base_delay.as_secs_f64());
                assert!(d >= lower - 1e-9, "attempt {attempt} unit {unit}: {d}");
            }
        }
    }

    #[test]
    fn first_attempt_never_drops_below_base() {
        let config = ReconnectConfig::default();
        assert_eq!(jittered(&config, 0, 0.0), config.base_delay);
    }

    #[test]
    fn midpoint_draw_is_unjittered() {
        let config = ReconnectConfig::default();
        assert_eq!(jittered(&config, 3, 0.5), unjittered(&config, 3));
    }

    #[test]
    fn random_delays_respect_bounds() {
        let config = ReconnectConfig::default();
        let mut backoff = Backoff::new(config.clone());
        for attempt in 0..config.max_attempts {
            let d = backoff.next_delay();
            let center = unjittered(&config, attempt).as_secs_f64();
            assert!(d >= config.base_delay);
            assert!(d.as_secs_f64() <= center * 1.2 + 1e-9);
        }
    }

    #[test]
    fn counter_exhausts_and_resets() {
        let mut backoff = Backoff::new(ReconnectConfig {
            max_attempts: 3,
            ..ReconnectConfig::default()
        });
        for _ in 0..3 {
            assert!(!backoff.is_exhausted());
            backoff.next_delay_with(0.5);
        }
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.attempt(), 3);

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert!(!backoff.is_exhausted());
    }
}
