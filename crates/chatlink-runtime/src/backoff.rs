//! Exponential backoff between connect attempts

use std::time::Duration;

use chatlink_core::ReconnectConfig;

/// Delay policy for consecutive transient connect failures
///
/// The delay after the `n`th consecutive failure is
/// `base * multiplier^(n - 1)`, capped at `ceiling`.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    ceiling: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(base: Duration, ceiling: Duration, multiplier: f64) -> Self {
        Self {
            base,
            ceiling: ceiling.max(base),
            multiplier: multiplier.max(1.0),
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            config.backoff_base(),
            config.backoff_ceiling(),
            config.backoff_multiplier,
        )
    }

    /// Delay to wait after `failures` consecutive failures
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let millis = self.base.as_millis() as f64 * self.multiplier.powi(exponent);
        let ceiling_millis = self.ceiling.as_millis() as f64;

        if !millis.is_finite() || millis >= ceiling_millis {
            self.ceiling
        } else {
            Duration::from_millis(millis as u64)
        }
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::ZERO);
        assert_eq!(backoff.delay(1), Duration::from_millis(500));
        assert_eq!(backoff.delay(2), Duration::from_millis(1_000));
        assert_eq!(backoff.delay(3), Duration::from_millis(2_000));
        assert_eq!(backoff.delay(10), Duration::from_millis(30_000));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_flat_multiplier() {
        let backoff = Backoff::new(Duration::from_millis(50), Duration::from_secs(1), 1.0);
        assert_eq!(backoff.delay(1), backoff.delay(7));
    }
}
