use autocoder_rs_config::ReconnectSettings;
use std::time::Duration;

/// Capped exponential reconnect schedule for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
        }
    }

    /// Delay before reconnect number `retries + 1`: `min(base * 2^retries, cap)`.
    pub fn delay_for(&self, retries: u32) -> Duration {
        2u32.checked_pow(retries)
            .map(|factor| self.base.saturating_mul(factor))
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

impl From<ReconnectSettings> for ReconnectPolicy {
    fn from(settings: ReconnectSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
            settings.max_attempts,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autocoder_rs_config::ChannelsConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn doubles_until_cap() {
        let policy = ReconnectPolicy::from(ChannelsConfig::default().project_settings());
        let delays: Vec<u64> = (0..7).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn assistant_channel_caps_lower() {
        let policy = ReconnectPolicy::from(ChannelsConfig::default().assistant_settings());
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn huge_exponents_saturate_to_cap() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), Duration::from_secs(5), 100);
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(5));
    }
}
