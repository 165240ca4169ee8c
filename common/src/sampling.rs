/// Periodic sample -> average -> publish pipeline for one sensor channel.
/// Two independent timers: samples accumulate every `sampling_interval_ms`,
/// the truncated mean is emitted every `publish_interval_ms`. Publishing is
/// skipped entirely while `count == 0`.
#[derive(Debug, Clone)]
pub struct SamplingAggregator {
    sum: i64,
    count: u32,
    last_sample_ms: u64,
    last_publish_ms: u64,
    current_average: i64,
    sampling_interval_ms: u64,
    publish_interval_ms: u64,
}

impl SamplingAggregator {
    pub fn new(sampling_interval_ms: u64, publish_interval_ms: u64, now_ms: u64) -> Self {
        Self {
            sum: 0,
            count: 0,
            last_sample_ms: now_ms,
            last_publish_ms: now_ms,
            current_average: 0,
            sampling_interval_ms,
            publish_interval_ms,
        }
    }

    pub fn sample_due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_sample_ms) >= self.sampling_interval_ms
    }

    pub fn record_sample(&mut self, now_ms: u64, value: i64) {
        self.last_sample_ms = now_ms;
        self.sum += value;
        self.count += 1;
    }

    /// At a publish boundary with at least one sample, returns the floor of
    /// the accumulated mean and starts a fresh window.
    pub fn try_publish(&mut self, now_ms: u64) -> Option<i64> {
        if now_ms.saturating_sub(self.last_publish_ms) < self.publish_interval_ms {
            return None;
        }
        if self.count == 0 {
            return None;
        }

        self.last_publish_ms = now_ms;
        self.current_average = self.sum.div_euclid(i64::from(self.count));
        self.sum = 0;
        self.count = 0;
        Some(self.current_average)
    }

    /// Discards the in-flight window and restarts both timers from `now_ms`.
    /// Called when either governing interval is changed remotely, so a
    /// partial average never mixes two sampling rates.
    pub fn reset_window(&mut self, now_ms: u64) {
        self.sum = 0;
        self.count = 0;
        self.last_sample_ms = now_ms;
        self.last_publish_ms = now_ms;
    }

    pub fn set_intervals(&mut self, sampling_interval_ms: u64, publish_interval_ms: u64) {
        self.sampling_interval_ms = sampling_interval_ms;
        self.publish_interval_ms = publish_interval_ms;
    }

    /// Last published average. Zero until the first publish boundary.
    pub fn current_average(&self) -> i64 {
        self.current_average
    }

    pub fn pending_count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn average_is_floored_and_window_resets() {
        let mut agg = SamplingAggregator::new(1_000, 5_000, 0);

        for (at, value) in [(1_000, 3), (2_000, 4), (3_000, 4)] {
            assert!(agg.sample_due(at));
            agg.record_sample(at, value);
        }

        // 11 / 3 truncates to 3.
        assert_eq!(agg.try_publish(5_000), Some(3));
        assert_eq!(agg.pending_count(), 0);
        assert_eq!(agg.current_average(), 3);
    }

    #[test]
    fn publish_skipped_without_samples() {
        let mut agg = SamplingAggregator::new(1_000, 5_000, 0);
        assert_eq!(agg.try_publish(10_000), None);
    }

    #[test]
    fn default_intervals_scenario() {
        // 24 samples of 10 over a 120s window at 5s spacing.
        let mut agg = SamplingAggregator::new(5_000, 120_000, 0);

        for i in 1..=24 {
            let at = i * 5_000;
            assert!(agg.sample_due(at));
            agg.record_sample(at, 10);
        }

        assert_eq!(agg.try_publish(120_000), Some(10));
        assert_eq!(agg.pending_count(), 0);
    }

    #[test]
    fn sample_not_due_before_interval() {
        let mut agg = SamplingAggregator::new(5_000, 120_000, 0);
        assert!(!agg.sample_due(4_999));
        agg.record_sample(5_000, 7);
        assert!(!agg.sample_due(9_999));
        assert!(agg.sample_due(10_000));
    }

    #[test]
    fn reset_window_discards_partial_accumulation() {
        let mut agg = SamplingAggregator::new(1_000, 5_000, 0);
        agg.record_sample(1_000, 100);
        agg.record_sample(2_000, 100);

        agg.set_intervals(2_000, 10_000);
        agg.reset_window(3_000);

        assert_eq!(agg.pending_count(), 0);
        // Both timers restart from the moment of the change.
        assert!(!agg.sample_due(4_999));
        assert!(agg.sample_due(5_000));
        assert_eq!(agg.try_publish(12_999), None);
    }

    #[test]
    fn negative_sums_floor_toward_negative_infinity() {
        let mut agg = SamplingAggregator::new(1_000, 2_000, 0);
        agg.record_sample(1_000, -3);
        agg.record_sample(1_500, -4);
        assert_eq!(agg.try_publish(2_000), Some(-4));
    }
}
