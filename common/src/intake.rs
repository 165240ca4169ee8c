use crate::config::ControlParams;
use crate::topics::{
    TOPIC_CFG_ACTUATOR_OFFSET, TOPIC_CFG_CONTROLLING_FACTOR, TOPIC_CFG_IDEAL_TEMP,
    TOPIC_CFG_LIGHT_WEIGHT, TOPIC_CFG_PUBLISH_INTERVAL, TOPIC_CFG_SAMPLING_INTERVAL,
};

/// Which parameter an accepted message changed. Interval changes require the
/// caller to reset both aggregator windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    SamplingInterval,
    PublishInterval,
    ActuatorOffset,
    LightWeight,
    ControllingFactor,
    IdealTemp,
}

impl ConfigChange {
    pub fn resets_sampling_windows(self) -> bool {
        matches!(self, Self::SamplingInterval | Self::PublishInterval)
    }
}

/// Applies one inbound `(topic, payload)` pair. Configuration is
/// fire-and-forget: payloads that fail to parse or fall outside the declared
/// range are dropped without feedback and `None` is returned.
pub fn apply(topic: &str, payload: &str, params: &mut ControlParams) -> Option<ConfigChange> {
    let payload = payload.trim();

    match topic {
        TOPIC_CFG_SAMPLING_INTERVAL => {
            let seconds: u64 = payload.parse().ok()?;
            if !(1..=60).contains(&seconds) {
                return None;
            }
            params.sampling_interval_ms = seconds * 1_000;
            Some(ConfigChange::SamplingInterval)
        }
        TOPIC_CFG_PUBLISH_INTERVAL => {
            let seconds: u64 = payload.parse().ok()?;
            if !(10..=600).contains(&seconds) {
                return None;
            }
            params.publish_interval_ms = seconds * 1_000;
            Some(ConfigChange::PublishInterval)
        }
        TOPIC_CFG_ACTUATOR_OFFSET => {
            let degrees: i32 = payload.parse().ok()?;
            if !(0..=120).contains(&degrees) {
                return None;
            }
            params.theta_offset_deg = degrees;
            Some(ConfigChange::ActuatorOffset)
        }
        TOPIC_CFG_LIGHT_WEIGHT => {
            let weight: f32 = payload.parse().ok()?;
            if !(0.0..=1.0).contains(&weight) {
                return None;
            }
            params.light_weight = weight;
            Some(ConfigChange::LightWeight)
        }
        TOPIC_CFG_CONTROLLING_FACTOR => {
            let factor: f32 = payload.parse().ok()?;
            if !(0.0..=1.0).contains(&factor) {
                return None;
            }
            params.controlling_factor = factor;
            Some(ConfigChange::ControllingFactor)
        }
        TOPIC_CFG_IDEAL_TEMP => {
            let celsius: i32 = payload.parse().ok()?;
            if !(10..=40).contains(&celsius) {
                return None;
            }
            params.ideal_storage_temp_c = celsius;
            Some(ConfigChange::IdealTemp)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sampling_interval_converts_seconds_to_ms() {
        let mut params = ControlParams::default();
        let change = apply(TOPIC_CFG_SAMPLING_INTERVAL, "7", &mut params);

        assert_eq!(change, Some(ConfigChange::SamplingInterval));
        assert!(change.unwrap().resets_sampling_windows());
        assert_eq!(params.sampling_interval_ms, 7_000);
    }

    #[test]
    fn out_of_range_ideal_temp_is_dropped() {
        let mut params = ControlParams::default();
        let before = params.ideal_storage_temp_c;

        assert_eq!(apply(TOPIC_CFG_IDEAL_TEMP, "5", &mut params), None);
        assert_eq!(params.ideal_storage_temp_c, before);
    }

    #[test]
    fn in_range_ideal_temp_replaces_exactly() {
        let mut params = ControlParams::default();
        let change = apply(TOPIC_CFG_IDEAL_TEMP, "25", &mut params);

        assert_eq!(change, Some(ConfigChange::IdealTemp));
        assert!(!change.unwrap().resets_sampling_windows());
        assert_eq!(params.ideal_storage_temp_c, 25);
    }

    #[test]
    fn float_parameters_accept_bounds() {
        let mut params = ControlParams::default();

        assert!(apply(TOPIC_CFG_LIGHT_WEIGHT, "0", &mut params).is_some());
        assert_eq!(params.light_weight, 0.0);
        assert!(apply(TOPIC_CFG_CONTROLLING_FACTOR, "1", &mut params).is_some());
        assert_eq!(params.controlling_factor, 1.0);

        assert_eq!(apply(TOPIC_CFG_LIGHT_WEIGHT, "1.01", &mut params), None);
        assert_eq!(apply(TOPIC_CFG_CONTROLLING_FACTOR, "-0.1", &mut params), None);
    }

    #[test]
    fn garbage_payloads_are_dropped_silently() {
        let mut params = ControlParams::default();
        let before = params.clone();

        assert_eq!(apply(TOPIC_CFG_SAMPLING_INTERVAL, "fast", &mut params), None);
        assert_eq!(apply(TOPIC_CFG_ACTUATOR_OFFSET, "", &mut params), None);
        assert_eq!(apply("medibox/cfg/unknown", "1", &mut params), None);
        assert_eq!(params, before);
    }

    #[test]
    fn payload_whitespace_is_tolerated() {
        let mut params = ControlParams::default();
        assert_eq!(
            apply(TOPIC_CFG_PUBLISH_INTERVAL, " 30\n", &mut params),
            Some(ConfigChange::PublishInterval)
        );
        assert_eq!(params.publish_interval_ms, 30_000);
    }
}
