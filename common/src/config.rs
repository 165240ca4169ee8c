use serde::{Deserialize, Serialize};

/// Parameters the broker may rewrite at runtime. Read by the sampling
/// aggregators and the vent control law; mutated only through the intake
/// after range validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlParams {
    pub sampling_interval_ms: u64,
    pub publish_interval_ms: u64,
    pub theta_offset_deg: i32,
    pub light_weight: f32,
    pub controlling_factor: f32,
    pub ideal_storage_temp_c: i32,
}

impl Default for ControlParams {
    fn default() -> Self {
        Self {
            sampling_interval_ms: 5_000,
            publish_interval_ms: 120_000,
            theta_offset_deg: 30,
            light_weight: 0.5,
            controlling_factor: 0.75,
            ideal_storage_temp_c: 30,
        }
    }
}

impl ControlParams {
    pub fn sanitize(&mut self) {
        self.sampling_interval_ms = self.sampling_interval_ms.clamp(1_000, 60_000);
        self.publish_interval_ms = self.publish_interval_ms.clamp(10_000, 600_000);
        self.theta_offset_deg = self.theta_offset_deg.clamp(0, 120);
        self.light_weight = self.light_weight.clamp(0.0, 1.0);
        self.controlling_factor = self.controlling_factor.clamp(0.0, 1.0);
        self.ideal_storage_temp_c = self.ideal_storage_temp_c.clamp(10, 40);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: "broker.hivemq.com".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub params: ControlParams,
    pub alarm_capacity: usize,
    pub utc_offset_minutes: i32,
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            params: ControlParams::default(),
            alarm_capacity: 2,
            utc_offset_minutes: 0,
            network: NetworkConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.params.sanitize();
        if self.alarm_capacity == 0 {
            self.alarm_capacity = 2;
        }
        self.utc_offset_minutes = self.utc_offset_minutes.clamp(-12 * 60, 14 * 60);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_device_firmware() {
        let params = ControlParams::default();
        assert_eq!(params.sampling_interval_ms, 5_000);
        assert_eq!(params.publish_interval_ms, 120_000);
        assert_eq!(params.theta_offset_deg, 30);
        assert_eq!(params.ideal_storage_temp_c, 30);
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let mut params = ControlParams {
            sampling_interval_ms: 500,
            publish_interval_ms: 1_000_000,
            theta_offset_deg: 200,
            light_weight: 7.0,
            controlling_factor: -1.0,
            ideal_storage_temp_c: 5,
        };
        params.sanitize();

        assert_eq!(params.sampling_interval_ms, 1_000);
        assert_eq!(params.publish_interval_ms, 600_000);
        assert_eq!(params.theta_offset_deg, 120);
        assert_eq!(params.light_weight, 1.0);
        assert_eq!(params.controlling_factor, 0.0);
        assert_eq!(params.ideal_storage_temp_c, 10);
    }

    #[test]
    fn runtime_config_round_trips_as_json() {
        let config = RuntimeConfig::default();
        let raw = serde_json::to_string(&config).unwrap();
        let parsed: RuntimeConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.params, config.params);
        assert_eq!(parsed.alarm_capacity, 2);
    }
}
