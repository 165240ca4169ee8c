pub const TOPIC_LIGHT_AVERAGE: &str = "medibox/sensor/light";
pub const TOPIC_TEMPERATURE_AVERAGE: &str = "medibox/sensor/temperature";
pub const TOPIC_DEVICE_STATUS: &str = "medibox/device/status";

pub const TOPIC_CFG_SAMPLING_INTERVAL: &str = "medibox/cfg/sampling-interval";
pub const TOPIC_CFG_PUBLISH_INTERVAL: &str = "medibox/cfg/publish-interval";
pub const TOPIC_CFG_ACTUATOR_OFFSET: &str = "medibox/cfg/actuator-offset";
pub const TOPIC_CFG_LIGHT_WEIGHT: &str = "medibox/cfg/light-weight";
pub const TOPIC_CFG_CONTROLLING_FACTOR: &str = "medibox/cfg/controlling-factor";
pub const TOPIC_CFG_IDEAL_TEMP: &str = "medibox/cfg/ideal-temp";

pub const CONFIG_TOPICS: [&str; 6] = [
    TOPIC_CFG_SAMPLING_INTERVAL,
    TOPIC_CFG_PUBLISH_INTERVAL,
    TOPIC_CFG_ACTUATOR_OFFSET,
    TOPIC_CFG_LIGHT_WEIGHT,
    TOPIC_CFG_CONTROLLING_FACTOR,
    TOPIC_CFG_IDEAL_TEMP,
];
