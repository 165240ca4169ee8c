use serde::Serialize;

/// One debounced button edge. Debounce timing is owned by the input layer;
/// the state machines only ever see discrete presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Up,
    Down,
    Ok,
    Cancel,
}

/// A single buzzer note: frequency plus how long to hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u16,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatePayload {
    #[serde(rename = "lightAverage")]
    pub light_average: i64,
    #[serde(rename = "temperatureAverage")]
    pub temperature_average: i64,
    #[serde(rename = "ventAngle")]
    pub vent_angle: u8,
    #[serde(rename = "warningActive")]
    pub warning_active: bool,
}
