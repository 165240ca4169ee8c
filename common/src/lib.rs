pub mod alarm;
pub mod clock;
pub mod config;
pub mod intake;
pub mod menu;
pub mod sampling;
pub mod topics;
pub mod types;
pub mod vent;
pub mod warning;

pub use alarm::{AlarmError, AlarmSlot, AlarmTime, Alarms, RingSequence, SNOOZE_MINUTES};
pub use clock::{ClockReading, ClockState, UtcOffset};
pub use config::{ControlParams, NetworkConfig, RuntimeConfig};
pub use intake::{apply as apply_config_message, ConfigChange};
pub use menu::{MenuEffect, MenuMachine, MenuState, TimeEditor, TimeField};
pub use sampling::SamplingAggregator;
pub use topics::*;
pub use types::{Button, DeviceStatePayload, Tone};
pub use vent::vent_angle;
pub use warning::{evaluate as evaluate_environment, WarningSiren, WarningStatus};
