use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

/// Wall-clock snapshot taken once per tick. Read-only to everything except
/// the clock refresh step and the "Set Time" editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockReading {
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl ClockReading {
    pub fn from_utc(now: DateTime<Utc>, offset: UtcOffset) -> Self {
        let local = now + Duration::minutes(i64::from(offset.minutes()));
        Self {
            day: local.day(),
            hour: local.hour(),
            minute: local.minute(),
            second: local.second(),
        }
    }

    pub fn hhmmss(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Timezone as a UTC offset in half-hour steps, wrapping between -12.0 and
/// +14.0 hours at the editor level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcOffset {
    minutes: i32,
}

impl UtcOffset {
    pub const MIN_MINUTES: i32 = -12 * 60;
    pub const MAX_MINUTES: i32 = 14 * 60;
    pub const STEP_MINUTES: i32 = 30;

    pub fn from_minutes(minutes: i32) -> Self {
        let clamped = minutes.clamp(Self::MIN_MINUTES, Self::MAX_MINUTES);
        // Snap to the half-hour grid.
        let snapped = (clamped / Self::STEP_MINUTES) * Self::STEP_MINUTES;
        Self { minutes: snapped }
    }

    pub fn minutes(self) -> i32 {
        self.minutes
    }

    pub fn stepped_up(self) -> Self {
        let next = self.minutes + Self::STEP_MINUTES;
        if next > Self::MAX_MINUTES {
            Self {
                minutes: Self::MIN_MINUTES,
            }
        } else {
            Self { minutes: next }
        }
    }

    pub fn stepped_down(self) -> Self {
        let next = self.minutes - Self::STEP_MINUTES;
        if next < Self::MIN_MINUTES {
            Self {
                minutes: Self::MAX_MINUTES,
            }
        } else {
            Self { minutes: next }
        }
    }

    pub fn as_hours_string(self) -> String {
        format!("{:+.1}", self.minutes as f32 / 60.0)
    }
}

impl Default for UtcOffset {
    fn default() -> Self {
        Self { minutes: 0 }
    }
}

/// The clock as the rest of the device sees it: the latest reading plus the
/// configured offset. A manual "Set Time" commit edits the reading in place
/// and lasts until the next successful refresh overwrites it, matching the
/// NTP-backed behavior of the device.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockState {
    pub reading: ClockReading,
    pub utc_offset: UtcOffset,
}

impl ClockState {
    pub fn refresh(&mut self, now: DateTime<Utc>) {
        self.reading = ClockReading::from_utc(now, self.utc_offset);
    }

    pub fn set_hour(&mut self, hour: u8) {
        self.reading.hour = u32::from(hour) % 24;
    }

    pub fn set_minute(&mut self, minute: u8) {
        self.reading.minute = u32::from(minute) % 60;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn reading_applies_offset() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 23, 45, 10).unwrap();
        let offset = UtcOffset::from_minutes(330); // +5.5h
        let reading = ClockReading::from_utc(now, offset);

        assert_eq!(reading.day, 15);
        assert_eq!(reading.hour, 5);
        assert_eq!(reading.minute, 15);
        assert_eq!(reading.second, 10);
    }

    #[test]
    fn offset_wraps_at_both_ends() {
        let max = UtcOffset::from_minutes(UtcOffset::MAX_MINUTES);
        assert_eq!(max.stepped_up().minutes(), UtcOffset::MIN_MINUTES);

        let min = UtcOffset::from_minutes(UtcOffset::MIN_MINUTES);
        assert_eq!(min.stepped_down().minutes(), UtcOffset::MAX_MINUTES);
    }

    #[test]
    fn offset_renders_half_hours() {
        assert_eq!(UtcOffset::from_minutes(330).as_hours_string(), "+5.5");
        assert_eq!(UtcOffset::from_minutes(-720).as_hours_string(), "-12.0");
    }
}
