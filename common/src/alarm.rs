use thiserror::Error;

use crate::types::Tone;

/// Minutes added to an alarm when the user snoozes it mid-ring.
pub const SNOOZE_MINUTES: u8 = 5;

const NOTE_MS: u64 = 500;
const NOTE_GAP_MS: u64 = 2;

// C major scale, C4 through C5. Cycled while an alarm rings.
const RING_NOTES: [u16; 8] = [262, 294, 330, 349, 392, 440, 494, 523];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AlarmError {
    #[error("alarm slot {0} does not exist")]
    SlotOutOfRange(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmTime {
    pub hour: u8,
    pub minute: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlarmSlot {
    pub time: Option<AlarmTime>,
    pub triggered: bool,
}

/// Bounded collection of alarm slots, owned exclusively by the scheduler.
/// Slots are evaluated in order and the first match wins for a tick, so at
/// most one alarm can be ringing at a time.
#[derive(Debug, Clone)]
pub struct Alarms {
    slots: Vec<AlarmSlot>,
    enabled: bool,
}

impl Alarms {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![AlarmSlot::default(); capacity],
            enabled: true,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&AlarmSlot> {
        self.slots.get(index)
    }

    pub fn slots(&self) -> &[AlarmSlot] {
        &self.slots
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// First non-triggered slot whose time matches the current hour:minute.
    pub fn due(&self, hour: u32, minute: u32) -> Option<usize> {
        if !self.enabled {
            return None;
        }
        self.slots.iter().position(|slot| {
            !slot.triggered
                && slot.time.is_some_and(|time| {
                    u32::from(time.hour) == hour && u32::from(time.minute) == minute
                })
        })
    }

    /// Marks a slot as having rung. The flag stays set until the slot is
    /// snoozed, re-edited, or deleted, so a cancelled alarm does not re-fire
    /// later in the same minute (nor, deliberately, on any later day -- see
    /// DESIGN.md on the re-arm question).
    pub fn fire(&mut self, index: usize) -> Result<(), AlarmError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(AlarmError::SlotOutOfRange(index))?;
        slot.triggered = true;
        Ok(())
    }

    /// Shifts the slot forward by the snooze delta, carrying into the hour
    /// modulo 24, and clears the triggered flag so the shifted time becomes
    /// the next trigger target.
    pub fn snooze(&mut self, index: usize) -> Result<(), AlarmError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(AlarmError::SlotOutOfRange(index))?;
        if let Some(time) = slot.time.as_mut() {
            let minute = time.minute + SNOOZE_MINUTES;
            if minute >= 60 {
                time.minute = minute - 60;
                time.hour = (time.hour + 1) % 24;
            } else {
                time.minute = minute;
            }
        }
        slot.triggered = false;
        Ok(())
    }

    pub fn set(&mut self, index: usize, hour: u8, minute: u8) -> Result<(), AlarmError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(AlarmError::SlotOutOfRange(index))?;
        slot.time = Some(AlarmTime {
            hour: hour % 24,
            minute: minute % 60,
        });
        slot.triggered = false;
        Ok(())
    }

    pub fn delete(&mut self, index: usize) -> Result<(), AlarmError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(AlarmError::SlotOutOfRange(index))?;
        slot.time = None;
        slot.triggered = false;
        Ok(())
    }
}

/// Cycles the ring melody one note per suspension-point iteration. The
/// caller plays the returned tone, services background duties, then polls
/// for cancel/snooze before asking for the next note.
#[derive(Debug, Clone, Default)]
pub struct RingSequence {
    position: usize,
}

impl RingSequence {
    pub fn next_tone(&mut self) -> Tone {
        let tone = Tone {
            frequency_hz: RING_NOTES[self.position],
            duration_ms: NOTE_MS,
        };
        self.position = (self.position + 1) % RING_NOTES.len();
        tone
    }

    pub fn gap_ms(&self) -> u64 {
        NOTE_GAP_MS
    }
}
