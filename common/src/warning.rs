use crate::types::Tone;

const SIREN_NOTE_MS: u64 = 500;
const SIREN_GAP_MS: u64 = 2;

// Low C / high C, alternated while the warning sounds.
const SIREN_NOTES: [u16; 2] = [262, 523];

/// Result of one threshold evaluation. `temperature_breach` and
/// `humidity_breach` gate the siren; `status_lines` is display-only text
/// from the looser secondary thresholds and never gates anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningStatus {
    pub temperature_breach: bool,
    pub humidity_breach: bool,
    pub status_lines: Vec<&'static str>,
}

impl WarningStatus {
    pub fn active(&self) -> bool {
        self.temperature_breach || self.humidity_breach
    }
}

/// Checks one temperature/humidity reading against the storage envelope:
/// temperature must stay within (24, 32) degC and humidity within (65, 85) %.
pub fn evaluate(temperature_c: f32, humidity: f32) -> WarningStatus {
    let mut status_lines = Vec::new();

    if temperature_c > 35.0 {
        status_lines.push("TEMP HIGH");
    }
    if temperature_c < 35.0 {
        status_lines.push("TEMP LOW");
    }
    if humidity > 40.0 {
        status_lines.push("HUMIDITY HIGH");
    }
    if humidity < 20.0 {
        status_lines.push("HUMIDITY LOW");
    }

    WarningStatus {
        temperature_breach: temperature_c > 32.0 || temperature_c < 24.0,
        humidity_breach: humidity > 85.0 || humidity < 65.0,
        status_lines,
    }
}

/// Alternates the two warning tones. Each `next_tone()` is one
/// suspension-point iteration: the caller sounds it, re-runs transport
/// maintenance and both aggregators, then checks the cancel button.
#[derive(Debug, Clone, Default)]
pub struct WarningSiren {
    position: usize,
}

impl WarningSiren {
    pub fn next_tone(&mut self) -> Tone {
        let tone = Tone {
            frequency_hz: SIREN_NOTES[self.position],
            duration_ms: SIREN_NOTE_MS,
        };
        self.position = (self.position + 1) % SIREN_NOTES.len();
        tone
    }

    pub fn gap_ms(&self) -> u64 {
        SIREN_GAP_MS
    }
}
