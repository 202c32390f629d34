use crate::config::FreezeConfig;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

/// Onset of a sustained freeze
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreezeEvent {
    pub onset_date: NaiveDate,
}

/// Scan state carried from one observation to the next
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ScanState {
    previous: Option<(NaiveDate, f64)>,
    cooldown: usize,
}

/// Detects the first sustained freeze of each winter from mean ice fractions.
///
/// Two consecutive winter observations above the fraction threshold mark a
/// freeze whose onset is the first of the pair. Observations outside the
/// winter window are ignored, so an onset always falls inside it. After an onset the next
/// `cooldown` observations are skipped so one winter yields one event.
pub struct FreezeDateDetector {
    config: FreezeConfig,
}

impl FreezeDateDetector {
    pub fn new(config: FreezeConfig) -> Self {
        Self { config }
    }

    /// Whether `date` falls in the winter window (which may wrap over the year end)
    pub fn in_winter(&self, date: NaiveDate) -> bool {
        let month = date.month();
        let (start, end) = (self.config.winter_start_month, self.config.winter_end_month);
        if start <= end {
            (start..=end).contains(&month)
        } else {
            month >= start || month <= end
        }
    }

    /// Scan `(date, mean ice fraction)` observations in ascending date order
    pub fn detect(&self, observations: &[(NaiveDate, f64)]) -> Vec<FreezeEvent> {
        let threshold = self.config.fraction_threshold;
        let mut events = Vec::new();

        observations.iter().fold(ScanState::default(), |state, &(date, fraction)| {
            if state.cooldown > 0 {
                return ScanState {
                    cooldown: state.cooldown - 1,
                    ..state
                };
            }

            if !self.in_winter(date) {
                return state;
            }

            let mut cooldown = 0;
            if let Some((previous_date, previous_fraction)) = state.previous {
                if fraction > threshold && previous_fraction > threshold {
                    log::info!("Freeze onset detected at {}", previous_date);
                    events.push(FreezeEvent {
                        onset_date: previous_date,
                    });
                    cooldown = self.config.cooldown;
                }
            }

            ScanState {
                previous: Some((date, fraction)),
                cooldown,
            }
        });

        log::info!("Detected {} freeze onsets in {} observations", events.len(), observations.len());
        events
    }
}
