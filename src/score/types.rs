use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Which staff (hand) a pitch belongs to in a two-staff keyboard score.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Staff {
    Treble,
    Bass,
}

/// Which staves are enabled for matching. The merged input stream carries no
/// staff information, so relevance for `Treble`/`Bass` splits at middle C.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandScope {
    Both,
    Treble,
    Bass,
}

impl HandScope {
    /// Whether a played pitch is subject to matching under this scope.
    pub fn includes_played(&self, midi: u8) -> bool {
        match self {
            HandScope::Both => true,
            HandScope::Treble => midi >= 60,
            HandScope::Bass => midi < 60,
        }
    }

    pub fn includes_staff(&self, staff: Staff) -> bool {
        match (self, staff) {
            (HandScope::Both, _) => true,
            (HandScope::Treble, Staff::Treble) => true,
            (HandScope::Bass, Staff::Bass) => true,
            _ => false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct EventPitch {
    pub midi: u8,
    pub staff: Staff,
}

/// One symbolic instant in the score. Times and durations are fractions of a
/// whole note (a quarter note is 0.25). An event with no pitches is a rest.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MusicalEvent {
    /// Absolute symbolic timestamp from score start, in whole notes.
    pub timestamp: f64,
    /// Symbolic duration in whole notes.
    pub duration: f64,
    /// Tied to the previous event: the pitches are held over, not re-attacked.
    pub tied: bool,
    pub pitches: Vec<EventPitch>,
}

impl MusicalEvent {
    pub fn is_rest(&self) -> bool {
        self.pitches.is_empty()
    }

    /// Pitch numbers required by this event under the given scope.
    pub fn required_pitches(&self, scope: HandScope) -> Vec<u8> {
        let mut pitches: Vec<u8> = self
            .pitches
            .iter()
            .filter(|p| scope.includes_staff(p.staff))
            .map(|p| p.midi)
            .collect();
        pitches.sort_unstable();
        pitches.dedup();
        pitches
    }
}

/// A contiguous half-open measure range [start_measure, end_measure), used to
/// scope a loop or practice segment.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Section {
    pub start_measure: usize,
    pub end_measure: usize,
}

impl Section {
    pub fn new(start_measure: usize, end_measure: usize) -> Result<Self, EngineError> {
        if start_measure >= end_measure {
            return Err(EngineError::InvalidSection {
                start: start_measure,
                end: end_measure,
            });
        }
        Ok(Section {
            start_measure,
            end_measure,
        })
    }
}

/// An immutable score: ordered events, a tempo, and measure boundaries.
/// Supplied by an external loader/generator; the engine only reads it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Score {
    pub tempo_bpm: f64,
    pub events: Vec<MusicalEvent>,
    /// Symbolic timestamp of the start of each measure.
    pub measure_starts: Vec<f64>,
    /// Symbolic timestamp of the end of the last event.
    pub total_duration: f64,
}

impl Score {
    pub fn from_events(tempo_bpm: f64, events: Vec<MusicalEvent>) -> Result<Self, EngineError> {
        let total_duration = events
            .iter()
            .map(|e| e.timestamp + e.duration)
            .fold(0.0_f64, f64::max);

        // Measure boundaries assume 4/4 (one whole note per measure); scores
        // from a real loader carry their own boundaries via `with_measures`.
        let num_measures = total_duration.ceil() as usize;
        let measure_starts = (0..num_measures).map(|i| i as f64).collect();

        let score = Score {
            tempo_bpm,
            events,
            measure_starts,
            total_duration,
        };
        score.validate()?;
        Ok(score)
    }

    pub fn with_measures(mut self, measure_starts: Vec<f64>) -> Self {
        self.measure_starts = measure_starts;
        self
    }

    /// Reject score data the scheduler cannot safely iterate.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.tempo_bpm.is_finite() && self.tempo_bpm > 0.0) {
            return Err(EngineError::InvalidTempo(self.tempo_bpm));
        }
        let mut prev_ts = -1.0_f64;
        for (i, event) in self.events.iter().enumerate() {
            if !(event.duration.is_finite() && event.duration > 0.0) {
                return Err(EngineError::InvalidEventDuration {
                    index: i,
                    duration: event.duration,
                });
            }
            if !event.timestamp.is_finite() || event.timestamp < prev_ts {
                return Err(EngineError::NonMonotonicTimestamp { index: i });
            }
            prev_ts = event.timestamp;
        }
        Ok(())
    }

    pub fn measure_count(&self) -> usize {
        self.measure_starts.len()
    }

    /// Symbolic timestamp at which the given measure starts, or None if the
    /// index is one past the end (maps to the score's total duration) or out
    /// of range.
    pub fn measure_timestamp(&self, measure_index: usize) -> Option<f64> {
        if measure_index < self.measure_starts.len() {
            Some(self.measure_starts[measure_index])
        } else if measure_index == self.measure_starts.len() {
            Some(self.total_duration)
        } else {
            None
        }
    }

    /// Real-time seconds for one whole note at this score's tempo.
    pub fn seconds_per_whole(&self) -> f64 {
        240.0 / self.tempo_bpm
    }
}

/// Build a single-staff melody of equal-duration notes, one event per pitch.
/// `None` entries become rests. Used by tests and simple external generators.
pub fn melody(
    tempo_bpm: f64,
    staff: Staff,
    duration: f64,
    pitches: &[Option<u8>],
) -> Result<Score, EngineError> {
    let events = pitches
        .iter()
        .enumerate()
        .map(|(i, p)| MusicalEvent {
            timestamp: i as f64 * duration,
            duration,
            tied: false,
            pitches: match p {
                Some(midi) => vec![EventPitch { midi: *midi, staff }],
                None => Vec::new(),
            },
        })
        .collect();
    Score::from_events(tempo_bpm, events)
}
