use thiserror::Error;

/// Configuration errors surfaced by the engine. Runtime conditions (silence,
/// timing stalls, end-of-score) are never errors; they degrade gracefully.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid tempo: {0} BPM")]
    InvalidTempo(f64),

    #[error("event {index} has non-positive duration {duration}")]
    InvalidEventDuration { index: usize, duration: f64 },

    #[error("event {index} timestamp is not monotonically non-decreasing")]
    NonMonotonicTimestamp { index: usize },

    #[error("unreachable loop bounds: start {start} >= end {end}")]
    InvalidLoop { start: f64, end: f64 },

    #[error("invalid section: start measure {start} >= end measure {end}")]
    InvalidSection { start: usize, end: usize },

    #[error("invalid seek target: {0}")]
    InvalidSeek(f64),

    #[error("measure index {0} out of range")]
    MeasureOutOfRange(usize),
}
