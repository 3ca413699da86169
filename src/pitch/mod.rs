pub mod autocorrelation;
pub mod smoothing;

pub use autocorrelation::{estimate, midi_from_hz, PitchEstimate};
pub use smoothing::NoteSmoother;
