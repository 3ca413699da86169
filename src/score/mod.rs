pub mod types;

pub use types::{melody, EventPitch, HandScope, MusicalEvent, Score, Section, Staff};
