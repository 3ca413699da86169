pub mod clock;
pub mod matcher;
pub mod scheduler;
pub mod session;

use serde::Serialize;

/// Timing quality of one graded step.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grade {
    Miss,
    Okay,
    Good,
    Perfect,
}

impl Grade {
    /// Score points awarded per grade.
    pub fn points(&self) -> u32 {
        match self {
            Grade::Miss => 0,
            Grade::Okay => 1,
            Grade::Good => 2,
            Grade::Perfect => 5,
        }
    }

    /// XP awarded per grade, consumed by the external gamification layer.
    pub fn xp(&self) -> u32 {
        match self {
            Grade::Miss => 0,
            Grade::Okay => 2,
            Grade::Good => 5,
            Grade::Perfect => 10,
        }
    }
}

/// One graded step: the quality band plus the timing-offset magnitude in
/// seconds (0.0 for untimed hits). Produced per advancing event and not
/// retained by the engine.
#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct GradeResult {
    pub grade: Grade,
    pub offset_seconds: f64,
}

/// Engine output events, drained by the host after every call. Visual and
/// audio collaborators subscribe to these instead of polling.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub enum EngineEvent {
    NoteOn { pitch: u8, velocity: u8 },
    NoteOff { pitch: u8 },
    Progress { current: f64, total: f64 },
    PlaybackState { is_playing: bool },
    Loop,
    Graded { result: GradeResult, streak: u32 },
    SectionComplete,
}
