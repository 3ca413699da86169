use std::collections::{BTreeMap, BTreeSet};

use crate::engine::{Grade, GradeResult};
use crate::score::HandScope;

/// Full tolerance band around a timed deadline, in seconds. Later than this
/// past the deadline forces a Miss and auto-advances.
pub const GRADING_WINDOW: f64 = 0.35;
const PERFECT_WINDOW: f64 = 0.10;
const GOOD_WINDOW: f64 = 0.25;

/// Points for an untimed correct hit (untimed steps are all graded flat).
const UNTIMED_POINTS: u32 = 1;
const UNTIMED_XP: u32 = 5;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

fn midi_to_name(midi: u8) -> String {
    let name = NOTE_NAMES[(midi % 12) as usize];
    let octave = midi as i32 / 12 - 1;
    format!("{}{}", name, octave)
}

/// Consistent per-tick view of everything the matcher judges against. Built
/// by the session before any state moves, so a cursor advance triggered by
/// this tick's decision is never observed by the same tick.
#[derive(Debug, Clone)]
pub struct TickSnapshot {
    /// Pitches required at the cursor, already scoped to the enabled hands.
    pub required: BTreeSet<u8>,
    /// The current event is tied to the previous one.
    pub tied: bool,
    /// Cursor has run past the last event.
    pub end_reached: bool,
    /// Merged active pitches from all input sources.
    pub active: BTreeSet<u8>,
    /// Elapsed performance time; None when no clock is running (wait mode).
    pub elapsed: Option<f64>,
    /// Real-time deadline of the current event (timed mode only).
    pub target_time: f64,
}

/// What the orchestrating session should do after a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Keep waiting on this step.
    Hold,
    /// Advance the cursor; Some(result) if the step was graded.
    Advance(Option<GradeResult>),
    /// The section is finished.
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepStatus {
    Waiting,
    Incorrect,
}

/// Per-session evaluation bookkeeping, reset when a new section loads.
#[derive(Debug, Clone, Default)]
pub struct EvaluationState {
    streak: u32,
    max_streak: u32,
    correct: u32,
    incorrect: u32,
    points: u32,
    xp: u32,
    last_grade: Option<GradeResult>,
    /// Required pitches that were already down when the step appeared; they
    /// must all go up before a fresh attack is accepted.
    pre_held: BTreeSet<u8>,
    /// Pitches from the just-completed step that must be released before the
    /// next step is evaluated (untimed mode).
    awaiting_release: BTreeSet<u8>,
    /// Pitches accepted for the previous step; holding them into this step
    /// is legato, not a wrong note.
    accepted_prev: BTreeSet<u8>,
    /// Wrong pitches currently down, so one bad press is counted once.
    wrong_held: BTreeSet<u8>,
    error_stats: BTreeMap<String, u32>,
}

/// The authoritative judge of whether the player supplied the right input,
/// and how well-timed it was.
#[derive(Debug, Clone)]
pub struct InputMatcher {
    scope: HandScope,
    timed: bool,
    status: StepStatus,
    state: EvaluationState,
}

impl InputMatcher {
    pub fn new(scope: HandScope, timed: bool) -> Self {
        InputMatcher {
            scope,
            timed,
            status: StepStatus::Waiting,
            state: EvaluationState::default(),
        }
    }

    pub fn scope(&self) -> HandScope {
        self.scope
    }

    pub fn set_scope(&mut self, scope: HandScope) {
        self.scope = scope;
    }

    pub fn set_timed(&mut self, timed: bool) {
        self.timed = timed;
    }

    pub fn streak(&self) -> u32 {
        self.state.streak
    }

    pub fn max_streak(&self) -> u32 {
        self.state.max_streak
    }

    pub fn points(&self) -> u32 {
        self.state.points
    }

    pub fn xp(&self) -> u32 {
        self.state.xp
    }

    pub fn last_grade(&self) -> Option<GradeResult> {
        self.state.last_grade
    }

    pub fn error_stats(&self) -> &BTreeMap<String, u32> {
        &self.state.error_stats
    }

    /// Section accuracy in percent: graded hits over graded attempts.
    pub fn accuracy(&self) -> f64 {
        let attempts = self.state.correct + self.state.incorrect;
        if attempts == 0 {
            100.0
        } else {
            self.state.correct as f64 / attempts as f64 * 100.0
        }
    }

    /// Reset per-section state for a freshly loaded section. Lifetime
    /// bookkeeping (max streak, totals, XP) survives.
    pub fn reset_for_section(&mut self) {
        self.state.streak = 0;
        self.state.last_grade = None;
        self.state.pre_held.clear();
        self.state.awaiting_release.clear();
        self.state.accepted_prev.clear();
        self.state.wrong_held.clear();
        self.status = StepStatus::Waiting;
    }

    /// Called once whenever the cursor lands on a new step, with the pitches
    /// it requires and the live set at that instant. Flags strict-attack
    /// violations; a tied step is exempt since holding through a tie is the
    /// written performance.
    pub fn on_step_entered(&mut self, required: &BTreeSet<u8>, tied: bool, active: &BTreeSet<u8>) {
        self.status = StepStatus::Waiting;
        self.state.pre_held = if tied {
            BTreeSet::new()
        } else {
            required.intersection(active).copied().collect()
        };
    }

    /// Evaluate one polling tick.
    pub fn evaluate(&mut self, snap: &TickSnapshot) -> Decision {
        if snap.end_reached {
            return Decision::Complete;
        }

        // Wrong-note bookkeeping follows the keys: a released wrong key can
        // be counted again if pressed again.
        self.state.wrong_held.retain(|p| snap.active.contains(p));
        if self.status == StepStatus::Incorrect && self.state.wrong_held.is_empty() {
            self.status = StepStatus::Waiting;
        }

        // Forced miss once the deadline plus the full window has passed,
        // regardless of what is held.
        if self.timed {
            if let Some(elapsed) = snap.elapsed {
                if elapsed > snap.target_time + GRADING_WINDOW {
                    let result = GradeResult {
                        grade: Grade::Miss,
                        offset_seconds: elapsed - snap.target_time,
                    };
                    self.state.incorrect += 1;
                    self.state.streak = 0;
                    self.state.last_grade = Some(result);
                    return Decision::Advance(Some(result));
                }
            }
        }

        // Nothing to wait for on a rest.
        if snap.required.is_empty() {
            return Decision::Advance(None);
        }

        // Release-gating: the previous step's pitches must come up first.
        // Pitches carried into a tied step are exempt.
        if !self.state.awaiting_release.is_empty() {
            if snap.tied {
                let carried: Vec<u8> = self
                    .state
                    .awaiting_release
                    .intersection(&snap.required)
                    .copied()
                    .collect();
                for p in carried {
                    self.state.awaiting_release.remove(&p);
                }
            }
            let still_down = self
                .state
                .awaiting_release
                .iter()
                .any(|p| snap.active.contains(p));
            if still_down {
                return Decision::Hold;
            }
            self.state.awaiting_release.clear();
        }

        // Strict attack: every pre-held pitch must go fully up before any
        // of them counts as a fresh press.
        if !self.state.pre_held.is_empty() {
            let still_down = self.state.pre_held.iter().any(|p| snap.active.contains(p));
            if !still_down {
                self.state.pre_held.clear();
            }
            return Decision::Hold;
        }

        // Wrong-note detection over the scope-relevant active pitches, with
        // legato tolerance for pitches accepted in the previous step.
        let wrong: BTreeSet<u8> = snap
            .active
            .iter()
            .filter(|&&p| {
                self.scope.includes_played(p)
                    && !snap.required.contains(&p)
                    && !self.state.accepted_prev.contains(&p)
            })
            .copied()
            .collect();
        if !wrong.is_empty() {
            let newly_wrong: Vec<u8> = wrong
                .difference(&self.state.wrong_held)
                .copied()
                .collect();
            for p in newly_wrong {
                *self.state.error_stats.entry(midi_to_name(p)).or_insert(0) += 1;
            }
            self.state.wrong_held.extend(wrong);
            if self.status != StepStatus::Incorrect {
                self.status = StepStatus::Incorrect;
                self.state.incorrect += 1;
                self.state.streak = 0;
            }
            return Decision::Hold;
        }

        let all_found = snap.required.iter().all(|p| snap.active.contains(p));
        if !all_found {
            return Decision::Hold;
        }

        if self.timed {
            let elapsed = match snap.elapsed {
                Some(e) => e,
                None => return Decision::Hold,
            };
            let offset = (elapsed - snap.target_time).abs();
            if offset > GRADING_WINDOW {
                // Too early; the window has not opened yet.
                return Decision::Hold;
            }
            let grade = if offset <= PERFECT_WINDOW {
                Grade::Perfect
            } else if offset <= GOOD_WINDOW {
                Grade::Good
            } else {
                Grade::Okay
            };
            let result = GradeResult {
                grade,
                offset_seconds: offset,
            };
            self.record_hit(result, grade.points(), grade.xp(), snap, false);
            Decision::Advance(Some(result))
        } else {
            let result = GradeResult {
                grade: Grade::Good,
                offset_seconds: 0.0,
            };
            self.record_hit(result, UNTIMED_POINTS, UNTIMED_XP, snap, true);
            Decision::Advance(Some(result))
        }
    }

    fn record_hit(
        &mut self,
        result: GradeResult,
        points: u32,
        xp: u32,
        snap: &TickSnapshot,
        gate_release: bool,
    ) {
        self.state.correct += 1;
        self.state.points += points;
        self.state.xp += xp;
        self.state.streak += 1;
        self.state.max_streak = self.state.max_streak.max(self.state.streak);
        self.state.last_grade = Some(result);
        self.state.accepted_prev = snap.required.clone();
        if gate_release {
            self.state.awaiting_release = snap.required.clone();
        }
    }
}
