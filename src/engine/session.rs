use std::collections::BTreeSet;

use crate::engine::clock::ElapsedClock;
use crate::engine::matcher::{Decision, InputMatcher, TickSnapshot};
use crate::engine::scheduler::CursorScheduler;
use crate::engine::{EngineEvent, GradeResult};
use crate::error::EngineError;
use crate::input::{ActivePitchSet, InputSource};
use crate::pitch::{self, NoteSmoother};
use crate::score::{HandScope, Score, Section};

/// Velocity for live monitoring of estimator-driven attacks.
const MIC_VELOCITY: u8 = 100;
/// XP bonus when a section is completed.
const SECTION_COMPLETE_XP: u32 = 50;

/// How the cursor is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Scheduler self-paces on its own timer (listen / preview).
    Playback,
    /// Cursor advances only when the matcher accepts the input.
    Wait,
    /// Matcher grades against the elapsed clock's timing windows.
    Timed,
}

/// One practice session: a score, its cursor scheduler, the grading state
/// machine, the elapsed clock and the merged input set. Sessions are
/// self-contained; any number can coexist.
#[derive(Debug, Clone)]
pub struct Session {
    scheduler: CursorScheduler,
    matcher: InputMatcher,
    clock: ElapsedClock,
    inputs: ActivePitchSet,
    smoother: NoteSmoother,
    mode: SessionMode,
    section_done: bool,
    bonus_xp: u32,
}

impl Session {
    pub fn new(score: Score, scope: HandScope) -> Result<Self, EngineError> {
        Ok(Session {
            scheduler: CursorScheduler::new(score)?,
            matcher: InputMatcher::new(scope, false),
            clock: ElapsedClock::new(),
            inputs: ActivePitchSet::new(),
            smoother: NoteSmoother::default(),
            mode: SessionMode::Wait,
            section_done: false,
            bonus_xp: 0,
        })
    }

    // ---- configuration --------------------------------------------------

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn set_mode(&mut self, now: f64, mode: SessionMode) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.mode == mode {
            return events;
        }
        if mode != SessionMode::Playback {
            events.extend(self.scheduler.pause(now));
        }
        if mode != SessionMode::Timed {
            self.clock.stop();
        }
        self.matcher.set_timed(mode == SessionMode::Timed);
        self.mode = mode;
        events
    }

    pub fn set_scope(&mut self, scope: HandScope) {
        self.matcher.set_scope(scope);
    }

    /// Replace the score with a freshly supplied sequence (the external
    /// content source's response to SectionComplete). Evaluation state and
    /// the cursor reset; lifetime totals survive.
    pub fn load_score(&mut self, now: f64, score: Score) -> Result<Vec<EngineEvent>, EngineError> {
        let mut events = self.scheduler.stop(now);
        self.scheduler = CursorScheduler::new(score)?;
        self.matcher.reset_for_section();
        self.clock.stop();
        self.section_done = false;
        events.push(EngineEvent::Progress {
            current: 0.0,
            total: self.scheduler.total_duration(),
        });
        Ok(events)
    }

    // ---- transport passthrough ------------------------------------------

    pub fn play(&mut self, now: f64) -> Vec<EngineEvent> {
        self.scheduler.play(now)
    }

    pub fn pause(&mut self, now: f64) -> Vec<EngineEvent> {
        self.scheduler.pause(now)
    }

    pub fn stop(&mut self, now: f64) -> Vec<EngineEvent> {
        self.clock.stop();
        self.scheduler.stop(now)
    }

    pub fn seek(&mut self, now: f64, target: f64) -> Result<Vec<EngineEvent>, EngineError> {
        self.scheduler.seek(now, target)
    }

    pub fn set_loop(&mut self, start: f64, end: f64) -> Result<(), EngineError> {
        self.scheduler.set_loop(start, end)
    }

    pub fn clear_loop(&mut self) {
        self.scheduler.clear_loop();
    }

    pub fn next_step(&mut self) -> Vec<EngineEvent> {
        self.scheduler.next_step()
    }

    /// Scope a practice segment: loop over the section's measures and seat
    /// the cursor at its start.
    pub fn practice_section(
        &mut self,
        now: f64,
        section: &Section,
    ) -> Result<Vec<EngineEvent>, EngineError> {
        let score = self.scheduler.score();
        let start = score
            .measure_timestamp(section.start_measure)
            .ok_or(EngineError::MeasureOutOfRange(section.start_measure))?;
        let end = score
            .measure_timestamp(section.end_measure)
            .ok_or(EngineError::MeasureOutOfRange(section.end_measure))?;
        self.scheduler.set_loop(start, end)?;
        self.scheduler.seek(now, start)
    }

    /// Begin a timed run from the top, counting in for `lead_in` seconds.
    pub fn start_timed(&mut self, now: f64, lead_in: f64) -> Result<Vec<EngineEvent>, EngineError> {
        let mut events = self.set_mode(now, SessionMode::Timed);
        events.extend(self.scheduler.seek(now, 0.0)?);
        self.matcher.reset_for_section();
        self.section_done = false;
        self.clock.start(now, lead_in);
        Ok(events)
    }

    // ---- input ----------------------------------------------------------

    pub fn controller_note_on(&mut self, pitch: u8, velocity: u8) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.inputs.note_on(InputSource::Controller, pitch) {
            events.push(EngineEvent::NoteOn { pitch, velocity });
        }
        events
    }

    pub fn controller_note_off(&mut self, pitch: u8) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.inputs.note_off(InputSource::Controller, pitch) {
            events.push(EngineEvent::NoteOff { pitch });
        }
        events
    }

    /// Feed one frame of microphone audio. The frame goes through the pitch
    /// estimator and temporal smoother; an accepted note behaves like a
    /// controller attack on the estimator's own sub-set.
    pub fn feed_audio_frame(&mut self, samples: &[f32], sample_rate: f32) -> Vec<EngineEvent> {
        let raw = pitch::estimate(samples, sample_rate).map(|e| pitch::midi_from_hz(e.hz));
        let note = self.smoother.push(raw);
        let (released, attacked) = self.inputs.set_estimator_note(note);

        let mut events = Vec::new();
        if let Some(pitch) = released {
            events.push(EngineEvent::NoteOff { pitch });
        }
        if let Some(pitch) = attacked {
            events.push(EngineEvent::NoteOn {
                pitch,
                velocity: MIC_VELOCITY,
            });
        }
        events
    }

    pub fn active_pitches(&self) -> &BTreeSet<u8> {
        self.inputs.merged()
    }

    // ---- evaluation -----------------------------------------------------

    /// One polling tick (nominally 20-60 Hz). In playback mode this doubles
    /// as the deferred-callback fire; in matching modes it evaluates the
    /// input against the cursor. A cursor advance decided by this tick is
    /// applied after evaluation, so the tick never sees half-updated state.
    pub fn tick(&mut self, now: f64) -> Vec<EngineEvent> {
        match self.mode {
            SessionMode::Playback => self.scheduler.on_timer(now),
            SessionMode::Wait | SessionMode::Timed => self.evaluate_tick(now),
        }
    }

    fn evaluate_tick(&mut self, now: f64) -> Vec<EngineEvent> {
        if self.section_done {
            return Vec::new();
        }
        let snapshot = self.snapshot(now);
        match self.matcher.evaluate(&snapshot) {
            Decision::Hold => Vec::new(),
            Decision::Advance(graded) => self.apply_advance(graded),
            Decision::Complete => {
                self.section_done = true;
                self.bonus_xp += SECTION_COMPLETE_XP;
                vec![EngineEvent::SectionComplete]
            }
        }
    }

    fn snapshot(&self, now: f64) -> TickSnapshot {
        let scope = self.matcher.scope();
        let (required, tied, target_time) = match self.scheduler.current_event() {
            Some(event) => (
                event.required_pitches(scope).into_iter().collect(),
                event.tied,
                event.timestamp * self.scheduler.score().seconds_per_whole(),
            ),
            None => (BTreeSet::new(), false, 0.0),
        };
        TickSnapshot {
            required,
            tied,
            end_reached: self.scheduler.is_end_reached(),
            active: self.inputs.merged().clone(),
            elapsed: self.clock.elapsed(now),
            target_time,
        }
    }

    fn apply_advance(&mut self, graded: Option<GradeResult>) -> Vec<EngineEvent> {
        let mut events = self.scheduler.next_step();
        if let Some(result) = graded {
            events.push(EngineEvent::Graded {
                result,
                streak: self.matcher.streak(),
            });
        }
        if let Some(event) = self.scheduler.current_event() {
            let required = event
                .required_pitches(self.matcher.scope())
                .into_iter()
                .collect();
            self.matcher
                .on_step_entered(&required, event.tied, self.inputs.merged());
        }
        events
    }

    // ---- read accessors -------------------------------------------------

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    pub fn is_end_reached(&self) -> bool {
        self.scheduler.is_end_reached()
    }

    pub fn current_timestamp(&self) -> f64 {
        self.scheduler.current_timestamp()
    }

    pub fn total_duration(&self) -> f64 {
        self.scheduler.total_duration()
    }

    pub fn notes_at_cursor(&self) -> Vec<u8> {
        self.scheduler.notes_at_cursor()
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.scheduler.next_deadline()
    }

    pub fn elapsed(&self, now: f64) -> Option<f64> {
        self.clock.elapsed(now)
    }

    pub fn current_grade(&self) -> Option<GradeResult> {
        self.matcher.last_grade()
    }

    pub fn streak(&self) -> u32 {
        self.matcher.streak()
    }

    pub fn max_streak(&self) -> u32 {
        self.matcher.max_streak()
    }

    pub fn accuracy_for_section(&self) -> f64 {
        self.matcher.accuracy()
    }

    pub fn points(&self) -> u32 {
        self.matcher.points()
    }

    /// Total XP earned this session, for the external gamification layer.
    pub fn xp_earned(&self) -> u32 {
        self.matcher.xp() + self.bonus_xp
    }

    pub fn error_stats(&self) -> &std::collections::BTreeMap<String, u32> {
        self.matcher.error_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Grade;
    use crate::score::{melody, Staff};

    fn four_note_score() -> Score {
        melody(
            60.0,
            Staff::Treble,
            0.25,
            &[Some(60), Some(62), Some(64), Some(65)],
        )
        .unwrap()
    }

    fn graded(events: &[EngineEvent]) -> Vec<GradeResult> {
        events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Graded { result, .. } => Some(*result),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_wait_mode_progression() {
        let mut session = Session::new(four_note_score(), HandScope::Both).unwrap();
        session.controller_note_on(60, 80);
        let events = session.tick(0.1);
        assert_eq!(graded(&events).len(), 1);
        assert_eq!(session.current_timestamp(), 0.25);

        // Still holding 60: release-gated, no advance on 62 yet
        session.controller_note_on(62, 80);
        assert!(graded(&session.tick(0.2)).is_empty());

        // Once 60 comes up the gate clears and the held 62 matches
        session.controller_note_off(60);
        let events = session.tick(0.3);
        assert_eq!(graded(&events).len(), 1);
        assert_eq!(session.streak(), 2);
    }

    #[test]
    fn test_wait_mode_skips_rest() {
        let score = melody(60.0, Staff::Treble, 0.25, &[None, Some(60)]).unwrap();
        let mut session = Session::new(score, HandScope::Both).unwrap();
        session.tick(0.0);
        assert_eq!(session.notes_at_cursor(), vec![60], "rest auto-advanced");
    }

    #[test]
    fn test_timed_end_to_end_scenario() {
        // 4 quarter notes at 60 BPM, pressed at 0.02 / 1.01 / 1.98 / 3.05 s,
        // each held 200 ms: four graded hits, final streak 4, end reached.
        let mut session = Session::new(four_note_score(), HandScope::Both).unwrap();
        session.start_timed(0.0, 0.0).unwrap();

        let pitches = [60u8, 62, 64, 65];
        let press_times = [0.02, 1.01, 1.98, 3.05];
        let mut hits: Vec<GradeResult> = Vec::new();
        let mut completed = false;

        let mut t: f64 = 0.0;
        while t < 4.5 {
            for (i, &at) in press_times.iter().enumerate() {
                if (t - at).abs() < 5e-3 {
                    session.controller_note_on(pitches[i], 90);
                }
                if (t - (at + 0.2)).abs() < 5e-3 {
                    session.controller_note_off(pitches[i]);
                }
            }
            let events = session.tick(t);
            hits.extend(graded(&events));
            completed |= events.contains(&EngineEvent::SectionComplete);
            t += 0.01;
        }

        assert_eq!(hits.len(), 4, "four graded steps: {:?}", hits);
        assert!(
            hits.iter().all(|h| h.grade == Grade::Perfect),
            "all within the perfect window: {:?}",
            hits
        );
        assert_eq!(session.max_streak(), 4);
        assert!(session.is_end_reached());
        assert!(completed, "section-complete signal fired");
        assert_eq!(session.accuracy_for_section(), 100.0);
        // 4 perfect hits (10 XP each) plus the section bonus
        assert_eq!(session.xp_earned(), 4 * 10 + 50);
    }

    #[test]
    fn test_timed_miss_auto_advances() {
        let mut session = Session::new(four_note_score(), HandScope::Both).unwrap();
        session.start_timed(0.0, 0.0).unwrap();
        // Nothing is played; first target is 0.0 so by 0.4 the window is gone
        let events = session.tick(0.4);
        let hits = graded(&events);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].grade, Grade::Miss);
        assert_eq!(session.current_timestamp(), 0.25, "auto-advanced");
        assert_eq!(session.streak(), 0);
    }

    #[test]
    fn test_timed_lead_in_delays_deadlines() {
        let mut session = Session::new(four_note_score(), HandScope::Both).unwrap();
        session.start_timed(0.0, 2.0).unwrap();
        assert_eq!(session.elapsed(0.0), Some(-2.0));
        // Well before the first deadline: no forced miss
        assert!(graded(&session.tick(1.0)).is_empty());
        session.controller_note_on(60, 90);
        let events = session.tick(2.05);
        let hits = graded(&events);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].grade, Grade::Perfect);
    }

    #[test]
    fn test_pre_held_chord_blocks_until_repress() {
        let score = melody(60.0, Staff::Treble, 0.25, &[Some(60), Some(60)]).unwrap();
        let mut session = Session::new(score, HandScope::Both).unwrap();
        session.controller_note_on(60, 80);
        session.tick(0.1); // hit on first step; 60 still held
        session.tick(0.2); // release gate holds
        assert_eq!(session.streak(), 1);

        // Keep holding through many ticks: second step never matches
        for i in 0..10 {
            session.tick(0.3 + i as f64 * 0.05);
        }
        assert_eq!(session.streak(), 1);

        session.controller_note_off(60);
        session.tick(1.0);
        session.controller_note_on(60, 80);
        session.tick(1.1);
        assert_eq!(session.streak(), 2, "re-press accepted after release");
    }

    #[test]
    fn test_playback_mode_ticks_scheduler() {
        let mut session = Session::new(four_note_score(), HandScope::Both).unwrap();
        session.set_mode(0.0, SessionMode::Playback);
        let events = session.play(0.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::NoteOn { pitch: 60, .. })));
        let deadline = session.next_deadline().unwrap();
        let events = session.tick(deadline);
        assert!(events.contains(&EngineEvent::NoteOff { pitch: 60 }));
    }

    #[test]
    fn test_practice_section_loops_measures() {
        // Two measures of quarters
        let pitches: Vec<Option<u8>> = (0..8).map(|i| Some(60 + i as u8)).collect();
        let score = melody(120.0, Staff::Treble, 0.25, &pitches).unwrap();
        let mut session = Session::new(score, HandScope::Both).unwrap();
        let section = Section::new(1, 2).unwrap();
        session.practice_section(0.0, &section).unwrap();
        assert_eq!(session.current_timestamp(), 1.0, "seated at measure start");
    }

    #[test]
    fn test_load_score_resets_section_state() {
        let mut session = Session::new(four_note_score(), HandScope::Both).unwrap();
        session.controller_note_on(60, 80);
        session.tick(0.1);
        assert_eq!(session.streak(), 1);

        session.load_score(1.0, four_note_score()).unwrap();
        assert_eq!(session.streak(), 0);
        assert_eq!(session.current_timestamp(), 0.0);
        assert_eq!(session.max_streak(), 1, "lifetime stats survive");
    }

    #[test]
    fn test_mic_input_feeds_matcher() {
        use std::f32::consts::PI;
        let score = melody(60.0, Staff::Treble, 0.25, &[Some(69)]).unwrap();
        let mut session = Session::new(score, HandScope::Both).unwrap();

        // A4 sine frames; the smoother needs five consistent frames
        let frame: Vec<f32> = (0..2048)
            .map(|i| 0.5 * (2.0 * PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let mut attacked = false;
        for _ in 0..5 {
            let events = session.feed_audio_frame(&frame, 44100.0);
            attacked |= events
                .iter()
                .any(|e| matches!(e, EngineEvent::NoteOn { pitch: 69, .. }));
        }
        assert!(attacked, "smoothed mic note should attack");
        let events = session.tick(0.1);
        assert_eq!(graded(&events).len(), 1);
    }
}
