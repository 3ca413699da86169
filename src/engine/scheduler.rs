use crate::engine::EngineEvent;
use crate::error::EngineError;
use crate::score::{MusicalEvent, Score};

/// Velocity used for scheduler-driven playback (mezzo-forte).
const PLAYBACK_VELOCITY: u8 = 85;
/// Notes are released at 95% of their written duration so a repeated pitch
/// re-attacks cleanly.
const NOTE_GATE: f64 = 0.95;
/// If the step timer fires more than this many seconds late, the drift
/// accumulator is resynchronized to now instead of compounding.
const DRIFT_RESYNC_SECONDS: f64 = 0.1;

const TIME_EPSILON: f64 = 1e-9;

/// Read position within the score. Exclusively owned by the scheduler; all
/// external reads go through accessors.
#[derive(Debug, Clone)]
struct PlaybackCursor {
    index: usize,
    end_reached: bool,
}

impl PlaybackCursor {
    fn new() -> Self {
        PlaybackCursor {
            index: 0,
            end_reached: false,
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.end_reached = false;
    }

    fn advance(&mut self, event_count: usize) {
        if self.index + 1 < event_count {
            self.index += 1;
        } else {
            self.index = event_count;
            self.end_reached = true;
        }
    }
}

/// Converts the score's event list and tempo into real-time-paced iteration.
///
/// The scheduler never owns a timer. Every mutating call returns the engine
/// events it produced, and `next_deadline()` reports the single absolute
/// time the host must arm its (one and only) timeout for; re-arming after
/// every call replaces any previous timeout. A timer that fires before
/// anything is due processes nothing and is harmless.
#[derive(Debug, Clone)]
pub struct CursorScheduler {
    score: Score,
    cursor: PlaybackCursor,
    playing: bool,
    loop_bounds: Option<(f64, f64)>,
    /// Absolute expected fire time of the next step (drift anchor).
    expected_next_step: f64,
    pending_step: Option<f64>,
    /// (absolute due time, pitch) for scheduled releases.
    pending_note_offs: Vec<(f64, u8)>,
}

impl CursorScheduler {
    pub fn new(score: Score) -> Result<Self, EngineError> {
        score.validate()?;
        Ok(CursorScheduler {
            score,
            cursor: PlaybackCursor::new(),
            playing: false,
            loop_bounds: None,
            expected_next_step: 0.0,
            pending_step: None,
            pending_note_offs: Vec::new(),
        })
    }

    // ---- read accessors -------------------------------------------------

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_end_reached(&self) -> bool {
        self.cursor.end_reached
    }

    pub fn cursor_index(&self) -> usize {
        self.cursor.index
    }

    pub fn current_timestamp(&self) -> f64 {
        match self.score.events.get(self.cursor.index) {
            Some(event) => event.timestamp,
            None => self.score.total_duration,
        }
    }

    pub fn total_duration(&self) -> f64 {
        self.score.total_duration
    }

    pub fn current_event(&self) -> Option<&MusicalEvent> {
        self.score.events.get(self.cursor.index)
    }

    /// All pitch numbers at the cursor, across every staff.
    pub fn notes_at_cursor(&self) -> Vec<u8> {
        match self.current_event() {
            Some(event) => event.pitches.iter().map(|p| p.midi).collect(),
            None => Vec::new(),
        }
    }

    pub fn loop_bounds(&self) -> Option<(f64, f64)> {
        self.loop_bounds
    }

    /// The absolute time of the earliest pending deferred action, or None
    /// when nothing is armed.
    pub fn next_deadline(&self) -> Option<f64> {
        let mut deadline = self.pending_step;
        for &(due, _) in &self.pending_note_offs {
            deadline = Some(match deadline {
                Some(d) => d.min(due),
                None => due,
            });
        }
        deadline
    }

    // ---- transport ------------------------------------------------------

    pub fn play(&mut self, now: f64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.playing {
            return events;
        }
        self.playing = true;
        events.push(EngineEvent::PlaybackState { is_playing: true });
        self.expected_next_step = now;
        self.step(now, &mut events);
        events
    }

    pub fn pause(&mut self, _now: f64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if !self.playing {
            return events;
        }
        self.playing = false;
        self.cancel_pending(&mut events);
        events.push(EngineEvent::PlaybackState { is_playing: false });
        events
    }

    /// Stop playback, cancel every pending deferred action and report the
    /// playhead back at zero. The cursor itself is repositioned by `seek`.
    pub fn stop(&mut self, now: f64) -> Vec<EngineEvent> {
        let mut events = self.pause(now);
        events.push(EngineEvent::Progress {
            current: 0.0,
            total: self.score.total_duration,
        });
        events
    }

    /// Reposition the cursor to the first event at or after `target`
    /// (symbolic time). Stops first and resumes only if it was playing.
    pub fn seek(&mut self, now: f64, target: f64) -> Result<Vec<EngineEvent>, EngineError> {
        if !target.is_finite() || target < 0.0 {
            return Err(EngineError::InvalidSeek(target));
        }
        let mut events = Vec::new();
        let was_playing = self.playing;
        if was_playing {
            events.extend(self.pause(now));
        }
        self.seek_cursor(target);
        events.push(EngineEvent::Progress {
            current: self.current_timestamp(),
            total: self.score.total_duration,
        });
        if was_playing {
            events.extend(self.play(now));
        }
        Ok(events)
    }

    /// Externally-driven advance, used by wait-for-input modes instead of
    /// the timer-driven `play`.
    pub fn next_step(&mut self) -> Vec<EngineEvent> {
        self.cursor.advance(self.score.events.len());
        vec![EngineEvent::Progress {
            current: self.current_timestamp(),
            total: self.score.total_duration,
        }]
    }

    pub fn set_loop(&mut self, start: f64, end: f64) -> Result<(), EngineError> {
        let valid = start.is_finite()
            && end.is_finite()
            && start >= 0.0
            && start < end
            && end <= self.score.total_duration + TIME_EPSILON;
        if !valid {
            return Err(EngineError::InvalidLoop { start, end });
        }
        self.loop_bounds = Some((start, end));
        Ok(())
    }

    pub fn clear_loop(&mut self) {
        self.loop_bounds = None;
    }

    /// Timer fire from the host. Processes everything due at `now`: note
    /// releases, then at most one cursor step (which re-arms the next one).
    pub fn on_timer(&mut self, now: f64) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        self.fire_due_note_offs(now, &mut events);

        if let Some(due) = self.pending_step {
            if due <= now + TIME_EPSILON {
                self.pending_step = None;
                if self.playing {
                    self.cursor.advance(self.score.events.len());
                    self.step(now, &mut events);
                }
            }
        }
        events
    }

    // ---- internals ------------------------------------------------------

    fn seek_cursor(&mut self, target: f64) {
        self.cursor.reset();
        while !self.cursor.end_reached && self.current_timestamp() < target - TIME_EPSILON {
            self.cursor.advance(self.score.events.len());
        }
    }

    /// Fire the event under the cursor and arm the delay to the next one.
    /// Loop wrap (notify, seek, resume) happens atomically in here, so no
    /// event can fire twice for one real instant crossing the boundary.
    fn step(&mut self, now: f64, events: &mut Vec<EngineEvent>) {
        if !self.playing {
            return;
        }

        if let Some((loop_start, loop_end)) = self.loop_bounds {
            if self.current_timestamp() >= loop_end - TIME_EPSILON {
                events.push(EngineEvent::Loop);
                self.cancel_pending(events);
                self.seek_cursor(loop_start);
                self.expected_next_step = now;
            }
        }

        if self.cursor.end_reached || self.cursor.index >= self.score.events.len() {
            self.playing = false;
            self.cancel_pending(events);
            events.push(EngineEvent::PlaybackState { is_playing: false });
            events.push(EngineEvent::Progress {
                current: 0.0,
                total: self.score.total_duration,
            });
            self.cursor.reset();
            return;
        }

        let spw = self.score.seconds_per_whole();
        let event = &self.score.events[self.cursor.index];
        let step_delay = event.duration * spw;
        let real_duration = event.duration * spw;

        for pitch in &event.pitches {
            events.push(EngineEvent::NoteOn {
                pitch: pitch.midi,
                velocity: PLAYBACK_VELOCITY,
            });
            self.pending_note_offs
                .push((now + real_duration * NOTE_GATE, pitch.midi));
        }

        events.push(EngineEvent::Progress {
            current: event.timestamp,
            total: self.score.total_duration,
        });

        // Drift correction: arm against the absolute expected fire time, not
        // "now + delay". Resynchronize only after a catastrophic stall.
        self.expected_next_step += step_delay;
        if self.expected_next_step - now < -DRIFT_RESYNC_SECONDS {
            self.expected_next_step = now;
        }
        self.pending_step = Some(self.expected_next_step.max(now));
    }

    fn fire_due_note_offs(&mut self, now: f64, events: &mut Vec<EngineEvent>) {
        let mut i = 0;
        while i < self.pending_note_offs.len() {
            if self.pending_note_offs[i].0 <= now + TIME_EPSILON {
                let (_, pitch) = self.pending_note_offs.swap_remove(i);
                events.push(EngineEvent::NoteOff { pitch });
            } else {
                i += 1;
            }
        }
    }

    /// Cancel the pending step and every scheduled release, releasing
    /// anything still sounding immediately (no ghost releases later).
    fn cancel_pending(&mut self, events: &mut Vec<EngineEvent>) {
        self.pending_step = None;
        for (_, pitch) in self.pending_note_offs.drain(..) {
            events.push(EngineEvent::NoteOff { pitch });
        }
    }
}
