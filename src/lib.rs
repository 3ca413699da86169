use wasm_bindgen::prelude::*;

pub mod engine;
pub mod error;
pub mod input;
pub mod pitch;
pub mod score;

use std::cell::RefCell;

use engine::session::{Session, SessionMode};
use engine::EngineEvent;
use pitch::NoteSmoother;
use score::{HandScope, Score, Section};

thread_local! {
    static SMOOTHER: RefCell<NoteSmoother> = RefCell::new(NoteSmoother::default());
}

/// Autocorrelation pitch detection returning Float64Array [hz, confidence, midi].
/// All zeros means no pitch (silence or an unanalyzable frame). Estimates are
/// temporally smoothed across calls by a thread-local NoteSmoother.
#[wasm_bindgen]
pub fn detect_pitch(samples: &[f32], sample_rate: f32) -> js_sys::Float64Array {
    let raw = pitch::estimate(samples, sample_rate);
    let note = SMOOTHER.with(|cell| {
        cell.borrow_mut()
            .push(raw.map(|e| pitch::midi_from_hz(e.hz)))
    });

    let arr = js_sys::Float64Array::new_with_length(3);
    if let (Some(estimate), Some(note)) = (raw, note) {
        arr.set_index(0, estimate.hz as f64);
        arr.set_index(1, estimate.confidence as f64);
        arr.set_index(2, note as f64);
    }
    arr
}

fn parse_scope(scope: &str) -> Result<HandScope, JsValue> {
    match scope {
        "both" => Ok(HandScope::Both),
        "treble" => Ok(HandScope::Treble),
        "bass" => Ok(HandScope::Bass),
        _ => Err(JsValue::from_str(&format!("Unknown hand scope: {}", scope))),
    }
}

fn parse_mode(mode: &str) -> Result<SessionMode, JsValue> {
    match mode {
        "playback" => Ok(SessionMode::Playback),
        "wait" => Ok(SessionMode::Wait),
        "timed" => Ok(SessionMode::Timed),
        _ => Err(JsValue::from_str(&format!("Unknown session mode: {}", mode))),
    }
}

/// One score-synchronized practice session, driven by the host's clock.
/// Every time-taking method receives `now` in seconds from the same
/// monotonic clock (e.g. performance.now() / 1000). After any call the host
/// should re-arm its single timeout from `next_deadline()`.
#[wasm_bindgen]
pub struct PracticeSession {
    inner: Session,
    on_note_on: Option<js_sys::Function>,
    on_note_off: Option<js_sys::Function>,
    on_progress: Option<js_sys::Function>,
    on_loop: Option<js_sys::Function>,
    on_playback_state: Option<js_sys::Function>,
    on_grade: Option<js_sys::Function>,
    on_section_complete: Option<js_sys::Function>,
}

#[wasm_bindgen]
impl PracticeSession {
    #[wasm_bindgen(constructor)]
    pub fn new(score_js: JsValue, scope: &str) -> Result<PracticeSession, JsValue> {
        let score: Score = serde_wasm_bindgen::from_value(score_js)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let inner = Session::new(score, parse_scope(scope)?)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(PracticeSession {
            inner,
            on_note_on: None,
            on_note_off: None,
            on_progress: None,
            on_loop: None,
            on_playback_state: None,
            on_grade: None,
            on_section_complete: None,
        })
    }

    // ---- callback registration ------------------------------------------

    pub fn set_note_callbacks(
        &mut self,
        on_note_on: js_sys::Function,
        on_note_off: js_sys::Function,
    ) {
        self.on_note_on = Some(on_note_on);
        self.on_note_off = Some(on_note_off);
    }

    pub fn set_progress_callback(&mut self, cb: js_sys::Function) {
        self.on_progress = Some(cb);
    }

    pub fn set_loop_callback(&mut self, cb: js_sys::Function) {
        self.on_loop = Some(cb);
    }

    pub fn set_playback_callback(&mut self, cb: js_sys::Function) {
        self.on_playback_state = Some(cb);
    }

    pub fn set_grade_callback(&mut self, cb: js_sys::Function) {
        self.on_grade = Some(cb);
    }

    pub fn set_section_complete_callback(&mut self, cb: js_sys::Function) {
        self.on_section_complete = Some(cb);
    }

    // ---- configuration ---------------------------------------------------

    pub fn set_mode(&mut self, now: f64, mode: &str) -> Result<(), JsValue> {
        let events = self.inner.set_mode(now, parse_mode(mode)?);
        self.dispatch(events);
        Ok(())
    }

    pub fn set_scope(&mut self, scope: &str) -> Result<(), JsValue> {
        self.inner.set_scope(parse_scope(scope)?);
        Ok(())
    }

    pub fn load_score(&mut self, now: f64, score_js: JsValue) -> Result<(), JsValue> {
        let score: Score = serde_wasm_bindgen::from_value(score_js)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let events = self
            .inner
            .load_score(now, score)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.dispatch(events);
        Ok(())
    }

    // ---- transport -------------------------------------------------------

    pub fn play(&mut self, now: f64) {
        let events = self.inner.play(now);
        self.dispatch(events);
    }

    pub fn pause(&mut self, now: f64) {
        let events = self.inner.pause(now);
        self.dispatch(events);
    }

    pub fn stop(&mut self, now: f64) {
        let events = self.inner.stop(now);
        self.dispatch(events);
    }

    pub fn seek(&mut self, now: f64, target: f64) -> Result<(), JsValue> {
        let events = self
            .inner
            .seek(now, target)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.dispatch(events);
        Ok(())
    }

    pub fn set_loop(&mut self, start: f64, end: f64) -> Result<(), JsValue> {
        self.inner
            .set_loop(start, end)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn clear_loop(&mut self) {
        self.inner.clear_loop();
    }

    pub fn next_step(&mut self) {
        let events = self.inner.next_step();
        self.dispatch(events);
    }

    pub fn practice_section(
        &mut self,
        now: f64,
        start_measure: usize,
        end_measure: usize,
    ) -> Result<(), JsValue> {
        let section = Section::new(start_measure, end_measure)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let events = self
            .inner
            .practice_section(now, &section)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.dispatch(events);
        Ok(())
    }

    pub fn start_timed(&mut self, now: f64, lead_in: f64) -> Result<(), JsValue> {
        let events = self
            .inner
            .start_timed(now, lead_in)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.dispatch(events);
        Ok(())
    }

    // ---- input -----------------------------------------------------------

    pub fn note_on(&mut self, pitch: u8, velocity: u8) {
        let events = self.inner.controller_note_on(pitch, velocity);
        self.dispatch(events);
    }

    pub fn note_off(&mut self, pitch: u8) {
        let events = self.inner.controller_note_off(pitch);
        self.dispatch(events);
    }

    pub fn feed_audio_frame(&mut self, samples: &[f32], sample_rate: f32) {
        let events = self.inner.feed_audio_frame(samples, sample_rate);
        self.dispatch(events);
    }

    // ---- evaluation & timers ---------------------------------------------

    /// UI polling tick, nominally 20-60 Hz. Also serves as the deferred
    /// timer fire in playback mode.
    pub fn tick(&mut self, now: f64) {
        let events = self.inner.tick(now);
        self.dispatch(events);
    }

    /// Absolute host time the single outstanding timeout should fire at,
    /// or NaN when nothing is pending.
    pub fn next_deadline(&self) -> f64 {
        self.inner.next_deadline().unwrap_or(f64::NAN)
    }

    // ---- read accessors ---------------------------------------------------

    pub fn is_playing(&self) -> bool {
        self.inner.is_playing()
    }

    pub fn is_end_reached(&self) -> bool {
        self.inner.is_end_reached()
    }

    pub fn current_timestamp(&self) -> f64 {
        self.inner.current_timestamp()
    }

    pub fn total_duration(&self) -> f64 {
        self.inner.total_duration()
    }

    pub fn notes_at_cursor(&self) -> Vec<u8> {
        self.inner.notes_at_cursor()
    }

    pub fn active_pitches(&self) -> Vec<u8> {
        self.inner.active_pitches().iter().copied().collect()
    }

    pub fn streak(&self) -> u32 {
        self.inner.streak()
    }

    pub fn max_streak(&self) -> u32 {
        self.inner.max_streak()
    }

    pub fn accuracy(&self) -> f64 {
        self.inner.accuracy_for_section()
    }

    pub fn points(&self) -> u32 {
        self.inner.points()
    }

    pub fn xp_earned(&self) -> u32 {
        self.inner.xp_earned()
    }

    pub fn current_grade(&self) -> JsValue {
        match self.inner.current_grade() {
            Some(result) => serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL),
            None => JsValue::NULL,
        }
    }

    pub fn error_stats(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(self.inner.error_stats())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    fn dispatch(&self, events: Vec<EngineEvent>) {
        for event in events {
            match event {
                EngineEvent::NoteOn { pitch, velocity } => {
                    if let Some(cb) = &self.on_note_on {
                        let _ = cb.call2(
                            &JsValue::NULL,
                            &JsValue::from(pitch),
                            &JsValue::from(velocity),
                        );
                    }
                }
                EngineEvent::NoteOff { pitch } => {
                    if let Some(cb) = &self.on_note_off {
                        let _ = cb.call1(&JsValue::NULL, &JsValue::from(pitch));
                    }
                }
                EngineEvent::Progress { current, total } => {
                    if let Some(cb) = &self.on_progress {
                        let _ = cb.call2(
                            &JsValue::NULL,
                            &JsValue::from(current),
                            &JsValue::from(total),
                        );
                    }
                }
                EngineEvent::Loop => {
                    if let Some(cb) = &self.on_loop {
                        let _ = cb.call0(&JsValue::NULL);
                    }
                }
                EngineEvent::PlaybackState { is_playing } => {
                    if let Some(cb) = &self.on_playback_state {
                        let _ = cb.call1(&JsValue::NULL, &JsValue::from(is_playing));
                    }
                }
                EngineEvent::Graded { result, streak } => {
                    if let Some(cb) = &self.on_grade {
                        let value = serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL);
                        let _ = cb.call2(&JsValue::NULL, &value, &JsValue::from(streak));
                    }
                }
                EngineEvent::SectionComplete => {
                    if let Some(cb) = &self.on_section_complete {
                        let _ = cb.call0(&JsValue::NULL);
                    }
                }
            }
        }
    }
}
