use std::collections::BTreeSet;

/// Where an active pitch came from. Each source owns its own sub-set; the
/// merged view is recomputed, never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Controller,
    Estimator,
}

/// The set of pitches currently "on", merged from the keyboard controller
/// and the pitch estimator.
#[derive(Debug, Clone, Default)]
pub struct ActivePitchSet {
    controller: BTreeSet<u8>,
    estimator: BTreeSet<u8>,
    merged: BTreeSet<u8>,
}

fn merge(controller: &BTreeSet<u8>, estimator: &BTreeSet<u8>) -> BTreeSet<u8> {
    controller.union(estimator).copied().collect()
}

impl ActivePitchSet {
    pub fn new() -> Self {
        ActivePitchSet::default()
    }

    /// Attack from a source. Returns true if the pitch was newly activated
    /// in the merged view (callers gate live-monitor NoteOn on this).
    pub fn note_on(&mut self, source: InputSource, pitch: u8) -> bool {
        let was_active = self.merged.contains(&pitch);
        match source {
            InputSource::Controller => self.controller.insert(pitch),
            InputSource::Estimator => self.estimator.insert(pitch),
        };
        self.merged = merge(&self.controller, &self.estimator);
        !was_active
    }

    /// Release from a source. Returns true if the pitch left the merged view
    /// (it may still be held by the other source).
    pub fn note_off(&mut self, source: InputSource, pitch: u8) -> bool {
        match source {
            InputSource::Controller => self.controller.remove(&pitch),
            InputSource::Estimator => self.estimator.remove(&pitch),
        };
        self.merged = merge(&self.controller, &self.estimator);
        !self.merged.contains(&pitch)
    }

    /// The estimator sounds at most one note at a time; a new accepted note
    /// replaces the previous one. Returns (released, attacked) in merged
    /// terms for live monitoring.
    pub fn set_estimator_note(&mut self, note: Option<u8>) -> (Option<u8>, Option<u8>) {
        let previous = self.estimator.iter().next().copied();
        if previous == note {
            return (None, None);
        }
        self.estimator.clear();
        if let Some(n) = note {
            self.estimator.insert(n);
        }
        self.merged = merge(&self.controller, &self.estimator);

        let released = previous.filter(|p| !self.merged.contains(p));
        let attacked = note.filter(|n| Some(*n) != previous);
        (released, attacked)
    }

    pub fn merged(&self) -> &BTreeSet<u8> {
        &self.merged
    }

    pub fn contains(&self, pitch: u8) -> bool {
        self.merged.contains(&pitch)
    }

    pub fn clear(&mut self) {
        self.controller.clear();
        self.estimator.clear();
        self.merged.clear();
    }
}
