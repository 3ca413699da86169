/// Lowest pitch accepted from the estimator (A0).
pub const MIDI_MIN: i32 = 21;
/// Highest pitch accepted from the estimator (C8).
pub const MIDI_MAX: i32 = 108;

/// Temporal smoothing for raw per-frame pitch estimates.
///
/// A note is accepted only after the same estimate repeats for a full
/// history window, so single-frame glitches never reach the matcher. A full
/// window of silence releases the note; mixed windows leave the previous
/// decision in place, which gives a fast, stable release on decay tails.
#[derive(Debug, Clone)]
pub struct NoteSmoother {
    history: Vec<Option<u8>>,
    capacity: usize,
    current: Option<u8>,
}

impl NoteSmoother {
    pub const DEFAULT_WINDOW: usize = 5;

    pub fn new(window: usize) -> Self {
        NoteSmoother {
            history: Vec::with_capacity(window.max(1)),
            capacity: window.max(1),
            current: None,
        }
    }

    /// Feed one frame's estimate (fractional hz already rounded to MIDI, or
    /// None for silence). Returns the smoothed currently-sounding note.
    pub fn push(&mut self, raw: Option<i32>) -> Option<u8> {
        let note = raw.and_then(|n| {
            if (MIDI_MIN..=MIDI_MAX).contains(&n) {
                Some(n as u8)
            } else {
                None
            }
        });

        if self.history.len() == self.capacity {
            self.history.remove(0);
        }
        self.history.push(note);

        if self.history.len() == self.capacity {
            let candidate = self.history[0];
            if self.history.iter().all(|&n| n == candidate) {
                self.current = candidate;
            }
        }
        self.current
    }

    pub fn current(&self) -> Option<u8> {
        self.current
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.current = None;
    }
}

impl Default for NoteSmoother {
    fn default() -> Self {
        NoteSmoother::new(Self::DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_full_window() {
        let mut s = NoteSmoother::new(3);
        assert_eq!(s.push(Some(60)), None);
        assert_eq!(s.push(Some(60)), None);
        assert_eq!(s.push(Some(60)), Some(60));
    }

    #[test]
    fn test_glitch_does_not_switch_note() {
        let mut s = NoteSmoother::new(3);
        for _ in 0..3 {
            s.push(Some(60));
        }
        assert_eq!(s.push(Some(61)), Some(60), "one-frame glitch ignored");
        assert_eq!(s.push(Some(60)), Some(60));
    }

    #[test]
    fn test_silence_releases() {
        let mut s = NoteSmoother::new(3);
        for _ in 0..3 {
            s.push(Some(60));
        }
        s.push(None);
        s.push(None);
        assert_eq!(s.push(None), None, "full silent window releases");
    }

    #[test]
    fn test_out_of_range_treated_as_silence() {
        let mut s = NoteSmoother::new(2);
        s.push(Some(10));
        assert_eq!(s.push(Some(10)), None);
        s.push(Some(120));
        assert_eq!(s.push(Some(120)), None);
    }

    #[test]
    fn test_note_change_after_full_window() {
        let mut s = NoteSmoother::new(3);
        for _ in 0..3 {
            s.push(Some(60));
        }
        s.push(Some(64));
        s.push(Some(64));
        assert_eq!(s.push(Some(64)), Some(64));
    }
}
