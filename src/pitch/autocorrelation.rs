use serde::Serialize;

#[derive(Serialize, Clone, Copy, Debug)]
pub struct PitchEstimate {
    pub hz: f32,
    /// Autocorrelation peak normalized by zero-lag energy, in [0, 1].
    pub confidence: f32,
    /// RMS level of the analyzed frame, for input-level display.
    pub rms: f32,
}

/// Below this RMS the frame is treated as silence.
const NOISE_GATE_RMS: f32 = 0.01;
/// Magnitude threshold used to trim leading/trailing low-level samples
/// before correlating, to reduce edge artifacts.
const TRIM_THRESHOLD: f32 = 0.2;

/// Estimate the fundamental frequency of a time-domain frame using
/// unnormalized autocorrelation. Returns None for silence or an
/// unanalyzable frame; never errors.
pub fn estimate(samples: &[f32], sample_rate: f32) -> Option<PitchEstimate> {
    if samples.len() < 4 || sample_rate <= 0.0 {
        return None;
    }

    // Step 1: RMS noise gate
    let size = samples.len();
    let mut energy = 0.0f32;
    for &s in samples {
        energy += s * s;
    }
    let rms = (energy / size as f32).sqrt();
    if rms < NOISE_GATE_RMS {
        return None;
    }

    // Step 2: trim to the span between the first and last loud samples
    let mut r1 = 0usize;
    let mut r2 = size - 1;
    for i in 0..size / 2 {
        if samples[i].abs() < TRIM_THRESHOLD {
            r1 = i;
            break;
        }
    }
    for i in 1..size / 2 {
        if samples[size - i].abs() < TRIM_THRESHOLD {
            r2 = size - i;
            break;
        }
    }
    if r2 <= r1 + 2 {
        return None;
    }
    let buf = &samples[r1..r2];
    let len = buf.len();

    // Step 3: unnormalized autocorrelation for all non-negative lags
    let mut c = vec![0.0f32; len];
    for lag in 0..len {
        let mut sum = 0.0f32;
        for j in 0..len - lag {
            sum += buf[j] * buf[j + lag];
        }
        c[lag] = sum;
    }

    // Step 4: skip the initial decreasing region around the zero-lag peak,
    // then take the global maximum beyond it
    let mut d = 0usize;
    while d + 1 < len && c[d] > c[d + 1] {
        d += 1;
    }
    if d + 1 >= len {
        return None;
    }
    let mut max_val = f32::MIN;
    let mut max_pos = d;
    for (i, &v) in c.iter().enumerate().skip(d) {
        if v > max_val {
            max_val = v;
            max_pos = i;
        }
    }
    if max_pos == 0 || max_pos + 1 >= len {
        return None;
    }

    // Step 5: parabolic interpolation over the three values around the peak
    let x1 = c[max_pos - 1];
    let x2 = c[max_pos];
    let x3 = c[max_pos + 1];
    let a = (x1 + x3 - 2.0 * x2) / 2.0;
    let b = (x3 - x1) / 2.0;
    let t0 = if a.abs() > 1e-10 {
        max_pos as f32 - b / (2.0 * a)
    } else {
        max_pos as f32
    };
    if t0 <= 0.0 {
        return None;
    }

    let confidence = if c[0] > 0.0 {
        (max_val / c[0]).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(PitchEstimate {
        hz: sample_rate / t0,
        confidence,
        rms,
    })
}

/// Nearest MIDI note number for a frequency (A4 = 440 Hz = 69).
pub fn midi_from_hz(hz: f32) -> i32 {
    (12.0 * (hz / 440.0).log2()).round() as i32 + 69
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn generate_sine(freq: f32, sample_rate: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_a440_round_trip() {
        let samples = generate_sine(440.0, 44100.0, 2048);
        let result = estimate(&samples, 44100.0).expect("should detect pitch");
        let note = midi_from_hz(result.hz);
        assert_eq!(note, 69, "expected A4, got MIDI {} ({} Hz)", note, result.hz);
        assert!(
            result.confidence > 0.5,
            "periodic signal should correlate strongly: {}",
            result.confidence
        );
    }

    #[test]
    fn test_c4_within_semitone() {
        // C4 = 261.63 Hz
        let samples = generate_sine(261.63, 44100.0, 2048);
        let result = estimate(&samples, 44100.0).expect("should detect pitch");
        assert_eq!(midi_from_hz(result.hz), 60);
    }

    #[test]
    fn test_low_level_noise_gated() {
        // Deterministic pseudo-noise well below the RMS gate
        let samples: Vec<f32> = (0..2048)
            .map(|i| 0.004 * ((i as f32 * 12.9898).sin() * 43758.547).fract())
            .collect();
        assert!(estimate(&samples, 44100.0).is_none());
    }

    #[test]
    fn test_silence_and_empty() {
        assert!(estimate(&[], 44100.0).is_none());
        assert!(estimate(&vec![0.0; 2048], 44100.0).is_none());
    }

    #[test]
    fn test_rms_reported() {
        let samples = generate_sine(440.0, 44100.0, 2048);
        let result = estimate(&samples, 44100.0).unwrap();
        // RMS of a 0.5-amplitude sine is 0.5 / sqrt(2) ~= 0.354
        assert!((result.rms - 0.354).abs() < 0.02, "rms {}", result.rms);
    }

    #[test]
    fn test_midi_from_hz_octaves() {
        assert_eq!(midi_from_hz(220.0), 57);
        assert_eq!(midi_from_hz(880.0), 81);
        // A quarter-tone sharp of A4 still rounds to 69
        assert_eq!(midi_from_hz(446.0), 69);
    }
}
