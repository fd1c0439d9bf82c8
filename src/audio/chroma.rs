use std::f64::consts::PI;

use super::pitch::{pitch_table, MAX_MIDI, MIN_MIDI};

/// Energy per pitch class, C = 0 .. B = 11.
pub type Chromagram = [f32; 12];

/// Highest MIDI note treated as a fundamental during overtone suppression.
const MAX_FUNDAMENTAL: u8 = 72;

/// (semitone offset, share of the fundamental's energy) for harmonics 2..=5.
const OVERTONES: [(u8, f64); 4] = [(12, 0.5), (19, 0.3), (24, 0.2), (28, 0.15)];

const NUM_PITCHES: usize = (MAX_MIDI - MIN_MIDI + 1) as usize;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChromaOptions {
    pub min_midi: u8,
    pub max_midi: u8,
    /// Decimation stride of the per-pitch filter.
    pub step: usize,
    pub skip_sharpening: bool,
}

impl Default for ChromaOptions {
    fn default() -> Self {
        Self {
            min_midi: MIN_MIDI,
            max_midi: MAX_MIDI,
            step: 4,
            skip_sharpening: false,
        }
    }
}

impl ChromaOptions {
    /// Full-resolution pass restricted to a MIDI range.
    pub fn range(min_midi: u8, max_midi: u8) -> Self {
        Self {
            min_midi,
            max_midi,
            ..Self::default()
        }
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    pub fn unsharpened(mut self) -> Self {
        self.skip_sharpening = true;
        self
    }
}

/// Estimate pitch-class energy for a window of samples.
///
/// Each semitone of the pitch table inside the requested range is probed
/// with a single-bin DFT at its exact frequency, Hann-weighted over the whole
/// window and sampled every `step` samples. Raw semitone energies then go
/// through overtone suppression and register weighting before being folded
/// into 12 bins. Unless sharpening is skipped, only bins that beat both
/// circular neighbours survive and the result is scaled so the peak is 1.
pub fn compute_chromagram(window: &[f32], sample_rate: u32, options: &ChromaOptions) -> Chromagram {
    let mut chroma = [0.0f32; 12];
    if window.is_empty() || sample_rate == 0 {
        return chroma;
    }

    let len = window.len();
    let step = options.step.max(1);

    // Window once, shared by every pitch filter
    let taps: Vec<(f64, f64)> = (0..len)
        .step_by(step)
        .map(|i| (i as f64, window[i] as f64 * hann(i, len)))
        .collect();

    let mut energy = [0.0f64; NUM_PITCHES];
    for pitch in pitch_table() {
        if pitch.midi < options.min_midi || pitch.midi > options.max_midi {
            continue;
        }
        let omega = 2.0 * PI * pitch.freq / sample_rate as f64;
        energy[table_index(pitch.midi)] = single_bin_energy(&taps, omega);
    }

    suppress_overtones(&mut energy);

    let mut folded = [0.0f64; 12];
    for pitch in pitch_table() {
        folded[pitch.pitch_class] += energy[table_index(pitch.midi)] * register_weight(pitch.midi);
    }

    if !options.skip_sharpening {
        folded = sharpen(&folded);
    }

    for (out, value) in chroma.iter_mut().zip(folded.iter()) {
        *out = *value as f32;
    }
    chroma
}

/// Sum of all bins.
pub fn total_energy(chroma: &Chromagram) -> f32 {
    chroma.iter().sum()
}

/// Index of the strongest bin, `None` when every bin is zero.
/// Ties keep the lowest pitch class.
pub fn strongest_bin(chroma: &Chromagram) -> Option<usize> {
    let mut best = None;
    let mut max = 0.0f32;
    for (i, &value) in chroma.iter().enumerate() {
        if value > max {
            max = value;
            best = Some(i);
        }
    }
    best
}

fn table_index(midi: u8) -> usize {
    (midi - MIN_MIDI) as usize
}

fn single_bin_energy(taps: &[(f64, f64)], omega: f64) -> f64 {
    let (mut real, mut imag) = (0.0f64, 0.0f64);
    for &(i, x) in taps {
        let (sin, cos) = (i * omega).sin_cos();
        real += x * cos;
        imag += x * sin;
    }
    real * real + imag * imag
}

/// Remove the energy natural overtones of each low/mid fundamental would
/// otherwise leave on their harmonic positions.
fn suppress_overtones(energy: &mut [f64; NUM_PITCHES]) {
    let raw = *energy;
    for midi in MIN_MIDI..=MAX_FUNDAMENTAL {
        let fundamental = raw[table_index(midi)];
        if fundamental <= 0.0 {
            continue;
        }
        for (offset, share) in OVERTONES {
            let harmonic = midi + offset;
            if harmonic > MAX_MIDI {
                continue;
            }
            let slot = &mut energy[table_index(harmonic)];
            *slot = (*slot - fundamental * share).max(0.0);
        }
    }
}

/// Emphasis on the bass and low-mid register where roots live.
fn register_weight(midi: u8) -> f64 {
    match midi {
        m if m < 36 => 6.0,
        m if m < 48 => 3.5,
        m if m < 60 => 2.0,
        m if m > 80 => 0.05,
        _ => 1.0,
    }
}

fn sharpen(bins: &[f64; 12]) -> [f64; 12] {
    let mut sharpened = [0.0f64; 12];
    for i in 0..12 {
        let prev = bins[(i + 11) % 12];
        let next = bins[(i + 1) % 12];
        if bins[i] > prev && bins[i] > next {
            sharpened[i] = bins[i];
        }
    }

    let max = sharpened.iter().copied().fold(0.0f64, f64::max);
    if max > 0.0 {
        sharpened.iter_mut().for_each(|x| *x /= max);
    }
    sharpened
}

fn hann(i: usize, size: usize) -> f64 {
    if size < 2 {
        return 1.0;
    }
    0.5 * (1.0 - (2.0 * PI * i as f64 / (size - 1) as f64).cos())
}
