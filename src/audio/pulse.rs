use rayon::prelude::*;
use serde::Serialize;

use super::chroma::{compute_chromagram, ChromaOptions};

/// Onset envelope resolution.
pub const HOP_SECONDS: f64 = 0.01;
const WINDOW_SECONDS: f64 = 0.02;
/// Only the opening of a recording feeds tempo detection.
const MAX_ANALYSIS_SECONDS: f64 = 30.0;

/// Lag search bounds in hops: 200 down to 50 BPM.
const MIN_LAG: usize = 30;
const MAX_LAG: usize = 120;

/// Lags strictly inside this range (80-130 BPM) get a soft preference.
const PREFERRED_LAGS: (usize, usize) = (45, 75);
const PREFERRED_BIAS: f32 = 1.1;

/// A faster lag replaces the current one when it keeps this share of the
/// correlation; the stricter value applies above `FAST_BPM`.
const HARMONIC_SHARE: f32 = 0.75;
const FAST_HARMONIC_SHARE: f32 = 0.85;
const FAST_BPM: f64 = 150.0;
/// Each correction at least halves the lag, so 120 hops can shrink at most twice.
const MAX_CORRECTIONS: usize = 3;

const CANDIDATE_MULTIPLIERS: [f64; 5] = [2.0, 1.0, 0.5, 4.0, 0.25];
const MIN_BPM: f64 = 30.0;
const MAX_BPM: f64 = 200.0;

/// Triple meter must beat quadruple by this factor to be chosen.
const TRIPLE_METER_MARGIN: f32 = 1.4;

const DEFAULT_BPM: f64 = 120.0;

/// Tempo grids tried when snapping a lag-quantized BPM, coarsest first.
const SNAP_GRID: [f64; 2] = [5.0, 1.0];

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TempoCandidate {
    pub bpm: f64,
    pub score: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PulseResult {
    pub bpm: f64,
    /// Ordered by descending score.
    pub candidates: Vec<TempoCandidate>,
    pub beats_per_measure: usize,
    /// Seconds from the start of the signal to the first downbeat.
    pub downbeat_offset: f64,
}

impl PulseResult {
    fn fallback() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            candidates: vec![TempoCandidate {
                bpm: DEFAULT_BPM,
                score: 0.0,
            }],
            beats_per_measure: 4,
            downbeat_offset: 0.0,
        }
    }
}

/// Infer tempo, meter and downbeat phase from a mono signal.
///
/// Works on a half-wave rectified chroma flux envelope at 10 ms hops,
/// searched by autocorrelation. Short or silent input degrades to fewer
/// correlation terms, or to a 120 BPM 4/4 default when the envelope is flat.
pub fn identify_pulse(samples: &[f32], sample_rate: u32) -> PulseResult {
    let onsets = onset_envelope(samples, sample_rate);
    if onsets.iter().all(|&o| o <= 0.0) {
        log::debug!("Flat onset envelope ({} hops), using default pulse", onsets.len());
        return PulseResult::fallback();
    }

    let correlations: Vec<f32> = (0..=MAX_LAG).map(|lag| autocorrelation(&onsets, lag)).collect();

    let mut best_lag = MIN_LAG;
    let mut best_score = f32::NEG_INFINITY;
    for lag in MIN_LAG..=MAX_LAG {
        let score = correlations[lag] * tempo_bias(lag);
        if score > best_score {
            best_score = score;
            best_lag = lag;
        }
    }
    if best_score <= 0.0 {
        log::debug!("No correlation within {}-{} hops, using default pulse", MIN_LAG, MAX_LAG);
        return PulseResult::fallback();
    }
    log::debug!("Initial lag: {} hops ({:.1} BPM)", best_lag, lag_to_bpm(best_lag));

    let lag = correct_harmonics(&onsets, best_lag);
    let candidates = tempo_candidates(&onsets, lag);
    let bpm = candidates.first().map_or_else(|| snap_bpm(lag), |c| c.bpm);

    let beats_per_measure = detect_meter(&onsets, lag);
    let downbeat_offset = downbeat_phase(&onsets, lag * beats_per_measure) as f64 * HOP_SECONDS;

    PulseResult {
        bpm,
        candidates,
        beats_per_measure,
        downbeat_offset,
    }
}

/// Normalized spectral flux of the first 30 seconds, one value per hop.
pub fn onset_envelope(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let sr = sample_rate as f64;
    let window = (sr * WINDOW_SECONDS) as usize;
    let hop = ((sr * HOP_SECONDS) as usize).max(1);
    let limit = samples.len().min((sr * MAX_ANALYSIS_SECONDS) as usize);
    if window == 0 || limit < window {
        return Vec::new();
    }

    let options = ChromaOptions::range(36, 84).with_step(8).unsharpened();
    let starts: Vec<usize> = (0..=limit - window).step_by(hop).collect();
    let frames: Vec<[f32; 12]> = starts
        .par_iter()
        .map(|&start| compute_chromagram(&samples[start..start + window], sample_rate, &options))
        .collect();

    let mut flux = vec![0.0f32; frames.len()];
    for w in 1..frames.len() {
        flux[w] = frames[w]
            .iter()
            .zip(frames[w - 1].iter())
            .map(|(cur, prev)| (cur - prev).max(0.0))
            .sum();
    }

    let peak = flux.iter().copied().fold(0.0f32, f32::max);
    if peak > 0.0 {
        flux.iter_mut().for_each(|f| *f /= peak);
    }
    flux
}

pub fn lag_to_bpm(lag: usize) -> f64 {
    60.0 / (lag as f64 * HOP_SECONDS)
}

/// Roundest tempo the lag cannot tell apart from its exact BPM.
///
/// A lag of `n` hops covers every period within half a hop of `n`; the first
/// grid step whose nearest multiple falls inside that span wins.
pub fn snap_bpm(lag: usize) -> f64 {
    let exact = lag_to_bpm(lag);
    if lag == 0 {
        return exact;
    }
    let slowest = 60.0 / ((lag as f64 + 0.5) * HOP_SECONDS);
    let fastest = 60.0 / ((lag as f64 - 0.5) * HOP_SECONDS);

    SNAP_GRID
        .iter()
        .map(|grid| (exact / grid).round() * grid)
        .find(|snapped| (slowest..=fastest).contains(snapped))
        .unwrap_or(exact)
}

fn autocorrelation(onsets: &[f32], lag: usize) -> f32 {
    if lag >= onsets.len() {
        return 0.0;
    }
    onsets
        .iter()
        .zip(onsets[lag..].iter())
        .map(|(a, b)| a * b)
        .sum()
}

/// Autocorrelation divided by its number of overlapping terms.
fn mean_autocorrelation(onsets: &[f32], lag: usize) -> f32 {
    if lag >= onsets.len() {
        return 0.0;
    }
    autocorrelation(onsets, lag) / (onsets.len() - lag) as f32
}

fn tempo_bias(lag: usize) -> f32 {
    if lag > PREFERRED_LAGS.0 && lag < PREFERRED_LAGS.1 {
        PREFERRED_BIAS
    } else {
        1.0
    }
}

/// Walk down from a measure-level lag to the beat-level one.
fn correct_harmonics(onsets: &[f32], lag: usize) -> usize {
    let mut lag = lag;
    for _ in 0..MAX_CORRECTIONS {
        let reference = autocorrelation(onsets, lag);
        if reference <= 0.0 {
            break;
        }

        let faster = [2.0, 3.0, 4.0]
            .iter()
            .map(|divisor| (lag as f64 / divisor).round() as usize)
            .filter(|&candidate| candidate >= MIN_LAG)
            .find(|&candidate| {
                let share = if lag_to_bpm(candidate) > FAST_BPM {
                    FAST_HARMONIC_SHARE
                } else {
                    HARMONIC_SHARE
                };
                autocorrelation(onsets, candidate) >= reference * share
            });

        match faster {
            Some(candidate) => {
                log::debug!(
                    "Harmonic correction: lag {} -> {} ({:.1} BPM)",
                    lag,
                    candidate,
                    lag_to_bpm(candidate)
                );
                lag = candidate;
            }
            None => break,
        }
    }
    lag
}

/// The corrected lag's own tempo comes first, the alternates follow by
/// descending score.
fn tempo_candidates(onsets: &[f32], lag: usize) -> Vec<TempoCandidate> {
    let base = snap_bpm(lag);
    let mut seen: Vec<i64> = Vec::new();
    let mut anchor: Option<TempoCandidate> = None;
    let mut alternates: Vec<TempoCandidate> = Vec::new();

    for multiplier in CANDIDATE_MULTIPLIERS {
        let bpm = base * multiplier;
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            continue;
        }
        let rounded = bpm.round() as i64;
        if seen.contains(&rounded) {
            continue;
        }
        seen.push(rounded);

        let candidate_lag = ((lag as f64 / multiplier).round() as usize).max(1);
        let candidate = TempoCandidate {
            bpm,
            score: autocorrelation(onsets, candidate_lag) * tempo_bias(candidate_lag),
        };
        // Harmonic correction already preferred this lag over its multiples
        if candidate_lag == lag {
            anchor = Some(candidate);
        } else {
            alternates.push(candidate);
        }
    }

    alternates.sort_by(|a, b| b.score.total_cmp(&a.score));
    anchor.into_iter().chain(alternates).collect()
}

/// Mean correlation one measure of `beats` apart, allowing half a hop of
/// drift per beat.
fn measure_correlation(onsets: &[f32], lag: usize, beats: usize) -> f32 {
    let centre = lag * beats;
    let tolerance = beats / 2;
    (centre.saturating_sub(tolerance)..=centre + tolerance)
        .map(|l| mean_autocorrelation(onsets, l))
        .fold(0.0, f32::max)
}

fn detect_meter(onsets: &[f32], lag: usize) -> usize {
    let triple = measure_correlation(onsets, lag, 3);
    let quadruple = measure_correlation(onsets, lag, 4);
    log::debug!("Meter scores: 3 -> {:.4}, 4 -> {:.4}", triple, quadruple);
    if triple > quadruple * TRIPLE_METER_MARGIN {
        3
    } else {
        4
    }
}

/// Hop index within a measure where onset strength accumulates most.
fn downbeat_phase(onsets: &[f32], measure_hops: usize) -> usize {
    if measure_hops == 0 {
        return 0;
    }
    let mut phases = vec![0.0f32; measure_hops];
    for (i, &onset) in onsets.iter().enumerate() {
        phases[i % measure_hops] += onset;
    }

    let mut best = 0;
    let mut max = f32::NEG_INFINITY;
    for (phase, &score) in phases.iter().enumerate() {
        if score > max {
            max = score;
            best = phase;
        }
    }
    best
}
