use rayon::prelude::*;

use super::chord::{identify_chord, ChordOptions};
use super::chroma::{compute_chromagram, strongest_bin, ChromaOptions};
use super::features::{Analysis, AnalyzeOptions, AudioData, BeatRecord, SmoothedEvent};
use super::key::{identify_global_key, KeyEstimate};
use super::pulse::identify_pulse;
use crate::error::{AnalysisError, Result};

/// Upper bound on the number of points fed to the global key pass.
const KEY_PASS_MAX_POINTS: usize = 1_000_000;
const KEY_PASS_MIN_MIDI: u8 = 32;
const KEY_PASS_MAX_MIDI: u8 = 76;

/// Bass register probed for inversions.
const BASS_MIN_MIDI: u8 = 24;
const BASS_MAX_MIDI: u8 = 42;

/// Beats analyzed between two progress reports.
const BEAT_CHUNK: usize = 32;

const PROGRESS_PULSE: f32 = 10.0;
const PROGRESS_KEY: f32 = 15.0;
const PROGRESS_DONE: f32 = 100.0;

/// Run the full pipeline without progress reporting.
pub fn analyze(audio: &AudioData, options: &AnalyzeOptions) -> Result<Analysis> {
    analyze_with_progress(audio, options, |_| {})
}

/// Run the full pipeline, reporting coarse progress (0-100) to `on_progress`.
///
/// The callback runs on the calling thread between stages and is purely
/// observational.
pub fn analyze_with_progress<F>(
    audio: &AudioData,
    options: &AnalyzeOptions,
    mut on_progress: F,
) -> Result<Analysis>
where
    F: FnMut(f32),
{
    let sr = audio.sample_rate;
    if sr == 0 {
        return Err(AnalysisError::EmptySampleRate);
    }
    if let Some(bpm) = options.bpm {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(AnalysisError::InvalidTempo(bpm));
        }
    }

    log::info!("Pass 1: Pulse detection...");
    let pulse = identify_pulse(&audio.samples, sr);
    let bpm = options.bpm.unwrap_or(pulse.bpm);
    log::info!(
        "Pulse: {:.1} BPM (detected {:.1}), {}/4, downbeat at {:.3}s",
        bpm,
        pulse.bpm,
        pulse.beats_per_measure,
        pulse.downbeat_offset
    );
    on_progress(PROGRESS_PULSE);

    let signal = aligned_window(&audio.samples, sr, options, pulse.downbeat_offset)?;
    if signal.is_empty() {
        log::warn!("Analysis window is empty after trimming and downbeat alignment");
    }

    log::info!("Pass 2: Global key...");
    let key = pass2_global_key(signal, sr);
    log::info!("Global key: {}", key);
    on_progress(PROGRESS_KEY);

    let seconds_per_beat = 60.0 / bpm;
    let beats = pass3_beats(signal, sr, seconds_per_beat, &key, &mut on_progress);

    log::info!("Pass 4: Consensus smoothing ({} beats)...", beats.len());
    let results = pass4_smooth(&beats, seconds_per_beat, bpm);
    log::info!("{} chord changes", results.len());

    Ok(Analysis {
        results,
        bpm,
        candidates: pulse.candidates,
        beats_per_measure: pulse.beats_per_measure,
        downbeat_offset: pulse.downbeat_offset,
        key,
        beats,
    })
}

/// Slice of the signal between the downbeat-aligned start and the end time.
fn aligned_window<'a>(
    samples: &'a [f32],
    sample_rate: u32,
    options: &AnalyzeOptions,
    downbeat_offset: f64,
) -> Result<&'a [f32]> {
    let start_time = options.start_time.unwrap_or(0.0);
    if !start_time.is_finite() || start_time < 0.0 {
        return Err(AnalysisError::InvalidRange {
            start: start_time,
            end: options.end_time.unwrap_or(f64::NAN),
        });
    }
    if let Some(end_time) = options.end_time {
        if !end_time.is_finite() || end_time <= start_time {
            return Err(AnalysisError::InvalidRange {
                start: start_time,
                end: end_time,
            });
        }
    }

    let sr = sample_rate as f64;
    let offset = downbeat_offset.max(0.0);
    let start = (((start_time + offset) * sr) as usize).min(samples.len());
    let end = options
        .end_time
        .map_or(samples.len(), |t| ((t * sr) as usize).min(samples.len()));

    if start >= end {
        return Ok(&[]);
    }
    Ok(&samples[start..end])
}

fn pass2_global_key(signal: &[f32], sample_rate: u32) -> KeyEstimate {
    let stride = signal.len().div_ceil(KEY_PASS_MAX_POINTS).max(1);
    let sparse: Vec<f32> = signal.iter().step_by(stride).copied().collect();
    let sparse_rate = (sample_rate as usize / stride).max(1) as u32;

    let options = ChromaOptions::range(KEY_PASS_MIN_MIDI, KEY_PASS_MAX_MIDI).with_step(4);
    let chroma = compute_chromagram(&sparse, sparse_rate, &options);
    identify_global_key(&chroma)
}

fn pass3_beats<F>(
    signal: &[f32],
    sample_rate: u32,
    seconds_per_beat: f64,
    key: &KeyEstimate,
    on_progress: &mut F,
) -> Vec<BeatRecord>
where
    F: FnMut(f32),
{
    let samples_per_beat = (seconds_per_beat * sample_rate as f64) as usize;
    let total = if samples_per_beat == 0 {
        0
    } else {
        signal.len() / samples_per_beat
    };

    log::info!("Pass 3: Per-beat chords ({} beats)...", total);

    let mut beats = Vec::with_capacity(total);
    let mut chunk_start = 0;
    while chunk_start < total {
        let chunk_end = (chunk_start + BEAT_CHUNK).min(total);
        let chunk: Vec<BeatRecord> = (chunk_start..chunk_end)
            .into_par_iter()
            .map(|beat| {
                let start = beat * samples_per_beat;
                analyze_beat(beat, &signal[start..start + samples_per_beat], sample_rate, key)
            })
            .collect();
        beats.extend(chunk);

        on_progress(PROGRESS_KEY + (PROGRESS_DONE - PROGRESS_KEY) * chunk_end as f32 / total as f32);
        chunk_start = chunk_end;
    }

    if total == 0 {
        on_progress(PROGRESS_DONE);
    }
    beats
}

fn analyze_beat(beat: usize, window: &[f32], sample_rate: u32, key: &KeyEstimate) -> BeatRecord {
    let chroma = compute_chromagram(window, sample_rate, &ChromaOptions::default());
    let bass = compute_chromagram(window, sample_rate, &ChromaOptions::range(BASS_MIN_MIDI, BASS_MAX_MIDI));

    let options = ChordOptions {
        key_bias: Some(*key),
        bass_note: strongest_bin(&bass),
    };

    BeatRecord {
        beat,
        chord: identify_chord(&chroma, &options),
        energy: rms(window),
    }
}

/// Majority vote over each beat and its neighbours, emitting only changes.
fn pass4_smooth(beats: &[BeatRecord], seconds_per_beat: f64, bpm: f64) -> Vec<SmoothedEvent> {
    let mut events: Vec<SmoothedEvent> = Vec::new();

    for i in 0..beats.len() {
        let neighbourhood = &beats[i.saturating_sub(1)..(i + 2).min(beats.len())];
        let consensus = majority_chord(neighbourhood);

        if events.last().map_or(true, |last| last.chord != consensus) {
            let energy = neighbourhood.iter().map(|b| b.energy).sum::<f32>() / neighbourhood.len() as f32;
            events.push(SmoothedEvent {
                beat: i,
                time: i as f64 * seconds_per_beat,
                chord: consensus.to_string(),
                bpm,
                energy,
            });
        }
    }

    events
}

/// Most frequent label; ties go to the label seen first.
fn majority_chord(beats: &[BeatRecord]) -> &str {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for beat in beats {
        match counts.iter_mut().find(|(chord, _)| *chord == beat.chord) {
            Some((_, count)) => *count += 1,
            None => counts.push((beat.chord.as_str(), 1)),
        }
    }

    let mut best = ("", 0);
    for &(chord, count) in &counts {
        if count > best.1 {
            best = (chord, count);
        }
    }
    best.0
}

fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    (window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(beat: usize, chord: &str, energy: f32) -> BeatRecord {
        BeatRecord {
            beat,
            chord: chord.to_string(),
            energy,
        }
    }

    fn records(chords: &[&str]) -> Vec<BeatRecord> {
        chords.iter().enumerate().map(|(i, c)| record(i, c, 0.5)).collect()
    }

    #[test]
    fn single_beat_jitter_is_smoothed_away() {
        let beats = records(&["C", "C", "C", "Db", "C", "C", "G", "G", "G"]);
        let events = pass4_smooth(&beats, 0.5, 120.0);

        let chords: Vec<&str> = events.iter().map(|e| e.chord.as_str()).collect();
        assert_eq!(chords, vec!["C", "G"]);
        assert_eq!(events[1].beat, 6);
        assert_relative_eq!(events[1].time, 3.0);
        assert_relative_eq!(events[1].bpm, 120.0);
    }

    #[test]
    fn ties_go_to_first_seen_label() {
        // At beat 0 the window is [C, F]; at beat 1 it is [C, F, G]
        let beats = records(&["C", "F", "G"]);
        assert_eq!(majority_chord(&beats[0..2]), "C");
        assert_eq!(majority_chord(&beats), "C");
    }

    #[test]
    fn event_energy_averages_the_neighbourhood() {
        let beats = vec![record(0, "C", 0.2), record(1, "C", 0.4), record(2, "C", 0.9)];
        let events = pass4_smooth(&beats, 1.0, 60.0);
        assert_eq!(events.len(), 1);
        assert_relative_eq!(events[0].energy, 0.3);
    }

    #[test]
    fn empty_beats_yield_no_events() {
        assert!(pass4_smooth(&[], 0.5, 120.0).is_empty());
    }

    #[test]
    fn rms_of_constant_signal() {
        assert_relative_eq!(rms(&[0.5, -0.5, 0.5, -0.5]), 0.5);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn window_respects_start_end_and_offset() {
        let samples: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        let options = AnalyzeOptions {
            bpm: None,
            start_time: Some(1.0),
            end_time: Some(8.0),
        };
        let window = aligned_window(&samples, 100, &options, 0.5).unwrap();
        assert_eq!(window.first(), Some(&150.0));
        assert_eq!(window.len(), 650);
    }

    #[test]
    fn window_past_the_end_is_empty() {
        // 10 s of audio at 10 Hz
        let samples = vec![0.0f32; 100];
        let options = AnalyzeOptions {
            start_time: Some(15.0),
            ..AnalyzeOptions::default()
        };
        assert!(aligned_window(&samples, 10, &options, 0.0).unwrap().is_empty());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let options = AnalyzeOptions {
            bpm: None,
            start_time: Some(4.0),
            end_time: Some(2.0),
        };
        let err = aligned_window(&[0.0; 10], 10, &options, 0.0).unwrap_err();
        assert_eq!(err, AnalysisError::InvalidRange { start: 4.0, end: 2.0 });
    }

    #[test]
    fn bad_inputs_are_rejected() {
        let audio = AudioData::new(vec![0.0; 100], 0);
        assert_eq!(
            analyze(&audio, &AnalyzeOptions::default()).unwrap_err(),
            AnalysisError::EmptySampleRate
        );

        let audio = AudioData::new(vec![0.0; 100], 44100);
        let options = AnalyzeOptions {
            bpm: Some(-10.0),
            ..AnalyzeOptions::default()
        };
        assert_eq!(analyze(&audio, &options).unwrap_err(), AnalysisError::InvalidTempo(-10.0));
    }

    #[test]
    fn silence_is_a_rest_and_progress_completes() {
        let audio = AudioData::new(vec![0.0; 44100], 44100);
        let options = AnalyzeOptions {
            bpm: Some(60.0),
            ..AnalyzeOptions::default()
        };

        let mut reports = Vec::new();
        let analysis = analyze_with_progress(&audio, &options, |p| reports.push(p)).unwrap();

        assert_eq!(analysis.results.len(), 1);
        assert_eq!(analysis.results[0].chord, "Rest");
        assert_eq!(analysis.beats.len(), 1);
        assert_relative_eq!(analysis.bpm, 60.0);

        assert!(reports.windows(2).all(|w| w[0] <= w[1]));
        assert_relative_eq!(*reports.first().unwrap(), PROGRESS_PULSE);
        assert_relative_eq!(*reports.last().unwrap(), PROGRESS_DONE);
    }
}
