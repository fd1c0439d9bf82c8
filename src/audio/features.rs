use serde::{Deserialize, Serialize};

use super::key::KeyEstimate;
use super::pulse::TempoCandidate;

/// Decoded mono signal handed to the analysis core.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Caller overrides for a single analysis run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
pub struct AnalyzeOptions {
    /// Replaces the detected tempo.
    #[serde(default)]
    pub bpm: Option<f64>,
    /// Seconds, before downbeat alignment.
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
}

/// Chord heard in one beat window (pass 3 output).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BeatRecord {
    pub beat: usize,
    pub chord: String,
    /// RMS of the window.
    pub energy: f32,
}

/// A consensus chord change (pass 4 output).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SmoothedEvent {
    pub beat: usize,
    /// Seconds from the aligned analysis start.
    pub time: f64,
    pub chord: String,
    pub bpm: f64,
    /// Mean RMS over the voting neighbourhood.
    pub energy: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Analysis {
    pub results: Vec<SmoothedEvent>,
    pub bpm: f64,
    pub candidates: Vec<TempoCandidate>,
    pub beats_per_measure: usize,
    pub downbeat_offset: f64,
    pub key: KeyEstimate,
    pub beats: Vec<BeatRecord>,
}
