//! Chord, tempo and song-form analysis of decoded audio.
//!
//! [`analyze`] turns a mono signal into tempo, meter, key and a smoothed
//! chord timeline; [`extract_form`] folds the per-beat chords into
//! labelled, repeating sections.

pub mod audio;
pub mod error;
pub mod form;

pub use audio::analysis::{analyze, analyze_with_progress};
pub use audio::chord::{identify_chord, ChordOptions, REST};
pub use audio::chroma::{compute_chromagram, ChromaOptions, Chromagram};
pub use audio::features::{Analysis, AnalyzeOptions, AudioData, BeatRecord, SmoothedEvent};
pub use audio::key::{identify_global_key, KeyEstimate, KeyMode};
pub use audio::pulse::{identify_pulse, PulseResult, TempoCandidate};
pub use error::{AnalysisError, Result};
pub use form::{extract_form, extract_form_with, FormOptions, Section};
