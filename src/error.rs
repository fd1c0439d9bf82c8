use thiserror::Error;

/// Errors surfaced by the analysis core.
///
/// Numeric trouble (silence, very short signals, out-of-table pitch ranges)
/// never ends up here; those degrade to `Rest` labels and default tempo
/// estimates instead. Only malformed inputs are rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("sample rate must be greater than zero")]
    EmptySampleRate,

    #[error("tempo override must be a finite, positive BPM (got {0})")]
    InvalidTempo(f64),

    #[error("invalid analysis range: start {start:.3}s, end {end:.3}s")]
    InvalidRange { start: f64, end: f64 },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
