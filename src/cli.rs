use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "chordline", about = "Chord, tempo and song-form analysis of audio files")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Tempo in BPM, replacing the detected one
    #[arg(long)]
    pub bpm: Option<f64>,

    /// Seconds to skip before analysis (before downbeat alignment)
    #[arg(long)]
    pub start: Option<f64>,

    /// Seconds at which analysis stops
    #[arg(long)]
    pub end: Option<f64>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Skip song-form extraction
    #[arg(long)]
    pub no_form: bool,

    /// Match repeats exactly, without consensus healing
    #[arg(long)]
    pub no_heal: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Config file (defaults to ./chordline.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
