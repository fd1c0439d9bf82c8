use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use chordline::AnalyzeOptions;

use crate::cli::OutputFormat;

const LOCAL_CONFIG: &str = "chordline.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalyzeOptions,
    #[serde(default)]
    pub form: FormConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct FormConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub heal: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub pretty: bool,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heal: true,
        }
    }
}

fn default_true() -> bool { true }

/// Explicit path first, then `./chordline.toml`, then
/// `~/.config/chordline/config.toml`, then the platform config dir.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("chordline").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("chordline").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn full_config() {
        let file = write_config(
            r#"
            [analysis]
            bpm = 96.0
            start_time = 12.5

            [form]
            heal = false

            [output]
            format = "json"
            pretty = true
            "#,
        );
        let cfg = load_config(file.path()).unwrap();

        assert_eq!(cfg.analysis.bpm, Some(96.0));
        assert_eq!(cfg.analysis.start_time, Some(12.5));
        assert_eq!(cfg.analysis.end_time, None);
        assert!(cfg.form.enabled);
        assert!(!cfg.form.heal);
        assert_eq!(cfg.output.format, OutputFormat::Json);
        assert!(cfg.output.pretty);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let file = write_config("");
        let cfg = load_config(file.path()).unwrap();

        assert_eq!(cfg.analysis, AnalyzeOptions::default());
        assert!(cfg.form.enabled && cfg.form.heal);
        assert_eq!(cfg.output.format, OutputFormat::Text);
        assert!(!cfg.output.pretty);
    }

    #[test]
    fn malformed_config_is_an_error() {
        let file = write_config("[output]\nformat = \"xml\"\n");
        assert!(load_config(file.path()).is_err());

        let file = write_config("this is not toml");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn missing_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn explicit_path_wins() {
        let path = Path::new("/somewhere/custom.toml");
        assert_eq!(find_config(Some(path)), Some(path.to_path_buf()));
    }
}
