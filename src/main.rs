mod cli;
mod config;
mod decode;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use chordline::{Analysis, AnalyzeOptions, FormOptions, Section};
use cli::{Cli, OutputFormat};

#[derive(Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    analysis: &'a Analysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    sections: Option<&'a [Section]>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    if let Some(path) = config::find_config(cli.config.as_deref()) {
        match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                // Merge: config values apply only when CLI is at its default
                if cli.bpm.is_none() { cli.bpm = cfg.analysis.bpm; }
                if cli.start.is_none() { cli.start = cfg.analysis.start_time; }
                if cli.end.is_none() { cli.end = cfg.analysis.end_time; }
                if !cli.no_form { cli.no_form = !cfg.form.enabled; }
                if !cli.no_heal { cli.no_heal = !cfg.form.heal; }
                if cli.format == OutputFormat::Text { cli.format = cfg.output.format; }
                if !cli.pretty { cli.pretty = cfg.output.pretty; }
            }
            Err(err) => log::warn!("Ignoring config: {:#}", err),
        }
    }

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    log::info!("chordline - chord, tempo and form analysis");
    log::info!("Input: {}", cli.input.display());

    // 1. Decode audio
    log::info!("Decoding audio...");
    let audio = decode::decode_audio(&cli.input)?;

    // 2. Analyze (4-pass pipeline)
    let options = AnalyzeOptions {
        bpm: cli.bpm,
        start_time: cli.start,
        end_time: cli.end,
    };

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}% {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );
    pb.set_message("analyzing");
    let analysis = chordline::analyze_with_progress(&audio, &options, |pct| {
        pb.set_position(pct.round() as u64);
    })
    .context("Analysis failed")?;
    pb.finish_and_clear();

    // 3. Song form
    let sections = if cli.no_form {
        None
    } else {
        let form_options = FormOptions { heal: !cli.no_heal };
        let sections =
            chordline::extract_form_with(&analysis.beats, analysis.beats_per_measure, &form_options);
        log::info!("Form: {} sections", sections.len());
        Some(sections)
    };

    // 4. Report
    match cli.format {
        OutputFormat::Json => {
            let report = Report {
                analysis: &analysis,
                sections: sections.as_deref(),
            };
            let json = if cli.pretty {
                serde_json::to_string_pretty(&report)
            } else {
                serde_json::to_string(&report)
            }
            .context("Failed to serialize report")?;
            println!("{}", json);
        }
        OutputFormat::Text => print!("{}", text_report(&analysis, sections.as_deref())),
    }

    Ok(())
}

fn text_report(analysis: &Analysis, sections: Option<&[Section]>) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "Tempo:    {:.1} BPM, {}/4, downbeat at {:.3}s\n",
        analysis.bpm, analysis.beats_per_measure, analysis.downbeat_offset
    ));
    let alternatives: Vec<String> = analysis
        .candidates
        .iter()
        .map(|c| format!("{:.1} ({:.2})", c.bpm, c.score))
        .collect();
    if !alternatives.is_empty() {
        out.push_str(&format!("          candidates: {}\n", alternatives.join(", ")));
    }
    out.push_str(&format!("Key:      {}\n", analysis.key));

    out.push_str("\nChords:\n");
    if analysis.results.is_empty() {
        out.push_str("  (none)\n");
    }
    for event in &analysis.results {
        out.push_str(&format!(
            "  {:>9}  beat {:>4}  {}\n",
            format_time(event.time),
            event.beat,
            event.chord
        ));
    }

    if let Some(sections) = sections {
        out.push_str("\nForm:\n");
        if sections.is_empty() {
            out.push_str("  (too short)\n");
        }
        for section in sections {
            out.push_str(&format!(
                "  {:<10} x{:<3} {}\n",
                section.label, section.repeat, section.value
            ));
        }
    }

    out
}

/// `m:ss.cc`
fn format_time(seconds: f64) -> String {
    let centis = (seconds.max(0.0) * 100.0).round() as u64;
    format!("{}:{:02}.{:02}", centis / 6000, (centis / 100) % 60, centis % 100)
}
