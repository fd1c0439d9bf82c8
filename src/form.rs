//! Song-form extraction from per-beat chord records.
//!
//! Beats are grouped into measures, noisy repeats are healed by consensus,
//! and repeating blocks of 4 or 2 measures become labelled sections.

use serde::Serialize;

use crate::audio::chord::REST;
use crate::audio::features::BeatRecord;

/// Block sizes tried when looking for repeats, longest first.
const BLOCK_LENGTHS: [usize; 2] = [4, 2];

/// Longest run emitted for material that does not repeat.
const UNIQUE_BLOCK: usize = 4;

/// Beat whose chord is paired with the downbeat's in a split measure.
const SECOND_CHORD_BEAT: usize = 2;

/// Share of measures two blocks must agree on to be healed together.
const HEAL_SIMILARITY: f32 = 0.75;

const SEPARATOR: &str = " | ";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Section {
    pub label: String,
    /// Measure strings joined with `" | "`.
    pub value: String,
    pub repeat: usize,
    /// Mean beat RMS over every measure the section spans.
    pub energy: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FormOptions {
    /// Replace near-identical repeats with their consensus before matching.
    pub heal: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self { heal: true }
    }
}

struct Measure {
    chords: String,
    energy: f32,
}

/// Extract sections with consensus healing enabled.
pub fn extract_form(beats: &[BeatRecord], beats_per_measure: usize) -> Vec<Section> {
    extract_form_with(beats, beats_per_measure, &FormOptions::default())
}

pub fn extract_form_with(
    beats: &[BeatRecord],
    beats_per_measure: usize,
    options: &FormOptions,
) -> Vec<Section> {
    if beats.len() < 4 {
        return Vec::new();
    }

    let beats_per_measure = beats_per_measure.max(1);
    let timeline = fill_timeline(beats);
    let measures = consolidate_measures(&timeline, beats_per_measure);

    if measures.len() < 2 {
        let value = measures
            .iter()
            .map(|m| m.chords.as_str())
            .collect::<Vec<_>>()
            .join(SEPARATOR);
        let energy = measures.first().map_or(0.0, |m| m.energy);
        return label_sections(vec![Section {
            label: String::new(),
            value,
            repeat: 1,
            energy,
        }]);
    }

    let mut chords: Vec<String> = measures.iter().map(|m| m.chords.clone()).collect();
    let energies: Vec<f32> = measures.iter().map(|m| m.energy).collect();

    if options.heal {
        for len in BLOCK_LENGTHS {
            heal_blocks(&mut chords, len);
        }
    }

    label_sections(find_sections(&chords, &energies))
}

/// One record per beat index from 0 to the last beat; gaps repeat the
/// previous known record.
fn fill_timeline(beats: &[BeatRecord]) -> Vec<BeatRecord> {
    let last = beats.iter().map(|b| b.beat).max().unwrap_or(0);
    let mut slots: Vec<Option<&BeatRecord>> = vec![None; last + 1];
    for beat in beats {
        slots[beat.beat] = Some(beat);
    }

    let mut current = slots.iter().flatten().next().copied();
    slots
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| {
            if slot.is_some() {
                current = *slot;
            }
            current.map(|b| BeatRecord {
                beat: i,
                chord: b.chord.clone(),
                energy: b.energy,
            })
        })
        .collect()
}

/// Collapse each full measure to its majority chord, or to the chords on
/// its first and third beats when no chord fills half the measure.
fn consolidate_measures(timeline: &[BeatRecord], beats_per_measure: usize) -> Vec<Measure> {
    timeline
        .chunks_exact(beats_per_measure)
        .map(|slice| {
            let labels: Vec<&str> = slice.iter().map(|b| b.chord.as_str()).collect();
            let (majority, count) = majority(&labels);
            let chords = if count * 2 >= beats_per_measure {
                majority.to_string()
            } else {
                let second = &slice[SECOND_CHORD_BEAT.min(beats_per_measure - 1)];
                format!("{} {}", slice[0].chord, second.chord)
            };
            let energy = slice.iter().map(|b| b.energy).sum::<f32>() / beats_per_measure as f32;
            Measure { chords, energy }
        })
        .collect()
}

/// Most frequent item and its count; ties keep the first seen.
fn majority<'a>(items: &[&'a str]) -> (&'a str, usize) {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for &item in items {
        match counts.iter_mut().find(|(seen, _)| *seen == item) {
            Some((_, count)) => *count += 1,
            None => counts.push((item, 1)),
        }
    }

    let mut best = ("", 0);
    for (item, count) in counts {
        if count > best.1 {
            best = (item, count);
        }
    }
    best
}

/// Reduce a measure string to root plus major/minor, ignoring sevenths,
/// suspensions and slash basses.
fn simplify(measure: &str) -> String {
    measure.split(' ').map(simplify_chord).collect::<Vec<_>>().join(" ")
}

fn simplify_chord(chord: &str) -> String {
    if chord == REST {
        return "-".to_string();
    }
    let base = chord.split('/').next().unwrap_or(chord);
    let split = base
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c != 'b')
        .map_or(base.len(), |(i, _)| i);
    let (root, quality) = base.split_at(split);

    if quality.starts_with('m') && !quality.starts_with("maj") {
        format!("{}m", root)
    } else {
        root.to_string()
    }
}

fn similarity(simple: &[String], a: usize, b: usize, len: usize) -> f32 {
    let matches = (0..len).filter(|&k| simple[a + k] == simple[b + k]).count();
    matches as f32 / len as f32
}

/// Find runs of adjacent `len`-measure blocks that mostly agree with the
/// run's first block, and overwrite every position with the run's majority.
fn heal_blocks(chords: &mut [String], len: usize) {
    let n = chords.len();
    let mut i = 0;
    while i + 2 * len <= n {
        let simple: Vec<String> = chords.iter().map(|c| simplify(c)).collect();

        let mut run = 1;
        while i + (run + 1) * len <= n && similarity(&simple, i, i + run * len, len) >= HEAL_SIMILARITY {
            run += 1;
        }

        if run < 2 {
            i += 1;
            continue;
        }

        for k in 0..len {
            let votes: Vec<&str> = (0..run).map(|r| chords[i + r * len + k].as_str()).collect();
            let consensus = majority(&votes).0.to_string();
            for r in 0..run {
                let slot = &mut chords[i + r * len + k];
                if *slot != consensus {
                    log::debug!("Healed measure {}: {} -> {}", i + r * len + k, slot, consensus);
                    *slot = consensus.clone();
                }
            }
        }
        i += run * len;
    }
}

fn blocks_equal(chords: &[String], a: usize, b: usize, len: usize) -> bool {
    chords[a..a + len] == chords[b..b + len]
}

fn find_sections(chords: &[String], energies: &[f32]) -> Vec<Section> {
    let n = chords.len();
    let mut sections: Vec<Section> = Vec::new();
    let mut i = 0;

    while i < n {
        let mut block = (UNIQUE_BLOCK.min(n - i), 1);
        for len in BLOCK_LENGTHS {
            if i + 2 * len <= n && blocks_equal(chords, i, i + len, len) {
                let mut repeat = 2;
                while i + (repeat + 1) * len <= n && blocks_equal(chords, i, i + repeat * len, len) {
                    repeat += 1;
                }
                block = (len, repeat);
                break;
            }
        }

        let (len, repeat) = block;
        let span = len * repeat;
        let section = Section {
            label: String::new(),
            value: chords[i..i + len].join(SEPARATOR),
            repeat,
            energy: energies[i..i + span].iter().sum::<f32>() / span as f32,
        };

        match sections.last_mut() {
            Some(last) if last.value == section.value => {
                last.repeat += section.repeat;
                last.energy = (last.energy + section.energy) / 2.0;
            }
            _ => sections.push(section),
        }
        i += span;
    }

    sections
}

fn label_sections(mut sections: Vec<Section>) -> Vec<Section> {
    for (idx, section) in sections.iter_mut().enumerate() {
        section.label = match idx {
            0 => "Intro".to_string(),
            1 => "Verse".to_string(),
            2 => "Chorus".to_string(),
            _ => format!("Section {}", idx + 1),
        };
    }
    sections
}
