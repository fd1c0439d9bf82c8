use std::fmt;

use serde::Serialize;

use super::chroma::Chromagram;
use super::pitch::note_name;

/// Krumhansl-Schmuckler major key profile.
const MAJOR_PROFILE: [f32; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];

/// Krumhansl-Schmuckler minor key profile.
const MINOR_PROFILE: [f32; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

/// Scale degrees (semitones above the tonic) that count as diatonic roots.
const MAJOR_DIATONIC: [usize; 7] = [0, 2, 4, 5, 7, 9, 11];
const MINOR_DIATONIC: [usize; 7] = [0, 2, 3, 5, 7, 8, 10];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    Major,
    Minor,
}

impl KeyMode {
    fn profile(self) -> &'static [f32; 12] {
        match self {
            KeyMode::Major => &MAJOR_PROFILE,
            KeyMode::Minor => &MINOR_PROFILE,
        }
    }

    fn diatonic(self) -> &'static [usize; 7] {
        match self {
            KeyMode::Major => &MAJOR_DIATONIC,
            KeyMode::Minor => &MINOR_DIATONIC,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct KeyEstimate {
    pub root: usize,
    #[serde(rename = "type")]
    pub mode: KeyMode,
}

impl KeyEstimate {
    pub fn new(root: usize, mode: KeyMode) -> Self {
        Self { root: root % 12, mode }
    }

    /// Whether a chord root falls on one of this key's scale degrees.
    pub fn is_diatonic(&self, root: usize) -> bool {
        let degree = (root % 12 + 12 - self.root) % 12;
        self.mode.diatonic().contains(&degree)
    }
}

impl fmt::Display for KeyEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            KeyMode::Major => "major",
            KeyMode::Minor => "minor",
        };
        write!(f, "{} {}", note_name(self.root), mode)
    }
}

/// Best-matching key for an aggregate chromagram.
///
/// Scores are the plain dot product of the rotated chromagram with each
/// profile. Roots are tried in ascending order, major before minor, and a
/// later candidate only wins with a strictly higher score.
pub fn identify_global_key(chroma: &Chromagram) -> KeyEstimate {
    let mut best = KeyEstimate::new(0, KeyMode::Major);
    let mut best_score = f32::NEG_INFINITY;

    for root in 0..12 {
        for mode in [KeyMode::Major, KeyMode::Minor] {
            let profile = mode.profile();
            let score: f32 = (0..12).map(|i| chroma[(root + i) % 12] * profile[i]).sum();
            if score > best_score {
                best_score = score;
                best = KeyEstimate::new(root, mode);
            }
        }
    }

    best
}
