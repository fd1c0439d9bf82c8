use super::chroma::{total_energy, Chromagram};
use super::key::KeyEstimate;
use super::pitch::note_name;

/// Label used for windows below the energy floor.
pub const REST: &str = "Rest";

/// Total chromagram energy under which a window counts as silence.
const SILENCE_FLOOR: f32 = 0.05;

/// Multiplier applied to chords whose root is diatonic to the global key.
const DIATONIC_BOOST: f32 = 1.30;

/// Penalty factor for energy on bins outside a template.
const OFF_TEMPLATE_PENALTY: f32 = 0.5;

/// Share of total energy a bass note needs before it is written as a slash.
const SLASH_BASS_SHARE: f32 = 0.2;

/// Bass-to-root intervals accepted as inversions. The root itself and the
/// major sixth are excluded.
const SLASH_INTERVALS: [usize; 6] = [3, 4, 5, 7, 10, 11];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChordQuality {
    Major,
    Minor,
    Dominant7,
    Major7,
    Minor7,
    Suspended4,
    Diminished,
}

impl ChordQuality {
    pub fn suffix(self) -> &'static str {
        match self {
            ChordQuality::Major => "",
            ChordQuality::Minor => "m",
            ChordQuality::Dominant7 => "7",
            ChordQuality::Major7 => "maj7",
            ChordQuality::Minor7 => "m7",
            ChordQuality::Suspended4 => "sus4",
            ChordQuality::Diminished => "dim",
        }
    }
}

/// Interval weights for one chord quality; zero marks a non-chord tone.
pub struct ChordTemplate {
    pub quality: ChordQuality,
    pub weights: [f32; 12],
}

impl ChordTemplate {
    const fn new(quality: ChordQuality, tones: &[(usize, f32)]) -> Self {
        let mut weights = [0.0f32; 12];
        let mut i = 0;
        while i < tones.len() {
            weights[tones[i].0] = tones[i].1;
            i += 1;
        }
        Self { quality, weights }
    }

    fn score(&self, chroma: &Chromagram, root: usize) -> f32 {
        let mut score = 0.0;
        for (interval, &weight) in self.weights.iter().enumerate() {
            let value = chroma[(root + interval) % 12];
            if weight > 0.0 {
                score += value * weight;
            } else {
                score -= value * OFF_TEMPLATE_PENALTY;
            }
        }
        score
    }
}

/// Chord qualities in tie-break order.
pub static TEMPLATES: [ChordTemplate; 7] = [
    ChordTemplate::new(ChordQuality::Major, &[(0, 1.5), (4, 1.3), (7, 1.0)]),
    ChordTemplate::new(ChordQuality::Minor, &[(0, 1.5), (3, 1.3), (7, 1.0)]),
    ChordTemplate::new(ChordQuality::Dominant7, &[(0, 1.5), (4, 1.2), (7, 1.0), (10, 1.1)]),
    ChordTemplate::new(ChordQuality::Major7, &[(0, 1.5), (4, 1.2), (7, 1.0), (11, 1.1)]),
    ChordTemplate::new(ChordQuality::Minor7, &[(0, 1.5), (3, 1.2), (7, 1.0), (10, 1.1)]),
    ChordTemplate::new(ChordQuality::Suspended4, &[(0, 1.5), (5, 1.3), (7, 1.0)]),
    ChordTemplate::new(ChordQuality::Diminished, &[(0, 1.5), (3, 1.2), (6, 1.2)]),
];

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChordOptions {
    /// Global key whose diatonic roots get a scoring boost.
    pub key_bias: Option<KeyEstimate>,
    /// Strongest pitch class of the bass register, for inversions.
    pub bass_note: Option<usize>,
}

/// Root and quality with the highest template score.
///
/// Enumeration runs roots ascending, qualities in [`TEMPLATES`] order; a
/// later candidate replaces the current best only on a strictly higher score.
pub fn best_match(chroma: &Chromagram, key_bias: Option<&KeyEstimate>) -> (usize, ChordQuality) {
    let mut best = (0, ChordQuality::Major);
    let mut best_score = f32::NEG_INFINITY;

    for root in 0..12 {
        let boost = match key_bias {
            Some(key) if key.is_diatonic(root) => DIATONIC_BOOST,
            _ => 1.0,
        };
        for template in TEMPLATES.iter() {
            let score = template.score(chroma, root) * boost;
            if score > best_score {
                best_score = score;
                best = (root, template.quality);
            }
        }
    }

    best
}

/// Label a chromagram, e.g. `"Am"`, `"G7"`, `"C/E"` or [`REST`].
pub fn identify_chord(chroma: &Chromagram, options: &ChordOptions) -> String {
    let total = total_energy(chroma);
    if total < SILENCE_FLOOR {
        return REST.to_string();
    }

    let (root, quality) = best_match(chroma, options.key_bias.as_ref());
    let mut label = format!("{}{}", note_name(root), quality.suffix());

    if let Some(bass) = options.bass_note.and_then(|b| slash_bass(chroma, root, b)) {
        label.push('/');
        label.push_str(note_name(bass));
    }

    label
}

/// Bass pitch class worth writing under `root`: a chord tone other than the
/// root carrying more than a fifth of the chromagram's energy.
fn slash_bass(chroma: &Chromagram, root: usize, bass: usize) -> Option<usize> {
    let bass = bass % 12;
    let interval = (bass + 12 - root) % 12;
    let strong = chroma[bass] > total_energy(chroma) * SLASH_BASS_SHARE;
    (bass != root && strong && SLASH_INTERVALS.contains(&interval)).then_some(bass)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::key::KeyMode;

    fn chroma_of(bins: &[(usize, f32)]) -> Chromagram {
        let mut chroma = [0.0; 12];
        for &(pc, v) in bins {
            chroma[pc] = v;
        }
        chroma
    }

    #[test]
    fn quiet_chromagram_is_rest() {
        let chroma = chroma_of(&[(0, 0.02), (4, 0.02)]);
        assert_eq!(identify_chord(&chroma, &ChordOptions::default()), "Rest");

        let options = ChordOptions {
            key_bias: Some(KeyEstimate::new(0, KeyMode::Major)),
            bass_note: Some(4),
        };
        assert_eq!(identify_chord(&[0.0; 12], &options), "Rest");
    }

    #[test]
    fn triads() {
        let c = chroma_of(&[(0, 1.0), (4, 1.0), (7, 1.0)]);
        assert_eq!(identify_chord(&c, &ChordOptions::default()), "C");

        let am = chroma_of(&[(9, 1.0), (0, 1.0), (4, 1.0)]);
        assert_eq!(identify_chord(&am, &ChordOptions::default()), "Am");

        let bdim = chroma_of(&[(11, 1.0), (2, 1.0), (5, 1.0)]);
        assert_eq!(identify_chord(&bdim, &ChordOptions::default()), "Bdim");
    }

    #[test]
    fn sevenths() {
        let g7 = chroma_of(&[(7, 1.0), (11, 1.0), (2, 0.5), (5, 0.5)]);
        assert_eq!(identify_chord(&g7, &ChordOptions::default()), "G7");

        let fmaj7 = chroma_of(&[(5, 1.0), (9, 1.0), (0, 0.8), (4, 0.9)]);
        assert_eq!(identify_chord(&fmaj7, &ChordOptions::default()), "Fmaj7");
    }

    #[test]
    fn key_bias_breaks_close_calls() {
        // A bare fifth: Gsus4 edges out C until C's key is known
        let fifth = chroma_of(&[(0, 1.0), (7, 1.0)]);
        assert_eq!(identify_chord(&fifth, &ChordOptions::default()), "Gsus4");

        let options = ChordOptions {
            key_bias: Some(KeyEstimate::new(1, KeyMode::Major)),
            bass_note: None,
        };
        assert_eq!(identify_chord(&fifth, &options), "C");
    }

    #[test]
    fn first_inversion_gets_a_slash() {
        let chroma = chroma_of(&[(0, 0.55), (4, 1.0), (7, 0.55)]);
        let options = ChordOptions {
            key_bias: None,
            bass_note: Some(4),
        };
        assert_eq!(identify_chord(&chroma, &options), "C/E");
    }

    #[test]
    fn root_position_bass_adds_nothing() {
        let chroma = chroma_of(&[(0, 1.0), (4, 1.0), (7, 1.0)]);
        let options = ChordOptions {
            key_bias: None,
            bass_note: Some(0),
        };
        assert_eq!(identify_chord(&chroma, &options), "C");
    }

    #[test]
    fn weak_bass_is_ignored() {
        // E carries 0.3 of 2.3 total, under the 20% share
        let chroma = chroma_of(&[(0, 1.0), (4, 0.3), (7, 1.0)]);
        let options = ChordOptions {
            key_bias: None,
            bass_note: Some(4),
        };
        assert_eq!(identify_chord(&chroma, &options), "C");
    }

    #[test]
    fn non_chord_tone_bass_is_ignored() {
        // D is strong enough but a whole step above the root
        let chroma = chroma_of(&[(0, 1.0), (2, 0.9), (4, 1.0), (7, 1.0)]);
        let options = ChordOptions {
            key_bias: None,
            bass_note: Some(2),
        };
        assert_eq!(identify_chord(&chroma, &options), "C");

        // No energy at all in the full chromagram
        let triad = chroma_of(&[(0, 1.0), (4, 1.0), (7, 1.0)]);
        let absent = ChordOptions {
            key_bias: None,
            bass_note: Some(2),
        };
        assert_eq!(identify_chord(&triad, &absent), "C");
    }

    #[test]
    fn slash_rule_intervals() {
        // Every candidate bass holds 1.0 of 4.5 total
        let chroma = chroma_of(&[(0, 0.5), (4, 1.0), (7, 1.0), (9, 1.0), (10, 1.0)]);
        assert_eq!(slash_bass(&chroma, 0, 4), Some(4));
        assert_eq!(slash_bass(&chroma, 0, 7), Some(7));
        assert_eq!(slash_bass(&chroma, 0, 10), Some(10));
        // Major sixth, root, and a bass pitch class given out of range
        assert_eq!(slash_bass(&chroma, 0, 9), None);
        assert_eq!(slash_bass(&chroma, 0, 0), None);
        assert_eq!(slash_bass(&chroma, 0, 16), Some(4));
    }

    #[test]
    fn slash_needs_more_than_a_fifth_of_the_energy() {
        // E at exactly 20% of the total stays off the label
        let chroma = chroma_of(&[(0, 2.0), (4, 1.0), (7, 2.0)]);
        assert_eq!(slash_bass(&chroma, 0, 4), None);
    }

    #[test]
    fn ties_resolve_to_first_root_and_quality() {
        // A lone pitch class scores the same for every quality rooted on it
        let chroma = chroma_of(&[(2, 1.0)]);
        assert_eq!(best_match(&chroma, None), (2, ChordQuality::Major));
    }
}
