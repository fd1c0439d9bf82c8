use std::sync::OnceLock;

/// Lowest and highest MIDI notes covered by the analysis (C1..C7).
pub const MIN_MIDI: u8 = 24;
pub const MAX_MIDI: u8 = 96;

/// Canonical note spellings, flats for accidentals.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PitchEntry {
    pub midi: u8,
    pub freq: f64,
    pub pitch_class: usize,
}

/// Semitone table for MIDI 24..=96, built once and shared read-only.
pub fn pitch_table() -> &'static [PitchEntry] {
    static TABLE: OnceLock<Vec<PitchEntry>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (MIN_MIDI..=MAX_MIDI)
            .map(|midi| PitchEntry {
                midi,
                freq: midi_to_freq(midi),
                pitch_class: (midi % 12) as usize,
            })
            .collect()
    })
}

/// Equal-tempered frequency for a MIDI note, A4 = 440 Hz.
pub fn midi_to_freq(midi: u8) -> f64 {
    440.0 * 2f64.powf((midi as f64 - 69.0) / 12.0)
}

pub fn note_name(pitch_class: usize) -> &'static str {
    NOTE_NAMES[pitch_class % 12]
}

/// Inverse of [`note_name`]; accepts the canonical flat spellings only.
pub fn pitch_class_of(name: &str) -> Option<usize> {
    NOTE_NAMES.iter().position(|n| *n == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn table_covers_c1_to_c7() {
        let table = pitch_table();
        assert_eq!(table.len(), 73);
        assert_eq!(table.first().unwrap().midi, 24);
        assert_eq!(table.last().unwrap().midi, 96);
    }

    #[test]
    fn concert_a_and_middle_c() {
        let table = pitch_table();
        let a4 = table.iter().find(|p| p.midi == 69).unwrap();
        assert_relative_eq!(a4.freq, 440.0);
        assert_eq!(a4.pitch_class, 9);

        let c4 = table.iter().find(|p| p.midi == 60).unwrap();
        assert_relative_eq!(c4.freq, 261.6256, epsilon = 1e-3);
        assert_eq!(c4.pitch_class, 0);
    }

    #[test]
    fn names_round_trip() {
        for pc in 0..12 {
            assert_eq!(pitch_class_of(note_name(pc)), Some(pc));
        }
        assert_eq!(note_name(13), "Db");
        assert_eq!(pitch_class_of("C#"), None);
    }
}
