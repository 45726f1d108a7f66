//! # Note Table Module
//!
//! The immutable note number → note name table, built once at startup from
//! a pre-loaded asset, plus the decomposed `NoteName` form used by the
//! mapper and its consumers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One raw record of the note table asset.
///
/// Both fields are text as they appear in the source table; `build` decides
/// which rows are usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRow {
    pub key: String,
    pub name: String,
}

impl NoteRow {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

/// A note name split into its letter class and octave.
///
/// `letter` is everything before the trailing octave digits, e.g. `"c#"` in
/// `"c#4"`. Labels without trailing digits have no octave.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteName {
    pub letter: String,
    pub octave: Option<i32>,
}

impl NoteName {
    pub fn new(letter: impl Into<String>, octave: i32) -> Self {
        Self {
            letter: letter.into(),
            octave: Some(octave),
        }
    }

    /// Splits a label such as `"C#4"` or `"c-1"` into letter and octave.
    pub fn split(label: &str) -> Self {
        let digits_start = label
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i);

        let Some(mut octave_start) = digits_start else {
            return Self {
                letter: label.to_string(),
                octave: None,
            };
        };

        // A minus sign directly before the digits belongs to the octave ("c-1"),
        // as long as something is left for the letter.
        if octave_start > 1 && label[..octave_start].ends_with('-') {
            octave_start -= 1;
        }

        match label[octave_start..].parse::<i32>() {
            Ok(octave) => Self {
                letter: label[..octave_start].to_string(),
                octave: Some(octave),
            },
            Err(_) => Self {
                letter: label.to_string(),
                octave: None,
            },
        }
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.octave {
            Some(octave) => write!(f, "{}{}", self.letter, octave),
            None => write!(f, "{}", self.letter),
        }
    }
}

/// Read-only mapping from note number to display name.
#[derive(Debug, Clone, Default)]
pub struct NoteTable {
    names: BTreeMap<u8, String>,
    /// Lower-cased label → note number, for resolving entered names.
    numbers: BTreeMap<String, u8>,
}

impl NoteTable {
    /// Builds the table from raw rows.
    ///
    /// Rows with a non-numeric key, a key outside 0..=127 or a blank name are
    /// skipped. When a key repeats, the first row wins.
    pub fn build<'a, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = &'a NoteRow>,
    {
        let mut table = NoteTable::default();
        let mut skipped = 0usize;

        for row in rows {
            let Ok(number) = row.key.trim().parse::<u8>() else {
                log::debug!("[NOTES] Skipping row with malformed key {:?}", row.key);
                skipped += 1;
                continue;
            };
            let name = row.name.trim();
            if number > crate::tuning::MAX_NOTE || name.is_empty() {
                log::debug!("[NOTES] Skipping unusable row {:?}", row);
                skipped += 1;
                continue;
            }
            if table.names.contains_key(&number) {
                log::debug!("[NOTES] Skipping duplicate key {}", number);
                skipped += 1;
                continue;
            }
            table.names.insert(number, name.to_string());
            table.numbers.entry(name.to_lowercase()).or_insert(number);
        }

        log::info!(
            "[NOTES] Built note table with {} entries ({} rows skipped)",
            table.names.len(),
            skipped
        );
        table
    }

    /// Looks up a note number. Numbers outside the table return `None`.
    pub fn lookup(&self, number: i32) -> Option<NoteName> {
        self.label(number).map(NoteName::split)
    }

    /// The raw display label of a note number.
    pub fn label(&self, number: i32) -> Option<&str> {
        let key = u8::try_from(number).ok()?;
        self.names.get(&key).map(String::as_str)
    }

    /// Resolves a note name back to its number, ignoring case.
    pub fn find(&self, name: &NoteName) -> Option<u8> {
        self.numbers.get(&name.to_string().to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, &str)]) -> Vec<NoteRow> {
        pairs.iter().map(|(k, n)| NoteRow::new(*k, *n)).collect()
    }

    #[test]
    fn build_skips_malformed_rows() {
        let rows = rows(&[("60", "c4"), ("61", "bad"), ("MIDI", "Note name")]);
        let table = NoteTable::build(&rows);

        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup(60), Some(NoteName::new("c", 4)));
        assert_eq!(table.label(61), Some("bad"));
        assert_eq!(table.lookup(999), None);
        assert_eq!(table.lookup(-1), None);
    }

    #[test]
    fn build_keeps_first_duplicate_and_drops_out_of_range() {
        let rows = rows(&[
            ("69", "A4"),
            ("69", "B4"),
            ("128", "G#9"),
            ("70", "   "),
            (" 71 ", "B4"),
        ]);
        let table = NoteTable::build(&rows);

        assert_eq!(table.len(), 2);
        assert_eq!(table.label(69), Some("A4"));
        assert_eq!(table.label(71), Some("B4"));
        assert_eq!(table.lookup(128), None);
    }

    #[test]
    fn empty_source_builds_empty_table() {
        let table = NoteTable::build(&Vec::<NoteRow>::new());
        assert!(table.is_empty());
        assert_eq!(table.lookup(60), None);
    }

    #[test]
    fn find_is_case_insensitive() {
        let rows = rows(&[("60", "C4"), ("61", "C#4")]);
        let table = NoteTable::build(&rows);

        assert_eq!(table.find(&NoteName::new("c", 4)), Some(60));
        assert_eq!(table.find(&NoteName::new("c#", 4)), Some(61));
        assert_eq!(table.find(&NoteName::new("d", 4)), None);
    }

    #[test]
    fn split_handles_accidentals_and_negative_octaves() {
        assert_eq!(NoteName::split("C#4"), NoteName::new("C#", 4));
        assert_eq!(NoteName::split("c-1"), NoteName::new("c", -1));
        assert_eq!(NoteName::split("G9"), NoteName::new("G", 9));
        assert_eq!(
            NoteName::split("bad"),
            NoteName {
                letter: "bad".to_string(),
                octave: None
            }
        );
        assert_eq!(NoteName::split("bad").to_string(), "bad");
        assert_eq!(NoteName::split("C#-1").to_string(), "C#-1");
    }
}
