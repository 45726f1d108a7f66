//! # Note Mapper
//!
//! Turns estimator output into note names and normalizes free-text note
//! entry coming from consumers such as the synthesizer input.

use std::sync::Arc;

use crate::error::InvalidInput;
use crate::notes::{NoteName, NoteTable};

#[derive(Debug, Clone)]
pub struct NoteMapper {
    table: Arc<NoteTable>,
    default_octave: i32,
}

impl NoteMapper {
    pub fn new(table: Arc<NoteTable>, default_octave: i32) -> Self {
        Self {
            table,
            default_octave,
        }
    }

    pub fn table(&self) -> &NoteTable {
        &self.table
    }

    /// Maps a detected note number to its name. `None` means unknown.
    pub fn to_name(&self, note_number: u8) -> Option<NoteName> {
        self.table.lookup(note_number as i32)
    }

    /// Normalizes a typed note such as `"C"` or `"c#3"`.
    ///
    /// The text is lower-cased; when it does not end in a digit the default
    /// octave is appended, so `"c"` becomes `"c4"`.
    pub fn normalize_input(&self, text: &str) -> Result<NoteName, InvalidInput> {
        let mut note = text.trim().to_lowercase();
        if note.is_empty() {
            return Err(InvalidInput::Empty);
        }

        if !note.ends_with(|c: char| c.is_ascii_digit()) {
            note.push_str(&self.default_octave.to_string());
        }

        let name = NoteName::split(&note);
        if name.letter.is_empty() || name.letter == "-" {
            return Err(InvalidInput::MissingLetter(text.to_string()));
        }
        if name.octave.is_none() {
            return Err(InvalidInput::BadOctave(text.to_string()));
        }
        Ok(name)
    }

    /// Normalizes a typed note and resolves it to a note number through the table.
    pub fn resolve_input(&self, text: &str) -> Result<(u8, NoteName), InvalidInput> {
        let name = self.normalize_input(text)?;
        match self.table.find(&name) {
            Some(number) => Ok((number, name)),
            None => Err(InvalidInput::UnknownNote(name.to_string())),
        }
    }
}
