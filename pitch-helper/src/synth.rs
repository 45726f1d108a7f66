//! Synthesizer note input.
//!
//! Holds the note the synthesizer would play. Detected notes fill it in
//! automatically; typed notes replace it after normalization.

use pitch_core::{InvalidInput, NoteEvent, NoteMapper, NoteName, NoteSubscriber};
use std::sync::Mutex;

pub struct SynthInput {
    mapper: NoteMapper,
    current: Mutex<Option<(u8, NoteName)>>,
}

impl SynthInput {
    pub fn new(mapper: NoteMapper) -> Self {
        Self {
            mapper,
            current: Mutex::new(None),
        }
    }

    /// Normalizes typed text and makes it the current note.
    ///
    /// On error the previous note is kept.
    pub fn set_input(&self, text: &str) -> Result<(u8, NoteName), InvalidInput> {
        let resolved = self.mapper.resolve_input(text)?;
        self.store(resolved.clone());
        Ok(resolved)
    }

    pub fn current(&self) -> Option<(u8, NoteName)> {
        self.current.lock().ok().and_then(|current| current.clone())
    }

    fn store(&self, note: (u8, NoteName)) {
        match self.current.lock() {
            Ok(mut current) => *current = Some(note),
            Err(poisoned) => *poisoned.into_inner() = Some(note),
        }
    }
}

impl NoteSubscriber for SynthInput {
    fn notify(&self, event: &NoteEvent) -> anyhow::Result<()> {
        if !event.has_note() {
            return Ok(());
        }
        let resolved = self.mapper.resolve_input(&event.note_name)?;
        log::debug!("[NOTES] Synth input follows {}", resolved.1);
        self.store(resolved);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitch_core::{NoteRow, NoteTable};
    use std::sync::Arc;

    fn synth() -> SynthInput {
        let rows = vec![
            NoteRow::new("60", "C4"),
            NoteRow::new("61", "C#4"),
            NoteRow::new("69", "A4"),
        ];
        SynthInput::new(NoteMapper::new(Arc::new(NoteTable::build(&rows)), 4))
    }

    fn event(note_number: u8, note_name: &str) -> NoteEvent {
        NoteEvent {
            tick_index: 0,
            note_number,
            note_name: note_name.to_string(),
            peak_level: 100.0,
            frequency: None,
            cents: None,
        }
    }

    #[test]
    fn detected_notes_fill_the_input() {
        let synth = synth();
        synth.notify(&event(69, "A4")).unwrap();
        let (number, name) = synth.current().unwrap();
        assert_eq!(number, 69);
        assert_eq!(name.to_string(), "a4");
    }

    #[test]
    fn silent_ticks_keep_the_previous_note() {
        let synth = synth();
        synth.notify(&event(60, "C4")).unwrap();
        synth.notify(&event(0, "")).unwrap();
        assert_eq!(synth.current().unwrap().0, 60);
    }

    #[test]
    fn typed_note_gets_default_octave() {
        let synth = synth();
        let (number, _) = synth.set_input("C#").unwrap();
        assert_eq!(number, 61);
        assert_eq!(synth.current().unwrap().0, 61);
    }

    #[test]
    fn rejected_input_keeps_the_previous_note() {
        let synth = synth();
        synth.set_input("a").unwrap();
        assert_eq!(synth.set_input("  "), Err(InvalidInput::Empty));
        assert!(matches!(synth.set_input("h"), Err(InvalidInput::UnknownNote(_))));
        assert_eq!(synth.current().unwrap().0, 69);
    }
}
