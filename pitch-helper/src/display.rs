//! Console rendering of the note stream.
//!
//! The display keeps showing the last detected note while the input is
//! silent, and draws the octave and the peak level as bars.

use crossbeam_channel::Receiver;
use pitch_core::{NoteEvent, NoteName};
use std::thread::{self, JoinHandle};

const OCTAVE_SLOTS: usize = 7;
const PEAK_BAR_WIDTH: usize = 40;

pub struct ConsoleDisplay {
    last_label: String,
    peak_scale: f32,
}

impl ConsoleDisplay {
    pub fn new(peak_scale: f32) -> Self {
        Self {
            last_label: String::new(),
            peak_scale,
        }
    }

    pub fn last_label(&self) -> &str {
        &self.last_label
    }

    /// Formats one line for the event, updating the remembered label.
    pub fn render(&mut self, event: &NoteEvent) -> String {
        if event.has_note() {
            self.last_label = event.note_name.clone();
        }

        let label = if self.last_label.is_empty() {
            "--"
        } else {
            self.last_label.as_str()
        };
        let cents = match event.cents {
            Some(cents) => format!("{:+5.1}c", cents),
            None => "      ".to_string(),
        };

        format!(
            "{:>5} {:<4} {} [{}] {}",
            event.tick_index,
            label,
            cents,
            octave_bar(&self.last_label),
            peak_bar(event.peak_level, self.peak_scale),
        )
    }
}

/// One lit slot per octave above zero, capped at seven.
pub fn octave_bar(label: &str) -> String {
    let lit = NoteName::split(label)
        .octave
        .map(|octave| octave.clamp(0, OCTAVE_SLOTS as i32) as usize)
        .unwrap_or(0);
    let mut bar = "#".repeat(lit);
    bar.push_str(&".".repeat(OCTAVE_SLOTS - lit));
    bar
}

pub fn peak_bar(peak: f32, scale: f32) -> String {
    if !scale.is_finite() || scale <= 0.0 || !peak.is_finite() || peak <= 0.0 {
        return String::new();
    }
    // Square root keeps quiet input visible.
    let fraction = (peak / scale).clamp(0.0, 1.0).sqrt();
    "|".repeat((fraction * PEAK_BAR_WIDTH as f32).round() as usize)
}

/// Prints events until every sender of the channel is gone.
pub fn spawn_printer(
    events: Receiver<NoteEvent>,
    peak_scale: f32,
    json: bool,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("pitch-display".to_string())
        .spawn(move || {
            let mut display = ConsoleDisplay::new(peak_scale);
            for event in events.iter() {
                if json {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => log::error!("[MAIN] Could not encode event: {}", e),
                    }
                } else {
                    println!("{}", display.render(&event));
                }
            }
            log::debug!("[MAIN] Display stopped");
        })
}
