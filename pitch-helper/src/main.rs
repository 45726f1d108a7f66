//! # Pitch Helper - Console Front End
//!
//! Listens to the default input device (or a generated test tone), prints the
//! detected note on every tick and keeps the synthesizer input in step with
//! what was heard.
//!
//! ## Threads
//! - **Main thread**: reads commands from stdin
//! - **Stream worker**: captures audio and detects pitch on a fixed tick
//! - **Display thread**: prints events received over a bounded channel

mod display;
mod synth;

use anyhow::Context;
use clap::Parser;
use pitch_core::{
    AudioBackend, ChannelSubscriber, CpalBackend, NoteMapper, NoteRow, NoteTable,
    PipelineConfig, SignalBackend, StartError, StreamController, StreamHandle, StreamState,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use synth::SynthInput;

const BUNDLED_NOTES: &str = include_str!("../assets/note_names.json");
const DISPLAY_CAPACITY: usize = 64;
const TONE_AMPLITUDE: f32 = 0.5;

#[derive(Parser, Debug)]
#[command(name = "pitch-helper", version, about = "Real-time note detection from the microphone")]
struct Args {
    /// Pipeline configuration as JSON; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Note name table as a JSON list of {"key", "name"} rows
    #[arg(long)]
    notes: Option<PathBuf>,

    /// Analyse a generated sine tone at this frequency instead of the microphone
    #[arg(long, value_name = "HZ")]
    tone: Option<f32>,

    /// Stop after this many seconds instead of reading commands from stdin
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Print one JSON object per tick instead of the bar display
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    log::info!("[MAIN] Starting pitch helper...");

    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("could not load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let rows = load_note_rows(args.notes.as_deref())?;
    let table = Arc::new(NoteTable::build(&rows));
    if table.is_empty() {
        log::warn!("[MAIN] Note table is empty, no note names will be shown");
    }

    let backend: Box<dyn AudioBackend> = match args.tone {
        Some(frequency) => {
            log::info!("[MAIN] Using a generated {} Hz tone", frequency);
            Box::new(SignalBackend::tone(frequency, TONE_AMPLITUDE))
        }
        None => Box::new(CpalBackend::from_config(&config)),
    };

    let mapper = NoteMapper::new(Arc::clone(&table), config.default_octave);
    let peak_scale = config.peak_scale;
    let mut controller = StreamController::new(config, table, backend)?;

    let (display_feed, events) = ChannelSubscriber::bounded(DISPLAY_CAPACITY);
    let synth = Arc::new(SynthInput::new(mapper));
    controller.subscribe(&display_feed);
    controller.subscribe(&synth);

    let printer = display::spawn_printer(events, peak_scale, args.json)
        .context("could not start the display thread")?;
    let mut handle = StreamHandle::start(controller)
        .map_err(StartError::into_error)
        .context("could not start audio capture")?;

    match args.duration {
        Some(secs) => thread::sleep(Duration::from_secs(secs)),
        None => run_commands(&handle, &synth)?,
    }

    handle.close();
    // The stream only held a weak handle; dropping ours ends the display loop.
    let lagged = display_feed.dropped();
    drop(display_feed);
    if printer.join().is_err() {
        log::error!("[MAIN] Display thread panicked");
    }

    let series = handle.time_series();
    log::info!(
        "[MAIN] Finished after {} ticks ({} display updates skipped)",
        series.len(),
        lagged
    );
    Ok(())
}

fn load_note_rows(path: Option<&Path>) -> anyhow::Result<Vec<NoteRow>> {
    let rows: Vec<NoteRow> = match path {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("could not open note table {}", path.display()))?;
            serde_json::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("could not parse note table {}", path.display()))?
        }
        None => serde_json::from_str(BUNDLED_NOTES).context("bundled note table is invalid")?,
    };
    log::info!("[MAIN] Loaded {} note table rows", rows.len());
    Ok(rows)
}

fn run_commands(handle: &StreamHandle, synth: &SynthInput) -> anyhow::Result<()> {
    println!("Commands: pause (p), play (r), toggle (t), note <name>, synth, quit (q)");

    for line in std::io::stdin().lock().lines() {
        let line = line.context("could not read from stdin")?;
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));

        match command.to_lowercase().as_str() {
            "" => {}
            "pause" | "p" => report(handle.pause()),
            "play" | "resume" | "r" => report(handle.resume()),
            "toggle" | "t" => match handle.state() {
                StreamState::Capturing => report(handle.pause()),
                _ => report(handle.resume()),
            },
            "note" | "n" => match synth.set_input(rest) {
                Ok((number, name)) => println!("Synthesizer note set to {} ({})", name, number),
                Err(e) => println!("{}", e),
            },
            "synth" | "s" => match synth.current() {
                Some((number, name)) => println!("Synthesizer note: {} ({})", name, number),
                None => println!("No note yet"),
            },
            "quit" | "q" | "exit" => break,
            other => println!("Unknown command: {}", other),
        }
    }
    Ok(())
}

fn report(result: Result<(), pitch_core::StreamError>) {
    if let Err(e) = result {
        println!("{}", e);
    }
}
