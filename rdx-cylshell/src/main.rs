use anyhow::Result;
use chrono::{NaiveTime, TimeZone, Timelike, Utc};
use colored::Colorize;
use cylclock::events::next_event;
use cylclock::prelude::*;
use cylclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Highlights the command word of each line.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());
    println!("{}", "-".repeat(64).dimmed());
    println!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-".repeat(64).dimmed());
}

/// Prints label activity while `verbose` is on. System events always print.
fn spawn_event_listeners(handle: &ClockHandle, verbose: Arc<AtomicBool>) {
    let mut system_rx = handle.subscribe_system_events();
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut system_rx).await {
            println!("\n<-- [SYSTEM EVENT] {:?}", event);
        }
    });

    let mut label_rx = handle.subscribe_label_events();
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut label_rx).await {
            if !verbose.load(Ordering::Relaxed) {
                continue;
            }
            match &event {
                LabelEvent::GeometryFailed { .. } => {
                    println!("\n<-- [LABEL] {}", format!("{:?}", event).red())
                }
                _ => println!("\n<-- [LABEL] {:?}", event),
            }
        }
    });
}

fn print_status(snapshot: &ClockSnapshot) {
    println!("State:      {:?}", snapshot.state);
    println!("Now:        {}", snapshot.now.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Offset:     {} ms", snapshot.offset_ms);
    println!("Rotation:   {:.4} rad", snapshot.rotation);
    println!(
        "Viewport:   {}x{} @{}",
        snapshot.viewport.width, snapshot.viewport.height, snapshot.viewport.pixel_ratio
    );
    println!("Watcher:    {:?}", snapshot.watch_state);
    println!(
        "Frames:     {} drawn, {} throttled, {} failed",
        snapshot.frames.rendered, snapshot.frames.throttled, snapshot.frames.failed
    );
    println!("Disposed:   {} meshes", snapshot.disposed_meshes);
}

fn print_labels(snapshot: &ClockSnapshot) {
    println!("{:<12} {:>8} {:>8}  {:<7} {}", "minute", "angle", "world", "flags", "text");
    for label in &snapshot.labels {
        let flags = format!(
            "{}{}{}",
            if label.hidden { "H" } else { "-" },
            if label.has_mesh { "M" } else { "-" },
            if label.pending { "P" } else { "-" },
        );
        let line = format!(
            "{:<12} {:>8.3} {:>8.3}  {:<7} {}",
            label.minute_index.to_string(),
            label.angle,
            label.world_angle,
            flags,
            label.display_text
        );
        if label.hidden {
            println!("{}", line.dimmed());
        } else {
            println!("{}", line);
        }
    }
}

/// Today's date (in the clock's current notion of now) at `HH:MM`, UTC.
fn parse_time_of_day(text: &str, now: chrono::DateTime<Utc>) -> Option<chrono::DateTime<Utc>> {
    let time = NaiveTime::parse_from_str(text, "%H:%M").ok()?;
    let naive = now.date_naive().and_hms_opt(time.hour(), time.minute(), 0)?;
    Utc.from_local_datetime(&naive).single()
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let config_path = env::args().nth(1).map(std::path::PathBuf::from);
    let config = ClockConfig::load(config_path.as_deref())?;

    let clock = match CylinderClock::new(config, HeadlessRenderer::new(), Viewport::new(960, 240)) {
        Ok(clock) => clock,
        Err(err) => {
            eprintln!("{}", format!("The clock could not start: {}", err).red().bold());
            return Err(err.into());
        }
    };
    let handle = clock.handle();
    let verbose = Arc::new(AtomicBool::new(false));
    spawn_event_listeners(&handle, verbose.clone());

    info!("Spawning {} in the background...", ENGINE_NAME.cyan());
    let clock_task = tokio::spawn(async move {
        if let Err(e) = clock.run().await {
            eprintln!("\nClock stopped with an error: {}", e);
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(CommandHighlighter));

    println!("{} is running. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();

                let Some(command) = args.first() else {
                    continue;
                };
                match *command {
                    "status" => match handle.snapshot().await {
                        Ok(snapshot) => print_status(&snapshot),
                        Err(e) => println!("{}", format!("Error: {}", e).red()),
                    },
                    "labels" => match handle.snapshot().await {
                        Ok(snapshot) => print_labels(&snapshot),
                        Err(e) => println!("{}", format!("Error: {}", e).red()),
                    },
                    "resize" => {
                        let width = args.get(1).and_then(|s| s.parse::<u32>().ok());
                        let height = args.get(2).and_then(|s| s.parse::<u32>().ok());
                        let ratio = args.get(3).map_or(Some(1.0), |s| s.parse::<f32>().ok());
                        match (width, height, ratio) {
                            (Some(w), Some(h), Some(r)) => {
                                match handle.resize(Viewport::new(w, h).with_pixel_ratio(r)) {
                                    Ok(()) => println!("--> Resize to {}x{} @{} sent.", w, h, r),
                                    Err(e) => println!("{}", format!("Error: {}", e).red()),
                                }
                            }
                            _ => println!("Usage: resize <WIDTH> <HEIGHT> [RATIO]"),
                        }
                    }
                    "settime" => {
                        let now = match handle.snapshot().await {
                            Ok(snapshot) => snapshot.now,
                            Err(e) => {
                                println!("{}", format!("Error: {}", e).red());
                                continue;
                            }
                        };
                        match args.get(1).and_then(|s| parse_time_of_day(s, now)) {
                            Some(at) => match handle.set_time(at) {
                                Ok(()) => println!("--> Clock moved to {}.", at.format("%H:%M UTC")),
                                Err(e) => println!("{}", format!("Error: {}", e).red()),
                            },
                            None => println!("Usage: settime <HH:MM>"),
                        }
                    }
                    "resettime" => match handle.reset_time() {
                        Ok(()) => println!("--> Clock back on system time."),
                        Err(e) => println!("{}", format!("Error: {}", e).red()),
                    },
                    "events" => match args.get(1) {
                        Some(&"on") => {
                            verbose.store(true, Ordering::Relaxed);
                            println!("--> Printing label events.");
                        }
                        Some(&"off") => {
                            verbose.store(false, Ordering::Relaxed);
                            println!("--> Label events silenced.");
                        }
                        _ => println!("Usage: events on|off"),
                    },
                    "help" => {
                        println!("Available commands:");
                        println!("  status                 - Shows time, rotation and frame counters.");
                        println!("  labels                 - Lists every label (H hidden, M mesh, P pending).");
                        println!("  resize <W> <H> [R]     - Resizes the viewport, optionally with a pixel ratio.");
                        println!("  settime <HH:MM>        - Moves the clock to HH:MM today (UTC).");
                        println!("  resettime              - Returns to system time.");
                        println!("  events on|off          - Toggles printing of label events.");
                        println!("  exit                   - Destroys the clock and quits.");
                    }
                    "exit" => break,
                    _ => println!("Unknown command: '{}'. Type 'help'.", line.trim()),
                }
            }
            Err(_) => {
                println!("Exiting cylshell...");
                break;
            }
        }
    }

    handle.destroy().await;
    clock_task.await.ok();
    Ok(())
}
