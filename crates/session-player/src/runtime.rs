//! Player runtime: device listing and the interactive `play` mode.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use session_core::{Collaborators, SessionConfig, SessionHandle, spawn_session};
use session_types::{Command, QueueRequest, SessionEvent, Track};

use crate::console::{self, ConsoleAction};
use crate::decoder::LocalDecoderFactory;
use crate::focus::DesktopFocus;
use crate::library;
use crate::notify::{LogNotifier, now_playing_line};
use crate::records::JsonRecordStore;

/// Fully resolved settings for `play` (config file merged with CLI flags).
#[derive(Clone, Debug)]
pub struct PlayOptions {
    pub paths: Vec<PathBuf>,
    pub start_index: i64,
    pub title: Option<String>,
    pub device: Option<String>,
    pub buffer_seconds: f32,
    pub record_path: PathBuf,
    pub session: SessionConfig,
}

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    crate::device::list_devices(&host)
}

/// Queue the given files, start playback and serve console commands until `quit`.
pub fn run_play(opts: PlayOptions) -> Result<()> {
    let tracks = probe_tracks(&opts.paths)?;
    let records = Arc::new(JsonRecordStore::open(&opts.record_path)?);
    let notifier = Arc::new(LogNotifier::new());
    let collaborators = Collaborators::new(
        Box::new(LocalDecoderFactory::new(opts.device.clone(), opts.buffer_seconds)),
        Box::new(DesktopFocus::new()),
    )
    .with_record_sink(records.clone())
    .with_notification_sink(notifier.clone())
    .with_service_callbacks(notifier);

    let handle = spawn_session(opts.session.clone(), collaborators).context("start session")?;
    let _printer = spawn_event_printer(handle.subscribe())?;

    {
        let handle = handle.clone();
        let _ = ctrlc::set_handler(move || {
            handle.shutdown();
            std::process::exit(130);
        });
    }

    let resume = usize::try_from(opts.start_index)
        .ok()
        .and_then(|i| tracks.get(i))
        .and_then(|track| records.position_for(&track.id))
        .filter(|ms| *ms > 0);
    handle.send(Command::PlayQueue(QueueRequest {
        title: opts.title.clone(),
        tracks: tracks.clone(),
        index: opts.start_index,
    }))?;
    if let Some(position_ms) = resume {
        tracing::info!(position_ms, "resuming from saved position");
        handle.send(Command::SeekTo { position_ms })?;
    }

    println!("{}", console::HELP);
    let result = console_loop(&handle, &tracks);
    handle.shutdown();
    result
}

fn probe_tracks(paths: &[PathBuf]) -> Result<Vec<Track>> {
    let files = library::expand_paths(paths)?;
    let mut tracks = Vec::with_capacity(files.len());
    for file in files {
        match library::track_from_path(&file) {
            Ok(track) => tracks.push(track),
            Err(err) => tracing::warn!(path = %file.display(), "skipping: {err:#}"),
        }
    }
    if tracks.is_empty() {
        anyhow::bail!("no playable files given");
    }
    tracing::info!(count = tracks.len(), "tracks queued");
    Ok(tracks)
}

fn console_loop(handle: &SessionHandle, tracks: &[Track]) -> Result<()> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("read console")?;
        let action = match console::parse_line(&line) {
            Ok(Some(action)) => action,
            Ok(None) => continue,
            Err(msg) => {
                println!("{msg}");
                continue;
            }
        };
        match action {
            ConsoleAction::Send(cmd) => handle.send(cmd)?,
            ConsoleAction::Focus(state) => handle.notify_focus(state)?,
            ConsoleAction::List => print_queue(handle, tracks),
            ConsoleAction::Status => {
                let snapshot = handle.snapshot();
                let current = snapshot
                    .active_track_id
                    .as_deref()
                    .and_then(|id| tracks.iter().find(|t| t.id == id));
                println!(
                    "{} @ {}",
                    now_playing_line(current, &snapshot),
                    format_position(snapshot.position_ms)
                );
                if let Some(error) = snapshot.error.as_deref() {
                    println!("error: {error}");
                }
            }
            ConsoleAction::Help => println!("{}", console::HELP),
            ConsoleAction::Quit => break,
        }
    }
    Ok(())
}

fn print_queue(handle: &SessionHandle, tracks: &[Track]) {
    let active = handle.snapshot().active_track_id;
    for (i, track) in tracks.iter().enumerate() {
        let marker = if active.as_deref() == Some(track.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {i:>3}  {}", track.display_title());
    }
}

fn format_position(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn spawn_event_printer(events: Receiver<SessionEvent>) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("session-events".to_string())
        .spawn(move || {
            for event in events.iter() {
                log_event(&event);
            }
        })
        .context("spawn event printer")
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::PlaybackStateChanged(snapshot) => {
            if let Some(error) = snapshot.error.as_deref() {
                tracing::warn!(state = ?snapshot.state, "playback error: {error}");
            } else {
                tracing::debug!(
                    state = ?snapshot.state,
                    position_ms = snapshot.position_ms,
                    "state changed"
                );
            }
        }
        SessionEvent::MetadataChanged { track } => {
            tracing::info!(track_id = %track.id, "now: {}", track.display_title());
        }
        SessionEvent::QueueChanged { title, tracks } => {
            tracing::info!(title = %title, tracks = tracks.len(), "queue changed");
        }
        SessionEvent::SaveRecordRequested { track, position_ms } => {
            tracing::debug!(track_id = %track.id, position_ms, "position recorded");
        }
        SessionEvent::NotificationRequired => {}
    }
}
