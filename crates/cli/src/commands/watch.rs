// `tandem watch`: keep a local file in sync with everyone editing it.
//
// The file on disk is the editor. Saves are picked up through the OS file
// watcher (inotify on Linux, fsevents on macOS), settled by a short debounce
// window, and remote edits are written back in place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tandem_common::diff::{apply_deltas, EditorDelta};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, warn};

use super::{block_on, GlobalArgs};
use crate::output;
use crate::runtime::{self, LocalEvent, RuntimeOptions};
use crate::session::{CollabSession, EditorSurface};

const DEFAULT_DEBOUNCE_MS: u64 = 100;
const MIN_DEBOUNCE_MS: u64 = 50;
const MAX_DEBOUNCE_MS: u64 = 500;
const SIGNAL_CAPACITY: usize = 64;

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Local file to keep in sync.
    file: PathBuf,
    /// Document path on the relay. Defaults to FILE as given.
    #[arg(long)]
    document: Option<String>,
    /// Quiet period after a change before FILE is read, in milliseconds
    /// (50 to 500).
    #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS)]
    debounce_ms: u64,
    /// Heartbeat interval in seconds. Keep it below the relay's timeout.
    #[arg(long, default_value_t = runtime::HEARTBEAT_EVERY.as_secs())]
    heartbeat_secs: u64,
}

fn debounce_window(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS))
}

/// A file on disk acting as the editor.
#[derive(Debug)]
pub struct FileSurface {
    path: PathBuf,
    text: String,
}

impl FileSurface {
    /// Loads `path`; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        Ok(Self { path, text })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EditorSurface for FileSurface {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn apply_deltas(&mut self, deltas: &[EditorDelta]) -> Result<()> {
        let updated = apply_deltas(&self.text, deltas);
        if updated != self.text {
            std::fs::write(&self.path, &updated)
                .with_context(|| format!("failed to write {}", self.path.display()))?;
            self.text = updated;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOutput {
    pub document: String,
    pub file: String,
    pub final_length: usize,
}

pub fn run(args: WatchArgs, globals: &GlobalArgs) -> Result<()> {
    let client = globals.client()?;
    let document = match args.document.clone() {
        Some(document) => document,
        None => args
            .file
            .to_str()
            .map(|path| path.replace('\\', "/"))
            .context("file path is not valid UTF-8; pass --document")?,
    };
    let surface = FileSurface::open(&args.file)?;
    let session = CollabSession::new(client, document.clone(), surface);
    let options = RuntimeOptions {
        heartbeat_every: Duration::from_secs(args.heartbeat_secs.max(1)),
        ..RuntimeOptions::default()
    };
    let window = debounce_window(args.debounce_ms);
    let (watcher, signals) = FileWatcher::start(&args.file)?;
    let file = watcher.path().to_path_buf();

    let surface = block_on(async move {
        let (events, receiver) = mpsc::channel(16);
        let forwarder = tokio::spawn(forward_changes(file, signals, window, events));
        let result = runtime::run(session, receiver, options, shutdown_signal()).await;
        forwarder.abort();
        result
    })??;
    drop(watcher);

    let result = WatchOutput {
        document,
        file: surface.path().display().to_string(),
        final_length: surface.text().chars().count(),
    };
    output::print_output(globals.format(), &result, |r| {
        format!("Stopped watching {} ({} chars).", r.document, r.final_length)
    })?;
    Ok(())
}

/// OS-native watch on one file. The parent directory is watched so editors
/// that save by renaming a temp file over the original are seen too.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl FileWatcher {
    /// Starts watching `path`. Each relevant event sends one signal on the
    /// returned receiver.
    pub fn start(path: &Path) -> Result<(Self, mpsc::Receiver<()>)> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let dir = dir
            .canonicalize()
            .with_context(|| format!("failed to resolve {}", dir.display()))?;
        let name = path
            .file_name()
            .with_context(|| format!("{} does not name a file", path.display()))?;
        let target = dir.join(name);

        let (tx, rx) = mpsc::channel(SIGNAL_CAPACITY);
        let filter = target.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if touches(&event, &filter) {
                    // Full means a signal is already queued for this change.
                    let _ = tx.try_send(());
                }
            }
            Err(err) => error!(error = %err, "file watcher error"),
        })
        .context("failed to create file watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;
        debug!(path = %target.display(), "file watcher started");

        Ok((
            Self {
                _watcher: watcher,
                path: target,
            },
            rx,
        ))
    }

    /// The resolved path being watched.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether `event` may have changed the contents of `target`.
fn touches(event: &Event, target: &Path) -> bool {
    let content_change = match &event.kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    };
    content_change && event.paths.iter().any(|path| path == target)
}

/// Reads the file once its change signals have been quiet for `window` and
/// reports text that differs from what was last seen.
async fn forward_changes(
    path: PathBuf,
    mut signals: mpsc::Receiver<()>,
    window: Duration,
    events: mpsc::Sender<LocalEvent>,
) {
    let mut last = read_text(&path).await.ok().flatten();
    while signals.recv().await.is_some() {
        // Each new signal restarts the window.
        while let Ok(Some(())) = time::timeout(window, signals.recv()).await {}

        let current = match read_text(&path).await {
            Ok(current) => current,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read watched file");
                continue;
            }
        };
        if current == last {
            continue;
        }
        last = current.clone();
        if let Some(text) = current {
            debug!(path = %path.display(), "local change detected");
            if events.send(LocalEvent::Edited(text)).await.is_err() {
                return;
            }
        }
    }
}

async fn read_text(path: &Path) -> std::io::Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c; watching until the process is killed");
        std::future::pending::<()>().await;
    }
}
