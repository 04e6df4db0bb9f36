//! The `watch` loop: filesystem events in, semantic operations applied.
//!
//! The notify callback only forwards events into a bounded channel. A single
//! worker translates them, runs them through the move detector and hands the
//! resulting operations to the orchestrator, in arrival order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher as _};

use crate::config::{TEMP_PREFIX, TEMP_SUFFIX};
use crate::detector::{MoveDetector, RawEvent};
use crate::error::Error;
use crate::lockfile::InstanceLock;
use crate::orchestrator::Orchestrator;
use crate::workspace::Workspace;

/// Capacity of the raw event queue between the notify thread and the worker.
const QUEUE_CAPACITY: usize = 1024;

/// How often buffered deletions are checked for expiry.
const EXPIRY_TICK: Duration = Duration::from_millis(500);

/// Two interrupts this close together stop the watcher.
const DOUBLE_INTERRUPT: Duration = Duration::from_secs(2);

/// Rename cookies remembered for suppressed halves before the set is reset.
const MAX_SUPPRESSED_TRACKERS: usize = 1024;

/// A raw notification as delivered by notify.
type NotifyResult = Result<notify::Event, notify::Error>;

/// Translates notify events into project-relative raw events, dropping
/// anything under an ignored path.
struct Ingress<'a> {
    /// Rename cookies whose source half was one of our own temporaries.
    suppressed_trackers: HashSet<usize>,
    /// Root and ignore rules.
    workspace: &'a Workspace,
}

impl<'a> Ingress<'a> {
    /// Project-relative path, or `None` for the root itself, paths outside it,
    /// and ignored paths.
    fn accept(&self, absolute: &Path) -> Option<String> {
        let relative = self.workspace.relative(absolute)?;
        if relative.is_empty() || relative == "." || self.workspace.is_ignored(&relative) {
            return None;
        }
        return Some(relative);
    }

    /// A rename whose source is ignored. Our own atomic writes land this way
    /// and count as a modification; anything else arriving from an ignored
    /// location is new.
    fn arrival(&self, from: &Path, to: &Path) -> Option<RawEvent> {
        let path = self.accept(to)?;
        if is_temporary(from) {
            return Some(RawEvent::Modified { path });
        }
        return Some(RawEvent::Created { is_dir: to.is_dir(), path });
    }

    /// An ingress filter with no remembered renames.
    fn new(workspace: &'a Workspace) -> Self {
        return Self {
            suppressed_trackers: HashSet::new(),
            workspace,
        };
    }

    /// Translate one notify event. Metadata-only changes and access events
    /// produce nothing.
    fn translate(&mut self, event: notify::Event) -> Vec<RawEvent> {
        let tracker = event.attrs.tracker();
        let mut out = Vec::new();
        match event.kind {
            EventKind::Create(kind) => {
                for absolute in &event.paths {
                    if let Some(path) = self.accept(absolute) {
                        let is_dir = kind == CreateKind::Folder || absolute.is_dir();
                        out.push(RawEvent::Created { is_dir, path });
                    }
                }
            },
            EventKind::Modify(ModifyKind::Name(mode)) => {
                out.extend(self.translate_rename(mode, &event.paths, tracker));
            },
            EventKind::Modify(ModifyKind::Metadata(_)) => {},
            EventKind::Modify(_) => {
                for absolute in &event.paths {
                    if absolute.is_dir() {
                        continue;
                    }
                    if let Some(path) = self.accept(absolute) {
                        out.push(RawEvent::Modified { path });
                    }
                }
            },
            EventKind::Remove(kind) => {
                for absolute in &event.paths {
                    if let Some(path) = self.accept(absolute) {
                        out.push(RawEvent::Removed {
                            is_dir: kind == RemoveKind::Folder,
                            path,
                        });
                    }
                }
            },
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {},
        }
        return out;
    }

    /// Translate the rename family, applying the ignore rules to each end.
    fn translate_rename(&mut self, mode: RenameMode, event_paths: &[PathBuf], tracker: Option<usize>) -> Option<RawEvent> {
        let first = event_paths.first()?;
        match mode {
            RenameMode::Both => {
                let to = event_paths.get(1)?;
                if tracker.is_some_and(|cookie| return self.suppressed_trackers.remove(&cookie)) {
                    return None;
                }
                return match (self.accept(first), self.accept(to)) {
                    (Some(from), Some(to_path)) => Some(RawEvent::Renamed {
                        from,
                        is_dir: to.is_dir(),
                        to: to_path,
                        tracker,
                    }),
                    (Some(from), None) => Some(RawEvent::Removed {
                        is_dir: to.is_dir(),
                        path: from,
                    }),
                    (None, Some(_)) => self.arrival(first, to),
                    (None, None) => None,
                };
            },
            RenameMode::From => {
                let Some(path) = self.accept(first) else {
                    if let Some(cookie) = tracker
                        && is_temporary(first)
                    {
                        if self.suppressed_trackers.len() >= MAX_SUPPRESSED_TRACKERS {
                            self.suppressed_trackers.clear();
                        }
                        self.suppressed_trackers.insert(cookie);
                    }
                    return None;
                };
                return Some(RawEvent::RenamedFrom { path, tracker });
            },
            RenameMode::To => {
                let path = self.accept(first)?;
                if tracker.is_some_and(|cookie| return self.suppressed_trackers.contains(&cookie)) {
                    return Some(RawEvent::Modified { path });
                }
                return Some(RawEvent::RenamedTo {
                    is_dir: first.is_dir(),
                    path,
                    tracker,
                });
            },
            RenameMode::Any | RenameMode::Other => {
                let path = self.accept(first)?;
                if first.exists() {
                    return Some(RawEvent::RenamedTo {
                        is_dir: first.is_dir(),
                        path,
                        tracker,
                    });
                }
                return Some(RawEvent::RenamedFrom { path, tracker });
            },
        }
    }
}

/// Create a recursive watcher on `root` that forwards every notification.
///
/// # Errors
///
/// Returns `Error::Watch` if the platform watcher cannot be created or
/// cannot subscribe to `root`.
fn create_watcher(root: &Path, tx: Sender<NotifyResult>) -> Result<notify::RecommendedWatcher, Error> {
    let mut watcher = notify::recommended_watcher(move |res: NotifyResult| {
        let _ = tx.send(res);
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    return Ok(watcher);
}

/// Hand every operation the detector produces to the orchestrator.
fn dispatch(detector: &MoveDetector, orchestrator: &Orchestrator, raw: RawEvent, now: Instant) {
    for operation in detector.handle(raw, now) {
        orchestrator.apply(&operation);
    }
    return;
}

/// Apply whatever is still queued after the watcher stopped.
fn drain(events: &Receiver<NotifyResult>, ingress: &mut Ingress<'_>, detector: &MoveDetector, orchestrator: &Orchestrator) {
    for event in events.try_iter().filter_map(Result::ok) {
        for raw in ingress.translate(event) {
            dispatch(detector, orchestrator, raw, Instant::now());
        }
    }
    return;
}

/// Whether a path names one of our atomic-write temporaries.
fn is_temporary(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| return n.to_str()).unwrap_or_default();
    return name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX);
}

/// Entry point for `watch`: lock the tree, optionally seed the index, and
/// apply filesystem events until interrupted twice in quick succession.
///
/// # Errors
///
/// Returns `Error::LockHeld` if another watcher owns the tree, `Error::Watch`
/// if the subscription fails, or `Error::SignalSetup` if the interrupt
/// listener cannot start.
pub fn run(workspace: Workspace) -> Result<(), Error> {
    let lock = InstanceLock::acquire(workspace.root())?;
    let root = workspace.root().to_path_buf();
    let initial_scan = workspace.config().initial_scan_enabled;
    let detector = MoveDetector::new(root.clone(), workspace.config());
    let orchestrator = Orchestrator::new(workspace);

    let shutdown = spawn_interrupt_listener()?;
    let (tx, events) = crossbeam_channel::bounded(QUEUE_CAPACITY);
    let watcher = create_watcher(&root, tx)?;

    if initial_scan {
        let scanned = std::thread::scope(|scope| {
            return scope.spawn(|| return orchestrator.scan()).join();
        });
        if scanned.is_err() {
            tracing::warn!("initial scan aborted; continuing with a partial index");
        }
    }
    tracing::info!(
        root = %root.display(),
        lock = %lock.path().display(),
        "watching for changes; press Ctrl+C twice to stop"
    );

    let mut ingress = Ingress::new(orchestrator.workspace());
    let ticker = crossbeam_channel::tick(EXPIRY_TICK);
    loop {
        crossbeam_channel::select! {
            recv(events) -> message => match message {
                Ok(Ok(event)) => {
                    for raw in ingress.translate(event) {
                        dispatch(&detector, &orchestrator, raw, Instant::now());
                    }
                },
                Ok(Err(e)) => tracing::warn!(error = %e, "watcher error"),
                Err(_) => break,
            },
            recv(ticker) -> _ => {
                for operation in detector.expire(Instant::now()) {
                    orchestrator.apply(&operation);
                }
            },
            recv(shutdown) -> _ => break,
        }
    }

    drop(watcher);
    drain(&events, &mut ingress, &detector, &orchestrator);
    for operation in detector.flush() {
        orchestrator.apply(&operation);
    }
    drop(lock);
    return Ok(());
}

/// Listen for Ctrl+C on a background thread. The returned channel fires
/// once two interrupts arrive within `DOUBLE_INTERRUPT`.
///
/// # Errors
///
/// Returns `Error::SignalSetup` if the signal runtime cannot be built.
fn spawn_interrupt_listener() -> Result<Receiver<()>, Error> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| return Error::SignalSetup { reason: e.to_string() })?;
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        runtime.block_on(async {
            let mut last: Option<Instant> = None;
            while tokio::signal::ctrl_c().await.is_ok() {
                let now = Instant::now();
                if last.is_some_and(|at| return now.saturating_duration_since(at) <= DOUBLE_INTERRUPT) {
                    tracing::info!(event = "shutdown_requested", "shutting down");
                    let _ = tx.send(());
                    return;
                }
                tracing::info!("press Ctrl+C again within 2 s to stop");
                last = Some(now);
            }
            tracing::warn!("interrupt listener stopped");
        });
    });
    return Ok(rx);
}
