//! CLI commands for linkmend: watch, scan, check, mv.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::{Config, Overrides};
use crate::error::Error;
use crate::index;
use crate::lockfile::InstanceLock;
use crate::logging;
use crate::orchestrator::{EditPlan, Orchestrator};
use crate::paths;
use crate::types::{Operation, Reference};
use crate::watch;
use crate::workspace::Workspace;

/// Where and how a command runs, as given on the command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// `--config`, when given.
    pub config: Option<PathBuf>,
    /// Flags that override the config file.
    pub overrides: Overrides,
    /// `--root`.
    pub root: PathBuf,
}

impl Invocation {
    /// Resolve the root, load and validate the config, and start logging.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if the root does not exist, any config
    /// loading error, or a logging setup error.
    fn open(&self) -> Result<Workspace, Error> {
        let root = match std::fs::canonicalize(&self.root) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound {
                    path: self.root.clone(),
                });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(r) => r,
        };
        let mut config = Config::load(&root, self.config.as_deref())?;
        config.apply_overrides(&self.overrides);
        config.validate()?;
        logging::init(&root, &config)?;
        return Ok(Workspace::new(root, config));
    }
}

/// Scan once and list references whose target does not exist.
/// Exit 0 when everything resolves, 2 otherwise.
///
/// # Errors
///
/// Returns setup errors; unreadable files are skipped, not fatal.
pub fn check(invocation: &Invocation) -> Result<ExitCode, Error> {
    let orchestrator = Orchestrator::new(invocation.open()?);
    orchestrator.scan();
    let root = orchestrator.workspace().root();

    let references = all_references(&orchestrator);
    let broken: Vec<&Reference> = references
        .iter()
        .filter(|reference| {
            let from_source = root.join(index::resolved_target(reference));
            let from_root = root.join(paths::normalize(reference.target_path()));
            return !from_source.exists() && !from_root.exists();
        })
        .collect();

    for reference in &broken {
        println!("BROKEN  {}:{}  {}", reference.source, reference.line, reference.target);
    }
    if broken.is_empty() {
        println!("All {} references resolve", references.len());
        return Ok(ExitCode::SUCCESS);
    }
    println!();
    println!("{} broken of {} references", broken.len(), references.len());
    return Ok(ExitCode::from(2));
}

/// Every record in the index, ordered by position in the tree.
fn all_references(orchestrator: &Orchestrator) -> Vec<Reference> {
    let mut references: Vec<Reference> = orchestrator.index().snapshot().into_values().flatten().collect();
    references.sort_by(|a, b| {
        return (&a.source, a.line, a.column_start).cmp(&(&b.source, b.line, b.column_start));
    });
    return references;
}

/// Move a file or directory and run the same operation the watcher would.
/// With `--dry-run`, print the planned edits and leave the disk alone.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if `from` does not exist,
/// `Error::PathOutsideRoot` if either path leaves the tree, `Error::LockHeld`
/// if a watcher owns the tree, and `Error::Io` if the destination exists or
/// the move itself fails.
pub fn mv(invocation: &Invocation, from: &Path, to: &Path) -> Result<ExitCode, Error> {
    let workspace = invocation.open()?;
    let root = workspace.root().to_path_buf();
    let from_rel = project_path(&workspace, from)?;
    let mut to_rel = project_path(&workspace, to)?;

    let source = root.join(&from_rel);
    if std::fs::symlink_metadata(&source).is_err() {
        return Err(Error::FileNotFound {
            path: from.to_path_buf(),
        });
    }
    if root.join(&to_rel).is_dir() {
        to_rel = format!("{to_rel}/{}", paths::basename(&from_rel));
    }
    if root.join(&to_rel).exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("destination `{to_rel}` already exists"),
        )));
    }
    if paths::is_under(&from_rel, &to_rel) {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cannot move `{from_rel}` into itself"),
        )));
    }

    let operation = if source.is_dir() {
        Operation::DirectoryMoved {
            from: from_rel.clone(),
            to: to_rel.clone(),
        }
    } else {
        Operation::Moved {
            from: from_rel.clone(),
            to: to_rel.clone(),
        }
    };
    let dry_run = workspace.config().dry_run_mode;
    let lock = if dry_run { None } else { Some(InstanceLock::acquire(&root)?) };
    let orchestrator = Orchestrator::new(workspace);
    orchestrator.scan();

    if dry_run {
        let plan = orchestrator.preview(&operation);
        print_plan(&plan);
        let total: usize = plan.values().map(Vec::len).sum();
        println!("Would move {from_rel} -> {to_rel} and update {total} links in {} files", plan.len());
        return Ok(ExitCode::SUCCESS);
    }

    let destination = root.join(&to_rel);
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(&source, &destination)?;
    let report = orchestrator.apply(&operation);
    drop(lock);

    for (file, reason) in &report.rewrite.failures {
        eprintln!("FAILED  {file}: {reason}");
    }
    println!(
        "Moved {from_rel} -> {to_rel}; updated {} links in {} files",
        report.rewrite.total(),
        report.rewrite.files.len()
    );
    if report.rewrite.failures.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }
    return Ok(ExitCode::FAILURE);
}

/// One line per planned edit.
fn print_plan(plan: &EditPlan) {
    for (file, edits) in plan {
        for edit in edits {
            println!("{file}:{}  {} -> {}", edit.line, edit.original, edit.replacement);
        }
    }
    return;
}

/// Project-relative form of a command-line path. Relative paths are taken
/// from the project root.
///
/// # Errors
///
/// Returns `Error::PathOutsideRoot` for paths outside the tree or the root itself.
fn project_path(workspace: &Workspace, raw: &Path) -> Result<String, Error> {
    let absolute = if raw.is_absolute() { raw.to_path_buf() } else { workspace.root().join(raw) };
    let canonical = match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => {
            std::fs::canonicalize(parent).map_or_else(|_| return absolute.clone(), |p| return p.join(name))
        },
        _ => absolute.clone(),
    };
    return workspace
        .relative(&canonical)
        .filter(|relative| return !relative.is_empty())
        .ok_or_else(|| {
            return Error::PathOutsideRoot {
                path: raw.to_path_buf(),
            };
        });
}

/// Scan once and print every reference, as text or a JSON array. Always exits 0.
///
/// # Errors
///
/// Returns setup errors, or `Error::Json` if serialization fails.
pub fn scan(invocation: &Invocation, json: bool) -> Result<ExitCode, Error> {
    let orchestrator = Orchestrator::new(invocation.open()?);
    let stats = orchestrator.scan();
    let references = all_references(&orchestrator);

    if json {
        println!("{}", serde_json::to_string_pretty(&references)?);
        return Ok(ExitCode::SUCCESS);
    }
    for reference in &references {
        println!(
            "{}:{}:{}  {}  {}",
            reference.source,
            reference.line,
            reference.column_start.saturating_add(1),
            reference.kind.label(),
            reference.target
        );
    }
    let index_stats = orchestrator.index().stats();
    println!();
    println!(
        "{} references to {} targets from {} of {} files ({} skipped)",
        index_stats.records, index_stats.targets, index_stats.sources, stats.files_parsed, stats.files_skipped
    );
    return Ok(ExitCode::SUCCESS);
}

/// Watch the tree until interrupted. Exits 0 on a clean shutdown.
///
/// # Errors
///
/// Returns setup, lock, watcher, and signal errors.
pub fn watch(invocation: &Invocation) -> Result<ExitCode, Error> {
    watch::run(invocation.open()?)?;
    return Ok(ExitCode::SUCCESS);
}
