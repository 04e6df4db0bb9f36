//! Applies semantic operations to the index and the files on disk.
//!
//! One operation at a time: copy the affected records out of the index,
//! plan and write the edits with no lock held, then rekey and re-parse.

use std::collections::{BTreeMap, BTreeSet};

use crate::index::{self, ReferenceIndex};
use crate::paths;
use crate::rewriter::{self, Edit, EditRequest, RewriteReport, WriteOptions};
use crate::scanner::{self, ScanStats};
use crate::types::{Operation, Reference};
use crate::workspace::Workspace;

/// Edits grouped by the file that holds them.
pub type EditPlan = BTreeMap<String, Vec<Edit>>;

/// Owns the index and applies operations against it.
#[derive(Debug)]
pub struct Orchestrator {
    /// Every known reference in the tree.
    index: ReferenceIndex,
    /// How rewritten files are written.
    options: WriteOptions,
    /// Root, configuration and parser.
    workspace: Workspace,
}

/// Outcome of one operation.
#[derive(Debug, Default)]
pub struct OperationReport {
    /// References left pointing at something that was deleted.
    pub broken: Vec<Reference>,
    /// Files rewritten and per-file failures.
    pub rewrite: RewriteReport,
}

impl Orchestrator {
    /// Apply one operation. Per-file failures are logged and collected in
    /// the report; they never abort the operation.
    pub fn apply(&self, operation: &Operation) -> OperationReport {
        let span = tracing::info_span!("operation", kind = operation.kind(), path = %operation.path());
        let _entered = span.enter();

        let report = match operation {
            Operation::Created { path } => {
                self.on_created(path);
                OperationReport::default()
            },
            Operation::Deleted { path } => self.on_deleted(path),
            Operation::DirectoryMoved { from, to } => self.on_directory_moved(from, to),
            Operation::Modified { path } => {
                self.on_modified(path);
                OperationReport::default()
            },
            Operation::Moved { from, to } => self.on_moved(from, to),
        };
        tracing::debug!(
            event = "operation_completed",
            links_updated = report.rewrite.total(),
            files_failed = report.rewrite.failures.len(),
            broken = report.broken.len(),
            "operation completed"
        );
        return report;
    }

    /// The reference index.
    pub const fn index(&self) -> &ReferenceIndex {
        return &self.index;
    }

    /// An orchestrator with an empty index.
    pub fn new(workspace: Workspace) -> Self {
        return Self {
            index: ReferenceIndex::default(),
            options: WriteOptions::from_config(workspace.config()),
            workspace,
        };
    }

    /// A new file is parsed; a new directory is scanned.
    fn on_created(&self, path: &str) {
        let absolute = self.workspace.root().join(path);
        if absolute.is_dir() {
            let stats = scanner::scan_subtree(&self.workspace, &self.index, path);
            tracing::info!(event = "file_created", path, is_dir = true, references = stats.references, "directory created");
            return;
        }
        if !self.workspace.is_monitored(path) {
            return;
        }
        match scanner::index_file(&self.workspace, &self.index, path) {
            Ok(stored) => tracing::info!(event = "file_created", path, references = stored, "file created"),
            Err(e) => tracing::warn!(event = "file_created", path, error = %e, "could not parse new file"),
        }
        return;
    }

    /// Forget what the deleted entry referred to; report what still refers to it.
    fn on_deleted(&self, path: &str) -> OperationReport {
        let mut removed = self.index.remove_source(path);
        for source in self.index.sources_under(path) {
            removed = removed.saturating_add(self.index.remove_source(&source));
        }

        let mut targets = vec![path.to_string()];
        targets.extend(self.index.targets_under(path));
        let mut seen = BTreeSet::new();
        let mut broken = Vec::new();
        for target in &targets {
            for reference in self.index.lookup(target) {
                if seen.insert((reference.source.clone(), reference.line, reference.column_start)) {
                    broken.push(reference);
                }
            }
        }

        if !broken.is_empty() {
            let listing: Vec<String> = broken
                .iter()
                .map(|r| return format!("{}:{} -> {}", r.source, r.line, r.target))
                .collect();
            tracing::warn!(
                event = "broken_references_found",
                path,
                count = broken.len(),
                references = ?listing,
                "references point at a deleted path"
            );
        }
        tracing::info!(event = "file_deleted", path, records_removed = removed, "path deleted");
        return OperationReport {
            broken,
            rewrite: RewriteReport::default(),
        };
    }

    /// Rewrite every reference into the moved directory, rekey, and rescan it.
    /// Every file whose records were rekeyed is re-parsed, so a failed or
    /// skipped rewrite leaves its records under the target its text names.
    fn on_directory_moved(&self, from: &str, to: &str) -> OperationReport {
        let moved_sources = self.index.sources_under(from);
        let plan = self.plan_directory_move(from, to);
        let rewrite = rewriter::rewrite_files(self.workspace.root(), plan, self.options);

        let mut stale: BTreeSet<String> = rewrite.files.keys().cloned().collect();
        for key in self.index.keys_under(from) {
            if let Some(new_key) = paths::swap_prefix(&key, from, to) {
                stale.extend(self.index.rekey(&key, &new_key));
            }
        }
        for source in &moved_sources {
            self.index.remove_source(source);
        }
        let stats = scanner::scan_subtree(&self.workspace, &self.index, to);
        self.reindex(stale.iter().filter(|file| return !paths::is_under(from, file) && !paths::is_under(to, file)));

        tracing::info!(
            event = "directory_moved",
            %from,
            %to,
            links_updated = rewrite.total(),
            files_rescanned = stats.files_parsed,
            "directory moved"
        );
        return OperationReport {
            broken: Vec::new(),
            rewrite,
        };
    }

    /// Re-parse a changed file.
    fn on_modified(&self, path: &str) {
        if !self.workspace.is_monitored(path) || !self.workspace.root().join(path).is_file() {
            return;
        }
        match scanner::index_file(&self.workspace, &self.index, path) {
            Ok(stored) => tracing::debug!(event = "file_modified", path, references = stored, "file re-parsed"),
            Err(e) => {
                self.index.remove_source(path);
                tracing::warn!(event = "file_modified", path, error = %e, "could not re-parse file");
            },
        }
        return;
    }

    /// Rewrite every reference to the moved file, and its own relative
    /// links, then rekey and re-parse.
    fn on_moved(&self, from: &str, to: &str) -> OperationReport {
        if self.workspace.root().join(to).is_dir() {
            return self.on_directory_moved(from, to);
        }
        let plan = self.plan_file_move(from, to);
        let rewrite = rewriter::rewrite_files(self.workspace.root(), plan, self.options);

        let mut stale: BTreeSet<String> = rewrite.files.keys().cloned().collect();
        stale.extend(self.index.rekey(from, to));
        self.index.remove_source(from);
        if self.workspace.is_monitored(to) {
            self.reindex(std::iter::once(&to.to_string()));
        }
        self.reindex(stale.iter().filter(|file| return file.as_str() != from && file.as_str() != to));

        tracing::info!(event = "file_moved", %from, %to, links_updated = rewrite.total(), "file moved");
        return OperationReport {
            broken: Vec::new(),
            rewrite,
        };
    }

    /// Edits for a directory move: references into the directory from
    /// anywhere, plus outbound links of files inside it. Hosts are named by
    /// their location after the move.
    fn plan_directory_move(&self, from: &str, to: &str) -> EditPlan {
        let mut plan = EditPlan::new();
        for old_target in self.index.targets_under(from) {
            let Some(new_target) = paths::swap_prefix(&old_target, from, to) else {
                continue;
            };
            for reference in self.index.lookup(&old_target) {
                let host = paths::swap_prefix(&reference.source, from, to).unwrap_or_else(|| return reference.source.clone());
                let request = EditRequest {
                    host: &host,
                    new_target: &new_target,
                    old_target: &old_target,
                    reference: &reference,
                };
                if let Some(edit) = rewriter::plan_edit(&request) {
                    plan.entry(host.clone()).or_default().push(edit);
                }
            }
        }

        if !self.workspace.config().update_moved_file_links {
            return plan;
        }
        for source in self.index.sources_under(from) {
            let Some(new_source) = paths::swap_prefix(&source, from, to) else {
                continue;
            };
            for reference in self.index.records_from(&source) {
                if paths::is_under(from, &index::resolved_target(&reference)) {
                    continue;
                }
                if let Some(edit) = rewriter::plan_outbound_edit(self.workspace.root(), &reference, &source, &new_source) {
                    plan.entry(new_source.clone()).or_default().push(edit);
                }
            }
        }
        return plan;
    }

    /// Edits for a file move: every record that refers to `from`, found by
    /// exact path, first-directory-stripped path and file name, plus the
    /// moved file's own relative links.
    fn plan_file_move(&self, from: &str, to: &str) -> EditPlan {
        let mut candidates: BTreeMap<(String, u32, usize), Reference> = BTreeMap::new();
        let stripped = from.split_once('/').map(|(_, rest)| return rest);
        let lookups = [Some(from), stripped, Some(paths::basename(from))];
        for target in lookups.into_iter().flatten() {
            for reference in self.index.lookup(target) {
                candidates
                    .entry((reference.source.clone(), reference.line, reference.column_start))
                    .or_insert(reference);
            }
        }

        let mut plan = EditPlan::new();
        for reference in candidates.values() {
            let host = if reference.source == from { to } else { reference.source.as_str() };
            let request = EditRequest {
                host,
                new_target: to,
                old_target: from,
                reference,
            };
            if let Some(edit) = rewriter::plan_edit(&request) {
                plan.entry(host.to_string()).or_default().push(edit);
            }
        }
        if self.workspace.is_monitored(to) && self.workspace.config().update_moved_file_links {
            for reference in self.index.records_from(from) {
                if let Some(edit) = rewriter::plan_outbound_edit(self.workspace.root(), &reference, from, to) {
                    plan.entry(to.to_string()).or_default().push(edit);
                }
            }
        }
        return plan;
    }

    /// The edits a move would make, computed from the index alone. Nothing
    /// is written and the index is left as it is. Other operations never
    /// edit files and preview as empty.
    pub fn preview(&self, operation: &Operation) -> EditPlan {
        return match operation {
            Operation::DirectoryMoved { from, to } => self.plan_directory_move(from, to),
            Operation::Moved { from, to } => self.plan_file_move(from, to),
            Operation::Created { .. } | Operation::Deleted { .. } | Operation::Modified { .. } => EditPlan::new(),
        };
    }

    /// Re-parse files whose content or location changed.
    fn reindex<'a>(&self, files: impl IntoIterator<Item = &'a String>) {
        for file in files {
            if !self.workspace.is_monitored(file) {
                continue;
            }
            if let Err(e) = scanner::index_file(&self.workspace, &self.index, file) {
                tracing::warn!(file = %file, error = %e, "could not re-parse file");
                self.index.remove_source(file);
            }
        }
        return;
    }

    /// Seed the index from the whole tree.
    pub fn scan(&self) -> ScanStats {
        return scanner::scan(&self.workspace, &self.index);
    }

    /// Root, configuration and parser.
    pub const fn workspace(&self) -> &Workspace {
        return &self.workspace;
    }
}
