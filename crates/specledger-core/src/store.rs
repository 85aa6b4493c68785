//! Per-spec issue persistence.
//!
//! Each spec directory owns one `issues.jsonl` (one JSON record per line) and
//! an adjacent `issues.jsonl.lock`. Mutations take an in-process mutex, then
//! try the advisory file lock without blocking; contention surfaces as
//! [`SpecLedgerError::StoreLocked`]. Creates append a single line; every other
//! mutation rewrites the file atomically.

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SpecLedgerError};
use crate::graph;
use crate::io::{append_line, atomic_write};
use crate::issue::{DefinitionOfDone, Issue, IssueStatus, IssueType};
use crate::paths;
use fs2::FileExt;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Advisory file lock
// ---------------------------------------------------------------------------

/// Exclusive advisory lock held for the lifetime of the guard.
struct FileLock {
    file: File,
}

impl FileLock {
    fn try_acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Self { file }),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
            {
                Err(SpecLedgerError::StoreLocked(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "failed to release issue store lock");
        }
    }
}

// ---------------------------------------------------------------------------
// Filter / update / repair types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<IssueStatus>,
    pub issue_type: Option<IssueType>,
    pub priority: Option<i32>,
    /// Every listed label must be present on the record.
    pub labels: Vec<String>,
    /// Only records with a non-empty `blocked_by`.
    pub blocked: bool,
    /// Walk every spec directory next to this one.
    pub all: bool,
}

impl ListFilter {
    pub fn matches(&self, issue: &Issue) -> bool {
        if self.status.is_some_and(|s| s != issue.status) {
            return false;
        }
        if self.issue_type.is_some_and(|t| t != issue.issue_type) {
            return false;
        }
        if self.priority.is_some_and(|p| p != issue.priority) {
            return false;
        }
        if !issue.has_labels(&self.labels) {
            return false;
        }
        if self.blocked && issue.blocked_by.is_empty() {
            return false;
        }
        true
    }
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<IssueStatus>,
    pub priority: Option<i32>,
    pub issue_type: Option<IssueType>,
    pub assignee: Option<String>,
    pub notes: Option<String>,
    pub design: Option<String>,
    pub acceptance_criteria: Option<String>,
    /// `Some(None)` clears the parent.
    pub parent_id: Option<Option<String>>,
    pub labels: Option<Vec<String>>,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
    pub definition_of_done: Option<DefinitionOfDone>,
    pub check_dod: Vec<String>,
    pub uncheck_dod: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedLine {
    pub line_num: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub valid_lines: usize,
    pub invalid_lines: usize,
    pub recovered_issues: usize,
    pub skipped_lines: Vec<SkippedLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// IssueStore
// ---------------------------------------------------------------------------

pub struct IssueStore {
    base: PathBuf,
    spec: String,
    path: PathBuf,
    lock_path: PathBuf,
    mu: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for IssueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssueStore")
            .field("spec", &self.spec)
            .field("path", &self.path)
            .finish()
    }
}

impl IssueStore {
    /// Open the store for `spec` under `base` (usually `<root>/specledger`).
    /// Nothing is created on disk until the first write.
    pub fn open(base: impl Into<PathBuf>, spec: &str) -> Result<Self> {
        paths::validate_spec_context(spec)?;
        let base = base.into();
        let path = paths::issues_path(&base, spec);
        let lock_path = paths::lock_path_for(&path);
        Ok(Self {
            base,
            spec: spec.to_string(),
            path,
            lock_path,
            mu: Mutex::new(()),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // -----------------------------------------------------------------------
    // Locking
    // -----------------------------------------------------------------------

    /// Run `f` holding the mutex and the advisory lock. Guards drop in
    /// reverse acquisition order on every exit path, panics included.
    pub(crate) fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.mu.lock().unwrap_or_else(|p| p.into_inner());
        let _lock = FileLock::try_acquire(&self.lock_path)?;
        f()
    }

    fn with_read<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.mu.lock().unwrap_or_else(|p| p.into_inner());
        f()
    }

    // -----------------------------------------------------------------------
    // Raw file access (callers hold the appropriate guard)
    // -----------------------------------------------------------------------

    pub(crate) fn read_all_unlocked(&self) -> Result<Vec<Issue>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut issues = Vec::new();
        for (idx, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Issue>(line) {
                Ok(issue) => issues.push(issue),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = idx + 1,
                        error = %e,
                        "skipping unreadable issue line"
                    );
                }
            }
        }
        Ok(issues)
    }

    pub(crate) fn write_all_unlocked(&self, issues: &[Issue]) -> Result<()> {
        let mut buf = String::new();
        for issue in issues {
            buf.push_str(&serde_json::to_string(issue)?);
            buf.push('\n');
        }
        atomic_write(&self.path, buf.as_bytes())
    }

    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    /// Validate and append a new record. The record is scoped to this store's
    /// spec regardless of what the caller set.
    pub fn create(&self, mut issue: Issue) -> Result<Issue> {
        issue.spec_context = self.spec.clone();
        issue.validate()?;
        self.with_lock(|| {
            let existing = self.read_all_unlocked()?;
            if existing.iter().any(|i| i.id == issue.id) {
                return Err(SpecLedgerError::AlreadyExists(issue.id.clone()));
            }
            let line = serde_json::to_string(&issue)?;
            append_line(&self.path, &line)?;
            tracing::debug!(id = %issue.id, spec = %self.spec, "created issue");
            Ok(issue)
        })
    }

    pub fn get(&self, id: &str) -> Result<Issue> {
        self.with_read(|| {
            self.read_all_unlocked()?
                .into_iter()
                .find(|i| i.id == id)
                .ok_or_else(|| SpecLedgerError::NotFound(id.to_string()))
        })
    }

    pub fn list(&self, filter: &ListFilter) -> Result<Vec<Issue>> {
        if filter.all {
            return list_all_specs(&self.base, filter);
        }
        self.with_read(|| {
            Ok(self
                .read_all_unlocked()?
                .into_iter()
                .filter(|i| filter.matches(i))
                .collect())
        })
    }

    pub fn update(&self, id: &str, update: IssueUpdate) -> Result<Issue> {
        self.with_lock(|| {
            let mut issues = self.read_all_unlocked()?;
            let idx = issues
                .iter()
                .position(|i| i.id == id)
                .ok_or_else(|| SpecLedgerError::NotFound(id.to_string()))?;

            if let Some(Some(parent)) = &update.parent_id {
                graph::check_parent(&issues, id, parent)?;
            }

            let now = self.clock.now();
            let issue = &mut issues[idx];
            apply_update(issue, update, now)?;
            issue.updated_at = now.max(issue.created_at);
            issue.validate()?;
            let updated = issue.clone();

            self.write_all_unlocked(&issues)?;
            tracing::debug!(id = %updated.id, status = %updated.status, "updated issue");
            Ok(updated)
        })
    }

    /// Remove a record. References to it from other records' dependency and
    /// parent fields are dropped in the same rewrite.
    pub fn delete(&self, id: &str) -> Result<()> {
        self.with_lock(|| {
            let mut issues = self.read_all_unlocked()?;
            let before = issues.len();
            issues.retain(|i| i.id != id);
            if issues.len() == before {
                return Err(SpecLedgerError::NotFound(id.to_string()));
            }
            let now = self.clock.now();
            for other in issues.iter_mut() {
                let had = other.blocks.len() + other.blocked_by.len();
                other.blocks.retain(|b| b != id);
                other.blocked_by.retain(|b| b != id);
                let orphaned = other.parent_id.as_deref() == Some(id);
                if orphaned {
                    other.parent_id = None;
                }
                if orphaned || had != other.blocks.len() + other.blocked_by.len() {
                    other.updated_at = now.max(other.created_at);
                }
            }
            self.write_all_unlocked(&issues)
        })
    }

    // -----------------------------------------------------------------------
    // Repair
    // -----------------------------------------------------------------------

    /// Keep every line that parses and validates, back up the original
    /// verbatim as `issues.jsonl.bak`, and atomically rewrite the kept lines.
    pub fn repair(&self) -> Result<RepairReport> {
        self.with_lock(|| {
            let data = match std::fs::read_to_string(&self.path) {
                Ok(d) => d,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(RepairReport::default())
                }
                Err(e) => return Err(e.into()),
            };

            let mut report = RepairReport::default();
            let mut kept: Vec<&str> = Vec::new();
            let mut seen = std::collections::HashSet::new();

            for (idx, raw) in data.lines().enumerate() {
                let line_num = idx + 1;
                if raw.trim().is_empty() {
                    continue;
                }
                let reason = match serde_json::from_str::<Issue>(raw.trim()) {
                    Err(_) => Some("Invalid JSON".to_string()),
                    Ok(issue) => match issue.validate() {
                        Err(e) => Some(e.to_string()),
                        Ok(()) if !seen.insert(issue.id.clone()) => {
                            Some(format!("duplicate issue ID {}", issue.id))
                        }
                        Ok(()) => None,
                    },
                };
                match reason {
                    None => {
                        report.valid_lines += 1;
                        kept.push(raw);
                    }
                    Some(reason) => {
                        report.invalid_lines += 1;
                        report.skipped_lines.push(SkippedLine { line_num, reason });
                    }
                }
            }
            report.recovered_issues = kept.len();

            let backup = paths::backup_path_for(&self.path);
            std::fs::copy(&self.path, &backup)?;
            report.backup_path = Some(backup);

            let mut out = String::with_capacity(data.len());
            for line in kept {
                out.push_str(line);
                out.push('\n');
            }
            atomic_write(&self.path, out.as_bytes())?;

            if report.invalid_lines > 0 {
                tracing::warn!(
                    path = %self.path.display(),
                    skipped = report.invalid_lines,
                    "repair dropped invalid issue lines"
                );
            }
            Ok(report)
        })
    }
}

fn apply_update(
    issue: &mut Issue,
    update: IssueUpdate,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    if let Some(v) = update.title {
        issue.title = v;
    }
    if let Some(v) = update.description {
        issue.description = v;
    }
    if let Some(v) = update.status {
        issue.status = v;
    }
    if let Some(v) = update.priority {
        issue.priority = v;
    }
    if let Some(v) = update.issue_type {
        issue.issue_type = v;
    }
    if let Some(v) = update.assignee {
        issue.assignee = v;
    }
    if let Some(v) = update.notes {
        issue.notes = v;
    }
    if let Some(v) = update.design {
        issue.design = v;
    }
    if let Some(v) = update.acceptance_criteria {
        issue.acceptance_criteria = v;
    }
    if let Some(v) = update.parent_id {
        issue.parent_id = v;
    }

    // Labels: full replacement first, then set-add / set-remove.
    if let Some(labels) = update.labels {
        issue.labels.clear();
        for l in &labels {
            issue.add_label(l);
        }
    }
    for l in &update.add_labels {
        issue.add_label(l);
    }
    for l in &update.remove_labels {
        issue.remove_label(l);
    }

    // Definition of done: replacement, then check / uncheck.
    if let Some(dod) = update.definition_of_done {
        issue.definition_of_done = Some(dod);
    }
    if !update.check_dod.is_empty() || !update.uncheck_dod.is_empty() {
        let dod = issue.definition_of_done.get_or_insert_with(Default::default);
        for text in &update.check_dod {
            if !dod.check(text, now) {
                return Err(SpecLedgerError::InvalidRecord(format!(
                    "definition of done has no item '{text}'"
                )));
            }
        }
        for text in &update.uncheck_dod {
            if !dod.uncheck(text) {
                return Err(SpecLedgerError::InvalidRecord(format!(
                    "definition of done has no item '{text}'"
                )));
            }
        }
    }

    if issue.status == IssueStatus::Closed {
        if !issue.dod_complete() {
            let unchecked = issue
                .definition_of_done
                .as_ref()
                .map(DefinitionOfDone::unchecked_items)
                .unwrap_or_default();
            return Err(SpecLedgerError::DoDIncomplete {
                id: issue.id.clone(),
                unchecked,
            });
        }
        if issue.closed_at.is_none() {
            issue.closed_at = Some(now.max(issue.created_at));
        }
    } else {
        issue.closed_at = None;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Cross-spec helpers
// ---------------------------------------------------------------------------

/// Spec directories under `base` that hold an issues file, sorted by name.
pub fn list_spec_dirs(base: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(base) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut specs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if paths::is_spec_context(&name) && entry.path().join(paths::ISSUES_FILE).is_file() {
            specs.push(name);
        }
    }
    specs.sort();
    Ok(specs)
}

/// Point-in-time union of every spec's filtered records.
pub fn list_all_specs(base: &Path, filter: &ListFilter) -> Result<Vec<Issue>> {
    let local = ListFilter {
        all: false,
        ..filter.clone()
    };
    let mut out = Vec::new();
    for spec in list_spec_dirs(base)? {
        let store = IssueStore::open(base, &spec)?;
        out.extend(store.list(&local)?);
    }
    Ok(out)
}

/// First record with `id` in any spec, together with the spec that held it.
pub fn find_across_specs(base: &Path, id: &str) -> Result<(Issue, String)> {
    for spec in list_spec_dirs(base)? {
        let store = IssueStore::open(base, &spec)?;
        match store.get(id) {
            Ok(issue) => return Ok((issue, spec)),
            Err(SpecLedgerError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(SpecLedgerError::NotFound(id.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
