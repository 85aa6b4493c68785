//! One-shot import of a Beads issue export (`.beads/issues.jsonl`).
//!
//! Each Beads record is mapped to a spec context, converted to an [`Issue`]
//! whose ID is derived from the original creation time, and appended to that
//! spec's store. Blocking dependencies are rewritten to the new IDs on both
//! endpoints before anything is written.

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SpecLedgerError};
use crate::id;
use crate::io::atomic_write;
use crate::issue::{BeadsMigration, Issue, IssueStatus, IssueType, MAX_PRIORITY};
use crate::paths;
use crate::store::IssueStore;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

// ---------------------------------------------------------------------------
// Beads export format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BeadsDependency {
    #[serde(default)]
    pub depends_on_id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeadsIssue {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, rename = "type", alias = "issue_type")]
    pub kind: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub closed_at: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub design: String,
    #[serde(default)]
    pub acceptance_criteria: String,
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<BeadsDependency>,
}

impl BeadsIssue {
    /// Original IDs this record waits on, from either export style.
    fn blockers(&self) -> impl Iterator<Item = &str> {
        self.blocked_by.iter().map(String::as_str).chain(
            self.dependencies
                .iter()
                .filter(|d| d.kind.is_empty() || d.kind == "blocks")
                .map(|d| d.depends_on_id.as_str()),
        )
    }
}

// ---------------------------------------------------------------------------
// Mapping rules
// ---------------------------------------------------------------------------

static SPEC_PATH_RE: OnceLock<Regex> = OnceLock::new();
static SPEC_WORD_RE: OnceLock<Regex> = OnceLock::new();

fn spec_path_re() -> &'static Regex {
    SPEC_PATH_RE.get_or_init(|| Regex::new(r"specs/(\d{3,}-[a-z0-9-]+)/").unwrap())
}

fn spec_word_re() -> &'static Regex {
    SPEC_WORD_RE.get_or_init(|| Regex::new(r"\b\d{3,}-[a-z0-9]+(?:-[a-z0-9]+)*").unwrap())
}

fn find_spec_in(text: &str) -> Option<String> {
    if let Some(c) = spec_path_re().captures(text) {
        let name = c[1].trim_end_matches('-');
        if paths::is_feature_branch_name(name) {
            return Some(name.to_string());
        }
    }
    spec_word_re()
        .find_iter(text)
        .map(|m| m.as_str())
        .find(|s| paths::is_feature_branch_name(s))
        .map(str::to_string)
}

/// Label `spec:<ctx>`, then a mention in description or notes, then the title.
pub fn extract_spec_context(issue: &BeadsIssue) -> Option<String> {
    for label in &issue.labels {
        if let Some(ctx) = label.strip_prefix("spec:") {
            if paths::is_feature_branch_name(ctx) {
                return Some(ctx.to_string());
            }
        }
    }
    find_spec_in(&format!("{} {}", issue.description, issue.notes))
        .or_else(|| find_spec_in(&issue.title))
}

pub fn map_status(status: &str) -> IssueStatus {
    match status.to_lowercase().as_str() {
        "in_progress" | "in-progress" | "inprogress" | "wip" => IssueStatus::InProgress,
        "closed" | "done" | "complete" | "completed" => IssueStatus::Closed,
        _ => IssueStatus::Open,
    }
}

pub fn map_type(kind: &str) -> IssueType {
    match kind.to_lowercase().as_str() {
        "epic" => IssueType::Epic,
        "feature" => IssueType::Feature,
        "bug" => IssueType::Bug,
        _ => IssueType::Task,
    }
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Convert one record; dependencies are filled in later.
pub fn convert(beads: &BeadsIssue, spec: &str, now: DateTime<Utc>) -> Issue {
    let created = parse_time(beads.created_at.as_deref()).unwrap_or(now);
    let updated = parse_time(beads.updated_at.as_deref())
        .unwrap_or(created)
        .max(created);
    let status = map_status(&beads.status);
    let closed_at = (status == IssueStatus::Closed).then(|| {
        parse_time(beads.closed_at.as_deref())
            .unwrap_or(updated)
            .max(created)
    });

    let mut labels: Vec<String> = Vec::new();
    for l in &beads.labels {
        if !labels.contains(l) {
            labels.push(l.clone());
        }
    }

    Issue {
        id: id::derive(spec, &beads.title, created),
        title: beads.title.clone(),
        description: beads.description.clone(),
        status,
        priority: beads.priority.clamp(0, i64::from(MAX_PRIORITY)) as i32,
        issue_type: map_type(&beads.kind),
        spec_context: spec.to_string(),
        created_at: created,
        updated_at: updated,
        closed_at,
        definition_of_done: None,
        blocked_by: Vec::new(),
        blocks: Vec::new(),
        labels,
        assignee: beads.assignee.clone(),
        notes: beads.notes.clone(),
        design: beads.design.clone(),
        acceptance_criteria: beads.acceptance_criteria.clone(),
        parent_id: None,
        beads_migration: Some(BeadsMigration {
            original_id: beads.id.clone(),
            migrated_at: now,
        }),
    }
}

/// Drop `beads` and `perles` entries from the `[tools]` table. Other tables
/// are left alone.
pub fn strip_mise_tools(content: &str) -> String {
    let mut in_tools = false;
    let mut out = Vec::new();
    for line in content.split('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_tools = trimmed.starts_with("[tools]");
        } else if in_tools {
            let key = trimmed.split('=').next().unwrap_or("").trim().trim_matches('"');
            if key.contains("beads") || key.contains("perles") {
                continue;
            }
        }
        out.push(line);
    }
    out.join("\n")
}

// ---------------------------------------------------------------------------
// Migrator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct MigrateOptions {
    pub dry_run: bool,
    pub keep_beads: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub total_issues: usize,
    pub migrated_issues: usize,
    pub spec_distribution: BTreeMap<String, usize>,
    /// Original IDs that fell back to the `migrated` spec.
    pub unmapped_issues: Vec<String>,
    pub id_mapping: BTreeMap<String, String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

pub struct Migrator {
    root: PathBuf,
    base: PathBuf,
    clock: Arc<dyn Clock>,
}

impl Migrator {
    /// `root` holds `.beads/` and `mise.toml`; records land under `base`.
    pub fn new(root: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base: base.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn read_beads(&self) -> Result<(Vec<BeadsIssue>, Vec<String>)> {
        let path = paths::beads_issues_path(&self.root);
        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SpecLedgerError::BeadsNotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        for (idx, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<BeadsIssue>(line) {
                Ok(i) => issues.push(i),
                Err(e) => warnings.push(format!("line {}: skipped unreadable record: {e}", idx + 1)),
            }
        }
        Ok((issues, warnings))
    }

    pub fn migrate(&self, opts: MigrateOptions) -> Result<MigrationReport> {
        let (beads, warnings) = self.read_beads()?;
        let now = self.clock.now();
        let mut report = MigrationReport {
            total_issues: beads.len(),
            warnings,
            dry_run: opts.dry_run,
            ..Default::default()
        };

        // Convert, keeping file order.
        let mut converted: Vec<(usize, Issue)> = Vec::new();
        for (i, b) in beads.iter().enumerate() {
            let spec = match extract_spec_context(b) {
                Some(s) => s,
                None => {
                    report.unmapped_issues.push(b.id.clone());
                    report
                        .warnings
                        .push(format!("issue {} could not be mapped to a spec", b.id));
                    paths::MIGRATED_SPEC.to_string()
                }
            };
            let issue = convert(b, &spec, now);
            if let Err(e) = issue.validate() {
                report.errors.push(format!("{}: {e}", b.id));
                continue;
            }
            report.id_mapping.insert(b.id.clone(), issue.id.clone());
            converted.push((i, issue));
        }

        // Translate blocking edges to new IDs on both endpoints.
        let pos: HashMap<String, usize> = converted
            .iter()
            .enumerate()
            .map(|(k, (_, issue))| (issue.id.clone(), k))
            .collect();
        let mut edges: Vec<(usize, usize)> = Vec::new();
        for (k, (src, _)) in converted.iter().enumerate() {
            let b = &beads[*src];
            let waits_on = b
                .blockers()
                .map(|x| (x.to_string(), true))
                .chain(b.blocks.iter().map(|x| (x.clone(), false)));
            for (other, is_blocker) in waits_on {
                match report.id_mapping.get(&other).and_then(|new| pos.get(new)) {
                    Some(&j) if j != k => {
                        edges.push(if is_blocker { (j, k) } else { (k, j) });
                    }
                    Some(_) => {}
                    None => report.warnings.push(format!(
                        "issue {}: dropped dependency on unknown issue {other}",
                        b.id
                    )),
                }
            }
        }
        for (from, to) in edges {
            let to_id = converted[to].1.id.clone();
            let from_id = converted[from].1.id.clone();
            if !converted[from].1.blocks.contains(&to_id) {
                converted[from].1.blocks.push(to_id);
            }
            if !converted[to].1.blocked_by.contains(&from_id) {
                converted[to].1.blocked_by.push(from_id);
            }
        }

        // Write, grouped by spec.
        let mut by_spec: BTreeMap<String, Vec<Issue>> = BTreeMap::new();
        for (_, issue) in converted {
            by_spec.entry(issue.spec_context.clone()).or_default().push(issue);
        }
        for (spec, issues) in by_spec {
            if opts.dry_run {
                report.migrated_issues += issues.len();
                report.spec_distribution.insert(spec, issues.len());
                continue;
            }
            let store = IssueStore::open(&self.base, &spec)?.with_clock(self.clock.clone());
            let mut written = 0;
            for issue in issues {
                let original = issue
                    .beads_migration
                    .as_ref()
                    .map(|m| m.original_id.clone())
                    .unwrap_or_default();
                match store.create(issue) {
                    Ok(_) => written += 1,
                    Err(SpecLedgerError::AlreadyExists(id)) => report
                        .warnings
                        .push(format!("issue {original} already migrated as {id}")),
                    Err(e) => report.errors.push(format!("{original}: {e}")),
                }
            }
            report.migrated_issues += written;
            report.spec_distribution.insert(spec, written);
        }

        if !opts.dry_run && !opts.keep_beads && report.migrated_issues > 0 {
            if let Err(e) = self.cleanup(&report, now) {
                tracing::warn!(error = %e, "beads cleanup failed");
                report
                    .warnings
                    .push(format!("migration succeeded but cleanup failed: {e}"));
            }
        }
        tracing::info!(
            total = report.total_issues,
            migrated = report.migrated_issues,
            "beads migration finished"
        );
        Ok(report)
    }

    fn cleanup(&self, report: &MigrationReport, now: DateTime<Utc>) -> Result<()> {
        let beads_dir = self.root.join(paths::BEADS_DIR);
        if beads_dir.exists() {
            std::fs::remove_dir_all(&beads_dir)?;
        }

        let mise = self.root.join(paths::MISE_FILE);
        if mise.is_file() {
            let content = std::fs::read_to_string(&mise)?;
            let stripped = strip_mise_tools(&content);
            if stripped != content {
                atomic_write(&mise, stripped.as_bytes())?;
            }
        }

        write_migration_log(&self.root.join(paths::MIGRATION_LOG_FILE), report, now)
    }
}

fn write_migration_log(path: &Path, report: &MigrationReport, now: DateTime<Utc>) -> Result<()> {
    let mut log = String::from("# Migration Log\n");
    let _ = writeln!(log, "# Date: {}\n", now.to_rfc3339());
    let _ = writeln!(log, "Total issues migrated: {}", report.migrated_issues);
    log.push_str("\n## ID Mapping (Beads -> SL)\n\n");
    for (old, new) in &report.id_mapping {
        let _ = writeln!(log, "{old} -> {new}");
    }
    atomic_write(path, log.as_bytes())
}
