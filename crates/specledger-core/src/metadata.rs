//! `specledger/specledger.yaml`: project identity, applied playbook and
//! mirrored spec dependencies.

use crate::error::{Result, SpecLedgerError};
use crate::io::atomic_write;
use crate::paths;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

pub const METADATA_VERSION: &str = "1.0.0";
pub const DEFAULT_PROJECT_VERSION: &str = "0.1.0";
const LEGACY_PLAYBOOK: &str = "specledger";
const LEGACY_PLAYBOOK_VERSION: &str = "unknown";

// ---------------------------------------------------------------------------
// FrameworkChoice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameworkChoice {
    Speckit,
    Openspec,
    Both,
    #[default]
    None,
}

impl FrameworkChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameworkChoice::Speckit => "speckit",
            FrameworkChoice::Openspec => "openspec",
            FrameworkChoice::Both => "both",
            FrameworkChoice::None => "none",
        }
    }
}

impl fmt::Display for FrameworkChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameworkChoice {
    type Err = SpecLedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "speckit" => Ok(FrameworkChoice::Speckit),
            "openspec" => Ok(FrameworkChoice::Openspec),
            "both" => Ok(FrameworkChoice::Both),
            "none" => Ok(FrameworkChoice::None),
            other => Err(SpecLedgerError::InvalidMetadata(format!(
                "unknown framework '{other}': must be speckit, openspec, both or none"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub short_code: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookInfo {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub structure: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameworkInfo {
    pub choice: FrameworkChoice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<FrameworkChoice>,
    /// `@alias/spec` form used by agents to reference the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_path: Option<String>,
}

impl DependencyEntry {
    fn matches(&self, url_or_alias: &str) -> bool {
        self.url == url_or_alias || self.alias.as_deref() == Some(url_or_alias)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub version: String,
    pub project: ProjectInfo,
    pub playbook: PlaybookInfo,
    #[serde(default)]
    pub framework: FrameworkInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_preference: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEntry>,
}

static NAME_RE: OnceLock<Regex> = OnceLock::new();
static SHORT_CODE_RE: OnceLock<Regex> = OnceLock::new();
static SHA_RE: OnceLock<Regex> = OnceLock::new();
static LEGACY_PROJECT_RE: OnceLock<Regex> = OnceLock::new();
static LEGACY_SHORT_CODE_RE: OnceLock<Regex> = OnceLock::new();
static GIT_URL_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9-]+$").unwrap())
}

fn short_code_re() -> &'static Regex {
    SHORT_CODE_RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9]{2,10}$").unwrap())
}

fn sha_re() -> &'static Regex {
    SHA_RE.get_or_init(|| Regex::new(r"^[a-f0-9]{40}$").unwrap())
}

fn legacy_project_re() -> &'static Regex {
    LEGACY_PROJECT_RE.get_or_init(|| Regex::new(r"^#\s*Project:\s*(.+)$").unwrap())
}

fn legacy_short_code_re() -> &'static Regex {
    LEGACY_SHORT_CODE_RE.get_or_init(|| Regex::new(r"^#\s*Short Code:\s*(.+)$").unwrap())
}

fn git_url_re() -> &'static Regex {
    GIT_URL_RE.get_or_init(|| {
        Regex::new(r"^git@[^:]+:[^/]+/.+\.git$|^git@[^:]+:[^/]+/[^/]+$|^https://[^/]+/[^/]+/.+$|^/|^\./|^\.\./")
            .unwrap()
    })
}

/// Stricter than `spec.mod`: HTTPS entries need `host/org/repo`.
pub fn validate_git_url(url: &str) -> Result<()> {
    if git_url_re().is_match(url) {
        Ok(())
    } else {
        Err(SpecLedgerError::InvalidUrl(url.to_string()))
    }
}

fn invalid(msg: impl Into<String>) -> SpecLedgerError {
    SpecLedgerError::InvalidMetadata(msg.into())
}

pub fn validate_project_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid("project name cannot be empty"));
    }
    if !name_re().is_match(name) {
        return Err(invalid(
            "project name must contain only alphanumeric characters and hyphens",
        ));
    }
    Ok(())
}

pub fn validate_short_code(code: &str) -> Result<()> {
    if !(2..=10).contains(&code.len()) {
        return Err(invalid("short code must be 2-10 characters"));
    }
    if !short_code_re().is_match(code) {
        return Err(invalid("short code must contain only alphanumeric characters"));
    }
    Ok(())
}

/// Exactly 40 lowercase hex characters.
pub fn validate_commit_sha(sha: &str) -> Result<()> {
    if sha_re().is_match(sha) {
        Ok(())
    } else {
        Err(invalid(format!(
            "commit SHA must be 40 lowercase hexadecimal characters: {sha}"
        )))
    }
}

impl ProjectMetadata {
    pub fn new(
        name: &str,
        short_code: &str,
        playbook: &str,
        playbook_version: &str,
        structure: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            version: METADATA_VERSION.to_string(),
            project: ProjectInfo {
                name: name.to_string(),
                short_code: short_code.to_string(),
                created: now,
                modified: now,
                version: DEFAULT_PROJECT_VERSION.to_string(),
            },
            playbook: PlaybookInfo {
                name: playbook.to_string(),
                version: playbook_version.to_string(),
                applied_at: Some(now),
                structure,
            },
            framework: FrameworkInfo::default(),
            agent_preference: None,
            dependencies: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != METADATA_VERSION {
            return Err(invalid(format!("metadata version must be {METADATA_VERSION}")));
        }
        validate_project_name(&self.project.name)?;
        validate_short_code(&self.project.short_code)?;
        if self.project.modified < self.project.created {
            return Err(invalid("modified timestamp must be after created timestamp"));
        }
        if self.playbook.name.is_empty() {
            return Err(invalid("playbook name is required"));
        }
        for (i, dep) in self.dependencies.iter().enumerate() {
            validate_git_url(&dep.url)
                .map_err(|e| invalid(format!("dependency {i}: {e}")))?;
            if let Some(sha) = &dep.resolved_commit {
                validate_commit_sha(sha).map_err(|e| invalid(format!("dependency {i}: {e}")))?;
            }
        }
        Ok(())
    }

    pub fn exists(root: &Path) -> bool {
        paths::metadata_path(root).exists()
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::metadata_path(root);
        if !path.exists() {
            return Err(SpecLedgerError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let meta: ProjectMetadata = serde_yaml::from_str(&data)?;
        meta.validate()?;
        Ok(meta)
    }

    /// Stamp `modified`, validate, write.
    pub fn save(&mut self, root: &Path, now: DateTime<Utc>) -> Result<()> {
        self.project.modified = now.max(self.project.created);
        self.validate()?;
        let data = serde_yaml::to_string(self)?;
        atomic_write(&paths::metadata_path(root), data.as_bytes())
    }

    pub fn add_dependency(&mut self, entry: DependencyEntry) -> Result<()> {
        validate_git_url(&entry.url)?;
        if self.dependencies.iter().any(|d| d.url == entry.url) {
            return Err(SpecLedgerError::DuplicateDependency(entry.url));
        }
        if let Some(alias) = &entry.alias {
            if self.dependencies.iter().any(|d| d.alias.as_ref() == Some(alias)) {
                return Err(SpecLedgerError::DuplicateDependency(format!("alias {alias}")));
            }
        }
        self.dependencies.push(entry);
        Ok(())
    }

    /// Drop the entry matching `url_or_alias`; false when nothing matched.
    pub fn remove_dependency(&mut self, url_or_alias: &str) -> bool {
        let before = self.dependencies.len();
        self.dependencies.retain(|d| !d.matches(url_or_alias));
        self.dependencies.len() != before
    }

    pub fn set_resolved_commit(&mut self, url: &str, commit: &str) -> Result<bool> {
        validate_commit_sha(commit)?;
        match self.dependencies.iter_mut().find(|d| d.url == url) {
            Some(d) => {
                d.resolved_commit = Some(commit.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// Legacy `specledger.mod`
// ---------------------------------------------------------------------------

/// Convert `specledger/specledger.mod` to YAML. The legacy file is left in
/// place.
pub fn migrate_legacy(root: &Path, now: DateTime<Utc>) -> Result<ProjectMetadata> {
    let yaml = paths::metadata_path(root);
    if yaml.exists() {
        return Err(SpecLedgerError::MetadataExists(yaml.display().to_string()));
    }
    let legacy = paths::legacy_metadata_path(root);
    let text = std::fs::read_to_string(&legacy)?;
    let created: DateTime<Utc> = std::fs::metadata(&legacy)?.modified()?.into();

    let mut name = None;
    let mut short_code = None;
    for line in text.lines().map(str::trim) {
        if let Some(c) = legacy_project_re().captures(line) {
            name = Some(c[1].trim().to_string());
        }
        if let Some(c) = legacy_short_code_re().captures(line) {
            short_code = Some(c[1].trim().to_string());
        }
    }
    let name = name.ok_or(SpecLedgerError::LegacyMissingField("project name"))?;
    let short_code = short_code.ok_or(SpecLedgerError::LegacyMissingField("short code"))?;

    let mut meta = ProjectMetadata::new(
        &name,
        &short_code,
        LEGACY_PLAYBOOK,
        LEGACY_PLAYBOOK_VERSION,
        Vec::new(),
        created,
    );
    meta.playbook.applied_at = None;
    meta.save(root, now)?;
    tracing::info!(project = %name, "migrated legacy specledger.mod");
    Ok(meta)
}

pub fn has_legacy(root: &Path) -> bool {
    paths::legacy_metadata_path(root).exists()
}
