//! `spec.mod`: the declared list of external spec documents.
//!
//! ```text
//! # SpecLedger Dependency Manifest v1.0.0
//! require https://github.com/org/api.git #main specs/api.md --alias api
//! ```

use crate::error::{Result, SpecLedgerError};
use crate::io::atomic_write;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::path::Path;
use std::sync::OnceLock;

pub const MANIFEST_VERSION: &str = "1.0.0";
const MAX_NAME_LEN: usize = 50;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub repository_url: String,
    /// `#branch-or-tag`, a semver tag, a 40-hex commit or a plain ref name.
    pub revision: String,
    pub spec_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Declarations found in the dependency's own manifest. Recorded only;
    /// the resolver does not follow them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitive: Vec<Dependency>,
}

impl Dependency {
    pub fn new(
        repository_url: impl Into<String>,
        revision: impl Into<String>,
        spec_path: impl Into<String>,
        alias: Option<String>,
    ) -> Self {
        Self {
            repository_url: repository_url.into(),
            revision: revision.into(),
            spec_path: spec_path.into(),
            alias,
            transitive: Vec::new(),
        }
    }

    /// Branch or tag name when the revision is a `#ref`.
    pub fn branch(&self) -> Option<&str> {
        self.revision.strip_prefix('#')
    }

    /// True when the revision names an exact commit.
    pub fn is_pinned(&self) -> bool {
        commit_re().is_match(&self.revision)
    }

    pub fn matches(&self, url_or_alias: &str) -> bool {
        self.repository_url == url_or_alias || self.alias.as_deref() == Some(url_or_alias)
    }

    fn to_line(&self) -> String {
        let mut line = format!(
            "require {} {} {}",
            self.repository_url, self.revision, self.spec_path
        );
        if let Some(alias) = &self.alias {
            let _ = write!(line, " --alias {alias}");
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub id: String,
    pub dependencies: Vec<Dependency>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            id: manifest_id(&[]),
            dependencies: Vec::new(),
        }
    }
}

/// `root` for an empty manifest, otherwise a short digest of the repository
/// URLs in declaration order.
fn manifest_id(deps: &[Dependency]) -> String {
    if deps.is_empty() {
        return "root".to_string();
    }
    let mut hasher = Sha256::new();
    for d in deps {
        hasher.update(d.repository_url.as_bytes());
        hasher.update(b"\n");
    }
    format!("spec-{}", &hex::encode(hasher.finalize())[..12])
}

// ---------------------------------------------------------------------------
// Parse / render
// ---------------------------------------------------------------------------

const LINE_FORMAT: &str = "expected: require <repo-url> <revision> <spec-path> [--alias <name>]";

fn parse_line(line: &str, line_no: usize) -> Result<Dependency> {
    let bad = |reason: String| SpecLedgerError::InvalidManifestLine {
        line: line_no,
        reason,
    };
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts[0] != "require" {
        return Err(bad(format!("expected 'require', got '{}'", parts[0])));
    }
    if parts.len() < 4 {
        return Err(bad(LINE_FORMAT.to_string()));
    }
    let alias = match &parts[4..] {
        [] => None,
        ["--alias", name] => Some((*name).to_string()),
        ["--alias"] => return Err(bad("--alias requires a value".to_string())),
        _ => return Err(bad(LINE_FORMAT.to_string())),
    };
    Ok(Dependency::new(parts[1], parts[2], parts[3], alias))
}

pub fn parse(text: &str) -> Result<Manifest> {
    let mut dependencies = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        dependencies.push(parse_line(line, idx + 1)?);
    }
    Ok(Manifest {
        version: MANIFEST_VERSION.to_string(),
        id: manifest_id(&dependencies),
        dependencies,
    })
}

impl Manifest {
    /// Read `spec.mod`; a missing file is an empty manifest.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn render(&self, now: DateTime<Utc>) -> String {
        let mut out = format!(
            "# SpecLedger Dependency Manifest v{}\n# Generated at {}\n\n",
            self.version,
            now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        );
        for dep in &self.dependencies {
            out.push_str(&dep.to_line());
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path, now: DateTime<Utc>) -> Result<()> {
        atomic_write(path, self.render(now).as_bytes())
    }

    /// Validate and append; `(repo-url, spec-path)` must be new.
    pub fn add(&mut self, dep: Dependency) -> Result<()> {
        validate_dependency(&dep)?;
        if self
            .dependencies
            .iter()
            .any(|d| d.repository_url == dep.repository_url && d.spec_path == dep.spec_path)
        {
            return Err(SpecLedgerError::DuplicateDependency(format!(
                "{} {}",
                dep.repository_url, dep.spec_path
            )));
        }
        if let Some(alias) = &dep.alias {
            if self.dependencies.iter().any(|d| d.alias.as_ref() == Some(alias)) {
                return Err(SpecLedgerError::DuplicateDependency(format!(
                    "alias {alias}"
                )));
            }
        }
        self.dependencies.push(dep);
        self.id = manifest_id(&self.dependencies);
        Ok(())
    }

    /// Remove every declaration whose url or alias matches. Returns the
    /// removed entries.
    pub fn remove(&mut self, url_or_alias: &str) -> Vec<Dependency> {
        let (removed, kept) = std::mem::take(&mut self.dependencies)
            .into_iter()
            .partition(|d| d.matches(url_or_alias));
        self.dependencies = kept;
        self.id = manifest_id(&self.dependencies);
        removed
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

static SEMVER_RE: OnceLock<Regex> = OnceLock::new();
static COMMIT_RE: OnceLock<Regex> = OnceLock::new();
static NAME_RE: OnceLock<Regex> = OnceLock::new();
static SSH_URL_RE: OnceLock<Regex> = OnceLock::new();
static HTTPS_URL_RE: OnceLock<Regex> = OnceLock::new();
static LOCAL_PATH_RE: OnceLock<Regex> = OnceLock::new();

fn semver_re() -> &'static Regex {
    SEMVER_RE.get_or_init(|| Regex::new(r"^v?\d+(\.\d+)?(\.\d+)?$").unwrap())
}

fn commit_re() -> &'static Regex {
    COMMIT_RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{40}$").unwrap())
}

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_.\-]+$").unwrap())
}

fn ssh_url_re() -> &'static Regex {
    SSH_URL_RE.get_or_init(|| {
        Regex::new(r"^git@[^:]+:[^/]+/.+\.git$|^git@[^:]+:[^/]+/[^/]+$").unwrap()
    })
}

fn https_url_re() -> &'static Regex {
    HTTPS_URL_RE.get_or_init(|| Regex::new(r"^https://[^/\s]+/\S+$").unwrap())
}

fn local_path_re() -> &'static Regex {
    LOCAL_PATH_RE.get_or_init(|| Regex::new(r"^/|^\./|^\.\./").unwrap())
}

/// SSH (`git@host:org/repo[.git]`), HTTPS (`https://host/<path>`) or a
/// local path (`/`, `./`, `../`).
pub fn validate_git_url(url: &str) -> Result<()> {
    if ssh_url_re().is_match(url) || https_url_re().is_match(url) || local_path_re().is_match(url)
    {
        Ok(())
    } else {
        Err(SpecLedgerError::InvalidUrl(url.to_string()))
    }
}

pub fn is_valid_revision(rev: &str) -> bool {
    if let Some(r) = rev.strip_prefix('#') {
        return !r.is_empty();
    }
    semver_re().is_match(rev)
        || commit_re().is_match(rev)
        || (rev.len() <= MAX_NAME_LEN && name_re().is_match(rev))
}

pub fn is_valid_spec_path(path: &str) -> bool {
    !path.contains("..") && path.len() > ".md".len() && path.ends_with(".md")
}

/// The alias names a cache directory, so a dots-only name is refused.
pub fn is_valid_alias(alias: &str) -> bool {
    (1..=MAX_NAME_LEN).contains(&alias.len())
        && name_re().is_match(alias)
        && !alias.chars().all(|c| c == '.')
}

pub fn validate_dependency(dep: &Dependency) -> Result<()> {
    validate_git_url(&dep.repository_url)?;
    let invalid = |what: &str, value: &str| {
        SpecLedgerError::InvalidRecord(format!(
            "{}: invalid {what} '{value}'",
            dep.repository_url
        ))
    };
    if !is_valid_revision(&dep.revision) {
        return Err(invalid("revision", &dep.revision));
    }
    if !is_valid_spec_path(&dep.spec_path) {
        return Err(invalid("spec path", &dep.spec_path));
    }
    if let Some(alias) = &dep.alias {
        if !is_valid_alias(alias) {
            return Err(invalid("alias", alias));
        }
    }
    Ok(())
}

/// Check every declaration, then uniqueness of `(repo-url, spec-path)`.
pub fn validate_manifest(manifest: &Manifest) -> Result<()> {
    if manifest.version != MANIFEST_VERSION {
        return Err(SpecLedgerError::InvalidRecord(format!(
            "unsupported manifest version {}",
            manifest.version
        )));
    }
    let mut seen = std::collections::HashSet::new();
    for dep in &manifest.dependencies {
        validate_dependency(dep)?;
        if !seen.insert((dep.repository_url.as_str(), dep.spec_path.as_str())) {
            return Err(SpecLedgerError::DuplicateDependency(format!(
                "{} {}",
                dep.repository_url, dep.spec_path
            )));
        }
    }
    Ok(())
}
