//! Fetch declared spec documents and content-address them.
//!
//! Cache layout, one directory per alias (or sanitized URL):
//!
//! ```text
//! <cache>/<key>/repo/             working clone
//! <cache>/<key>/<rev-key>.json    {commit_hash, content_hash, size, payload_path}
//! <cache>/<key>/<rev-key>.spec    payload bytes
//! ```

use crate::error::{Result, SpecLedgerError};
use crate::git;
use crate::io::atomic_write;
use crate::manifest::{validate_dependency, validate_manifest, Dependency, Manifest};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub cache_dir: PathBuf,
    pub no_cache: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Remote,
    Cache,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Remote => "remote",
            Source::Cache => "cache",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResult {
    pub dependency: Dependency,
    pub commit_hash: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub content_hash: String,
    pub size: u64,
    pub source: Source,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    commit_hash: String,
    content_hash: String,
    size: u64,
    payload_path: PathBuf,
}

/// Lowercase hex SHA-256.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Recompute the payload digest and compare it with the recorded one.
pub fn verify_payload(result: &ResolveResult) -> Result<()> {
    let actual = content_hash(&result.payload);
    if actual == result.content_hash {
        Ok(())
    } else {
        Err(SpecLedgerError::HashMismatch {
            path: result.dependency.spec_path.clone(),
            expected: result.content_hash.clone(),
            actual,
        })
    }
}

fn safe_segments(raw: &str) -> String {
    raw.replace(':', "/")
        .split('/')
        .filter(|s| !s.is_empty() && !s.chars().all(|c| c == '.'))
        .collect::<Vec<_>>()
        .join("/")
}

/// Directory name for a dependency: its alias, else the URL without scheme,
/// `git@` or `.git`, with `:` as a separator. Empty and dot-only segments are
/// dropped from either form so the key stays inside the cache.
pub fn cache_key(dep: &Dependency) -> String {
    if let Some(key) = dep.alias.as_deref().map(safe_segments) {
        if !key.is_empty() {
            return key;
        }
    }
    let url = dep.repository_url.as_str();
    let url = url.split_once("://").map_or(url, |(_, rest)| rest);
    let url = url.strip_prefix("git@").unwrap_or(url);
    let url = url.strip_suffix(".git").unwrap_or(url);
    match safe_segments(url) {
        key if key.is_empty() => "_".to_string(),
        key => key,
    }
}

/// `spec_path` inside the checked-out `repo`, following symlinks. Anything
/// that lands outside the clone is refused.
fn payload_path(repo: &Path, dep: &Dependency) -> Result<PathBuf> {
    let not_found = || SpecLedgerError::SpecFileNotFound {
        url: dep.repository_url.clone(),
        path: dep.spec_path.clone(),
    };
    let root = repo.canonicalize()?;
    let path = match repo.join(&dep.spec_path).canonicalize() {
        Ok(p) => p,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };
    if !path.starts_with(&root) {
        return Err(SpecLedgerError::InvalidRecord(format!(
            "spec path '{}' resolves outside the repository {}",
            dep.spec_path, dep.repository_url
        )));
    }
    Ok(path)
}

fn rev_key(dep: &Dependency) -> String {
    let digest = Sha256::digest(format!("{}|{}", dep.revision, dep.spec_path).as_bytes());
    hex::encode(&digest[..8])
}

pub struct Resolver {
    opts: ResolverOptions,
}

impl Resolver {
    pub fn new(opts: ResolverOptions) -> Self {
        Self { opts }
    }

    fn entry_dir(&self, dep: &Dependency) -> PathBuf {
        self.opts.cache_dir.join(cache_key(dep))
    }

    fn meta_path(&self, dep: &Dependency) -> PathBuf {
        self.entry_dir(dep).join(format!("{}.json", rev_key(dep)))
    }

    pub async fn resolve(&self, dep: &Dependency, token: &CancellationToken) -> Result<ResolveResult> {
        if token.is_cancelled() {
            return Err(SpecLedgerError::Cancelled);
        }
        validate_dependency(dep)?;
        if !self.opts.no_cache {
            if let Some(hit) = self.from_cache(dep) {
                tracing::debug!(url = %dep.repository_url, "served from cache");
                return Ok(hit);
            }
        }
        let result = self.fetch(dep, token).await?;
        if let Err(e) = self.store_cache(&result) {
            tracing::warn!(url = %dep.repository_url, "failed to write resolver cache: {e}");
        }
        Ok(result)
    }

    /// Validate the manifest, then resolve every declaration in order,
    /// stopping at the first failure.
    pub async fn resolve_all(
        &self,
        manifest: &Manifest,
        token: &CancellationToken,
    ) -> Result<Vec<ResolveResult>> {
        validate_manifest(manifest)?;
        let mut results = Vec::with_capacity(manifest.dependencies.len());
        for dep in &manifest.dependencies {
            results.push(self.resolve(dep, token).await?);
        }
        Ok(results)
    }

    fn from_cache(&self, dep: &Dependency) -> Option<ResolveResult> {
        let raw = std::fs::read_to_string(self.meta_path(dep)).ok()?;
        let meta: CacheMeta = match serde_json::from_str(&raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("ignoring unreadable cache entry: {e}");
                return None;
            }
        };
        let payload = std::fs::read(&meta.payload_path).ok()?;
        if content_hash(&payload) != meta.content_hash {
            tracing::warn!(
                path = %meta.payload_path.display(),
                "cached payload does not match its hash; refetching"
            );
            return None;
        }
        Some(ResolveResult {
            dependency: dep.clone(),
            commit_hash: meta.commit_hash,
            payload,
            content_hash: meta.content_hash,
            size: meta.size,
            source: Source::Cache,
        })
    }

    async fn fetch(&self, dep: &Dependency, token: &CancellationToken) -> Result<ResolveResult> {
        let url = dep.repository_url.as_str();
        let dir = self.entry_dir(dep);
        std::fs::create_dir_all(&dir)?;
        let repo = dir.join("repo");
        if repo.exists() {
            std::fs::remove_dir_all(&repo)?;
        }

        match dep.branch() {
            Some(reference) => git::clone_ref(url, reference, &repo, token).await?,
            None => {
                git::clone_full(url, &repo, token).await?;
                git::checkout(&repo, url, &dep.revision, token).await?;
            }
        }
        let commit_hash = git::head_commit(&repo, url, token).await?;

        let payload = std::fs::read(payload_path(&repo, dep)?)?;
        tracing::info!(url, commit = %commit_hash, "resolved {}", dep.spec_path);
        Ok(ResolveResult {
            dependency: dep.clone(),
            commit_hash,
            content_hash: content_hash(&payload),
            size: payload.len() as u64,
            payload,
            source: Source::Remote,
        })
    }

    fn store_cache(&self, result: &ResolveResult) -> Result<()> {
        let dep = &result.dependency;
        let payload_path = self.entry_dir(dep).join(format!("{}.spec", rev_key(dep)));
        atomic_write(&payload_path, &result.payload)?;
        let meta = CacheMeta {
            commit_hash: result.commit_hash.clone(),
            content_hash: result.content_hash.clone(),
            size: result.size,
            payload_path,
        };
        atomic_write(&self.meta_path(dep), serde_json::to_string_pretty(&meta)?.as_bytes())
    }
}
