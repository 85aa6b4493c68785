//! `spec.sum`: the resolved, content-addressed form of `spec.mod`.

use crate::error::{Result, SpecLedgerError};
use crate::io::atomic_write_mode;
use crate::manifest::{Manifest, MANIFEST_VERSION};
use crate::resolver::ResolveResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

const CONTENT_HASH_LEN: usize = 64;
const LOCKFILE_MODE: u32 = 0o644;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockfileEntry {
    pub repository_url: String,
    pub commit_hash: String,
    pub content_hash: String,
    pub spec_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub size: u64,
    pub fetched_at: DateTime<Utc>,
}

impl LockfileEntry {
    pub fn from_result(result: &ResolveResult, fetched_at: DateTime<Utc>) -> Self {
        let dep = &result.dependency;
        Self {
            repository_url: dep.repository_url.clone(),
            commit_hash: result.commit_hash.clone(),
            content_hash: result.content_hash.clone(),
            spec_path: dep.spec_path.clone(),
            branch: dep.branch().map(str::to_string),
            size: result.size,
            fetched_at,
        }
    }

    fn is_for(&self, url: &str, spec_path: &str) -> bool {
        self.repository_url == url && self.spec_path == spec_path
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: String,
    pub entries: Vec<LockfileEntry>,
    pub timestamp: DateTime<Utc>,
    pub total_size: u64,
}

impl Lockfile {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            entries: Vec::new(),
            timestamp: now,
            total_size: 0,
        }
    }

    pub fn from_results(results: &[ResolveResult], now: DateTime<Utc>) -> Self {
        let mut lock = Self::new(now);
        for r in results {
            lock.add_entry(LockfileEntry::from_result(r, now));
        }
        lock
    }

    /// Read `spec.sum`. A missing file is an error here: callers decide
    /// whether an absent lockfile matters.
    pub fn read(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut data = serde_json::to_string_pretty(self)?;
        data.push('\n');
        atomic_write_mode(path, data.as_bytes(), LOCKFILE_MODE)
    }

    pub fn add_entry(&mut self, entry: LockfileEntry) {
        self.total_size += entry.size;
        self.entries.push(entry);
    }

    pub fn remove_entry(&mut self, url: &str, spec_path: &str) -> bool {
        match self.entries.iter().position(|e| e.is_for(url, spec_path)) {
            Some(i) => {
                let removed = self.entries.remove(i);
                self.total_size = self.total_size.saturating_sub(removed.size);
                true
            }
            None => false,
        }
    }

    pub fn get_entry(&self, url: &str, spec_path: &str) -> Option<&LockfileEntry> {
        self.entries.iter().find(|e| e.is_for(url, spec_path))
    }

    pub fn repository_entries(&self, url: &str) -> Vec<&LockfileEntry> {
        self.entries
            .iter()
            .filter(|e| e.repository_url == url)
            .collect()
    }

    pub fn content_hash(&self, url: &str, spec_path: &str) -> Option<&str> {
        self.get_entry(url, spec_path).map(|e| e.content_hash.as_str())
    }

    /// Every inconsistency between this lockfile and `manifest`.
    pub fn issues(&self, manifest: &Manifest) -> Vec<String> {
        let mut issues = Vec::new();
        for dep in &manifest.dependencies {
            if self.get_entry(&dep.repository_url, &dep.spec_path).is_none() {
                issues.push(format!(
                    "missing entry for dependency: {} {}",
                    dep.repository_url, dep.spec_path
                ));
            }
        }
        for e in &self.entries {
            if e.content_hash.is_empty() {
                issues.push(format!(
                    "empty content hash for: {} {}",
                    e.repository_url, e.spec_path
                ));
            } else if e.content_hash.len() != CONTENT_HASH_LEN {
                issues.push(format!(
                    "invalid content hash length for: {} {} (got {}, want {CONTENT_HASH_LEN})",
                    e.repository_url,
                    e.spec_path,
                    e.content_hash.len()
                ));
            }
        }
        issues
    }

    /// `VerificationFailed` carrying every issue, if there are any.
    pub fn verify(&self, manifest: &Manifest) -> Result<()> {
        let issues = self.issues(manifest);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(SpecLedgerError::VerificationFailed(issues))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Dependency;
    use crate::resolver::{content_hash, Source};
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        "2026-02-19T12:00:00Z".parse().unwrap()
    }

    fn resolved(dep: Dependency, payload: &[u8]) -> ResolveResult {
        ResolveResult {
            dependency: dep,
            commit_hash: "a".repeat(40),
            payload: payload.to_vec(),
            content_hash: content_hash(payload),
            size: payload.len() as u64,
            source: Source::Remote,
        }
    }

    fn manifest_with(deps: &[Dependency]) -> Manifest {
        let mut m = Manifest::default();
        for d in deps {
            m.add(d.clone()).unwrap();
        }
        m
    }

    #[test]
    fn built_lockfile_verifies_against_its_manifest() {
        let dep = Dependency::new(
            "https://example.com/r.git",
            "#main",
            "specs/a.md",
            Some("r".into()),
        );
        let m = manifest_with(&[dep.clone()]);
        let lock = Lockfile::from_results(&[resolved(dep, b"# A\n")], at());
        assert_eq!(lock.entries.len(), 1);
        let e = &lock.entries[0];
        assert_eq!(e.content_hash, content_hash(b"# A\n"));
        assert_eq!(e.branch.as_deref(), Some("main"));
        assert_eq!(e.fetched_at, at());
        assert_eq!(lock.total_size, 4);
        assert!(lock.issues(&m).is_empty());
        lock.verify(&m).unwrap();
    }

    #[test]
    fn new_declaration_yields_one_missing_entry() {
        let a = Dependency::new("https://example.com/r.git", "#main", "specs/a.md", None);
        let b = Dependency::new("https://example.com/r.git", "#main", "specs/b.md", None);
        let lock = Lockfile::from_results(&[resolved(a.clone(), b"a")], at());
        let m = manifest_with(&[a, b]);
        match lock.verify(&m) {
            Err(SpecLedgerError::VerificationFailed(issues)) => assert_eq!(
                issues,
                vec!["missing entry for dependency: https://example.com/r.git specs/b.md"]
            ),
            other => panic!("expected VerificationFailed, got {other:?}"),
        }
    }

    #[test]
    fn bad_hashes_are_reported() {
        let mut lock = Lockfile::new(at());
        let mut e = LockfileEntry::from_result(
            &resolved(
                Dependency::new("https://h.io/o/r", "v1.0.0", "a.md", None),
                b"x",
            ),
            at(),
        );
        e.content_hash = String::new();
        lock.add_entry(e.clone());
        e.spec_path = "b.md".into();
        e.content_hash = "abc".into();
        lock.add_entry(e);
        let issues = lock.issues(&Manifest::default());
        assert_eq!(
            issues,
            vec![
                "empty content hash for: https://h.io/o/r a.md".to_string(),
                "invalid content hash length for: https://h.io/o/r b.md (got 3, want 64)"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn entry_helpers_keep_total_size() {
        let a = Dependency::new("https://h.io/o/r", "#main", "a.md", None);
        let b = Dependency::new("https://h.io/o/r", "#main", "b.md", None);
        let c = Dependency::new("https://h.io/o/s", "#main", "c.md", None);
        let mut lock = Lockfile::from_results(
            &[resolved(a, b"aa"), resolved(b, b"bbb"), resolved(c, b"c")],
            at(),
        );
        assert_eq!(lock.total_size, 6);
        assert_eq!(lock.repository_entries("https://h.io/o/r").len(), 2);
        assert_eq!(
            lock.content_hash("https://h.io/o/s", "c.md"),
            Some(content_hash(b"c").as_str())
        );
        assert!(lock.remove_entry("https://h.io/o/r", "b.md"));
        assert!(!lock.remove_entry("https://h.io/o/r", "b.md"));
        assert_eq!(lock.total_size, 3);
        assert!(lock.get_entry("https://h.io/o/r", "b.md").is_none());
    }

    #[test]
    fn write_read_pretty_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.sum");
        let dep = Dependency::new("https://h.io/o/r", "#main", "a.md", None);
        let lock = Lockfile::from_results(&[resolved(dep, b"a")], at());
        lock.write(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("{\n  \"version\": \"1.0.0\""));
        assert!(text.contains("\"fetched_at\": \"2026-02-19T12:00:00Z\""));
        assert_eq!(Lockfile::read(&path).unwrap(), lock);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o644);
        }
    }
}
