//! Embedded playbooks: template trees copied into a project at bootstrap.

use crate::error::{Result, SpecLedgerError};
use crate::io::atomic_write_mode;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use rust_embed::Embed;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Embed)]
#[folder = "templates/"]
struct Templates;

const MANIFEST: &str = "manifest.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Directory under the template root; defaults to the name.
    #[serde(default)]
    pub path: String,
    /// Globs over paths relative to `path`. Empty copies everything.
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub structure: Vec<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybookManifest {
    #[serde(default)]
    pub version: String,
    pub playbooks: Vec<Playbook>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyResult {
    pub name: String,
    pub version: String,
    pub structure: Vec<String>,
    pub files_copied: usize,
    pub files_skipped: usize,
}

pub fn load_manifest() -> Result<PlaybookManifest> {
    let file = <Templates as Embed>::get(MANIFEST)
        .ok_or_else(|| SpecLedgerError::PlaybookNotFound(MANIFEST.to_string()))?;
    let mut manifest: PlaybookManifest = serde_yaml::from_slice(&file.data)?;
    for pb in &mut manifest.playbooks {
        if pb.path.is_empty() {
            pb.path = pb.name.clone();
        }
    }
    Ok(manifest)
}

pub fn list_playbooks() -> Result<Vec<Playbook>> {
    Ok(load_manifest()?.playbooks)
}

pub fn find_playbook(name: &str) -> Result<Playbook> {
    list_playbooks()?
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| SpecLedgerError::PlaybookNotFound(name.to_string()))
}

/// First playbook in the manifest.
pub fn default_playbook() -> Result<Playbook> {
    list_playbooks()?
        .into_iter()
        .next()
        .ok_or_else(|| SpecLedgerError::PlaybookNotFound("default".to_string()))
}

/// `**` spans directories, `*` and `?` stay within one segment. A pattern
/// without `/` matches a file name at any depth. `None` when there are no
/// patterns, meaning every file is taken.
fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let full = if pattern.contains('/') {
            pattern.clone()
        } else {
            format!("**/{pattern}")
        };
        let glob = GlobBuilder::new(&full)
            .literal_separator(true)
            .build()
            .map_err(|e| SpecLedgerError::InvalidRecord(format!("bad pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| SpecLedgerError::InvalidRecord(format!("bad playbook patterns: {e}")))
}

/// Copy the files of playbook `name` into `dest`. Existing files are kept
/// unless `overwrite`; shell scripts are made executable.
pub fn apply(name: &str, dest: &Path, overwrite: bool) -> Result<ApplyResult> {
    let pb = find_playbook(name)?;
    let patterns = build_globset(&pb.patterns)?;
    let prefix = format!("{}/", pb.path.trim_end_matches('/'));

    let mut result = ApplyResult {
        name: pb.name.clone(),
        version: pb.version.clone(),
        structure: pb.structure.clone(),
        ..Default::default()
    };
    for file in Templates::iter() {
        let Some(rel) = file.strip_prefix(&prefix) else {
            continue;
        };
        if patterns.as_ref().is_some_and(|set| !set.is_match(rel)) {
            continue;
        }
        let target = dest.join(rel);
        if target.exists() && !overwrite {
            tracing::debug!(path = %target.display(), "skipped existing file");
            result.files_skipped += 1;
            continue;
        }
        let Some(content) = <Templates as Embed>::get(&file) else {
            continue;
        };
        let mode = if rel.ends_with(".sh") { 0o755 } else { 0o644 };
        atomic_write_mode(&target, &content.data, mode)?;
        result.files_copied += 1;
    }
    for dir in &pb.structure {
        std::fs::create_dir_all(dest.join(dir))?;
    }
    tracing::info!(playbook = %pb.name, copied = result.files_copied, "applied playbook");
    Ok(result)
}
