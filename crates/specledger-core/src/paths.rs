use crate::error::{Result, SpecLedgerError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SPECLEDGER_DIR: &str = "specledger";
pub const METADATA_FILE: &str = "specledger/specledger.yaml";
pub const LEGACY_METADATA_FILE: &str = "specledger/specledger.mod";
pub const MIGRATION_LOG_FILE: &str = "specledger/.migration-log";

pub const ISSUES_FILE: &str = "issues.jsonl";
pub const LOCK_SUFFIX: &str = ".lock";
pub const BACKUP_SUFFIX: &str = ".bak";
pub const MIGRATED_SPEC: &str = "migrated";

pub const MANIFEST_FILE: &str = "spec.mod";
pub const LOCKFILE_FILE: &str = "spec.sum";

pub const BEADS_DIR: &str = ".beads";
pub const BEADS_ISSUES_FILE: &str = ".beads/issues.jsonl";
pub const MISE_FILE: &str = "mise.toml";

pub const CLAUDE_SETTINGS_FILE: &str = ".claude/settings.json";

pub const USER_CONFIG_FILE: &str = ".config/specledger/config.yaml";
pub const USER_CACHE_DIR: &str = ".specledger/cache";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn spec_dir(base: &Path, spec: &str) -> PathBuf {
    base.join(spec)
}

pub fn issues_path(base: &Path, spec: &str) -> PathBuf {
    spec_dir(base, spec).join(ISSUES_FILE)
}

pub fn lock_path_for(records: &Path) -> PathBuf {
    with_suffix(records, LOCK_SUFFIX)
}

pub fn backup_path_for(records: &Path) -> PathBuf {
    with_suffix(records, BACKUP_SUFFIX)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

pub fn metadata_path(root: &Path) -> PathBuf {
    root.join(METADATA_FILE)
}

pub fn legacy_metadata_path(root: &Path) -> PathBuf {
    root.join(LEGACY_METADATA_FILE)
}

pub fn manifest_path(root: &Path) -> PathBuf {
    root.join(MANIFEST_FILE)
}

pub fn lockfile_path(root: &Path) -> PathBuf {
    root.join(LOCKFILE_FILE)
}

pub fn beads_issues_path(root: &Path) -> PathBuf {
    root.join(BEADS_ISSUES_FILE)
}

pub fn home_dir() -> Result<PathBuf> {
    home::home_dir().ok_or(SpecLedgerError::HomeNotFound)
}

pub fn user_config_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(USER_CONFIG_FILE))
}

pub fn default_cache_dir() -> Result<PathBuf> {
    Ok(home_dir()?.join(USER_CACHE_DIR))
}

// ---------------------------------------------------------------------------
// Spec context validation
// ---------------------------------------------------------------------------

static SPEC_CONTEXT_RE: OnceLock<Regex> = OnceLock::new();

fn spec_context_re() -> &'static Regex {
    SPEC_CONTEXT_RE.get_or_init(|| Regex::new(r"^\d{3,}-[a-z0-9-]+$").unwrap())
}

/// True for `###-kebab-name` (three or more digits) or the reserved `migrated`.
pub fn is_spec_context(s: &str) -> bool {
    s == MIGRATED_SPEC || spec_context_re().is_match(s)
}

/// True only for the `###-kebab-name` branch form; `migrated` is not a branch.
pub fn is_feature_branch_name(s: &str) -> bool {
    spec_context_re().is_match(s)
}

pub fn validate_spec_context(s: &str) -> Result<()> {
    if is_spec_context(s) {
        Ok(())
    } else {
        Err(SpecLedgerError::InvalidSpecContext(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_context_boundaries() {
        assert!(!is_spec_context("09-x"));
        assert!(!is_spec_context("9-x"));
        assert!(is_spec_context("010-x"));
        assert!(is_spec_context("999999-very-long-kebab-name"));
        assert!(is_spec_context("migrated"));
        assert!(!is_spec_context("010-My-Feature"));
        assert!(!is_spec_context("main"));
    }

    #[test]
    fn migrated_is_not_a_feature_branch() {
        assert!(!is_feature_branch_name("migrated"));
        assert!(is_feature_branch_name("010-x"));
    }

    #[test]
    fn lock_and_backup_paths_append_suffix() {
        let records = issues_path(Path::new("specledger"), "010-x");
        assert_eq!(
            lock_path_for(&records),
            PathBuf::from("specledger/010-x/issues.jsonl.lock")
        );
        assert_eq!(
            backup_path_for(&records),
            PathBuf::from("specledger/010-x/issues.jsonl.bak")
        );
    }
}
