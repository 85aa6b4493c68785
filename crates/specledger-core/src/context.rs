//! Spec-context detection from the current git branch.

use crate::error::{Result, SpecLedgerError};
use crate::paths;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Anything that can name the active spec.
pub trait SpecDetector {
    fn detect(&self) -> Result<String>;
}

/// Reads the checked-out branch with the `git` CLI.
#[derive(Debug, Clone)]
pub struct ContextDetector {
    repo_dir: PathBuf,
}

/// `Ok(None)` when git ran and failed. A missing `git` binary is `NoRepo`.
fn git(dir: &Path, args: &[&str]) -> Result<Option<String>> {
    git_with(Command::new("git"), dir, args)
}

fn git_with(mut cmd: Command, dir: &Path, args: &[&str]) -> Result<Option<String>> {
    let output = match cmd.args(args).current_dir(dir).output() {
        Ok(out) => out,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("git executable not found");
            return Err(SpecLedgerError::NoRepo(dir.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    if !output.status.success() {
        return Ok(None);
    }
    Ok(Some(
        String::from_utf8_lossy(&output.stdout).trim().to_string(),
    ))
}

impl ContextDetector {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    /// Short branch name, or `HEAD` when detached.
    pub fn current_branch(&self) -> Result<String> {
        if git(&self.repo_dir, &["rev-parse", "--git-dir"])?.is_none() {
            return Err(SpecLedgerError::NoRepo(self.repo_dir.display().to_string()));
        }
        // symbolic-ref works before the first commit; rev-parse covers detached HEAD.
        if let Some(branch) = git(&self.repo_dir, &["symbolic-ref", "-q", "--short", "HEAD"])? {
            return Ok(branch);
        }
        let head = git(&self.repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(head.unwrap_or_else(|| "HEAD".to_string()))
    }

    pub fn is_feature_branch(&self) -> Result<bool> {
        match self.detect() {
            Ok(_) => Ok(true),
            Err(SpecLedgerError::NotFeatureBranch(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl SpecDetector for ContextDetector {
    fn detect(&self) -> Result<String> {
        let branch = self.current_branch()?;
        parse_spec_from_branch(&branch).ok_or(SpecLedgerError::NotFeatureBranch(branch))
    }
}

/// `refs/heads/010-x` and `010-x` both yield `010-x`.
pub fn parse_spec_from_branch(branch: &str) -> Option<String> {
    let name = branch.strip_prefix("refs/heads/").unwrap_or(branch);
    paths::is_feature_branch_name(name).then(|| name.to_string())
}

/// An explicit context wins; otherwise ask the detector.
pub fn resolve_spec_context(explicit: Option<&str>, detector: &dyn SpecDetector) -> Result<String> {
    match explicit {
        Some(spec) => {
            paths::validate_spec_context(spec)?;
            Ok(spec.to_string())
        }
        None => detector.detect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixed(Result<String>);

    impl SpecDetector for Fixed {
        fn detect(&self) -> Result<String> {
            match &self.0 {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(SpecLedgerError::NotFeatureBranch("main".into())),
            }
        }
    }

    #[test]
    fn branch_parsing() {
        assert_eq!(parse_spec_from_branch("010-x").as_deref(), Some("010-x"));
        assert_eq!(
            parse_spec_from_branch("refs/heads/591-issue-tracking").as_deref(),
            Some("591-issue-tracking")
        );
        assert_eq!(parse_spec_from_branch("main"), None);
        assert_eq!(parse_spec_from_branch("10-x"), None);
        assert_eq!(parse_spec_from_branch("migrated"), None);
    }

    #[test]
    fn explicit_context_overrides_detector() {
        let failing = Fixed(Err(SpecLedgerError::NotFeatureBranch("main".into())));
        assert_eq!(
            resolve_spec_context(Some("010-x"), &failing).unwrap(),
            "010-x"
        );
        assert!(matches!(
            resolve_spec_context(None, &failing),
            Err(SpecLedgerError::NotFeatureBranch(_))
        ));
        assert!(matches!(
            resolve_spec_context(Some("bad"), &failing),
            Err(SpecLedgerError::InvalidSpecContext(_))
        ));
        let ok = Fixed(Ok("011-y".into()));
        assert_eq!(resolve_spec_context(None, &ok).unwrap(), "011-y");
    }

    #[test]
    fn missing_git_binary_is_no_repo() {
        let dir = TempDir::new().unwrap();
        let cmd = Command::new("sl-test-no-such-git-binary");
        assert!(matches!(
            git_with(cmd, dir.path(), &["rev-parse", "--git-dir"]),
            Err(SpecLedgerError::NoRepo(_))
        ));
    }

    #[test]
    fn detects_from_real_repo() {
        if which::which("git").is_err() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let detector = ContextDetector::new(dir.path());
        assert!(matches!(
            detector.detect(),
            Err(SpecLedgerError::NoRepo(_))
        ));

        let run = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .output()
                .unwrap()
        };
        run(&["init", "-q"]);
        run(&["symbolic-ref", "HEAD", "refs/heads/010-my-feature"]);
        assert_eq!(detector.detect().unwrap(), "010-my-feature");
        assert!(detector.is_feature_branch().unwrap());

        run(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        assert!(matches!(
            detector.detect(),
            Err(SpecLedgerError::NotFeatureBranch(b)) if b == "main"
        ));
    }
}
