//! Cancellable `git` subprocesses for the resolver.

use crate::error::{Result, SpecLedgerError};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Run `git <args>` in `dir`. A cancelled token kills the child and yields
/// `Cancelled`; a spawn failure surfaces as an I/O error.
pub async fn run_git(dir: &Path, args: &[&str], token: &CancellationToken) -> Result<GitOutput> {
    if token.is_cancelled() {
        return Err(SpecLedgerError::Cancelled);
    }
    tracing::debug!(dir = %dir.display(), "git {}", args.join(" "));
    let child = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // Dropping the wait future on cancellation drops the child, which kills it.
    let output = tokio::select! {
        out = child.wait_with_output() => out?,
        _ = token.cancelled() => return Err(SpecLedgerError::Cancelled),
    };
    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Shallow clone of a branch or tag.
pub async fn clone_ref(url: &str, reference: &str, dest: &Path, token: &CancellationToken) -> Result<()> {
    let parent = dest.parent().unwrap_or(Path::new("."));
    let dest_s = dest.to_string_lossy();
    let out = run_git(
        parent,
        &["clone", "--quiet", "--depth", "1", "--branch", reference, url, &dest_s],
        token,
    )
    .await?;
    if out.success {
        return Ok(());
    }
    // git reports an unknown branch as a clone failure; name the revision.
    if out.stderr.contains("not found in upstream") || out.stderr.contains("Remote branch") {
        return Err(SpecLedgerError::ResolveRevision {
            url: url.to_string(),
            revision: format!("#{reference}"),
            reason: out.stderr,
        });
    }
    Err(SpecLedgerError::CloneFailed {
        url: url.to_string(),
        reason: out.stderr,
    })
}

/// Full clone without a working tree, for checking out an arbitrary commit.
pub async fn clone_full(url: &str, dest: &Path, token: &CancellationToken) -> Result<()> {
    let parent = dest.parent().unwrap_or(Path::new("."));
    let dest_s = dest.to_string_lossy();
    let out = run_git(parent, &["clone", "--quiet", "--no-checkout", url, &dest_s], token).await?;
    if out.success {
        Ok(())
    } else {
        Err(SpecLedgerError::CloneFailed {
            url: url.to_string(),
            reason: out.stderr,
        })
    }
}

pub async fn checkout(repo: &Path, url: &str, revision: &str, token: &CancellationToken) -> Result<()> {
    let out = run_git(repo, &["checkout", "--quiet", revision], token).await?;
    if out.success {
        Ok(())
    } else {
        Err(SpecLedgerError::ResolveRevision {
            url: url.to_string(),
            revision: revision.to_string(),
            reason: out.stderr,
        })
    }
}

pub async fn head_commit(repo: &Path, url: &str, token: &CancellationToken) -> Result<String> {
    let out = run_git(repo, &["rev-parse", "HEAD"], token).await?;
    if out.success {
        Ok(out.stdout)
    } else {
        Err(SpecLedgerError::ResolveRevision {
            url: url.to_string(),
            revision: "HEAD".to_string(),
            reason: out.stderr,
        })
    }
}
