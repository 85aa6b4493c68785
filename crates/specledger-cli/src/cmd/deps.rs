use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use clap::Subcommand;
use specledger_core::config::Config;
use specledger_core::lockfile::Lockfile;
use specledger_core::manifest::{validate_manifest, Dependency, Manifest};
use specledger_core::metadata::{DependencyEntry, ProjectMetadata};
use specledger_core::resolver::{self, Resolver, ResolverOptions};
use specledger_core::{paths, SpecLedgerError};
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_SPEC_PATH: &str = "spec.md";

#[derive(Subcommand)]
pub enum DepsSubcommand {
    /// Declare a dependency on a spec in another repository
    Add {
        /// Repository URL (git@host:org/repo, https://host/org/repo or a local path)
        url: String,
        /// Branch or tag to track, or a 40-character commit to pin
        #[arg(long, default_value = DEFAULT_BRANCH)]
        branch: String,
        /// Path of the spec document inside the repository
        #[arg(long, default_value = DEFAULT_SPEC_PATH)]
        path: String,
        /// Short name for the dependency
        #[arg(long)]
        alias: Option<String>,
    },
    /// List declared dependencies and their lock status
    List,
    /// Remove a dependency by URL or alias
    Remove { target: String },
    /// Fetch every dependency and write spec.sum
    Resolve {
        /// Bypass the local cache
        #[arg(long)]
        no_cache: bool,
    },
}

pub fn run(root: &Path, subcmd: DepsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        DepsSubcommand::Add {
            url,
            branch,
            path,
            alias,
        } => add(root, &url, &branch, &path, alias, json),
        DepsSubcommand::List => list(root, json),
        DepsSubcommand::Remove { target } => remove(root, &target, json),
        DepsSubcommand::Resolve { no_cache } => resolve(root, no_cache, json),
    }
}

/// A 40-hex commit pins; anything else is tracked as `#ref`.
pub fn revision_for(branch: &str) -> String {
    let pinned = Dependency::new("", branch, "", None).is_pinned();
    if pinned || branch.starts_with('#') {
        branch.to_string()
    } else {
        format!("#{branch}")
    }
}

fn load_manifest(root: &Path) -> anyhow::Result<Manifest> {
    let path = paths::manifest_path(root);
    Manifest::load(&path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_lockfile(root: &Path) -> anyhow::Result<Option<Lockfile>> {
    let path = paths::lockfile_path(root);
    if !path.exists() {
        return Ok(None);
    }
    let lock = Lockfile::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(lock))
}

fn with_metadata(root: &Path, f: impl FnOnce(&mut ProjectMetadata) -> anyhow::Result<bool>) -> anyhow::Result<()> {
    if !ProjectMetadata::exists(root) {
        return Ok(());
    }
    let mut meta = ProjectMetadata::load(root).context("failed to load project metadata")?;
    if f(&mut meta)? {
        meta.save(root, chrono::Utc::now())
            .context("failed to save project metadata")?;
    }
    Ok(())
}

fn add(
    root: &Path,
    url: &str,
    branch: &str,
    spec_path: &str,
    alias: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let mut manifest = load_manifest(root)?;
    let dep = Dependency::new(url, revision_for(branch), spec_path, alias.clone());
    manifest.add(dep.clone())?;
    manifest
        .save(&paths::manifest_path(root), chrono::Utc::now())
        .context("failed to write spec.mod")?;

    let entry = DependencyEntry {
        url: url.to_string(),
        branch: Some(branch.trim_start_matches('#').to_string()),
        path: Some(spec_path.to_string()),
        import_path: alias.as_ref().map(|a| format!("@{a}/{spec_path}")),
        alias,
        ..Default::default()
    };
    with_metadata(root, |meta| match meta.add_dependency(entry) {
        Ok(()) => Ok(true),
        Err(SpecLedgerError::DuplicateDependency(d)) => {
            tracing::debug!(dependency = %d, "already recorded in metadata");
            Ok(false)
        }
        Err(SpecLedgerError::InvalidUrl(u)) => {
            tracing::warn!(url = %u, "not mirrored into project metadata: expected host/org/repo");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    })?;

    if json {
        print_json(&dep)?;
    } else {
        println!("Added dependency {url}");
        println!("  Revision: {}", dep.revision);
        println!("  Path:     {}", dep.spec_path);
        if let Some(a) = &dep.alias {
            println!("  Alias:    {a}");
            println!("  Import:   @{a}/{}", dep.spec_path);
        }
        println!("Run 'sl deps resolve' to lock it.");
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let manifest = load_manifest(root)?;
    let lock = load_lockfile(root)?;
    let commit_of = |d: &Dependency| {
        lock.as_ref()
            .and_then(|l| l.get_entry(&d.repository_url, &d.spec_path))
            .map(|e| e.commit_hash.clone())
    };

    if json {
        let deps: Vec<_> = manifest
            .dependencies
            .iter()
            .map(|d| {
                serde_json::json!({
                    "repository_url": d.repository_url,
                    "revision": d.revision,
                    "spec_path": d.spec_path,
                    "alias": d.alias,
                    "locked_commit": commit_of(d),
                })
            })
            .collect();
        return print_json(&serde_json::json!({ "id": manifest.id, "dependencies": deps }));
    }

    if manifest.dependencies.is_empty() {
        println!("No dependencies declared.");
        println!("Add one with: sl deps add git@github.com:org/spec");
        return Ok(());
    }
    let rows = manifest
        .dependencies
        .iter()
        .map(|d| {
            let status = match commit_of(d) {
                Some(c) => c.chars().take(8).collect(),
                None => "not resolved".to_string(),
            };
            vec![
                d.repository_url.clone(),
                d.revision.clone(),
                d.spec_path.clone(),
                d.alias.clone().unwrap_or_default(),
                status,
            ]
        })
        .collect();
    print_table(&["URL", "REVISION", "PATH", "ALIAS", "LOCKED"], rows);
    Ok(())
}

fn remove(root: &Path, target: &str, json: bool) -> anyhow::Result<()> {
    let mut manifest = load_manifest(root)?;
    let removed = manifest.remove(target);
    let mut meta_removed = false;
    with_metadata(root, |meta| {
        meta_removed = meta.remove_dependency(target);
        Ok(meta_removed)
    })?;
    if removed.is_empty() && !meta_removed {
        bail!("dependency not found: {target}");
    }
    if !removed.is_empty() {
        manifest
            .save(&paths::manifest_path(root), chrono::Utc::now())
            .context("failed to write spec.mod")?;
        if let Some(mut lock) = load_lockfile(root)? {
            let mut changed = false;
            for d in &removed {
                changed |= lock.remove_entry(&d.repository_url, &d.spec_path);
            }
            if changed {
                lock.write(&paths::lockfile_path(root))
                    .context("failed to write spec.sum")?;
            }
        }
    }

    if json {
        print_json(&serde_json::json!({ "removed": removed }))?;
    } else {
        println!("Removed dependency {target}");
    }
    Ok(())
}

fn resolve(root: &Path, no_cache: bool, json: bool) -> anyhow::Result<()> {
    let manifest = load_manifest(root)?;
    validate_manifest(&manifest).with_context(|| {
        format!(
            "{} is invalid; fix the declaration or remove it with 'sl deps remove'",
            paths::MANIFEST_FILE
        )
    })?;
    let cfg = Config::load().context("failed to load user config")?;
    let resolver = Resolver::new(ResolverOptions {
        cache_dir: cfg.cache_dir.clone(),
        no_cache,
    });

    let rt = tokio::runtime::Runtime::new()?;
    let token = CancellationToken::new();
    let results = rt.block_on(async {
        let guard = token.clone();
        tokio::select! {
            res = resolver.resolve_all(&manifest, &token) => res,
            _ = tokio::signal::ctrl_c() => {
                guard.cancel();
                Err(SpecLedgerError::Cancelled)
            }
        }
    })?;
    for r in &results {
        resolver::verify_payload(r)?;
    }

    let lock = Lockfile::from_results(&results, chrono::Utc::now());
    lock.write(&paths::lockfile_path(root))
        .context("failed to write spec.sum")?;
    lock.verify(&manifest)?;

    with_metadata(root, |meta| {
        let mut changed = false;
        for r in &results {
            changed |= meta.set_resolved_commit(&r.dependency.repository_url, &r.commit_hash)?;
        }
        Ok(changed)
    })?;

    if json {
        print_json(&serde_json::json!({
            "resolved": results,
            "total_size": lock.total_size,
        }))?;
    } else if results.is_empty() {
        println!("No dependencies to resolve.");
    } else {
        let rows = results
            .iter()
            .map(|r| {
                vec![
                    r.dependency.repository_url.clone(),
                    r.dependency.spec_path.clone(),
                    r.commit_hash.chars().take(8).collect(),
                    r.source.to_string(),
                ]
            })
            .collect();
        print_table(&["URL", "PATH", "COMMIT", "SOURCE"], rows);
        println!();
        println!("Wrote {} ({} bytes locked)", paths::LOCKFILE_FILE, lock.total_size);
    }
    Ok(())
}
