use super::new::{derive_short_code, normalize_short_code};
use crate::output::print_json;
use anyhow::Context;
use specledger_core::metadata::{self, ProjectMetadata};
use specledger_core::{paths, playbook, SpecLedgerError};
use std::path::Path;

/// Directory name reduced to the characters a project name allows.
pub fn project_name_from_dir(root: &Path) -> String {
    let raw = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let name = name.trim_matches('-').to_string();
    if name.is_empty() {
        "project".to_string()
    } else {
        name
    }
}

pub fn run(
    root: &Path,
    short_code: Option<&str>,
    playbook_name: Option<&str>,
    force: bool,
    json: bool,
) -> anyhow::Result<()> {
    let now = chrono::Utc::now();

    if !ProjectMetadata::exists(root) && metadata::has_legacy(root) {
        let meta = metadata::migrate_legacy(root, now).context("failed to migrate specledger.mod")?;
        super::install_hook_advisory();
        if json {
            print_json(&serde_json::json!({ "migrated": true, "project": meta.project }))?;
        } else {
            println!(
                "Migrated specledger.mod to {} for project '{}'",
                paths::METADATA_FILE,
                meta.project.name
            );
        }
        return Ok(());
    }

    if ProjectMetadata::exists(root) && !force {
        return Err(SpecLedgerError::MetadataExists(
            paths::metadata_path(root).display().to_string(),
        )
        .into());
    }

    let name = project_name_from_dir(root);
    let code = match short_code {
        Some(c) => normalize_short_code(c),
        None => derive_short_code(&name),
    };
    metadata::validate_short_code(&code)?;

    let pb = match playbook_name {
        Some(n) => playbook::find_playbook(n)?,
        None => playbook::default_playbook()?,
    };
    std::fs::create_dir_all(root).with_context(|| format!("failed to create {}", root.display()))?;
    let applied = playbook::apply(&pb.name, root, false)
        .with_context(|| format!("failed to apply playbook '{}'", pb.name))?;

    let mut meta = ProjectMetadata::new(
        &name,
        &code,
        &applied.name,
        &applied.version,
        applied.structure.clone(),
        now,
    );
    meta.save(root, now).context("failed to write project metadata")?;
    super::install_hook_advisory();

    if json {
        print_json(&serde_json::json!({
            "migrated": false,
            "project": meta.project,
            "playbook": applied,
        }))?;
    } else {
        println!("SpecLedger initialized in {}", root.display());
        println!("  Project:    {name}");
        println!("  Short code: {code}");
        println!("  Metadata:   {}", paths::METADATA_FILE);
        println!(
            "  Playbook:   {} ({} copied, {} kept)",
            applied.name, applied.files_copied, applied.files_skipped
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_from_directories() {
        assert_eq!(project_name_from_dir(Path::new("/tmp/my_app")), "my-app");
        assert_eq!(project_name_from_dir(Path::new("/tmp/web-9")), "web-9");
        assert_eq!(project_name_from_dir(Path::new("/")), "project");
    }
}
