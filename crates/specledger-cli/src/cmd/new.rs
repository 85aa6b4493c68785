use crate::output::print_json;
use anyhow::{bail, Context};
use clap::Args;
use inquire::Text;
use specledger_core::config::Config;
use specledger_core::launcher::AgentLauncher;
use specledger_core::metadata::{self, ProjectMetadata};
use specledger_core::playbook;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const MAX_SHORT_CODE: usize = 4;

#[derive(Args, Debug, Default)]
pub struct NewArgs {
    /// Project name (letters, digits and dashes)
    #[arg(long)]
    pub project_name: Option<String>,
    /// Short code used as the project prefix (lowercased, at most 4 characters)
    #[arg(long)]
    pub short_code: Option<String>,
    /// Parent directory for the project (default: config default_project_dir)
    #[arg(long)]
    pub project_dir: Option<PathBuf>,
    /// Playbook to apply
    #[arg(long)]
    pub playbook: Option<String>,
    /// Never prompt; missing flags are errors
    #[arg(long)]
    pub ci: bool,
    /// Skip `git init`
    #[arg(long)]
    pub no_git: bool,
    /// Bootstrap into an existing directory
    #[arg(long)]
    pub force: bool,
}

/// Lowercase and cut to the short-code length limit.
pub fn normalize_short_code(code: &str) -> String {
    code.trim().to_lowercase().chars().take(MAX_SHORT_CODE).collect()
}

/// First two alphanumeric characters of the name, or `sl`.
pub fn derive_short_code(name: &str) -> String {
    let code: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(2)
        .collect::<String>()
        .to_lowercase();
    if code.len() < 2 {
        "sl".to_string()
    } else {
        code
    }
}

fn resolve_value(
    flag: Option<String>,
    interactive: bool,
    prompt: &str,
    default: Option<&str>,
    flag_name: &str,
) -> anyhow::Result<String> {
    if let Some(v) = flag.filter(|v| !v.trim().is_empty()) {
        return Ok(v);
    }
    if !interactive {
        bail!("--{flag_name} flag is required in non-interactive mode");
    }
    let mut text = Text::new(prompt);
    if let Some(d) = default {
        text = text.with_default(d);
    }
    Ok(text.prompt()?)
}

pub(crate) fn git_init(dir: &Path) -> anyhow::Result<()> {
    let output = Command::new("git")
        .arg("init")
        .current_dir(dir)
        .output()
        .context("failed to run git")?;
    if !output.status.success() {
        bail!(
            "git init failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    // Staging is best-effort; a custom .gitignore can make it fail.
    if let Err(e) = Command::new("git").args(["add", "."]).current_dir(dir).output() {
        tracing::warn!(error = %e, "git add failed");
    }
    Ok(())
}

fn launch_agent(cfg: &Config, dir: &Path) {
    if cfg.agent.is_empty() || cfg.agent.eq_ignore_ascii_case("none") {
        return;
    }
    if std::env::var("CI").is_ok_and(|v| v == "true" || v == "1") {
        return;
    }
    let agent = AgentLauncher::for_command(&cfg.agent, dir);
    if !agent.is_available() {
        println!("{} is not installed.", agent.name);
        println!("  {}", agent.install_instructions());
        return;
    }
    println!("Launching {}...", agent.name);
    match agent.launch() {
        Ok(status) if !status.success() => tracing::warn!(%status, "agent exited"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "agent launch failed"),
    }
}

pub fn run(args: NewArgs, json: bool) -> anyhow::Result<()> {
    let cfg = Config::load().context("failed to load user config")?;
    let interactive = !args.ci && std::io::stdin().is_terminal();

    let name = resolve_value(args.project_name, interactive, "Project name:", None, "project-name")?;
    metadata::validate_project_name(&name)?;
    let suggested = derive_short_code(&name);
    let short_code = normalize_short_code(&resolve_value(
        args.short_code,
        interactive,
        "Short code:",
        Some(&suggested),
        "short-code",
    )?);
    metadata::validate_short_code(&short_code)?;

    let parent = args.project_dir.unwrap_or_else(|| cfg.default_project_dir.clone());
    let project = parent.join(&name);
    if project.exists() && !args.force {
        bail!(
            "project directory already exists: {} (use --force to bootstrap into it)",
            project.display()
        );
    }
    std::fs::create_dir_all(&project)
        .with_context(|| format!("failed to create {}", project.display()))?;

    let pb = match args.playbook.as_deref() {
        Some(n) => playbook::find_playbook(n)?,
        None => playbook::default_playbook()?,
    };
    let applied = playbook::apply(&pb.name, &project, args.force)
        .with_context(|| format!("failed to apply playbook '{}'", pb.name))?;

    let now = chrono::Utc::now();
    let mut meta = ProjectMetadata::new(
        &name,
        &short_code,
        &applied.name,
        &applied.version,
        applied.structure.clone(),
        now,
    );
    meta.agent_preference = Some(cfg.agent.clone()).filter(|a| !a.is_empty());
    meta.save(&project, now).context("failed to write project metadata")?;

    super::install_hook_advisory();

    if !args.no_git {
        git_init(&project).context("failed to initialize git")?;
    }

    if json {
        print_json(&serde_json::json!({
            "path": project,
            "project": meta.project,
            "playbook": applied,
        }))?;
    } else {
        println!("Project created: {}", project.display());
        println!("  Short code: {short_code}");
        println!("  Playbook:   {} ({} files)", applied.name, applied.files_copied);
        println!();
        println!("Next steps:");
        println!("  cd {}", project.display());
        println!("  sl doctor");
    }

    if interactive && !json {
        launch_agent(&cfg, &project);
    }
    Ok(())
}
