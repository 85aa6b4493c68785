//! Foreground launch of an AI coding agent in a project directory.

use crate::error::{Result, SpecLedgerError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};

#[derive(Debug, Clone)]
pub struct AgentLauncher {
    pub name: String,
    pub command: String,
    pub dir: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl AgentLauncher {
    pub fn new(name: impl Into<String>, command: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            dir: dir.into(),
            env: BTreeMap::new(),
        }
    }

    /// Launcher for a configured agent command. `claude` gets its display name.
    pub fn for_command(command: &str, dir: impl Into<PathBuf>) -> Self {
        let name = match command {
            "claude" => "Claude Code",
            other => other,
        };
        Self::new(name, command, dir)
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn is_available(&self) -> bool {
        !self.command.is_empty() && which::which(&self.command).is_ok()
    }

    fn build(&self) -> Result<Command> {
        if self.command.is_empty() {
            return Err(SpecLedgerError::InvalidRecord(
                "no agent command configured".to_string(),
            ));
        }
        let mut cmd = Command::new(&self.command);
        cmd.current_dir(&self.dir).envs(&self.env);
        Ok(cmd)
    }

    /// Run with inherited stdio and wait for the agent to exit.
    pub fn launch(&self) -> Result<ExitStatus> {
        tracing::info!(agent = %self.name, dir = %self.dir.display(), "launching agent");
        Ok(self.build()?.status()?)
    }

    pub fn install_instructions(&self) -> String {
        match self.command.as_str() {
            "claude" => "Install Claude Code: npm install -g @anthropic-ai/claude-code".to_string(),
            cmd => format!(
                "Install {} and ensure '{cmd}' is available in your PATH",
                self.name
            ),
        }
    }
}
