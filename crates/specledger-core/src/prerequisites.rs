//! External tool checks behind `sl doctor`.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Core,
    Framework,
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ToolCategory::Core => "core",
            ToolCategory::Framework => "framework",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Tool {
    pub name: &'static str,
    pub display_name: &'static str,
    pub category: ToolCategory,
    pub install_hint: &'static str,
}

pub const CORE_TOOLS: &[Tool] = &[
    Tool {
        name: "mise",
        display_name: "mise (version manager)",
        category: ToolCategory::Core,
        install_hint: "https://mise.jdx.dev/getting-started.html",
    },
    Tool {
        name: "bd",
        display_name: "beads (issue tracker)",
        category: ToolCategory::Core,
        install_hint: "mise install ubi:steveyegge/beads@0.28.0",
    },
    Tool {
        name: "perles",
        display_name: "perles (workflow tool)",
        category: ToolCategory::Core,
        install_hint: "mise install ubi:zjrosen/perles@0.2.11",
    },
];

pub const FRAMEWORK_TOOLS: &[Tool] = &[
    Tool {
        name: "specify",
        display_name: "specify (Spec Kit framework)",
        category: ToolCategory::Framework,
        install_hint: "mise install pipx:git+https://github.com/github/spec-kit.git",
    },
    Tool {
        name: "openspec",
        display_name: "openspec (OpenSpec framework)",
        category: ToolCategory::Framework,
        install_hint: "mise install npm:@fission-ai/openspec",
    },
];

/// Locates tools and reads their versions.
pub trait ToolProbe {
    fn locate(&self, name: &str) -> Option<PathBuf>;
    fn version(&self, name: &str) -> Option<String>;
}

/// `$PATH` lookup plus `<tool> --version`.
pub struct SystemProbe;

impl ToolProbe for SystemProbe {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn version(&self, name: &str) -> Option<String> {
        let output = Command::new(name).arg("--version").output().ok()?;
        if !output.status.success() {
            return None;
        }
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            text = String::from_utf8_lossy(&output.stderr).into_owned();
        }
        text.lines()
            .next()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub name: String,
    #[serde(skip)]
    pub display_name: String,
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub category: ToolCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoctorStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub status: DoctorStatus,
    pub tools: Vec<ToolStatus>,
    pub missing: Vec<String>,
    pub install_instructions: String,
}

impl DoctorReport {
    pub fn passed(&self) -> bool {
        self.status == DoctorStatus::Pass
    }
}

pub fn check_tool(probe: &dyn ToolProbe, tool: &Tool) -> ToolStatus {
    let path = probe.locate(tool.name);
    let version = path.as_ref().and_then(|_| probe.version(tool.name));
    ToolStatus {
        name: tool.name.to_string(),
        display_name: tool.display_name.to_string(),
        installed: path.is_some(),
        version,
        path: path.map(|p| p.display().to_string()),
        category: tool.category,
    }
}

pub fn install_instructions(missing: &[&Tool]) -> String {
    if missing.is_empty() {
        return "All required tools are installed!".to_string();
    }
    let mut out = String::from("Missing required tools:\n");
    for tool in missing {
        out.push_str(&format!("  • {}: {}\n", tool.display_name, tool.install_hint));
    }
    out
}

/// Check every known tool. Only missing core tools fail the report.
pub fn check_prerequisites(probe: &dyn ToolProbe) -> DoctorReport {
    let tools: Vec<ToolStatus> = CORE_TOOLS
        .iter()
        .chain(FRAMEWORK_TOOLS)
        .map(|t| check_tool(probe, t))
        .collect();
    let missing_core: Vec<&Tool> = CORE_TOOLS
        .iter()
        .filter(|t| !tools.iter().any(|s| s.name == t.name && s.installed))
        .collect();
    DoctorReport {
        status: if missing_core.is_empty() {
            DoctorStatus::Pass
        } else {
            DoctorStatus::Fail
        },
        tools,
        missing: missing_core.iter().map(|t| t.name.to_string()).collect(),
        install_instructions: install_instructions(&missing_core),
    }
}
