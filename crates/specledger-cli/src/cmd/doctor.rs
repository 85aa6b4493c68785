use crate::output::print_json;
use colored::Colorize;
use specledger_core::prerequisites::{check_prerequisites, DoctorReport, SystemProbe, ToolCategory};

fn print_section(report: &DoctorReport, category: ToolCategory, title: &str) {
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).cyan());
    for tool in report.tools.iter().filter(|t| t.category == category) {
        let mark = if tool.installed {
            "✓".green()
        } else if category == ToolCategory::Core {
            "✗".red()
        } else {
            "-".dimmed()
        };
        let version = tool
            .version
            .as_deref()
            .map(|v| format!(" ({v})").dimmed().to_string())
            .unwrap_or_default();
        println!("  {mark} {}{version}", tool.display_name.bold());
    }
    println!();
}

/// Returns whether every core tool is installed.
pub fn run(json: bool) -> anyhow::Result<bool> {
    let report = check_prerequisites(&SystemProbe);
    if json {
        print_json(&report)?;
        return Ok(report.passed());
    }

    println!("SpecLedger Doctor");
    println!();
    print_section(&report, ToolCategory::Core, "Core Tools");
    print_section(&report, ToolCategory::Framework, "Framework Tools");
    if report.passed() {
        println!("{} {}", "✓".green(), report.install_instructions);
    } else {
        print!("{}", report.install_instructions);
    }
    Ok(report.passed())
}
