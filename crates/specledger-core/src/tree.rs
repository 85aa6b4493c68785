//! ASCII tree rendering for dependency and hierarchy forests.

use crate::graph::DependencyTree;
use crate::issue::{Issue, IssueStatus, IssueType};
use colored::{Color, Colorize};
use std::collections::HashSet;
use std::fmt::Write;

#[derive(Debug, Clone)]
pub struct TreeOptions {
    pub max_depth: usize,
    pub show_status: bool,
    pub title_width: usize,
    pub show_spec: bool,
    pub show_type: bool,
    pub show_priority: bool,
    pub color: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            show_status: true,
            title_width: 40,
            show_spec: false,
            show_type: true,
            show_priority: true,
            color: true,
        }
    }
}

pub struct TreeRenderer {
    opts: TreeOptions,
}

/// Cut to `width` characters, the last one replaced by an ellipsis.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out: String = s.chars().take(width - 1).collect();
    out.push('…');
    out
}

impl TreeRenderer {
    pub fn new(opts: TreeOptions) -> Self {
        Self { opts }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.opts.color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn type_tag(&self, t: IssueType) -> String {
        let (tag, color) = match t {
            IssueType::Epic => ("[E]", Color::Magenta),
            IssueType::Feature => ("[F]", Color::Green),
            IssueType::Task => ("[T]", Color::Blue),
            IssueType::Bug => ("[B]", Color::Red),
        };
        self.paint(tag, color)
    }

    fn priority_tag(&self, p: i32) -> String {
        let color = match p {
            0 => Color::Red,
            1 => Color::Yellow,
            2 => Color::Green,
            3 => Color::Cyan,
            _ => Color::BrightBlack,
        };
        self.paint(&format!("[P{p}]"), color)
    }

    fn status_glyph(&self, s: IssueStatus) -> String {
        match s {
            IssueStatus::Open => self.paint("○", Color::Green),
            IssueStatus::InProgress => self.paint("◐", Color::Yellow),
            IssueStatus::Closed => self.paint("●", Color::BrightBlack),
        }
    }

    /// One-line node label: `[T][P2] SL-xxxxxx title ○ (spec)`.
    pub fn format_issue(&self, issue: &Issue) -> String {
        let mut out = String::new();
        if self.opts.show_type {
            out.push_str(&self.type_tag(issue.issue_type));
        }
        if self.opts.show_priority {
            out.push_str(&self.priority_tag(issue.priority));
        }
        out.push(' ');
        if self.opts.color {
            out.push_str(&issue.id.bold().to_string());
        } else {
            out.push_str(&issue.id);
        }
        out.push(' ');
        out.push_str(&truncate(&issue.title, self.opts.title_width));
        if self.opts.show_status {
            out.push(' ');
            out.push_str(&self.status_glyph(issue.status));
        }
        if self.opts.show_spec && !issue.spec_context.is_empty() {
            let _ = write!(out, " ({})", issue.spec_context);
        }
        out
    }

    pub fn render(&self, tree: &DependencyTree) -> String {
        let mut out = String::new();
        self.render_node(tree, "", "", 0, &mut HashSet::new(), &mut out);
        out
    }

    /// Trees separated by a blank line.
    /// Forest hung under a single label line, `label (N issues)`.
    pub fn render_with_root(&self, label: &str, trees: &[DependencyTree], total: usize) -> String {
        let mut out = String::from(label);
        if total > 0 {
            let _ = write!(out, " ({total} issues)");
        }
        out.push('\n');
        for (i, tree) in trees.iter().enumerate() {
            let last = i + 1 == trees.len();
            let (branch, cont) = if last { ("└── ", "    ") } else { ("├── ", "│   ") };
            self.render_node(tree, branch, cont, 0, &mut HashSet::new(), &mut out);
        }
        out
    }

    /// `head` is written before this node's label; `cont` prefixes its
    /// children's lines.
    fn render_node(
        &self,
        node: &DependencyTree,
        head: &str,
        cont: &str,
        depth: usize,
        path: &mut HashSet<String>,
        out: &mut String,
    ) {
        if depth > self.opts.max_depth {
            out.push_str(head);
            out.push_str("…\n");
            return;
        }
        out.push_str(head);
        out.push_str(&self.format_issue(&node.issue));
        if !path.insert(node.issue.id.clone()) {
            out.push_str(" ⚠ (cycle)\n");
            return;
        }
        out.push('\n');

        let kids: Vec<&DependencyTree> = node.blocks.iter().chain(&node.children).collect();
        for (i, child) in kids.iter().enumerate() {
            let last = i + 1 == kids.len();
            let branch = format!("{cont}{}", if last { "└── " } else { "├── " });
            let next = format!("{cont}{}", if last { "    " } else { "│   " });
            self.render_node(child, &branch, &next, depth + 1, path, out);
        }
        path.remove(&node.issue.id);
    }
}

pub fn format_cycle_warning(cycles: &[Vec<String>]) -> String {
    if cycles.is_empty() {
        return String::new();
    }
    let mut out = String::from("⚠ Warning: Cyclic dependencies detected\n");
    for cycle in cycles {
        let _ = writeln!(out, "  Cycle: {}", cycle.join(" → "));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::blocks_forest;
    use chrono::{DateTime, Utc};

    fn at() -> DateTime<Utc> {
        "2026-02-19T12:00:00Z".parse().unwrap()
    }

    fn plain() -> TreeRenderer {
        TreeRenderer::new(TreeOptions {
            color: false,
            ..Default::default()
        })
    }

    fn issue(title: &str) -> Issue {
        Issue::new(title, "", "010-x", IssueType::Task, 2, at())
    }

    #[test]
    fn truncate_uses_ellipsis() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
        assert_eq!(truncate("abcdefghijk", 5), "abcd…");
        assert_eq!(truncate("héllo wörld", 4), "hél…");
    }

    #[test]
    fn format_issue_plain() {
        let i = issue("Add validation");
        let line = plain().format_issue(&i);
        assert_eq!(line, format!("[T][P2] {} Add validation ○", i.id));

        let r = TreeRenderer::new(TreeOptions {
            color: false,
            show_spec: true,
            show_type: false,
            show_status: false,
            ..Default::default()
        });
        assert_eq!(r.format_issue(&i), format!("[P2] {} Add validation (010-x)", i.id));
    }

    #[test]
    fn render_with_root_draws_branches() {
        let mut a = issue("a");
        let mut b = issue("b");
        let c = issue("c");
        a.blocks = vec![b.id.clone()];
        b.blocked_by = vec![a.id.clone()];
        let forest = blocks_forest(&[a.clone(), b.clone(), c.clone()]);
        let out = plain().render_with_root("010-x", &forest, 3);
        let expected = format!(
            "010-x (3 issues)\n\
             ├── [T][P2] {a} a ○\n\
             │   └── [T][P2] {b} b ○\n\
             └── [T][P2] {c} c ○\n",
            a = a.id,
            b = b.id,
            c = c.id
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn cycle_node_is_flagged() {
        let mut a = issue("a");
        let mut b = issue("b");
        a.blocks = vec![b.id.clone()];
        b.blocks = vec![a.id.clone()];
        let forest = blocks_forest(&[a.clone(), b.clone()]);
        let out = plain().render(&forest[0]);
        let last = out.lines().last().unwrap();
        assert!(last.ends_with("⚠ (cycle)"), "{out}");
        assert!(last.starts_with("    └── "), "{out}");
    }

    #[test]
    fn depth_limit_prints_ellipsis() {
        let mut a = issue("a");
        let mut b = issue("b");
        let c = issue("c");
        a.blocks = vec![b.id.clone()];
        b.blocks = vec![c.id.clone()];
        let forest = blocks_forest(&[a, b, c]);
        let r = TreeRenderer::new(TreeOptions {
            color: false,
            max_depth: 1,
            ..Default::default()
        });
        let out = r.render(&forest[0]);
        assert_eq!(out.lines().count(), 3);
        assert_eq!(out.lines().last().unwrap(), "    └── …");
    }

    #[test]
    fn cycle_warning_format() {
        assert_eq!(format_cycle_warning(&[]), "");
        let w = format_cycle_warning(&[vec!["SL-a".into(), "SL-b".into(), "SL-a".into()]]);
        assert_eq!(
            w,
            "⚠ Warning: Cyclic dependencies detected\n  Cycle: SL-a → SL-b → SL-a\n\n"
        );
    }
}
