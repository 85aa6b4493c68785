//! Title-similarity checks run before creating an issue.

use crate::error::Result;
use crate::issue::Issue;
use crate::store::{list_all_specs, IssueStore, ListFilter};
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;

pub const DEFAULT_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateMatch {
    pub issue: Issue,
    pub similarity: f64,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Edit distance over Unicode scalar values.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// `1 - distance / max_len` after trimming and lowercasing.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = normalize(a).chars().collect();
    let b: Vec<char> = normalize(b).chars().collect();
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let max = a.len().max(b.len());
    1.0 - levenshtein(&a, &b) as f64 / max as f64
}

/// Records whose title scores at or above `threshold`, most similar first.
pub fn find_similar(title: &str, issues: &[Issue], threshold: f64) -> Vec<DuplicateMatch> {
    let mut found: Vec<DuplicateMatch> = issues
        .iter()
        .filter_map(|issue| {
            let score = similarity(title, &issue.title);
            (score >= threshold).then(|| DuplicateMatch {
                issue: issue.clone(),
                similarity: score,
            })
        })
        .collect();
    found.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    found
}

/// Check the records of one spec.
pub fn check_duplicates(store: &IssueStore, title: &str, threshold: f64) -> Result<Vec<DuplicateMatch>> {
    let issues = store.list(&ListFilter::default())?;
    Ok(find_similar(title, &issues, threshold))
}

/// Check every spec directory under `base`.
pub fn check_duplicates_across_specs(
    base: &Path,
    title: &str,
    threshold: f64,
) -> Result<Vec<DuplicateMatch>> {
    let issues = list_all_specs(base, &ListFilter::default())?;
    Ok(find_similar(title, &issues, threshold))
}

pub fn format_duplicate_warning(matches: &[DuplicateMatch]) -> String {
    if matches.is_empty() {
        return String::new();
    }
    let mut out = String::from("Potential duplicate issues found:\n\n");
    for m in matches {
        let _ = writeln!(out, "  {} ({:.0}% similar)", m.issue.id, m.similarity * 100.0);
        let _ = writeln!(out, "    Title: {}", m.issue.title);
        let _ = writeln!(out, "    Spec: {}", m.issue.spec_context);
        let _ = writeln!(out, "    Status: {}", m.issue.status);
        out.push('\n');
    }
    out.push_str("Use --force to create anyway.\n");
    out
}
