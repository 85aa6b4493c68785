use crate::error::{Result, SpecLedgerError};
use crate::{id, paths};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_PRIORITY: i32 = 5;
pub const DEFAULT_PRIORITY: i32 = 2;

// ---------------------------------------------------------------------------
// IssueStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    InProgress,
    Closed,
}

impl IssueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::InProgress => "in_progress",
            IssueStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IssueStatus {
    type Err = SpecLedgerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(IssueStatus::Open),
            "in_progress" => Ok(IssueStatus::InProgress),
            "closed" => Ok(IssueStatus::Closed),
            _ => Err(SpecLedgerError::InvalidStatus(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// IssueType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Epic,
    Feature,
    Task,
    Bug,
}

impl IssueType {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::Epic => "epic",
            IssueType::Feature => "feature",
            IssueType::Task => "task",
            IssueType::Bug => "bug",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IssueType {
    type Err = SpecLedgerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "epic" => Ok(IssueType::Epic),
            "feature" => Ok(IssueType::Feature),
            "task" => Ok(IssueType::Task),
            "bug" => Ok(IssueType::Bug),
            _ => Err(SpecLedgerError::InvalidIssueType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Definition of done
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub item: String,
    pub checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionOfDone {
    #[serde(default)]
    pub items: Vec<ChecklistItem>,
}

impl DefinitionOfDone {
    pub fn from_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items
                .into_iter()
                .map(|s| ChecklistItem {
                    item: s.into(),
                    checked: false,
                    verified_at: None,
                })
                .collect(),
        }
    }

    /// An empty checklist counts as complete.
    pub fn is_complete(&self) -> bool {
        self.items.iter().all(|i| i.checked)
    }

    /// Check the first item whose text matches. Already-checked items keep
    /// their original `verified_at`. Returns false when no item matches.
    pub fn check(&mut self, text: &str, now: DateTime<Utc>) -> bool {
        match self.items.iter_mut().find(|i| i.item == text) {
            Some(item) => {
                if !item.checked {
                    item.checked = true;
                    item.verified_at = Some(now);
                }
                true
            }
            None => false,
        }
    }

    pub fn uncheck(&mut self, text: &str) -> bool {
        match self.items.iter_mut().find(|i| i.item == text) {
            Some(item) => {
                item.checked = false;
                item.verified_at = None;
                true
            }
            None => false,
        }
    }

    pub fn unchecked_items(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| !i.checked)
            .map(|i| i.item.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeadsMigration {
    pub original_id: String,
    pub migrated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub status: IssueStatus,
    pub priority: i32,
    pub issue_type: IssueType,
    pub spec_context: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_of_done: Option<DefinitionOfDone>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub assignee: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub design: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub acceptance_criteria: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beads_migration: Option<BeadsMigration>,
}

impl Issue {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        spec_context: impl Into<String>,
        issue_type: IssueType,
        priority: i32,
        now: DateTime<Utc>,
    ) -> Self {
        let title = title.into();
        let spec_context = spec_context.into();
        Self {
            id: id::derive(&spec_context, &title, now),
            title,
            description: description.into(),
            status: IssueStatus::Open,
            priority,
            issue_type,
            spec_context,
            created_at: now,
            updated_at: now,
            closed_at: None,
            definition_of_done: None,
            blocked_by: Vec::new(),
            blocks: Vec::new(),
            labels: Vec::new(),
            assignee: String::new(),
            notes: String::new(),
            design: String::new(),
            acceptance_criteria: String::new(),
            parent_id: None,
            beads_migration: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == IssueStatus::Closed
    }

    pub fn dod_complete(&self) -> bool {
        self.definition_of_done
            .as_ref()
            .map(DefinitionOfDone::is_complete)
            .unwrap_or(true)
    }

    /// Add a label, preserving order. Adding an existing label is a no-op.
    pub fn add_label(&mut self, label: &str) {
        if !self.labels.iter().any(|l| l == label) {
            self.labels.push(label.to_string());
        }
    }

    pub fn remove_label(&mut self, label: &str) {
        self.labels.retain(|l| l != label);
    }

    pub fn has_labels(&self, wanted: &[String]) -> bool {
        wanted.iter().all(|w| self.labels.iter().any(|l| l == w))
    }

    /// Check every record-level invariant and return the first violation.
    pub fn validate(&self) -> Result<()> {
        id::parse(&self.id)?;
        let title_len = self.title.chars().count();
        if title_len == 0 || title_len > MAX_TITLE_LEN {
            return Err(SpecLedgerError::InvalidTitle);
        }
        if !(0..=MAX_PRIORITY).contains(&self.priority) {
            return Err(SpecLedgerError::InvalidPriority(self.priority));
        }
        paths::validate_spec_context(&self.spec_context)?;
        if self.updated_at < self.created_at {
            return Err(SpecLedgerError::InvalidRecord(
                "updated_at must not precede created_at".into(),
            ));
        }
        match (self.status, self.closed_at) {
            (IssueStatus::Closed, None) => {
                return Err(SpecLedgerError::InvalidRecord(
                    "closed issues must have closed_at".into(),
                ))
            }
            (IssueStatus::Closed, Some(at)) if at < self.created_at => {
                return Err(SpecLedgerError::InvalidRecord(
                    "closed_at must not precede created_at".into(),
                ))
            }
            (IssueStatus::Open | IssueStatus::InProgress, Some(_)) => {
                return Err(SpecLedgerError::InvalidRecord(
                    "closed_at is only allowed on closed issues".into(),
                ))
            }
            _ => {}
        }
        if let Some(dod) = &self.definition_of_done {
            if dod.items.iter().any(|i| i.checked != i.verified_at.is_some()) {
                return Err(SpecLedgerError::InvalidRecord(
                    "definition of done items need verified_at exactly when checked".into(),
                ));
            }
        }
        if self.parent_id.as_deref() == Some(self.id.as_str()) {
            return Err(SpecLedgerError::InvalidRecord(
                "an issue cannot be its own parent".into(),
            ));
        }
        for dep in self.blocked_by.iter().chain(self.blocks.iter()) {
            if !id::is_valid(dep) {
                return Err(SpecLedgerError::InvalidIdFormat(dep.clone()));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn sample() -> Issue {
        Issue::new(
            "Add validation",
            "",
            "010-my-feature",
            IssueType::Task,
            2,
            at("2026-02-19T12:00:00Z"),
        )
    }

    #[test]
    fn new_issue_is_open_and_valid() {
        let issue = sample();
        assert_eq!(issue.status, IssueStatus::Open);
        assert!(issue.blocked_by.is_empty());
        assert_eq!(
            issue.id,
            id::derive("010-my-feature", "Add validation", issue.created_at)
        );
        issue.validate().unwrap();
    }

    #[test]
    fn title_length_boundaries() {
        let mut issue = sample();
        issue.title = "x".into();
        assert!(issue.validate().is_ok());
        issue.title = "x".repeat(200);
        assert!(issue.validate().is_ok());
        issue.title = String::new();
        assert!(matches!(issue.validate(), Err(SpecLedgerError::InvalidTitle)));
        issue.title = "x".repeat(201);
        assert!(matches!(issue.validate(), Err(SpecLedgerError::InvalidTitle)));
    }

    #[test]
    fn priority_boundaries() {
        let mut issue = sample();
        for p in 0..=5 {
            issue.priority = p;
            assert!(issue.validate().is_ok());
        }
        issue.priority = -1;
        assert!(matches!(
            issue.validate(),
            Err(SpecLedgerError::InvalidPriority(-1))
        ));
        issue.priority = 6;
        assert!(matches!(
            issue.validate(),
            Err(SpecLedgerError::InvalidPriority(6))
        ));
    }

    #[test]
    fn priority_message_is_stable() {
        assert_eq!(
            SpecLedgerError::InvalidPriority(7).to_string(),
            "priority must be 0..5"
        );
    }

    #[test]
    fn closed_requires_closed_at() {
        let mut issue = sample();
        issue.status = IssueStatus::Closed;
        assert!(issue.validate().is_err());
        issue.closed_at = Some(issue.created_at);
        assert!(issue.validate().is_ok());
        issue.status = IssueStatus::Open;
        assert!(issue.validate().is_err());
    }

    #[test]
    fn spec_context_accepts_migrated() {
        let mut issue = sample();
        issue.spec_context = "migrated".into();
        assert!(issue.validate().is_ok());
        issue.spec_context = "feature-x".into();
        assert!(matches!(
            issue.validate(),
            Err(SpecLedgerError::InvalidSpecContext(_))
        ));
    }

    #[test]
    fn status_and_type_parse() {
        assert_eq!("in_progress".parse::<IssueStatus>().unwrap(), IssueStatus::InProgress);
        assert!("done".parse::<IssueStatus>().is_err());
        assert_eq!("bug".parse::<IssueType>().unwrap(), IssueType::Bug);
        assert!("chore".parse::<IssueType>().is_err());
    }

    #[test]
    fn dod_check_uncheck_and_completeness() {
        let now = at("2026-02-19T12:00:00Z");
        let mut dod = DefinitionOfDone::from_items(["tests", "docs"]);
        assert!(!dod.is_complete());
        assert!(dod.check("tests", now));
        assert_eq!(dod.unchecked_items(), vec!["docs".to_string()]);
        assert!(!dod.check("missing", now));
        assert!(dod.check("docs", now));
        assert!(dod.is_complete());
        assert!(dod.uncheck("docs"));
        assert!(dod.items[1].verified_at.is_none());
        assert!(DefinitionOfDone::default().is_complete());
    }

    #[test]
    fn dod_check_is_idempotent() {
        let first = at("2026-02-19T12:00:00Z");
        let later = at("2026-02-20T12:00:00Z");
        let mut dod = DefinitionOfDone::from_items(["tests"]);
        dod.check("tests", first);
        let snapshot = dod.clone();
        dod.check("tests", later);
        assert_eq!(dod, snapshot);
    }

    #[test]
    fn dod_verified_at_must_track_checked() {
        let mut issue = sample();
        let mut dod = DefinitionOfDone::from_items(["tests"]);
        dod.items[0].checked = true;
        issue.definition_of_done = Some(dod);
        assert!(issue.validate().is_err());
    }

    #[test]
    fn labels_preserve_order_and_dedupe() {
        let mut issue = sample();
        issue.add_label("b");
        issue.add_label("a");
        issue.add_label("b");
        assert_eq!(issue.labels, vec!["b", "a"]);
        issue.remove_label("b");
        assert_eq!(issue.labels, vec!["a"]);
    }

    #[test]
    fn json_round_trip_omits_empty_optionals() {
        let issue = sample();
        let line = serde_json::to_string(&issue).unwrap();
        assert!(!line.contains("blocked_by"));
        assert!(!line.contains("closed_at"));
        assert!(line.contains("\"issue_type\":\"task\""));
        let back: Issue = serde_json::from_str(&line).unwrap();
        assert_eq!(back, issue);
        back.validate().unwrap();
    }
}
