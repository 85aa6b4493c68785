//! Agent settings file (`~/.claude/settings.json`) hook entries.
//!
//! Only the `hooks` table is modelled; every other key is carried through
//! load and save untouched.

use crate::error::Result;
use crate::io::atomic_write_mode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const SESSION_CAPTURE_EVENT: &str = "PostToolUse";
pub const SESSION_CAPTURE_MATCHER: &str = "Bash";
pub const SESSION_CAPTURE_COMMAND: &str = "sl session capture";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookMatcher {
    pub matcher: String,
    #[serde(default)]
    pub hooks: Vec<Hook>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookSettings {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hooks: BTreeMap<String, Vec<HookMatcher>>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl HookSettings {
    /// A missing file is an empty settings record.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) if text.trim().is_empty() => Ok(Self::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut data = serde_json::to_string_pretty(self)?;
        data.push('\n');
        atomic_write_mode(path, data.as_bytes(), 0o600)
    }

    pub fn has(&self, event: &str, matcher: &str, command: &str) -> bool {
        self.hooks.get(event).is_some_and(|ms| {
            ms.iter()
                .any(|m| m.matcher == matcher && m.hooks.iter().any(|h| h.command == command))
        })
    }

    /// Add a command hook unless present. Returns true when added.
    pub fn add_unique(&mut self, event: &str, matcher: &str, command: &str) -> bool {
        if self.has(event, matcher, command) {
            return false;
        }
        let hook = Hook {
            kind: "command".to_string(),
            command: command.to_string(),
        };
        let matchers = self.hooks.entry(event.to_string()).or_default();
        match matchers.iter_mut().find(|m| m.matcher == matcher) {
            Some(m) => m.hooks.push(hook),
            None => matchers.push(HookMatcher {
                matcher: matcher.to_string(),
                hooks: vec![hook],
            }),
        }
        true
    }

    /// Remove a command hook, dropping matchers and events left empty.
    /// Returns true when something was removed.
    pub fn remove(&mut self, event: &str, matcher: &str, command: &str) -> bool {
        let Some(matchers) = self.hooks.get_mut(event) else {
            return false;
        };
        let mut removed = false;
        for m in matchers.iter_mut().filter(|m| m.matcher == matcher) {
            let before = m.hooks.len();
            m.hooks.retain(|h| h.command != command);
            removed |= m.hooks.len() != before;
        }
        matchers.retain(|m| !m.hooks.is_empty());
        if matchers.is_empty() {
            self.hooks.remove(event);
        }
        removed
    }
}

/// Install the session-capture hook into the settings file at `path`.
/// Returns true when the file was changed.
pub fn install_session_capture_hook(path: &Path) -> Result<bool> {
    let mut settings = HookSettings::load(path)?;
    if !settings.add_unique(
        SESSION_CAPTURE_EVENT,
        SESSION_CAPTURE_MATCHER,
        SESSION_CAPTURE_COMMAND,
    ) {
        return Ok(false);
    }
    settings.save(path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn install_is_idempotent_and_keeps_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".claude/settings.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"model":"opus","permissions":{"allow":["Bash"]}}"#).unwrap();

        assert!(install_session_capture_hook(&path).unwrap());
        assert!(!install_session_capture_hook(&path).unwrap());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["model"], "opus");
        assert_eq!(raw["permissions"]["allow"][0], "Bash");
        assert_eq!(raw["hooks"]["PostToolUse"][0]["matcher"], "Bash");
        assert_eq!(
            raw["hooks"]["PostToolUse"][0]["hooks"][0]["command"],
            "sl session capture"
        );
        assert_eq!(raw["hooks"]["PostToolUse"][0]["hooks"][0]["type"], "command");
    }

    #[test]
    fn missing_file_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/settings.json");
        assert!(install_session_capture_hook(&path).unwrap());
        let s = HookSettings::load(&path).unwrap();
        assert!(s.has("PostToolUse", "Bash", "sl session capture"));
    }

    #[test]
    fn add_joins_existing_matcher_and_remove_prunes() {
        let mut s = HookSettings::default();
        assert!(s.add_unique("PostToolUse", "Bash", "a"));
        assert!(s.add_unique("PostToolUse", "Bash", "b"));
        assert!(!s.add_unique("PostToolUse", "Bash", "a"));
        assert_eq!(s.hooks["PostToolUse"].len(), 1);
        assert_eq!(s.hooks["PostToolUse"][0].hooks.len(), 2);

        assert!(s.remove("PostToolUse", "Bash", "a"));
        assert!(!s.remove("PostToolUse", "Bash", "a"));
        assert!(s.remove("PostToolUse", "Bash", "b"));
        assert!(s.hooks.is_empty());
        assert!(!s.remove("Stop", "Bash", "b"));
    }
}
