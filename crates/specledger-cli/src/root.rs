use specledger_core::paths;
use std::path::{Path, PathBuf};

fn walk_up(start: &Path, found: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    start.ancestors().find(|d| found(d)).map(Path::to_path_buf)
}

/// Resolve the project root.
///
/// Priority:
/// 1. `--root` flag / `SPECLEDGER_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `specledger/specledger.yaml`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_from(&cwd)
}

pub fn resolve_from(start: &Path) -> PathBuf {
    walk_up(start, |d| paths::metadata_path(d).is_file())
        .or_else(|| walk_up(start, |d| d.join(".git").is_dir()))
        .unwrap_or_else(|| start.to_path_buf())
}
