//! Classification of surfaced failures into exit codes and hints.

use specledger_core::error::ErrorClass;
use specledger_core::SpecLedgerError;

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERNAL: i32 = 2;

/// First `SpecLedgerError` in the chain decides. A bare I/O failure is an
/// environment problem; anything else raised by the CLI itself is treated
/// as bad input.
pub fn classify(err: &anyhow::Error) -> ErrorClass {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<SpecLedgerError>() {
            return e.class();
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ErrorClass::Environment;
        }
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return ErrorClass::Internal;
        }
    }
    ErrorClass::User
}

pub fn exit_code(class: ErrorClass) -> i32 {
    match class {
        ErrorClass::User | ErrorClass::Environment => EXIT_FAILURE,
        ErrorClass::Internal => EXIT_INTERNAL,
    }
}

fn core_error(err: &anyhow::Error) -> Option<&SpecLedgerError> {
    err.chain().find_map(|c| c.downcast_ref::<SpecLedgerError>())
}

pub fn hint(err: &SpecLedgerError) -> Option<&'static str> {
    use SpecLedgerError::*;
    Some(match err {
        NotInitialized => "run 'sl init' in the project root",
        NotFeatureBranch(_) | NoRepo(_) => "pass --spec <###-name> to choose a spec explicitly",
        InvalidSpecContext(_) => "spec contexts look like 010-my-feature",
        StoreLocked(_) => "another sl process holds the lock; retry when it finishes",
        DoDIncomplete { .. } => "check remaining items with 'sl issue update <id> --check <item>'",
        CyclicDependency(_) => "run 'sl issue show <id> --tree' to inspect the existing chain",
        ResolveRevision { .. } => "check that the branch, tag or commit exists upstream",
        CloneFailed { .. } => "check the repository URL and your git credentials",
        VerificationFailed(_) | HashMismatch { .. } => "run 'sl deps resolve --no-cache' to refetch",
        MetadataExists(_) => "pass --force to overwrite",
        PlaybookNotFound(_) => "the bundled playbook is 'specledger'",
        BeadsNotFound(_) => "run from the project root that contains .beads/",
        HomeNotFound => "set HOME to your home directory",
        _ => return None,
    })
}

/// Print the failure to stderr and return the process exit code.
pub fn report(err: &anyhow::Error) -> i32 {
    let class = classify(err);
    eprintln!("error: {err:#}");
    match class {
        ErrorClass::Internal => {
            eprintln!("internal error: {err:?}");
        }
        _ => {
            if let Some(h) = core_error(err).and_then(hint) {
                eprintln!("hint: {h}");
            }
        }
    }
    exit_code(class)
}
