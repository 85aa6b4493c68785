use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecLedgerError {
    #[error("not initialized: run 'sl init'")]
    NotInitialized,

    // -- record validation --------------------------------------------------
    #[error("issue ID must match format SL-xxxxxx: {0}")]
    InvalidIdFormat(String),

    #[error("title is required and must be 1-200 characters")]
    InvalidTitle,

    #[error("status must be one of: open, in_progress, closed")]
    InvalidStatus(String),

    #[error("priority must be 0..5")]
    InvalidPriority(i32),

    #[error("issue type must be one of: epic, feature, task, bug")]
    InvalidIssueType(String),

    #[error("spec context must match pattern ###-name")]
    InvalidSpecContext(String),

    #[error("{0}")]
    InvalidRecord(String),

    // -- store --------------------------------------------------------------
    #[error("issue not found: {0}")]
    NotFound(String),

    #[error("issue already exists: {0}")]
    AlreadyExists(String),

    #[error("issue store is locked by another process: {0}")]
    StoreLocked(String),

    #[error("definition of done incomplete for {id}: {unchecked:?}")]
    DoDIncomplete { id: String, unchecked: Vec<String> },

    // -- graph --------------------------------------------------------------
    #[error("cannot create dependency on self: {0}")]
    SelfDependency(String),

    #[error("would create a circular dependency: {0}")]
    CyclicDependency(String),

    #[error("dependency target issue not found: {0}")]
    DependencyNotFound(String),

    #[error("invalid link type '{0}': must be 'blocks' or 'related'")]
    InvalidLinkType(String),

    // -- context ------------------------------------------------------------
    #[error("not on a feature branch ({0}). Use --spec flag or checkout a ###-branch")]
    NotFeatureBranch(String),

    #[error("not in a git repository: {0}")]
    NoRepo(String),

    // -- manifest / resolver / lockfile ---------------------------------------
    #[error("line {line}: {reason}")]
    InvalidManifestLine { line: usize, reason: String },

    #[error("failed to resolve revision '{revision}' in {url}: {reason}")]
    ResolveRevision {
        url: String,
        revision: String,
        reason: String,
    },

    #[error("failed to clone {url}: {reason}")]
    CloneFailed { url: String, reason: String },

    #[error("spec file '{path}' not found in {url}")]
    SpecFileNotFound { url: String, path: String },

    #[error("invalid repository url: {0}")]
    InvalidUrl(String),

    #[error("duplicate dependency: {0}")]
    DuplicateDependency(String),

    #[error("content hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("lockfile verification failed: {}", .0.join("; "))]
    VerificationFailed(Vec<String>),

    #[error("operation cancelled")]
    Cancelled,

    // -- metadata / playbooks / migration -------------------------------------
    #[error("invalid project metadata: {0}")]
    InvalidMetadata(String),

    #[error("project metadata already exists: {0}")]
    MetadataExists(String),

    #[error("legacy metadata is missing '{0}'")]
    LegacyMissingField(&'static str),

    #[error("playbook not found: {0}")]
    PlaybookNotFound(String),

    #[error("no Beads issues found at {0}")]
    BeadsNotFound(String),

    #[error("home directory not found: set HOME environment variable")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SpecLedgerError>;

/// Coarse classification used by frontends to choose how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    User,
    Environment,
    Internal,
}

impl SpecLedgerError {
    pub fn class(&self) -> ErrorClass {
        use SpecLedgerError::*;
        match self {
            InvalidIdFormat(_)
            | InvalidTitle
            | InvalidStatus(_)
            | InvalidPriority(_)
            | InvalidIssueType(_)
            | InvalidSpecContext(_)
            | InvalidRecord(_)
            | NotFound(_)
            | AlreadyExists(_)
            | DoDIncomplete { .. }
            | SelfDependency(_)
            | CyclicDependency(_)
            | DependencyNotFound(_)
            | InvalidLinkType(_)
            | NotFeatureBranch(_)
            | InvalidManifestLine { .. }
            | InvalidUrl(_)
            | DuplicateDependency(_)
            | InvalidMetadata(_)
            | MetadataExists(_)
            | LegacyMissingField(_)
            | PlaybookNotFound(_)
            | NotInitialized
            | Cancelled => ErrorClass::User,
            StoreLocked(_)
            | NoRepo(_)
            | ResolveRevision { .. }
            | CloneFailed { .. }
            | SpecFileNotFound { .. }
            | HashMismatch { .. }
            | VerificationFailed(_)
            | BeadsNotFound(_)
            | HomeNotFound
            | Io(_) => ErrorClass::Environment,
            Yaml(_) | Json(_) => ErrorClass::Internal,
        }
    }
}
