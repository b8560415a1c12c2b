//! Error taxonomy shared across the cache, resolver, and planner layers.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::key::{NodeKey, SourceId};
use crate::path::{Path, Segment};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RepoError>;

/// Errors produced by the repository core.
///
/// The enum is `Clone` so that a single read-through failure can be fanned
/// out to every caller that attached to the same in-flight load.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RepoError {
    /// A path string failed to lex into segments.
    #[error("path parse error at offset {offset}: {reason}")]
    PathParse {
        /// Byte offset of the first unparseable character.
        offset: usize,
        /// Human-readable description of the failure.
        reason: String,
    },
    /// Normalization needed ancestry the path does not carry.
    #[error("path '{0}' is not normalizable: a parent segment ascends above its root")]
    NotNormalizable(String),
    /// A resolution walk was asked to step above the walk root.
    #[error("path walks above the resolution root at '{0}'")]
    PathNotNormalizable(Path),
    /// Resolution failed partway down the tree.
    #[error("path not found: resolved '{resolved}', no child matching '{remaining}'")]
    PathNotFound {
        /// Longest prefix that did resolve.
        resolved: Path,
        /// First segment that failed to match.
        remaining: Segment,
    },
    /// A key was asked for that no connector knows about.
    #[error("node {0} not found")]
    NodeNotFound(NodeKey),
    /// The key names a source with no registered connector.
    #[error("no connector registered for source '{0}'")]
    UnknownSource(SourceId),
    /// A connector read exceeded the caller's deadline.
    #[error("read of {key} timed out after {waited:?}")]
    Timeout {
        /// Key whose load exceeded the deadline.
        key: NodeKey,
        /// How long the caller waited.
        waited: Duration,
    },
    /// The connector reported a failure it could not classify further.
    #[error("connector error: {0}")]
    Connector(String),
    /// A commit applied some sub-operations but not all of them.
    #[error("{0}")]
    PartialCommit(PartialCommitError),
    /// The argument violates a documented precondition.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

/// Outcome of one per-node sub-operation inside a commit.
#[derive(Debug, Clone, PartialEq)]
pub struct OpOutcome {
    /// Node the sub-operation targeted.
    pub key: NodeKey,
    /// Whether the owning connector accepted the mutation.
    pub succeeded: bool,
    /// Connector-supplied detail for failures, empty on success.
    pub detail: String,
}

/// Enumerates which sub-operations of a commit succeeded and which failed.
///
/// Connectors are not assumed transactional, so the applied portion is not
/// rolled back; callers inspect the outcomes and compensate.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialCommitError {
    /// Per-node outcomes in application order.
    pub outcomes: Vec<OpOutcome>,
}

impl PartialCommitError {
    /// Outcomes for sub-operations the connectors rejected.
    pub fn failed(&self) -> impl Iterator<Item = &OpOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    /// Outcomes for sub-operations the connectors accepted.
    pub fn succeeded(&self) -> impl Iterator<Item = &OpOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded)
    }
}

impl fmt::Display for PartialCommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failed().count();
        write!(
            f,
            "commit partially applied: {} of {} sub-operations failed",
            failed,
            self.outcomes.len()
        )
    }
}

impl RepoError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            RepoError::PathParse { .. } => "PathParse",
            RepoError::NotNormalizable(_) => "NotNormalizable",
            RepoError::PathNotNormalizable(_) => "PathNotNormalizable",
            RepoError::PathNotFound { .. } => "PathNotFound",
            RepoError::NodeNotFound(_) => "NodeNotFound",
            RepoError::UnknownSource(_) => "UnknownSource",
            RepoError::Timeout { .. } => "Timeout",
            RepoError::Connector(_) => "Connector",
            RepoError::PartialCommit(_) => "PartialCommit",
            RepoError::Invalid(_) => "Invalid",
        }
    }
}
