//! The error type shared by every driftsync component.
//!
//! Mirrors the error kinds of the external RPC contract (block store, metadata
//! store, replicated log, sync engine) in a single hand-rolled enum rather than
//! one type per crate, so cluster-client failover and sync-engine branching can
//! match on a kind without caring which component raised it.

use std::fmt;

/// Error kinds that can cross a component boundary.
///
/// `VersionMismatch` is deliberately absent: a version conflict on `UpdateFile`
/// is surfaced as `{version: -1}` in a successful reply, never as this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Replica is in simulated-down state; transient.
    ServerCrashed,
    /// Addressed replica is a follower; caller must try another.
    NotLeader,
    /// Leader could not confirm a quorum of peers; transient.
    ServersUnreachable,
    /// A pending commit was aborted because this replica lost leadership.
    LeadershipLost,
    /// Requested block or file is unknown.
    NotFound { what: String },
    /// Cluster client exhausted every configured replica.
    ClusterUnavailable,
    /// Local filesystem failure.
    Io { message: String, context: String },
    /// Malformed on-disk or wire data.
    Parse { message: String, context: String },
    /// Transport-level RPC failure (connect, deadline, decode).
    Transport { message: String, context: String },
}

impl SyncError {
    pub fn not_found(what: impl Into<String>) -> Self {
        SyncError::NotFound { what: what.into() }
    }

    pub fn from_io_error(err: std::io::Error, context: impl Into<String>) -> Self {
        SyncError::Io {
            message: err.to_string(),
            context: context.into(),
        }
    }

    pub fn from_parse_error(err: impl std::error::Error, context: impl Into<String>) -> Self {
        SyncError::Parse {
            message: err.to_string(),
            context: context.into(),
        }
    }

    pub fn from_transport_error(err: impl fmt::Display, context: impl Into<String>) -> Self {
        SyncError::Transport {
            message: err.to_string(),
            context: context.into(),
        }
    }

    /// Whether a cluster client should fail over to the next replica on this error.
    pub fn is_client_failover(&self) -> bool {
        matches!(
            self,
            SyncError::NotLeader | SyncError::ServerCrashed | SyncError::Transport { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }

    /// Short, stable identifier matching the RPC contract's error-kind names.
    /// Embedded in transport error messages so the receiving side can recover
    /// the exact kind instead of falling back to a generic transport error.
    pub fn kind_tag(&self) -> &'static str {
        match self {
            SyncError::ServerCrashed => "ERR_SERVER_CRASHED",
            SyncError::NotLeader => "ERR_NOT_LEADER",
            SyncError::ServersUnreachable => "ERR_SERVERS_UNREACHABLE",
            SyncError::LeadershipLost => "ERR_LEADERSHIP_LOST",
            SyncError::NotFound { .. } => "ERR_NOT_FOUND",
            SyncError::ClusterUnavailable => "ERR_CLUSTER_UNAVAILABLE",
            SyncError::Io { .. } => "ERR_IO",
            SyncError::Parse { .. } => "ERR_PARSE",
            SyncError::Transport { .. } => "ERR_TRANSPORT",
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::ServerCrashed => write!(f, "{}: replica is crashed", self.kind_tag()),
            SyncError::NotLeader => write!(f, "{}: replica is not the leader", self.kind_tag()),
            SyncError::ServersUnreachable => {
                write!(f, "{}: could not confirm a quorum of peers", self.kind_tag())
            }
            SyncError::LeadershipLost => {
                write!(f, "{}: leadership lost before commit", self.kind_tag())
            }
            SyncError::NotFound { what } => write!(f, "{}: {what} not found", self.kind_tag()),
            SyncError::ClusterUnavailable => {
                write!(f, "{}: all replicas exhausted", self.kind_tag())
            }
            SyncError::Io { message, context } => {
                write!(f, "{}: {context}: {message}", self.kind_tag())
            }
            SyncError::Parse { message, context } => {
                write!(f, "{}: {context}: {message}", self.kind_tag())
            }
            SyncError::Transport { message, context } => {
                write!(f, "{}: {context}: {message}", self.kind_tag())
            }
        }
    }
}

impl std::error::Error for SyncError {}
