//! Error types for the topology engine

/// Errors surfaced by the topology engine
///
/// Only `Unreachable` ever reaches a caller of `connect`; the other variants
/// are recovered locally (logged, then the kind or message is skipped).
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// Connectivity probe failed before any collection was fetched
    #[error("failed to connect: {0}")]
    Unreachable(String),

    /// Listing a single collection failed
    #[error("failed to fetch {kind}: {message}")]
    Fetch { kind: String, message: String },

    /// A change notification or payload could not be decoded
    #[error("malformed notification: {0}")]
    Decode(String),

    /// No resource with this id in the current graph
    #[error("resource not found: {0}")]
    NotFound(String),

    /// A kind name outside the tracked set was requested
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    /// The update channel has been closed
    #[error("update channel closed")]
    ChannelClosed,
}

/// Result type for topology operations
pub type TopologyResult<T> = Result<T, TopologyError>;
