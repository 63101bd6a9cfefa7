use thiserror::Error;

use crate::pipewire::ObjectId;

use super::classify::Role;

/// Cycle-level failures. Per-mutation failures are [`MutationError`] and
/// live inside the apply report instead of aborting the cycle.
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    /// The audio graph could not be read (server not running, connection
    /// failed, or the registry view did not settle within the time budget).
    #[error("audio graph unavailable: {0}")]
    SnapshotUnavailable(String),

    /// The recording application has no capture stream right now.
    #[error("capture target not found: {0}")]
    CaptureTargetNotFound(String),

    /// The configured capture target resolved to a node that must never
    /// receive routed audio.
    #[error("capture target {id} is classified as {role} and cannot receive routed audio")]
    InvalidTarget { id: ObjectId, role: Role },

    /// No usable playback sink exists to restore default wiring to.
    #[error("no playback sink available")]
    NoPlaybackSink,
}

/// Failure of a single mutation. Reported per mutation; the applier keeps
/// going and aggregates these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("failed to link node {source_node} to node {target}: {reason}")]
    LinkCreateFailed {
        source_node: ObjectId,
        target: ObjectId,
        reason: String,
    },

    #[error("failed to destroy link {link_id} ({output} -> {input}): {reason}")]
    LinkDestroyFailed {
        link_id: ObjectId,
        output: ObjectId,
        input: ObjectId,
        reason: String,
    },
}
