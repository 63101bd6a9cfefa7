//! Capture target locator
//!
//! Finds the node representing the recording application's capture input:
//! the node whose application name matches the configured recorder and
//! whose media class is an audio input stream. The id is only stable
//! within a session, so it is cached per locator and re-resolved whenever
//! the snapshot no longer contains it (or a mutation referencing it
//! failed).

use crate::pipewire::{GraphSnapshot, Node, NodeType, ObjectId};

use super::error::RouteError;

#[derive(Debug)]
pub struct CaptureTargetLocator {
    app_name: String,
    cached: Option<ObjectId>,
}

impl CaptureTargetLocator {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            cached: None,
        }
    }

    /// Name of the recording application this locator looks for.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Resolve the capture target against a fresh snapshot.
    ///
    /// A cached id is reused only while the snapshot still contains it and
    /// it still looks like the recorder's capture stream.
    pub fn resolve(&mut self, snap: &GraphSnapshot) -> Result<ObjectId, RouteError> {
        if let Some(id) = self.cached
            && let Some(node) = snap.node(id)
            && self.matches(node)
        {
            return Ok(id);
        }
        self.cached = None;

        match snap.nodes.iter().find(|n| self.matches(n)) {
            Some(node) => {
                log::debug!(
                    "Capture target for {:?}: node {} ({})",
                    self.app_name,
                    node.id,
                    node.display_name()
                );
                self.cached = Some(node.id);
                Ok(node.id)
            }
            None => Err(RouteError::CaptureTargetNotFound(self.app_name.clone())),
        }
    }

    /// Drop the cached id; the next resolve searches from scratch.
    /// Called after a mutation referencing the target failed.
    pub fn invalidate(&mut self) {
        if let Some(id) = self.cached.take() {
            log::debug!("Invalidated cached capture target {}", id);
        }
    }

    fn matches(&self, node: &Node) -> bool {
        node.ready
            && node.app_name == self.app_name
            && node.node_type == Some(NodeType::StreamInput)
    }
}
