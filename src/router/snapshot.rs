//! Graph snapshot reader
//!
//! Hands out point-in-time views of the audio graph. The PipeWire thread
//! keeps the live mirror; this reader only waits for it to be usable and
//! copies it. No side effects.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::pipewire::{GraphSnapshot, GraphState, PwStatus};

use super::error::RouteError;

const SYNC_POLL: Duration = Duration::from_millis(25);

pub struct SnapshotReader {
    graph: Arc<GraphState>,
    status: Arc<PwStatus>,
    timeout: Duration,
}

impl SnapshotReader {
    pub fn new(graph: Arc<GraphState>, status: Arc<PwStatus>) -> Self {
        Self {
            graph,
            status,
            timeout: Duration::from_secs(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Complete current set of nodes, ports and links, or
    /// `SnapshotUnavailable` when the server cannot be queried or the
    /// registry view does not settle within the time budget.
    pub fn snapshot(&self) -> Result<GraphSnapshot, RouteError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(reason) = self.status.failure() {
                return Err(RouteError::SnapshotUnavailable(reason));
            }
            if self.status.is_synced() {
                return Ok(self.graph.snapshot());
            }
            if Instant::now() >= deadline {
                let reason = if self.status.is_connected() {
                    format!("audio graph did not settle within {:?}", self.timeout)
                } else {
                    format!("no PipeWire connection after {:?}", self.timeout)
                };
                return Err(RouteError::SnapshotUnavailable(reason));
            }
            std::thread::sleep(SYNC_POLL);
        }
    }
}
