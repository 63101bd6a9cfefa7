//! Routing engine
//!
//! Queries the live audio graph, classifies producer nodes, locates the
//! recorder's capture input, and computes/applies the minimal link
//! mutations so that only the chosen sources reach the recorder while
//! everything keeps playing through the speakers. Independent of any UI —
//! works purely with PipeWire types.

pub mod applier;
pub mod classify;
pub mod error;
pub mod inspector;
pub mod locator;
pub mod planner;
pub mod session;
pub mod snapshot;

pub use applier::{ApplyReport, RouteApplier};
pub use classify::{ClassifiedNode, Role, classify, classify_sources};
pub use error::{MutationError, RouteError};
pub use inspector::{ActiveRoute, active_routes};
pub use locator::CaptureTargetLocator;
pub use planner::{Mutation, RoutePlan, plan_routes};
pub use session::{Router, select_playback_sink};
pub use snapshot::SnapshotReader;
