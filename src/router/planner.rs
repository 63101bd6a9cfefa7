//! Route planner
//!
//! Computes the minimal set of link mutations that makes "only the
//! selected sources reach the recorder, every source still reaches the
//! speakers" true. Pure: reads a snapshot, returns a plan, touches
//! nothing.
//!
//! Only links INTO the capture target are ever considered for removal.
//! Producer→sink links are structurally out of reach, so playback is
//! never severed by a plan.

use std::fmt;

use crate::pipewire::{GraphSnapshot, ObjectId};

use super::classify::{Role, classify};
use super::error::RouteError;

/// A single planned link mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Destroy an existing link into the capture target.
    Remove {
        link_id: ObjectId,
        output: ObjectId,
        input: ObjectId,
    },
    /// Link a producer to the capture target.
    Add {
        source: ObjectId,
        target: ObjectId,
    },
}

impl Mutation {
    /// True when the mutation references the given node on either side.
    pub fn involves(&self, node: ObjectId) -> bool {
        match *self {
            Mutation::Remove { output, input, .. } => output == node || input == node,
            Mutation::Add { source, target } => source == node || target == node,
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Remove {
                link_id,
                output,
                input,
            } => write!(f, "remove link {link_id} ({output} -> {input})"),
            Mutation::Add { source, target } => write!(f, "add {source} -> {target}"),
        }
    }
}

/// Why a requested source was dropped at validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not present in the snapshot.
    Missing,
    /// Present, but its role must never feed the capture target.
    Unroutable(Role),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Missing => f.write_str("not present in the audio graph"),
            DropReason::Unroutable(role) => write!(f, "classified as {role}"),
        }
    }
}

/// A source dropped from the selection, with its diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedSource {
    pub id: ObjectId,
    pub reason: DropReason,
}

/// Ordered mutations plus the per-entry validation drops.
///
/// Removals always precede additions: a stale sink→target link must not
/// coexist with a fresh producer→target link even for the transition
/// window.
#[derive(Debug, Clone, Default)]
pub struct RoutePlan {
    pub mutations: Vec<Mutation>,
    pub dropped: Vec<DroppedSource>,
}

impl RoutePlan {
    /// An empty plan is a success: there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Compute the plan for `selection` against `snap`.
///
/// Invalid selection entries are dropped with a diagnostic, never a total
/// failure. An empty selection removes every link into the target and
/// adds nothing ("clear"). Re-planning a satisfied selection yields an
/// empty plan.
pub fn plan_routes(
    snap: &GraphSnapshot,
    selection: &[ObjectId],
    target: ObjectId,
) -> Result<RoutePlan, RouteError> {
    let target_node = snap
        .node(target)
        .ok_or_else(|| RouteError::CaptureTargetNotFound(format!("node {target}")))?;
    let target_role = classify(target_node);
    if matches!(
        target_role,
        Role::Sink | Role::Bluetooth | Role::Internal
    ) {
        return Err(RouteError::InvalidTarget {
            id: target,
            role: target_role,
        });
    }

    // Validate the requested producers.
    let mut valid: Vec<ObjectId> = Vec::new();
    let mut dropped: Vec<DroppedSource> = Vec::new();
    for &id in selection {
        match snap.node(id) {
            None => {
                log::warn!("Dropping source {}: not present in the audio graph", id);
                dropped.push(DroppedSource {
                    id,
                    reason: DropReason::Missing,
                });
            }
            Some(node) => {
                let role = classify(node);
                if role.is_routable() {
                    if !valid.contains(&id) {
                        valid.push(id);
                    }
                } else {
                    log::warn!(
                        "Dropping source {} ({}): classified as {}",
                        id,
                        node.display_name(),
                        role
                    );
                    dropped.push(DroppedSource {
                        id,
                        reason: DropReason::Unroutable(role),
                    });
                }
            }
        }
    }

    // Compare desired against actual. Every link into the target whose
    // output is not a validated selected producer goes; whatever is
    // already correct stays (idempotence).
    let mut removals: Vec<Mutation> = Vec::new();
    let mut satisfied: Vec<ObjectId> = Vec::new();
    for link in snap.links_into(target) {
        if valid.contains(&link.output_node_id) {
            if !satisfied.contains(&link.output_node_id) {
                satisfied.push(link.output_node_id);
            }
        } else {
            removals.push(Mutation::Remove {
                link_id: link.id,
                output: link.output_node_id,
                input: link.input_node_id,
            });
        }
    }

    let additions = valid
        .iter()
        .filter(|id| !satisfied.contains(id))
        .map(|&source| Mutation::Add { source, target });

    let mut mutations = removals;
    mutations.extend(additions);

    Ok(RoutePlan { mutations, dropped })
}
