//! Route applier
//!
//! Executes a plan mutation by mutation in planner order (removals before
//! additions), best effort: one failure is recorded and the rest of the
//! plan still runs. There is no rollback; partial application is a
//! reported outcome.
//!
//! PipeWire object creation and destruction are asynchronous, so each
//! mutation is confirmed by watching the registry mirror for the link to
//! appear or disappear within a bounded wait.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use crate::pipewire::{GraphState, ObjectId, PwCommand};

use super::error::MutationError;
use super::planner::{DroppedSource, Mutation, RoutePlan};

const CONFIRM_POLL: Duration = Duration::from_millis(20);

/// One executed mutation and how it went.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub mutation: Mutation,
    pub result: Result<(), MutationError>,
}

/// Aggregate result of applying a plan.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub outcomes: Vec<MutationOutcome>,
    /// Validation drops carried over from the plan, for surfacing.
    pub dropped: Vec<DroppedSource>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn created(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.mutation, Mutation::Add { .. }) && o.result.is_ok())
            .count()
    }

    pub fn removed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.mutation, Mutation::Remove { .. }) && o.result.is_ok())
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Mutation, &MutationError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.mutation, e)))
    }

    /// True when any failed mutation referenced the given node. Used to
    /// invalidate the cached capture target id.
    pub fn failed_involving(&self, node: ObjectId) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.result.is_err() && o.mutation.involves(node))
    }

    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> String {
        let failed = self.outcomes.iter().filter(|o| o.result.is_err()).count();
        let mut msg = format!(
            "removed {} route(s), connected {} source(s)",
            self.removed(),
            self.created()
        );
        if failed > 0 {
            msg.push_str(&format!(" ({failed} failed)"));
        }
        if !self.dropped.is_empty() {
            msg.push_str(&format!(", {} dropped at validation", self.dropped.len()));
        }
        msg
    }
}

/// Executes plans against the live graph through the PipeWire thread's
/// command channel.
pub struct RouteApplier {
    graph: Arc<GraphState>,
    commands: Sender<PwCommand>,
    confirm_timeout: Duration,
}

impl RouteApplier {
    pub fn new(graph: Arc<GraphState>, commands: Sender<PwCommand>) -> Self {
        Self {
            graph,
            commands,
            confirm_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// Run every mutation in plan order and report every outcome.
    pub fn apply(&self, plan: &RoutePlan) -> ApplyReport {
        let mut outcomes = Vec::with_capacity(plan.mutations.len());
        for mutation in &plan.mutations {
            let result = match *mutation {
                Mutation::Remove {
                    link_id,
                    output,
                    input,
                } => self.destroy_link(link_id, output, input),
                Mutation::Add { source, target } => self.connect_nodes(source, target, true),
            };
            if let Err(ref e) = result {
                log::error!("{}", e);
            }
            outcomes.push(MutationOutcome {
                mutation: mutation.clone(),
                result,
            });
        }
        ApplyReport {
            outcomes,
            dropped: plan.dropped.clone(),
        }
    }

    /// Link two nodes outside of a plan (used to restore default sink
    /// wiring). Active, not passive: restored wiring must keep the graph
    /// running like the default setup did.
    pub fn connect_direct(&self, source: ObjectId, target: ObjectId) -> ApplyReport {
        let result = self.connect_nodes(source, target, false);
        if let Err(ref e) = result {
            log::error!("{}", e);
        }
        ApplyReport {
            outcomes: vec![MutationOutcome {
                mutation: Mutation::Add { source, target },
                result,
            }],
            dropped: Vec::new(),
        }
    }

    fn destroy_link(
        &self,
        link_id: ObjectId,
        output: ObjectId,
        input: ObjectId,
    ) -> Result<(), MutationError> {
        if self
            .commands
            .send(PwCommand::Disconnect { link_id })
            .is_err()
        {
            return Err(MutationError::LinkDestroyFailed {
                link_id,
                output,
                input,
                reason: "PipeWire thread is gone".into(),
            });
        }

        if self.wait_until(|| self.graph.get_link(link_id).is_none()) {
            log::debug!("Destroyed link {} ({} -> {})", link_id, output, input);
            Ok(())
        } else {
            Err(MutationError::LinkDestroyFailed {
                link_id,
                output,
                input,
                reason: format!("not confirmed within {:?}", self.confirm_timeout),
            })
        }
    }

    /// Link a source node to a target node channel by channel: output
    /// ports are paired with input ports in natural order, stereo to
    /// stereo, extra channels on either side left unconnected.
    fn connect_nodes(
        &self,
        source: ObjectId,
        target: ObjectId,
        passive: bool,
    ) -> Result<(), MutationError> {
        let out_ports = self.graph.get_output_ports(source);
        let in_ports = self.graph.get_input_ports(target);

        if out_ports.is_empty() {
            return Err(MutationError::LinkCreateFailed {
                source_node: source,
                target,
                reason: "source has no output ports".into(),
            });
        }
        if in_ports.is_empty() {
            return Err(MutationError::LinkCreateFailed {
                source_node: source,
                target,
                reason: "target has no input ports".into(),
            });
        }

        let channels = out_ports.len().min(in_ports.len());
        let source_name = self
            .graph
            .get_node(source)
            .map(|n| n.display_name().to_string())
            .unwrap_or_else(|| format!("node {source}"));
        log::debug!(
            "Connecting {} to node {} over {} channel(s)",
            source_name,
            target,
            channels
        );

        let mut linked = 0usize;
        for (out_port, in_port) in out_ports.iter().zip(in_ports.iter()).take(channels) {
            if self
                .commands
                .send(PwCommand::Connect {
                    output_port_id: out_port.id,
                    input_port_id: in_port.id,
                    passive,
                })
                .is_err()
            {
                return Err(MutationError::LinkCreateFailed {
                    source_node: source,
                    target,
                    reason: "PipeWire thread is gone".into(),
                });
            }

            if self.wait_until(|| self.graph.find_link(out_port.id, in_port.id).is_some()) {
                linked += 1;
            } else {
                log::warn!(
                    "Channel {} -> {} on {} not confirmed",
                    out_port.name,
                    in_port.name,
                    source_name
                );
            }
        }

        // Partial channel coverage still carries audio; total failure
        // does not.
        if linked > 0 {
            Ok(())
        } else {
            Err(MutationError::LinkCreateFailed {
                source_node: source,
                target,
                reason: "no channel could be linked".into(),
            })
        }
    }

    fn wait_until(&self, mut confirmed: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            if confirmed() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(CONFIRM_POLL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipewire::{Link, PortDirection};
    use crate::testutil::*;

    /// Applier over a hand-built graph, with a zero confirmation timeout:
    /// whatever is already in the graph counts as confirmed, everything
    /// else fails immediately.
    fn applier(graph: &Arc<GraphState>) -> (RouteApplier, std::sync::mpsc::Receiver<PwCommand>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (
            RouteApplier::new(graph.clone(), tx).with_confirm_timeout(Duration::ZERO),
            rx,
        )
    }

    #[test]
    fn add_pairs_ports_in_natural_order() {
        let graph = GraphState::new();
        graph.insert_node(stream_out(137, "game.exe", "wine"));
        graph.insert_node(capture_stream(154, "Steam"));
        for (id, name, dir) in [
            (1370, "output_FL", PortDirection::Output),
            (1371, "output_FR", PortDirection::Output),
        ] {
            graph.insert_port(port(id, 137, name, dir, None));
        }
        for (id, name, dir) in [
            (1540, "input_FL", PortDirection::Input),
            (1541, "input_FR", PortDirection::Input),
        ] {
            graph.insert_port(port(id, 154, name, dir, None));
        }
        // Pre-seed the links the server would create, so confirmation
        // succeeds with the zero timeout.
        graph.insert_link(Link {
            id: 1,
            output_node_id: 137,
            output_port_id: 1370,
            input_node_id: 154,
            input_port_id: 1540,
        });
        graph.insert_link(Link {
            id: 2,
            output_node_id: 137,
            output_port_id: 1371,
            input_node_id: 154,
            input_port_id: 1541,
        });

        let (applier, rx) = applier(&graph);
        let plan = RoutePlan {
            mutations: vec![Mutation::Add {
                source: 137,
                target: 154,
            }],
            dropped: vec![],
        };
        let report = applier.apply(&plan);
        assert!(report.is_success());
        assert_eq!(report.created(), 1);

        // FL pairs with FL, FR with FR.
        let sent: Vec<PwCommand> = rx.try_iter().collect();
        assert_eq!(sent.len(), 2);
        assert!(matches!(
            sent[0],
            PwCommand::Connect {
                output_port_id: 1370,
                input_port_id: 1540,
                passive: true
            }
        ));
        assert!(matches!(
            sent[1],
            PwCommand::Connect {
                output_port_id: 1371,
                input_port_id: 1541,
                passive: true
            }
        ));
    }

    #[test]
    fn remove_confirms_against_graph() {
        let graph = GraphState::new();
        // Link 901 is absent from the graph, so its destruction is
        // already confirmed.
        let (applier, _rx) = applier(&graph);
        let plan = RoutePlan {
            mutations: vec![Mutation::Remove {
                link_id: 901,
                output: 66,
                input: 154,
            }],
            dropped: vec![],
        };
        let report = applier.apply(&plan);
        assert!(report.is_success());
        assert_eq!(report.removed(), 1);
    }

    #[test]
    fn failure_does_not_abort_remaining_mutations() {
        let graph = GraphState::new();
        graph.insert_node(stream_out(137, "game.exe", "wine"));
        graph.insert_node(capture_stream(154, "Steam"));
        // 137 has no ports: the add fails. The remove afterwards still
        // runs and succeeds.
        let (applier, _rx) = applier(&graph);
        let plan = RoutePlan {
            mutations: vec![
                Mutation::Add {
                    source: 137,
                    target: 154,
                },
                Mutation::Remove {
                    link_id: 901,
                    output: 66,
                    input: 154,
                },
            ],
            dropped: vec![],
        };
        let report = applier.apply(&plan);
        assert!(!report.is_success());
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes[0].result.is_err());
        assert!(report.outcomes[1].result.is_ok());
        assert!(report.failed_involving(154));
        assert!(!report.failed_involving(66));
    }

    #[test]
    fn summary_counts_outcomes() {
        let report = ApplyReport {
            outcomes: vec![
                MutationOutcome {
                    mutation: Mutation::Remove {
                        link_id: 901,
                        output: 66,
                        input: 154,
                    },
                    result: Ok(()),
                },
                MutationOutcome {
                    mutation: Mutation::Add {
                        source: 137,
                        target: 154,
                    },
                    result: Err(MutationError::LinkCreateFailed {
                        source_node: 137,
                        target: 154,
                        reason: "no channel could be linked".into(),
                    }),
                },
            ],
            dropped: vec![],
        };
        assert_eq!(report.summary(), "removed 1 route(s), connected 0 source(s) (1 failed)");
    }
}
