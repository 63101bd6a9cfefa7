//! Route inspector
//!
//! Lists the links currently feeding the capture target, annotated with
//! the source node's classification. This is the ground truth the display
//! layer shows and the planner's idempotence rests on.

use crate::pipewire::{GraphSnapshot, ObjectId};

use super::classify::{Role, classify};

/// One live link into the capture target.
#[derive(Debug, Clone)]
pub struct ActiveRoute {
    pub link_id: ObjectId,
    pub source: ObjectId,
    pub source_name: String,
    pub role: Role,
    /// Channel carried by this link's output port ("FL", "FR", ...)
    pub channel: Option<String>,
}

/// Links whose input is `target`, in link-id order.
pub fn active_routes(snap: &GraphSnapshot, target: ObjectId) -> Vec<ActiveRoute> {
    snap.links_into(target)
        .into_iter()
        .map(|link| {
            let node = snap.node(link.output_node_id);
            ActiveRoute {
                link_id: link.id,
                source: link.output_node_id,
                source_name: node
                    .map(|n| n.display_name().to_string())
                    .unwrap_or_else(|| format!("node {}", link.output_node_id)),
                // A vanished source still shows its link; permissive
                // default, same as the classifier's.
                role: node.map(classify).unwrap_or(Role::Application),
                channel: snap
                    .port(link.output_port_id)
                    .and_then(|p| p.channel.clone()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipewire::PortDirection;
    use crate::testutil::*;

    #[test]
    fn routes_are_annotated_and_ordered() {
        let snap = snapshot(
            vec![
                stream_out(137, "game.exe", "wine64-preloader"),
                sink(66, "alsa_output.pci-0000.analog-stereo"),
                capture_stream(154, "Steam"),
            ],
            vec![
                port(1370, 137, "output_FL", PortDirection::Output, Some("FL")),
                port(661, 66, "monitor_FL", PortDirection::Output, Some("FL")),
            ],
            vec![
                // Inserted out of order; the snapshot sorts by link id.
                link(905, 137, 1370, 154, 1540),
                link(901, 66, 661, 154, 1541),
                link(800, 137, 1370, 60, 600),
            ],
        );

        let routes = active_routes(&snap, 154);
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].link_id, 901);
        assert_eq!(routes[0].role, Role::Sink);
        assert_eq!(routes[0].channel.as_deref(), Some("FL"));
        assert_eq!(routes[1].link_id, 905);
        assert_eq!(routes[1].role, Role::Game);
        assert_eq!(routes[1].source_name, "game.exe");
    }

    #[test]
    fn vanished_source_still_listed() {
        let snap = snapshot(
            vec![capture_stream(154, "Steam")],
            vec![],
            vec![link(901, 77, 770, 154, 1540)],
        );
        let routes = active_routes(&snap, 154);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].source_name, "node 77");
        assert_eq!(routes[0].role, Role::Application);
    }
}
