use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use super::types::*;

pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.as_bytes().iter().peekable();
    let mut bi = b.as_bytes().iter().peekable();

    loop {
        match (ai.peek(), bi.peek()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&&ac), Some(&&bc)) => {
                let a_digit = ac.is_ascii_digit();
                let b_digit = bc.is_ascii_digit();

                if a_digit && b_digit {
                    let mut an: u64 = 0;
                    while let Some(&&c) = ai.peek() {
                        if c.is_ascii_digit() {
                            an = an * 10 + (c - b'0') as u64;
                            ai.next();
                        } else {
                            break;
                        }
                    }
                    let mut bn: u64 = 0;
                    while let Some(&&c) = bi.peek() {
                        if c.is_ascii_digit() {
                            bn = bn * 10 + (c - b'0') as u64;
                            bi.next();
                        } else {
                            break;
                        }
                    }
                    match an.cmp(&bn) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                } else {
                    match ac.cmp(&bc) {
                        Ordering::Equal => {
                            ai.next();
                            bi.next();
                        }
                        ord => return ord,
                    }
                }
            }
        }
    }
}

/// Live mirror of the PipeWire registry, maintained by the PipeWire thread.
///
/// The routing layer never reads it directly during a cycle; it takes a
/// [`GraphSnapshot`] and works on that.
#[derive(Debug, Default)]
pub struct GraphState {
    nodes: RwLock<HashMap<ObjectId, Node>>,
    ports: RwLock<HashMap<ObjectId, Port>>,
    links: RwLock<HashMap<ObjectId, Link>>,
}

impl GraphState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert_node(&self, node: Node) {
        self.nodes.write().insert(node.id, node);
    }

    pub fn remove_node(&self, id: ObjectId) -> Option<Node> {
        self.nodes.write().remove(&id)
    }

    pub fn get_node(&self, id: ObjectId) -> Option<Node> {
        self.nodes.read().get(&id).cloned()
    }

    pub fn insert_port(&self, port: Port) {
        self.ports.write().insert(port.id, port);
    }

    pub fn remove_port(&self, id: ObjectId) -> Option<Port> {
        self.ports.write().remove(&id)
    }

    pub fn get_port(&self, id: ObjectId) -> Option<Port> {
        self.ports.read().get(&id).cloned()
    }

    pub fn get_input_ports(&self, node_id: ObjectId) -> Vec<Port> {
        let mut ports: Vec<Port> = self
            .ports
            .read()
            .values()
            .filter(|p| p.node_id == node_id && p.direction == PortDirection::Input)
            .cloned()
            .collect();
        ports.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        ports
    }

    pub fn get_output_ports(&self, node_id: ObjectId) -> Vec<Port> {
        let mut ports: Vec<Port> = self
            .ports
            .read()
            .values()
            .filter(|p| p.node_id == node_id && p.direction == PortDirection::Output)
            .cloned()
            .collect();
        ports.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        ports
    }

    pub fn insert_link(&self, link: Link) {
        self.links.write().insert(link.id, link);
    }

    pub fn remove_link(&self, id: ObjectId) -> Option<Link> {
        self.links.write().remove(&id)
    }

    pub fn get_link(&self, id: ObjectId) -> Option<Link> {
        self.links.read().get(&id).cloned()
    }

    pub fn find_link(&self, output_port_id: ObjectId, input_port_id: ObjectId) -> Option<Link> {
        self.links
            .read()
            .values()
            .find(|l| l.output_port_id == output_port_id && l.input_port_id == input_port_id)
            .cloned()
    }

    /// Drop a removed node's ports and any links touching them.
    pub fn cleanup_node(&self, node_id: ObjectId) {
        let port_ids: Vec<ObjectId> = self
            .ports
            .read()
            .values()
            .filter(|p| p.node_id == node_id)
            .map(|p| p.id)
            .collect();

        {
            let mut links = self.links.write();
            links.retain(|_, l| {
                !port_ids.contains(&l.output_port_id) && !port_ids.contains(&l.input_port_id)
            });
        }

        {
            let mut ports = self.ports.write();
            for port_id in port_ids {
                ports.remove(&port_id);
            }
        }
    }

    /// Point-in-time copy of the whole graph. All three read locks are
    /// held together so the copy is internally consistent.
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes_guard = self.nodes.read();
        let ports_guard = self.ports.read();
        let links_guard = self.links.read();

        let mut nodes: Vec<Node> = nodes_guard.values().cloned().collect();
        let mut ports: Vec<Port> = ports_guard.values().cloned().collect();
        let mut links: Vec<Link> = links_guard.values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        ports.sort_by_key(|p| p.id);
        links.sort_by_key(|l| l.id);

        GraphSnapshot {
            nodes,
            ports,
            links,
        }
    }
}

/// Immutable view of the graph at one instant.
///
/// Everything the classifier, locator, planner and inspector read comes
/// from here; nothing in a snapshot changes under them mid-cycle.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub ports: Vec<Port>,
    pub links: Vec<Link>,
}

impl GraphSnapshot {
    pub fn node(&self, id: ObjectId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn port(&self, id: ObjectId) -> Option<&Port> {
        self.ports.iter().find(|p| p.id == id)
    }

    /// Links whose input side is `node_id`, in link-id order.
    pub fn links_into(&self, node_id: ObjectId) -> Vec<&Link> {
        self.links
            .iter()
            .filter(|l| l.input_node_id == node_id)
            .collect()
    }

    /// True when at least one link connects the two nodes in this direction.
    pub fn is_linked(&self, output_node: ObjectId, input_node: ObjectId) -> bool {
        self.links
            .iter()
            .any(|l| l.output_node_id == output_node && l.input_node_id == input_node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_cmp_orders_numbered_ports() {
        assert_eq!(natural_cmp("playback_2", "playback_10"), Ordering::Less);
        assert_eq!(natural_cmp("playback_FL", "playback_FL"), Ordering::Equal);
        assert_eq!(natural_cmp("capture_1", "capture_1b"), Ordering::Less);
    }

    #[test]
    fn snapshot_is_sorted_and_detached() {
        let state = GraphState::new();
        for id in [30u32, 10, 20] {
            state.insert_node(Node {
                id,
                name: format!("node-{id}"),
                description: String::new(),
                media_type: Some(MediaType::Audio),
                node_type: Some(NodeType::StreamOutput),
                app_name: String::new(),
                app_binary: String::new(),
                device_name: String::new(),
                media_role: String::new(),
                media_name: String::new(),
                max_buffer: None,
                ready: true,
            });
        }

        let snap = state.snapshot();
        let ids: Vec<ObjectId> = snap.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![10, 20, 30]);

        // Later mutations must not show up in an existing snapshot.
        state.remove_node(10);
        assert!(snap.node(10).is_some());
        assert!(state.get_node(10).is_none());
    }

    #[test]
    fn cleanup_node_drops_ports_and_links() {
        let state = GraphState::new();
        state.insert_port(Port {
            id: 101,
            node_id: 1,
            name: "output_FL".into(),
            direction: PortDirection::Output,
            channel: Some("FL".into()),
        });
        state.insert_port(Port {
            id: 201,
            node_id: 2,
            name: "input_FL".into(),
            direction: PortDirection::Input,
            channel: Some("FL".into()),
        });
        state.insert_link(Link {
            id: 300,
            output_node_id: 1,
            output_port_id: 101,
            input_node_id: 2,
            input_port_id: 201,
        });

        state.cleanup_node(1);
        assert!(state.get_port(101).is_none());
        assert!(state.get_link(300).is_none());
        assert!(state.get_port(201).is_some());
    }
}
