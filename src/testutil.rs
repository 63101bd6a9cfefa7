//! Shared builders for graph fixtures used across module tests.

use crate::pipewire::{
    GraphSnapshot, Link, MediaType, Node, NodeType, ObjectId, Port, PortDirection,
};

fn base_node(id: ObjectId, node_type: NodeType) -> Node {
    Node {
        id,
        name: String::new(),
        description: String::new(),
        media_type: Some(MediaType::Audio),
        node_type: Some(node_type),
        app_name: String::new(),
        app_binary: String::new(),
        device_name: String::new(),
        media_role: String::new(),
        media_name: String::new(),
        max_buffer: None,
        ready: true,
    }
}

/// An application stream producing audio.
pub fn stream_out(id: ObjectId, app: &str, binary: &str) -> Node {
    let mut node = base_node(id, NodeType::StreamOutput);
    node.name = binary.rsplit('/').next().unwrap_or(binary).to_string();
    node.app_name = app.to_string();
    node.app_binary = binary.to_string();
    node
}

/// A recorder's capture input stream.
pub fn capture_stream(id: ObjectId, app: &str) -> Node {
    let mut node = base_node(id, NodeType::StreamInput);
    node.name = format!("{}-capture", app.to_ascii_lowercase());
    node.app_name = app.to_string();
    node
}

/// A playback sink.
pub fn sink(id: ObjectId, name: &str) -> Node {
    let mut node = base_node(id, NodeType::Sink);
    node.name = name.to_string();
    node
}

pub fn port(
    id: ObjectId,
    node_id: ObjectId,
    name: &str,
    direction: PortDirection,
    channel: Option<&str>,
) -> Port {
    Port {
        id,
        node_id,
        name: name.to_string(),
        direction,
        channel: channel.map(String::from),
    }
}

pub fn link(
    id: ObjectId,
    output_node: ObjectId,
    output_port: ObjectId,
    input_node: ObjectId,
    input_port: ObjectId,
) -> Link {
    Link {
        id,
        output_node_id: output_node,
        output_port_id: output_port,
        input_node_id: input_node,
        input_port_id: input_port,
    }
}

/// A snapshot with the same ordering guarantees as the live reader's.
pub fn snapshot(nodes: Vec<Node>, ports: Vec<Port>, links: Vec<Link>) -> GraphSnapshot {
    let mut snap = GraphSnapshot {
        nodes,
        ports,
        links,
    };
    snap.nodes.sort_by_key(|n| n.id);
    snap.ports.sort_by_key(|p| p.id);
    snap.links.sort_by_key(|l| l.id);
    snap
}
