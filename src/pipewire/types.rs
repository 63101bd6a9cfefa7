use serde::{Deserialize, Serialize};

/// Unique identifier for PipeWire objects
pub type ObjectId = u32;

/// Media type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaType {
    Audio,
    Video,
    Midi,
}

/// Node type based on media class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Audio/Video sink (playback device, speaker, headphones)
    Sink,
    /// Audio/Video source (capture device, microphone)
    Source,
    /// Application that produces audio/video
    StreamOutput,
    /// Application that consumes audio/video (recorder capture inputs live here)
    StreamInput,
    /// Duplex device (both input and output)
    Duplex,
}

/// Port direction (Input sorts before Output for display)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// A PipeWire node (device or application stream).
///
/// Carries the declared properties the classifier reads. Ids are assigned
/// by the server and are not stable across sessions; a node value is only
/// meaningful against the snapshot it was read from.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: ObjectId,
    pub name: String,
    pub description: String,
    pub media_type: Option<MediaType>,
    pub node_type: Option<NodeType>,
    /// Application name (for stream nodes)
    pub app_name: String,
    /// Process binary path, as declared by the client
    pub app_binary: String,
    /// Owning device name (for device nodes)
    pub device_name: String,
    /// Declared media role hint ("game", "Music", ...)
    pub media_role: String,
    /// Stream name, distinguishes multiple streams from one application
    pub media_name: String,
    /// Pulse buffer max length, used as a stream-purpose hint
    pub max_buffer: Option<u32>,
    /// True when the node has received its first info event and is ready
    pub ready: bool,
}

impl Node {
    pub fn display_name(&self) -> &str {
        if !self.description.is_empty() {
            &self.description
        } else if !self.app_name.is_empty() {
            &self.app_name
        } else if !self.name.is_empty() {
            &self.name
        } else {
            "Unknown"
        }
    }
}

/// A PipeWire port on a node
#[derive(Debug, Clone)]
pub struct Port {
    pub id: ObjectId,
    pub node_id: ObjectId,
    pub name: String,
    pub direction: PortDirection,
    /// Channel name (e.g., "FL", "FR", "mono")
    pub channel: Option<String>,
}

/// A PipeWire link between two ports
#[derive(Debug, Clone)]
pub struct Link {
    pub id: ObjectId,
    pub output_node_id: ObjectId,
    pub output_port_id: ObjectId,
    pub input_node_id: ObjectId,
    pub input_port_id: ObjectId,
}

/// Messages from the PipeWire thread to the routing layer
#[derive(Debug, Clone)]
pub enum PwEvent {
    /// A node was added or updated
    NodeChanged(Node),
    /// A node was removed
    NodeRemoved(ObjectId),
    /// A link was added or updated
    LinkChanged(Link),
    /// A link was removed
    LinkRemoved(ObjectId),
    /// PipeWire connection error
    Error(String),
    /// Batch update complete (the registry view has settled)
    BatchComplete,
}

/// Commands from the routing layer to the PipeWire thread
#[derive(Debug, Clone)]
pub enum PwCommand {
    /// Create a link between two ports
    Connect {
        output_port_id: ObjectId,
        input_port_id: ObjectId,
        /// Passive links don't keep the graph running on their own and
        /// don't remix the source's channel layout. Capture taps are
        /// passive; restored sink wiring is not.
        passive: bool,
    },
    /// Destroy a link
    Disconnect { link_id: ObjectId },
}
