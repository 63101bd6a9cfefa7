use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;

use libspa::utils::dict::DictRef;
use parking_lot::Mutex;
use pipewire::{
    context::ContextRc, link::Link as PwLink, main_loop::MainLoopRc, registry::GlobalObject,
    types::ObjectType,
};

use super::state::GraphState;
use super::types::*;

/// Connection status shared between the PipeWire thread and the snapshot
/// reader. `synced` flips once the initial registry enumeration has
/// settled; until then a snapshot would be partial.
#[derive(Debug, Default)]
pub struct PwStatus {
    connected: AtomicBool,
    synced: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl PwStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }

    pub(crate) fn mark_connected(&self) {
        self.connected.store(true, Ordering::Release);
    }

    pub(crate) fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
    }

    pub(crate) fn mark_failed(&self, reason: String) {
        *self.failure.lock() = Some(reason);
    }
}

/// Handle to the PipeWire thread: event stream, command channel, status.
pub struct PwHandle {
    pub events: Receiver<PwEvent>,
    pub commands: Sender<PwCommand>,
    pub status: Arc<PwStatus>,
}

pub fn start(graph: Arc<GraphState>, tick_interval_ms: u64) -> PwHandle {
    let (event_tx, event_rx) = std::sync::mpsc::channel();
    let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
    let status = Arc::new(PwStatus::default());

    let tick = tick_interval_ms.max(1);

    std::thread::spawn({
        let status = status.clone();
        move || {
            if let Err(e) = run_pipewire_thread(graph, event_tx.clone(), cmd_rx, &status, tick) {
                log::error!("PipeWire thread error: {}", e);
                status.mark_failed(e.to_string());
                let _ = event_tx.send(PwEvent::Error(e.to_string()));
            }
        }
    });

    PwHandle {
        events: event_rx,
        commands: cmd_tx,
        status,
    }
}

fn run_pipewire_thread(
    graph: Arc<GraphState>,
    event_tx: Sender<PwEvent>,
    cmd_rx: Receiver<PwCommand>,
    status: &Arc<PwStatus>,
    tick_interval_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    pipewire::init();

    let mainloop = MainLoopRc::new(None)?;
    let context = ContextRc::new(&mainloop, None)?;
    let core = context.connect_rc(None)?;
    let registry = core.get_registry_rc()?;

    status.mark_connected();

    let changes_pending: Rc<RefCell<bool>> = Rc::new(RefCell::new(false));

    let _registry_listener = {
        let graph = graph.clone();
        let event_tx = event_tx.clone();
        let changes_pending = changes_pending.clone();

        registry
            .add_listener_local()
            .global({
                let graph = graph.clone();
                let event_tx = event_tx.clone();
                let changes_pending = changes_pending.clone();

                move |global| match global.type_ {
                    ObjectType::Node => {
                        if let Some(node) = parse_node(global) {
                            graph.insert_node(node.clone());
                            let _ = event_tx.send(PwEvent::NodeChanged(node));
                            *changes_pending.borrow_mut() = true;
                        }
                    }
                    ObjectType::Port => {
                        if let Some(port) = parse_port(global) {
                            graph.insert_port(port);
                            *changes_pending.borrow_mut() = true;
                        } else {
                            log::debug!("Port global {} could not be parsed", global.id);
                        }
                    }
                    ObjectType::Link => {
                        if let Some(link) = parse_link_from_props(global) {
                            graph.insert_link(link.clone());
                            let _ = event_tx.send(PwEvent::LinkChanged(link));
                            *changes_pending.borrow_mut() = true;
                        }
                    }
                    _ => {}
                }
            })
            .global_remove({
                let graph = graph.clone();
                let event_tx = event_tx.clone();
                let changes_pending = changes_pending.clone();

                move |id| {
                    if graph.remove_node(id).is_some() {
                        graph.cleanup_node(id);
                        let _ = event_tx.send(PwEvent::NodeRemoved(id));
                        *changes_pending.borrow_mut() = true;
                    } else if graph.remove_port(id).is_some() {
                        *changes_pending.borrow_mut() = true;
                    } else if graph.remove_link(id).is_some() {
                        let _ = event_tx.send(PwEvent::LinkRemoved(id));
                        *changes_pending.borrow_mut() = true;
                    }
                }
            })
            .register()
    };

    // Bridge the std mpsc command channel into the PipeWire loop.
    let (pw_cmd_tx, pw_cmd_rx) = pipewire::channel::channel();
    std::thread::spawn(move || {
        while let Ok(cmd) = cmd_rx.recv() {
            if pw_cmd_tx.send(cmd).is_err() {
                break;
            }
        }
    });

    let _cmd_receiver = pw_cmd_rx.attach(mainloop.loop_(), {
        let graph = graph.clone();
        let core = core.clone();
        let registry = registry.clone();

        move |cmd| match cmd {
            PwCommand::Connect {
                output_port_id,
                input_port_id,
                passive,
            } => {
                create_link(&graph, &core, output_port_id, input_port_id, passive);
            }
            PwCommand::Disconnect { link_id } => {
                log::debug!("Destroying link {}", link_id);
                registry.destroy_global(link_id);
            }
        }
    });

    let _timer = mainloop.loop_().add_timer({
        let changes_pending = changes_pending.clone();
        let status = Arc::clone(status);
        let event_tx = event_tx.clone();
        let seen_changes = Rc::new(RefCell::new(false));
        let idle_ticks = Rc::new(RefCell::new(0u32));

        move |_| {
            if *changes_pending.borrow() {
                *changes_pending.borrow_mut() = false;
                *seen_changes.borrow_mut() = true;
                *idle_ticks.borrow_mut() = 0;
                let _ = event_tx.send(PwEvent::BatchComplete);
            } else if !status.is_synced() {
                // A quiet tick after the enumeration burst means the
                // registry view is complete; an empty graph never bursts,
                // so give it a few ticks before declaring it settled.
                let idle = {
                    let mut i = idle_ticks.borrow_mut();
                    *i += 1;
                    *i
                };
                if *seen_changes.borrow() || idle >= 5 {
                    status.mark_synced();
                }
            }
        }
    });

    let _ = _timer.update_timer(
        Some(Duration::from_millis(tick_interval_ms)),
        Some(Duration::from_millis(tick_interval_ms)),
    );

    log::info!("PipeWire thread started");
    mainloop.run();

    Ok(())
}

fn parse_node(global: &GlobalObject<&DictRef>) -> Option<Node> {
    let props = global.props.as_ref()?;

    let name = props.get("node.name").unwrap_or_default().to_string();
    let description = props
        .get("node.description")
        .or_else(|| props.get("node.nick"))
        .unwrap_or_default()
        .to_string();
    let media_class = props.get("media.class").unwrap_or_default().to_string();

    let effective_class = if !media_class.is_empty() {
        media_class.clone()
    } else {
        let mt = props.get("media.type").unwrap_or_default();
        let mc = props.get("media.category").unwrap_or_default();
        if !mt.is_empty() || !mc.is_empty() {
            format!("{}/{}", mt, mc)
        } else {
            String::new()
        }
    };

    let media_type = if effective_class.contains("Audio") {
        Some(MediaType::Audio)
    } else if effective_class.contains("Video") {
        Some(MediaType::Video)
    } else if effective_class.contains("Midi") {
        Some(MediaType::Midi)
    } else {
        None
    };

    let node_type = if effective_class.contains("Sink") {
        Some(NodeType::Sink)
    } else if effective_class.contains("Source") && !effective_class.contains("Stream") {
        Some(NodeType::Source)
    } else if effective_class.contains("Stream/Output") || effective_class.contains("Playback") {
        Some(NodeType::StreamOutput)
    } else if effective_class.contains("Stream/Input") || effective_class.contains("Record") {
        Some(NodeType::StreamInput)
    } else if effective_class.contains("Duplex") || effective_class.contains("Bridge") {
        Some(NodeType::Duplex)
    } else {
        None
    };

    let max_buffer = props
        .get("pulse.attr.maxlength")
        .and_then(|v| v.parse().ok());

    Some(Node {
        id: global.id,
        name,
        description,
        media_type,
        node_type,
        app_name: props.get("application.name").unwrap_or_default().to_string(),
        app_binary: props
            .get("application.process.binary")
            .unwrap_or_default()
            .to_string(),
        device_name: props.get("device.name").unwrap_or_default().to_string(),
        media_role: props.get("media.role").unwrap_or_default().to_string(),
        media_name: props.get("media.name").unwrap_or_default().to_string(),
        max_buffer,
        ready: true,
    })
}

fn parse_port(global: &GlobalObject<&DictRef>) -> Option<Port> {
    let props = global.props.as_ref()?;

    let node_id: ObjectId = match props.get("node.id") {
        Some(v) => match v.parse() {
            Ok(id) => id,
            Err(_) => {
                log::debug!("Port {}: failed to parse node.id {:?}", global.id, v);
                return None;
            }
        },
        None => {
            log::debug!("Port {}: missing node.id property", global.id);
            return None;
        }
    };
    let name = props.get("port.name").unwrap_or_default().to_string();
    let channel = props.get("audio.channel").map(String::from);

    let direction = match props.get("port.direction") {
        Some("in") => PortDirection::Input,
        Some("out") => PortDirection::Output,
        Some(other) => {
            log::debug!(
                "Port {} (node {}): unknown port.direction {:?}",
                global.id,
                node_id,
                other
            );
            return None;
        }
        None => {
            if name.starts_with("input") || name.starts_with("playback") {
                PortDirection::Input
            } else if name.starts_with("output")
                || name.starts_with("capture")
                || name.starts_with("monitor")
            {
                PortDirection::Output
            } else {
                log::warn!(
                    "Port {} (node {}): missing port.direction, cannot infer from name {:?}",
                    global.id,
                    node_id,
                    name
                );
                return None;
            }
        }
    };

    Some(Port {
        id: global.id,
        node_id,
        name,
        direction,
        channel,
    })
}

fn parse_link_from_props(global: &GlobalObject<&DictRef>) -> Option<Link> {
    let props = global.props.as_ref()?;

    Some(Link {
        id: global.id,
        output_node_id: props.get("link.output.node")?.parse().ok()?,
        output_port_id: props.get("link.output.port")?.parse().ok()?,
        input_node_id: props.get("link.input.node")?.parse().ok()?,
        input_port_id: props.get("link.input.port")?.parse().ok()?,
    })
}

fn create_link(
    graph: &Arc<GraphState>,
    core: &pipewire::core::CoreRc,
    output_port_id: ObjectId,
    input_port_id: ObjectId,
    passive: bool,
) {
    let output_port = match graph.get_port(output_port_id) {
        Some(p) if p.direction == PortDirection::Output => p,
        _ => {
            log::warn!("Invalid output port {}", output_port_id);
            return;
        }
    };

    let input_port = match graph.get_port(input_port_id) {
        Some(p) if p.direction == PortDirection::Input => p,
        _ => {
            log::warn!("Invalid input port {}", input_port_id);
            return;
        }
    };

    if output_port.node_id == input_port.node_id {
        log::warn!(
            "Rejected self-loop: port {} and port {} belong to the same node {}",
            output_port_id,
            input_port_id,
            output_port.node_id
        );
        return;
    }

    log::debug!(
        "Creating link {} -> {} (passive: {})",
        output_port_id,
        input_port_id,
        passive
    );

    let mut props = pipewire::properties::properties! {
        *pipewire::keys::LINK_OUTPUT_NODE => output_port.node_id.to_string(),
        *pipewire::keys::LINK_OUTPUT_PORT => output_port_id.to_string(),
        *pipewire::keys::LINK_INPUT_NODE => input_port.node_id.to_string(),
        *pipewire::keys::LINK_INPUT_PORT => input_port_id.to_string(),
        *pipewire::keys::OBJECT_LINGER => "true",
    };
    if passive {
        props.insert("link.passive", "true");
        props.insert("link.dont-remix", "true");
    }

    if let Err(e) = core.create_object::<PwLink>("link-factory", &props) {
        log::error!("Failed to create link: {}", e);
    }
}
