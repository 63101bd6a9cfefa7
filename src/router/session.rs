//! Routing session
//!
//! `Router` is the boundary the CLI (or any front end) talks to. Every
//! operation is one sequential cycle — snapshot, classify, plan, apply —
//! run under a single mutex, and every cycle re-snapshots before planning
//! so two callers can never act on each other's stale view. The mutex
//! guards the locator too, so the cached capture-target id has exactly
//! one owner.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Settings;
use crate::pipewire::{
    GraphSnapshot, GraphState, MediaType, NodeType, ObjectId, PwCommand, PwEvent, PwStatus,
};

use super::applier::{ApplyReport, RouteApplier};
use super::classify::{
    ClassifiedNode, GPU_SINK_SIGNATURES, Role, VIRTUAL_DRIVER_SIGNATURES, classify,
    classify_sources, contains_any,
};
use super::error::RouteError;
use super::inspector::{ActiveRoute, active_routes};
use super::locator::CaptureTargetLocator;
use super::planner::plan_routes;
use super::snapshot::SnapshotReader;

pub struct Router {
    snapshots: SnapshotReader,
    applier: RouteApplier,
    locator: Mutex<CaptureTargetLocator>,
    settings: Settings,
}

impl Router {
    pub fn new(
        graph: Arc<GraphState>,
        commands: Sender<PwCommand>,
        status: Arc<PwStatus>,
        settings: Settings,
    ) -> Self {
        let snapshots = SnapshotReader::new(graph.clone(), status)
            .with_timeout(Duration::from_millis(settings.snapshot_timeout_ms));
        let applier = RouteApplier::new(graph, commands)
            .with_confirm_timeout(Duration::from_millis(settings.confirm_timeout_ms));
        Self {
            snapshots,
            applier,
            locator: Mutex::new(CaptureTargetLocator::new(settings.capture_app.clone())),
            settings,
        }
    }

    /// Selectable sources in the current graph, classified for display.
    pub fn list_sources(&self) -> Result<Vec<ClassifiedNode>, RouteError> {
        let locator = self.locator.lock();
        let snap = self.snapshots.snapshot()?;
        Ok(classify_sources(
            &snap,
            locator.app_name(),
            &self.settings.excluded_apps,
        ))
    }

    /// Live links into the capture target, classified for display.
    pub fn list_active_routes(&self) -> Result<Vec<ActiveRoute>, RouteError> {
        let mut locator = self.locator.lock();
        let snap = self.snapshots.snapshot()?;
        let target = locator.resolve(&snap)?;
        Ok(active_routes(&snap, target))
    }

    /// Route exactly the given sources into the capture target. Sources
    /// keep playing through their sinks; whatever else was feeding the
    /// target is unrouted.
    pub fn apply_routing(&self, selection: &[ObjectId]) -> Result<ApplyReport, RouteError> {
        let mut locator = self.locator.lock();
        let snap = self.snapshots.snapshot()?;
        let target = locator.resolve(&snap)?;
        let plan = plan_routes(&snap, selection, target)?;
        if plan.is_empty() && plan.dropped.is_empty() {
            log::debug!("Selection already satisfied; nothing to do");
        }
        let report = self.applier.apply(&plan);
        if report.failed_involving(target) {
            locator.invalidate();
        }
        Ok(report)
    }

    /// Stop capturing everything. Playback is untouched.
    pub fn clear_routing(&self) -> Result<ApplyReport, RouteError> {
        self.apply_routing(&[])
    }

    /// Reconnect the preferred playback sink to the capture target,
    /// restoring the default "everything audible gets recorded" wiring.
    pub fn restore_default(&self) -> Result<ApplyReport, RouteError> {
        let mut locator = self.locator.lock();
        let snap = self.snapshots.snapshot()?;
        let target = locator.resolve(&snap)?;
        let sink = select_playback_sink(&snap).ok_or(RouteError::NoPlaybackSink)?;

        if snap.is_linked(sink, target) {
            log::debug!("Sink {} already feeds target {}", sink, target);
            return Ok(ApplyReport::default());
        }

        let report = self.applier.connect_direct(sink, target);
        if report.failed_involving(target) {
            locator.invalidate();
        }
        Ok(report)
    }

    /// Periodic re-detection loop. Polls on the configured interval (a
    /// node event wakes it early), logs newly appeared sources, and
    /// optionally keeps game routing applied. Runs until `shutdown` is
    /// set; on the way out it restores default wiring if configured to.
    pub fn watch(&self, events: &Receiver<PwEvent>, shutdown: &AtomicBool) {
        let interval = Duration::from_secs(self.settings.poll_interval_secs.max(1));
        let mut known: HashSet<ObjectId> = HashSet::new();
        let mut first = true;

        while !shutdown.load(Ordering::Relaxed) {
            match self.list_sources() {
                Ok(sources) => {
                    let current: HashSet<ObjectId> = sources.iter().map(|s| s.id).collect();
                    let fresh: Vec<&ClassifiedNode> = sources
                        .iter()
                        .filter(|s| !known.contains(&s.id))
                        .collect();
                    if !first {
                        for s in &fresh {
                            log::info!("New source: {} [{}] (node {})", s.name, s.role, s.id);
                        }
                    }

                    if self.settings.auto_apply_games
                        && !first
                        && fresh.iter().any(|s| s.role == Role::Game)
                    {
                        let games: Vec<ObjectId> = sources
                            .iter()
                            .filter(|s| s.role == Role::Game)
                            .map(|s| s.id)
                            .collect();
                        match self.apply_routing(&games) {
                            Ok(report) => {
                                log::info!("Auto-applied game routing: {}", report.summary());
                            }
                            Err(RouteError::CaptureTargetNotFound(app)) => {
                                log::debug!("{} is not capturing; auto-apply skipped", app);
                            }
                            Err(e) => log::warn!("Auto-apply failed: {}", e),
                        }
                    }

                    known = current;
                }
                Err(e) => log::warn!("Source detection failed: {}", e),
            }
            first = false;

            // Sleep the interval away in slices, waking early on node
            // churn so a freshly launched game is picked up promptly.
            let deadline = Instant::now() + interval;
            let mut rescan = false;
            while Instant::now() < deadline && !rescan && !shutdown.load(Ordering::Relaxed) {
                match events.recv_timeout(Duration::from_millis(200)) {
                    Ok(PwEvent::NodeChanged(_)) | Ok(PwEvent::NodeRemoved(_)) => rescan = true,
                    Ok(PwEvent::LinkChanged(link)) => {
                        log::debug!(
                            "Link {} appeared: {} -> {}",
                            link.id,
                            link.output_node_id,
                            link.input_node_id
                        );
                    }
                    Ok(PwEvent::LinkRemoved(id)) => log::debug!("Link {} removed", id),
                    Ok(PwEvent::Error(e)) => log::error!("PipeWire error: {}", e),
                    Ok(PwEvent::BatchComplete) => {}
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                        break;
                    }
                }
            }
        }

        if self.settings.restore_default_on_close {
            match self.restore_default() {
                Ok(report) => log::info!("Restored default routing: {}", report.summary()),
                Err(e) => log::warn!("Could not restore default routing: {}", e),
            }
        }
    }
}

/// Pick the sink that should carry restored default wiring: analog stereo
/// hardware first, then other hardware, GPU/HDMI audio only as a last
/// resort. Virtual drivers and Bluetooth endpoints are never candidates.
pub fn select_playback_sink(snap: &GraphSnapshot) -> Option<ObjectId> {
    let mut analog: Option<ObjectId> = None;
    let mut other: Option<ObjectId> = None;
    let mut gpu: Option<ObjectId> = None;

    for node in &snap.nodes {
        if node.node_type != Some(NodeType::Sink) || node.media_type != Some(MediaType::Audio) {
            continue;
        }
        if classify(node) == Role::Bluetooth {
            continue;
        }
        let name = node.name.to_ascii_lowercase();
        if contains_any(&name, VIRTUAL_DRIVER_SIGNATURES) {
            continue;
        }

        let slot = if contains_any(&name, GPU_SINK_SIGNATURES) {
            &mut gpu
        } else if name.contains("analog") || name.contains("stereo") {
            &mut analog
        } else {
            &mut other
        };
        if slot.is_none() {
            *slot = Some(node.id);
        }
    }

    if analog.is_none() && other.is_none() && gpu.is_some() {
        log::warn!("Only GPU/HDMI sinks available; using one as fallback");
    }
    analog.or(other).or(gpu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    #[test]
    fn sink_ranking_prefers_analog_hardware() {
        let mut bt_sink = sink(1, "bluez_output.AA_BB.a2dp-sink");
        bt_sink.device_name = "bluez_card.AA_BB".into();
        let snap = snapshot(
            vec![
                bt_sink,
                sink(2, "alsa_output.pci-0000_03_00.1.hdmi-stereo"),
                sink(3, "alsa_output.usb-dac.pro-output-0"),
                sink(4, "alsa_output.pci-0000_0b_00.4.analog-stereo"),
                sink(5, "echo-cancel-sink"),
            ],
            vec![],
            vec![],
        );
        assert_eq!(select_playback_sink(&snap), Some(4));
    }

    #[test]
    fn sink_ranking_falls_back_to_gpu() {
        let snap = snapshot(
            vec![sink(2, "alsa_output.pci-0000_03_00.1.hdmi-surround")],
            vec![],
            vec![],
        );
        // "hdmi-surround" has no analog/stereo marker: GPU bucket.
        assert_eq!(select_playback_sink(&snap), Some(2));
    }

    #[test]
    fn no_usable_sink_is_none() {
        let snap = snapshot(vec![sink(5, "echo-cancel-sink")], vec![], vec![]);
        assert_eq!(select_playback_sink(&snap), None);
    }

    fn test_router(graph: &Arc<GraphState>) -> Router {
        let (tx, rx) = std::sync::mpsc::channel();
        // Keep the receiver alive so sends succeed without a server.
        std::mem::forget(rx);
        let status = Arc::new(PwStatus::default());
        status.mark_connected();
        status.mark_synced();
        let settings = Settings {
            confirm_timeout_ms: 0,
            ..Settings::default()
        };
        Router::new(graph.clone(), tx, status, settings)
    }

    #[test]
    fn satisfied_selection_applies_empty_plan() {
        let graph = GraphState::new();
        graph.insert_node(stream_out(137, "game.exe", "wine64-preloader"));
        graph.insert_node(capture_stream(154, "Steam"));
        graph.insert_link(crate::pipewire::Link {
            id: 902,
            output_node_id: 137,
            output_port_id: 1370,
            input_node_id: 154,
            input_port_id: 1540,
        });

        let router = test_router(&graph);
        let report = router.apply_routing(&[137]).unwrap();
        assert!(report.is_success());
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn missing_recorder_surfaces_not_found() {
        let graph = GraphState::new();
        graph.insert_node(stream_out(137, "game.exe", "wine"));
        let router = test_router(&graph);
        assert!(matches!(
            router.apply_routing(&[137]),
            Err(RouteError::CaptureTargetNotFound(_))
        ));
    }

    #[test]
    fn restore_is_idempotent_when_sink_already_wired() {
        let graph = GraphState::new();
        graph.insert_node(sink(66, "alsa_output.pci-0000.analog-stereo"));
        graph.insert_node(capture_stream(154, "Steam"));
        graph.insert_link(crate::pipewire::Link {
            id: 901,
            output_node_id: 66,
            output_port_id: 661,
            input_node_id: 154,
            input_port_id: 1540,
        });

        let router = test_router(&graph);
        let report = router.restore_default().unwrap();
        assert!(report.is_success());
        assert!(report.outcomes.is_empty());
    }
}
