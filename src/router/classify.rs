//! Node classification
//!
//! Assigns every graph node a semantic role from its declared properties.
//! The checks run in a fixed priority order and the first match wins:
//! categories overlap (a Bluetooth headset can carry a game-like name, a
//! communication app can be built on a browser runtime), so the order is
//! part of the contract, not an implementation detail.
//!
//! Classification never fails; a node with no matching signal is an
//! `Application` and stays visible to the user.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::pattern_matches;
use crate::pipewire::{GraphSnapshot, MediaType, Node, NodeType, ObjectId};

/// Semantic role of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Bluetooth endpoint. Never a routable source, never a capture
    /// target — a misrouted headset records private audio.
    Bluetooth,
    /// Playback destination (speakers, headphones)
    Sink,
    /// Input-only or non-audio stream; not selectable, but a capture
    /// input stream is a valid routing target
    NonProducer,
    /// Echo-cancel, dummy/freewheel drivers, loopbacks and monitors
    Internal,
    /// Voice/communication application
    Communication,
    /// Web browser
    Browser,
    /// Game (compat layer, runtime wrapper, native launch pattern)
    Game,
    /// Low-level audio subsystem node
    System,
    /// Anything else that produces audio
    Application,
}

impl Role {
    /// True when nodes of this role may be routed into the capture target.
    pub fn is_routable(&self) -> bool {
        matches!(
            self,
            Role::Communication | Role::Browser | Role::Game | Role::System | Role::Application
        )
    }

    /// Human-readable category label, independent of routing decisions.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Bluetooth => "Bluetooth",
            Role::Sink => "Sink",
            Role::NonProducer => "Input Stream",
            Role::Internal => "Internal",
            Role::Communication => "Communication",
            Role::Browser => "Browser",
            Role::Game => "Game",
            Role::System => "System",
            Role::Application => "Application",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Signature tables ───────────────────────────────────────────────────────
// Ordered, explicit data; the priority between tables lives in classify().

/// Bluetooth markers in node and device names.
pub const BLUETOOTH_NAME_SIGNATURES: &[&str] = &["bluez", "bluetooth", "bt_", "hci"];
/// Bluetooth markers in human-readable descriptions.
pub const BLUETOOTH_DESC_SIGNATURES: &[&str] = &["bluetooth", "headset", "earbuds", "airpods"];

/// Virtual drivers that must never be treated as playback hardware.
pub const VIRTUAL_DRIVER_SIGNATURES: &[&str] = &["echo-cancel", "dummy", "freewheel"];
/// Node names of internal plumbing, excluded from the selectable list.
pub const INTERNAL_SIGNATURES: &[&str] =
    &["echo-cancel", "dummy", "freewheel", "loopback", "monitor"];

pub const COMMUNICATION_SIGNATURES: &[&str] = &[
    "discord", "slack", "zoom", "telegram", "teams", "skype", "mumble", "teamspeak",
];
pub const BROWSER_SIGNATURES: &[&str] = &[
    "firefox", "chromium", "chrome", "opera", "brave", "edge", "vivaldi",
];

/// Compatibility-layer markers in the process binary.
const COMPAT_BINARY_SIGNATURES: &[&str] = &["wine", "proton", ".exe"];
/// Steam runtime wrappers that front an actual game process.
const RUNTIME_WRAPPER_SIGNATURES: &[&str] =
    &["pressure-vessel", "steam-runtime", "reaper", "fossilize"];
/// The launcher's own helper processes, which also run under the runtime.
const RUNTIME_HELPER_SIGNATURES: &[&str] = &["steamwebhelper", "gameoverlayui"];
/// Application-name hints that indicate gameplay.
const GAME_APP_HINTS: &[&str] = &["game", "proton", "wine"];
/// Executable suffixes common to native Linux game builds.
const NATIVE_GAME_SUFFIXES: &[&str] = &[".x86_64", ".x86", ".bin", ".sh"];
/// Library paths a native game binary is expected to live under.
const GAME_LIBRARY_PATHS: &[&str] = &[
    "/steam/",
    "/steamapps/",
    "/games/",
    "/.steam/",
    "/compatdata/",
    "/shadercache/",
];
/// Known desktop applications whose binaries also end in game-like suffixes.
const DESKTOP_APP_SIGNATURES: &[&str] = &[
    "firefox", "chrome", "code", "electron", "discord", "slack", "spotify", "vlc", "mpv",
];
/// Media roles some games declare.
const GAME_MEDIA_ROLES: &[&str] = &["game", "production"];

pub const SYSTEM_SIGNATURES: &[&str] = &["alsa", "jack", "pulse"];

/// Sink names that indicate a GPU/HDMI output, deprioritized for playback.
pub const GPU_SINK_SIGNATURES: &[&str] = &["navi", "nvidia", "hdmi", "gpu", "displayport", "dp-"];

pub(crate) fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    !haystack.is_empty() && needles.iter().any(|n| haystack.contains(n))
}

/// Assign a role to a node. Pure; first match wins.
pub fn classify(node: &Node) -> Role {
    let node_name = node.name.to_ascii_lowercase();
    let device_name = node.device_name.to_ascii_lowercase();
    let description = node.description.to_ascii_lowercase();
    let app_name = node.app_name.to_ascii_lowercase();
    let binary = node.app_binary.to_ascii_lowercase();

    // Bluetooth wins over every other signal.
    if contains_any(&node_name, BLUETOOTH_NAME_SIGNATURES)
        || contains_any(&device_name, BLUETOOTH_NAME_SIGNATURES)
        || contains_any(&description, BLUETOOTH_DESC_SIGNATURES)
    {
        return Role::Bluetooth;
    }

    match node.node_type {
        Some(NodeType::Sink) => return Role::Sink,
        Some(NodeType::StreamInput) => return Role::NonProducer,
        _ => {}
    }
    if node.media_type.is_some() && node.media_type != Some(MediaType::Audio) {
        return Role::NonProducer;
    }

    if contains_any(&node_name, INTERNAL_SIGNATURES) {
        return Role::Internal;
    }

    // Communication before browsers: several communication apps ship on
    // browser runtimes and would otherwise match the browser list.
    if contains_any(&app_name, COMMUNICATION_SIGNATURES)
        || contains_any(&binary, COMMUNICATION_SIGNATURES)
    {
        return Role::Communication;
    }

    if contains_any(&app_name, BROWSER_SIGNATURES) || contains_any(&binary, BROWSER_SIGNATURES) {
        return Role::Browser;
    }

    if let Some(role) = classify_game(&app_name, &binary, &node.media_role.to_ascii_lowercase()) {
        return role;
    }

    if contains_any(&node_name, SYSTEM_SIGNATURES) {
        return Role::System;
    }

    Role::Application
}

/// Game detection, several signals deep. Returns `System` for the
/// launcher's own helper processes so they never count as a game.
fn classify_game(app_name: &str, binary: &str, media_role: &str) -> Option<Role> {
    if contains_any(binary, RUNTIME_HELPER_SIGNATURES) {
        return Some(Role::System);
    }
    if contains_any(binary, COMPAT_BINARY_SIGNATURES)
        || contains_any(binary, RUNTIME_WRAPPER_SIGNATURES)
    {
        return Some(Role::Game);
    }
    if contains_any(app_name, GAME_APP_HINTS) {
        return Some(Role::Game);
    }
    if NATIVE_GAME_SUFFIXES.iter().any(|s| binary.ends_with(s))
        && !contains_any(app_name, DESKTOP_APP_SIGNATURES)
        && contains_any(binary, GAME_LIBRARY_PATHS)
    {
        return Some(Role::Game);
    }
    if !media_role.is_empty() && GAME_MEDIA_ROLES.contains(&media_role) {
        return Some(Role::Game);
    }
    None
}

/// A selectable source, annotated for display.
#[derive(Debug, Clone)]
pub struct ClassifiedNode {
    pub id: ObjectId,
    pub name: String,
    pub role: Role,
    pub app_name: String,
    pub binary: String,
    /// Best-effort guess of what this particular stream carries.
    pub purpose: Option<&'static str>,
}

/// Build the user-facing source list from a snapshot.
///
/// Producers only; the recorder's own streams and anything matching an
/// exclusion pattern are filtered out. Non-routable roles never appear
/// here, but stay in the snapshot for the planner's safety checks.
pub fn classify_sources(
    snap: &GraphSnapshot,
    capture_app: &str,
    excluded: &[String],
) -> Vec<ClassifiedNode> {
    snap.nodes
        .iter()
        .filter_map(|node| {
            if !matches!(
                node.node_type,
                Some(NodeType::StreamOutput) | Some(NodeType::Source)
            ) {
                return None;
            }
            if node.media_type != Some(MediaType::Audio) {
                return None;
            }
            let role = classify(node);
            if !role.is_routable() {
                return None;
            }
            if node.app_name == capture_app {
                return None;
            }
            if excluded.iter().any(|p| {
                pattern_matches(p, &node.app_name) || pattern_matches(p, node.display_name())
            }) {
                return None;
            }

            let mut name = node.display_name().to_string();
            if !node.media_name.is_empty() {
                name = format!("{} ({})", name, node.media_name);
            }

            Some(ClassifiedNode {
                id: node.id,
                name,
                role,
                app_name: node.app_name.clone(),
                binary: node.app_binary.clone(),
                purpose: stream_purpose(node),
            })
        })
        .collect()
}

/// Guess what an application stream carries, for display only.
///
/// Large pulse buffers suggest continuous audio (music, gameplay), small
/// ones discrete sounds (UI, voice chat); when the buffer size is
/// inconclusive the stream number is used instead.
pub fn stream_purpose(node: &Node) -> Option<&'static str> {
    if node.media_name.is_empty() {
        return None;
    }

    let max_len = node.max_buffer.unwrap_or(0);
    if max_len > 31_000 {
        return Some("music/ambient");
    }
    if max_len > 25_000 {
        return Some("main audio/gameplay");
    }
    if max_len > 0 && max_len < 12_000 {
        return Some("UI/effects/voice/chat");
    }
    if max_len > 20_000 {
        return Some("speech/voice");
    }

    let lower = node.media_name.to_ascii_lowercase();
    let stream_num = lower
        .split_once("audio stream #")
        .and_then(|(_, rest)| rest.split(|c: char| !c.is_ascii_digit()).next())
        .and_then(|digits| digits.parse::<u32>().ok());

    match stream_num {
        Some(1) => Some("main audio"),
        Some(2) => Some("UI/menu"),
        Some(3) => Some("voice/dialogue/chat"),
        Some(n) if n >= 4 => Some("music/ambient"),
        _ => Some("audio stream"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    #[test]
    fn bluetooth_beats_everything() {
        // A Bluetooth endpoint with a game-like name stays Bluetooth.
        let mut node = stream_out(200, "Elden Ring", "/home/u/.steam/proton");
        node.name = "bluez_output.AA_BB_CC.a2dp-sink".into();
        assert_eq!(classify(&node), Role::Bluetooth);

        let mut node = stream_out(201, "Discord", "discord");
        node.device_name = "bluez_card.AA_BB".into();
        assert_eq!(classify(&node), Role::Bluetooth);

        let mut node = sink(202, "some_output");
        node.description = "WH-1000XM4 Headset".into();
        assert_eq!(classify(&node), Role::Bluetooth);
    }

    #[test]
    fn communication_beats_browser() {
        // Discord ships on a Chromium runtime; it must classify as
        // communication, never browser.
        let mut node = stream_out(10, "Discord", "/usr/lib/discord/chrome-sandbox");
        node.app_name = "Chromium Discord".into();
        assert_eq!(classify(&node), Role::Communication);
    }

    #[test]
    fn browsers_and_plain_apps() {
        assert_eq!(
            classify(&stream_out(11, "Firefox", "/usr/lib/firefox/firefox")),
            Role::Browser
        );
        assert_eq!(
            classify(&stream_out(12, "Rhythmbox", "/usr/bin/rhythmbox")),
            Role::Application
        );
    }

    #[test]
    fn game_detection_signals() {
        // Wine/Proton binaries
        assert_eq!(
            classify(&stream_out(20, "game.exe", "wine64-preloader")),
            Role::Game
        );
        assert_eq!(classify(&stream_out(21, "Hades", "proton")), Role::Game);
        // Runtime wrapper
        assert_eq!(
            classify(&stream_out(22, "Celeste", "pressure-vessel-wrap")),
            Role::Game
        );
        // Native binary under a game library path
        assert_eq!(
            classify(&stream_out(
                23,
                "Factorio",
                "/home/u/.steam/steamapps/common/factorio/bin/x64/factorio.x86_64"
            )),
            Role::Game
        );
        // Media role hint
        let mut node = stream_out(24, "Osu", "/opt/osu/osu");
        node.media_role = "Game".into();
        assert_eq!(classify(&node), Role::Game);
    }

    #[test]
    fn launcher_helpers_are_system() {
        assert_eq!(
            classify(&stream_out(25, "Steam", "steamwebhelper")),
            Role::System
        );
        assert_eq!(
            classify(&stream_out(26, "Steam", "gameoverlayui")),
            Role::System
        );
    }

    #[test]
    fn desktop_apps_do_not_match_native_game_suffixes() {
        // A .sh-launched editor under no game path stays an application.
        assert_eq!(
            classify(&stream_out(27, "Code", "/usr/share/code/code.sh")),
            Role::Application
        );
    }

    #[test]
    fn sinks_inputs_and_internal_nodes() {
        assert_eq!(
            classify(&sink(30, "alsa_output.pci-0000.analog-stereo")),
            Role::Sink
        );
        assert_eq!(classify(&capture_stream(31, "Steam")), Role::NonProducer);
        let mut node = stream_out(32, "", "");
        node.name = "echo-cancel-source".into();
        assert_eq!(classify(&node), Role::Internal);
        let mut node = stream_out(33, "", "");
        node.name = "alsa_playback.plugin".into();
        assert_eq!(classify(&node), Role::System);
    }

    #[test]
    fn non_audio_streams_are_not_producers() {
        let mut node = stream_out(34, "OBS", "obs");
        node.media_type = Some(crate::pipewire::MediaType::Video);
        assert_eq!(classify(&node), Role::NonProducer);
    }

    #[test]
    fn classify_sources_filters_and_annotates() {
        let mut game = stream_out(40, "game.exe", "wine64-preloader");
        game.media_name = "Audio Stream #1".into();
        let recorder_stream = stream_out(41, "Steam", "steam");
        let mut bt = stream_out(42, "Headset", "headsetd");
        bt.name = "bluez_output.headset".into();
        let snap = snapshot(
            vec![
                game,
                recorder_stream,
                bt,
                sink(43, "alsa_output.analog-stereo"),
                capture_stream(44, "Steam"),
            ],
            vec![],
            vec![],
        );

        let sources = classify_sources(&snap, "Steam", &[]);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, 40);
        assert_eq!(sources[0].role, Role::Game);
        assert_eq!(sources[0].purpose, Some("main audio"));
        assert!(sources[0].name.contains("Audio Stream #1"));
    }

    #[test]
    fn classify_sources_honors_exclusions() {
        let snap = snapshot(
            vec![
                stream_out(50, "Spotify", "spotify"),
                stream_out(51, "Firefox", "firefox"),
            ],
            vec![],
            vec![],
        );
        let excluded = vec!["Spotify".to_string()];
        let sources = classify_sources(&snap, "Steam", &excluded);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].id, 51);
    }

    #[test]
    fn stream_purpose_from_buffer_size() {
        let mut node = stream_out(60, "game.exe", "wine");
        node.media_name = "bgm".into();
        node.max_buffer = Some(32_000);
        assert_eq!(stream_purpose(&node), Some("music/ambient"));
        node.max_buffer = Some(8_000);
        assert_eq!(stream_purpose(&node), Some("UI/effects/voice/chat"));
        node.max_buffer = None;
        assert_eq!(stream_purpose(&node), Some("audio stream"));
        node.media_name = String::new();
        assert_eq!(stream_purpose(&node), None);
    }
}
