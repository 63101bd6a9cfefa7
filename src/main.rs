//! capturebay — route selected application audio straight into a
//! recorder's capture input on PipeWire, leaving playback untouched.

mod config;
mod pipewire;
mod router;
#[cfg(test)]
mod testutil;

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};

use crate::config::{ConfigStore, Profile, Settings};
use crate::pipewire::{ObjectId, PwEvent};
use crate::router::{ApplyReport, ClassifiedNode, RouteError, Router};

#[derive(Parser)]
#[command(
    name = "capturebay",
    version,
    about = "Route selected application audio into a recorder's capture input on PipeWire"
)]
struct Cli {
    /// Recording application to route into (overrides the configured one)
    #[arg(long, global = true)]
    capture_app: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List selectable audio sources with their classification
    Sources,
    /// Show live routes into the recorder's capture input
    Routes,
    /// Route exactly the given sources (or a saved profile) to the recorder
    Apply {
        /// Node ids from `capturebay sources`
        ids: Vec<ObjectId>,
        /// Resolve a saved profile instead of passing ids
        #[arg(long, conflicts_with = "ids")]
        profile: Option<String>,
    },
    /// Stop capturing everything; playback is untouched
    Clear,
    /// Reconnect the playback sink to the recorder (default wiring)
    Restore,
    /// Poll for new sources and keep routing applied until interrupted
    Watch,
    /// Manage saved routing profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Save the given source ids as a named profile
    Save { name: String, ids: Vec<ObjectId> },
    /// List saved profiles
    List,
    /// Delete a saved profile
    Delete { name: String },
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let store = ConfigStore::open();
    let mut settings = match &store {
        Some(store) => {
            let settings = store.load_settings();
            // First run: materialize the defaults so there is a file to edit.
            if !store.has_settings()
                && let Err(e) = store.save_settings(&settings)
            {
                log::debug!("Could not write default settings: {}", e);
            }
            settings
        }
        None => Settings::default(),
    };
    if let Some(app) = cli.capture_app.clone() {
        settings.capture_app = app;
    }

    // Profile file management needs no audio server.
    if let Command::Profile { action } = &cli.command
        && !matches!(action, ProfileAction::Save { .. })
    {
        return match run_profile_files(&store, action) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("{}", e);
                ExitCode::FAILURE
            }
        };
    }

    // Create shared graph state and start the PipeWire thread.
    let graph = pipewire::GraphState::new();
    let handle = pipewire::start(graph.clone(), 100);
    let router = Router::new(
        graph,
        handle.commands.clone(),
        handle.status.clone(),
        settings,
    );

    let result = match cli.command {
        Command::Sources => cmd_sources(&router),
        Command::Routes => cmd_routes(&router),
        Command::Apply { ids, profile } => cmd_apply(&router, &store, ids, profile),
        Command::Clear => cmd_clear(&router),
        Command::Restore => cmd_restore(&router),
        Command::Watch => cmd_watch(&router, &handle.events),
        Command::Profile { action } => cmd_profile_save(&router, &store, action),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn cmd_sources(router: &Router) -> Result<(), Box<dyn Error>> {
    let sources = router.list_sources()?;
    if sources.is_empty() {
        println!("No selectable audio sources.");
        return Ok(());
    }
    println!("{:>6}  {:<14}  SOURCE", "ID", "CATEGORY");
    for s in &sources {
        let purpose = s.purpose.map(|p| format!("  [{p}]")).unwrap_or_default();
        println!("{:>6}  {:<14}  {}{}", s.id, s.role.label(), s.name, purpose);
    }
    Ok(())
}

fn cmd_routes(router: &Router) -> Result<(), Box<dyn Error>> {
    match router.list_active_routes() {
        Ok(routes) if routes.is_empty() => {
            println!("No active routes into the capture target.");
        }
        Ok(routes) => {
            println!("{:>6}  {:>6}  {:<14}  {:<4}  SOURCE", "LINK", "NODE", "CATEGORY", "CH");
            for r in &routes {
                println!(
                    "{:>6}  {:>6}  {:<14}  {:<4}  {}",
                    r.link_id,
                    r.source,
                    r.role.label(),
                    r.channel.as_deref().unwrap_or("-"),
                    r.source_name
                );
            }
        }
        // Recorder not capturing is a status, not an error.
        Err(RouteError::CaptureTargetNotFound(app)) => {
            println!("{app} is not capturing right now.");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn cmd_apply(
    router: &Router,
    store: &Option<ConfigStore>,
    ids: Vec<ObjectId>,
    profile: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let selection = match profile {
        Some(name) => {
            let store = store.as_ref().ok_or("no config directory available")?;
            let profile = store
                .load_profile(&name)
                .ok_or_else(|| format!("profile {name:?} not found"))?;
            let sources = router.list_sources()?;
            let ids = profile.resolve(&sources);
            if ids.is_empty() {
                println!("Profile {:?} matches no running source.", profile.name);
                return Ok(());
            }
            ids
        }
        None => ids,
    };

    let report = router.apply_routing(&selection)?;
    print_report(&report);
    if report.is_success() {
        Ok(())
    } else {
        Err("some mutations failed".into())
    }
}

fn cmd_clear(router: &Router) -> Result<(), Box<dyn Error>> {
    let report = router.clear_routing()?;
    print_report(&report);
    if report.is_success() {
        Ok(())
    } else {
        Err("some mutations failed".into())
    }
}

fn cmd_restore(router: &Router) -> Result<(), Box<dyn Error>> {
    let report = router.restore_default()?;
    print_report(&report);
    if report.is_success() {
        Ok(())
    } else {
        Err("restoring default wiring failed".into())
    }
}

fn cmd_watch(
    router: &Router,
    events: &std::sync::mpsc::Receiver<PwEvent>,
) -> Result<(), Box<dyn Error>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let shutdown = shutdown.clone();
        move || {
            log::info!("Shutting down");
            shutdown.store(true, Ordering::Relaxed);
        }
    })?;

    log::info!("Watching for audio sources (Ctrl+C to stop)");
    router.watch(events, &shutdown);
    Ok(())
}

fn cmd_profile_save(
    router: &Router,
    store: &Option<ConfigStore>,
    action: ProfileAction,
) -> Result<(), Box<dyn Error>> {
    let ProfileAction::Save { name, ids } = action else {
        unreachable!("file-only actions handled before connecting");
    };
    let store = store.as_ref().ok_or("no config directory available")?;

    let sources = router.list_sources()?;
    let picked: Vec<&ClassifiedNode> = sources.iter().filter(|s| ids.contains(&s.id)).collect();
    for id in &ids {
        if !picked.iter().any(|s| s.id == *id) {
            log::warn!("Source {} is not selectable right now; skipped", id);
        }
    }
    if picked.is_empty() {
        return Err("no matching sources to save".into());
    }

    let profile = Profile::from_sources(name.clone(), picked);
    store.save_profile(&profile)?;
    println!(
        "Saved profile {:?} with {} source key(s).",
        name,
        profile.sources.len()
    );
    Ok(())
}

fn run_profile_files(
    store: &Option<ConfigStore>,
    action: &ProfileAction,
) -> Result<(), Box<dyn Error>> {
    let store = store.as_ref().ok_or("no config directory available")?;
    match action {
        ProfileAction::List => {
            let names = store.list_profiles();
            if names.is_empty() {
                println!("No saved profiles.");
            } else {
                for name in names {
                    println!("{name}");
                }
            }
        }
        ProfileAction::Delete { name } => {
            if store.delete_profile(name) {
                println!("Deleted profile {name:?}.");
            } else {
                return Err(format!("profile {name:?} not found").into());
            }
        }
        ProfileAction::Save { .. } => unreachable!("save needs the source list"),
    }
    Ok(())
}

fn print_report(report: &ApplyReport) {
    for d in &report.dropped {
        println!("Dropped source {}: {}", d.id, d.reason);
    }
    for (mutation, err) in report.failures() {
        println!("Failed: {} ({})", mutation, err);
    }
    println!("{}", report.summary());
}
