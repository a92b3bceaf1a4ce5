//! Depth User Tracker CLI
//!
//! Replays recorded sensor sessions and inspects tracker state.

use anyhow::Context;
use clap::{Parser, Subcommand};
use depth_user_tracker::{
    activity::{create_shared_log_with_persistence, ActivityStats},
    config::Config,
    connect_with_retry,
    gesture::{Gesture, HandlerTable},
    sensor::{JointKind, SimulationScript},
    tracking::{CalibrationStore, LifecycleEvent, User, UserHandlerTable},
    TrackingSession, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "depth-tracker")]
#[command(version = VERSION)]
#[command(about = "User lifecycle and gesture dispatch for depth sensors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded sensor session
    Replay {
        /// Path to the JSON replay script
        script: PathBuf,

        /// Use this calibration file instead of the configured one
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Start with gesture dispatch disabled
        #[arg(long)]
        no_gestures: bool,
    },

    /// List skeleton joints and their sensor ids
    Joints,

    /// Show persisted activity statistics
    Status,

    /// Show configuration
    Config,

    /// Delete the shared calibration file
    ResetCalibration,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            script,
            calibration,
            no_gestures,
        } => cmd_replay(&script, calibration, no_gestures),
        Commands::Joints => {
            cmd_joints();
            Ok(())
        }
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Config => cmd_config(),
        Commands::ResetCalibration => cmd_reset_calibration(),
    }
}

fn cmd_replay(
    script_path: &Path,
    calibration: Option<PathBuf>,
    no_gestures: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load().unwrap_or_default();
    if let Some(path) = calibration {
        config.calibration_path = path;
    }
    if no_gestures {
        config.detect_gestures = false;
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let script = SimulationScript::load(script_path)
        .with_context(|| format!("Could not load script {}", script_path.display()))?;

    println!("Depth Tracker v{VERSION}");
    println!();
    println!("Replaying {} frames from {:?}", script.frames.len(), script_path);
    println!("  Calibration file: {:?}", config.calibration_path);
    println!("  Tick interval: {}ms", config.tick_interval.as_millis());
    println!(
        "  Gestures: {}",
        if config.detect_gestures {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let activity = create_shared_log_with_persistence(config.activity_path());

    // Every handler named by the script just prints what it receives
    let handlers = Arc::new(HandlerTable::new());
    for listener in &script.listeners {
        let name = listener.handler.clone();
        handlers.register(listener.handler.clone(), move |g: &Gesture| {
            println!(
                "[{name}] {} {:.0}% from ({:.0}, {:.0}, {:.0}) to ({:.0}, {:.0}, {:.0})",
                g.name,
                g.progress,
                g.start_position.x,
                g.start_position.y,
                g.start_position.z,
                g.end_position.x,
                g.end_position.y,
                g.end_position.z
            );
        });
    }

    let user_handlers = Arc::new(UserHandlerTable::new());
    for name in [&config.user_found_handler, &config.user_lost_handler]
        .into_iter()
        .flatten()
    {
        let label = name.clone();
        user_handlers.register(name.clone(), move |user: &User| {
            println!("[{label}] user {} ({})", user.id(), user.state());
        });
    }

    let sensor = Arc::new(connect_with_retry(&config.bootstrap, || Ok(script.sensor()))?);
    let mut session =
        TrackingSession::new(sensor.clone(), &config, handlers, activity.clone())?;
    session.set_user_handlers(user_handlers);

    for listener in &script.listeners {
        if let Err(e) = session.add_listener(&listener.gesture, &listener.handler) {
            warn!("Skipping listener: {e}");
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    for frame in &script.frames {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        frame.apply(&sensor);
        session.update()?;

        while let Some(event) = session.users().try_recv() {
            print_lifecycle_event(&event);
        }

        thread::sleep(config.tick_interval);
    }

    println!();
    println!("Stopping replay...");
    for user in session.users().users() {
        println!("  User {}: {}", user.id(), user.state());
    }
    session.dispose();

    if let Err(e) = activity.save() {
        eprintln!("Warning: Could not save activity log: {e}");
    }

    println!();
    println!("{}", activity.summary());
    Ok(())
}

fn print_lifecycle_event(event: &LifecycleEvent) {
    let id = event.user().id();
    match event {
        LifecycleEvent::PoseDetected { pose, .. } => {
            println!("User {id}: pose '{pose}' detected");
        }
        LifecycleEvent::CalibrationEnded { failed, .. } => println!(
            "User {id}: calibration {}",
            if *failed { "failed" } else { "succeeded" }
        ),
        _ => println!("User {id}: {} ({})", event.name(), event.user().state()),
    }
}

fn cmd_joints() {
    println!("Skeleton Joints");
    println!("===============");
    println!();
    for kind in JointKind::ALL {
        println!("  {:>2}  {}", kind.raw(), kind.name());
    }
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Depth Tracker Status");
    println!("====================");
    println!();

    let calibration = CalibrationStore::new(config.calibration_path.clone());
    println!(
        "Saved calibration: {}",
        if calibration.exists() {
            "present"
        } else {
            "none"
        }
    );
    println!("  Path: {:?}", calibration.path());
    println!();

    let activity_path = config.activity_path();
    if activity_path.exists() {
        match ActivityStats::load(&activity_path) {
            Ok(stats) => println!("{}", stats.summary()),
            Err(e) => eprintln!("Could not read activity log: {e}"),
        }
    } else {
        println!("No activity recorded yet.");
    }
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_reset_calibration() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let calibration = CalibrationStore::new(config.calibration_path);

    if calibration.clear()? {
        println!("Removed {:?}", calibration.path());
    } else {
        println!("No saved calibration at {:?}", calibration.path());
    }
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
