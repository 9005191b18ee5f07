//! The `enroute` CLI (§6, §4.7): drives the core against a fixed in-memory
//! demo route or an origin/destination pair, printing Decisions as JSON.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use enroute_core::prelude::*;
use enroute_core::profile::{AgeBracket, Profile};
use enroute_core::waypoint::{Waypoint, WaypointId};

#[derive(Parser, Debug)]
#[command(name = "enroute", about = "Parallel dispatch and degradation core for route content enrichment")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dispatch content enrichment for a route.
    Run {
        #[arg(long)]
        origin: Option<String>,
        #[arg(long)]
        destination: Option<String>,
        #[arg(long, value_enum, default_value = "batch")]
        mode: Mode,
        #[arg(long, default_value = "default")]
        profile: String,
        #[arg(long, default_value = "0.5")]
        interval: f64,
        /// Ignore origin/destination and run against a fixed demo route.
        #[arg(long)]
        demo: bool,
    },
    /// Print the Orchestrator's `stats()` snapshot.
    Status,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Batch,
    Stream,
}

fn init_logging(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_new(&settings.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match &settings.log_file {
        Some(_path) => {
            // File-backed logging is left to the host's own log-rotation
            // setup; stderr is always a safe default for this illustrative CLI.
            subscriber.init();
        }
        None => subscriber.init(),
    }
}

fn profile_preset(name: &str) -> Profile {
    match name {
        "driver" => Profile { is_driver: true, ..Profile::default() },
        "family" => Profile { age_bracket: AgeBracket::Child, ..Profile::default() },
        "senior" => Profile { age_bracket: AgeBracket::Senior, ..Profile::default() },
        _ => Profile::default(),
    }
}

fn demo_route() -> Vec<Waypoint> {
    vec![
        Waypoint::new(WaypointId::new("wp-1"), 0, "1 Ancient Museum Rd", 31.77, 35.21)
            .with_location_name("Ammunition Hill Memorial"),
        Waypoint::new(WaypointId::new("wp-2"), 1, "200 Scenic Overlook Dr", 31.80, 35.22)
            .with_location_name("Mount Scopus View"),
        Waypoint::new(WaypointId::new("wp-3"), 2, "42 Festival Square", 31.78, 35.23)
            .with_location_name("Old City Theatre"),
    ]
}

fn route_from_endpoints(origin: &str, destination: &str) -> Vec<Waypoint> {
    vec![
        Waypoint::new(WaypointId::new("origin"), 0, origin, 0.0, 0.0),
        Waypoint::new(WaypointId::new("destination"), 1, destination, 0.0, 0.0),
    ]
}

async fn seed_registry(registry: &WorkerRegistry) {
    for worker in [
        std::sync::Arc::new(enroute_core::mock_worker::MockContentWorker::video("video")) as Arc<dyn Worker>,
        Arc::new(enroute_core::mock_worker::MockContentWorker::music("music")),
        Arc::new(enroute_core::mock_worker::MockContentWorker::text("text")),
    ] {
        worker.start().await.expect("mock worker always starts cleanly");
        registry.register(worker).await;
    }
}

async fn run(
    origin: Option<String>,
    destination: Option<String>,
    mode: Mode,
    profile: String,
    interval: f64,
    demo: bool,
) -> Result<(), CoreError> {
    let settings = Settings::load().map_err(|e| CoreError::Config(e.to_string()))?;
    init_logging(&settings);

    let waypoints = if demo || origin.is_none() || destination.is_none() {
        demo_route()
    } else {
        route_from_endpoints(&origin.unwrap(), &destination.unwrap())
    };

    let registry = Arc::new(WorkerRegistry::new());
    seed_registry(&registry).await;

    let orchestrator = Orchestrator::new(
        registry,
        Arc::new(CircuitBreakerRegistry::new()),
        Arc::new(EventBus::new(256)),
        Arc::new(HealthRegistry::new()),
        SelectionPolicy::new(),
        OrchestratorConfig::from_settings(&settings),
    )
    .with_telemetry(Arc::new(LoggingSink::new()));
    orchestrator.start().await?;

    let profile = Arc::new(profile_preset(&profile));

    match mode {
        Mode::Batch => {
            let decisions = orchestrator.submit_batch(waypoints, profile).await?;
            for decision in &decisions {
                print_decision(decision);
            }
        }
        Mode::Stream => {
            let count = waypoints.len();
            for waypoint in waypoints {
                orchestrator.submit(waypoint, profile.clone()).await?;
            }
            let mut seen = 0;
            while seen < count {
                match orchestrator.next_result(Duration::from_secs_f64(interval.max(0.01)) * 60).await {
                    Some(decision) => {
                        print_decision(&decision);
                        seen += 1;
                    }
                    None => break,
                }
            }
        }
    }

    orchestrator.stop().await?;
    Ok(())
}

fn print_decision(decision: &Decision) {
    let selected_kind = decision.selected.as_ref().map(|a| a.kind().to_string());
    println!(
        "{{\"waypoint_id\":\"{}\",\"selected_kind\":{},\"confidence\":{:.2},\"reasoning\":\"{}\"}}",
        decision.waypoint_id,
        selected_kind.map(|k| format!("\"{k}\"")).unwrap_or_else(|| "null".to_string()),
        decision.confidence,
        decision.reasoning.replace('"', "'"),
    );
}

fn print_status() {
    let stats = OrchestratorStats { pending: 0, active: 0, completed: 0 };
    println!(
        "{{\"pending\":{},\"active\":{},\"completed\":{},\"note\":\"no persisted run state between process invocations\"}}",
        stats.pending, stats.active, stats.completed
    );
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match cli.command {
        Command::Status => {
            print_status();
            ExitCode::from(0)
        }
        Command::Run { origin, destination, mode, profile, interval, demo } => {
            let outcome = runtime.block_on(async {
                tokio::select! {
                    result = run(origin, destination, mode, profile, interval, demo) => result.map_err(|e| (1u8, e.to_string())),
                    _ = tokio::signal::ctrl_c() => Err((130u8, "interrupted".to_string())),
                }
            });

            match outcome {
                Ok(()) => ExitCode::from(0),
                Err((code, message)) => {
                    eprintln!("enroute: {message}");
                    let code = if message.contains("configuration") || message.contains("Config") { 2 } else { code };
                    ExitCode::from(code)
                }
            }
        }
    }
}
