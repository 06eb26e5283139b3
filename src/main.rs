//! Careflow demo - boots the hospital agents and runs one patient intake.
//!
//! Starts the dispatch loop, submits a `patient_intake` to the receptionist,
//! waits for the queue to settle, then prints queue statistics and any dead
//! letters. Ctrl-C stops the loop early.

use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use careflow_core::agents::{hospital_agents, RECEPTIONIST_ID};
use careflow_core::storage::InMemoryRecordStore;
use careflow_core::{Config, Delivery, Message, Orchestrator};

/// Careflow - hospital agent routing demo
#[derive(Parser, Debug)]
#[command(name = "careflow")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file (CAREFLOW_* variables override it)
    #[arg(short, long, env = "CAREFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Name of the patient to admit
    #[arg(long, default_value = "Jane Doe")]
    name: String,

    /// Date of birth (YYYY-MM-DD)
    #[arg(long, default_value = "1990-01-15")]
    dob: String,

    /// Give up waiting for the queue to settle after this many seconds
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;

    // Initialize observability
    careflow_core::observability::init_tracing_with(&config.observability);

    let orchestrator = Arc::new(Orchestrator::with_config(&config));
    let store = Arc::new(InMemoryRecordStore::new());
    for agent in hospital_agents(store.clone()) {
        orchestrator.register_agent(agent).await?;
    }
    tracing::info!(
        "Registered agents: {}",
        orchestrator.agent_ids().await.join(", ")
    );

    let handle = orchestrator.start();

    let intake = Message::new(
        "api",
        RECEPTIONIST_ID,
        "patient_intake",
        json!({"name": args.name, "dob": args.dob}),
    );
    match orchestrator.submit(intake).await? {
        Delivery::Delivered(result) => tracing::info!("Intake handled: {}", result),
        Delivery::Queued => tracing::info!("Intake queued"),
    }

    let settle = wait_for_drain(&orchestrator, config.orchestrator.idle_wait);
    tokio::select! {
        _ = settle => {}
        _ = tokio::time::sleep(Duration::from_secs(args.timeout_secs)) => {
            tracing::warn!("Queue did not settle within {}s", args.timeout_secs);
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
        }
    }

    orchestrator.stop();
    handle.await?;

    let queue = orchestrator.queue();
    println!(
        "patients registered: {}, audit entries: {}",
        store.patient_count().await,
        store.access_log_len().await
    );
    println!("{}", serde_json::to_string_pretty(&queue.stats().await)?);
    for letter in queue.dead_letters().await {
        println!("{}", serde_json::to_string(&letter)?);
    }

    Ok(())
}

/// Resolves once the buffer stays empty across two idle periods.
async fn wait_for_drain(orchestrator: &Orchestrator, idle_wait: Duration) {
    let mut quiet_rounds = 0;
    while quiet_rounds < 2 {
        tokio::time::sleep(idle_wait).await;
        if orchestrator.queue().is_empty().await {
            quiet_rounds += 1;
        } else {
            quiet_rounds = 0;
        }
    }
}
