//! rtcs soak runner.
//!
//! # Usage
//!
//! ```bash
//! # Fault-free run, every invariant must hold
//! rtcs-soak --seed 7 --rounds 5000
//!
//! # Fault injection, only fault-tolerant invariants are enforced
//! rtcs-soak --seed 7 --failure-rate 0.05
//! ```

use std::sync::Arc;

use clap::Parser;
use rtcs_core::StoreConfig;
use rtcs_harness::{InvariantRegistry, SimEnv, StoreSnapshot, WorkloadConfig, workload};
use rtcs_storage::{ChaoticStore, EphemeralStore, MemoryStore, PersistentStore};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Seeded soak test of the rtcs storage layer
#[derive(Parser, Debug)]
#[command(name = "rtcs-soak")]
#[command(about = "Drive rtcs storage with a seeded workload and check invariants")]
#[command(version)]
struct Args {
    /// RNG seed for the workload, identifiers and fault injection
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Guests created before the workload starts
    #[arg(long, default_value_t = 16)]
    users: usize,

    /// Rooms the guests move between
    #[arg(long, default_value_t = 4)]
    rooms: usize,

    /// Operations to run
    #[arg(long, default_value_t = 2000)]
    rounds: usize,

    /// Probability that a single verb fails (0.0 to 1.0)
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Chat history window per room
    #[arg(long, default_value_t = 20)]
    history_length: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    if !(0.0..=1.0).contains(&args.failure_rate) {
        return Err(
            format!("failure rate must be between 0.0 and 1.0, got {}", args.failure_rate).into()
        );
    }

    let config = Arc::new(StoreConfig {
        history_length: Some(args.history_length),
        ..StoreConfig::default()
    });

    let env = SimEnv::with_seed(args.seed);
    let memory = MemoryStore::new(env.clone());
    let kv = ChaoticStore::with_seed(memory.clone(), args.failure_rate, args.seed);

    let persistent = PersistentStore::new(kv.clone(), env.clone(), Arc::clone(&config))?;
    let ephemeral = EphemeralStore::new(kv.clone(), env, Arc::clone(&config))?;

    tracing::info!(
        seed = args.seed,
        rounds = args.rounds,
        failure_rate = args.failure_rate,
        "soak starting"
    );

    let workload = WorkloadConfig {
        seed: args.seed,
        users: args.users,
        rooms: args.rooms,
        rounds: args.rounds,
    };
    let stats = workload::run(&persistent, &ephemeral, &workload).await?;

    tracing::info!(
        operations = stats.operations,
        verbs = kv.operation_count(),
        injected = kv.failure_count(),
        failures = stats.failures,
        partial_failures = stats.partial_failures,
        "workload complete"
    );

    if stats.token_mismatches > 0 {
        return Err(
            format!("{} released tokens returned a foreign payload", stats.token_mismatches).into()
        );
    }
    if stats.double_releases > 0 {
        return Err(format!("{} tokens released twice", stats.double_releases).into());
    }

    let registry = if stats.saw_faults() {
        InvariantRegistry::fault_tolerant()
    } else {
        InvariantRegistry::standard()
    };

    let snapshot = StoreSnapshot::capture(&memory, &config)?;
    if let Err(violations) = registry.check_all(&snapshot) {
        for violation in &violations {
            tracing::error!(%violation, "invariant violated");
        }
        return Err(format!("{} invariant violations", violations.len()).into());
    }

    tracing::info!(invariants = registry.len(), "all invariants hold");
    Ok(())
}
