use std::path::PathBuf;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Run Lamport's distributed mutual-exclusion protocol as an in-process
/// simulation of `process_count` peers until the logical-clock time horizon
/// `duration` is reached.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Number of peer processes participating in the simulation.
    #[arg(long, default_value_t = 4)]
    process_count: usize,

    /// Logical-clock time horizon; the simulation stops once any sent
    /// message's timestamp reaches this value.
    #[arg(long, default_value_t = 100)]
    duration: u64,

    #[arg(long, default_value = "messageLog.csv")]
    message_log: PathBuf,

    #[arg(long, default_value = "criticalSectionLog.txt")]
    critical_section_log: PathBuf,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let transport = lamport_mutex::run_simulation(args.process_count, args.duration).await?;

    if let Err(err) = lamport_mutex::log::write_message_log(&args.message_log, &transport.sorted_audit_log()) {
        warn!("failed to write message log: {err:#}");
    }
    if let Err(err) = lamport_mutex::log::write_critical_section_log(
        &args.critical_section_log,
        &transport.critical_section_log(),
    ) {
        warn!("failed to write critical section log: {err:#}");
    }

    Ok(())
}
