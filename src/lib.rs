//! A port of Lamport's distributed mutual-exclusion algorithm ("Time,
//! Clocks, and the Ordering of Events in a Distributed System", Commun.
//! ACM'78) to an in-process simulation: a fixed set of peer tasks, each with
//! its own logical clock, coordinate exclusive access to a shared critical
//! section through REQUEST/ACKNOWLEDGE/RELEASE messages alone.

pub mod clock;
pub mod log;
pub mod message;
pub mod peer;
pub mod queue;
pub mod transport;

pub use peer::Peer;
pub use transport::Transport;

/// Build a transport and its peers, then run the simulation to completion.
/// Convenience entry point shared by the binary driver and the test suite.
pub async fn run_simulation(
    process_count: usize,
    duration: u64,
) -> anyhow::Result<std::sync::Arc<Transport>> {
    anyhow::ensure!(process_count >= 2, "process_count must be at least 2");
    anyhow::ensure!(duration > 0, "duration must be positive");
    anyhow::ensure!(
        process_count <= message::PeerId::MAX as usize + 1,
        "process_count exceeds the peer id range"
    );
    let (transport, peers) = transport::build(process_count, duration);
    Transport::run(peers).await?;
    Ok(transport)
}
