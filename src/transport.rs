use std::sync::{
    atomic::{AtomicBool, AtomicI64, Ordering},
    Mutex,
};

use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
};
use tracing::info;

use crate::{
    message::{Delivery, Message, PeerId, Receiver},
    peer::Peer,
};

/// One entry of the critical-section operations log.
#[derive(Debug, Clone, Copy)]
pub struct CsRecord {
    pub operation: usize,
    pub peer_id: PeerId,
    pub before: i64,
    pub after: i64,
}

/// A peer's registered inbox, as seen by the transport: enough to deliver a
/// message and to trip its `stopped` signal. Delivery may come from any
/// task; it only ever performs a channel send, so no further synchronisation
/// is needed on this side. `stopped` is a `watch` sender so the peer's `run`
/// loop can suspend on the signal rather than poll it.
pub struct PeerHandle {
    sender: mpsc::UnboundedSender<Delivery>,
    stopped: watch::Sender<bool>,
}

impl PeerHandle {
    fn deliver(&self, delivery: Delivery) -> anyhow::Result<()> {
        self.sender
            .send(delivery)
            .map_err(|_| anyhow::anyhow!("inbox of peer {} is closed", delivery.receiver_id))
    }

    fn stop(&self) {
        let _ = self.stopped.send(true);
    }
}

pub(crate) fn new_inbox() -> (
    mpsc::UnboundedSender<Delivery>,
    mpsc::UnboundedReceiver<Delivery>,
    watch::Sender<bool>,
    watch::Receiver<bool>,
) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let (stop_sender, stop_receiver) = watch::channel(false);
    (sender, receiver, stop_sender, stop_receiver)
}

/// Fan-out/unicast dispatcher, peer registry and simulation lifecycle. The
/// transport is a trivial delivery layer by design: the algorithm's
/// correctness lives entirely in the peers, not here.
pub struct Transport {
    process_count: usize,
    duration: u64,
    peers: Mutex<Vec<PeerHandle>>,
    audit_log: Mutex<Vec<Delivery>>,
    cs_log: Mutex<Vec<CsRecord>>,
    cs_occupied: AtomicBool,
    shared_value: AtomicI64,
}

impl Transport {
    pub fn new(process_count: usize, duration: u64) -> Self {
        Self {
            process_count,
            duration,
            peers: Mutex::new(Vec::with_capacity(process_count)),
            audit_log: Mutex::new(Vec::new()),
            cs_log: Mutex::new(Vec::new()),
            cs_occupied: AtomicBool::new(false),
            shared_value: AtomicI64::new(0),
        }
    }

    pub fn process_count(&self) -> usize {
        self.process_count
    }

    /// Register a peer's inbox. Must happen for every peer before any peer's
    /// `run` loop starts, otherwise an early broadcast could be fanned out
    /// against a registry that doesn't yet contain every peer.
    pub(crate) fn register(&self, handle: PeerHandle) {
        self.peers.lock().unwrap().push(handle);
    }

    /// Deliver `message`, gated by the time horizon: any message whose
    /// timestamp has reached `duration` stops every peer and is itself
    /// dropped, which is how the simulation terminates. The gate runs before
    /// validation, since once the horizon is reached the run is ending
    /// regardless of whether the message itself is well-formed.
    pub fn send(&self, message: Message) -> anyhow::Result<()> {
        if message.timestamp >= self.duration {
            self.stop_all();
            return Ok(());
        }
        message.validate(self.process_count)?;
        let peers = self.peers.lock().unwrap();
        match message.receiver {
            Receiver::Peer(receiver_id) => self.deliver_and_audit(
                &peers,
                Delivery {
                    kind: message.kind,
                    sender_id: message.sender_id,
                    receiver_id,
                    timestamp: message.timestamp,
                },
            ),
            Receiver::Broadcast => {
                for receiver_id in 0..peers.len() as PeerId {
                    if receiver_id == message.sender_id {
                        continue;
                    }
                    self.deliver_and_audit(
                        &peers,
                        Delivery {
                            kind: message.kind,
                            sender_id: message.sender_id,
                            receiver_id,
                            timestamp: message.timestamp,
                        },
                    )?
                }
                Ok(())
            }
        }
    }

    fn deliver_and_audit(&self, peers: &[PeerHandle], delivery: Delivery) -> anyhow::Result<()> {
        let target = peers
            .get(delivery.receiver_id as usize)
            .ok_or_else(|| anyhow::anyhow!("no peer registered for id {}", delivery.receiver_id))?;
        target.deliver(delivery)?;
        self.audit_log.lock().unwrap().push(delivery);
        info!(
            "Time {}: Process {} send {}",
            delivery.timestamp, delivery.sender_id, delivery.kind
        );
        Ok(())
    }

    fn stop_all(&self) {
        for handle in self.peers.lock().unwrap().iter() {
            handle.stop()
        }
    }

    /// The hook peers call to do work under mutual exclusion. Correctness of
    /// the protocol is exactly the claim that no two peers are ever inside
    /// this call at once; `cs_occupied` asserts that claim rather than
    /// enforcing it with a lock.
    pub fn critical_section(&self, peer_id: PeerId) -> CsRecord {
        let was_occupied = self.cs_occupied.swap(true, Ordering::AcqRel);
        assert!(
            !was_occupied,
            "mutual exclusion violated: peer {peer_id} entered while another peer was inside"
        );
        let before = self.shared_value.load(Ordering::Acquire);
        let after = if peer_id % 2 == 0 { before + 1 } else { before - 1 };
        self.shared_value.store(after, Ordering::Release);
        let record = {
            let mut cs_log = self.cs_log.lock().unwrap();
            let record = CsRecord {
                operation: cs_log.len() + 1,
                peer_id,
                before,
                after,
            };
            cs_log.push(record);
            record
        };
        self.cs_occupied.store(false, Ordering::Release);
        record
    }

    /// The audit log sorted by extended Lamport order, ready to hand to the
    /// message log writer.
    pub fn sorted_audit_log(&self) -> Vec<Delivery> {
        let mut log = self.audit_log.lock().unwrap().clone();
        log.sort_by_key(Delivery::order_key);
        log
    }

    pub fn critical_section_log(&self) -> Vec<CsRecord> {
        self.cs_log.lock().unwrap().clone()
    }

    /// Start every peer loop concurrently and wait for all of them to exit,
    /// returning each peer's final request queue size in completion order.
    pub async fn run(peers: Vec<Peer>) -> anyhow::Result<Vec<usize>> {
        let mut join_set = JoinSet::new();
        for peer in peers {
            join_set.spawn(peer.run());
        }
        let mut final_queue_sizes = Vec::new();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(size)) => final_queue_sizes.push(size),
                Ok(Err(err)) => return Err(err),
                Err(join_err) => return Err(anyhow::anyhow!(join_err)),
            }
        }
        Ok(final_queue_sizes)
    }
}

/// Build a transport and its N peers, with every peer already registered in
/// the transport's registry before any of them starts running.
pub fn build(process_count: usize, duration: u64) -> (std::sync::Arc<Transport>, Vec<Peer>) {
    let transport = std::sync::Arc::new(Transport::new(process_count, duration));
    let mut peers = Vec::with_capacity(process_count);
    for id in 0..process_count as PeerId {
        let (sender, inbox, stop_sender, stop_receiver) = new_inbox();
        transport.register(PeerHandle { sender, stopped: stop_sender });
        peers.push(Peer::new(id, process_count, inbox, stop_receiver, transport.clone()));
    }
    (transport, peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_section_alternates_by_parity() {
        let transport = Transport::new(2, 100);
        let a = transport.critical_section(0);
        assert_eq!((a.before, a.after), (0, 1));
        let b = transport.critical_section(1);
        assert_eq!((b.before, b.after), (1, 0));
    }

    #[test]
    #[should_panic(expected = "mutual exclusion violated")]
    fn reentrant_critical_section_panics() {
        let transport = Transport::new(2, 100);
        transport.cs_occupied.store(true, Ordering::Release);
        transport.critical_section(0);
    }

    #[test]
    fn send_past_duration_stops_every_registered_peer() {
        let transport = Transport::new(2, 10);
        let (sender, _inbox, stop_sender, stop_receiver) = new_inbox();
        transport.register(PeerHandle { sender, stopped: stop_sender });
        transport.send(Message::request(0, 10)).unwrap();
        assert!(*stop_receiver.borrow());
    }

    #[test]
    fn time_horizon_gate_absorbs_an_invalid_message_without_erroring() {
        // the gate must run before validation: once the horizon is crossed
        // the run is ending regardless of whether the message is well-formed
        let transport = Transport::new(2, 10);
        let out_of_range_sender = Message::request(9, 10);
        transport.send(out_of_range_sender).unwrap();
    }
}
