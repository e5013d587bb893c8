use serde::{Deserialize, Serialize};

/// Peer identifiers are small and dense: `0..process_count`.
pub type PeerId = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    Request,
    Acknowledge,
    Release,
    RunCommand,
}

impl Kind {
    pub fn is_broadcast(self) -> bool {
        matches!(self, Kind::Request | Kind::Release)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Request => "REQUEST",
            Kind::Acknowledge => "ACKNOWLEDGE",
            Kind::Release => "RELEASE",
            Kind::RunCommand => "RUN_COMMAND",
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a message is headed: a concrete peer for unicast kinds, or the
/// broadcast sentinel for REQUEST/RELEASE. The transport never rewrites this
/// field during fan-out; instead it pairs the (still broadcast-tagged)
/// template with a separate per-receiver `Delivery` record, see module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    Broadcast,
    Peer(PeerId),
}

/// A message as its sender constructs it. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub kind: Kind,
    pub sender_id: PeerId,
    pub receiver: Receiver,
    pub timestamp: u64,
}

impl Message {
    pub fn request(sender_id: PeerId, timestamp: u64) -> Self {
        Self {
            kind: Kind::Request,
            sender_id,
            receiver: Receiver::Broadcast,
            timestamp,
        }
    }

    pub fn release(sender_id: PeerId, timestamp: u64) -> Self {
        Self {
            kind: Kind::Release,
            sender_id,
            receiver: Receiver::Broadcast,
            timestamp,
        }
    }

    pub fn acknowledge(sender_id: PeerId, receiver_id: PeerId, timestamp: u64) -> Self {
        Self {
            kind: Kind::Acknowledge,
            sender_id,
            receiver: Receiver::Peer(receiver_id),
            timestamp,
        }
    }

    pub fn run_command(sender_id: PeerId, receiver_id: PeerId, timestamp: u64) -> Self {
        Self {
            kind: Kind::RunCommand,
            sender_id,
            receiver: Receiver::Peer(receiver_id),
            timestamp,
        }
    }

    /// Sender id in range, and the receiver shape matches the message kind.
    pub fn validate(&self, process_count: usize) -> anyhow::Result<()> {
        anyhow::ensure!(
            (self.sender_id as usize) < process_count,
            "sender id {} out of range (process_count = {process_count})",
            self.sender_id
        );
        match (self.kind, self.receiver) {
            (Kind::Request | Kind::Release, Receiver::Broadcast) => Ok(()),
            (Kind::Acknowledge | Kind::RunCommand, Receiver::Peer(id)) => {
                anyhow::ensure!(
                    (id as usize) < process_count,
                    "receiver id {id} out of range (process_count = {process_count})"
                );
                Ok(())
            }
            _ => anyhow::bail!(
                "invalid receiver {:?} for message kind {:?}",
                self.receiver,
                self.kind
            ),
        }
    }
}

/// The concrete record that travels through a peer's inbox and lands in the
/// transport's audit log: one per broadcast fan-out copy, or the single
/// unicast delivery for ACKNOWLEDGE/RUN_COMMAND. Replaces the source's
/// trick of rewriting a broadcast message's receiver field in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub kind: Kind,
    pub sender_id: PeerId,
    pub receiver_id: PeerId,
    pub timestamp: u64,
}

impl Delivery {
    /// The extended Lamport order key: timestamp first, sender id as the
    /// tie-break. Shared by the request queue and the audit log.
    pub fn order_key(&self) -> (u64, PeerId) {
        (self.timestamp, self.sender_id)
    }
}
