use crate::message::PeerId;

/// One peer's view of who is waiting for the critical section, ordered by
/// extended Lamport time: `(timestamp, peer_id)` lexicographically, which
/// `Vec<(u64, PeerId)>`'s derived tuple `Ord` already gives us for free.
/// At most one entry per peer id is ever present.
#[derive(Debug, Default)]
pub struct RequestQueue {
    entries: Vec<(u64, PeerId)>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer's outstanding request at its sorted position.
    pub fn insert(&mut self, peer_id: PeerId, timestamp: u64) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.contains(peer_id),
            "peer {peer_id} already has an outstanding request"
        );
        let key = (timestamp, peer_id);
        let index = self.entries.binary_search(&key).unwrap_or_else(|index| index);
        self.entries.insert(index, key);
        Ok(())
    }

    /// The peer currently permitted to enter the critical section once all
    /// acknowledgements are in, if any request is outstanding.
    pub fn head(&self) -> Option<(u64, PeerId)> {
        self.entries.first().copied()
    }

    /// Remove the head entry, asserting that `peer_id` is indeed the head.
    /// A mismatch means a RELEASE arrived out of the order its REQUEST
    /// established, which falsifies the algorithm's correctness premise.
    pub fn pop_head(&mut self, peer_id: PeerId) -> anyhow::Result<()> {
        let Some(&(_, head_id)) = self.entries.first() else {
            anyhow::bail!("release from peer {peer_id} but the request queue is empty");
        };
        anyhow::ensure!(
            head_id == peer_id,
            "release from peer {peer_id} but queue head is peer {head_id}"
        );
        self.entries.remove(0);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, peer_id: PeerId) -> bool {
        self.entries.iter().any(|&(_, id)| id == peer_id)
    }
}
