//! Per-peer bookkeeping: ids, handshake state, request tracking and the
//! in-flight handler gate.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::warn;

/// Identifies a connected peer by its socket address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    /// Derive a peer id from the remote address.
    pub fn from_addr(addr: &SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handshake and session state for one peer.
#[derive(Debug, Default)]
pub struct PeerState {
    /// We received the peer's `version`.
    pub saw_version: bool,
    /// We received the peer's `verack` for our `version`.
    pub saw_verack: bool,
    /// The peer's claimed node id, once seen.
    pub node_id: Option<String>,
    /// Tip carried by the peer's version, surfaced once the handshake
    /// completes.
    pub version_tip: Option<(u64, String)>,
    /// Messages received this session.
    pub messages_received: u64,
}

impl PeerState {
    /// Both handshake halves observed.
    pub fn handshake_complete(&self) -> bool {
        self.saw_version && self.saw_verack
    }
}

/// Size-bounded, TTL-aged table of outstanding `getBlock` requests.
pub struct RequestTracker {
    capacity: usize,
    ttl: Duration,
    pending: HashMap<String, Instant>,
}

impl RequestTracker {
    /// Tracker holding at most `capacity` requests for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            pending: HashMap::new(),
        }
    }

    /// Record a request. Returns false when the hash is already pending or
    /// the table is full after pruning.
    pub fn insert(&mut self, hash_hex: &str) -> bool {
        self.prune();
        if self.pending.contains_key(hash_hex) || self.pending.len() >= self.capacity {
            return false;
        }
        self.pending.insert(hash_hex.to_string(), Instant::now());
        true
    }

    /// Clear a request once the block arrives. Returns whether it was
    /// pending.
    pub fn clear(&mut self, hash_hex: &str) -> bool {
        self.pending.remove(hash_hex).is_some()
    }

    /// Whether a request is outstanding.
    pub fn contains(&self, hash_hex: &str) -> bool {
        self.pending.contains_key(hash_hex)
    }

    /// Outstanding request count (after aging).
    pub fn len(&mut self) -> usize {
        self.prune();
        self.pending.len()
    }

    /// Whether no requests are outstanding.
    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    fn prune(&mut self) {
        let ttl = self.ttl;
        self.pending.retain(|_, at| at.elapsed() < ttl);
    }
}

/// Bounds concurrently running async message handlers.
///
/// When the gate is saturated a new handler is dropped with a log line
/// instead of queueing unbounded work; the peer stays connected.
#[derive(Clone)]
pub struct HandlerGate {
    semaphore: Arc<Semaphore>,
}

impl HandlerGate {
    /// Gate admitting up to `limit` concurrent handlers.
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
        }
    }

    /// Try to start a handler; the returned permit is held for its
    /// lifetime. `None` means the handler must be dropped.
    pub fn try_start(&self, what: &str) -> Option<OwnedSemaphorePermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(TryAcquireError::NoPermits) => {
                warn!(handler = what, "handler limit reached, dropping");
                None
            }
            Err(TryAcquireError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_completion() {
        let mut state = PeerState::default();
        assert!(!state.handshake_complete());
        state.saw_version = true;
        assert!(!state.handshake_complete());
        state.saw_verack = true;
        assert!(state.handshake_complete());
    }

    #[test]
    fn test_tracker_capacity() {
        let mut tracker = RequestTracker::new(2, Duration::from_secs(60));
        assert!(tracker.insert("aa"));
        assert!(tracker.insert("bb"));
        assert!(!tracker.insert("cc"), "table is full");
        assert!(!tracker.insert("aa"), "already pending");
    }

    #[test]
    fn test_tracker_clear() {
        let mut tracker = RequestTracker::new(4, Duration::from_secs(60));
        tracker.insert("aa");
        assert!(tracker.contains("aa"));
        assert!(tracker.clear("aa"));
        assert!(!tracker.clear("aa"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_tracker_ages_out() {
        let mut tracker = RequestTracker::new(4, Duration::from_millis(0));
        tracker.insert("aa");
        // Zero TTL: pruned on the next touch.
        assert_eq!(tracker.len(), 0);
        assert!(tracker.insert("aa"), "expired entry frees the slot");
    }

    #[test]
    fn test_gate_limits_and_releases() {
        let gate = HandlerGate::new(1);
        let permit = gate.try_start("block").expect("first permit");
        assert!(gate.try_start("block").is_none(), "gate saturated");
        drop(permit);
        assert!(gate.try_start("block").is_some(), "permit released");
    }
}
