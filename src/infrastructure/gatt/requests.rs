//! Request Correlation
//!
//! Outgoing requests carry a 32-bit identifier derived from the clock.
//! The tracker remembers which identifiers are still awaiting a reply so
//! incoming packets can be classified as replies to our own requests or
//! as pushes originated elsewhere (the device itself, or another client
//! connected to it).

use crate::domain::settings::CollisionPolicy;
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("request id {0} collides with a pending request")]
pub struct RequestIdCollision(pub u32);

pub struct RequestTracker {
    pending: HashSet<u32>,
    policy: CollisionPolicy,
}

impl RequestTracker {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            pending: HashSet::new(),
            policy,
        }
    }

    /// Generate a fresh identifier and record it as pending.
    pub fn next_request_id(&mut self) -> Result<u32, RequestIdCollision> {
        self.claim(Self::derive_id())
    }

    fn claim(&mut self, id: u32) -> Result<u32, RequestIdCollision> {
        if self.pending.contains(&id) {
            match self.policy {
                CollisionPolicy::Replace => {
                    warn!(id, "request id collides with a pending request, replacing");
                }
                CollisionPolicy::Reject => return Err(RequestIdCollision(id)),
            }
        }
        self.pending.insert(id);
        Ok(id)
    }

    fn derive_id() -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u32)
            .unwrap_or(0)
    }

    /// Was this identifier issued here and not yet answered?
    pub fn is_pending(&self, id: u32) -> bool {
        self.pending.contains(&id)
    }

    /// Clear a pending identifier. Returns whether it was pending, so a
    /// given id resolves at most once.
    pub fn resolve(&mut self, id: u32) -> bool {
        self.pending.remove(&id)
    }

    /// Drop all pending requests, e.g. on disconnect.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
