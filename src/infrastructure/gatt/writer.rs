//! Coalescing Send Queue
//!
//! Serializes outgoing packets onto the transport with at most one write
//! in flight. Writes are keyed by a coalescing channel (one per target
//! control): a newer payload for a channel replaces the queued one
//! instead of appending, so a dragged slider never grows the queue and
//! only its latest value is transmitted.
//!
//! Failed sends are retried immediately up to a bounded attempt count;
//! exhausting the budget abandons that one entry. The loss is local and
//! logged, never escalated.

use super::transport::Transport;
use std::collections::VecDeque;
use tracing::{debug, error, warn};

struct PendingWrite {
    channel: String,
    payload: Vec<u8>,
    attempts: u32,
}

pub struct CoalescingWriter {
    queue: VecDeque<PendingWrite>,
    max_retries: u32,
}

impl CoalescingWriter {
    pub fn new(max_retries: u32) -> Self {
        Self {
            queue: VecDeque::new(),
            max_retries,
        }
    }

    /// Queue `payload` for `channel`. An undelivered payload for the same
    /// channel is replaced in place, keeping at most one entry per channel.
    /// Returns whether the queue was empty, i.e. transmission should start.
    pub fn enqueue(&mut self, channel: &str, payload: Vec<u8>) -> bool {
        if let Some(entry) = self.queue.iter_mut().find(|e| e.channel == channel) {
            debug!(channel, "coalescing pending write");
            entry.payload = payload;
            return false;
        }
        let was_empty = self.queue.is_empty();
        self.queue.push_back(PendingWrite {
            channel: channel.to_string(),
            payload,
            attempts: 0,
        });
        was_empty
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Abandon everything without flushing. Partially-sent data is not
    /// guaranteed delivered.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Drive the queue until it drains or an entry exhausts its retry
    /// budget. Exactly one write is in flight at any point.
    pub async fn drain<T: Transport>(&mut self, transport: &mut T) {
        while let Some(front) = self.queue.front() {
            let snapshot = front.payload.clone();
            match transport.send_bytes(&snapshot).await {
                Ok(()) => {
                    if let Some(front) = self.queue.front_mut() {
                        if front.payload == snapshot {
                            self.queue.pop_front();
                        }
                        // Otherwise the payload was replaced while the write
                        // was in flight; send the newer one before popping.
                    }
                }
                Err(err) => {
                    if let Some(front) = self.queue.front_mut() {
                        front.attempts += 1;
                        if front.attempts >= self.max_retries {
                            error!(
                                channel = %front.channel,
                                attempts = front.attempts,
                                "abandoning write after repeated transport failures"
                            );
                            self.queue.pop_front();
                            return;
                        }
                        warn!(channel = %front.channel, error = %err, "send failed, retrying");
                    }
                }
            }
        }
    }
}
