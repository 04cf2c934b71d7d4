//! Fragment Reassembly
//!
//! BLE notifications are small, so a long message announces its total
//! length up front and arrives in chunks. The assembler accumulates them
//! and releases the complete payload exactly once. While one assembly is
//! pending, every incoming chunk belongs to it; the caller must not try
//! to parse chunks as packet headers.

use super::wire::WireError;

/// Accumulates the chunks of one announced-length message.
#[derive(Debug)]
pub struct MessageAssembler {
    expected: usize,
    buffer: Vec<u8>,
    delivered: bool,
}

impl MessageAssembler {
    /// Start an assembly from the announced total length and whatever
    /// followed the header in the first notification.
    pub fn new(expected: usize, first_chunk: &[u8]) -> Result<Self, WireError> {
        if first_chunk.len() > expected {
            return Err(WireError::BufferOverflow {
                expected,
                got: first_chunk.len(),
            });
        }
        let mut buffer = Vec::with_capacity(expected);
        buffer.extend_from_slice(first_chunk);
        Ok(Self {
            expected,
            buffer,
            delivered: false,
        })
    }

    /// Append one continuation chunk. Appending past the announced length,
    /// or after the payload was taken, is an error.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), WireError> {
        if self.delivered || self.buffer.len() + chunk.len() > self.expected {
            return Err(WireError::BufferOverflow {
                expected: self.expected,
                got: self.buffer.len() + chunk.len(),
            });
        }
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        !self.delivered && self.buffer.len() == self.expected
    }

    /// Hand out the assembled payload once it is complete. Subsequent
    /// calls return `None`.
    pub fn take_complete(&mut self) -> Option<Vec<u8>> {
        if self.is_complete() {
            self.delivered = true;
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }
}
