//! Plain data structures for chunking outbound reads and accumulating inbound
//! writes. Neither type does its own locking, both live inside a
//! [`crate::conversation::Conversation`] and are only ever touched while its
//! mutex is held.

use crate::codec::BLOCK_SIZE;
use crate::error::{Result, TftpError};

/// Largest payload `ReadBuffer` will accept: the biggest `len` whose
/// `len / BLOCK_SIZE + 1` block count still fits in a 16-bit block number.
pub const MAX_READ_SIZE: usize = (u16::MAX as usize - 1) * BLOCK_SIZE;

/// Holds a fully realized read payload and slices it into 1-based,
/// `BLOCK_SIZE`-byte blocks.
///
/// Block count is `len / BLOCK_SIZE + 1`, even when `len` is an exact
/// multiple of `BLOCK_SIZE`; the resulting empty trailing block is the
/// RFC 1350 end-of-transfer signal, not an off-by-one.
#[derive(Debug, Clone)]
pub struct ReadBuffer {
    data: Vec<u8>,
}

impl ReadBuffer {
    /// Rejects payloads whose block count would overflow a 16-bit block
    /// number instead of silently wrapping in `block_count()`.
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.len() > MAX_READ_SIZE {
            return Err(TftpError::Protocol(format!(
                "read payload of {} bytes exceeds the {} bytes addressable by 16-bit block numbers",
                data.len(),
                MAX_READ_SIZE
            )));
        }
        Ok(Self { data })
    }

    pub fn block_count(&self) -> u16 {
        (self.data.len() / BLOCK_SIZE + 1) as u16
    }

    /// Returns the bytes for 1-based block `n`. Panics if `n` is 0 or
    /// exceeds `block_count()`; callers only ever request blocks the state
    /// machine has already validated.
    pub fn block(&self, n: u16) -> &[u8] {
        assert!(n >= 1 && n <= self.block_count(), "block index out of range");
        let start = (n as usize - 1) * BLOCK_SIZE;
        let end = (start + BLOCK_SIZE).min(self.data.len());
        &self.data[start..end]
    }
}

/// Accumulates inbound DATA payloads in arrival order. The conversation only
/// ever appends in block order (out-of-order blocks are rejected before
/// reaching the buffer), so no reordering logic is needed here.
#[derive(Debug, Clone, Default)]
pub struct WriteBuffer {
    data: Vec<u8>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, payload: &[u8]) {
        self.data.extend_from_slice(payload);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
