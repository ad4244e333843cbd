//! Owned byte buffer with `used`/`limit`/`size` cursors (§3).
//!
//! Invariant: `used <= limit <= size` holds before and after every operation
//! (§8 invariant 1). Producers fill `[used, limit)`; consumers read up to
//! `used`.

use crate::error::{err, ErrorKind, Result};

#[derive(Debug, Clone)]
pub struct Buffer {
    data: Vec<u8>,
    used: usize,
    limit: Option<usize>,
}

impl Buffer {
    /// New buffer with the given capacity, fully writable.
    pub fn new(size: usize) -> Self {
        Buffer { data: vec![0u8; size], used: 0, limit: Some(size) }
    }

    /// Wrap existing bytes as a fully-used, read-only buffer.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Buffer { data, used: len, limit: Some(len) }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or_else(|| self.data.len())
    }

    pub fn remains(&self) -> usize {
        self.limit() - self.used
    }

    /// Bytes currently valid for reading: `[0, used)`.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.used]
    }

    /// Writable region producers may fill: `[used, limit)`.
    pub fn writable_mut(&mut self) -> &mut [u8] {
        let limit = self.limit();
        &mut self.data[self.used..limit]
    }

    /// Cap further writes at `limit <= size`.
    pub fn set_limit(&mut self, limit: usize) -> Result<()> {
        if limit > self.data.len() {
            return Err(err!(ErrorKind::AssertError, "limit {} exceeds buffer size {}", limit, self.data.len()));
        }
        if limit < self.used {
            return Err(err!(ErrorKind::AssertError, "limit {} below used {}", limit, self.used));
        }
        self.limit = Some(limit);
        Ok(())
    }

    pub fn clear_limit(&mut self) {
        self.limit = Some(self.data.len());
    }

    /// Record that `n` more bytes were filled into the writable region.
    pub fn inc_used(&mut self, n: usize) -> Result<()> {
        let new_used = self.used + n;
        if new_used > self.limit() {
            return Err(err!(ErrorKind::AssertError, "used {} would exceed limit {}", new_used, self.limit()));
        }
        self.used = new_used;
        Ok(())
    }

    /// Reset `used` to zero without touching capacity or limit.
    pub fn used_zero(&mut self) {
        self.used = 0;
    }

    /// Append bytes, growing capacity if needed (used for growable buffers
    /// such as the ini renderer's output).
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.truncate(self.used);
        self.data.extend_from_slice(bytes);
        self.used = self.data.len();
        self.limit = Some(self.data.len());
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.used);
        self.data
    }
}
