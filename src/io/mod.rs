//! Buffer & filter pipeline (§4.1) — the spine every byte travels through.
//!
//! `IoRead`/`IoWrite` are the two end capabilities; a `FilterGroup` sits
//! between a source/sink and its consumer, composing transforms
//! left-to-right. Filters are strictly single-threaded (§4.1
//! "Concurrency"): one buffer flows through at a time, so none of these
//! traits require `Send`/`Sync`.

pub mod filter;
pub mod hash;
pub mod limit;
pub mod size;

use crate::buffer::Buffer;
use crate::error::Result;

pub use filter::{Filter, FilterGroup};
pub use hash::HashFilter;
pub use limit::LimitRead;
pub use size::SizeFilter;

/// A byte source. `read` appends to `buf`'s writable region and returns how
/// many bytes were appended; `eof` is sticky once true.
pub trait IoRead {
    fn open(&mut self) -> Result<bool>;
    fn read(&mut self, buf: &mut Buffer) -> Result<usize>;
    fn eof(&self) -> bool;
    fn close(&mut self) -> Result<()>;

    /// Read exactly `buf.remains()` bytes or until EOF, looping over short
    /// reads. Used by the block-delta engine to pull one block-sized chunk.
    fn read_full(&mut self, buf: &mut Buffer) -> Result<usize> {
        let mut total = 0;
        while buf.remains() > 0 && !self.eof() {
            let n = self.read(buf)?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }
}

/// A byte sink. `close` is the single durability barrier (§3 Storage write).
pub trait IoWrite {
    fn open(&mut self) -> Result<()>;
    fn write(&mut self, buf: &Buffer) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}
