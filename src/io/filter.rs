//! Filter trait and the group that chains filters onto a reader.
//!
//! The source's filter objects hold back-pointers into their owning group
//! for error reporting and result lookup (§9 "Cyclic references"); here a
//! filter's result is looked up by index into the group that owns it
//! instead, avoiding a pointer graph.

use crate::buffer::Buffer;
use crate::error::Result;
use crate::io::IoRead;

/// One transform stage. `process_in` feeds it `input` bytes (`None` at
/// EOF); `process_out` is how a transform with internal buffering (e.g. a
/// streaming decompressor) flushes output produced from previously-fed
/// input.
pub trait Filter {
    /// Feed the next chunk (or `None` at source EOF) and get back any bytes
    /// the filter can produce immediately, plus whether the filter itself
    /// is now done (will produce nothing more).
    fn process(&mut self, input: Option<&[u8]>) -> Result<(Vec<u8>, bool)>;

    /// A named result value readable after the filter is done (hash
    /// digests, total byte counts). Most filters have none.
    fn result(&self, _key: &str) -> Option<String> {
        None
    }
}

/// Wraps an `IoRead` source with an ordered chain of filters.
/// `source -> filter[0] -> filter[1] -> ... -> consumer` (§4.1).
pub struct FilterGroup<R: IoRead> {
    source: R,
    filters: Vec<Box<dyn Filter>>,
    pending: Vec<u8>,
    source_eof: bool,
    done: bool,
}

impl<R: IoRead> FilterGroup<R> {
    pub fn new(source: R) -> Self {
        FilterGroup { source, filters: Vec::new(), pending: Vec::new(), source_eof: false, done: false }
    }

    pub fn add(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn result(&self, index: usize, key: &str) -> Option<String> {
        self.filters.get(index).and_then(|f| f.result(key))
    }

    fn pull_source(&mut self) -> Result<Vec<u8>> {
        if self.source_eof {
            return Ok(Vec::new());
        }
        let mut buf = Buffer::new(64 * 1024);
        let n = self.source.read(&mut buf)?;
        if n == 0 {
            self.source_eof = true;
        }
        Ok(buf.as_slice().to_vec())
    }
}

impl<R: IoRead> IoRead for FilterGroup<R> {
    fn open(&mut self) -> Result<bool> {
        self.source.open()
    }

    fn read(&mut self, buf: &mut Buffer) -> Result<usize> {
        if !self.pending.is_empty() {
            let n = self.pending.len().min(buf.remains());
            buf.writable_mut()[..n].copy_from_slice(&self.pending[..n]);
            buf.inc_used(n)?;
            self.pending.drain(..n);
            return Ok(n);
        }
        if self.done {
            return Ok(0);
        }

        let chunk = self.pull_source()?;
        let input = if chunk.is_empty() { None } else { Some(chunk.as_slice()) };

        // Feed the chunk through every filter stage in order.
        let mut data = match input {
            Some(c) => c.to_vec(),
            None => Vec::new(),
        };
        let mut source_is_eof = input.is_none();
        let mut all_done = true;
        for filter in self.filters.iter_mut() {
            let stage_input = if source_is_eof && data.is_empty() { None } else { Some(data.as_slice()) };
            let (out, stage_done) = filter.process(stage_input)?;
            data = out;
            all_done = all_done && stage_done;
            source_is_eof = source_is_eof; // propagate EOF signal unchanged
        }

        if source_is_eof && all_done {
            self.done = true;
        }

        self.pending = data;
        if self.pending.is_empty() {
            if self.done {
                return Ok(0);
            }
            // No output yet but not done (filter buffering internally); try again.
            return self.read(buf);
        }
        self.read(buf)
    }

    fn eof(&self) -> bool {
        self.done && self.pending.is_empty()
    }

    fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}
