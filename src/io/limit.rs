//! Limit-read: deliver at most N bytes from an inner reader, then EOF
//! (§4.1). Used by the block-delta engine to treat one super block as a
//! sub-stream (`ioLimitReadNew` in the source).

use crate::buffer::Buffer;
use crate::error::{err, ErrorKind, Result};
use crate::io::IoRead;

pub struct LimitRead<R: IoRead> {
    inner: R,
    limit: u64,
    read: u64,
}

impl<R: IoRead> LimitRead<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        LimitRead { inner, limit, read: 0 }
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.read
    }

    /// Assert zero bytes remain, as the block-delta engine does before
    /// advancing to the next super block (`ioReadFlushP(.errorOnBytes=true)`).
    pub fn flush_assert_empty(&mut self) -> Result<()> {
        let mut scratch = Buffer::new(4096);
        while self.remaining() > 0 {
            scratch.used_zero();
            scratch.clear_limit();
            let want = (self.remaining() as usize).min(scratch.size());
            scratch.set_limit(want)?;
            let n = self.read(&mut scratch)?;
            if n == 0 {
                break;
            }
        }
        if self.remaining() != 0 {
            return Err(err!(ErrorKind::AssertError, "{} bytes remained unread in limit-read", self.remaining()));
        }
        Ok(())
    }
}

impl<R: IoRead> IoRead for LimitRead<R> {
    fn open(&mut self) -> Result<bool> {
        self.inner.open()
    }

    fn read(&mut self, buf: &mut Buffer) -> Result<usize> {
        if self.remaining() == 0 {
            return Ok(0);
        }
        let want = self.remaining().min(buf.remains() as u64) as usize;
        if want == 0 {
            return Ok(0);
        }
        let saved_limit = buf.limit();
        buf.set_limit(buf.used() + want)?;
        let n = self.inner.read(buf)?;
        buf.set_limit(saved_limit)?;
        self.read += n as u64;
        Ok(n)
    }

    fn eof(&self) -> bool {
        self.remaining() == 0
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
