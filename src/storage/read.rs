//! Storage read side: a lazy, seekable-by-offset/limit byte stream with a
//! filter group attached before open (§3 "Storage read").

use std::fs::File;
use std::io::{Read as StdRead, Seek, SeekFrom};

use crate::buffer::Buffer;
use crate::error::Result;
use crate::io::IoRead;

enum Source {
    File(File),
    Bytes(std::io::Cursor<Vec<u8>>),
}

/// A concrete byte source for a storage read. Once opened it is a one-shot
/// forward reader ending at EOF (§3).
pub struct StorageRead {
    source: Source,
    remaining: Option<u64>,
    eof: bool,
}

impl StorageRead {
    pub fn from_file(mut file: File, offset: u64, limit: Option<u64>) -> Result<Self> {
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        Ok(StorageRead { source: Source::File(file), remaining: limit, eof: false })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        StorageRead { source: Source::Bytes(std::io::Cursor::new(data)), remaining: None, eof: false }
    }
}

impl IoRead for StorageRead {
    fn open(&mut self) -> Result<bool> {
        Ok(true)
    }

    fn read(&mut self, buf: &mut Buffer) -> Result<usize> {
        if self.eof {
            return Ok(0);
        }
        let want = match self.remaining {
            Some(r) if r == 0 => {
                self.eof = true;
                return Ok(0);
            }
            Some(r) => buf.remains().min(r as usize),
            None => buf.remains(),
        };
        if want == 0 {
            return Ok(0);
        }

        let n = match &mut self.source {
            Source::File(f) => f.read(&mut buf.writable_mut()[..want])?,
            Source::Bytes(c) => c.read(&mut buf.writable_mut()[..want])?,
        };

        buf.inc_used(n)?;
        if let Some(r) = self.remaining.as_mut() {
            *r -= n as u64;
        }
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    fn eof(&self) -> bool {
        self.eof
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
