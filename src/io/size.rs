//! Terminal size filter: counts bytes that pass through (§4.1).

use crate::error::Result;
use crate::io::filter::Filter;

pub struct SizeFilter {
    total: u64,
}

impl SizeFilter {
    pub fn new() -> Self {
        SizeFilter { total: 0 }
    }
}

impl Default for SizeFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for SizeFilter {
    fn process(&mut self, input: Option<&[u8]>) -> Result<(Vec<u8>, bool)> {
        match input {
            Some(data) => {
                self.total += data.len() as u64;
                Ok((data.to_vec(), false))
            }
            None => Ok((Vec::new(), true)),
        }
    }

    fn result(&self, key: &str) -> Option<String> {
        if key == "size" {
            Some(self.total.to_string())
        } else {
            None
        }
    }
}
