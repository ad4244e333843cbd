//! Terminal hash filter: accumulates a digest over everything that passes
//! through, readable by key at close (§4.1 "Hash and size filters").

use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::Xxh3;

use crate::error::Result;
use crate::io::filter::Filter;

pub enum HashAlgorithm {
    Sha256,
    Xxh3,
}

enum State {
    Sha256(Sha256),
    Xxh3(Xxh3),
}

pub struct HashFilter {
    state: State,
    digest_hex: Option<String>,
}

impl HashFilter {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => State::Sha256(Sha256::new()),
            HashAlgorithm::Xxh3 => State::Xxh3(Xxh3::new()),
        };
        HashFilter { state, digest_hex: None }
    }
}

impl Filter for HashFilter {
    fn process(&mut self, input: Option<&[u8]>) -> Result<(Vec<u8>, bool)> {
        match input {
            Some(data) => {
                match &mut self.state {
                    State::Sha256(h) => h.update(data),
                    State::Xxh3(h) => h.update(data),
                }
                Ok((data.to_vec(), false))
            }
            None => {
                if self.digest_hex.is_none() {
                    let hex = match &self.state {
                        State::Sha256(h) => hex::encode(h.clone().finalize()),
                        State::Xxh3(h) => hex::encode(h.digest128().to_be_bytes()),
                    };
                    self.digest_hex = Some(hex);
                }
                Ok((Vec::new(), true))
            }
        }
    }

    fn result(&self, key: &str) -> Option<String> {
        if key == "hash" {
            self.digest_hex.clone()
        } else {
            None
        }
    }
}
