// SPDX-License-Identifier: PMPL-1.0-or-later

//! Command fingerprints used as ledger keys

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 of a command string, rendered as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn fingerprint(command: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}
