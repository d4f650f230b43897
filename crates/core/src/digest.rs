// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content digest for actions and blobs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Content-addressed digest: hash plus blob size.
///
/// Bit-compatible with the Remote Execution API digest message; the hash
/// function is whatever the cluster is configured with and is not
/// interpreted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    pub hash: String,
    pub size_bytes: i64,
}

impl Digest {
    pub fn new(hash: impl Into<String>, size_bytes: i64) -> Self {
        Self { hash: hash.into(), size_bytes }
    }

    /// True when this is the empty digest (no hash recorded).
    pub fn is_empty(&self) -> bool {
        self.hash.is_empty()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hash, self.size_bytes)
    }
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
