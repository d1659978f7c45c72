// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! State fingerprinting for the execution tree.
//!
//! Every input a deployment consumes — task parameters, script files,
//! backup descriptors — is folded into a running [`StateHash`]. Equal
//! hashes mean "the databases are in the same state", which is what the
//! backup cache and the resume file key on. Any platform divergence here
//! poisons the cache, so the file fold is fully canonical: forward-slash
//! relative names, a fixed separator byte, a little-endian length prefix,
//! raw content bytes.

use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

/// Width of a state hash in bytes (blake3 output).
pub const HASH_LEN: usize = 32;

/// Fixed-width fingerprint of everything consumed up to a point.
///
/// Ordering and equality are byte-wise. The hex form is lowercase and is
/// the on-disk representation (cache file names, resume file).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateHash([u8; HASH_LEN]);

impl StateHash {
    /// The fingerprint of zero bytes of input.
    pub fn empty() -> Self {
        Self(*blake3::hash(b"").as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;

        let mut out = String::with_capacity(HASH_LEN * 2);
        for byte in self.0 {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }

    /// Parse the lowercase-hex form. Uppercase digits are accepted;
    /// anything else (wrong length, non-hex) is `InvalidHash`.
    pub fn parse_hex(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.len() != HASH_LEN * 2 {
            return Err(Error::InvalidHash(text.to_string()));
        }

        let mut bytes = [0u8; HASH_LEN];
        for (i, chunk) in text.as_bytes().chunks_exact(2).enumerate() {
            let pair = std::str::from_utf8(chunk)
                .map_err(|_| Error::InvalidHash(text.to_string()))?;
            bytes[i] = u8::from_str_radix(pair, 16)
                .map_err(|_| Error::InvalidHash(text.to_string()))?;
        }
        Ok(Self(bytes))
    }

    #[cfg(test)]
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex chars identify a state well enough in logs
        write!(f, "StateHash({}..)", &self.to_hex()[..8])
    }
}

/// Accumulator that folds bytes and files into a new [`StateHash`].
///
/// Seeded with the incoming hash; `finish` consumes the transformer, so
/// every exit path finalizes exactly once by construction.
pub struct HashTransformer {
    hasher: blake3::Hasher,
}

impl HashTransformer {
    pub fn new(seed: &StateHash) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(seed.as_bytes());
        Self { hasher }
    }

    /// Fold raw bytes into the running state.
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Fold a file using the canonical encoding: its relative name with
    /// `/` separators, a `0x00` separator, the content length as a
    /// little-endian u64, and the raw content. Content bytes are never
    /// normalized; the name always is.
    pub fn update_file(&mut self, relative_name: &str, path: &Path) -> Result<()> {
        let name = relative_name.replace('\\', "/");
        let content = std::fs::read(path).map_err(|e| Error::io(path, e))?;

        self.hasher.update(name.as_bytes());
        self.hasher.update(&[0u8]);
        self.hasher.update(&(content.len() as u64).to_le_bytes());
        self.hasher.update(&content);
        Ok(())
    }

    /// Finalize into the new state hash.
    pub fn finish(self) -> StateHash {
        StateHash(*self.hasher.finalize().as_bytes())
    }
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
