//! Digest computation for downloaded artifacts.
//!
//! Attestations declare artifact digests keyed by algorithm name
//! (`{"sha256": "<hex>"}`). These helpers hash local files the same way so
//! the two can be compared.

use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use crate::{CotError, Result};

/// Hash algorithm named in an attestation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex-encoded digest.
    pub fn hex_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha512 => 128,
        }
    }

    /// True if `digest` is well-formed hex for this algorithm.
    pub fn is_well_formed(&self, digest: &str) -> bool {
        digest.len() == self.hex_len() && digest.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = CotError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            other => Err(CotError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Compute the hex digest of a file.
///
/// Reads the file in 8 KiB chunks to avoid loading large artifacts into memory.
pub fn file_digest(path: impl AsRef<Path>, algorithm: DigestAlgorithm) -> Result<String> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| CotError::io(path, e))?;
    match algorithm {
        DigestAlgorithm::Sha256 => hash_reader::<Sha256>(&mut file, path),
        DigestAlgorithm::Sha512 => hash_reader::<Sha512>(&mut file, path),
    }
}

fn hash_reader<D: Digest>(reader: &mut impl Read, path: &Path) -> Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).map_err(|e| CotError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compute the hex digest of a byte slice.
pub fn bytes_digest(data: &[u8], algorithm: DigestAlgorithm) -> String {
    match algorithm {
        DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
    }
}
