//! Binary artifacts: the encoded, host-consumable form of a unit.
//!
//! The builder is the only writer. Hosts read artifacts through [`decode`]; the loader treats
//! them as opaque bytes.

pub mod decode;
pub mod format;

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

pub use decode::{decode, DecodeError, DecodedMember, DecodedUnit, ExternalRef, Op, PoolEntry};

/// An immutable byte sequence. Clones share the same buffer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BinaryArtifact {
    bytes: Arc<[u8]>,
}

impl BinaryArtifact {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: Arc::from(bytes.into()) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// SHA-256 of the artifact bytes as lowercase hex.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Debug for BinaryArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digest = self.digest();
        f.debug_struct("BinaryArtifact")
            .field("len", &self.len())
            .field("sha256", &&digest[..16])
            .finish()
    }
}

impl AsRef<[u8]> for BinaryArtifact {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl From<Vec<u8>> for BinaryArtifact {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}
