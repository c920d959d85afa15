use std::fmt;

use sha2::{Digest, Sha256};

/// 256-bit content hash of a bucket or of the whole bucket list.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketHash(pub [u8; 32]);

impl BucketHash {
    pub fn from_digest(digest: Sha256) -> Self {
        BucketHash(digest.finalize().into())
    }

    /// Hash of the empty entry stream, the well-known hash of the empty
    /// bucket.
    pub fn empty() -> Self {
        Self::from_digest(Sha256::new())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BucketHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for BucketHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketHash({})", hex::encode(&self.0[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_hash_is_sha256_of_nothing() {
        assert_eq!(
            BucketHash::empty().to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn display_is_lowercase_hex() {
        let hash = BucketHash([0xab; 32]);
        assert_eq!(hash.to_string(), "ab".repeat(32));
    }
}
