//! Index keys and build entries.
//!
//! Keys order by bucket hash first, then fingerprint. The bucket hash picks
//! the region of the key space a probe lands in, the fingerprint verifies the
//! candidate; a lookup only succeeds when both match.

/// Key of the upper-fence sentinel leaf that terminates every index.
pub const SENTINEL_KEY: IndexKey = IndexKey::new(u64::MAX, u64::MAX);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey {
    pub bucket_hash: u64,
    pub fingerprint: u64,
}

impl IndexKey {
    pub const fn new(bucket_hash: u64, fingerprint: u64) -> Self {
        Self {
            bucket_hash,
            fingerprint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub key: IndexKey,
    pub offset: u64,
}

impl Entry {
    pub fn new(bucket_hash: u64, fingerprint: u64, offset: u64) -> Self {
        Self {
            key: IndexKey::new(bucket_hash, fingerprint),
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_order_by_bucket_then_fingerprint() {
        assert!(IndexKey::new(1, 9) < IndexKey::new(2, 0));
        assert!(IndexKey::new(2, 0) < IndexKey::new(2, 1));
        assert!(IndexKey::new(u64::MAX, u64::MAX - 1) < SENTINEL_KEY);
    }
}
