//! Deterministic hashing for the per-session dictionaries and process-wide registries.

use std::collections::HashMap;
use std::hash::BuildHasher;
use twox_hash::XxHash64;

/// Builds seeded [`XxHash64`] hashers.
#[derive(Debug, Clone, Copy, Default)]
pub struct XxBuildHasher;

impl BuildHasher for XxBuildHasher {
    type Hasher = XxHash64;

    fn build_hasher(&self) -> XxHash64 {
        XxHash64::with_seed(0)
    }
}

/// A `HashMap` keyed with [`XxBuildHasher`].
pub type FastMap<K, V> = HashMap<K, V, XxBuildHasher>;

/// Creates an empty [`FastMap`].
pub fn fast_map<K, V>() -> FastMap<K, V> {
    HashMap::with_hasher(XxBuildHasher)
}
