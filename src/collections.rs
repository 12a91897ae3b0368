//! Id-keyed map and set aliases for the node arenas.
//!
//! With the `gxhash` feature the arenas hash ids with gxhash, otherwise they
//! fall back to the std hasher so the crate builds on CPUs without AES-NI/SSE2.

use std::collections::{HashMap, HashSet};

/// Hasher used by every id-keyed collection in the crate
#[cfg(feature = "gxhash")]
pub type IdHasher = gxhash::GxBuildHasher;

/// Hasher used by every id-keyed collection in the crate
#[cfg(not(feature = "gxhash"))]
pub type IdHasher = std::hash::RandomState;

/// Map keyed by node or version id
pub type IdMap<K, V> = HashMap<K, V, IdHasher>;

/// Set of node or version ids
pub type IdSet<T> = HashSet<T, IdHasher>;

/// Create an empty [`IdMap`]
pub fn id_map<K, V>() -> IdMap<K, V> {
    HashMap::with_hasher(IdHasher::default())
}

/// Create an empty [`IdSet`]
pub fn id_set<T>() -> IdSet<T> {
    HashSet::with_hasher(IdHasher::default())
}
