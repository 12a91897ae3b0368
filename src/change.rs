//! Per-node change detection
//!
//! [`ChangeDetector`] answers one question: did this node's own content
//! change since the version it derives from? Children are never inspected
//! here; the builder compares child lists separately with
//! [`child_lists_differ`].

use crate::node::{LiveNode, VersionNode};
use crate::store::VersionedTreeStore;
use crate::types::{ChildRef, PropertyMap};
use tracing::trace;

/// Compares a live node against its last version using store-defined equality
pub struct ChangeDetector<'s, S: VersionedTreeStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: VersionedTreeStore + ?Sized> ChangeDetector<'s, S> {
    /// Create a detector delegating property equality to `store`
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Whether `live`'s own properties differ from `previous`
    ///
    /// A node without a previous version always counts as changed.
    pub fn has_own_content_changed(&self, live: &LiveNode, previous: Option<&VersionNode>) -> bool {
        let Some(previous) = previous else {
            trace!("{} has no previous version", live.id.short());
            return true;
        };
        let changed = !self
            .store
            .properties_equal(&live.properties, &previous.properties);
        if changed {
            trace!(
                "{} changed keys: {:?}",
                live.id.short(),
                changed_keys(&live.properties, &previous.properties)
            );
        }
        changed
    }
}

/// Whether two ordered `(version id, label)` lists differ in length, order,
/// ids or labels
pub fn child_lists_differ(current: &[ChildRef], previous: &[ChildRef]) -> bool {
    current != previous
}

/// Keys added, removed or modified between two property maps, sorted
pub fn changed_keys<'a>(live: &'a PropertyMap, frozen: &'a PropertyMap) -> Vec<&'a str> {
    let mut keys: Vec<&str> = live
        .iter()
        .filter(|(k, v)| frozen.get(*k) != Some(*v))
        .map(|(k, _)| k.as_str())
        .chain(
            frozen
                .keys()
                .filter(|k| !live.contains_key(*k))
                .map(String::as_str),
        )
        .collect();
    keys.sort_unstable();
    keys
}
