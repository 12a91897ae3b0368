//! Merkle-style content hashes of live trees and snapshots
//!
//! Both generations hash the same fields, so a live subtree that was just
//! snapshotted (or restored) hashes exactly like the snapshot it mirrors.
//!
//! ## Node digest
//!
//! ```text
//! H(node) = SHA-256(live_id | title | label | folder flag | H(child_1) .. H(child_n))
//! ```
//!
//! Live nodes contribute the label of the version they derive from, without
//! the checked-out marker. Unversionable live children are not part of any
//! snapshot and are skipped.

use crate::collections::{id_set, IdSet};
use crate::error::{Result, SnapshotError};
use crate::snapshot::Snapshot;
use crate::store::VersionedTreeStore;
use crate::transaction::Transaction;
use crate::types::{LiveId, VersionId, VersionLabel};
use sha2::{Digest, Sha256};

/// Incremental digest of one node
#[derive(Debug, Clone, Default)]
pub struct NodeHashBuilder {
    hasher: Sha256,
}

impl NodeHashBuilder {
    /// Start a digest for the node's own fields
    pub fn new(live_id: &LiveId, title: &str, label: Option<VersionLabel>, folder: bool) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(live_id.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(title.as_bytes());
        hasher.update([0u8]);
        if let Some(label) = label {
            hasher.update(label.major.to_le_bytes());
            hasher.update(label.minor.to_le_bytes());
        }
        hasher.update([folder as u8]);
        Self { hasher }
    }

    /// Fold in the next child's hash, in order
    pub fn child(&mut self, child_hash: &str) {
        self.hasher.update(child_hash.as_bytes());
    }

    /// Hex-encoded digest
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Content hash of the live subtree rooted at `root`
pub fn live_tree_hash<S: VersionedTreeStore + ?Sized>(
    tx: &Transaction<'_, S>,
    root: &LiveId,
) -> Result<String> {
    let mut path = id_set();
    live_hash(tx, root, &mut path)
}

fn live_hash<S: VersionedTreeStore + ?Sized>(
    tx: &Transaction<'_, S>,
    id: &LiveId,
    path: &mut IdSet<LiveId>,
) -> Result<String> {
    if !path.insert(id.clone()) {
        return Err(SnapshotError::invariant(format!("cycle through live node {}", id)));
    }
    let store = tx.store();
    let node = store.live_node(tx.token(), id)?;
    let mut builder = NodeHashBuilder::new(
        &node.id,
        node.title().unwrap_or_default(),
        node.base_label,
        node.is_folder(),
    );
    for child_id in node.children() {
        if !store.live_node(tx.token(), child_id)?.versionable {
            continue;
        }
        builder.child(&live_hash(tx, child_id, path)?);
    }
    path.remove(id);
    Ok(builder.finish())
}

/// Content hash of a snapshot subtree
pub fn snapshot_tree_hash<S: VersionedTreeStore + ?Sized>(snapshot: &Snapshot<'_, S>) -> Result<String> {
    let mut path = id_set();
    snapshot_hash(snapshot, &mut path)
}

fn snapshot_hash<S: VersionedTreeStore + ?Sized>(
    snapshot: &Snapshot<'_, S>,
    path: &mut IdSet<VersionId>,
) -> Result<String> {
    if !path.insert(snapshot.id().clone()) {
        return Err(SnapshotError::invariant(format!(
            "cycle through version {}",
            snapshot.id()
        )));
    }
    let node = snapshot.document();
    let mut builder = NodeHashBuilder::new(
        &node.live_id,
        snapshot.title(),
        Some(node.label),
        node.is_folder(),
    );
    for child in snapshot.children() {
        builder.child(&snapshot_hash(&child?, path)?);
    }
    path.remove(snapshot.id());
    Ok(builder.finish())
}
