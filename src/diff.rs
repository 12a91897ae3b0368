//! Differences between two snapshots
//!
//! Nodes are paired by live id across both flattened snapshots, so a node
//! that moved to another folder counts as bumped or unchanged rather than
//! removed and added.
//!
//! ## Examples
//!
//! ```rust
//! use treesnap::{in_transaction, BumpPolicy, MemoryStore, NodeTemplate, SnapshotDiff, Snapshotable, SnapshotableNode, VersionedTreeStore};
//!
//! # fn main() -> treesnap::Result<()> {
//! let store = MemoryStore::new();
//! let root = in_transaction(&store, |tx| store.create_root(tx.token(), NodeTemplate::folder("root")))?;
//! let node = SnapshotableNode::new(&store, root.clone())?;
//! let before = node.create_snapshot(BumpPolicy::Minor)?;
//!
//! in_transaction(&store, |tx| store.create_live_child(tx.token(), &root, NodeTemplate::leaf("new")))?;
//! let after = node.create_snapshot(BumpPolicy::Minor)?;
//!
//! let diff = SnapshotDiff::between(&before, &after)?;
//! assert_eq!(diff.stats.added, 1);
//! assert_eq!(diff.stats.bumped, 1);
//! # Ok(())
//! # }
//! ```

use crate::collections::{id_map, IdMap};
use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::store::VersionedTreeStore;
use crate::types::{LiveId, VersionId, VersionLabel};
use serde::{Deserialize, Serialize};

/// One node's presence in the compared snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// Live node
    pub live_id: LiveId,
    /// Title in the newer snapshot, or the older one if removed
    pub title: String,
    /// Label in the older snapshot
    pub old_label: Option<VersionLabel>,
    /// Label in the newer snapshot
    pub new_label: Option<VersionLabel>,
}

/// Counts per category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStats {
    /// Nodes only in the newer snapshot
    pub added: usize,
    /// Nodes only in the older snapshot
    pub removed: usize,
    /// Nodes present in both with a different version
    pub bumped: usize,
    /// Nodes sharing the same version
    pub unchanged: usize,
}

impl ChangeStats {
    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.removed > 0 || self.bumped > 0
    }

    /// Nodes added, removed or bumped
    pub fn total_changes(&self) -> usize {
        self.added + self.removed + self.bumped
    }
}

/// Node-by-node comparison of two snapshots of the same root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// Root version of the older snapshot
    pub from_version: VersionId,
    /// Root version of the newer snapshot
    pub to_version: VersionId,
    /// In newer order
    pub added: Vec<DiffEntry>,
    /// In older order
    pub removed: Vec<DiffEntry>,
    /// In newer order
    pub bumped: Vec<DiffEntry>,
    /// In newer order
    pub unchanged: Vec<DiffEntry>,
    /// Counts
    pub stats: ChangeStats,
}

struct Seen {
    version: VersionId,
    label: VersionLabel,
    title: String,
}

impl SnapshotDiff {
    /// Compare `old` against `new`
    pub fn between<S: VersionedTreeStore + ?Sized>(old: &Snapshot<'_, S>, new: &Snapshot<'_, S>) -> Result<Self> {
        let mut old_nodes: IdMap<LiveId, Seen> = id_map();
        let mut old_order = Vec::new();
        for snapshot in old.flat_tree() {
            let snapshot = snapshot?;
            old_order.push(snapshot.live_id().clone());
            old_nodes.insert(
                snapshot.live_id().clone(),
                Seen {
                    version: snapshot.id().clone(),
                    label: snapshot.label(),
                    title: snapshot.title().to_string(),
                },
            );
        }

        let mut diff = SnapshotDiff {
            from_version: old.id().clone(),
            to_version: new.id().clone(),
            added: Vec::new(),
            removed: Vec::new(),
            bumped: Vec::new(),
            unchanged: Vec::new(),
            stats: ChangeStats::default(),
        };

        for snapshot in new.flat_tree() {
            let snapshot = snapshot?;
            let previous = old_nodes.remove(snapshot.live_id());
            let entry = DiffEntry {
                live_id: snapshot.live_id().clone(),
                title: snapshot.title().to_string(),
                old_label: previous.as_ref().map(|p| p.label),
                new_label: Some(snapshot.label()),
            };
            match previous {
                None => diff.added.push(entry),
                Some(p) if &p.version == snapshot.id() => diff.unchanged.push(entry),
                Some(_) => diff.bumped.push(entry),
            }
        }

        for live_id in old_order {
            if let Some(seen) = old_nodes.remove(&live_id) {
                diff.removed.push(DiffEntry {
                    live_id,
                    title: seen.title,
                    old_label: Some(seen.label),
                    new_label: None,
                });
            }
        }

        diff.stats = ChangeStats {
            added: diff.added.len(),
            removed: diff.removed.len(),
            bumped: diff.bumped.len(),
            unchanged: diff.unchanged.len(),
        };
        Ok(diff)
    }
}
