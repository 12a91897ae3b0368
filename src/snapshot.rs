//! Snapshot handles and the snapshot capability
//!
//! A [`Snapshot`] is a thin handle over one version node plus the store it
//! lives in. Children are resolved lazily from the store each time they are
//! iterated, so a handle is cheap to clone and never goes stale: version
//! nodes are immutable.
//!
//! [`Snapshotable`] is the capability of a live node to be snapshotted.
//! [`SnapshotableNode`] implements it for any versionable live node.
//!
//! ## Example
//!
//! ```rust
//! use treesnap::{in_transaction, BumpPolicy, MemoryStore, NodeTemplate, Snapshotable, SnapshotableNode, VersionedTreeStore};
//!
//! # fn main() -> treesnap::Result<()> {
//! let store = MemoryStore::new();
//! let root = in_transaction(&store, |tx| {
//!     let root = store.create_root(tx.token(), NodeTemplate::folder("root"))?;
//!     store.create_live_child(tx.token(), &root, NodeTemplate::leaf("readme"))?;
//!     Ok(root)
//! })?;
//!
//! let node = SnapshotableNode::new(&store, root)?;
//! let snapshot = node.create_snapshot(BumpPolicy::Minor)?;
//! assert_eq!(snapshot.label().to_string(), "0.1");
//! assert_eq!(snapshot.flat_tree().count(), 2);
//! # Ok(())
//! # }
//! ```

use crate::builder::SnapshotBuilder;
use crate::collections::{id_set, IdSet};
use crate::config::SnapshotConfig;
use crate::error::{Result, SnapshotError};
use crate::node::{LiveNode, VersionNode};
use crate::restore::RestoreEngine;
use crate::store::VersionedTreeStore;
use crate::transaction::{in_transaction, Transaction};
use crate::types::{BumpPolicy, LiveId, RestoreStats, SnapshotStats, VersionId, VersionLabel};
use tracing::info;

/// Immutable navigation handle over a version node
pub struct Snapshot<'s, S: VersionedTreeStore + ?Sized> {
    store: &'s S,
    node: VersionNode,
}

impl<S: VersionedTreeStore + ?Sized> Clone for Snapshot<'_, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            node: self.node.clone(),
        }
    }
}

impl<S: VersionedTreeStore + ?Sized> std::fmt::Debug for Snapshot<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("version", &self.node.id)
            .field("live_id", &self.node.live_id)
            .field("label", &self.node.label)
            .finish()
    }
}

impl<'s, S: VersionedTreeStore + ?Sized> Snapshot<'s, S> {
    /// Open the snapshot rooted at version `id`
    pub fn open(store: &'s S, id: &VersionId) -> Result<Self> {
        Ok(Self {
            store,
            node: store.version_node(id)?,
        })
    }

    /// Version node id
    pub fn id(&self) -> &VersionId {
        &self.node.id
    }

    /// The wrapped version node
    pub fn document(&self) -> &VersionNode {
        &self.node
    }

    /// Version label
    pub fn label(&self) -> VersionLabel {
        self.node.label
    }

    /// Originating live node
    pub fn live_id(&self) -> &LiveId {
        &self.node.live_id
    }

    /// Frozen title, empty when unset
    pub fn title(&self) -> &str {
        self.node.title().unwrap_or_default()
    }

    /// Store the snapshot reads from
    pub fn store(&self) -> &'s S {
        self.store
    }

    /// Lazily resolved child snapshots, in recorded order
    ///
    /// Empty for leaves. Each item is a store read and may fail.
    pub fn children(&self) -> Children<'s, S> {
        Children {
            store: self.store,
            ids: self.node.children().to_vec(),
            next: 0,
        }
    }

    /// Pre-order traversal of the whole subtree, starting with `self`
    ///
    /// Yields an [`SnapshotError::InvariantViolation`] and stops if a
    /// version node is reached twice on one path.
    pub fn flat_tree(&self) -> FlatTree<'s, S> {
        FlatTree {
            stack: vec![Frame::Node(self.clone())],
            path: id_set(),
            failed: false,
        }
    }

    /// Deterministic serialization of the subtree
    ///
    /// Each node renders as `"title"@label#version_id`, folders followed by
    /// their children in parentheses. Equal version trees render equally.
    pub fn to_canonical_string(&self) -> Result<String> {
        let mut out = String::new();
        let mut path = id_set();
        self.write_canonical(&mut out, &mut path)?;
        Ok(out)
    }

    fn write_canonical(&self, out: &mut String, path: &mut IdSet<VersionId>) -> Result<()> {
        if !path.insert(self.node.id.clone()) {
            return Err(SnapshotError::invariant(format!(
                "cycle through version {}",
                self.node.id
            )));
        }
        out.push_str(&format!("{:?}@{}#{}", self.title(), self.node.label, self.node.id));
        if self.node.is_folder() {
            out.push('(');
            for (i, child) in self.children().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                child?.write_canonical(out, path)?;
            }
            out.push(')');
        }
        path.remove(&self.node.id);
        Ok(())
    }

    /// Find the snapshot of `live_id` within this subtree
    pub fn find(&self, live_id: &LiveId) -> Result<Option<Snapshot<'s, S>>> {
        for snapshot in self.flat_tree() {
            let snapshot = snapshot?;
            if snapshot.live_id() == live_id {
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }

    /// Restore this snapshot's live counterpart to the generation labelled
    /// `label` in its own history
    ///
    /// Runs in its own transaction: either the whole subtree is restored or
    /// nothing changes.
    pub fn restore(&self, label: &VersionLabel) -> Result<LiveNode> {
        self.restore_with(label, &SnapshotConfig::default())
            .map(|(node, _)| node)
    }

    /// [`Snapshot::restore`] with an explicit config, also returning stats
    pub fn restore_with(
        &self,
        label: &VersionLabel,
        config: &SnapshotConfig,
    ) -> Result<(LiveNode, RestoreStats)> {
        in_transaction(self.store, |tx| {
            let mut engine = RestoreEngine::new(tx, config);
            let node = engine.restore_label(self.live_id(), label)?;
            Ok((node, engine.stats().clone()))
        })
    }
}

/// Lazy iterator over a snapshot's children
pub struct Children<'s, S: VersionedTreeStore + ?Sized> {
    store: &'s S,
    ids: Vec<VersionId>,
    next: usize,
}

impl<S: VersionedTreeStore + ?Sized> Clone for Children<'_, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            ids: self.ids.clone(),
            next: self.next,
        }
    }
}

impl<'s, S: VersionedTreeStore + ?Sized> Iterator for Children<'s, S> {
    type Item = Result<Snapshot<'s, S>>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.get(self.next)?;
        self.next += 1;
        Some(Snapshot::open(self.store, id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ids.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl<S: VersionedTreeStore + ?Sized> ExactSizeIterator for Children<'_, S> {}

enum Frame<'s, S: VersionedTreeStore + ?Sized> {
    Node(Snapshot<'s, S>),
    Leave(VersionId),
}

/// Pre-order iterator over a snapshot subtree
pub struct FlatTree<'s, S: VersionedTreeStore + ?Sized> {
    stack: Vec<Frame<'s, S>>,
    path: IdSet<VersionId>,
    failed: bool,
}

impl<'s, S: VersionedTreeStore + ?Sized> Iterator for FlatTree<'s, S> {
    type Item = Result<Snapshot<'s, S>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let snapshot = match self.stack.pop()? {
                Frame::Leave(id) => {
                    self.path.remove(&id);
                    continue;
                }
                Frame::Node(snapshot) => snapshot,
            };

            if !self.path.insert(snapshot.id().clone()) {
                self.failed = true;
                return Some(Err(SnapshotError::invariant(format!(
                    "cycle through version {}",
                    snapshot.id()
                ))));
            }
            self.stack.push(Frame::Leave(snapshot.id().clone()));

            let children: Result<Vec<_>> = snapshot.children().collect();
            match children {
                Ok(children) => {
                    self.stack
                        .extend(children.into_iter().rev().map(Frame::Node));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
            return Some(Ok(snapshot));
        }
    }
}

impl<S: VersionedTreeStore + ?Sized> std::iter::FusedIterator for FlatTree<'_, S> {}

/// Capability of a live node to produce snapshots of its subtree
pub trait Snapshotable {
    /// Store backing the snapshots
    type Store: VersionedTreeStore + ?Sized;

    /// Snapshot the subtree, bumping changed nodes with `policy`
    fn create_snapshot(&self, policy: BumpPolicy) -> Result<Snapshot<'_, Self::Store>>;
}

/// A versionable live node paired with the store holding it
#[derive(Debug)]
pub struct SnapshotableNode<'s, S: VersionedTreeStore + ?Sized> {
    store: &'s S,
    live_id: LiveId,
    config: SnapshotConfig,
}

impl<'s, S: VersionedTreeStore + ?Sized> SnapshotableNode<'s, S> {
    /// Wrap `live_id`, checking that it exists and is versionable
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::NotFound`] if the node does not exist
    /// - [`SnapshotError::SchemaMismatch`] if it lacks the versioning capability
    pub fn new(store: &'s S, live_id: LiveId) -> Result<Self> {
        let node = in_transaction(store, |tx| {
            if !store.live_exists(tx.token(), &live_id)? {
                return Err(SnapshotError::not_found(format!("live node {}", live_id)));
            }
            store.live_node(tx.token(), &live_id)
        })?;
        if !node.versionable {
            return Err(SnapshotError::schema(format!(
                "{} is not versionable",
                live_id
            )));
        }
        Ok(Self {
            store,
            live_id,
            config: SnapshotConfig::default(),
        })
    }

    /// Use `config` for snapshots and restores
    pub fn with_config(mut self, config: SnapshotConfig) -> Self {
        self.config = config;
        self
    }

    /// Wrapped live id
    pub fn live_id(&self) -> &LiveId {
        &self.live_id
    }

    /// Snapshot with the configured default bump policy
    pub fn snapshot(&self) -> Result<Snapshot<'s, S>> {
        self.create_snapshot_with_stats(self.config.default_bump_policy)
            .map(|(snapshot, _)| snapshot)
    }

    /// Snapshot and report what the builder did
    pub fn create_snapshot_with_stats(&self, policy: BumpPolicy) -> Result<(Snapshot<'s, S>, SnapshotStats)> {
        let (version, stats) = in_transaction(self.store, |tx| self.build_in(tx, policy))?;
        info!(
            "Created snapshot {} of {} ({} new versions)",
            version.short(),
            self.live_id.short(),
            stats.versions_created
        );
        Ok((Snapshot::open(self.store, &version)?, stats))
    }

    fn build_in(&self, tx: &Transaction<'_, S>, policy: BumpPolicy) -> Result<(VersionId, SnapshotStats)> {
        let mut builder = SnapshotBuilder::new(tx, policy, &self.config);
        let version = builder.build(&self.live_id)?;
        Ok((version, builder.stats().clone()))
    }

    /// Snapshot of the version the live node currently derives from, if any
    pub fn current_snapshot(&self) -> Result<Option<Snapshot<'s, S>>> {
        let base = in_transaction(self.store, |tx| {
            self.store.get_last_version(tx.token(), &self.live_id)
        })?;
        base.map(|id| Snapshot::open(self.store, &id)).transpose()
    }

    /// Restore the subtree to the generation labelled `label`
    pub fn restore(&self, label: &VersionLabel) -> Result<(LiveNode, RestoreStats)> {
        in_transaction(self.store, |tx| {
            let mut engine = RestoreEngine::new(tx, &self.config);
            let node = engine.restore_label(&self.live_id, label)?;
            Ok((node, engine.stats().clone()))
        })
    }
}

impl<'s, S: VersionedTreeStore + ?Sized> Snapshotable for SnapshotableNode<'s, S> {
    type Store = S;

    fn create_snapshot(&self, policy: BumpPolicy) -> Result<Snapshot<'_, S>> {
        self.create_snapshot_with_stats(policy)
            .map(|(snapshot, _)| snapshot)
    }
}
