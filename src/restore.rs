//! Restoring live subtrees to a previous generation
//!
//! [`RestoreEngine`] makes a live subtree mirror a version tree again:
//!
//! 1. The target generation is resolved in the root's own version history.
//! 2. The whole target tree is validated (every child version resolves, no
//!    cycles, no live counterpart lacking the versioning capability or of the
//!    wrong kind). Nothing has been written yet when validation fails.
//! 3. Each node gets the frozen properties back and is pointed at the target
//!    version as its base.
//! 4. Folder children absent from the target are deleted, children held
//!    elsewhere in the live tree are moved back, and missing ones are
//!    recreated under their original ids before recursing.
//! 5. Children are put back in the recorded order.
//!
//! Unversionable live children are never part of a snapshot and are left in
//! place, after the restored children. A failure at any point is left to the
//! enclosing [`Transaction`] to roll back.

use crate::collections::{id_set, IdSet};
use crate::config::SnapshotConfig;
use crate::error::{Result, SnapshotError};
use crate::hash::{live_tree_hash, snapshot_tree_hash};
use crate::node::{LiveNode, NodeTemplate, VersionNode};
use crate::snapshot::Snapshot;
use crate::store::VersionedTreeStore;
use crate::transaction::Transaction;
use crate::types::{LiveId, RestoreStats, VersionId, VersionLabel};
use tracing::{debug, info, instrument};

/// Drives a restore inside a transaction
pub struct RestoreEngine<'t, 's, S: VersionedTreeStore + ?Sized> {
    tx: &'t Transaction<'s, S>,
    config: &'t SnapshotConfig,
    in_target: IdSet<LiveId>,
    stats: RestoreStats,
}

impl<'t, 's, S: VersionedTreeStore + ?Sized> RestoreEngine<'t, 's, S> {
    /// Create an engine writing through `tx`
    pub fn new(tx: &'t Transaction<'s, S>, config: &'t SnapshotConfig) -> Self {
        Self {
            tx,
            config,
            in_target: id_set(),
            stats: RestoreStats::default(),
        }
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> &RestoreStats {
        &self.stats
    }

    /// Restore `live_id` to the version labelled `label` in its own history
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::NotFound`] if the live node does not exist
    /// - [`SnapshotError::SchemaMismatch`] if it is not versionable
    /// - [`SnapshotError::LabelNotFound`] if its history has no such label;
    ///   nothing is written in that case
    #[instrument(skip(self, live_id), fields(root = %live_id.short(), label = %label))]
    pub fn restore_label(&mut self, live_id: &LiveId, label: &VersionLabel) -> Result<LiveNode> {
        let store = self.tx.store();
        let token = self.tx.token();
        let node = store.live_node(token, live_id)?;
        if !node.versionable {
            return Err(SnapshotError::schema(format!(
                "{} is not versionable and cannot be restored",
                live_id
            )));
        }
        let version = store
            .resolve_label(token, live_id, label)?
            .ok_or_else(|| SnapshotError::LabelNotFound {
                live_id: live_id.to_string(),
                label: label.to_string(),
            })?;
        let target = store.version_node(&version)?;
        self.restore(live_id, &target)
    }

    /// Restore `root` to the generation of `target`
    ///
    /// When `target` belongs to another live node, the version of `root`
    /// carrying the same label is used instead.
    pub fn restore(&mut self, root: &LiveId, target: &VersionNode) -> Result<LiveNode> {
        let tx = self.tx;
        let store = tx.store();
        let token = tx.token();

        let resolved;
        let target = if &target.live_id == root {
            target
        } else {
            let id = store
                .resolve_label(token, root, &target.label)?
                .ok_or_else(|| SnapshotError::LabelNotFound {
                    live_id: root.to_string(),
                    label: target.label.to_string(),
                })?;
            resolved = store.version_node(&id)?;
            &resolved
        };

        let mut in_target = id_set();
        self.validate(target, 0, &mut id_set(), &mut in_target)?;
        self.in_target = in_target;
        self.apply(root, target, false, 0)?;

        if self.config.verify_after_restore {
            let live = live_tree_hash(tx, root)?;
            let frozen = snapshot_tree_hash(&Snapshot::open(store, &target.id)?)?;
            if live != frozen {
                return Err(SnapshotError::invariant(format!(
                    "restored tree of {} does not match version {}",
                    root, target.label
                )));
            }
            debug!("Verified restored tree hash {}", &live[..16]);
        }

        info!(
            "Restored {} to {} ({} updated, {} recreated, {} moved, {} removed, {} reordered)",
            root.short(),
            target.label,
            self.stats.nodes_updated,
            self.stats.nodes_recreated,
            self.stats.nodes_moved,
            self.stats.nodes_removed,
            self.stats.nodes_reordered
        );
        store.live_node(token, root)
    }

    fn validate(
        &self,
        version: &VersionNode,
        depth: usize,
        path: &mut IdSet<VersionId>,
        seen: &mut IdSet<LiveId>,
    ) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(SnapshotError::invariant(format!(
                "version tree deeper than {} levels at {}",
                self.config.max_depth, version.id
            )));
        }
        if !path.insert(version.id.clone()) {
            return Err(SnapshotError::invariant(format!(
                "cycle through version {}",
                version.id
            )));
        }
        if !seen.insert(version.live_id.clone()) {
            return Err(SnapshotError::invariant(format!(
                "live node {} appears twice in version {}",
                version.live_id, version.id
            )));
        }

        let store = self.tx.store();
        let token = self.tx.token();
        if store.live_exists(token, &version.live_id)? {
            let live = store.live_node(token, &version.live_id)?;
            check_compatible(&live, version)?;
        }
        for child in version.children() {
            self.validate(&store.version_node(child)?, depth + 1, path, seen)?;
        }

        path.remove(&version.id);
        Ok(())
    }

    fn apply(&mut self, live_id: &LiveId, target: &VersionNode, recreated: bool, depth: usize) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(SnapshotError::invariant(format!(
                "live tree deeper than {} levels at {}",
                self.config.max_depth, live_id
            )));
        }
        let tx = self.tx;
        let store = tx.store();
        let token = tx.token();

        let node = store.live_node(token, live_id)?;
        check_compatible(&node, target)?;

        let same_base = node.base_version.as_ref() == Some(&target.id);
        if !same_base || !store.properties_equal(&node.properties, &target.properties) {
            store.checkout(token, live_id)?;
            store.write_properties(token, live_id, target.properties.clone())?;
            store.set_base_version(token, live_id, &target.id)?;
            if !recreated {
                debug!("Updated {} to {}", live_id.short(), target.label);
                self.stats.nodes_updated += 1;
            }
        }

        if !target.is_folder() {
            return Ok(());
        }

        let targets = target
            .children()
            .iter()
            .map(|id| store.version_node(id))
            .collect::<Result<Vec<_>>>()?;
        let mut wanted: IdSet<&LiveId> = id_set();
        wanted.extend(targets.iter().map(|t| &t.live_id));

        // Nodes the target places elsewhere are moved when their parent is reached
        for child_id in node.children() {
            if self.in_target.contains(child_id) {
                continue;
            }
            if store.live_node(token, child_id)?.versionable {
                store.delete_live(token, child_id)?;
                debug!("Removed {} from {}", child_id.short(), live_id.short());
                self.stats.nodes_removed += 1;
            }
        }

        for child in &targets {
            if store.live_exists(token, &child.live_id)? {
                let existing = store.live_node(token, &child.live_id)?;
                if existing.parent.as_ref() != Some(live_id) {
                    store.move_live(token, &child.live_id, live_id)?;
                    debug!("Moved {} back under {}", child.live_id.short(), live_id.short());
                    self.stats.nodes_moved += 1;
                }
                self.apply(&child.live_id, child, false, depth + 1)?;
            } else {
                store.create_live_child(token, live_id, NodeTemplate::from_version(child))?;
                debug!("Recreated {} under {}", child.live_id.short(), live_id.short());
                self.stats.nodes_recreated += 1;
                self.apply(&child.live_id, child, true, depth + 1)?;
            }
        }

        let current = store.get_live_children(token, live_id)?;
        let mut expected: Vec<LiveId> = targets.iter().map(|t| t.live_id.clone()).collect();
        expected.extend(current.iter().filter(|id| !wanted.contains(id)).cloned());
        if current != expected {
            let order: Vec<LiveId> = targets.iter().map(|t| t.live_id.clone()).collect();
            store.order_live_children(token, live_id, &order)?;
            self.stats.nodes_reordered += 1;
        }
        Ok(())
    }
}

fn check_compatible(live: &LiveNode, version: &VersionNode) -> Result<()> {
    if !live.versionable {
        return Err(SnapshotError::schema(format!(
            "{} is not versionable and cannot be restored",
            live.id
        )));
    }
    if live.is_folder() != version.is_folder() {
        return Err(SnapshotError::schema(format!(
            "{} is a {} but version {} froze a {}",
            live.id,
            kind_name(live.is_folder()),
            version.label,
            kind_name(version.is_folder())
        )));
    }
    Ok(())
}

fn kind_name(folder: bool) -> &'static str {
    if folder {
        "folder"
    } else {
        "leaf"
    }
}
