//! Bottom-up snapshot construction
//!
//! [`SnapshotBuilder`] walks a live subtree depth first and decides, node by
//! node on the way back up, whether to check the node in or reuse the version
//! it derives from:
//!
//! 1. Children are snapshotted first, producing the ordered `(version, label)`
//!    list the folder would record.
//! 2. The node's own properties are compared with its previous version.
//! 3. The child list is compared with the one stored on the previous version.
//! 4. Any difference, or no previous version at all, triggers a checkin that
//!    persists the new child list atomically. Otherwise the previous version
//!    is reused as-is.
//!
//! Because a folder is only checked in after all its descendants, a failing
//! checkin never leaves an ancestor pointing at versions that do not exist.
//! Atomicity of the whole walk comes from the enclosing [`Transaction`].

use crate::change::{child_lists_differ, ChangeDetector};
use crate::collections::{id_set, IdSet};
use crate::config::SnapshotConfig;
use crate::error::{Result, SnapshotError};
use crate::node::{LiveNode, VersionNode};
use crate::store::VersionedTreeStore;
use crate::transaction::Transaction;
use crate::types::{BumpPolicy, ChildRef, LiveId, SnapshotStats, VersionId};
use tracing::{debug, info, instrument};

/// Builds one snapshot of a live subtree inside a transaction
pub struct SnapshotBuilder<'t, 's, S: VersionedTreeStore + ?Sized> {
    tx: &'t Transaction<'s, S>,
    detector: ChangeDetector<'s, S>,
    policy: BumpPolicy,
    config: &'t SnapshotConfig,
    visiting: IdSet<LiveId>,
    stats: SnapshotStats,
}

impl<'t, 's, S: VersionedTreeStore + ?Sized> SnapshotBuilder<'t, 's, S> {
    /// Create a builder applying `policy` to every required bump
    pub fn new(tx: &'t Transaction<'s, S>, policy: BumpPolicy, config: &'t SnapshotConfig) -> Self {
        Self {
            tx,
            detector: ChangeDetector::new(tx.store()),
            policy,
            config,
            visiting: id_set(),
            stats: SnapshotStats::default(),
        }
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> &SnapshotStats {
        &self.stats
    }

    /// Snapshot the subtree rooted at `root` and return its version id
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::NotFound`] if `root` does not exist
    /// - [`SnapshotError::SchemaMismatch`] if `root` is not versionable
    /// - [`SnapshotError::InvariantViolation`] on cycles or trees deeper than
    ///   `max_depth`
    /// - any store failure raised by a checkin
    #[instrument(skip(self, root), fields(root = %root.short(), policy = %self.policy))]
    pub fn build(&mut self, root: &LiveId) -> Result<VersionId> {
        let store = self.tx.store();
        let node = store.live_node(self.tx.token(), root)?;
        if !node.versionable {
            return Err(SnapshotError::schema(format!(
                "{} is not versionable and cannot be snapshotted",
                root
            )));
        }

        let result = self.visit(node, 0)?;
        info!(
            "Snapshot of {} is {} ({} created, {} reused, {} skipped)",
            root.short(),
            result.label,
            self.stats.versions_created,
            self.stats.versions_reused,
            self.stats.nodes_skipped
        );
        Ok(result.version_id)
    }

    fn visit(&mut self, node: LiveNode, depth: usize) -> Result<ChildRef> {
        if depth > self.config.max_depth {
            return Err(SnapshotError::invariant(format!(
                "tree deeper than {} levels at {}",
                self.config.max_depth, node.id
            )));
        }
        if !self.visiting.insert(node.id.clone()) {
            return Err(SnapshotError::invariant(format!(
                "cycle through live node {}",
                node.id
            )));
        }
        self.stats.nodes_visited += 1;

        let tx = self.tx;
        let store = tx.store();
        let token = tx.token();

        let mut child_refs = Vec::with_capacity(node.children().len());
        for child_id in node.children() {
            let child = store.live_node(token, child_id)?;
            if !child.versionable {
                debug!("Skipping unversionable {}", child_id.short());
                self.stats.nodes_skipped += 1;
                continue;
            }
            child_refs.push(self.visit(child, depth + 1)?);
        }

        let previous = match store.get_last_version(token, &node.id)? {
            Some(id) => Some(store.version_node(&id)?),
            None => None,
        };
        let own_changed = self.detector.has_own_content_changed(&node, previous.as_ref());
        let children_changed = match &previous {
            Some(previous) if node.is_folder() => {
                !previous.is_folder() || child_lists_differ(&child_refs, &self.child_refs_of(previous)?)
            }
            Some(previous) => previous.is_folder(),
            None => false,
        };

        let result = match previous {
            Some(previous) if !own_changed && !children_changed => {
                debug!("Reusing {} for {}", previous.label, node.id.short());
                self.stats.versions_reused += 1;
                ChildRef {
                    version_id: previous.id,
                    label: previous.label,
                }
            }
            _ => {
                let children = node
                    .is_folder()
                    .then(|| child_refs.into_iter().map(|c| c.version_id).collect());
                let version_id = store.checkin(
                    token,
                    &node.id,
                    self.policy,
                    self.config.checkin_comment.as_deref(),
                    children,
                )?;
                let label = store.version_node(&version_id)?.label;
                debug!(
                    "Checked in {} as {} (own: {}, children: {})",
                    node.id.short(),
                    label,
                    own_changed,
                    children_changed
                );
                self.stats.versions_created += 1;
                ChildRef { version_id, label }
            }
        };

        self.visiting.remove(&node.id);
        Ok(result)
    }

    fn child_refs_of(&self, version: &VersionNode) -> Result<Vec<ChildRef>> {
        let store = self.tx.store();
        version
            .children()
            .iter()
            .map(|id| {
                Ok(ChildRef {
                    version_id: id.clone(),
                    label: store.version_node(id)?.label,
                })
            })
            .collect()
    }
}

/// Snapshot `root` inside `tx` with the default config
pub fn create_snapshot<S: VersionedTreeStore + ?Sized>(
    tx: &Transaction<'_, S>,
    root: &LiveId,
    policy: BumpPolicy,
) -> Result<VersionId> {
    let config = SnapshotConfig::default();
    SnapshotBuilder::new(tx, policy, &config).build(root)
}
