//! Structural verification of snapshots
//!
//! [`SnapshotVerifier`] walks a version tree and checks the invariants the
//! builder is supposed to maintain:
//!
//! 1. **References**: every child version id resolves to a version node
//! 2. **Acyclicity**: no version is reachable from itself
//! 3. **Siblings**: no live node appears twice in one folder version
//! 4. **Histories**: labels in each reached live node's history strictly
//!    increase
//!
//! Problems are collected in a [`VerificationReport`] rather than returned
//! as errors; only store failures abort verification.
//!
//! ## Usage
//!
//! ```rust
//! use treesnap::{in_transaction, BumpPolicy, MemoryStore, NodeTemplate, Snapshotable, SnapshotableNode};
//! use treesnap::verification::SnapshotVerifier;
//!
//! # fn main() -> treesnap::Result<()> {
//! let store = MemoryStore::new();
//! let root = in_transaction(&store, |tx| store.create_root(tx.token(), NodeTemplate::folder("root")))?;
//! let node = SnapshotableNode::new(&store, root)?;
//! let snapshot = node.create_snapshot(BumpPolicy::Minor)?;
//!
//! let report = in_transaction(&store, |tx| SnapshotVerifier::new(tx).verify(&snapshot))?;
//! assert!(report.is_valid(), "{}", report.summary());
//! # Ok(())
//! # }
//! ```

use crate::collections::{id_set, IdSet};
use crate::error::Result;
use crate::node::VersionNode;
use crate::snapshot::Snapshot;
use crate::store::VersionedTreeStore;
use crate::transaction::Transaction;
use crate::types::{LiveId, VersionId};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Checks snapshot integrity through a transaction
pub struct SnapshotVerifier<'t, 's, S: VersionedTreeStore + ?Sized> {
    tx: &'t Transaction<'s, S>,
}

impl<'t, 's, S: VersionedTreeStore + ?Sized> SnapshotVerifier<'t, 's, S> {
    /// Create a verifier reading through `tx`
    pub fn new(tx: &'t Transaction<'s, S>) -> Self {
        Self { tx }
    }

    /// Verify the version tree under `snapshot`
    ///
    /// # Errors
    ///
    /// Returns an error only if the store itself fails. Integrity problems
    /// are reported in the result.
    pub fn verify(&self, snapshot: &Snapshot<'_, S>) -> Result<VerificationReport> {
        let start = Instant::now();
        let mut report = VerificationReport::new(snapshot.id().clone());
        let mut path = id_set();
        let mut live_ids = id_set();

        self.walk(snapshot.document(), &mut path, &mut live_ids, &mut report)?;

        debug!("Checking histories of {} live nodes", live_ids.len());
        let mut live_ids: Vec<LiveId> = live_ids.into_iter().collect();
        live_ids.sort();
        for live_id in &live_ids {
            self.check_history(live_id, &mut report)?;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Verified snapshot {} in {}ms: {} nodes, {}",
            snapshot.id().short(),
            report.duration_ms,
            report.nodes_checked,
            if report.is_valid() { "valid" } else { "invalid" }
        );
        Ok(report)
    }

    fn walk(
        &self,
        version: &VersionNode,
        path: &mut IdSet<VersionId>,
        live_ids: &mut IdSet<LiveId>,
        report: &mut VerificationReport,
    ) -> Result<()> {
        if !path.insert(version.id.clone()) {
            report.cycles.push(version.id.clone());
            return Ok(());
        }
        report.nodes_checked += 1;
        live_ids.insert(version.live_id.clone());

        let store = self.tx.store();
        let mut siblings = id_set();
        for child_id in version.children() {
            let child = match store.version_node(child_id) {
                Ok(child) => child,
                Err(e) if e.is_not_found() => {
                    report.missing_versions.push(child_id.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !siblings.insert(child.live_id.clone()) {
                report.duplicate_children.push(format!(
                    "{} appears twice under version {}",
                    child.live_id, version.id
                ));
            }
            self.walk(&child, path, live_ids, report)?;
        }

        path.remove(&version.id);
        Ok(())
    }

    fn check_history(&self, live_id: &LiveId, report: &mut VerificationReport) -> Result<()> {
        let store = self.tx.store();
        let history = store.history(self.tx.token(), live_id)?;
        let mut previous = None;
        for version_id in &history {
            let label = match store.version_node(version_id) {
                Ok(node) => node.label,
                Err(e) if e.is_not_found() => {
                    report.missing_versions.push(version_id.clone());
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(previous) = previous {
                if label <= previous {
                    report.history_errors.push(format!(
                        "history of {} goes from {} to {}",
                        live_id, previous, label
                    ));
                }
            }
            previous = Some(label);
        }
        Ok(())
    }
}

/// Result of verifying one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Root version verified
    pub root_version: VersionId,
    /// Version nodes visited
    pub nodes_checked: usize,
    /// Referenced version ids that do not resolve
    pub missing_versions: Vec<VersionId>,
    /// Versions reachable from themselves
    pub cycles: Vec<VersionId>,
    /// Folder versions listing a live node twice
    pub duplicate_children: Vec<String>,
    /// Histories whose labels do not strictly increase
    pub history_errors: Vec<String>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl VerificationReport {
    /// Create an empty report
    pub fn new(root_version: VersionId) -> Self {
        Self {
            root_version,
            nodes_checked: 0,
            missing_versions: Vec::new(),
            cycles: Vec::new(),
            duplicate_children: Vec::new(),
            history_errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Check if no problem was found
    pub fn is_valid(&self) -> bool {
        self.missing_versions.is_empty()
            && self.cycles.is_empty()
            && self.duplicate_children.is_empty()
            && self.history_errors.is_empty()
    }

    /// Get a summary of the verification
    pub fn summary(&self) -> String {
        if self.is_valid() {
            format!(
                "Snapshot {} is valid ({} nodes verified in {}ms)",
                self.root_version.short(),
                self.nodes_checked,
                self.duration_ms
            )
        } else {
            let issues = [
                (!self.missing_versions.is_empty()).then_some("missing versions"),
                (!self.cycles.is_empty()).then_some("cycles"),
                (!self.duplicate_children.is_empty()).then_some("duplicate children"),
                (!self.history_errors.is_empty()).then_some("non-increasing history"),
            ]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");

            format!(
                "Snapshot {} is invalid: {} ({} nodes checked)",
                self.root_version.short(),
                issues,
                self.nodes_checked
            )
        }
    }
}
