//! # Treesnap - Hierarchical snapshots of versioned document trees
//!
//! A snapshot and restore engine for trees of folders and leaf documents
//! kept in a transactional, versioning document store.
//!
//! ## Overview
//!
//! Treesnap lets you:
//! - Freeze a whole live tree into an immutable snapshot, creating new
//!   versions only for the nodes that actually changed
//! - Navigate any snapshot lazily, flatten it, or serialize it canonically
//! - Restore any part of the live tree to a previous generation, all or
//!   nothing
//! - Compare snapshots and verify their structural integrity
//!
//! ## Architecture
//!
//! - **Store collaborator**: everything is read and written through
//!   [`VersionedTreeStore`]. [`MemoryStore`] is the bundled arena-backed
//!   implementation with file persistence.
//! - **Id-based generations**: live nodes and version nodes reference their
//!   children by id, so frozen generations never alias the live tree.
//! - **Post-order building**: [`SnapshotBuilder`] checks a folder in only
//!   after all of its descendants, so version bumps propagate upward along
//!   exactly the changed paths.
//! - **Explicit transactions**: every store call carries the token of a
//!   [`Transaction`]; dropping one without committing rolls it back.
//!
//! ## Quick Start
//!
//! ```rust
//! use treesnap::{in_transaction, BumpPolicy, MemoryStore, NodeTemplate, Snapshotable, SnapshotableNode, VersionedTreeStore};
//! use treesnap::types::TITLE_PROPERTY;
//!
//! # fn main() -> treesnap::Result<()> {
//! let store = MemoryStore::new();
//! let (root, doc) = in_transaction(&store, |tx| {
//!     let root = store.create_root(tx.token(), NodeTemplate::folder("workspace"))?;
//!     let doc = store.create_live_child(tx.token(), &root, NodeTemplate::leaf("plan"))?;
//!     Ok((root, doc))
//! })?;
//!
//! let node = SnapshotableNode::new(&store, root.clone())?;
//! let first = node.create_snapshot(BumpPolicy::Minor)?;
//! assert_eq!(first.label().to_string(), "0.1");
//!
//! // Edit the document and snapshot again: only the changed path is bumped
//! in_transaction(&store, |tx| {
//!     let mut props = store.live_node(tx.token(), &doc)?.properties;
//!     props.insert(TITLE_PROPERTY.to_string(), "plan v2".to_string());
//!     store.write_properties(tx.token(), &doc, props)
//! })?;
//! let second = node.create_snapshot(BumpPolicy::Minor)?;
//! assert_eq!(second.label().to_string(), "0.2");
//!
//! // Go back to the first generation
//! let restored = second.restore(&first.label())?;
//! assert_eq!(restored.id, root);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Live and version nodes
//!
//! A [`LiveNode`] is the editable working copy. A [`VersionNode`] is an
//! immutable frozen copy labelled `major.minor` within its live node's
//! history. Folder versions record the ordered ids of their child versions.
//!
//! ### Version labels
//!
//! Labels are per live node. A minor bump increments the minor number, a
//! major bump increments the major number and resets minor to 0. Bumps start
//! from the highest label in the node's history, so labels never repeat.
//!
//! ### Snapshots
//!
//! A [`Snapshot`] is a handle over one version node. Taking a snapshot twice
//! without edits returns the same versions; editing one leaf bumps that leaf
//! and its ancestors only.
//!
//! ### Restore
//!
//! Restoring to a label rewrites properties, deletes nodes the snapshot did
//! not contain, moves or recreates the ones it did, and puts children back
//! in the recorded order. The live tree then hashes exactly like the
//! snapshot (see [`hash`]).
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SnapshotError>`. Missing labels are
//! reported before anything is written; any other failure is rolled back
//! with the enclosing transaction.
//!
//! ## Module Organization
//!
//! - [`store`]: the store collaborator trait
//! - [`memory`]: in-memory reference store with persistence
//! - [`transaction`]: transaction guard and scoped helper
//! - [`builder`]: snapshot construction
//! - [`snapshot`]: snapshot handles and the snapshot capability
//! - [`restore`]: restoring live subtrees
//! - [`change`]: per-node change detection
//! - [`hash`]: content hashes of live trees and snapshots
//! - [`diff`]: comparing snapshots
//! - [`verification`]: integrity checking
//! - [`config`]: engine configuration
//! - [`node`], [`types`]: data model
//! - [`error`]: error types

// Public API modules
pub mod builder;
pub mod change;
pub mod config;
pub mod diff;
pub mod error;
pub mod hash;
pub mod memory;
pub mod node;
pub mod restore;
pub mod snapshot;
pub mod store;
pub mod transaction;
pub mod types;
pub mod verification;

// Internal modules
mod collections;

// Re-export main types for convenience
pub use builder::{create_snapshot, SnapshotBuilder};
pub use change::ChangeDetector;
pub use config::{SnapshotConfig, SnapshotConfigBuilder};
pub use diff::{ChangeStats, DiffEntry, SnapshotDiff};
pub use error::{Result, SnapshotError};
pub use hash::{live_tree_hash, snapshot_tree_hash};
pub use memory::MemoryStore;
pub use node::{LiveNode, NodeTemplate, VersionNode};
pub use restore::RestoreEngine;
pub use snapshot::{Snapshot, Snapshotable, SnapshotableNode};
pub use store::{NodeRef, TxToken, VersionedTreeStore};
pub use transaction::{in_transaction, Transaction};
pub use types::*;
pub use verification::{SnapshotVerifier, VerificationReport};
