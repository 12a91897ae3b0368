//! The versioned tree store collaborator
//!
//! The engine never owns nodes. It reads and mutates the live tree, and
//! creates version nodes, exclusively through [`VersionedTreeStore`].
//!
//! ## Transactions
//!
//! Every call that touches live state takes the [`TxToken`] of the enclosing
//! transaction. The store decides what a transaction means (savepoint, SQL
//! transaction, ...); the engine only relies on commit being all-or-nothing.
//! Version nodes are immutable once created, so reading them needs no token.
//!
//! Use [`Transaction`](crate::transaction::Transaction) or
//! [`in_transaction`](crate::transaction::in_transaction) rather than calling
//! `begin`/`commit`/`rollback` by hand.

use crate::error::Result;
use crate::node::{LiveNode, NodeTemplate, VersionNode};
use crate::types::{BumpPolicy, LiveId, PropertyMap, VersionId, VersionLabel};

/// Handle of an open transaction, issued by [`VersionedTreeStore::begin`]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TxToken {
    id: u64,
}

impl TxToken {
    /// Wrap a store-assigned transaction id
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// Store-assigned transaction id
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Id of either generation, for calls that accept both
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef<'a> {
    /// A live node
    Live(&'a LiveId),
    /// A version node
    Version(&'a VersionId),
}

/// Transactional, synchronous document store holding live and version nodes
pub trait VersionedTreeStore {
    /// Open a transaction
    fn begin(&self) -> Result<TxToken>;

    /// Commit every change made under `tx`
    fn commit(&self, tx: &TxToken) -> Result<()>;

    /// Discard every change made under `tx`
    fn rollback(&self, tx: &TxToken) -> Result<()>;

    /// Read a live node
    fn live_node(&self, tx: &TxToken, id: &LiveId) -> Result<LiveNode>;

    /// Whether a live node with this id currently exists
    fn live_exists(&self, tx: &TxToken, id: &LiveId) -> Result<bool>;

    /// Ordered live children of a folder, empty for leaves
    fn get_live_children(&self, tx: &TxToken, id: &LiveId) -> Result<Vec<LiveId>> {
        Ok(self.live_node(tx, id)?.children().to_vec())
    }

    /// Version the live node currently derives from
    fn get_last_version(&self, tx: &TxToken, id: &LiveId) -> Result<Option<VersionId>> {
        Ok(self.live_node(tx, id)?.base_version)
    }

    /// Every version of a live node, oldest first
    fn history(&self, tx: &TxToken, id: &LiveId) -> Result<Vec<VersionId>>;

    /// Find the version of `id` carrying `label`
    fn resolve_label(
        &self,
        tx: &TxToken,
        id: &LiveId,
        label: &VersionLabel,
    ) -> Result<Option<VersionId>>;

    /// Freeze the live node into a new version node
    ///
    /// For folders, `children` is the ordered child version list persisted
    /// atomically with the checkin; leaves pass `None`.
    fn checkin(
        &self,
        tx: &TxToken,
        id: &LiveId,
        policy: BumpPolicy,
        comment: Option<&str>,
        children: Option<Vec<VersionId>>,
    ) -> Result<VersionId>;

    /// Make a checked-in live node editable again
    fn checkout(&self, tx: &TxToken, id: &LiveId) -> Result<()>;

    /// Replace the live node's properties
    fn write_properties(&self, tx: &TxToken, id: &LiveId, properties: PropertyMap) -> Result<()>;

    /// Point the live node at `version` as the generation it derives from
    fn set_base_version(&self, tx: &TxToken, id: &LiveId, version: &VersionId) -> Result<()>;

    /// Create a live node at the end of `parent`'s children
    fn create_live_child(&self, tx: &TxToken, parent: &LiveId, template: NodeTemplate)
        -> Result<LiveId>;

    /// Delete a live node and its live subtree; versions are kept
    fn delete_live(&self, tx: &TxToken, id: &LiveId) -> Result<()>;

    /// Re-parent a live node at the end of `new_parent`'s children
    fn move_live(&self, tx: &TxToken, id: &LiveId, new_parent: &LiveId) -> Result<()>;

    /// Put the listed children first, in the given order
    ///
    /// Children of `parent` not listed keep their relative order after them.
    fn order_live_children(&self, tx: &TxToken, parent: &LiveId, order: &[LiveId]) -> Result<()>;

    /// Read an immutable version node
    fn version_node(&self, id: &VersionId) -> Result<VersionNode>;

    /// Ordered child version ids of a folder version
    fn get_version_children(&self, id: &VersionId) -> Result<Vec<VersionId>> {
        Ok(self.version_node(id)?.children().to_vec())
    }

    /// Read the properties of either generation
    fn read_properties(&self, tx: &TxToken, node: NodeRef<'_>) -> Result<PropertyMap> {
        match node {
            NodeRef::Live(id) => Ok(self.live_node(tx, id)?.properties),
            NodeRef::Version(id) => Ok(self.version_node(id)?.properties),
        }
    }

    /// Store-defined property equality
    ///
    /// Must be pure and deterministic. Defaults to exact map equality.
    fn properties_equal(&self, live: &PropertyMap, frozen: &PropertyMap) -> bool {
        live == frozen
    }
}
