//! Scoped transactions over a [`VersionedTreeStore`]
//!
//! A [`Transaction`] rolls back when dropped without an explicit commit, so
//! every early return through `?` leaves the store untouched.

use crate::error::Result;
use crate::store::{TxToken, VersionedTreeStore};
use tracing::{trace, warn};

/// An open transaction bound to a store
pub struct Transaction<'s, S: VersionedTreeStore + ?Sized> {
    store: &'s S,
    token: TxToken,
    finished: bool,
}

impl<'s, S: VersionedTreeStore + ?Sized> Transaction<'s, S> {
    /// Begin a transaction on `store`
    pub fn begin(store: &'s S) -> Result<Self> {
        let token = store.begin()?;
        trace!("Began transaction {}", token.id());
        Ok(Self {
            store,
            token,
            finished: false,
        })
    }

    /// The store this transaction runs against
    pub fn store(&self) -> &'s S {
        self.store
    }

    /// Token to pass to store calls
    pub fn token(&self) -> &TxToken {
        &self.token
    }

    /// Commit all changes
    pub fn commit(mut self) -> Result<()> {
        self.store.commit(&self.token)?;
        self.finished = true;
        trace!("Committed transaction {}", self.token.id());
        Ok(())
    }

    /// Discard all changes
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.store.rollback(&self.token)?;
        trace!("Rolled back transaction {}", self.token.id());
        Ok(())
    }
}

impl<S: VersionedTreeStore + ?Sized> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.store.rollback(&self.token) {
                warn!("Failed to roll back transaction {}: {}", self.token.id(), e);
            }
        }
    }
}

impl<S: VersionedTreeStore + ?Sized> std::fmt::Debug for Transaction<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("token", &self.token)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Run `f` inside a transaction, committing on `Ok` and rolling back on `Err`
///
/// # Examples
///
/// ```rust
/// use treesnap::{in_transaction, MemoryStore, NodeTemplate};
///
/// # fn main() -> treesnap::Result<()> {
/// let store = MemoryStore::new();
/// let root = in_transaction(&store, |tx| {
///     store.create_root(tx.token(), NodeTemplate::folder("root"))
/// })?;
/// assert!(!root.as_str().is_empty());
/// # Ok(())
/// # }
/// ```
pub fn in_transaction<S, T, F>(store: &S, f: F) -> Result<T>
where
    S: VersionedTreeStore + ?Sized,
    F: FnOnce(&Transaction<'_, S>) -> Result<T>,
{
    let tx = Transaction::begin(store)?;
    match f(&tx) {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!("Rollback after error failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}
