//! Arena-backed reference implementation of [`VersionedTreeStore`]
//!
//! `MemoryStore` keeps live nodes and version nodes in id-keyed maps and
//! every live id's ordered version history next to them. It is what the CLI
//! persists to disk and what the test suites run against.
//!
//! ## Transactions
//!
//! One transaction may be active at a time. `begin` clones the whole state
//! as a savepoint; `rollback` puts it back and `commit` drops it. Opening a
//! second transaction fails with [`SnapshotError::TransactionActive`], and a
//! token that is not the active one fails with
//! [`SnapshotError::StaleTransaction`].
//!
//! ## Persistence
//!
//! ```text
//! store_dir/
//! ├── metadata.json   # Format version and timestamps
//! └── store.bin       # Live nodes, version nodes and histories (bincode)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use treesnap::{in_transaction, MemoryStore, NodeTemplate, VersionedTreeStore};
//!
//! # fn main() -> treesnap::Result<()> {
//! let store = MemoryStore::new();
//! let (root, doc) = in_transaction(&store, |tx| {
//!     let root = store.create_root(tx.token(), NodeTemplate::folder("root"))?;
//!     let doc = store.create_live_child(tx.token(), &root, NodeTemplate::leaf("notes"))?;
//!     Ok((root, doc))
//! })?;
//!
//! let children = in_transaction(&store, |tx| store.get_live_children(tx.token(), &root))?;
//! assert_eq!(children, vec![doc]);
//! # Ok(())
//! # }
//! ```

use crate::collections::{id_set, IdMap, IdSet};
use crate::error::{Result, SnapshotError};
use crate::node::{LiveNode, NodeTemplate, VersionNode};
use crate::store::{TxToken, VersionedTreeStore};
use crate::types::{BumpPolicy, LiveId, NodeKind, PropertyMap, VersionId, VersionLabel};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, trace};

/// On-disk format version written to `metadata.json`
pub const FORMAT_VERSION: u32 = 1;

const STATE_FILE: &str = "store.bin";
const METADATA_FILE: &str = "metadata.json";

/// Metadata persisted next to the store state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// On-disk format version
    pub format_version: u32,
    /// Version of treesnap that last wrote the store
    pub treesnap_version: String,
    /// When the store was first created
    pub created_at: DateTime<Utc>,
    /// When the store was last saved
    pub updated_at: DateTime<Utc>,
}

impl Default for StoreMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            format_version: FORMAT_VERSION,
            treesnap_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    live: IdMap<LiveId, LiveNode>,
    versions: IdMap<VersionId, VersionNode>,
    histories: IdMap<LiveId, Vec<VersionId>>,
    roots: Vec<LiveId>,
}

impl StoreState {
    fn live(&self, id: &LiveId) -> Result<&LiveNode> {
        self.live
            .get(id)
            .ok_or_else(|| SnapshotError::not_found(format!("live node {}", id)))
    }

    fn live_mut(&mut self, id: &LiveId) -> Result<&mut LiveNode> {
        self.live
            .get_mut(id)
            .ok_or_else(|| SnapshotError::not_found(format!("live node {}", id)))
    }

    fn version(&self, id: &VersionId) -> Result<&VersionNode> {
        self.versions
            .get(id)
            .ok_or_else(|| SnapshotError::not_found(format!("version node {}", id)))
    }

    fn folder_children_mut(&mut self, id: &LiveId) -> Result<&mut Vec<LiveId>> {
        match &mut self.live_mut(id)?.kind {
            NodeKind::Folder { children } => Ok(children),
            NodeKind::Leaf => Err(SnapshotError::schema(format!(
                "live node {} is not a folder",
                id
            ))),
        }
    }

    /// Whether `candidate` is `ancestor` or lies below it
    fn is_within(&self, candidate: &LiveId, ancestor: &LiveId) -> bool {
        let mut current = Some(candidate.clone());
        let mut hops = 0usize;
        while let Some(id) = current {
            if &id == ancestor {
                return true;
            }
            hops += 1;
            if hops > self.live.len() {
                return false;
            }
            current = self.live.get(&id).and_then(|node| node.parent.clone());
        }
        false
    }

    fn detach(&mut self, id: &LiveId) -> Result<()> {
        let parent = self.live(id)?.parent.clone();
        match parent {
            Some(parent) => self.folder_children_mut(&parent)?.retain(|c| c != id),
            None => self.roots.retain(|r| r != id),
        }
        Ok(())
    }

    fn insert_live(&mut self, parent: Option<&LiveId>, template: NodeTemplate) -> Result<LiveId> {
        let id = template.id.unwrap_or_else(LiveId::generate);
        if self.live.contains_key(&id) {
            return Err(SnapshotError::store(format!("live node {} already exists", id)));
        }
        let kind = if template.folder {
            NodeKind::folder()
        } else {
            NodeKind::Leaf
        };
        self.live.insert(
            id.clone(),
            LiveNode {
                id: id.clone(),
                parent: parent.cloned(),
                kind,
                properties: template.properties,
                versionable: template.versionable,
                base_version: None,
                base_label: None,
                checked_out: false,
            },
        );
        Ok(id)
    }
}

struct ActiveTx {
    id: u64,
    savepoint: StoreState,
}

/// In-memory, transactional [`VersionedTreeStore`]
pub struct MemoryStore {
    state: RwLock<StoreState>,
    active: Mutex<Option<ActiveTx>>,
    next_tx: AtomicU64,
    checkin_failures: Mutex<IdSet<LiveId>>,
    write_failures: Mutex<IdSet<LiveId>>,
    metadata: RwLock<StoreMetadata>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryStore")
            .field("live_nodes", &state.live.len())
            .field("version_nodes", &state.versions.len())
            .field("roots", &state.roots.len())
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::from_parts(StoreState::default(), StoreMetadata::default())
    }

    fn from_parts(state: StoreState, metadata: StoreMetadata) -> Self {
        Self {
            state: RwLock::new(state),
            active: Mutex::new(None),
            next_tx: AtomicU64::new(1),
            checkin_failures: Mutex::new(id_set()),
            write_failures: Mutex::new(id_set()),
            metadata: RwLock::new(metadata),
        }
    }

    fn check(&self, tx: &TxToken) -> Result<()> {
        match &*self.active.lock() {
            Some(active) if active.id == tx.id() => Ok(()),
            _ => Err(SnapshotError::StaleTransaction(tx.id())),
        }
    }

    fn check_write(&self, id: &LiveId) -> Result<()> {
        if self.write_failures.lock().remove(id) {
            return Err(SnapshotError::store(format!("injected write failure for {}", id)));
        }
        Ok(())
    }

    /// Create a top-level live node
    pub fn create_root(&self, tx: &TxToken, template: NodeTemplate) -> Result<LiveId> {
        self.check(tx)?;
        let mut state = self.state.write();
        let id = state.insert_live(None, template)?;
        state.roots.push(id.clone());
        debug!("Created root {}", id.short());
        Ok(id)
    }

    /// Top-level live nodes in creation order
    pub fn roots(&self, tx: &TxToken) -> Result<Vec<LiveId>> {
        self.check(tx)?;
        Ok(self.state.read().roots.clone())
    }

    /// Resolve a unique live id from a prefix of it
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::NotFound`] if no live node, or more than one, matches
    pub fn find_live_by_prefix(&self, tx: &TxToken, prefix: &str) -> Result<LiveId> {
        self.check(tx)?;
        let state = self.state.read();
        let exact = LiveId::from(prefix);
        if state.live.contains_key(&exact) {
            return Ok(exact);
        }
        let matches: Vec<&LiveId> = state
            .live
            .keys()
            .filter(|id| id.as_str().starts_with(prefix))
            .collect();
        match matches.as_slice() {
            [id] => Ok((*id).clone()),
            [] => Err(SnapshotError::not_found(format!(
                "no live node matches '{}'",
                prefix
            ))),
            _ => Err(SnapshotError::not_found(format!(
                "'{}' is ambiguous ({} live nodes match)",
                prefix,
                matches.len()
            ))),
        }
    }

    /// Make the next checkin of `id` fail with a store failure
    pub fn fail_checkin_of(&self, id: &LiveId) {
        self.checkin_failures.lock().insert(id.clone());
    }

    /// Make the next property write, creation or deletion of `id` fail with
    /// a store failure
    pub fn fail_write_of(&self, id: &LiveId) {
        self.write_failures.lock().insert(id.clone());
    }

    /// Number of live and version nodes held
    pub fn node_counts(&self) -> (usize, usize) {
        let state = self.state.read();
        (state.live.len(), state.versions.len())
    }

    /// Store metadata
    pub fn metadata(&self) -> StoreMetadata {
        self.metadata.read().clone()
    }

    /// Persist the committed state to `dir`
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::TransactionActive`] while a transaction is open
    /// - [`SnapshotError::Io`] / [`SnapshotError::Bincode`] on write failures
    pub fn save(&self, dir: &Path) -> Result<()> {
        if self.active.lock().is_some() {
            return Err(SnapshotError::TransactionActive);
        }
        fs::create_dir_all(dir)?;

        let state_bytes = {
            let state = self.state.read();
            bincode::serde::encode_to_vec(&*state, bincode::config::standard())?
        };
        atomic_write(dir, STATE_FILE, &state_bytes)?;

        let metadata_json = {
            let mut metadata = self.metadata.write();
            metadata.updated_at = Utc::now();
            metadata.treesnap_version = env!("CARGO_PKG_VERSION").to_string();
            serde_json::to_string_pretty(&*metadata)?
        };
        atomic_write(dir, METADATA_FILE, metadata_json.as_bytes())?;

        info!("Saved store to {:?} ({} bytes)", dir, state_bytes.len());
        Ok(())
    }

    /// Load a store previously written by [`MemoryStore::save`]
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::NotFound`] if `dir` holds no store
    /// - [`SnapshotError::StoreFailure`] on an unsupported format version
    pub fn open(dir: &Path) -> Result<Self> {
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Err(SnapshotError::not_found(format!("no store at {:?}", dir)));
        }
        let metadata: StoreMetadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)?;
        if metadata.format_version != FORMAT_VERSION {
            return Err(SnapshotError::store(format!(
                "unsupported store format version {} (expected {})",
                metadata.format_version, FORMAT_VERSION
            )));
        }

        let state_bytes = fs::read(dir.join(STATE_FILE))?;
        let (state, _): (StoreState, _) =
            bincode::serde::decode_from_slice(&state_bytes, bincode::config::standard())?;

        info!(
            "Opened store at {:?}: {} live nodes, {} versions",
            dir,
            state.live.len(),
            state.versions.len()
        );
        Ok(Self::from_parts(state, metadata))
    }
}

fn atomic_write(dir: &Path, name: &str, content: &[u8]) -> Result<()> {
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(content)?;
    file.as_file().sync_all()?;
    file.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}

impl VersionedTreeStore for MemoryStore {
    fn begin(&self) -> Result<TxToken> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(SnapshotError::TransactionActive);
        }
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed);
        *active = Some(ActiveTx {
            id,
            savepoint: self.state.read().clone(),
        });
        Ok(TxToken::new(id))
    }

    fn commit(&self, tx: &TxToken) -> Result<()> {
        self.check(tx)?;
        *self.active.lock() = None;
        Ok(())
    }

    fn rollback(&self, tx: &TxToken) -> Result<()> {
        self.check(tx)?;
        if let Some(active) = self.active.lock().take() {
            *self.state.write() = active.savepoint;
            debug!("Restored savepoint of transaction {}", active.id);
        }
        Ok(())
    }

    fn live_node(&self, tx: &TxToken, id: &LiveId) -> Result<LiveNode> {
        self.check(tx)?;
        self.state.read().live(id).cloned()
    }

    fn live_exists(&self, tx: &TxToken, id: &LiveId) -> Result<bool> {
        self.check(tx)?;
        Ok(self.state.read().live.contains_key(id))
    }

    fn history(&self, tx: &TxToken, id: &LiveId) -> Result<Vec<VersionId>> {
        self.check(tx)?;
        Ok(self
            .state
            .read()
            .histories
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    fn resolve_label(
        &self,
        tx: &TxToken,
        id: &LiveId,
        label: &VersionLabel,
    ) -> Result<Option<VersionId>> {
        self.check(tx)?;
        let state = self.state.read();
        let Some(history) = state.histories.get(id) else {
            return Ok(None);
        };
        for version_id in history {
            if &state.version(version_id)?.label == label {
                trace!("Resolved {}@{} to {}", id.short(), label, version_id.short());
                return Ok(Some(version_id.clone()));
            }
        }
        Ok(None)
    }

    fn checkin(
        &self,
        tx: &TxToken,
        id: &LiveId,
        policy: BumpPolicy,
        comment: Option<&str>,
        children: Option<Vec<VersionId>>,
    ) -> Result<VersionId> {
        self.check(tx)?;
        let mut state = self.state.write();
        let node = state.live(id)?.clone();
        if !node.versionable {
            return Err(SnapshotError::schema(format!(
                "live node {} is not versionable",
                id
            )));
        }
        if self.checkin_failures.lock().remove(id) {
            return Err(SnapshotError::store(format!("injected checkin failure for {}", id)));
        }

        let kind = match (&node.kind, children) {
            (NodeKind::Leaf, Some(children)) if !children.is_empty() => {
                return Err(SnapshotError::schema(format!(
                    "leaf {} cannot carry child versions",
                    id
                )));
            }
            (NodeKind::Leaf, _) => NodeKind::Leaf,
            (NodeKind::Folder { .. }, Some(children)) => NodeKind::Folder { children },
            (NodeKind::Folder { children: live_children }, None) => NodeKind::Folder {
                children: live_children
                    .iter()
                    .filter_map(|child| state.live.get(child))
                    .filter_map(|child| child.base_version.clone())
                    .collect(),
            },
        };
        for child in kind.children() {
            state.version(child)?;
        }

        let last_label = match state.histories.get(id).and_then(|h| h.last()) {
            Some(last) => state.version(last)?.label,
            None => VersionLabel::ZERO,
        };
        let label = last_label.bump(policy);

        let version_id = VersionId::generate();
        state.versions.insert(
            version_id.clone(),
            VersionNode {
                id: version_id.clone(),
                live_id: id.clone(),
                label,
                kind,
                properties: node.properties,
                comment: comment.map(str::to_string),
                created_at: Utc::now(),
            },
        );
        state
            .histories
            .entry(id.clone())
            .or_default()
            .push(version_id.clone());

        let live = state.live_mut(id)?;
        live.base_version = Some(version_id.clone());
        live.base_label = Some(label);
        live.checked_out = false;

        debug!("Checked in {} as {} ({})", id.short(), label, version_id.short());
        Ok(version_id)
    }

    fn checkout(&self, tx: &TxToken, id: &LiveId) -> Result<()> {
        self.check(tx)?;
        self.state.write().live_mut(id)?.checked_out = true;
        Ok(())
    }

    fn write_properties(&self, tx: &TxToken, id: &LiveId, properties: PropertyMap) -> Result<()> {
        self.check(tx)?;
        self.check_write(id)?;
        let mut state = self.state.write();
        let node = state.live_mut(id)?;
        node.properties = properties;
        node.checked_out = true;
        Ok(())
    }

    fn set_base_version(&self, tx: &TxToken, id: &LiveId, version: &VersionId) -> Result<()> {
        self.check(tx)?;
        let mut state = self.state.write();
        let frozen = state.version(version)?;
        if &frozen.live_id != id {
            return Err(SnapshotError::invariant(format!(
                "version {} belongs to {}, not {}",
                version, frozen.live_id, id
            )));
        }
        let label = frozen.label;
        let node = state.live_mut(id)?;
        node.base_version = Some(version.clone());
        node.base_label = Some(label);
        Ok(())
    }

    fn create_live_child(
        &self,
        tx: &TxToken,
        parent: &LiveId,
        template: NodeTemplate,
    ) -> Result<LiveId> {
        self.check(tx)?;
        if let Some(id) = &template.id {
            self.check_write(id)?;
        }
        let mut state = self.state.write();
        state.folder_children_mut(parent)?;
        let id = state.insert_live(Some(parent), template)?;
        state.folder_children_mut(parent)?.push(id.clone());
        trace!("Created {} under {}", id.short(), parent.short());
        Ok(id)
    }

    fn delete_live(&self, tx: &TxToken, id: &LiveId) -> Result<()> {
        self.check(tx)?;
        self.check_write(id)?;
        let mut state = self.state.write();
        state.detach(id)?;

        let mut pending = vec![id.clone()];
        let mut removed = 0usize;
        while let Some(current) = pending.pop() {
            if let Some(node) = state.live.remove(&current) {
                pending.extend(node.children().iter().cloned());
                removed += 1;
            }
        }
        debug!("Deleted {} ({} live nodes)", id.short(), removed);
        Ok(())
    }

    fn move_live(&self, tx: &TxToken, id: &LiveId, new_parent: &LiveId) -> Result<()> {
        self.check(tx)?;
        let mut state = self.state.write();
        state.live(id)?;
        state.folder_children_mut(new_parent)?;
        if state.is_within(new_parent, id) {
            return Err(SnapshotError::invariant(format!(
                "cannot move {} below itself",
                id
            )));
        }
        state.detach(id)?;
        state.folder_children_mut(new_parent)?.push(id.clone());
        state.live_mut(id)?.parent = Some(new_parent.clone());
        trace!("Moved {} under {}", id.short(), new_parent.short());
        Ok(())
    }

    fn order_live_children(&self, tx: &TxToken, parent: &LiveId, order: &[LiveId]) -> Result<()> {
        self.check(tx)?;
        let mut state = self.state.write();
        let children = state.folder_children_mut(parent)?;

        let listed: IdSet<&LiveId> = {
            let mut set = id_set();
            set.extend(order.iter());
            set
        };
        if let Some(stranger) = order.iter().find(|id| !children.contains(*id)) {
            return Err(SnapshotError::invariant(format!(
                "{} is not a child of {}",
                stranger, parent
            )));
        }

        let mut reordered: Vec<LiveId> = order.to_vec();
        reordered.extend(children.iter().filter(|c| !listed.contains(c)).cloned());
        *children = reordered;
        Ok(())
    }

    fn version_node(&self, id: &VersionId) -> Result<VersionNode> {
        self.state.read().version(id).cloned()
    }
}
