//! In-memory model of live and version nodes
//!
//! Both generations reference their children by id, never by pointer, so the
//! live tree and every frozen generation can live side by side in an
//! id-keyed arena without ownership cycles.

use crate::types::{LiveId, NodeKind, PropertyMap, VersionId, VersionLabel, TITLE_PROPERTY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mutable working copy of a folder or leaf
///
/// Owned by the store; the engine only reads and writes it through
/// [`VersionedTreeStore`](crate::store::VersionedTreeStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveNode {
    /// Stable id
    pub id: LiveId,
    /// Parent folder, `None` for roots
    pub parent: Option<LiveId>,
    /// Folder with ordered live children, or leaf
    pub kind: NodeKind<LiveId>,
    /// Current properties
    pub properties: PropertyMap,
    /// Whether the node's schema carries the versioning capability
    pub versionable: bool,
    /// Version this working copy derives from (last checkin or restore)
    pub base_version: Option<VersionId>,
    /// Label of `base_version`
    pub base_label: Option<VersionLabel>,
    /// Whether the node has been made editable since its last checkin
    pub checked_out: bool,
}

impl LiveNode {
    /// Title property, if set
    pub fn title(&self) -> Option<&str> {
        self.properties.get(TITLE_PROPERTY).map(String::as_str)
    }

    /// Whether this node is a folder
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    /// Ordered live children
    pub fn children(&self) -> &[LiveId] {
        self.kind.children()
    }

    /// Display label: `major.minor`, suffixed with `+` while checked out,
    /// empty when the node was never versioned.
    pub fn version_label(&self) -> String {
        match self.base_label {
            None => String::new(),
            Some(label) if self.checked_out => format!("{}+", label),
            Some(label) => label.to_string(),
        }
    }
}

/// Immutable frozen copy of a live node
///
/// Once created, neither the property map nor the child list of a version
/// node ever changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionNode {
    /// Stable id, distinct from the live counterpart's
    pub id: VersionId,
    /// Originating live node
    pub live_id: LiveId,
    /// Label within the live node's history
    pub label: VersionLabel,
    /// Folder with ordered child version ids fixed at checkin, or leaf
    pub kind: NodeKind<VersionId>,
    /// Frozen properties
    pub properties: PropertyMap,
    /// Checkin comment
    pub comment: Option<String>,
    /// Checkin time
    pub created_at: DateTime<Utc>,
}

impl VersionNode {
    /// Title property, if set
    pub fn title(&self) -> Option<&str> {
        self.properties.get(TITLE_PROPERTY).map(String::as_str)
    }

    /// Whether this version froze a folder
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    /// Ordered child version ids, empty for leaves
    pub fn children(&self) -> &[VersionId] {
        self.kind.children()
    }
}

/// Description of a live node to create
///
/// # Examples
///
/// ```rust
/// use treesnap::node::NodeTemplate;
///
/// let template = NodeTemplate::leaf("Quarterly report")
///     .with_property("author", "ops")
///     .unversioned();
/// assert!(!template.versionable);
/// assert_eq!(template.properties.get("title").map(String::as_str), Some("Quarterly report"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTemplate {
    /// Explicit id; a fresh one is generated when absent
    pub id: Option<LiveId>,
    /// Folder or leaf
    pub folder: bool,
    /// Initial properties
    pub properties: PropertyMap,
    /// Whether the node participates in versioning
    pub versionable: bool,
}

impl NodeTemplate {
    /// Versionable folder with the given title
    pub fn folder(title: impl Into<String>) -> Self {
        Self::titled(true, title.into())
    }

    /// Versionable leaf with the given title
    pub fn leaf(title: impl Into<String>) -> Self {
        Self::titled(false, title.into())
    }

    fn titled(folder: bool, title: String) -> Self {
        let mut properties = PropertyMap::new();
        properties.insert(TITLE_PROPERTY.to_string(), title);
        Self {
            id: None,
            folder,
            properties,
            versionable: true,
        }
    }

    /// Template that recreates the live counterpart of a version node
    pub fn from_version(version: &VersionNode) -> Self {
        Self {
            id: Some(version.live_id.clone()),
            folder: version.is_folder(),
            properties: version.properties.clone(),
            versionable: true,
        }
    }

    /// Use an explicit id
    pub fn with_id(mut self, id: impl Into<LiveId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set an initial property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Mark the node as lacking the versioning capability
    pub fn unversioned(mut self) -> Self {
        self.versionable = false;
        self
    }
}
