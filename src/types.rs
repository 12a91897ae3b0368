//! Core data types used throughout the treesnap library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Identity**: [`LiveId`], [`VersionId`] - opaque, arena-style node identifiers
//! - **Versioning**: [`VersionLabel`], [`BumpPolicy`] - per-node version numbers
//! - **Shape**: [`NodeKind`], [`PropertyMap`] - folder/leaf tagged union and property bag
//! - **Operations**: [`SnapshotStats`], [`RestoreStats`] - counters reported by the engine
//!
//! ## Examples
//!
//! ```rust
//! use treesnap::types::{BumpPolicy, VersionLabel};
//!
//! let label = VersionLabel::ZERO.bump(BumpPolicy::Minor);
//! assert_eq!(label.to_string(), "0.1");
//! assert_eq!(label.bump(BumpPolicy::Major).to_string(), "1.0");
//! ```

use crate::error::{Result, SnapshotError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Property holding the human-readable title of a node
pub const TITLE_PROPERTY: &str = "title";

/// Ordered property bag of a live or version node
///
/// A `BTreeMap` keeps iteration order stable, which the canonical
/// serialization and content hashes rely on.
pub type PropertyMap = BTreeMap<String, String>;

macro_rules! node_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random id
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the id as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// First 8 characters, for logs and display
            pub fn short(&self) -> &str {
                self.0
                    .char_indices()
                    .nth(8)
                    .map_or(self.0.as_str(), |(i, _)| &self.0[..i])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

node_id!(
    /// Stable identifier of a live (working copy) node
    LiveId
);

node_id!(
    /// Stable identifier of an immutable version node
    VersionId
);

/// Whether a required version increment is minor or major
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpPolicy {
    /// Increment the minor number only
    #[default]
    Minor,
    /// Increment the major number and reset minor to 0
    Major,
}

impl fmt::Display for BumpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BumpPolicy::Minor => f.write_str("minor"),
            BumpPolicy::Major => f.write_str("major"),
        }
    }
}

/// A `(major, minor)` version number with total order
///
/// Labels are per live node, not global: two unrelated nodes may both be at
/// `0.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionLabel {
    /// Major number
    pub major: u32,
    /// Minor number
    pub minor: u32,
}

impl VersionLabel {
    /// Label of a node that has never been checked in
    pub const ZERO: VersionLabel = VersionLabel { major: 0, minor: 0 };

    /// Create a label
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Next label under the given policy
    pub fn bump(self, policy: BumpPolicy) -> Self {
        match policy {
            BumpPolicy::Minor => Self::new(self.major, self.minor + 1),
            BumpPolicy::Major => Self::new(self.major + 1, 0),
        }
    }
}

impl fmt::Display for VersionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for VersionLabel {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SnapshotError::InvalidLabel(s.to_string());
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// Folder/leaf tagged union, generic over the child reference type
///
/// Live nodes use `NodeKind<LiveId>`, version nodes `NodeKind<VersionId>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind<C> {
    /// Container with an ordered child list
    Folder {
        /// Ordered child references
        children: Vec<C>,
    },
    /// Childless item
    Leaf,
}

impl<C> NodeKind<C> {
    /// Empty folder
    pub fn folder() -> Self {
        NodeKind::Folder { children: Vec::new() }
    }

    /// Whether this is a folder
    pub fn is_folder(&self) -> bool {
        matches!(self, NodeKind::Folder { .. })
    }

    /// Ordered children, empty for leaves
    pub fn children(&self) -> &[C] {
        match self {
            NodeKind::Folder { children } => children,
            NodeKind::Leaf => &[],
        }
    }
}

/// A child reference as recorded on a folder version: id plus label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    /// Child version node
    pub version_id: VersionId,
    /// Label of that version
    pub label: VersionLabel,
}

/// Counters accumulated while building a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Versionable nodes visited
    pub nodes_visited: usize,
    /// Nodes checked in during this snapshot
    pub versions_created: usize,
    /// Nodes whose previous version was reused
    pub versions_reused: usize,
    /// Children omitted because they lack the versioning capability
    pub nodes_skipped: usize,
}

impl SnapshotStats {
    /// Whether the snapshot created no new version at all
    pub fn is_noop(&self) -> bool {
        self.versions_created == 0
    }
}

/// Counters accumulated while restoring a subtree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreStats {
    /// Live nodes whose properties or base version were overwritten
    pub nodes_updated: usize,
    /// Live nodes recreated from the snapshot
    pub nodes_recreated: usize,
    /// Live nodes moved under the folder that held them at snapshot time
    pub nodes_moved: usize,
    /// Live nodes removed because the snapshot did not contain them
    pub nodes_removed: usize,
    /// Folders whose child order had to be rewritten
    pub nodes_reordered: usize,
}

impl RestoreStats {
    /// Total number of live-tree mutations
    pub fn total_mutations(&self) -> usize {
        self.nodes_updated
            + self.nodes_recreated
            + self.nodes_moved
            + self.nodes_removed
            + self.nodes_reordered
    }
}
