//! End-to-end snapshot and restore scenarios
//!
//! Builds realistic document trees through the public API, then checks label
//! propagation, restore round-trips and transactional behavior.

use ::treesnap::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tempfile::TempDir;
use tracing::info;

/// Test harness holding a store and the ids of a named tree
pub struct TreeHarness {
    pub store: MemoryStore,
    pub ids: BTreeMap<&'static str, LiveId>,
}

impl TreeHarness {
    /// Build the reference document tree
    ///
    /// ```text
    /// root
    /// ├── folder1
    /// │   ├── folder11
    /// │   ├── doc12
    /// │   └── folder13
    /// │       └── folder131
    /// │           ├── doc1311   (checked in once)
    /// │           └── doc1312   (checked in once, then edited)
    /// └── folder2
    /// ```
    pub fn document_tree() -> Self {
        let store = MemoryStore::new();
        let ids = in_transaction(&store, |tx| {
            let t = tx.token();
            let mut ids = BTreeMap::new();
            let root = store.create_root(t, NodeTemplate::folder("root"))?;
            let folder1 = store.create_live_child(t, &root, NodeTemplate::folder("folder1"))?;
            let folder11 = store.create_live_child(t, &folder1, NodeTemplate::folder("folder11"))?;
            let doc12 = store.create_live_child(t, &folder1, NodeTemplate::leaf("doc12"))?;
            let folder13 = store.create_live_child(t, &folder1, NodeTemplate::folder("folder13"))?;
            let folder131 = store.create_live_child(t, &folder13, NodeTemplate::folder("folder131"))?;
            let doc1311 = store.create_live_child(t, &folder131, NodeTemplate::leaf("doc1311"))?;
            let doc1312 = store.create_live_child(t, &folder131, NodeTemplate::leaf("doc1312"))?;
            let folder2 = store.create_live_child(t, &root, NodeTemplate::folder("folder2"))?;

            store.checkin(t, &doc1311, BumpPolicy::Minor, None, None)?;
            store.checkin(t, &doc1312, BumpPolicy::Minor, None, None)?;
            let mut props = store.live_node(t, &doc1312)?.properties;
            props.insert("content".to_string(), "edited after checkin".to_string());
            store.write_properties(t, &doc1312, props)?;

            ids.insert("root", root);
            ids.insert("folder1", folder1);
            ids.insert("folder11", folder11);
            ids.insert("doc12", doc12);
            ids.insert("folder13", folder13);
            ids.insert("folder131", folder131);
            ids.insert("doc1311", doc1311);
            ids.insert("doc1312", doc1312);
            ids.insert("folder2", folder2);
            Ok(ids)
        })
        .unwrap();
        Self { store, ids }
    }

    pub fn id(&self, name: &str) -> LiveId {
        self.ids[name].clone()
    }

    pub fn root(&self) -> SnapshotableNode<'_, MemoryStore> {
        SnapshotableNode::new(&self.store, self.id("root")).unwrap()
    }

    /// Change one property of a live node
    pub fn edit(&self, name: &str, key: &str, value: &str) {
        let id = self.id(name);
        in_transaction(&self.store, |tx| {
            let mut props = self.store.live_node(tx.token(), &id)?.properties;
            props.insert(key.to_string(), value.to_string());
            self.store.write_properties(tx.token(), &id, props)
        })
        .unwrap();
    }

    pub fn delete(&self, name: &str) {
        let id = self.id(name);
        in_transaction(&self.store, |tx| self.store.delete_live(tx.token(), &id)).unwrap();
    }

    pub fn live_hash(&self) -> String {
        let root = self.id("root");
        in_transaction(&self.store, |tx| live_tree_hash(tx, &root)).unwrap()
    }

    pub fn live_children(&self, name: &str) -> Vec<LiveId> {
        let id = self.id(name);
        in_transaction(&self.store, |tx| self.store.get_live_children(tx.token(), &id)).unwrap()
    }
}

/// Title -> label of every node in a snapshot
pub fn labels(snapshot: &Snapshot<'_, MemoryStore>) -> BTreeMap<String, String> {
    snapshot
        .flat_tree()
        .map(|node| {
            let node = node.unwrap();
            (node.title().to_string(), node.label().to_string())
        })
        .collect()
}

fn expect_labels(snapshot: &Snapshot<'_, MemoryStore>, expected: &[(&str, &str)]) {
    let actual = labels(snapshot);
    for (title, label) in expected {
        assert_eq!(
            actual.get(*title).map(String::as_str),
            Some(*label),
            "label of {}",
            title
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_document_tree_lifecycle() {
        let harness = TreeHarness::document_tree();
        let root = harness.root();

        // First snapshot: everything new is 0.1, the edited document 0.2
        let s1 = root.create_snapshot(BumpPolicy::Minor).unwrap();
        expect_labels(
            &s1,
            &[
                ("root", "0.1"),
                ("folder1", "0.1"),
                ("folder11", "0.1"),
                ("doc12", "0.1"),
                ("folder13", "0.1"),
                ("folder131", "0.1"),
                ("doc1311", "0.1"),
                ("doc1312", "0.2"),
                ("folder2", "0.1"),
            ],
        );

        // Idempotent
        let again = root.create_snapshot(BumpPolicy::Minor).unwrap();
        assert_eq!(again.id(), s1.id());
        assert_eq!(again.to_canonical_string().unwrap(), s1.to_canonical_string().unwrap());

        // Editing one leaf bumps exactly its path
        harness.edit("doc1311", "content", "new text");
        let s2 = root.create_snapshot(BumpPolicy::Minor).unwrap();
        expect_labels(
            &s2,
            &[
                ("doc1311", "0.2"),
                ("folder131", "0.2"),
                ("folder13", "0.2"),
                ("folder1", "0.2"),
                ("root", "0.2"),
                ("folder11", "0.1"),
                ("doc12", "0.1"),
                ("folder2", "0.1"),
                ("doc1312", "0.2"),
            ],
        );
        let hash_at_s2 = harness.live_hash();
        let canonical_s2 = s2.to_canonical_string().unwrap();

        // Deleting a folder bumps only its ancestors
        harness.delete("folder13");
        let s3 = root.create_snapshot(BumpPolicy::Minor).unwrap();
        let after_delete = labels(&s3);
        assert_eq!(after_delete.len(), 5);
        expect_labels(
            &s3,
            &[
                ("folder1", "0.3"),
                ("root", "0.3"),
                ("folder11", "0.1"),
                ("doc12", "0.1"),
                ("folder2", "0.1"),
            ],
        );
        assert!(!after_delete.contains_key("folder13"));

        // Restore brings the deleted subtree back, with the same ids
        let (restored, stats) = root.restore(&VersionLabel::new(0, 2)).unwrap();
        assert_eq!(restored.id, harness.id("root"));
        assert_eq!(stats.nodes_recreated, 4);
        assert_eq!(harness.live_hash(), hash_at_s2);
        assert_eq!(
            harness.live_children("folder1"),
            vec![harness.id("folder11"), harness.id("doc12"), harness.id("folder13")]
        );

        // Re-snapshot after restore is a no-op
        let (s4, snap_stats) = root.create_snapshot_with_stats(BumpPolicy::Minor).unwrap();
        assert!(snap_stats.is_noop());
        assert_eq!(s4.id(), s2.id());
        assert_eq!(s4.label(), VersionLabel::new(0, 2));
        assert_eq!(s4.to_canonical_string().unwrap(), canonical_s2);
        info!("document tree lifecycle passed");
    }

    #[test]
    fn test_edit_after_restore_bumps_past_newest_label() {
        let harness = TreeHarness::document_tree();
        let root = harness.root();
        root.create_snapshot(BumpPolicy::Minor).unwrap();
        harness.edit("doc12", "content", "v2");
        root.create_snapshot(BumpPolicy::Minor).unwrap();

        root.restore(&VersionLabel::new(0, 1)).unwrap();
        harness.edit("doc12", "content", "v3");
        let s3 = root.create_snapshot(BumpPolicy::Minor).unwrap();

        // History already holds 0.2, so the next label is 0.3
        expect_labels(&s3, &[("root", "0.3"), ("folder1", "0.3"), ("doc12", "0.3"), ("folder2", "0.1")]);
    }

    #[test]
    fn test_restore_unknown_label_mutates_nothing() {
        let harness = TreeHarness::document_tree();
        let root = harness.root();
        root.create_snapshot(BumpPolicy::Minor).unwrap();
        harness.delete("folder2");
        let before = harness.live_hash();

        let err = root.restore(&VersionLabel::new(4, 2)).unwrap_err();
        assert!(matches!(err, SnapshotError::LabelNotFound { .. }));
        assert!(err.is_not_found());
        assert_eq!(harness.live_hash(), before);
        assert_eq!(harness.live_children("root"), vec![harness.id("folder1")]);
    }

    #[test]
    fn test_failed_checkin_rolls_back_whole_snapshot() {
        let harness = TreeHarness::document_tree();
        let root = harness.root();
        let s1 = root.create_snapshot(BumpPolicy::Minor).unwrap();
        let (_, versions_before) = harness.store.node_counts();

        harness.edit("doc1311", "content", "doomed");
        harness.store.fail_checkin_of(&harness.id("folder131"));
        let err = root.create_snapshot(BumpPolicy::Minor).unwrap_err();
        assert!(matches!(err, SnapshotError::StoreFailure(_)));

        // doc1311 was checked in before the failure; the rollback discarded it
        let (_, versions_after) = harness.store.node_counts();
        assert_eq!(versions_after, versions_before);
        let current = root.current_snapshot().unwrap().unwrap();
        assert_eq!(current.id(), s1.id());

        // The injected failure fires once
        let s2 = root.create_snapshot(BumpPolicy::Minor).unwrap();
        expect_labels(&s2, &[("doc1311", "0.2"), ("root", "0.2")]);
    }

    #[test]
    fn test_store_failure_mid_restore_rolls_back_everything() {
        let harness = TreeHarness::document_tree();
        let root = harness.root();
        let s1 = root.create_snapshot(BumpPolicy::Minor).unwrap();

        harness.delete("folder13");
        harness.edit("doc12", "content", "rewritten");
        harness.edit("folder2", "title", "renamed");
        let hash_before = harness.live_hash();
        let root_children = harness.live_children("root");
        let folder1_children = harness.live_children("folder1");

        // doc12 is rewritten and three nodes recreated before this fails
        harness.store.fail_write_of(&harness.id("doc1312"));
        let err = root.restore(&s1.label()).unwrap_err();
        assert!(matches!(err, SnapshotError::StoreFailure(_)));

        assert_eq!(harness.live_hash(), hash_before);
        assert_eq!(harness.live_children("root"), root_children);
        assert_eq!(harness.live_children("folder1"), folder1_children);
        let doc12 = in_transaction(&harness.store, |tx| harness.store.live_node(tx.token(), &harness.id("doc12"))).unwrap();
        assert_eq!(doc12.properties.get("content").map(String::as_str), Some("rewritten"));

        let (_, stats) = root.restore(&s1.label()).unwrap();
        assert_eq!(stats.nodes_recreated, 4);
    }

    #[test]
    fn test_major_policy() {
        let harness = TreeHarness::document_tree();
        let root = harness.root();
        let s1 = root.create_snapshot(BumpPolicy::Major).unwrap();
        expect_labels(&s1, &[("root", "1.0"), ("doc1311", "0.1"), ("doc1312", "1.0")]);

        harness.edit("folder2", "color", "blue");
        let s2 = root.create_snapshot(BumpPolicy::Major).unwrap();
        expect_labels(&s2, &[("root", "2.0"), ("folder2", "2.0"), ("folder1", "1.0")]);
    }

    #[test]
    fn test_restore_subtree_only() {
        let harness = TreeHarness::document_tree();
        let root = harness.root();
        root.create_snapshot(BumpPolicy::Minor).unwrap();

        harness.edit("doc1311", "content", "kept");
        harness.edit("doc12", "content", "reverted");
        root.create_snapshot(BumpPolicy::Minor).unwrap();

        // Restoring folder13 alone leaves the edited doc12 in place
        let folder13 = SnapshotableNode::new(&harness.store, harness.id("folder13")).unwrap();
        folder13.restore(&VersionLabel::new(0, 1)).unwrap();

        let (doc1311, doc12) = in_transaction(&harness.store, |tx| {
            Ok((
                harness.store.live_node(tx.token(), &harness.id("doc1311"))?,
                harness.store.live_node(tx.token(), &harness.id("doc12"))?,
            ))
        })
        .unwrap();
        assert_eq!(doc1311.properties.get("content"), None);
        assert_eq!(doc1311.version_label(), "0.1+");
        assert_eq!(doc12.properties.get("content").map(String::as_str), Some("reverted"));
    }

    #[test]
    fn test_persisted_store_keeps_history() {
        let dir = TempDir::new().unwrap();
        let harness = TreeHarness::document_tree();
        let s1_canonical = {
            let root = harness.root();
            root.create_snapshot(BumpPolicy::Minor)
                .unwrap()
                .to_canonical_string()
                .unwrap()
        };
        harness.store.save(dir.path()).unwrap();

        let reopened = MemoryStore::open(dir.path()).unwrap();
        let root = SnapshotableNode::new(&reopened, harness.id("root")).unwrap();
        let current = root.current_snapshot().unwrap().unwrap();
        assert_eq!(current.to_canonical_string().unwrap(), s1_canonical);

        // Snapshotting the reopened store without edits is a no-op
        let (_, stats) = root.create_snapshot_with_stats(BumpPolicy::Minor).unwrap();
        assert!(stats.is_noop());
    }

    #[test]
    fn test_random_edits_keep_siblings_independent() {
        let mut rng = StdRng::seed_from_u64(42);
        let harness = TreeHarness::document_tree();
        let root = harness.root();
        let leaves = ["doc12", "doc1311", "doc1312"];
        let mut previous = labels(&root.create_snapshot(BumpPolicy::Minor).unwrap());

        for round in 0..20 {
            let leaf = leaves[rng.random_range(0..leaves.len())];
            harness.edit(leaf, "content", &format!("round {}", round));
            let current = labels(&root.create_snapshot(BumpPolicy::Minor).unwrap());

            let path: &[&str] = match leaf {
                "doc12" => &["doc12", "folder1", "root"],
                "doc1311" => &["doc1311", "folder131", "folder13", "folder1", "root"],
                _ => &["doc1312", "folder131", "folder13", "folder1", "root"],
            };
            for (title, label) in &current {
                let old = &previous[title];
                if path.contains(&title.as_str()) {
                    let old: VersionLabel = old.parse().unwrap();
                    let new: VersionLabel = label.parse().unwrap();
                    assert!(new > old, "{} should have been bumped", title);
                } else {
                    assert_eq!(label, old, "{} should be untouched", title);
                }
            }
            previous = current;
        }
    }
}
