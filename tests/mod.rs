//! Main test module for treesnap
//!
//! This module includes all test suites:
//! - Integration tests for document tree scenarios
//! - Property-based tests for the snapshot laws
//! - Edge cases for empty, unversioned and malformed trees

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::treesnap::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_folder_snapshot() {
        let store = MemoryStore::new();
        let root = in_transaction(&store, |tx| store.create_root(tx.token(), NodeTemplate::folder("empty"))).unwrap();

        let node = SnapshotableNode::new(&store, root).unwrap();
        let snapshot = node.create_snapshot(BumpPolicy::Minor).unwrap();
        assert_eq!(snapshot.children().len(), 0);
        assert_eq!(snapshot.flat_tree().count(), 1);
        assert_eq!(snapshot.label(), VersionLabel::new(0, 1));
    }

    #[test]
    fn test_single_leaf_root() {
        let store = MemoryStore::new();
        let doc = in_transaction(&store, |tx| store.create_root(tx.token(), NodeTemplate::leaf("memo"))).unwrap();

        let node = SnapshotableNode::new(&store, doc).unwrap();
        let snapshot = node.create_snapshot(BumpPolicy::Major).unwrap();
        assert!(!snapshot.document().is_folder());
        assert_eq!(snapshot.label().to_string(), "1.0");
        assert!(snapshot.children().next().is_none());
    }

    #[test]
    fn test_unversioned_root_is_rejected() {
        let store = MemoryStore::new();
        let root = in_transaction(&store, |tx| {
            store.create_root(tx.token(), NodeTemplate::folder("scratch").unversioned())
        })
        .unwrap();

        let err = SnapshotableNode::new(&store, root).unwrap_err();
        assert!(matches!(err, SnapshotError::SchemaMismatch(_)));
    }

    #[test]
    fn test_missing_node_is_not_found() {
        let store = MemoryStore::new();
        let err = SnapshotableNode::new(&store, LiveId::from("nope")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_deleted_root_cannot_be_snapshotted_again() {
        let store = MemoryStore::new();
        let root = in_transaction(&store, |tx| store.create_root(tx.token(), NodeTemplate::folder("root"))).unwrap();
        let node = SnapshotableNode::new(&store, root.clone()).unwrap();
        node.create_snapshot(BumpPolicy::Minor).unwrap();

        in_transaction(&store, |tx| store.delete_live(tx.token(), &root)).unwrap();
        assert!(node.create_snapshot(BumpPolicy::Minor).unwrap_err().is_not_found());
    }

    #[test]
    fn test_unversioned_children_are_omitted() {
        let store = MemoryStore::new();
        let root = in_transaction(&store, |tx| {
            let t = tx.token();
            let root = store.create_root(t, NodeTemplate::folder("root"))?;
            store.create_live_child(t, &root, NodeTemplate::leaf("kept"))?;
            store.create_live_child(t, &root, NodeTemplate::folder("cache").unversioned())?;
            Ok(root)
        })
        .unwrap();

        let node = SnapshotableNode::new(&store, root).unwrap();
        let (snapshot, stats) = node.create_snapshot_with_stats(BumpPolicy::Minor).unwrap();
        assert_eq!(stats.nodes_skipped, 1);
        let titles: Vec<String> = snapshot
            .children()
            .map(|child| child.unwrap().title().to_string())
            .collect();
        assert_eq!(titles, vec!["kept".to_string()]);
    }

    #[test]
    fn test_special_titles_survive_restore() {
        let store = MemoryStore::new();
        let titles = ["with spaces", "ünïcödé", "quote\"d", "(paren)", "a/b\\c", ""];
        let root = in_transaction(&store, |tx| {
            let t = tx.token();
            let root = store.create_root(t, NodeTemplate::folder("root"))?;
            for title in titles {
                store.create_live_child(t, &root, NodeTemplate::leaf(title))?;
            }
            Ok(root)
        })
        .unwrap();

        let node = SnapshotableNode::new(&store, root.clone()).unwrap();
        let snapshot = node.create_snapshot(BumpPolicy::Minor).unwrap();
        let hash = in_transaction(&store, |tx| live_tree_hash(tx, &root)).unwrap();

        let children = in_transaction(&store, |tx| store.get_live_children(tx.token(), &root)).unwrap();
        in_transaction(&store, |tx| {
            for child in &children {
                store.delete_live(tx.token(), child)?;
            }
            Ok(())
        })
        .unwrap();

        snapshot.restore(&snapshot.label()).unwrap();
        assert_eq!(in_transaction(&store, |tx| live_tree_hash(tx, &root)).unwrap(), hash);
    }

    #[test]
    fn test_deep_tree_within_limit() {
        let store = MemoryStore::new();
        let root = in_transaction(&store, |tx| {
            let t = tx.token();
            let root = store.create_root(t, NodeTemplate::folder("level0"))?;
            let mut parent = root.clone();
            for level in 1..100 {
                parent = store.create_live_child(t, &parent, NodeTemplate::folder(format!("level{}", level)))?;
            }
            Ok(root)
        })
        .unwrap();

        let node = SnapshotableNode::new(&store, root).unwrap();
        let snapshot = node.create_snapshot(BumpPolicy::Minor).unwrap();
        assert_eq!(snapshot.flat_tree().count(), 100);
    }

    #[test]
    fn test_depth_limit_from_config() {
        let store = MemoryStore::new();
        let root = in_transaction(&store, |tx| {
            let t = tx.token();
            let root = store.create_root(t, NodeTemplate::folder("a"))?;
            let b = store.create_live_child(t, &root, NodeTemplate::folder("b"))?;
            store.create_live_child(t, &b, NodeTemplate::leaf("c"))?;
            Ok(root)
        })
        .unwrap();

        let config = SnapshotConfigBuilder::new().max_depth(1).build().unwrap();
        let node = SnapshotableNode::new(&store, root).unwrap().with_config(config);
        let err = node.create_snapshot(BumpPolicy::Minor).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(store.node_counts().1, 0);
    }

    #[test]
    fn test_second_transaction_is_refused() {
        let store = MemoryStore::new();
        let tx = Transaction::begin(&store).unwrap();
        assert!(matches!(Transaction::begin(&store), Err(SnapshotError::TransactionActive)));
        tx.commit().unwrap();
        assert!(Transaction::begin(&store).is_ok());
    }

    #[test]
    fn test_open_missing_store() {
        let dir = TempDir::new().unwrap();
        let err = MemoryStore::open(&dir.path().join("absent")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_config_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let config = SnapshotConfigBuilder::new()
            .bump_policy(BumpPolicy::Major)
            .checkin_comment("nightly")
            .build()
            .unwrap();
        config.save(&path).unwrap();
        assert_eq!(SnapshotConfig::load(&path).unwrap().checkin_comment.as_deref(), Some("nightly"));
    }
}
