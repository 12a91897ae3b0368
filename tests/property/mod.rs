//! Property-based testing for treesnap
//!
//! Uses proptest to apply random edit sequences to a small document tree and
//! check the snapshot laws after each of them.

use ::treesnap::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

const LEAVES: usize = 6;

/// A random edit applied to the live tree
#[derive(Debug, Clone)]
pub enum TreeOperation {
    /// Set a property on the n-th leaf
    Edit { leaf: usize, value: String },
    /// Retitle the n-th folder
    Rename { folder: usize, title: String },
    /// Delete the n-th leaf if it still exists
    Delete { leaf: usize },
    /// Add a new leaf under the n-th folder
    Add { folder: usize, title: String },
    /// Reverse the children of the n-th folder
    Reverse { folder: usize },
}

fn operation_strategy() -> impl Strategy<Value = TreeOperation> {
    prop_oneof![
        (0..LEAVES, "[a-z]{1,8}").prop_map(|(leaf, value)| TreeOperation::Edit { leaf, value }),
        (0..3usize, "[A-Z][a-z]{2,6}").prop_map(|(folder, title)| TreeOperation::Rename { folder, title }),
        (0..LEAVES).prop_map(|leaf| TreeOperation::Delete { leaf }),
        (0..3usize, "new_[a-z]{1,4}").prop_map(|(folder, title)| TreeOperation::Add { folder, title }),
        (0..3usize).prop_map(|folder| TreeOperation::Reverse { folder }),
    ]
}

/// root -> {a -> {leaf0, leaf1, leaf2}, b -> {leaf3, leaf4, leaf5}}
struct Fixture {
    store: MemoryStore,
    folders: Vec<LiveId>,
    leaves: Vec<LiveId>,
}

impl Fixture {
    fn new() -> Self {
        let store = MemoryStore::new();
        let (folders, leaves) = in_transaction(&store, |tx| {
            let t = tx.token();
            let root = store.create_root(t, NodeTemplate::folder("root"))?;
            let a = store.create_live_child(t, &root, NodeTemplate::folder("a"))?;
            let b = store.create_live_child(t, &root, NodeTemplate::folder("b"))?;
            let mut leaves = Vec::new();
            for i in 0..LEAVES {
                let parent = if i < LEAVES / 2 { &a } else { &b };
                leaves.push(store.create_live_child(t, parent, NodeTemplate::leaf(format!("leaf{}", i)))?);
            }
            Ok((vec![root, a, b], leaves))
        })
        .unwrap();
        Self { store, folders, leaves }
    }

    fn root(&self) -> SnapshotableNode<'_, MemoryStore> {
        SnapshotableNode::new(&self.store, self.folders[0].clone()).unwrap()
    }

    fn apply(&self, op: &TreeOperation) -> Result<()> {
        let store = &self.store;
        in_transaction(store, |tx| {
            let t = tx.token();
            match op {
                TreeOperation::Edit { leaf, value } => {
                    let id = &self.leaves[*leaf];
                    if store.live_exists(t, id)? {
                        let mut props = store.live_node(t, id)?.properties;
                        props.insert("body".to_string(), value.clone());
                        store.write_properties(t, id, props)?;
                    }
                }
                TreeOperation::Rename { folder, title } => {
                    let id = &self.folders[*folder];
                    let mut props = store.live_node(t, id)?.properties;
                    props.insert(types::TITLE_PROPERTY.to_string(), title.clone());
                    store.write_properties(t, id, props)?;
                }
                TreeOperation::Delete { leaf } => {
                    let id = &self.leaves[*leaf];
                    if store.live_exists(t, id)? {
                        store.delete_live(t, id)?;
                    }
                }
                TreeOperation::Add { folder, title } => {
                    store.create_live_child(t, &self.folders[*folder], NodeTemplate::leaf(title.clone()))?;
                }
                TreeOperation::Reverse { folder } => {
                    let id = &self.folders[*folder];
                    let mut children = store.get_live_children(t, id)?;
                    children.reverse();
                    store.order_live_children(t, id, &children)?;
                }
            }
            Ok(())
        })
    }

    fn live_hash(&self) -> String {
        in_transaction(&self.store, |tx| live_tree_hash(tx, &self.folders[0])).unwrap()
    }
}

fn labels_by_id(snapshot: &Snapshot<'_, MemoryStore>) -> BTreeMap<LiveId, VersionLabel> {
    snapshot
        .flat_tree()
        .map(|node| {
            let node = node.unwrap();
            (node.live_id().clone(), node.label())
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_snapshot_is_idempotent(ops in prop::collection::vec(operation_strategy(), 0..12)) {
        let fixture = Fixture::new();
        let root = fixture.root();
        root.create_snapshot(BumpPolicy::Minor).unwrap();
        for op in &ops {
            fixture.apply(op).unwrap();
        }

        let first = root.create_snapshot(BumpPolicy::Minor).unwrap();
        let (second, stats) = root.create_snapshot_with_stats(BumpPolicy::Minor).unwrap();
        prop_assert!(stats.is_noop());
        prop_assert_eq!(first.to_canonical_string().unwrap(), second.to_canonical_string().unwrap());
    }

    #[test]
    fn prop_restore_round_trip(
        before in prop::collection::vec(operation_strategy(), 0..8),
        after in prop::collection::vec(operation_strategy(), 1..8),
    ) {
        let fixture = Fixture::new();
        let root = fixture.root();
        for op in &before {
            fixture.apply(op).unwrap();
        }
        let snapshot = root.create_snapshot(BumpPolicy::Minor).unwrap();
        let label = snapshot.label();
        let hash = fixture.live_hash();
        let canonical = snapshot.to_canonical_string().unwrap();
        prop_assert_eq!(&hash, &snapshot_tree_hash(&snapshot).unwrap());

        for op in &after {
            fixture.apply(op).unwrap();
        }
        root.create_snapshot(BumpPolicy::Minor).unwrap();

        root.restore(&label).unwrap();
        prop_assert_eq!(fixture.live_hash(), hash);

        let (again, stats) = root.create_snapshot_with_stats(BumpPolicy::Minor).unwrap();
        prop_assert!(stats.is_noop());
        prop_assert_eq!(again.label(), label);
        prop_assert_eq!(again.to_canonical_string().unwrap(), canonical);
    }

    #[test]
    fn prop_labels_never_decrease(ops in prop::collection::vec(operation_strategy(), 1..10)) {
        let fixture = Fixture::new();
        let root = fixture.root();
        let mut previous = labels_by_id(&root.create_snapshot(BumpPolicy::Minor).unwrap());

        for op in &ops {
            fixture.apply(op).unwrap();
            let current = labels_by_id(&root.create_snapshot(BumpPolicy::Minor).unwrap());
            for (id, label) in &current {
                if let Some(old) = previous.get(id) {
                    prop_assert!(label >= old, "{} went from {} to {}", id, old, label);
                }
            }
            previous = current;
        }
    }

    #[test]
    fn prop_label_parse_display(major in 0u32..1000, minor in 0u32..1000) {
        let label = VersionLabel::new(major, minor);
        prop_assert_eq!(label.to_string().parse::<VersionLabel>().unwrap(), label);
    }
}
