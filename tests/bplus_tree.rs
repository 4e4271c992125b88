use std::collections::BTreeMap;

use bplus_index::{BPlusTree, Error, NodeKind, SplitPolicy, TreeConfig};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// The number of operations to perform in each proptest case.
const TEST_SIZE: usize = 2_000;

fn key_strategy() -> impl Strategy<Value = i64> {
    // Smaller than TEST_SIZE so inserts collide and removes hit.
    -1_000i64..1_000i64
}

fn order_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![3usize..8, Just(16usize), Just(64usize)]
}

fn chain_keys<K: Copy + Ord, V>(tree: &BPlusTree<K, V>) -> Vec<K> {
    tree.verify_chain().unwrap().into_iter().copied().collect()
}

// ─── Operations enum for driving randomized tests ────────────────────────────

#[derive(Debug, Clone)]
enum TreeOp {
    Insert(i64, i64),
    InsertSparse(i64, i64),
    Delete(i64),
    Remove(i64),
    Search(i64),
    RangeSearch(i64, i64),
}

fn tree_op_strategy() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        5 => (key_strategy(), any::<i64>()).prop_map(|(k, v)| TreeOp::Insert(k, v)),
        1 => (key_strategy(), any::<i64>()).prop_map(|(k, v)| TreeOp::InsertSparse(k, v)),
        2 => key_strategy().prop_map(TreeOp::Delete),
        2 => key_strategy().prop_map(TreeOp::Remove),
        2 => key_strategy().prop_map(TreeOp::Search),
        1 => (key_strategy(), 0i64..200).prop_map(|(low, width)| TreeOp::RangeSearch(low, low + width)),
    ]
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn order_four_dense_scenario() {
    let mut tree = BPlusTree::new(4).unwrap();
    let mut heights = Vec::new();
    for k in [10, 20, 5, 6, 12, 30, 7, 17] {
        tree.insert(k, k.to_string());
        heights.push(tree.height());
    }

    // The leaf reaches `order` keys on the fourth insertion and splits.
    assert_eq!(heights, [1, 1, 1, 2, 2, 2, 2, 2]);
    assert_eq!(
        tree.dump().to_string(),
        "Internal: [10, 20]\n  Leaf: [5, 6, 7]\n  Leaf: [10, 12, 17]\n  Leaf: [20, 30]\n"
    );

    let hits: Vec<i32> = tree.range_search(&6, &17).unwrap().map(|(k, _)| *k).collect();
    assert_eq!(hits, [6, 7, 10, 12, 17]);
    assert_eq!(tree.search(&17).map(String::as_str), Some("17"));
    tree.check_invariants().unwrap();
}

#[test]
fn order_four_delete_scenario() {
    let mut tree = BPlusTree::new(4).unwrap();
    tree.bulk_load((1..=10).map(|k| (k, ())), SplitPolicy::Dense);
    assert_eq!(tree.height(), 3);

    for k in [5, 6, 7] {
        assert!(tree.delete(&k));
        tree.check_invariants().unwrap();
    }

    assert_eq!(chain_keys(&tree), [1, 2, 3, 4, 8, 9, 10]);
    assert_eq!(tree.height(), 2);
    for node in tree.dump().iter().skip(1) {
        let min = match node.kind {
            NodeKind::Leaf => tree.config().min_leaf_keys(),
            NodeKind::Internal => tree.config().min_internal_keys(),
        };
        assert!(node.keys.len() >= min, "{node} is below minimum occupancy");
    }
}

#[test]
fn empty_tree_scenario() {
    let mut tree: BPlusTree<i32, i32> = BPlusTree::new(4).unwrap();
    assert_eq!(tree.search(&1), None);
    assert!(!tree.delete(&1));
    assert_eq!(tree.range_search(&0, &10).unwrap().count(), 0);
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.node_count(), 0);
    assert!(tree.dump().is_empty());
    assert!(tree.verify_chain().unwrap().is_empty());
    tree.check_invariants().unwrap();
}

#[test]
fn tree_emptied_by_deletes_keeps_its_root_leaf() {
    let mut tree = BPlusTree::new(3).unwrap();
    tree.extend((0..50).map(|k| (k, k)));
    for k in 0..50 {
        assert_eq!(tree.remove(&k), Some(k));
    }

    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.dump().to_string(), "Leaf: []\n");
    assert_eq!(tree.range_search(&0, &50).unwrap().count(), 0);
    tree.check_invariants().unwrap();

    tree.insert(7, 7);
    assert_eq!(tree.first_key_value(), Some((&7, &7)));
}

#[test]
fn inverted_range_is_rejected() {
    let mut tree = BPlusTree::new(4).unwrap();
    tree.insert(1, ());
    assert_eq!(tree.range_search(&5, &4).err(), Some(Error::InvalidRange));
    assert_eq!(
        Error::InvalidRange.to_string(),
        "invalid range: low bound is greater than high bound"
    );

    // A single-point range is fine.
    assert_eq!(tree.range_search(&1, &1).unwrap().count(), 1);
}

#[test]
fn orders_below_three_are_rejected() {
    for order in 0..3 {
        assert_eq!(BPlusTree::<u8, u8>::new(order).err(), Some(Error::InvalidOrder { order }));
    }
    assert!(TreeConfig::new(3).is_ok());
}

#[test]
fn duplicate_insert_replaces_value() {
    let mut tree = BPlusTree::new(4).unwrap();
    assert_eq!(tree.insert("k", 1), None);
    assert_eq!(tree.insert("k", 2), Some(1));
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.search("k"), Some(&2));
}

#[test]
fn sparse_loading_packs_ascending_keys() {
    let mut dense = BPlusTree::new(8).unwrap();
    let mut sparse = BPlusTree::new(8).unwrap();
    dense.bulk_load((0..1_000).map(|k| (k, ())), SplitPolicy::Dense);
    sparse.bulk_load((0..1_000).map(|k| (k, ())), SplitPolicy::Sparse);

    assert!(!dense.has_sparse_splits());
    assert!(sparse.has_sparse_splits());
    assert!(sparse.node_count() < dense.node_count());
    assert_eq!(chain_keys(&dense), chain_keys(&sparse));
    dense.check_invariants().unwrap();
    sparse.check_invariants().unwrap();
}

#[test]
fn configured_policy_drives_plain_insert() {
    let config = TreeConfig::new(4).unwrap().with_split_policy(SplitPolicy::Sparse);
    let mut tree = BPlusTree::with_config(config);
    for k in 1..=4 {
        tree.insert(k, ());
    }
    assert_eq!(tree.dump().to_string(), "Internal: [4]\n  Leaf: [1, 2, 3]\n  Leaf: [4]\n");
}

#[test]
fn iterators_follow_key_order() {
    let tree: BPlusTree<_, _> = [(3, 'c'), (1, 'a'), (2, 'b')].into();
    assert_eq!(tree.iter().len(), 3);
    assert_eq!(tree.keys().copied().collect::<Vec<_>>(), [1, 2, 3]);
    assert_eq!(tree.values().copied().collect::<String>(), "abc");
    assert_eq!(format!("{tree:?}"), "{1: 'a', 2: 'b', 3: 'c'}");

    let mut pairs = Vec::new();
    for (k, v) in &tree {
        pairs.push((*k, *v));
    }
    assert_eq!(pairs, [(1, 'a'), (2, 'b'), (3, 'c')]);
}

#[test]
fn clone_is_independent() {
    let mut original: BPlusTree<i32, i32> = (0..100).map(|k| (k, k)).collect();
    let copy = original.clone();
    original.delete(&50);
    assert_eq!(copy.len(), 100);
    assert_eq!(copy.search(&50), Some(&50));
    assert!(copy != original);
    copy.check_invariants().unwrap();
}

#[test]
fn clear_resets_structure() {
    let mut tree: BPlusTree<i32, ()> = (0..500).map(|k| (k, ())).collect();
    tree.clear();
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 0);
    assert_eq!(tree.node_count(), 0);
    tree.check_invariants().unwrap();
}

// ─── Randomized comparison against BTreeMap ──────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Replays a random operation sequence on both `BPlusTree` and `BTreeMap`
    /// and asserts identical results at every step.
    #[test]
    fn tree_ops_match_btreemap(
        order in order_strategy(),
        ops in proptest::collection::vec(tree_op_strategy(), TEST_SIZE),
    ) {
        let mut tree: BPlusTree<i64, i64> = BPlusTree::new(order).unwrap();
        let mut model: BTreeMap<i64, i64> = BTreeMap::new();

        for op in &ops {
            match *op {
                TreeOp::Insert(k, v) => {
                    prop_assert_eq!(tree.insert(k, v), model.insert(k, v), "insert({}, {})", k, v);
                }
                TreeOp::InsertSparse(k, v) => {
                    prop_assert_eq!(
                        tree.insert_with_policy(k, v, SplitPolicy::Sparse),
                        model.insert(k, v),
                        "insert_with_policy({}, {})", k, v
                    );
                }
                TreeOp::Delete(k) => {
                    prop_assert_eq!(tree.delete(&k), model.remove(&k).is_some(), "delete({})", k);
                }
                TreeOp::Remove(k) => {
                    prop_assert_eq!(tree.remove(&k), model.remove(&k), "remove({})", k);
                }
                TreeOp::Search(k) => {
                    prop_assert_eq!(tree.search(&k), model.get(&k), "search({})", k);
                }
                TreeOp::RangeSearch(low, high) => {
                    let hits: Vec<_> = tree.range_search(&low, &high).unwrap().collect();
                    let expected: Vec<_> = model.range(low..=high).collect();
                    prop_assert_eq!(hits, expected, "range_search({}, {})", low, high);
                }
            }
            prop_assert_eq!(tree.len(), model.len());
        }

        prop_assert!(tree.check_invariants().is_ok(), "{:?}", tree.check_invariants());
        prop_assert_eq!(chain_keys(&tree), model.keys().copied().collect::<Vec<_>>());
        prop_assert!(tree.iter().eq(model.iter()));
        prop_assert_eq!(tree.first_key_value(), model.first_key_value());
        prop_assert_eq!(tree.last_key_value(), model.last_key_value());
    }

    /// Every live key is found by `search` and appears exactly once in a full
    /// range scan.
    #[test]
    fn completeness(
        order in order_strategy(),
        keys in proptest::collection::vec(key_strategy(), 0..TEST_SIZE),
    ) {
        let mut tree = BPlusTree::new(order).unwrap();
        for &k in &keys {
            tree.insert(k, k * 2);
        }
        for &k in &keys {
            prop_assert_eq!(tree.search(&k), Some(&(k * 2)));
        }

        let scanned: Vec<i64> = tree.range_search(&i64::MIN, &i64::MAX).unwrap().map(|(k, _)| *k).collect();
        let mut expected = keys.clone();
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(scanned, expected);
    }

    /// Inserting a new key and deleting it again leaves a search-equivalent
    /// tree.
    #[test]
    fn insert_then_delete_round_trips(
        order in order_strategy(),
        keys in proptest::collection::vec(key_strategy(), 0..500),
        probe in key_strategy(),
    ) {
        let mut tree: BPlusTree<i64, ()> = BPlusTree::new(order).unwrap();
        for &k in &keys {
            tree.insert(k, ());
        }
        prop_assume!(!tree.contains_key(&probe));
        let before = chain_keys(&tree);

        tree.insert(probe, ());
        prop_assert!(tree.delete(&probe));

        prop_assert_eq!(chain_keys(&tree), before);
        prop_assert!(!tree.contains_key(&probe));
        prop_assert!(tree.check_invariants().is_ok(), "{:?}", tree.check_invariants());
    }

    /// Deleting an absent key returns `false` and leaves every node untouched.
    #[test]
    fn delete_of_absent_key_is_idempotent(
        order in order_strategy(),
        keys in proptest::collection::vec(key_strategy(), 0..500),
        probe in key_strategy(),
    ) {
        let mut tree: BPlusTree<i64, ()> = BPlusTree::new(order).unwrap();
        for &k in &keys {
            tree.insert(k, ());
        }
        tree.remove(&probe);
        let before = tree.dump().to_string();

        prop_assert!(!tree.delete(&probe));
        prop_assert!(!tree.delete(&probe));
        prop_assert_eq!(tree.dump().to_string(), before);
    }

    /// Trees built from dense insertions only never hold an under-filled
    /// non-root node, however many keys are deleted.
    #[test]
    fn dense_occupancy_survives_deletes(
        order in 3usize..10,
        keys in proptest::collection::vec(key_strategy(), 0..TEST_SIZE),
        deletes in proptest::collection::vec(key_strategy(), 0..TEST_SIZE),
    ) {
        let mut tree = BPlusTree::new(order).unwrap();
        tree.bulk_load(keys.iter().map(|&k| (k, ())), SplitPolicy::Dense);
        for k in &deletes {
            tree.delete(k);
        }
        prop_assert!(!tree.has_sparse_splits());
        prop_assert!(tree.check_invariants().is_ok(), "{:?}", tree.check_invariants());
    }
}
