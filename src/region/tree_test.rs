use super::*;
use crate::test_utils::addr;
use crate::test_utils::bbox;
use crate::RegionError;
use crate::RegionState;

/// Root 0 over [0,10]x[0,10], children 1 (left half) and 2 (right half);
/// child 1 is split again into 3 and 4.
fn sample_tree() -> RegionTree {
    let mut tree = RegionTree::new("points", 0, bbox(&[0.0, 10.0, 0.0, 10.0]));
    let root = tree.root();
    tree.set_state(root, RegionState::Split);

    let left = tree.add_child(root, 0, 1, bbox(&[0.0, 5.0, 0.0, 10.0])).unwrap();
    let right = tree.add_child(root, 1, 2, bbox(&[5.0, 10.0, 0.0, 10.0])).unwrap();
    tree.set_state(left, RegionState::Split);
    tree.set_state(right, RegionState::Active);
    tree.set_systems(right, vec![addr(9002)]);

    let a = tree.add_child(left, 0, 3, bbox(&[0.0, 5.0, 0.0, 5.0])).unwrap();
    let b = tree.add_child(left, 1, 4, bbox(&[0.0, 5.0, 5.0, 10.0])).unwrap();
    tree.set_state(a, RegionState::Active);
    tree.set_state(b, RegionState::Splitting);
    tree.set_systems(a, vec![addr(9001), addr(9002)]);
    tree.set_systems(b, vec![addr(9001)]);
    tree
}

#[test]
fn test_new_tree_has_creating_root() {
    let tree = RegionTree::new("points", 5, bbox(&[0.0, 1.0]));
    let root = tree.root_node();

    assert_eq!(tree.len(), 1);
    assert_eq!(root.region_id(), 5);
    assert_eq!(root.state(), RegionState::Creating);
    assert!(root.is_root());
    assert!(root.is_leaf());
    assert_eq!(root.identifier(), "points_5");
    assert_eq!(tree.total_level(), 1);
}

#[test]
fn test_structure_queries() {
    let tree = sample_tree();
    let left = tree.find_by_region_id(1).unwrap();
    let leaf = tree.find_by_region_id(4).unwrap();

    assert_eq!(tree.len(), 5);
    assert_eq!(tree.path_of(leaf), vec![0, 1]);
    assert_eq!(tree.resolve_path(&[0, 1]), Some(leaf));
    assert_eq!(tree.resolve_path(&[]), Some(tree.root()));
    assert_eq!(tree.resolve_path(&[2]), None);
    assert_eq!(tree.level(leaf), 2);
    assert_eq!(tree.total_level(), 3);
    assert_eq!(tree.highest_child_number(left), Some(1));
    assert_eq!(tree.identifier(leaf).as_deref(), Some("points_4"));

    let children: Vec<u64> = tree.direct_children(left).iter().map(|n| n.region_id()).collect();
    assert_eq!(children, vec![3, 4]);

    let mut leaves: Vec<u64> = tree.leaves().iter().map(|n| n.region_id()).collect();
    leaves.sort_unstable();
    assert_eq!(leaves, vec![2, 3, 4]);
}

#[test]
fn test_breadth_first_iteration() {
    let tree = sample_tree();
    let order: Vec<u64> = tree.iter().map(|n| n.region_id()).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);

    let left = tree.find_by_region_id(1).unwrap();
    let descendants: Vec<u64> = tree
        .descendants(left)
        .into_iter()
        .filter_map(|id| tree.get(id).map(|n| n.region_id()))
        .collect();
    assert_eq!(descendants, vec![3, 4]);
}

#[test]
fn test_add_child_rejects_conflicts() {
    let mut tree = sample_tree();
    let root = tree.root();

    let err = tree.add_child(root, 0, 9, bbox(&[0.0, 1.0, 0.0, 1.0])).unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Region(RegionError::ChildExists {
            parent_region_id: 0,
            child_number: 0
        })
    ));

    let err = tree.add_child(root, 7, 9, bbox(&[5.0, 11.0, 0.0, 1.0])).unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Region(RegionError::BoxNotContained { region_id: 9 })
    ));
    assert_eq!(tree.len(), 5);
}

#[test]
fn test_remove_child_drops_subtree() {
    let mut tree = sample_tree();
    let left = tree.find_by_region_id(1).unwrap();

    let removed: Vec<u64> = tree.remove_child(left).iter().map(|n| n.region_id()).collect();

    assert_eq!(removed, vec![1, 3, 4]);
    assert_eq!(tree.len(), 2);
    assert!(tree.find_by_region_id(3).is_none());
    assert_eq!(tree.root_node().child_numbers().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn test_root_can_not_be_removed() {
    let mut tree = sample_tree();
    let root = tree.root();
    assert!(tree.remove_child(root).is_empty());
    assert_eq!(tree.len(), 5);
}

#[test]
fn test_node_ids_are_not_reused() {
    let mut tree = sample_tree();
    let root = tree.root();
    let right = tree.find_by_region_id(2).unwrap();
    tree.remove_child(right);

    let again = tree.add_child(root, 1, 2, bbox(&[5.0, 10.0, 0.0, 10.0])).unwrap();
    assert_ne!(again, right);
    assert!(!tree.contains(right));
}

#[test]
fn test_region_lookup_reports_missing_id() {
    let tree = sample_tree();
    assert_eq!(tree.region(3).unwrap().bbox(), &bbox(&[0.0, 5.0, 0.0, 5.0]));
    assert!(matches!(
        tree.region(42),
        Err(crate::Error::Region(RegionError::NotFound { region_id: 42, .. }))
    ));
}

#[test]
fn test_regions_for_box_filters_by_state() {
    let tree = sample_tree();
    let query = bbox(&[1.0, 2.0, 6.0, 7.0]);

    let readable: Vec<u64> = tree
        .regions_for_box(&query, |s| s.is_read_eligible())
        .iter()
        .map(|n| n.region_id())
        .collect();
    assert_eq!(readable, vec![4]);

    let all: Vec<u64> = tree
        .regions_for_box(&query, |_| true)
        .iter()
        .map(|n| n.region_id())
        .collect();
    assert_eq!(all, vec![0, 1, 4]);
}

#[test]
fn test_routing_hops_group_by_instance() {
    let tree = sample_tree();
    let whole = bbox(&[0.0, 10.0, 0.0, 10.0]);

    let hops = tree.routing_hops(&whole, |s| s.is_read_eligible());
    assert_eq!(
        hops,
        vec![
            RoutingHop {
                instance: addr(9001),
                region_ids: vec![3, 4],
            },
            RoutingHop {
                instance: addr(9002),
                region_ids: vec![2, 3],
            },
        ]
    );

    let writes = tree.routing_hops(&whole, |s| s.is_write_eligible());
    assert_eq!(writes[0].region_ids, vec![3]);
}

#[test]
fn test_system_utilization_and_local_regions() {
    let tree = sample_tree();

    let utilization = tree.system_utilization();
    assert_eq!(utilization.get(&addr(9001)), Some(&2));
    assert_eq!(utilization.get(&addr(9002)), Some(&2));

    let mut local = tree.local_write_regions(&addr(9001));
    local.sort_by_key(|(id, _)| *id);
    // region 4 is splitting and no longer takes writes
    assert_eq!(local, vec![(3, bbox(&[0.0, 5.0, 0.0, 5.0]))]);
    assert!(tree.local_write_regions(&addr(9009)).is_empty());
}
