use std::sync::Arc;

use parking_lot::Mutex;
use spacedist::coordination::InMemoryCoordinator;
use spacedist::region::RegionChange;
use spacedist::region::RegionEvent;
use spacedist::InstanceState;

use crate::common::addr;
use crate::common::points;
use crate::common::quadtree_group;
use crate::common::start_process;
use crate::common::WAIT_TIMEOUT;

#[test]
fn test_processes_see_each_other() {
    let coordinator = Arc::new(InMemoryCoordinator::new());
    let first = start_process(&coordinator, 7201);
    let second = start_process(&coordinator, 7202);

    for context in [&first, &second] {
        let members = context.membership().instances_with_state(InstanceState::Ready);
        let addrs: Vec<_> = members.iter().map(|i| i.addr().clone()).collect();
        assert_eq!(addrs, vec![addr(7201), addr(7202)]);
    }
}

#[test]
fn test_split_is_visible_to_other_process() {
    let coordinator = Arc::new(InMemoryCoordinator::new());
    let writer = start_process(&coordinator, 7201);
    let reader = start_process(&coordinator, 7202);

    let splitter = writer
        .create_distribution_group("points", &quadtree_group(&writer))
        .unwrap();
    let follower = reader.space_partitioner("points").unwrap();
    let root = follower.root_node().unwrap().root_node().clone();
    assert_eq!(root.systems(), &[addr(7201)]);
    assert!(follower.region_id_mapper().is_empty());

    let added = Arc::new(Mutex::new(Vec::new()));
    let sink = added.clone();
    follower.register_listener(Arc::new(move |change: &RegionChange| {
        if change.event == RegionEvent::Added {
            sink.lock().extend(change.region.as_ref().map(|r| r.region_id()));
        }
    }));

    let children = splitter
        .split_region(&root, &points(&[[25.0, 75.0]]))
        .unwrap();
    splitter.split_complete(&root, &children).unwrap();

    // child 1 is placed on the idle instance
    assert_eq!(children[1].systems(), &[addr(7202)]);
    follower
        .region_id_mapper()
        .wait_until_appears(children[1].region_id(), WAIT_TIMEOUT)
        .unwrap();

    let tree = follower.root_node().unwrap();
    assert_eq!(tree.leaves().len(), 4);
    let ids: Vec<u64> = children.iter().map(|c| c.region_id()).collect();
    assert_eq!(*added.lock(), ids);
}

#[test]
fn test_mapper_follows_split_without_reading_tree() {
    let coordinator = Arc::new(InMemoryCoordinator::new());
    let writer = start_process(&coordinator, 7201);
    let reader = start_process(&coordinator, 7202);

    let splitter = writer
        .create_distribution_group("points", &quadtree_group(&writer))
        .unwrap();
    // the follower never asks for the tree, only for its local regions
    let follower = reader.space_partitioner("points").unwrap();
    assert!(follower.region_id_mapper().is_empty());

    let root = splitter.root_node().unwrap().root_node().clone();
    let children = splitter
        .split_region(&root, &points(&[[25.0, 75.0]]))
        .unwrap();
    splitter.split_complete(&root, &children).unwrap();

    assert_eq!(children[1].systems(), &[addr(7202)]);
    follower
        .region_id_mapper()
        .wait_until_appears(children[1].region_id(), WAIT_TIMEOUT)
        .unwrap();
}

#[test]
fn test_merge_is_visible_to_other_process() {
    let coordinator = Arc::new(InMemoryCoordinator::new());
    let writer = start_process(&coordinator, 7201);
    let reader = start_process(&coordinator, 7202);

    let splitter = writer
        .create_distribution_group("points", &quadtree_group(&writer))
        .unwrap();
    let follower = reader.space_partitioner("points").unwrap();
    let root = splitter.root_node().unwrap().root_node().clone();
    let children = splitter.split_region(&root, &[]).unwrap();
    splitter.split_complete(&root, &children).unwrap();
    follower
        .region_id_mapper()
        .wait_until_appears(children[1].region_id(), WAIT_TIMEOUT)
        .unwrap();

    splitter.prepare_merge(&children, &root).unwrap();
    // merging regions are not writable anywhere
    follower
        .region_id_mapper()
        .wait_until_disappears(children[1].region_id(), WAIT_TIMEOUT)
        .unwrap();
    splitter.merge_complete(&children, &root).unwrap();

    let tree = follower.root_node().unwrap();
    assert_eq!(tree.len(), 1);
    assert!(follower.region_id_mapper().is_empty());
}
