use std::sync::Arc;

use spacedist::coordination::InMemoryCoordinator;
use spacedist::region::RegionNode;
use spacedist::Instance;
use spacedist::InstanceState;
use spacedist::PartitionerError;
use spacedist::RegionState;
use tracing_test::traced_test;

use crate::common::addr;
use crate::common::points;
use crate::common::quadtree_group;
use crate::common::start_process;

/// One process on 7001; 7002 and 7003 are only published
fn three_instances() -> (Arc<InMemoryCoordinator>, Arc<spacedist::DistributionContext>) {
    let coordinator = Arc::new(InMemoryCoordinator::new());
    let context = start_process(&coordinator, 7001);
    for port in [7002, 7003] {
        context
            .register_instance(&Instance::with_state(addr(port), InstanceState::Ready))
            .unwrap();
    }
    (coordinator, context)
}

#[test]
#[traced_test]
fn test_split_and_merge_round_trip() {
    let (_coordinator, context) = three_instances();
    assert_eq!(context.membership().len(), 3);

    let partitioner = context
        .create_distribution_group("points", &quadtree_group(&context))
        .unwrap();
    assert_eq!(context.list_groups().unwrap(), vec!["points".to_string()]);

    let tree = partitioner.root_node().unwrap();
    let root = tree.root_node().clone();
    assert_eq!(root.systems(), &[addr(7001)]);
    let mapper = partitioner.region_id_mapper();
    assert_eq!(mapper.all_region_ids(), vec![root.region_id()]);

    // split at (30, 60)
    let samples = points(&[[30.0, 60.0], [20.0, 70.0], [40.0, 50.0]]);
    let children = partitioner.split_region(&root, &samples).unwrap();
    assert_eq!(children.len(), 4);
    assert_eq!(children[0].bbox().high(0), Some(30.0));
    assert_eq!(children[0].bbox().high(1), Some(60.0));
    partitioner.split_complete(&root, &children).unwrap();

    // only child 0 stays on this process
    assert_eq!(mapper.all_region_ids(), vec![children[0].region_id()]);
    let holders: Vec<_> = children.iter().map(|c| c.systems()[0].clone()).collect();
    assert_eq!(holders, vec![addr(7001), addr(7002), addr(7003), addr(7002)]);

    let groups = partitioner.merge_candidates(&children[2]);
    assert_eq!(groups.len(), 1);
    let destination = partitioner.destination_for_merge(&groups[0]).unwrap();
    assert_eq!(destination.region_id(), root.region_id());

    partitioner.prepare_merge(&groups[0], &destination).unwrap();
    partitioner.merge_complete(&groups[0], &destination).unwrap();

    let tree = partitioner.root_node().unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree.root_node().state(), RegionState::Active);
    assert_eq!(mapper.all_region_ids(), vec![root.region_id()]);
}

#[test]
fn test_abandoned_split_leaves_the_region_usable() {
    let (_coordinator, context) = three_instances();
    let partitioner = context
        .create_distribution_group("points", &quadtree_group(&context))
        .unwrap();
    let root = partitioner.root_node().unwrap().root_node().clone();

    let children = partitioner.split_region(&root, &[]).unwrap();
    assert!(!partitioner.is_splittable(&root));
    partitioner.split_failed(&root, &children).unwrap();

    let tree = partitioner.root_node().unwrap();
    assert_eq!(tree.len(), 1);
    assert!(partitioner.is_splittable(&root));

    // next attempt gets fresh region ids
    let retried = partitioner.split_region(&root, &[]).unwrap();
    let first: Vec<u64> = children.iter().map(RegionNode::region_id).collect();
    assert!(retried.iter().all(|c| !first.contains(&c.region_id())));
}

#[test]
fn test_group_survives_partitioner_restart() {
    let (coordinator, context) = three_instances();
    let partitioner = context
        .create_distribution_group("points", &quadtree_group(&context))
        .unwrap();
    let root = partitioner.root_node().unwrap().root_node().clone();
    let children = partitioner.split_region(&root, &[]).unwrap();
    partitioner.split_complete(&root, &children).unwrap();
    assert!(spacedist::metrics::gather_metrics().contains("partitioner_operations"));
    context.shutdown();

    // a new process reads the same tree back
    let restarted = start_process(&coordinator, 7001);
    let partitioner = restarted.space_partitioner("points").unwrap();
    let tree = partitioner.root_node().unwrap();
    assert_eq!(tree.len(), 5);
    assert_eq!(tree.root_node().state(), RegionState::Split);
    assert_eq!(
        partitioner.region_id_mapper().all_region_ids(),
        vec![children[0].region_id()]
    );
}

#[test]
fn test_duplicate_and_deleted_groups() {
    let (_coordinator, context) = three_instances();
    let config = quadtree_group(&context);
    let partitioner = context.create_distribution_group("points", &config).unwrap();
    let root = partitioner.root_node().unwrap().root_node().clone();

    assert!(context.create_distribution_group("points", &config).is_err());

    context.delete_distribution_group("points").unwrap();
    assert!(context.list_groups().unwrap().is_empty());
    assert!(matches!(
        partitioner.split_region(&root, &[]),
        Err(spacedist::Error::Partitioner(PartitionerError::Inactive(_)))
    ));
    assert!(context.space_partitioner("points").is_err());
}
