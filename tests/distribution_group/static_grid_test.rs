use std::sync::Arc;

use spacedist::coordination::GroupConfig;
use spacedist::coordination::InMemoryCoordinator;
use spacedist::coordination::PartitionerKind;
use spacedist::Hyperrectangle;
use spacedist::RegionState;

use crate::common::start_process;

#[test]
fn test_grid_group_routes_boxes() {
    let coordinator = Arc::new(InMemoryCoordinator::new());
    let context = start_process(&coordinator, 7101);
    let config = GroupConfig::new(
        2,
        PartitionerKind::StaticGrid,
        "[[0,10]:[0,10]];2.5;5",
        &context.config().partitioner,
    );

    let partitioner = context.create_distribution_group("cells", &config).unwrap();
    let tree = partitioner.root_node().unwrap();

    assert_eq!(tree.leaves().len(), 8);
    assert!(tree.leaves().iter().all(|l| l.state() == RegionState::Active));
    assert!(tree
        .leaves()
        .iter()
        .all(|leaf| !partitioner.is_splittable(leaf) && partitioner.merge_candidates(leaf).is_empty()));

    // a single process serves every cell
    let mapper = partitioner.region_id_mapper();
    assert_eq!(mapper.len(), 8);
    let corner: Hyperrectangle = "[[0,1]:[0,1]]".parse().unwrap();
    assert_eq!(mapper.region_ids_for_box(&corner).len(), 1);
    let whole: Hyperrectangle = "[[0,10]:[0,10]]".parse().unwrap();
    assert_eq!(mapper.region_ids_for_box(&whole).len(), 8);
}
