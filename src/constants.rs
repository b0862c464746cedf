// -
// Coordination path layout

/// Subtree holding all distribution groups
pub(crate) const DISTRIBUTION_DIR: &str = "distribution";
/// Subtree holding instance liveness and details
pub(crate) const NODES_DIR: &str = "nodes";
pub(crate) const NODES_ACTIVE_DIR: &str = "active";
pub(crate) const NODES_DETAILS_DIR: &str = "details";

/// Region node leaves
pub(crate) const LEAF_VERSION: &str = "version";
pub(crate) const LEAF_STATE: &str = "state";
pub(crate) const LEAF_SYSTEMS: &str = "systems";
pub(crate) const LEAF_BBOX: &str = "bbox";
pub(crate) const LEAF_REGION_ID: &str = "regionid";
pub(crate) const CHILDREN_DIR: &str = "children";

/// Group root only
pub(crate) const REGION_ID_COUNTER: &str = "regionid-counter";
pub(crate) const GROUP_CONFIG_DIR: &str = "config";
pub(crate) const CONFIG_DIMENSIONS: &str = "dimensions";
pub(crate) const CONFIG_REPLICATION: &str = "replication";
pub(crate) const CONFIG_PARTITIONER: &str = "partitioner";
pub(crate) const CONFIG_PARTITIONER_CONFIG: &str = "partitioner-config";
pub(crate) const CONFIG_TARGET_CELLS: &str = "target-cells";
pub(crate) const CONFIG_MIN_MERGE_SIZE: &str = "min-merge-size";
pub(crate) const CONFIG_SAMPLE_FRACTION: &str = "sample-fraction";

/// Instance details leaves
pub(crate) const DETAIL_VERSION: &str = "version";
pub(crate) const DETAIL_CPU_CORES: &str = "cpucore";
pub(crate) const DETAIL_MEMORY: &str = "memory";
pub(crate) const DETAIL_DISKSPACE: &str = "diskspace";
pub(crate) const DETAIL_FREE: &str = "free";
pub(crate) const DETAIL_TOTAL: &str = "total";

// -
// Encoding

/// Separator of the `systems` leaf
pub(crate) const SYSTEMS_SEPARATOR: char = ',';
/// Replaces `/` when a storage path is used as a node name
pub(crate) const QUOTED_PATH_SEPARATOR: &str = "__";

/// Instance version reported when none was published
pub const UNKNOWN_VERSION: &str = "unknown";
