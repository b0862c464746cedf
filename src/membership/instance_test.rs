use super::*;
use crate::test_utils::addr;

#[test]
fn test_addr_parse_and_display() {
    let parsed: InstanceAddr = " db-1.internal:7000 ".parse().unwrap();
    assert_eq!(parsed.host(), "db-1.internal");
    assert_eq!(parsed.port(), 7000);
    assert_eq!(parsed.to_string(), "db-1.internal:7000");
}

#[test]
fn test_addr_parse_rejects_garbage() {
    for value in ["", "host", ":80", "host:port", "host:70000"] {
        assert!(
            matches!(
                value.parse::<InstanceAddr>(),
                Err(crate::Error::Membership(crate::MembershipError::InvalidAddress(_)))
            ),
            "{value:?} should be rejected"
        );
    }
}

#[test]
fn test_addrs_order_by_host_then_port() {
    let mut addrs = vec![
        InstanceAddr::new("b", 1),
        addr(9002),
        InstanceAddr::new("a", 5),
        addr(9001),
    ];
    addrs.sort();
    assert_eq!(
        addrs,
        vec![addr(9001), addr(9002), InstanceAddr::new("a", 5), InstanceAddr::new("b", 1)]
    );
}

#[test]
fn test_state_leaf_values() {
    assert_eq!(InstanceState::from_leaf("ready"), InstanceState::Ready);
    assert_eq!(InstanceState::from_leaf(" outdated\n"), InstanceState::Outdated);
    assert_eq!(InstanceState::from_leaf("whatever"), InstanceState::Failed);
    assert_eq!(InstanceState::Ready.to_string(), "ready");
}

#[test]
fn test_new_instance_is_unknown() {
    let instance = Instance::new(addr(9001));
    assert_eq!(instance.state(), InstanceState::Unknown);
    assert_eq!(instance.version(), crate::constants::UNKNOWN_VERSION);
    assert_eq!(instance.cpu_cores(), -1);
    assert_eq!(instance.memory(), -1);
    assert!(!instance.is_failed());
}

#[test]
fn test_disk_space_totals() {
    let mut instance = Instance::new(addr(9001));
    instance.add_storage("/a", DiskSpace { free: 1, total: 10 });
    instance.add_storage("/b", DiskSpace { free: 2, total: 20 });
    // replaces the previous entry of /a
    instance.add_storage("/a", DiskSpace { free: 4, total: 10 });

    assert_eq!(instance.number_of_storages(), 2);
    assert_eq!(instance.free_space(), 6);
    assert_eq!(instance.total_space(), 30);
}

#[test]
fn test_any_field_change_makes_instances_differ() {
    let base = Instance::with_state(addr(9001), InstanceState::Ready);

    let mut other = base.clone();
    assert_eq!(base, other);

    other.set_memory(1024);
    assert_ne!(base, other);

    let mut other = base.clone();
    other.set_state(InstanceState::Outdated);
    assert_ne!(base, other);
}
