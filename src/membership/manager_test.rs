use std::sync::Arc;

use parking_lot::Mutex;
use tracing_test::traced_test;

use super::*;
use crate::test_utils::addr;
use crate::test_utils::ready_instance;

type Recorded = Arc<Mutex<Vec<(MembershipEvent, InstanceAddr)>>>;

fn recording_listener(manager: &MembershipManager) -> (Recorded, ListenerHandle) {
    let recorded: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = recorded.clone();
    let handle = manager.register_listener(Arc::new(move |event, instance| {
        sink.lock().push((event, instance.addr().clone()));
    }));
    (recorded, handle)
}

#[test]
#[traced_test]
fn test_initial_list_reports_adds() {
    let manager = MembershipManager::new();
    let (recorded, _) = recording_listener(&manager);

    manager.update_instance_list([ready_instance(9002), ready_instance(9001)]);

    assert_eq!(
        *recorded.lock(),
        vec![
            (MembershipEvent::Add, addr(9001)),
            (MembershipEvent::Add, addr(9002)),
        ]
    );
    assert_eq!(manager.len(), 2);
    assert!(manager.contains(&addr(9001)));
}

#[test]
fn test_diff_reports_add_changed_deleted() {
    let manager = MembershipManager::new();
    manager.update_instance_list([ready_instance(9001), ready_instance(9002)]);
    let (recorded, _) = recording_listener(&manager);

    let mut changed = ready_instance(9002);
    changed.set_state(InstanceState::Outdated);
    manager.update_instance_list([changed, ready_instance(9003)]);

    assert_eq!(
        *recorded.lock(),
        vec![
            (MembershipEvent::Deleted, addr(9001)),
            (MembershipEvent::Changed, addr(9002)),
            (MembershipEvent::Add, addr(9003)),
        ]
    );
    assert_eq!(
        manager.instance(&addr(9002)).map(|i| i.state()),
        Some(InstanceState::Outdated)
    );
}

#[test]
fn test_identical_list_is_silent() {
    let manager = MembershipManager::new();
    manager.update_instance_list([ready_instance(9001)]);
    let (recorded, _) = recording_listener(&manager);

    manager.update_instance_list([ready_instance(9001)]);

    assert!(recorded.lock().is_empty());
}

#[test]
#[traced_test]
fn test_disconnect_deletes_everything() {
    let manager = MembershipManager::new();
    manager.update_instance_list((9001..9004).map(ready_instance));
    let (recorded, _) = recording_listener(&manager);

    manager.handle_disconnect();

    let recorded = recorded.lock();
    assert_eq!(recorded.len(), 3);
    assert!(recorded.iter().all(|(e, _)| *e == MembershipEvent::Deleted));
    assert!(manager.is_empty());
    assert!(logs_contain("dropping 3 instance(s)"));
}

#[test]
fn test_unregistered_listener_is_not_called() {
    let manager = MembershipManager::new();
    let (recorded, handle) = recording_listener(&manager);
    assert_eq!(manager.listener_count(), 1);

    assert!(manager.unregister_listener(handle));
    assert!(!manager.unregister_listener(handle));
    manager.update_instance_list([ready_instance(9001)]);

    assert!(recorded.lock().is_empty());
    assert_eq!(manager.listener_count(), 0);
}

#[test]
fn test_instances_with_state_filters_sorted() {
    let manager = MembershipManager::new();
    let mut failed = ready_instance(9002);
    failed.set_state(InstanceState::Failed);
    manager.update_instance_list([ready_instance(9003), failed, ready_instance(9001)]);

    let ready: Vec<InstanceAddr> = manager
        .instances_with_state(InstanceState::Ready)
        .iter()
        .map(|i| i.addr().clone())
        .collect();
    assert_eq!(ready, vec![addr(9001), addr(9003)]);
    assert_eq!(manager.instances().len(), 3);
}

#[test]
fn test_readers_keep_their_snapshot() {
    let manager = MembershipManager::new();
    manager.update_instance_list([ready_instance(9001)]);

    manager.blocking_read(|before| {
        manager.update_instance_list([ready_instance(9002), ready_instance(9003)]);
        assert_eq!(before.len(), 1);
        assert!(before.contains_key(&addr(9001)));
    });
    assert_eq!(manager.len(), 2);
}

#[test]
fn test_event_names() {
    assert_eq!(MembershipEvent::Add.to_string(), "add");
    assert_eq!(MembershipEvent::Changed.as_str(), "changed");
    assert_eq!(MembershipEvent::Deleted.as_str(), "deleted");
}
