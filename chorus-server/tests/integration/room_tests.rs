use chorus_server::room::{Room, RoomRegistry};
use std::sync::Arc;

use crate::utils::{init_tracing, spawn_participant};

#[tokio::test]
async fn test_registry_get_or_create_is_idempotent() {
    init_tracing();
    let registry = RoomRegistry::new();

    let first = registry.get_or_create("lobby");
    let second = registry.get_or_create("lobby");
    let other = registry.get_or_create("studio");

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_leave_twice_is_a_noop() {
    init_tracing();
    let room = Room::new("leave-twice");
    let member = spawn_participant(&room).await.expect("spawn participant");

    assert_eq!(room.len(), 1);
    room.leave(member.participant.id);
    assert_eq!(room.len(), 0);
    room.leave(member.participant.id);
    assert_eq!(room.len(), 0);
}

#[tokio::test]
async fn test_others_excludes_the_caller() {
    init_tracing();
    let room = Room::new("others");
    let a = spawn_participant(&room).await.expect("spawn a");
    let b = spawn_participant(&room).await.expect("spawn b");

    let others_of_a = room.others(a.participant.id);
    assert_eq!(others_of_a.len(), 1);
    assert_eq!(others_of_a[0].id, b.participant.id);
}

#[tokio::test]
async fn test_snapshots_exclude_stopped_members() {
    init_tracing();
    let room = Room::new("stopped");
    let a = spawn_participant(&room).await.expect("spawn a");
    let b = spawn_participant(&room).await.expect("spawn b");

    a.participant.teardown().await;

    assert!(a.participant.is_stopped());
    let members = room.participants();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].id, b.participant.id);

    // Teardown is idempotent.
    a.participant.teardown().await;
    assert_eq!(room.len(), 1);
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    init_tracing();
    let registry = RoomRegistry::new();
    let r1 = registry.get_or_create("r1");
    let r2 = registry.get_or_create("r2");

    let a = spawn_participant(&r1).await.expect("spawn a");
    let _b = spawn_participant(&r1).await.expect("spawn b");
    let c = spawn_participant(&r2).await.expect("spawn c");

    assert_eq!(r1.len(), 2);
    assert_eq!(r2.len(), 1);
    assert!(r1
        .others(a.participant.id)
        .iter()
        .all(|p| p.id != c.participant.id));

    // Membership changes in one room never show up in the other.
    c.participant.teardown().await;
    assert_eq!(r1.len(), 2);
    assert_eq!(r2.len(), 0);
}
