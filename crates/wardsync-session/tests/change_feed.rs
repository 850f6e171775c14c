//! Change feed behavior as seen by a unit-detail subscriber.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use wardsync_core::events::SessionChange;
use wardsync_core::types::{UnitId, UserId};
use wardsync_entity::user::ClinicianRole;
use wardsync_session::{
    ActivityHeartbeat, AccessPolicy, CallerContext, ExpiryPolicy, SessionCoordinator, StartOutcome,
};
use wardsync_store::{MemorySessionStore, SessionStore};

fn setup() -> (Arc<MemorySessionStore>, SessionCoordinator) {
    let store = Arc::new(MemorySessionStore::new());
    let expiry = ExpiryPolicy::new(Duration::minutes(30), Duration::minutes(5));
    let heartbeat = ActivityHeartbeat::new(Arc::clone(&store) as _, StdDuration::ZERO);
    let coordinator = SessionCoordinator::new(
        Arc::clone(&store) as _,
        AccessPolicy::new(),
        expiry,
        heartbeat,
    );
    (store, coordinator)
}

fn physician() -> CallerContext {
    CallerContext::new(UserId::new(), ClinicianRole::Physician)
}

fn granted(outcome: StartOutcome) -> wardsync_entity::session::UnitSession {
    match outcome {
        StartOutcome::Granted(session) => session,
        StartOutcome::Bypassed => panic!("expected a granted session"),
    }
}

#[tokio::test]
async fn test_handover_emits_events_in_commit_order() {
    let (store, coordinator) = setup();
    let mut feed = store.subscribe();

    let unit_id = UnitId::new();
    let outgoing = physician();
    let incoming = physician();

    let held = granted(coordinator.start(&outgoing, unit_id).await.unwrap());
    coordinator.open_handover(&outgoing, held.id).await.unwrap();
    let receiver = granted(coordinator.join_as_receiver(&incoming, unit_id).await.unwrap());
    coordinator
        .confirm_assumption(&incoming, receiver.id)
        .await
        .unwrap();

    // start
    assert!(matches!(
        feed.recv().await.unwrap(),
        SessionChange::Created { session_id, is_blocking: true, .. } if session_id == held.id
    ));
    // open_handover
    assert!(matches!(
        feed.recv().await.unwrap(),
        SessionChange::Updated { session_id, handover_mode: true, .. } if session_id == held.id
    ));
    // join_as_receiver
    assert!(matches!(
        feed.recv().await.unwrap(),
        SessionChange::Created { session_id, is_blocking: false, .. } if session_id == receiver.id
    ));
    // assumption: the outgoing row dies, then the receiver is promoted.
    assert!(matches!(
        feed.recv().await.unwrap(),
        SessionChange::Deleted { session_id, .. } if session_id == held.id
    ));
    assert!(matches!(
        feed.recv().await.unwrap(),
        SessionChange::Updated { session_id, is_blocking: true, .. } if session_id == receiver.id
    ));
}

#[tokio::test]
async fn test_bypassed_writes_emit_nothing() {
    let (store, coordinator) = setup();
    let mut feed = store.subscribe();

    let admin = CallerContext::new(UserId::new(), ClinicianRole::Admin);
    coordinator.start(&admin, UnitId::new()).await.unwrap();

    assert!(matches!(
        feed.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn test_events_carry_the_unit_for_subscriber_filtering() {
    let (store, coordinator) = setup();
    let mut feed = store.subscribe();

    let watched = UnitId::new();
    let other = UnitId::new();
    granted(coordinator.start(&physician(), other).await.unwrap());
    let held = granted(coordinator.start(&physician(), watched).await.unwrap());

    let mut seen_for_watched = Vec::new();
    while let Ok(change) = feed.try_recv() {
        if change.unit_id() == watched {
            seen_for_watched.push(change);
        }
    }
    assert_eq!(seen_for_watched.len(), 1);
    assert!(matches!(
        seen_for_watched[0],
        SessionChange::Created { session_id, .. } if session_id == held.id
    ));
}
