//! Full partnership lifecycle integration tests.
//!
//! Exercises the coordinator end to end over a file-backed SQLite database:
//! request → accept with symmetric friendship, notification response
//! transitions, per-organisation audit records, and gateway partner-change
//! notifications; plus the reject/cancel/dissolve paths and the idempotency
//! guarantees that make client retries safe.
//!
//! A file-based DB (via `NamedTempFile`) is used because the coordinator
//! runs its store sequences in `spawn_blocking` tasks that each check their
//! own connection out of the pool; with `:memory:` every pooled connection
//! would see a different database.

use std::sync::{Arc, Mutex};

use concord_coordinator::{
    Coordinator, CoordinatorError, GatewayNotifier, Sinks,
};
use concord_db::{create_pool, run_migrations, DbRuntimeSettings};
use concord_types::{EventKind, NotificationStatus, RelationshipState};
use tempfile::NamedTempFile;

/// Gateway notifier that records every notified agid.
#[derive(Default)]
struct RecordingNotifier {
    agids: Mutex<Vec<String>>,
}

impl GatewayNotifier for RecordingNotifier {
    fn notify_partners_changed(&self, agid: &str) {
        self.agids
            .lock()
            .expect("notifier lock")
            .push(agid.to_string());
    }
}

fn build_coordinator(db_path: &str, notifier: Arc<RecordingNotifier>) -> Coordinator {
    let pool = create_pool(db_path, DbRuntimeSettings::default()).expect("create pool");
    let conn = pool.get().expect("get connection");
    run_migrations(&conn).expect("run migrations");
    drop(conn);

    let mut sinks = Sinks::disconnected();
    sinks.gateways = notifier;
    Coordinator::new(pool, sinks)
}

async fn seed_two_orgs(coordinator: &Coordinator) {
    coordinator
        .register_organisation("org-a", "Acme")
        .await
        .expect("register org-a");
    coordinator
        .register_organisation("org-b", "Globex")
        .await
        .expect("register org-b");
    coordinator
        .register_node("org-a", "gw-a")
        .await
        .expect("register gw-a");
    coordinator
        .register_node("org-b", "gw-b")
        .await
        .expect("register gw-b");
}

#[tokio::test]
async fn request_then_accept_establishes_symmetric_friendship() {
    let db = NamedTempFile::new().expect("temp db");
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = build_coordinator(db.path().to_str().unwrap(), notifier.clone());
    seed_two_orgs(&coordinator).await;

    coordinator
        .send_partnership_request("org-a", "org-b")
        .await
        .expect("send request");

    // The request is WAITING in org-b's inbox, and org-a got a confirmation.
    let b_inbox = coordinator
        .get_inbox(vec!["org-b".to_string()], false, 50, 0)
        .await
        .expect("inbox b");
    let request = b_inbox
        .iter()
        .find(|n| n.kind == EventKind::PartnershipRequested)
        .expect("request notification should exist");
    assert_eq!(request.status, NotificationStatus::Waiting);

    let a_inbox = coordinator
        .get_inbox(vec!["org-a".to_string()], false, 50, 0)
        .await
        .expect("inbox a");
    assert!(a_inbox
        .iter()
        .any(|n| n.kind == EventKind::PartnershipRequestSent
            && n.status == NotificationStatus::Info));

    coordinator
        .accept_partnership("org-b", "org-a")
        .await
        .expect("accept");

    // Symmetry: both directions report Friends.
    for (x, y) in [("org-a", "org-b"), ("org-b", "org-a")] {
        let overview = coordinator.partner_overview(x, y).await.expect("overview");
        assert_eq!(overview.relationship, RelationshipState::Friends);
    }

    // The original WAITING notification is RESPONDED and read.
    let b_inbox = coordinator
        .get_inbox(vec!["org-b".to_string()], false, 50, 0)
        .await
        .expect("inbox b");
    let request = b_inbox
        .iter()
        .find(|n| n.kind == EventKind::PartnershipRequested)
        .expect("request notification should persist");
    assert_eq!(request.status, NotificationStatus::Responded);
    assert!(!request.is_unread);

    // Exactly one new ACCEPTED notification in the requester's inbox.
    let a_inbox = coordinator
        .get_inbox(vec!["org-a".to_string()], false, 50, 0)
        .await
        .expect("inbox a");
    let accepted: Vec<_> = a_inbox
        .iter()
        .filter(|n| n.kind == EventKind::PartnershipAccepted)
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].status, NotificationStatus::Accepted);

    // Exactly two audit records, one per organisation trail.
    let b_trail = coordinator
        .get_audit_trail("org-b", "org-a", 1)
        .await
        .expect("trail b");
    assert_eq!(b_trail.len(), 1);
    assert_eq!(b_trail[0].kind, EventKind::PartnershipAccepted);

    let a_trail = coordinator
        .get_audit_trail("org-a", "org-b", 1)
        .await
        .expect("trail a");
    assert_eq!(a_trail.len(), 1);

    // Every gateway of both organisations was told partners changed.
    let mut notified = notifier.agids.lock().expect("lock").clone();
    notified.sort();
    assert_eq!(notified, vec!["gw-a", "gw-b"]);
}

#[tokio::test]
async fn accept_without_request_is_a_conflict() {
    let db = NamedTempFile::new().expect("temp db");
    let coordinator = build_coordinator(
        db.path().to_str().unwrap(),
        Arc::new(RecordingNotifier::default()),
    );
    seed_two_orgs(&coordinator).await;

    let err = coordinator
        .accept_partnership("org-b", "org-a")
        .await
        .expect_err("should conflict");
    assert!(matches!(err, CoordinatorError::Conflict(_)));
}

#[tokio::test]
async fn accept_replay_is_a_no_op() {
    let db = NamedTempFile::new().expect("temp db");
    let coordinator = build_coordinator(
        db.path().to_str().unwrap(),
        Arc::new(RecordingNotifier::default()),
    );
    seed_two_orgs(&coordinator).await;

    coordinator
        .send_partnership_request("org-a", "org-b")
        .await
        .expect("send");
    coordinator
        .accept_partnership("org-b", "org-a")
        .await
        .expect("accept");
    coordinator
        .accept_partnership("org-b", "org-a")
        .await
        .expect("replay should be a no-op");

    // The replay must not duplicate the ACCEPTED notification.
    let a_inbox = coordinator
        .get_inbox(vec!["org-a".to_string()], false, 50, 0)
        .await
        .expect("inbox a");
    let accepted = a_inbox
        .iter()
        .filter(|n| n.kind == EventKind::PartnershipAccepted)
        .count();
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn duplicate_request_is_a_no_op_and_self_request_conflicts() {
    let db = NamedTempFile::new().expect("temp db");
    let coordinator = build_coordinator(
        db.path().to_str().unwrap(),
        Arc::new(RecordingNotifier::default()),
    );
    seed_two_orgs(&coordinator).await;

    coordinator
        .send_partnership_request("org-a", "org-b")
        .await
        .expect("send");
    coordinator
        .send_partnership_request("org-a", "org-b")
        .await
        .expect("replay should be a no-op");

    let b_inbox = coordinator
        .get_inbox(vec!["org-b".to_string()], false, 50, 0)
        .await
        .expect("inbox b");
    let waiting = b_inbox
        .iter()
        .filter(|n| n.kind == EventKind::PartnershipRequested)
        .count();
    assert_eq!(waiting, 1, "replay must not duplicate the request");

    let err = coordinator
        .send_partnership_request("org-a", "org-a")
        .await
        .expect_err("self-request should conflict");
    assert!(matches!(err, CoordinatorError::Conflict(_)));

    let err = coordinator
        .send_partnership_request("org-a", "org-missing")
        .await
        .expect_err("unknown org should be not found");
    assert!(matches!(err, CoordinatorError::OrgNotFound(_)));
}

#[tokio::test]
async fn reject_responds_request_and_leaves_no_friendship() {
    let db = NamedTempFile::new().expect("temp db");
    let coordinator = build_coordinator(
        db.path().to_str().unwrap(),
        Arc::new(RecordingNotifier::default()),
    );
    seed_two_orgs(&coordinator).await;

    coordinator
        .send_partnership_request("org-a", "org-b")
        .await
        .expect("send");
    coordinator
        .reject_partnership("org-b", "org-a")
        .await
        .expect("reject");

    let overview = coordinator
        .partner_overview("org-a", "org-b")
        .await
        .expect("overview");
    assert_eq!(overview.relationship, RelationshipState::None);

    let b_inbox = coordinator
        .get_inbox(vec!["org-b".to_string()], false, 50, 0)
        .await
        .expect("inbox b");
    let request = b_inbox
        .iter()
        .find(|n| n.kind == EventKind::PartnershipRequested)
        .expect("request should persist");
    assert_eq!(request.status, NotificationStatus::Responded);

    let a_inbox = coordinator
        .get_inbox(vec!["org-a".to_string()], false, 50, 0)
        .await
        .expect("inbox a");
    assert!(a_inbox
        .iter()
        .any(|n| n.kind == EventKind::PartnershipRejected
            && n.status == NotificationStatus::Rejected));

    // Rejecting again is a silent no-op.
    coordinator
        .reject_partnership("org-b", "org-a")
        .await
        .expect("replay should be a no-op");
}

#[tokio::test]
async fn requester_can_cancel_a_pending_request() {
    let db = NamedTempFile::new().expect("temp db");
    let coordinator = build_coordinator(
        db.path().to_str().unwrap(),
        Arc::new(RecordingNotifier::default()),
    );
    seed_two_orgs(&coordinator).await;

    coordinator
        .send_partnership_request("org-a", "org-b")
        .await
        .expect("send");
    coordinator
        .cancel_partnership_request("org-a", "org-b")
        .await
        .expect("cancel");

    let overview = coordinator
        .partner_overview("org-a", "org-b")
        .await
        .expect("overview");
    assert_eq!(overview.relationship, RelationshipState::None);

    let b_inbox = coordinator
        .get_inbox(vec!["org-b".to_string()], false, 50, 0)
        .await
        .expect("inbox b");
    let request = b_inbox
        .iter()
        .find(|n| n.kind == EventKind::PartnershipRequested)
        .expect("request should persist");
    assert_eq!(request.status, NotificationStatus::Responded);
    assert!(b_inbox
        .iter()
        .any(|n| n.kind == EventKind::PartnershipRequestCancelled
            && n.status == NotificationStatus::Info));
}

#[tokio::test]
async fn cancel_friendship_notifies_gateways_and_is_idempotent() {
    let db = NamedTempFile::new().expect("temp db");
    let notifier = Arc::new(RecordingNotifier::default());
    let coordinator = build_coordinator(db.path().to_str().unwrap(), notifier.clone());
    seed_two_orgs(&coordinator).await;

    // Dissolving a partnership that does not exist is a silent no-op.
    coordinator
        .cancel_friendship("org-a", "org-b")
        .await
        .expect("no-op dissolve");
    assert!(notifier.agids.lock().expect("lock").is_empty());

    coordinator
        .send_partnership_request("org-a", "org-b")
        .await
        .expect("send");
    coordinator
        .accept_partnership("org-b", "org-a")
        .await
        .expect("accept");
    notifier.agids.lock().expect("lock").clear();

    coordinator
        .cancel_friendship("org-a", "org-b")
        .await
        .expect("dissolve");

    let overview = coordinator
        .partner_overview("org-a", "org-b")
        .await
        .expect("overview");
    assert_eq!(overview.relationship, RelationshipState::None);

    let mut notified = notifier.agids.lock().expect("lock").clone();
    notified.sort();
    assert_eq!(notified, vec!["gw-a", "gw-b"]);

    let a_trail = coordinator
        .get_audit_trail("org-a", "org-b", 1)
        .await
        .expect("trail a");
    assert!(a_trail
        .iter()
        .any(|r| r.kind == EventKind::PartnershipDissolved));
}
