//! Expiry sweep and reminder selection.

use chrono::{Duration, Utc};
use tokio_test::{assert_err, assert_ok};

mod common;
use common::*;

use pppoe_billing::jobs::{expire_all, expire_router, mark_inactive, reminder_window};

#[tokio::test]
async fn test_expire_router_disables_only_lapsed_subscribers() {
    let env = setup();
    let now = Utc::now().timestamp();
    let (router_id, lapsed, current) = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        let lapsed = create_test_subscriber(&conn, router.id, "lapsed", now - 60);
        let current = create_test_subscriber(&conn, router.id, "current", now + 3600);
        (router.id, lapsed.id, current.id)
    };

    let report = assert_ok!(expire_router(&env.state, router_id, now).await);

    assert_eq!(report.expired, 1);
    assert_eq!(report.disabled, vec![lapsed]);
    assert!(report.failed.is_empty());
    assert!(!env.subscriber(lapsed).active);
    assert!(env.subscriber(current).active);
    assert_eq!(
        env.devices.commands(),
        vec![
            r#"/ppp secret set [find name="lapsed"] disabled=yes"#.to_string(),
            r#"/ppp active remove [find name="lapsed"]"#.to_string(),
        ]
    );

    let logs = env.audit_logs(lapsed);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].actor_type, ActorType::System);
}

#[tokio::test]
async fn test_expire_router_leaves_unreachable_subscribers_for_next_run() {
    let env = setup();
    let now = Utc::now().timestamp();
    let (router_id, lapsed) = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        (router.id, create_test_subscriber(&conn, router.id, "lapsed", now - 60).id)
    };
    env.devices.set_mode(RouterMode::Unreachable);

    let report = assert_ok!(expire_router(&env.state, router_id, now).await);

    assert!(report.disabled.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].subscriber_id, lapsed);
    assert_eq!(report.notices.total, 0, "no notice for a subscriber still online");
    assert!(env.subscriber(lapsed).active);

    // Router back up: the next sweep picks the subscriber up again
    env.devices.set_mode(RouterMode::Accept);
    let retry = assert_ok!(expire_router(&env.state, router_id, now).await);
    assert_eq!(retry.disabled, vec![lapsed]);
}

#[tokio::test]
async fn test_expire_all_skips_disabled_routers() {
    let env = setup();
    let now = Utc::now().timestamp();
    let (active_router, lapsed_elsewhere) = {
        let conn = env.conn();
        let active = create_test_router(&conn);
        let retired = create_test_router(&conn);
        conn.execute("UPDATE routers SET status = 0 WHERE id = ?1", [retired.id])
            .unwrap();
        create_test_subscriber(&conn, active.id, "a", now - 60);
        let other = create_test_subscriber(&conn, retired.id, "b", now - 60);
        (active.id, other.id)
    };

    let reports = assert_ok!(expire_all(&env.state, now).await);

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].router_id, active_router);
    assert!(env.subscriber(lapsed_elsewhere).active);
}

#[tokio::test]
async fn test_mark_inactive_rejects_empty_batch() {
    let env = setup();
    assert_err!(mark_inactive(&env.state, &[], &[]).await);
}

#[tokio::test]
async fn test_mark_inactive_unknown_ids_leave_no_audit_trail() {
    let env = setup();

    let result = mark_inactive(&env.state, &[999], &[]).await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert!(env.audit_logs(999).is_empty());
}

#[tokio::test]
async fn test_mark_inactive_audits_only_matched_subscribers() {
    let env = setup();
    let subscriber = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        create_test_subscriber(&conn, router.id, "jane", 0)
    };

    let (updated, _) = assert_ok!(mark_inactive(&env.state, &[subscriber.id, 999], &[]).await);

    assert_eq!(updated, 1);
    assert!(!env.subscriber(subscriber.id).active);
    let logs = env.audit_logs(subscriber.id);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "subscriber.deactivate");
    assert!(env.audit_logs(999).is_empty());
}

#[test]
fn test_reminder_window_spans_configured_days() {
    let now = nairobi(2024, 10, 7, 23, 50);
    let (from, to) = reminder_window(now, (1, 5)).unwrap();

    assert_eq!(from, nairobi(2024, 10, 8, 0, 0).timestamp());
    assert_eq!(to - from, (Duration::days(5) - Duration::seconds(1)).num_seconds());
}
