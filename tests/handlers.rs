//! HTTP surface tests, driven through the full router with `oneshot`.

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::{Value, json};

mod common;
use common::*;

fn callback_body(checkout_request_id: &str, receipt: Option<&str>, result_code: i64) -> Value {
    json!({
        "status": result_code == 0,
        "response": {
            "Amount": 2500,
            "CheckoutRequestID": checkout_request_id,
            "ExternalReference": "INV-1-1700000000",
            "MpesaReceiptNumber": receipt,
            "Phone": "254712345678",
            "ResultCode": result_code,
            "ResultDesc": if result_code == 0 { "The service request is processed successfully." } else { "Request cancelled by user" }
        }
    })
}

fn callback_uri() -> String {
    format!("/api/callback/payhero?token={}", CALLBACK_TOKEN)
}

#[tokio::test]
async fn test_health() {
    let env = setup();
    let (status, json) = send_json(env.app(), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

// ============ Gateway callback ============

#[tokio::test]
async fn test_callback_records_settled_payment_unused() {
    let env = setup();

    let (status, _) = send_json(
        env.app(),
        "POST",
        &callback_uri(),
        Some(callback_body("ws_CO_1", Some("SAB1234XYZ"), 0)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let payment = env.payment("SAB1234XYZ");
    assert_eq!(payment.checkout_request_id, "ws_CO_1");
    assert_eq!(payment.amount, 2500);
    assert_eq!(payment.used_status, UsedStatus::Unused);
}

#[tokio::test]
async fn test_callback_redelivery_is_acknowledged_once() {
    let env = setup();
    let body = callback_body("ws_CO_1", Some("SAB1234XYZ"), 0);

    let (first, _) = send_json(env.app(), "POST", &callback_uri(), Some(body.clone())).await;
    let (second, json) = send_json(env.app(), "POST", &callback_uri(), Some(body)).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(json["message"], "Payment already recorded");

    let count: i64 = env
        .conn()
        .query_row("SELECT COUNT(*) FROM pppoe_payments", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_callback_failed_payment_is_not_recorded() {
    let env = setup();

    let (status, json) = send_json(
        env.app(),
        "POST",
        &callback_uri(),
        Some(callback_body("ws_CO_1", None, 1032)),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Payment not successful");
    assert!(
        queries::get_payment_by_checkout_id(&env.conn(), "ws_CO_1")
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_callback_rejects_wrong_token() {
    let env = setup();
    let body = callback_body("ws_CO_1", Some("SAB1234XYZ"), 0);

    let (wrong, _) = send_json(
        env.app(),
        "POST",
        "/api/callback/payhero?token=guess",
        Some(body.clone()),
    )
    .await;
    let (missing, _) = send_json(env.app(), "POST", "/api/callback/payhero", Some(body)).await;

    assert_eq!(wrong, StatusCode::UNAUTHORIZED);
    assert_eq!(missing, StatusCode::UNAUTHORIZED);
    assert!(
        queries::get_payment_by_receipt(&env.conn(), "SAB1234XYZ")
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_callback_without_configured_token_accepts_any() {
    let mut config = test_config();
    config.payhero_callback_token = None;
    let env = setup_with(config);

    let (status, _) = send_json(
        env.app(),
        "POST",
        "/api/callback/payhero",
        Some(callback_body("ws_CO_1", Some("SAB1234XYZ"), 0)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_callback_malformed_body_is_bad_request() {
    let env = setup();

    let (status, json) = send_json(
        env.app(),
        "POST",
        &callback_uri(),
        Some(json!({ "response": { "Amount": 10 } })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

// ============ Payment initiation ============

#[tokio::test]
async fn test_initiate_payment_validates_subscriber() {
    let env = setup();
    let subscriber_id = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        create_test_subscriber(&conn, router.id, "jane", 0).id
    };

    let (missing, _) = send_json(env.app(), "POST", "/api/payment", Some(json!({}))).await;
    assert_eq!(missing, StatusCode::BAD_REQUEST);

    let (unknown, _) = send_json(
        env.app(),
        "POST",
        "/api/payment",
        Some(json!({ "client_id": 9999 })),
    )
    .await;
    assert_eq!(unknown, StatusCode::NOT_FOUND);

    // Company has no PayHero channel configured
    let (no_settings, json) = send_json(
        env.app(),
        "POST",
        "/api/payment",
        Some(json!({ "client_id": subscriber_id })),
    )
    .await;
    assert_eq!(no_settings, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "PayHero settings not found");
}

#[tokio::test]
async fn test_initiate_payment_gateway_down_is_bad_gateway() {
    let env = setup();
    let subscriber_id = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        queries::upsert_payhero_settings(
            &conn,
            &PayHeroSettings {
                company_id: 1,
                channel_id: 911,
                payhero_token: "Basic dGVzdA==".to_string(),
                pppoe_callback_url: None,
            },
        )
        .unwrap();
        create_test_subscriber(&conn, router.id, "jane", 0).id
    };

    let (status, json) = send_json(
        env.app(),
        "POST",
        "/api/payment",
        Some(json!({ "client_id": subscriber_id })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap().starts_with("Gateway error"));

    let requests: i64 = env
        .conn()
        .query_row("SELECT COUNT(*) FROM pppoe_payment_requests", [], |row| row.get(0))
        .unwrap();
    assert_eq!(requests, 0);
}

// ============ Manual confirmation ============

#[tokio::test]
async fn test_confirm_payment_extends_and_reports_device() {
    let env = setup();
    let subscriber_id = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        let expiry = Utc::now().timestamp() + 3600;
        let subscriber = create_test_subscriber(&conn, router.id, "jane", expiry);
        create_test_payment(&conn, "ws_CO_1", "SAB1234XYZ");
        subscriber.id
    };

    let (status, json) = send_json(
        env.app(),
        "POST",
        "/api/confirm-payment",
        Some(json!({ "client_id": subscriber_id, "receipt": "SAB1234XYZ" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["MpesaReceiptNumber"], "SAB1234XYZ");
    assert_eq!(json["data"]["usedStatus"], "used");
    assert_eq!(json["device"]["status"], "reconciled");
    assert_eq!(
        json["end_date"],
        json["extension"]["new_end_date_local"],
        "end_date is the local rendering of the new expiry"
    );

    let (again, json) = send_json(
        env.app(),
        "POST",
        "/api/confirm-payment",
        Some(json!({ "client_id": subscriber_id, "receipt": "SAB1234XYZ" })),
    )
    .await;
    assert_eq!(again, StatusCode::CONFLICT);
    assert_eq!(json["error"], "Payment SAB1234XYZ has already been consumed");
}

#[tokio::test]
async fn test_confirm_payment_with_router_down_still_succeeds() {
    let env = setup();
    let subscriber_id = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        let subscriber = create_test_subscriber(&conn, router.id, "jane", 0);
        create_test_payment(&conn, "ws_CO_1", "SAB1234XYZ");
        subscriber.id
    };
    env.devices.set_mode(RouterMode::Unreachable);

    let (status, json) = send_json(
        env.app(),
        "POST",
        "/api/confirm-payment",
        Some(json!({ "client_id": subscriber_id, "receipt": "SAB1234XYZ" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["device"]["status"], "pending");
    assert!(
        json["device"]["reason"]
            .as_str()
            .unwrap()
            .starts_with("Device unreachable")
    );
}

#[tokio::test]
async fn test_confirm_payment_unknown_receipt() {
    let env = setup();
    let subscriber_id = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        create_test_subscriber(&conn, router.id, "jane", 0).id
    };

    let (status, _) = send_json(
        env.app(),
        "POST",
        "/api/confirm-payment",
        Some(json!({ "client_id": subscriber_id, "receipt": "NOPE" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============ Device actions ============

#[tokio::test]
async fn test_device_action_enable() {
    let env = setup();
    let subscriber_id = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        let subscriber = create_test_subscriber(&conn, router.id, "jane", 0);
        queries::set_subscriber_active(&conn, subscriber.id, false).unwrap();
        subscriber.id
    };

    let (status, json) = send_json(
        env.app(),
        "POST",
        &format!("/api/subscribers/{}/device", subscriber_id),
        Some(json!({ "action": "enable" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["description"], "PPP secret 'jane' enabled");
    assert!(env.subscriber(subscriber_id).active);
}

#[tokio::test]
async fn test_device_action_router_unreachable_is_bad_gateway() {
    let env = setup();
    let subscriber_id = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        create_test_subscriber(&conn, router.id, "jane", 0).id
    };
    env.devices.set_mode(RouterMode::Unreachable);

    let (status, _) = send_json(
        env.app(),
        "POST",
        &format!("/api/subscribers/{}/device", subscriber_id),
        Some(json!({ "action": "disable" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(env.subscriber(subscriber_id).active);
}

#[tokio::test]
async fn test_device_action_unknown_action_is_rejected() {
    let env = setup();

    let (status, _) = send_json(
        env.app(),
        "POST",
        "/api/subscribers/1/device",
        Some(json!({ "action": "reboot" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_audit_logs_filter_by_subscriber() {
    let env = setup();
    let (first, second) = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        (
            create_test_subscriber(&conn, router.id, "jane", 0).id,
            create_test_subscriber(&conn, router.id, "john", 0).id,
        )
    };

    for id in [first, second] {
        let (status, _) = send_json(
            env.app(),
            "POST",
            &format!("/api/subscribers/{}/device", id),
            Some(json!({ "action": "disable" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, json) = send_json(
        env.app(),
        "GET",
        &format!("/api/audit-logs?subscriber_id={}", first),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let logs = json.as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["action"], "device.disable");
    assert_eq!(logs[0]["actor_type"], "operator");
}

// ============ Router and expiry routes ============

#[tokio::test]
async fn test_active_routers_hide_secrets() {
    let env = setup();
    create_test_router(&env.conn());

    let (status, json) = send_json(env.app(), "GET", "/api/routers/active", None).await;

    assert_eq!(status, StatusCode::OK);
    let routers = json.as_array().unwrap();
    assert_eq!(routers.len(), 1);
    assert_eq!(routers[0]["ip_address"], "10.0.0.1");
    assert!(routers[0].get("router_secret").is_none());
}

#[tokio::test]
async fn test_expired_lists_only_lapsed_active_subscribers() {
    let env = setup();
    let now = Utc::now().timestamp();
    let (router_id, lapsed) = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        let lapsed = create_test_subscriber(&conn, router.id, "lapsed", now - 3600);
        create_test_subscriber(&conn, router.id, "current", now + 3600);
        let inactive = create_test_subscriber(&conn, router.id, "inactive", now - 3600);
        queries::set_subscriber_active(&conn, inactive.id, false).unwrap();
        (router.id, lapsed.id)
    };

    let (status, json) = send_json(
        env.app(),
        "GET",
        &format!("/api/expired/{}", router_id),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<i64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![lapsed]);

    let (missing, _) = send_json(env.app(), "GET", "/api/expired/9999", None).await;
    assert_eq!(missing, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_status_marks_inactive() {
    let env = setup();
    let subscriber = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        create_test_subscriber(&conn, router.id, "jane", 0)
    };

    let (status, json) = send_json(
        env.app(),
        "PATCH",
        "/api/update-status",
        Some(json!({
            "ids": [subscriber.id],
            "expired_users": [{
                "id": subscriber.id,
                "company_username": "fastnet",
                "phone_number": "0712345678",
                "plan_fee": 2500
            }]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["updated"], 1);
    // No SMS gateway in tests, so the notice is reported as failed
    assert_eq!(json["notices"]["total"], 1);
    assert_eq!(json["notices"]["failed"], 1);
    assert!(!env.subscriber(subscriber.id).active);
}

#[tokio::test]
async fn test_update_status_requires_ids() {
    let env = setup();

    let (empty, _) = send_json(
        env.app(),
        "PATCH",
        "/api/update-status",
        Some(json!({ "ids": [] })),
    )
    .await;
    let (unknown, _) = send_json(
        env.app(),
        "PATCH",
        "/api/update-status",
        Some(json!({ "ids": [4242] })),
    )
    .await;

    assert_eq!(empty, StatusCode::BAD_REQUEST);
    assert_eq!(unknown, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expire_route_sweeps_one_router() {
    let env = setup();
    let now = Utc::now().timestamp();
    let (router_id, lapsed) = {
        let conn = env.conn();
        let router = create_test_router(&conn);
        let lapsed = create_test_subscriber(&conn, router.id, "lapsed", now - 60);
        create_test_subscriber(&conn, router.id, "current", now + 3600);
        (router.id, lapsed.id)
    };

    let (status, json) = send_json(
        env.app(),
        "POST",
        &format!("/api/expire?router_id={}", router_id),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["router_id"], router_id);
    assert_eq!(json[0]["disabled"], json!([lapsed]));
    assert!(!env.subscriber(lapsed).active);
}

#[tokio::test]
async fn test_reminders_without_gateway_report_failures() {
    let env = setup();
    {
        let conn = env.conn();
        let router = create_test_router(&conn);
        // Inside the default 1..=5 day window
        create_test_subscriber(&conn, router.id, "soon", Utc::now().timestamp() + 3 * 24 * 3600);
        // Well outside it
        create_test_subscriber(&conn, router.id, "later", Utc::now().timestamp() + 20 * 24 * 3600);
    }

    let (sms, sms_json) = send_json(env.app(), "POST", "/api/send-reminders", None).await;
    let (whatsapp, wa_json) = send_json(env.app(), "POST", "/api/send-whatsapp-reminders", None).await;

    assert_eq!(sms, StatusCode::OK);
    assert_eq!(whatsapp, StatusCode::OK);
    assert_eq!(sms_json["total"], 1);
    assert_eq!(sms_json["failed"], 1);
    assert_eq!(wa_json["total"], 1);
    assert_eq!(wa_json["errors"][0]["phone"], "+254712345678");
}
