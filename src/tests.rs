use httpmock::prelude::*;
use serde_json::json;

use crate::structs::{CheckoutSession, Registration};
use crate::{
    derive_view_model, Backend, BackendClient, LifecycleState, PlanOffer, PlanType, PortalError,
    PortalOptions, SubscriptionStatus,
};

fn client_for(server: &MockServer) -> BackendClient {
    let mut options = PortalOptions::new(server.base_url());
    options.checkout_base_url = "https://checkout.example.com/pay/".to_string();
    options.standard_price_id = Some("price_std".to_string());
    options.premium_price_id = Some("price_pre".to_string());

    BackendClient::new(&options).unwrap()
}

#[test]
fn verify_session_accepts_valid_token() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/verify-session")
            .json_body(json!({ "session_token": "tok" }));
        then.status(200)
            .json_body(json!({ "success": true, "message": "ok", "user_id": 7 }));
    });

    let check = client_for(&server).verify_session("tok").unwrap();

    mock.assert();
    assert!(check.valid);
    assert_eq!(check.user_id, Some(7));
}

#[test]
fn verify_session_reports_rejected_token_as_invalid() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/verify-session");
        then.status(401).json_body(json!({ "error": "invalid session" }));
    });

    let check = client_for(&server).verify_session("stale").unwrap();

    assert!(!check.valid);
    assert_eq!(check.user_id, None);
}

#[test]
fn subscription_history_is_normalized() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/user-subscription-history")
            .json_body(json!({ "user_id": 7 }));
        then.status(200).json_body(json!({
            "success": true,
            "subscriptions": [
                {
                    "id": "sub_old",
                    "subscription_id": "sub_old",
                    "price_id": "price_pre",
                    "plan_name": "プレミアムプラン",
                    "status": "cancelled",
                    "created_at": "Mon, 01 Jan 2024 00:00:00 GMT",
                    "current_period_end": 1704067200,
                    "cancel_at_period_end": false,
                    "scheduled_change": null
                },
                {
                    "subscription_id": "missing_id",
                    "status": "active"
                },
                {
                    "id": "sub_cur",
                    "price_id": "price_std",
                    "plan_name": "スタンダードプラン",
                    "status": "active",
                    "created_at": "2024-02-01T09:30:00Z",
                    "current_period_end": 1709251200,
                    "cancel_at_period_end": null,
                    "scheduled_change": {
                        "schedule_id": "sub_sched_1",
                        "next_price_id": "price_pre",
                        "next_plan_name": "プレミアムプラン",
                        "change_date": 1709251200
                    }
                }
            ]
        }));
    });

    let records = client_for(&server).list_user_subscriptions(7).unwrap();

    mock.assert();
    assert_eq!(records.len(), 2);

    let old = &records[0];
    assert_eq!(old.id, "sub_old");
    assert_eq!(old.status, SubscriptionStatus::Canceled);
    assert_eq!(old.plan_type, PlanType::Premium);
    assert_eq!(old.created_at.map(|dt| dt.timestamp()), Some(1704067200));
    assert!(old.scheduled_change.is_none());

    let current = &records[1];
    assert_eq!(current.plan_type, PlanType::Standard);
    assert!(!current.cancel_at_period_end);
    let change = current.scheduled_change.as_ref().unwrap();
    assert_eq!(change.schedule_id, "sub_sched_1");
    assert_eq!(change.next_plan_type, PlanType::Premium);
    assert_eq!(change.change_date, Some(1709251200));

    let view = derive_view_model(&records);
    assert_eq!(
        view.active_plan.as_ref().map(|p| p.state),
        Some(LifecycleState::ChangePending)
    );
    assert_eq!(view.offer_for(PlanType::Premium), Some(PlanOffer::AlreadyScheduled));
}

#[test]
fn scheduled_change_to_unknown_plan_is_dropped() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/user-subscription-history");
        then.status(200).json_body(json!({
            "success": true,
            "subscriptions": [{
                "id": "sub_cur",
                "price_id": "price_pre",
                "status": "active",
                "current_period_end": 1709251200,
                "scheduled_change": {
                    "schedule_id": "sub_sched_1",
                    "next_price_id": "price_gold",
                    "next_plan_name": "Gold",
                    "change_date": 1709251200
                }
            }]
        }));
    });

    let records = client_for(&server).list_user_subscriptions(7).unwrap();

    assert_eq!(records.len(), 1);
    assert!(records[0].scheduled_change.is_none());
    assert_eq!(
        derive_view_model(&records).active_plan.map(|p| p.state),
        Some(LifecycleState::PlainActive)
    );
}

#[test]
fn cancel_sends_bearer_token() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/cancel-subscription")
            .header("Authorization", "Bearer tok")
            .json_body(json!({ "subscription_id": "sub_1" }));
        then.status(200)
            .json_body(json!({ "success": true, "message": "Cancellation scheduled." }));
    });

    let message = client_for(&server)
        .cancel_subscription("tok", "sub_1")
        .unwrap();

    mock.assert();
    assert_eq!(message, "Cancellation scheduled.");
}

#[test]
fn schedule_change_sends_plan_type() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/schedule-plan-change")
            .header("Authorization", "Bearer tok")
            .json_body(json!({ "new_plan_type": "standard" }));
        then.status(400)
            .json_body(json!({ "success": false, "error": "No active subscription" }));
    });

    let err = client_for(&server)
        .schedule_change("tok", PlanType::Standard)
        .unwrap_err();

    mock.assert();
    match err {
        PortalError::BackendRejected(reason) => assert_eq!(reason, "No active subscription"),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn checkout_for_held_plan_is_already_subscribed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/subscription")
            .json_body(json!({ "plan_name": "プレミアムプラン", "plan_type": "premium" }));
        then.status(400).json_body(json!({
            "error": "Already subscribed to the premium plan.",
            "already_subscribed": true
        }));
    });

    let err = client_for(&server)
        .create_subscription_checkout_session("tok", PlanType::Premium)
        .unwrap_err();

    assert!(matches!(err, PortalError::AlreadySubscribed(_)));
    assert_eq!(err.to_string(), "Already subscribed to the premium plan.");
}

#[test]
fn checkout_session_builds_hosted_url() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/checkout");
        then.status(200).json_body(json!({ "id": "cs_test_1" }));
    });

    let client = client_for(&server);
    let checkout = client.create_checkout_session("tok").unwrap();

    assert_eq!(checkout.id, "cs_test_1");
    assert_eq!(
        client.hosted_checkout_url(&checkout),
        "https://checkout.example.com/pay/cs_test_1"
    );
    assert_eq!(
        client.hosted_checkout_url(&CheckoutSession {
            id: "cs_2".to_string(),
            url: Some("https://pay.example.com/direct".to_string()),
        }),
        "https://pay.example.com/direct"
    );
}

#[test]
fn billing_portal_without_url_is_rejected() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/billing-portal/start")
            .json_body(json!({ "user_id": 7 }));
        then.status(400)
            .json_body(json!({ "success": false, "error": "No customer id" }));
    });

    let err = client_for(&server).open_billing_portal("tok", 7).unwrap_err();

    assert_eq!(err.to_string(), "No customer id");
}

#[test]
fn login_and_register() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/login")
            .json_body(json!({ "email": "mio@example.com", "password": "secret-pass" }));
        then.status(200).json_body(json!({
            "success": true,
            "message": "Logged in",
            "user_id": 7,
            "user_name": "Mio",
            "user_email": "mio@example.com",
            "user": { "id": 7, "email": "mio@example.com", "name": "Mio" },
            "session_token": "tok"
        }));
    });
    let register = server.mock(|when, then| {
        when.method(POST).path("/api/register").json_body(json!({
            "email": "new@example.com",
            "password": "long-enough",
            "name": "New",
            "terms": true,
            "privacy": true
        }));
        then.status(201)
            .json_body(json!({ "success": true, "message": "Registered" }));
    });

    let client = client_for(&server);

    let login = client.login("mio@example.com", "secret-pass").unwrap();
    assert_eq!(login.session_token, "tok");
    assert_eq!(login.user_id, 7);

    let message = client
        .register(&Registration {
            email: "new@example.com".to_string(),
            password: "long-enough".to_string(),
            confirm_password: "long-enough".to_string(),
            name: "New".to_string(),
            terms: true,
            privacy: true,
            ..Default::default()
        })
        .unwrap();

    register.assert();
    assert_eq!(message, "Registered");
}

#[test]
fn purchase_history_reads_server_dates() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/user-purchase-history");
        then.status(200).json_body(json!({
            "success": true,
            "purchases": [{
                "session_id": "cs_1",
                "product_name": "Protein",
                "amount": 3980.0,
                "currency": "jpy",
                "status": "completed",
                "created_at": "Tue, 02 Jan 2024 03:04:05 GMT"
            }]
        }));
    });

    let purchases = client_for(&server).purchase_history(7).unwrap();

    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].product_name.as_deref(), Some("Protein"));
    assert_eq!(
        purchases[0].created_at.map(|dt| dt.timestamp()),
        Some(1704164645)
    );
}

#[test]
fn undecodable_success_body_fails_to_decode() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/user-info");
        then.status(200).body("<html>oops</html>");
    });

    let err = client_for(&server).user_info(7).unwrap_err();

    assert!(matches!(err, PortalError::FailedToDecode));
}

#[test]
fn unreachable_server_is_request_failed() {
    let options = PortalOptions::new("http://127.0.0.1:1");
    let client = BackendClient::new(&options).unwrap();

    let err = client.verify_session("tok").unwrap_err();

    assert!(matches!(err, PortalError::RequestFailed));
}

#[test]
fn malformed_optional_fields_keep_the_record() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/user-subscription-history");
        then.status(200).json_body(json!({
            "success": true,
            "subscriptions": [{
                "id": "sub_cur",
                "price_id": "price_pre",
                "plan_name": 42,
                "status": "active",
                "current_period_end": "soon",
                "cancel_at_period_end": 1,
                "created_at": false,
                "scheduled_change": "pending"
            }]
        }));
    });

    let records = client_for(&server).list_user_subscriptions(7).unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, "sub_cur");
    assert_eq!(record.plan_type, PlanType::Premium);
    assert!(!record.cancel_at_period_end);
    assert_eq!(record.current_period_end, None);
    assert!(record.created_at.is_none());
    assert!(record.scheduled_change.is_none());

    let view = derive_view_model(&records);
    assert_eq!(
        view.active_plan.as_ref().map(|p| p.state),
        Some(LifecycleState::PlainActive)
    );
    assert_eq!(view.offer_for(PlanType::Premium), Some(PlanOffer::InUse));
    assert_eq!(
        view.offer_for(PlanType::Standard),
        Some(PlanOffer::ScheduleChange)
    );
}

#[test]
fn non_string_status_is_not_active() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/user-subscription-history");
        then.status(200).json_body(json!({
            "success": true,
            "subscriptions": [{ "id": "sub_odd", "price_id": "price_std", "status": { "raw": "active" } }]
        }));
    });

    let records = client_for(&server).list_user_subscriptions(7).unwrap();

    assert_eq!(records.len(), 1);
    assert!(!records[0].status.is_active());
    assert!(derive_view_model(&records).active_plan.is_none());
}
