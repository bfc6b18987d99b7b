use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::time::Duration as StdDuration;

use neurosync_rewards::api;
use neurosync_rewards::config::LedgerConfig;
use neurosync_rewards::{MemoryStore, RewardsLedger};

fn ledger() -> RewardsLedger<MemoryStore> {
    RewardsLedger::new(
        MemoryStore::new(),
        LedgerConfig {
            max_write_attempts: 3,
            retry_backoff: StdDuration::from_millis(1),
        },
    )
}

macro_rules! app {
    ($ledger:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($ledger.clone()))
                .configure(api::configure::<MemoryStore>),
        )
        .await
    };
}

#[actix_web::test]
async fn unknown_user_is_not_found() {
    let ledger = ledger();
    let app = app!(ledger);

    let req = test::TestRequest::get().uri("/rewards/nobody").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn non_positive_awards_are_bad_requests() {
    let ledger = ledger();
    let app = app!(ledger);

    for points in [0, -5] {
        let req = test::TestRequest::post()
            .uri("/rewards/u1/award")
            .set_json(json!({ "points": points }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "points {points}");
    }
    assert!(ledger.get_record("u1").await.unwrap().is_none());
}

#[actix_web::test]
async fn award_returns_the_record() {
    let ledger = ledger();
    let app = app!(ledger);

    let req = test::TestRequest::post()
        .uri("/rewards/u1/award")
        .set_json(json!({ "points": 60 }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalPoints"], 60);
    assert_eq!(body["avatarLevel"], 2);
}

#[actix_web::test]
async fn store_outage_is_service_unavailable() {
    let ledger = ledger();
    let app = app!(ledger);
    ledger.store().set_unavailable(true);

    let req = test::TestRequest::get().uri("/rewards/u1").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let req = test::TestRequest::post()
        .uri("/users/u1/moods")
        .set_json(json!({ "mood": "tired", "level": 2 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn repeated_approval_pays_once() {
    let ledger = ledger();
    let app = app!(ledger);

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/materials/uploader/approve")
            .set_json(json!({ "materialId": "m-7" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let record = ledger.get_record("uploader").await.unwrap().unwrap();
    assert_eq!(record.total_points, 10);
    assert_eq!(record.badges.len(), 1);
}

#[actix_web::test]
async fn short_focus_session_earns_nothing() {
    let ledger = ledger();
    let app = app!(ledger);
    let end = Utc::now();

    let req = test::TestRequest::post()
        .uri("/users/u1/focus-sessions/complete")
        .set_json(json!({
            "startedAt": end - Duration::minutes(5),
            "endedAt": end,
            "requestId": "focus-1",
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["pointsEarned"], 0);
    assert_eq!(ledger.activity_counts("u1").await.unwrap().focus_sessions, 0);
}

#[actix_web::test]
async fn paused_time_is_not_credited() {
    let ledger = ledger();
    let app = app!(ledger);
    let end = Utc::now();

    let req = test::TestRequest::post()
        .uri("/users/u1/focus-sessions/complete")
        .set_json(json!({
            "startedAt": end - Duration::minutes(40),
            "endedAt": end,
            "focusedSeconds": 10 * 60,
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["pointsEarned"], 0);

    let req = test::TestRequest::post()
        .uri("/users/u1/focus-sessions/complete")
        .set_json(json!({
            "startedAt": end - Duration::seconds(1),
            "endedAt": end,
            "focusedSeconds": 25 * 60,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ledger.get_record("u1").await.unwrap().unwrap().total_points, 0);
}

#[actix_web::test]
async fn full_focus_session_over_http() {
    let ledger = ledger();
    let app = app!(ledger);
    let end = Utc::now();

    let req = test::TestRequest::post()
        .uri("/users/u1/focus-sessions/complete")
        .set_json(json!({
            "startedAt": end - Duration::minutes(30),
            "endedAt": end,
            "focusedSeconds": 25 * 60,
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["pointsEarned"], 5);
    assert_eq!(body["record"]["totalPoints"], 5);
}
