// ============================
// crates/backend-lib/tests/http_api.rs
// ============================
//! Integration tests for the JSON API, driven through the router.

mod common;

use axum::http::{Method, StatusCode};
use backend_lib::{
    config::{RateLimitSettings, Settings},
    router::create_router,
};
use common::{booking_body, call, day, get_from, memory_state};
use serde_json::json;

#[tokio::test]
async fn test_health() {
    let app = create_router(memory_state(Settings::default()).await);
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_list_experts_filters_and_pages() {
    let app = create_router(memory_state(Settings::default()).await);

    let (status, body) = call(&app, Method::GET, "/api/experts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 1);
    assert_eq!(body["experts"][0]["name"], "James Otieno");
    assert!(body["experts"][0].get("availability").is_none());

    let (_, body) = call(&app, Method::GET, "/api/experts?category=Backend", None).await;
    assert_eq!(body["total"], 2);

    let (_, body) = call(&app, Method::GET, "/api/experts?category=All&search=NAIR", None).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["experts"][0]["id"], "e2");

    let (_, body) = call(&app, Method::GET, "/api/experts?page=2&limit=2", None).await;
    assert_eq!(body["pages"], 2);
    assert_eq!(body["experts"].as_array().unwrap().len(), 1);
    assert_eq!(body["experts"][0]["name"], "Sofia Almeida");

    let (status, body) = call(&app, Method::GET, "/api/experts?page=abc&limit=-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 1);
    assert_eq!(body["experts"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_get_expert() {
    let app = create_router(memory_state(Settings::default()).await);

    let (status, body) = call(&app, Method::GET, "/api/experts/e1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["availability"][0]["date"], day().to_string());
    assert_eq!(body["availability"][0]["slots"][1]["taken"], false);

    let (status, body) = call(&app, Method::GET, "/api/experts/nonexistent-id", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NF_001");
}

#[tokio::test]
async fn test_booking_then_conflict() {
    let state = memory_state(Settings::default()).await;
    let app = create_router(state.clone());

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body("e1", "10:00 AM", "Alex@Example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Booking confirmed!");
    assert_eq!(body["booking"]["status"], "Pending");
    assert_eq!(body["booking"]["email"], "alex@example.com");
    assert_eq!(body["booking"]["timeSlot"], "10:00 AM");

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body("e1", "10:00 AM", "other@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "SLOT_001");
    assert_eq!(body["error"]["refresh"], true);

    let (_, expert) = call(&app, Method::GET, "/api/experts/e1", None).await;
    assert_eq!(expert["availability"][0]["slots"][1]["taken"], true);
    assert_eq!(expert["availability"][0]["slots"][0]["taken"], false);
    assert_eq!(state.storage.reservations().len(), 1);
}

#[tokio::test]
async fn test_booking_rejections() {
    let state = memory_state(Settings::default()).await;
    let app = create_router(state.clone());

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body("e1", "10:00 AM", "invalid-email")),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VAL_002");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/bookings",
        Some(json!({ "expertId": "e1", "email": "a@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body("nonexistent-id", "10:00 AM", "a@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NF_001");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body("e1", "06:00 PM", "a@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, Method::POST, "/api/bookings", Some(json!("not an object"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VAL_001");

    // nothing was taken along the way
    assert!(state.storage.reservations().is_empty());
    let (_, expert) = call(&app, Method::GET, "/api/experts/e1", None).await;
    assert!(expert["availability"][0]["slots"]
        .as_array()
        .unwrap()
        .iter()
        .all(|slot| slot["taken"] == false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_http_bookings_single_winner() {
    let state = memory_state(Settings::default()).await;
    let app = create_router(state.clone());

    let mut tasks = tokio::task::JoinSet::new();
    for n in 0..20 {
        let app = app.clone();
        tasks.spawn(async move {
            let body = booking_body("e2", "11:00 AM", &format!("user{n}@example.com"));
            call(&app, Method::POST, "/api/bookings", Some(body)).await.0
        });
    }

    let mut created = 0;
    let mut conflicts = 0;
    while let Some(status) = tasks.join_next().await {
        match status.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 19);
    assert_eq!(state.storage.reservations().len(), 1);
}

#[tokio::test]
async fn test_bookings_by_email() {
    let app = create_router(memory_state(Settings::default()).await);

    for (expert_id, slot) in [("e1", "09:00 AM"), ("e2", "10:00 AM")] {
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/bookings",
            Some(booking_body(expert_id, slot, "repeat@example.com")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    call(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body("e3", "09:00 AM", "someone-else@example.com")),
    )
    .await;

    let (status, body) =
        call(&app, Method::GET, "/api/bookings?email=Repeat@Example.com", None).await;
    assert_eq!(status, StatusCode::OK);
    let bookings = body.as_array().unwrap();
    assert_eq!(bookings.len(), 2);
    // newest first
    assert_eq!(bookings[0]["expertId"], "e2");
    assert_eq!(bookings[0]["timeSlot"], "10:00 AM");
    // each booking names who it is with
    assert_eq!(bookings[0]["expert"]["name"], "Priya Nair");
    assert_eq!(bookings[0]["expert"]["category"], "Frontend");
    assert_eq!(bookings[0]["expert"]["avatar"], "");
    assert_eq!(bookings[1]["expert"]["name"], "James Otieno");
    assert_eq!(bookings[1]["expert"]["category"], "Backend");
    assert!(bookings[1]["expert"].get("availability").is_none());

    let (status, _) = call(&app, Method::GET, "/api/bookings", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::GET, "/api/bookings?email=nope", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_status() {
    let state = memory_state(Settings::default()).await;
    let app = create_router(state.clone());

    let (_, created) = call(
        &app,
        Method::POST,
        "/api/bookings",
        Some(booking_body("e1", "11:00 AM", "a@example.com")),
    )
    .await;
    let id = created["booking"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/bookings/{id}/status");

    let (status, body) = call(&app, Method::PATCH, &uri, Some(json!({ "status": "Confirmed" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Confirmed");
    assert_eq!(body["id"], id.as_str());

    let (status, body) = call(&app, Method::PATCH, &uri, Some(json!({ "status": "Cancelled" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("Pending, Confirmed, Completed"));

    let unknown = format!("/api/bookings/{}/status", uuid::Uuid::new_v4());
    let (status, _) = call(&app, Method::PATCH, &unknown, Some(json!({ "status": "Completed" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        Method::PATCH,
        "/api/bookings/not-a-uuid/status",
        Some(json!({ "status": "Completed" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // status changes never free the slot
    let (status, _) = call(&app, Method::PATCH, &uri, Some(json!({ "status": "Completed" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, expert) = call(&app, Method::GET, "/api/experts/e1", None).await;
    assert_eq!(expert["availability"][0]["slots"][2]["taken"], true);
}

#[tokio::test]
async fn test_unknown_route() {
    let app = create_router(memory_state(Settings::default()).await);
    let (status, body) = call(&app, Method::GET, "/api/nothing-here", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NF_001");
}

#[tokio::test]
async fn test_rate_limit() {
    let settings = Settings {
        rate_limit: RateLimitSettings {
            window_secs: 60,
            max_requests: 2,
            ..RateLimitSettings::default()
        },
        ..Settings::default()
    };
    let app = create_router(memory_state(settings).await);

    for _ in 0..2 {
        let (status, _) = call(&app, Method::GET, "/api/experts", None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = call(&app, Method::GET, "/api/experts", None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_001");

    // health is outside /api
    let (status, _) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limiter_forgets_idle_clients() {
    let settings = Settings {
        rate_limit: RateLimitSettings {
            window_secs: 1,
            max_requests: 5,
            max_tracked_clients: 3,
        },
        ..Settings::default()
    };
    let state = memory_state(settings).await;
    let app = create_router(state.clone());

    for n in 0..4 {
        let status = get_from(&app, &format!("10.0.0.{n}"), "/api/experts").await;
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(state.rate_limiter.tracked_clients(), 4);

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let status = get_from(&app, "10.0.1.1", "/api/experts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.rate_limiter.tracked_clients(), 1);
}
