//! HTTP-level integration tests for `POST /api/v1/generate` and the `/jobs`
//! resource: grammar errors, admission outcomes (including the silent
//! group-origin policy), and the full enqueue → dispatch → fetch loop.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::StatusCode;
use common::{body_bytes, body_json, build_test_app, get, post_json};
use serde_json::json;

fn generate_body(text: &str) -> serde_json::Value {
    json!({
        "text": text,
        "platform": "qq",
        "user_id": "10001",
    })
}

// ---------------------------------------------------------------------------
// Grammar errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn steps_out_of_range_is_reported_and_consumes_no_quota() {
    let app = build_test_app().await;
    app.store.add_user("qq", "10001", Some(5), None).await.unwrap();

    let response = post_json(
        app.router.clone(),
        "/api/v1/generate",
        generate_body("正面词条:<a cat> 步数:<30>"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().unwrap().contains("步数"));

    // Nothing was enqueued, so nothing was reserved.
    let info = app.store.user_info("qq", "10001").await.unwrap().unwrap();
    assert_eq!(info.remaining, 5);
}

#[tokio::test]
async fn unknown_parameter_is_a_400_naming_the_key() {
    let app = build_test_app().await;
    let response = post_json(
        app.router,
        "/api/v1/generate",
        generate_body("正面词条:<x> 画风:<油画>"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["code"], "UNKNOWN_PARAMETER");
    assert!(body["error"].as_str().unwrap().contains("画风"));
}

#[tokio::test]
async fn unterminated_bracket_is_a_parse_error() {
    let app = build_test_app().await;
    let response = post_json(
        app.router,
        "/api/v1/generate",
        generate_body("正面词条:<a cat"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "PARSE_ERROR");
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn private_denials_are_reported() {
    let app = build_test_app().await;

    let response = post_json(
        app.router.clone(),
        "/api/v1/generate",
        generate_body("正面词条:<a cat>"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "NOT_WHITELISTED");
}

#[tokio::test]
async fn group_denials_are_silent() {
    let app = build_test_app().await;

    // Neither the group nor the user is allowed; the response must carry no
    // hint that the bot exists.
    let response = post_json(
        app.router,
        "/api/v1/generate",
        json!({
            "text": "正面词条:<a cat>",
            "platform": "qq",
            "user_id": "10001",
            "group_id": "999",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn quota_exhaustion_is_reported_in_private() {
    let app = build_test_app().await;
    app.store.add_user("qq", "10001", Some(1), None).await.unwrap();

    let first = post_json(
        app.router.clone(),
        "/api/v1/generate",
        generate_body("正面词条:<one>"),
    )
    .await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = post_json(
        app.router.clone(),
        "/api/v1/generate",
        generate_body("正面词条:<two>"),
    )
    .await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(second).await["code"], "QUOTA_EXHAUSTED");
}

#[tokio::test]
async fn allowed_group_request_is_accepted() {
    let app = build_test_app().await;
    app.store.add_user("qq", "10001", None, None).await.unwrap();
    app.store.add_group("qq", "777", None).await.unwrap();

    let response = post_json(
        app.router,
        "/api/v1/generate",
        json!({
            "text": "正面词条:<a cat>",
            "platform": "qq",
            "user_id": "10001",
            "group_id": "777",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

// ---------------------------------------------------------------------------
// Full loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn keyless_text_round_trips_through_dispatch() {
    let app = build_test_app().await;
    app.store.add_user("qq", "10001", Some(5), None).await.unwrap();

    let response = post_json(
        app.router.clone(),
        "/api/v1/generate",
        generate_body("a red fox in snow"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response).await;
    assert_eq!(body["data"]["no_keys_fallback"], true);
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    // Poll until the stub backend's result lands in the registry.
    let status_uri = format!("/api/v1/jobs/{job_id}");
    let mut completed = false;
    for _ in 0..100 {
        let response = get(app.router.clone(), &status_uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        let status = body_json(response).await;
        if status["data"]["status"] == "completed" {
            assert!(status["data"]["seed"].as_u64().is_some());
            completed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(completed, "job never completed");

    let image = get(app.router.clone(), &format!("/api/v1/jobs/{job_id}/image")).await;
    assert_eq!(image.status(), StatusCode::OK);
    assert_eq!(body_bytes(image).await, vec![0x50, 0x4b, 0x03, 0x04]);

    // Success keeps the quota spent.
    let info = app.store.user_info("qq", "10001").await.unwrap().unwrap();
    assert_eq!(info.remaining, 4);
}

#[tokio::test]
async fn backend_failure_refunds_quota_and_marks_job_failed() {
    let app = build_test_app().await;
    app.store.add_user("qq", "10001", Some(5), None).await.unwrap();
    app.backend.fail.store(true, Ordering::SeqCst);

    let response = post_json(
        app.router.clone(),
        "/api/v1/generate",
        generate_body("正面词条:<a cat>"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job_id = body_json(response).await["data"]["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let status_uri = format!("/api/v1/jobs/{job_id}");
    let mut failed = false;
    for _ in 0..100 {
        let response = get(app.router.clone(), &status_uri).await;
        let status = body_json(response).await;
        if status["data"]["status"] == "failed" {
            assert!(status["data"]["error"].as_str().unwrap().contains("500"));
            failed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(failed, "job never failed");

    let info = app.store.user_info("qq", "10001").await.unwrap().unwrap();
    assert_eq!(info.remaining, 5, "failed job must refund its reservation");

    let image = get(app.router, &format!("/api/v1/jobs/{job_id}/image")).await;
    assert_eq!(image.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_job_is_404() {
    let app = build_test_app().await;
    let response = get(
        app.router,
        "/api/v1/jobs/00000000-0000-0000-0000-000000000000",
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint_is_up() {
    let app = build_test_app().await;
    let response = get(app.router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}
