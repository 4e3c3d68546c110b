use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::appointment_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = appointment_routes(TestConfig::default().to_arc());

    let response = app
        .oneshot(Request::builder().uri("/types").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_lost_booking_race_returns_refreshed_slots() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri());
    let token = JwtTestUtils::create_test_token(&TestUser::staff("desk@example.com"), &config.jwt_secret, None);

    let day = (Utc::now() + Duration::days(3)).date_naive();
    let taken_slot = Uuid::new_v4();
    let taken_start = Utc.from_utc_datetime(&day.and_hms_opt(9, 0, 0).unwrap());
    let type_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_types"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_type_response(&type_id.to_string(), "Cleaning")
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::rpc_response("slot_unavailable", None)
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/available_slots"))
        .and(query_param("id", format!("eq.{}", taken_slot)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&taken_slot.to_string(), taken_start, 30)
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/available_slots"))
        .and(query_param("is_available", "eq.true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(&Uuid::new_v4().to_string(), taken_start + Duration::minutes(30), 30)
        ])))
        .mount(&server)
        .await;

    let response = appointment_routes(config.to_arc())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({
                    "patient_id": Uuid::new_v4(),
                    "slot_id": taken_slot,
                    "appointment_type_id": type_id,
                    "emergency_description": null
                }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "That time is no longer available, please choose another.");
    assert_eq!(body["available_slots"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_consecutive_search_reports_missing_window() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri());
    let token = JwtTestUtils::create_test_token(&TestUser::patient("john@example.com"), &config.jwt_secret, None);
    let day = (Utc::now() + Duration::days(3)).date_naive();

    Mock::given(method("GET"))
        .and(path("/rest/v1/available_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::slot_response(
                &Uuid::new_v4().to_string(),
                Utc.from_utc_datetime(&day.and_hms_opt(9, 0, 0).unwrap()),
                30
            )
        ])))
        .mount(&server)
        .await;

    let response = appointment_routes(config.to_arc())
        .oneshot(
            Request::builder()
                .uri(format!("/slots/consecutive?date={}&count=2", day))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["found"], false);
}
