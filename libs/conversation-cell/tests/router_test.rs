use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conversation_cell::chat_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_chat_requires_a_session() {
    let app = chat_routes(TestConfig::default().to_arc());

    let response = app
        .oneshot(Request::builder().uri("/greeting").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_message_is_answered_with_practice_hours() {
    let config = TestConfig::default();
    let token = JwtTestUtils::create_test_token(&TestUser::patient("ann@example.com"), &config.jwt_secret, None);

    let response = chat_routes(config.to_arc())
        .oneshot(post("/messages", &token, json!({
            "history": [{ "role": "assistant", "content": "Hello! I'm your dental assistant. How can I help you today?" }],
            "content": "What are your hours?"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["messages"][0]["role"], "assistant");
    assert!(body["messages"][0]["content"].as_str().unwrap().starts_with("Our office hours are:"));
    assert_eq!(body["ui_action"]["form"], "none");
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let config = TestConfig::default();
    let token = JwtTestUtils::create_test_token(&TestUser::patient("ann@example.com"), &config.jwt_secret, None);

    let response = chat_routes(config.to_arc())
        .oneshot(post("/messages", &token, json!({ "content": "   " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_finished_family_registration_opens_family_scheduler() {
    let config = TestConfig::default();
    let token = JwtTestUtils::create_test_token(&TestUser::patient("ann@example.com"), &config.jwt_secret, None);

    let response = chat_routes(config.to_arc())
        .oneshot(post("/forms/complete", &token, json!({
            "completion": { "kind": "family_registration_complete" }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ui_action"]["form"], "family-scheduler");
}

async fn mount_patient_owned_by(server: &MockServer, patient_id: Uuid, account_id: &str) {
    let mut row = MockSupabaseResponses::patient_response(
        &patient_id.to_string(), "Ann Lee", "(555) 123-4567", "1985-04-12", true,
    );
    row["user_id"] = json!(account_id);

    Mock::given(method("GET"))
        .and(path("/rest/v1/patients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_verified_patient_from_another_account_is_not_trusted() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri());
    let intruder = TestUser::patient("mallory@example.com");
    let token = JwtTestUtils::create_test_token(&intruder, &config.jwt_secret, None);
    let victim = Uuid::new_v4();

    mount_patient_owned_by(&server, victim, &Uuid::new_v4().to_string()).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/reschedule_appointment"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let response = chat_routes(config.to_arc())
        .oneshot(post("/messages", &token, json!({
            "history": [{
                "role": "assistant",
                "content": "Your next appointment is on March 14. Would you like to reschedule or cancel this appointment?"
            }],
            "context": { "verified": true, "verified_patient_id": victim, "has_patient_profile": true },
            "content": "3pm"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(!body["messages"][0]["content"].as_str().unwrap().contains("rescheduled"));
    assert_eq!(body["ui_action"]["form"], "none");
}

#[tokio::test]
async fn test_verified_patient_from_own_account_opens_manager() {
    let server = MockServer::start().await;
    let config = TestConfig::with_mock_server(&server.uri());
    let owner = TestUser::patient("ann@example.com");
    let token = JwtTestUtils::create_test_token(&owner, &config.jwt_secret, None);
    let patient_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mount_patient_owned_by(&server, patient_id, &owner.id).await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(),
                &patient_id.to_string(),
                Utc::now() + Duration::days(5),
                "scheduled",
            )
        ])))
        .mount(&server)
        .await;

    let response = chat_routes(config.to_arc())
        .oneshot(post("/messages", &token, json!({
            "context": { "verified": true, "verified_patient_id": patient_id, "has_patient_profile": true },
            "content": "I want to cancel my appointment"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ui_action"]["form"], "manager");
    assert_eq!(body["ui_action"]["action"], "cancel");
    assert_eq!(body["ui_action"]["appointment"]["id"], json!(appointment_id));
}
