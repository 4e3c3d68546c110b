use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{AppointmentError, FamilyBookingEntry, FamilyBookingPlanRequest};
use appointment_cell::services::FamilyBookingCoordinator;
use shared_database::supabase::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

const TOKEN: &str = "test-token";

fn coordinator_for(server: &MockServer) -> FamilyBookingCoordinator {
    let config = TestConfig::with_mock_server(&server.uri()).to_app_config();
    FamilyBookingCoordinator::with_client(Arc::new(SupabaseClient::new(&config)), &config)
}

fn future_day() -> NaiveDate {
    (Utc::now() + Duration::days(3)).date_naive()
}

fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(hour, minute, 0).unwrap())
}

fn entry(patient_id: Uuid, slot_id: Uuid, type_id: Uuid) -> FamilyBookingEntry {
    FamilyBookingEntry {
        patient_id,
        slot_id,
        appointment_type_id: type_id,
        emergency_description: None,
    }
}

async fn mount_type(server: &MockServer, type_id: Uuid, name: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointment_types"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_type_response(&type_id.to_string(), name)
        ])))
        .mount(server)
        .await;
}

async fn mount_booking(server: &MockServer, patient_id: Uuid, appointment_id: Uuid, slot_start: DateTime<Utc>) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment"))
        .and(body_partial_json(json!({ "p_patient_id": patient_id })))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::rpc_response("booked", Some(&appointment_id.to_string()))
        ))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_response(
                &appointment_id.to_string(), &patient_id.to_string(), slot_start, "scheduled"
            )
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_plan_assigns_back_to_back_run_in_member_order() {
    let server = MockServer::start().await;
    let day = future_day();
    let slot_ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    let slots: Vec<Value> = vec![
        MockSupabaseResponses::slot_response(&slot_ids[0].to_string(), at(day, 9, 0), 30),
        MockSupabaseResponses::slot_response(&slot_ids[1].to_string(), at(day, 9, 30), 30),
        MockSupabaseResponses::slot_response(&slot_ids[2].to_string(), at(day, 10, 0), 30),
        MockSupabaseResponses::slot_response(&slot_ids[3].to_string(), at(day, 11, 0), 30),
    ];
    Mock::given(method("GET"))
        .and(path("/rest/v1/available_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(slots)))
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    let members = vec![Uuid::new_v4(), Uuid::new_v4()];
    let type_id = Uuid::new_v4();

    let entries = coordinator.plan(FamilyBookingPlanRequest {
        date: day,
        patient_ids: members.clone(),
        start_slot_id: slot_ids[1],
        appointment_type_id: type_id,
        emergency_description: None,
    }, TOKEN).await.unwrap();

    assert_eq!(entries, vec![
        entry(members[0], slot_ids[1], type_id),
        entry(members[1], slot_ids[2], type_id),
    ]);

    let broken_run = coordinator.plan(FamilyBookingPlanRequest {
        date: day,
        patient_ids: members,
        start_slot_id: slot_ids[2],
        appointment_type_id: type_id,
        emergency_description: None,
    }, TOKEN).await;
    assert_matches!(broken_run, Err(AppointmentError::SlotUnavailable));
}

#[tokio::test]
async fn test_family_booking_shares_one_group_id() {
    let server = MockServer::start().await;
    let day = future_day();
    let type_id = Uuid::new_v4();
    let (parent, child) = (Uuid::new_v4(), Uuid::new_v4());
    let (slot_a, slot_b) = (Uuid::new_v4(), Uuid::new_v4());

    mount_type(&server, type_id, "Cleaning").await;
    mount_booking(&server, parent, Uuid::new_v4(), at(day, 9, 0)).await;
    mount_booking(&server, child, Uuid::new_v4(), at(day, 9, 30)).await;

    let booking = coordinator_for(&server)
        .book_family(vec![entry(parent, slot_a, type_id), entry(child, slot_b, type_id)], TOKEN)
        .await
        .unwrap();

    assert_eq!(booking.appointments.len(), 2);
    assert_eq!(booking.appointments[0].patient_id, parent);
    assert_eq!(booking.appointments[1].patient_id, child);

    let group_ids: Vec<Value> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/rest/v1/rpc/book_appointment")
        .map(|request| serde_json::from_slice::<Value>(&request.body).unwrap()["p_family_group_id"].clone())
        .collect();
    assert_eq!(group_ids, vec![json!(booking.family_group_id), json!(booking.family_group_id)]);
}

#[tokio::test]
async fn test_failed_member_rolls_back_earlier_bookings() {
    let server = MockServer::start().await;
    let day = future_day();
    let type_id = Uuid::new_v4();
    let (parent, child) = (Uuid::new_v4(), Uuid::new_v4());
    let parent_appointment = Uuid::new_v4();

    mount_type(&server, type_id, "Cleaning").await;
    mount_booking(&server, parent, parent_appointment, at(day, 9, 0)).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment"))
        .and(body_partial_json(json!({ "p_patient_id": child })))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::rpc_response("slot_unavailable", None)
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/cancel_appointment"))
        .and(body_partial_json(json!({ "p_appointment_id": parent_appointment })))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::rpc_response("cancelled", Some(&parent_appointment.to_string()))
        ))
        .expect(1)
        .mount(&server)
        .await;

    let result = coordinator_for(&server)
        .book_family(
            vec![entry(parent, Uuid::new_v4(), type_id), entry(child, Uuid::new_v4(), type_id)],
            TOKEN,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::FamilyBookingFailed { patient_id, .. }) if patient_id == child);
}

#[tokio::test]
async fn test_invalid_entries_book_nothing() {
    let server = MockServer::start().await;
    let type_id = Uuid::new_v4();
    mount_type(&server, type_id, "Emergency").await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    let shared_slot = Uuid::new_v4();

    assert_matches!(
        coordinator.book_family(Vec::new(), TOKEN).await,
        Err(AppointmentError::ValidationError(_))
    );
    assert_matches!(
        coordinator.book_family(
            vec![entry(Uuid::new_v4(), shared_slot, type_id), entry(Uuid::new_v4(), shared_slot, type_id)],
            TOKEN,
        ).await,
        Err(AppointmentError::ValidationError(_))
    );

    let mut described = entry(Uuid::new_v4(), Uuid::new_v4(), type_id);
    described.emergency_description = Some("Chipped tooth".to_string());
    assert_matches!(
        coordinator.book_family(vec![described, entry(Uuid::new_v4(), Uuid::new_v4(), type_id)], TOKEN).await,
        Err(AppointmentError::ValidationError(_))
    );
}

async fn mount_group_listing(server: &MockServer, rows: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "eq.scheduled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
        .mount(server)
        .await;
}

async fn expect_release(server: &MockServer, appointment_id: Uuid, status: u16) {
    let response = if status == 200 {
        ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::rpc_response("cancelled", Some(&appointment_id.to_string()))
        )
    } else {
        ResponseTemplate::new(status).set_body_json(
            MockSupabaseResponses::error_response("connection reset", "08006")
        )
    };

    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/cancel_appointment"))
        .and(body_partial_json(json!({ "p_appointment_id": appointment_id })))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_booking_committed_but_unreadable_is_rolled_back() {
    let server = MockServer::start().await;
    let day = future_day();
    let type_id = Uuid::new_v4();
    let (parent, child) = (Uuid::new_v4(), Uuid::new_v4());
    let (parent_appointment, child_appointment) = (Uuid::new_v4(), Uuid::new_v4());

    mount_type(&server, type_id, "Cleaning").await;
    mount_booking(&server, parent, parent_appointment, at(day, 9, 0)).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment"))
        .and(body_partial_json(json!({ "p_patient_id": child })))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::rpc_response("booked", Some(&child_appointment.to_string()))
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", child_appointment)))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::error_response("statement timeout", "57014")
        ))
        .mount(&server)
        .await;
    mount_group_listing(&server, Vec::new()).await;
    expect_release(&server, parent_appointment, 200).await;
    expect_release(&server, child_appointment, 200).await;

    let result = coordinator_for(&server)
        .book_family(
            vec![entry(parent, Uuid::new_v4(), type_id), entry(child, Uuid::new_v4(), type_id)],
            TOKEN,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::FamilyBookingFailed { patient_id, .. }) if patient_id == child);
}

#[tokio::test]
async fn test_booking_reported_without_id_is_found_through_the_group() {
    let server = MockServer::start().await;
    let day = future_day();
    let type_id = Uuid::new_v4();
    let (parent, child) = (Uuid::new_v4(), Uuid::new_v4());
    let (parent_appointment, stray_appointment) = (Uuid::new_v4(), Uuid::new_v4());

    mount_type(&server, type_id, "Cleaning").await;
    mount_booking(&server, parent, parent_appointment, at(day, 9, 0)).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment"))
        .and(body_partial_json(json!({ "p_patient_id": child })))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::rpc_response("booked", None)
        ))
        .mount(&server)
        .await;
    mount_group_listing(&server, vec![
        MockSupabaseResponses::appointment_response(
            &parent_appointment.to_string(), &parent.to_string(), at(day, 9, 0), "scheduled"
        ),
        MockSupabaseResponses::appointment_response(
            &stray_appointment.to_string(), &child.to_string(), at(day, 9, 30), "scheduled"
        ),
    ]).await;
    expect_release(&server, parent_appointment, 200).await;
    expect_release(&server, stray_appointment, 200).await;

    let result = coordinator_for(&server)
        .book_family(
            vec![entry(parent, Uuid::new_v4(), type_id), entry(child, Uuid::new_v4(), type_id)],
            TOKEN,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::FamilyBookingFailed { patient_id, .. }) if patient_id == child);
}

#[tokio::test]
async fn test_rollback_continues_past_a_failed_cancel() {
    let server = MockServer::start().await;
    let day = future_day();
    let type_id = Uuid::new_v4();
    let (parent, spouse, child) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let (parent_appointment, spouse_appointment) = (Uuid::new_v4(), Uuid::new_v4());

    mount_type(&server, type_id, "Cleaning").await;
    mount_booking(&server, parent, parent_appointment, at(day, 9, 0)).await;
    mount_booking(&server, spouse, spouse_appointment, at(day, 9, 30)).await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment"))
        .and(body_partial_json(json!({ "p_patient_id": child })))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            MockSupabaseResponses::rpc_response("slot_unavailable", None)
        ))
        .mount(&server)
        .await;
    // Newest first: the spouse's release fails, the parent's must still be attempted.
    expect_release(&server, spouse_appointment, 503).await;
    expect_release(&server, parent_appointment, 200).await;

    let result = coordinator_for(&server)
        .book_family(
            vec![
                entry(parent, Uuid::new_v4(), type_id),
                entry(spouse, Uuid::new_v4(), type_id),
                entry(child, Uuid::new_v4(), type_id),
            ],
            TOKEN,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::FamilyBookingFailed { patient_id, .. }) if patient_id == child);
}
