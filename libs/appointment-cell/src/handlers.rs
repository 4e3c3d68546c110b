// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use patient_cell::models::PatientError;
use patient_cell::services::PatientService;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, BookAppointmentRequest, ConsecutiveSlotsQuery, FamilyBookingPlanRequest,
    FamilyBookingRequest, RescheduleAppointmentRequest, SlotsQuery,
};
use crate::services::{FamilyBookingCoordinator, SlotAllocator};

// ==============================================================================
// ERROR MAPPING AND ACCESS CHECKS
// ==============================================================================

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::SlotUnavailable => AppError::Conflict(e.to_string()),
        AppointmentError::NoAvailableSlots(_) => AppError::NotFound(e.to_string()),
        AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
        AppointmentError::InvalidStatusTransition(_) => AppError::BadRequest(e.to_string()),
        AppointmentError::FamilyBookingFailed { .. } => AppError::Conflict(e.user_message()),
        AppointmentError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Lost race: answer 409 together with what is still free that day.
async fn slot_conflict(allocator: &SlotAllocator, slot_id: Uuid, token: &str) -> AppError {
    let available = match allocator.refresh_after_conflict(slot_id, token).await {
        Ok(slots) => json!(slots),
        Err(e) => {
            warn!("Could not refresh availability after conflict on slot {}: {}", slot_id, e);
            json!([])
        }
    };

    AppError::SlotUnavailable {
        message: AppointmentError::SlotUnavailable.to_string(),
        available_slots: available,
    }
}

/// Patients may act for anyone under their own account; staff for everyone.
async fn authorize_patient(
    config: &AppConfig,
    user: &User,
    patient_id: Uuid,
    token: &str,
) -> Result<(), AppError> {
    if user.is_staff() {
        return Ok(());
    }

    let patient = PatientService::new(config)
        .get_patient(patient_id, token)
        .await
        .map_err(|e| match e {
            PatientError::NotFound => AppError::NotFound("Patient not found".to_string()),
            other => AppError::Database(other.to_string()),
        })?;

    if patient.user_id.to_string() == user.id {
        Ok(())
    } else {
        Err(AppError::Auth("Not authorized to manage appointments for this patient".to_string()))
    }
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment_types(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let allocator = SlotAllocator::new(&config);

    let types = allocator.appointment_types(auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(types)))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let allocator = SlotAllocator::new(&config);

    let slots = allocator.available_slots(query.date, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "date": query.date,
        "slots": slots,
        "total": slots.len()
    })))
}

#[axum::debug_handler]
pub async fn get_consecutive_slots(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<ConsecutiveSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let allocator = SlotAllocator::new(&config);

    let found = allocator.find_consecutive_slots(query.date, query.count, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(match found {
        Some(consecutive) => json!({
            "found": true,
            "group": consecutive.group,
            "valid_start_slots": consecutive.valid_start_slots
        }),
        None => json!({
            "found": false,
            "message": format!("No {} consecutive time slots are available on {}", query.count, query.date)
        }),
    }))
}

// ==============================================================================
// SINGLE APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let token = auth.token();
    authorize_patient(&config, &user, request.patient_id, token).await?;

    let allocator = SlotAllocator::new(&config);
    let slot_id = request.slot_id;

    match allocator.book(request, token).await {
        Ok(appointment) => Ok((StatusCode::CREATED, Json(json!({
            "success": true,
            "appointment": appointment
        })))),
        Err(AppointmentError::SlotUnavailable) => Err(slot_conflict(&allocator, slot_id, token).await),
        Err(e) => Err(map_appointment_error(e)),
    }
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let allocator = SlotAllocator::new(&config);

    let existing = allocator.get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;
    authorize_patient(&config, &user, existing.patient_id, token).await?;

    let appointment = allocator.cancel(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let allocator = SlotAllocator::new(&config);

    let existing = allocator.get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;
    authorize_patient(&config, &user, existing.patient_id, token).await?;

    match (request.new_slot_id, request.requested_time) {
        (Some(slot_id), None) => match allocator.reschedule(appointment_id, slot_id, token).await {
            Ok(appointment) => Ok(Json(json!({
                "success": true,
                "appointment": appointment
            }))),
            Err(AppointmentError::SlotUnavailable) => Err(slot_conflict(&allocator, slot_id, token).await),
            Err(e) => Err(map_appointment_error(e)),
        },
        (None, Some(text)) => {
            let result = allocator.reschedule_to_clock_time(appointment_id, &text, token)
                .await
                .map_err(map_appointment_error)?;

            Ok(Json(json!({
                "success": true,
                "appointment": result.appointment,
                "slot": result.slot,
                "exact_match": result.exact_match
            })))
        }
        _ => Err(AppError::ValidationError(
            "Provide exactly one of new_slot_id or requested_time".to_string(),
        )),
    }
}

#[axum::debug_handler]
pub async fn get_family_group(
    State(config): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let allocator = SlotAllocator::new(&config);

    let existing = allocator.get_appointment(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;
    authorize_patient(&config, &user, existing.patient_id, token).await?;

    let group = allocator.family_group_appointments(appointment_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "family_group_id": existing.family_group_id,
        "appointments": group
    })))
}

#[axum::debug_handler]
pub async fn get_latest_appointment(
    State(config): State<Arc<AppConfig>>,
    Path(patient_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    authorize_patient(&config, &user, patient_id, token).await?;

    let latest = SlotAllocator::new(&config)
        .latest_appointment(patient_id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointment": latest })))
}

// ==============================================================================
// FAMILY BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn plan_family_booking(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<FamilyBookingPlanRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    for &patient_id in &request.patient_ids {
        authorize_patient(&config, &user, patient_id, token).await?;
    }

    let entries = FamilyBookingCoordinator::new(&config)
        .plan(request, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "entries": entries })))
}

#[axum::debug_handler]
pub async fn book_family_appointments(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<FamilyBookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let token = auth.token();
    for entry in &request.entries {
        authorize_patient(&config, &user, entry.patient_id, token).await?;
    }

    let booking = FamilyBookingCoordinator::new(&config)
        .book_family(request.entries, token)
        .await
        .map_err(map_appointment_error)?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "family_group_id": booking.family_group_id,
        "appointments": booking.appointments
    }))))
}
