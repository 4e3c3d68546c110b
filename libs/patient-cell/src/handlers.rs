use std::sync::Arc;
use axum::{
    extract::{Path, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AddFamilyMemberRequest, Patient, PatientError, RegisterPatientRequest, VerificationOutcome,
    VerifyIdentityRequest,
};
use crate::services::{IdentityVerifier, PatientService};

pub const VERIFICATION_FAILED_MESSAGE: &str =
    "I couldn't verify your information. Please check your details and try again, or if you're a new patient, would you like to register?";

pub const DUPLICATE_PATIENT_MESSAGE: &str =
    "It looks like you're already registered with us. Please verify your identity instead by providing: [Full Name], [10-digit phone], [YYYY-MM-DD]";

fn map_patient_error(e: PatientError) -> AppError {
    match e {
        PatientError::NotFound => AppError::NotFound("Patient not found".to_string()),
        PatientError::DuplicatePatient => AppError::Conflict(DUPLICATE_PATIENT_MESSAGE.to_string()),
        PatientError::Unauthorized => AppError::Auth("Not authorized to access this patient".to_string()),
        PatientError::ValidationError(msg) => AppError::ValidationError(msg),
        PatientError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn account_id(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Session subject is not a valid account id".to_string()))
}

/// Patients may only touch rows under their own account; staff may touch any.
fn ensure_owner(user: &User, patient: &Patient) -> Result<(), AppError> {
    if user.is_staff() || patient.user_id.to_string() == user.id {
        Ok(())
    } else {
        Err(map_patient_error(PatientError::Unauthorized))
    }
}

#[axum::debug_handler]
pub async fn register_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RegisterPatientRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = PatientService::new(&config);

    let patient = service.register_patient(account_id(&user)?, request, auth.token())
        .await
        .map_err(map_patient_error)?;

    Ok((StatusCode::CREATED, Json(json!(patient))))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(&config);

    let patient = service.get_patient(patient_id, auth.token())
        .await
        .map_err(map_patient_error)?;
    ensure_owner(&user, &patient)?;

    Ok(Json(json!(patient)))
}

/// Verification failures are reported with one opaque message whatever the reason.
#[axum::debug_handler]
pub async fn verify_identity(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<VerifyIdentityRequest>,
) -> Result<Json<Value>, AppError> {
    let verifier = IdentityVerifier::new(&config);

    let outcome = verifier
        .verify(&request.full_name, &request.phone_number, request.date_of_birth, auth.token())
        .await
        .map_err(map_patient_error)?;

    Ok(Json(match outcome {
        VerificationOutcome::Verified(patient) => json!({
            "verified": true,
            "patient": patient
        }),
        VerificationOutcome::Unverified(_) => json!({
            "verified": false,
            "message": VERIFICATION_FAILED_MESSAGE
        }),
    }))
}

#[axum::debug_handler]
pub async fn get_family_members(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = PatientService::new(&config);

    let primary = service.get_patient(patient_id, auth.token())
        .await
        .map_err(map_patient_error)?;
    ensure_owner(&user, &primary)?;

    let members = service.family_members(primary.id, auth.token())
        .await
        .map_err(map_patient_error)?;

    Ok(Json(json!({
        "primary_patient": primary,
        "family_members": members,
        "total": members.len()
    })))
}

#[axum::debug_handler]
pub async fn add_family_member(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<AddFamilyMemberRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let service = PatientService::new(&config);

    let primary = service.get_patient(patient_id, auth.token())
        .await
        .map_err(map_patient_error)?;
    ensure_owner(&user, &primary)?;

    let member = service.add_family_member(primary.id, request, auth.token())
        .await
        .map_err(map_patient_error)?;

    Ok((StatusCode::CREATED, Json(json!(member))))
}
