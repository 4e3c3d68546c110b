// libs/conversation-cell/src/handlers.rs
use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use tracing::warn;

use patient_cell::models::PatientError;
use patient_cell::services::PatientService;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{ChatMessage, CompleteFormRequest, ConversationContext, HandleMessageRequest, UiAction};
use crate::services::ConversationRouter;

#[axum::debug_handler]
pub async fn greeting() -> Json<Value> {
    let output = ConversationRouter::greeting();

    Json(json!({
        "messages": [ChatMessage::assistant(output.bot_message)],
        "ui_action": UiAction::None
    }))
}

#[axum::debug_handler]
pub async fn handle_message(
    State(config): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<HandleMessageRequest>,
) -> Result<Json<Value>, AppError> {
    if request.content.trim().is_empty() {
        return Err(AppError::ValidationError("Message content is required".to_string()));
    }

    // The session token already proved the caller is signed in.
    let mut context = owned_context(&config, &user, request.context, auth.token()).await?;
    context.authenticated = true;

    let response = ConversationRouter::new(&config)
        .handle_message(request.history, &context, request.content, auth.token())
        .await;

    Ok(Json(json!(response)))
}

/// Drops a claimed verified patient that lies outside the caller's account; staff may act for anyone.
async fn owned_context(
    config: &AppConfig,
    user: &User,
    mut context: ConversationContext,
    token: &str,
) -> Result<ConversationContext, AppError> {
    let Some(patient_id) = context.verified_patient_id else {
        context.verified = false;
        return Ok(context);
    };
    if user.is_staff() {
        return Ok(context);
    }

    let owned = match PatientService::new(config).get_patient(patient_id, token).await {
        Ok(patient) => patient.user_id.to_string() == user.id,
        Err(PatientError::NotFound) => false,
        Err(e) => return Err(AppError::Database(e.to_string())),
    };

    if !owned {
        warn!("User {} claimed verified patient {} outside their account", user.id, patient_id);
        context.verified = false;
        context.verified_patient_id = None;
    }

    Ok(context)
}

#[axum::debug_handler]
pub async fn complete_form(
    State(config): State<Arc<AppConfig>>,
    Json(request): Json<CompleteFormRequest>,
) -> Json<Value> {
    let output = ConversationRouter::new(&config).complete_form(&request.history, request.completion);

    Json(json!({
        "messages": [ChatMessage::assistant(output.bot_message)],
        "ui_action": output.ui_action
    }))
}
