// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, patch},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        // Availability
        .route("/types", get(handlers::get_appointment_types))
        .route("/slots", get(handlers::get_available_slots))
        .route("/slots/consecutive", get(handlers::get_consecutive_slots))

        // Single appointments
        .route("/", post(handlers::book_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{appointment_id}/family-group", get(handlers::get_family_group))
        .route("/patients/{patient_id}/latest", get(handlers::get_latest_appointment))

        // Family groups
        .route("/family/plan", post(handlers::plan_family_booking))
        .route("/family", post(handlers::book_family_appointments))

        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
