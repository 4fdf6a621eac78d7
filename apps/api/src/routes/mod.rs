pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::diagnosis::handlers;
use crate::report::handlers as report_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Diagnoses
        .route("/api/v1/diagnoses", get(handlers::handle_list_diagnoses))
        .route("/api/v1/diagnosis/:id", get(handlers::handle_get_diagnosis))
        .route("/api/v1/diagnosis/:id/start", post(handlers::handle_start))
        // Sessions
        .route(
            "/api/v1/diagnosis/session/:id",
            get(handlers::handle_get_session),
        )
        .route(
            "/api/v1/diagnosis/session/:id/answer",
            post(handlers::handle_answer),
        )
        .route(
            "/api/v1/diagnosis/session/:id/complete",
            post(handlers::handle_complete),
        )
        // Results and reports
        .route(
            "/api/v1/diagnosis/result/:id",
            get(handlers::handle_get_result),
        )
        .route(
            "/api/v1/diagnosis/result/:id/report",
            get(report_handlers::handle_get_report).post(report_handlers::handle_request_report),
        )
        .with_state(state)
}
