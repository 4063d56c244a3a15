use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::domain::CaseId;
use super::engine::{TriageError, TriageRequest};
use super::repository::{ActionDispatcher, RepositoryError, TriageRepository};
use super::service::TriageService;

/// Router builder exposing the triage endpoints.
pub fn triage_router<R, D>(service: Arc<TriageService<R, D>>) -> Router
where
    R: TriageRepository + 'static,
    D: ActionDispatcher + 'static,
{
    Router::new()
        .route("/api/v1/triage/cases", post(triage_handler::<R, D>))
        .route("/api/v1/triage/cases/:case_id", get(latest_handler::<R, D>))
        .with_state(service)
}

pub(crate) async fn triage_handler<R, D>(
    State(service): State<Arc<TriageService<R, D>>>,
    axum::Json(request): axum::Json<TriageRequest>,
) -> Response
where
    R: TriageRepository + 'static,
    D: ActionDispatcher + 'static,
{
    match service.triage(request).await {
        Ok(outcome) => {
            let payload = json!({
                "result": outcome.result,
                "report_markdown": outcome.report.detailed,
                "summary": outcome.report.summary,
                "dispatch": outcome.dispatch,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn latest_handler<R, D>(
    State(service): State<Arc<TriageService<R, D>>>,
    Path(case_id): Path<String>,
) -> Response
where
    R: TriageRepository + 'static,
    D: ActionDispatcher + 'static,
{
    let id = CaseId(case_id);
    match service.latest(&id) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(TriageError::Repository(RepositoryError::NotFound)) => {
            let payload = json!({
                "case_id": id.0,
                "error": "no triage result recorded for case",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(other) => error_response(other),
    }
}

fn error_response(error: TriageError) -> Response {
    let status = match &error {
        TriageError::InvalidRequest(_) | TriageError::Configuration(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        TriageError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        TriageError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        TriageError::Validation(_) | TriageError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
