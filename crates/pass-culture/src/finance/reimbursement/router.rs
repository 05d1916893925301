use std::io::Cursor;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{patch, post},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use super::rule::ReimbursementRuleError;
use super::service::{ImportMode, ReimbursementRuleService, ReimbursementServiceError};
use crate::dates::start_of_day;
use crate::ids::ReimbursementRuleId;
use crate::store::Store;

#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct EndDateForm {
    pub end_date: NaiveDate,
}

pub fn reimbursement_router<S>(service: Arc<ReimbursementRuleService<S>>) -> Router
where
    S: Store + 'static,
{
    Router::new()
        .route(
            "/backoffice/reimbursement_rules/import",
            post(import_handler::<S>),
        )
        .route(
            "/backoffice/reimbursement_rules/:rule_id",
            patch(edit_end_date_handler::<S>),
        )
        .with_state(service)
}

fn failure_response(error: ReimbursementServiceError) -> Response {
    match error {
        ReimbursementServiceError::Rule(ReimbursementRuleError::Validation(errors)) => {
            errors.into_response()
        }
        ReimbursementServiceError::Rule(rule_error) => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "errors": { "end_date": [rule_error.to_string()] } })),
        )
            .into_response(),
        ReimbursementServiceError::Csv(csv_error) => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "error": csv_error.to_string() })),
        )
            .into_response(),
        ReimbursementServiceError::RuleNotFound(rule_id) => (
            StatusCode::NOT_FOUND,
            axum::Json(json!({ "error": format!("reimbursement rule {rule_id} not found") })),
        )
            .into_response(),
        ReimbursementServiceError::Repository(repository_error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({ "error": repository_error.to_string() })),
        )
            .into_response(),
    }
}

pub(crate) async fn import_handler<S>(
    State(service): State<Arc<ReimbursementRuleService<S>>>,
    Query(query): Query<ImportQuery>,
    body: String,
) -> Response
where
    S: Store + 'static,
{
    let mode = if query.dry_run {
        ImportMode::DryRun
    } else {
        ImportMode::Persist
    };
    let now = Utc::now().naive_utc();
    match service.import_rules(Cursor::new(body.into_bytes()), mode, now) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => failure_response(error),
    }
}

pub(crate) async fn edit_end_date_handler<S>(
    State(service): State<Arc<ReimbursementRuleService<S>>>,
    Path(rule_id): Path<u64>,
    axum::Json(form): axum::Json<EndDateForm>,
) -> Response
where
    S: Store + 'static,
{
    let now = Utc::now().naive_utc();
    match service.edit_rule_end_date(ReimbursementRuleId(rule_id), start_of_day(form.end_date), now) {
        Ok(rule) => (StatusCode::OK, axum::Json(rule)).into_response(),
        Err(error) => failure_response(error),
    }
}
