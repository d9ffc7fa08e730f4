use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::api::requests::{HistoryQuery, SubmitSubmissionRequest};
use crate::api::responses::{ApiResponse, ErrorResponse, SubmissionRecordResponse, SubmissionResponse};
use crate::models::{SubmissionAttributes, SubmissionStatus};
use crate::observability::{mask_id, AggregatedHealth};
use crate::submission::{codes, GatewayError};

use super::routes::AppState;

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (status, Json(ApiResponse::<()>::error(ErrorResponse::new(code, message))))
}

/// Code returned when the forward outcome is unknown.
pub const FORWARD_OUTCOME_UNKNOWN: &str = "FORWARD_OUTCOME_UNKNOWN";

/// Maps a boundary failure to its HTTP status.
pub fn gateway_error_response(err: &GatewayError) -> ApiError {
    match err {
        GatewayError::Rejected { code, message } => {
            let status = match code.as_str() {
                codes::DUPLICATE_REJECTED | codes::ALREADY_PROCESSED => StatusCode::CONFLICT,
                codes::DUPLICATE_CHECK_UNAVAILABLE | codes::COSIGNER_UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            api_error(status, code, message.clone())
        }
        GatewayError::Timeout | GatewayError::Connection(_) => api_error(
            StatusCode::GATEWAY_TIMEOUT,
            FORWARD_OUTCOME_UNKNOWN,
            "The settlement layer did not answer; the payment may have been accepted",
        ),
    }
}

/// Health check endpoint.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AggregatedHealth>>, ApiError> {
    match &state.health_checker {
        Some(checker) => Ok(Json(ApiResponse::success(checker.check_all().await))),
        None => Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "HEALTH_UNAVAILABLE", "No health checker configured")),
    }
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    match &state.health_checker {
        Some(checker) if checker.is_ready().await => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

/// Boundary entry point: screen, co-sign and forward one signed submission.
pub async fn create_submission(
    State(state): State<AppState>,
    Json(request): Json<SubmitSubmissionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmissionResponse>>), ApiError> {
    let submission = request.into_submission().map_err(|details| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(
                ErrorResponse::new(codes::VALIDATION_FAILED, "Request validation failed").with_details(details),
            )),
        )
    })?;

    let signature = match state.gateway.submit(&submission).await {
        Ok(signature) => signature,
        Err(e) => {
            tracing::info!(
                idempotency_key = %submission.idempotency_key,
                attempt_number = submission.attempt_number,
                "Submission not accepted: {}", e
            );
            return Err(gateway_error_response(&e));
        }
    };

    let attributes = SubmissionAttributes::from_payment(&submission.payment, SubmissionStatus::Confirmed);
    let persisted = match state.resolver.persist(&signature, attributes).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(
                signature = %mask_id(&signature),
                "Forwarded submission not persisted, leaving it to reconciliation: {}", e
            );
            false
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(SubmissionResponse {
            signature,
            idempotency_key: submission.idempotency_key,
            attempt_number: submission.attempt_number,
            persisted,
        })),
    ))
}

/// Reconciled status view for one signature.
pub async fn get_submission(
    State(state): State<AppState>,
    Path(signature): Path<String>,
) -> Result<Json<ApiResponse<SubmissionRecordResponse>>, ApiError> {
    match state.resolver.find(&signature).await {
        Ok(Some(record)) => Ok(Json(ApiResponse::success(SubmissionRecordResponse::from(record)))),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Submission {} not found", signature),
        )),
        Err(e) => {
            tracing::error!("Failed to load submission: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred",
            ))
        }
    }
}

/// Payment history for one sender, newest first.
pub async fn list_sender_submissions(
    State(state): State<AppState>,
    Path(sender_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<SubmissionRecordResponse>>>, ApiError> {
    match state.resolver.history(&sender_id, query.limit.unwrap_or(20)).await {
        Ok(records) => Ok(Json(ApiResponse::success(
            records.into_iter().map(SubmissionRecordResponse::from).collect(),
        ))),
        Err(e) => {
            tracing::error!(sender_id = %mask_id(&sender_id), "Failed to load history: {}", e);
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred",
            ))
        }
    }
}
