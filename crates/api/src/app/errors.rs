use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use coalesce_infra::resolver::ResolveError;

/// Maps a failed resolution to the caller-facing response.
///
/// Every failure class (store outage, query error, consistency anomaly) is
/// reported identically: full detail goes to the logs, the caller gets an
/// opaque 500.
pub fn resolve_error_to_response(err: ResolveError) -> axum::response::Response {
    tracing::error!(error = ?err, "identity resolution failed");
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal server error",
    )
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
