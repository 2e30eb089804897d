use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use coalesce_core::Observation;

use crate::app::dto::{contact_envelope, IdentifyRequest};
use crate::app::errors;
use crate::app::services::AppServices;

/// `POST /identify`: reconcile one (email, phone) observation.
///
/// Typed extraction rejects malformed bodies before any resolution runs.
pub async fn identify(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<IdentifyRequest>,
) -> axum::response::Response {
    let observation = Observation::new(body.email, body.phone_number);

    match services.resolve(observation).await {
        Ok(view) => (StatusCode::OK, Json(contact_envelope(view.as_ref()))).into_response(),
        Err(err) => errors::resolve_error_to_response(err),
    }
}
