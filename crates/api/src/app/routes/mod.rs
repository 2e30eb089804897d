use axum::{routing::post, Router};

pub mod identify;
pub mod system;

/// Router for the identity endpoints.
pub fn router() -> Router {
    Router::new().route("/identify", post(identify::identify))
}
