use serde::Deserialize;

use coalesce_core::ConsolidatedContact;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct IdentifyRequest {
    pub email: Option<String>,
    #[serde(rename = "phoneNumber")]
    pub phone_number: Option<String>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

/// Wraps a consolidated cluster in the `{"contact": ...}` response envelope.
///
/// A degenerate request resolves to no cluster; the envelope then carries a
/// null primary id and empty lists rather than an error.
pub fn contact_envelope(view: Option<&ConsolidatedContact>) -> serde_json::Value {
    match view {
        Some(view) => serde_json::json!({ "contact": view }),
        None => serde_json::json!({
            "contact": {
                "primaryContactId": null,
                "emails": [],
                "phoneNumbers": [],
                "secondaryContactIds": [],
            }
        }),
    }
}
