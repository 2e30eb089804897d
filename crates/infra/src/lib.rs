//! Infrastructure layer: contact storage backends and the resolution service.

pub mod contact_store;
pub mod resolver;
