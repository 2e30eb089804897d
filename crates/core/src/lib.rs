//! `coalesce-core` — identity domain building blocks.
//!
//! This crate contains **pure domain** primitives (no I/O, no async): the
//! contact record model, observation normalization, and the resolution
//! decisions the service layer applies against a store.

pub mod contact;
pub mod error;
pub mod observation;
pub mod resolution;

pub use contact::{Contact, ContactId, LinkPrecedence, NewContact};
pub use error::{DomainError, DomainResult};
pub use observation::{normalize_email, Observation};
pub use resolution::{consolidate, plan_extension, ConsolidatedContact, MergePlan};
