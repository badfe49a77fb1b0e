//! Client side of the rsearch translation contract: search-style query in, SQL predicate out.

pub mod client;
pub mod types;

pub use client::{Translate, TranslationClient, TranslationError};
pub use types::{HealthStatus, Predicate, TranslationRequest};
