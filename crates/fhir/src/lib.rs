//! FHIR wire/boundary support for the patient chart.
//!
//! This crate provides **wire models** and **format/translation helpers** for the FHIR JSON
//! exchanged with the immunization backend:
//! - search-set bundles of `Immunization` resources
//! - single-entry submissions used to create or update a dose event
//!
//! This crate focuses on:
//! - FHIR semantic alignment for the subset of fields the chart uses
//! - serialisation/deserialisation
//! - translation between domain primitives and wire structs
//!
//! Grouping, ordering and form handling live in `chart-core`.

pub mod immunization;

// Re-export facades
pub use immunization::ImmunizationBundle;

// Re-export public domain-level types
pub use immunization::{ImmunizationDoseRecord, ImmunizationSubmission, UpsertedBundle, VaccineCode};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
