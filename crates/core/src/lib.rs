//! # Chart Core
//!
//! Core business logic for the patient chart.
//!
//! This crate contains the immunization and vitals rules and their file-backed storage:
//! - grouping a patient's immunization history by vaccine, doses in series order
//! - mapping a captured dose back to a backend submission
//! - form lifecycles for dose and vitals entry
//! - vitals range checks, header state and BMI
//! - file storage of immunization bundles under the chart data directory
//!
//! **No API concerns**: HTTP servers and CLI parsing belong in `api-rest` and `chart-cli`.

pub mod biometrics;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod form;
pub mod immunization;
pub mod overview;
pub mod service;
pub mod store;
pub mod vitals;

pub use config::{ChartSettings, CoreConfig, ImmunizationsConfig};
pub use context::ChartContext;
pub use error::{ChartError, ChartResult};
pub use form::{FormLifecycle, FormState, ImmunizationForm};
pub use immunization::{
    group_and_order_doses, group_and_order_doses_by, to_submission_payload, DoseEntry,
    DoseSequence, DoseSummary, GroupingKey, VaccineDoseGroup,
};
pub use overview::{vaccine_overview, VaccineOverviewRow};
pub use service::ImmunizationService;
pub use store::{FileImmunizationStore, ImmunizationStore};
pub use vitals::{
    Measurement, VitalsAssessment, VitalsEntry, VitalsForm, VitalsHeaderState, VitalsRanges,
};
