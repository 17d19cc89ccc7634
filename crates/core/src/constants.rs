//! Constants used throughout the chart core crate.
//!
//! This module contains path and filename constants to ensure
//! consistency across the codebase and make maintenance easier.

/// Default directory for chart data storage when no explicit directory is configured.
pub const DEFAULT_CHART_DATA_DIR: &str = "chart_data";

/// Directory name for immunization bundle storage.
pub const IMMUNIZATIONS_DIR_NAME: &str = "immunizations";

/// File extension for stored immunization bundles.
pub const BUNDLE_FILE_EXTENSION: &str = "json";
