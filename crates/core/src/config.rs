//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services as
//! `Arc<CoreConfig>`, so request handling never reads process-wide environment variables.
//!
//! Chart settings come from an optional YAML file:
//!
//! ```yaml
//! immunizations:
//!   grouping_key: display_name      # or: code
//!   vaccines:
//!     - uuid: RotavirusUuid
//!       display: Rotavirus
//!   sequences:
//!     - vaccine_uuid: RotavirusUuid
//!       sequences:
//!         - { label: dose-1, number: 1 }
//!         - { label: booster-1, number: 11 }
//! vitals:
//!   pulse: { min: 60, max: 100 }
//! ```

use crate::constants::IMMUNIZATIONS_DIR_NAME;
use crate::immunization::{DoseSequence, GroupingKey};
use crate::vitals::VitalsRanges;
use crate::{ChartError, ChartResult};
use chart_types::{NonEmptyText, ResourceId};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A vaccine offered on the chart.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaccineConfig {
    /// Concept identifier; matches the `vaccineCode` code of dose records.
    pub uuid: ResourceId,
    pub display: NonEmptyText,
}

/// Series positions configured for one vaccine.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaccineSequences {
    pub vaccine_uuid: ResourceId,
    pub sequences: Vec<DoseSequence>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImmunizationsConfig {
    pub grouping_key: GroupingKey,
    pub vaccines: Vec<VaccineConfig>,
    pub sequences: Vec<VaccineSequences>,
}

impl ImmunizationsConfig {
    /// Configured sequences for a vaccine code; empty when none are configured.
    pub fn sequences_for(&self, vaccine_uuid: &str) -> &[DoseSequence] {
        self.sequences
            .iter()
            .find(|s| s.vaccine_uuid.as_str() == vaccine_uuid)
            .map(|s| s.sequences.as_slice())
            .unwrap_or(&[])
    }

    fn validate(&self) -> ChartResult<()> {
        let mut seen = HashSet::new();
        for vaccine in &self.vaccines {
            if !seen.insert(vaccine.uuid.as_str()) {
                return Err(ChartError::InvalidInput(format!(
                    "vaccine '{}' is configured more than once",
                    vaccine.uuid
                )));
            }
        }

        for entry in &self.sequences {
            if !seen.contains(entry.vaccine_uuid.as_str()) {
                tracing::warn!(
                    "sequences configured for unknown vaccine '{}'",
                    entry.vaccine_uuid
                );
            }
        }

        Ok(())
    }
}

/// Chart settings as read from the YAML configuration file.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChartSettings {
    pub immunizations: ImmunizationsConfig,
    pub vitals: VitalsRanges,
}

impl ChartSettings {
    /// Parse settings from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ChartError::YamlDeserialization`] for malformed YAML or unknown keys, and
    /// [`ChartError::InvalidInput`] for inconsistent settings.
    pub fn parse(yaml_text: &str) -> ChartResult<Self> {
        let settings: ChartSettings =
            serde_yaml::from_str(yaml_text).map_err(ChartError::YamlDeserialization)?;
        settings.immunizations.validate()?;
        settings
            .vitals
            .validate()
            .map_err(ChartError::InvalidInput)?;
        Ok(settings)
    }

    /// Load settings from a YAML file, or use defaults when no file is given.
    pub fn load(path: Option<&Path>) -> ChartResult<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(ChartError::FileRead)?;
                Self::parse(&text)
            }
            None => Ok(Self::default()),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    chart_data_dir: PathBuf,
    settings: ChartSettings,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(chart_data_dir: PathBuf, settings: ChartSettings) -> ChartResult<Self> {
        if chart_data_dir.as_os_str().is_empty() {
            return Err(ChartError::InvalidInput(
                "chart data directory cannot be empty".into(),
            ));
        }

        Ok(Self {
            chart_data_dir,
            settings,
        })
    }

    pub fn chart_data_dir(&self) -> &Path {
        &self.chart_data_dir
    }

    pub fn immunizations_dir(&self) -> PathBuf {
        self.chart_data_dir.join(IMMUNIZATIONS_DIR_NAME)
    }

    pub fn immunizations(&self) -> &ImmunizationsConfig {
        &self.settings.immunizations
    }

    pub fn vitals_ranges(&self) -> &VitalsRanges {
        &self.settings.vitals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
immunizations:
  grouping_key: code
  vaccines:
    - uuid: RotavirusUuid
      display: Rotavirus
    - uuid: PolioUuid
      display: Polio
  sequences:
    - vaccine_uuid: RotavirusUuid
      sequences:
        - { label: dose-1, number: 1 }
        - { label: dose-2, number: 2 }
        - { label: booster-1, number: 11 }
vitals:
  pulse: { min: 50, max: 110 }
"#;

    #[test]
    fn parses_sample_settings() {
        let settings = ChartSettings::parse(SAMPLE).expect("parse settings");
        let immunizations = &settings.immunizations;
        assert_eq!(immunizations.grouping_key, GroupingKey::Code);
        assert_eq!(immunizations.vaccines.len(), 2);
        assert_eq!(immunizations.sequences_for("RotavirusUuid").len(), 3);
        assert!(immunizations.sequences_for("PolioUuid").is_empty());

        let pulse = settings.vitals.pulse.expect("pulse range");
        assert_eq!(pulse.min, 50.0);
        // Unlisted ranges fall back to their defaults.
        assert_eq!(settings.vitals.systolic, VitalsRanges::default().systolic);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let settings = ChartSettings::parse("{}").expect("parse settings");
        assert_eq!(settings, ChartSettings::default());
        assert_eq!(
            settings.immunizations.grouping_key,
            GroupingKey::DisplayName
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = ChartSettings::parse("immunisations: {}").expect_err("unknown key");
        assert!(matches!(err, ChartError::YamlDeserialization(_)));
    }

    #[test]
    fn rejects_duplicate_vaccines() {
        let yaml = r#"
immunizations:
  vaccines:
    - { uuid: PolioUuid, display: Polio }
    - { uuid: PolioUuid, display: IPV }
"#;
        let err = ChartSettings::parse(yaml).expect_err("duplicate vaccine");
        assert!(matches!(err, ChartError::InvalidInput(_)));
    }

    #[test]
    fn rejects_blank_display_name() {
        let yaml = r#"
immunizations:
  vaccines:
    - { uuid: PolioUuid, display: "  " }
"#;
        let err = ChartSettings::parse(yaml).expect_err("blank display");
        assert!(matches!(err, ChartError::YamlDeserialization(_)));
    }

    #[test]
    fn rejects_zero_sequence_number() {
        let yaml = r#"
immunizations:
  sequences:
    - vaccine_uuid: PolioUuid
      sequences:
        - { label: birth, number: 0 }
"#;
        assert!(ChartSettings::parse(yaml).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write settings");

        let settings = ChartSettings::load(Some(file.path())).expect("load settings");
        assert_eq!(settings.immunizations.vaccines[0].display.as_str(), "Rotavirus");
        assert_eq!(ChartSettings::load(None).expect("defaults"), ChartSettings::default());
    }

    #[test]
    fn core_config_derives_storage_paths() {
        let cfg = CoreConfig::new(PathBuf::from("/tmp/chart"), ChartSettings::default())
            .expect("config");
        assert_eq!(cfg.immunizations_dir(), PathBuf::from("/tmp/chart/immunizations"));
        assert!(CoreConfig::new(PathBuf::new(), ChartSettings::default()).is_err());
    }
}
