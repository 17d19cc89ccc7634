//! Per-vaccine overview of a patient's immunizations.
//!
//! Joins the configured vaccines and their series with the patient's grouped history, so the
//! chart can list every offered vaccine whether or not a dose has been given yet.

use crate::config::ImmunizationsConfig;
use crate::immunization::{DoseSequence, DoseSummary, GroupingKey, VaccineDoseGroup};
use chrono::NaiveDate;
use serde::Serialize;

/// One overview row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VaccineOverviewRow {
    pub vaccine_display_name: Option<String>,
    pub vaccine_code: Option<String>,

    /// Configured series positions; empty for vaccines that are not configured.
    pub sequences: Vec<DoseSequence>,

    /// The patient's doses in series order.
    pub doses: Vec<DoseSummary>,

    /// Most recent administration date among `doses`.
    pub last_administered_on: Option<NaiveDate>,
}

/// Build the overview rows.
///
/// Configured vaccines come first, in configuration order. A group belongs to a configured
/// vaccine when its display name matches (or its code, under [`GroupingKey::Code`]). Groups
/// with no configured vaccine are appended afterwards in their original order.
pub fn vaccine_overview(
    config: &ImmunizationsConfig,
    groups: Vec<VaccineDoseGroup>,
) -> Vec<VaccineOverviewRow> {
    let mut remaining: Vec<Option<VaccineDoseGroup>> = groups.into_iter().map(Some).collect();
    let mut rows = Vec::with_capacity(config.vaccines.len() + remaining.len());

    for vaccine in &config.vaccines {
        let matched = remaining.iter_mut().find_map(|slot| {
            let is_match = slot.as_ref().is_some_and(|group| match config.grouping_key {
                GroupingKey::DisplayName => {
                    group.vaccine_display_name.as_deref() == Some(vaccine.display.as_str())
                }
                GroupingKey::Code => group.vaccine_code.as_deref() == Some(vaccine.uuid.as_str()),
            });
            if is_match { slot.take() } else { None }
        });

        let doses = matched.map(|group| group.doses).unwrap_or_default();
        rows.push(VaccineOverviewRow {
            vaccine_display_name: Some(vaccine.display.to_string()),
            vaccine_code: Some(vaccine.uuid.to_string()),
            sequences: config.sequences_for(vaccine.uuid.as_str()).to_vec(),
            last_administered_on: last_administered(&doses),
            doses,
        });
    }

    for group in remaining.into_iter().flatten() {
        rows.push(VaccineOverviewRow {
            last_administered_on: last_administered(&group.doses),
            vaccine_display_name: group.vaccine_display_name,
            vaccine_code: group.vaccine_code,
            sequences: Vec::new(),
            doses: group.doses,
        });
    }

    rows
}

fn last_administered(doses: &[DoseSummary]) -> Option<NaiveDate> {
    doses.iter().filter_map(|dose| dose.administered_on).max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{VaccineConfig, VaccineSequences};
    use crate::immunization::group_and_order_doses_by;
    use chart_types::{NonEmptyText, ResourceId};
    use fhir::{ImmunizationDoseRecord, VaccineCode};
    use std::num::NonZeroU32;

    fn vaccine(uuid: &str, display: &str) -> VaccineConfig {
        VaccineConfig {
            uuid: ResourceId::parse(uuid).expect("valid id"),
            display: NonEmptyText::new(display).expect("valid name"),
        }
    }

    fn config(grouping_key: GroupingKey) -> ImmunizationsConfig {
        ImmunizationsConfig {
            grouping_key,
            vaccines: vec![vaccine("RotavirusUuid", "Rotavirus"), vaccine("PolioUuid", "Polio")],
            sequences: vec![VaccineSequences {
                vaccine_uuid: ResourceId::parse("RotavirusUuid").expect("valid id"),
                sequences: vec![DoseSequence {
                    label: "dose-1".into(),
                    number: NonZeroU32::new(1).expect("non-zero"),
                }],
            }],
        }
    }

    fn record(code: &str, display: &str, number: u32, on: (i32, u32, u32)) -> ImmunizationDoseRecord {
        ImmunizationDoseRecord {
            vaccine: VaccineCode {
                code: Some(code.into()),
                display: Some(display.into()),
            },
            dose_number: NonZeroU32::new(number),
            administered_on: NaiveDate::from_ymd_opt(on.0, on.1, on.2),
            ..ImmunizationDoseRecord::default()
        }
    }

    #[test]
    fn configured_vaccines_lead_in_config_order() {
        let groups = group_and_order_doses_by(
            vec![
                record("MeaslesUuid", "Measles", 1, (2019, 1, 1)),
                record("PolioUuid", "Polio", 1, (2018, 6, 1)),
                record("PolioUuid", "Polio", 2, (2018, 9, 1)),
            ],
            GroupingKey::DisplayName,
        );

        let rows = vaccine_overview(&config(GroupingKey::DisplayName), groups);
        let names: Vec<_> = rows
            .iter()
            .map(|r| r.vaccine_display_name.as_deref().unwrap_or(""))
            .collect();
        assert_eq!(names, vec!["Rotavirus", "Polio", "Measles"]);

        assert!(rows[0].doses.is_empty());
        assert_eq!(rows[0].sequences.len(), 1);
        assert_eq!(rows[0].last_administered_on, None);

        assert_eq!(rows[1].doses.len(), 2);
        assert_eq!(rows[1].last_administered_on, NaiveDate::from_ymd_opt(2018, 9, 1));

        assert!(rows[2].sequences.is_empty());
    }

    #[test]
    fn code_grouping_matches_on_uuid() {
        let groups = group_and_order_doses_by(
            vec![record("PolioUuid", "IPV", 1, (2018, 6, 1))],
            GroupingKey::Code,
        );

        let rows = vaccine_overview(&config(GroupingKey::Code), groups);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].vaccine_display_name.as_deref(), Some("Polio"));
        assert_eq!(rows[1].doses.len(), 1);
    }

    #[test]
    fn empty_config_passes_groups_through() {
        let groups = group_and_order_doses_by(
            vec![record("PolioUuid", "Polio", 1, (2018, 6, 1))],
            GroupingKey::DisplayName,
        );
        let rows = vaccine_overview(&ImmunizationsConfig::default(), groups);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].vaccine_code.as_deref(), Some("PolioUuid"));
    }
}
