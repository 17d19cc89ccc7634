//! Immunization history grouping and submission mapping.
//!
//! A patient's immunization history arrives as a flat list of dose events. The chart shows
//! one row per vaccine with that vaccine's doses in series order, so this module:
//!
//! - groups dose records by vaccine ([`group_and_order_doses`])
//! - orders each group's doses by dose number, with unnumbered doses last
//! - maps a captured dose back to the submission sent to the backend
//!   ([`to_submission_payload`])
//!
//! Everything here is pure and synchronous. Fetching and saving belong to
//! [`crate::store`].

use chart_types::ResourceId;
use chrono::NaiveDate;
use fhir::{ImmunizationDoseRecord, ImmunizationSubmission, VaccineCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroU32;

/// Which vaccine attribute identifies a group.
///
/// `DisplayName` merges records whose display names match even when their codes differ.
/// `Code` keeps such records apart and treats the display name as a label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingKey {
    #[default]
    DisplayName,
    Code,
}

impl GroupingKey {
    fn key_of(self, vaccine: &VaccineCode) -> Option<&str> {
        match self {
            GroupingKey::DisplayName => vaccine.display.as_deref(),
            GroupingKey::Code => vaccine.code.as_deref(),
        }
    }
}

/// One dose within a vaccine group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DoseSummary {
    pub immunization_record_id: Option<String>,
    pub encounter_id: Option<String>,
    pub manufacturer: Option<String>,
    pub lot_number: Option<String>,
    pub dose_sequence_label: Option<String>,
    pub dose_number: Option<NonZeroU32>,
    pub administered_on: Option<NaiveDate>,
    pub expires_on: Option<NaiveDate>,
}

/// All doses of one vaccine, in series order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VaccineDoseGroup {
    /// Display name of the first record seen for this group.
    pub vaccine_display_name: Option<String>,

    /// Code of the first record seen for this group.
    pub vaccine_code: Option<String>,

    /// Doses sorted ascending by dose number; unnumbered doses come last in input order.
    pub doses: Vec<DoseSummary>,
}

/// A position in a vaccination series, as configured and as selected on the form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoseSequence {
    pub label: String,
    pub number: NonZeroU32,
}

/// Values captured when recording or editing a dose.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DoseEntry {
    pub vaccine: VaccineCode,
    pub sequence: Option<DoseSequence>,
    pub vaccination_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub manufacturer: Option<String>,
    pub lot_number: Option<String>,
}

impl DoseEntry {
    /// Rebuild form values from a dose already in the history.
    pub fn from_dose(vaccine: VaccineCode, dose: &DoseSummary) -> Self {
        let sequence = match (&dose.dose_sequence_label, dose.dose_number) {
            (Some(label), Some(number)) => Some(DoseSequence {
                label: label.clone(),
                number,
            }),
            (None, Some(number)) => Some(DoseSequence {
                label: number.to_string(),
                number,
            }),
            _ => None,
        };

        Self {
            vaccine,
            sequence,
            vaccination_date: dose.administered_on,
            expiration_date: dose.expires_on,
            manufacturer: dose.manufacturer.clone(),
            lot_number: dose.lot_number.clone(),
        }
    }
}

/// Group dose records by vaccine display name and order each group's doses.
///
/// See [`group_and_order_doses_by`] for the ordering rules.
pub fn group_and_order_doses<I>(records: I) -> Vec<VaccineDoseGroup>
where
    I: IntoIterator<Item = ImmunizationDoseRecord>,
{
    group_and_order_doses_by(records, GroupingKey::DisplayName)
}

/// Group dose records by the given key and order each group's doses.
///
/// - Groups are returned in order of the first appearance of their key in `records`.
/// - A group's vaccine identity is taken from the first record seen for it, not from the
///   first dose after sorting.
/// - Records with no value for the key are grouped together.
/// - Doses are sorted ascending by dose number. Doses without a number sort after all
///   numbered ones. The sort is stable, so ties keep their input order.
///
/// Every input record ends up in exactly one group.
pub fn group_and_order_doses_by<I>(records: I, key: GroupingKey) -> Vec<VaccineDoseGroup>
where
    I: IntoIterator<Item = ImmunizationDoseRecord>,
{
    let mut groups: Vec<VaccineDoseGroup> = Vec::new();
    let mut slots: HashMap<Option<String>, usize> = HashMap::new();

    for record in records {
        let group_key = key.key_of(&record.vaccine).map(str::to_owned);
        let (vaccine, dose) = split_record(record);

        let slot = *slots.entry(group_key).or_insert_with(|| {
            groups.push(VaccineDoseGroup {
                vaccine_display_name: vaccine.display,
                vaccine_code: vaccine.code,
                doses: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].doses.push(dose);
    }

    for group in &mut groups {
        group.doses.sort_by_key(|dose| dose_order(dose.dose_number));
    }

    tracing::debug!("grouped immunization history into {} vaccines", groups.len());
    groups
}

/// Build the backend submission for a captured dose.
///
/// Passing `immunization_record_id` makes the submission an update of that dose event;
/// leaving it out makes it a create.
pub fn to_submission_payload(
    dose: &DoseEntry,
    patient_id: &ResourceId,
    encounter_id: Option<&ResourceId>,
    immunization_record_id: Option<&ResourceId>,
) -> ImmunizationSubmission {
    ImmunizationSubmission {
        immunization_record_id: immunization_record_id.cloned(),
        patient_id: patient_id.clone(),
        encounter_id: encounter_id.cloned(),
        vaccine: dose.vaccine.clone(),
        dose_sequence_label: dose.sequence.as_ref().map(|s| s.label.clone()),
        dose_number: dose.sequence.as_ref().map(|s| s.number),
        administered_on: dose.vaccination_date,
        expires_on: dose.expiration_date,
        manufacturer: dose.manufacturer.clone(),
        lot_number: dose.lot_number.clone(),
    }
}

/// Sort key placing missing dose numbers after every present one.
fn dose_order(dose_number: Option<NonZeroU32>) -> (bool, Option<NonZeroU32>) {
    (dose_number.is_none(), dose_number)
}

pub(crate) fn split_record(record: ImmunizationDoseRecord) -> (VaccineCode, DoseSummary) {
    let dose = DoseSummary {
        immunization_record_id: record.immunization_record_id,
        encounter_id: record.encounter_id,
        manufacturer: record.manufacturer,
        lot_number: record.lot_number,
        dose_sequence_label: record.dose_sequence_label,
        dose_number: record.dose_number,
        administered_on: record.administered_on,
        expires_on: record.expires_on,
    };
    (record.vaccine, dose)
}
