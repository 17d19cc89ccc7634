//! FHIR-aligned Immunization wire models and translation helpers.
//!
//! This module provides both domain-level types and wire models for immunization
//! administration records, which describe a single vaccine dose given to a patient.
//!
//! Responsibilities:
//! - Define public domain-level types for external API use
//! - Define a lenient wire model for search-set bundles and a strict one for submissions
//! - Provide translation helpers between domain primitives and the wire model
//!
//! Notes:
//! - Bundle parsing only fails on structural problems (not JSON, `entry` not an array).
//!   Individual fields that are missing or have an unexpected shape degrade to `None`.
//! - Dose sequence data is read from `protocolApplied[0].protocol` first and then from
//!   `protocolApplied[0]` itself; both shapes are produced by different backends.

use crate::{FhirError, FhirResult};
use chart_types::ResourceId;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::num::NonZeroU32;

const IMMUNIZATION_RESOURCE_TYPE: &str = "Immunization";
const BUNDLE_RESOURCE_TYPE: &str = "Bundle";
const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Public domain-level types
// ============================================================================

/// Vaccine identity as carried by `vaccineCode`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VaccineCode {
    /// Concept code (first coding).
    pub code: Option<String>,

    /// Human-readable vaccine name.
    pub display: Option<String>,
}

/// Domain-level carrier for one administered dose (flat structure).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImmunizationDoseRecord {
    /// Identifier of the administration event.
    pub immunization_record_id: Option<String>,

    /// Encounter in which the dose was given.
    pub encounter_id: Option<String>,

    pub vaccine: VaccineCode,

    pub manufacturer: Option<String>,

    pub lot_number: Option<String>,

    /// Label of the dose within its series, e.g. "2 Months".
    pub dose_sequence_label: Option<String>,

    /// Ordinal position of the dose within its series.
    pub dose_number: Option<NonZeroU32>,

    pub administered_on: Option<NaiveDate>,

    /// Expiration date of the vaccine lot.
    pub expires_on: Option<NaiveDate>,
}

/// Domain-level carrier for a dose being saved to the backend.
///
/// The presence of `immunization_record_id` is the only thing distinguishing an update of an
/// existing dose event from the creation of a new one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImmunizationSubmission {
    pub immunization_record_id: Option<ResourceId>,
    pub patient_id: ResourceId,
    pub encounter_id: Option<ResourceId>,
    pub vaccine: VaccineCode,
    pub dose_sequence_label: Option<String>,
    pub dose_number: Option<NonZeroU32>,
    pub administered_on: Option<NaiveDate>,
    pub expires_on: Option<NaiveDate>,
    pub manufacturer: Option<String>,
    pub lot_number: Option<String>,
}

impl ImmunizationSubmission {
    /// Returns true when this submission targets an existing dose event.
    pub fn is_update(&self) -> bool {
        self.immunization_record_id.is_some()
    }

    /// Render the submission as a JSON entry (`{ "resource": { ... } }`).
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Translation`] if serialisation fails.
    pub fn render(&self) -> FhirResult<String> {
        let entry = EntryWire {
            resource: submission_to_wire(self),
        };
        serde_json::to_string_pretty(&entry)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise submission: {e}")))
    }
}

/// Result of inserting or replacing a submission in a stored bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertedBundle {
    /// The updated bundle JSON.
    pub json: String,

    /// Whether an existing entry with the same id was replaced.
    pub replaced: bool,
}

// ============================================================================
// Public ImmunizationBundle operations
// ============================================================================

/// Immunization bundle operations.
///
/// This is a zero-sized type used for namespacing immunization-related operations.
/// All methods are associated functions.
pub struct ImmunizationBundle;

impl ImmunizationBundle {
    /// Parse a search-set bundle of Immunization resources.
    ///
    /// Entries whose resource is missing, is not a JSON object, or is not of type
    /// `Immunization` are skipped. Everything else is translated field by field.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Translation`] with the failing path if the document is not a JSON
    /// object or `entry` is not an array.
    pub fn parse(json_text: &str) -> FhirResult<Vec<ImmunizationDoseRecord>> {
        let bundle = parse_bundle_wire(json_text)?;

        let records = bundle
            .entry
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match entry_value_to_wire(entry) {
                Some(wire) => Some(wire_to_record(wire)),
                None => {
                    tracing::debug!("skipping non-immunization bundle entry {index}");
                    None
                }
            })
            .collect();

        Ok(records)
    }

    /// Parse a single `{ "resource": { ... } }` entry.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidJson`] if the text is not JSON, or
    /// [`FhirError::InvalidInput`] if it does not wrap an Immunization resource.
    pub fn parse_entry(json_text: &str) -> FhirResult<ImmunizationDoseRecord> {
        let value: serde_json::Value = serde_json::from_str(json_text)?;
        let wire = entry_value_to_wire(value).ok_or_else(|| {
            FhirError::InvalidInput("Expected an entry wrapping an Immunization resource".into())
        })?;
        Ok(wire_to_record(wire))
    }

    /// Render dose records as a search-set bundle.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Translation`] if serialisation fails.
    pub fn render(records: &[ImmunizationDoseRecord]) -> FhirResult<String> {
        let entry = records
            .iter()
            .map(|record| {
                serde_json::to_value(EntryWire {
                    resource: record_to_wire(record),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| FhirError::Translation(format!("Failed to serialise entry: {e}")))?;

        render_bundle_wire(&BundleWire::searchset(entry))
    }

    /// Insert a submission into a stored bundle, or replace the entry with the same id.
    ///
    /// Entries other than the replaced one are carried over untouched. A submission without a
    /// record id is always appended.
    ///
    /// # Arguments
    ///
    /// * `bundle_json` - The current bundle, or `None` when nothing has been stored yet.
    /// * `submission` - The dose to store.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if the existing bundle cannot be parsed or the result cannot be
    /// serialised.
    pub fn upsert(
        bundle_json: Option<&str>,
        submission: &ImmunizationSubmission,
    ) -> FhirResult<UpsertedBundle> {
        let mut bundle = match bundle_json {
            Some(text) => parse_bundle_wire(text)?,
            None => BundleWire::searchset(Vec::new()),
        };

        let new_entry = serde_json::to_value(EntryWire {
            resource: submission_to_wire(submission),
        })
        .map_err(|e| FhirError::Translation(format!("Failed to serialise submission: {e}")))?;

        let target_id = submission.immunization_record_id.as_ref().map(|id| id.as_str());
        let existing = target_id.and_then(|id| {
            bundle.entry.iter().position(|entry| {
                entry
                    .pointer("/resource/id")
                    .and_then(serde_json::Value::as_str)
                    == Some(id)
            })
        });

        let replaced = match existing {
            Some(index) => {
                bundle.entry[index] = new_entry;
                true
            }
            None => {
                bundle.entry.push(new_entry);
                false
            }
        };

        Ok(UpsertedBundle {
            json: render_bundle_wire(&bundle)?,
            replaced,
        })
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

/// Wire representation of a search-set bundle.
///
/// Entries are kept as raw JSON so that stored bundles keep fields this crate does not model.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct BundleWire {
    #[serde(rename = "resourceType", default = "bundle_resource_type")]
    pub resource_type: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<String>,

    #[serde(default)]
    pub entry: Vec<serde_json::Value>,
}

impl BundleWire {
    fn searchset(entry: Vec<serde_json::Value>) -> Self {
        Self {
            resource_type: bundle_resource_type(),
            bundle_type: Some("searchset".into()),
            entry,
        }
    }
}

fn bundle_resource_type() -> String {
    BUNDLE_RESOURCE_TYPE.to_string()
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct EntryWire {
    pub resource: ImmunizationWire,
}

/// Wire representation of an Immunization resource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct ImmunizationWire {
    #[serde(default, deserialize_with = "lenient")]
    pub resource_type: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub vaccine_code: Option<CodeableConceptWire>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub patient: Option<ReferenceWire>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub encounter: Option<ReferenceWire>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub occurrence_date_time: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<ReferenceWire>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<String>,

    #[serde(default, deserialize_with = "lenient_each", skip_serializing_if = "Vec::is_empty")]
    pub protocol_applied: Vec<ProtocolAppliedWire>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
struct CodeableConceptWire {
    #[serde(default, deserialize_with = "lenient_each", skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<CodingWire>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
struct CodingWire {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
struct ReferenceWire {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// One `protocolApplied` element. Sequence fields may sit here directly or under `protocol`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct ProtocolAppliedWire {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ProtocolWire>,

    #[serde(flatten)]
    pub direct: ProtocolWire,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct ProtocolWire {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub dose_number_positive_int: Option<u32>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub occurrence_date_time: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

/// Deserialise an optional field, turning values of the wrong shape into `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Deserialise a list field element by element.
///
/// A malformed element becomes `T::default()` in its own position, so it never hides its
/// siblings and index-based reads (`[0]`) still see the element that was sent there.
/// A value that is not an array at all becomes an empty list.
fn lenient_each<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let items = match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Array(items)) => items,
        _ => return Ok(Vec::new()),
    };

    Ok(items
        .into_iter()
        .map(|item| serde_json::from_value(item).unwrap_or_default())
        .collect())
}

fn parse_bundle_wire(json_text: &str) -> FhirResult<BundleWire> {
    let mut deserializer = serde_json::Deserializer::from_str(json_text);

    match serde_path_to_error::deserialize::<_, BundleWire>(&mut deserializer) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() || path == "." {
                "<root>"
            } else {
                path.as_str()
            };
            Err(FhirError::Translation(format!(
                "Immunization bundle schema mismatch at {path}: {source}"
            )))
        }
    }
}

fn render_bundle_wire(bundle: &BundleWire) -> FhirResult<String> {
    serde_json::to_string_pretty(bundle)
        .map_err(|e| FhirError::Translation(format!("Failed to serialise bundle: {e}")))
}

/// Extract the Immunization resource from a raw bundle entry, if there is one.
fn entry_value_to_wire(entry: serde_json::Value) -> Option<ImmunizationWire> {
    let resource = match entry {
        serde_json::Value::Object(mut map) => map.remove("resource")?,
        _ => return None,
    };

    let wire: ImmunizationWire = serde_json::from_value(resource).ok()?;
    match wire.resource_type.as_deref() {
        Some(IMMUNIZATION_RESOURCE_TYPE) => Some(wire),
        _ => None,
    }
}

/// Treat whitespace-only strings as absent. Values are kept verbatim otherwise, so
/// `"Polio "` and `"Polio"` remain distinct grouping keys.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a FHIR date or date-time, keeping the date part.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let date_part = value.trim().split('T').next()?;
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

fn first_date(candidates: [Option<&str>; 3]) -> Option<NaiveDate> {
    candidates.into_iter().flatten().find_map(parse_date)
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn encounter_id_from(reference: ReferenceWire) -> Option<String> {
    non_blank(reference.id).or_else(|| {
        reference
            .reference
            .as_deref()
            .and_then(|r| r.strip_prefix("Encounter/"))
            .map(str::to_string)
            .and_then(|id| non_blank(Some(id)))
    })
}

/// Convert a wire Immunization resource to the flat domain record.
fn wire_to_record(wire: ImmunizationWire) -> ImmunizationDoseRecord {
    let vaccine = wire
        .vaccine_code
        .map(|concept| {
            let coding = concept.coding.into_iter().next().unwrap_or_default();
            VaccineCode {
                code: non_blank(coding.code),
                display: non_blank(coding.display).or_else(|| non_blank(concept.text)),
            }
        })
        .unwrap_or_default();

    let applied = wire.protocol_applied.into_iter().next().unwrap_or_default();
    let nested = applied.protocol.unwrap_or_default();
    let direct = applied.direct;

    let administered_on = first_date([
        nested.occurrence_date_time.as_deref(),
        direct.occurrence_date_time.as_deref(),
        wire.occurrence_date_time.as_deref(),
    ]);
    let expires_on = first_date([
        nested.expiration_date.as_deref(),
        direct.expiration_date.as_deref(),
        wire.expiration_date.as_deref(),
    ]);

    ImmunizationDoseRecord {
        immunization_record_id: non_blank(wire.id),
        encounter_id: wire.encounter.and_then(encounter_id_from),
        vaccine,
        manufacturer: wire
            .manufacturer
            .and_then(|m| non_blank(m.reference).or_else(|| non_blank(m.display))),
        lot_number: non_blank(wire.lot_number),
        dose_sequence_label: non_blank(nested.series).or_else(|| non_blank(direct.series)),
        dose_number: nested
            .dose_number_positive_int
            .or(direct.dose_number_positive_int)
            .and_then(NonZeroU32::new),
        administered_on,
        expires_on,
    }
}

fn vaccine_to_wire(vaccine: &VaccineCode) -> Option<CodeableConceptWire> {
    if vaccine.code.is_none() && vaccine.display.is_none() {
        return None;
    }

    Some(CodeableConceptWire {
        coding: vec![CodingWire {
            system: None,
            code: vaccine.code.clone(),
            display: vaccine.display.clone(),
        }],
        text: None,
    })
}

fn protocol_to_wire(
    series: Option<&String>,
    dose_number: Option<NonZeroU32>,
    administered_on: Option<NaiveDate>,
    expires_on: Option<NaiveDate>,
) -> Vec<ProtocolAppliedWire> {
    let protocol = ProtocolWire {
        series: series.cloned(),
        dose_number_positive_int: dose_number.map(NonZeroU32::get),
        occurrence_date_time: administered_on.map(format_date),
        expiration_date: expires_on.map(format_date),
    };

    if protocol == ProtocolWire::default() {
        return Vec::new();
    }

    vec![ProtocolAppliedWire {
        protocol: Some(protocol),
        direct: ProtocolWire::default(),
    }]
}

fn reference_to(kind: &str, id: &str) -> ReferenceWire {
    ReferenceWire {
        id: Some(id.to_string()),
        reference: Some(format!("{kind}/{id}")),
        display: None,
    }
}

/// Convert a domain record back to the wire format (used when rendering bundles).
fn record_to_wire(record: &ImmunizationDoseRecord) -> ImmunizationWire {
    ImmunizationWire {
        resource_type: Some(IMMUNIZATION_RESOURCE_TYPE.to_string()),
        id: record.immunization_record_id.clone(),
        vaccine_code: vaccine_to_wire(&record.vaccine),
        patient: None,
        encounter: record
            .encounter_id
            .as_deref()
            .map(|id| reference_to("Encounter", id)),
        occurrence_date_time: record.administered_on.map(format_date),
        expiration_date: record.expires_on.map(format_date),
        manufacturer: record.manufacturer.as_ref().map(|m| ReferenceWire {
            reference: Some(m.clone()),
            ..ReferenceWire::default()
        }),
        lot_number: record.lot_number.clone(),
        protocol_applied: protocol_to_wire(
            record.dose_sequence_label.as_ref(),
            record.dose_number,
            record.administered_on,
            record.expires_on,
        ),
    }
}

/// Convert a submission to the wire format expected by the save endpoint.
fn submission_to_wire(submission: &ImmunizationSubmission) -> ImmunizationWire {
    ImmunizationWire {
        resource_type: Some(IMMUNIZATION_RESOURCE_TYPE.to_string()),
        id: submission
            .immunization_record_id
            .as_ref()
            .map(|id| id.as_str().to_string()),
        vaccine_code: vaccine_to_wire(&submission.vaccine),
        patient: Some(reference_to("Patient", submission.patient_id.as_str())),
        encounter: submission
            .encounter_id
            .as_ref()
            .map(|id| reference_to("Encounter", id.as_str())),
        occurrence_date_time: submission.administered_on.map(format_date),
        expiration_date: submission.expires_on.map(format_date),
        manufacturer: submission.manufacturer.as_ref().map(|m| ReferenceWire {
            reference: Some(m.clone()),
            ..ReferenceWire::default()
        }),
        lot_number: submission.lot_number.clone(),
        protocol_applied: protocol_to_wire(
            submission.dose_sequence_label.as_ref(),
            submission.dose_number,
            submission.administered_on,
            submission.expires_on,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).expect("valid date")
    }

    fn id(s: &str) -> ResourceId {
        ResourceId::parse(s).expect("valid id")
    }

    const NESTED_PROTOCOL_BUNDLE: &str = r#"{
  "resourceType": "Bundle",
  "entry": [
    {
      "resource": {
        "resourceType": "Immunization",
        "id": "b9c21a82-aed3-11ea-b3de-0242ac130004",
        "vaccineCode": { "coding": [ { "code": "PolioUuid", "display": "Polio" } ] },
        "patient": { "id": "8673ee4f-e2ab-4077-ba55-4980f408773e" },
        "encounter": { "id": "encounter-1" },
        "manufacturer": { "reference": "Organization/hl7" },
        "lotNumber": "PT123F",
        "protocolApplied": [
          {
            "protocol": {
              "occurrenceDateTime": "2018-09-21",
              "doseNumberPositiveInt": 2,
              "series": "6 Months",
              "expirationDate": "2018-12-15"
            }
          }
        ]
      }
    }
  ]
}"#;

    #[test]
    fn parses_nested_protocol_entries() {
        let records = ImmunizationBundle::parse(NESTED_PROTOCOL_BUNDLE).expect("parse bundle");
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(
            record.immunization_record_id.as_deref(),
            Some("b9c21a82-aed3-11ea-b3de-0242ac130004")
        );
        assert_eq!(record.encounter_id.as_deref(), Some("encounter-1"));
        assert_eq!(record.vaccine.code.as_deref(), Some("PolioUuid"));
        assert_eq!(record.vaccine.display.as_deref(), Some("Polio"));
        assert_eq!(record.manufacturer.as_deref(), Some("Organization/hl7"));
        assert_eq!(record.lot_number.as_deref(), Some("PT123F"));
        assert_eq!(record.dose_sequence_label.as_deref(), Some("6 Months"));
        assert_eq!(record.dose_number.map(NonZeroU32::get), Some(2));
        assert_eq!(record.administered_on, Some(date("2018-09-21")));
        assert_eq!(record.expires_on, Some(date("2018-12-15")));
    }

    #[test]
    fn falls_back_to_direct_protocol_fields_and_resource_dates() {
        let input = r#"{
  "entry": [
    {
      "resource": {
        "resourceType": "Immunization",
        "id": "protocol",
        "vaccineCode": { "coding": [ { "system": "", "code": "104" } ], "text": "Rotavirus" },
        "encounter": { "reference": "Encounter/example" },
        "occurrenceDateTime": "2018-06-18T10:30:00+00:00",
        "expirationDate": "2018-12-15",
        "protocolApplied": [
          { "series": "2 Months", "doseNumberPositiveInt": 1 }
        ]
      }
    }
  ]
}"#;

        let records = ImmunizationBundle::parse(input).expect("parse bundle");
        let record = &records[0];
        assert_eq!(record.vaccine.display.as_deref(), Some("Rotavirus"));
        assert_eq!(record.vaccine.code.as_deref(), Some("104"));
        assert_eq!(record.encounter_id.as_deref(), Some("example"));
        assert_eq!(record.dose_sequence_label.as_deref(), Some("2 Months"));
        assert_eq!(record.dose_number.map(NonZeroU32::get), Some(1));
        assert_eq!(record.administered_on, Some(date("2018-06-18")));
        assert_eq!(record.expires_on, Some(date("2018-12-15")));
    }

    #[test]
    fn malformed_fields_degrade_to_none() {
        let input = r#"{
  "entry": [
    {
      "resource": {
        "resourceType": "Immunization",
        "id": "dose-a",
        "vaccineCode": "not-an-object",
        "lotNumber": 42,
        "occurrenceDateTime": "yesterday",
        "protocolApplied": [ { "doseNumberPositiveInt": 0, "series": "" } ]
      }
    },
    {
      "resource": {
        "resourceType": "Immunization",
        "id": "dose-b",
        "protocolApplied": [ { "doseNumberPositiveInt": -3 } ]
      }
    }
  ]
}"#;

        let records = ImmunizationBundle::parse(input).expect("parse bundle");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].vaccine, VaccineCode::default());
        assert!(records[0].lot_number.is_none());
        assert!(records[0].administered_on.is_none());
        assert!(records[0].dose_number.is_none());
        assert!(records[0].dose_sequence_label.is_none());
        assert!(records[1].dose_number.is_none());
    }

    #[test]
    fn malformed_protocol_siblings_keep_first_element() {
        let input = r#"{
  "entry": [
    {
      "resource": {
        "resourceType": "Immunization",
        "id": "dose-a",
        "vaccineCode": { "coding": [ { "code": "PolioUuid", "display": "Polio" }, 7 ] },
        "protocolApplied": [
          { "protocol": { "doseNumberPositiveInt": 2, "series": "6 Months", "occurrenceDateTime": "2018-09-21" } },
          "junk"
        ]
      }
    },
    {
      "resource": {
        "resourceType": "Immunization",
        "id": "dose-b",
        "protocolApplied": [ "junk", { "doseNumberPositiveInt": 3 } ]
      }
    }
  ]
}"#;

        let records = ImmunizationBundle::parse(input).expect("parse bundle");
        assert_eq!(records[0].dose_number.map(NonZeroU32::get), Some(2));
        assert_eq!(records[0].dose_sequence_label.as_deref(), Some("6 Months"));
        assert_eq!(records[0].administered_on, Some(date("2018-09-21")));
        assert_eq!(records[0].vaccine.code.as_deref(), Some("PolioUuid"));
        // Only the first element is read; a malformed first element yields nothing.
        assert!(records[1].dose_number.is_none());
    }

    #[test]
    fn display_names_are_kept_verbatim() {
        let input = r#"{
  "entry": [
    { "resource": { "resourceType": "Immunization", "vaccineCode": { "coding": [ { "display": "Polio " } ] } } },
    { "resource": { "resourceType": "Immunization", "vaccineCode": { "coding": [ { "display": "Polio" } ] } } },
    { "resource": { "resourceType": "Immunization", "vaccineCode": { "coding": [ { "display": "  " } ], "text": "IPV" } } }
  ]
}"#;

        let records = ImmunizationBundle::parse(input).expect("parse bundle");
        let displays: Vec<_> = records.iter().map(|r| r.vaccine.display.as_deref()).collect();
        assert_eq!(displays, vec![Some("Polio "), Some("Polio"), Some("IPV")]);
    }

    #[test]
    fn skips_entries_that_are_not_immunizations() {
        let input = r#"{
  "entry": [
    { "resource": { "resourceType": "Patient", "id": "p1" } },
    { "fullUrl": "urn:uuid:no-resource" },
    "garbage",
    { "resource": { "resourceType": "Immunization", "id": "dose-1" } }
  ]
}"#;

        let records = ImmunizationBundle::parse(input).expect("parse bundle");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].immunization_record_id.as_deref(), Some("dose-1"));
    }

    #[test]
    fn empty_bundle_parses_to_no_records() {
        let records = ImmunizationBundle::parse(r#"{"resourceType": "Bundle"}"#).expect("parse");
        assert!(records.is_empty());
    }

    #[test]
    fn rejects_entry_of_wrong_type_with_path() {
        let err = ImmunizationBundle::parse(r#"{"entry": "nope"}"#).expect_err("should fail");
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("entry")),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_json() {
        let err = ImmunizationBundle::parse("not json").expect_err("should fail");
        assert!(matches!(err, FhirError::Translation(_)));
    }

    fn sample_submission(record_id: Option<&str>) -> ImmunizationSubmission {
        ImmunizationSubmission {
            immunization_record_id: record_id.map(id),
            patient_id: id("8673ee4f-e2ab-4077-ba55-4980f408773e"),
            encounter_id: Some(id("visit-1")),
            vaccine: VaccineCode {
                code: Some("RotavirusUuid".into()),
                display: Some("Rotavirus".into()),
            },
            dose_sequence_label: Some("dose-1".into()),
            dose_number: NonZeroU32::new(1),
            administered_on: Some(date("2018-06-18")),
            expires_on: Some(date("2018-12-15")),
            manufacturer: Some("Organization/hl7".into()),
            lot_number: Some("12345".into()),
        }
    }

    #[test]
    fn submission_round_trips_through_entry_parser() {
        let submission = sample_submission(Some("dose-77"));
        let json = submission.render().expect("render submission");
        let record = ImmunizationBundle::parse_entry(&json).expect("parse entry");

        assert_eq!(record.immunization_record_id.as_deref(), Some("dose-77"));
        assert_eq!(record.encounter_id.as_deref(), Some("visit-1"));
        assert_eq!(record.vaccine, submission.vaccine);
        assert_eq!(record.dose_number, submission.dose_number);
        assert_eq!(record.dose_sequence_label, submission.dose_sequence_label);
        assert_eq!(record.administered_on, submission.administered_on);
        assert_eq!(record.expires_on, submission.expires_on);
        assert_eq!(record.lot_number, submission.lot_number);
        assert_eq!(record.manufacturer, submission.manufacturer);
    }

    #[test]
    fn create_submission_omits_resource_id() {
        let submission = sample_submission(None);
        assert!(!submission.is_update());

        let json = submission.render().expect("render submission");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert!(value.pointer("/resource/id").is_none());
        assert_eq!(
            value.pointer("/resource/resourceType"),
            Some(&serde_json::Value::from("Immunization"))
        );
        assert_eq!(
            value.pointer("/resource/patient/reference"),
            Some(&serde_json::Value::from(
                "Patient/8673ee4f-e2ab-4077-ba55-4980f408773e"
            ))
        );
        assert_eq!(
            value.pointer("/resource/protocolApplied/0/protocol/doseNumberPositiveInt"),
            Some(&serde_json::Value::from(1))
        );
    }

    #[test]
    fn upsert_appends_then_replaces() {
        let first = sample_submission(Some("dose-1"));
        let created = ImmunizationBundle::upsert(None, &first).expect("insert");
        assert!(!created.replaced);

        let mut second = sample_submission(Some("dose-2"));
        second.dose_number = NonZeroU32::new(2);
        let appended = ImmunizationBundle::upsert(Some(&created.json), &second).expect("append");
        assert!(!appended.replaced);

        let mut edited = first.clone();
        edited.lot_number = Some("LOT-EDITED".into());
        let replaced = ImmunizationBundle::upsert(Some(&appended.json), &edited).expect("replace");
        assert!(replaced.replaced);

        let records = ImmunizationBundle::parse(&replaced.json).expect("parse bundle");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].immunization_record_id.as_deref(), Some("dose-1"));
        assert_eq!(records[0].lot_number.as_deref(), Some("LOT-EDITED"));
        assert_eq!(records[1].immunization_record_id.as_deref(), Some("dose-2"));
    }

    #[test]
    fn render_then_parse_preserves_records() {
        let records = vec![ImmunizationDoseRecord {
            immunization_record_id: Some("dose-1".into()),
            encounter_id: None,
            vaccine: VaccineCode {
                code: None,
                display: Some("Influenza".into()),
            },
            manufacturer: None,
            lot_number: None,
            dose_sequence_label: None,
            dose_number: None,
            administered_on: Some(date("2020-10-01")),
            expires_on: None,
        }];

        let json = ImmunizationBundle::render(&records).expect("render bundle");
        let reparsed = ImmunizationBundle::parse(&json).expect("reparse bundle");
        assert_eq!(records, reparsed);
    }
}
