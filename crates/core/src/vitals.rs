//! Vitals capture and summary rules.
//!
//! Covers the vitals form (which measurements were entered, when it may be saved, which
//! values fall outside their reference range) and the chart header state derived from the
//! most recent vitals.

use crate::biometrics::body_mass_index;
use crate::form::FormLifecycle;
use crate::ChartResult;
use chart_types::ResourceId;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single vital sign or biometric measurement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    Systolic,
    Diastolic,
    Pulse,
    OxygenSaturation,
    Temperature,
    Weight,
    Height,
}

impl Measurement {
    pub const ALL: [Measurement; 7] = [
        Measurement::Systolic,
        Measurement::Diastolic,
        Measurement::Pulse,
        Measurement::OxygenSaturation,
        Measurement::Temperature,
        Measurement::Weight,
        Measurement::Height,
    ];
}

/// One set of vitals as captured on the form.
///
/// Units: mmHg for blood pressure, beats/min, %, °C, kg and cm.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalsEntry {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub pulse: Option<f64>,
    pub oxygen_saturation: Option<f64>,
    pub temperature: Option<f64>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub recorded_at: Option<NaiveDateTime>,
}

impl VitalsEntry {
    pub fn value(&self, measurement: Measurement) -> Option<f64> {
        match measurement {
            Measurement::Systolic => self.systolic,
            Measurement::Diastolic => self.diastolic,
            Measurement::Pulse => self.pulse,
            Measurement::OxygenSaturation => self.oxygen_saturation,
            Measurement::Temperature => self.temperature,
            Measurement::Weight => self.weight,
            Measurement::Height => self.height,
        }
    }

    fn slot(&mut self, measurement: Measurement) -> &mut Option<f64> {
        match measurement {
            Measurement::Systolic => &mut self.systolic,
            Measurement::Diastolic => &mut self.diastolic,
            Measurement::Pulse => &mut self.pulse,
            Measurement::OxygenSaturation => &mut self.oxygen_saturation,
            Measurement::Temperature => &mut self.temperature,
            Measurement::Weight => &mut self.weight,
            Measurement::Height => &mut self.height,
        }
    }

    pub fn has_measurement(&self) -> bool {
        Measurement::ALL.iter().any(|m| self.value(*m).is_some())
    }

    /// Body mass index derived from weight and height, when both are present.
    pub fn bmi(&self) -> Option<f64> {
        body_mass_index(self.weight, self.height)
    }
}

/// Inclusive reference range for a measurement.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Reference ranges used to flag vitals. A missing range means the value is never flagged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VitalsRanges {
    pub systolic: Option<ValueRange>,
    pub diastolic: Option<ValueRange>,
    pub pulse: Option<ValueRange>,
    pub oxygen_saturation: Option<ValueRange>,
    pub temperature: Option<ValueRange>,
    pub weight: Option<ValueRange>,
    pub height: Option<ValueRange>,
}

impl Default for VitalsRanges {
    fn default() -> Self {
        Self {
            systolic: Some(ValueRange::new(90.0, 140.0)),
            diastolic: Some(ValueRange::new(60.0, 90.0)),
            pulse: Some(ValueRange::new(60.0, 100.0)),
            oxygen_saturation: Some(ValueRange::new(95.0, 100.0)),
            temperature: Some(ValueRange::new(35.5, 37.5)),
            weight: None,
            height: None,
        }
    }
}

impl VitalsRanges {
    pub fn range(&self, measurement: Measurement) -> Option<ValueRange> {
        match measurement {
            Measurement::Systolic => self.systolic,
            Measurement::Diastolic => self.diastolic,
            Measurement::Pulse => self.pulse,
            Measurement::OxygenSaturation => self.oxygen_saturation,
            Measurement::Temperature => self.temperature,
            Measurement::Weight => self.weight,
            Measurement::Height => self.height,
        }
    }

    /// Measurements present in `entry` whose value lies outside the configured range.
    pub fn out_of_range(&self, entry: &VitalsEntry) -> Vec<Measurement> {
        Measurement::ALL
            .into_iter()
            .filter(|m| match (entry.value(*m), self.range(*m)) {
                (Some(value), Some(range)) => !range.contains(value),
                _ => false,
            })
            .collect()
    }

    /// Reject ranges whose bounds are inverted or not finite.
    pub(crate) fn validate(&self) -> Result<(), String> {
        for measurement in Measurement::ALL {
            if let Some(range) = self.range(measurement) {
                if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
                    return Err(format!("invalid range for {measurement:?}"));
                }
            }
        }
        Ok(())
    }
}

/// Vitals data-entry form.
#[derive(Clone, Debug, Default)]
pub struct VitalsForm {
    lifecycle: FormLifecycle,
    entry: VitalsEntry,
    session_location: Option<ResourceId>,
}

impl VitalsForm {
    pub fn new(session_location: Option<ResourceId>) -> Self {
        Self {
            lifecycle: FormLifecycle::new(),
            entry: VitalsEntry::default(),
            session_location,
        }
    }

    pub fn lifecycle(&self) -> &FormLifecycle {
        &self.lifecycle
    }

    pub fn entry(&self) -> &VitalsEntry {
        &self.entry
    }

    /// Set or clear one measurement. Non-finite values are treated as cleared.
    pub fn set(&mut self, measurement: Measurement, value: Option<f64>) -> ChartResult<()> {
        self.lifecycle.edit()?;
        *self.entry.slot(measurement) = value.filter(|v| v.is_finite());
        Ok(())
    }

    pub fn set_recorded_at(&mut self, recorded_at: NaiveDateTime) -> ChartResult<()> {
        self.lifecycle.edit()?;
        self.entry.recorded_at = Some(recorded_at);
        Ok(())
    }

    /// The form can be saved once something was measured and the session location is known.
    pub fn can_save(&self) -> bool {
        self.lifecycle.can_submit()
            && self.entry.has_measurement()
            && self.session_location.is_some()
    }

    /// Summarise the captured values against `ranges`, treating them as the latest vitals.
    pub fn assess(&self, ranges: &VitalsRanges, today: NaiveDate) -> VitalsAssessment {
        VitalsAssessment {
            can_save: self.can_save(),
            out_of_range: ranges.out_of_range(&self.entry),
            bmi: self.entry.bmi(),
            header_state: VitalsHeaderState::from_latest(Some(&self.entry), today),
        }
    }
}

/// What the chart shows for a vitals form before it is saved.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VitalsAssessment {
    pub can_save: bool,
    pub out_of_range: Vec<Measurement>,
    pub bmi: Option<f64>,
    pub header_state: VitalsHeaderState,
}

/// Banner state shown in the chart header for the latest vitals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalsHeaderState {
    Default,
    /// No vitals, or the latest were not taken today.
    Warning,
}

impl VitalsHeaderState {
    pub fn from_latest(latest: Option<&VitalsEntry>, today: NaiveDate) -> Self {
        let recorded_today = latest
            .and_then(|entry| entry.recorded_at)
            .is_some_and(|at| at.date() == today);

        if recorded_today {
            VitalsHeaderState::Default
        } else {
            VitalsHeaderState::Warning
        }
    }
}
