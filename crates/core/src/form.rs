//! Data-entry form lifecycle.
//!
//! Forms move through `Clean → Dirty → Submitting → Saved | Failed`. Field edits make a form
//! dirty, submitting locks it until the save outcome is known, and a failed save can be
//! edited or resubmitted.
//!
//! [`ImmunizationForm`] builds on the lifecycle with the rules for recording a vaccine dose.
//! The vitals form lives in [`crate::vitals`].

use crate::immunization::{DoseEntry, DoseSequence};
use crate::{ChartError, ChartResult};
use chart_types::ResourceId;
use chrono::NaiveDate;
use fhir::VaccineCode;
use serde::Serialize;

/// Where a form is in its edit/save lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum FormState {
    Clean,
    Dirty,
    Submitting,
    Saved,
    Failed(String),
}

impl FormState {
    fn name(&self) -> &'static str {
        match self {
            FormState::Clean => "clean",
            FormState::Dirty => "dirty",
            FormState::Submitting => "submitting",
            FormState::Saved => "saved",
            FormState::Failed(_) => "failed",
        }
    }
}

/// The lifecycle state machine shared by all forms.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormLifecycle {
    state: FormState,
}

impl Default for FormLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl FormLifecycle {
    pub fn new() -> Self {
        Self {
            state: FormState::Clean,
        }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    /// Record a field edit.
    ///
    /// # Errors
    ///
    /// Returns [`ChartError::InvalidTransition`] while a submit is in flight.
    pub fn edit(&mut self) -> ChartResult<()> {
        match self.state {
            FormState::Submitting => Err(self.rejected("edit")),
            _ => {
                self.transition(FormState::Dirty);
                Ok(())
            }
        }
    }

    /// Start a submit.
    ///
    /// # Errors
    ///
    /// Returns [`ChartError::InvalidTransition`] unless the form is dirty or its last save failed.
    pub fn begin_submit(&mut self) -> ChartResult<()> {
        match self.state {
            FormState::Dirty | FormState::Failed(_) => {
                self.transition(FormState::Submitting);
                Ok(())
            }
            _ => Err(self.rejected("submit")),
        }
    }

    /// Record the outcome of the in-flight submit.
    ///
    /// # Errors
    ///
    /// Returns [`ChartError::InvalidTransition`] if no submit is in flight.
    pub fn complete(&mut self, outcome: Result<(), String>) -> ChartResult<()> {
        if self.state != FormState::Submitting {
            return Err(self.rejected("complete"));
        }

        match outcome {
            Ok(()) => self.transition(FormState::Saved),
            Err(reason) => self.transition(FormState::Failed(reason)),
        }
        Ok(())
    }

    /// True when closing the form would lose work.
    pub fn has_unsaved_changes(&self) -> bool {
        matches!(
            self.state,
            FormState::Dirty | FormState::Submitting | FormState::Failed(_)
        )
    }

    pub fn can_submit(&self) -> bool {
        matches!(self.state, FormState::Dirty | FormState::Failed(_))
    }

    fn transition(&mut self, next: FormState) {
        tracing::debug!("form {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    fn rejected(&self, action: &'static str) -> ChartError {
        ChartError::InvalidTransition {
            from: self.state.name().to_string(),
            action,
        }
    }
}

/// Form for adding a dose of a vaccine or editing an existing one.
#[derive(Clone, Debug)]
pub struct ImmunizationForm {
    lifecycle: FormLifecycle,
    immunization_record_id: Option<ResourceId>,
    encounter_id: Option<ResourceId>,
    sequences: Vec<DoseSequence>,
    entry: DoseEntry,
}

impl ImmunizationForm {
    /// Open a form for a new dose of `vaccine`.
    ///
    /// `sequences` are the configured series positions for the vaccine; when non-empty the
    /// user must pick one of them.
    pub fn new(vaccine: VaccineCode, sequences: Vec<DoseSequence>) -> Self {
        Self {
            lifecycle: FormLifecycle::new(),
            immunization_record_id: None,
            encounter_id: None,
            sequences,
            entry: DoseEntry {
                vaccine,
                ..DoseEntry::default()
            },
        }
    }

    /// Open a form pre-filled with an existing dose event.
    pub fn edit_existing(
        immunization_record_id: ResourceId,
        encounter_id: Option<ResourceId>,
        entry: DoseEntry,
        sequences: Vec<DoseSequence>,
    ) -> Self {
        Self {
            lifecycle: FormLifecycle::new(),
            immunization_record_id: Some(immunization_record_id),
            encounter_id,
            sequences,
            entry,
        }
    }

    pub fn lifecycle(&self) -> &FormLifecycle {
        &self.lifecycle
    }

    pub(crate) fn lifecycle_mut(&mut self) -> &mut FormLifecycle {
        &mut self.lifecycle
    }

    pub fn entry(&self) -> &DoseEntry {
        &self.entry
    }

    pub fn sequences(&self) -> &[DoseSequence] {
        &self.sequences
    }

    pub fn immunization_record_id(&self) -> Option<&ResourceId> {
        self.immunization_record_id.as_ref()
    }

    pub fn encounter_id(&self) -> Option<&ResourceId> {
        self.encounter_id.as_ref()
    }

    pub fn is_edit(&self) -> bool {
        self.immunization_record_id.is_some()
    }

    pub(crate) fn mark_saved_as(&mut self, record_id: ResourceId) {
        self.immunization_record_id = Some(record_id);
    }

    pub fn set_vaccination_date(&mut self, date: Option<NaiveDate>) -> ChartResult<()> {
        self.lifecycle.edit()?;
        self.entry.vaccination_date = date;
        Ok(())
    }

    pub fn set_expiration_date(&mut self, date: Option<NaiveDate>) -> ChartResult<()> {
        self.lifecycle.edit()?;
        self.entry.expiration_date = date;
        Ok(())
    }

    pub fn set_manufacturer(&mut self, manufacturer: Option<String>) -> ChartResult<()> {
        self.lifecycle.edit()?;
        self.entry.manufacturer = manufacturer.filter(|m| !m.trim().is_empty());
        Ok(())
    }

    pub fn set_lot_number(&mut self, lot_number: Option<String>) -> ChartResult<()> {
        self.lifecycle.edit()?;
        self.entry.lot_number = lot_number.filter(|l| !l.trim().is_empty());
        Ok(())
    }

    /// Select the series position of the dose.
    ///
    /// # Errors
    ///
    /// Returns [`ChartError::InvalidInput`] if the vaccine has configured sequences and
    /// `sequence` is not one of them.
    pub fn select_sequence(&mut self, sequence: Option<DoseSequence>) -> ChartResult<()> {
        if let Some(selected) = &sequence {
            if !self.sequences.is_empty() && !self.sequences.contains(selected) {
                return Err(ChartError::InvalidInput(format!(
                    "sequence '{}' ({}) is not configured for this vaccine",
                    selected.label, selected.number
                )));
            }
        }

        self.lifecycle.edit()?;
        self.entry.sequence = sequence;
        Ok(())
    }

    /// Check the captured values.
    ///
    /// # Errors
    ///
    /// Returns [`ChartError::InvalidInput`] describing the first problem found.
    pub fn validate(&self) -> ChartResult<()> {
        let entry = &self.entry;

        if entry.vaccine.display.is_none() && entry.vaccine.code.is_none() {
            return Err(ChartError::InvalidInput("vaccine is required".into()));
        }

        let vaccination_date = entry
            .vaccination_date
            .ok_or_else(|| ChartError::InvalidInput("vaccination date is required".into()))?;

        if let Some(expiration_date) = entry.expiration_date {
            if expiration_date < vaccination_date {
                return Err(ChartError::InvalidInput(
                    "expiration date cannot be before the vaccination date".into(),
                ));
            }
        }

        if !self.sequences.is_empty() && entry.sequence.is_none() {
            return Err(ChartError::InvalidInput("sequence is required".into()));
        }

        Ok(())
    }

    /// Whether the save button should be enabled.
    pub fn can_save(&self) -> bool {
        self.lifecycle.can_submit() && self.validate().is_ok()
    }
}
