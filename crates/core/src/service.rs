//! Immunization service.
//!
//! Combines the resolved [`CoreConfig`] with an [`ImmunizationStore`] to serve the chart's
//! immunization operations: the grouped history, the per-vaccine overview, and opening and
//! submitting dose forms.

use crate::config::CoreConfig;
use crate::context::ChartContext;
use crate::form::ImmunizationForm;
use crate::immunization::{
    group_and_order_doses_by, split_record, to_submission_payload, DoseEntry, DoseSequence,
    VaccineDoseGroup,
};
use crate::overview::{vaccine_overview, VaccineOverviewRow};
use crate::store::ImmunizationStore;
use crate::{ChartError, ChartResult};
use chart_types::ResourceId;
use fhir::VaccineCode;
use std::sync::Arc;

#[derive(Clone)]
pub struct ImmunizationService {
    cfg: Arc<CoreConfig>,
    store: Arc<dyn ImmunizationStore>,
}

impl ImmunizationService {
    pub fn new(cfg: Arc<CoreConfig>, store: Arc<dyn ImmunizationStore>) -> Self {
        Self { cfg, store }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    /// The patient's immunization history grouped by vaccine.
    ///
    /// # Errors
    ///
    /// Propagates store failures; nothing is retried.
    pub fn history(&self, ctx: &ChartContext) -> ChartResult<Vec<VaccineDoseGroup>> {
        let records = self.store.fetch_bundle(ctx.patient_id())?;
        let key = self.cfg.immunizations().grouping_key;
        Ok(group_and_order_doses_by(records, key))
    }

    /// One row per configured vaccine, followed by any other vaccines in the history.
    pub fn overview(&self, ctx: &ChartContext) -> ChartResult<Vec<VaccineOverviewRow>> {
        let groups = self.history(ctx)?;
        Ok(vaccine_overview(self.cfg.immunizations(), groups))
    }

    /// Open a form for a new dose, with the vaccine's configured sequences.
    pub fn new_form(&self, vaccine: VaccineCode) -> ImmunizationForm {
        let sequences = self.sequences_for(&vaccine);
        ImmunizationForm::new(vaccine, sequences)
    }

    /// Open a form pre-filled with an existing dose event.
    ///
    /// # Errors
    ///
    /// Returns [`ChartError::NotFound`] if the patient has no dose with that record id.
    pub fn edit_form(
        &self,
        ctx: &ChartContext,
        immunization_record_id: &ResourceId,
    ) -> ChartResult<ImmunizationForm> {
        let record = self
            .store
            .fetch_bundle(ctx.patient_id())?
            .into_iter()
            .find(|r| r.immunization_record_id.as_deref() == Some(immunization_record_id.as_str()))
            .ok_or_else(|| {
                ChartError::NotFound(format!(
                    "immunization {immunization_record_id} for patient {}",
                    ctx.patient_id()
                ))
            })?;

        let (vaccine, dose) = split_record(record);
        let encounter_id = dose
            .encounter_id
            .as_deref()
            .map(ResourceId::parse)
            .transpose()?;
        let sequences = self.sequences_for(&vaccine);

        Ok(ImmunizationForm::edit_existing(
            immunization_record_id.clone(),
            encounter_id,
            DoseEntry::from_dose(vaccine, &dose),
            sequences,
        ))
    }

    /// Validate and save the form, moving it through `Submitting` to `Saved` or `Failed`.
    ///
    /// The dose is linked to the form's own encounter when it has one, otherwise to the
    /// context's active visit.
    ///
    /// # Errors
    ///
    /// - [`ChartError::InvalidInput`] if the form fails validation (the form is left as is)
    /// - [`ChartError::InvalidTransition`] if the form is not ready to submit
    /// - the store's error if saving fails (the form moves to `Failed`)
    pub fn submit(
        &self,
        ctx: &ChartContext,
        form: &mut ImmunizationForm,
    ) -> ChartResult<ResourceId> {
        form.validate()?;
        form.lifecycle_mut().begin_submit()?;

        let encounter_id = form.encounter_id().or(ctx.active_visit_id());
        let payload = to_submission_payload(
            form.entry(),
            ctx.patient_id(),
            encounter_id,
            form.immunization_record_id(),
        );

        match self.store.save(ctx.patient_id(), &payload) {
            Ok(record_id) => {
                form.lifecycle_mut().complete(Ok(()))?;
                form.mark_saved_as(record_id.clone());
                Ok(record_id)
            }
            Err(err) => {
                tracing::error!("failed to save immunization: {err}");
                form.lifecycle_mut().complete(Err(err.to_string()))?;
                Err(err)
            }
        }
    }

    fn sequences_for(&self, vaccine: &VaccineCode) -> Vec<DoseSequence> {
        vaccine
            .code
            .as_deref()
            .map(|code| self.cfg.immunizations().sequences_for(code).to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChartSettings, ImmunizationsConfig, VaccineConfig, VaccineSequences};
    use crate::form::FormState;
    use crate::store::FileImmunizationStore;
    use chrono::NaiveDate;
    use fhir::{ImmunizationDoseRecord, ImmunizationSubmission};
    use std::num::NonZeroU32;
    use tempfile::TempDir;

    struct FailingStore;

    impl ImmunizationStore for FailingStore {
        fn fetch_bundle(&self, _: &ResourceId) -> ChartResult<Vec<ImmunizationDoseRecord>> {
            Ok(Vec::new())
        }

        fn save(&self, _: &ResourceId, _: &ImmunizationSubmission) -> ChartResult<ResourceId> {
            Err(ChartError::FileWrite(std::io::Error::other("disk full")))
        }
    }

    fn dose_one() -> DoseSequence {
        DoseSequence {
            label: "dose-1".into(),
            number: NonZeroU32::new(1).expect("non-zero"),
        }
    }

    fn settings() -> ChartSettings {
        ChartSettings {
            immunizations: ImmunizationsConfig {
                vaccines: vec![VaccineConfig {
                    uuid: ResourceId::parse("RotavirusUuid").expect("valid id"),
                    display: chart_types::NonEmptyText::new("Rotavirus").expect("valid name"),
                }],
                sequences: vec![VaccineSequences {
                    vaccine_uuid: ResourceId::parse("RotavirusUuid").expect("valid id"),
                    sequences: vec![dose_one()],
                }],
                ..ImmunizationsConfig::default()
            },
            ..ChartSettings::default()
        }
    }

    fn service(temp_dir: &TempDir) -> ImmunizationService {
        let cfg = Arc::new(
            CoreConfig::new(temp_dir.path().to_path_buf(), settings()).expect("config"),
        );
        let store = Arc::new(FileImmunizationStore::from_config(&cfg));
        ImmunizationService::new(cfg, store)
    }

    fn ctx() -> ChartContext {
        ChartContext::new(ResourceId::parse("patient-1").expect("valid id"))
            .with_active_visit(Some(ResourceId::parse("visit-1").expect("valid id")))
    }

    fn rotavirus() -> VaccineCode {
        VaccineCode {
            code: Some("RotavirusUuid".into()),
            display: Some("Rotavirus".into()),
        }
    }

    fn filled_form(service: &ImmunizationService) -> ImmunizationForm {
        let mut form = service.new_form(rotavirus());
        form.set_vaccination_date(NaiveDate::from_ymd_opt(2018, 6, 18))
            .expect("edit");
        form.select_sequence(Some(dose_one())).expect("select");
        form
    }

    #[test]
    fn new_form_carries_configured_sequences() {
        let temp_dir = TempDir::new().expect("temp dir");
        let form = service(&temp_dir).new_form(rotavirus());
        assert_eq!(form.sequences(), &[dose_one()]);
    }

    #[test]
    fn submit_saves_and_links_active_visit() {
        let temp_dir = TempDir::new().expect("temp dir");
        let service = service(&temp_dir);
        let ctx = ctx();

        let mut form = filled_form(&service);
        let record_id = service.submit(&ctx, &mut form).expect("submit");
        assert_eq!(form.lifecycle().state(), &FormState::Saved);
        assert_eq!(form.immunization_record_id(), Some(&record_id));

        let history = service.history(&ctx).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].doses[0].encounter_id.as_deref(), Some("visit-1"));
    }

    #[test]
    fn edit_form_round_trips_through_submit() {
        let temp_dir = TempDir::new().expect("temp dir");
        let service = service(&temp_dir);
        let ctx = ctx();

        let mut form = filled_form(&service);
        let record_id = service.submit(&ctx, &mut form).expect("submit");

        let mut edit = service.edit_form(&ctx, &record_id).expect("edit form");
        assert!(edit.is_edit());
        assert_eq!(edit.entry().sequence, Some(dose_one()));
        assert_eq!(edit.encounter_id().map(ResourceId::as_str), Some("visit-1"));

        edit.set_lot_number(Some("LOT-2".into())).expect("edit");
        let updated = service.submit(&ctx, &mut edit).expect("resubmit");
        assert_eq!(updated, record_id);

        let overview = service.overview(&ctx).expect("overview");
        assert_eq!(overview.len(), 1);
        assert_eq!(overview[0].doses.len(), 1);
        assert_eq!(overview[0].doses[0].lot_number.as_deref(), Some("LOT-2"));
    }

    #[test]
    fn edit_form_for_unknown_record_is_not_found() {
        let temp_dir = TempDir::new().expect("temp dir");
        let missing = ResourceId::parse("missing").expect("valid id");
        let err = service(&temp_dir)
            .edit_form(&ctx(), &missing)
            .expect_err("missing record");
        assert!(matches!(err, ChartError::NotFound(_)));
    }

    #[test]
    fn invalid_form_is_not_submitted() {
        let temp_dir = TempDir::new().expect("temp dir");
        let service = service(&temp_dir);
        let mut form = service.new_form(rotavirus());
        form.set_vaccination_date(NaiveDate::from_ymd_opt(2018, 6, 18))
            .expect("edit");

        let err = service.submit(&ctx(), &mut form).expect_err("missing sequence");
        assert!(matches!(err, ChartError::InvalidInput(_)));
        assert_eq!(form.lifecycle().state(), &FormState::Dirty);
    }

    #[test]
    fn store_failure_marks_form_failed() {
        let temp_dir = TempDir::new().expect("temp dir");
        let cfg = Arc::new(
            CoreConfig::new(temp_dir.path().to_path_buf(), settings()).expect("config"),
        );
        let service = ImmunizationService::new(cfg, Arc::new(FailingStore));

        let mut form = filled_form(&service);
        let err = service.submit(&ctx(), &mut form).expect_err("store failure");
        assert!(matches!(err, ChartError::FileWrite(_)));
        assert!(matches!(form.lifecycle().state(), FormState::Failed(_)));
        assert!(form.lifecycle().has_unsaved_changes());
        assert!(!form.is_edit());
    }
}
