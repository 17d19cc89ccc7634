//! Immunization persistence.
//!
//! The chart talks to its backend through [`ImmunizationStore`]. [`FileImmunizationStore`]
//! keeps one FHIR search-set bundle per patient on disk:
//!
//! ```text
//! <chart_data_dir>/immunizations/<patient_id>.json
//! ```
//!
//! A patient with no file has an empty history.

use crate::constants::BUNDLE_FILE_EXTENSION;
use crate::{ChartError, ChartResult, CoreConfig};
use chart_types::ResourceId;
use fhir::{ImmunizationBundle, ImmunizationDoseRecord, ImmunizationSubmission};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Backend collaborator for immunization history.
pub trait ImmunizationStore: Send + Sync {
    /// Fetch every dose record stored for the patient, in stored order.
    fn fetch_bundle(&self, patient_id: &ResourceId) -> ChartResult<Vec<ImmunizationDoseRecord>>;

    /// Create or update a dose event and return its record id.
    ///
    /// # Errors
    ///
    /// Returns [`ChartError::NotFound`] when an update names a record that does not exist.
    fn save(
        &self,
        patient_id: &ResourceId,
        submission: &ImmunizationSubmission,
    ) -> ChartResult<ResourceId>;
}

/// File-backed [`ImmunizationStore`].
#[derive(Debug)]
pub struct FileImmunizationStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileImmunizationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store rooted at the configured immunizations directory.
    pub fn from_config(cfg: &CoreConfig) -> Self {
        Self::new(cfg.immunizations_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bundle_path(&self, patient_id: &ResourceId) -> PathBuf {
        self.dir.join(format!("{patient_id}.{BUNDLE_FILE_EXTENSION}"))
    }

    fn read_bundle(&self, path: &Path) -> ChartResult<Option<String>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChartError::FileRead(e)),
        }
    }

    /// Write through a sibling temp file so readers never see a partial bundle.
    fn write_bundle(&self, path: &Path, json: &str) -> ChartResult<()> {
        fs::create_dir_all(&self.dir).map_err(ChartError::StorageDirCreation)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(ChartError::FileWrite)?;
        if let Err(e) = fs::rename(&tmp, path) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                tracing::warn!("failed to remove {}: {cleanup}", tmp.display());
            }
            return Err(ChartError::FileWrite(e));
        }
        Ok(())
    }
}

impl ImmunizationStore for FileImmunizationStore {
    fn fetch_bundle(&self, patient_id: &ResourceId) -> ChartResult<Vec<ImmunizationDoseRecord>> {
        let path = self.bundle_path(patient_id);
        match self.read_bundle(&path)? {
            Some(text) => Ok(ImmunizationBundle::parse(&text)?),
            None => {
                tracing::debug!("no immunization bundle for patient {patient_id}");
                Ok(Vec::new())
            }
        }
    }

    fn save(
        &self,
        patient_id: &ResourceId,
        submission: &ImmunizationSubmission,
    ) -> ChartResult<ResourceId> {
        let mut submission = submission.clone();
        submission.patient_id = patient_id.clone();
        let is_update = submission.is_update();

        let record_id = match &submission.immunization_record_id {
            Some(id) => id.clone(),
            None => {
                let id = ResourceId::parse(&uuid::Uuid::new_v4().to_string())?;
                submission.immunization_record_id = Some(id.clone());
                id
            }
        };

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = self.bundle_path(patient_id);
        let existing = self.read_bundle(&path)?;
        let upserted = ImmunizationBundle::upsert(existing.as_deref(), &submission)?;

        if is_update && !upserted.replaced {
            return Err(ChartError::NotFound(format!(
                "immunization {record_id} for patient {patient_id}"
            )));
        }

        self.write_bundle(&path, &upserted.json)?;

        if upserted.replaced {
            tracing::info!("updated immunization {record_id} for patient {patient_id}");
        } else {
            tracing::info!("created immunization {record_id} for patient {patient_id}");
        }
        Ok(record_id)
    }
}
