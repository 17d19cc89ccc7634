//! Explicit chart context.
//!
//! The active patient, their open visit and the session location are passed to every form
//! and service call that needs them. Nothing is read from shared global state.

use chart_types::ResourceId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartContext {
    patient_id: ResourceId,
    active_visit_id: Option<ResourceId>,
    session_location: Option<ResourceId>,
}

impl ChartContext {
    pub fn new(patient_id: ResourceId) -> Self {
        Self {
            patient_id,
            active_visit_id: None,
            session_location: None,
        }
    }

    pub fn with_active_visit(mut self, visit_id: Option<ResourceId>) -> Self {
        self.active_visit_id = visit_id;
        self
    }

    pub fn with_session_location(mut self, location: Option<ResourceId>) -> Self {
        self.session_location = location;
        self
    }

    pub fn patient_id(&self) -> &ResourceId {
        &self.patient_id
    }

    pub fn active_visit_id(&self) -> Option<&ResourceId> {
        self.active_visit_id.as_ref()
    }

    pub fn session_location(&self) -> Option<&ResourceId> {
        self.session_location.as_ref()
    }
}
