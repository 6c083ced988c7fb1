use eldercare_core::records::{
    Appointment, Doctor, Medication, UserProfile, Vitals, VitalsRecord, WorkflowKind, WorkflowRecord,
    WorkflowStatus,
};
use eldercare_core::{Event, EventType, Result};
use serde_json::Value;
use std::sync::Arc;

/// Append-only sink for routed events.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: &Event) -> Result<()>;
}

/// Filter for reading the event trail back, newest first.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub patient_id: Option<String>,
    pub event_type: Option<EventType>,
    pub limit: usize,
}

impl EventQuery {
    pub fn for_patient(patient_id: &str, event_type: EventType, limit: usize) -> Self {
        Self {
            patient_id: Some(patient_id.to_string()),
            event_type: Some(event_type),
            limit,
        }
    }
}

/// Keyed, queryable record store.
///
/// Every method is an individual query; nothing here is transactional across
/// calls, so check-then-create sequences built on top of it can race.
pub trait Datastore: Send + Sync {
    fn user(&self, id: &str) -> Result<Option<UserProfile>>;
    fn upsert_user(&self, user: &UserProfile) -> Result<()>;

    fn insert_vitals(&self, patient_id: &str, vitals: &Vitals) -> Result<VitalsRecord>;
    fn recent_vitals(&self, patient_id: &str, limit: usize) -> Result<Vec<VitalsRecord>>;

    fn medications(&self, patient_id: &str) -> Result<Vec<Medication>>;
    fn all_medications(&self) -> Result<Vec<Medication>>;
    fn upsert_medication(&self, medication: &Medication) -> Result<()>;
    fn set_medication_stock(&self, medication_id: &str, stock: i64) -> Result<()>;

    fn recent_events(&self, query: &EventQuery) -> Result<Vec<Event>>;

    /// The non-terminal workflow for (kind, subject), if any.
    fn find_open_workflow(&self, kind: WorkflowKind, subject_id: &str) -> Result<Option<WorkflowRecord>>;
    fn insert_workflow(&self, record: &WorkflowRecord) -> Result<()>;
    fn workflow(&self, id: &str) -> Result<Option<WorkflowRecord>>;
    fn workflows(&self, kind: WorkflowKind, patient_id: Option<&str>) -> Result<Vec<WorkflowRecord>>;
    fn update_workflow(&self, id: &str, status: WorkflowStatus, data: &Value) -> Result<WorkflowRecord>;

    fn doctors(&self) -> Result<Vec<Doctor>>;
    fn upsert_doctor(&self, doctor: &Doctor) -> Result<()>;

    fn appointments(&self, patient_id: &str) -> Result<Vec<Appointment>>;
    fn appointment(&self, id: &str) -> Result<Option<Appointment>>;
    /// Times already taken for a doctor on a date (pending or accepted bookings).
    fn booked_slots(&self, doctor_id: &str, date: &str) -> Result<Vec<String>>;
    fn insert_appointment(&self, appointment: &Appointment) -> Result<()>;
}

pub type DatastoreHandle = Arc<dyn Datastore>;
