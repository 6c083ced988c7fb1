//! Shared fixtures for the agent integration tests: a scripted completion
//! service, a recording notifier, an in-memory datastore with one patient and
//! a wrapper over it that fails chosen writes.

#![allow(dead_code)]

use async_trait::async_trait;
use eldercare_agent::{AppContext, Collaborators};
use eldercare_core::records::{
    Appointment, Doctor, Medication, UserProfile, Vitals, VitalsRecord, WorkflowKind, WorkflowRecord,
    WorkflowStatus,
};
use eldercare_core::types::{ChatMessage, LLMResponse, ToolCallRequest};
use eldercare_core::{Config, Error, Event, Result};
use eldercare_providers::Provider;
use eldercare_storage::{AuditLog, Datastore, DatastoreHandle, EventQuery, SqliteStore};
use eldercare_tools::{GeoLocator, GeoPoint, Hospital, Notifier};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// ============================================================================
// Mock completion service
// ============================================================================

/// Pops one scripted result per call. An empty script behaves like an
/// unreachable service, so every caller takes its fallback path.
pub struct MockProvider {
    responses: Mutex<Vec<Result<LLMResponse>>>,
    call_count: AtomicUsize,
}

impl MockProvider {
    pub fn new(responses: Vec<Result<LLMResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn chat(&self, _messages: &[ChatMessage], _tools: &[Value]) -> Result<LLMResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.responses.lock().await;
        if queue.is_empty() {
            Err(Error::Provider("script exhausted".to_string()))
        } else {
            queue.remove(0)
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

pub fn text(content: &str) -> Result<LLMResponse> {
    Ok(LLMResponse::text(content))
}

pub fn tool_call(name: &str, arguments: Value) -> Result<LLMResponse> {
    Ok(LLMResponse {
        tool_calls: vec![ToolCallRequest {
            id: format!("call_{}", name),
            name: name.to_string(),
            arguments,
        }],
        finish_reason: "tool_calls".to_string(),
        ..LLMResponse::default()
    })
}

// ============================================================================
// Mock collaborators
// ============================================================================

/// Records every attempted send. With `fail` set each attempt errors after
/// being recorded, like a gateway that rejects the message.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, to: &str, body: &str) -> Result<Value> {
        self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
        if self.fail {
            return Err(Error::Notification("gateway rejected message".to_string()));
        }
        Ok(json!({"status": "sent", "to": to}))
    }

    fn channel(&self) -> &'static str {
        "recording"
    }
}

pub struct FixedGeo;

#[async_trait]
impl GeoLocator for FixedGeo {
    async fn geocode(&self, _place: &str) -> Result<Option<GeoPoint>> {
        Ok(Some(GeoPoint { lat: 18.52, lon: 73.85 }))
    }

    async fn hospitals_near(&self, _at: GeoPoint) -> Result<Vec<Hospital>> {
        Ok(Vec::new())
    }
}

pub struct FailingAuditLog;

impl AuditLog for FailingAuditLog {
    fn record(&self, _event: &Event) -> Result<()> {
        Err(Error::Storage("audit disk full".to_string()))
    }
}

// ============================================================================
// Fault-injecting datastore
// ============================================================================

/// Delegates to a real store, except for the writes switched to fail.
pub struct FaultyStore {
    pub inner: Arc<SqliteStore>,
    pub fail_restock: AtomicBool,
    pub fail_refill_for: std::sync::Mutex<Option<String>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            fail_restock: AtomicBool::new(false),
            fail_refill_for: std::sync::Mutex::new(None),
        }
    }
}

impl Datastore for FaultyStore {
    fn user(&self, id: &str) -> Result<Option<UserProfile>> {
        self.inner.user(id)
    }
    fn upsert_user(&self, user: &UserProfile) -> Result<()> {
        self.inner.upsert_user(user)
    }
    fn insert_vitals(&self, patient_id: &str, vitals: &Vitals) -> Result<VitalsRecord> {
        self.inner.insert_vitals(patient_id, vitals)
    }
    fn recent_vitals(&self, patient_id: &str, limit: usize) -> Result<Vec<VitalsRecord>> {
        self.inner.recent_vitals(patient_id, limit)
    }
    fn medications(&self, patient_id: &str) -> Result<Vec<Medication>> {
        self.inner.medications(patient_id)
    }
    fn all_medications(&self) -> Result<Vec<Medication>> {
        self.inner.all_medications()
    }
    fn upsert_medication(&self, medication: &Medication) -> Result<()> {
        self.inner.upsert_medication(medication)
    }
    fn set_medication_stock(&self, medication_id: &str, stock: i64) -> Result<()> {
        if self.fail_restock.load(Ordering::SeqCst) {
            return Err(Error::Storage("database is locked".to_string()));
        }
        self.inner.set_medication_stock(medication_id, stock)
    }
    fn recent_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        self.inner.recent_events(query)
    }
    fn find_open_workflow(&self, kind: WorkflowKind, subject_id: &str) -> Result<Option<WorkflowRecord>> {
        self.inner.find_open_workflow(kind, subject_id)
    }
    fn insert_workflow(&self, record: &WorkflowRecord) -> Result<()> {
        if self.fail_refill_for.lock().unwrap().as_deref() == Some(record.subject_id.as_str()) {
            return Err(Error::Storage("disk I/O error".to_string()));
        }
        self.inner.insert_workflow(record)
    }
    fn workflow(&self, id: &str) -> Result<Option<WorkflowRecord>> {
        self.inner.workflow(id)
    }
    fn workflows(&self, kind: WorkflowKind, patient_id: Option<&str>) -> Result<Vec<WorkflowRecord>> {
        self.inner.workflows(kind, patient_id)
    }
    fn update_workflow(&self, id: &str, status: WorkflowStatus, data: &Value) -> Result<WorkflowRecord> {
        self.inner.update_workflow(id, status, data)
    }
    fn doctors(&self) -> Result<Vec<Doctor>> {
        self.inner.doctors()
    }
    fn upsert_doctor(&self, doctor: &Doctor) -> Result<()> {
        self.inner.upsert_doctor(doctor)
    }
    fn appointments(&self, patient_id: &str) -> Result<Vec<Appointment>> {
        self.inner.appointments(patient_id)
    }
    fn appointment(&self, id: &str) -> Result<Option<Appointment>> {
        self.inner.appointment(id)
    }
    fn booked_slots(&self, doctor_id: &str, date: &str) -> Result<Vec<String>> {
        self.inner.booked_slots(doctor_id, date)
    }
    fn insert_appointment(&self, appointment: &Appointment) -> Result<()> {
        self.inner.insert_appointment(appointment)
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const GUARDIAN_PHONE: &str = "+15550001111";

pub fn seeded_store() -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store
        .upsert_user(&UserProfile {
            id: "p1".to_string(),
            full_name: "Asha Rao".to_string(),
            role: "patient".to_string(),
            age: Some(78),
            conditions: vec!["hypertension".to_string()],
            guardian_id: Some("g1".to_string()),
            doctor_id: Some("d1".to_string()),
            ..UserProfile::default()
        })
        .unwrap();
    store
        .upsert_user(&UserProfile {
            id: "g1".to_string(),
            full_name: "Ravi Rao".to_string(),
            role: "guardian".to_string(),
            phone: Some(GUARDIAN_PHONE.to_string()),
            ..UserProfile::default()
        })
        .unwrap();
    store
        .upsert_doctor(&Doctor {
            id: "d1".to_string(),
            name: "Dr. Mehta".to_string(),
            specialty: Some("Cardiology".to_string()),
        })
        .unwrap();
    store
        .upsert_medication(&Medication {
            id: "m1".to_string(),
            patient_id: "p1".to_string(),
            name: "Amlodipine".to_string(),
            dosage: Some("5mg".to_string()),
            timing: vec!["08:00".to_string()],
            current_stock: Some(5),
            stock_threshold: Some(10),
        })
        .unwrap();
    store
}

pub struct Harness {
    pub app: AppContext,
    pub store: Arc<SqliteStore>,
    pub provider: Arc<MockProvider>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness(provider: MockProvider) -> Harness {
    let store = seeded_store();
    let audit: Vec<Arc<dyn AuditLog>> = vec![store.clone()];
    harness_with(store, audit, provider, None)
}

pub fn harness_with(
    store: Arc<SqliteStore>,
    audit: Vec<Arc<dyn AuditLog>>,
    provider: MockProvider,
    fallback: Option<Arc<dyn Provider>>,
) -> Harness {
    let provider = Arc::new(provider);
    let notifier = Arc::new(RecordingNotifier::default());
    let app = assemble(store.clone(), audit, provider.clone(), fallback, notifier.clone());
    Harness {
        app,
        store,
        provider,
        notifier,
    }
}

pub fn assemble(
    store: DatastoreHandle,
    audit: Vec<Arc<dyn AuditLog>>,
    provider: Arc<MockProvider>,
    fallback: Option<Arc<dyn Provider>>,
    notifier: Arc<RecordingNotifier>,
) -> AppContext {
    AppContext::assemble(
        Config::default(),
        store,
        audit,
        Collaborators {
            provider,
            fallback,
            geo: Arc::new(FixedGeo),
            notifier,
        },
    )
    .unwrap()
}
