//! Low-stock refill monitoring and the doctor/patient approval workflow.

use async_trait::async_trait;
use chrono::Utc;
use eldercare_core::records::{Medication, RiskLevel, WorkflowKind, WorkflowRecord, WorkflowStatus};
use eldercare_core::{agents, Error, EventType, Result};
use eldercare_storage::DatastoreHandle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bus::{Agent, Publisher};

const SNAPSHOT_VITALS: usize = 10;
const DEFAULT_APPROVED_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RefillAction {
    DoctorApprove {
        #[serde(default)]
        approved_days: Option<i64>,
    },
    DoctorDeny {
        #[serde(default)]
        reason: Option<String>,
    },
    PatientConsent,
    PatientDecline,
}

impl RefillAction {
    fn label(&self) -> &'static str {
        match self {
            RefillAction::DoctorApprove { .. } => "doctor_approve",
            RefillAction::DoctorDeny { .. } => "doctor_deny",
            RefillAction::PatientConsent => "patient_consent",
            RefillAction::PatientDecline => "patient_decline",
        }
    }
}

/// Status a refill moves to under `action`. Consent lands on
/// `approved_by_patient`; `apply_action` only persists it as `completed`,
/// after the restock went through.
pub fn next_status(current: WorkflowStatus, action: &RefillAction) -> Result<WorkflowStatus> {
    use WorkflowStatus::*;
    match (current, action) {
        (Pending, RefillAction::DoctorApprove { .. }) => Ok(ApprovedByDoctor),
        (Pending, RefillAction::DoctorDeny { .. }) => Ok(DoctorDenied),
        (ApprovedByDoctor, RefillAction::PatientConsent) => Ok(ApprovedByPatient),
        (ApprovedByDoctor, RefillAction::PatientDecline) => Ok(PatientDeclined),
        (status, action) => Err(Error::Validation(format!(
            "Cannot apply {} to a refill in status {}",
            action.label(),
            status
        ))),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub low_stock: usize,
    pub created: Vec<String>,
    pub already_open: usize,
    pub failed: usize,
}

pub struct RefillAgent {
    store: DatastoreHandle,
    publisher: Arc<dyn Publisher>,
}

impl RefillAgent {
    pub fn new(store: DatastoreHandle, publisher: Arc<dyn Publisher>) -> Self {
        Self { store, publisher }
    }

    /// Health status attached to a refill request for the approving doctor.
    pub fn health_snapshot(&self, patient_id: &str) -> Result<Value> {
        let patient_name = self
            .store
            .user(patient_id)?
            .map(|u| u.full_name)
            .unwrap_or_else(|| "Unknown".to_string());
        let vitals = self.store.recent_vitals(patient_id, SNAPSHOT_VITALS)?;
        let medications = self.store.medications(patient_id)?;
        let risk = RiskLevel::assess(vitals.first().map(|r| &r.vitals));

        Ok(json!({
            "patient_name": patient_name,
            "report_date": Utc::now().to_rfc3339(),
            "summary": "Automated health status report generated for medication refill approval.",
            "risk_level": risk,
            "recent_vitals": vitals,
            "current_medications": medications,
        }))
    }

    /// Open a pending refill for every low-stock medication that has none in
    /// flight. The existence check and the insert are separate store calls.
    /// A medication that fails is logged and left for the next sweep.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for med in self.store.all_medications()?.into_iter().filter(|m| m.is_low()) {
            report.low_stock += 1;
            match self.open_refill(&med).await {
                Ok(Some(id)) => report.created.push(id),
                Ok(None) => report.already_open += 1,
                Err(e) => {
                    warn!(medication_id = %med.id, patient_id = %med.patient_id, error = %e, "Could not open refill request");
                    report.failed += 1;
                }
            }
        }

        info!(
            low_stock = report.low_stock,
            created = report.created.len(),
            failed = report.failed,
            "Refill sweep finished"
        );
        Ok(report)
    }

    /// `None` when a refill for this medication is already in flight.
    async fn open_refill(&self, med: &Medication) -> Result<Option<String>> {
        if self.store.find_open_workflow(WorkflowKind::Refill, &med.id)?.is_some() {
            debug!(medication = %med.name, "Refill already in progress");
            return Ok(None);
        }

        info!(
            medication = %med.name,
            stock = ?med.current_stock,
            threshold = ?med.stock_threshold,
            patient_id = %med.patient_id,
            "Low stock detected, opening refill request"
        );

        let record = WorkflowRecord::new(
            WorkflowKind::Refill,
            &med.id,
            &med.patient_id,
            WorkflowStatus::Pending,
            json!({
                "medication_id": med.id,
                "medication": med.name,
                "stock": med.current_stock,
                "threshold": med.stock_threshold,
                "health_report": self.health_snapshot(&med.patient_id)?,
            }),
        );
        self.store.insert_workflow(&record)?;

        if let Err(e) = self
            .publisher
            .publish(
                agents::REFILL,
                agents::COMMUNICATION,
                EventType::RefillAlert,
                &med.patient_id,
                json!({
                    "medication": med.name,
                    "stock": med.current_stock,
                    "threshold": med.stock_threshold,
                    "workflow_id": record.id,
                }),
            )
            .await
        {
            warn!(workflow_id = %record.id, error = %e, "Failed to publish refill alert");
        }
        Ok(Some(record.id))
    }

    pub fn list(&self, patient_id: Option<&str>) -> Result<Vec<WorkflowRecord>> {
        self.store.workflows(WorkflowKind::Refill, patient_id)
    }

    pub fn apply_action(&self, workflow_id: &str, action: &RefillAction) -> Result<WorkflowRecord> {
        let record = self
            .store
            .workflow(workflow_id)?
            .filter(|r| r.kind == WorkflowKind::Refill)
            .ok_or_else(|| Error::NotFound(format!("Refill request not found: {}", workflow_id)))?;

        let next = next_status(record.status, action)?;
        let mut data = record.data.clone();
        match action {
            RefillAction::DoctorApprove { approved_days } => {
                data["approved_days"] = json!(approved_days.unwrap_or(DEFAULT_APPROVED_DAYS));
            }
            RefillAction::DoctorDeny { reason } => {
                data["denial_reason"] = json!(reason);
            }
            _ => {}
        }

        if next != WorkflowStatus::ApprovedByPatient {
            let updated = self.store.update_workflow(workflow_id, next, &data)?;
            info!(workflow_id = %workflow_id, from = %record.status, to = %next, "Refill status changed");
            return Ok(updated);
        }

        // a failed restock must leave the request in approved_by_doctor
        let days = data["approved_days"].as_i64().unwrap_or(DEFAULT_APPROVED_DAYS);
        self.store.set_medication_stock(&record.subject_id, days)?;
        data["patient_consent"] = json!(true);
        data["restocked_to"] = json!(days);
        let completed = self.store.update_workflow(workflow_id, WorkflowStatus::Completed, &data)?;
        info!(workflow_id = %workflow_id, medication_id = %record.subject_id, stock = days, "Refill completed");
        Ok(completed)
    }
}

#[async_trait]
impl Agent for RefillAgent {
    fn name(&self) -> &'static str {
        agents::REFILL
    }

    async fn handle_event(&self, event_type: EventType, patient_id: &str, _payload: &Value) -> Result<()> {
        debug!(event_type = %event_type, patient_id = %patient_id, "Refill agent ignores routed events");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowStatus::*;

    #[test]
    fn test_happy_path_lattice() {
        let approve = RefillAction::DoctorApprove { approved_days: None };
        assert_eq!(next_status(Pending, &approve).unwrap(), ApprovedByDoctor);
        assert_eq!(next_status(ApprovedByDoctor, &RefillAction::PatientConsent).unwrap(), ApprovedByPatient);
    }

    #[test]
    fn test_side_exits() {
        assert_eq!(next_status(Pending, &RefillAction::DoctorDeny { reason: None }).unwrap(), DoctorDenied);
        assert_eq!(next_status(ApprovedByDoctor, &RefillAction::PatientDecline).unwrap(), PatientDeclined);
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(matches!(next_status(Pending, &RefillAction::PatientConsent), Err(Error::Validation(_))));
        assert!(next_status(Completed, &RefillAction::DoctorApprove { approved_days: Some(10) }).is_err());
        assert!(next_status(DoctorDenied, &RefillAction::PatientDecline).is_err());
    }

    #[test]
    fn test_action_wire_format() {
        let a: RefillAction = serde_json::from_str(r#"{"action": "doctor_approve", "approved_days": 60}"#).unwrap();
        assert_eq!(a, RefillAction::DoctorApprove { approved_days: Some(60) });
        let a: RefillAction = serde_json::from_str(r#"{"action": "patient_consent"}"#).unwrap();
        assert_eq!(a, RefillAction::PatientConsent);
    }
}
