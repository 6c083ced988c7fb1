use async_trait::async_trait;
use eldercare_core::{agents, Error, EventType, Result};
use eldercare_providers::Provider;
use eldercare_storage::DatastoreHandle;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::bus::{Agent, Publisher};
use crate::reasoning::complete_text;

/// Prepares the receiving hospital and confirms dispatch. The ambulance
/// service itself is simulated, so the ETA is a configured value.
pub struct EmergencyCoordAgent {
    store: DatastoreHandle,
    provider: Arc<dyn Provider>,
    publisher: Arc<dyn Publisher>,
    eta: String,
}

impl EmergencyCoordAgent {
    pub fn new(store: DatastoreHandle, provider: Arc<dyn Provider>, publisher: Arc<dyn Publisher>, eta: &str) -> Self {
        Self {
            store,
            provider,
            publisher,
            eta: eta.to_string(),
        }
    }

    async fn handle_hospital_decision(&self, patient_id: &str, payload: &Value) -> Result<()> {
        let patient = self
            .store
            .user(patient_id)?
            .ok_or_else(|| Error::NotFound(format!("Patient not found: {}", patient_id)))?;

        let hospital = payload.get("hospital").cloned().unwrap_or_else(|| json!({}));
        let hospital_name = hospital.get("name").and_then(|v| v.as_str()).unwrap_or("the hospital");
        let context = payload.get("emergency_context").cloned().unwrap_or(Value::Null);

        let summary = complete_text(
            self.provider.as_ref(),
            "Write a concise, high-priority medical summary for emergency responders and ER staff.",
            &format!(
                "Patient: {}, age {}. Known conditions: {:?}. Allergies: {:?}. Current emergency vitals: {}. Receiving hospital: {}.",
                patient.full_name,
                patient.age.map(|a| a.to_string()).unwrap_or_else(|| "unknown".to_string()),
                patient.conditions,
                patient.allergies,
                context,
                hospital_name
            ),
            format!("EMERGENCY: {} approaching {}. Vitals: {}", patient.full_name, hospital_name, context),
        )
        .await
        .into_text();

        info!(patient_id = %patient_id, hospital = %hospital_name, eta = %self.eta, "Dispatch confirmed");

        self.publisher
            .publish(
                agents::EMERGENCY_COORD,
                agents::COMMUNICATION,
                EventType::DispatchConfirmed,
                patient_id,
                json!({
                    "hospital": hospital,
                    "eta": self.eta,
                    "medical_summary": summary,
                    "status": "Ambulance En Route",
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Agent for EmergencyCoordAgent {
    fn name(&self) -> &'static str {
        agents::EMERGENCY_COORD
    }

    async fn handle_event(&self, event_type: EventType, patient_id: &str, payload: &Value) -> Result<()> {
        match event_type {
            EventType::HospitalDecision => self.handle_hospital_decision(patient_id, payload).await,
            other => {
                debug!(event_type = %other, "Emergency coordination agent ignored event");
                Ok(())
            }
        }
    }
}
