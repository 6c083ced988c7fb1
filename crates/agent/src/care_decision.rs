use async_trait::async_trait;
use eldercare_core::{agents, Error, EventType, Result};
use eldercare_providers::Provider;
use eldercare_storage::DatastoreHandle;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::bus::{Agent, Publisher};
use crate::reasoning::complete_text;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityCandidate {
    pub name: String,
    pub distance_km: f64,
    pub specialty: String,
    pub rating: f64,
}

/// Stand-in for a live facility directory.
pub fn default_candidates() -> Vec<FacilityCandidate> {
    vec![
        FacilityCandidate {
            name: "Apollo Hospital".to_string(),
            distance_km: 2.3,
            specialty: "Cardiac".to_string(),
            rating: 4.8,
        },
        FacilityCandidate {
            name: "KIMS Hospital".to_string(),
            distance_km: 4.1,
            specialty: "General".to_string(),
            rating: 4.5,
        },
    ]
}

/// Closest candidate wins, ties go to the higher rating.
pub fn select_facility(candidates: &[FacilityCandidate]) -> Option<&FacilityCandidate> {
    candidates.iter().min_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| b.rating.total_cmp(&a.rating))
    })
}

/// Picks a facility for an emergency and hands off to dispatch.
pub struct CareDecisionAgent {
    store: DatastoreHandle,
    provider: Arc<dyn Provider>,
    publisher: Arc<dyn Publisher>,
    candidates: Vec<FacilityCandidate>,
}

impl CareDecisionAgent {
    pub fn new(store: DatastoreHandle, provider: Arc<dyn Provider>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            store,
            provider,
            publisher,
            candidates: default_candidates(),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<FacilityCandidate>) -> Self {
        self.candidates = candidates;
        self
    }

    async fn handle_emergency(&self, patient_id: &str, payload: &Value) -> Result<()> {
        let patient = self
            .store
            .user(patient_id)?
            .ok_or_else(|| Error::NotFound(format!("Patient not found: {}", patient_id)))?;

        let hospital = select_facility(&self.candidates)
            .ok_or_else(|| Error::Config("No care facilities configured".to_string()))?;
        let vitals = payload.get("vitals").cloned().unwrap_or(Value::Null);

        let rationale = complete_text(
            self.provider.as_ref(),
            "You are a medical dispatcher. Justify the facility choice in two sentences.",
            &format!(
                "Facility: {} ({}, {} km). Critical vitals: {}. Patient conditions: {:?}.",
                hospital.name, hospital.specialty, hospital.distance_km, vitals, patient.conditions
            ),
            format!("Selected {} due to proximity and specialization.", hospital.name),
        )
        .await
        .into_text();

        info!(patient_id = %patient_id, hospital = %hospital.name, "Care facility selected");

        self.publisher
            .publish(
                agents::CARE_DECISION,
                agents::EMERGENCY_COORD,
                EventType::HospitalDecision,
                patient_id,
                json!({
                    "hospital": hospital,
                    "rationale": rationale,
                    "emergency_context": vitals,
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Agent for CareDecisionAgent {
    fn name(&self) -> &'static str {
        agents::CARE_DECISION
    }

    async fn handle_event(&self, event_type: EventType, patient_id: &str, payload: &Value) -> Result<()> {
        match event_type {
            EventType::EmergencyVitals => self.handle_emergency(patient_id, payload).await,
            other => {
                debug!(event_type = %other, "Care decision agent ignored event");
                Ok(())
            }
        }
    }
}
