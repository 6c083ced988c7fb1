use async_trait::async_trait;
use eldercare_core::records::RiskLevel;
use eldercare_core::{Error, Result};
use serde_json::{json, Value};

use crate::{Tool, ToolContext, ToolSchema};

const RECENT_VITALS: usize = 5;

/// Profile, recent vitals, medications and a coarse risk rating for the
/// current patient.
pub struct HealthSummaryTool;

/// Snapshot shared by the tool and the HTTP health endpoint.
pub fn health_snapshot(ctx: &ToolContext) -> Result<Value> {
    let profile = ctx
        .store
        .user(&ctx.patient_id)?
        .ok_or_else(|| Error::NotFound(format!("Patient not found: {}", ctx.patient_id)))?;
    let vitals = ctx.store.recent_vitals(&ctx.patient_id, RECENT_VITALS)?;
    let medications = ctx.store.medications(&ctx.patient_id)?;
    let risk = RiskLevel::assess(vitals.first().map(|r| &r.vitals));

    Ok(json!({
        "patient": {
            "name": profile.full_name,
            "age": profile.age,
            "conditions": profile.conditions,
            "allergies": profile.allergies,
        },
        "recent_vitals": vitals,
        "medications": medications.iter().map(|m| json!({
            "name": m.name,
            "dosage": m.dosage,
            "timing": m.timing,
        })).collect::<Vec<_>>(),
        "risk_level": risk,
    }))
}

#[async_trait]
impl Tool for HealthSummaryTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_health_summary",
            description: "Get the patient's health summary: profile, recent vitals, current medications and risk level.",
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        health_snapshot(&ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ctx, store_with_patient, RecordingNotifier};
    use eldercare_core::records::Vitals;
    use eldercare_storage::Datastore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_summary_rates_latest_reading() {
        let store = store_with_patient();
        store.insert_vitals("p1", &Vitals::blood_pressure(120.0, 80.0, 72.0)).unwrap();
        store.insert_vitals("p1", &Vitals::blood_pressure(170.0, 95.0, 110.0)).unwrap();

        let out = HealthSummaryTool
            .execute(ctx(store, Arc::new(RecordingNotifier::default())), json!({}))
            .await
            .unwrap();
        assert_eq!(out["patient"]["name"], "Asha Rao");
        assert_eq!(out["recent_vitals"].as_array().unwrap().len(), 2);
        assert_eq!(out["risk_level"], "high");
    }

    #[tokio::test]
    async fn test_summary_without_vitals_is_low_risk() {
        let store = store_with_patient();
        let out = HealthSummaryTool
            .execute(ctx(store, Arc::new(RecordingNotifier::default())), json!({}))
            .await
            .unwrap();
        assert_eq!(out["risk_level"], "low");
        assert!(out["medications"].as_array().unwrap().is_empty());
    }
}
