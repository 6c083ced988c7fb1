use async_trait::async_trait;
use eldercare_core::records::Vitals;
use eldercare_core::{agents, EventType, Result};
use eldercare_providers::Provider;
use eldercare_storage::DatastoreHandle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bus::{Agent, Publisher};
use crate::reasoning::complete_text;

const SYSTOLIC_MAX: f64 = 180.0;
const DIASTOLIC_MAX: f64 = 110.0;
const HEART_RATE_MIN: f64 = 40.0;
const HEART_RATE_MAX: f64 = 150.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityVerdict {
    pub severity: Severity,
    pub event_type: EventType,
}

/// Threshold rules over one reading. Comparisons are strict and absent
/// readings never trip a rule.
pub fn classify(vitals: &Vitals) -> SeverityVerdict {
    let above = |x: Option<f64>, limit: f64| x.map(|x| x > limit).unwrap_or(false);
    let below = |x: Option<f64>, limit: f64| x.map(|x| x < limit).unwrap_or(false);

    let critical = above(vitals.bp_systolic, SYSTOLIC_MAX)
        || above(vitals.bp_diastolic, DIASTOLIC_MAX)
        || below(vitals.heart_rate, HEART_RATE_MIN)
        || above(vitals.heart_rate, HEART_RATE_MAX);

    if critical {
        SeverityVerdict {
            severity: Severity::Critical,
            event_type: EventType::EmergencyVitals,
        }
    } else {
        SeverityVerdict {
            severity: Severity::Info,
            event_type: EventType::NormalLog,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VitalsOutcome {
    pub event_type: EventType,
    pub severity: Severity,
    pub reasoning: String,
}

/// Entry point for vitals submissions.
pub struct HealthMonitorAgent {
    store: DatastoreHandle,
    provider: Arc<dyn Provider>,
    publisher: Arc<dyn Publisher>,
}

impl HealthMonitorAgent {
    pub fn new(store: DatastoreHandle, provider: Arc<dyn Provider>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            store,
            provider,
            publisher,
        }
    }

    /// Store, classify and route one reading. Critical readings start the
    /// emergency cascade; errors from the cascade are returned.
    pub async fn analyze_vitals(&self, patient_id: &str, vitals: &Vitals) -> Result<VitalsOutcome> {
        if let Err(e) = self.store.insert_vitals(patient_id, vitals) {
            warn!(patient_id = %patient_id, error = %e, "Failed to store vitals, continuing with classification");
        }

        let verdict = classify(vitals);
        let vitals_json = serde_json::to_value(vitals)?;

        let reasoning = complete_text(
            self.provider.as_ref(),
            "You are a medical AI reviewing vitals of an elderly patient. Reply with a one-sentence summary.",
            &format!("Vitals: {}. Patient ID: {}", vitals_json, patient_id),
            format!("Automated analysis: {} triggered.", verdict.event_type),
        )
        .await
        .into_text();

        let target = match verdict.severity {
            Severity::Critical => agents::CARE_DECISION,
            Severity::Info => agents::COMMUNICATION,
        };
        info!(patient_id = %patient_id, severity = ?verdict.severity, target = %target, "Vitals classified");

        self.publisher
            .publish(
                agents::HEALTH_MONITORING,
                target,
                verdict.event_type,
                patient_id,
                json!({
                    "vitals": vitals_json,
                    "severity": verdict.severity,
                    "ai_reasoning": reasoning,
                }),
            )
            .await?;

        Ok(VitalsOutcome {
            event_type: verdict.event_type,
            severity: verdict.severity,
            reasoning,
        })
    }
}

#[async_trait]
impl Agent for HealthMonitorAgent {
    fn name(&self) -> &'static str {
        agents::HEALTH_MONITORING
    }

    async fn handle_event(&self, event_type: EventType, patient_id: &str, _payload: &Value) -> Result<()> {
        debug!(event_type = %event_type, patient_id = %patient_id, "Health monitor ignores routed events");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bp(sys: f64, dia: f64, hr: f64) -> SeverityVerdict {
        classify(&Vitals::blood_pressure(sys, dia, hr))
    }

    #[test]
    fn test_critical_reading() {
        let v = bp(195.0, 120.0, 105.0);
        assert_eq!(v.severity, Severity::Critical);
        assert_eq!(v.event_type, EventType::EmergencyVitals);
    }

    #[test]
    fn test_normal_reading() {
        let v = bp(120.0, 80.0, 70.0);
        assert_eq!(v.severity, Severity::Info);
        assert_eq!(v.event_type, EventType::NormalLog);
    }

    #[test]
    fn test_boundaries_are_strict() {
        assert_eq!(bp(180.0, 110.0, 150.0).severity, Severity::Info);
        assert_eq!(bp(181.0, 70.0, 70.0).severity, Severity::Critical);
        assert_eq!(bp(120.0, 111.0, 70.0).severity, Severity::Critical);
        assert_eq!(bp(120.0, 80.0, 40.0).severity, Severity::Info);
        assert_eq!(bp(120.0, 80.0, 39.0).severity, Severity::Critical);
        assert_eq!(bp(120.0, 80.0, 151.0).severity, Severity::Critical);
    }

    #[test]
    fn test_missing_readings_never_trigger() {
        assert_eq!(classify(&Vitals::default()).severity, Severity::Info);
        let only_hr = Vitals {
            heart_rate: Some(30.0),
            ..Vitals::default()
        };
        assert_eq!(classify(&only_hr).severity, Severity::Critical);
    }

    #[test]
    fn test_verdict_wire_format() {
        let json = serde_json::to_value(bp(200.0, 80.0, 80.0)).unwrap();
        assert_eq!(json["severity"], "CRITICAL");
        assert_eq!(json["event_type"], "EMERGENCY_VITALS");
    }
}
