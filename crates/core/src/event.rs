use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Well-known agent names used as event sources and targets.
pub mod agents {
    pub const HEALTH_MONITORING: &str = "health_monitoring_agent";
    pub const CARE_DECISION: &str = "care_decision_agent";
    pub const EMERGENCY_COORD: &str = "emergency_coord_agent";
    pub const MENTAL_WELLNESS: &str = "mental_wellness_agent";
    pub const ASSISTANT: &str = "assistant_agent";
    pub const COMMUNICATION: &str = "communication_agent";
    pub const REFILL: &str = "refill_agent";
    /// Never registered. Events sent here only land in the audit trail.
    pub const AUDIT_LOG: &str = "audit_log";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    EmergencyVitals,
    NormalLog,
    HospitalDecision,
    DispatchConfirmed,
    WellnessCheck,
    PersistentDistressAlert,
    RefillAlert,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::EmergencyVitals,
        EventType::NormalLog,
        EventType::HospitalDecision,
        EventType::DispatchConfirmed,
        EventType::WellnessCheck,
        EventType::PersistentDistressAlert,
        EventType::RefillAlert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EmergencyVitals => "EMERGENCY_VITALS",
            EventType::NormalLog => "NORMAL_LOG",
            EventType::HospitalDecision => "HOSPITAL_DECISION",
            EventType::DispatchConfirmed => "DISPATCH_CONFIRMED",
            EventType::WellnessCheck => "WELLNESS_CHECK",
            EventType::PersistentDistressAlert => "PERSISTENT_DISTRESS_ALERT",
            EventType::RefillAlert => "REFILL_ALERT",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("Unknown event type: {}", s)))
    }
}

/// Immutable record of one routed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub source_agent: String,
    pub target_agent: String,
    pub event_type: EventType,
    pub patient_id: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(
        source_agent: &str,
        target_agent: &str,
        event_type: EventType,
        patient_id: &str,
        payload: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_agent: source_agent.to_string(),
            target_agent: target_agent.to_string(),
            event_type,
            patient_id: patient_id.to_string(),
            payload,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        for t in EventType::ALL {
            let json = serde_json::to_value(t).unwrap();
            assert_eq!(json, Value::String(t.as_str().to_string()));
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert!("SOMETHING_ELSE".parse::<EventType>().is_err());
    }

    #[test]
    fn test_event_new_assigns_id_and_time() {
        let a = Event::new("a", "b", EventType::NormalLog, "p1", serde_json::json!({}));
        let b = Event::new("a", "b", EventType::NormalLog, "p1", serde_json::json!({}));
        assert_ne!(a.id, b.id);
        assert!(b.created_at >= a.created_at);
    }
}
