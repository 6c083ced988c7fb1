use async_trait::async_trait;
use eldercare_core::{agents, EventType, Result};
use eldercare_storage::DatastoreHandle;
use eldercare_tools::contact::resolve_contact;
use eldercare_tools::Notifier;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bus::Agent;

/// Destination used when no guardian phone can be resolved.
pub const UNKNOWN_CONTACT: &str = "UNKNOWN";

/// Guardian-facing text for one event.
pub fn format_alert(patient_name: &str, event_type: EventType, payload: &Value) -> String {
    let detail = match event_type {
        EventType::DispatchConfirmed => format!(
            "Ambulance en route to {}. ETA: {}",
            payload["hospital"]["name"].as_str().unwrap_or("hospital"),
            payload["eta"].as_str().unwrap_or("unknown")
        ),
        EventType::EmergencyVitals => format!("Critical readings detected: {}", payload["vitals"]),
        EventType::RefillAlert => format!(
            "{} is running low ({} left). A refill request has been opened.",
            payload["medication"].as_str().unwrap_or("A medication"),
            payload["stock"]
        ),
        _ => format!("Details: {}", payload),
    };
    format!("🚨 ELDERCARE ALERT for {}: {}. {}", patient_name, event_type, detail)
}

/// Last stage of every cascade: turns allow-listed events into guardian
/// messages. Delivery problems are logged and never fail the cascade.
pub struct CommunicationAgent {
    store: DatastoreHandle,
    notifier: Arc<dyn Notifier>,
    allowed: Vec<EventType>,
}

impl CommunicationAgent {
    pub fn new(store: DatastoreHandle, notifier: Arc<dyn Notifier>, allowed: Vec<EventType>) -> Self {
        Self {
            store,
            notifier,
            allowed,
        }
    }

    fn recipient(&self, patient_id: &str) -> (String, String) {
        match resolve_contact(self.store.as_ref(), patient_id) {
            Ok(contact) => (
                contact.patient_name,
                contact.phone.unwrap_or_else(|| UNKNOWN_CONTACT.to_string()),
            ),
            Err(e) => {
                warn!(patient_id = %patient_id, error = %e, "Contact lookup failed");
                ("Unknown Patient".to_string(), UNKNOWN_CONTACT.to_string())
            }
        }
    }
}

#[async_trait]
impl Agent for CommunicationAgent {
    fn name(&self) -> &'static str {
        agents::COMMUNICATION
    }

    async fn handle_event(&self, event_type: EventType, patient_id: &str, payload: &Value) -> Result<()> {
        if !self.allowed.contains(&event_type) {
            debug!(event_type = %event_type, "Event type not in notification allow-list");
            return Ok(());
        }

        let (patient_name, to) = self.recipient(patient_id);
        if to == UNKNOWN_CONTACT {
            warn!(patient_id = %patient_id, "No guardian phone on file, sending to placeholder");
        }

        let body = format_alert(&patient_name, event_type, payload);
        match self.notifier.send(&to, &body).await {
            Ok(_) => info!(patient_id = %patient_id, event_type = %event_type, channel = self.notifier.channel(), "Guardian notified"),
            Err(e) => warn!(patient_id = %patient_id, event_type = %event_type, error = %e, "Notification failed"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_message() {
        let msg = format_alert(
            "Asha Rao",
            EventType::DispatchConfirmed,
            &json!({"hospital": {"name": "Apollo Hospital"}, "eta": "8 minutes"}),
        );
        assert_eq!(
            msg,
            "🚨 ELDERCARE ALERT for Asha Rao: DISPATCH_CONFIRMED. Ambulance en route to Apollo Hospital. ETA: 8 minutes"
        );
    }

    #[test]
    fn test_vitals_and_generic_messages() {
        let msg = format_alert("A", EventType::EmergencyVitals, &json!({"vitals": {"heart_rate": 30}}));
        assert!(msg.ends_with("Critical readings detected: {\"heart_rate\":30}"));
        let msg = format_alert("A", EventType::WellnessCheck, &json!({"distress_flag": true}));
        assert!(msg.contains("WELLNESS_CHECK. Details: "));
    }
}
