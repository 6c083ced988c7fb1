use async_trait::async_trait;
use eldercare_core::{Error, Event, EventType, Result};
use eldercare_storage::AuditLog;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, info, warn};

/// A named participant in the event cascade.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle_event(&self, event_type: EventType, patient_id: &str, payload: &Value) -> Result<()>;
}

/// The narrow slice of the bus handed to agents so they can emit follow-up
/// events without owning the bus.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        source: &str,
        target: &str,
        event_type: EventType,
        patient_id: &str,
        payload: Value,
    ) -> Result<Event>;
}

/// Name to agent mapping, filled before the bus starts routing.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        debug!(name = agent.name(), "Registering agent");
        self.agents.insert(agent.name().to_string(), agent);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.agents.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Records every event to the audit sinks, then hands it to the target agent.
///
/// Audit writes and delivery are independent: a failed write is logged and
/// routing continues. Events for unregistered targets exist only in the audit
/// trail.
pub struct EventBus {
    audit: Vec<Arc<dyn AuditLog>>,
    registry: OnceLock<AgentRegistry>,
}

impl EventBus {
    pub fn new(audit: Vec<Arc<dyn AuditLog>>) -> Arc<Self> {
        Arc::new(Self {
            audit,
            registry: OnceLock::new(),
        })
    }

    /// Install the agent set. Only the first call takes effect.
    pub fn install(&self, registry: AgentRegistry) -> Result<()> {
        let names = registry.names();
        self.registry
            .set(registry)
            .map_err(|_| Error::Config("Agent registry already installed".to_string()))?;
        info!(agents = ?names, "Agent registry installed");
        Ok(())
    }

    pub fn registered_agents(&self) -> Vec<String> {
        self.registry.get().map(|r| r.names()).unwrap_or_default()
    }

    /// A publishing handle that does not keep the bus alive.
    pub fn publisher(self: &Arc<Self>) -> Arc<dyn Publisher> {
        Arc::new(BusPublisher {
            bus: Arc::downgrade(self),
        })
    }

    pub async fn publish(
        &self,
        source: &str,
        target: &str,
        event_type: EventType,
        patient_id: &str,
        payload: Value,
    ) -> Result<Event> {
        let event = Event::new(source, target, event_type, patient_id, payload);
        info!(
            event_id = %event.id,
            event_type = %event_type,
            source = %source,
            target = %target,
            patient_id = %patient_id,
            "Publishing event"
        );

        for sink in &self.audit {
            if let Err(e) = sink.record(&event) {
                warn!(event_id = %event.id, error = %e, "Audit log write failed, routing anyway");
            }
        }

        match self.registry.get().and_then(|r| r.get(target)) {
            Some(agent) => {
                agent.handle_event(event_type, patient_id, &event.payload).await?;
            }
            None => {
                debug!(target = %target, event_type = %event_type, "No agent registered for target, event buffered in audit trail");
            }
        }

        Ok(event)
    }
}

struct BusPublisher {
    bus: Weak<EventBus>,
}

#[async_trait]
impl Publisher for BusPublisher {
    async fn publish(
        &self,
        source: &str,
        target: &str,
        event_type: EventType,
        patient_id: &str,
        payload: Value,
    ) -> Result<Event> {
        let bus = self
            .bus
            .upgrade()
            .ok_or_else(|| Error::Other("Event bus is shut down".to_string()))?;
        bus.publish(source, target, event_type, patient_id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(EventType, String)>>,
    }

    #[async_trait]
    impl Agent for Recorder {
        fn name(&self) -> &'static str {
            "recorder_agent"
        }

        async fn handle_event(&self, event_type: EventType, patient_id: &str, _payload: &Value) -> Result<()> {
            self.seen.lock().unwrap().push((event_type, patient_id.to_string()));
            Ok(())
        }
    }

    struct BrokenAudit;

    impl AuditLog for BrokenAudit {
        fn record(&self, _event: &Event) -> Result<()> {
            Err(Error::Storage("disk full".to_string()))
        }
    }

    #[derive(Default)]
    struct MemoryAudit {
        events: Mutex<Vec<Event>>,
    }

    impl AuditLog for MemoryAudit {
        fn record(&self, event: &Event) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_block_delivery() {
        let bus = EventBus::new(vec![Arc::new(BrokenAudit)]);
        let recorder = Arc::new(Recorder::default());
        let mut registry = AgentRegistry::new();
        registry.register(recorder.clone());
        bus.install(registry).unwrap();

        let event = bus
            .publish("src", "recorder_agent", EventType::EmergencyVitals, "p1", json!({"k": 1}))
            .await
            .unwrap();
        assert_eq!(event.target_agent, "recorder_agent");
        assert_eq!(event.payload["k"], 1);
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_target_is_audited_only() {
        let audit = Arc::new(MemoryAudit::default());
        let bus = EventBus::new(vec![audit.clone()]);
        let recorder = Arc::new(Recorder::default());
        let mut registry = AgentRegistry::new();
        registry.register(recorder.clone());
        bus.install(registry).unwrap();

        let event = bus
            .publish("src", "nobody", EventType::WellnessCheck, "p1", json!({}))
            .await
            .unwrap();
        assert_eq!(event.event_type, EventType::WellnessCheck);
        assert!(recorder.seen.lock().unwrap().is_empty());
        assert_eq!(audit.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_publisher_handle_routes_through_bus() {
        let bus = EventBus::new(vec![]);
        let recorder = Arc::new(Recorder::default());
        let mut registry = AgentRegistry::new();
        registry.register(recorder.clone());
        bus.install(registry).unwrap();

        let publisher = bus.publisher();
        publisher
            .publish("src", "recorder_agent", EventType::NormalLog, "p9", json!({}))
            .await
            .unwrap();
        assert_eq!(recorder.seen.lock().unwrap()[0], (EventType::NormalLog, "p9".to_string()));

        drop(bus);
        assert!(publisher
            .publish("src", "recorder_agent", EventType::NormalLog, "p9", json!({}))
            .await
            .is_err());
    }

    #[test]
    fn test_registry_installs_once() {
        let bus = EventBus::new(vec![]);
        bus.install(AgentRegistry::new()).unwrap();
        assert!(bus.install(AgentRegistry::new()).is_err());
    }
}
