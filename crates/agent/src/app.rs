use eldercare_core::{Config, Paths, Result};
use eldercare_providers::{create_fallback_provider, create_provider, Provider};
use eldercare_storage::{AuditLog, DatastoreHandle, JsonlAuditLog, SqliteStore};
use eldercare_tools::{notifier_from_config, GeoLocator, Notifier, OsmLocator, ToolRegistry};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::bus::{AgentRegistry, EventBus};
use crate::care_decision::CareDecisionAgent;
use crate::communication::CommunicationAgent;
use crate::emergency_coord::EmergencyCoordAgent;
use crate::previsit::PreVisitAgent;
use crate::refill::RefillAgent;
use crate::runtime::{Orchestrator, ToolServices};
use crate::vitals::HealthMonitorAgent;
use crate::wellness::WellnessAgent;

/// External services the agents talk to.
pub struct Collaborators {
    pub provider: Arc<dyn Provider>,
    pub fallback: Option<Arc<dyn Provider>>,
    pub geo: Arc<dyn GeoLocator>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    pub fn from_config(config: &Config) -> Self {
        Self {
            provider: create_provider(config),
            fallback: create_fallback_provider(config),
            geo: Arc::new(OsmLocator::new(config.geo.clone())),
            notifier: notifier_from_config(&config.notifications),
        }
    }
}

/// Process-wide context, built once at startup and shared by the gateway,
/// the CLI commands and the schedulers.
pub struct AppContext {
    pub config: Config,
    pub store: DatastoreHandle,
    pub bus: Arc<EventBus>,
    pub health_monitor: Arc<HealthMonitorAgent>,
    pub wellness: Arc<WellnessAgent>,
    pub refill: Arc<RefillAgent>,
    pub previsit: Arc<PreVisitAgent>,
    pub orchestrator: Arc<Orchestrator>,
    pub geo: Arc<dyn GeoLocator>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppContext {
    /// Open the configured datastore and build every agent against the real
    /// collaborators.
    pub fn build(config: Config, paths: &Paths) -> Result<Self> {
        let sqlite = Arc::new(SqliteStore::open(Path::new(&config.store.db_path))?);
        let mut audit: Vec<Arc<dyn AuditLog>> = vec![sqlite.clone()];
        if config.store.jsonl_audit {
            audit.push(Arc::new(JsonlAuditLog::new(paths.clone())));
        }
        let collaborators = Collaborators::from_config(&config);
        Self::assemble(config, sqlite, audit, collaborators)
    }

    /// Wire agents, bus and orchestrator. The store must also be one of the
    /// audit sinks for the distress trend to see past check-ins.
    pub fn assemble(
        config: Config,
        store: DatastoreHandle,
        audit: Vec<Arc<dyn AuditLog>>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let Collaborators {
            provider,
            fallback,
            geo,
            notifier,
        } = collaborators;
        let settings = &config.agents;

        let bus = EventBus::new(audit);
        let publisher = bus.publisher();

        let health_monitor = Arc::new(HealthMonitorAgent::new(store.clone(), provider.clone(), publisher.clone()));
        let care_decision = Arc::new(CareDecisionAgent::new(store.clone(), provider.clone(), publisher.clone()));
        let emergency_coord = Arc::new(EmergencyCoordAgent::new(
            store.clone(),
            provider.clone(),
            publisher.clone(),
            &settings.dispatch_eta,
        ));
        let communication = Arc::new(CommunicationAgent::new(
            store.clone(),
            notifier.clone(),
            config.notifications.notify_event_types.clone(),
        ));
        let wellness = Arc::new(WellnessAgent::new(
            store.clone(),
            provider.clone(),
            publisher.clone(),
            settings.distress_window,
            settings.distress_threshold,
        ));
        let refill = Arc::new(RefillAgent::new(store.clone(), publisher));
        let previsit = Arc::new(PreVisitAgent::new(store.clone(), provider.clone(), settings.previsit_max_questions));

        let services = ToolServices {
            store: store.clone(),
            geo: geo.clone(),
            notifier: notifier.clone(),
            default_city: config.geo.default_city.clone(),
        };
        let orchestrator = Arc::new(
            Orchestrator::new(
                provider,
                ToolRegistry::with_defaults(),
                services,
                settings.max_tool_iterations,
                settings.gate_history_window,
            )
            .with_fallback(fallback),
        );

        let mut registry = AgentRegistry::new();
        registry.register(health_monitor.clone());
        registry.register(care_decision);
        registry.register(emergency_coord);
        registry.register(communication);
        registry.register(wellness.clone());
        registry.register(refill.clone());
        registry.register(orchestrator.clone());
        bus.install(registry)?;

        info!(
            agents = ?bus.registered_agents(),
            notifier = notifier.channel(),
            "Application context ready"
        );

        Ok(Self {
            config,
            store,
            bus,
            health_monitor,
            wellness,
            refill,
            previsit,
            orchestrator,
            geo,
            notifier,
        })
    }
}
