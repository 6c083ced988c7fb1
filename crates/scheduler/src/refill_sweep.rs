use eldercare_agent::{RefillAgent, SweepReport};
use eldercare_core::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Periodically opens refill requests for low-stock medications.
pub struct RefillSweepService {
    refill: Arc<RefillAgent>,
    interval: Duration,
}

impl RefillSweepService {
    pub fn new(refill: Arc<RefillAgent>) -> Self {
        Self {
            refill,
            interval: Duration::from_secs(12 * 60 * 60), // 12 hours
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn tick(&self) -> Result<SweepReport> {
        info!("Checking for low medication stock");
        self.refill.sweep().await
    }

    pub async fn run_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "RefillSweepService started");

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Refill sweep failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("RefillSweepService shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eldercare_agent::{AgentRegistry, EventBus};
    use eldercare_core::records::Medication;
    use eldercare_storage::{Datastore, SqliteStore};

    fn refill_agent() -> (Arc<SqliteStore>, Arc<RefillAgent>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .upsert_medication(&Medication {
                id: "m1".into(),
                patient_id: "p1".into(),
                name: "Warfarin".into(),
                dosage: None,
                timing: vec![],
                current_stock: Some(2),
                stock_threshold: Some(7),
            })
            .unwrap();
        let bus = EventBus::new(vec![store.clone()]);
        bus.install(AgentRegistry::new()).unwrap();
        let agent = Arc::new(RefillAgent::new(store.clone(), bus.publisher()));
        (store, agent)
    }

    #[tokio::test]
    async fn test_tick_opens_one_request() {
        let (_store, agent) = refill_agent();
        let service = RefillSweepService::new(agent);

        assert_eq!(service.tick().await.unwrap().created.len(), 1);
        assert_eq!(service.tick().await.unwrap().created.len(), 0);
    }

    #[tokio::test]
    async fn test_run_loop_sweeps_then_stops() {
        let (store, agent) = refill_agent();
        let service = Arc::new(RefillSweepService::new(agent).with_interval(Duration::from_secs(3600)));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(service.run_loop(rx));
        // the first interval tick fires immediately
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        let open = store
            .workflows(eldercare_core::records::WorkflowKind::Refill, Some("p1"))
            .unwrap();
        assert_eq!(open.len(), 1);
    }
}
