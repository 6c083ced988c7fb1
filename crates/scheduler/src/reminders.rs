use chrono::{Local, NaiveTime, Timelike};
use eldercare_core::Result;
use eldercare_storage::DatastoreHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reminder {
    pub patient_id: String,
    pub medication: String,
    pub dosage: Option<String>,
    pub slot: String,
}

/// Slots (`HH:MM`) that fell due in the window ending at `now`. Midnight
/// wrap-around is honoured; unparsable slots are skipped.
pub fn due_slots<'a>(timing: &'a [String], now: NaiveTime, window: Duration) -> Vec<&'a str> {
    let day = 24 * 60 * 60;
    let window = window.as_secs().min(day) as i64;
    let now_secs = now.num_seconds_from_midnight() as i64;

    timing
        .iter()
        .filter_map(|slot| match NaiveTime::parse_from_str(slot.trim(), "%H:%M") {
            Ok(t) => Some((slot.as_str(), t)),
            Err(_) => {
                debug!(slot = %slot, "Ignoring unparsable reminder slot");
                None
            }
        })
        .filter(|(_, t)| {
            let age = (now_secs - t.num_seconds_from_midnight() as i64).rem_euclid(day as i64);
            age < window
        })
        .map(|(slot, _)| slot)
        .collect()
}

/// Logs a reminder for every medication slot that came due since the last
/// tick. Delivery to patients is not wired up.
pub struct MedicationReminderService {
    store: DatastoreHandle,
    interval: Duration,
}

impl MedicationReminderService {
    pub fn new(store: DatastoreHandle) -> Self {
        Self {
            store,
            interval: Duration::from_secs(30 * 60), // 30 minutes
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn reminders_at(&self, now: NaiveTime) -> Result<Vec<Reminder>> {
        let mut due = Vec::new();
        for med in self.store.all_medications()? {
            for slot in due_slots(&med.timing, now, self.interval) {
                due.push(Reminder {
                    patient_id: med.patient_id.clone(),
                    medication: med.name.clone(),
                    dosage: med.dosage.clone(),
                    slot: slot.to_string(),
                });
            }
        }
        Ok(due)
    }

    async fn tick(&self) -> Result<()> {
        let reminders = self.reminders_at(Local::now().time())?;
        for r in &reminders {
            info!(
                patient_id = %r.patient_id,
                medication = %r.medication,
                dosage = ?r.dosage,
                slot = %r.slot,
                "Medication reminder"
            );
        }
        if reminders.is_empty() {
            debug!("No medication reminders due");
        }
        Ok(())
    }

    pub async fn run_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "MedicationReminderService started");

        if self.interval.is_zero() {
            warn!("Reminder interval is zero, service disabled");
            return;
        }
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "Medication reminder run failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("MedicationReminderService shutting down");
                    break;
                }
            }
        }
    }
}
