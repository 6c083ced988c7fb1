pub mod appointments;
pub mod contact;
pub mod emergency;
pub mod geo;
pub mod health;
pub mod hospitals;
pub mod medications;
pub mod notification;
pub mod registry;

use async_trait::async_trait;
use eldercare_core::Result;
use eldercare_storage::DatastoreHandle;
use serde_json::Value;
use std::sync::Arc;

pub use geo::{GeoLocator, GeoPoint, Hospital, OsmLocator};
pub use notification::{notifier_from_config, Notifier, SimulatedNotifier, TwilioNotifier};
pub use registry::ToolRegistry;

/// Everything a tool may touch during one call.
#[derive(Clone)]
pub struct ToolContext {
    pub patient_id: String,
    /// Caller-supplied position, preferred over geocoding a city name.
    pub location: Option<GeoPoint>,
    pub store: DatastoreHandle,
    pub geo: Arc<dyn GeoLocator>,
    pub notifier: Arc<dyn Notifier>,
    pub default_city: String,
}

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;
    fn validate(&self, params: &Value) -> Result<()>;
    /// Read-only tools stay available while the conversation is still in intake.
    fn read_only(&self) -> bool {
        true
    }
    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value>;
}

/// Optional string argument, trimmed, with empty treated as absent.
pub(crate) fn opt_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use eldercare_core::records::UserProfile;
    use eldercare_core::Error;
    use eldercare_storage::SqliteStore;
    use std::sync::Mutex;

    pub struct FixedGeo {
        pub point: Option<GeoPoint>,
        pub hospitals: Vec<Hospital>,
    }

    #[async_trait]
    impl GeoLocator for FixedGeo {
        async fn geocode(&self, _place: &str) -> Result<Option<GeoPoint>> {
            Ok(self.point)
        }

        async fn hospitals_near(&self, _at: GeoPoint) -> Result<Vec<Hospital>> {
            Ok(self.hospitals.clone())
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, to: &str, body: &str) -> Result<Value> {
            if self.fail {
                return Err(Error::Notification("gateway down".to_string()));
            }
            self.sent.lock().unwrap().push((to.to_string(), body.to_string()));
            Ok(serde_json::json!({"status": "sent", "to": to}))
        }

        fn channel(&self) -> &'static str {
            "recording"
        }
    }

    pub fn store_with_patient() -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        eldercare_storage::Datastore::upsert_user(
            store.as_ref(),
            &UserProfile {
                id: "p1".to_string(),
                full_name: "Asha Rao".to_string(),
                role: "patient".to_string(),
                age: Some(78),
                guardian_id: Some("g1".to_string()),
                doctor_id: Some("d2".to_string()),
                ..UserProfile::default()
            },
        )
        .unwrap();
        eldercare_storage::Datastore::upsert_user(
            store.as_ref(),
            &UserProfile {
                id: "g1".to_string(),
                full_name: "Ravi Rao".to_string(),
                role: "guardian".to_string(),
                phone: Some("+15550001111".to_string()),
                ..UserProfile::default()
            },
        )
        .unwrap();
        store
    }

    pub fn ctx(store: Arc<SqliteStore>, notifier: Arc<RecordingNotifier>) -> ToolContext {
        ToolContext {
            patient_id: "p1".to_string(),
            location: None,
            store,
            geo: Arc::new(FixedGeo {
                point: Some(GeoPoint { lat: 18.52, lon: 73.85 }),
                hospitals: vec![],
            }),
            notifier,
            default_city: "New York".to_string(),
        }
    }
}
