use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::event::EventType;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Substituted once when the primary model is rate limited.
    #[serde(default)]
    pub fallback_model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.3
}

fn default_provider_timeout_secs() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            model: default_model(),
            fallback_model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSettings {
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
    /// Trailing history turns inspected by the conversation gate.
    #[serde(default = "default_gate_history_window")]
    pub gate_history_window: usize,
    #[serde(default = "default_previsit_max_questions")]
    pub previsit_max_questions: usize,
    #[serde(default = "default_distress_window")]
    pub distress_window: usize,
    #[serde(default = "default_distress_threshold")]
    pub distress_threshold: usize,
    #[serde(default = "default_dispatch_eta")]
    pub dispatch_eta: String,
}

fn default_max_tool_iterations() -> u32 {
    5
}

fn default_gate_history_window() -> usize {
    4
}

fn default_previsit_max_questions() -> usize {
    5
}

fn default_distress_window() -> usize {
    3
}

fn default_distress_threshold() -> usize {
    2
}

fn default_dispatch_eta() -> String {
    "8 minutes".to_string()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            gate_history_window: default_gate_history_window(),
            previsit_max_questions: default_previsit_max_questions(),
            distress_window: default_distress_window(),
            distress_threshold: default_distress_threshold(),
            dispatch_eta: default_dispatch_eta(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// SQLite file. Empty means `~/.eldercare/data/eldercare.db`.
    #[serde(default)]
    pub db_path: String,
    /// Mirror every routed event into daily JSONL files under the audit dir.
    #[serde(default)]
    pub jsonl_audit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_refill_interval_secs")]
    pub refill_interval_secs: u64,
    #[serde(default = "default_reminder_interval_secs")]
    pub reminder_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_refill_interval_secs() -> u64 {
    12 * 60 * 60
}

fn default_reminder_interval_secs() -> u64 {
    30 * 60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refill_interval_secs: default_refill_interval_secs(),
            reminder_interval_secs: default_reminder_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    #[serde(default)]
    pub twilio_account_sid: Option<String>,
    #[serde(default)]
    pub twilio_auth_token: Option<String>,
    #[serde(default)]
    pub twilio_from_number: Option<String>,
    /// Event types the communication agent turns into messages.
    #[serde(default = "default_notify_event_types")]
    pub notify_event_types: Vec<EventType>,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_notify_event_types() -> Vec<EventType> {
    vec![
        EventType::EmergencyVitals,
        EventType::DispatchConfirmed,
        EventType::WellnessCheck,
        EventType::RefillAlert,
    ]
}

fn default_notify_timeout_secs() -> u64 {
    15
}

impl NotificationConfig {
    pub fn twilio_configured(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().map(|s| !s.is_empty()).unwrap_or(false);
        set(&self.twilio_account_sid) && set(&self.twilio_auth_token) && set(&self.twilio_from_number)
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_from_number: None,
            notify_event_types: default_notify_event_types(),
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoConfig {
    #[serde(default = "default_nominatim_url")]
    pub nominatim_url: String,
    #[serde(default = "default_overpass_url")]
    pub overpass_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_radius_m")]
    pub radius_m: u32,
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_city")]
    pub default_city: String,
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_overpass_url() -> String {
    "https://overpass-api.de/api/interpreter".to_string()
}

fn default_user_agent() -> String {
    "ElderCareAgent/1.0".to_string()
}

fn default_radius_m() -> u32 {
    10_000
}

fn default_result_limit() -> usize {
    5
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    15
}

fn default_city() -> String {
    "New York".to_string()
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            nominatim_url: default_nominatim_url(),
            overpass_url: default_overpass_url(),
            user_agent: default_user_agent(),
            radius_m: default_radius_m(),
            result_limit: default_result_limit(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            default_city: default_city(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agents: AgentSettings,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub geo: GeoConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Config file, then `.env`, then process environment, then validation.
    pub fn resolve(paths: &Paths) -> Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        let mut config = Self::load_or_default(paths)?;
        config.apply_env(|key| std::env::var(key).ok());
        if config.store.db_path.is_empty() {
            config.store.db_path = paths.default_db_file().to_string_lossy().to_string();
        }
        config.validate()?;
        info!(model = %config.provider.model, db = %config.store.db_path, "Configuration resolved");
        Ok(config)
    }

    /// Overlay environment variables onto the loaded values. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("ELDERCARE_API_KEY").or_else(|| get("GROQ_API_KEY")) {
            self.provider.api_key = v;
        }
        if let Some(v) = get("ELDERCARE_API_BASE") {
            self.provider.api_base = v;
        }
        if let Some(v) = get("ELDERCARE_MODEL") {
            self.provider.model = v;
        }
        if let Some(v) = get("ELDERCARE_FALLBACK_MODEL") {
            self.provider.fallback_model = Some(v);
        }
        if let Some(v) = get("ELDERCARE_DB_PATH") {
            self.store.db_path = v;
        }
        if let Some(v) = get("TWILIO_ACCOUNT_SID") {
            self.notifications.twilio_account_sid = Some(v);
        }
        if let Some(v) = get("TWILIO_AUTH_TOKEN") {
            self.notifications.twilio_auth_token = Some(v);
        }
        if let Some(v) = get("TWILIO_PHONE_NUMBER") {
            self.notifications.twilio_from_number = Some(v);
        }
    }

    /// Missing completion-service or datastore settings are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.provider.api_key.trim().is_empty() {
            return Err(Error::Config(
                "completion service api key is missing (set GROQ_API_KEY or provider.apiKey)".to_string(),
            ));
        }
        if self.provider.api_base.trim().is_empty() {
            return Err(Error::Config("provider.apiBase is empty".to_string()));
        }
        if self.provider.model.trim().is_empty() {
            return Err(Error::Config("provider.model is empty".to_string()));
        }
        if self.store.db_path.trim().is_empty() {
            return Err(Error::Config("datastore path is missing (set ELDERCARE_DB_PATH or store.dbPath)".to_string()));
        }
        if self.agents.max_tool_iterations == 0 {
            return Err(Error::Config("agents.maxToolIterations must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_json() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.agents.max_tool_iterations, 5);
        assert_eq!(cfg.agents.gate_history_window, 4);
        assert_eq!(cfg.geo.radius_m, 10_000);
        assert_eq!(cfg.notifications.notify_event_types.len(), 4);
        assert!(!cfg.notifications.notify_event_types.contains(&EventType::PersistentDistressAlert));
    }

    #[test]
    fn test_camel_case_sections() {
        let raw = r#"{
  "provider": { "apiKey": "k", "model": "m", "fallbackModel": "small" },
  "agents": { "maxToolIterations": 8 },
  "notifications": { "notifyEventTypes": ["REFILL_ALERT", "PERSISTENT_DISTRESS_ALERT"] }
}"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.provider.fallback_model.as_deref(), Some("small"));
        assert_eq!(cfg.agents.max_tool_iterations, 8);
        assert_eq!(
            cfg.notifications.notify_event_types,
            vec![EventType::RefillAlert, EventType::PersistentDistressAlert]
        );
    }

    #[test]
    fn test_env_overrides_and_validation() {
        let env: HashMap<&str, &str> = [
            ("GROQ_API_KEY", "gsk_test"),
            ("ELDERCARE_DB_PATH", "/tmp/care.db"),
            ("TWILIO_ACCOUNT_SID", ""),
        ]
        .into_iter()
        .collect();

        let mut cfg = Config::default();
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));

        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.provider.api_key, "gsk_test");
        assert_eq!(cfg.store.db_path, "/tmp/care.db");
        assert!(cfg.notifications.twilio_account_sid.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        let mut cfg = Config::default();
        cfg.gateway.port = 9100;
        cfg.save(&paths.config_file()).unwrap();

        let loaded = Config::load_or_default(&paths).unwrap();
        assert_eq!(loaded.gateway.port, 9100);
    }
}
