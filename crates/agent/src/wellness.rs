use async_trait::async_trait;
use eldercare_core::types::{ChatMessage, HistoryTurn};
use eldercare_core::{agents, EventType, Result};
use eldercare_providers::Provider;
use eldercare_storage::{DatastoreHandle, EventQuery};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bus::{Agent, Publisher};
use crate::reasoning::{complete_messages, Generated};

const FALLBACK_REPLY: &str = "I'm here for you. Tell me more about how you feel.";
const SUMMARY_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodAnalysis {
    #[serde(default = "neutral_sentiment")]
    pub sentiment: f64,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub distress_flag: bool,
}

fn neutral_sentiment() -> f64 {
    5.0
}

impl Default for MoodAnalysis {
    fn default() -> Self {
        Self {
            sentiment: neutral_sentiment(),
            keywords: Vec::new(),
            distress_flag: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MoodReply {
    pub response: String,
    pub mood: f64,
    pub suggestion: Option<String>,
}

/// Split "reply text {json}" into the reply and its analysis. A missing or
/// unparsable object yields the neutral analysis.
pub fn parse_mood_reply(raw: &str) -> (String, MoodAnalysis) {
    let reply = raw.split('{').next().unwrap_or("").trim().to_string();
    let analysis = match (raw.rfind('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => serde_json::from_str(&raw[start..=end]).unwrap_or_else(|e| {
            debug!(error = %e, "Unparsable mood analysis");
            MoodAnalysis::default()
        }),
        _ => MoodAnalysis::default(),
    };
    (reply, analysis)
}

/// Majority vote over the newest `window` check-ins (newest first). Returns
/// the distress count when it reaches `threshold`. Fewer than `window`
/// check-ins never escalate.
pub fn distress_trend(flags: &[bool], window: usize, threshold: usize) -> Option<usize> {
    if window == 0 || flags.len() < window {
        return None;
    }
    let count = flags[..window].iter().filter(|f| **f).count();
    (count >= threshold).then_some(count)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub struct WellnessAgent {
    store: DatastoreHandle,
    provider: Arc<dyn Provider>,
    publisher: Arc<dyn Publisher>,
    window: usize,
    threshold: usize,
}

impl WellnessAgent {
    pub fn new(
        store: DatastoreHandle,
        provider: Arc<dyn Provider>,
        publisher: Arc<dyn Publisher>,
        window: usize,
        threshold: usize,
    ) -> Self {
        Self {
            store,
            provider,
            publisher,
            window,
            threshold,
        }
    }

    pub async fn analyze_mood(&self, patient_id: &str, message: &str, history: &[HistoryTurn]) -> Result<MoodReply> {
        let mut messages = vec![ChatMessage::system(
            "You are an empathetic health companion for elderly people. Reply warmly in a few sentences, \
             then append a JSON object with keys 'sentiment' (0-10), 'keywords' (e.g. lonely, pain) and \
             'distress_flag' (true/false).",
        )];
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(message));

        let (reply, analysis) = match complete_messages(self.provider.as_ref(), &messages, FALLBACK_REPLY.to_string()).await {
            Generated::Model(raw) => {
                let (reply, analysis) = parse_mood_reply(&raw);
                let reply = if reply.is_empty() { FALLBACK_REPLY.to_string() } else { reply };
                (reply, analysis)
            }
            Generated::Fallback { text, .. } => (text, MoodAnalysis::default()),
        };

        let target = if analysis.distress_flag {
            agents::COMMUNICATION
        } else {
            agents::AUDIT_LOG
        };
        if let Err(e) = self
            .publisher
            .publish(
                agents::MENTAL_WELLNESS,
                target,
                EventType::WellnessCheck,
                patient_id,
                json!({
                    "sentiment_score": analysis.sentiment,
                    "distress_flag": analysis.distress_flag,
                    "keywords": analysis.keywords,
                    "summary": truncate_chars(&reply, SUMMARY_CHARS),
                }),
            )
            .await
        {
            warn!(patient_id = %patient_id, error = %e, "Failed to publish wellness check");
        }

        if analysis.distress_flag {
            if let Err(e) = self.check_distress_trend(patient_id).await {
                warn!(patient_id = %patient_id, error = %e, "Distress trend check failed");
            }
        }

        Ok(MoodReply {
            response: reply,
            mood: analysis.sentiment,
            suggestion: (analysis.sentiment < 5.0).then(|| "Try a short walk".to_string()),
        })
    }

    /// Recomputed from the audit trail on every distressed check-in.
    pub async fn check_distress_trend(&self, patient_id: &str) -> Result<Option<usize>> {
        let recent = self
            .store
            .recent_events(&EventQuery::for_patient(patient_id, EventType::WellnessCheck, self.window))?;
        let flags: Vec<bool> = recent
            .iter()
            .map(|e| e.payload.get("distress_flag").and_then(|v| v.as_bool()).unwrap_or(false))
            .collect();

        let Some(count) = distress_trend(&flags, self.window, self.threshold) else {
            return Ok(None);
        };

        info!(patient_id = %patient_id, distress_count = count, "Persistent distress detected, escalating");
        self.publisher
            .publish(
                agents::MENTAL_WELLNESS,
                agents::COMMUNICATION,
                EventType::PersistentDistressAlert,
                patient_id,
                json!({
                    "distress_count": count,
                    "period": format!("Last {} check-ins", self.window),
                }),
            )
            .await?;
        Ok(Some(count))
    }
}

#[async_trait]
impl Agent for WellnessAgent {
    fn name(&self) -> &'static str {
        agents::MENTAL_WELLNESS
    }

    async fn handle_event(&self, event_type: EventType, patient_id: &str, _payload: &Value) -> Result<()> {
        debug!(event_type = %event_type, patient_id = %patient_id, "Wellness agent ignores routed events");
        Ok(())
    }
}
