use async_trait::async_trait;
use eldercare_core::types::{ChatMessage, HistoryTurn};
use eldercare_core::{agents, Error, EventType, Result};
use eldercare_providers::Provider;
use eldercare_storage::DatastoreHandle;
use eldercare_tools::{GeoLocator, GeoPoint, Notifier, ToolContext, ToolRegistry};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::bus::Agent;
use crate::context::build_messages;
use crate::gate::{gate, Phase};

const BUSY_REPLY: &str = "I'm experiencing high demand. Please wait a few seconds and try again.";
const ERROR_REPLY: &str = "Sorry, I ran into a problem while handling that. Please try again in a moment.";
const EXHAUSTED_REPLY: &str = "I've completed the requested actions. Please check the results below.";
const EMPTY_REPLY: &str = "I'm sorry, I couldn't put that together. Could you say it another way?";

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub patient_id: String,
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionTaken {
    pub tool: String,
    pub args: Value,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub actions_taken: Vec<ActionTaken>,
    pub phase: Phase,
}

static FUNCTION_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<function(?:=[^>]*)?>.*?(?:</function>|$)").unwrap());
static SPECIAL_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<\|[^|>]*\|>").unwrap());
static BRACKET_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(?:TOOL_CALLS|TOOL_RESULTS|/?INST|/?tool_call)[^\]]*\]").unwrap());
static JSON_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*\{.*"(?:name|arguments|parameters)".*\}\s*$"#).unwrap());
static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strip tool-call residue the model should not show the patient.
pub fn sanitize(text: &str) -> String {
    let text = FUNCTION_TAG_RE.replace_all(text, "");
    let text = SPECIAL_TOKEN_RE.replace_all(&text, "");
    let text = BRACKET_MARKER_RE.replace_all(&text, "");
    let text = JSON_LINE_RE.replace_all(&text, "");
    let text = BLANK_RUN_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Collaborators the tools run against.
#[derive(Clone)]
pub struct ToolServices {
    pub store: DatastoreHandle,
    pub geo: Arc<dyn GeoLocator>,
    pub notifier: Arc<dyn Notifier>,
    pub default_city: String,
}

/// Gated, bounded tool-calling loop behind the chat endpoint.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    fallback: Option<Arc<dyn Provider>>,
    tools: ToolRegistry,
    services: ToolServices,
    max_iterations: u32,
    gate_window: usize,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: ToolRegistry,
        services: ToolServices,
        max_iterations: u32,
        gate_window: usize,
    ) -> Self {
        Self {
            provider,
            fallback: None,
            tools,
            services,
            max_iterations,
            gate_window,
        }
    }

    pub fn with_fallback(mut self, fallback: Option<Arc<dyn Provider>>) -> Self {
        self.fallback = fallback;
        self
    }

    fn tool_context(&self, req: &ChatRequest) -> ToolContext {
        ToolContext {
            patient_id: req.patient_id.clone(),
            location: req.location,
            store: self.services.store.clone(),
            geo: self.services.geo.clone(),
            notifier: self.services.notifier.clone(),
            default_city: self.services.default_city.clone(),
        }
    }

    /// Tool names the model may call in `phase`.
    pub fn allowed_tools(&self, phase: Phase) -> Vec<String> {
        match phase {
            Phase::IntakeOnly => self.tools.read_only_names(),
            Phase::Emergency | Phase::Full => self.tools.tool_names(),
        }
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatReply> {
        if req.patient_id.trim().is_empty() {
            return Err(Error::Validation("patient_id is required".to_string()));
        }
        if req.message.trim().is_empty() {
            return Err(Error::Validation("message is required".to_string()));
        }

        let phase = gate(&req.message, &req.history, self.gate_window);
        let allowed = self.allowed_tools(phase);
        let allowed_refs: Vec<&str> = allowed.iter().map(String::as_str).collect();
        let schemas = self.tools.get_filtered_schemas(&allowed_refs);
        info!(patient_id = %req.patient_id, phase = %phase, tool_count = schemas.len(), "Chat turn started");

        let ctx = self.tool_context(req);
        let mut messages = build_messages(phase, &req.history, &req.message);
        let mut actions: Vec<ActionTaken> = Vec::new();
        let mut provider = self.provider.clone();
        let mut switched = false;
        let mut iteration = 0;

        let reply = |response: String, actions: Vec<ActionTaken>| ChatReply {
            response,
            actions_taken: actions,
            phase,
        };

        while iteration < self.max_iterations {
            debug!(iteration, model = provider.model(), "LLM call iteration");

            let response = match provider.chat(&messages, &schemas).await {
                Ok(r) => r,
                Err(e) if e.is_transient() => {
                    if let Some(fallback) = self.fallback.as_ref().filter(|_| !switched) {
                        warn!(error = %e, fallback = fallback.model(), "Transient provider error, switching to fallback model");
                        provider = fallback.clone();
                        switched = true;
                        continue;
                    }
                    warn!(error = %e, "Transient provider error, returning busy reply");
                    return Ok(reply(BUSY_REPLY.to_string(), actions));
                }
                Err(e) => {
                    error!(error = %e, patient_id = %req.patient_id, "Provider call failed");
                    return Ok(reply(ERROR_REPLY.to_string(), actions));
                }
            };
            iteration += 1;

            if response.tool_calls.is_empty() {
                let text = sanitize(response.content.as_deref().unwrap_or(""));
                let text = if text.is_empty() {
                    warn!(patient_id = %req.patient_id, "Model reply empty after sanitizing");
                    let fallback = if actions.is_empty() { EMPTY_REPLY } else { EXHAUSTED_REPLY };
                    fallback.to_string()
                } else {
                    text
                };
                info!(patient_id = %req.patient_id, actions = actions.len(), iterations = iteration, "Chat turn finished");
                return Ok(reply(text, actions));
            }

            let mut assistant_msg = ChatMessage::assistant(response.content.as_deref().unwrap_or(""));
            assistant_msg.tool_calls = Some(response.tool_calls.clone());
            messages.push(assistant_msg);

            for call in &response.tool_calls {
                let result = if allowed.iter().any(|n| n == &call.name) {
                    match self.tools.execute(&call.name, ctx.clone(), call.arguments.clone()).await {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(tool = %call.name, error = %e, "Tool failed");
                            json!({ "error": e.to_string() })
                        }
                    }
                } else {
                    warn!(tool = %call.name, phase = %phase, "Tool not permitted in this phase");
                    json!({ "error": format!("Tool '{}' is not available right now", call.name) })
                };

                messages.push(ChatMessage::tool_result(&call.id, &call.name, &result.to_string()));
                actions.push(ActionTaken {
                    tool: call.name.clone(),
                    args: call.arguments.clone(),
                    result,
                });
            }
        }

        warn!(patient_id = %req.patient_id, max_iterations = self.max_iterations, "Reached max iterations");
        Ok(reply(EXHAUSTED_REPLY.to_string(), actions))
    }
}

#[async_trait]
impl Agent for Orchestrator {
    fn name(&self) -> &'static str {
        agents::ASSISTANT
    }

    async fn handle_event(&self, event_type: EventType, patient_id: &str, _payload: &Value) -> Result<()> {
        debug!(event_type = %event_type, patient_id = %patient_id, "Assistant ignores routed events");
        Ok(())
    }
}
