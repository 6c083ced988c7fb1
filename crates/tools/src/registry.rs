use std::collections::HashMap;
use std::sync::Arc;
use eldercare_core::{Error, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{Tool, ToolContext, ToolSchema};
use crate::appointments::{BookAppointmentTool, GetAppointmentsTool};
use crate::emergency::EmergencyAlertTool;
use crate::health::HealthSummaryTool;
use crate::hospitals::NearestHospitalTool;
use crate::medications::MedicationsTool;

/// Dispatch table from tool name to implementation.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

fn function_schema(schema: ToolSchema) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": schema.name,
            "description": schema.description,
            "parameters": schema.parameters
        }
    })
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        // Patient record lookups
        registry.register(Arc::new(HealthSummaryTool));
        registry.register(Arc::new(MedicationsTool));
        registry.register(Arc::new(GetAppointmentsTool));

        // Actions
        registry.register(Arc::new(BookAppointmentTool));
        registry.register(Arc::new(NearestHospitalTool));
        registry.register(Arc::new(EmergencyAlertTool));

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "Registering tool");
        self.tools.insert(schema.name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn get_tool_schemas(&self) -> Vec<Value> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|n| self.tools.get(n))
            .map(|tool| function_schema(tool.schema()))
            .collect()
    }

    /// Get tool schemas filtered by a list of tool names.
    pub fn get_filtered_schemas(&self, names: &[&str]) -> Vec<Value> {
        let mut wanted: Vec<&str> = names.to_vec();
        wanted.sort_unstable();
        wanted.dedup();
        wanted
            .into_iter()
            .filter_map(|n| self.tools.get(n))
            .map(|tool| function_schema(tool.schema()))
            .collect()
    }

    /// Names of tools that only read patient data.
    pub fn read_only_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .iter()
            .filter(|(_, tool)| tool.read_only())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Get all registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn execute(&self, name: &str, ctx: ToolContext, params: Value) -> Result<Value> {
        let tool = self.get(name).ok_or_else(|| {
            Error::Tool(format!("Unknown tool: {}", name))
        })?;

        if let Err(e) = tool.validate(&params) {
            warn!(tool = name, error = %e, "Tool validation failed");
            return Err(e);
        }

        debug!(tool = name, patient_id = %ctx.patient_id, "Executing tool");
        tool.execute(ctx, params).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
