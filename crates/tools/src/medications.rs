use async_trait::async_trait;
use eldercare_core::Result;
use serde_json::{json, Value};

use crate::{Tool, ToolContext, ToolSchema};

pub struct MedicationsTool;

#[async_trait]
impl Tool for MedicationsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_medications",
            description: "List the patient's medications with dosage, timing and remaining stock.",
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        let meds = ctx.store.medications(&ctx.patient_id)?;
        let items: Vec<Value> = meds
            .iter()
            .map(|m| {
                json!({
                    "name": m.name,
                    "dosage": m.dosage,
                    "timing": m.timing,
                    "current_stock": m.current_stock,
                    "low_stock": m.is_low(),
                })
            })
            .collect();
        Ok(json!({ "count": items.len(), "medications": items }))
    }
}
