use async_trait::async_trait;
use eldercare_core::{Error, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::contact::resolve_contact;
use crate::{opt_str, Tool, ToolContext, ToolSchema};

/// Texts the patient's guardian.
pub struct EmergencyAlertTool;

#[async_trait]
impl Tool for EmergencyAlertTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "send_emergency_alert",
            description: "Send an urgent SMS alert to the patient's guardian. Use immediately in emergencies.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string", "description": "Short description of the situation"}
                }
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let contact = resolve_contact(ctx.store.as_ref(), &ctx.patient_id)?;
        let Some(phone) = contact.phone else {
            warn!(patient_id = %ctx.patient_id, "No guardian phone on file");
            return Err(Error::Tool("No guardian phone number on file for this patient".into()));
        };

        let situation = opt_str(&params, "message").unwrap_or("needs immediate assistance");
        let body = format!("🚨 ELDERCARE EMERGENCY: {} {}", contact.patient_name, situation);

        let delivery = ctx.notifier.send(&phone, &body).await?;
        info!(patient_id = %ctx.patient_id, channel = ctx.notifier.channel(), "Emergency alert sent");
        Ok(json!({
            "success": true,
            "contacted": phone,
            "delivery": delivery,
        }))
    }
}
