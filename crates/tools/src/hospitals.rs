use async_trait::async_trait;
use eldercare_core::Result;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::geo::GeoPoint;
use crate::{opt_str, Tool, ToolContext, ToolSchema};

pub struct NearestHospitalTool;

impl NearestHospitalTool {
    /// Caller location wins; otherwise geocode the requested or default city.
    async fn resolve_origin(ctx: &ToolContext, city: Option<&str>) -> Result<Option<(GeoPoint, String)>> {
        if let Some(at) = ctx.location {
            return Ok(Some((at, "your current location".to_string())));
        }
        let place = city.unwrap_or(&ctx.default_city);
        Ok(ctx.geo.geocode(place).await?.map(|p| (p, place.to_string())))
    }
}

#[async_trait]
impl Tool for NearestHospitalTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "find_nearest_hospital",
            description: "Find the nearest hospitals with distance, address, phone and a map link. Uses the patient's location when known.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string", "description": "City or area to search when the patient's location is unknown"}
                }
            }),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let Some((origin, label)) = Self::resolve_origin(&ctx, opt_str(&params, "city")).await? else {
            warn!(patient_id = %ctx.patient_id, "Could not resolve a location for hospital search");
            return Ok(json!({
                "found": false,
                "message": "I couldn't determine the location. Please tell me your city.",
            }));
        };

        let hospitals = ctx.geo.hospitals_near(origin).await?;
        info!(patient_id = %ctx.patient_id, near = %label, count = hospitals.len(), "Hospital lookup");

        if hospitals.is_empty() {
            return Ok(json!({
                "found": false,
                "message": format!("No hospitals found near {}. Call emergency services if this is urgent.", label),
            }));
        }
        Ok(json!({ "found": true, "near": label, "hospitals": hospitals }))
    }
}
