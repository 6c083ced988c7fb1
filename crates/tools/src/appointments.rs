use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use eldercare_core::records::{Appointment, Doctor};
use eldercare_core::{Error, Result};
use serde_json::{json, Value};
use tracing::info;

use crate::{opt_str, Tool, ToolContext, ToolSchema};

const FIRST_SLOT_MIN: u32 = 9 * 60;
const LAST_SLOT_MIN: u32 = 16 * 60 + 30;
const SLOT_STEP_MIN: u32 = 30;

/// Bookable half-hour starts for one doctor-day, `09:00` through `16:30`.
pub fn slot_grid() -> Vec<String> {
    (FIRST_SLOT_MIN..=LAST_SLOT_MIN)
        .step_by(SLOT_STEP_MIN as usize)
        .map(|m| format!("{:02}:{:02}", m / 60, m % 60))
        .collect()
}

/// The requested time when it is still free, otherwise the first free slot.
pub fn pick_slot(requested: Option<&str>, booked: &[String]) -> Option<String> {
    let free: Vec<String> = slot_grid().into_iter().filter(|s| !booked.contains(s)).collect();
    if let Some(req) = requested {
        if free.iter().any(|s| s == req) {
            return Some(req.to_string());
        }
    }
    free.into_iter().next()
}

fn specialty_of(d: &Doctor) -> String {
    d.specialty.as_deref().unwrap_or("").to_lowercase()
}

/// Choose a doctor for a booking request. `Err` carries the message shown to
/// the patient.
pub fn pick_doctor(
    doctors: &[Doctor],
    connected: Option<&str>,
    name: Option<&str>,
    specialty: Option<&str>,
) -> std::result::Result<Doctor, String> {
    let connected_doc = connected.and_then(|id| doctors.iter().find(|d| d.id == id));

    if let Some(name) = name {
        let needle = name.to_lowercase();
        let needle = needle.trim_start_matches("dr.").trim_start_matches("dr ").trim();
        return doctors
            .iter()
            .find(|d| d.name.to_lowercase().contains(needle))
            .cloned()
            .ok_or_else(|| format!("I couldn't find a doctor named {}.", name));
    }

    if let Some(requested) = specialty {
        let wanted = requested.to_lowercase();
        let matches = |d: &Doctor| {
            let s = specialty_of(d);
            !s.is_empty() && (s.contains(&wanted) || wanted.contains(&s))
        };
        if let Some(d) = connected_doc.filter(|d| matches(d)) {
            return Ok(d.clone());
        }
        if let Some(d) = doctors.iter().find(|d| specialty_of(d) == wanted) {
            return Ok(d.clone());
        }
        return doctors
            .iter()
            .find(|d| matches(d))
            .cloned()
            .ok_or_else(|| format!("I couldn't find a {} specialist. Would you like to see a general physician instead?", requested));
    }

    if let Some(d) = connected_doc {
        return Ok(d.clone());
    }
    doctors
        .iter()
        .find(|d| specialty_of(d).contains("general"))
        .cloned()
        .ok_or_else(|| "I couldn't find any available doctors at the moment.".to_string())
}

pub struct GetAppointmentsTool;

#[async_trait]
impl Tool for GetAppointmentsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_appointments",
            description: "List the patient's upcoming and past appointments.",
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: ToolContext, _params: Value) -> Result<Value> {
        let appointments = ctx.store.appointments(&ctx.patient_id)?;
        Ok(json!({ "count": appointments.len(), "appointments": appointments }))
    }
}

/// Books a doctor slot. Availability is read and then written in two
/// separate store calls, so concurrent bookings can take the same slot.
pub struct BookAppointmentTool;

#[async_trait]
impl Tool for BookAppointmentTool {
    fn schema(&self) -> ToolSchema {
        let str_prop = |desc: &str| -> Value { json!({"type": "string", "description": desc}) };
        ToolSchema {
            name: "book_appointment",
            description: "Book a doctor appointment for the patient. Only call this once the patient's symptoms are known.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "doctor_name": str_prop("Doctor to book, if the patient named one"),
                    "specialty": str_prop("Required specialty, e.g. 'cardiology'"),
                    "date": str_prop("Date (YYYY-MM-DD). Default: tomorrow"),
                    "time": str_prop("Preferred time (HH:MM)"),
                    "reason": str_prop("Reason for the visit, in the patient's words"),
                },
            }),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if let Some(date) = opt_str(params, "date") {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| Error::Tool(format!("Invalid date '{}', expected YYYY-MM-DD", date)))?;
        }
        if let Some(time) = opt_str(params, "time") {
            NaiveTime::parse_from_str(time, "%H:%M")
                .map_err(|_| Error::Tool(format!("Invalid time '{}', expected HH:MM", time)))?;
        }
        Ok(())
    }

    fn read_only(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let patient = ctx
            .store
            .user(&ctx.patient_id)?
            .ok_or_else(|| Error::NotFound(format!("Patient not found: {}", ctx.patient_id)))?;
        let doctors = ctx.store.doctors()?;

        let doctor = match pick_doctor(
            &doctors,
            patient.doctor_id.as_deref(),
            opt_str(&params, "doctor_name"),
            opt_str(&params, "specialty"),
        ) {
            Ok(d) => d,
            Err(message) => return Ok(json!({ "success": false, "message": message })),
        };

        let date = opt_str(&params, "date")
            .map(str::to_string)
            .unwrap_or_else(|| (Utc::now().date_naive() + Duration::days(1)).format("%Y-%m-%d").to_string());

        let booked = ctx.store.booked_slots(&doctor.id, &date)?;
        let Some(time) = pick_slot(opt_str(&params, "time"), &booked) else {
            return Ok(json!({
                "success": false,
                "message": format!("{} has no free slots on {}. Would another day work?", doctor.name, date),
            }));
        };

        let appointment = Appointment {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id: ctx.patient_id.clone(),
            doctor_id: doctor.id.clone(),
            doctor_name: doctor.name.clone(),
            date,
            time,
            reason: opt_str(&params, "reason").map(str::to_string),
            status: "pending".to_string(),
        };
        ctx.store.insert_appointment(&appointment)?;
        info!(patient_id = %ctx.patient_id, doctor = %doctor.name, date = %appointment.date, time = %appointment.time, "Appointment booked");

        let message = format!(
            "Appointment requested with {} on {} at {}. The doctor will confirm shortly.",
            doctor.name, appointment.date, appointment.time
        );
        Ok(json!({ "success": true, "appointment": appointment, "message": message }))
    }
}
