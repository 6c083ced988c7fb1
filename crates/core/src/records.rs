//! Datastore record shapes shared by the store, the tools and the agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A patient, guardian or doctor account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub guardian_id: Option<String>,
    #[serde(default)]
    pub guardian_phone: Option<String>,
    #[serde(default)]
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

/// One raw vitals submission. Every field is optional; absent readings never
/// trigger a threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default)]
    pub bp_systolic: Option<f64>,
    #[serde(default)]
    pub bp_diastolic: Option<f64>,
    #[serde(default)]
    pub heart_rate: Option<f64>,
    #[serde(default)]
    pub blood_sugar: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub spo2: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Vitals {
    pub fn blood_pressure(systolic: f64, diastolic: f64, heart_rate: f64) -> Self {
        Self {
            bp_systolic: Some(systolic),
            bp_diastolic: Some(diastolic),
            heart_rate: Some(heart_rate),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsRecord {
    pub id: i64,
    pub patient_id: String,
    #[serde(flatten)]
    pub vitals: Vitals,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// Rates the most recent reading. No reading rates as low.
    pub fn assess(latest: Option<&Vitals>) -> Self {
        let Some(v) = latest else {
            return RiskLevel::Low;
        };
        let hr = v.heart_rate;
        let spo2 = v.spo2;
        let sys = v.bp_systolic;
        let above = |x: Option<f64>, limit: f64| x.map(|x| x > limit).unwrap_or(false);
        let below = |x: Option<f64>, limit: f64| x.map(|x| x < limit).unwrap_or(false);

        if above(hr, 100.0) || below(hr, 50.0) || below(spo2, 92.0) || above(sys, 160.0) || below(sys, 90.0) {
            RiskLevel::High
        } else if above(hr, 90.0) || below(spo2, 95.0) || above(sys, 140.0) {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub id: String,
    pub patient_id: String,
    pub name: String,
    #[serde(default)]
    pub dosage: Option<String>,
    /// Reminder slots, e.g. `["08:00", "20:00"]`.
    #[serde(default)]
    pub timing: Vec<String>,
    #[serde(default)]
    pub current_stock: Option<i64>,
    #[serde(default)]
    pub stock_threshold: Option<i64>,
}

impl Medication {
    /// Stock at or below the configured threshold. Medications without both
    /// values are never low.
    pub fn is_low(&self) -> bool {
        match (self.current_stock, self.stock_threshold) {
            (Some(stock), Some(threshold)) => stock <= threshold,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Refill,
    Previsit,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Refill => "refill",
            WorkflowKind::Previsit => "previsit",
        }
    }
}

impl FromStr for WorkflowKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "refill" => Ok(WorkflowKind::Refill),
            "previsit" => Ok(WorkflowKind::Previsit),
            other => Err(Error::Validation(format!("Unknown workflow kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    ApprovedByDoctor,
    ApprovedByPatient,
    Completed,
    DoctorDenied,
    PatientDeclined,
}

impl WorkflowStatus {
    pub const NON_TERMINAL: [WorkflowStatus; 3] = [
        WorkflowStatus::Pending,
        WorkflowStatus::ApprovedByPatient,
        WorkflowStatus::ApprovedByDoctor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::ApprovedByDoctor => "approved_by_doctor",
            WorkflowStatus::ApprovedByPatient => "approved_by_patient",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::DoctorDenied => "doctor_denied",
            WorkflowStatus::PatientDeclined => "patient_declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !Self::NON_TERMINAL.contains(self)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let all = [
            WorkflowStatus::Pending,
            WorkflowStatus::ApprovedByDoctor,
            WorkflowStatus::ApprovedByPatient,
            WorkflowStatus::Completed,
            WorkflowStatus::DoctorDenied,
            WorkflowStatus::PatientDeclined,
        ];
        all.into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("Unknown workflow status: {}", s)))
    }
}

/// A status-tracked approval unit keyed by (subject, kind).
///
/// For refills the subject is the medication id, for pre-visit reports it is
/// the appointment id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub kind: WorkflowKind,
    pub subject_id: String,
    pub patient_id: String,
    pub status: WorkflowStatus,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRecord {
    pub fn new(kind: WorkflowKind, subject_id: &str, patient_id: &str, status: WorkflowStatus, data: Value) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            subject_id: subject_id.to_string(),
            patient_id: patient_id.to_string(),
            status,
            data,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub doctor_name: String,
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!WorkflowStatus::Pending.is_terminal());
        assert!(!WorkflowStatus::ApprovedByDoctor.is_terminal());
        assert!(!WorkflowStatus::ApprovedByPatient.is_terminal());
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::DoctorDenied.is_terminal());
        assert!(WorkflowStatus::PatientDeclined.is_terminal());
    }

    #[test]
    fn test_status_round_trip_names() {
        assert_eq!("approved_by_doctor".parse::<WorkflowStatus>().unwrap(), WorkflowStatus::ApprovedByDoctor);
        assert_eq!(serde_json::to_value(WorkflowStatus::PatientDeclined).unwrap(), "patient_declined");
        assert!("archived".parse::<WorkflowStatus>().is_err());
    }

    #[test]
    fn test_risk_level() {
        assert_eq!(RiskLevel::assess(None), RiskLevel::Low);
        let calm = Vitals { heart_rate: Some(72.0), spo2: Some(98.0), bp_systolic: Some(120.0), ..Vitals::default() };
        assert_eq!(RiskLevel::assess(Some(&calm)), RiskLevel::Low);
        let elevated = Vitals { bp_systolic: Some(150.0), ..calm.clone() };
        assert_eq!(RiskLevel::assess(Some(&elevated)), RiskLevel::Moderate);
        let hypoxic = Vitals { spo2: Some(90.0), ..calm };
        assert_eq!(RiskLevel::assess(Some(&hypoxic)), RiskLevel::High);
    }

    #[test]
    fn test_medication_is_low() {
        let mut med = Medication {
            id: "m1".into(),
            patient_id: "p1".into(),
            name: "Metformin".into(),
            dosage: None,
            timing: vec![],
            current_stock: Some(5),
            stock_threshold: Some(10),
        };
        assert!(med.is_low());
        med.current_stock = Some(10);
        assert!(med.is_low());
        med.current_stock = Some(11);
        assert!(!med.is_low());
        med.stock_threshold = None;
        assert!(!med.is_low());
    }
}
