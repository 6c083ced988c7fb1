use eldercare_core::records::{WorkflowKind, WorkflowRecord, WorkflowStatus};
use eldercare_core::types::{ChatMessage, HistoryTurn};
use eldercare_core::Result;
use eldercare_providers::Provider;
use eldercare_storage::DatastoreHandle;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::reasoning::{complete_messages, Generated};

const COMPLETE_MARKER: &str = "INTERVIEW_COMPLETE";
const FALLBACK_QUESTION: &str = "Could you tell me anything else about how you're feeling?";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterviewTurn {
    pub next_question: Option<String>,
    pub is_complete: bool,
}

struct PatientContext {
    name: String,
    medications: Vec<String>,
    latest_vitals: Option<serde_json::Value>,
}

/// Asks targeted screening questions before an appointment and writes the
/// report the doctor reads.
pub struct PreVisitAgent {
    store: DatastoreHandle,
    provider: Arc<dyn Provider>,
    max_questions: usize,
}

impl PreVisitAgent {
    pub fn new(store: DatastoreHandle, provider: Arc<dyn Provider>, max_questions: usize) -> Self {
        Self {
            store,
            provider,
            max_questions,
        }
    }

    fn context(&self, patient_id: &str) -> Result<PatientContext> {
        let name = self
            .store
            .user(patient_id)?
            .map(|u| u.full_name)
            .unwrap_or_else(|| "Unknown".to_string());
        let medications = self
            .store
            .medications(patient_id)?
            .into_iter()
            .map(|m| match m.dosage {
                Some(d) => format!("{} {}", m.name, d),
                None => m.name,
            })
            .collect();
        let latest_vitals = self
            .store
            .recent_vitals(patient_id, 1)?
            .into_iter()
            .next()
            .map(|r| serde_json::to_value(r.vitals))
            .transpose()?;
        Ok(PatientContext {
            name,
            medications,
            latest_vitals,
        })
    }

    pub async fn interview_turn(&self, reason: &str, patient_id: &str, history: &[HistoryTurn]) -> Result<InterviewTurn> {
        let asked = history.iter().filter(|t| t.is_assistant()).count();
        if asked >= self.max_questions {
            return Ok(InterviewTurn {
                next_question: None,
                is_complete: true,
            });
        }

        let ctx = self.context(patient_id)?;
        let system = format!(
            "You are a medical intake assistant conducting a pre-visit interview.\n\
             The patient booked an appointment for: \"{reason}\".\n\
             Patient: {name}. Current medications: {meds}. Latest vitals: {vitals}.\n\
             You have asked {asked} of at most {max} questions.\n\
             Ask exactly ONE short question related to the reason or their previous answers. \
             Do not repeat questions. If the symptoms are fully explained, output exactly \"{marker}\".",
            reason = reason,
            name = ctx.name,
            meds = if ctx.medications.is_empty() { "none on file".to_string() } else { ctx.medications.join(", ") },
            vitals = ctx.latest_vitals.map(|v| v.to_string()).unwrap_or_else(|| "none on file".to_string()),
            asked = asked,
            max = self.max_questions,
            marker = COMPLETE_MARKER,
        );

        let mut messages = vec![ChatMessage::system(&system)];
        messages.extend(history.iter().map(ChatMessage::from));
        if history.is_empty() {
            messages.push(ChatMessage::user(reason));
        }

        match complete_messages(self.provider.as_ref(), &messages, FALLBACK_QUESTION.to_string()).await {
            Generated::Model(text) if text.contains(COMPLETE_MARKER) => Ok(InterviewTurn {
                next_question: None,
                is_complete: true,
            }),
            Generated::Model(text) => Ok(InterviewTurn {
                next_question: Some(text),
                is_complete: false,
            }),
            Generated::Fallback { text, .. } => Ok(InterviewTurn {
                next_question: Some(text),
                is_complete: asked + 1 >= self.max_questions,
            }),
        }
    }

    /// Build the markdown report and store it against the appointment.
    /// Drafts stay `pending` until the final call completes them.
    pub async fn generate_report(
        &self,
        appointment_id: &str,
        patient_id: &str,
        reason: &str,
        history: &[HistoryTurn],
        is_final: bool,
    ) -> Result<String> {
        if history.is_empty() {
            return Ok(String::new());
        }

        let ctx = self.context(patient_id)?;
        let transcript = transcript(history);
        let meds = if ctx.medications.is_empty() { "None".to_string() } else { ctx.medications.join(", ") };

        let prompt = format!(
            "Generate a concise, structured pre-visit report for the doctor in markdown.\n\n\
             APPOINTMENT REASON: {reason}\nPATIENT: {name}\nCURRENT MEDICATIONS: {meds}\nLATEST VITALS: {vitals}\n\n\
             INTERVIEW TRANSCRIPT:\n{transcript}\n\
             Use the sections: '## Preliminary Health Report', '### History of Present Illness (HPI)', \
             '### Relevant Medical History', '### Medications', then '## AI Interview Evaluation' with \
             '### Clinical Insights Extracted' and '### AI Self-Evaluation'.",
            reason = reason,
            name = ctx.name,
            meds = meds,
            vitals = ctx.latest_vitals.map(|v| v.to_string()).unwrap_or_else(|| "Not available".to_string()),
            transcript = transcript,
        );

        let fallback = format!(
            "## Preliminary Health Report\n\n**Patient:** {}\n**Visit Reason:** {}\n\n\
             ### Interview Transcript\n{}\n### Current Medications\n{}\n\n---\n\n\
             ## AI Interview Evaluation\n**Status:** AI Evaluation Unavailable (API Error)\n",
            ctx.name, reason, transcript, meds
        );

        let report = complete_messages(self.provider.as_ref(), &[ChatMessage::user(&prompt)], fallback)
            .await
            .into_text();

        let status = if is_final {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Pending
        };
        let data = json!({ "report": report, "reason": reason });

        match self.store.find_open_workflow(WorkflowKind::Previsit, appointment_id)? {
            Some(open) => {
                self.store.update_workflow(&open.id, status, &data)?;
            }
            None => {
                let record = WorkflowRecord::new(WorkflowKind::Previsit, appointment_id, patient_id, status, data);
                self.store.insert_workflow(&record)?;
            }
        }
        info!(appointment_id = %appointment_id, status = %status, "Pre-visit report saved");

        Ok(report)
    }
}

fn transcript(history: &[HistoryTurn]) -> String {
    history
        .iter()
        .map(|t| {
            let speaker = if t.is_assistant() { "Assistant" } else { "Patient" };
            format!("**{}:** {}\n\n", speaker, t.content)
        })
        .collect()
}
