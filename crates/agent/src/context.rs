use eldercare_core::types::{ChatMessage, HistoryTurn};

use crate::gate::Phase;

const BASE_PROMPT: &str = "You are ElderCare, a health assistant for elderly patients.

Your capabilities:
- Fetch and explain health summaries (vitals, medications)
- Book appointments with doctors
- Find the nearest hospitals using live map data
- Send emergency alerts to guardians via SMS
- List upcoming appointments

Rules:
1. Use the available tools to take action. Do not describe what you would do, do it.
2. Be warm, concise and reassuring. The user may be elderly.
3. After a tool runs, explain the result in simple language.
4. Reply in plain sentences. Never output JSON, function syntax or tags.";

const INTAKE_PROMPT: &str = "
INTAKE MODE: the patient wants an appointment but has not yet described their symptoms.
Ask exactly ONE short, caring question about what is bothering them (symptoms, since when, how severe).
Do not call any tool and do not book anything in this reply.";

const EMERGENCY_PROMPT: &str = "
EMERGENCY MODE: the patient may be in acute danger.
First call find_nearest_hospital and send_emergency_alert, then tell the patient help is on the way
and to call local emergency services. Keep the reply short and calm.";

pub fn system_prompt(phase: Phase) -> String {
    match phase {
        Phase::Full => BASE_PROMPT.to_string(),
        Phase::IntakeOnly => format!("{}\n{}", BASE_PROMPT, INTAKE_PROMPT),
        Phase::Emergency => format!("{}\n{}", BASE_PROMPT, EMERGENCY_PROMPT),
    }
}

/// System framing, the prior turns, then the new user message.
pub fn build_messages(phase: Phase, history: &[HistoryTurn], message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(&system_prompt(phase)));
    messages.extend(history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_framing() {
        assert!(system_prompt(Phase::IntakeOnly).contains("Do not call any tool"));
        assert!(system_prompt(Phase::Emergency).contains("find_nearest_hospital"));
        assert!(!system_prompt(Phase::Full).contains("MODE"));
    }

    #[test]
    fn test_message_order() {
        let history = vec![HistoryTurn::new("user", "hi"), HistoryTurn::new("assistant", "hello")];
        let msgs = build_messages(Phase::Full, &history, "what are my meds");
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[2].role, "assistant");
        assert_eq!(msgs[3].text(), "what are my meds");
    }
}
