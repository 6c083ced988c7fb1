use eldercare_core::types::HistoryTurn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How much of the tool catalog a chat turn may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Emergency,
    IntakeOnly,
    Full,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Emergency => "EMERGENCY",
            Phase::IntakeOnly => "INTAKE_ONLY",
            Phase::Full => "FULL",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static EMERGENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(chest pains?|heart attack|can'?t breathe|cannot breathe|trouble breathing|difficulty breathing|shortness of breath|stroke|unconscious|fainted|passed out|seizure|bleeding heavily|severe bleeding|choking|overdose|suicid\w*|collapsed|fell down|i fell|emergency|ambulance)\b",
    )
    .unwrap()
});

static BOOKING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(book\w*|appointments?|schedul\w*|reschedul\w*|see (a|the|my) doctor|consult\w*|check-?ups?)\b",
    )
    .unwrap()
});

const SHORT_MESSAGE_TOKENS: usize = 4;

/// Phase for a chat turn. Emergencies always win. A booking request stays in
/// intake until the patient has answered a question about their symptoms:
/// it must be longer than four words and follow an assistant turn (within
/// the last `window` turns) that ended in a question.
pub fn gate(message: &str, history: &[HistoryTurn], window: usize) -> Phase {
    if EMERGENCY_RE.is_match(message) {
        return Phase::Emergency;
    }

    if !BOOKING_RE.is_match(message) {
        return Phase::Full;
    }

    let short = message.split_whitespace().count() <= SHORT_MESSAGE_TOKENS;
    let answered_question = history
        .iter()
        .rev()
        .take(window)
        .find(|t| t.is_assistant())
        .map(|t| t.content.trim_end().ends_with('?'))
        .unwrap_or(false);

    if short || !answered_question {
        Phase::IntakeOnly
    } else {
        Phase::Full
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: &str, content: &str) -> HistoryTurn {
        HistoryTurn::new(role, content)
    }

    #[test]
    fn test_emergency_regardless_of_history() {
        assert_eq!(gate("I have chest pain", &[], 4), Phase::Emergency);
        let history = vec![turn("assistant", "What brings you in today?")];
        assert_eq!(gate("I HAVE CHEST PAIN and want to book", &history, 4), Phase::Emergency);
        assert_eq!(gate("my husband collapsed", &history, 4), Phase::Emergency);
    }

    #[test]
    fn test_short_booking_is_intake() {
        assert_eq!(gate("book appointment", &[], 4), Phase::IntakeOnly);
        let history = vec![turn("assistant", "What symptoms do you have?")];
        assert_eq!(gate("book appointment please", &history, 4), Phase::IntakeOnly);
    }

    #[test]
    fn test_booking_without_prior_question_is_intake() {
        let history = vec![turn("assistant", "Your appointment list is empty.")];
        assert_eq!(
            gate("I would like to schedule a visit with my cardiologist", &history, 4),
            Phase::IntakeOnly
        );
    }

    #[test]
    fn test_booking_after_answered_question_is_full() {
        let history = vec![
            turn("user", "I need an appointment"),
            turn("assistant", "Of course. What symptoms are you having?"),
        ];
        assert_eq!(
            gate("my knee hurts, worse after walking, please book an appointment", &history, 4),
            Phase::Full
        );
    }

    #[test]
    fn test_symptom_answer_is_full() {
        let history = vec![turn("assistant", "Where does it hurt?")];
        assert_eq!(gate("my knee hurts, worse after walking", &history, 4), Phase::Full);
        assert_eq!(gate("what are my medications", &[], 4), Phase::Full);
    }

    #[test]
    fn test_question_outside_window_does_not_count() {
        let history = vec![
            turn("assistant", "What symptoms are you having?"),
            turn("user", "a"),
            turn("user", "b"),
            turn("user", "c"),
            turn("user", "d"),
        ];
        assert_eq!(
            gate("please book an appointment for my back pain tomorrow", &history, 4),
            Phase::IntakeOnly
        );
        assert_eq!(
            gate("please book an appointment for my back pain tomorrow", &history, 5),
            Phase::Full
        );
    }

    #[test]
    fn test_phase_wire_names() {
        assert_eq!(serde_json::to_value(Phase::IntakeOnly).unwrap(), "INTAKE_ONLY");
        assert_eq!(Phase::Emergency.to_string(), "EMERGENCY");
    }
}
