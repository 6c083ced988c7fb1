//! Chat loop tests: phase gating, the iteration bound and provider fallback.

mod common;

use common::*;
use eldercare_agent::{ChatRequest, Phase};
use eldercare_core::types::HistoryTurn;
use eldercare_core::Error;
use eldercare_providers::Provider;
use eldercare_storage::Datastore;
use serde_json::json;
use std::sync::Arc;

fn request(message: &str, history: Vec<HistoryTurn>) -> ChatRequest {
    ChatRequest {
        patient_id: "p1".to_string(),
        message: message.to_string(),
        history,
        location: None,
    }
}

#[tokio::test]
async fn test_tool_then_answer() {
    let h = harness(MockProvider::new(vec![
        tool_call("get_medications", json!({})),
        text("You take Amlodipine 5mg every morning."),
    ]));

    let reply = h.app.orchestrator.chat(&request("what are my medications", vec![])).await.unwrap();
    assert_eq!(reply.phase, Phase::Full);
    assert_eq!(reply.response, "You take Amlodipine 5mg every morning.");
    assert_eq!(reply.actions_taken.len(), 1);
    assert_eq!(reply.actions_taken[0].tool, "get_medications");
    assert_eq!(reply.actions_taken[0].result["count"], 1);
    assert_eq!(reply.actions_taken[0].result["medications"][0]["low_stock"], true);
    assert_eq!(h.provider.calls(), 2);
}

#[tokio::test]
async fn test_loop_stops_at_max_iterations() {
    let script = (0..10).map(|_| tool_call("get_health_summary", json!({}))).collect();
    let h = harness(MockProvider::new(script));

    let reply = h.app.orchestrator.chat(&request("how am I doing", vec![])).await.unwrap();
    assert_eq!(reply.response, "I've completed the requested actions. Please check the results below.");
    assert_eq!(reply.actions_taken.len(), 5);
    assert_eq!(h.provider.calls(), 5);
}

#[tokio::test]
async fn test_intake_blocks_booking() {
    let h = harness(MockProvider::new(vec![
        tool_call("book_appointment", json!({"date": "2030-01-02", "time": "10:00"})),
        text("Of course. What symptoms are you having?"),
    ]));

    let reply = h.app.orchestrator.chat(&request("book appointment", vec![])).await.unwrap();
    assert_eq!(reply.phase, Phase::IntakeOnly);
    assert_eq!(reply.response, "Of course. What symptoms are you having?");
    assert_eq!(reply.actions_taken.len(), 1);
    assert!(reply.actions_taken[0].result["error"]
        .as_str()
        .unwrap()
        .contains("not available"));
    assert!(h.store.appointments("p1").unwrap().is_empty());

    let allowed = h.app.orchestrator.allowed_tools(Phase::IntakeOnly);
    assert!(!allowed.contains(&"book_appointment".to_string()));
    assert!(!allowed.contains(&"send_emergency_alert".to_string()));
    assert!(allowed.contains(&"get_health_summary".to_string()));
}

#[tokio::test]
async fn test_booking_after_symptoms_answered() {
    let h = harness(MockProvider::new(vec![
        tool_call(
            "book_appointment",
            json!({"date": "2030-01-02", "time": "10:00", "reason": "chest tightness on stairs"}),
        ),
        text("You're booked with Dr. Mehta on 2 January at 10:00."),
    ]));
    let history = vec![
        HistoryTurn::new("user", "I need an appointment"),
        HistoryTurn::new("assistant", "Of course. What symptoms are you having?"),
    ];

    let reply = h
        .app
        .orchestrator
        .chat(&request("tightness when I climb stairs, please book the appointment", history))
        .await
        .unwrap();
    assert_eq!(reply.phase, Phase::Full);
    assert_eq!(reply.actions_taken[0].result["success"], true);

    let booked = h.store.appointments("p1").unwrap();
    assert_eq!(booked.len(), 1);
    assert_eq!(booked[0].doctor_name, "Dr. Mehta");
    assert_eq!(booked[0].time, "10:00");
    assert_eq!(booked[0].status, "pending");
}

#[tokio::test]
async fn test_emergency_alert_reaches_guardian() {
    let h = harness(MockProvider::new(vec![
        tool_call("send_emergency_alert", json!({"message": "reports chest pain"})),
        text("I've alerted your family. Please call emergency services now."),
    ]));

    let reply = h.app.orchestrator.chat(&request("I have chest pain", vec![])).await.unwrap();
    assert_eq!(reply.phase, Phase::Emergency);
    let sent = h.notifier.messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, GUARDIAN_PHONE);
}

#[tokio::test]
async fn test_unknown_tool_is_reported_to_model() {
    let h = harness(MockProvider::new(vec![
        tool_call("launch_rocket", json!({})),
        text("Sorry, I can't do that."),
    ]));

    let reply = h.app.orchestrator.chat(&request("launch a rocket", vec![])).await.unwrap();
    assert_eq!(reply.response, "Sorry, I can't do that.");
    assert!(reply.actions_taken[0].result["error"].is_string());
}

#[tokio::test]
async fn test_reply_is_sanitized() {
    let h = harness(MockProvider::new(vec![text(
        "<|python_tag|>Your blood pressure looks fine. <function=get_health_summary>{}</function>",
    )]));

    let reply = h.app.orchestrator.chat(&request("how is my blood pressure", vec![])).await.unwrap();
    assert_eq!(reply.response, "Your blood pressure looks fine.");
}

#[tokio::test]
async fn test_transient_error_switches_to_fallback() {
    let fallback = Arc::new(MockProvider::new(vec![text("Hello from the backup model.")]));
    let h = harness_with(
        seeded_store(),
        Vec::new(),
        MockProvider::new(vec![Err(Error::Transient("429 Too Many Requests".to_string()))]),
        Some(fallback.clone() as Arc<dyn Provider>),
    );

    let reply = h.app.orchestrator.chat(&request("hello", vec![])).await.unwrap();
    assert_eq!(reply.response, "Hello from the backup model.");
    assert_eq!(h.provider.calls(), 1);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn test_transient_error_without_fallback_is_busy() {
    let h = harness(MockProvider::new(vec![Err(Error::Transient("503".to_string()))]));

    let reply = h.app.orchestrator.chat(&request("hello", vec![])).await.unwrap();
    assert_eq!(reply.response, "I'm experiencing high demand. Please wait a few seconds and try again.");
    assert!(reply.actions_taken.is_empty());
}

#[tokio::test]
async fn test_missing_fields_are_rejected() {
    let h = harness(MockProvider::silent());

    let mut req = request("hello", vec![]);
    req.patient_id = "  ".to_string();
    assert!(matches!(h.app.orchestrator.chat(&req).await, Err(Error::Validation(_))));

    let req = request("", vec![]);
    assert!(matches!(h.app.orchestrator.chat(&req).await, Err(Error::Validation(_))));
    assert_eq!(h.provider.calls(), 0);
}
