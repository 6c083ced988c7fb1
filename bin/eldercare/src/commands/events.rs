use eldercare_core::EventType;
use eldercare_storage::EventQuery;

use super::load_context;

pub async fn run(patient_id: Option<String>, event_type: Option<String>, limit: usize) -> anyhow::Result<()> {
    let event_type = event_type.map(|t| t.parse::<EventType>()).transpose()?;
    let ctx = load_context()?;

    let events = ctx.store.recent_events(&EventQuery {
        patient_id,
        event_type,
        limit,
    })?;

    if events.is_empty() {
        println!("No events recorded.");
        return Ok(());
    }

    for e in &events {
        println!(
            "{}  {:<26} {:<24} -> {:<24} {}",
            e.created_at.format("%Y-%m-%d %H:%M:%S"),
            e.event_type,
            e.source_agent,
            e.target_agent,
            e.patient_id
        );
    }
    println!();
    println!("{} event(s)", events.len());
    Ok(())
}
