//! Building the context against on-disk storage.

use eldercare_agent::AppContext;
use eldercare_core::records::Medication;
use eldercare_core::{Config, EventType, Paths};
use eldercare_storage::JsonlAuditLog;
use tempfile::TempDir;

#[tokio::test]
async fn test_build_with_sqlite_and_jsonl_mirror() {
    let dir = TempDir::new().unwrap();
    let paths = Paths::with_base(dir.path().to_path_buf());

    let mut config = Config::default();
    config.store.db_path = paths.default_db_file().to_string_lossy().to_string();
    config.store.jsonl_audit = true;

    let app = AppContext::build(config, &paths).unwrap();
    assert!(paths.default_db_file().exists());
    assert_eq!(app.notifier.channel(), "simulated");
    assert!(app.bus.registered_agents().contains(&"refill_agent".to_string()));

    app.store
        .upsert_medication(&Medication {
            id: "m1".into(),
            patient_id: "p1".into(),
            name: "Atorvastatin".into(),
            dosage: Some("10mg".into()),
            timing: vec!["21:00".into()],
            current_stock: Some(0),
            stock_threshold: Some(3),
        })
        .unwrap();

    let report = app.refill.sweep().await.unwrap();
    assert_eq!(report.created.len(), 1);

    let mirrored = JsonlAuditLog::new(paths).read_today().unwrap();
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].event_type, EventType::RefillAlert);
}
