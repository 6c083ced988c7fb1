use eldercare_core::{Config, Paths};

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("eldercare status");
    println!("================");
    println!();

    let config_path = paths.config_file();
    println!(
        "Config:     {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗ (not found, using defaults)" }
    );

    let mut config = Config::load_or_default(&paths)?;
    if dotenv::dotenv().is_ok() {
        println!("Env file:   .env ✓");
    }
    config.apply_env(|key| std::env::var(key).ok());
    if config.store.db_path.is_empty() {
        config.store.db_path = paths.default_db_file().to_string_lossy().to_string();
    }

    println!("Datastore:  {}", config.store.db_path);
    println!(
        "Audit JSONL: {}",
        if config.store.jsonl_audit {
            paths.audit_dir().display().to_string()
        } else {
            "off".to_string()
        }
    );
    println!();

    println!("Model:      {}", config.provider.model);
    println!("Fallback:   {}", config.provider.fallback_model.as_deref().unwrap_or("none"));
    println!("API base:   {}", config.provider.api_base);
    println!(
        "API key:    {}",
        if config.provider.api_key.is_empty() { "✗ missing" } else { "✓ configured" }
    );
    println!();

    println!(
        "SMS:        {}",
        if config.notifications.twilio_configured() {
            "✓ Twilio configured"
        } else {
            "✗ simulated (Twilio credentials missing)"
        }
    );
    let allowed: Vec<String> = config
        .notifications
        .notify_event_types
        .iter()
        .map(|t| t.to_string())
        .collect();
    println!("Notifies:   {}", allowed.join(", "));
    println!("Geo:        {} / {}", config.geo.nominatim_url, config.geo.overpass_url);
    println!();

    println!("Gateway:    {}:{}", config.gateway.host, config.gateway.port);
    if config.scheduler.enabled {
        println!(
            "Scheduler:  refill every {}s, reminders every {}s",
            config.scheduler.refill_interval_secs, config.scheduler.reminder_interval_secs
        );
    } else {
        println!("Scheduler:  disabled");
    }
    println!();

    match config.validate() {
        Ok(()) => println!("Configuration OK"),
        Err(e) => println!("⚠ {}", e),
    }
    Ok(())
}
