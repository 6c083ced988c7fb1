use reqwest::Client;
use std::time::Duration;
use tracing::warn;

/// Build a reqwest client with explicit connect and overall timeouts.
pub fn build_http_client(connect_timeout: Duration, timeout: Duration, user_agent: Option<&str>) -> Client {
    let mut builder = Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout);
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua.to_string());
    }

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client, using default");
        Client::new()
    })
}
