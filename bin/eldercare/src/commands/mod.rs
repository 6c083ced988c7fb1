pub mod chat;
pub mod events;
pub mod gateway;
pub mod status;
pub mod sweep;

use eldercare_agent::AppContext;
use eldercare_core::{Config, Paths};

/// Resolve configuration and build the shared context. Configuration
/// problems are fatal here, before anything is served.
pub(crate) fn load_context() -> anyhow::Result<AppContext> {
    let paths = Paths::new();
    let config = Config::resolve(&paths)?;
    Ok(AppContext::build(config, &paths)?)
}
