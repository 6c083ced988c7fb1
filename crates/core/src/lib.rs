pub mod config;
pub mod error;
pub mod event;
pub mod paths;
pub mod records;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{agents, Event, EventType};
pub use paths::Paths;
