mod config;
mod instance_engine;

pub use config::{EngineConfig, PERSIST_BACKOFF_MS_ENV, PERSIST_MAX_ATTEMPTS_ENV, STEP_TIMEOUT_ENV};
pub use instance_engine::{InstanceEngine, RunOutcome};
