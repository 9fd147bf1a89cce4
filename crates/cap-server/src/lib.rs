// Library exports for the cap binary and integration tests

pub mod config;
pub mod listener;
pub mod matcher;
pub mod orchestrator;
pub mod request_log;
pub mod response;
pub mod telemetry;

pub use config::{Config, ConfigError, ConfigLoader};
pub use listener::{build_generation, Listener, ListenerState, ListenerSupervisor};
pub use orchestrator::{Orchestrator, OrchestratorState};
pub use request_log::RequestLogPipeline;
