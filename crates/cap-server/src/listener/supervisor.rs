//! Lifecycle management for the listeners of one configuration generation.
//!
//! Each listener runs as its own task, so a failure in one never affects the
//! others. Handles are kept in an arena keyed by server identity.

use super::core::Listener;
use super::types::ListenerState;
use crate::config::Config;
use crate::request_log::RequestLogPipeline;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Build the listeners for every server of a configuration. The generation
/// shares one request-log pipeline.
pub fn build_generation(config: Arc<Config>) -> Vec<Listener> {
    let pipeline = Arc::new(RequestLogPipeline::new(config.global_log_config()));
    config
        .servers
        .iter()
        .map(|server| Listener::new(server.clone(), Arc::clone(&config), Arc::clone(&pipeline)))
        .collect()
}

/// A spawned listener task with its control and health channels
pub struct ListenerHandle {
    name: String,
    task: JoinHandle<()>,
    state: watch::Receiver<ListenerState>,
    shutdown: broadcast::Sender<()>,
}

impl ListenerHandle {
    fn spawn(listener: Listener) -> Self {
        let name = listener.server().display_name();
        let (state_tx, state_rx) = watch::channel(ListenerState::Starting);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task_name = name.clone();
        let task = tokio::spawn(async move {
            match listener.run(shutdown_rx, &state_tx).await {
                Ok(()) => {
                    state_tx.send_replace(ListenerState::Stopped);
                }
                Err(e) => {
                    error!("Server {} failed: {}", task_name, e);
                    state_tx.send_replace(ListenerState::Failed(e.to_string()));
                }
            }
        });

        Self {
            name,
            task,
            state: state_rx,
            shutdown: shutdown_tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ListenerState {
        self.state.borrow().clone()
    }

    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    async fn terminate(self) {
        // No receiver left means the task already ended
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!("Server {} panicked: {}", self.name, e);
            }
        }
        debug!("Server {} terminated", self.name);
    }
}

/// Owner of the running generation
#[derive(Default)]
pub struct ListenerSupervisor {
    listeners: BTreeMap<String, ListenerHandle>,
}

impl ListenerSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn every listener; they start concurrently
    pub fn start_all(&mut self, listeners: Vec<Listener>) {
        for listener in listeners {
            let identity = listener.identity();
            let handle = ListenerHandle::spawn(listener);
            if let Some(previous) = self.listeners.insert(identity, handle) {
                error!("Server {} replaced without being terminated", previous.name);
                previous.task.abort();
            }
        }
    }

    /// True while at least one listener task is alive
    pub fn is_running(&self) -> bool {
        self.listeners.values().any(ListenerHandle::is_alive)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Signal every listener and wait until each task has ended
    pub async fn terminate_all(&mut self) {
        let listeners = std::mem::take(&mut self.listeners);
        if listeners.is_empty() {
            return;
        }
        info!("Stopping {} servers", listeners.len());
        for (_, handle) in listeners {
            handle.terminate().await;
        }
    }

    /// Swap in a new generation. The previous one is fully stopped before any
    /// new listener binds.
    pub async fn replace(&mut self, listeners: Vec<Listener>) {
        self.terminate_all().await;
        self.start_all(listeners);
    }

    pub fn state(&self, identity: &str) -> Option<ListenerState> {
        self.listeners.get(identity).map(ListenerHandle::state)
    }

    pub fn states(&self) -> Vec<(String, ListenerState)> {
        self.listeners
            .iter()
            .map(|(identity, handle)| (identity.clone(), handle.state()))
            .collect()
    }

    pub fn local_addr(&self, identity: &str) -> Option<SocketAddr> {
        self.state(identity).and_then(|state| state.local_addr())
    }

    /// Wait until no listener is `Starting`
    pub async fn wait_ready(&self) {
        for handle in self.listeners.values() {
            let mut state = handle.state.clone();
            // A closed channel means the task is gone; nothing more to wait for
            let _ = state.wait_for(|s| *s != ListenerState::Starting).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Arc<Config> {
        Arc::new(Config::from_slice(yaml.as_bytes()).unwrap())
    }

    #[tokio::test]
    async fn test_start_and_terminate() {
        let config = config(
            "servers: [{base_url: 'http://127.0.0.1:0/a'}, {base_url: 'http://127.0.0.1:0/b'}]\nrequest_log_config: {log_console: false}",
        );
        let mut supervisor = ListenerSupervisor::new();
        supervisor.start_all(build_generation(config));
        supervisor.wait_ready().await;

        assert_eq!(supervisor.len(), 2);
        assert!(supervisor.is_running());
        for (_, state) in supervisor.states() {
            assert!(state.is_serving(), "{state}");
        }

        supervisor.terminate_all().await;
        assert!(!supervisor.is_running());
        assert!(supervisor.is_empty());

        // Idempotent
        supervisor.terminate_all().await;
    }

    #[tokio::test]
    async fn test_failed_listener_does_not_affect_sibling() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let config = config(&format!(
            "servers: [{{base_url: 'http://127.0.0.1:{port}'}}, {{base_url: 'http://127.0.0.1:0/ok'}}]\nrequest_log_config: {{log_console: false}}"
        ));
        let mut supervisor = ListenerSupervisor::new();
        supervisor.start_all(build_generation(config));
        supervisor.wait_ready().await;

        match supervisor.state(&format!("127.0.0.1:{port}")) {
            Some(ListenerState::Failed(reason)) => assert!(reason.contains("bind"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(supervisor.state("127.0.0.1:0/ok").unwrap().is_serving());
        assert!(supervisor.is_running());

        supervisor.terminate_all().await;
    }

    #[tokio::test]
    async fn test_https_without_certificates_fails_alone() {
        let config = config(
            "servers: [{base_url: 'https://127.0.0.1:0/tls', ssl_config: {certfile: /nonexistent/cap.pem}}]\nrequest_log_config: {log_console: false}",
        );
        let mut supervisor = ListenerSupervisor::new();
        supervisor.start_all(build_generation(config));
        supervisor.wait_ready().await;

        assert!(matches!(
            supervisor.state("127.0.0.1:0/tls"),
            Some(ListenerState::Failed(_))
        ));
        supervisor.terminate_all().await;
        assert!(!supervisor.is_running());
    }
}
