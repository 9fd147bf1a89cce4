//! Top-level control loop: start, poll, reload, shut down.

use crate::config::{Config, ConfigLoader};
use crate::listener::{build_generation, ListenerState, ListenerSupervisor};
use anyhow::Context;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Init,
    Running,
    Reloading,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestratorState::Init => "init",
            OrchestratorState::Running => "running",
            OrchestratorState::Reloading => "reloading",
            OrchestratorState::ShuttingDown => "shutting down",
            OrchestratorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

pub struct Orchestrator {
    loader: ConfigLoader,
    supervisor: ListenerSupervisor,
    config: Option<Arc<Config>>,
    state: OrchestratorState,
}

impl Orchestrator {
    pub fn new(loader: ConfigLoader) -> Self {
        Self {
            loader,
            supervisor: ListenerSupervisor::new(),
            config: None,
            state: OrchestratorState::Init,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn supervisor(&self) -> &ListenerSupervisor {
        &self.supervisor
    }

    /// Configuration of the running generation
    pub fn config(&self) -> Option<&Arc<Config>> {
        self.config.as_ref()
    }

    fn transition(&mut self, next: OrchestratorState) {
        debug!("Orchestrator {} -> {}", self.state, next);
        self.state = next;
    }

    /// Load the initial configuration and start its listeners.
    /// An invalid initial configuration is fatal.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        let bytes = self.loader.load()?;
        let config = Config::from_slice(&bytes).with_context(|| {
            format!(
                "Invalid configuration in '{}'",
                self.loader.path().display()
            )
        })?;
        info!(
            "Configuration loaded from '{}'",
            self.loader.path().display()
        );

        self.launch(Arc::new(config)).await;
        self.transition(OrchestratorState::Running);
        Ok(())
    }

    async fn launch(&mut self, config: Arc<Config>) {
        // Rule bodies backed by files are read while compiling
        let compile = {
            let config = Arc::clone(&config);
            tokio::task::spawn_blocking(move || build_generation(config))
        };
        let generation = match compile.await {
            Ok(generation) => generation,
            Err(e) => {
                error!("Failed to compile server rules: {}", e);
                return;
            }
        };
        self.supervisor.replace(generation).await;
        self.supervisor.wait_ready().await;
        self.config = Some(config);
        self.report_listeners();
    }

    fn report_listeners(&self) {
        let states = self.supervisor.states();
        for (identity, state) in &states {
            match state {
                ListenerState::Failed(reason) => error!("Server {} is down: {}", identity, reason),
                state => debug!("Server {} is {}", identity, state),
            }
        }
        if !states.iter().any(|(_, state)| state.is_serving()) {
            warn!("No server is running. Waiting for configuration changes");
        }
    }

    /// One polling step: re-read the file when due and reload on change
    pub async fn tick(&mut self) {
        if let Err(e) = self.loader.poll() {
            error!("{}", e);
            return;
        }
        if self.loader.consume_dirty() {
            self.reload().await;
        }
    }

    /// Validate the cached file content and swap generations. An invalid
    /// configuration leaves the running generation in place.
    pub async fn reload(&mut self) {
        self.transition(OrchestratorState::Reloading);
        info!(
            "Configuration file '{}' changed, reloading",
            self.loader.path().display()
        );

        let decoded = self
            .loader
            .load()
            .and_then(|bytes| Config::from_slice(&bytes));
        match decoded {
            Ok(config) => {
                self.launch(Arc::new(config)).await;
                info!("Configuration reloaded");
            }
            Err(e) => error!("{}. Current configuration is kept", e),
        }

        self.transition(OrchestratorState::Running);
    }

    /// Stop every listener
    pub async fn shutdown(&mut self) {
        self.transition(OrchestratorState::ShuttingDown);
        self.supervisor.terminate_all().await;
        self.transition(OrchestratorState::Stopped);
        info!("Stopped");
    }

    /// Run until `shutdown` completes. Startup errors are returned after the
    /// orchestrator has stopped.
    pub async fn run_until<F>(&mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Err(e) = self.start().await {
            self.shutdown().await;
            return Err(e);
        }

        let mut ticker = tokio::time::interval(self.loader.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Run until Ctrl-C
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}
