//! Orchestrator: starts, resets and stops the four simulators as one unit.
//!
//! `stopped --start--> running --stop--> stopped`, with `reset` as a
//! running-to-running transition. Each enabled subsystem registers a
//! cleanup hook at start; `stop` cancels the shared shutdown token and runs
//! the hooks in reverse registration order, logging failures instead of
//! propagating them.

mod config;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

pub use config::{
    AiProvidersConfig, DatabaseConfig, GeneralConfig, HttpConfig, MockServerConfig,
    WebsocketConfig,
};

use crate::broker::SessionBroker;
use crate::http::HttpBoundary;
use crate::infrastructure::clock::{SeededRandom, Suspension, SystemClock, SystemRandom};
use crate::infrastructure::ports::{
    ClockPort, ConfigurationError, LifecycleError, MockServerError, RandomPort,
};
use crate::providers::ProviderRegistry;
use crate::store::DataStore;

type CleanupFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

struct CleanupHook {
    name: &'static str,
    run: CleanupFn,
}

// =============================================================================
// Service Bundle
// =============================================================================

/// Live handles to the running simulators.
///
/// Only exists while the orchestrator is running. A disabled subsystem's
/// accessor fails with `SubsystemDisabled`.
#[derive(Clone)]
pub struct ServiceBundle {
    providers: Option<Arc<ProviderRegistry>>,
    broker: Option<Arc<SessionBroker>>,
    database: Option<Arc<DataStore>>,
    http: Option<Arc<HttpBoundary>>,
    clock: Arc<dyn ClockPort>,
    config: MockServerConfig,
}

impl ServiceBundle {
    pub fn providers(&self) -> Result<&Arc<ProviderRegistry>, LifecycleError> {
        enabled(&self.providers, "AI provider")
    }

    pub fn broker(&self) -> Result<&Arc<SessionBroker>, LifecycleError> {
        enabled(&self.broker, "WebSocket")
    }

    pub fn database(&self) -> Result<&Arc<DataStore>, LifecycleError> {
        enabled(&self.database, "Database")
    }

    pub fn http(&self) -> Result<&Arc<HttpBoundary>, LifecycleError> {
        enabled(&self.http, "HTTP")
    }

    pub fn clock(&self) -> &Arc<dyn ClockPort> {
        &self.clock
    }

    pub fn config(&self) -> &MockServerConfig {
        &self.config
    }
}

fn enabled<'a, T>(
    handle: &'a Option<Arc<T>>,
    subsystem: &'static str,
) -> Result<&'a Arc<T>, LifecycleError> {
    handle
        .as_ref()
        .ok_or(LifecycleError::SubsystemDisabled { subsystem })
}

impl std::fmt::Debug for ServiceBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBundle")
            .field("providers", &self.providers.is_some())
            .field("broker", &self.broker.is_some())
            .field("database", &self.database.is_some())
            .field("http", &self.http.is_some())
            .finish()
    }
}

// =============================================================================
// Mock Server
// =============================================================================

struct Running {
    bundle: ServiceBundle,
    shutdown: CancellationToken,
    cleanups: Vec<CleanupHook>,
}

/// The integrated mock server.
pub struct MockServer {
    config: MockServerConfig,
    clock: Arc<dyn ClockPort>,
    random: Option<Arc<dyn RandomPort>>,
    running: Option<Running>,
}

impl MockServer {
    pub fn new(config: MockServerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock::new()),
            random: None,
            running: None,
        }
    }

    /// Drive every simulator from `clock` instead of wall time.
    pub fn with_clock(mut self, clock: Arc<dyn ClockPort>) -> Self {
        self.clock = clock;
        self
    }

    /// Draw every random decision from `random`, overriding `general.randomSeed`.
    pub fn with_random(mut self, random: Arc<dyn RandomPort>) -> Self {
        self.random = Some(random);
        self
    }

    pub fn config(&self) -> &MockServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start every enabled subsystem and return the bundle.
    ///
    /// Starting an already running server logs a warning and returns the
    /// existing bundle.
    pub fn start(&mut self) -> Result<ServiceBundle, MockServerError> {
        if let Some(running) = &self.running {
            tracing::warn!("Mock server already running, returning existing services");
            return Ok(running.bundle.clone());
        }
        self.config.validate()?;
        if self.config.general.enable_logging {
            crate::logging::init_test_logging();
        }

        let shutdown = CancellationToken::new();
        let mut cleanups = Vec::new();
        match self.start_subsystems(&shutdown, &mut cleanups) {
            Ok(bundle) => {
                tracing::info!(
                    providers = bundle.providers.is_some(),
                    broker = bundle.broker.is_some(),
                    database = bundle.database.is_some(),
                    http = bundle.http.is_some(),
                    "Mock server started"
                );
                self.running = Some(Running {
                    bundle: bundle.clone(),
                    shutdown,
                    cleanups,
                });
                Ok(bundle)
            }
            Err(e) => {
                tracing::error!(error = %e, "Mock server failed to start");
                shutdown.cancel();
                run_cleanups(cleanups);
                Err(e)
            }
        }
    }

    fn start_subsystems(
        &self,
        shutdown: &CancellationToken,
        cleanups: &mut Vec<CleanupHook>,
    ) -> Result<ServiceBundle, MockServerError> {
        let config = &self.config;
        let random = self.random_source();
        let suspension = || Suspension::new(Arc::clone(&self.clock), shutdown.child_token());

        let providers = if config.ai_providers.enable_mocks {
            let registry = Arc::new(ProviderRegistry::new(
                config.scenario_config(),
                suspension(),
            ));
            let hook = Arc::clone(&registry);
            cleanups.push(CleanupHook {
                name: "providers",
                run: Box::new(move || {
                    hook.clear_registry();
                    Ok(())
                }),
            });
            Some(registry)
        } else {
            None
        };

        let broker = if config.websocket.enable_mocks {
            let broker = Arc::new(SessionBroker::new(
                config.broker_settings(),
                suspension(),
                Arc::clone(&random),
            ));
            let hook = Arc::clone(&broker);
            cleanups.push(CleanupHook {
                name: "websocket",
                run: Box::new(move || {
                    hook.reset_clients();
                    Ok(())
                }),
            });
            Some(broker)
        } else {
            None
        };

        let database = if config.database.enable_mocks {
            let store = Arc::new(DataStore::setup(
                config.store_options(),
                Arc::clone(&self.clock),
                Arc::clone(&random),
            )?);
            let hook = Arc::clone(&store);
            cleanups.push(CleanupHook {
                name: "database",
                run: Box::new(move || {
                    hook.clear_all_data();
                    Ok(())
                }),
            });
            Some(store)
        } else {
            None
        };

        let http = if config.http.enable_mocks {
            let boundary = Arc::new(HttpBoundary::setup(
                config.http_settings(),
                suspension(),
                Arc::clone(&random),
            ));
            let hook = Arc::clone(&boundary);
            cleanups.push(CleanupHook {
                name: "http",
                run: Box::new(move || {
                    hook.teardown();
                    anyhow::ensure!(!hook.is_installed(), "HTTP interception still installed");
                    Ok(())
                }),
            });
            Some(boundary)
        } else {
            None
        };

        Ok(ServiceBundle {
            providers,
            broker,
            database,
            http,
            clock: Arc::clone(&self.clock),
            config: config.clone(),
        })
    }

    fn random_source(&self) -> Arc<dyn RandomPort> {
        match (&self.random, self.config.general.random_seed) {
            (Some(random), _) => Arc::clone(random),
            (None, Some(seed)) => Arc::new(SeededRandom::new(seed)),
            (None, None) => Arc::new(SystemRandom::new()),
        }
    }

    /// Register an extra cleanup hook, run before the ones already registered.
    pub fn on_stop<F>(&mut self, name: &'static str, hook: F) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let running = self
            .running
            .as_mut()
            .ok_or(LifecycleError::NotRunning { operation: "on_stop" })?;
        running.cleanups.push(CleanupHook {
            name,
            run: Box::new(hook),
        });
        Ok(())
    }

    /// Tear everything down. Pending delays are cancelled first, then the
    /// cleanup hooks run last-registered first. Stopping a stopped server
    /// does nothing.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            tracing::debug!("Mock server already stopped");
            return;
        };
        running.shutdown.cancel();
        run_cleanups(running.cleanups);
        tracing::info!("Mock server stopped");
    }

    /// Back to a clean running state without restarting.
    ///
    /// Re-applies the default provider scenario, drops every broker client,
    /// clears (and reseeds, if configured) the data store and restores the
    /// default HTTP routes. The configuration is left untouched.
    pub fn reset(&mut self) -> Result<(), MockServerError> {
        let running = self
            .running
            .as_ref()
            .ok_or(LifecycleError::NotRunning { operation: "reset" })?;
        let bundle = &running.bundle;

        if let Some(providers) = &bundle.providers {
            providers.reset_scenarios();
        }
        if let Some(broker) = &bundle.broker {
            broker.reset_clients();
        }
        if let Some(database) = &bundle.database {
            database.clear_all_data();
            if self.config.database.seed_test_data {
                database.seed_test_data()?;
            }
        }
        if let Some(http) = &bundle.http {
            http.reset_mocks();
        }
        tracing::info!("Mock server reset");
        Ok(())
    }

    /// Reset when `general.resetBetweenTests` is set; call at the top of each test.
    pub fn before_each(&mut self) -> Result<(), MockServerError> {
        if self.is_running() && self.config.general.reset_between_tests {
            self.reset()?;
        }
        Ok(())
    }

    /// Replace the configuration. Only allowed while stopped.
    pub fn update_config(&mut self, config: MockServerConfig) -> Result<(), ConfigurationError> {
        if self.is_running() {
            tracing::warn!("Ignoring configuration update while the mock server is running");
            return Err(ConfigurationError::UpdateWhileRunning);
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    fn bundle(&self, operation: &'static str) -> Result<&ServiceBundle, LifecycleError> {
        self.running
            .as_ref()
            .map(|running| &running.bundle)
            .ok_or(LifecycleError::NotRunning { operation })
    }

    pub fn services(&self) -> Result<ServiceBundle, LifecycleError> {
        self.bundle("services").cloned()
    }

    pub fn providers(&self) -> Result<Arc<ProviderRegistry>, LifecycleError> {
        self.bundle("providers")?.providers().cloned()
    }

    pub fn broker(&self) -> Result<Arc<SessionBroker>, LifecycleError> {
        self.bundle("broker")?.broker().cloned()
    }

    pub fn database(&self) -> Result<Arc<DataStore>, LifecycleError> {
        self.bundle("database")?.database().cloned()
    }

    pub fn http(&self) -> Result<Arc<HttpBoundary>, LifecycleError> {
        self.bundle("http")?.http().cloned()
    }
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new(MockServerConfig::default())
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if self.is_running() {
            tracing::debug!("Mock server dropped while running");
            self.stop();
        }
    }
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockServer")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run_cleanups(cleanups: Vec<CleanupHook>) {
    for hook in cleanups.into_iter().rev() {
        match (hook.run)() {
            Ok(()) => tracing::debug!(hook = hook.name, "Cleanup completed"),
            Err(e) => tracing::error!(hook = hook.name, error = %e, "Cleanup failed"),
        }
    }
}
