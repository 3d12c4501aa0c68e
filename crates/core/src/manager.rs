//! Lifecycle management for hosted virtual services.
//!
//! The [`ServiceManager`] owns the running set: one entry per started service,
//! holding the instance and its endpoint. Every operation that walks the
//! running set handles each service on its own, so one misbehaving service
//! never prevents the others from starting, stopping or reporting.

use crate::config::{Config, Timeouts};
use crate::contract::VirtualService;
use crate::endpoint::{EndpointExposer, EndpointHandle, TcpExposer};
use crate::factory::ServiceFactory;
use crate::registry::{fold_name, RegistrySnapshot, RegistryStore, ServiceDescriptor};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Where a named service is in its lifecycle, as seen between commands.
///
/// Starting and stopping happen inside a single manager call, so only the
/// settled states are observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Absent,
    Running,
    /// Running, but the instance has recorded a fault.
    Error,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Absent => "absent",
            LifecycleState::Running => "running",
            LifecycleState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Result of a start, stop or reset for one service.
#[derive(Debug)]
pub enum Outcome {
    Started {
        name: String,
        address: Option<SocketAddr>,
        /// Properties that could not be applied
        warnings: Vec<Error>,
    },
    AlreadyRunning {
        name: String,
    },
    /// No descriptor with this name in the registry.
    NotFound {
        name: String,
    },
    Stopped {
        name: String,
        /// Stop hook failures and close timeouts
        warnings: Vec<Error>,
    },
    /// No running service with this name.
    NotRunning {
        name: String,
    },
    Reset {
        name: String,
    },
    Failed {
        name: String,
        error: Error,
    },
}

impl Outcome {
    pub fn name(&self) -> &str {
        match self {
            Outcome::Started { name, .. }
            | Outcome::AlreadyRunning { name }
            | Outcome::NotFound { name }
            | Outcome::Stopped { name, .. }
            | Outcome::NotRunning { name }
            | Outcome::Reset { name }
            | Outcome::Failed { name, .. } => name,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }

    /// Non-fatal problems attached to a successful outcome.
    pub fn warnings(&self) -> &[Error] {
        match self {
            Outcome::Started { warnings, .. } | Outcome::Stopped { warnings, .. } => warnings,
            _ => &[],
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Started {
                name,
                address: Some(address),
                ..
            } => write!(f, "{} started on http://{}", name, address),
            Outcome::Started { name, .. } => write!(f, "{} started", name),
            Outcome::AlreadyRunning { name } => write!(f, "{} is already started", name),
            Outcome::NotFound { name } => {
                write!(f, "{} was not found in the registry", name)
            }
            Outcome::Stopped { name, .. } => write!(f, "{} stopped", name),
            Outcome::NotRunning { name } => write!(f, "{} is not running", name),
            Outcome::Reset { name } => write!(f, "{} error state cleared", name),
            Outcome::Failed { name, error } => write!(f, "{} failed: {}", name, error),
        }
    }
}

/// Status line for one running service.
#[derive(Debug)]
pub struct ServiceReport {
    pub name: String,
    pub state: LifecycleState,
    /// Report text, or the reason the report could not be produced
    pub result: std::result::Result<String, String>,
}

/// Summary of a running service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningInfo {
    pub name: String,
    pub kind: String,
    pub address: Option<SocketAddr>,
    pub started_at: SystemTime,
}

struct RunningService {
    name: String,
    instance: Arc<dyn VirtualService>,
    endpoint: EndpointHandle,
    started_at: SystemTime,
}

impl RunningService {
    fn state(&self) -> LifecycleState {
        if self.instance.last_error().is_some() {
            LifecycleState::Error
        } else {
            LifecycleState::Running
        }
    }
}

/// Starts, stops and reports on the services named in the registry.
///
/// Operations take `&mut self`: the manager is owned by a single task that
/// processes one command at a time, which keeps the already-running check
/// and the insert that follows it atomic.
pub struct ServiceManager {
    config_dir: PathBuf,
    store: Option<RegistryStore>,
    factory: ServiceFactory,
    exposer: Arc<dyn EndpointExposer>,
    timeouts: Timeouts,
    running: BTreeMap<String, RunningService>,
}

impl ServiceManager {
    pub fn new(config: &Config, factory: ServiceFactory, exposer: Arc<dyn EndpointExposer>) -> Self {
        Self {
            config_dir: config.config_dir.clone(),
            store: None,
            factory,
            exposer,
            timeouts: config.timeouts,
            running: BTreeMap::new(),
        }
    }

    /// A manager with the built-in services exposed over TCP.
    pub fn from_config(config: &Config) -> Self {
        let exposer = TcpExposer::new(config.bind_host.clone()).with_report_timeout(config.timeouts.hook);
        Self::new(config, ServiceFactory::with_builtins(), Arc::new(exposer))
    }

    /// Prepare the registry for reading. Safe to call more than once.
    pub fn initialize(&mut self) -> Result<()> {
        if self.store.is_none() {
            self.store = Some(RegistryStore::open(&self.config_dir)?);
        }
        Ok(())
    }

    /// Start every registered service that is not already running.
    ///
    /// Only a registry load failure is returned as an error; per-service
    /// failures are reported in the outcomes.
    pub async fn start_services(&mut self) -> Result<Vec<Outcome>> {
        let snapshot = self.load_registry()?;
        let mut outcomes = Vec::with_capacity(snapshot.len());

        for descriptor in snapshot.iter() {
            outcomes.push(self.start_descriptor(descriptor).await);
        }

        Ok(outcomes)
    }

    /// Start the service registered under `name` (case-insensitive).
    pub async fn start_service(&mut self, name: &str) -> Result<Outcome> {
        let snapshot = self.load_registry()?;

        match snapshot.get(name) {
            Some(descriptor) => Ok(self.start_descriptor(descriptor).await),
            None => {
                tracing::info!("Service '{}' was not found in the registry", name);
                Ok(Outcome::NotFound {
                    name: name.to_string(),
                })
            }
        }
    }

    /// Stop every running service. The running set is empty afterwards.
    pub async fn stop_services(&mut self) -> Vec<Outcome> {
        let running = std::mem::take(&mut self.running);
        let mut outcomes = Vec::with_capacity(running.len());

        for (_, entry) in running {
            outcomes.push(self.stop_entry(entry).await);
        }

        outcomes
    }

    /// Stop the running service matching `name` (case-insensitive).
    pub async fn stop_service(&mut self, name: &str) -> Outcome {
        match self.running.remove(&key(name)) {
            Some(entry) => self.stop_entry(entry).await,
            None => {
                tracing::info!("Service '{}' is not running", name);
                Outcome::NotRunning {
                    name: name.to_string(),
                }
            }
        }
    }

    /// Ask every running service for its report.
    pub async fn report_services(&self) -> Vec<ServiceReport> {
        let mut reports = Vec::with_capacity(self.running.len());

        for entry in self.running.values() {
            let result = invoke(&entry.instance, "report", self.timeouts.hook, |service| async move {
                service.report().await
            })
            .await
            .map_err(|e| {
                tracing::warn!("Report of '{}' failed: {}", entry.name, e);
                e.to_string()
            });

            reports.push(ServiceReport {
                name: entry.name.clone(),
                state: entry.state(),
                result,
            });
        }

        reports
    }

    /// Clear the recorded error of a running service.
    pub fn reset_error(&mut self, name: &str) -> Outcome {
        match self.running.get(&key(name)) {
            Some(entry) => {
                entry.instance.reset_error();
                Outcome::Reset {
                    name: entry.name.clone(),
                }
            }
            None => Outcome::NotRunning {
                name: name.to_string(),
            },
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.contains_key(&key(name))
    }

    pub fn lifecycle(&self, name: &str) -> LifecycleState {
        self.running
            .get(&key(name))
            .map(RunningService::state)
            .unwrap_or(LifecycleState::Absent)
    }

    /// Running services in name order.
    pub fn running(&self) -> Vec<RunningInfo> {
        self.running
            .values()
            .map(|entry| RunningInfo {
                name: entry.name.clone(),
                kind: entry.instance.kind().to_string(),
                address: entry.endpoint.address(),
                started_at: entry.started_at,
            })
            .collect()
    }

    fn load_registry(&mut self) -> Result<RegistrySnapshot> {
        self.initialize()?;
        match &self.store {
            Some(store) => store.load(),
            None => Err(Error::Storage("registry is not initialized".to_string())),
        }
    }

    async fn start_descriptor(&mut self, descriptor: &ServiceDescriptor) -> Outcome {
        let name = descriptor.name.clone();
        let slot = key(&name);

        if self.running.contains_key(&slot) {
            tracing::info!("Service '{}' is already started", name);
            return Outcome::AlreadyRunning { name };
        }

        tracing::info!("Starting service '{}'", name);

        let created = match self.factory.create(descriptor) {
            Ok(created) => created,
            Err(error) => {
                tracing::warn!("{}", error);
                return Outcome::Failed { name, error };
            }
        };
        let instance: Arc<dyn VirtualService> = Arc::from(created.instance);

        if let Err(error) = invoke(&instance, "start", self.timeouts.hook, |service| async move {
            service.start().await
        })
        .await
        {
            tracing::warn!("Service '{}' did not start: {}", name, error);
            return Outcome::Failed { name, error };
        }

        let open = self.exposer.open(instance.clone(), self.timeouts.open);
        let opened = match tokio::time::timeout(self.timeouts.open, open).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                format!("Opening endpoint of '{}'", name),
                self.timeouts.open,
            )),
        };
        let endpoint = match opened {
            Ok(endpoint) => endpoint,
            Err(error) => {
                tracing::warn!("Endpoint for '{}' did not open: {}", name, error);
                if let Err(e) = invoke(&instance, "stop", self.timeouts.hook, |service| async move {
                    service.stop().await
                })
                .await
                {
                    tracing::warn!("Unwinding '{}' failed: {}", name, e);
                }
                return Outcome::Failed { name, error };
            }
        };

        let address = endpoint.address();
        self.running.insert(
            slot,
            RunningService {
                name: name.clone(),
                instance,
                endpoint,
                started_at: SystemTime::now(),
            },
        );

        tracing::info!("Service '{}' started successfully", name);
        Outcome::Started {
            name,
            address,
            warnings: created.warnings,
        }
    }

    async fn stop_entry(&self, entry: RunningService) -> Outcome {
        let RunningService {
            name,
            instance,
            endpoint,
            ..
        } = entry;
        let mut warnings = Vec::new();

        tracing::info!("Stopping service '{}'", name);

        if let Err(error) = invoke(&instance, "stop", self.timeouts.hook, |service| async move {
            service.stop().await
        })
        .await
        {
            tracing::warn!("Stop hook of '{}' failed: {}", name, error);
            warnings.push(error);
        }

        let close = self.exposer.close(endpoint, self.timeouts.close);
        let closed = match tokio::time::timeout(self.timeouts.close, close).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(
                format!("Closing endpoint of '{}'", name),
                self.timeouts.close,
            )),
        };
        if let Err(error) = closed {
            tracing::warn!("Endpoint of '{}' did not close cleanly: {}", name, error);
            warnings.push(error);
        }

        tracing::info!("Service '{}' stopped", name);
        Outcome::Stopped { name, warnings }
    }
}

/// Running-set key: names match case-insensitively.
fn key(name: &str) -> String {
    fold_name(name)
}

/// Run one hook on its own task, bounded by `timeout`.
///
/// A panicking hook becomes `Error::Hook`; a hook that overruns is aborted.
async fn invoke<T, F, Fut>(
    service: &Arc<dyn VirtualService>,
    hook: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T>
where
    F: FnOnce(Arc<dyn VirtualService>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let name = service.name().to_string();
    let task = tokio::spawn(call(service.clone()));
    let abort = task.abort_handle();

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) if e.is_panic() => Err(Error::hook(&name, hook, "panicked")),
        Ok(Err(e)) => Err(Error::hook(&name, hook, e.to_string())),
        Err(_) => {
            abort.abort();
            Err(Error::timeout(format!("{} of '{}'", hook, name), timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ServiceStatus;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Quiet {
        status: ServiceStatus,
    }

    #[async_trait]
    impl VirtualService for Quiet {
        fn status(&self) -> &ServiceStatus {
            &self.status
        }

        fn kind(&self) -> &str {
            "test.quiet"
        }
    }

    struct Panicky {
        status: ServiceStatus,
    }

    #[async_trait]
    impl VirtualService for Panicky {
        fn status(&self) -> &ServiceStatus {
            &self.status
        }

        fn kind(&self) -> &str {
            "test.panicky"
        }

        async fn stop(&self) -> Result<()> {
            panic!("stop exploded");
        }
    }

    /// Exposer with no network side, for exercising the manager alone.
    struct LocalExposer;

    #[async_trait]
    impl EndpointExposer for LocalExposer {
        async fn open(
            &self,
            service: Arc<dyn VirtualService>,
            _timeout: Duration,
        ) -> Result<EndpointHandle> {
            Ok(EndpointHandle::detached(service.name()))
        }
    }

    fn manager(temp_dir: &TempDir, descriptors: Vec<ServiceDescriptor>) -> ServiceManager {
        let config = Config::with_config_dir(temp_dir.path());
        let store = RegistryStore::open(temp_dir.path()).unwrap();
        store
            .save(&RegistrySnapshot::from_descriptors(descriptors))
            .unwrap();

        let mut factory = ServiceFactory::with_builtins();
        factory.register("test.quiet", "tests", |name| {
            Box::new(Quiet {
                status: ServiceStatus::new(name),
            })
        });
        factory.register("test.panicky", "tests", |name| {
            Box::new(Panicky {
                status: ServiceStatus::new(name),
            })
        });

        ServiceManager::new(&config, factory, Arc::new(LocalExposer))
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, vec![]);
        manager.initialize().unwrap();
        manager.initialize().unwrap();
        assert!(manager.running().is_empty());
    }

    #[tokio::test]
    async fn lifecycle_follows_start_and_stop() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, vec![ServiceDescriptor::new("Svc1", "test.quiet")]);

        assert_eq!(manager.lifecycle("svc1"), LifecycleState::Absent);

        let outcome = manager.start_service("SVC1").await.unwrap();
        assert!(matches!(outcome, Outcome::Started { ref name, .. } if name == "Svc1"));
        assert_eq!(manager.lifecycle("svc1"), LifecycleState::Running);

        let outcome = manager.stop_service("svc1").await;
        assert!(matches!(outcome, Outcome::Stopped { ref warnings, .. } if warnings.is_empty()));
        assert_eq!(manager.lifecycle("Svc1"), LifecycleState::Absent);
    }

    #[tokio::test]
    async fn recorded_error_surfaces_as_error_state_until_reset() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, vec![ServiceDescriptor::new("Svc1", "test.quiet")]);
        manager.start_services().await.unwrap();

        let entry = manager.running.get("svc1").unwrap();
        entry.instance.record_error("queue overflow");
        assert_eq!(manager.lifecycle("Svc1"), LifecycleState::Error);

        let reports = manager.report_services().await;
        assert_eq!(reports[0].state, LifecycleState::Error);
        assert_eq!(reports[0].result.as_deref(), Ok("Svc1: queue overflow"));

        assert!(matches!(manager.reset_error("SVC1"), Outcome::Reset { .. }));
        assert_eq!(manager.lifecycle("Svc1"), LifecycleState::Running);
        assert!(matches!(manager.reset_error("other"), Outcome::NotRunning { .. }));
    }

    #[tokio::test]
    async fn panicking_stop_hook_still_removes_entry() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, vec![ServiceDescriptor::new("Boom", "test.panicky")]);
        manager.start_services().await.unwrap();
        assert!(manager.is_running("boom"));

        let outcome = manager.stop_service("BOOM").await;
        assert_eq!(outcome.warnings().len(), 1);
        assert!(matches!(outcome.warnings()[0], Error::Hook { hook: "stop", .. }));
        assert!(!manager.is_running("boom"));
    }

    #[tokio::test]
    async fn stop_unknown_service_is_not_running() {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&temp_dir, vec![]);
        let outcome = manager.stop_service("ghost").await;
        assert!(matches!(outcome, Outcome::NotRunning { .. }));
        assert_eq!(outcome.to_string(), "ghost is not running");
    }
}
