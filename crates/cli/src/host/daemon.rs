//! Background service host.
//!
//! Signals are translated into [`HostEvent`]s and sent over a channel to the
//! loop that owns the [`ServiceManager`], so commands are handled one at a
//! time:
//!
//! - SIGTERM / SIGINT: stop all services and exit
//! - SIGUSR1: pause (stop virtual services, keep the host alive)
//! - SIGUSR2: resume (start virtual services again)
//! - SIGHUP: power event, logged only

use super::{unix_now, HostController, HostEvent, HostPhase, HostState};
use anyhow::Context;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use vsf_core::{Config, Outcome, ServiceManager};

/// The host as run by the service manager of the operating system.
pub struct ServiceHost {
    config: Config,
    manager: ServiceManager,
    state: HostState,
}

impl ServiceHost {
    pub fn new(config: Config, manager: ServiceManager) -> Self {
        Self {
            config,
            manager,
            state: HostState::new(std::process::id(), unix_now()),
        }
    }

    pub fn phase(&self) -> HostPhase {
        self.state.phase
    }

    fn publish(&mut self) -> anyhow::Result<()> {
        self.state.record_services(&self.manager.running());
        self.state
            .save(&self.config.state_file)
            .with_context(|| format!("Cannot write {}", self.config.state_file.display()))
    }
}

fn log_outcomes(action: &str, outcomes: &[Outcome]) {
    let failed = outcomes.iter().filter(|o| o.is_failure()).count();
    tracing::info!(
        "{}: {} service(s) handled, {} failed",
        action,
        outcomes.len(),
        failed
    );
}

impl HostController for ServiceHost {
    async fn on_start(&mut self) -> anyhow::Result<()> {
        tracing::info!("Host '{}' starting", self.config.service_name);
        self.manager.initialize()?;
        let outcomes = self.manager.start_services().await?;
        log_outcomes("Start", &outcomes);
        self.state.phase = HostPhase::Running;
        self.publish()
    }

    async fn on_stop(&mut self) -> anyhow::Result<()> {
        tracing::info!("Host '{}' stopping", self.config.service_name);
        let outcomes = self.manager.stop_services().await;
        log_outcomes("Stop", &outcomes);
        HostState::remove(&self.config.state_file)
    }

    async fn on_pause(&mut self) -> anyhow::Result<()> {
        if self.state.phase == HostPhase::Paused {
            tracing::info!("Host is already paused");
            return Ok(());
        }
        let outcomes = self.manager.stop_services().await;
        log_outcomes("Pause", &outcomes);
        self.state.phase = HostPhase::Paused;
        self.publish()
    }

    async fn on_resume(&mut self) -> anyhow::Result<()> {
        if self.state.phase == HostPhase::Running {
            tracing::info!("Host is not paused");
            return Ok(());
        }
        let outcomes = self.manager.start_services().await?;
        log_outcomes("Resume", &outcomes);
        self.state.phase = HostPhase::Running;
        self.publish()
    }

    async fn on_power_event(&mut self, status: &str) -> anyhow::Result<()> {
        tracing::info!("Power event: {}", status);
        Ok(())
    }
}

/// Signal streams the host listens to.
struct Signals {
    terminate: Signal,
    interrupt: Signal,
    pause: Signal,
    resume: Signal,
    hangup: Signal,
}

impl Signals {
    fn install() -> anyhow::Result<Self> {
        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
            pause: signal(SignalKind::user_defined1())?,
            resume: signal(SignalKind::user_defined2())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn forward(mut self, events: mpsc::Sender<HostEvent>) {
        loop {
            let event = tokio::select! {
                _ = self.terminate.recv() => HostEvent::Stop,
                _ = self.interrupt.recv() => HostEvent::Stop,
                _ = self.pause.recv() => HostEvent::Pause,
                _ = self.resume.recv() => HostEvent::Resume,
                _ = self.hangup.recv() => HostEvent::PowerEvent("hangup".to_string()),
            };
            if events.send(event).await.is_err() {
                break;
            }
        }
    }
}

/// Run the host in the foreground until it is told to stop.
pub async fn run(config: Config) -> anyhow::Result<()> {
    if let Some(existing) = HostState::load(&config.state_file)? {
        if existing.pid != std::process::id() {
            anyhow::bail!(
                "Host '{}' is already running (PID: {})",
                config.service_name,
                existing.pid
            );
        }
    }

    let signals = Signals::install().context("Cannot install signal handlers")?;
    let (events, mut inbox) = mpsc::channel(16);
    let forwarder = tokio::spawn(signals.forward(events.clone()));

    let manager = ServiceManager::from_config(&config);
    let mut host = ServiceHost::new(config, manager);
    events.send(HostEvent::Start).await?;

    while let Some(event) = inbox.recv().await {
        let last = event == HostEvent::Stop;
        let fatal = event == HostEvent::Start;

        if let Err(err) = host.dispatch(event).await {
            if fatal {
                forwarder.abort();
                let _ = host.dispatch(HostEvent::Stop).await;
                return Err(err.context("Host could not start its services"));
            }
            tracing::error!("{:#}", err);
        }

        if last {
            break;
        }
    }

    forwarder.abort();
    tracing::info!("Host exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn pause_and_resume_cycle_services() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::with_config_dir(temp_dir.path());
        let manager = ServiceManager::from_config(&config);
        let mut host = ServiceHost::new(config.clone(), manager);

        host.dispatch(HostEvent::Start).await.unwrap();
        let state = HostState::load(&config.state_file).unwrap().unwrap();
        assert_eq!(state.phase, HostPhase::Running);
        assert_eq!(state.services.len(), 1);
        assert_eq!(state.services[0].name, "MetadataService");

        host.dispatch(HostEvent::Pause).await.unwrap();
        let state = HostState::load(&config.state_file).unwrap().unwrap();
        assert_eq!(state.phase, HostPhase::Paused);
        assert!(state.services.is_empty());

        host.dispatch(HostEvent::Resume).await.unwrap();
        assert_eq!(host.phase(), HostPhase::Running);
        let state = HostState::load(&config.state_file).unwrap().unwrap();
        assert_eq!(state.services.len(), 1);

        host.dispatch(HostEvent::PowerEvent("battery low".to_string()))
            .await
            .unwrap();

        host.dispatch(HostEvent::Stop).await.unwrap();
        assert!(!config.state_file.exists());
    }
}
