//! Process host adapters: the background service host and the console host.

pub mod console;
pub mod daemon;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use vsf_core::RunningInfo;

/// Lifecycle notifications delivered to the service host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Start,
    Stop,
    Pause,
    Resume,
    PowerEvent(String),
}

/// Reacts to host lifecycle events. Implemented by the background host.
#[allow(async_fn_in_trait)]
pub trait HostController {
    async fn on_start(&mut self) -> anyhow::Result<()>;
    async fn on_stop(&mut self) -> anyhow::Result<()>;
    async fn on_pause(&mut self) -> anyhow::Result<()>;
    async fn on_resume(&mut self) -> anyhow::Result<()>;
    async fn on_power_event(&mut self, status: &str) -> anyhow::Result<()>;

    /// Route one event to its handler.
    async fn dispatch(&mut self, event: HostEvent) -> anyhow::Result<()> {
        match event {
            HostEvent::Start => self.on_start().await,
            HostEvent::Stop => self.on_stop().await,
            HostEvent::Pause => self.on_pause().await,
            HostEvent::Resume => self.on_resume().await,
            HostEvent::PowerEvent(status) => self.on_power_event(&status).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPhase {
    Running,
    Paused,
}

impl fmt::Display for HostPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPhase::Running => f.write_str("Running"),
            HostPhase::Paused => f.write_str("Paused"),
        }
    }
}

/// Endpoint of one virtual service, as recorded for `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub name: String,
    pub address: Option<String>,
}

/// What the background host publishes about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostState {
    /// Process ID
    pub pid: u32,
    pub phase: HostPhase,
    /// Unix timestamp when the host was started
    pub started_at: u64,
    #[serde(default)]
    pub services: Vec<EndpointRecord>,
}

impl HostState {
    pub fn new(pid: u32, started_at: u64) -> Self {
        Self {
            pid,
            phase: HostPhase::Running,
            started_at,
            services: Vec::new(),
        }
    }

    pub fn record_services(&mut self, running: &[RunningInfo]) {
        self.services = running
            .iter()
            .map(|info| EndpointRecord {
                name: info.name.clone(),
                address: info.address.map(|a| a.to_string()),
            })
            .collect();
    }

    /// Load host state from a file.
    ///
    /// Returns `None` when there is no state or its process is gone.
    pub fn load(state_file: &Path) -> anyhow::Result<Option<Self>> {
        if !state_file.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(state_file)?;
        let state: Option<HostState> = serde_json::from_str(&content).ok();

        Ok(state.filter(|s| process_alive(s.pid)))
    }

    /// Save host state to a file.
    pub fn save(&self, state_file: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(state_file, content)?;
        Ok(())
    }

    pub fn remove(state_file: &Path) -> anyhow::Result<()> {
        if state_file.exists() {
            fs::remove_file(state_file)?;
        }
        Ok(())
    }
}

/// Check if a process is alive using kill -0.
pub fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Send `signal` to a process.
pub fn send_signal(pid: u32, signal: i32) -> anyhow::Result<()> {
    if unsafe { libc::kill(pid as i32, signal) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
