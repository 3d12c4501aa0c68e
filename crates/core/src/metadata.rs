//! The bundled metadata service: reports on the health of the host.

use crate::contract::{coerce, PropertyResult, ServiceStatus, VirtualService};
use crate::registry::fold_name;
use crate::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Instant;

/// Name the metadata service is registered under by default.
pub const SERVICE_NAME: &str = "MetadataService";
/// Implementation reference of the metadata service.
pub const TYPE_REF: &str = "vsf.metadata";
/// Module providing the built-in services.
pub const MODULE: &str = "vsf-core";

/// Trivial virtual service describing itself and its uptime.
///
/// Properties: `Description` (text appended to reports) and `Timeout`
/// (seconds, advertised in reports when set).
pub struct MetadataService {
    status: ServiceStatus,
    description: String,
    timeout: u64,
    started_at: Mutex<Option<Instant>>,
}

impl MetadataService {
    pub fn new(name: &str) -> Self {
        Self {
            status: ServiceStatus::new(name),
            description: String::new(),
            timeout: 0,
            started_at: Mutex::new(None),
        }
    }

    /// Configured timeout in seconds, 0 when unset.
    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    fn uptime_secs(&self) -> Option<u64> {
        let started_at = self.started_at.lock().unwrap_or_else(|e| e.into_inner());
        started_at.map(|at| at.elapsed().as_secs())
    }
}

#[async_trait]
impl VirtualService for MetadataService {
    fn status(&self) -> &ServiceStatus {
        &self.status
    }

    fn kind(&self) -> &str {
        TYPE_REF
    }

    async fn start(&self) -> Result<()> {
        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        *self.started_at.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }

    async fn report(&self) -> Result<String> {
        let mut report = self.status.report();
        if !self.description.is_empty() {
            report.push_str(&format!(" ({})", self.description));
        }
        if let Some(secs) = self.uptime_secs() {
            report.push_str(&format!(" Up {}s.", secs));
        }
        if self.timeout > 0 {
            report.push_str(&format!(" Timeout {}s.", self.timeout));
        }
        Ok(report)
    }

    fn apply_property(&mut self, key: &str, value: &str) -> PropertyResult {
        match fold_name(key).as_str() {
            "description" => {
                self.description = value.to_string();
                PropertyResult::Applied
            }
            "timeout" => coerce(value, &mut self.timeout),
            _ => PropertyResult::Unknown,
        }
    }
}
