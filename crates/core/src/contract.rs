//! The contract every hosted virtual service implements.

use crate::Result;
use async_trait::async_trait;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Mutex;

/// Result of applying one configured property to a service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyResult {
    /// The property was recognised and assigned.
    Applied,
    /// The instance has no writable property of that name.
    Unknown,
    /// The text could not be converted to the property's type.
    Invalid(String),
}

/// Parse `value` into `slot`, leaving the slot untouched on failure.
pub fn coerce<T>(value: &str, slot: &mut T) -> PropertyResult
where
    T: FromStr,
    T::Err: Display,
{
    match value.trim().parse::<T>() {
        Ok(parsed) => {
            *slot = parsed;
            PropertyResult::Applied
        }
        Err(e) => PropertyResult::Invalid(format!("{:?} is not valid: {}", value, e)),
    }
}

/// Name and last recorded error of a service instance.
///
/// Embedded by every implementation so the default `report` works before
/// `start` and from any task.
#[derive(Debug)]
pub struct ServiceStatus {
    name: String,
    last_error: Mutex<Option<String>>,
}

impl ServiceStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_error: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_error(&self) -> Option<String> {
        self.slot().clone()
    }

    pub fn record_error(&self, message: impl Into<String>) {
        *self.slot() = Some(message.into());
    }

    pub fn reset(&self) {
        *self.slot() = None;
    }

    /// `"<name>: Functioning Normally."`, or `"<name>: <last error>"`.
    pub fn report(&self) -> String {
        match self.last_error() {
            Some(message) => format!("{}: {}", self.name, message),
            None => format!("{}: Functioning Normally.", self.name),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        // A poisoned lock still holds a usable Option
        self.last_error.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A pluggable unit of functionality hosted by the service manager.
#[async_trait]
pub trait VirtualService: Send + Sync + 'static {
    /// Name and error state of this instance.
    fn status(&self) -> &ServiceStatus;

    /// Implementation reference this instance was created from.
    fn kind(&self) -> &str;

    fn name(&self) -> &str {
        self.status().name()
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    /// Describe the health of the service.
    ///
    /// A faulted service reports its last error as text rather than failing.
    async fn report(&self) -> Result<String> {
        Ok(self.status().report())
    }

    fn last_error(&self) -> Option<String> {
        self.status().last_error()
    }

    fn record_error(&self, message: &str) {
        self.status().record_error(message)
    }

    fn reset_error(&self) {
        self.status().reset()
    }

    /// Assign a configured property. Called before `start`.
    fn apply_property(&mut self, _key: &str, _value: &str) -> PropertyResult {
        PropertyResult::Unknown
    }
}
