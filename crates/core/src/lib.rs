//! Virtual Services Framework Core Library
//!
//! This crate provides the core functionality for hosting virtual services:
//! the registry of service descriptors, the factory that instantiates them,
//! the endpoints that expose them and the manager that drives their lifecycle.

pub mod config;
pub mod contract;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod manager;
pub mod metadata;
pub mod registry;

// Re-exports for convenience
pub use config::{Config, Timeouts};
pub use contract::{coerce, PropertyResult, ServiceStatus, VirtualService};
pub use endpoint::{EndpointExposer, EndpointHandle, TcpExposer};
pub use error::{Error, Result};
pub use factory::{CreatedService, ServiceFactory};
pub use manager::{LifecycleState, Outcome, RunningInfo, ServiceManager, ServiceReport};
pub use metadata::MetadataService;
pub use registry::{fold_name, Properties, RegistrySnapshot, RegistryStore, ServiceDescriptor};
