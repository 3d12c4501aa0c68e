//! Turns service descriptors into live service instances.

use crate::contract::{PropertyResult, VirtualService};
use crate::metadata::{self, MetadataService};
use crate::registry::{fold_name, ServiceDescriptor};
use crate::{Error, Result};
use std::collections::HashMap;

type Constructor = Box<dyn Fn(&str) -> Box<dyn VirtualService> + Send + Sync>;

struct Registration {
    module: String,
    construct: Constructor,
}

/// A freshly constructed instance plus the properties it rejected.
pub struct CreatedService {
    pub instance: Box<dyn VirtualService>,
    /// One `Error::Configuration` per property that could not be applied
    pub warnings: Vec<Error>,
}

/// Maps implementation references to constructors.
///
/// References are matched case-insensitively.
pub struct ServiceFactory {
    registrations: HashMap<String, Registration>,
}

impl ServiceFactory {
    /// An empty factory that resolves nothing.
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
        }
    }

    /// A factory that knows the services shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register(metadata::TYPE_REF, metadata::MODULE, |name| {
            Box::new(MetadataService::new(name))
        });
        factory
    }

    /// Register (or replace) the constructor for `type_ref`.
    ///
    /// The constructor receives the descriptor's service name.
    pub fn register<F>(&mut self, type_ref: &str, module: &str, construct: F) -> &mut Self
    where
        F: Fn(&str) -> Box<dyn VirtualService> + Send + Sync + 'static,
    {
        self.registrations.insert(
            fold_name(type_ref),
            Registration {
                module: module.to_string(),
                construct: Box::new(construct),
            },
        );
        self
    }

    /// Construct the instance for `descriptor` and apply its properties.
    ///
    /// Fails only when the implementation cannot be resolved. Properties that
    /// are unknown are logged and skipped; properties that cannot be coerced
    /// are returned as warnings.
    pub fn create(&self, descriptor: &ServiceDescriptor) -> Result<CreatedService> {
        let registration = self
            .registrations
            .get(&fold_name(&descriptor.implementation))
            .ok_or_else(|| Error::Resolution {
                service: descriptor.name.clone(),
                reason: format!("unknown implementation '{}'", descriptor.implementation),
            })?;

        if let Some(module) = &descriptor.module {
            if fold_name(module) != fold_name(&registration.module) {
                return Err(Error::Resolution {
                    service: descriptor.name.clone(),
                    reason: format!(
                        "implementation '{}' is provided by module '{}', not '{}'",
                        descriptor.implementation, registration.module, module
                    ),
                });
            }
        }

        let mut instance = (registration.construct)(&descriptor.name);
        let warnings = bind_properties(instance.as_mut(), descriptor);

        Ok(CreatedService { instance, warnings })
    }
}

impl Default for ServiceFactory {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn bind_properties(instance: &mut dyn VirtualService, descriptor: &ServiceDescriptor) -> Vec<Error> {
    let mut warnings = Vec::new();

    for (key, value) in descriptor.properties.iter() {
        tracing::trace!("Property {}, Value {}", key, value);

        match instance.apply_property(key, value) {
            PropertyResult::Applied => {}
            PropertyResult::Unknown => {
                tracing::warn!(
                    "Service '{}' has no writable property '{}', ignoring it",
                    descriptor.name,
                    key
                );
            }
            PropertyResult::Invalid(reason) => {
                let error = Error::Configuration {
                    service: descriptor.name.clone(),
                    property: key.to_string(),
                    reason,
                };
                tracing::warn!("{}", error);
                warnings.push(error);
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ServiceStatus;
    use async_trait::async_trait;

    #[tokio::test]
    async fn builtin_metadata_resolves_with_its_name() {
        let factory = ServiceFactory::with_builtins();
        let descriptor = ServiceDescriptor::new("Meta", "VSF.Metadata").with_module("vsf-core");

        let created = factory.create(&descriptor).unwrap();
        assert_eq!(created.instance.name(), "Meta");
        assert_eq!(created.instance.kind(), metadata::TYPE_REF);
        assert!(created.warnings.is_empty());
    }

    #[test]
    fn unknown_type_is_resolution_error() {
        let factory = ServiceFactory::with_builtins();
        let descriptor = ServiceDescriptor::new("Ghost", "no.such.type");

        assert!(matches!(
            factory.create(&descriptor),
            Err(Error::Resolution { service, .. }) if service == "Ghost"
        ));
    }

    #[test]
    fn wrong_module_is_resolution_error() {
        let factory = ServiceFactory::with_builtins();
        let descriptor = ServiceDescriptor::new("Meta", metadata::TYPE_REF).with_module("plugins");

        assert!(matches!(
            factory.create(&descriptor),
            Err(Error::Resolution { .. })
        ));
    }

    struct Tunable {
        status: ServiceStatus,
        timeout: u64,
        retries: u32,
    }

    #[async_trait]
    impl VirtualService for Tunable {
        fn status(&self) -> &ServiceStatus {
            &self.status
        }

        fn kind(&self) -> &str {
            "test.tunable"
        }

        fn apply_property(&mut self, key: &str, value: &str) -> PropertyResult {
            match key {
                "Timeout" => crate::contract::coerce(value, &mut self.timeout),
                "Retries" => crate::contract::coerce(value, &mut self.retries),
                _ => PropertyResult::Unknown,
            }
        }
    }

    #[test]
    fn bad_property_is_isolated_warning() {
        let mut factory = ServiceFactory::new();
        factory.register("test.tunable", "tests", |name| {
            Box::new(Tunable {
                status: ServiceStatus::new(name),
                timeout: 0,
                retries: 0,
            })
        });

        let descriptor = ServiceDescriptor::new("Tune", "test.tunable")
            .with_property("Retries", "lots")
            .with_property("Bogus", "1")
            .with_property("Timeout", "30");

        let created = factory.create(&descriptor).unwrap();
        assert_eq!(created.warnings.len(), 1);
        assert!(matches!(
            &created.warnings[0],
            Error::Configuration { property, .. } if property == "Retries"
        ));
    }
}
