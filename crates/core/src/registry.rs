//! Service descriptors and the registry document they are stored in.
//!
//! The registry is a YAML document (`services.yaml`) inside the configuration
//! folder. It is re-read in full on every [`RegistryStore::load`], so edits made
//! while the host is running are picked up by the next start command.

use crate::metadata;
use crate::{Error, Result};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the registry document inside the configuration folder.
pub const REGISTRY_FILE: &str = "services.yaml";

/// Fold a service, type or property name for case-insensitive comparison.
pub fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// Declarative record naming a virtual service and how to build it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique (case-insensitive) name of the service
    pub name: String,
    /// Implementation reference resolved by the service factory
    #[serde(rename = "type")]
    pub implementation: String,
    /// Module that provides the implementation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Properties applied to the instance after construction
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, implementation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implementation: implementation.into(),
            module: None,
            properties: Properties::default(),
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push(key, value);
        self
    }

    /// Case-insensitive name comparison.
    pub fn matches(&self, name: &str) -> bool {
        fold_name(&self.name) == fold_name(name)
    }
}

/// Ordered name to text mapping of service properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(Vec<(String, String)>);

impl Properties {
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = fold_name(key);
        self.0
            .iter()
            .find(|(k, _)| fold_name(k) == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Properties {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Properties {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Mapping keeps document order
        let mapping = Option::<serde_yaml::Mapping>::deserialize(deserializer)?.unwrap_or_default();
        let mut entries = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let key = scalar_text(&key)
                .ok_or_else(|| de::Error::custom("property names must be plain scalars"))?;
            let value = scalar_text(&value).ok_or_else(|| {
                de::Error::custom(format!("property '{}' must have a scalar value", key))
            })?;
            entries.push((key, value));
        }
        Ok(Properties(entries))
    }
}

/// Property values are untyped text; YAML scalars are taken as written.
fn scalar_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        _ => None,
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    services: Vec<ServiceDescriptor>,
}

/// All descriptors read in one load.
///
/// Names are unique case-insensitively: when the document repeats a name the
/// later descriptor replaces the earlier one in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    descriptors: Vec<ServiceDescriptor>,
}

impl RegistrySnapshot {
    /// Build a snapshot, applying the last-wins rule for duplicate names.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ServiceDescriptor>) -> Self {
        let mut unique: Vec<ServiceDescriptor> = Vec::new();
        for descriptor in descriptors {
            match unique.iter_mut().find(|d| d.matches(&descriptor.name)) {
                Some(existing) => {
                    tracing::warn!(
                        "Duplicate registry entry for service '{}', the later definition wins",
                        descriptor.name
                    );
                    *existing = descriptor;
                }
                None => unique.push(descriptor),
            }
        }
        Self { descriptors: unique }
    }

    /// Find a descriptor by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.descriptors.iter().find(|d| d.matches(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Reads and writes the registry document in a configuration folder.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    folder: PathBuf,
    document: PathBuf,
}

impl RegistryStore {
    /// Open the store rooted at `folder`.
    ///
    /// Creates the folder and a default document (holding the bundled
    /// metadata service) if either is missing.
    pub fn open(folder: &Path) -> Result<Self> {
        let store = Self {
            folder: folder.to_path_buf(),
            document: folder.join(REGISTRY_FILE),
        };
        tracing::debug!("Registry document: {}", store.document.display());
        store.ensure_document()?;
        Ok(store)
    }

    /// Path of the registry document.
    pub fn path(&self) -> &Path {
        &self.document
    }

    /// Read every descriptor from the document.
    ///
    /// Nothing is cached: each call re-reads the file.
    pub fn load(&self) -> Result<RegistrySnapshot> {
        self.ensure_document()?;

        let content = fs::read_to_string(&self.document).map_err(|e| {
            Error::Storage(format!("cannot read {}: {}", self.document.display(), e))
        })?;

        if content.trim().is_empty() {
            return Ok(RegistrySnapshot::default());
        }

        let document: RegistryDocument = serde_yaml::from_str(&content).map_err(|e| {
            Error::Storage(format!("malformed {}: {}", self.document.display(), e))
        })?;

        for (index, descriptor) in document.services.iter().enumerate() {
            if descriptor.name.trim().is_empty() {
                return Err(Error::Storage(format!(
                    "malformed {}: service #{} has an empty name",
                    self.document.display(),
                    index + 1
                )));
            }
            if descriptor.implementation.trim().is_empty() {
                return Err(Error::Storage(format!(
                    "malformed {}: service '{}' has an empty type",
                    self.document.display(),
                    descriptor.name
                )));
            }
        }

        let snapshot = RegistrySnapshot::from_descriptors(document.services);
        tracing::debug!("Loaded {} service descriptor(s)", snapshot.len());
        Ok(snapshot)
    }

    /// Write `snapshot` back to the document, replacing its contents.
    pub fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        let document = RegistryDocument {
            services: snapshot.descriptors.clone(),
        };
        let content = serde_yaml::to_string(&document)
            .map_err(|e| Error::Storage(format!("cannot encode registry: {}", e)))?;

        fs::create_dir_all(&self.folder).map_err(|e| {
            Error::Storage(format!("cannot create {}: {}", self.folder.display(), e))
        })?;
        fs::write(&self.document, content).map_err(|e| {
            Error::Storage(format!("cannot write {}: {}", self.document.display(), e))
        })?;
        Ok(())
    }

    fn ensure_document(&self) -> Result<()> {
        if self.document.exists() {
            return Ok(());
        }

        tracing::info!(
            "No registry found, creating default at {}",
            self.document.display()
        );
        self.save(&Self::default_snapshot())
    }

    /// The registry written on first run: just the metadata service.
    pub fn default_snapshot() -> RegistrySnapshot {
        RegistrySnapshot::from_descriptors([ServiceDescriptor::new(
            metadata::SERVICE_NAME,
            metadata::TYPE_REF,
        )
        .with_module(metadata::MODULE)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn bootstraps_default_document_in_missing_folder() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("nested").join("vsf");

        let store = RegistryStore::open(&folder).unwrap();
        assert!(store.path().exists());

        let first = store.load().unwrap();
        assert_eq!(first.len(), 1);
        let descriptor = first.get(metadata::SERVICE_NAME).unwrap();
        assert_eq!(descriptor.implementation, metadata::TYPE_REF);
        assert_eq!(descriptor.module.as_deref(), Some(metadata::MODULE));
        assert!(descriptor.properties.is_empty());

        let second = store.load().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn existing_document_is_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(REGISTRY_FILE),
            "services:\n  - name: Svc1\n    type: test.kind\n",
        )
        .unwrap();

        let store = RegistryStore::open(temp_dir.path()).unwrap();
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("svc1").is_some());
        assert!(snapshot.get(metadata::SERVICE_NAME).is_none());
    }

    #[test]
    fn properties_keep_document_order_and_stringify_scalars() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(REGISTRY_FILE),
            r#"
services:
  - name: Svc1
    type: test.kind
    module: tests
    properties:
      Timeout: 30
      Verbose: true
      Description: "hello"
"#,
        )
        .unwrap();

        let store = RegistryStore::open(temp_dir.path()).unwrap();
        let snapshot = store.load().unwrap();
        let descriptor = snapshot.get("SVC1").unwrap();
        let props: Vec<_> = descriptor.properties.iter().collect();
        assert_eq!(
            props,
            vec![("Timeout", "30"), ("Verbose", "true"), ("Description", "hello")]
        );
        assert_eq!(descriptor.properties.get("timeout"), Some("30"));
    }

    #[test]
    fn duplicate_names_last_wins_in_first_slot() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(REGISTRY_FILE),
            r#"
services:
  - name: Alpha
    type: first.kind
  - name: Beta
    type: beta.kind
  - name: ALPHA
    type: second.kind
"#,
        )
        .unwrap();

        let store = RegistryStore::open(temp_dir.path()).unwrap();
        let snapshot = store.load().unwrap();
        let names: Vec<_> = snapshot.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["ALPHA", "Beta"]);
        assert_eq!(snapshot.get("alpha").unwrap().implementation, "second.kind");
    }

    #[test]
    fn non_ascii_names_fold_like_ascii_ones() {
        let snapshot = RegistrySnapshot::from_descriptors([
            ServiceDescriptor::new("Ärger", "first.kind").with_property("Größe", "1"),
            ServiceDescriptor::new("ärger", "second.kind").with_property("GRÖSSE", "2"),
        ]);

        assert_eq!(snapshot.len(), 1);
        let descriptor = snapshot.get("ÄRGER").unwrap();
        assert_eq!(descriptor.implementation, "second.kind");
        assert_eq!(descriptor.properties.get("größe"), None);
        assert_eq!(descriptor.properties.get("grösse"), Some("2"));
        assert_eq!(fold_name("Ärger"), fold_name("äRGER"));
    }

    #[test]
    fn malformed_document_is_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(REGISTRY_FILE), "services: [ {name: ").unwrap();

        let store = RegistryStore::open(temp_dir.path()).unwrap();
        assert!(matches!(store.load(), Err(Error::Storage(_))));
    }

    #[test]
    fn empty_name_is_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(REGISTRY_FILE),
            "services:\n  - name: \"\"\n    type: test.kind\n",
        )
        .unwrap();

        let store = RegistryStore::open(temp_dir.path()).unwrap();
        assert!(matches!(store.load(), Err(Error::Storage(_))));
    }

    #[test]
    fn external_edits_are_observed_without_reopening() {
        let temp_dir = TempDir::new().unwrap();
        let store = RegistryStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.load().unwrap().len(), 1);

        let snapshot = RegistrySnapshot::from_descriptors([
            ServiceDescriptor::new("Svc1", "test.kind").with_property("Timeout", "30"),
            ServiceDescriptor::new("Svc2", "test.kind"),
        ]);
        store.save(&snapshot).unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded, snapshot);
    }

    #[test]
    fn empty_document_is_empty_registry() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(REGISTRY_FILE), "").unwrap();

        let store = RegistryStore::open(temp_dir.path()).unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
