//! Connector loader
//!
//! Walks a connectors directory, parses each subdirectory's
//! `manifest.json`, and materializes the declared instances through the
//! registry. Factories are resolved from a compile-time [`FactoryCatalog`]
//! keyed by the manifest's `entry` name; the optional `config` field names
//! a sibling JSON file providing the base configuration object.
//!
//! A broken manifest, a missing catalog entry or a failing instance is
//! logged and skipped; it never aborts the loading of other connectors.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::BuiltConfiguration;
use crate::error::{ConnectorError, ConnectorResult};
use crate::registry::{BoxedConnector, ConnectorRegistry, FactoryContext};
use crate::types::ConnectorKey;

/// Per-connector descriptor file name.
pub const MANIFEST_FILE: &str = "manifest.json";

/// A connector manifest (`manifest.json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorManifest {
    /// Connector id (used in logs; instances carry their own ids).
    pub id: String,
    /// Connector type name.
    #[serde(rename = "type")]
    pub connector_type: String,
    /// Connector version (semver).
    pub version: String,
    /// Catalog entry providing the factory.
    pub entry: String,
    /// Relative path to a JSON file holding the base configuration.
    #[serde(default)]
    pub config: Option<String>,
    /// Instances to initialize.
    #[serde(default)]
    pub instances: Option<Vec<ManifestInstance>>,
}

/// One declared connector instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestInstance {
    /// Unique instance id.
    pub id: String,
    /// Instance configuration, shallow-merged over the base config.
    #[serde(default)]
    pub config: Option<Value>,
    /// Optional version override for this instance.
    #[serde(default)]
    pub connector_version: Option<String>,
}

impl ConnectorManifest {
    /// Validate the manifest structure.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.id.is_empty() {
            return Err(ConnectorError::config_invalid("id", "must not be empty"));
        }
        if self.connector_type.is_empty() {
            return Err(ConnectorError::config_invalid("type", "must not be empty"));
        }
        if self.entry.is_empty() {
            return Err(ConnectorError::config_invalid("entry", "must not be empty"));
        }
        if semver::Version::parse(&self.version).is_err() {
            return Err(ConnectorError::config_invalid(
                "version",
                format!("'{}' is not valid semver", self.version),
            ));
        }
        if let Some(instances) = &self.instances {
            for instance in instances {
                if instance.id.is_empty() {
                    return Err(ConnectorError::config_invalid(
                        "instances.id",
                        "must not be empty",
                    ));
                }
                if let Some(version) = &instance.connector_version {
                    if semver::Version::parse(version).is_err() {
                        return Err(ConnectorError::config_invalid(
                            "instances.connectorVersion",
                            format!("'{version}' is not valid semver"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

type SharedFactory = Arc<dyn Fn(FactoryContext) -> ConnectorResult<BoxedConnector> + Send + Sync>;
type SharedConfigBuilder = Arc<dyn Fn(Value) -> ConnectorResult<BuiltConfiguration> + Send + Sync>;

struct CatalogEntry {
    factory: SharedFactory,
    config_builder: Option<SharedConfigBuilder>,
}

/// Compile-time catalog mapping manifest `entry` names to factories.
///
/// The host registers every connector crate it links against here once at
/// startup; manifests then select from the catalog by name.
#[derive(Default)]
pub struct FactoryCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl FactoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under an entry name.
    pub fn register<F>(&mut self, entry: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(FactoryContext) -> ConnectorResult<BoxedConnector> + Send + Sync + 'static,
    {
        self.entries.insert(
            entry.into(),
            CatalogEntry {
                factory: Arc::new(factory),
                config_builder: None,
            },
        );
        self
    }

    /// Register a factory plus a config builder under an entry name.
    pub fn register_with_config<F, B>(
        &mut self,
        entry: impl Into<String>,
        factory: F,
        builder: B,
    ) -> &mut Self
    where
        F: Fn(FactoryContext) -> ConnectorResult<BoxedConnector> + Send + Sync + 'static,
        B: Fn(Value) -> ConnectorResult<BuiltConfiguration> + Send + Sync + 'static,
    {
        self.entries.insert(
            entry.into(),
            CatalogEntry {
                factory: Arc::new(factory),
                config_builder: Some(Arc::new(builder)),
            },
        );
        self
    }

    /// Check whether an entry name is registered.
    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains_key(entry)
    }

    fn get(&self, entry: &str) -> Option<&CatalogEntry> {
        self.entries.get(entry)
    }
}

/// Outcome of a directory load.
#[derive(Debug, Default)]
pub struct LoaderReport {
    /// Factory keys registered (`type@version`).
    pub registered: Vec<String>,
    /// Instance ids initialized.
    pub initialized: Vec<String>,
    /// Manifest directories skipped, with the reason.
    pub skipped_manifests: Vec<String>,
    /// Instance ids that failed to initialize, with the reason.
    pub failed_instances: Vec<String>,
}

/// Loads connectors from a directory of manifests.
pub struct ConnectorLoader<'a> {
    catalog: &'a FactoryCatalog,
    registry: &'a ConnectorRegistry,
}

impl<'a> ConnectorLoader<'a> {
    /// Create a loader over a catalog and registry.
    #[must_use]
    pub fn new(catalog: &'a FactoryCatalog, registry: &'a ConnectorRegistry) -> Self {
        Self { catalog, registry }
    }

    /// Load every connector subdirectory under `dir`.
    pub async fn load_dir(&self, dir: &Path) -> ConnectorResult<LoaderReport> {
        let mut report = LoaderReport::default();

        let entries = std::fs::read_dir(dir).map_err(|e| {
            ConnectorError::config_invalid(
                "connectorsDir",
                format!("cannot read '{}': {e}", dir.display()),
            )
        })?;

        let mut subdirs: Vec<std::path::PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        subdirs.sort();

        for subdir in subdirs {
            if let Err(e) = self.load_connector(&subdir, &mut report).await {
                warn!(
                    dir = %subdir.display(),
                    error = %e,
                    "skipping connector directory"
                );
                report
                    .skipped_manifests
                    .push(format!("{}: {e}", subdir.display()));
            }
        }

        info!(
            registered = report.registered.len(),
            initialized = report.initialized.len(),
            skipped = report.skipped_manifests.len(),
            "connector loading finished"
        );
        Ok(report)
    }

    async fn load_connector(&self, dir: &Path, report: &mut LoaderReport) -> ConnectorResult<()> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&manifest_path).map_err(|e| {
            ConnectorError::config_invalid("manifest", format!("cannot read manifest.json: {e}"))
        })?;
        let manifest: ConnectorManifest = serde_json::from_str(&raw)
            .map_err(|e| ConnectorError::config_invalid("manifest", e.to_string()))?;
        manifest.validate()?;

        let catalog_entry = self.catalog.get(&manifest.entry).ok_or_else(|| {
            ConnectorError::config_invalid(
                "entry",
                format!("'{}' is not in the factory catalog", manifest.entry),
            )
        })?;

        let base_config = match &manifest.config {
            Some(relpath) => Some(self.read_base_config(dir, relpath)?),
            None => None,
        };

        let key = ConnectorKey::new(&manifest.connector_type, &manifest.version)?;
        let factory = Arc::clone(&catalog_entry.factory);
        self.registry
            .register_factory(&key, Box::new(move |ctx| factory(ctx)))
            .await;
        if let Some(builder) = &catalog_entry.config_builder {
            let builder = Arc::clone(builder);
            self.registry
                .register_config_builder(&key, Box::new(move |raw| builder(raw)))
                .await;
        }
        report.registered.push(key.composite());

        let instances = manifest.instances.clone().unwrap_or_default();
        if instances.is_empty() {
            warn!(
                connector = %manifest.id,
                key = %key,
                "manifest declares no instances"
            );
            return Ok(());
        }

        for declared in instances {
            match self
                .init_declared_instance(&manifest, base_config.as_ref(), &declared)
                .await
            {
                Ok(()) => report.initialized.push(declared.id.clone()),
                Err(e) => {
                    warn!(
                        connector = %manifest.id,
                        instance_id = %declared.id,
                        error = %e,
                        "failed to initialize connector instance"
                    );
                    report
                        .failed_instances
                        .push(format!("{}: {e}", declared.id));
                }
            }
        }

        Ok(())
    }

    fn read_base_config(&self, dir: &Path, relpath: &str) -> ConnectorResult<Value> {
        let path = dir.join(relpath);
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            ConnectorError::config_invalid(
                "config",
                format!("cannot read '{}': {e}", path.display()),
            )
        })?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| ConnectorError::config_invalid("config", e.to_string()))?;
        if !value.is_object() {
            return Err(ConnectorError::config_invalid(
                "config",
                "base configuration must be a JSON object",
            ));
        }
        Ok(value)
    }

    async fn init_declared_instance(
        &self,
        manifest: &ConnectorManifest,
        base_config: Option<&Value>,
        declared: &ManifestInstance,
    ) -> ConnectorResult<()> {
        let mut merged = merge_shallow(base_config, declared.config.as_ref());
        substitute_env(&mut merged, "config")?;

        let version = declared
            .connector_version
            .as_deref()
            .unwrap_or(&manifest.version);

        self.registry
            .init_instance(&declared.id, &manifest.connector_type, version, merged)
            .await?;
        Ok(())
    }
}

/// Shallow merge: instance keys override base keys.
fn merge_shallow(base: Option<&Value>, instance: Option<&Value>) -> Value {
    let mut merged = serde_json::Map::new();
    if let Some(Value::Object(base)) = base {
        merged.extend(base.clone());
    }
    if let Some(Value::Object(instance)) = instance {
        merged.extend(instance.clone());
    }
    Value::Object(merged)
}

/// Recursively replace string values of the form `${ENV_NAME}` with the
/// process environment value. A missing variable fails the instance.
fn substitute_env(value: &mut Value, property: &str) -> ConnectorResult<()> {
    match value {
        Value::String(s) => {
            if let Some(name) = env_placeholder(s) {
                let resolved = std::env::var(name).map_err(|_| {
                    ConnectorError::config_invalid(
                        property,
                        format!("environment variable '{name}' is not set"),
                    )
                })?;
                *s = resolved;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                substitute_env(item, property)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (key, item) in map.iter_mut() {
                substitute_env(item, key.as_str())?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Match `^\$\{[A-Z0-9_]+\}$`, returning the variable name.
fn env_placeholder(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    if inner.is_empty() {
        return None;
    }
    inner
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        .then_some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Connector;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    struct MockConnector;

    impl Connector for MockConnector {
        fn display_name(&self) -> &str {
            "mock"
        }
    }

    fn catalog_with_counter() -> (FactoryCatalog, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let count = Arc::clone(&calls);
        let mut catalog = FactoryCatalog::new();
        catalog.register("memory", move |_ctx| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockConnector) as BoxedConnector)
        });
        (catalog, calls)
    }

    fn write_manifest(dir: &Path, name: &str, manifest: &Value) -> std::path::PathBuf {
        let subdir = dir.join(name);
        fs::create_dir_all(&subdir).unwrap();
        fs::write(
            subdir.join(MANIFEST_FILE),
            serde_json::to_string_pretty(manifest).unwrap(),
        )
        .unwrap();
        subdir
    }

    #[tokio::test]
    async fn test_load_single_connector() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            "memory",
            &json!({
                "id": "memory-connector",
                "type": "memory",
                "version": "1.0.0",
                "entry": "memory",
                "instances": [{"id": "mem-a"}, {"id": "mem-b"}]
            }),
        );

        let (catalog, calls) = catalog_with_counter();
        let registry = ConnectorRegistry::new();
        let loader = ConnectorLoader::new(&catalog, &registry);
        let report = loader.load_dir(dir.path()).await.unwrap();

        assert_eq!(report.registered, vec!["memory@1.0.0"]);
        assert_eq!(report.initialized, vec!["mem-a", "mem-b"]);
        assert!(report.skipped_manifests.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(registry.has("mem-a").await);
        assert!(registry.has("mem-b").await);
    }

    #[tokio::test]
    async fn test_base_config_merged_under_instance_config() {
        let dir = TempDir::new().unwrap();
        let subdir = write_manifest(
            dir.path(),
            "memory",
            &json!({
                "id": "memory-connector",
                "type": "memory",
                "version": "1.0.0",
                "entry": "memory",
                "config": "config.json",
                "instances": [{"id": "mem-a", "config": {"region": "eu"}}]
            }),
        );
        fs::write(
            subdir.join("config.json"),
            r#"{"region": "us", "pool": 4}"#,
        )
        .unwrap();

        let captured = Arc::new(std::sync::Mutex::new(None::<Value>));
        let seen = Arc::clone(&captured);
        let mut catalog = FactoryCatalog::new();
        catalog.register("memory", move |ctx| {
            *seen.lock().unwrap() = Some(ctx.config.clone());
            Ok(Arc::new(MockConnector) as BoxedConnector)
        });

        let registry = ConnectorRegistry::new();
        let loader = ConnectorLoader::new(&catalog, &registry);
        loader.load_dir(dir.path()).await.unwrap();

        let config = captured.lock().unwrap().clone().unwrap();
        assert_eq!(config["region"], "eu");
        assert_eq!(config["pool"], 4);
    }

    #[tokio::test]
    async fn test_env_substitution() {
        std::env::set_var("X_SECRET", "shh");
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            "memory",
            &json!({
                "id": "memory-connector",
                "type": "memory",
                "version": "1.0.0",
                "entry": "memory",
                "instances": [
                    {"id": "with-env", "config": {"clientSecret": "${X_SECRET}"}},
                    {"id": "missing-env", "config": {"clientSecret": "${X_UNSET_VARIABLE}"}}
                ]
            }),
        );

        let captured = Arc::new(std::sync::Mutex::new(Vec::<Value>::new()));
        let seen = Arc::clone(&captured);
        let mut catalog = FactoryCatalog::new();
        catalog.register("memory", move |ctx| {
            seen.lock().unwrap().push(ctx.config.clone());
            Ok(Arc::new(MockConnector) as BoxedConnector)
        });

        let registry = ConnectorRegistry::new();
        let loader = ConnectorLoader::new(&catalog, &registry);
        let report = loader.load_dir(dir.path()).await.unwrap();

        // The instance with the missing variable fails; the other proceeds.
        assert_eq!(report.initialized, vec!["with-env"]);
        assert_eq!(report.failed_instances.len(), 1);
        assert!(report.failed_instances[0].contains("X_UNSET_VARIABLE"));

        let configs = captured.lock().unwrap();
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0]["clientSecret"], "shh");
    }

    #[tokio::test]
    async fn test_invalid_manifest_skipped_others_loaded() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            "broken",
            &json!({"id": "broken", "type": "memory", "version": "not-semver", "entry": "memory"}),
        );
        let garbage = dir.path().join("garbage");
        fs::create_dir_all(&garbage).unwrap();
        fs::write(garbage.join(MANIFEST_FILE), "{not json").unwrap();
        write_manifest(
            dir.path(),
            "working",
            &json!({
                "id": "working",
                "type": "memory",
                "version": "1.0.0",
                "entry": "memory",
                "instances": [{"id": "ok-1"}]
            }),
        );

        let (catalog, _) = catalog_with_counter();
        let registry = ConnectorRegistry::new();
        let loader = ConnectorLoader::new(&catalog, &registry);
        let report = loader.load_dir(dir.path()).await.unwrap();

        assert_eq!(report.initialized, vec!["ok-1"]);
        assert_eq!(report.skipped_manifests.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_entry_skipped() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            "memory",
            &json!({
                "id": "x",
                "type": "memory",
                "version": "1.0.0",
                "entry": "not-in-catalog",
                "instances": [{"id": "a"}]
            }),
        );

        let (catalog, calls) = catalog_with_counter();
        let registry = ConnectorRegistry::new();
        let loader = ConnectorLoader::new(&catalog, &registry);
        let report = loader.load_dir(dir.path()).await.unwrap();

        assert!(report.initialized.is_empty());
        assert_eq!(report.skipped_manifests.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_instances_warns_but_registers_factory() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            "memory",
            &json!({"id": "x", "type": "memory", "version": "1.0.0", "entry": "memory"}),
        );

        let (catalog, _) = catalog_with_counter();
        let registry = ConnectorRegistry::new();
        let loader = ConnectorLoader::new(&catalog, &registry);
        let report = loader.load_dir(dir.path()).await.unwrap();

        assert_eq!(report.registered, vec!["memory@1.0.0"]);
        assert!(report.initialized.is_empty());
        assert!(report.skipped_manifests.is_empty());
        assert!(registry
            .has_factory(&ConnectorKey::new("memory", "1.0.0").unwrap())
            .await);
    }

    #[tokio::test]
    async fn test_version_override_without_factory_fails_instance() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            "memory",
            &json!({
                "id": "x",
                "type": "memory",
                "version": "1.0.0",
                "entry": "memory",
                "instances": [
                    {"id": "current"},
                    {"id": "pinned", "connectorVersion": "2.0.0"}
                ]
            }),
        );

        let (catalog, _) = catalog_with_counter();
        let registry = ConnectorRegistry::new();
        let loader = ConnectorLoader::new(&catalog, &registry);
        let report = loader.load_dir(dir.path()).await.unwrap();

        assert_eq!(report.initialized, vec!["current"]);
        assert_eq!(report.failed_instances.len(), 1);
        assert!(report.failed_instances[0].starts_with("pinned"));
    }

    #[test]
    fn test_env_placeholder_matching() {
        assert_eq!(env_placeholder("${X_SECRET}"), Some("X_SECRET"));
        assert_eq!(env_placeholder("${A1_B2}"), Some("A1_B2"));
        assert_eq!(env_placeholder("${}"), None);
        assert_eq!(env_placeholder("${lower}"), None);
        assert_eq!(env_placeholder("prefix ${X}"), None);
        assert_eq!(env_placeholder("plain"), None);
    }
}
