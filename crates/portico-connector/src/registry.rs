//! Connector registry
//!
//! Keys factories and config builders by `type@version` and owns the
//! initialized connector instances for the process lifetime. Writes
//! happen during startup loading and optional hot registration; reads
//! dominate afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{BuiltConfiguration, ConfigBuilder};
use crate::error::{ConnectorError, ConnectorResult};
use crate::traits::Connector;
use crate::types::ConnectorKey;

/// Type alias for a shared connector implementation.
pub type BoxedConnector = Arc<dyn Connector>;

/// Everything a factory receives to materialize a connector.
#[derive(Debug)]
pub struct FactoryContext {
    /// Unique instance id.
    pub instance_id: String,
    /// Connector type name.
    pub connector_type: String,
    /// Connector version.
    pub connector_version: String,
    /// Effective (post-build, validated) configuration.
    pub config: serde_json::Value,
}

/// Factory function creating connectors from a context.
pub type ConnectorFactory = Box<dyn Fn(FactoryContext) -> ConnectorResult<BoxedConnector> + Send + Sync>;

/// A configured, initialized connector. Created once, never mutated.
pub struct ConnectorInstance {
    /// Unique instance id.
    pub id: String,
    /// The factory key this instance was created from.
    pub key: ConnectorKey,
    /// Effective configuration.
    pub config: BuiltConfiguration,
    connector: BoxedConnector,
}

impl ConnectorInstance {
    /// The connector implementation.
    #[must_use]
    pub fn connector(&self) -> &BoxedConnector {
        &self.connector
    }
}

impl std::fmt::Debug for ConnectorInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorInstance")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

/// Registry for connector factories, config builders and instances.
pub struct ConnectorRegistry {
    factories: RwLock<HashMap<String, ConnectorFactory>>,
    config_builders: RwLock<HashMap<String, ConfigBuilder>>,
    instances: RwLock<HashMap<String, Arc<ConnectorInstance>>>,
}

impl ConnectorRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            config_builders: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Register a factory for a `(type, version)` pair.
    ///
    /// A pair has at most one factory; re-registering replaces the
    /// previous one with a warning.
    pub async fn register_factory(&self, key: &ConnectorKey, factory: ConnectorFactory) {
        let mut factories = self.factories.write().await;
        if factories.insert(key.composite(), factory).is_some() {
            warn!(key = %key, "replacing previously registered connector factory");
        }
    }

    /// Register a config builder for a `(type, version)` pair.
    pub async fn register_config_builder(&self, key: &ConnectorKey, builder: ConfigBuilder) {
        let mut builders = self.config_builders.write().await;
        if builders.insert(key.composite(), builder).is_some() {
            warn!(key = %key, "replacing previously registered config builder");
        }
    }

    /// Check if a factory is registered for a key.
    pub async fn has_factory(&self, key: &ConnectorKey) -> bool {
        self.factories.read().await.contains_key(&key.composite())
    }

    /// Initialize and store a connector instance.
    ///
    /// Runs the config builder when one is registered, then the
    /// configuration's validate hook (mandatory whenever present), then
    /// the factory.
    pub async fn init_instance(
        &self,
        id: impl Into<String>,
        connector_type: &str,
        version: &str,
        raw_config: serde_json::Value,
    ) -> ConnectorResult<Arc<ConnectorInstance>> {
        let id = id.into();
        let key = ConnectorKey::new(connector_type, version)?;

        if self.instances.read().await.contains_key(&id) {
            return Err(ConnectorError::config_invalid(
                "id",
                format!("instance id '{id}' is already registered"),
            ));
        }

        let config = {
            let builders = self.config_builders.read().await;
            match builders.get(&key.composite()) {
                Some(builder) => builder(raw_config)?,
                None => BuiltConfiguration::new(raw_config),
            }
        };
        config.validate()?;

        let instance = {
            let factories = self.factories.read().await;
            let factory = factories.get(&key.composite()).ok_or_else(|| {
                ConnectorError::UnknownConnectorType {
                    key: key.composite(),
                }
            })?;

            let connector = factory(FactoryContext {
                instance_id: id.clone(),
                connector_type: key.connector_type.clone(),
                connector_version: key.version.clone(),
                config: config.value.clone(),
            })?;

            Arc::new(ConnectorInstance {
                id: id.clone(),
                key: key.clone(),
                config,
                connector,
            })
        };

        let mut instances = self.instances.write().await;
        if instances.contains_key(&id) {
            return Err(ConnectorError::config_invalid(
                "id",
                format!("instance id '{id}' is already registered"),
            ));
        }
        instances.insert(id.clone(), Arc::clone(&instance));

        debug!(instance_id = %id, key = %key, "connector instance initialized");
        Ok(instance)
    }

    /// Get an instance by id.
    pub async fn get(&self, id: &str) -> ConnectorResult<Arc<ConnectorInstance>> {
        self.instances
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ConnectorError::ConnectorNotFound { id: id.to_string() })
    }

    /// Check if an instance id is registered.
    pub async fn has(&self, id: &str) -> bool {
        self.instances.read().await.contains_key(id)
    }

    /// All instance ids, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All registered factory keys.
    pub async fn keys(&self) -> Vec<ConnectorKey> {
        self.factories
            .read()
            .await
            .keys()
            .filter_map(|composite| composite.parse().ok())
            .collect()
    }

    /// All instances.
    pub async fn list(&self) -> Vec<Arc<ConnectorInstance>> {
        self.instances.read().await.values().cloned().collect()
    }

    /// All registered versions for a type, semver-ascending.
    pub async fn versions(&self, connector_type: &str) -> Vec<String> {
        let mut versions: Vec<semver::Version> = self
            .keys()
            .await
            .into_iter()
            .filter(|key| key.connector_type == connector_type)
            .map(|key| key.semver())
            .collect();
        versions.sort();
        versions.into_iter().map(|v| v.to_string()).collect()
    }

    /// The highest registered version for a type.
    pub async fn latest_version(&self, connector_type: &str) -> Option<String> {
        self.versions(connector_type).await.pop()
    }

    /// Number of initialized instances.
    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("factories", &"<factories>")
            .field("instances", &"<instances>")
            .finish()
    }
}
