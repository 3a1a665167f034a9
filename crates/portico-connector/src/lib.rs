//! # Portico Connector Framework
//!
//! Core abstractions for hosting pluggable connectors that mediate
//! uniform CRUD, search, sync and attribute operations against
//! heterogeneous backends (directories, SaaS APIs, databases).
//!
//! ## Architecture
//!
//! The framework uses a capability-based trait system: connectors
//! implement the base [`traits::Connector`] trait plus whichever
//! capability traits their backend supports, and the host drives them
//! through a per-instance [`facade::ConnectorFacade`] that layers in a
//! circuit breaker, request coalescing via a shared TTL cache, and
//! write-path cache invalidation.
//!
//! ## Example
//!
//! ```ignore
//! use portico_connector::prelude::*;
//!
//! // Register factories and initialize instances through the registry.
//! let registry = ConnectorRegistry::new();
//! registry.register_factory(&key, factory).await;
//! let instance = registry
//!     .init_instance("alpha", "ldap", "1.2.0", raw_config)
//!     .await?;
//!
//! // Wrap the instance in a facade and call uniform operations.
//! let cache = Arc::new(TtlCache::with_defaults());
//! let facade = ConnectorFacade::new(instance, cache);
//! let schema = facade.schema().await?;
//! let user = facade.get("User", "u1", &OperationOptions::new()).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`types`] - Keys and shared enums (`ConnectorKey`, `OperationKind`)
//! - [`error`] - Error taxonomy with transient/permanent classification
//! - [`operation`] - Objects, attribute values, options and result shapes
//! - [`schema`] - Schema types (`ObjectClassInfo`, `SchemaAttribute`)
//! - [`filter`] - Filter AST parsed from untrusted input
//! - [`translate`] - Filter translators (query-string and SQL dialects)
//! - [`traits`] - Connector capability traits
//! - [`config`] - Configuration building and validation
//! - [`resilience`] - Circuit breaker with concurrency cap and timeouts
//! - [`cache`] - Bounded TTL/LRU cache with prefix invalidation
//! - [`facade`] - The resilience-and-caching wrapper per instance
//! - [`registry`] - Versioned factory and instance management
//! - [`loader`] - Manifest-driven connector loading

pub mod cache;
pub mod config;
pub mod error;
pub mod facade;
pub mod filter;
pub mod loader;
pub mod operation;
pub mod registry;
pub mod resilience;
pub mod schema;
pub mod traits;
pub mod translate;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```
/// use portico_connector::prelude::*;
/// ```
pub mod prelude {
    // Types and keys
    pub use crate::types::{CircuitState, ConnectorKey, OperationKind};

    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult};

    // Operation data model
    pub use crate::operation::{
        AttributeMap, AttributeValue, ConnectorObject, ContainerRef, OperationOptions,
        ScalarValue, ScriptContext, SearchPage, SearchScope, SortKey, SortOrder,
        StreamingSearchResult, SyncDelta, SyncToken, TotalPagedResultsPolicy, DELETED_MARKER,
    };

    // Schema
    pub use crate::schema::{
        AttributeType, ObjectClassInfo, Schema, SchemaAttribute, SchemaFeatures,
    };

    // Filters and translation
    pub use crate::filter::{CmpOp, Filter, FilterValue};
    pub use crate::translate::{to_query_filter, to_sql, SqlFragment};

    // Traits
    pub use crate::traits::{
        AttributeValuesOp, Connector, CreateOp, DeleteOp, GetOp, SchemaOp, ScriptOp,
        SearchHandler, SearchOp, StreamingSearchOp, SyncOp, TestOp, UpdateOp,
    };

    // Configuration
    pub use crate::config::{typed_builder, BuiltConfiguration, ConfigBuilder, ConnectorConfig};

    // Registry and loader
    pub use crate::loader::{ConnectorLoader, ConnectorManifest, FactoryCatalog, LoaderReport};
    pub use crate::registry::{
        BoxedConnector, ConnectorFactory, ConnectorInstance, ConnectorRegistry, FactoryContext,
    };

    // Resilience and caching
    pub use crate::cache::{CacheKey, TtlCache};
    pub use crate::facade::ConnectorFacade;
    pub use crate::resilience::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig};
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        // Verify all prelude types are accessible
        let _key = ConnectorKey::new("ldap", "1.0.0").unwrap();
        let _state = CircuitState::Closed;
        let _obj = ConnectorObject::new("User", "u1");
        let _filter = Filter::eq("mail", "user@example.com");
        let _opts = OperationOptions::new().with_page_size(50);
        let _cache = TtlCache::with_defaults();
        let _registry = ConnectorRegistry::new();
    }
}
