//! Connector capability traits
//!
//! Connectors implement the base [`Connector`] trait plus whichever
//! capability traits their backend supports. The base trait exposes each
//! capability through an `as_*` accessor returning `None` by default;
//! the facade raises `NotSupported` when an accessor comes back empty.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ConnectorResult;
use crate::filter::Filter;
use crate::operation::{
    AttributeMap, ConnectorObject, OperationOptions, ScriptContext, SearchPage, StreamingSearchResult,
    SyncDelta, SyncToken,
};
use crate::schema::Schema;

/// Base trait all connectors implement.
///
/// Accessors default to `None`; a connector overrides exactly those that
/// match the traits it implements.
pub trait Connector: Send + Sync {
    /// Human-readable name for logs.
    fn display_name(&self) -> &str;

    /// Connection liveness probe, when supported.
    fn as_test(&self) -> Option<&dyn TestOp> {
        None
    }

    /// Schema discovery, when supported.
    fn as_schema(&self) -> Option<&dyn SchemaOp> {
        None
    }

    /// Single-object read, when supported.
    fn as_get(&self) -> Option<&dyn GetOp> {
        None
    }

    /// Object creation, when supported.
    fn as_create(&self) -> Option<&dyn CreateOp> {
        None
    }

    /// Object update, when supported.
    fn as_update(&self) -> Option<&dyn UpdateOp> {
        None
    }

    /// Object deletion, when supported.
    fn as_delete(&self) -> Option<&dyn DeleteOp> {
        None
    }

    /// Multi-valued attribute add/remove, when supported.
    fn as_attribute_values(&self) -> Option<&dyn AttributeValuesOp> {
        None
    }

    /// List-mode search, when supported.
    fn as_search(&self) -> Option<&dyn SearchOp> {
        None
    }

    /// Streaming search, when supported.
    fn as_search_streaming(&self) -> Option<&dyn StreamingSearchOp> {
        None
    }

    /// Delta sync, when supported.
    fn as_sync(&self) -> Option<&dyn SyncOp> {
        None
    }

    /// Script execution, when supported.
    fn as_script(&self) -> Option<&dyn ScriptOp> {
        None
    }
}

/// Connection liveness probe.
#[async_trait]
pub trait TestOp: Send + Sync {
    /// Verify the backend is reachable with the configured credentials.
    async fn test(&self) -> ConnectorResult<()>;
}

/// Schema discovery.
#[async_trait]
pub trait SchemaOp: Send + Sync {
    /// Describe the object classes this connector manages.
    async fn schema(&self) -> ConnectorResult<Schema>;
}

/// Single-object read.
#[async_trait]
pub trait GetOp: Send + Sync {
    /// Fetch one object by uid, or `None` when it does not exist.
    async fn get(
        &self,
        object_class: &str,
        uid: &str,
        options: &OperationOptions,
    ) -> ConnectorResult<Option<ConnectorObject>>;
}

/// Object creation.
#[async_trait]
pub trait CreateOp: Send + Sync {
    /// Create an object and return it as stored by the backend.
    async fn create(
        &self,
        object_class: &str,
        attributes: AttributeMap,
        options: &OperationOptions,
    ) -> ConnectorResult<ConnectorObject>;
}

/// Object update.
#[async_trait]
pub trait UpdateOp: Send + Sync {
    /// Replace the given attributes and return the updated object.
    async fn update(
        &self,
        object_class: &str,
        uid: &str,
        attributes: AttributeMap,
        options: &OperationOptions,
    ) -> ConnectorResult<ConnectorObject>;
}

/// Object deletion.
#[async_trait]
pub trait DeleteOp: Send + Sync {
    /// Delete one object by uid.
    async fn delete(
        &self,
        object_class: &str,
        uid: &str,
        options: &OperationOptions,
    ) -> ConnectorResult<()>;
}

/// Add/remove values on multi-valued attributes.
#[async_trait]
pub trait AttributeValuesOp: Send + Sync {
    /// Add the given values to multi-valued attributes.
    async fn add_values(
        &self,
        object_class: &str,
        uid: &str,
        attributes: AttributeMap,
        options: &OperationOptions,
    ) -> ConnectorResult<ConnectorObject>;

    /// Remove the given values from multi-valued attributes.
    async fn remove_values(
        &self,
        object_class: &str,
        uid: &str,
        attributes: AttributeMap,
        options: &OperationOptions,
    ) -> ConnectorResult<ConnectorObject>;
}

/// List-mode search returning one page per call.
#[async_trait]
pub trait SearchOp: Send + Sync {
    /// Execute a search and return a page of results.
    async fn search(
        &self,
        object_class: &str,
        filter: Option<&Filter>,
        options: &OperationOptions,
    ) -> ConnectorResult<SearchPage>;
}

/// Consumer for streaming search results.
///
/// Returning `false` cancels the stream; the connector must stop
/// delivering before crossing the next page boundary.
pub trait SearchHandler: Send {
    fn handle(&mut self, object: ConnectorObject) -> bool;
}

impl<F> SearchHandler for F
where
    F: FnMut(ConnectorObject) -> bool + Send,
{
    fn handle(&mut self, object: ConnectorObject) -> bool {
        self(object)
    }
}

/// Streaming search delivering objects to a handler page by page.
#[async_trait]
pub trait StreamingSearchOp: Send + Sync {
    /// Execute a search, feeding each object to `handler` in backend
    /// order. Page boundaries are crossed only after every object of the
    /// prior page has been offered.
    async fn search_streaming(
        &self,
        object_class: &str,
        filter: Option<&Filter>,
        options: &OperationOptions,
        handler: &mut dyn SearchHandler,
    ) -> ConnectorResult<StreamingSearchResult>;
}

/// Delta sync.
#[async_trait]
pub trait SyncOp: Send + Sync {
    /// Fetch changes since `token`. A `None` token is interpreted by the
    /// connector (from-beginning vs from-now is its contract).
    async fn sync(
        &self,
        object_class: &str,
        token: Option<&SyncToken>,
        options: &OperationOptions,
    ) -> ConnectorResult<SyncDelta>;
}

/// Script execution on the connector.
#[async_trait]
pub trait ScriptOp: Send + Sync {
    /// Run a script and return its connector-defined result.
    async fn run_script(&self, context: &ScriptContext) -> ConnectorResult<Value>;
}
