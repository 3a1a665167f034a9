//! Operation dispatch
//!
//! Validates `operation` frame payloads and routes them through the
//! connector facade, shaping results for the wire. The facade map is
//! pre-populated at session start and extended lazily for instances
//! registered afterwards.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use portico_connector::cache::TtlCache;
use portico_connector::error::ConnectorError;
use portico_connector::facade::ConnectorFacade;
use portico_connector::filter::Filter;
use portico_connector::operation::{AttributeMap, OperationOptions, ScriptContext, SyncToken};
use portico_connector::registry::ConnectorRegistry;

use crate::error::SessionResult;
use crate::frames::OperationName;

/// Routes operations to per-instance facades.
pub struct Dispatcher {
    registry: Arc<ConnectorRegistry>,
    cache: Arc<TtlCache>,
    facades: RwLock<HashMap<String, Arc<ConnectorFacade>>>,
}

impl Dispatcher {
    /// Create a dispatcher over a registry and the shared cache.
    #[must_use]
    pub fn new(registry: Arc<ConnectorRegistry>, cache: Arc<TtlCache>) -> Self {
        Self {
            registry,
            cache,
            facades: RwLock::new(HashMap::new()),
        }
    }

    /// Build facades for every instance currently registered.
    pub async fn prepopulate(&self) {
        let instances = self.registry.list().await;
        let mut facades = self.facades.write().await;
        for instance in instances {
            facades
                .entry(instance.id.clone())
                .or_insert_with(|| {
                    Arc::new(ConnectorFacade::new(instance, Arc::clone(&self.cache)))
                });
        }
        debug!(count = facades.len(), "facade map populated");
    }

    /// Current connector instance ids.
    pub async fn connector_ids(&self) -> Vec<String> {
        self.registry.ids().await
    }

    /// Get the facade for an instance, creating it on first use.
    pub async fn facade(&self, connector_id: &str) -> SessionResult<Arc<ConnectorFacade>> {
        {
            let facades = self.facades.read().await;
            if let Some(facade) = facades.get(connector_id) {
                return Ok(Arc::clone(facade));
            }
        }

        // Lazy creation for instances registered after start.
        let instance = self.registry.get(connector_id).await?;
        let mut facades = self.facades.write().await;
        let facade = facades
            .entry(connector_id.to_string())
            .or_insert_with(|| Arc::new(ConnectorFacade::new(instance, Arc::clone(&self.cache))));
        Ok(Arc::clone(facade))
    }

    /// Validate a payload and execute the operation, returning the
    /// result value for the response frame.
    pub async fn dispatch(
        &self,
        connector_id: &str,
        operation: OperationName,
        payload: &Value,
    ) -> SessionResult<Value> {
        let facade = self.facade(connector_id).await?;

        let result = match operation {
            OperationName::Schema => serde_json::to_value(facade.schema().await?)
                .map_err(ConnectorError::from)?,

            OperationName::Test => {
                facade.test().await?;
                Value::Null
            }

            OperationName::Create => {
                let object_class = require_str(payload, "objectClass")?;
                let attrs = attrs_of(payload)?;
                let options = options_of(payload)?;
                serde_json::to_value(facade.create(&object_class, attrs, &options).await?)
                    .map_err(ConnectorError::from)?
            }

            OperationName::Get => {
                let object_class = require_str(payload, "objectClass")?;
                let uid = require_str(payload, "uid")?;
                let options = options_of(payload)?;
                match facade.get(&object_class, &uid, &options).await? {
                    Some(object) => serde_json::to_value(object).map_err(ConnectorError::from)?,
                    None => Value::Null,
                }
            }

            OperationName::Update => {
                let object_class = require_str(payload, "objectClass")?;
                let uid = require_str(payload, "uid")?;
                let attrs = attrs_of(payload)?;
                let options = options_of(payload)?;
                serde_json::to_value(facade.update(&object_class, &uid, attrs, &options).await?)
                    .map_err(ConnectorError::from)?
            }

            OperationName::Delete => {
                let object_class = require_str(payload, "objectClass")?;
                let uid = require_str(payload, "uid")?;
                let options = options_of(payload)?;
                facade.delete(&object_class, &uid, &options).await?;
                Value::Null
            }

            OperationName::Search => {
                let object_class = require_str(payload, "objectClass")?;
                let filter = filter_of(payload)?;
                let options = options_of(payload)?;
                let page = facade
                    .search(&object_class, filter.as_ref(), &options)
                    .await?;
                serde_json::to_value(page).map_err(ConnectorError::from)?
            }

            OperationName::Sync => {
                let object_class = require_str(payload, "objectClass")?;
                let token = token_of(payload)?;
                let options = options_of(payload)?;
                let delta = facade
                    .sync(&object_class, token.as_ref(), &options)
                    .await?;
                serde_json::to_value(delta).map_err(ConnectorError::from)?
            }

            OperationName::AddAttributeValues => {
                let object_class = require_str(payload, "objectClass")?;
                let uid = require_str(payload, "uid")?;
                let attrs = attrs_of(payload)?;
                let options = options_of(payload)?;
                serde_json::to_value(
                    facade
                        .add_attribute_values(&object_class, &uid, attrs, &options)
                        .await?,
                )
                .map_err(ConnectorError::from)?
            }

            OperationName::RemoveAttributeValues => {
                let object_class = require_str(payload, "objectClass")?;
                let uid = require_str(payload, "uid")?;
                let attrs = attrs_of(payload)?;
                let options = options_of(payload)?;
                serde_json::to_value(
                    facade
                        .remove_attribute_values(&object_class, &uid, attrs, &options)
                        .await?,
                )
                .map_err(ConnectorError::from)?
            }

            OperationName::ScriptOnConnector => {
                let context = script_context_of(payload)?;
                facade.script_on_connector(&context).await?
            }
        };

        Ok(result)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish()
    }
}

fn require_str(payload: &Value, field: &str) -> SessionResult<String> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ConnectorError::validation(format!("payload field '{field}' is required")).into()
        })
}

fn attrs_of(payload: &Value) -> SessionResult<AttributeMap> {
    let attrs = payload.get("attrs").ok_or_else(|| {
        ConnectorError::validation("payload field 'attrs' is required")
    })?;
    if !attrs.is_object() {
        return Err(ConnectorError::validation("payload field 'attrs' must be an object").into());
    }
    serde_json::from_value(attrs.clone())
        .map_err(|e| ConnectorError::validation(format!("invalid attrs: {e}")).into())
}

fn options_of(payload: &Value) -> SessionResult<OperationOptions> {
    match payload.get("options") {
        None | Some(Value::Null) => Ok(OperationOptions::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| ConnectorError::validation(format!("invalid options: {e}")).into()),
    }
}

fn filter_of(payload: &Value) -> SessionResult<Option<Filter>> {
    match payload.get("filter") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(Filter::parse(value)?)),
    }
}

fn token_of(payload: &Value) -> SessionResult<Option<SyncToken>> {
    match payload.get("token") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| {
                ConnectorError::validation(format!("invalid sync token: {e}")).into()
            }),
    }
}

fn script_context_of(payload: &Value) -> SessionResult<ScriptContext> {
    let context = payload.get("context").ok_or_else(|| {
        ConnectorError::validation("payload field 'context' is required")
    })?;
    let context: ScriptContext = serde_json::from_value(context.clone())
        .map_err(|e| ConnectorError::validation(format!("invalid script context: {e}")))?;
    if context.language.is_empty() || context.script.is_empty() {
        return Err(
            ConnectorError::validation("context.language and context.script are required").into(),
        );
    }
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use async_trait::async_trait;
    use portico_connector::error::ConnectorResult;
    use portico_connector::operation::{
        AttributeValue, ConnectorObject, SearchPage, SyncDelta,
    };
    use portico_connector::registry::{BoxedConnector, ConnectorFactory, FactoryContext};
    use portico_connector::schema::{ObjectClassInfo, Schema};
    use portico_connector::traits::{
        Connector, CreateOp, DeleteOp, GetOp, SchemaOp, ScriptOp, SearchOp, SyncOp, UpdateOp,
    };
    use portico_connector::types::ConnectorKey;
    use serde_json::json;

    struct WireMockConnector;

    impl Connector for WireMockConnector {
        fn display_name(&self) -> &str {
            "wire-mock"
        }

        fn as_get(&self) -> Option<&dyn GetOp> {
            Some(self)
        }
        fn as_create(&self) -> Option<&dyn CreateOp> {
            Some(self)
        }
        fn as_update(&self) -> Option<&dyn UpdateOp> {
            Some(self)
        }
        fn as_delete(&self) -> Option<&dyn DeleteOp> {
            Some(self)
        }
        fn as_schema(&self) -> Option<&dyn SchemaOp> {
            Some(self)
        }
        fn as_search(&self) -> Option<&dyn SearchOp> {
            Some(self)
        }
        fn as_sync(&self) -> Option<&dyn SyncOp> {
            Some(self)
        }
        fn as_script(&self) -> Option<&dyn ScriptOp> {
            Some(self)
        }
    }

    #[async_trait]
    impl GetOp for WireMockConnector {
        async fn get(
            &self,
            object_class: &str,
            uid: &str,
            _options: &OperationOptions,
        ) -> ConnectorResult<Option<ConnectorObject>> {
            if uid == "missing" {
                return Ok(None);
            }
            Ok(Some(
                ConnectorObject::new(object_class, uid)
                    .with_attribute("mail", AttributeValue::string("u@example.com")),
            ))
        }
    }

    #[async_trait]
    impl CreateOp for WireMockConnector {
        async fn create(
            &self,
            object_class: &str,
            attributes: AttributeMap,
            _options: &OperationOptions,
        ) -> ConnectorResult<ConnectorObject> {
            let mut object = ConnectorObject::new(object_class, "created-1");
            object.attributes = attributes;
            Ok(object)
        }
    }

    #[async_trait]
    impl UpdateOp for WireMockConnector {
        async fn update(
            &self,
            object_class: &str,
            uid: &str,
            attributes: AttributeMap,
            _options: &OperationOptions,
        ) -> ConnectorResult<ConnectorObject> {
            let mut object = ConnectorObject::new(object_class, uid);
            object.attributes = attributes;
            Ok(object)
        }
    }

    #[async_trait]
    impl DeleteOp for WireMockConnector {
        async fn delete(
            &self,
            _object_class: &str,
            _uid: &str,
            _options: &OperationOptions,
        ) -> ConnectorResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl SchemaOp for WireMockConnector {
        async fn schema(&self) -> ConnectorResult<Schema> {
            Ok(Schema::with_object_classes(vec![
                ObjectClassInfo::new("User").supporting_all(),
            ]))
        }
    }

    #[async_trait]
    impl SearchOp for WireMockConnector {
        async fn search(
            &self,
            object_class: &str,
            filter: Option<&Filter>,
            _options: &OperationOptions,
        ) -> ConnectorResult<SearchPage> {
            let uid = if filter.is_some() { "filtered" } else { "all" };
            Ok(SearchPage {
                results: vec![ConnectorObject::new(object_class, uid)],
                next_offset: Some(10),
            })
        }
    }

    #[async_trait]
    impl SyncOp for WireMockConnector {
        async fn sync(
            &self,
            object_class: &str,
            token: Option<&SyncToken>,
            _options: &OperationOptions,
        ) -> ConnectorResult<SyncDelta> {
            Ok(SyncDelta {
                token: SyncToken::new(match token {
                    Some(t) => format!("{}-next", t.value),
                    None => "first".into(),
                }),
                changes: vec![ConnectorObject::deleted(object_class, "gone")],
            })
        }
    }

    #[async_trait]
    impl ScriptOp for WireMockConnector {
        async fn run_script(&self, context: &ScriptContext) -> ConnectorResult<Value> {
            Ok(json!({"ran": context.language}))
        }
    }

    async fn dispatcher() -> Dispatcher {
        let registry = Arc::new(ConnectorRegistry::new());
        let factory: ConnectorFactory =
            Box::new(|_ctx: FactoryContext| Ok(Arc::new(WireMockConnector) as BoxedConnector));
        registry
            .register_factory(&ConnectorKey::new("mock", "1.0.0").unwrap(), factory)
            .await;
        registry
            .init_instance("alpha", "mock", "1.0.0", json!({}))
            .await
            .unwrap();

        let dispatcher = Dispatcher::new(registry, Arc::new(TtlCache::with_defaults()));
        dispatcher.prepopulate().await;
        dispatcher
    }

    #[tokio::test]
    async fn test_schema_dispatch() {
        let d = dispatcher().await;
        let result = d
            .dispatch("alpha", OperationName::Schema, &json!({}))
            .await
            .unwrap();
        assert_eq!(result["objectClasses"][0]["name"], "User");
    }

    #[tokio::test]
    async fn test_get_dispatch_and_null_result() {
        let d = dispatcher().await;

        let result = d
            .dispatch(
                "alpha",
                OperationName::Get,
                &json!({"objectClass": "User", "uid": "u1"}),
            )
            .await
            .unwrap();
        assert_eq!(result["uid"], "u1");
        assert_eq!(result["attributes"]["mail"], "u@example.com");

        let result = d
            .dispatch(
                "alpha",
                OperationName::Get,
                &json!({"objectClass": "User", "uid": "missing"}),
            )
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_create_requires_attrs_object() {
        let d = dispatcher().await;

        let err = d
            .dispatch("alpha", OperationName::Create, &json!({"objectClass": "User"}))
            .await
            .unwrap_err();
        assert_eq!(err.wire_name(), "ValidationFailed");

        let err = d
            .dispatch(
                "alpha",
                OperationName::Create,
                &json!({"objectClass": "User", "attrs": "not-an-object"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.wire_name(), "ValidationFailed");

        let result = d
            .dispatch(
                "alpha",
                OperationName::Create,
                &json!({"objectClass": "User", "attrs": {"mail": "a@b.c"}}),
            )
            .await
            .unwrap();
        assert_eq!(result["uid"], "created-1");
    }

    #[tokio::test]
    async fn test_update_and_delete_require_uid() {
        let d = dispatcher().await;

        let err = d
            .dispatch(
                "alpha",
                OperationName::Update,
                &json!({"objectClass": "User", "attrs": {}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.wire_name(), "ValidationFailed");

        let result = d
            .dispatch(
                "alpha",
                OperationName::Delete,
                &json!({"objectClass": "User", "uid": "u1"}),
            )
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_search_with_default_and_parsed_filter() {
        let d = dispatcher().await;

        let result = d
            .dispatch("alpha", OperationName::Search, &json!({"objectClass": "User"}))
            .await
            .unwrap();
        assert_eq!(result["results"][0]["uid"], "all");
        assert_eq!(result["nextOffset"], 10);

        let result = d
            .dispatch(
                "alpha",
                OperationName::Search,
                &json!({
                    "objectClass": "User",
                    "filter": {"type": "CMP", "op": "EQ", "path": ["mail"], "value": "a@b.c"}
                }),
            )
            .await
            .unwrap();
        assert_eq!(result["results"][0]["uid"], "filtered");

        let err = d
            .dispatch(
                "alpha",
                OperationName::Search,
                &json!({
                    "objectClass": "User",
                    "filter": {"type": "CMP", "op": "EXISTS", "path": ["mail"], "value": "x"}
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.wire_name(), "ValidationFailed");
    }

    #[tokio::test]
    async fn test_sync_token_round_trip() {
        let d = dispatcher().await;

        let result = d
            .dispatch("alpha", OperationName::Sync, &json!({"objectClass": "User"}))
            .await
            .unwrap();
        assert_eq!(result["token"]["value"], "first");
        assert_eq!(result["changes"][0]["attributes"]["__DELETED__"], true);

        let result = d
            .dispatch(
                "alpha",
                OperationName::Sync,
                &json!({"objectClass": "User", "token": {"value": "first"}}),
            )
            .await
            .unwrap();
        assert_eq!(result["token"]["value"], "first-next");
    }

    #[tokio::test]
    async fn test_script_context_validation() {
        let d = dispatcher().await;

        let err = d
            .dispatch(
                "alpha",
                OperationName::ScriptOnConnector,
                &json!({"context": {"language": "groovy"}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.wire_name(), "ValidationFailed");

        let result = d
            .dispatch(
                "alpha",
                OperationName::ScriptOnConnector,
                &json!({"context": {"language": "groovy", "script": "return 1", "params": {"a": 1}}}),
            )
            .await
            .unwrap();
        assert_eq!(result["ran"], "groovy");
    }

    #[tokio::test]
    async fn test_unknown_connector() {
        let d = dispatcher().await;
        let err = d
            .dispatch("ghost", OperationName::Schema, &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.wire_name(), "ConnectorNotFound");
        assert!(matches!(err, SessionError::Connector(_)));
    }

    #[tokio::test]
    async fn test_lazy_facade_for_late_registration() {
        let registry = Arc::new(ConnectorRegistry::new());
        let factory: ConnectorFactory =
            Box::new(|_ctx: FactoryContext| Ok(Arc::new(WireMockConnector) as BoxedConnector));
        registry
            .register_factory(&ConnectorKey::new("mock", "1.0.0").unwrap(), factory)
            .await;

        let d = Dispatcher::new(Arc::clone(&registry), Arc::new(TtlCache::with_defaults()));
        d.prepopulate().await;

        // Registered after the session started.
        registry
            .init_instance("late", "mock", "1.0.0", json!({}))
            .await
            .unwrap();

        let result = d
            .dispatch("late", OperationName::Test, &json!({}))
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let d = dispatcher().await;
        let err = d
            .dispatch(
                "alpha",
                OperationName::Search,
                &json!({"objectClass": "User", "options": {"pageSize": 9999}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.wire_name(), "ValidationFailed");
    }
}
