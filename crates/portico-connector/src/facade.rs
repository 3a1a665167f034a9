//! Connector facade
//!
//! The resilience-and-caching wrapper around exactly one connector
//! instance. Every backend call runs through the instance's circuit
//! breaker; reads are coalesced through the shared cache and writes
//! invalidate the affected key prefixes before returning.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::cache::{CacheKey, TtlCache};
use crate::error::{ConnectorError, ConnectorResult};
use crate::filter::Filter;
use crate::operation::{
    AttributeMap, ConnectorObject, OperationOptions, ScriptContext, SearchPage,
    StreamingSearchResult, SyncDelta, SyncToken,
};
use crate::registry::ConnectorInstance;
use crate::resilience::CircuitBreaker;
use crate::schema::Schema;
use crate::traits::SearchHandler;

/// TTL for cached schemas.
const SCHEMA_TTL: Duration = Duration::from_secs(300);
/// TTL for cached single-object reads.
const GET_TTL: Duration = Duration::from_secs(30);
/// Page size used when bridging a list-mode impl to a streaming caller.
const BRIDGE_PAGE_SIZE: u32 = 100;

/// Facade over one connector instance.
///
/// Holds a non-owning reference to the instance and exclusively owns its
/// circuit breaker. The cache is process-shared; keys are namespaced by
/// instance id.
pub struct ConnectorFacade {
    instance: Arc<ConnectorInstance>,
    cache: Arc<TtlCache>,
    breaker: CircuitBreaker,
}

impl ConnectorFacade {
    /// Create a facade with a default breaker.
    #[must_use]
    pub fn new(instance: Arc<ConnectorInstance>, cache: Arc<TtlCache>) -> Self {
        let breaker = CircuitBreaker::with_defaults(instance.id.clone());
        Self::with_breaker(instance, cache, breaker)
    }

    /// Create a facade with a custom breaker.
    #[must_use]
    pub fn with_breaker(
        instance: Arc<ConnectorInstance>,
        cache: Arc<TtlCache>,
        breaker: CircuitBreaker,
    ) -> Self {
        Self {
            instance,
            cache,
            breaker,
        }
    }

    /// The wrapped instance id.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance.id
    }

    /// The breaker, for introspection.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn timeout_for(&self, options: &OperationOptions) -> Duration {
        options
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.breaker.config().timeout)
    }

    /// Probe the backend connection. Connectors without a test capability
    /// succeed silently.
    #[instrument(skip(self), fields(instance_id = %self.instance.id))]
    pub async fn test(&self) -> ConnectorResult<()> {
        match self.instance.connector().as_test() {
            Some(op) => self.breaker.execute(|| op.test()).await,
            None => {
                debug!("connector has no test capability, succeeding silently");
                Ok(())
            }
        }
    }

    /// Fetch the connector schema, cached for five minutes.
    #[instrument(skip(self), fields(instance_id = %self.instance.id))]
    pub async fn schema(&self) -> ConnectorResult<Schema> {
        let key = CacheKey::new("schema").part(&self.instance.id).build();

        if let Some(hit) = self.cache.get(&key) {
            return Ok(serde_json::from_value(hit)?);
        }

        let schema = match self.instance.connector().as_schema() {
            Some(op) => self.breaker.execute(|| op.schema()).await?,
            None => Schema::empty_with_complex_attributes(),
        };

        self.cache
            .set_with_ttl(key, serde_json::to_value(&schema)?, SCHEMA_TTL);
        Ok(schema)
    }

    /// Fetch one object, cached for thirty seconds keyed by projection.
    /// Only non-null results are cached.
    #[instrument(skip(self, options), fields(instance_id = %self.instance.id))]
    pub async fn get(
        &self,
        object_class: &str,
        uid: &str,
        options: &OperationOptions,
    ) -> ConnectorResult<Option<ConnectorObject>> {
        options.validate()?;

        let key = CacheKey::new("get")
            .part(&self.instance.id)
            .part(&object_class)
            .part(&uid)
            .part(&options.normalized_attributes_to_get())
            .build();

        if let Some(hit) = self.cache.get(&key) {
            return Ok(Some(serde_json::from_value(hit)?));
        }

        let op = self
            .instance
            .connector()
            .as_get()
            .ok_or_else(|| ConnectorError::not_supported("get"))?;

        let result = self
            .breaker
            .execute_with_timeout(self.timeout_for(options), || {
                op.get(object_class, uid, options)
            })
            .await?;

        if let Some(object) = &result {
            self.cache
                .set_with_ttl(key, serde_json::to_value(object)?, GET_TTL);
        }
        Ok(result)
    }

    /// Create an object and invalidate the affected cache prefixes.
    #[instrument(skip(self, attributes, options), fields(instance_id = %self.instance.id))]
    pub async fn create(
        &self,
        object_class: &str,
        attributes: AttributeMap,
        options: &OperationOptions,
    ) -> ConnectorResult<ConnectorObject> {
        options.validate()?;
        crate::operation::validate_attribute_names(&attributes)?;

        let op = self
            .instance
            .connector()
            .as_create()
            .ok_or_else(|| ConnectorError::not_supported("create"))?;

        let created = self
            .breaker
            .execute_with_timeout(self.timeout_for(options), || {
                op.create(object_class, attributes.clone(), options)
            })
            .await?;

        self.invalidate_schema();
        self.invalidate_class(object_class);
        Ok(created)
    }

    /// Update an object and invalidate its cached reads.
    #[instrument(skip(self, attributes, options), fields(instance_id = %self.instance.id))]
    pub async fn update(
        &self,
        object_class: &str,
        uid: &str,
        attributes: AttributeMap,
        options: &OperationOptions,
    ) -> ConnectorResult<ConnectorObject> {
        options.validate()?;
        crate::operation::validate_attribute_names(&attributes)?;

        let op = self
            .instance
            .connector()
            .as_update()
            .ok_or_else(|| ConnectorError::not_supported("update"))?;

        let updated = self
            .breaker
            .execute_with_timeout(self.timeout_for(options), || {
                op.update(object_class, uid, attributes.clone(), options)
            })
            .await?;

        self.invalidate_object(object_class, uid);
        Ok(updated)
    }

    /// Delete an object and invalidate its cached reads.
    #[instrument(skip(self, options), fields(instance_id = %self.instance.id))]
    pub async fn delete(
        &self,
        object_class: &str,
        uid: &str,
        options: &OperationOptions,
    ) -> ConnectorResult<()> {
        options.validate()?;

        let op = self
            .instance
            .connector()
            .as_delete()
            .ok_or_else(|| ConnectorError::not_supported("delete"))?;

        self.breaker
            .execute_with_timeout(self.timeout_for(options), || {
                op.delete(object_class, uid, options)
            })
            .await?;

        self.invalidate_object(object_class, uid);
        Ok(())
    }

    /// Add values to multi-valued attributes.
    pub async fn add_attribute_values(
        &self,
        object_class: &str,
        uid: &str,
        attributes: AttributeMap,
        options: &OperationOptions,
    ) -> ConnectorResult<ConnectorObject> {
        options.validate()?;
        crate::operation::validate_attribute_names(&attributes)?;

        let op = self
            .instance
            .connector()
            .as_attribute_values()
            .ok_or_else(|| ConnectorError::not_supported("addAttributeValues"))?;

        let updated = self
            .breaker
            .execute_with_timeout(self.timeout_for(options), || {
                op.add_values(object_class, uid, attributes.clone(), options)
            })
            .await?;

        self.invalidate_object(object_class, uid);
        Ok(updated)
    }

    /// Remove values from multi-valued attributes.
    pub async fn remove_attribute_values(
        &self,
        object_class: &str,
        uid: &str,
        attributes: AttributeMap,
        options: &OperationOptions,
    ) -> ConnectorResult<ConnectorObject> {
        options.validate()?;
        crate::operation::validate_attribute_names(&attributes)?;

        let op = self
            .instance
            .connector()
            .as_attribute_values()
            .ok_or_else(|| ConnectorError::not_supported("removeAttributeValues"))?;

        let updated = self
            .breaker
            .execute_with_timeout(self.timeout_for(options), || {
                op.remove_values(object_class, uid, attributes.clone(), options)
            })
            .await?;

        self.invalidate_object(object_class, uid);
        Ok(updated)
    }

    /// List-mode search. Never cached.
    ///
    /// List-capable connectors serve this directly; streaming-only
    /// connectors are bridged by buffering the stream.
    #[instrument(skip(self, filter, options), fields(instance_id = %self.instance.id))]
    pub async fn search(
        &self,
        object_class: &str,
        filter: Option<&Filter>,
        options: &OperationOptions,
    ) -> ConnectorResult<SearchPage> {
        options.validate()?;
        if let Some(filter) = filter {
            filter.validate()?;
        }

        let connector = self.instance.connector();

        if let Some(op) = connector.as_search() {
            return self
                .breaker
                .execute_with_timeout(self.timeout_for(options), || {
                    op.search(object_class, filter, options)
                })
                .await;
        }

        if let Some(op) = connector.as_search_streaming() {
            let mut buffer: Vec<ConnectorObject> = Vec::new();
            let mut collect = |object: ConnectorObject| {
                buffer.push(object);
                true
            };
            self.breaker
                .execute_with_timeout(self.timeout_for(options), || {
                    op.search_streaming(object_class, filter, options, &mut collect)
                })
                .await?;
            return Ok(SearchPage {
                results: buffer,
                next_offset: None,
            });
        }

        Err(ConnectorError::not_supported("search"))
    }

    /// Streaming search. Never cached.
    ///
    /// Streaming-capable connectors serve this directly; list-only
    /// connectors are bridged page by page. A handler returning `false`
    /// stops delivery immediately and no further pages are fetched.
    #[instrument(skip(self, filter, options, handler), fields(instance_id = %self.instance.id))]
    pub async fn search_streaming(
        &self,
        object_class: &str,
        filter: Option<&Filter>,
        options: &OperationOptions,
        handler: &mut dyn SearchHandler,
    ) -> ConnectorResult<StreamingSearchResult> {
        options.validate()?;
        if let Some(filter) = filter {
            filter.validate()?;
        }

        let connector = self.instance.connector();

        if let Some(op) = connector.as_search_streaming() {
            return self
                .breaker
                .execute_with_timeout(self.timeout_for(options), || {
                    op.search_streaming(object_class, filter, options, handler)
                })
                .await;
        }

        let Some(op) = connector.as_search() else {
            return Err(ConnectorError::not_supported("search"));
        };

        // Page through the list-mode impl, delivering each page in backend
        // order before fetching the next.
        let page_size = options.page_size.unwrap_or(BRIDGE_PAGE_SIZE);
        let mut offset = options.paged_results_offset.unwrap_or(0);
        let mut last_cookie: Option<String> = None;

        loop {
            let mut page_options = options.clone();
            page_options.page_size = Some(page_size);
            page_options.paged_results_offset = Some(offset);

            let page = self
                .breaker
                .execute_with_timeout(self.timeout_for(options), || {
                    op.search(object_class, filter, &page_options)
                })
                .await?;

            let next_offset = page.next_offset;
            last_cookie = next_offset.map(|o| o.to_string());

            for object in page.results {
                if !handler.handle(object) {
                    return Ok(StreamingSearchResult {
                        paged_results_cookie: last_cookie,
                        remaining_paged_results: None,
                    });
                }
            }

            match next_offset {
                Some(next) => offset = next,
                None => break,
            }
        }

        Ok(StreamingSearchResult {
            paged_results_cookie: None,
            remaining_paged_results: None,
        })
    }

    /// Delta sync. Never cached.
    #[instrument(skip(self, token, options), fields(instance_id = %self.instance.id))]
    pub async fn sync(
        &self,
        object_class: &str,
        token: Option<&SyncToken>,
        options: &OperationOptions,
    ) -> ConnectorResult<SyncDelta> {
        options.validate()?;

        let op = self
            .instance
            .connector()
            .as_sync()
            .ok_or_else(|| ConnectorError::not_supported("sync"))?;

        self.breaker
            .execute_with_timeout(self.timeout_for(options), || {
                op.sync(object_class, token, options)
            })
            .await
    }

    /// Run a script on the connector. The result is caller-opaque.
    #[instrument(skip(self, context), fields(instance_id = %self.instance.id))]
    pub async fn script_on_connector(&self, context: &ScriptContext) -> ConnectorResult<Value> {
        let op = self
            .instance
            .connector()
            .as_script()
            .ok_or_else(|| ConnectorError::not_supported("scriptOnConnector"))?;

        self.breaker.execute(|| op.run_script(context)).await
    }

    fn invalidate_schema(&self) {
        let prefix = CacheKey::new("schema").part(&self.instance.id).build();
        self.cache.invalidate_prefix(&prefix);
    }

    fn invalidate_class(&self, object_class: &str) {
        let prefix = CacheKey::new("get")
            .part(&self.instance.id)
            .part(&object_class)
            .build();
        self.cache.invalidate_prefix(&prefix);
    }

    fn invalidate_object(&self, object_class: &str, uid: &str) {
        let prefix = CacheKey::new("get")
            .part(&self.instance.id)
            .part(&object_class)
            .part(&uid)
            .build();
        self.cache.invalidate_prefix(&prefix);
    }
}

impl std::fmt::Debug for ConnectorFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorFacade")
            .field("instance_id", &self.instance.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::AttributeValue;
    use crate::registry::{BoxedConnector, ConnectorFactory, ConnectorRegistry, FactoryContext};
    use crate::resilience::CircuitBreakerConfig;
    use crate::traits::{
        Connector, CreateOp, GetOp, SchemaOp, SearchOp, StreamingSearchOp, SyncOp, UpdateOp,
    };
    use crate::types::ConnectorKey;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Test double: one user object whose name flips after a mutation.
    #[derive(Default)]
    struct RecordingConnector {
        get_calls: AtomicU32,
        schema_calls: AtomicU32,
        search_calls: AtomicU32,
        mutated: AtomicBool,
        fail_backend: AtomicBool,
    }

    impl RecordingConnector {
        fn current_name(&self) -> &'static str {
            if self.mutated.load(Ordering::SeqCst) {
                "B"
            } else {
                "A"
            }
        }

        fn object(&self) -> ConnectorObject {
            ConnectorObject::new("User", "u1")
                .with_attribute("name", AttributeValue::string(self.current_name()))
        }
    }

    impl Connector for RecordingConnector {
        fn display_name(&self) -> &str {
            "recording"
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

        fn as_schema(&self) -> Option<&dyn SchemaOp> {
            Some(self)
        }

        fn as_search(&self) -> Option<&dyn SearchOp> {
            Some(self)
        }

        fn as_sync(&self) -> Option<&dyn SyncOp> {
            Some(self)
        }
    }

    #[async_trait]
    impl GetOp for RecordingConnector {
        async fn get(
            &self,
            _object_class: &str,
            _uid: &str,
            _options: &OperationOptions,
        ) -> ConnectorResult<Option<ConnectorObject>> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_backend.load(Ordering::SeqCst) {
                return Err(ConnectorError::backend("down"));
            }
            Ok(Some(self.object()))
        }
    }

    #[async_trait]
    impl CreateOp for RecordingConnector {
        async fn create(
            &self,
            object_class: &str,
            _attributes: AttributeMap,
            _options: &OperationOptions,
        ) -> ConnectorResult<ConnectorObject> {
            Ok(ConnectorObject::new(object_class, "new"))
        }
    }

    #[async_trait]
    impl UpdateOp for RecordingConnector {
        async fn update(
            &self,
            _object_class: &str,
            _uid: &str,
            _attributes: AttributeMap,
            _options: &OperationOptions,
        ) -> ConnectorResult<ConnectorObject> {
            self.mutated.store(true, Ordering::SeqCst);
            Ok(self.object())
        }
    }

    #[async_trait]
    impl SchemaOp for RecordingConnector {
        async fn schema(&self) -> ConnectorResult<Schema> {
            self.schema_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Schema::with_object_classes(vec![
                crate::schema::ObjectClassInfo::new("User").supporting_all(),
            ]))
        }
    }

    #[async_trait]
    impl SearchOp for RecordingConnector {
        async fn search(
            &self,
            object_class: &str,
            _filter: Option<&Filter>,
            options: &OperationOptions,
        ) -> ConnectorResult<SearchPage> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            // Five objects served in pages of `page_size`.
            let total = 5u64;
            let offset = options.paged_results_offset.unwrap_or(0);
            let size = options.page_size.unwrap_or(2) as u64;
            let end = (offset + size).min(total);
            let results = (offset..end)
                .map(|i| ConnectorObject::new(object_class, format!("u{i}")))
                .collect();
            Ok(SearchPage {
                results,
                next_offset: (end < total).then_some(end),
            })
        }
    }

    #[async_trait]
    impl SyncOp for RecordingConnector {
        async fn sync(
            &self,
            object_class: &str,
            token: Option<&SyncToken>,
            _options: &OperationOptions,
        ) -> ConnectorResult<SyncDelta> {
            let next = match token {
                Some(t) => format!("{}+1", t.value),
                None => "1".to_string(),
            };
            Ok(SyncDelta {
                token: SyncToken::new(next),
                changes: vec![ConnectorObject::deleted(object_class, "gone")],
            })
        }
    }

    /// Streaming-only connector yielding two pages of two objects.
    struct StreamingOnlyConnector;

    impl Connector for StreamingOnlyConnector {
        fn display_name(&self) -> &str {
            "streaming-only"
        }

        fn as_search_streaming(&self) -> Option<&dyn StreamingSearchOp> {
            Some(self)
        }
    }

    #[async_trait]
    impl StreamingSearchOp for StreamingOnlyConnector {
        async fn search_streaming(
            &self,
            object_class: &str,
            _filter: Option<&Filter>,
            _options: &OperationOptions,
            handler: &mut dyn SearchHandler,
        ) -> ConnectorResult<StreamingSearchResult> {
            for page in [["s0", "s1"], ["s2", "s3"]] {
                for uid in page {
                    if !handler.handle(ConnectorObject::new(object_class, uid)) {
                        return Ok(StreamingSearchResult {
                            paged_results_cookie: Some("cancelled".into()),
                            remaining_paged_results: Some(1),
                        });
                    }
                }
            }
            Ok(StreamingSearchResult::default())
        }
    }

    async fn facade_for(connector: BoxedConnector) -> (ConnectorFacade, Arc<TtlCache>) {
        let registry = ConnectorRegistry::new();
        let factory: ConnectorFactory =
            Box::new(move |_ctx: FactoryContext| Ok(Arc::clone(&connector)));
        registry
            .register_factory(&ConnectorKey::new("mock", "1.0.0").unwrap(), factory)
            .await;
        let instance = registry
            .init_instance("alpha", "mock", "1.0.0", json!({}))
            .await
            .unwrap();
        let cache = Arc::new(TtlCache::with_defaults());
        (
            ConnectorFacade::new(instance, Arc::clone(&cache)),
            cache,
        )
    }

    fn opts_with_name_projection() -> OperationOptions {
        OperationOptions::new().with_attributes_to_get(vec!["name".into()])
    }

    #[tokio::test]
    async fn test_get_is_cached_and_invalidated_by_update() {
        let connector = Arc::new(RecordingConnector::default());
        let (facade, _cache) = facade_for(Arc::clone(&connector) as BoxedConnector).await;
        let opts = opts_with_name_projection();

        let first = facade.get("User", "u1", &opts).await.unwrap().unwrap();
        let second = facade.get("User", "u1", &opts).await.unwrap().unwrap();
        assert_eq!(connector.get_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.attribute("name"), Some(&AttributeValue::string("A")));
        assert_eq!(second.attribute("name"), Some(&AttributeValue::string("A")));

        let mut attrs = AttributeMap::new();
        attrs.insert("name".into(), AttributeValue::string("B"));
        facade
            .update("User", "u1", attrs, &OperationOptions::new())
            .await
            .unwrap();

        let third = facade.get("User", "u1", &opts).await.unwrap().unwrap();
        assert_eq!(connector.get_calls.load(Ordering::SeqCst), 2);
        assert_eq!(third.attribute("name"), Some(&AttributeValue::string("B")));
    }

    #[tokio::test]
    async fn test_projection_is_part_of_cache_key() {
        let connector = Arc::new(RecordingConnector::default());
        let (facade, _cache) = facade_for(Arc::clone(&connector) as BoxedConnector).await;

        facade
            .get("User", "u1", &opts_with_name_projection())
            .await
            .unwrap();
        facade
            .get("User", "u1", &OperationOptions::new())
            .await
            .unwrap();

        // Different projections must not share cache entries.
        assert_eq!(connector.get_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_schema_cached_and_invalidated_by_create() {
        let connector = Arc::new(RecordingConnector::default());
        let (facade, _cache) = facade_for(Arc::clone(&connector) as BoxedConnector).await;

        facade.schema().await.unwrap();
        facade.schema().await.unwrap();
        assert_eq!(connector.schema_calls.load(Ordering::SeqCst), 1);

        facade
            .create("User", AttributeMap::new(), &OperationOptions::new())
            .await
            .unwrap();

        facade.schema().await.unwrap();
        assert_eq!(connector.schema_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_schema_fallback_without_capability() {
        let (facade, _cache) = facade_for(Arc::new(StreamingOnlyConnector) as BoxedConnector).await;

        let schema = facade.schema().await.unwrap();
        assert!(schema.object_classes.is_empty());
        assert!(schema.features.complex_attributes);
    }

    #[tokio::test]
    async fn test_test_succeeds_silently_without_capability() {
        let (facade, _cache) = facade_for(Arc::new(StreamingOnlyConnector) as BoxedConnector).await;
        assert!(facade.test().await.is_ok());
    }

    #[tokio::test]
    async fn test_not_supported_operations() {
        let (facade, _cache) = facade_for(Arc::new(StreamingOnlyConnector) as BoxedConnector).await;

        let err = facade
            .get("User", "u1", &OperationOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::NotSupported { .. }));

        let err = facade
            .delete("User", "u1", &OperationOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::NotSupported { .. }));

        let err = facade
            .sync("User", None, &OperationOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::NotSupported { .. }));
    }

    #[tokio::test]
    async fn test_options_validated_before_backend_call() {
        let connector = Arc::new(RecordingConnector::default());
        let (facade, _cache) = facade_for(Arc::clone(&connector) as BoxedConnector).await;

        let bad = OperationOptions::new().with_page_size(0);
        let err = facade.get("User", "u1", &bad).await.unwrap_err();

        assert!(matches!(err, ConnectorError::ValidationFailed { .. }));
        assert_eq!(connector.get_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_streaming_bridge_over_list_impl() {
        let connector = Arc::new(RecordingConnector::default());
        let (facade, _cache) = facade_for(Arc::clone(&connector) as BoxedConnector).await;

        let mut seen = Vec::new();
        let mut handler = |object: ConnectorObject| {
            seen.push(object.uid);
            true
        };
        let options = OperationOptions::new().with_page_size(2);
        let result = facade
            .search_streaming("User", None, &options, &mut handler)
            .await
            .unwrap();

        assert_eq!(seen, vec!["u0", "u1", "u2", "u3", "u4"]);
        assert_eq!(result.paged_results_cookie, None);
        // 5 objects in pages of 2 → 3 list calls.
        assert_eq!(connector.search_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_streaming_bridge_cancellation_stops_paging() {
        let connector = Arc::new(RecordingConnector::default());
        let (facade, _cache) = facade_for(Arc::clone(&connector) as BoxedConnector).await;

        let mut seen = 0u32;
        let mut handler = |_object: ConnectorObject| {
            seen += 1;
            seen < 2
        };
        let options = OperationOptions::new().with_page_size(2);
        let result = facade
            .search_streaming("User", None, &options, &mut handler)
            .await
            .unwrap();

        assert_eq!(seen, 2);
        // Cancelled inside the first page: only one list call, cookie from
        // the page that was being delivered.
        assert_eq!(connector.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.paged_results_cookie, Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_list_bridge_over_streaming_impl() {
        let (facade, _cache) = facade_for(Arc::new(StreamingOnlyConnector) as BoxedConnector).await;

        let page = facade
            .search("User", None, &OperationOptions::new())
            .await
            .unwrap();

        assert_eq!(page.results.len(), 4);
        assert_eq!(page.next_offset, None);
    }

    #[tokio::test]
    async fn test_streaming_impl_served_directly_with_cancellation() {
        let (facade, _cache) = facade_for(Arc::new(StreamingOnlyConnector) as BoxedConnector).await;

        let mut seen = 0u32;
        let mut handler = |_object: ConnectorObject| {
            seen += 1;
            false
        };
        let result = facade
            .search_streaming("User", None, &OperationOptions::new(), &mut handler)
            .await
            .unwrap();

        assert_eq!(seen, 1);
        assert_eq!(result.paged_results_cookie, Some("cancelled".to_string()));
    }

    #[tokio::test]
    async fn test_sync_round_trip_with_deleted_marker() {
        let connector = Arc::new(RecordingConnector::default());
        let (facade, _cache) = facade_for(Arc::clone(&connector) as BoxedConnector).await;

        let delta = facade
            .sync("User", None, &OperationOptions::new())
            .await
            .unwrap();
        assert_eq!(delta.token.value, "1");
        assert!(delta.changes[0].is_deleted());

        let delta = facade
            .sync("User", Some(&SyncToken::new("1")), &OperationOptions::new())
            .await
            .unwrap();
        assert_eq!(delta.token.value, "1+1");
    }

    #[tokio::test]
    async fn test_backend_failures_open_breaker() {
        let connector = Arc::new(RecordingConnector::default());
        connector.fail_backend.store(true, Ordering::SeqCst);

        let registry = ConnectorRegistry::new();
        let conn = Arc::clone(&connector);
        let factory: ConnectorFactory =
            Box::new(move |_ctx| Ok(Arc::clone(&conn) as BoxedConnector));
        registry
            .register_factory(&ConnectorKey::new("mock", "1.0.0").unwrap(), factory)
            .await;
        let instance = registry
            .init_instance("alpha", "mock", "1.0.0", json!({}))
            .await
            .unwrap();
        let cache = Arc::new(TtlCache::with_defaults());
        let breaker = CircuitBreaker::new(
            "alpha",
            CircuitBreakerConfig {
                failure_threshold: 2,
                ..CircuitBreakerConfig::default()
            },
        );
        let facade = ConnectorFacade::with_breaker(instance, cache, breaker);

        for _ in 0..2 {
            let err = facade
                .get("User", "u1", &OperationOptions::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ConnectorError::Backend { .. }));
        }

        let err = facade
            .get("User", "u1", &OperationOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::CircuitOpen { .. }));
        // Fail-fast: the impl was not called a third time.
        assert_eq!(connector.get_calls.load(Ordering::SeqCst), 2);
    }
}
