use crate::core::config::ClientConfig;
use crate::core::errors::ClientError;
use crate::core::kernel::{
    DefaultSerializer, HmacSigner, HttpClient, HttpClientBuilder, ManagedSerializer,
    MetricsInterceptor, ObjectMapper, RequestInterceptor, RequestMetrics, Serializer, Signer,
    SigningInterceptor, TracingInterceptor, METRICS_PRIORITY, SIGNING_PRIORITY, TRACING_PRIORITY,
};
use crate::core::types::SerializerKind;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Builds configured clients for SDK services.
///
/// Every client gets the signing interceptor (when a signer is available),
/// the metrics interceptor and the tracing interceptor at their fixed
/// priorities, plus any extra interceptors registered on the factory. All
/// clients from one factory share its metrics and its object mapper.
pub struct ServiceClientFactory {
    config: ClientConfig,
    signer: Option<Arc<dyn Signer>>,
    mapper: Option<Arc<ObjectMapper>>,
    metrics: Arc<RequestMetrics>,
    interceptors: Vec<(i32, Arc<dyn RequestInterceptor>)>,
}

impl ServiceClientFactory {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            signer: None,
            mapper: None,
            metrics: Arc::new(RequestMetrics::new()),
            interceptors: Vec::new(),
        }
    }

    /// Use this signer instead of one derived from the configured credentials
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Mapper for the managed serializer strategy
    #[must_use]
    pub fn with_object_mapper(mut self, mapper: Arc<ObjectMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<RequestMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn with_interceptor(mut self, priority: i32, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptors.push((priority, interceptor));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<RequestMetrics> {
        &self.metrics
    }

    /// The serializer strategy chosen by configuration
    pub fn serializer(&self) -> Arc<dyn Serializer> {
        match self.config.serializer_kind() {
            SerializerKind::Default => Arc::new(DefaultSerializer),
            SerializerKind::Managed => Arc::new(ManagedSerializer::new(
                self.mapper
                    .clone()
                    .unwrap_or_else(|| Arc::new(ObjectMapper::default())),
            )),
        }
    }

    fn resolve_signer(&self) -> Option<Arc<dyn Signer>> {
        if let Some(signer) = &self.signer {
            return Some(Arc::clone(signer));
        }
        if !self.config.has_credentials() {
            return None;
        }
        match (&self.config.key_id, &self.config.signing_secret) {
            (Some(key_id), Some(secret)) => {
                Some(Arc::new(HmacSigner::new(key_id.clone(), secret.clone())))
            }
            _ => None,
        }
    }

    /// A builder with configuration, serializer and interceptors applied,
    /// for callers that need to add more before building
    pub fn builder(&self) -> Result<HttpClientBuilder, ClientError> {
        let mut builder = HttpClientBuilder::new();
        self.config.apply_to(&mut builder)?;
        builder.serializer(self.serializer());

        match self.resolve_signer() {
            Some(signer) => {
                builder.register_request_interceptor(
                    SIGNING_PRIORITY,
                    Arc::new(SigningInterceptor::new(signer)),
                );
            }
            None => debug!("no signer configured; requests will be sent unsigned"),
        }
        builder
            .register_request_interceptor(
                METRICS_PRIORITY,
                Arc::new(MetricsInterceptor::new(Arc::clone(&self.metrics))),
            )
            .register_request_interceptor(TRACING_PRIORITY, Arc::new(TracingInterceptor));
        for (priority, interceptor) in &self.interceptors {
            builder.register_request_interceptor(*priority, Arc::clone(interceptor));
        }
        Ok(builder)
    }

    pub fn create_client(&self) -> Result<HttpClient, ClientError> {
        self.builder()?.build()
    }

    /// A client for a different endpoint of the same service family
    pub fn create_client_for(&self, endpoint: &str) -> Result<HttpClient, ClientError> {
        let mut builder = self.builder()?;
        builder.base_uri(endpoint)?;
        builder.build()
    }
}

impl fmt::Debug for ServiceClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClientFactory")
            .field("config", &self.config)
            .field("has_signer", &(self.signer.is_some() || self.config.has_credentials()))
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}
