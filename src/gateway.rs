//! Entry point tying contexts, discovery and clients together
//!
//! A [`Gateway`] owns the context registry and the shared API catalog. Work
//! against a cluster goes through a [`ClusterHandle`], which captures one
//! context and its credentials. Handles are cached per context; switching the
//! active context drops every cached handle so the next call reconnects.
//!
//! # Example
//!
//! ```no_run
//! use kubegate::{Gateway, GatewayConfig, ResourceReference};
//!
//! # async fn run() -> kubegate::Result<()> {
//! let gateway = Gateway::from_config(GatewayConfig::from_env().unwrap_or_default())?;
//!
//! let handle = gateway.handle(None).await?;
//! let deployment = handle
//!     .resources()
//!     .get(&ResourceReference::new("Deployment", "web").in_namespace("prod"))
//!     .await?;
//!
//! let content = gateway.read("k8s://prod/namespace/default/pods").await?;
//! println!("{}", content.text);
//! # Ok(())
//! # }
//! ```

use crate::catalog::{ApiCatalog, KubeDiscoverer};
use crate::cluster_info::{ClusterInfoAggregator, ClusterSummary};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::provider::ClusterEndpoint;
use crate::registry::{ContextRegistry, ContextSummary, KubeContext};
use crate::resources::summary::{
    ConfigMapSummary, DeploymentSummary, NamespaceSummary, NodeSummary, PodSummary,
    SecretSummary, ServiceSummary,
};
use crate::resources::{DynamicClient, KubeBackend, ListRequest, PodTarget, ResourceReference};
use crate::stream::{CommandExecutor, LogRequest, LogStreamer};
use crate::uri::{Listing, ResourceUri};
use kube::Client;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Body of a read `k8s://` URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

/// Everything needed to talk to one cluster as one context
#[derive(Clone)]
pub struct ClusterHandle {
    context: Arc<KubeContext>,
    registry: Arc<ContextRegistry>,
    endpoint: Arc<ClusterEndpoint>,
    client: Client,
    resources: DynamicClient,
    logs: LogStreamer,
    exec: CommandExecutor,
    log_tail: Option<i64>,
}

impl ClusterHandle {
    pub fn context(&self) -> &KubeContext {
        &self.context
    }

    pub fn endpoint(&self) -> &ClusterEndpoint {
        &self.endpoint
    }

    /// The underlying kube client, for typed access
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn resources(&self) -> &DynamicClient {
        &self.resources
    }

    pub fn logs(&self) -> &LogStreamer {
        &self.logs
    }

    pub fn exec(&self) -> &CommandExecutor {
        &self.exec
    }

    pub fn default_namespace(&self) -> &str {
        self.resources.default_namespace()
    }

    /// Same connection with a different default namespace
    ///
    /// The registry and the cached handle are left untouched.
    #[must_use]
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            resources: self.resources.with_namespace(namespace),
            ..self.clone()
        }
    }

    /// Pod in the handle's default namespace
    pub fn pod(&self, name: impl Into<String>) -> PodTarget {
        PodTarget::new(self.default_namespace(), name)
    }

    /// Log request with the configured default tail
    pub fn log_request(&self) -> LogRequest {
        LogRequest {
            tail_lines: self.log_tail,
            ..Default::default()
        }
    }

    pub async fn info(&self) -> Result<ClusterSummary> {
        let is_active = self
            .registry
            .current()
            .is_ok_and(|active| active.name == self.context.name);
        ClusterInfoAggregator::new(
            ContextSummary::from_context(&self.context, is_active),
            self.endpoint.clone(),
            self.resources.clone(),
        )
        .summarize()
        .await
    }
}

struct CachedHandle {
    epoch: u64,
    handle: Arc<ClusterHandle>,
}

pub struct Gateway {
    registry: Arc<ContextRegistry>,
    catalog: Arc<ApiCatalog>,
    config: GatewayConfig,
    handles: Mutex<HashMap<String, CachedHandle>>,
}

impl Gateway {
    /// Wrap a registry; the configured context override becomes active
    pub fn new(registry: ContextRegistry, config: GatewayConfig) -> Result<Self> {
        if let Some(name) = &config.context {
            registry.set_active(name)?;
        }

        Ok(Self {
            registry: Arc::new(registry),
            catalog: Arc::new(ApiCatalog::new(config.discovery_backoff)),
            config,
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Load the kubeconfig named by `config`, or the default one
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let registry = match &config.kubeconfig {
            Some(path) => ContextRegistry::load(path)?,
            None => ContextRegistry::load_default()?,
        };
        Self::new(registry, config)
    }

    pub fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &ApiCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn contexts(&self) -> Vec<ContextSummary> {
        self.registry.summaries()
    }

    /// Switch the active context and drop every cached handle
    pub fn set_active(&self, name: &str) -> Result<Arc<KubeContext>> {
        let context = self.registry.set_active(name)?;
        self.handles.lock().clear();
        Ok(context)
    }

    /// Handle for `context`, or for the active context when `None`
    pub async fn handle(&self, context: Option<&str>) -> Result<Arc<ClusterHandle>> {
        let context = match context {
            Some(name) => self.registry.get(name)?,
            None => self.registry.current()?,
        };
        let epoch = self.registry.epoch();

        if let Some(cached) = self.handles.lock().get(&context.name) {
            if cached.epoch == epoch {
                return Ok(cached.handle.clone());
            }
        }

        let handle = Arc::new(self.connect(context.clone()).await?);
        self.handles.lock().insert(
            context.name.clone(),
            CachedHandle {
                epoch,
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }

    #[instrument(skip(self, context), fields(context = %context.name))]
    async fn connect(&self, context: Arc<KubeContext>) -> Result<ClusterHandle> {
        let mut client_config = self.registry.client_config(&context).await?;
        client_config.read_timeout = Some(self.config.read_timeout);

        let client = Client::try_from(client_config)
            .map_err(|e| GatewayError::Kubeconfig(format!("context '{}': {e}", context.name)))?;

        let discoverer = Arc::new(KubeDiscoverer::new(
            client.clone(),
            context.name.clone(),
            self.config.discovery_concurrency,
        ));
        let resources = DynamicClient::new(
            self.catalog.clone(),
            discoverer,
            Arc::new(KubeBackend::new(client.clone())),
            context.default_namespace(),
        );

        info!(
            server = context.server.as_deref().unwrap_or("<unknown>"),
            namespace = %context.default_namespace(),
            "connected to cluster"
        );

        Ok(ClusterHandle {
            endpoint: Arc::new(ClusterEndpoint::new(&context)),
            registry: self.registry.clone(),
            logs: LogStreamer::new(client.clone()),
            exec: CommandExecutor::new(client.clone()),
            log_tail: self.config.log_tail,
            context,
            client,
            resources,
        })
    }

    /// Re-discover the API resources of `context` (or the active one)
    pub async fn refresh(&self, context: Option<&str>) -> Result<usize> {
        self.handle(context).await?.resources().refresh_catalog().await
    }

    /// Answer a `k8s://` URI
    ///
    /// Uses a handle for the URI's context; the active context is not changed.
    #[instrument(skip(self))]
    pub async fn read(&self, uri: &str) -> Result<ResourceContent> {
        let parsed = ResourceUri::parse(uri)?;
        let handle = self.handle(Some(parsed.context())).await?;

        let text = match &parsed {
            ResourceUri::Info { .. } => to_json(uri, &handle.info().await?)?,
            ResourceUri::Namespaces { .. } => {
                listing(&handle, uri, ListRequest::new("Namespace"), NamespaceSummary::from_object)
                    .await?
            }
            ResourceUri::Nodes { .. } => {
                listing(&handle, uri, ListRequest::new("Node"), NodeSummary::from_object).await?
            }
            ResourceUri::NamespaceListing {
                namespace, listing: kind, ..
            } => {
                let request = ListRequest::new(kind.kind()).namespace(namespace);
                match kind {
                    Listing::Pods => listing(&handle, uri, request, PodSummary::from_object).await?,
                    Listing::Deployments => {
                        listing(&handle, uri, request, DeploymentSummary::from_object).await?
                    }
                    Listing::Services => {
                        listing(&handle, uri, request, ServiceSummary::from_object).await?
                    }
                    Listing::ConfigMaps => {
                        listing(&handle, uri, request, ConfigMapSummary::from_object).await?
                    }
                    Listing::Secrets => {
                        listing(&handle, uri, request, SecretSummary::from_object).await?
                    }
                }
            }
            ResourceUri::PodLogs { namespace, pod, .. } => handle
                .logs()
                .fetch(&PodTarget::new(namespace, pod), &handle.log_request())
                .await?
                .join("\n"),
            ResourceUri::Resource {
                namespace,
                kind,
                name,
                ..
            } => {
                let reference = ResourceReference::new(kind, name).in_namespace(namespace);
                handle.resources().get_yaml(&reference, false).await?
            }
        };

        debug!(bytes = text.len(), "read resource uri");
        Ok(ResourceContent {
            uri: uri.to_string(),
            mime_type: parsed.mime_type().to_string(),
            text,
        })
    }
}

async fn listing<T: Serialize>(
    handle: &ClusterHandle,
    uri: &str,
    request: ListRequest,
    summarize: fn(&Value) -> T,
) -> Result<String> {
    let items = handle.resources().list(&request).await?;
    let rows: Vec<T> = items.iter().map(summarize).collect();
    to_json(uri, &rows)
}

fn to_json(uri: &str, value: &impl Serialize) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| GatewayError::Serialization(format!("{uri}: {e}")))
}
