//! Kind-agnostic resource operations
//!
//! [`DynamicClient`] resolves every kind through the [`ApiCatalog`] and then
//! dispatches to a [`ResourceBackend`], so it works the same for built-in kinds
//! and CRDs.
//!
//! # Example
//!
//! ```ignore
//! let handle = gateway.handle(None).await?;
//! let pods = handle.resources().list(&ListRequest::new("Pod")).await?;
//!
//! let manifest = Manifest::parse(yaml)?;
//! for outcome in handle.resources().apply(&manifest, ApplyMode::Create).await {
//!     println!("{}: {:?}", outcome.name.unwrap_or_default(), outcome.result.is_ok());
//! }
//! ```

mod backend;
mod manifest;
mod reference;
pub mod summary;

pub use backend::{KubeBackend, ResourceBackend};
pub use manifest::{strip_server_fields, DocumentIdentity, Manifest};
pub use reference::{PodTarget, ResourceReference};

use crate::catalog::{ApiCatalog, ApiResourceDescriptor, Discoverer, Verb};
use crate::error::{GatewayError, Result};
use crate::provider::ServerVersion;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How `apply` treats each document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Fails `AlreadyExists` if the object is present
    Create,
    /// Fails `NotFound` if the object is absent
    Update,
}

impl ApplyMode {
    fn verb(self) -> Verb {
        match self {
            Self::Create => Verb::Create,
            Self::Update => Verb::Update,
        }
    }
}

/// Which namespaces a `list` covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NamespaceScope {
    /// The handle's default namespace
    #[default]
    Default,
    Namespace(String),
    /// Every namespace; only honoured for namespaced kinds
    AllNamespaces,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub kind: String,
    pub api_version: Option<String>,
    pub scope: NamespaceScope,
    pub label_selector: Option<String>,
}

impl ListRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            api_version: None,
            scope: NamespaceScope::Default,
            label_selector: None,
        }
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.scope = NamespaceScope::Namespace(namespace.into());
        self
    }

    #[must_use]
    pub fn all_namespaces(mut self) -> Self {
        self.scope = NamespaceScope::AllNamespaces;
        self
    }

    #[must_use]
    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    #[must_use]
    pub fn label_selector(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = Some(selector.into());
        self
    }
}

/// Result of applying one manifest document
#[derive(Debug)]
pub struct DocumentOutcome {
    /// Position in the manifest, after empty documents were dropped
    pub index: usize,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
    /// The object as returned by the API server
    pub result: Result<Value>,
}

impl DocumentOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Confirmation that a delete was accepted (the object may still be terminating)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteAck {
    pub kind: String,
    pub api_version: String,
    pub name: String,
    pub namespace: Option<String>,
}

/// Generic CRUD against one cluster
#[derive(Clone)]
pub struct DynamicClient {
    catalog: Arc<ApiCatalog>,
    discoverer: Arc<dyn Discoverer>,
    backend: Arc<dyn ResourceBackend>,
    default_namespace: String,
}

impl DynamicClient {
    pub fn new(
        catalog: Arc<ApiCatalog>,
        discoverer: Arc<dyn Discoverer>,
        backend: Arc<dyn ResourceBackend>,
        default_namespace: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            discoverer,
            backend,
            default_namespace: default_namespace.into(),
        }
    }

    /// Same cluster, different default namespace
    #[must_use]
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            default_namespace: namespace.into(),
            ..self.clone()
        }
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// Catalog key of the cluster this client talks to
    pub fn context(&self) -> &str {
        self.discoverer.cluster_key()
    }

    pub async fn resolve(
        &self,
        kind: &str,
        api_version: Option<&str>,
    ) -> Result<Arc<ApiResourceDescriptor>> {
        self.catalog
            .resolve(self.discoverer.as_ref(), kind, api_version)
            .await
    }

    /// Re-run discovery and replace this cluster's catalog entry
    pub async fn refresh_catalog(&self) -> Result<usize> {
        let set = self.catalog.refresh(self.discoverer.as_ref()).await?;
        Ok(set.len())
    }

    async fn resolve_for(
        &self,
        kind: &str,
        api_version: Option<&str>,
        verb: Verb,
    ) -> Result<Arc<ApiResourceDescriptor>> {
        let descriptor = self.resolve(kind, api_version).await?;
        // An empty verb list means discovery did not report verbs at all
        if !descriptor.verbs.is_empty() && !descriptor.supports(verb) {
            return Err(GatewayError::OperationNotSupported {
                kind: descriptor.kind.clone(),
                api_version: descriptor.api_version(),
                verb: verb.as_str(),
            });
        }
        Ok(descriptor)
    }

    /// Namespace an operation targets: `None` for cluster-scoped kinds
    fn effective_namespace(
        &self,
        descriptor: &ApiResourceDescriptor,
        requested: Option<&str>,
    ) -> Option<String> {
        descriptor.namespaced.then(|| {
            requested
                .unwrap_or(&self.default_namespace)
                .to_string()
        })
    }

    pub async fn server_version(&self) -> Result<ServerVersion> {
        self.backend.server_version().await.map_err(|failure| {
            GatewayError::from_api(failure, &ResourceReference::new("Version", "/version"))
        })
    }

    #[instrument(skip(self), fields(context = %self.context()))]
    pub async fn get(&self, reference: &ResourceReference) -> Result<Value> {
        let descriptor = self
            .resolve_for(&reference.kind, reference.api_version.as_deref(), Verb::Get)
            .await?;
        let namespace = self.effective_namespace(&descriptor, reference.namespace.as_deref());

        self.backend
            .get(&descriptor, namespace.as_deref(), &reference.name)
            .await
            .map_err(|failure| {
                GatewayError::from_api(
                    failure,
                    &target(&descriptor, namespace.as_deref(), &reference.name),
                )
            })
    }

    /// List objects of a kind
    ///
    /// An empty result is not an error.
    #[instrument(skip(self), fields(context = %self.context()))]
    pub async fn list(&self, request: &ListRequest) -> Result<Vec<Value>> {
        let descriptor = self
            .resolve_for(&request.kind, request.api_version.as_deref(), Verb::List)
            .await?;

        let namespace = if descriptor.namespaced {
            match &request.scope {
                NamespaceScope::Default => Some(self.default_namespace.clone()),
                NamespaceScope::Namespace(ns) => Some(ns.clone()),
                NamespaceScope::AllNamespaces => None,
            }
        } else {
            None
        };

        let items = self
            .backend
            .list(
                &descriptor,
                namespace.as_deref(),
                request.label_selector.as_deref(),
            )
            .await
            .map_err(|failure| {
                GatewayError::from_api(failure, &target(&descriptor, namespace.as_deref(), "*"))
            })?;

        debug!(
            kind = %descriptor.kind,
            namespace = namespace.as_deref().unwrap_or("<all>"),
            count = items.len(),
            "listed resources"
        );
        Ok(items)
    }

    /// Apply every document of `manifest` in order
    ///
    /// Documents are independent: a failure is recorded in that document's
    /// outcome and the remaining documents are still applied. Nothing already
    /// applied is rolled back.
    #[instrument(skip(self, manifest), fields(context = %self.context(), documents = manifest.len()))]
    pub async fn apply(&self, manifest: &Manifest, mode: ApplyMode) -> Vec<DocumentOutcome> {
        let mut outcomes = Vec::with_capacity(manifest.len());

        for (index, document) in manifest.documents().iter().enumerate() {
            let (kind, name, namespace, result) = match DocumentIdentity::from_value(document) {
                Ok(id) => {
                    let result = self.apply_document(document, &id, mode).await;
                    (Some(id.kind), Some(id.name), id.namespace, result)
                }
                Err(e) => (None, None, None, Err(e)),
            };

            // Report the namespace the server actually used
            let namespace = match &result {
                Ok(applied) => applied
                    .pointer("/metadata/namespace")
                    .and_then(Value::as_str)
                    .map(String::from),
                Err(_) => namespace,
            };

            if let Err(e) = &result {
                warn!(index, error = %e, "manifest document failed");
            }

            outcomes.push(DocumentOutcome {
                index,
                kind,
                name,
                namespace,
                result,
            });
        }

        outcomes
    }

    async fn apply_document(
        &self,
        document: &Value,
        identity: &DocumentIdentity,
        mode: ApplyMode,
    ) -> Result<Value> {
        let descriptor = self
            .resolve_for(&identity.kind, Some(&identity.api_version), mode.verb())
            .await?;
        let namespace = self.effective_namespace(&descriptor, identity.namespace.as_deref());
        let target = target(&descriptor, namespace.as_deref(), &identity.name);

        let mut object = document.clone();
        manifest::set_namespace(&mut object, namespace.as_deref());

        let applied = match mode {
            ApplyMode::Create => self
                .backend
                .create(&descriptor, namespace.as_deref(), &object)
                .await
                .map_err(|failure| GatewayError::from_api(failure, &target))?,
            ApplyMode::Update => {
                if manifest::resource_version(&object).is_none() {
                    let live = self
                        .backend
                        .get(&descriptor, namespace.as_deref(), &identity.name)
                        .await
                        .map_err(|failure| GatewayError::from_api(failure, &target))?;
                    if let Some(version) = manifest::resource_version(&live) {
                        manifest::set_resource_version(&mut object, version);
                    }
                }
                self.backend
                    .replace(&descriptor, namespace.as_deref(), &identity.name, &object)
                    .await
                    .map_err(|failure| GatewayError::from_api(failure, &target))?
            }
        };

        info!(
            kind = %descriptor.kind,
            namespace = namespace.as_deref().unwrap_or(""),
            name = %identity.name,
            mode = ?mode,
            "applied resource"
        );
        Ok(applied)
    }

    /// Request deletion; returns once the API server accepts it
    #[instrument(skip(self), fields(context = %self.context()))]
    pub async fn delete(&self, reference: &ResourceReference) -> Result<DeleteAck> {
        let descriptor = self
            .resolve_for(&reference.kind, reference.api_version.as_deref(), Verb::Delete)
            .await?;
        let namespace = self.effective_namespace(&descriptor, reference.namespace.as_deref());

        self.backend
            .delete(&descriptor, namespace.as_deref(), &reference.name)
            .await
            .map_err(|failure| {
                GatewayError::from_api(
                    failure,
                    &target(&descriptor, namespace.as_deref(), &reference.name),
                )
            })?;

        info!(
            kind = %descriptor.kind,
            namespace = namespace.as_deref().unwrap_or(""),
            name = %reference.name,
            "deleted resource"
        );

        Ok(DeleteAck {
            kind: descriptor.kind.clone(),
            api_version: descriptor.api_version(),
            name: reference.name.clone(),
            namespace,
        })
    }

    /// Fetch an object as YAML, optionally without server-populated fields
    pub async fn get_yaml(&self, reference: &ResourceReference, strip: bool) -> Result<String> {
        let mut object = self.get(reference).await?;
        if strip {
            strip_server_fields(&mut object);
        }
        serde_yaml::to_string(&object)
            .map_err(|e| GatewayError::Serialization(format!("{reference}: {e}")))
    }
}

/// Fully qualified reference used in error messages
fn target(
    descriptor: &ApiResourceDescriptor,
    namespace: Option<&str>,
    name: &str,
) -> ResourceReference {
    let reference =
        ResourceReference::new(&descriptor.kind, name).with_api_version(descriptor.api_version());
    match namespace {
        Some(ns) => reference.in_namespace(ns),
        None => reference,
    }
}
