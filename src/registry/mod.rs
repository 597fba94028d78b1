//! Named cluster contexts and the active-context pointer
//!
//! The registry is loaded once from a kubeconfig. The active context is a
//! single `Arc` swapped under a lock, so concurrent readers see the old context
//! or the new one and never a mix. Every switch bumps an epoch that
//! connection caches compare against to drop handles bound to old credentials.

mod kubeconfig;

pub use kubeconfig::{AuthMethod, KubeContext};

use crate::error::{GatewayError, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Listing row for one context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextSummary {
    pub name: String,
    pub cluster: String,
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub is_active: bool,
}

impl ContextSummary {
    pub fn from_context(context: &KubeContext, is_active: bool) -> Self {
        Self {
            name: context.name.clone(),
            cluster: context.cluster.clone(),
            user: context.user.clone(),
            namespace: context.namespace.clone(),
            is_active,
        }
    }
}

/// All contexts known to this process
pub struct ContextRegistry {
    contexts: Vec<Arc<KubeContext>>,
    active: RwLock<Option<Arc<KubeContext>>>,
    epoch: AtomicU64,
    kubeconfig: Option<Kubeconfig>,
}

impl ContextRegistry {
    /// Build from explicit records; `active` defaults to the first context
    pub fn from_contexts(contexts: Vec<KubeContext>, active: Option<&str>) -> Result<Self> {
        Self::build(contexts, active, None)
    }

    /// Build from an already loaded kubeconfig
    pub fn from_kubeconfig(kubeconfig: Kubeconfig) -> Result<Self> {
        let parsed = kubeconfig::contexts_from_kubeconfig(&kubeconfig)?;
        let current = parsed.current.as_deref().and_then(|current| {
            if parsed.contexts.iter().any(|c| c.name == current) {
                Some(current)
            } else {
                warn!(current_context = %current, "current-context not defined, using first context");
                None
            }
        });
        let current = current.map(String::from);
        Self::build(parsed.contexts, current.as_deref(), Some(kubeconfig))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let kubeconfig =
            Kubeconfig::from_yaml(yaml).map_err(|e| GatewayError::Kubeconfig(e.to_string()))?;
        Self::from_kubeconfig(kubeconfig)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let kubeconfig = Kubeconfig::read_from(path)
            .map_err(|e| GatewayError::Kubeconfig(format!("{}: {e}", path.display())))?;
        Self::from_kubeconfig(kubeconfig)
    }

    /// Load via `KUBECONFIG` or `~/.kube/config`
    pub fn load_default() -> Result<Self> {
        let kubeconfig = Kubeconfig::read().map_err(|e| GatewayError::Kubeconfig(e.to_string()))?;
        Self::from_kubeconfig(kubeconfig)
    }

    fn build(
        contexts: Vec<KubeContext>,
        active: Option<&str>,
        kubeconfig: Option<Kubeconfig>,
    ) -> Result<Self> {
        let mut unique: Vec<Arc<KubeContext>> = Vec::with_capacity(contexts.len());
        for context in contexts {
            if unique.iter().any(|c| c.name == context.name) {
                warn!(context = %context.name, "duplicate context name, keeping the first");
                continue;
            }
            unique.push(Arc::new(context));
        }

        let active = match active {
            Some(name) => Some(
                unique
                    .iter()
                    .find(|c| c.name == name)
                    .cloned()
                    .ok_or_else(|| GatewayError::ContextNotFound(name.to_string()))?,
            ),
            None => unique.first().cloned(),
        };

        debug!(
            contexts = unique.len(),
            active = active.as_ref().map_or("<none>", |c| c.name.as_str()),
            "loaded context registry"
        );

        Ok(Self {
            contexts: unique,
            active: RwLock::new(active),
            epoch: AtomicU64::new(0),
            kubeconfig,
        })
    }

    /// Contexts in source order
    pub fn list(&self) -> Vec<Arc<KubeContext>> {
        self.contexts.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn get(&self, name: &str) -> Result<Arc<KubeContext>> {
        self.contexts
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| GatewayError::ContextNotFound(name.to_string()))
    }

    pub fn current(&self) -> Result<Arc<KubeContext>> {
        self.active.read().clone().ok_or(GatewayError::NoActiveContext)
    }

    /// Make `name` the active context
    ///
    /// On `ContextNotFound` the previous active context is left in place.
    pub fn set_active(&self, name: &str) -> Result<Arc<KubeContext>> {
        let context = self.get(name)?;
        {
            let mut active = self.active.write();
            *active = Some(context.clone());
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
        info!(context = %name, "switched active context");
        Ok(context)
    }

    /// Incremented on every `set_active`
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn summaries(&self) -> Vec<ContextSummary> {
        let active = self.active.read().as_ref().map(|c| c.name.clone());
        self.contexts
            .iter()
            .map(|c| ContextSummary::from_context(c, active.as_deref() == Some(c.name.as_str())))
            .collect()
    }

    /// Client configuration for `context`, built from the loaded kubeconfig
    pub async fn client_config(&self, context: &KubeContext) -> Result<kube::Config> {
        let kubeconfig = self.kubeconfig.clone().ok_or_else(|| {
            GatewayError::Kubeconfig(format!(
                "context '{}' has no kubeconfig to build a client from",
                context.name
            ))
        })?;

        let options = KubeConfigOptions {
            context: Some(context.name.clone()),
            ..Default::default()
        };
        kube::Config::from_custom_kubeconfig(kubeconfig, &options)
            .await
            .map_err(|e| GatewayError::Kubeconfig(format!("context '{}': {e}", context.name)))
    }
}
