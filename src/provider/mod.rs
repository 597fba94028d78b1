//! Cloud provider detection
//!
//! Classifies a cluster as one of the managed offerings kubegate knows about:
//! - EKS: Amazon Elastic Kubernetes Service
//! - AKS: Azure Kubernetes Service
//! - GKE: Google Kubernetes Engine
//! - ROSA: Red Hat OpenShift on AWS
//!
//! Anything else is `generic`. Detection never fails.

mod rules;

pub use rules::{detect_with, DetectionInput, Matcher, Rule, Tier, DEFAULT_RULES};

use crate::error::Result;
use crate::registry::KubeContext;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::OnceLock;
use tokio::sync::OnceCell;
use tracing::debug;

/// Managed Kubernetes offering behind a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderTag {
    Eks,
    Aks,
    Gke,
    Rosa,
    Generic,
}

impl ProviderTag {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Eks => "AWS EKS",
            Self::Aks => "Azure AKS",
            Self::Gke => "Google GKE",
            Self::Rosa => "ROSA (Red Hat OpenShift on AWS)",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Serialize for ProviderTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

/// Provider hints read off one Node object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSignals {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub provider_id: Option<String>,
}

impl NodeSignals {
    /// Extract signals from a Node in its JSON form
    pub fn from_object(node: &Value) -> Self {
        let string_map = |pointer: &str| -> BTreeMap<String, String> {
            node.pointer(pointer)
                .and_then(Value::as_object)
                .map(|map| {
                    map.iter()
                        .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            labels: string_map("/metadata/labels"),
            annotations: string_map("/metadata/annotations"),
            provider_id: node
                .pointer("/spec/providerID")
                .and_then(Value::as_str)
                .map(String::from),
        }
    }
}

/// API server version as reported by `/version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerVersion {
    pub major: String,
    pub minor: String,
    pub git_version: String,
    pub platform: String,
}

impl From<k8s_openapi::apimachinery::pkg::version::Info> for ServerVersion {
    fn from(info: k8s_openapi::apimachinery::pkg::version::Info) -> Self {
        Self {
            major: info.major,
            minor: info.minor,
            git_version: info.git_version,
            platform: info.platform,
        }
    }
}

/// The API server behind a context, with lazily filled caches
#[derive(Debug)]
pub struct ClusterEndpoint {
    pub context: String,
    pub server: Option<String>,
    /// Lowercased hostname of `server`
    pub host: Option<String>,
    pub exec_command: Option<String>,
    provider: OnceLock<ProviderTag>,
    version: OnceCell<ServerVersion>,
}

impl ClusterEndpoint {
    pub fn new(context: &KubeContext) -> Self {
        let host = context
            .server
            .as_deref()
            .and_then(|s| s.parse::<http::Uri>().ok())
            .and_then(|uri| uri.host().map(str::to_ascii_lowercase));

        Self {
            context: context.name.clone(),
            server: context.server.clone(),
            host,
            exec_command: context.credential.exec_command().map(String::from),
            provider: OnceLock::new(),
            version: OnceCell::new(),
        }
    }

    /// Cached provider, if node signals have been consulted before
    pub fn cached_provider(&self) -> Option<ProviderTag> {
        self.provider.get().copied()
    }

    /// Detect the provider
    ///
    /// With node signals the result is cached for the endpoint's lifetime.
    /// Without them (node listing failed or was skipped) the endpoint-only
    /// answer is returned but not cached, unless a cached one already exists.
    pub fn provider(&self, nodes: Option<&[NodeSignals]>) -> ProviderTag {
        match nodes {
            Some(nodes) => *self.provider.get_or_init(|| {
                let tag = detect(self, nodes);
                debug!(context = %self.context, provider = %tag, "detected cluster provider");
                tag
            }),
            None => self
                .cached_provider()
                .unwrap_or_else(|| detect(self, &[])),
        }
    }

    /// Server version, fetched at most once per endpoint
    pub async fn version_with<F, Fut>(&self, fetch: F) -> Result<ServerVersion>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ServerVersion>>,
    {
        self.version.get_or_try_init(fetch).await.cloned()
    }
}

/// Classify an endpoint with the built-in rules
pub fn detect(endpoint: &ClusterEndpoint, nodes: &[NodeSignals]) -> ProviderTag {
    let input = DetectionInput {
        host: endpoint.host.as_deref(),
        context_name: &endpoint.context,
        exec_command: endpoint.exec_command.as_deref(),
        nodes,
    };
    detect_with(DEFAULT_RULES, &input)
}
