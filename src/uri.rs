//! `k8s://` resource addressing
//!
//! Every readable resource is addressed by a URI whose first segment is the
//! context name. [`ResourceUri`] parses and prints them; [`templates`] lists
//! the forms a transport layer should advertise.

use crate::error::{GatewayError, Result};
use std::fmt;
use std::str::FromStr;

pub const SCHEME: &str = "k8s://";

pub const MIME_JSON: &str = "application/json";
pub const MIME_YAML: &str = "application/yaml";
pub const MIME_TEXT: &str = "text/plain";

/// Per-namespace listing kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listing {
    Pods,
    Deployments,
    Services,
    ConfigMaps,
    Secrets,
}

impl Listing {
    pub const ALL: [Listing; 5] = [
        Self::Pods,
        Self::Deployments,
        Self::Services,
        Self::ConfigMaps,
        Self::Secrets,
    ];

    /// URI path segment
    pub fn segment(self) -> &'static str {
        match self {
            Self::Pods => "pods",
            Self::Deployments => "deployments",
            Self::Services => "services",
            Self::ConfigMaps => "configmaps",
            Self::Secrets => "secrets",
        }
    }

    /// Kind resolved through the catalog
    pub fn kind(self) -> &'static str {
        match self {
            Self::Pods => "Pod",
            Self::Deployments => "Deployment",
            Self::Services => "Service",
            Self::ConfigMaps => "ConfigMap",
            Self::Secrets => "Secret",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.segment() == segment)
    }
}

/// A parsed `k8s://` URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceUri {
    Info {
        context: String,
    },
    Namespaces {
        context: String,
    },
    Nodes {
        context: String,
    },
    NamespaceListing {
        context: String,
        namespace: String,
        listing: Listing,
    },
    PodLogs {
        context: String,
        namespace: String,
        pod: String,
    },
    Resource {
        context: String,
        namespace: String,
        kind: String,
        name: String,
    },
}

impl ResourceUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |reason: &str| GatewayError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let path = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("expected the k8s:// scheme"))?;
        let parts: Vec<&str> = path.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("empty path segment"));
        }

        let context = parts[0].to_string();
        let parsed = match parts.as_slice() {
            [_, "info"] => Self::Info { context },
            [_, "namespaces"] => Self::Namespaces { context },
            [_, "nodes"] => Self::Nodes { context },
            [_, "namespace", ns, listing] => Self::NamespaceListing {
                context,
                namespace: (*ns).to_string(),
                listing: Listing::from_segment(listing)
                    .ok_or_else(|| invalid("unknown namespace listing"))?,
            },
            [_, "namespace", ns, "pod", pod, "logs"] => Self::PodLogs {
                context,
                namespace: (*ns).to_string(),
                pod: (*pod).to_string(),
            },
            [_, "namespace", ns, "resource", kind, name] => Self::Resource {
                context,
                namespace: (*ns).to_string(),
                kind: (*kind).to_string(),
                name: (*name).to_string(),
            },
            _ => return Err(invalid("path does not match any resource template")),
        };
        Ok(parsed)
    }

    pub fn context(&self) -> &str {
        match self {
            Self::Info { context }
            | Self::Namespaces { context }
            | Self::Nodes { context }
            | Self::NamespaceListing { context, .. }
            | Self::PodLogs { context, .. }
            | Self::Resource { context, .. } => context,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::PodLogs { .. } => MIME_TEXT,
            Self::Resource { .. } => MIME_YAML,
            _ => MIME_JSON,
        }
    }
}

impl FromStr for ResourceUri {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/", self.context())?;
        match self {
            Self::Info { .. } => f.write_str("info"),
            Self::Namespaces { .. } => f.write_str("namespaces"),
            Self::Nodes { .. } => f.write_str("nodes"),
            Self::NamespaceListing {
                namespace, listing, ..
            } => write!(f, "namespace/{namespace}/{}", listing.segment()),
            Self::PodLogs { namespace, pod, .. } => write!(f, "namespace/{namespace}/pod/{pod}/logs"),
            Self::Resource {
                namespace,
                kind,
                name,
                ..
            } => write!(f, "namespace/{namespace}/resource/{kind}/{name}"),
        }
    }
}

/// An advertised URI form
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UriTemplate {
    pub uri_template: &'static str,
    pub name: &'static str,
    pub mime_type: &'static str,
    pub description: &'static str,
}

const fn template(
    uri_template: &'static str,
    name: &'static str,
    mime_type: &'static str,
    description: &'static str,
) -> UriTemplate {
    UriTemplate {
        uri_template,
        name,
        mime_type,
        description,
    }
}

const TEMPLATES: &[UriTemplate] = &[
    template(
        "k8s://{context}/info",
        "Kubernetes cluster info",
        MIME_JSON,
        "Version, provider, node and namespace counts of the cluster",
    ),
    template(
        "k8s://{context}/namespaces",
        "Kubernetes namespaces",
        MIME_JSON,
        "List of namespaces in the specified Kubernetes context",
    ),
    template(
        "k8s://{context}/namespace/{namespace}/pods",
        "Kubernetes pods in namespace",
        MIME_JSON,
        "List of pods in the specified namespace",
    ),
    template(
        "k8s://{context}/namespace/{namespace}/deployments",
        "Kubernetes deployments in namespace",
        MIME_JSON,
        "List of deployments in the specified namespace",
    ),
    template(
        "k8s://{context}/namespace/{namespace}/services",
        "Kubernetes services in namespace",
        MIME_JSON,
        "List of services in the specified namespace",
    ),
    template(
        "k8s://{context}/namespace/{namespace}/configmaps",
        "Kubernetes configmaps in namespace",
        MIME_JSON,
        "List of configmaps in the specified namespace",
    ),
    template(
        "k8s://{context}/namespace/{namespace}/secrets",
        "Kubernetes secrets in namespace",
        MIME_JSON,
        "List of secrets in the specified namespace (keys only)",
    ),
    template(
        "k8s://{context}/nodes",
        "Kubernetes nodes",
        MIME_JSON,
        "List of nodes in the cluster",
    ),
    template(
        "k8s://{context}/namespace/{namespace}/pod/{pod}/logs",
        "Kubernetes pod logs",
        MIME_TEXT,
        "Logs from the specified pod",
    ),
    template(
        "k8s://{context}/namespace/{namespace}/resource/{kind}/{name}",
        "Kubernetes resource YAML",
        MIME_YAML,
        "YAML representation of the specified Kubernetes resource",
    ),
];

pub fn templates() -> &'static [UriTemplate] {
    TEMPLATES
}
