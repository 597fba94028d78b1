//! Error taxonomy for gateway operations
//!
//! Every failure names the offending identifier (context, kind, namespace,
//! name) and, where the API server answered, the HTTP status code, so callers
//! can tell "doesn't exist" from "not authorized" from "server unreachable".

use crate::cluster_info::ClusterSummary;
use crate::resources::ResourceReference;

/// Result alias used throughout the crate
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Errors from gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no active context (the context registry is empty or nothing is selected)")]
    NoActiveContext,

    #[error("context '{0}' not found")]
    ContextNotFound(String),

    #[error("unknown kind '{}' in context '{context}'", display_kind(kind, api_version.as_deref()))]
    UnknownKind {
        context: String,
        kind: String,
        api_version: Option<String>,
    },

    #[error("kind '{kind}' is ambiguous in context '{context}', candidates: {}", candidates.join(", "))]
    AmbiguousKind {
        context: String,
        kind: String,
        candidates: Vec<String>,
    },

    #[error("API discovery failed for context '{context}': {reason}")]
    DiscoveryFailed {
        context: String,
        reason: String,
        code: Option<u16>,
        transient: bool,
    },

    #[error("{target} not found")]
    NotFound {
        target: ResourceReference,
        code: Option<u16>,
    },

    #[error("{target} already exists")]
    AlreadyExists {
        target: ResourceReference,
        code: Option<u16>,
    },

    #[error("conflict on {target}: {message}")]
    Conflict {
        target: ResourceReference,
        message: String,
        code: Option<u16>,
    },

    #[error("unauthorized for {target}: {message}")]
    Unauthorized {
        target: ResourceReference,
        message: String,
        code: Option<u16>,
    },

    #[error("forbidden on {target}: {message} (check RBAC)")]
    Forbidden {
        target: ResourceReference,
        message: String,
        code: Option<u16>,
    },

    #[error("pod '{name}' not found in namespace '{namespace}'")]
    PodNotFound { namespace: String, name: String },

    #[error("{}", container_message(pod, container.as_deref(), available))]
    ContainerNotFound {
        pod: String,
        container: Option<String>,
        available: Vec<String>,
    },

    #[error("exec in pod '{pod}' failed: {reason}")]
    ExecFailure { pod: String, reason: String },

    #[error("cluster info for context '{}' is incomplete: {source}", summary.context.name)]
    PartialClusterInfo {
        summary: Box<ClusterSummary>,
        #[source]
        source: Box<GatewayError>,
    },

    #[error("transient network error while accessing {target}: {message}")]
    TransientNetwork {
        target: String,
        message: String,
        code: Option<u16>,
    },

    #[error("{verb} is not supported by {kind} ({api_version})")]
    OperationNotSupported {
        kind: String,
        api_version: String,
        verb: &'static str,
    },

    #[error("API error on {target} ({code}): {message}")]
    Api {
        target: String,
        code: u16,
        reason: String,
        message: String,
    },

    #[error("request for {target} failed in the client ({reason}): {message}")]
    Client {
        target: String,
        reason: String,
        message: String,
    },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid resource reference: {0}")]
    InvalidReference(String),

    #[error("invalid resource URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("failed to serialize {0}")]
    Serialization(String),

    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(String),
}

/// Payload-free discriminant of [`GatewayError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoActiveContext,
    ContextNotFound,
    UnknownKind,
    AmbiguousKind,
    DiscoveryFailed,
    NotFound,
    AlreadyExists,
    Conflict,
    Unauthorized,
    Forbidden,
    PodNotFound,
    ContainerNotFound,
    ExecFailure,
    PartialClusterInfo,
    TransientNetworkError,
    OperationNotSupported,
    Api,
    Client,
    InvalidManifest,
    InvalidReference,
    InvalidUri,
    Serialization,
    Kubeconfig,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoActiveContext => ErrorKind::NoActiveContext,
            Self::ContextNotFound(_) => ErrorKind::ContextNotFound,
            Self::UnknownKind { .. } => ErrorKind::UnknownKind,
            Self::AmbiguousKind { .. } => ErrorKind::AmbiguousKind,
            Self::DiscoveryFailed { .. } => ErrorKind::DiscoveryFailed,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::PodNotFound { .. } => ErrorKind::PodNotFound,
            Self::ContainerNotFound { .. } => ErrorKind::ContainerNotFound,
            Self::ExecFailure { .. } => ErrorKind::ExecFailure,
            Self::PartialClusterInfo { .. } => ErrorKind::PartialClusterInfo,
            Self::TransientNetwork { .. } => ErrorKind::TransientNetworkError,
            Self::OperationNotSupported { .. } => ErrorKind::OperationNotSupported,
            Self::Api { .. } => ErrorKind::Api,
            Self::Client { .. } => ErrorKind::Client,
            Self::InvalidManifest(_) => ErrorKind::InvalidManifest,
            Self::InvalidReference(_) => ErrorKind::InvalidReference,
            Self::InvalidUri { .. } => ErrorKind::InvalidUri,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Kubeconfig(_) => ErrorKind::Kubeconfig,
        }
    }

    /// HTTP status code returned by the API server, if the failure came from one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::NotFound { code, .. }
            | Self::AlreadyExists { code, .. }
            | Self::Conflict { code, .. }
            | Self::Unauthorized { code, .. }
            | Self::Forbidden { code, .. }
            | Self::TransientNetwork { code, .. }
            | Self::DiscoveryFailed { code, .. } => *code,
            Self::Api { code, .. } => Some(*code),
            Self::PartialClusterInfo { source, .. } => source.status_code(),
            _ => None,
        }
    }

    /// Whether a caller-side retry could reasonably succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientNetwork { .. } => true,
            Self::DiscoveryFailed { transient, .. } => *transient,
            Self::PartialClusterInfo { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Map a backend failure onto the taxonomy for an operation on `target`
    pub fn from_api(failure: ApiFailure, target: &ResourceReference) -> Self {
        if failure.transient {
            return Self::TransientNetwork {
                target: target.to_string(),
                message: failure.message,
                code: failure.code,
            };
        }

        let Some(code) = failure.code else {
            // Failed before a response: credentials or request encoding
            if failure.reason == UNAUTHORIZED_REASON {
                return Self::Unauthorized {
                    target: target.clone(),
                    message: failure.message,
                    code: None,
                };
            }
            return Self::Client {
                target: target.to_string(),
                reason: failure.reason,
                message: failure.message,
            };
        };

        let target = target.clone();
        match code {
            404 => Self::NotFound {
                target,
                code: Some(code),
            },
            409 if failure.reason == "AlreadyExists" => Self::AlreadyExists {
                target,
                code: Some(code),
            },
            409 => Self::Conflict {
                target,
                message: failure.message,
                code: Some(code),
            },
            401 => Self::Unauthorized {
                target,
                message: failure.message,
                code: Some(code),
            },
            403 => Self::Forbidden {
                target,
                message: failure.message,
                code: Some(code),
            },
            _ => Self::Api {
                target: target.to_string(),
                code,
                reason: failure.reason,
                message: failure.message,
            },
        }
    }
}

fn display_kind(kind: &str, api_version: Option<&str>) -> String {
    match api_version {
        Some(v) => format!("{v}/{kind}"),
        None => kind.to_string(),
    }
}

fn container_message(pod: &str, container: Option<&str>, available: &[String]) -> String {
    match container {
        Some(c) => format!(
            "container '{c}' not found in pod '{pod}' (available: {})",
            available.join(", ")
        ),
        None => format!(
            "pod '{pod}' has multiple containers, specify one of: {}",
            available.join(", ")
        ),
    }
}

const UNAUTHORIZED_REASON: &str = "Unauthorized";

/// A failed request against the API server, normalised from the transport error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    /// HTTP status code, absent when no response was received
    pub code: Option<u16>,
    /// Machine-readable status reason (e.g. `AlreadyExists`)
    pub reason: String,
    pub message: String,
    /// Connection-level or retryable server condition
    pub transient: bool,
}

impl ApiFailure {
    /// A status response from the API server
    pub fn status(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            reason: reason.into(),
            message: message.into(),
            transient: matches!(code, 429 | 502 | 503 | 504),
        }
    }

    /// No response: connection refused, reset, timed out
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: String::new(),
            message: message.into(),
            transient: true,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Some(404)
    }
}

impl From<kube::Error> for ApiFailure {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(status) => {
                Self::status(status.code, status.reason.clone(), status.message.clone())
            }
            kube::Error::HyperError(e) => Self::network(e.to_string()),
            kube::Error::Service(e) => Self::network(e.to_string()),
            kube::Error::Auth(e) => Self {
                code: None,
                reason: UNAUTHORIZED_REASON.to_string(),
                message: e.to_string(),
                transient: false,
            },
            other => Self {
                code: None,
                reason: "ClientError".to_string(),
                message: other.to_string(),
                transient: false,
            },
        }
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({code}): {}", self.reason, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod_ref() -> ResourceReference {
        ResourceReference::new("Pod", "web-0").in_namespace("default")
    }

    #[test]
    fn test_status_codes_map_onto_taxonomy() {
        let cases = [
            (404, "NotFound", ErrorKind::NotFound),
            (409, "AlreadyExists", ErrorKind::AlreadyExists),
            (409, "Conflict", ErrorKind::Conflict),
            (401, "Unauthorized", ErrorKind::Unauthorized),
            (403, "Forbidden", ErrorKind::Forbidden),
            (503, "ServiceUnavailable", ErrorKind::TransientNetworkError),
            (422, "Invalid", ErrorKind::Api),
        ];

        for (code, reason, expected) in cases {
            let err = GatewayError::from_api(ApiFailure::status(code, reason, "boom"), &pod_ref());
            assert_eq!(err.kind(), expected, "code {code} reason {reason}");
            assert_eq!(err.status_code(), Some(code));
        }
    }

    #[test]
    fn test_network_failure_is_transient_without_code() {
        let err = GatewayError::from_api(ApiFailure::network("connection refused"), &pod_ref());
        assert_eq!(err.kind(), ErrorKind::TransientNetworkError);
        assert!(err.is_transient());
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_client_side_failure_is_not_transient() {
        let failure = ApiFailure {
            code: None,
            reason: "SerializationError".to_string(),
            message: "invalid type: string, expected a map".to_string(),
            transient: false,
        };
        let err = GatewayError::from_api(failure, &pod_ref());
        assert_eq!(err.kind(), ErrorKind::Client);
        assert!(!err.is_transient());
        assert_eq!(err.status_code(), None);
        assert!(err.to_string().contains("web-0"), "{err}");
    }

    #[test]
    fn test_credential_failure_without_response_is_unauthorized() {
        let failure = ApiFailure {
            code: None,
            reason: UNAUTHORIZED_REASON.to_string(),
            message: "auth exec command 'aws' failed: token expired".to_string(),
            transient: false,
        };
        let err = GatewayError::from_api(failure, &pod_ref());
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(!err.is_transient());
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_discovery_failure_keeps_status() {
        let err = GatewayError::DiscoveryFailed {
            context: "dev".to_string(),
            reason: "Forbidden (403): cannot list groups".to_string(),
            code: Some(403),
            transient: false,
        };
        assert_eq!(err.status_code(), Some(403));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_messages_name_the_target() {
        let err = GatewayError::from_api(ApiFailure::status(404, "NotFound", ""), &pod_ref());
        let msg = err.to_string();
        assert!(msg.contains("Pod"), "{msg}");
        assert!(msg.contains("web-0"), "{msg}");
        assert!(msg.contains("default"), "{msg}");

        let err = GatewayError::ContainerNotFound {
            pod: "web-0".to_string(),
            container: None,
            available: vec!["app".to_string(), "sidecar".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "pod 'web-0' has multiple containers, specify one of: app, sidecar"
        );
    }

    #[test]
    fn test_unknown_kind_message_includes_api_version() {
        let err = GatewayError::UnknownKind {
            context: "dev".to_string(),
            kind: "Widget".to_string(),
            api_version: Some("example.com/v1".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "unknown kind 'example.com/v1/Widget' in context 'dev'"
        );
    }
}
