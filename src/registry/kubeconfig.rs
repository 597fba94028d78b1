//! Context records extracted from a kubeconfig
//!
//! Only the pieces the gateway needs are read: context → cluster server URL,
//! user → credential method, and the default namespace. Everything else is left
//! to `kube` when a client is built.

use crate::error::{GatewayError, Result};
use kube::config::Kubeconfig;
use serde::{Deserialize, Serialize};

/// How a context's user authenticates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum AuthMethod {
    Token,
    ClientCertificate,
    /// Exec credential plugin, e.g. `aws` or `gke-gcloud-auth-plugin`
    Exec { command: String },
    AuthProvider { name: String },
    Basic,
    None,
}

impl AuthMethod {
    /// Command of the exec plugin, if any
    pub fn exec_command(&self) -> Option<&str> {
        match self {
            Self::Exec { command } => Some(command),
            _ => None,
        }
    }
}

/// One named context, resolved against its cluster and user entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeContext {
    pub name: String,
    pub cluster: String,
    /// API server URL of the cluster entry
    pub server: Option<String>,
    pub user: Option<String>,
    pub namespace: Option<String>,
    pub credential: AuthMethod,
}

impl KubeContext {
    pub fn new(name: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cluster: cluster.into(),
            server: None,
            user: None,
            namespace: None,
            credential: AuthMethod::None,
        }
    }

    #[must_use]
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn credential(mut self, credential: AuthMethod) -> Self {
        self.credential = credential;
        self
    }

    /// Namespace used when an operation does not name one
    pub fn default_namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or("default")
    }
}

// Lenient views over the kubeconfig layout. Unknown fields are ignored and
// every section is optional so partially filled files still load.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    #[serde(rename = "current-context")]
    current_context: Option<String>,
    clusters: Vec<Named<RawCluster>>,
    contexts: Vec<Named<RawContext>>,
    users: Vec<Named<RawUser>>,
}

#[derive(Debug, Deserialize)]
struct Named<T> {
    name: String,
    #[serde(alias = "cluster", alias = "context", alias = "user")]
    item: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCluster {
    server: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawContext {
    cluster: String,
    user: Option<String>,
    namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct RawUser {
    token: Option<String>,
    token_file: Option<String>,
    client_certificate: Option<String>,
    client_certificate_data: Option<String>,
    username: Option<String>,
    exec: Option<RawExec>,
    auth_provider: Option<RawAuthProvider>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawExec {
    command: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAuthProvider {
    name: String,
}

impl RawUser {
    fn auth_method(&self) -> AuthMethod {
        if let Some(exec) = &self.exec {
            return AuthMethod::Exec {
                command: exec.command.clone().unwrap_or_default(),
            };
        }
        if let Some(provider) = &self.auth_provider {
            return AuthMethod::AuthProvider {
                name: provider.name.clone(),
            };
        }
        if self.token.is_some() || self.token_file.is_some() {
            return AuthMethod::Token;
        }
        if self.client_certificate.is_some() || self.client_certificate_data.is_some() {
            return AuthMethod::ClientCertificate;
        }
        if self.username.is_some() {
            return AuthMethod::Basic;
        }
        AuthMethod::None
    }
}

/// Contexts in source order plus the file's `current-context`
pub(crate) struct ParsedContexts {
    pub contexts: Vec<KubeContext>,
    pub current: Option<String>,
}

/// Extract context records from an already loaded kubeconfig
pub(crate) fn contexts_from_kubeconfig(kubeconfig: &Kubeconfig) -> Result<ParsedContexts> {
    let value =
        serde_json::to_value(kubeconfig).map_err(|e| GatewayError::Kubeconfig(e.to_string()))?;
    let raw: RawConfig =
        serde_json::from_value(value).map_err(|e| GatewayError::Kubeconfig(e.to_string()))?;
    Ok(resolve(raw))
}

fn resolve(raw: RawConfig) -> ParsedContexts {
    let contexts = raw
        .contexts
        .iter()
        .map(|named| {
            let ctx = named.item.as_ref();
            let cluster = ctx.map(|c| c.cluster.clone()).unwrap_or_default();
            let user = ctx.and_then(|c| c.user.clone());

            let server = raw
                .clusters
                .iter()
                .find(|c| c.name == cluster)
                .and_then(|c| c.item.as_ref())
                .and_then(|c| c.server.clone());

            let credential = user
                .as_ref()
                .and_then(|u| raw.users.iter().find(|entry| &entry.name == u))
                .and_then(|entry| entry.item.as_ref())
                .map_or(AuthMethod::None, RawUser::auth_method);

            KubeContext {
                name: named.name.clone(),
                cluster,
                server,
                user,
                namespace: ctx.and_then(|c| c.namespace.clone()),
                credential,
            }
        })
        .collect();

    ParsedContexts {
        contexts,
        current: raw.current_context.filter(|c| !c.is_empty()),
    }
}
