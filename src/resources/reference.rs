use crate::error::{GatewayError, Result};
use std::fmt;

/// Address of a single object: kind, optional apiVersion, namespace, name
///
/// `namespace` is absent for cluster-scoped kinds, or when the caller wants
/// the handle's default namespace applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceReference {
    pub kind: String,
    pub api_version: Option<String>,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceReference {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            api_version: None,
            namespace: None,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Shorthand for a core/v1 Pod reference
    pub fn pod(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new("Pod", name).in_namespace(namespace)
    }

    /// Parse a kubectl-style `kind/name` reference
    pub fn parse(reference: &str) -> Result<Self> {
        let (kind, name) = reference.split_once('/').ok_or_else(|| {
            GatewayError::InvalidReference(format!("expected 'kind/name', got '{reference}'"))
        })?;

        if kind.is_empty() {
            return Err(GatewayError::InvalidReference(format!(
                "resource kind cannot be empty in '{reference}'"
            )));
        }
        if name.is_empty() || name.contains('/') {
            return Err(GatewayError::InvalidReference(format!(
                "invalid resource name in '{reference}'"
            )));
        }

        Ok(Self::new(kind, name))
    }

    /// Whether this reference names a pod (any casing, plural or short name)
    pub fn is_pod(&self) -> bool {
        matches!(
            self.kind.to_ascii_lowercase().as_str(),
            "pod" | "pods" | "po"
        ) && self.api_version.as_deref().map_or(true, |v| v == "v1")
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.api_version {
            Some(v) => write!(f, "{v}/{} '{}'", self.kind, self.name)?,
            None => write!(f, "{} '{}'", self.kind, self.name)?,
        }
        if let Some(ns) = &self.namespace {
            write!(f, " in namespace '{ns}'")?;
        }
        Ok(())
    }
}

/// A pod plus an optional container, the unit for logs and exec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodTarget {
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
}

impl PodTarget {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: None,
        }
    }

    #[must_use]
    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Build from a pod reference, filling the namespace from `default_namespace`
    pub fn from_reference(reference: &ResourceReference, default_namespace: &str) -> Result<Self> {
        if !reference.is_pod() {
            return Err(GatewayError::InvalidReference(format!(
                "expected a pod reference, got {reference}"
            )));
        }
        Ok(Self::new(
            reference
                .namespace
                .clone()
                .unwrap_or_else(|| default_namespace.to_string()),
            reference.name.clone(),
        ))
    }

    pub fn reference(&self) -> ResourceReference {
        ResourceReference::pod(&self.namespace, &self.pod)
    }
}
