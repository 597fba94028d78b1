//! Compact per-kind listings
//!
//! These back the listing URIs. Secret and ConfigMap summaries carry data keys
//! only, never values.

use serde::Serialize;
use serde_json::Value;

fn text(object: &Value, pointer: &str) -> Option<String> {
    object.pointer(pointer).and_then(Value::as_str).map(String::from)
}

fn keys(object: &Value, pointer: &str) -> Vec<String> {
    object
        .pointer(pointer)
        .and_then(Value::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

fn name(object: &Value) -> String {
    text(object, "/metadata/name").unwrap_or_default()
}

fn created(object: &Value) -> Option<String> {
    text(object, "/metadata/creationTimestamp")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceSummary {
    pub name: String,
    pub status: Option<String>,
    pub creation_timestamp: Option<String>,
}

impl NamespaceSummary {
    pub fn from_object(object: &Value) -> Self {
        Self {
            name: name(object),
            status: text(object, "/status/phase"),
            creation_timestamp: created(object),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodSummary {
    pub name: String,
    pub namespace: Option<String>,
    pub status: Option<String>,
    pub ip: Option<String>,
    pub node: Option<String>,
    pub creation_timestamp: Option<String>,
}

impl PodSummary {
    pub fn from_object(object: &Value) -> Self {
        Self {
            name: name(object),
            namespace: text(object, "/metadata/namespace"),
            status: text(object, "/status/phase"),
            ip: text(object, "/status/podIP"),
            node: text(object, "/spec/nodeName"),
            creation_timestamp: created(object),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentSummary {
    pub name: String,
    pub namespace: Option<String>,
    pub replicas: Option<i64>,
    pub available_replicas: Option<i64>,
    pub creation_timestamp: Option<String>,
}

impl DeploymentSummary {
    pub fn from_object(object: &Value) -> Self {
        Self {
            name: name(object),
            namespace: text(object, "/metadata/namespace"),
            replicas: object.pointer("/spec/replicas").and_then(Value::as_i64),
            available_replicas: object
                .pointer("/status/availableReplicas")
                .and_then(Value::as_i64),
            creation_timestamp: created(object),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServicePort {
    pub name: Option<String>,
    pub port: Option<i64>,
    /// Number or named port, kept as the server returned it
    pub target_port: Option<Value>,
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    pub namespace: Option<String>,
    #[serde(rename = "type")]
    pub service_type: Option<String>,
    pub cluster_ip: Option<String>,
    pub ports: Vec<ServicePort>,
    pub creation_timestamp: Option<String>,
}

impl ServiceSummary {
    pub fn from_object(object: &Value) -> Self {
        let ports = object
            .pointer("/spec/ports")
            .and_then(Value::as_array)
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ServicePort {
                        name: text(p, "/name"),
                        port: p.get("port").and_then(Value::as_i64),
                        target_port: p.get("targetPort").cloned(),
                        protocol: text(p, "/protocol"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name(object),
            namespace: text(object, "/metadata/namespace"),
            service_type: text(object, "/spec/type"),
            cluster_ip: text(object, "/spec/clusterIP"),
            ports,
            creation_timestamp: created(object),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigMapSummary {
    pub name: String,
    pub namespace: Option<String>,
    pub data_keys: Vec<String>,
    pub creation_timestamp: Option<String>,
}

impl ConfigMapSummary {
    pub fn from_object(object: &Value) -> Self {
        let mut data_keys = keys(object, "/data");
        data_keys.extend(keys(object, "/binaryData"));
        Self {
            name: name(object),
            namespace: text(object, "/metadata/namespace"),
            data_keys,
            creation_timestamp: created(object),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecretSummary {
    pub name: String,
    pub namespace: Option<String>,
    #[serde(rename = "type")]
    pub secret_type: Option<String>,
    pub data_keys: Vec<String>,
    pub creation_timestamp: Option<String>,
}

impl SecretSummary {
    pub fn from_object(object: &Value) -> Self {
        let mut data_keys = keys(object, "/data");
        for key in keys(object, "/stringData") {
            if !data_keys.contains(&key) {
                data_keys.push(key);
            }
        }
        Self {
            name: name(object),
            namespace: text(object, "/metadata/namespace"),
            secret_type: text(object, "/type"),
            data_keys,
            creation_timestamp: created(object),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub address_type: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSummary {
    pub name: String,
    /// Condition types whose status is `True`
    pub status: Vec<String>,
    pub kubelet_version: Option<String>,
    pub os_image: Option<String>,
    pub addresses: Vec<NodeAddress>,
    pub creation_timestamp: Option<String>,
}

impl NodeSummary {
    pub fn from_object(object: &Value) -> Self {
        let status = object
            .pointer("/status/conditions")
            .and_then(Value::as_array)
            .map(|conditions| {
                conditions
                    .iter()
                    .filter(|c| c.get("status").and_then(Value::as_str) == Some("True"))
                    .filter_map(|c| text(c, "/type"))
                    .collect()
            })
            .unwrap_or_default();

        let addresses = object
            .pointer("/status/addresses")
            .and_then(Value::as_array)
            .map(|addresses| {
                addresses
                    .iter()
                    .map(|a| NodeAddress {
                        address_type: text(a, "/type").unwrap_or_default(),
                        address: text(a, "/address").unwrap_or_default(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name(object),
            status,
            kubelet_version: text(object, "/status/nodeInfo/kubeletVersion"),
            os_image: text(object, "/status/nodeInfo/osImage"),
            addresses,
            creation_timestamp: created(object),
        }
    }
}
