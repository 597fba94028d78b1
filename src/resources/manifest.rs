//! Multi-document manifests and server-field stripping

use crate::error::{GatewayError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Metadata fields the API server owns
const SERVER_METADATA_FIELDS: &[&str] = &[
    "resourceVersion",
    "uid",
    "creationTimestamp",
    "generation",
    "managedFields",
    "selfLink",
];

/// One or more objects parsed from YAML or JSON text
///
/// Documents keep their source order. Empty documents are dropped and `*List`
/// documents are flattened into their items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    documents: Vec<Value>,
}

impl Manifest {
    /// Parse YAML (single or `---`-separated multi-document) or JSON text
    pub fn parse(text: &str) -> Result<Self> {
        let mut documents = Vec::new();
        for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
            let value = Value::deserialize(document).map_err(|e| {
                GatewayError::InvalidManifest(format!("document {index}: {e}"))
            })?;
            push_flattened(&mut documents, value);
        }
        Ok(Self { documents })
    }

    /// Wrap one already structured object (or a `*List` of objects)
    pub fn from_value(value: Value) -> Self {
        let mut documents = Vec::new();
        push_flattened(&mut documents, value);
        Self { documents }
    }

    pub fn from_documents(values: impl IntoIterator<Item = Value>) -> Self {
        let mut documents = Vec::new();
        for value in values {
            push_flattened(&mut documents, value);
        }
        Self { documents }
    }

    pub fn documents(&self) -> &[Value] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn push_flattened(documents: &mut Vec<Value>, value: Value) {
    match value {
        Value::Null => {}
        Value::Object(ref map) if is_list(map) => {
            if let Some(Value::Array(items)) = map.get("items") {
                for item in items {
                    push_flattened(documents, item.clone());
                }
            }
        }
        other => documents.push(other),
    }
}

fn is_list(map: &Map<String, Value>) -> bool {
    map.get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.ends_with("List"))
        && map.get("items").is_some_and(Value::is_array)
}

/// apiVersion, kind and metadata identity of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentIdentity {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl DocumentIdentity {
    pub fn from_value(document: &Value) -> Result<Self> {
        if !document.is_object() {
            return Err(GatewayError::InvalidManifest(
                "document is not a mapping".to_string(),
            ));
        }

        let field = |pointer: &str| document.pointer(pointer).and_then(Value::as_str);

        let api_version = field("/apiVersion")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GatewayError::InvalidManifest("missing apiVersion".to_string()))?;
        let kind = field("/kind")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GatewayError::InvalidManifest("missing kind".to_string()))?;
        let name = field("/metadata/name").filter(|n| !n.is_empty()).ok_or_else(|| {
            GatewayError::InvalidManifest(format!("{kind} is missing metadata.name"))
        })?;

        Ok(Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: field("/metadata/namespace")
                .filter(|ns| !ns.is_empty())
                .map(String::from),
        })
    }
}

/// Remove fields the API server populates, so an object can be re-applied
///
/// Drops `status` and `metadata.{resourceVersion, uid, creationTimestamp,
/// generation, managedFields, selfLink}`.
pub fn strip_server_fields(object: &mut Value) {
    let Some(map) = object.as_object_mut() else {
        return;
    };
    map.remove("status");

    if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
        for field in SERVER_METADATA_FIELDS {
            metadata.remove(*field);
        }
    }
}

/// Set or clear `metadata.namespace`
pub(crate) fn set_namespace(object: &mut Value, namespace: Option<&str>) {
    let Some(map) = object.as_object_mut() else {
        return;
    };
    let metadata = map
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(metadata) = metadata.as_object_mut() else {
        return;
    };
    match namespace {
        Some(ns) => {
            metadata.insert("namespace".to_string(), Value::String(ns.to_string()));
        }
        None => {
            metadata.remove("namespace");
        }
    }
}

pub(crate) fn resource_version(object: &Value) -> Option<&str> {
    object
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
}

pub(crate) fn set_resource_version(object: &mut Value, version: &str) {
    if let Some(Value::Object(metadata)) = object.get_mut("metadata") {
        metadata.insert(
            "resourceVersion".to_string(),
            Value::String(version.to_string()),
        );
    }
}
