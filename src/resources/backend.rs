//! Transport seam for generic resource operations

use crate::catalog::ApiResourceDescriptor;
use crate::error::ApiFailure;
use crate::provider::ServerVersion;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::Client;
use serde_json::Value;

/// Raw REST operations against one cluster, addressed by a resolved descriptor
///
/// `namespace` is ignored for cluster-scoped resources. For `list`, a `None`
/// namespace on a namespaced resource means all namespaces.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    async fn get(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, ApiFailure>;

    async fn list(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>, ApiFailure>;

    async fn create(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value, ApiFailure>;

    async fn replace(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
    ) -> Result<Value, ApiFailure>;

    /// Returns once the API server has accepted the deletion
    async fn delete(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ApiFailure>;

    async fn server_version(&self) -> Result<ServerVersion, ApiFailure>;
}

/// `ResourceBackend` over `Api<DynamicObject>`
#[derive(Clone)]
pub struct KubeBackend {
    client: Client,
}

impl KubeBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResourceDescriptor, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = resource.to_api_resource();
        match namespace.filter(|_| resource.namespaced) {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

fn to_value(object: DynamicObject) -> Result<Value, ApiFailure> {
    serde_json::to_value(object).map_err(serialization_failure)
}

fn from_value(object: &Value) -> Result<DynamicObject, ApiFailure> {
    serde_json::from_value(object.clone()).map_err(serialization_failure)
}

fn serialization_failure(e: serde_json::Error) -> ApiFailure {
    ApiFailure {
        code: None,
        reason: "SerializationError".to_string(),
        message: e.to_string(),
        transient: false,
    }
}

#[async_trait]
impl ResourceBackend for KubeBackend {
    async fn get(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, ApiFailure> {
        let object = self.api(resource, namespace).get(name).await?;
        to_value(object)
    }

    async fn list(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>, ApiFailure> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        let list = self.api(resource, namespace).list(&params).await?;
        list.items.into_iter().map(to_value).collect()
    }

    async fn create(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value, ApiFailure> {
        let object = from_value(object)?;
        let created = self
            .api(resource, namespace)
            .create(&PostParams::default(), &object)
            .await?;
        to_value(created)
    }

    async fn replace(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
    ) -> Result<Value, ApiFailure> {
        let object = from_value(object)?;
        let replaced = self
            .api(resource, namespace)
            .replace(name, &PostParams::default(), &object)
            .await?;
        to_value(replaced)
    }

    async fn delete(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ApiFailure> {
        self.api(resource, namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn server_version(&self) -> Result<ServerVersion, ApiFailure> {
        let info = self.client.apiserver_version().await?;
        Ok(info.into())
    }
}
