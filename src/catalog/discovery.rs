//! Live API discovery against a cluster's `/api` and `/apis` endpoints

use super::descriptor::ApiResourceDescriptor;
use crate::error::ApiFailure;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{APIResource, APIResourceList};
use kube::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

/// Source of API resource descriptors for one cluster
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// Cache key for the catalog, normally the context name
    fn cluster_key(&self) -> &str;

    /// Enumerate every resource the cluster serves
    async fn discover(&self) -> Result<Vec<ApiResourceDescriptor>, ApiFailure>;
}

/// Discovers resources through the kube client
pub struct KubeDiscoverer {
    client: Client,
    context: String,
    max_concurrent: usize,
}

impl KubeDiscoverer {
    pub fn new(client: Client, context: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            client,
            context: context.into(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// (group version, preferred) for every served version of every group
    async fn group_versions(&self) -> Result<Vec<(String, bool)>, ApiFailure> {
        let mut versions = Vec::new();

        let core = self.client.list_core_api_versions().await?;
        for (i, version) in core.versions.iter().enumerate() {
            versions.push((version.clone(), i == 0));
        }

        let groups = self.client.list_api_groups().await?;
        for group in groups.groups {
            let preferred = group
                .preferred_version
                .as_ref()
                .map(|p| p.group_version.clone());
            for (i, gv) in group.versions.iter().enumerate() {
                let is_preferred = match &preferred {
                    Some(p) => *p == gv.group_version,
                    None => i == 0,
                };
                versions.push((gv.group_version.clone(), is_preferred));
            }
        }

        Ok(versions)
    }
}

#[async_trait]
impl Discoverer for KubeDiscoverer {
    fn cluster_key(&self) -> &str {
        &self.context
    }

    #[instrument(skip(self), fields(context = %self.context))]
    async fn discover(&self) -> Result<Vec<ApiResourceDescriptor>, ApiFailure> {
        let versions = self.group_versions().await?;
        debug!(group_versions = versions.len(), "discovering API resources");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set = JoinSet::new();

        for (group_version, preferred) in versions {
            let client = self.client.clone();
            let sem = semaphore.clone();

            join_set.spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| (group_version.clone(), ApiFailure::network(e.to_string())))?;

                let list = if group_version.contains('/') {
                    client.list_api_group_resources(&group_version).await
                } else {
                    client.list_core_api_resources(&group_version).await
                };

                match list {
                    Ok(list) => Ok(descriptors_from_list(&list, preferred)),
                    Err(e) => Err((group_version, ApiFailure::from(e))),
                }
            });
        }

        let mut descriptors = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(found)) => descriptors.extend(found),
                // Aggregated APIs (metrics-server and friends) are often unavailable
                Ok(Err((group_version, failure))) if !failure.transient => {
                    warn!(%group_version, error = %failure, "skipping unavailable group version");
                }
                Ok(Err((_, failure))) => return Err(failure),
                Err(e) => return Err(ApiFailure::network(format!("discovery task failed: {e}"))),
            }
        }

        Ok(descriptors)
    }
}

/// Convert one `APIResourceList` into descriptors, dropping subresources
pub fn descriptors_from_list(list: &APIResourceList, preferred: bool) -> Vec<ApiResourceDescriptor> {
    let (group, version) = super::descriptor::split_api_version(&list.group_version);

    list.resources
        .iter()
        .filter(|r| !r.name.contains('/'))
        .map(|r| descriptor_from_resource(r, group, version, preferred))
        .collect()
}

fn descriptor_from_resource(
    resource: &APIResource,
    group: &str,
    version: &str,
    preferred: bool,
) -> ApiResourceDescriptor {
    ApiResourceDescriptor {
        kind: resource.kind.clone(),
        group: resource.group.clone().unwrap_or_else(|| group.to_string()),
        version: resource.version.clone().unwrap_or_else(|| version.to_string()),
        plural: resource.name.clone(),
        singular: if resource.singular_name.is_empty() {
            resource.kind.to_ascii_lowercase()
        } else {
            resource.singular_name.clone()
        },
        namespaced: resource.namespaced,
        short_names: resource.short_names.iter().flatten().cloned().collect(),
        verbs: resource.verbs.iter().cloned().collect(),
        preferred,
    }
}
