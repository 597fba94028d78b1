//! One-shot cluster overview: version, provider, node and namespace counts

use crate::error::{GatewayError, Result};
use crate::provider::{ClusterEndpoint, NodeSignals, ProviderTag, ServerVersion};
use crate::registry::ContextSummary;
use crate::resources::{DynamicClient, ListRequest};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// What is known about a cluster
///
/// Fields whose sub-request failed are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub context: ContextSummary,
    pub server: Option<String>,
    pub version: Option<ServerVersion>,
    pub provider: ProviderTag,
    pub node_count: Option<usize>,
    pub namespace_count: Option<usize>,
}

pub struct ClusterInfoAggregator {
    context: ContextSummary,
    endpoint: Arc<ClusterEndpoint>,
    resources: DynamicClient,
}

impl ClusterInfoAggregator {
    pub fn new(
        context: ContextSummary,
        endpoint: Arc<ClusterEndpoint>,
        resources: DynamicClient,
    ) -> Self {
        Self {
            context,
            endpoint,
            resources,
        }
    }

    /// Query version, nodes and namespaces concurrently
    ///
    /// If any of them fails the result is `PartialClusterInfo`, carrying the
    /// fields that did succeed and the first failure in the order version,
    /// nodes, namespaces.
    #[instrument(skip(self), fields(context = %self.context.name))]
    pub async fn summarize(&self) -> Result<ClusterSummary> {
        let resources = &self.resources;
        let nodes_req = ListRequest::new("Node");
        let namespaces_req = ListRequest::new("Namespace");
        let (version, nodes, namespaces) = tokio::join!(
            self.endpoint.version_with(|| resources.server_version()),
            resources.list(&nodes_req),
            resources.list(&namespaces_req),
        );

        let signals: Option<Vec<NodeSignals>> = nodes
            .as_ref()
            .ok()
            .map(|items| items.iter().map(NodeSignals::from_object).collect());
        let provider = self.endpoint.provider(signals.as_deref());

        let (version, version_err) = split(version);
        let (nodes, nodes_err) = split(nodes);
        let (namespaces, namespaces_err) = split(namespaces);

        let summary = ClusterSummary {
            context: self.context.clone(),
            server: self.endpoint.server.clone(),
            version,
            provider,
            node_count: nodes.as_ref().map(Vec::len),
            namespace_count: namespaces.as_ref().map(Vec::len),
        };

        let mut failures = [version_err, nodes_err, namespaces_err]
            .into_iter()
            .flatten();
        match failures.next() {
            None => {
                debug!(provider = %summary.provider, "summarized cluster");
                Ok(summary)
            }
            Some(first) => {
                for other in failures {
                    debug!(error = %other, "additional cluster info failure");
                }
                Err(GatewayError::PartialClusterInfo {
                    summary: Box::new(summary),
                    source: Box::new(first),
                })
            }
        }
    }
}

fn split<T>(result: Result<T>) -> (Option<T>, Option<GatewayError>) {
    match result {
        Ok(value) => (Some(value), None),
        Err(e) => (None, Some(e)),
    }
}
