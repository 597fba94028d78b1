//! Log and exec streams against running pods
//!
//! Both resolve the pod and pick a container the same way before opening a
//! connection. Long-lived streams are plain handles: closing or dropping one
//! releases the connection, and nothing runs in the background.

mod exec;
mod logs;

pub use exec::{exit_code_from_status, CommandExecutor, ExecOutput, ExecResult, ExecSession, ExecStream, TerminalSize};
pub use logs::{LogRequest, LogStream, LogStreamer};

use crate::error::{ApiFailure, GatewayError, Result};
use crate::resources::PodTarget;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::Client;

/// Annotation naming the container `kubectl` picks when none is given
pub const DEFAULT_CONTAINER_ANNOTATION: &str = "kubectl.kubernetes.io/default-container";

/// Names of regular, init and ephemeral containers, in that order
pub fn container_names(pod: &Pod) -> Vec<String> {
    let Some(spec) = &pod.spec else {
        return Vec::new();
    };

    let mut names: Vec<String> = spec.containers.iter().map(|c| c.name.clone()).collect();
    names.extend(spec.init_containers.iter().flatten().map(|c| c.name.clone()));
    names.extend(
        spec.ephemeral_containers
            .iter()
            .flatten()
            .map(|c| c.name.clone()),
    );
    names
}

/// Pick the container an operation runs against
///
/// An explicit name must exist. Otherwise a single-container pod uses its only
/// container, and a multi-container pod falls back to the default-container
/// annotation. Anything else is `ContainerNotFound` listing what is available.
pub fn select_container(pod: &Pod, requested: Option<&str>) -> Result<String> {
    let pod_name = pod.metadata.name.clone().unwrap_or_default();
    let available = container_names(pod);

    if let Some(name) = requested {
        if available.iter().any(|c| c == name) {
            return Ok(name.to_string());
        }
        return Err(GatewayError::ContainerNotFound {
            pod: pod_name,
            container: Some(name.to_string()),
            available,
        });
    }

    let regular: Vec<&str> = pod
        .spec
        .iter()
        .flat_map(|s| s.containers.iter().map(|c| c.name.as_str()))
        .collect();
    if let [only] = regular.as_slice() {
        return Ok((*only).to_string());
    }

    let annotated = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(DEFAULT_CONTAINER_ANNOTATION))
        .filter(|name| regular.contains(&name.as_str()));
    if let Some(name) = annotated {
        return Ok(name.clone());
    }

    Err(GatewayError::ContainerNotFound {
        pod: pod_name,
        container: None,
        available,
    })
}

/// Map a failure on a pod operation; 404 becomes `PodNotFound`
pub(crate) fn pod_error(failure: ApiFailure, target: &PodTarget) -> GatewayError {
    if failure.is_not_found() {
        GatewayError::PodNotFound {
            namespace: target.namespace.clone(),
            name: target.pod.clone(),
        }
    } else {
        GatewayError::from_api(failure, &target.reference())
    }
}

pub(crate) async fn fetch_pod(client: &Client, target: &PodTarget) -> Result<(Api<Pod>, Pod)> {
    let pods: Api<Pod> = Api::namespaced(client.clone(), &target.namespace);
    let pod = pods
        .get(&target.pod)
        .await
        .map_err(|e| pod_error(ApiFailure::from(e), target))?;
    Ok((pods, pod))
}
