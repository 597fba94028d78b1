//! In-memory stand-ins for the discovery and REST seams

#![allow(dead_code)] // Each test binary uses a different subset

use async_trait::async_trait;
use kubegate::catalog::{ApiCatalog, ApiResourceDescriptor, Discoverer};
use kubegate::{ApiFailure, DynamicClient, ResourceBackend, ServerVersion};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn descriptor(
    group: &str,
    version: &str,
    kind: &str,
    plural: &str,
    namespaced: bool,
) -> ApiResourceDescriptor {
    let mut d = ApiResourceDescriptor::core(kind, plural, namespaced);
    d.group = group.to_string();
    d.version = version.to_string();
    d
}

/// A small cluster: core kinds, apps/v1 Deployments and a `Widget` CRD
/// served by two unrelated groups
pub fn standard_descriptors() -> Vec<ApiResourceDescriptor> {
    let mut pod = descriptor("", "v1", "Pod", "pods", true);
    pod.short_names.insert("po".to_string());
    let mut deployment = descriptor("apps", "v1", "Deployment", "deployments", true);
    deployment.short_names.insert("deploy".to_string());

    vec![
        pod,
        descriptor("", "v1", "Namespace", "namespaces", false),
        descriptor("", "v1", "Node", "nodes", false),
        descriptor("", "v1", "ConfigMap", "configmaps", true),
        descriptor("", "v1", "Secret", "secrets", true),
        descriptor("", "v1", "Service", "services", true),
        deployment,
        descriptor("example.com", "v1", "Widget", "widgets", true),
        descriptor("gadgets.io", "v1beta1", "Widget", "widgets", true),
    ]
}

pub struct FakeDiscoverer {
    key: String,
    descriptors: Mutex<Vec<ApiResourceDescriptor>>,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    failure: ApiFailure,
    delay: Duration,
}

impl FakeDiscoverer {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            descriptors: Mutex::new(standard_descriptors()),
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            failure: ApiFailure::network("connection refused"),
            delay: Duration::ZERO,
        }
    }

    /// Every discovery call sleeps this long first
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The next `n` discovery calls fail with a network error
    pub fn failing(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` discovery calls fail with `failure`
    pub fn failing_with(mut self, n: usize, failure: ApiFailure) -> Self {
        self.failure = failure;
        self.failing(n)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn add(&self, descriptor: ApiResourceDescriptor) {
        self.descriptors.lock().push(descriptor);
    }
}

#[async_trait]
impl Discoverer for FakeDiscoverer {
    fn cluster_key(&self) -> &str {
        &self.key
    }

    async fn discover(&self) -> Result<Vec<ApiResourceDescriptor>, ApiFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(self.failure.clone());
        }

        Ok(self.descriptors.lock().clone())
    }
}

type ObjectKey = (String, String, Option<String>, String);

/// A single-node API server kept in a map
///
/// Mimics the status codes and server-populated fields of the real thing:
/// create stamps `resourceVersion`, `uid`, `creationTimestamp` and `status`;
/// a stale `resourceVersion` on replace is a 409 Conflict.
pub struct MemoryBackend {
    objects: Mutex<BTreeMap<ObjectKey, Value>>,
    list_failures: Mutex<HashMap<String, ApiFailure>>,
    version_failure: Mutex<Option<ApiFailure>>,
    revision: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            list_failures: Mutex::new(HashMap::new()),
            version_failure: Mutex::new(None),
            revision: AtomicU64::new(1),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(resource: &ApiResourceDescriptor, namespace: Option<&str>, name: &str) -> ObjectKey {
        (
            resource.api_version(),
            resource.plural.clone(),
            namespace.filter(|_| resource.namespaced).map(String::from),
            name.to_string(),
        )
    }

    fn next_revision(&self) -> String {
        self.revision.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Store an object as-is, bypassing create semantics
    pub fn seed(&self, resource: &ApiResourceDescriptor, namespace: Option<&str>, object: Value) {
        let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
        self.objects
            .lock()
            .insert(Self::key(resource, namespace, &name), object);
    }

    pub fn fail_list(&self, plural: &str, failure: ApiFailure) {
        self.list_failures.lock().insert(plural.to_string(), failure);
    }

    pub fn fail_version(&self, failure: ApiFailure) {
        *self.version_failure.lock() = Some(failure);
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    fn not_found(resource: &ApiResourceDescriptor, name: &str) -> ApiFailure {
        ApiFailure::status(
            404,
            "NotFound",
            format!("{} \"{name}\" not found", resource.plural),
        )
    }
}

fn matches_selector(object: &Value, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        let Some((key, value)) = term.split_once('=') else {
            return false;
        };
        object["metadata"]["labels"][key.trim()].as_str() == Some(value.trim())
    })
}

#[async_trait]
impl ResourceBackend for MemoryBackend {
    async fn get(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Value, ApiFailure> {
        self.objects
            .lock()
            .get(&Self::key(resource, namespace, name))
            .cloned()
            .ok_or_else(|| Self::not_found(resource, name))
    }

    async fn list(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>, ApiFailure> {
        if let Some(failure) = self.list_failures.lock().get(&resource.plural) {
            return Err(failure.clone());
        }

        let api_version = resource.api_version();
        let namespace = namespace.filter(|_| resource.namespaced);
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|((v, plural, ns, _), _)| {
                *v == api_version
                    && *plural == resource.plural
                    && (namespace.is_none() || ns.as_deref() == namespace)
            })
            .map(|(_, object)| object.clone())
            .filter(|object| matches_selector(object, label_selector))
            .collect())
    }

    async fn create(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value, ApiFailure> {
        let name = object["metadata"]["name"].as_str().unwrap_or_default().to_string();
        let key = Self::key(resource, namespace, &name);

        let mut objects = self.objects.lock();
        if objects.contains_key(&key) {
            return Err(ApiFailure::status(
                409,
                "AlreadyExists",
                format!("{} \"{name}\" already exists", resource.plural),
            ));
        }

        let revision = self.next_revision();
        let mut stored = object.clone();
        let metadata = &mut stored["metadata"];
        metadata["resourceVersion"] = json!(revision);
        metadata["uid"] = json!(format!("uid-{revision}"));
        metadata["creationTimestamp"] = json!("2024-01-01T00:00:00Z");
        if let Some(ns) = &key.2 {
            metadata["namespace"] = json!(ns);
        }
        stored["status"] = json!({"phase": "Active"});

        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
    ) -> Result<Value, ApiFailure> {
        let key = Self::key(resource, namespace, name);

        let mut objects = self.objects.lock();
        let Some(live) = objects.get(&key) else {
            return Err(Self::not_found(resource, name));
        };

        let live_version = live["metadata"]["resourceVersion"].clone();
        if let Some(sent) = object["metadata"]["resourceVersion"].as_str() {
            if Some(sent) != live_version.as_str() {
                return Err(ApiFailure::status(
                    409,
                    "Conflict",
                    format!(
                        "Operation cannot be fulfilled on {} \"{name}\": the object has been modified",
                        resource.plural
                    ),
                ));
            }
        }

        let mut stored = object.clone();
        stored["metadata"]["resourceVersion"] = json!(self.next_revision());
        stored["metadata"]["uid"] = live["metadata"]["uid"].clone();
        stored["metadata"]["creationTimestamp"] = live["metadata"]["creationTimestamp"].clone();
        stored["status"] = live["status"].clone();

        objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(
        &self,
        resource: &ApiResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ApiFailure> {
        self.objects
            .lock()
            .remove(&Self::key(resource, namespace, name))
            .map(|_| ())
            .ok_or_else(|| Self::not_found(resource, name))
    }

    async fn server_version(&self) -> Result<ServerVersion, ApiFailure> {
        if let Some(failure) = self.version_failure.lock().clone() {
            return Err(failure);
        }
        Ok(ServerVersion {
            major: "1".to_string(),
            minor: "31".to_string(),
            git_version: "v1.31.2".to_string(),
            platform: "linux/amd64".to_string(),
        })
    }
}

pub struct Fixture {
    pub discoverer: Arc<FakeDiscoverer>,
    pub backend: Arc<MemoryBackend>,
    pub client: DynamicClient,
}

/// A dynamic client for context `dev` over fresh fakes
pub fn fixture() -> Fixture {
    let discoverer = Arc::new(FakeDiscoverer::new("dev"));
    let backend = Arc::new(MemoryBackend::new());
    let client = DynamicClient::new(
        Arc::new(ApiCatalog::new(Duration::from_millis(1))),
        discoverer.clone(),
        backend.clone(),
        "default",
    );
    Fixture {
        discoverer,
        backend,
        client,
    }
}
