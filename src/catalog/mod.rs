//! Per-cluster API resource catalog
//!
//! Resolves a kind (optionally pinned to an apiVersion) to the descriptor the
//! dynamic client needs to build a request. Discovery is lazy: the first
//! resolution for a cluster triggers a refresh, and a later miss triggers at
//! most one more before the kind is reported unknown. That answer sticks for
//! the kind until the snapshot is next replaced by `refresh` or `invalidate`.
//!
//! Each cluster's descriptors live in an immutable [`DescriptorSet`] snapshot
//! behind an `Arc`. A refresh builds a complete new snapshot and swaps the
//! pointer, so readers see either the old set or the new one. Concurrent misses
//! for the same cluster share a single in-flight refresh.

mod descriptor;
mod discovery;

pub use descriptor::{split_api_version, ApiResourceDescriptor, DescriptorSet, Lookup, Verb};
pub use discovery::{descriptors_from_list, Discoverer, KubeDiscoverer};

use crate::error::{GatewayError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Cache state for one cluster
#[derive(Default)]
struct CatalogEntry {
    snapshot: RwLock<Option<Arc<DescriptorSet>>>,
    /// Bumped after every completed refresh
    generation: AtomicU64,
    refresh_lock: tokio::sync::Mutex<()>,
    misses: Mutex<MissLog>,
}

/// Lookups that failed even after a refresh, valid for one generation
#[derive(Default)]
struct MissLog {
    generation: u64,
    keys: HashSet<(String, Option<String>)>,
}

impl CatalogEntry {
    fn current(&self) -> (Option<Arc<DescriptorSet>>, u64) {
        let snapshot = self.snapshot.read();
        (snapshot.clone(), self.generation.load(Ordering::Acquire))
    }

    fn known_miss(&self, generation: u64, kind: &str, api_version: Option<&str>) -> bool {
        let misses = self.misses.lock();
        misses.generation == generation
            && misses
                .keys
                .contains(&(kind.to_string(), api_version.map(String::from)))
    }

    fn record_miss(&self, generation: u64, kind: &str, api_version: Option<&str>) {
        let mut misses = self.misses.lock();
        if misses.generation != generation {
            misses.generation = generation;
            misses.keys.clear();
        }
        misses
            .keys
            .insert((kind.to_string(), api_version.map(String::from)));
    }
}

/// Discovered resources for every cluster this process has talked to
pub struct ApiCatalog {
    entries: Mutex<HashMap<String, Arc<CatalogEntry>>>,
    retry_backoff: Duration,
}

impl Default for ApiCatalog {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

impl ApiCatalog {
    /// Create an empty catalog; `retry_backoff` is the pause before the single discovery retry
    pub fn new(retry_backoff: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retry_backoff,
        }
    }

    fn entry(&self, key: &str) -> Arc<CatalogEntry> {
        self.entries
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Current snapshot for a cluster, if discovery has run
    pub fn snapshot(&self, key: &str) -> Option<Arc<DescriptorSet>> {
        let entry = self.entries.lock().get(key).cloned()?;
        let snapshot = entry.snapshot.read().clone();
        snapshot
    }

    /// Drop a cluster's cached descriptors; the next resolution rediscovers
    pub fn invalidate(&self, key: &str) {
        if let Some(entry) = self.entries.lock().get(key) {
            let mut snapshot = entry.snapshot.write();
            *snapshot = None;
            entry.generation.fetch_add(1, Ordering::AcqRel);
            debug!(context = %key, "invalidated API catalog");
        }
    }

    /// Resolve `kind` (kind name, plural, singular or short name) for a cluster
    pub async fn resolve(
        &self,
        discoverer: &dyn Discoverer,
        kind: &str,
        api_version: Option<&str>,
    ) -> Result<Arc<ApiResourceDescriptor>> {
        let key = discoverer.cluster_key();
        let entry = self.entry(key);
        let (snapshot, seen_generation) = entry.current();

        if let Some(set) = snapshot {
            match set.lookup(kind, api_version) {
                Lookup::Found(descriptor) => return Ok(descriptor),
                Lookup::Ambiguous(candidates) => {
                    return Err(ambiguous(key, kind, candidates));
                }
                Lookup::Missing if entry.known_miss(seen_generation, kind, api_version) => {
                    return Err(unknown(key, kind, api_version));
                }
                Lookup::Missing => {
                    debug!(context = %key, kind = %kind, "catalog miss, refreshing");
                }
            }
        }

        let (set, generation) = self
            .refresh_entry(&entry, discoverer, Some(seen_generation))
            .await?;

        match set.lookup(kind, api_version) {
            Lookup::Found(descriptor) => Ok(descriptor),
            Lookup::Ambiguous(candidates) => Err(ambiguous(key, kind, candidates)),
            Lookup::Missing => {
                entry.record_miss(generation, kind, api_version);
                Err(unknown(key, kind, api_version))
            }
        }
    }

    /// Rediscover a cluster's resources and replace its snapshot
    pub async fn refresh(&self, discoverer: &dyn Discoverer) -> Result<Arc<DescriptorSet>> {
        let entry = self.entry(discoverer.cluster_key());
        let (set, _) = self.refresh_entry(&entry, discoverer, None).await?;
        Ok(set)
    }

    /// Refresh unless another caller already did so after `seen_generation`
    ///
    /// Returns the snapshot together with its generation.
    #[instrument(skip_all, fields(context = %discoverer.cluster_key()))]
    async fn refresh_entry(
        &self,
        entry: &CatalogEntry,
        discoverer: &dyn Discoverer,
        seen_generation: Option<u64>,
    ) -> Result<(Arc<DescriptorSet>, u64)> {
        let _guard = entry.refresh_lock.lock().await;

        if let Some(seen) = seen_generation {
            let (snapshot, generation) = entry.current();
            if generation != seen {
                if let Some(set) = snapshot {
                    debug!("reusing refresh completed while waiting");
                    return Ok((set, generation));
                }
            }
        }

        let descriptors = self.discover_with_retry(discoverer).await?;
        let set = Arc::new(DescriptorSet::new(descriptors));

        let generation = {
            let mut snapshot = entry.snapshot.write();
            *snapshot = Some(set.clone());
            entry.generation.fetch_add(1, Ordering::AcqRel) + 1
        };

        info!(resources = set.len(), "refreshed API catalog");
        Ok((set, generation))
    }

    /// Run discovery, retrying exactly once before surfacing `DiscoveryFailed`
    async fn discover_with_retry(
        &self,
        discoverer: &dyn Discoverer,
    ) -> Result<Vec<ApiResourceDescriptor>> {
        match discoverer.discover().await {
            Ok(descriptors) => Ok(descriptors),
            Err(first) => {
                warn!(error = %first, backoff = ?self.retry_backoff, "discovery failed, retrying once");
                tokio::time::sleep(self.retry_backoff).await;

                discoverer
                    .discover()
                    .await
                    .map_err(|e| GatewayError::DiscoveryFailed {
                        context: discoverer.cluster_key().to_string(),
                        reason: e.to_string(),
                        code: e.code,
                        transient: e.transient,
                    })
            }
        }
    }
}

fn unknown(context: &str, kind: &str, api_version: Option<&str>) -> GatewayError {
    GatewayError::UnknownKind {
        context: context.to_string(),
        kind: kind.to_string(),
        api_version: api_version.map(String::from),
    }
}

fn ambiguous(context: &str, kind: &str, candidates: Vec<String>) -> GatewayError {
    GatewayError::AmbiguousKind {
        context: context.to_string(),
        kind: kind.to_string(),
        candidates,
    }
}
