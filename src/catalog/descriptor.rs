//! Discovered API resource descriptors and the per-cluster lookup table

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Verbs a descriptor may advertise, the handlers of the dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// One (group, version, kind) served by a cluster
///
/// Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResourceDescriptor {
    pub kind: String,
    /// API group, empty for the core group
    pub group: String,
    pub version: String,
    /// REST path segment (plural), e.g. `pods`
    pub plural: String,
    pub singular: String,
    pub namespaced: bool,
    pub short_names: BTreeSet<String>,
    pub verbs: BTreeSet<String>,
    /// Whether `version` is the group's preferred version
    pub preferred: bool,
}

impl ApiResourceDescriptor {
    /// A core-group (`v1`) descriptor with the standard verbs
    pub fn core(kind: &str, plural: &str, namespaced: bool) -> Self {
        Self {
            kind: kind.to_string(),
            group: String::new(),
            version: "v1".to_string(),
            plural: plural.to_string(),
            singular: kind.to_ascii_lowercase(),
            namespaced,
            short_names: BTreeSet::new(),
            verbs: ["get", "list", "watch", "create", "update", "patch", "delete"]
                .into_iter()
                .map(String::from)
                .collect(),
            preferred: true,
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn supports(&self, verb: Verb) -> bool {
        self.verbs.contains(verb.as_str())
    }

    /// URL path of the collection, e.g. `/apis/apps/v1/namespaces/web/deployments`
    pub fn url_path(&self, namespace: Option<&str>) -> String {
        let prefix = if self.group.is_empty() {
            format!("/api/{}", self.version)
        } else {
            format!("/apis/{}/{}", self.group, self.version)
        };
        match namespace.filter(|_| self.namespaced) {
            Some(ns) => format!("{prefix}/namespaces/{ns}/{}", self.plural),
            None => format!("{prefix}/{}", self.plural),
        }
    }

    pub fn to_api_resource(&self) -> kube::core::ApiResource {
        let gvk = kube::core::GroupVersionKind::gvk(&self.group, &self.version, &self.kind);
        kube::core::ApiResource::from_gvk_with_plural(&gvk, &self.plural)
    }
}

impl fmt::Display for ApiResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.api_version())
    }
}

/// Split an apiVersion into (group, version); `v1` is the core group
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Outcome of looking a kind up in one snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Arc<ApiResourceDescriptor>),
    Ambiguous(Vec<String>),
    Missing,
}

/// Immutable snapshot of everything discovered for one cluster
///
/// Built once per refresh and replaced wholesale; never patched in place.
#[derive(Debug, Default)]
pub struct DescriptorSet {
    by_gvk: HashMap<(String, String, String), Arc<ApiResourceDescriptor>>,
    by_kind: HashMap<String, Vec<Arc<ApiResourceDescriptor>>>,
    by_name: HashMap<String, Vec<Arc<ApiResourceDescriptor>>>,
    by_short_name: HashMap<String, Vec<Arc<ApiResourceDescriptor>>>,
}

impl DescriptorSet {
    pub fn new(descriptors: impl IntoIterator<Item = ApiResourceDescriptor>) -> Self {
        let mut set = Self::default();

        for descriptor in descriptors {
            let key = (
                descriptor.group.clone(),
                descriptor.version.clone(),
                descriptor.kind.clone(),
            );
            if set.by_gvk.contains_key(&key) {
                continue;
            }

            let descriptor = Arc::new(descriptor);
            set.by_kind
                .entry(descriptor.kind.to_ascii_lowercase())
                .or_default()
                .push(descriptor.clone());

            let mut names = vec![descriptor.plural.to_ascii_lowercase()];
            if !descriptor.singular.is_empty() {
                names.push(descriptor.singular.to_ascii_lowercase());
            }
            names.dedup();
            for name in names {
                set.by_name.entry(name).or_default().push(descriptor.clone());
            }

            for short in &descriptor.short_names {
                set.by_short_name
                    .entry(short.to_ascii_lowercase())
                    .or_default()
                    .push(descriptor.clone());
            }

            set.by_gvk.insert(key, descriptor);
        }

        set
    }

    pub fn len(&self) -> usize {
        self.by_gvk.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_gvk.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ApiResourceDescriptor>> {
        self.by_gvk.values()
    }

    /// Exact (group, version, kind) lookup
    pub fn get(&self, group: &str, version: &str, kind: &str) -> Option<&Arc<ApiResourceDescriptor>> {
        self.by_gvk
            .get(&(group.to_string(), version.to_string(), kind.to_string()))
    }

    /// Resolve a kind, plural, singular or short name, optionally pinned to an apiVersion
    ///
    /// Matching goes kind → plural/singular → short name and stops at the first
    /// tier with any match. Without an apiVersion only preferred versions count,
    /// and more than one surviving (group, version) is ambiguous.
    pub fn lookup(&self, kind: &str, api_version: Option<&str>) -> Lookup {
        let needle = kind.to_ascii_lowercase();
        let tiers = [&self.by_kind, &self.by_name, &self.by_short_name];

        for tier in tiers {
            let Some(candidates) = tier.get(&needle) else {
                continue;
            };

            let matched: Vec<&Arc<ApiResourceDescriptor>> = match api_version {
                Some(api_version) => {
                    let (group, version) = split_api_version(api_version);
                    candidates
                        .iter()
                        .filter(|d| d.group == group && d.version == version)
                        .collect()
                }
                None => {
                    let preferred: Vec<_> = candidates.iter().filter(|d| d.preferred).collect();
                    if preferred.is_empty() {
                        candidates.iter().collect()
                    } else {
                        preferred
                    }
                }
            };

            match matched.as_slice() {
                [] => continue,
                [only] => return Lookup::Found(Arc::clone(only)),
                many => {
                    let mut names: Vec<String> = many
                        .iter()
                        .map(|d| format!("{}.{}", d.kind, d.api_version()))
                        .collect();
                    names.sort();
                    names.dedup();
                    if names.len() == 1 {
                        return Lookup::Found(Arc::clone(many[0]));
                    }
                    return Lookup::Ambiguous(names);
                }
            }
        }

        Lookup::Missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(group: &str, version: &str, kind: &str, plural: &str) -> ApiResourceDescriptor {
        ApiResourceDescriptor {
            kind: kind.to_string(),
            group: group.to_string(),
            version: version.to_string(),
            plural: plural.to_string(),
            singular: kind.to_ascii_lowercase(),
            namespaced: true,
            short_names: BTreeSet::new(),
            verbs: BTreeSet::new(),
            preferred: true,
        }
    }

    #[test]
    fn test_api_version_and_paths() {
        let pod = ApiResourceDescriptor::core("Pod", "pods", true);
        assert_eq!(pod.api_version(), "v1");
        assert_eq!(pod.url_path(Some("web")), "/api/v1/namespaces/web/pods");
        assert_eq!(pod.url_path(None), "/api/v1/pods");

        let node = ApiResourceDescriptor::core("Node", "nodes", false);
        assert_eq!(node.url_path(Some("ignored")), "/api/v1/nodes");

        let deploy = descriptor("apps", "v1", "Deployment", "deployments");
        assert_eq!(deploy.api_version(), "apps/v1");
        assert_eq!(
            deploy.url_path(Some("prod")),
            "/apis/apps/v1/namespaces/prod/deployments"
        );
    }

    #[test]
    fn test_split_api_version() {
        assert_eq!(split_api_version("v1"), ("", "v1"));
        assert_eq!(split_api_version("apps/v1"), ("apps", "v1"));
    }

    #[test]
    fn test_lookup_tiers() {
        let mut pod = ApiResourceDescriptor::core("Pod", "pods", true);
        pod.short_names.insert("po".to_string());
        let set = DescriptorSet::new([pod.clone()]);

        for needle in ["Pod", "pod", "pods", "po", "POD"] {
            assert_eq!(set.lookup(needle, None), Lookup::Found(Arc::new(pod.clone())), "{needle}");
        }
        assert_eq!(set.lookup("Pod", Some("v1")), Lookup::Found(Arc::new(pod)));
        assert_eq!(set.lookup("Pod", Some("v2")), Lookup::Missing);
        assert_eq!(set.lookup("Widget", None), Lookup::Missing);
    }

    #[test]
    fn test_kind_tier_wins_over_plural_collision() {
        let pod = ApiResourceDescriptor::core("Pod", "pods", true);
        let metrics = descriptor("metrics.k8s.io", "v1beta1", "PodMetrics", "pods");
        let set = DescriptorSet::new([pod.clone(), metrics]);

        assert_eq!(set.lookup("Pod", None), Lookup::Found(Arc::new(pod)));
        assert!(matches!(set.lookup("pods", None), Lookup::Ambiguous(_)));
    }

    #[test]
    fn test_bare_kind_across_groups_is_ambiguous() {
        let core = ApiResourceDescriptor::core("Event", "events", true);
        let events = descriptor("events.k8s.io", "v1", "Event", "events");
        let set = DescriptorSet::new([core, events.clone()]);

        match set.lookup("Event", None) {
            Lookup::Ambiguous(candidates) => {
                assert_eq!(candidates, vec!["Event.events.k8s.io/v1", "Event.v1"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
        assert_eq!(
            set.lookup("Event", Some("events.k8s.io/v1")),
            Lookup::Found(Arc::new(events))
        );
    }

    #[test]
    fn test_non_preferred_versions_need_explicit_api_version() {
        let v2 = descriptor("autoscaling", "v2", "HorizontalPodAutoscaler", "horizontalpodautoscalers");
        let mut v1 = descriptor("autoscaling", "v1", "HorizontalPodAutoscaler", "horizontalpodautoscalers");
        v1.preferred = false;
        let set = DescriptorSet::new([v1.clone(), v2.clone()]);

        assert_eq!(set.lookup("HorizontalPodAutoscaler", None), Lookup::Found(Arc::new(v2)));
        assert_eq!(
            set.lookup("horizontalpodautoscalers", Some("autoscaling/v1")),
            Lookup::Found(Arc::new(v1))
        );
    }

    #[test]
    fn test_duplicate_gvk_is_ignored() {
        let set = DescriptorSet::new([
            ApiResourceDescriptor::core("Pod", "pods", true),
            ApiResourceDescriptor::core("Pod", "pods", true),
        ]);
        assert_eq!(set.len(), 1);
        assert!(set.get("", "v1", "Pod").is_some());
    }
}
