//! Ordered provider detection rules
//!
//! Rules are grouped into tiers. A higher tier always wins over a lower one,
//! whatever the list order; inside a tier the first matching rule wins.

use super::{NodeSignals, ProviderTag};

/// Precedence class of a rule, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Node labels, annotations and `spec.providerID`
    Label,
    /// API server hostname
    Hostname,
    /// Context name and credential plugin
    Naming,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Label, Tier::Hostname, Tier::Naming];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// A label or annotation key under this DNS domain (or a subdomain)
    KeyDomain(&'static str),
    /// A label or annotation key starting with this prefix
    KeyPrefix(&'static str),
    ProviderIdPrefix(&'static str),
    HostSuffix(&'static str),
    ContextContains(&'static str),
    ContextPrefix(&'static str),
    /// Basename of the exec credential plugin
    ExecCommand(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub tier: Tier,
    pub matcher: Matcher,
    pub provider: ProviderTag,
}

const fn rule(tier: Tier, matcher: Matcher, provider: ProviderTag) -> Rule {
    Rule {
        tier,
        matcher,
        provider,
    }
}

/// Built-in rules
///
/// OpenShift is listed before the AWS signals: ROSA nodes also carry an
/// `aws://` providerID.
pub const DEFAULT_RULES: &[Rule] = &[
    rule(Tier::Label, Matcher::KeyDomain("openshift.io"), ProviderTag::Rosa),
    rule(Tier::Label, Matcher::KeyDomain("eks.amazonaws.com"), ProviderTag::Eks),
    rule(Tier::Label, Matcher::KeyDomain("kubernetes.azure.com"), ProviderTag::Aks),
    rule(Tier::Label, Matcher::KeyPrefix("cloud.google.com/gke-"), ProviderTag::Gke),
    rule(Tier::Label, Matcher::ProviderIdPrefix("aws://"), ProviderTag::Eks),
    rule(Tier::Label, Matcher::ProviderIdPrefix("azure://"), ProviderTag::Aks),
    rule(Tier::Label, Matcher::ProviderIdPrefix("gce://"), ProviderTag::Gke),
    rule(Tier::Hostname, Matcher::HostSuffix(".eks.amazonaws.com"), ProviderTag::Eks),
    rule(Tier::Hostname, Matcher::HostSuffix(".azmk8s.io"), ProviderTag::Aks),
    rule(Tier::Hostname, Matcher::HostSuffix(".openshiftapps.com"), ProviderTag::Rosa),
    rule(Tier::Hostname, Matcher::HostSuffix(".gke.goog"), ProviderTag::Gke),
    rule(Tier::Naming, Matcher::ContextContains("arn:aws:eks:"), ProviderTag::Eks),
    rule(Tier::Naming, Matcher::ContextPrefix("gke_"), ProviderTag::Gke),
    rule(Tier::Naming, Matcher::ContextContains("openshiftapps-com"), ProviderTag::Rosa),
    rule(Tier::Naming, Matcher::ExecCommand("aws"), ProviderTag::Eks),
    rule(Tier::Naming, Matcher::ExecCommand("aws-iam-authenticator"), ProviderTag::Eks),
    rule(Tier::Naming, Matcher::ExecCommand("kubelogin"), ProviderTag::Aks),
    rule(Tier::Naming, Matcher::ExecCommand("gke-gcloud-auth-plugin"), ProviderTag::Gke),
];

/// Everything a rule may look at
#[derive(Debug, Default, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub host: Option<&'a str>,
    pub context_name: &'a str,
    pub exec_command: Option<&'a str>,
    pub nodes: &'a [NodeSignals],
}

impl Matcher {
    pub fn matches(&self, input: &DetectionInput<'_>) -> bool {
        match *self {
            Self::KeyDomain(domain) => node_keys(input.nodes).any(|key| key_in_domain(key, domain)),
            Self::KeyPrefix(prefix) => node_keys(input.nodes).any(|key| key.starts_with(prefix)),
            Self::ProviderIdPrefix(prefix) => input
                .nodes
                .iter()
                .filter_map(|n| n.provider_id.as_deref())
                .any(|id| id.starts_with(prefix)),
            Self::HostSuffix(suffix) => input
                .host
                .is_some_and(|host| host.to_ascii_lowercase().ends_with(suffix)),
            Self::ContextContains(needle) => input.context_name.contains(needle),
            Self::ContextPrefix(prefix) => input.context_name.starts_with(prefix),
            Self::ExecCommand(name) => input.exec_command.is_some_and(|command| {
                let base = command.rsplit(['/', '\\']).next().unwrap_or(command);
                base.trim_end_matches(".exe") == name
            }),
        }
    }
}

fn node_keys<'a>(nodes: &'a [NodeSignals]) -> impl Iterator<Item = &'a str> + 'a {
    nodes
        .iter()
        .flat_map(|n| n.labels.keys().chain(n.annotations.keys()))
        .map(String::as_str)
}

fn key_in_domain(key: &str, domain: &str) -> bool {
    let Some((prefix, _)) = key.split_once('/') else {
        return false;
    };
    prefix == domain
        || prefix
            .strip_suffix(domain)
            .is_some_and(|rest| rest.ends_with('.'))
}

/// Apply `rules` tier by tier; nothing matching yields `Generic`
pub fn detect_with(rules: &[Rule], input: &DetectionInput<'_>) -> ProviderTag {
    Tier::ALL
        .iter()
        .find_map(|tier| {
            rules
                .iter()
                .filter(|r| r.tier == *tier)
                .find(|r| r.matcher.matches(input))
                .map(|r| r.provider)
        })
        .unwrap_or(ProviderTag::Generic)
}
