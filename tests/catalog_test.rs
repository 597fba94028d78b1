//! API catalog resolution, caching and refresh de-duplication

mod common;

use assert_matches::assert_matches;
use common::{descriptor, FakeDiscoverer};
use futures::future::join_all;
use kubegate::catalog::ApiCatalog;
use kubegate::{ApiFailure, ErrorKind, GatewayError};
use std::sync::Arc;
use std::time::Duration;

fn catalog() -> ApiCatalog {
    ApiCatalog::new(Duration::from_millis(1))
}

#[tokio::test]
async fn test_pod_resolves_to_core_v1() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev");

    let pod = catalog.resolve(&discoverer, "Pod", None).await.unwrap();
    assert_eq!(pod.group, "");
    assert_eq!(pod.version, "v1");
    assert_eq!(pod.plural, "pods");
    assert!(pod.namespaced);
}

#[tokio::test]
async fn test_first_resolution_discovers_then_caches() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev");
    assert!(catalog.snapshot("dev").is_none());

    catalog.resolve(&discoverer, "Pod", None).await.unwrap();
    catalog.resolve(&discoverer, "po", None).await.unwrap();
    catalog.resolve(&discoverer, "deployments", None).await.unwrap();

    assert_eq!(discoverer.calls(), 1);
    assert!(catalog.snapshot("dev").is_some());
}

#[tokio::test]
async fn test_resolve_is_deterministic() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev");

    let first = catalog
        .resolve(&discoverer, "Deployment", Some("apps/v1"))
        .await
        .unwrap();
    for _ in 0..5 {
        let again = catalog
            .resolve(&discoverer, "Deployment", Some("apps/v1"))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_share_one_refresh() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev").with_delay(Duration::from_millis(50));

    let results = join_all((0..16).map(|_| catalog.resolve(&discoverer, "Gizmo", None))).await;

    assert_eq!(discoverer.calls(), 1);
    for result in results {
        assert_matches!(result, Err(GatewayError::UnknownKind { ref kind, .. }) if kind == "Gizmo");
    }
}

#[tokio::test]
async fn test_warm_miss_refreshes_once_before_failing() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev");

    catalog.resolve(&discoverer, "Pod", None).await.unwrap();
    assert_eq!(discoverer.calls(), 1);

    let err = catalog.resolve(&discoverer, "Gizmo", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownKind);
    assert_eq!(discoverer.calls(), 2);

    // A CRD installed later is visible once the catalog is refreshed
    discoverer.add(descriptor("toys.dev", "v1", "Gizmo", "gizmos", false));
    catalog.refresh(&discoverer).await.unwrap();
    let gizmo = catalog.resolve(&discoverer, "Gizmo", None).await.unwrap();
    assert_eq!(gizmo.api_version(), "toys.dev/v1");
    assert!(!gizmo.namespaced);
    assert_eq!(discoverer.calls(), 3);
}

#[tokio::test]
async fn test_repeated_misses_do_not_rediscover() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev");

    catalog.resolve(&discoverer, "Pod", None).await.unwrap();
    for _ in 0..10 {
        let err = catalog.resolve(&discoverer, "Gizmo", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownKind);
    }
    assert_eq!(discoverer.calls(), 2);

    // The miss sticks until the catalog is refreshed
    discoverer.add(descriptor("toys.dev", "v1", "Gizmo", "gizmos", false));
    let err = catalog.resolve(&discoverer, "Gizmo", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownKind);
    assert_eq!(discoverer.calls(), 2);

    catalog.refresh(&discoverer).await.unwrap();
    let gizmo = catalog.resolve(&discoverer, "Gizmo", None).await.unwrap();
    assert_eq!(gizmo.plural, "gizmos");
    assert_eq!(discoverer.calls(), 3);

    // A different unknown kind still gets its own refresh
    catalog.resolve(&discoverer, "Sprocket", None).await.unwrap_err();
    assert_eq!(discoverer.calls(), 4);

    catalog.invalidate("dev");
    catalog.resolve(&discoverer, "Sprocket", None).await.unwrap_err();
    assert_eq!(discoverer.calls(), 5);
}

#[tokio::test]
async fn test_discovery_is_retried_once() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev").failing(1);

    catalog.resolve(&discoverer, "Pod", None).await.unwrap();
    assert_eq!(discoverer.calls(), 2);
}

#[tokio::test]
async fn test_discovery_failure_after_retry() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev").failing(2);

    let err = catalog.resolve(&discoverer, "Pod", None).await.unwrap_err();
    assert_matches!(err, GatewayError::DiscoveryFailed { ref context, .. } if context == "dev");
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(discoverer.calls(), 2);
    assert!(catalog.snapshot("dev").is_none());
}

#[tokio::test]
async fn test_discovery_failure_keeps_status_code() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev").failing_with(
        2,
        ApiFailure::status(403, "Forbidden", "cannot list API groups"),
    );

    let err = catalog.resolve(&discoverer, "Pod", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DiscoveryFailed);
    assert_eq!(err.status_code(), Some(403));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_discovery_outage_is_transient() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev").failing(2);

    let err = catalog.resolve(&discoverer, "Pod", None).await.unwrap_err();
    assert_eq!(err.status_code(), None);
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_bare_kind_served_by_two_groups_is_ambiguous() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev");

    let err = catalog.resolve(&discoverer, "Widget", None).await.unwrap_err();
    assert_matches!(err, GatewayError::AmbiguousKind { ref candidates, .. } => {
        assert_eq!(candidates, &["Widget.example.com/v1", "Widget.gadgets.io/v1beta1"]);
    });

    let widget = catalog
        .resolve(&discoverer, "Widget", Some("gadgets.io/v1beta1"))
        .await
        .unwrap();
    assert_eq!(widget.group, "gadgets.io");
}

#[tokio::test]
async fn test_unknown_api_version_for_known_kind() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev");

    let err = catalog
        .resolve(&discoverer, "Deployment", Some("apps/v1beta2"))
        .await
        .unwrap_err();
    assert_matches!(err, GatewayError::UnknownKind { api_version: Some(ref v), .. } if v == "apps/v1beta2");
}

#[tokio::test]
async fn test_clusters_are_cached_independently() {
    let catalog = catalog();
    let dev = FakeDiscoverer::new("dev");
    let prod = FakeDiscoverer::new("prod");

    catalog.resolve(&dev, "Pod", None).await.unwrap();
    catalog.resolve(&prod, "Pod", None).await.unwrap();
    catalog.resolve(&dev, "Pod", None).await.unwrap();

    assert_eq!(dev.calls(), 1);
    assert_eq!(prod.calls(), 1);
}

#[tokio::test]
async fn test_refresh_and_invalidate_replace_the_snapshot() {
    let catalog = catalog();
    let discoverer = FakeDiscoverer::new("dev");

    let before = catalog.refresh(&discoverer).await.unwrap();
    let after = catalog.refresh(&discoverer).await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.len(), after.len());

    catalog.invalidate("dev");
    assert!(catalog.snapshot("dev").is_none());

    catalog.resolve(&discoverer, "Pod", None).await.unwrap();
    assert_eq!(discoverer.calls(), 3);
}
