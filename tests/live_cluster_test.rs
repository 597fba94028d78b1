//! End-to-end checks against the cluster in the current kubeconfig

use kubegate::{
    ApplyMode, ErrorKind, ExecSession, Gateway, GatewayConfig, ListRequest, Manifest,
    ResourceReference,
};

fn gateway() -> Gateway {
    Gateway::from_config(GatewayConfig::new()).expect("Should load kubeconfig")
}

#[tokio::test]
#[ignore] // Requires real cluster
async fn test_read_info_and_namespaces() {
    let gateway = gateway();
    let context = gateway.registry().current().expect("Should have a context");

    let info = gateway
        .read(&format!("k8s://{}/info", context.name))
        .await
        .expect("Should read cluster info");
    assert_eq!(info.mime_type, "application/json");
    assert!(info.text.contains("namespace_count"));

    let namespaces = gateway
        .read(&format!("k8s://{}/namespaces", context.name))
        .await
        .expect("Should list namespaces");
    assert!(namespaces.text.contains("kube-system"));
}

#[tokio::test]
#[ignore] // Requires real cluster
async fn test_configmap_lifecycle() {
    let gateway = gateway();
    let handle = gateway.handle(None).await.expect("Should connect");
    let resources = handle.resources();

    let manifest = Manifest::parse(
        r"
apiVersion: v1
kind: ConfigMap
metadata:
  name: kubegate-live-test
data:
  greeting: hello
",
    )
    .expect("Should parse");

    let outcomes = resources.apply(&manifest, ApplyMode::Create).await;
    assert!(outcomes[0].is_success(), "{:?}", outcomes[0].result);

    let reference = ResourceReference::new("ConfigMap", "kubegate-live-test");
    let yaml = resources.get_yaml(&reference, true).await.expect("Should get");
    assert!(yaml.contains("greeting: hello"));

    let listed = resources
        .list(&ListRequest::new("configmaps"))
        .await
        .expect("Should list");
    assert!(listed
        .iter()
        .any(|cm| cm["metadata"]["name"] == "kubegate-live-test"));

    resources.delete(&reference).await.expect("Should delete");
    let err = resources.delete(&reference).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
#[ignore] // Requires real cluster with a running pod named by KUBEGATE_TEST_POD
async fn test_exec_reports_exit_code() {
    let pod = std::env::var("KUBEGATE_TEST_POD").expect("KUBEGATE_TEST_POD must be set");
    let gateway = gateway();
    let handle = gateway.handle(None).await.expect("Should connect");

    let output = handle
        .exec()
        .run(&ExecSession::shell(handle.pod(&pod), "echo out; echo err >&2; exit 3"))
        .await
        .expect("Should exec");
    assert_eq!(output.stdout.trim(), "out");
    assert_eq!(output.stderr.trim(), "err");
    assert_eq!(output.exit_code, 3);

    let lines = handle
        .logs()
        .fetch(&handle.pod(&pod), &kubegate::LogRequest::tail(5))
        .await
        .expect("Should fetch logs");
    assert!(lines.len() <= 5);
}
