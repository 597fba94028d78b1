//! Kubegate - kind-agnostic Kubernetes operations
//!
//! Kubegate is the core of a Kubernetes operations gateway: it manages named
//! contexts, discovers which kinds a cluster serves, runs generic CRUD from
//! manifests, and streams logs and exec sessions from running pods. The outer
//! transport (tool framing, CLI) lives elsewhere and calls into this crate.
//!
//! # Example
//!
//! ```no_run
//! use kubegate::{ApplyMode, Gateway, GatewayConfig, ListRequest, Manifest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     kubegate::telemetry::init_logging();
//!
//!     let gateway = Gateway::from_config(GatewayConfig::from_env()?)?;
//!     let handle = gateway.handle(None).await?;
//!
//!     let manifest = Manifest::parse(&std::fs::read_to_string("deploy.yaml")?)?;
//!     for outcome in handle.resources().apply(&manifest, ApplyMode::Create).await {
//!         match &outcome.result {
//!             Ok(_) => println!("created {:?}", outcome.name),
//!             Err(e) => println!("document {} failed: {e}", outcome.index),
//!         }
//!     }
//!
//!     let pods = handle
//!         .resources()
//!         .list(&ListRequest::new("Pod").namespace("default"))
//!         .await?;
//!     println!("{} pods", pods.len());
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod cluster_info;
pub mod config;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod registry;
pub mod resources;
pub mod stream;
pub mod telemetry;
pub mod uri;

// Re-export commonly used types
pub use catalog::{ApiCatalog, ApiResourceDescriptor, Discoverer, KubeDiscoverer};
pub use cluster_info::{ClusterInfoAggregator, ClusterSummary};
pub use config::{ConfigError, GatewayConfig};
pub use error::{ApiFailure, ErrorKind, GatewayError, Result};
pub use gateway::{ClusterHandle, Gateway, ResourceContent};
pub use provider::{ClusterEndpoint, ProviderTag, ServerVersion};
pub use registry::{AuthMethod, ContextRegistry, ContextSummary, KubeContext};
pub use resources::{
    ApplyMode, DeleteAck, DocumentOutcome, DynamicClient, ListRequest, Manifest, NamespaceScope,
    PodTarget, ResourceBackend, ResourceReference,
};
pub use stream::{CommandExecutor, ExecOutput, ExecSession, ExecStream, LogRequest, LogStream, LogStreamer};
pub use uri::ResourceUri;
