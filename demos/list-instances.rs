//! Lists Kubernetes services and the instances of one of them.
//!
//! # Running
//!
//! Needs a kube configuration (in-cluster service account or local
//! kubeconfig) with permission to read services and endpoints.
//!
//! # Environment Variables
//!
//! - `SERVICE_NAME`: service to resolve instances for (default: list names only)
//! - `SERVICE_NAMESPACE`: namespace to search (default: the client's namespace)
//! - `ALL_NAMESPACES`: search every namespace when `true` (default: false)
//! - `PRIMARY_PORT_NAME`: port to prefer for multi-port services

use std::env;

use futures::TryStreamExt;
use kube_discovery_client::{DiscoveryClient, DiscoveryProperties, KubernetesDiscoveryClient};
use tracing::{Level, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    // Read configuration from environment
    let service_name = env::var("SERVICE_NAME").ok();
    let all_namespaces = env::var("ALL_NAMESPACES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let mut props = DiscoveryProperties::new().all_namespaces(all_namespaces);
    if let Ok(namespace) = env::var("SERVICE_NAMESPACE") {
        props = props.namespace(namespace);
    }

    if let Ok(port_name) = env::var("PRIMARY_PORT_NAME") {
        props = props.primary_port_name(port_name);
    }

    let client = KubernetesDiscoveryClient::try_default(props).await?;
    info!("{} ({:?})", client.description(), client.scope());

    let names: Vec<String> = client.list_service_names().try_collect().await?;
    info!("Services: {}", names.join(", "));

    if let Some(service_name) = service_name {
        let mut instances = client.list_instances(&service_name);
        while let Some(instance) = instances.try_next().await? {
            println!("{}", serde_json::to_string(&instance)?);
        }
    }

    Ok(())
}
