#![deny(missing_docs)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Kubernetes service discovery exposed as lazy service-instance streams.
//!
//! Translates Kubernetes `Service` and `Endpoints` resources into generic
//! [`ServiceInstance`] records: one per endpoint address, with a single
//! selected port and metadata merged from the owning service's labels and
//! annotations.
//!
//! # Features
//!
//! - **Namespace scope**: one namespace (configured or the client's default) or the whole cluster
//! - **Primary port selection**: pick one port for multi-port backends, keep the rest in metadata
//! - **Metadata propagation**: labels, annotations and ports with independent prefixes
//! - **Lazy streams**: nothing is fetched until polled, dropping a stream stops the work
//!
//! # Usage
//!
//! ```ignore
//! use futures::TryStreamExt;
//! use kube_discovery_client::{DiscoveryClient, DiscoveryProperties, KubernetesDiscoveryClient};
//!
//! let props = DiscoveryProperties::new().primary_port_name("https");
//! let client = KubernetesDiscoveryClient::try_default(props).await?;
//!
//! let names: Vec<String> = client.list_service_names().try_collect().await?;
//!
//! let mut instances = client.list_instances("my-service");
//! while let Some(instance) = instances.try_next().await? {
//!     println!("{instance}");
//! }
//! ```

use futures::stream::BoxStream;

mod client;
mod config;
mod error;
mod instance;
mod k8s;
#[cfg(test)]
mod testing;

pub use client::{DESCRIPTION, KubernetesDiscoveryClient};
pub use config::{
    DEFAULT_ORDER, DEFAULT_SECURE_PORT, DiscoveryProperties, MetadataProperties, NamespaceScope,
};
pub use error::{Error, Result};
pub use instance::{ServiceInstance, ServiceMetadata, build_instance};
pub use k8s::{KubeFetcher, ResourceFetcher};

/// Read-only service discovery.
///
/// Both queries return streams that do no work until polled; dropping a
/// stream cancels whatever it has not done yet.
pub trait DiscoveryClient: Send + Sync {
    /// Human-readable name of the implementation.
    fn description(&self) -> &str;

    /// Ordering priority among several discovery clients; lower comes first.
    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }

    /// Names of all services visible to the client.
    fn list_service_names(&self) -> BoxStream<'_, Result<String>>;

    /// Instances of the named service. Unknown services yield an empty stream.
    fn list_instances(&self, service_id: &str) -> BoxStream<'_, Result<ServiceInstance>>;
}
