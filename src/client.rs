//! Kubernetes-backed discovery client.
//!
//! # How It Works
//!
//! 1. The namespace scope is resolved once, when the client is built
//! 2. `list_service_names` lists `Service` resources in that scope
//! 3. `list_instances` fetches the `Endpoints` resource(s) named after the
//!    service, then the owning `Service` of each for labels and annotations
//! 4. Every address of every subset is turned into a [`ServiceInstance`]
//!
//! Both queries return streams. Nothing is fetched until the stream is first
//! polled, instances are built one at a time as they are pulled, and dropping
//! the stream stops all further work.

use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{EndpointSubset, Endpoints};

use crate::DiscoveryClient;
use crate::config::{DiscoveryProperties, NamespaceScope};
use crate::error::{Error, Result};
use crate::instance::{ServiceInstance, ServiceMetadata, build_instance};
use crate::k8s::{KubeFetcher, ResourceFetcher};

/// Description reported by [`KubernetesDiscoveryClient`].
pub const DESCRIPTION: &str = "Kubernetes Discovery Client";

/// Discovery client answering queries from Kubernetes `Service` and
/// `Endpoints` resources.
///
/// The client holds no mutable state; concurrent queries are independent.
#[derive(Debug)]
pub struct KubernetesDiscoveryClient<F = KubeFetcher> {
    fetcher: F,
    props: DiscoveryProperties,
    scope: NamespaceScope,
}

/// Shared by every instance built from one endpoints resource.
struct InstanceContext {
    service_id: Arc<str>,
    namespace: Option<String>,
    service: ServiceMetadata,
}

/// One endpoints resource, ready to be expanded into instances.
struct InstanceBatch {
    context: Arc<InstanceContext>,
    subsets: Vec<EndpointSubset>,
}

impl KubernetesDiscoveryClient<KubeFetcher> {
    /// Creates a client from the inferred kube configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable kube configuration is found.
    pub async fn try_default(props: DiscoveryProperties) -> Result<Self> {
        let fetcher = KubeFetcher::try_default().await?;
        Ok(Self::new(fetcher, props))
    }
}

impl<F: ResourceFetcher> KubernetesDiscoveryClient<F> {
    /// Creates a client over the given fetcher.
    ///
    /// The namespace scope is fixed here: all namespaces, the configured
    /// namespace, or the fetcher's default namespace.
    #[must_use]
    pub fn new(fetcher: F, props: DiscoveryProperties) -> Self {
        let scope = props.scope(fetcher.default_namespace());
        tracing::debug!(?scope, "created Kubernetes discovery client");

        Self {
            fetcher,
            props,
            scope,
        }
    }

    /// The namespace scope queries run in.
    #[must_use]
    pub fn scope(&self) -> &NamespaceScope {
        &self.scope
    }

    /// The configuration the client was built with.
    #[must_use]
    pub fn properties(&self) -> &DiscoveryProperties {
        &self.props
    }

    /// Fetches the endpoints resources named `service_id` in scope.
    ///
    /// Across all namespaces the name match is left to the API server's
    /// `metadata.name` field selector.
    async fn endpoints_for(&self, service_id: &str) -> Result<Vec<Endpoints>> {
        let endpoints = match &self.scope {
            NamespaceScope::Namespace(namespace) => self
                .fetcher
                .get_endpoints(namespace, service_id)
                .await?
                .into_iter()
                .collect::<Vec<_>>(),
            NamespaceScope::All => self
                .fetcher
                .list_endpoints_all_namespaces(service_id)
                .await?,
        };

        tracing::debug!(
            service = %service_id,
            resources = endpoints.len(),
            "fetched Kubernetes endpoints"
        );

        Ok(endpoints)
    }

    /// Attaches the owning service's metadata to an endpoints resource.
    ///
    /// The service is looked up in the namespace the endpoints resource
    /// lives in. A failed or empty lookup leaves the metadata empty.
    async fn resolve(&self, service_id: Arc<str>, endpoints: Endpoints) -> InstanceBatch {
        let namespace = endpoints
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| match &self.scope {
                NamespaceScope::Namespace(namespace) => namespace.clone(),
                NamespaceScope::All => self.fetcher.default_namespace().to_string(),
            });
        let subsets = endpoints.subsets.unwrap_or_default();

        let service = if subsets.iter().any(|s| self.has_addresses(s)) {
            self.service_metadata(&namespace, &service_id).await
        } else {
            tracing::debug!(
                service = %service_id,
                namespace = %namespace,
                "no addresses in Kubernetes endpoints"
            );
            ServiceMetadata::default()
        };

        InstanceBatch {
            context: Arc::new(InstanceContext {
                service_id,
                namespace: Some(namespace),
                service,
            }),
            subsets,
        }
    }

    async fn service_metadata(&self, namespace: &str, service_id: &str) -> ServiceMetadata {
        match self.fetcher.get_service(namespace, service_id).await {
            Ok(Some(service)) => ServiceMetadata::from_service(&service),
            Ok(None) => {
                tracing::debug!(
                    service = %service_id,
                    namespace = %namespace,
                    "owning service not found, using empty metadata"
                );
                ServiceMetadata::default()
            }
            Err(e) => {
                tracing::warn!(
                    service = %service_id,
                    namespace = %namespace,
                    "failed to fetch owning service, using empty metadata: {e}"
                );
                ServiceMetadata::default()
            }
        }
    }

    fn has_addresses(&self, subset: &EndpointSubset) -> bool {
        let ready = subset.addresses.as_ref().is_some_and(|a| !a.is_empty());
        let not_ready = self.props.include_not_ready_addresses
            && subset.not_ready_addresses.as_ref().is_some_and(|a| !a.is_empty());
        ready || not_ready
    }

    /// Expands a batch into instances, subset by subset and address by
    /// address. Ready addresses come before not-ready ones.
    fn instances(&self, batch: InstanceBatch) -> impl Iterator<Item = ServiceInstance> + Send + '_ {
        let InstanceBatch { context, subsets } = batch;
        let include_not_ready = self.props.include_not_ready_addresses;

        subsets.into_iter().flat_map(move |subset| {
            let ports = subset.ports.unwrap_or_default();
            let not_ready = if include_not_ready {
                subset.not_ready_addresses.unwrap_or_default()
            } else {
                Vec::new()
            };
            let context = Arc::clone(&context);

            subset
                .addresses
                .unwrap_or_default()
                .into_iter()
                .chain(not_ready)
                .map(move |address| {
                    build_instance(
                        &context.service_id,
                        context.namespace.as_deref(),
                        &address,
                        &ports,
                        &context.service,
                        &self.props,
                    )
                })
        })
    }
}

impl<F: ResourceFetcher> DiscoveryClient for KubernetesDiscoveryClient<F> {
    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn order(&self) -> i32 {
        self.props.order
    }

    fn list_service_names(&self) -> BoxStream<'_, Result<String>> {
        let selector = self.props.service_label_selector();

        stream::once(async move {
            self.fetcher
                .list_services(&self.scope, selector.as_deref())
                .await
        })
        .map_ok(|services| {
            let names = services
                .into_iter()
                .filter_map(|service| service.metadata.name);

            stream::iter(names).map(Ok::<_, Error>)
        })
        .try_flatten()
        .boxed()
    }

    fn list_instances(&self, service_id: &str) -> BoxStream<'_, Result<ServiceInstance>> {
        let service_id: Arc<str> = Arc::from(service_id);
        let lookup = Arc::clone(&service_id);

        stream::once(async move { self.endpoints_for(&lookup).await })
            .map_ok(|endpoints| stream::iter(endpoints).map(Ok::<_, Error>))
            .try_flatten()
            .and_then(move |endpoints| {
                let service_id = Arc::clone(&service_id);
                async move { Ok::<_, Error>(self.resolve(service_id, endpoints).await) }
            })
            .map_ok(move |batch| stream::iter(self.instances(batch)).map(Ok::<_, Error>))
            .try_flatten()
            .boxed()
    }
}
