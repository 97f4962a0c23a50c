//! Read-only access to Kubernetes `Service` and `Endpoints` resources.
//!
//! Discovery only ever reads whole resources or whole lists: a service by
//! name, the endpoints of a service by name, or a list filtered by label or
//! field selector. [`ResourceFetcher`] captures exactly those calls so the
//! discovery client can be driven by something other than a live cluster.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::api::ListParams;
use kube::{Api, Client};

use crate::config::NamespaceScope;
use crate::error::Result;

/// Queries the discovery client issues against the cluster.
///
/// A missing resource is `Ok(None)` (or an empty list), never an error.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Namespace used when the configuration does not name one.
    fn default_namespace(&self) -> &str;

    /// Lists services in the given scope, optionally filtered by a label selector.
    async fn list_services(
        &self,
        scope: &NamespaceScope,
        label_selector: Option<&str>,
    ) -> Result<Vec<Service>>;

    /// Fetches the endpoints resource with the given name in one namespace.
    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>>;

    /// Lists endpoints resources with the given name across every namespace.
    async fn list_endpoints_all_namespaces(&self, name: &str) -> Result<Vec<Endpoints>>;

    /// Fetches the service with the given name in one namespace.
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;
}

/// [`ResourceFetcher`] backed by the Kubernetes API.
///
/// Connection handling, authentication and TLS are the kube client's concern.
#[derive(Clone)]
pub struct KubeFetcher {
    client: Client,
}

impl KubeFetcher {
    /// Wraps an existing kube client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a fetcher from the inferred kube configuration
    /// (in-cluster service account or local kubeconfig).
    ///
    /// # Errors
    ///
    /// Returns an error if no usable kube configuration is found.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    fn services(&self, scope: &NamespaceScope) -> Api<Service> {
        match scope {
            NamespaceScope::Namespace(namespace) => Api::namespaced(self.client.clone(), namespace),
            NamespaceScope::All => Api::all(self.client.clone()),
        }
    }
}

impl std::fmt::Debug for KubeFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeFetcher")
            .field("default_namespace", &self.client.default_namespace())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ResourceFetcher for KubeFetcher {
    fn default_namespace(&self) -> &str {
        self.client.default_namespace()
    }

    async fn list_services(
        &self,
        scope: &NamespaceScope,
        label_selector: Option<&str>,
    ) -> Result<Vec<Service>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        tracing::debug!(?scope, ?label_selector, "listing Kubernetes services");
        let list = self.services(scope).list(&params).await?;
        Ok(list.items)
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>> {
        tracing::debug!("fetching Kubernetes endpoints {namespace}/{name}");
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_endpoints_all_namespaces(&self, name: &str) -> Result<Vec<Endpoints>> {
        tracing::debug!("listing Kubernetes endpoints named {name} in all namespaces");
        let api: Api<Endpoints> = Api::all(self.client.clone());
        let params = ListParams::default().fields(&format!("metadata.name={name}"));
        let list = api.list(&params).await?;
        Ok(list.items)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        tracing::debug!("fetching Kubernetes service {namespace}/{name}");
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
