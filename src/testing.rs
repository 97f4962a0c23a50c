//! Test fixtures: resource builders, an in-memory fetcher and a fake
//! Kubernetes API server for driving a real `kube::Client`.

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::{Request, Response, StatusCode};
use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, ObjectReference, Service,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::client::Body;
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::NamespaceScope;
use crate::error::{Error, Result};
use crate::k8s::ResourceFetcher;

fn to_map(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
    if pairs.is_empty() {
        return None;
    }

    Some(
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
    )
}

pub(crate) fn make_service(name: &str, namespace: &str, labels: &[(&str, &str)]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: to_map(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub(crate) fn with_annotations(mut service: Service, annotations: &[(&str, &str)]) -> Service {
    service.metadata.annotations = to_map(annotations);
    service
}

pub(crate) fn make_subset(
    addresses: &[(&str, Option<&str>)],
    ports: &[(&str, i32)],
) -> EndpointSubset {
    EndpointSubset {
        addresses: Some(
            addresses
                .iter()
                .map(|(ip, uid)| EndpointAddress {
                    ip: (*ip).to_string(),
                    target_ref: uid.map(|uid| ObjectReference {
                        uid: Some(uid.to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                })
                .collect(),
        ),
        ports: Some(
            ports
                .iter()
                .map(|(name, port)| EndpointPort {
                    name: Some((*name).to_string()),
                    port: *port,
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                })
                .collect(),
        ),
        ..Default::default()
    }
}

pub(crate) fn make_endpoints(
    name: &str,
    namespace: &str,
    subsets: Vec<EndpointSubset>,
) -> Endpoints {
    Endpoints {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        subsets: Some(subsets),
    }
}

/// In-memory [`ResourceFetcher`] that records every call it serves.
#[derive(Default)]
pub(crate) struct MemoryFetcher {
    services: Vec<Service>,
    endpoints: Vec<Endpoints>,
    fail_list_services: bool,
    fail_get_service: bool,
    calls: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub(crate) fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints.push(endpoints);
        self
    }

    pub(crate) fn failing_list_services(mut self) -> Self {
        self.fail_list_services = true;
        self
    }

    pub(crate) fn failing_get_service(mut self) -> Self {
        self.fail_get_service = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn in_namespace<K: kube::Resource>(resource: &K, namespace: &str) -> bool {
    resource.meta().namespace.as_deref() == Some(namespace)
}

fn named<K: kube::Resource>(resource: &K, name: &str) -> bool {
    resource.meta().name.as_deref() == Some(name)
}

fn has_labels(service: &Service, selector: &str) -> bool {
    let labels = service.metadata.labels.clone().unwrap_or_default();
    selector.split(',').all(|pair| {
        pair.split_once('=')
            .is_some_and(|(k, v)| labels.get(k).map(String::as_str) == Some(v))
    })
}

#[async_trait]
impl ResourceFetcher for MemoryFetcher {
    fn default_namespace(&self) -> &str {
        "test"
    }

    async fn list_services(
        &self,
        scope: &NamespaceScope,
        label_selector: Option<&str>,
    ) -> Result<Vec<Service>> {
        self.record(format!("list_services {scope:?} {label_selector:?}"));
        if self.fail_list_services {
            return Err(Error::fetch("services unavailable"));
        }

        Ok(self
            .services
            .iter()
            .filter(|s| match scope {
                NamespaceScope::Namespace(ns) => in_namespace(*s, ns),
                NamespaceScope::All => true,
            })
            .filter(|s| label_selector.is_none_or(|selector| has_labels(s, selector)))
            .cloned()
            .collect())
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Option<Endpoints>> {
        self.record(format!("get_endpoints {namespace}/{name}"));
        Ok(self
            .endpoints
            .iter()
            .find(|e| in_namespace(*e, namespace) && named(*e, name))
            .cloned())
    }

    async fn list_endpoints_all_namespaces(&self, name: &str) -> Result<Vec<Endpoints>> {
        self.record(format!("list_endpoints_all_namespaces {name}"));
        Ok(self
            .endpoints
            .iter()
            .filter(|e| named(*e, name))
            .cloned()
            .collect())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        self.record(format!("get_service {namespace}/{name}"));
        if self.fail_get_service {
            return Err(Error::fetch("service lookup failed"));
        }

        Ok(self
            .services
            .iter()
            .find(|s| in_namespace(*s, namespace) && named(*s, name))
            .cloned())
    }
}

/// Fake Kubernetes API server answering by request path.
///
/// Unknown paths get a `404 NotFound` status, like the real API server.
#[derive(Clone, Default)]
pub(crate) struct FakeApiServer {
    routes: HashMap<String, (StatusCode, Value)>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeApiServer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn object<T: Serialize>(mut self, path: &str, object: T) -> Self {
        let body = serde_json::to_value(object).unwrap();
        self.routes.insert(path.to_string(), (StatusCode::OK, body));
        self
    }

    pub(crate) fn list<T: Serialize>(mut self, path: &str, kind: &str, items: Vec<T>) -> Self {
        let body = json!({
            "apiVersion": "v1",
            "kind": kind,
            "metadata": { "resourceVersion": "1" },
            "items": items,
        });
        self.routes.insert(path.to_string(), (StatusCode::OK, body));
        self
    }

    pub(crate) fn fail(mut self, path: &str) -> Self {
        let body = status(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "boom");
        self.routes
            .insert(path.to_string(), (StatusCode::INTERNAL_SERVER_ERROR, body));
        self
    }

    /// Requests served so far, as `path` or `path?query`.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Request paths served so far, without query strings.
    pub(crate) fn paths(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|r| r.split('?').next().unwrap_or_default().to_string())
            .collect()
    }

    /// A kube client whose default namespace is `test`, served by this fake.
    pub(crate) fn client(&self) -> Client {
        let routes = Arc::new(self.routes.clone());
        let requests = Arc::clone(&self.requests);

        let service = tower::service_fn(move |request: Request<Body>| {
            let routes = Arc::clone(&routes);
            let requests = Arc::clone(&requests);

            async move {
                let path = request.uri().path().to_string();
                let recorded = match request.uri().query().filter(|q| !q.is_empty()) {
                    Some(query) => format!("{path}?{query}"),
                    None => path.clone(),
                };
                requests.lock().unwrap().push(recorded);

                let (code, body) = routes.get(&path).cloned().unwrap_or_else(|| {
                    (
                        StatusCode::NOT_FOUND,
                        status(StatusCode::NOT_FOUND, "NotFound", "not found"),
                    )
                });

                let response = Response::builder()
                    .status(code)
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap();

                Ok::<_, Infallible>(response)
            }
        });

        Client::new(service, "test")
    }
}

fn status(code: StatusCode, reason: &str, message: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Status",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code.as_u16(),
    })
}
