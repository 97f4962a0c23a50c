//! Translation of endpoint addresses into service instances.
//!
//! Every address of an endpoint subset becomes one [`ServiceInstance`]. When
//! the subset exposes several ports a single primary port is picked for the
//! instance and the remaining port numbers are kept in its metadata.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{EndpointAddress, EndpointPort, Service};
use serde::Serialize;

use crate::config::DiscoveryProperties;

const HTTPS: &str = "https";
const HTTP: &str = "http";

/// Labels and annotations of the service that owns an endpoint resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceMetadata {
    /// Service labels.
    pub labels: BTreeMap<String, String>,
    /// Service annotations.
    pub annotations: BTreeMap<String, String>,
}

impl ServiceMetadata {
    /// Extracts labels and annotations from a service resource.
    #[must_use]
    pub fn from_service(service: &Service) -> Self {
        Self {
            labels: service.metadata.labels.clone().unwrap_or_default(),
            annotations: service.metadata.annotations.clone().unwrap_or_default(),
        }
    }
}

/// A single discovered backend of a service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceInstance {
    /// Stable identifier of the backing target (the pod uid), when known.
    pub instance_id: Option<String>,

    /// The service this instance belongs to.
    pub service_id: String,

    /// Address IP.
    pub host: String,

    /// The selected port, `0` when the subset declares none.
    pub port: u16,

    /// Whether the selected port speaks TLS.
    pub secure: bool,

    /// Namespace of the endpoint resource the instance came from.
    pub namespace: Option<String>,

    /// Service labels, annotations and port numbers, prefixed per configuration.
    pub metadata: BTreeMap<String, String>,
}

impl ServiceInstance {
    /// URI scheme implied by the secure flag.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.secure { HTTPS } else { HTTP }
    }

    /// `scheme://host:port` for this instance.
    #[must_use]
    pub fn uri(&self) -> String {
        if self.host.contains(':') {
            format!("{}://[{}]:{}", self.scheme(), self.host, self.port)
        } else {
            format!("{}://{}:{}", self.scheme(), self.host, self.port)
        }
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.service_id, self.uri())
    }
}

/// Builds the instance for one endpoint address.
///
/// # Arguments
///
/// * `service_id` - Name of the service being resolved
/// * `namespace` - Namespace of the endpoint resource holding the address
/// * `address` - The endpoint address
/// * `ports` - Ports of the subset the address belongs to
/// * `service` - Metadata of the owning service
/// * `props` - Discovery configuration
#[must_use]
pub fn build_instance(
    service_id: &str,
    namespace: Option<&str>,
    address: &EndpointAddress,
    ports: &[EndpointPort],
    service: &ServiceMetadata,
    props: &DiscoveryProperties,
) -> ServiceInstance {
    let selected = select_port(service_id, ports, props.primary_port_name.as_deref());
    let port = selected.map_or(0, |p| port_number(service_id, p));
    let secure = selected.is_some_and(|p| {
        props.known_secure_ports.contains(&port)
            || p.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(HTTPS))
    });

    ServiceInstance {
        instance_id: address.target_ref.as_ref().and_then(|r| r.uid.clone()),
        service_id: service_id.to_string(),
        host: address.ip.clone(),
        port,
        secure,
        namespace: namespace.map(str::to_string),
        metadata: merge_metadata(service_id, ports, service, props),
    }
}

/// Picks the port an instance is addressed by.
///
/// A lone port is always used. With several ports the configured primary port
/// name wins (ASCII case-insensitive), then `https`, then `http`, then the
/// first port.
fn select_port<'a>(
    service_id: &str,
    ports: &'a [EndpointPort],
    primary_port_name: Option<&str>,
) -> Option<&'a EndpointPort> {
    match ports {
        [] => None,
        [port] => Some(port),
        _ => {
            if let Some(primary) = primary_port_name {
                if let Some(port) = ports
                    .iter()
                    .find(|p| p.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(primary)))
                {
                    return Some(port);
                }

                tracing::warn!(
                    service = %service_id,
                    primary_port_name = %primary,
                    "primary port not found, falling back to https/http/first port"
                );
            }

            named(ports, HTTPS).or_else(|| named(ports, HTTP)).or_else(|| {
                tracing::warn!(
                    service = %service_id,
                    port_count = ports.len(),
                    "ambiguous port selection, using the first port"
                );
                ports.first()
            })
        }
    }
}

fn named<'a>(ports: &'a [EndpointPort], name: &str) -> Option<&'a EndpointPort> {
    ports.iter().find(|p| p.name.as_deref() == Some(name))
}

fn port_number(service_id: &str, port: &EndpointPort) -> u16 {
    u16::try_from(port.port).unwrap_or_else(|_| {
        tracing::warn!(service = %service_id, port = port.port, "port out of range, using 0");
        0
    })
}

fn merge_metadata(
    service_id: &str,
    ports: &[EndpointPort],
    service: &ServiceMetadata,
    props: &DiscoveryProperties,
) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    if let Some(prefix) = &props.metadata.labels_prefix {
        extend_prefixed(&mut metadata, prefix, &service.labels);
    }

    if let Some(prefix) = &props.metadata.annotations_prefix {
        extend_prefixed(&mut metadata, prefix, &service.annotations);
    }

    if ports.len() > 1
        && let Some(prefix) = &props.metadata.ports_prefix
    {
        for port in ports {
            let name = port.name.as_deref().unwrap_or_default();
            metadata.insert(
                format!("{prefix}{name}"),
                port_number(service_id, port).to_string(),
            );
        }
    }

    metadata
}

fn extend_prefixed(
    metadata: &mut BTreeMap<String, String>,
    prefix: &str,
    values: &BTreeMap<String, String>,
) {
    metadata.extend(
        values
            .iter()
            .map(|(key, value)| (format!("{prefix}{key}"), value.clone())),
    );
}
