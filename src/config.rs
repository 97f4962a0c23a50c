//! Discovery configuration.
//!
//! Configuration is resolved once, before the client is built, and never
//! re-read per query. It can be assembled with the chained setters or
//! deserialized from any `serde` format; absent fields take their defaults.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Ordering priority reported by a discovery client unless configured otherwise.
pub const DEFAULT_ORDER: i32 = 0;

/// Port number conventionally used for TLS.
pub const DEFAULT_SECURE_PORT: u16 = 443;

/// Where discovery queries look for resources.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamespaceScope {
    /// Only the given namespace.
    Namespace(String),
    /// Every namespace in the cluster.
    All,
}

/// Controls which service metadata is copied into instance metadata.
///
/// Each prefix is prepended to the keys of its category. An empty prefix
/// copies keys unchanged; `None` leaves the category out entirely.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MetadataProperties {
    /// Prefix for service labels.
    pub labels_prefix: Option<String>,

    /// Prefix for service annotations.
    pub annotations_prefix: Option<String>,

    /// Prefix for port name entries, added when an address exposes several ports.
    pub ports_prefix: Option<String>,
}

impl Default for MetadataProperties {
    fn default() -> Self {
        Self {
            labels_prefix: Some(String::new()),
            annotations_prefix: Some(String::new()),
            ports_prefix: Some("port.".to_string()),
        }
    }
}

/// Configuration for Kubernetes service discovery.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiscoveryProperties {
    /// Search every namespace instead of a single one.
    pub all_namespaces: bool,

    /// The namespace to search when `all_namespaces` is off.
    /// If `None`, uses the current namespace from the kube client.
    pub namespace: Option<String>,

    /// Name of the port to use when an address exposes several ports.
    pub primary_port_name: Option<String>,

    /// Also report addresses the orchestrator has not marked ready.
    pub include_not_ready_addresses: bool,

    /// Only list services carrying all of these labels.
    pub service_labels: BTreeMap<String, String>,

    /// Port numbers that mark an instance as secure.
    pub known_secure_ports: Vec<u16>,

    /// Ordering priority reported by the client.
    pub order: i32,

    /// Metadata propagation settings.
    pub metadata: MetadataProperties,
}

impl Default for DiscoveryProperties {
    fn default() -> Self {
        Self {
            all_namespaces: false,
            namespace: None,
            primary_port_name: None,
            include_not_ready_addresses: false,
            service_labels: BTreeMap::new(),
            known_secure_ports: vec![DEFAULT_SECURE_PORT],
            order: DEFAULT_ORDER,
            metadata: MetadataProperties::default(),
        }
    }
}

impl DiscoveryProperties {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables all-namespaces mode.
    #[must_use]
    pub fn all_namespaces(mut self, all: bool) -> Self {
        self.all_namespaces = all;
        self
    }

    /// Sets an explicit namespace to search.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the primary port name used for multi-port addresses.
    #[must_use]
    pub fn primary_port_name(mut self, name: impl Into<String>) -> Self {
        self.primary_port_name = Some(name.into());
        self
    }

    /// Includes addresses that are not ready.
    #[must_use]
    pub fn include_not_ready_addresses(mut self, include: bool) -> Self {
        self.include_not_ready_addresses = include;
        self
    }

    /// Adds a label that listed services must carry.
    #[must_use]
    pub fn service_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.service_labels.insert(key.into(), value.into());
        self
    }

    /// Replaces the set of port numbers treated as secure.
    #[must_use]
    pub fn known_secure_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.known_secure_ports = ports.into_iter().collect();
        self
    }

    /// Sets the ordering priority.
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Sets the label prefix; `None` drops labels from instance metadata.
    #[must_use]
    pub fn labels_prefix(mut self, prefix: Option<&str>) -> Self {
        self.metadata.labels_prefix = prefix.map(str::to_string);
        self
    }

    /// Sets the annotation prefix; `None` drops annotations from instance metadata.
    #[must_use]
    pub fn annotations_prefix(mut self, prefix: Option<&str>) -> Self {
        self.metadata.annotations_prefix = prefix.map(str::to_string);
        self
    }

    /// Sets the port prefix; `None` drops port entries from instance metadata.
    #[must_use]
    pub fn ports_prefix(mut self, prefix: Option<&str>) -> Self {
        self.metadata.ports_prefix = prefix.map(str::to_string);
        self
    }

    /// Resolves the namespace scope, falling back to `default_namespace`
    /// when no namespace is configured.
    #[must_use]
    pub fn scope(&self, default_namespace: &str) -> NamespaceScope {
        if self.all_namespaces {
            NamespaceScope::All
        } else {
            NamespaceScope::Namespace(
                self.namespace
                    .clone()
                    .unwrap_or_else(|| default_namespace.to_string()),
            )
        }
    }

    /// Label selector built from `service_labels`, if any are configured.
    #[must_use]
    pub fn service_label_selector(&self) -> Option<String> {
        if self.service_labels.is_empty() {
            return None;
        }

        let selector = self
            .service_labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");

        Some(selector)
    }
}
