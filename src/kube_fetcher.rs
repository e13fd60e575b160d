//! Kubernetes-backed snapshot fetcher.
//!
//! Ingress rule hosts resolve to the ingress controller's address and node
//! hostnames resolve to the node address of the configured type.

use crate::config::AddressType;
use crate::error::{ConfigError, FetchError};
use crate::fetcher::SnapshotFetcher;
use crate::mapping::{HostEntry, HostMapping};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::net::IpAddr;
use std::path::Path;

/// `NodeAddress.type` of a node's own hostname.
const HOSTNAME_ADDRESS: &str = "Hostname";

/// Where ingress hosts should point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerEndpoint {
    /// Host of the cluster API server URL.
    pub host: String,

    /// Target written for every ingress host.
    pub ip: String,

    /// `true` when `ip` was given explicitly. The controller host itself is
    /// then pinned in the hosts file so the kubeconfig server name resolves.
    pub pinned: bool,
}

impl ControllerEndpoint {
    /// Uses `ip` for `host` without any lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTarget`] if `ip` cannot be written as a
    /// hosts file target.
    pub fn pinned(host: impl Into<String>, ip: impl Into<String>) -> Result<Self, ConfigError> {
        let host = host.into();
        let ip = ip.into();
        HostEntry::new(host.clone(), ip.clone())?;
        Ok(Self {
            host,
            ip,
            pinned: true,
        })
    }

    /// Resolves `host` once, taking the first address returned.
    ///
    /// An IP literal resolves to itself.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Lookup`] or [`ConfigError::NoAddress`] if the
    /// host cannot be resolved.
    pub async fn resolve(host: impl Into<String>) -> Result<Self, ConfigError> {
        let host = host.into();

        let ip = if let Ok(ip) = host.parse::<IpAddr>() {
            ip
        } else {
            tracing::info!(host = %host, "Looking up controller address");
            let mut addrs = tokio::net::lookup_host((host.as_str(), 0))
                .await
                .map_err(|source| ConfigError::Lookup {
                    host: host.clone(),
                    source,
                })?;
            addrs
                .next()
                .ok_or_else(|| ConfigError::NoAddress(host.clone()))?
                .ip()
        };

        Ok(Self {
            host,
            ip: ip.to_string(),
            pinned: false,
        })
    }
}

/// Loads cluster settings from `kubeconfig`, or infers them from the
/// environment (`KUBECONFIG`, `~/.kube/config`, in-cluster) when `None`.
///
/// # Errors
///
/// Returns [`ConfigError::Kubeconfig`] or [`ConfigError::Infer`].
pub async fn load_config(kubeconfig: Option<&Path>) -> Result<Config, ConfigError> {
    match kubeconfig {
        Some(path) => {
            tracing::info!(path = %path.display(), "Reading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path)?;
            Ok(Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?)
        }
        None => Ok(Config::infer().await?),
    }
}

/// Extracts the API server host (without port or IPv6 brackets).
///
/// # Errors
///
/// Returns [`ConfigError::MissingHost`] if the cluster URL has no host.
pub fn controller_host(config: &Config) -> Result<String, ConfigError> {
    let url = &config.cluster_url;
    let host = url
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ConfigError::MissingHost(url.to_string()))?;
    Ok(host.trim_start_matches('[').trim_end_matches(']').to_string())
}

/// Lists ingresses and nodes across the whole cluster.
pub struct KubeFetcher {
    client: Client,
    address_type: AddressType,
    controller: ControllerEndpoint,
}

impl KubeFetcher {
    /// Creates a fetcher over an existing client.
    #[must_use]
    pub const fn new(
        client: Client,
        address_type: AddressType,
        controller: ControllerEndpoint,
    ) -> Self {
        Self {
            client,
            address_type,
            controller,
        }
    }

    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Client`] if the client cannot be created.
    pub fn from_config(
        config: Config,
        address_type: AddressType,
        controller: ControllerEndpoint,
    ) -> Result<Self, ConfigError> {
        let client = Client::try_from(config)?;
        Ok(Self::new(client, address_type, controller))
    }

    /// The endpoint ingress hosts resolve to.
    #[must_use]
    pub const fn controller(&self) -> &ControllerEndpoint {
        &self.controller
    }
}

#[async_trait]
impl SnapshotFetcher for KubeFetcher {
    async fn fetch(&self) -> Result<HostMapping, FetchError> {
        let params = ListParams::default();
        let ingresses = Api::<Ingress>::all(self.client.clone()).list(&params).await?;
        let nodes = Api::<Node>::all(self.client.clone()).list(&params).await?;

        let mapping = snapshot_from(
            &ingresses.items,
            &nodes.items,
            self.address_type,
            &self.controller,
        )?;
        tracing::debug!(
            ingresses = ingresses.items.len(),
            nodes = nodes.items.len(),
            entries = mapping.len(),
            "Fetched cluster snapshot"
        );
        Ok(mapping)
    }
}

/// Builds the desired mapping from cluster objects.
///
/// Node entries are applied after ingress entries and win on collision.
///
/// # Errors
///
/// Returns [`FetchError::Malformed`] if an object yields a name or address
/// that cannot be written to the hosts file.
pub fn snapshot_from(
    ingresses: &[Ingress],
    nodes: &[Node],
    address_type: AddressType,
    controller: &ControllerEndpoint,
) -> Result<HostMapping, FetchError> {
    let mut mapping = HostMapping::new();

    if controller.pinned && controller.host.parse::<IpAddr>().is_err() {
        mapping.insert(HostEntry::new(&controller.host, &controller.ip)?);
    }

    for ingress in ingresses {
        let rules = ingress.spec.as_ref().and_then(|spec| spec.rules.as_ref());
        for host in rules.into_iter().flatten().filter_map(|rule| rule.host.as_deref()) {
            if host.is_empty() {
                continue;
            }
            if host.starts_with('*') {
                tracing::debug!(host = %host, "Skipping wildcard ingress host");
                continue;
            }
            mapping.insert(HostEntry::new(host, &controller.ip)?);
        }
    }

    for node in nodes {
        let addresses = node.status.as_ref().and_then(|status| status.addresses.as_ref());
        let mut ip = None;
        let mut hostname = None;
        for address in addresses.into_iter().flatten() {
            if address.type_ == address_type.as_str() {
                ip = Some(address.address.as_str());
            } else if address.type_ == HOSTNAME_ADDRESS {
                hostname = Some(address.address.as_str());
            }
        }
        match (hostname, ip) {
            (Some(hostname), Some(ip))
                if !hostname.is_empty() && !ip.is_empty() && hostname != ip =>
            {
                mapping.insert(HostEntry::new(hostname, ip)?);
            }
            _ => {}
        }
    }

    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeAddress, NodeStatus};
    use k8s_openapi::api::networking::v1::{IngressRule, IngressSpec};

    fn ingress(hosts: &[&str]) -> Ingress {
        Ingress {
            spec: Some(IngressSpec {
                rules: Some(
                    hosts
                        .iter()
                        .map(|h| IngressRule {
                            host: Some((*h).to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn node(addresses: &[(&str, &str)]) -> Node {
        Node {
            status: Some(NodeStatus {
                addresses: Some(
                    addresses
                        .iter()
                        .map(|(kind, address)| NodeAddress {
                            type_: (*kind).to_string(),
                            address: (*address).to_string(),
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn controller() -> ControllerEndpoint {
        ControllerEndpoint {
            host: "k8s.dev.local".to_string(),
            ip: "192.168.64.2".to_string(),
            pinned: false,
        }
    }

    #[test]
    fn ingress_hosts_point_at_controller() {
        let m = snapshot_from(
            &[ingress(&["api.dev.local", "web.dev.local"]), ingress(&["", "*.dev.local"])],
            &[],
            AddressType::Internal,
            &controller(),
        )
        .unwrap();

        assert_eq!(
            m,
            HostMapping::from_pairs([
                ("api.dev.local", "192.168.64.2"),
                ("web.dev.local", "192.168.64.2"),
            ])
            .unwrap()
        );
    }

    #[test]
    fn nodes_use_selected_address_type() {
        let nodes = [node(&[
            ("InternalIP", "10.0.0.4"),
            ("ExternalIP", "34.1.2.3"),
            ("Hostname", "worker-1"),
        ])];

        let internal = snapshot_from(&[], &nodes, AddressType::Internal, &controller()).unwrap();
        assert_eq!(internal.get("worker-1"), Some("10.0.0.4"));

        let external = snapshot_from(&[], &nodes, AddressType::External, &controller()).unwrap();
        assert_eq!(external.get("worker-1"), Some("34.1.2.3"));
    }

    #[test]
    fn nodes_without_usable_addresses_are_skipped() {
        let nodes = [
            node(&[("Hostname", "no-ip")]),
            node(&[("InternalIP", "10.0.0.5")]),
            node(&[("InternalIP", "10.0.0.6"), ("Hostname", "10.0.0.6")]),
            Node::default(),
        ];
        let m = snapshot_from(&[], &nodes, AddressType::Internal, &controller()).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn nodes_win_over_ingresses() {
        let m = snapshot_from(
            &[ingress(&["worker-1"])],
            &[node(&[("InternalIP", "10.0.0.4"), ("Hostname", "worker-1")])],
            AddressType::Internal,
            &controller(),
        )
        .unwrap();
        assert_eq!(m.get("worker-1"), Some("10.0.0.4"));
    }

    #[test]
    fn pinned_controller_host_is_included() {
        let pinned = ControllerEndpoint::pinned("k8s.dev.local", "192.168.64.9").unwrap();
        let m = snapshot_from(&[ingress(&["api.dev.local"])], &[], AddressType::Internal, &pinned)
            .unwrap();

        assert_eq!(m.get("k8s.dev.local"), Some("192.168.64.9"));
        assert_eq!(m.get("api.dev.local"), Some("192.168.64.9"));
    }

    #[test]
    fn pinned_ip_literal_host_is_not_written() {
        let pinned = ControllerEndpoint::pinned("10.1.2.3", "192.168.64.9").unwrap();
        let m = snapshot_from(&[], &[], AddressType::Internal, &pinned).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn invalid_override_rejected() {
        assert!(ControllerEndpoint::pinned("k8s.dev.local", "").is_err());
        assert!(ControllerEndpoint::pinned("k8s.dev.local", "1.2.3.4 evil").is_err());
    }

    #[test]
    fn controller_host_strips_port() {
        let config = Config::new("https://k8s.dev.local:6443".parse().unwrap());
        assert_eq!(controller_host(&config).unwrap(), "k8s.dev.local");

        let config = Config::new("https://[::1]:6443".parse().unwrap());
        assert_eq!(controller_host(&config).unwrap(), "::1");
    }

    #[tokio::test]
    async fn ip_literal_resolves_to_itself() {
        let endpoint = ControllerEndpoint::resolve("10.1.2.3").await.unwrap();
        assert_eq!(endpoint.ip, "10.1.2.3");
        assert!(!endpoint.pinned);
    }

    #[tokio::test]
    async fn localhost_resolves_to_loopback() {
        let endpoint = ControllerEndpoint::resolve("localhost").await.unwrap();
        let ip: IpAddr = endpoint.ip.parse().unwrap();
        assert!(ip.is_loopback());
    }
}
