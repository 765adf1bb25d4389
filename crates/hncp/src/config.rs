//! Host configuration.

use std::collections::BTreeSet;
use std::net::Ipv6Addr;

use hncp_core::NodeIdentifier;
use hncp_sync::{SyncConfig, HNCP_PORT};

use crate::error::{HncpError, Result};

/// One interface the host runs the protocol on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Interface name, e.g. `eth0`.
    pub name: String,
    /// OS interface index, used as the scope of link-local addresses.
    pub ifindex: u32,
    /// Our link-local address on the interface.
    pub address: Ipv6Addr,
}

impl LinkConfig {
    pub fn new(name: impl Into<String>, ifindex: u32, address: Ipv6Addr) -> Self {
        Self {
            name: name.into(),
            ifindex,
            address,
        }
    }
}

/// Configuration for an HNCP host.
#[derive(Debug, Clone)]
pub struct HncpConfig {
    /// Node identifier. Random if unset.
    pub node_id: Option<NodeIdentifier>,
    /// Sync configuration.
    pub sync: SyncConfig,
    /// UDP port to bind and send to.
    pub port: u16,
    pub links: Vec<LinkConfig>,
}

impl Default for HncpConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            sync: SyncConfig::default(),
            port: HNCP_PORT,
            links: Vec::new(),
        }
    }
}

impl HncpConfig {
    pub fn with_node_id(mut self, id: NodeIdentifier) -> Self {
        self.node_id = Some(id);
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_link(mut self, link: LinkConfig) -> Self {
        self.links.push(link);
        self
    }

    /// The configured identifier, or a fresh random one.
    pub fn resolve_node_id(&self) -> NodeIdentifier {
        self.node_id
            .unwrap_or_else(|| NodeIdentifier::from_bytes(rand::random()))
    }

    /// Check the configuration can start a host.
    pub fn validate(&self) -> Result<()> {
        if self.links.is_empty() {
            return Err(HncpError::NoLinks);
        }
        let mut names = BTreeSet::new();
        let mut indexes = BTreeSet::new();
        for link in &self.links {
            if !names.insert(link.name.as_str()) {
                return Err(HncpError::Config(format!("duplicate link name {}", link.name)));
            }
            if !indexes.insert(link.ifindex) {
                return Err(HncpError::Config(format!(
                    "duplicate interface index {}",
                    link.ifindex
                )));
            }
            if link.ifindex == 0 {
                return Err(HncpError::Config(format!("link {} has no interface index", link.name)));
            }
        }
        if self.sync.max_message_size < 64 {
            return Err(HncpError::Config(format!(
                "max message size {} too small",
                self.sync.max_message_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(name: &str, ifindex: u32) -> LinkConfig {
        LinkConfig::new(name, ifindex, "fe80::1".parse().unwrap())
    }

    #[test]
    fn test_defaults() {
        let config = HncpConfig::default();
        assert_eq!(config.port, 8808);
        assert!(config.node_id.is_none());
        assert!(matches!(config.validate(), Err(HncpError::NoLinks)));
    }

    #[test]
    fn test_valid_config() {
        let config = HncpConfig::default()
            .with_link(link("eth0", 2))
            .with_link(link("eth1", 3))
            .with_port(9999);
        config.validate().unwrap();
        assert_eq!(config.port, 9999);
    }

    #[test]
    fn test_duplicates_rejected() {
        let config = HncpConfig::default()
            .with_link(link("eth0", 2))
            .with_link(link("eth0", 3));
        assert!(matches!(config.validate(), Err(HncpError::Config(_))));

        let config = HncpConfig::default()
            .with_link(link("eth0", 2))
            .with_link(link("eth1", 2));
        assert!(matches!(config.validate(), Err(HncpError::Config(_))));
    }

    #[test]
    fn test_node_id_resolution() {
        let id = NodeIdentifier::derive(b"fixed");
        assert_eq!(HncpConfig::default().with_node_id(id).resolve_node_id(), id);
        let config = HncpConfig::default();
        assert_ne!(config.resolve_node_id(), config.resolve_node_id());
    }
}
