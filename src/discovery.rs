//! mDNS advertisement of the HTTP control surface.
//!
//! Clients on the LAN browse `_http._tcp.local.` and pick instances whose
//! name starts with this host's name.

use std::net::IpAddr;

use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{debug, info, warn};

use crate::config::{Config, DiscoveryConfig};
use crate::error::DiscoveryError;

/// What gets advertised.
#[derive(Debug, Clone)]
pub struct Advertisement {
    pub service_type: String,
    pub instance_name: String,
    pub port: u16,
    pub version: String,
}

impl Advertisement {
    pub fn from_config(config: &Config) -> Self {
        let discovery: &DiscoveryConfig = &config.discovery;
        Self {
            service_type: discovery.service_type.clone(),
            instance_name: discovery.instance_name(),
            port: config.server.port,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.instance_name, self.service_type)
    }
}

/// Keeps the service registered while it is alive.
pub struct Advertiser {
    advertisement: Advertisement,
    daemon: Option<ServiceDaemon>,
}

impl Advertiser {
    pub fn new(advertisement: Advertisement) -> Self {
        Self {
            advertisement,
            daemon: None,
        }
    }

    /// Register the service. Re-registers if already running.
    pub fn start(&mut self) -> Result<(), DiscoveryError> {
        if self.advertisement.port == 0 {
            return Err(DiscoveryError::Config("port must be non-zero".into()));
        }
        if !self.advertisement.service_type.ends_with(".local.") {
            return Err(DiscoveryError::Config(format!(
                "service type '{}' must end with '.local.'",
                self.advertisement.service_type
            )));
        }

        self.stop();

        let ad = &self.advertisement;
        let ips = local_ipv4_addrs();
        if ips.is_empty() {
            return Err(DiscoveryError::NoAddress);
        }

        let daemon = ServiceDaemon::new()
            .map_err(|e| DiscoveryError::Mdns(format!("failed to create mDNS daemon: {e}")))?;

        let host = mdns_host_name();
        let properties = [("version", ad.version.as_str()), ("path", "/")];
        let service = ServiceInfo::new(
            &ad.service_type,
            &ad.instance_name,
            &host,
            &ips[..],
            ad.port,
            &properties[..],
        )
        .map_err(|e| DiscoveryError::Mdns(format!("failed to build service info: {e}")))?;

        daemon.register(service).map_err(|e| {
            DiscoveryError::Mdns(format!("failed to register '{}': {e}", ad.full_name()))
        })?;

        info!(
            service = %ad.full_name(),
            port = ad.port,
            addresses = ?ips,
            "mDNS service registered"
        );
        self.daemon = Some(daemon);
        Ok(())
    }

    /// Unregister and shut the daemon down. Safe to call repeatedly.
    pub fn stop(&mut self) {
        let Some(daemon) = self.daemon.take() else {
            return;
        };
        let full_name = self.advertisement.full_name();
        if let Err(e) = daemon.unregister(&full_name) {
            warn!(service = %full_name, error = %e, "Failed to unregister mDNS service");
        }
        if let Err(e) = daemon.shutdown() {
            debug!(error = %e, "mDNS daemon shutdown reported an error");
        }
        info!(service = %full_name, "mDNS service unregistered");
    }
}

impl Drop for Advertiser {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Non-loopback, non-link-local IPv4 addresses of this host.
pub fn local_ipv4_addrs() -> Vec<IpAddr> {
    let Ok(interfaces) = if_addrs::get_if_addrs() else {
        return Vec::new();
    };

    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_link_local() => Some(IpAddr::V4(v4)),
            _ => None,
        })
        .collect()
}

/// Host name in the `<name>.local.` form mDNS expects.
pub fn mdns_host_name() -> String {
    let name = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "computer".into());
    if name.ends_with(".local.") {
        name
    } else {
        format!("{}.local.", name.trim_end_matches('.'))
    }
}
