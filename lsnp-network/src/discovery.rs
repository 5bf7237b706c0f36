//! mDNS discovery (spec §4.4): advertise this peer under `_lsnp._udp.local.`
//! and browse for others, bridging `mdns-sd`'s blocking receiver into an
//! async channel the controller can select on.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use lsnp_types::FullId;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const SERVICE_TYPE: &str = "_lsnp._udp.local.";

#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    PeerFound { user_id: FullId, display_name: String, addr: SocketAddr },
    PeerLost { fullname: String },
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mdns daemon error: {0}")]
    Daemon(String),
    #[error("service registration error: {0}")]
    Registration(String),
}

/// Owns the mDNS daemon handle; dropping it tears down advertising and
/// browsing.
pub struct DiscoveryService {
    daemon: ServiceDaemon,
}

impl DiscoveryService {
    /// Advertise `user_id` on the LAN and start browsing for peers. The
    /// returned receiver yields a [`DiscoveryEvent`] per sighting; the
    /// caller (the controller's discovery task) upserts the peer registry
    /// from it.
    pub fn start(
        user_id: &FullId,
        display_name: &str,
        port: u16,
    ) -> Result<(Self, mpsc::Receiver<DiscoveryEvent>), DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::Daemon(e.to_string()))?;

        let mut properties = HashMap::new();
        properties.insert("user_id".to_string(), user_id.to_string());
        properties.insert("display_name".to_string(), display_name.to_string());

        // spec §6: `<user_id>_at_<ip-with-dots-as-underscores>.<service-type>`
        let ip_underscored = user_id.ip.to_string().replace('.', "_");
        let instance_name = format!("{}_at_{ip_underscored}", user_id.handle());
        let host = format!("{instance_name}.local.");
        let addr = match user_id.ip {
            Ipv4Addr::UNSPECIFIED => String::new(),
            ip => ip.to_string(),
        };

        let service_info = ServiceInfo::new(
            SERVICE_TYPE,
            &instance_name,
            &host,
            addr.as_str(),
            port,
            properties,
        )
        .map_err(|e| DiscoveryError::Registration(e.to_string()))?
        .enable_addr_auto();

        daemon
            .register(service_info)
            .map_err(|e| DiscoveryError::Registration(e.to_string()))?;
        info!(%user_id, port, "registered mDNS service");

        let browse_receiver =
            daemon.browse(SERVICE_TYPE).map_err(|e| DiscoveryError::Daemon(e.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let self_id = user_id.to_string();
        tokio::task::spawn_blocking(move || browse_loop(browse_receiver, tx, self_id));

        Ok((Self { daemon }, rx))
    }

    pub fn shutdown(&self) {
        let _ = self.daemon.shutdown();
    }
}

fn browse_loop(
    browse_receiver: mdns_sd::Receiver<ServiceEvent>,
    tx: mpsc::Sender<DiscoveryEvent>,
    self_id: String,
) {
    while let Ok(event) = browse_receiver.recv() {
        match event {
            ServiceEvent::ServiceResolved(info) => {
                let properties = info.get_properties();
                let Some(user_id_str) = properties.get_property_val_str("user_id") else {
                    warn!(service = info.get_fullname(), "mDNS service missing user_id TXT record");
                    continue;
                };
                if user_id_str == self_id {
                    debug!("discovered ourselves, skipping");
                    continue;
                }
                let Ok(user_id) = user_id_str.parse::<FullId>() else {
                    warn!(user_id_str, "mDNS service has unparseable user_id");
                    continue;
                };
                let display_name = properties
                    .get_property_val_str("display_name")
                    .unwrap_or("unknown")
                    .to_string();
                let Some(ipv4) = info.get_addresses().iter().find_map(|a| match a {
                    IpAddr::V4(v4) => Some(*v4),
                    IpAddr::V6(_) => None,
                }) else {
                    warn!(%user_id, "mDNS service resolved without an IPv4 address");
                    continue;
                };
                let addr = SocketAddr::new(ipv4.into(), info.get_port());
                if tx.blocking_send(DiscoveryEvent::PeerFound { user_id, display_name, addr }).is_err()
                {
                    return;
                }
            }
            ServiceEvent::ServiceRemoved(_, fullname) => {
                if tx.blocking_send(DiscoveryEvent::PeerLost { fullname }).is_err() {
                    return;
                }
            }
            _ => {}
        }
    }
}
