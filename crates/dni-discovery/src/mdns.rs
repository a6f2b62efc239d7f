//! LAN discovery backend: multicast DNS service advertisement and browsing
//! (§4.4).
//!
//! `mdns-sd`'s daemon API is synchronous; advertisement and browsing each
//! run on a blocking thread and forward into a tokio channel.

use std::net::SocketAddr;
use std::time::Duration;

use base64::Engine;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, warn};

use crate::error::DiscoveryError;

/// The mDNS service type this installation advertises under and browses
/// for (§4.4).
pub const SERVICE_TYPE: &str = "_dni-im._udp.local.";

/// Advertisements are renewed on this cadence.
pub const ADVERTISE_INTERVAL: Duration = Duration::from_secs(30);

/// A peer observed via mDNS, with its TXT record fields parsed out.
#[derive(Debug, Clone)]
pub struct LanPeer {
    /// The peer's fingerprint, from the `fingerprint` TXT key.
    pub fingerprint: String,
    /// The peer's static public key, decoded from the base64 `static_pub`
    /// TXT key.
    pub static_pub: [u8; 32],
    /// The peer's display name, from the `name` TXT key.
    pub name: String,
    /// Where to reach the peer.
    pub address: SocketAddr,
}

/// The LAN discovery backend: advertises this installation and reports
/// peers observed on the local network.
pub struct LanDiscovery {
    daemon: ServiceDaemon,
}

impl LanDiscovery {
    /// Start the underlying mDNS daemon.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::MdnsRegisterFailed` if the daemon cannot be
    /// created (e.g. no usable network interface).
    pub fn new() -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| DiscoveryError::MdnsRegisterFailed(e.to_string()))?;
        Ok(Self { daemon })
    }

    /// Advertise this installation's fingerprint, static key, and display
    /// name on `port`, re-announcing every 30 s until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::MdnsRegisterFailed` if the initial
    /// registration fails.
    pub async fn advertise(
        &self,
        fingerprint: &str,
        static_pub: [u8; 32],
        display_name: &str,
        port: u16,
    ) -> Result<(), DiscoveryError> {
        self.register_once(fingerprint, static_pub, display_name, port)?;

        let daemon = self.daemon.clone();
        let fingerprint = fingerprint.to_string();
        let display_name = display_name.to_string();
        tokio::spawn(async move {
            let mut ticker = time::interval(ADVERTISE_INTERVAL);
            loop {
                ticker.tick().await;
                if let Err(e) = Self::register_with(
                    &daemon,
                    &fingerprint,
                    static_pub,
                    &display_name,
                    port,
                ) {
                    warn!(error = %e, "mDNS re-advertisement failed");
                }
            }
        });
        Ok(())
    }

    fn register_once(
        &self,
        fingerprint: &str,
        static_pub: [u8; 32],
        display_name: &str,
        port: u16,
    ) -> Result<(), DiscoveryError> {
        Self::register_with(&self.daemon, fingerprint, static_pub, display_name, port)
    }

    fn register_with(
        daemon: &ServiceDaemon,
        fingerprint: &str,
        static_pub: [u8; 32],
        display_name: &str,
        port: u16,
    ) -> Result<(), DiscoveryError> {
        let static_pub_b64 = base64::engine::general_purpose::STANDARD.encode(static_pub);
        let properties = [
            ("fingerprint", fingerprint),
            ("static_pub", static_pub_b64.as_str()),
            ("name", display_name),
            ("port", &port.to_string()),
        ];
        let instance_name = fingerprint;
        let host_name = format!("{fingerprint}.local.");
        let service_info = ServiceInfo::new(
            SERVICE_TYPE,
            instance_name,
            &host_name,
            "",
            port,
            &properties[..],
        )
        .map_err(|e| DiscoveryError::MdnsRegisterFailed(e.to_string()))?
        .enable_addr_auto();
        daemon
            .register(service_info)
            .map_err(|e| DiscoveryError::MdnsRegisterFailed(e.to_string()))
    }

    /// Browse for peers advertising [`SERVICE_TYPE`], forwarding each
    /// resolved peer through the returned channel. Runs until the daemon
    /// is dropped.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryError::MdnsRegisterFailed` if the browse could not
    /// be started.
    pub fn browse(&self) -> Result<mpsc::UnboundedReceiver<LanPeer>, DiscoveryError> {
        let receiver = self
            .daemon
            .browse(SERVICE_TYPE)
            .map_err(|e| DiscoveryError::MdnsRegisterFailed(e.to_string()))?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::task::spawn_blocking(move || {
            while let Ok(event) = receiver.recv() {
                if let ServiceEvent::ServiceResolved(info) = event {
                    match parse_peer(&info) {
                        Some(peer) => {
                            if tx.send(peer).is_err() {
                                break;
                            }
                        }
                        None => debug!("mDNS peer missing required TXT fields, ignoring"),
                    }
                }
            }
        });
        Ok(rx)
    }
}

fn parse_peer(info: &ServiceInfo) -> Option<LanPeer> {
    let properties = info.get_properties();
    let fingerprint = properties.get_property_val_str("fingerprint")?.to_string();
    let static_pub_b64 = properties.get_property_val_str("static_pub")?;
    let name = properties
        .get_property_val_str("name")
        .unwrap_or("")
        .to_string();
    let raw = base64::engine::general_purpose::STANDARD
        .decode(static_pub_b64)
        .ok()?;
    let static_pub: [u8; 32] = raw.try_into().ok()?;
    let addr = info.get_addresses().iter().next()?;
    let address = SocketAddr::new(*addr, info.get_port());

    Some(LanPeer {
        fingerprint,
        static_pub,
        name,
        address,
    })
}
