use std::collections::HashMap;
use std::net::IpAddr;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use anyhow::{Context, Result};
use shared::protocol::{HYPERHDR_SERVICE_TYPE, TXT_VERSION};
use crate::config::AdvertiseConfig;

/// Announce this node as a HyperHDR session. Peers pick it up; our own
/// browser sees it too and the self filter discards it.
pub fn register_session(daemon: &ServiceDaemon, config: &AdvertiseConfig) -> Result<ServiceInfo> {
    let hostname = hostname::get()
        .context("Failed to get system hostname")?
        .to_string_lossy()
        .to_string();

    let instance_name = config.instance_name.clone().unwrap_or_else(|| hostname.clone());
    let host_name = format!("{}.local.", hostname);

    let txt_records = HashMap::from([
        (TXT_VERSION.to_string(), env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let addresses: Vec<IpAddr> = if_addrs::get_if_addrs()
        .context("Failed to list network interfaces")?
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .map(|iface| iface.ip())
        .collect();

    let service_info = ServiceInfo::new(
        HYPERHDR_SERVICE_TYPE,
        &instance_name,
        &host_name,
        &addresses[..],
        config.port,
        txt_records,
    )
    .context("Failed to create ServiceInfo")?
    .enable_addr_auto();

    daemon
        .register(service_info.clone())
        .context("Failed to register mDNS service")?;

    tracing::info!(
        "Registered {} as {} on port {}",
        HYPERHDR_SERVICE_TYPE,
        instance_name,
        config.port
    );

    Ok(service_info)
}

pub fn unregister_session(daemon: &ServiceDaemon, service_info: &ServiceInfo) -> Result<()> {
    daemon
        .unregister(service_info.get_fullname())
        .context("Failed to unregister mDNS service")?;

    tracing::info!("Unregistered {}", service_info.get_fullname());
    Ok(())
}
