use std::net::IpAddr;

/// Decides whether a sighting's address belongs to this host.
pub trait LocalAddresses: Send {
    fn is_local(&self, address: &str) -> bool;
}

/// Live lookup against the addresses bound to the host's interfaces.
///
/// Interfaces come and go (DHCP renewals, VPNs), so the list is read on
/// every call rather than cached. Discovery events are infrequent enough
/// for that to be cheap.
pub struct InterfaceAddresses;

impl LocalAddresses for InterfaceAddresses {
    fn is_local(&self, address: &str) -> bool {
        let Some(candidate) = parse_address(address) else {
            return false;
        };

        match if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces
                .iter()
                .any(|iface| iface.ip().to_canonical() == candidate),
            Err(e) => {
                tracing::warn!("Failed to list network interfaces: {}", e);
                false
            }
        }
    }
}

/// Parse an announced address. Serial device paths and host names are not
/// IP addresses and never match.
fn parse_address(address: &str) -> Option<IpAddr> {
    let trimmed = address.trim_start_matches('[').trim_end_matches(']');
    // Drop an IPv6 zone suffix such as "%eth0"
    let without_zone = trimmed.split('%').next().unwrap_or(trimmed);
    without_zone
        .parse::<IpAddr>()
        .ok()
        .map(|ip| ip.to_canonical())
}
