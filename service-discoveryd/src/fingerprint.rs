use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::{DiscoveryRecord, ServiceCategory};

/// Identity and display fields only. Expiry moves on every refresh and
/// would change the fingerprint without any membership change.
#[derive(Serialize)]
struct FingerprintView<'a> {
    category: ServiceCategory,
    address: &'a str,
    port: u16,
    host_name: &'a str,
}

/// SHA-256 over the live service list, independent of input order.
pub fn compute_fingerprint(services: &[DiscoveryRecord]) -> String {
    let mut views: Vec<FingerprintView<'_>> = services
        .iter()
        .map(|s| FingerprintView {
            category: s.category,
            address: &s.address,
            port: s.port,
            host_name: &s.host_name,
        })
        .collect();
    views.sort_by(|a, b| {
        (a.category, a.address, a.port).cmp(&(b.category, b.address, b.port))
    });

    let mut hasher = Sha256::new();
    for view in &views {
        // Serialized JSON never contains a raw NUL, so it delimits records
        match serde_json::to_vec(view) {
            Ok(bytes) => hasher.update(&bytes),
            Err(e) => tracing::error!("Failed to serialize record for fingerprint: {}", e),
        }
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}
