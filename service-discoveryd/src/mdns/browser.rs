use std::collections::HashMap;
use std::net::IpAddr;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::Future;
use anyhow::Result;
use shared::types::{DiscoveryRecord, ServiceCategory};
use crate::aggregator::AggregatorHandle;

type RecvResult = (
    ServiceCategory,
    u64,
    flume::Receiver<ServiceEvent>,
    std::result::Result<ServiceEvent, flume::RecvError>,
);
type RecvFuture = Pin<Box<dyn Future<Output = RecvResult> + Send>>;

/// Each future owns its receiver and remembers which browse generation it
/// belongs to, so receivers replaced by a rescan can be told apart.
fn make_recv_future(
    category: ServiceCategory,
    generation: u64,
    rx: flume::Receiver<ServiceEvent>,
) -> RecvFuture {
    Box::pin(async move {
        let result = rx.recv_async().await;
        (category, generation, rx, result)
    })
}

/// Browse generations and the last resolved record of every instance.
#[derive(Default)]
struct BrowseState {
    generations: HashMap<ServiceCategory, u64>,
    resolved: HashMap<String, DiscoveryRecord>,
}

impl BrowseState {
    fn next_generation(&mut self, category: ServiceCategory) -> u64 {
        let generation = self.generations.entry(category).or_insert(0);
        *generation += 1;
        *generation
    }

    fn is_current(&self, category: ServiceCategory, generation: u64) -> bool {
        self.generations.get(&category) == Some(&generation)
    }

    /// Turn one browse event into the sighting to report, if any.
    ///
    /// Events from a browse replaced by a restart are dropped. A removal is
    /// reported as a deregistration of the record last resolved for that
    /// instance name.
    fn handle_event(
        &mut self,
        category: ServiceCategory,
        generation: u64,
        event: ServiceEvent,
    ) -> Option<DiscoveryRecord> {
        if !self.is_current(category, generation) {
            return None;
        }

        match event {
            ServiceEvent::ServiceResolved(info) => {
                let record = convert_service_info(category, &info)?;
                self.resolved.insert(info.get_fullname().to_string(), record.clone());
                Some(record)
            }
            ServiceEvent::ServiceRemoved(_typ, fullname) => {
                tracing::debug!("Service removed: {}", fullname);
                let mut record = self.resolved.remove(&fullname)?;
                record.exists = false;
                Some(record)
            }
            _ => None,
        }
    }
}

struct Browses {
    daemon: ServiceDaemon,
    state: BrowseState,
    futures: FuturesUnordered<RecvFuture>,
}

impl Browses {
    fn start(&mut self, category: ServiceCategory) {
        let Some(service_type) = category.mdns_service_type() else {
            return;
        };

        match self.daemon.browse(service_type) {
            Ok(receiver) => {
                let generation = self.state.next_generation(category);
                self.futures.push(make_recv_future(category, generation, receiver));
            }
            Err(e) => {
                tracing::error!("Failed to browse {}: {}", service_type, e);
            }
        }
    }

    /// Stop and re-issue the browse so the daemon sends fresh queries.
    fn restart(&mut self, category: ServiceCategory) {
        let Some(service_type) = category.mdns_service_type() else {
            return;
        };

        tracing::debug!("Restarting browse for {}", service_type);
        if let Err(e) = self.daemon.stop_browse(service_type) {
            tracing::warn!("Failed to stop browse for {}: {}", service_type, e);
        }
        self.start(category);
    }
}

/// Browse the announce-based categories and feed the aggregator.
///
/// A scan request for a category restarts its browse.
pub async fn run_browser(
    daemon: ServiceDaemon,
    aggregator: AggregatorHandle,
    mut scans: mpsc::Receiver<ServiceCategory>,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!("Starting mDNS browser");

    let mut browses = Browses {
        daemon,
        state: BrowseState::default(),
        futures: FuturesUnordered::new(),
    };
    for category in ServiceCategory::ALL {
        browses.start(category);
    }

    loop {
        tokio::select! {
            Some(category) = scans.recv() => {
                browses.restart(category);
            }

            Some((category, generation, rx, result)) = browses.futures.next() => {
                if !browses.state.is_current(category, generation) {
                    // Replaced by a restart; let the old receiver drain away
                    continue;
                }

                match result {
                    Ok(event) => {
                        if let Some(record) = browses.state.handle_event(category, generation, event) {
                            if let Err(e) = aggregator.sighting(record).await {
                                tracing::error!("Failed to send sighting: {}", e);
                            }
                        }
                        browses.futures.push(make_recv_future(category, generation, rx));
                    }
                    Err(e) => {
                        tracing::warn!("{} receiver disconnected: {}", category, e);
                    }
                }
            }

            _ = cancel.cancelled() => {
                tracing::info!("mDNS browser shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Convert a resolved mdns-sd ServiceInfo into a sighting. IPv4 is
/// preferred; the lowest address wins so repeated resolves agree.
fn convert_service_info(category: ServiceCategory, info: &ServiceInfo) -> Option<DiscoveryRecord> {
    let addresses = info.get_addresses();
    let address: IpAddr = addresses
        .iter()
        .filter(|addr| addr.is_ipv4())
        .min()
        .or_else(|| addresses.iter().min())
        .copied()?;

    let host_name = info
        .get_hostname()
        .trim_end_matches('.')
        .trim_end_matches(".local")
        .to_string();

    Some(DiscoveryRecord::new(
        category,
        address.to_string(),
        info.get_port(),
        host_name,
    ))
}
