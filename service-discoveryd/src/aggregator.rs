use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use anyhow::{anyhow, Result};
use shared::types::{DiscoveryRecord, ServiceCategory};
use crate::backend::{BackendContext, SightingSink};
use crate::fingerprint::compute_fingerprint;
use crate::scan::ScanTrigger;
use crate::self_filter::LocalAddresses;
use crate::store::CategoryStore;

const COMMAND_QUEUE_CAPACITY: usize = 256;
const CHANGE_QUEUE_CAPACITY: usize = 64;

pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send>;

/// Membership of one category changed. Carries the list after the change.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryChanged {
    pub category: ServiceCategory,
    pub services: Vec<DiscoveryRecord>,
}

/// Owns every category store and applies sightings to them.
///
/// Driven by exactly one worker thread, see [`AggregatorHandle::spawn`].
pub struct Aggregator {
    stores: BTreeMap<ServiceCategory, CategoryStore>,
    local: Box<dyn LocalAddresses>,
    scans: Box<dyn ScanTrigger>,
    pending_scans: VecDeque<ServiceCategory>,
    ttl_window: Duration,
    clock: Clock,
    changes: broadcast::Sender<CategoryChanged>,
    fingerprint_tx: watch::Sender<String>,
}

impl Aggregator {
    pub fn new(
        ttl_window: Duration,
        local: Box<dyn LocalAddresses>,
        scans: Box<dyn ScanTrigger>,
    ) -> Self {
        let stores = ServiceCategory::ALL
            .into_iter()
            .map(|category| (category, CategoryStore::new(category)))
            .collect();
        let (changes, _) = broadcast::channel(CHANGE_QUEUE_CAPACITY);
        let (fingerprint_tx, _) = watch::channel(compute_fingerprint(&[]));

        Self {
            stores,
            local,
            scans,
            pending_scans: VecDeque::new(),
            ttl_window,
            clock: Box::new(Utc::now),
            changes,
            fingerprint_tx,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn fingerprint(&self) -> watch::Receiver<String> {
        self.fingerprint_tx.subscribe()
    }

    /// Expire stale entries of `category`, clean up, queue a scan, and return
    /// what is known right now. Scan results arrive later as sightings.
    pub fn get_services(&mut self, category: ServiceCategory) -> Vec<DiscoveryRecord> {
        self.clean_up(category);
        if let Some(scan) = category.scan_category() {
            self.queue_scan(scan);
        }
        self.snapshot(category)
    }

    /// Sessions are announced, never polled, so this is a pure read.
    pub fn get_hyperhdr_sessions(&self) -> Vec<DiscoveryRecord> {
        self.snapshot(ServiceCategory::HyperHdrSession)
    }

    /// Every category's list, grouped by category.
    pub fn get_all_services(&self) -> Vec<DiscoveryRecord> {
        self.stores
            .values()
            .flat_map(|store| store.records().iter().cloned())
            .collect()
    }

    /// Clean up every category and queue one scan per scan trigger. The
    /// serial board categories share the single SerialPort trigger.
    pub fn request_services_scan(&mut self) {
        for category in ServiceCategory::ALL {
            self.clean_up(category);
        }
        for category in ServiceCategory::ALL {
            if category.scan_category() == Some(category) {
                self.queue_scan(category);
            }
        }
    }

    pub fn clean_up_all(&mut self) {
        for category in ServiceCategory::ALL {
            self.clean_up(category);
        }
    }

    pub fn on_sighting_event(&mut self, record: DiscoveryRecord) {
        let category = record.category;
        let now = (self.clock)();
        let Some(store) = self.stores.get_mut(&category) else {
            tracing::debug!("Ignoring sighting without a concrete category");
            return;
        };

        if store.merge(record, self.local.as_ref(), self.ttl_window, now).changed() {
            self.notify(category);
        }
    }

    pub fn on_scan_request(&mut self, category: ServiceCategory) {
        if category == ServiceCategory::Unknown {
            return;
        }
        self.scans.trigger(category);
    }

    /// Run scans queued by queries. Called after the query has been answered.
    pub fn run_pending_scans(&mut self) {
        while let Some(category) = self.pending_scans.pop_front() {
            self.on_scan_request(category);
        }
    }

    fn queue_scan(&mut self, category: ServiceCategory) {
        if !self.pending_scans.contains(&category) {
            self.pending_scans.push_back(category);
        }
    }

    fn clean_up(&mut self, category: ServiceCategory) {
        let now = (self.clock)();
        let removed = self
            .stores
            .get_mut(&category)
            .is_some_and(|store| store.clean_up(now));

        if removed {
            self.notify(category);
        }
    }

    fn snapshot(&self, category: ServiceCategory) -> Vec<DiscoveryRecord> {
        self.stores
            .get(&category)
            .map(CategoryStore::snapshot)
            .unwrap_or_default()
    }

    fn notify(&self, category: ServiceCategory) {
        // No subscribers is not an error
        let _ = self.changes.send(CategoryChanged {
            category,
            services: self.snapshot(category),
        });
        self.fingerprint_tx
            .send_replace(compute_fingerprint(&self.get_all_services()));
    }
}

/// Commands sent to the aggregator thread
pub enum AggregatorCommand {
    Sighting(DiscoveryRecord),
    ScanRequest(ServiceCategory),
    GetServices(ServiceCategory, oneshot::Sender<Vec<DiscoveryRecord>>),
    GetSessions(oneshot::Sender<Vec<DiscoveryRecord>>),
    GetAll(oneshot::Sender<Vec<DiscoveryRecord>>),
    RequestScan,
    CleanUpAll,
    Shutdown,
}

/// Feeds records from a backend's discovery pass back into the queue.
///
/// Holds a weak sender so the worker's own backends do not keep the
/// queue alive after every handle is gone.
struct QueueSink {
    tx: mpsc::WeakSender<AggregatorCommand>,
}

impl SightingSink for QueueSink {
    fn emit(&self, record: DiscoveryRecord) {
        let Some(tx) = self.tx.upgrade() else {
            return;
        };
        if let Err(e) = tx.try_send(AggregatorCommand::Sighting(record)) {
            tracing::warn!("Dropped backend sighting: {}", e);
        }
    }
}

/// Handle to the aggregator thread
#[derive(Clone)]
pub struct AggregatorHandle {
    tx: mpsc::Sender<AggregatorCommand>,
    changes: broadcast::Sender<CategoryChanged>,
    fingerprint_rx: watch::Receiver<String>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AggregatorHandle {
    /// Build the aggregator and start its worker thread.
    ///
    /// `build` receives the context backends use to push sightings back
    /// into the same queue.
    pub fn spawn<F>(build: F) -> Self
    where
        F: FnOnce(BackendContext) -> Aggregator,
    {
        let (tx, mut rx) = mpsc::channel::<AggregatorCommand>(COMMAND_QUEUE_CAPACITY);
        let context = BackendContext {
            sightings: Arc::new(QueueSink { tx: tx.downgrade() }),
        };

        let mut aggregator = build(context);
        let changes = aggregator.changes.clone();
        let fingerprint_rx = aggregator.fingerprint();

        let worker = thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    AggregatorCommand::Sighting(record) => {
                        aggregator.on_sighting_event(record);
                    }
                    AggregatorCommand::ScanRequest(category) => {
                        aggregator.on_scan_request(category);
                    }
                    AggregatorCommand::GetServices(category, reply) => {
                        let _ = reply.send(aggregator.get_services(category));
                    }
                    AggregatorCommand::GetSessions(reply) => {
                        let _ = reply.send(aggregator.get_hyperhdr_sessions());
                    }
                    AggregatorCommand::GetAll(reply) => {
                        let _ = reply.send(aggregator.get_all_services());
                    }
                    AggregatorCommand::RequestScan => {
                        aggregator.request_services_scan();
                    }
                    AggregatorCommand::CleanUpAll => {
                        aggregator.clean_up_all();
                    }
                    AggregatorCommand::Shutdown => {
                        tracing::info!("Aggregator thread shutting down");
                        break;
                    }
                }
                aggregator.run_pending_scans();
            }
            // Closes the scan backends
            drop(aggregator);
        });

        Self {
            tx,
            changes,
            fingerprint_rx,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Report one sighting or deregistration
    pub async fn sighting(&self, record: DiscoveryRecord) -> Result<()> {
        self.tx.send(AggregatorCommand::Sighting(record)).await?;
        Ok(())
    }

    /// Ask for an active scan of one category
    pub async fn scan_request(&self, category: ServiceCategory) -> Result<()> {
        self.tx.send(AggregatorCommand::ScanRequest(category)).await?;
        Ok(())
    }

    /// Current list of one category; also cleans it up and triggers a scan
    pub async fn get_services(&self, category: ServiceCategory) -> Result<Vec<DiscoveryRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(AggregatorCommand::GetServices(category, reply)).await?;
        Ok(rx.await?)
    }

    pub async fn get_hyperhdr_sessions(&self) -> Result<Vec<DiscoveryRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(AggregatorCommand::GetSessions(reply)).await?;
        Ok(rx.await?)
    }

    pub async fn get_all_services(&self) -> Result<Vec<DiscoveryRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(AggregatorCommand::GetAll(reply)).await?;
        Ok(rx.await?)
    }

    pub async fn request_services_scan(&self) -> Result<()> {
        self.tx.send(AggregatorCommand::RequestScan).await?;
        Ok(())
    }

    pub async fn clean_up_all(&self) -> Result<()> {
        self.tx.send(AggregatorCommand::CleanUpAll).await?;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CategoryChanged> {
        self.changes.subscribe()
    }

    pub fn fingerprint(&self) -> String {
        self.fingerprint_rx.borrow().clone()
    }

    /// Stop the worker and wait for it to exit. Backends it owns are closed
    /// before this returns. Later calls from other clones return at once.
    pub async fn shutdown(&self) -> Result<()> {
        let worker = self
            .worker
            .lock()
            .map_err(|_| anyhow!("Aggregator worker handle poisoned"))?
            .take();
        let Some(worker) = worker else {
            return Ok(());
        };

        self.tx.send(AggregatorCommand::Shutdown).await?;
        tokio::task::spawn_blocking(move || worker.join())
            .await?
            .map_err(|_| anyhow!("Aggregator thread panicked"))?;
        Ok(())
    }
}

/// Periodically expire entries nobody has asked about
pub async fn run_maintenance(
    aggregator: AggregatorHandle,
    interval_secs: u64,
    cancel: CancellationToken,
) -> Result<()> {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = aggregator.clean_up_all().await {
                    tracing::error!("Failed to run maintenance: {}", e);
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Maintenance task shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::self_filter::tests::FixedAddresses;

    #[derive(Clone, Default)]
    struct RecordingScans(Arc<Mutex<Vec<ServiceCategory>>>);

    impl ScanTrigger for RecordingScans {
        fn trigger(&mut self, category: ServiceCategory) {
            self.0.lock().unwrap().push(category);
        }
    }

    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Utc::now())))
        }

        fn advance(&self, secs: i64) {
            *self.0.lock().unwrap() += Duration::seconds(secs);
        }

        fn as_clock(&self) -> Clock {
            let inner = self.0.clone();
            Box::new(move || *inner.lock().unwrap())
        }
    }

    struct Fixture {
        aggregator: Aggregator,
        scans: RecordingScans,
        clock: ManualClock,
        changes: broadcast::Receiver<CategoryChanged>,
    }

    fn fixture() -> Fixture {
        let scans = RecordingScans::default();
        let clock = ManualClock::new();
        let local = FixedAddresses(vec!["192.168.1.10".parse().unwrap()]);
        let aggregator = Aggregator::new(Duration::seconds(30), Box::new(local), Box::new(scans.clone()))
            .with_clock(clock.as_clock());
        let changes = aggregator.changes.subscribe();

        Fixture {
            aggregator,
            scans,
            clock,
            changes,
        }
    }

    fn drain(changes: &mut broadcast::Receiver<CategoryChanged>) -> Vec<CategoryChanged> {
        let mut received = Vec::new();
        while let Ok(change) = changes.try_recv() {
            received.push(change);
        }
        received
    }

    fn sighting(category: ServiceCategory, address: &str, port: u16) -> DiscoveryRecord {
        DiscoveryRecord::new(category, address, port, "device")
    }

    #[test]
    fn test_new_sighting_notifies_once() {
        let mut f = fixture();
        let record = sighting(ServiceCategory::Wled, "10.0.0.5", 80);

        f.aggregator.on_sighting_event(record.clone());

        let changes = drain(&mut f.changes);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].category, ServiceCategory::Wled);
        assert_eq!(changes[0].services, vec![record.clone()]);
        assert_eq!(f.aggregator.get_all_services(), vec![record]);
    }

    #[test]
    fn test_repeated_sighting_is_silent() {
        let mut f = fixture();
        f.aggregator.on_sighting_event(sighting(ServiceCategory::Wled, "10.0.0.5", 80));
        drain(&mut f.changes);

        f.clock.advance(10);
        f.aggregator.on_sighting_event(sighting(ServiceCategory::Wled, "10.0.0.5", 80));

        assert!(drain(&mut f.changes).is_empty());
        let all = f.aggregator.get_all_services();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].expiry, *f.clock.0.lock().unwrap() + Duration::seconds(30));
    }

    #[test]
    fn test_deregistration_notifies_with_empty_list() {
        let mut f = fixture();
        f.aggregator.on_sighting_event(sighting(ServiceCategory::Wled, "10.0.0.5", 80));
        drain(&mut f.changes);

        f.aggregator.on_sighting_event(DiscoveryRecord::deregistration(
            ServiceCategory::Wled,
            "10.0.0.5",
            80,
            "device",
        ));

        let changes = drain(&mut f.changes);
        assert_eq!(changes.len(), 1);
        assert!(changes[0].services.is_empty());
        assert!(f.aggregator.get_all_services().is_empty());
    }

    #[test]
    fn test_unmatched_deregistration_is_silent() {
        let mut f = fixture();

        f.aggregator.on_sighting_event(DiscoveryRecord::deregistration(
            ServiceCategory::Wled,
            "10.0.0.5",
            80,
            "device",
        ));

        assert!(drain(&mut f.changes).is_empty());
    }

    #[test]
    fn test_self_sighting_is_dropped() {
        let mut f = fixture();

        for category in ServiceCategory::ALL {
            f.aggregator.on_sighting_event(sighting(category, "192.168.1.10", 8090));
        }

        assert!(drain(&mut f.changes).is_empty());
        assert!(f.aggregator.get_all_services().is_empty());
    }

    #[test]
    fn test_unknown_category_is_ignored() {
        let mut f = fixture();

        f.aggregator.on_sighting_event(sighting(ServiceCategory::Unknown, "10.0.0.5", 80));
        f.aggregator.on_scan_request(ServiceCategory::Unknown);

        assert!(drain(&mut f.changes).is_empty());
        assert!(f.aggregator.get_all_services().is_empty());
        assert!(f.scans.0.lock().unwrap().is_empty());
        assert!(f.aggregator.get_services(ServiceCategory::Unknown).is_empty());
    }

    #[test]
    fn test_expiry_notifies_once_for_many_entries() {
        let mut f = fixture();
        f.aggregator.on_sighting_event(sighting(ServiceCategory::Wled, "10.0.0.5", 80));
        f.aggregator.on_sighting_event(sighting(ServiceCategory::Wled, "10.0.0.6", 80));
        f.aggregator.on_sighting_event(sighting(ServiceCategory::PhilipsHue, "10.0.0.7", 443));
        drain(&mut f.changes);

        f.clock.advance(31);
        let services = f.aggregator.get_services(ServiceCategory::Wled);

        assert!(services.is_empty());
        let changes = drain(&mut f.changes);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].category, ServiceCategory::Wled);
        assert!(changes[0].services.is_empty());
        // Other categories are only cleaned when asked for
        assert_eq!(f.aggregator.get_all_services().len(), 1);
    }

    #[test]
    fn test_no_notification_when_nothing_expired() {
        let mut f = fixture();
        f.aggregator.on_sighting_event(sighting(ServiceCategory::Wled, "10.0.0.5", 80));
        drain(&mut f.changes);

        f.clock.advance(30);
        assert_eq!(f.aggregator.get_services(ServiceCategory::Wled).len(), 1);
        assert!(drain(&mut f.changes).is_empty());
    }

    #[test]
    fn test_get_services_scans_after_reply() {
        let mut f = fixture();

        f.aggregator.get_services(ServiceCategory::Wled);
        assert!(f.scans.0.lock().unwrap().is_empty());

        f.aggregator.run_pending_scans();
        assert_eq!(*f.scans.0.lock().unwrap(), vec![ServiceCategory::Wled]);
    }

    #[test]
    fn test_serial_board_queries_use_serial_trigger() {
        let mut f = fixture();

        f.aggregator.get_services(ServiceCategory::Pico);
        f.aggregator.run_pending_scans();

        assert_eq!(*f.scans.0.lock().unwrap(), vec![ServiceCategory::SerialPort]);
    }

    #[test]
    fn test_sessions_read_never_scans() {
        let mut f = fixture();
        f.aggregator
            .on_sighting_event(sighting(ServiceCategory::HyperHdrSession, "10.0.0.9", 8090));

        assert_eq!(f.aggregator.get_hyperhdr_sessions().len(), 1);
        f.aggregator.run_pending_scans();
        assert!(f.scans.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_request_services_scan_triggers_each_scannable_category_once() {
        let mut f = fixture();
        f.aggregator.on_sighting_event(sighting(ServiceCategory::Esp, "/dev/ttyUSB0", 0));
        f.aggregator.on_sighting_event(sighting(ServiceCategory::Pico, "/dev/ttyACM0", 0));
        drain(&mut f.changes);
        f.clock.advance(31);

        f.aggregator.request_services_scan();
        f.aggregator.run_pending_scans();

        assert_eq!(
            *f.scans.0.lock().unwrap(),
            vec![
                ServiceCategory::HyperHdrSession,
                ServiceCategory::Wled,
                ServiceCategory::PhilipsHue,
                ServiceCategory::SerialPort,
            ]
        );
        let changes: Vec<_> = drain(&mut f.changes).into_iter().map(|c| c.category).collect();
        assert_eq!(changes, vec![ServiceCategory::Pico, ServiceCategory::Esp]);
    }

    #[test]
    fn test_get_all_services_grouped_by_category() {
        let mut f = fixture();
        f.aggregator.on_sighting_event(sighting(ServiceCategory::PhilipsHue, "10.0.0.7", 443));
        f.aggregator.on_sighting_event(sighting(ServiceCategory::Wled, "10.0.0.5", 80));
        f.aggregator
            .on_sighting_event(sighting(ServiceCategory::HyperHdrSession, "10.0.0.9", 8090));

        let categories: Vec<_> = f
            .aggregator
            .get_all_services()
            .into_iter()
            .map(|r| r.category)
            .collect();

        assert_eq!(
            categories,
            vec![
                ServiceCategory::HyperHdrSession,
                ServiceCategory::Wled,
                ServiceCategory::PhilipsHue,
            ]
        );
    }

    #[test]
    fn test_fingerprint_tracks_membership() {
        let mut f = fixture();
        let fingerprint = f.aggregator.fingerprint();
        let empty = fingerprint.borrow().clone();

        f.aggregator.on_sighting_event(sighting(ServiceCategory::Wled, "10.0.0.5", 80));
        let one = fingerprint.borrow().clone();
        assert_ne!(empty, one);

        f.aggregator.on_sighting_event(DiscoveryRecord::deregistration(
            ServiceCategory::Wled,
            "10.0.0.5",
            80,
            "",
        ));
        assert_eq!(*fingerprint.borrow(), empty);
    }

    /// Emits one board per serial scan through the backend context
    struct EmittingScans(BackendContext);

    impl ScanTrigger for EmittingScans {
        fn trigger(&mut self, category: ServiceCategory) {
            if category == ServiceCategory::SerialPort {
                self.0.sightings.emit(DiscoveryRecord::new(
                    ServiceCategory::Pico,
                    "/dev/ttyACM0",
                    0,
                    "Pico",
                ));
            }
        }
    }

    fn spawn_handle() -> AggregatorHandle {
        AggregatorHandle::spawn(|context| {
            Aggregator::new(
                Duration::seconds(30),
                Box::new(FixedAddresses(Vec::new())),
                Box::new(EmittingScans(context)),
            )
        })
    }

    #[tokio::test]
    async fn test_handle_applies_sightings_in_order() {
        let handle = spawn_handle();
        let mut changes = handle.subscribe();

        handle.sighting(sighting(ServiceCategory::Wled, "10.0.0.5", 80)).await.unwrap();
        handle.sighting(sighting(ServiceCategory::Wled, "10.0.0.5", 80)).await.unwrap();
        handle
            .sighting(DiscoveryRecord::deregistration(ServiceCategory::Wled, "10.0.0.5", 80, ""))
            .await
            .unwrap();

        assert!(handle.get_all_services().await.unwrap().is_empty());
        assert_eq!(changes.recv().await.unwrap().services.len(), 1);
        assert_eq!(changes.recv().await.unwrap().services.len(), 0);
        assert!(changes.try_recv().is_err());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_serial_scan_results_arrive_as_sightings() {
        let handle = spawn_handle();
        let mut changes = handle.subscribe();

        // Stale read first, the scan runs after the reply
        assert!(handle.get_services(ServiceCategory::Pico).await.unwrap().is_empty());

        let change = changes.recv().await.unwrap();
        assert_eq!(change.category, ServiceCategory::Pico);
        assert_eq!(handle.get_services(ServiceCategory::Pico).await.unwrap().len(), 1);
        assert_ne!(handle.fingerprint(), compute_fingerprint(&[]));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_fails_after_shutdown() {
        let handle = spawn_handle();
        handle.shutdown().await.unwrap();

        // The worker has exited and dropped its receiver
        assert!(handle.get_all_services().await.is_err());
        // A second shutdown from another clone is a no-op
        handle.clone().shutdown().await.unwrap();
    }

    /// Slow serial scan that records when it is dropped
    struct SlowScans(Arc<AtomicBool>);

    impl ScanTrigger for SlowScans {
        fn trigger(&mut self, _category: ServiceCategory) {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }

    impl Drop for SlowScans {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_scans_to_close() {
        let closed = Arc::new(AtomicBool::new(false));
        let flag = closed.clone();
        let handle = AggregatorHandle::spawn(move |_| {
            Aggregator::new(
                Duration::seconds(30),
                Box::new(FixedAddresses(Vec::new())),
                Box::new(SlowScans(flag)),
            )
        });

        handle.scan_request(ServiceCategory::SerialPort).await.unwrap();
        handle.shutdown().await.unwrap();

        assert!(closed.load(Ordering::SeqCst));
    }
}
