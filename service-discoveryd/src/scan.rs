use serde_json::{json, Value};
use tokio::sync::mpsc;
use shared::types::ServiceCategory;
use crate::backend::{BackendContext, BackendRegistry, DeviceBackend};

/// Starts an active discovery pass for one category. Results come back
/// later as ordinary sightings.
pub trait ScanTrigger: Send {
    fn trigger(&mut self, category: ServiceCategory);
}

/// Routes scan requests to the collaborator that owns each category.
///
/// Announce-based categories go to the mDNS browser task. SerialPort scans
/// run the serial backend, built on first use and kept until the dispatcher
/// is dropped. A backend that fails to build is not tried again. Serial enumeration blocks the calling thread for the
/// duration of one sysfs or registry walk.
pub struct ScanDispatcher {
    browser_tx: mpsc::Sender<ServiceCategory>,
    registry: BackendRegistry,
    serial_config: Value,
    context: BackendContext,
    serial: Option<Box<dyn DeviceBackend>>,
    serial_failed: bool,
}

impl ScanDispatcher {
    pub fn new(
        browser_tx: mpsc::Sender<ServiceCategory>,
        registry: BackendRegistry,
        serial_config: Value,
        context: BackendContext,
    ) -> Self {
        Self {
            browser_tx,
            registry,
            serial_config,
            context,
            serial: None,
            serial_failed: false,
        }
    }

    fn scan_serial(&mut self) {
        if self.serial_failed {
            tracing::debug!("Skipping serial scan, backend unavailable");
            return;
        }

        if self.serial.is_none() {
            match self.registry.construct(&self.serial_config, &self.context) {
                Ok(backend) => {
                    tracing::info!("Constructed {} backend for serial discovery", backend.kind());
                    self.serial = Some(backend);
                }
                Err(e) => {
                    tracing::error!("Failed to construct serial backend: {}", e);
                    self.serial_failed = true;
                    return;
                }
            }
        }

        if let Some(backend) = self.serial.as_mut() {
            if let Err(e) = backend.discover(&json!({})) {
                tracing::error!("Serial discovery failed: {}", e);
            }
        }
    }

    fn scan_mdns(&self, category: ServiceCategory) {
        if let Err(e) = self.browser_tx.try_send(category) {
            tracing::warn!("Failed to request {} scan: {}", category, e);
        }
    }
}

impl ScanTrigger for ScanDispatcher {
    fn trigger(&mut self, category: ServiceCategory) {
        tracing::debug!("Scan requested for {}", category);
        match category {
            ServiceCategory::SerialPort => self.scan_serial(),
            ServiceCategory::HyperHdrSession
            | ServiceCategory::Wled
            | ServiceCategory::PhilipsHue => self.scan_mdns(category),
            // Serial boards are only reachable through the SerialPort trigger
            ServiceCategory::Pico
            | ServiceCategory::Esp32S2
            | ServiceCategory::Esp
            | ServiceCategory::Unknown => {}
        }
    }
}

impl Drop for ScanDispatcher {
    fn drop(&mut self) {
        if let Some(mut backend) = self.serial.take() {
            if let Err(e) = backend.close() {
                tracing::error!("Failed to close {} backend: {}", backend.kind(), e);
            }
        }
    }
}
