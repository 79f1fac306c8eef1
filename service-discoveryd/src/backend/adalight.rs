use std::sync::Arc;
use std::time::Duration;
use serde::Deserialize;
use serde_json::{json, Value};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use shared::protocol::{
    VID_ESPRESSIF, VID_FTDI, VID_RASPBERRY_PI, VID_SILABS_CP210X, VID_WCH_CH340,
};
use shared::types::{DiscoveryRecord, ServiceCategory};
use super::{parse_options, BackendContext, BackendError, DeviceBackend, SightingSink};

pub const KIND: &str = "adalight";

const OPEN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdalightConfig {
    /// Device path, e.g. "/dev/ttyACM0". Only needed to open the port.
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Report USB serial ports that match no known board
    #[serde(default = "default_include_unrecognized")]
    pub include_unrecognized: bool,
}

fn default_baud_rate() -> u32 {
    2_000_000
}

fn default_include_unrecognized() -> bool {
    true
}

type Enumerator = fn() -> serialport::Result<Vec<SerialPortInfo>>;

/// Serial LED controller backend. Discovery enumerates attached boards and
/// reports each one as a sighting.
pub struct AdalightBackend {
    config: AdalightConfig,
    sightings: Arc<dyn SightingSink>,
    enumerate: Enumerator,
    port: Option<Box<dyn SerialPort>>,
}

pub fn construct(options: Value, context: &BackendContext) -> Result<Box<dyn DeviceBackend>, BackendError> {
    let config: AdalightConfig = parse_options(KIND, options)?;
    Ok(Box::new(AdalightBackend::new(config, context.sightings.clone())))
}

impl AdalightBackend {
    pub fn new(config: AdalightConfig, sightings: Arc<dyn SightingSink>) -> Self {
        Self {
            config,
            sightings,
            enumerate: serialport::available_ports,
            port: None,
        }
    }
}

impl DeviceBackend for AdalightBackend {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn open(&mut self) -> Result<(), BackendError> {
        let path = self.config.output.as_deref().ok_or(BackendError::NotConfigured(KIND))?;

        tracing::debug!("Opening {} at {} baud", path, self.config.baud_rate);
        let port = serialport::new(path, self.config.baud_rate)
            .timeout(OPEN_TIMEOUT)
            .open()?;
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if let Some(port) = self.port.take() {
            tracing::debug!("Closing {}", port.name().unwrap_or_default());
        }
        Ok(())
    }

    fn discover(&mut self, _params: &Value) -> Result<Value, BackendError> {
        let ports = (self.enumerate)()?;
        let mut devices = Vec::new();

        for info in &ports {
            let SerialPortType::UsbPort(usb) = &info.port_type else {
                continue;
            };

            let category = classify(usb.vid);
            if category == ServiceCategory::SerialPort && !self.config.include_unrecognized {
                continue;
            }

            let host_name = usb
                .product
                .clone()
                .or_else(|| usb.manufacturer.clone())
                .unwrap_or_default();

            devices.push(json!({
                "port": info.port_name,
                "vid": format!("{:04x}", usb.vid),
                "pid": format!("{:04x}", usb.pid),
                "manufacturer": usb.manufacturer,
                "category": category,
            }));

            self.sightings
                .emit(DiscoveryRecord::new(category, info.port_name.clone(), 0, host_name));
        }

        tracing::debug!("Serial enumeration found {} device(s)", devices.len());
        Ok(json!({ "devices": devices }))
    }

    fn is_ready(&self) -> bool {
        self.port.is_some()
    }
}

/// Map a USB vendor id to the board family it ships on.
pub fn classify(vid: u16) -> ServiceCategory {
    match vid {
        VID_RASPBERRY_PI => ServiceCategory::Pico,
        VID_ESPRESSIF => ServiceCategory::Esp32S2,
        VID_WCH_CH340 | VID_SILABS_CP210X | VID_FTDI => ServiceCategory::Esp,
        _ => ServiceCategory::SerialPort,
    }
}
