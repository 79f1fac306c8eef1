/// mDNS service types for announce-based categories
pub const HYPERHDR_SERVICE_TYPE: &str = "_hyperhdr-http._tcp.local.";
pub const WLED_SERVICE_TYPE: &str = "_wled._tcp.local.";
pub const HUE_SERVICE_TYPE: &str = "_hue._tcp.local.";

/// TXT record key carrying the HyperHDR instance version
pub const TXT_VERSION: &str = "version";

/// USB vendor ids used to classify serial boards
pub const VID_RASPBERRY_PI: u16 = 0x2e8a;
pub const VID_ESPRESSIF: u16 = 0x303a;
pub const VID_WCH_CH340: u16 = 0x1a86;
pub const VID_SILABS_CP210X: u16 = 0x10c4;
pub const VID_FTDI: u16 = 0x0403;

/// Liveness window applied when no configured value is available
pub const DEFAULT_TTL_WINDOW_SECS: u64 = 120;

/// API path prefix
pub const API_PREFIX: &str = "/v1";
