//! Device backends that can be asked to enumerate hardware.
//!
//! A backend is selected by the `type` key of its config object and built
//! through [`BackendRegistry`]. Each kind owns a config struct that rejects
//! unknown fields and fills defaults, so a bad config fails at construction.

pub mod adalight;
pub mod file;

use std::collections::HashMap;
use std::sync::Arc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use shared::types::DiscoveryRecord;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend config has no \"type\" field")]
    MissingKind,

    #[error("Unknown backend type: {0}")]
    UnknownKind(String),

    #[error("Invalid {kind} config: {source}")]
    InvalidConfig {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} backend has no output configured")]
    NotConfigured(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Receiver for records produced by a backend's own discovery pass.
pub trait SightingSink: Send + Sync {
    fn emit(&self, record: DiscoveryRecord);
}

/// What a backend constructor may capture from its owner.
#[derive(Clone)]
pub struct BackendContext {
    pub sightings: Arc<dyn SightingSink>,
}

pub trait DeviceBackend: Send {
    fn kind(&self) -> &'static str;

    fn open(&mut self) -> Result<(), BackendError>;

    fn close(&mut self) -> Result<(), BackendError>;

    /// Enumerate attached devices. May block on device I/O.
    fn discover(&mut self, params: &Value) -> Result<Value, BackendError>;

    fn is_ready(&self) -> bool;
}

type Constructor = fn(Value, &BackendContext) -> Result<Box<dyn DeviceBackend>, BackendError>;

pub struct BackendRegistry {
    constructors: HashMap<&'static str, Constructor>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register(adalight::KIND, adalight::construct);
        registry.register(file::KIND, file::construct);
        registry
    }
}

impl BackendRegistry {
    pub fn register(&mut self, kind: &'static str, constructor: Constructor) {
        self.constructors.insert(kind, constructor);
    }

    /// Build the backend named by `config["type"]`.
    pub fn construct(
        &self,
        config: &Value,
        context: &BackendContext,
    ) -> Result<Box<dyn DeviceBackend>, BackendError> {
        let kind = config
            .get("type")
            .and_then(Value::as_str)
            .ok_or(BackendError::MissingKind)?;

        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| BackendError::UnknownKind(kind.to_string()))?;

        let mut options = config.clone();
        if let Some(map) = options.as_object_mut() {
            map.remove("type");
        }

        constructor(options, context)
    }
}

/// Deserialize a kind's options, mapping failures to [`BackendError::InvalidConfig`].
pub(crate) fn parse_options<T: DeserializeOwned>(
    kind: &'static str,
    options: Value,
) -> Result<T, BackendError> {
    serde_json::from_value(options).map_err(|source| BackendError::InvalidConfig { kind, source })
}
