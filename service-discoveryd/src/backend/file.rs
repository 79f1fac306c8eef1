use std::fs::File;
use std::path::PathBuf;
use serde::Deserialize;
use serde_json::{json, Value};
use super::{parse_options, BackendContext, BackendError, DeviceBackend};

pub const KIND: &str = "file";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

fn default_output() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("NUL")
    } else {
        PathBuf::from("/dev/null")
    }
}

/// Writes frames to a plain file. Has nothing to discover.
pub struct FileBackend {
    config: FileConfig,
    file: Option<File>,
}

pub fn construct(options: Value, _context: &BackendContext) -> Result<Box<dyn DeviceBackend>, BackendError> {
    let config: FileConfig = parse_options(KIND, options)?;
    tracing::debug!("Output filename: {}", config.output.display());
    Ok(Box::new(FileBackend { config, file: None }))
}

impl DeviceBackend for FileBackend {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn open(&mut self) -> Result<(), BackendError> {
        if self.file.is_none() {
            self.file = Some(File::create(&self.config.output)?);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.file = None;
        Ok(())
    }

    fn discover(&mut self, _params: &Value) -> Result<Value, BackendError> {
        Ok(json!({ "devices": [] }))
    }

    fn is_ready(&self) -> bool {
        self.file.is_some()
    }
}
