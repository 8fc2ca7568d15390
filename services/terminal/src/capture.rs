//! File-backed audio capture.
//!
//! Terminals have no microphone access, so "recording" reads a prepared webm
//! file: opening checks the file is there, finishing returns its bytes.

use leadchat_core::recorder::{AudioCapture, DeviceError};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FileCapture {
    path: PathBuf,
    open: bool,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            open: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AudioCapture for FileCapture {
    fn open(&mut self) -> Result<(), DeviceError> {
        let metadata = std::fs::metadata(&self.path).map_err(device_error)?;
        if !metadata.is_file() {
            return Err(DeviceError::Other(format!(
                "{} is not a file",
                self.path.display()
            )));
        }
        debug!(path = %self.path.display(), "Audio file opened");
        self.open = true;
        Ok(())
    }

    fn finish(&mut self) -> Result<Vec<u8>, DeviceError> {
        if !self.open {
            return Err(DeviceError::Other("capture is not open".to_string()));
        }
        self.open = false;
        std::fs::read(&self.path).map_err(device_error)
    }

    fn release(&mut self) {
        self.open = false;
    }
}

fn device_error(err: io::Error) -> DeviceError {
    match err.kind() {
        io::ErrorKind::NotFound => DeviceError::NotFound,
        io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied,
        _ => DeviceError::Other(err.to_string()),
    }
}
