//! Voice recording state machine.
//!
//! `Idle -> Recording -> Processing -> Idle`, with `Recording -> Idle` on
//! cancel. The capture device behind [`AudioCapture`] is owned exclusively by
//! one [`AudioRecorder`] and is released on stop, cancel or drop.

use crate::message::AudioAttachment;
use base64::Engine;
use std::fmt;
use tracing::{debug, warn};

/// Container format of every recording.
pub const AUDIO_FORMAT: &str = "webm";
pub const AUDIO_MIME: &str = "audio/webm";
/// Recording is cut off automatically after this many seconds.
pub const DEFAULT_MAX_RECORDING_SECS: u32 = 120;

/// Categorized failure to access or read the microphone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("Microphone permission denied")]
    PermissionDenied,
    #[error("No microphone found")]
    NotFound,
    #[error("Microphone error: {0}")]
    Other(String),
}

impl DeviceError {
    /// The transient notification shown to the lead.
    pub fn user_message(&self) -> &'static str {
        match self {
            DeviceError::PermissionDenied => {
                "Permissão de microfone negada. Por favor, permita o acesso ao microfone."
            }
            DeviceError::NotFound => "Nenhum microfone encontrado. Verifique seu dispositivo.",
            DeviceError::Other(_) => "Erro ao acessar o microfone. Tente novamente.",
        }
    }
}

/// A microphone-like source that yields encoded webm bytes.
pub trait AudioCapture: Send {
    /// Acquires the device and starts capturing.
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Stops capturing, releases the device and returns the encoded recording.
    fn finish(&mut self) -> Result<Vec<u8>, DeviceError>;

    /// Releases the device and discards anything captured so far.
    fn release(&mut self);
}

/// Capture for hosts without a microphone. Every `open` fails with `NotFound`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMicrophone;

impl AudioCapture for NoMicrophone {
    fn open(&mut self) -> Result<(), DeviceError> {
        Err(DeviceError::NotFound)
    }

    fn finish(&mut self) -> Result<Vec<u8>, DeviceError> {
        Err(DeviceError::NotFound)
    }

    fn release(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
    Processing,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "idle"),
            RecordingState::Recording => write!(f, "recording"),
            RecordingState::Processing => write!(f, "processing"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecorderError {
    #[error("A recording is already {0}")]
    Busy(RecordingState),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Outcome of a one-second recording tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingTick {
    /// Nothing is being recorded.
    Ignored,
    Elapsed(u32),
    /// The maximum duration was reached; the caller must stop now.
    LimitReached(u32),
}

/// A finished recording ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub duration_secs: u32,
}

impl AudioPayload {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    pub fn attachment(&self) -> AudioAttachment {
        AudioAttachment {
            payload: self.to_base64(),
            duration_secs: self.duration_secs,
        }
    }
}

pub struct AudioRecorder {
    capture: Box<dyn AudioCapture>,
    state: RecordingState,
    elapsed_secs: u32,
    max_secs: u32,
}

impl fmt::Debug for AudioRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioRecorder")
            .field("state", &self.state)
            .field("elapsed_secs", &self.elapsed_secs)
            .field("max_secs", &self.max_secs)
            .finish_non_exhaustive()
    }
}

impl AudioRecorder {
    pub fn new(capture: Box<dyn AudioCapture>, max_secs: u32) -> Self {
        Self {
            capture,
            state: RecordingState::Idle,
            elapsed_secs: 0,
            max_secs: max_secs.max(1),
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    pub fn max_secs(&self) -> u32 {
        self.max_secs
    }

    /// Opens the capture device. On failure the recorder stays idle.
    pub fn start(&mut self) -> Result<(), RecorderError> {
        if self.state != RecordingState::Idle {
            return Err(RecorderError::Busy(self.state));
        }
        if let Err(e) = self.capture.open() {
            warn!(error = %e, "Failed to start recording");
            self.capture.release();
            return Err(e.into());
        }
        self.elapsed_secs = 0;
        self.state = RecordingState::Recording;
        debug!(max_secs = self.max_secs, "Recording started");
        Ok(())
    }

    /// Advances the elapsed counter by one second.
    pub fn tick(&mut self) -> RecordingTick {
        if self.state != RecordingState::Recording {
            return RecordingTick::Ignored;
        }
        self.elapsed_secs += 1;
        if self.elapsed_secs >= self.max_secs {
            RecordingTick::LimitReached(self.elapsed_secs)
        } else {
            RecordingTick::Elapsed(self.elapsed_secs)
        }
    }

    /// Finalizes the recording and releases the device.
    ///
    /// Returns `Ok(None)` when nothing is being recorded.
    pub fn stop(&mut self) -> Result<Option<AudioPayload>, DeviceError> {
        if self.state != RecordingState::Recording {
            return Ok(None);
        }
        self.state = RecordingState::Processing;
        let duration_secs = self.elapsed_secs;
        let result = self.capture.finish();
        self.state = RecordingState::Idle;
        self.elapsed_secs = 0;

        match result {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), duration_secs, "Recording finished");
                Ok(Some(AudioPayload {
                    bytes,
                    duration_secs,
                }))
            }
            Err(e) => {
                warn!(error = %e, "Failed to finalize recording");
                self.capture.release();
                Err(e)
            }
        }
    }

    /// Releases the device and discards the recording.
    pub fn cancel(&mut self) {
        if self.state == RecordingState::Recording {
            self.capture.release();
            debug!(elapsed_secs = self.elapsed_secs, "Recording cancelled");
        }
        self.state = RecordingState::Idle;
        self.elapsed_secs = 0;
    }
}

impl Drop for AudioRecorder {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Formats a recording timer as `MM:SS`.
pub fn format_duration(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// What the fake device has been asked to do, shared with the test.
    #[derive(Debug, Default)]
    pub(crate) struct DeviceLog {
        pub opened: u32,
        pub finished: u32,
        pub released: u32,
    }

    pub(crate) struct FakeCapture {
        pub log: Arc<Mutex<DeviceLog>>,
        pub open_error: Option<DeviceError>,
        pub bytes: Vec<u8>,
    }

    impl FakeCapture {
        pub(crate) fn new(bytes: &[u8]) -> (Self, Arc<Mutex<DeviceLog>>) {
            let log = Arc::new(Mutex::new(DeviceLog::default()));
            (
                Self {
                    log: log.clone(),
                    open_error: None,
                    bytes: bytes.to_vec(),
                },
                log,
            )
        }

        pub(crate) fn failing(error: DeviceError) -> (Self, Arc<Mutex<DeviceLog>>) {
            let (mut capture, log) = Self::new(&[]);
            capture.open_error = Some(error);
            (capture, log)
        }
    }

    impl AudioCapture for FakeCapture {
        fn open(&mut self) -> Result<(), DeviceError> {
            self.log.lock().unwrap().opened += 1;
            match &self.open_error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }

        fn finish(&mut self) -> Result<Vec<u8>, DeviceError> {
            self.log.lock().unwrap().finished += 1;
            Ok(self.bytes.clone())
        }

        fn release(&mut self) {
            self.log.lock().unwrap().released += 1;
        }
    }

    #[test]
    fn test_stop_while_idle_returns_none() {
        let (capture, log) = FakeCapture::new(b"webm");
        let mut recorder = AudioRecorder::new(Box::new(capture), 120);
        assert_eq!(recorder.stop().unwrap(), None);
        assert_eq!(recorder.state(), RecordingState::Idle);
        assert_eq!(log.lock().unwrap().finished, 0);
    }

    #[test]
    fn test_full_cycle_produces_payload() {
        let (capture, log) = FakeCapture::new(b"webm-bytes");
        let mut recorder = AudioRecorder::new(Box::new(capture), 120);

        recorder.start().unwrap();
        assert_eq!(recorder.state(), RecordingState::Recording);
        assert_eq!(recorder.tick(), RecordingTick::Elapsed(1));
        assert_eq!(recorder.tick(), RecordingTick::Elapsed(2));

        let payload = recorder.stop().unwrap().expect("payload");
        assert_eq!(payload.bytes, b"webm-bytes");
        assert_eq!(payload.duration_secs, 2);
        assert_eq!(payload.to_base64(), "d2VibS1ieXRlcw==");
        assert_eq!(recorder.state(), RecordingState::Idle);
        assert_eq!(recorder.elapsed_secs(), 0);
        assert_eq!(log.lock().unwrap().finished, 1);
    }

    #[test]
    fn test_only_one_recording_at_a_time() {
        let (capture, log) = FakeCapture::new(b"x");
        let mut recorder = AudioRecorder::new(Box::new(capture), 120);
        recorder.start().unwrap();
        assert_eq!(
            recorder.start(),
            Err(RecorderError::Busy(RecordingState::Recording))
        );
        assert_eq!(log.lock().unwrap().opened, 1);
    }

    #[test]
    fn test_device_errors_leave_recorder_idle() {
        for error in [
            DeviceError::PermissionDenied,
            DeviceError::NotFound,
            DeviceError::Other("busy".into()),
        ] {
            let (capture, _log) = FakeCapture::failing(error.clone());
            let mut recorder = AudioRecorder::new(Box::new(capture), 120);
            assert_eq!(recorder.start(), Err(RecorderError::Device(error)));
            assert_eq!(recorder.state(), RecordingState::Idle);
            assert_eq!(recorder.tick(), RecordingTick::Ignored);
        }
    }

    #[test]
    fn test_limit_is_reached_exactly_at_max() {
        let (capture, _log) = FakeCapture::new(b"x");
        let mut recorder = AudioRecorder::new(Box::new(capture), 5);
        recorder.start().unwrap();
        for second in 1..5 {
            assert_eq!(recorder.tick(), RecordingTick::Elapsed(second));
        }
        assert_eq!(recorder.tick(), RecordingTick::LimitReached(5));
        assert_eq!(recorder.stop().unwrap().unwrap().duration_secs, 5);
    }

    #[test]
    fn test_cancel_releases_without_payload() {
        let (capture, log) = FakeCapture::new(b"x");
        let mut recorder = AudioRecorder::new(Box::new(capture), 120);
        recorder.start().unwrap();
        recorder.tick();
        recorder.cancel();
        assert_eq!(recorder.state(), RecordingState::Idle);
        assert_eq!(recorder.stop().unwrap(), None);
        let log = log.lock().unwrap();
        assert_eq!(log.released, 1);
        assert_eq!(log.finished, 0);
    }

    #[test]
    fn test_drop_releases_active_device() {
        let (capture, log) = FakeCapture::new(b"x");
        let mut recorder = AudioRecorder::new(Box::new(capture), 120);
        recorder.start().unwrap();
        drop(recorder);
        assert_eq!(log.lock().unwrap().released, 1);
    }

    #[test]
    fn test_no_microphone_reports_not_found() {
        let mut recorder = AudioRecorder::new(Box::new(NoMicrophone), 120);
        assert_eq!(
            recorder.start(),
            Err(RecorderError::Device(DeviceError::NotFound))
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(65), "01:05");
        assert_eq!(format_duration(120), "02:00");
    }
}
