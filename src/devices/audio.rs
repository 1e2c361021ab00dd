//! Host Audio Probes
//!
//! Verwendet cpal für Cross-Platform Audio I/O:
//! - Capability-Probe über Geräte-Enumeration
//! - Permission-Probe über einen kurz geöffneten Input-Stream
//! - Audio-Unlock über einen transienten, stummen Output-Stream
//!
//! Kamera-Zugriff wird nativ nicht geprüft.

use crate::session::{
    AudioContextFactory, AudioContextHandle, AudioUnlockError, CapabilityProbe, CapabilityReport,
    CapturedStream, MediaRequest, MissingCapability, PermissionFailure, PermissionProbe,
};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Data, PlayStreamError, Stream};

// ============================================================================
// CAPABILITY PROBE
// ============================================================================

/// Prüft Input-Enumeration, Default-Input-Config und Default-Output
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCapabilityProbe;

impl CapabilityProbe for HostCapabilityProbe {
    fn probe(&self) -> CapabilityReport {
        let host = cpal::default_host();
        let mut issues = Vec::new();

        if let Err(e) = host.input_devices() {
            tracing::warn!("Audio device enumeration failed: {}", e);
            issues.push(MissingCapability::MediaDevices);
        }

        let capture_ok = host
            .default_input_device()
            .map(|device| device.default_input_config().is_ok())
            .unwrap_or(false);
        if !capture_ok {
            issues.push(MissingCapability::MediaCapture);
        }

        if host.default_output_device().is_none() {
            issues.push(MissingCapability::AudioContext);
        }

        tracing::debug!("Host audio capability report: {:?}", issues);
        CapabilityReport::with_issues(issues)
    }
}

// ============================================================================
// PERMISSION PROBE
// ============================================================================

/// Ordnet cpal-Fehler beim Öffnen eines Streams einem PermissionFailure zu
pub fn classify_build_error(error: &BuildStreamError) -> PermissionFailure {
    match error {
        BuildStreamError::DeviceNotAvailable => PermissionFailure::NoDevice,
        BuildStreamError::StreamConfigNotSupported | BuildStreamError::InvalidArgument => {
            PermissionFailure::Unsupported
        }
        BuildStreamError::BackendSpecific { err } => classify_backend_message(&err.description),
        other => PermissionFailure::Other(other.to_string()),
    }
}

fn classify_play_error(error: &PlayStreamError) -> PermissionFailure {
    match error {
        PlayStreamError::DeviceNotAvailable => PermissionFailure::NoDevice,
        PlayStreamError::BackendSpecific { err } => classify_backend_message(&err.description),
    }
}

fn classify_backend_message(description: &str) -> PermissionFailure {
    let lower = description.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        PermissionFailure::Denied
    } else {
        PermissionFailure::Other(description.to_string())
    }
}

/// Geöffneter Mikrofon-Stream der Permission-Probe
struct HostCapture {
    stream: Option<Stream>,
}

// cpal::Stream ist nicht auf allen Plattformen Send; der Stream wird nur
// gestoppt und gedroppt, nie von mehreren Threads gleichzeitig benutzt.
unsafe impl Send for HostCapture {}

impl CapturedStream for HostCapture {
    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
            tracing::debug!("Probe capture stream released");
        }
    }
}

impl Drop for HostCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Öffnet kurz das Default-Mikrofon
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPermissionProbe;

impl HostPermissionProbe {
    fn open_capture() -> Result<HostCapture, PermissionFailure> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(PermissionFailure::NoDevice)?;

        let config = device
            .default_input_config()
            .map_err(|e| PermissionFailure::Other(e.to_string()))?;
        let sample_format = config.sample_format();

        let stream = device
            .build_input_stream_raw(
                &config.into(),
                sample_format,
                |_data: &Data, _: &cpal::InputCallbackInfo| {},
                |err| {
                    tracing::error!("Audio capture error: {}", err);
                },
                None,
            )
            .map_err(|e| classify_build_error(&e))?;

        stream.play().map_err(|e| classify_play_error(&e))?;

        Ok(HostCapture {
            stream: Some(stream),
        })
    }
}

#[async_trait]
impl PermissionProbe for HostPermissionProbe {
    async fn acquire(
        &self,
        request: MediaRequest,
    ) -> Result<Box<dyn CapturedStream>, PermissionFailure> {
        if !request.audio {
            return Err(PermissionFailure::Unsupported);
        }

        let capture = tokio::task::spawn_blocking(Self::open_capture)
            .await
            .map_err(|e| PermissionFailure::Other(e.to_string()))??;

        Ok(Box::new(capture))
    }
}

// ============================================================================
// AUDIO UNLOCK
// ============================================================================

/// Transienter, stummer Output-Stream als Audio-Kontext
struct HostAudioContext {
    stream: Option<Stream>,
    playing: bool,
}

// Siehe HostCapture
unsafe impl Send for HostAudioContext {}

impl AudioContextHandle for HostAudioContext {
    fn is_suspended(&self) -> bool {
        !self.playing
    }

    fn resume(&mut self) -> Result<(), AudioUnlockError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| AudioUnlockError::Resume("context already closed".to_string()))?;
        stream
            .play()
            .map_err(|e| AudioUnlockError::Resume(e.to_string()))?;
        self.playing = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), AudioUnlockError> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        self.playing = false;
        stream
            .pause()
            .map_err(|e| AudioUnlockError::Close(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HostAudioContextFactory;

impl AudioContextFactory for HostAudioContextFactory {
    fn create(&self) -> Result<Box<dyn AudioContextHandle>, AudioUnlockError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioUnlockError::Unavailable("no output device".to_string()))?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioUnlockError::Unavailable(e.to_string()))?;
        let sample_format = config.sample_format();

        let stream = device
            .build_output_stream_raw(
                &config.into(),
                sample_format,
                |data: &mut Data, _: &cpal::OutputCallbackInfo| {
                    data.bytes_mut().fill(0);
                },
                |err| {
                    tracing::error!("Audio playback error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioUnlockError::Unavailable(e.to_string()))?;

        Ok(Box::new(HostAudioContext {
            stream: Some(stream),
            playing: false,
        }))
    }
}

// ============================================================================
// TESTS
// ============================================================================
