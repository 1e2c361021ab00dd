//! Geräte-Ersatz für Umgebungen ohne Audio-Backend

use crate::session::{
    AudioContextFactory, AudioContextHandle, AudioUnlockError, CapabilityProbe, CapabilityReport,
    CapturedStream, MediaRequest, MissingCapability, PermissionFailure, PermissionProbe,
};
use async_trait::async_trait;

/// Meldet keine Medien-Fähigkeiten
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessDevices;

impl CapabilityProbe for HeadlessDevices {
    fn probe(&self) -> CapabilityReport {
        CapabilityReport::with_issues(vec![
            MissingCapability::MediaDevices,
            MissingCapability::MediaCapture,
            MissingCapability::AudioContext,
        ])
    }
}

#[async_trait]
impl PermissionProbe for HeadlessDevices {
    async fn acquire(
        &self,
        _request: MediaRequest,
    ) -> Result<Box<dyn CapturedStream>, PermissionFailure> {
        Err(PermissionFailure::Unsupported)
    }
}

impl AudioContextFactory for HeadlessDevices {
    fn create(&self) -> Result<Box<dyn AudioContextHandle>, AudioUnlockError> {
        Err(AudioUnlockError::Unavailable(
            "built without host audio support".to_string(),
        ))
    }
}
