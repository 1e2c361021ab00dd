//! Devices Module - Capability- und Permission-Probes des Hosts
//!
//! Mit Feature `host-audio` werden Mikrofon und Ausgabe über cpal geprüft.
//! Ohne das Feature meldet `HeadlessDevices` alle Fähigkeiten als fehlend,
//! sodass nur ein Beitritt ohne Medien möglich ist.

#[cfg(feature = "host-audio")]
mod audio;
mod headless;

#[cfg(feature = "host-audio")]
pub use audio::{classify_build_error, HostAudioContextFactory, HostCapabilityProbe, HostPermissionProbe};
pub use headless::HeadlessDevices;
