//! Coarse network classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkProbeError {
    #[error("network state unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied reading network state")]
    PermissionDenied,
}

/// Link type reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Wifi,
    Cellular,
    Ethernet,
    Vpn,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkClass {
    Trusted,
    Untrusted,
    Unknown,
}

impl From<TransportKind> for NetworkClass {
    fn from(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Wifi | TransportKind::Cellular | TransportKind::Ethernet => {
                NetworkClass::Trusted
            }
            TransportKind::Vpn => NetworkClass::Untrusted,
            TransportKind::Unknown => NetworkClass::Unknown,
        }
    }
}

/// Host hook for the active network. `Ok(None)` means no active network.
pub trait NetworkProbe: Send + Sync {
    fn active_transport(&self) -> Result<Option<TransportKind>, NetworkProbeError>;
}

/// Classify the active network; no network or a probe failure is absence
pub fn classify(probe: &dyn NetworkProbe) -> Option<NetworkClass> {
    match probe.active_transport() {
        Ok(Some(kind)) => Some(kind.into()),
        Ok(None) => {
            log::debug!("No active network");
            None
        }
        Err(e) => {
            log::warn!("Network probe failed: {}", e);
            None
        }
    }
}

/// Probe returning a fixed answer
#[derive(Debug, Clone)]
pub struct StaticNetworkProbe(pub Result<Option<TransportKind>, NetworkProbeError>);

impl StaticNetworkProbe {
    pub fn connected(kind: TransportKind) -> Self {
        Self(Ok(Some(kind)))
    }

    pub fn offline() -> Self {
        Self(Ok(None))
    }
}

impl NetworkProbe for StaticNetworkProbe {
    fn active_transport(&self) -> Result<Option<TransportKind>, NetworkProbeError> {
        self.0.clone()
    }
}
