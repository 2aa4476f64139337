//! Device/network anti-fraud scorer
//!
//! Collects install identity, an attestation token, a network class,
//! session time skew and a rate-limit verdict into one record per
//! session. The record travels with the upload; it does not gate the
//! capture flow.

pub mod attestation;
pub mod identity;
pub mod network;
pub mod rate_limit;

use crate::config::DeviceConfig;
use crate::timing::{ReferenceClock, SystemClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use attestation::{
    fetch_attestation, generate_nonce, AttestationError, AttestationService, StaticAttestation,
};
pub use identity::{FileInstallId, InstallIdSource, StaticInstallId};
pub use network::{
    classify, NetworkClass, NetworkProbe, NetworkProbeError, StaticNetworkProbe, TransportKind,
};
pub use rate_limit::SlidingWindowRateLimiter;

/// Binding verdict for one session, immutable once computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceBindingRecord {
    pub install_id: Option<String>,
    pub attestation_token: Option<String>,
    pub network_class: Option<NetworkClass>,
    /// Reference-clock time minus session start, milliseconds
    pub time_skew_ms: i64,
    pub time_skew_passed: bool,
    pub rate_limit_passed: bool,
    pub overall_passed: bool,
    pub computed_at: DateTime<Utc>,
}

/// Computes [`DeviceBindingRecord`]s from injected collaborators
pub struct DeviceBindingScorer {
    config: DeviceConfig,
    install_id: Arc<dyn InstallIdSource>,
    attestation: Arc<dyn AttestationService>,
    network: Arc<dyn NetworkProbe>,
    rate_limiter: Arc<SlidingWindowRateLimiter>,
    clock: Arc<dyn ReferenceClock>,
}

impl DeviceBindingScorer {
    pub fn new(
        config: DeviceConfig,
        install_id: Arc<dyn InstallIdSource>,
        attestation: Arc<dyn AttestationService>,
        network: Arc<dyn NetworkProbe>,
        rate_limiter: Arc<SlidingWindowRateLimiter>,
    ) -> Self {
        Self {
            config,
            install_id,
            attestation,
            network,
            rate_limiter,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn ReferenceClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Score a session that started at `session_started_at`, charging the
    /// rate limit to `identifier`. Never fails: each unavailable signal is
    /// recorded as absent and fails the overall verdict.
    pub async fn score(
        &self,
        session_started_at: DateTime<Utc>,
        identifier: &str,
    ) -> DeviceBindingRecord {
        let install_id = self.install_id.install_id();
        let attestation_token =
            fetch_attestation(self.attestation.as_ref(), self.config.attestation_timeout()).await;
        let network_class = classify(self.network.as_ref());

        let now = self.clock.now();
        let skew = now - session_started_at;
        let time_skew_ms = skew.num_milliseconds();
        let time_skew_passed =
            time_skew_ms.saturating_abs() < self.config.max_time_skew_secs.saturating_mul(1000);

        let rate_limit_passed = self.rate_limiter.check(identifier);

        let overall_passed = install_id.is_some()
            && attestation_token.is_some()
            && network_class.is_some()
            && time_skew_passed
            && rate_limit_passed;

        log::info!(
            "Device binding: install_id {} token {} network {:?} skew {}ms rate_limit {} => {}",
            install_id.is_some(),
            attestation_token.is_some(),
            network_class,
            time_skew_ms,
            rate_limit_passed,
            overall_passed
        );

        DeviceBindingRecord {
            install_id,
            attestation_token,
            network_class,
            time_skew_ms,
            time_skew_passed,
            rate_limit_passed,
            overall_passed,
            computed_at: now,
        }
    }
}

impl std::fmt::Debug for DeviceBindingScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBindingScorer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::FixedClock;
    use chrono::Duration as ChronoDuration;

    fn scorer(attestation: StaticAttestation, network: StaticNetworkProbe) -> DeviceBindingScorer {
        DeviceBindingScorer::new(
            DeviceConfig::default(),
            Arc::new(StaticInstallId(Some("install-1".to_string()))),
            Arc::new(attestation),
            Arc::new(network),
            Arc::new(SlidingWindowRateLimiter::default()),
        )
    }

    #[tokio::test]
    async fn test_all_signals_present_passes() {
        let started = Utc::now();
        let record = scorer(
            StaticAttestation::issuing("tok"),
            StaticNetworkProbe::connected(TransportKind::Wifi),
        )
        .with_clock(Arc::new(FixedClock(started + ChronoDuration::seconds(30))))
        .score(started, "install-1")
        .await;

        assert!(record.overall_passed);
        assert_eq!(record.time_skew_ms, 30_000);
        assert_eq!(record.network_class, Some(NetworkClass::Trusted));
    }

    #[tokio::test]
    async fn test_missing_token_fails_overall() {
        let record = scorer(
            StaticAttestation::failing(),
            StaticNetworkProbe::connected(TransportKind::Cellular),
        )
        .score(Utc::now(), "install-1")
        .await;

        assert!(record.attestation_token.is_none());
        assert!(!record.overall_passed);
    }

    #[tokio::test]
    async fn test_large_skew_fails() {
        let started = Utc::now();
        let record = scorer(
            StaticAttestation::issuing("tok"),
            StaticNetworkProbe::connected(TransportKind::Wifi),
        )
        .with_clock(Arc::new(FixedClock(started + ChronoDuration::minutes(3))))
        .score(started, "install-1")
        .await;

        assert!(!record.time_skew_passed);
        assert!(!record.overall_passed);
    }

    #[tokio::test]
    async fn test_untrusted_network_is_still_present() {
        let record = scorer(
            StaticAttestation::issuing("tok"),
            StaticNetworkProbe::connected(TransportKind::Vpn),
        )
        .score(Utc::now(), "install-1")
        .await;
        assert_eq!(record.network_class, Some(NetworkClass::Untrusted));
        assert!(record.overall_passed);
    }
}
