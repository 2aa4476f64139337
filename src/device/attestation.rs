//! Attestation service seam and nonce-bound token fetch

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttestationError {
    #[error("attestation service unavailable: {0}")]
    Unavailable(String),
    #[error("attestation request rejected: {0}")]
    Rejected(String),
    #[error("attestation timed out after {0:?}")]
    Timeout(Duration),
}

/// External integrity-token issuer: nonce in, opaque signed token out
#[async_trait]
pub trait AttestationService: Send + Sync {
    async fn attest(&self, nonce: &str) -> Result<String, AttestationError>;
}

/// 32 random bytes, URL-safe base64 without padding
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Request a token for a fresh nonce, bounded by `timeout`.
/// Failure and timeout both yield `None`.
pub async fn fetch_attestation(
    service: &dyn AttestationService,
    timeout: Duration,
) -> Option<String> {
    let nonce = generate_nonce();
    match tokio::time::timeout(timeout, service.attest(&nonce)).await {
        Ok(Ok(token)) => Some(token),
        Ok(Err(e)) => {
            log::warn!("Attestation failed: {}", e);
            None
        }
        Err(_) => {
            log::warn!("{}", AttestationError::Timeout(timeout));
            None
        }
    }
}

/// Service that echoes a fixed token after an optional delay
#[derive(Debug, Clone)]
pub struct StaticAttestation {
    token: Option<String>,
    delay: Duration,
}

impl StaticAttestation {
    pub fn issuing(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            token: None,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl AttestationService for StaticAttestation {
    async fn attest(&self, nonce: &str) -> Result<String, AttestationError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.token {
            Some(token) => Ok(format!("{token}.{nonce}")),
            None => Err(AttestationError::Unavailable("no issuer configured".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_shape() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert!(URL_SAFE_NO_PAD.decode(&a).is_ok());
    }

    #[tokio::test]
    async fn test_token_is_bound_to_nonce() {
        let token = fetch_attestation(&StaticAttestation::issuing("tok"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(token.starts_with("tok."));
        assert_eq!(token.len(), 4 + 43);
    }

    #[tokio::test]
    async fn test_failure_is_absence() {
        assert!(fetch_attestation(&StaticAttestation::failing(), Duration::from_secs(1))
            .await
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_absence() {
        let slow = StaticAttestation::issuing("tok").with_delay(Duration::from_secs(30));
        assert!(fetch_attestation(&slow, Duration::from_secs(10)).await.is_none());
    }
}
