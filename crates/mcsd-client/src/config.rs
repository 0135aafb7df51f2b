//! Client configuration: per-upstream base URL, timeouts, retry policy, and
//! the mTLS client identity validated once at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mcsd_core::CoreError;

/// mTLS client certificate + key, read from disk once and kept in memory as
/// the PEM bundle `reqwest::Identity` wants.
#[derive(Debug, Clone)]
pub struct TlsIdentityConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsIdentityConfig {
    #[must_use]
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Reads the cert and key files and builds a `reqwest::Identity`. Per
    /// spec, a missing file at startup is a fatal configuration error, not
    /// something retried or deferred to first use.
    pub fn load(&self) -> Result<reqwest::Identity, CoreError> {
        let mut pem = read_required(&self.cert_path)?;
        pem.extend_from_slice(&read_required(&self.key_path)?);
        reqwest::Identity::from_pem(&pem)
            .map_err(|e| CoreError::upstream_http(0, format!("invalid mTLS identity: {e}")))
    }
}

fn read_required(path: &Path) -> Result<Vec<u8>, CoreError> {
    std::fs::read(path).map_err(|e| {
        CoreError::upstream_http(
            0,
            format!("mTLS material not found at {}: {e}", path.display()),
        )
    })
}

/// Retry policy: exponential backoff with a deterministic factor — no
/// jitter, so retry timing in tests and logs is reproducible.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            backoff_factor: 2,
        }
    }
}

impl RetryConfig {
    /// Delay before the given (zero-indexed) retry attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * self.backoff_factor.saturating_pow(attempt)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub retry: RetryConfig,
    pub tls_identity: Option<TlsIdentityConfig>,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            tls_identity: None,
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, connect_timeout: Duration, read_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.read_timeout = read_timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_tls_identity(mut self, tls_identity: TlsIdentityConfig) -> Self {
        self.tls_identity = Some(tls_identity);
        self
    }

    /// The connect timeout must be strictly smaller than the read timeout —
    /// checked once at startup alongside mTLS material, rather than per call.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.connect_timeout >= self.read_timeout {
            return Err(CoreError::upstream_http(
                0,
                "connect_timeout must be strictly smaller than read_timeout",
            ));
        }
        if let Some(identity) = &self.tls_identity {
            identity.load()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_per_attempt() {
        let retry = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            backoff_factor: 2,
        };
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn validate_rejects_connect_timeout_not_smaller() {
        let config =
            ClientConfig::new("https://example.test").with_timeouts(
                Duration::from_secs(10),
                Duration::from_secs(10),
            );
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_tls_material() {
        let config = ClientConfig::new("https://example.test")
            .with_tls_identity(TlsIdentityConfig::new("/no/such/cert.pem", "/no/such/key.pem"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_sane_defaults() {
        let config = ClientConfig::new("https://example.test");
        assert!(config.validate().is_ok());
    }
}
