//! Runtime configuration: env-var driven, validated once at startup.
//!
//! Per spec, configuration *file* loading, secrets management, and CLI flag
//! parsing are the embedder's problem — this only owns the shape of the
//! settings the core needs and the startup-fatal checks over them (mTLS
//! material existing on disk, a sane local FHIR base URL).

use std::env;
use std::time::Duration;

use mcsd_client::{ClientConfig, TlsIdentityConfig};
use mcsd_db_postgres::PostgresConfig;
use mcsd_scheduler::SchedulerConfig;

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 8080 }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerSettings,
    /// Base URL of the local FHIR store this core owns — the consolidated,
    /// namespaced view that the routing API reads from.
    pub local_fhir_base_url: String,
    pub postgres: PostgresConfig,
    pub scheduler: SchedulerConfig,
    pub mtls_cert_path: Option<String>,
    pub mtls_key_path: Option<String>,
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        let mut postgres = PostgresConfig::default();
        if let Ok(url) = env::var("MCSD_DATABASE_URL") {
            postgres.url = url;
        }
        if let Some(pool_size) = parsed_env("MCSD_DATABASE_POOL_SIZE") {
            postgres.pool_size = pool_size;
        }
        if let Some(run_migrations) = parsed_env("MCSD_RUN_MIGRATIONS") {
            postgres.run_migrations = run_migrations;
        }

        let mut scheduler = SchedulerConfig::default();
        if let Some(n) = parsed_env("MCSD_MAX_CONCURRENT_SYNCS") {
            scheduler.max_concurrent_directory_updates = n;
        }
        if let Some(secs) = parsed_env::<u64>("MCSD_TICK_INTERVAL_SECONDS") {
            scheduler.tick_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parsed_env::<u64>("MCSD_CLEANUP_INTERVAL_SECONDS") {
            scheduler.cleanup_interval = Duration::from_secs(secs);
        }

        Self {
            server: ServerSettings {
                host: env::var("MCSD_HOST").unwrap_or_else(|_| ServerSettings::default().host),
                port: parsed_env("MCSD_PORT").unwrap_or_else(|| ServerSettings::default().port),
            },
            local_fhir_base_url: env::var("MCSD_LOCAL_FHIR_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8081/fhir".into()),
            postgres,
            scheduler,
            mtls_cert_path: env::var("MCSD_MTLS_CERT_PATH").ok(),
            mtls_key_path: env::var("MCSD_MTLS_KEY_PATH").ok(),
        }
    }

    /// Every startup-fatal check in one place: the local FHIR base must
    /// parse as an absolute URL, the port must be nonzero, and mTLS
    /// material (if configured) must exist on disk.
    pub fn validate(&self) -> Result<(), String> {
        if url::Url::parse(&self.local_fhir_base_url).is_err() {
            return Err(format!(
                "MCSD_LOCAL_FHIR_BASE_URL is not a valid URL: {}",
                self.local_fhir_base_url
            ));
        }
        if self.server.port == 0 {
            return Err("MCSD_PORT must be > 0".into());
        }
        self.local_client_config().validate().map_err(|e| e.to_string())
    }

    /// Builds the `mcsd-client` config for the local FHIR store, including
    /// the mTLS identity if one was configured.
    #[must_use]
    pub fn local_client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.local_fhir_base_url.clone());
        if let Some(cert) = &self.mtls_cert_path {
            if let Some(key) = &self.mtls_key_path {
                config = config.with_tls_identity(TlsIdentityConfig::new(cert.clone(), key.clone()));
            }
        }
        config
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
