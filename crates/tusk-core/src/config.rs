//! Configuration module
//!
//! Process-wide settings (maximum upload size, accepted checksum
//! algorithms, expiry, backend selection) are loaded from the environment
//! once at startup and passed into the protocol engine at construction,
//! never read as ambient globals.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::checksum::{ChecksumAlgorithm, ChecksumVerifier};
use crate::expiry::ExpiryPolicy;

const SERVER_PORT: u16 = 4000;
const MAX_UPLOAD_SIZE_MB: i64 = 1024;
const SWEEP_INTERVAL_SECS: u64 = 3600;

/// Which upload-record persistence backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryBackend {
    Postgres,
    Memory,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    /// Hard ceiling on a declared upload length, in bytes.
    pub max_upload_size_bytes: i64,
    /// Checksum algorithms accepted from clients.
    pub checksum_algorithms: Vec<ChecksumAlgorithm>,
    /// Upload lifetime; `None` means uploads never expire.
    pub upload_expiry_secs: Option<u64>,
    /// Whether successful protocol responses carry a JSON body in addition
    /// to headers.
    pub response_body_enabled: bool,
    pub repository_backend: RepositoryBackend,
    pub database_url: Option<String>,
    pub chunk_store_path: PathBuf,
    /// Interval for the background expiry sweep. 0 disables the sweeper;
    /// correctness does not depend on it.
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let server_port = env::var("PORT")
            .unwrap_or_else(|_| SERVER_PORT.to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?;

        let max_upload_size_bytes = env::var("TUS_MAX_UPLOAD_SIZE_MB")
            .unwrap_or_else(|_| MAX_UPLOAD_SIZE_MB.to_string())
            .parse::<i64>()
            .unwrap_or(MAX_UPLOAD_SIZE_MB)
            * 1024
            * 1024;

        let checksum_algorithms = env::var("TUS_CHECKSUM_ALGORITHMS")
            .unwrap_or_else(|_| "sha1,sha256,md5".to_string())
            .split(',')
            .map(|s| ChecksumAlgorithm::from_str(s.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        let upload_expiry_secs = env::var("TUS_UPLOAD_EXPIRY_SECS")
            .ok()
            .map(|s| {
                s.parse::<u64>()
                    .map_err(|_| anyhow::anyhow!("TUS_UPLOAD_EXPIRY_SECS must be a valid number"))
            })
            .transpose()?;

        let response_body_enabled = env::var("TUS_RESPONSE_BODY_ENABLED")
            .unwrap_or_else(|_| "false".to_string())
            .to_lowercase()
            .parse()
            .unwrap_or(false);

        let database_url = env::var("DATABASE_URL").ok();

        let repository_backend = match env::var("REPOSITORY_BACKEND")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" => RepositoryBackend::Postgres,
            "memory" => RepositoryBackend::Memory,
            other => {
                return Err(anyhow::anyhow!(
                    "REPOSITORY_BACKEND must be \"postgres\" or \"memory\", got \"{}\"",
                    other
                ))
            }
        };

        let chunk_store_path = PathBuf::from(
            env::var("CHUNK_STORE_PATH").unwrap_or_else(|_| "./data/uploads".to_string()),
        );

        let sweep_interval_secs = env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| SWEEP_INTERVAL_SECS.to_string())
            .parse()
            .unwrap_or(SWEEP_INTERVAL_SECS);

        let config = Config {
            server_port,
            max_upload_size_bytes,
            checksum_algorithms,
            upload_expiry_secs,
            response_body_enabled,
            repository_backend,
            database_url,
            chunk_store_path,
            sweep_interval_secs,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_upload_size_bytes <= 0 {
            return Err(anyhow::anyhow!(
                "TUS_MAX_UPLOAD_SIZE_MB must be greater than zero"
            ));
        }

        if self.checksum_algorithms.is_empty() {
            return Err(anyhow::anyhow!(
                "TUS_CHECKSUM_ALGORITHMS must name at least one algorithm"
            ));
        }

        if self.repository_backend == RepositoryBackend::Postgres {
            match &self.database_url {
                Some(url) if url.starts_with("postgresql://") || url.starts_with("postgres://") => {
                }
                Some(_) => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be a valid PostgreSQL connection string"
                    ))
                }
                None => {
                    return Err(anyhow::anyhow!(
                        "DATABASE_URL must be set when REPOSITORY_BACKEND=postgres"
                    ))
                }
            }
        }

        Ok(())
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::from_secs(self.upload_expiry_secs)
    }

    pub fn checksum_verifier(&self) -> ChecksumVerifier {
        ChecksumVerifier::new(self.checksum_algorithms.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server_port: 4000,
            max_upload_size_bytes: 1024 * 1024,
            checksum_algorithms: ChecksumAlgorithm::ALL.to_vec(),
            upload_expiry_secs: None,
            response_body_enabled: false,
            repository_backend: RepositoryBackend::Memory,
            database_url: None,
            chunk_store_path: PathBuf::from("./data/uploads"),
            sweep_interval_secs: 3600,
        }
    }

    #[test]
    fn test_validate_accepts_memory_without_database_url() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_validate_postgres_requires_database_url() {
        let mut config = base_config();
        config.repository_backend = RepositoryBackend::Postgres;
        assert!(config.validate().is_err());

        config.database_url = Some("postgresql://localhost/tusk".to_string());
        assert!(config.validate().is_ok());

        config.database_url = Some("mysql://localhost/tusk".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_algorithm_set() {
        let mut config = base_config();
        config.checksum_algorithms.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expiry_policy_reflects_config() {
        let mut config = base_config();
        assert_eq!(config.expiry_policy().expires_at(chrono::Utc::now()), None);

        config.upload_expiry_secs = Some(60);
        assert!(config
            .expiry_policy()
            .expires_at(chrono::Utc::now())
            .is_some());
    }
}
