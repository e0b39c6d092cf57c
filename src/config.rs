//! Relay configuration.

use crate::delivery::{DashboardClient, FailurePolicy};
use crate::encoding::{ImageEncoder, DEFAULT_COMPRESSION, MAX_COMPRESSION};
use crate::error::{ConfigError, DeliveryError};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const DASHBOARD_LINK: &str = "DASHBOARD_LINK";
pub const TOKEN: &str = "TOKEN";
pub const DASHBOARD_TIMEOUT_SECS: &str = "DASHBOARD_TIMEOUT_SECS";
pub const DELIVERY_RETRY_ATTEMPTS: &str = "DELIVERY_RETRY_ATTEMPTS";
pub const DELIVERY_RETRY_DELAY_MS: &str = "DELIVERY_RETRY_DELAY_MS";
pub const PNG_COMPRESSION: &str = "PNG_COMPRESSION";
pub const ENCODED_IMAGE_PATH: &str = "ENCODED_IMAGE_PATH";

const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Everything the relay needs to know at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Dashboard endpoint URL
    pub dashboard_url: String,
    /// Bearer token for the dashboard
    pub token: String,
    /// Per-request timeout; `None` waits for the transport
    pub request_timeout: Option<Duration>,
    /// What to do with payloads that fail to deliver
    pub failure_policy: FailurePolicy,
    /// PNG compression level, 0-9
    pub png_compression: u8,
    /// Where to dump the last encoded image, if anywhere
    pub debug_image_path: Option<PathBuf>,
}

impl RelayConfig {
    /// Loads `.env` if present, then reads the process environment.
    ///
    /// A missing `.env` is normal. An unreadable or malformed one is logged
    /// and the process environment is used as is.
    pub fn from_env() -> Result<Self, ConfigError> {
        report_env_file(dotenvy::dotenv());
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let dashboard_url = get(DASHBOARD_LINK).ok_or(ConfigError::Missing(DASHBOARD_LINK))?;
        if !(dashboard_url.starts_with("http://") || dashboard_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                var: DASHBOARD_LINK,
                value: dashboard_url,
            });
        }
        let token = get(TOKEN).ok_or(ConfigError::Missing(TOKEN))?;

        let request_timeout = parse_var::<u64>(DASHBOARD_TIMEOUT_SECS, get(DASHBOARD_TIMEOUT_SECS))?
            .map(Duration::from_secs);

        let attempts = parse_var::<u32>(DELIVERY_RETRY_ATTEMPTS, get(DELIVERY_RETRY_ATTEMPTS))?
            .unwrap_or(1);
        if attempts == 0 {
            return Err(ConfigError::Invalid {
                var: DELIVERY_RETRY_ATTEMPTS,
                value: attempts.to_string(),
            });
        }
        let delay = parse_var::<u64>(DELIVERY_RETRY_DELAY_MS, get(DELIVERY_RETRY_DELAY_MS))?
            .unwrap_or(DEFAULT_RETRY_DELAY_MS);
        let failure_policy = if attempts == 1 {
            FailurePolicy::Drop
        } else {
            FailurePolicy::Retry {
                max_attempts: attempts,
                delay: Duration::from_millis(delay),
            }
        };

        let png_compression = parse_var::<u8>(PNG_COMPRESSION, get(PNG_COMPRESSION))?
            .unwrap_or(DEFAULT_COMPRESSION);
        if png_compression > MAX_COMPRESSION {
            return Err(ConfigError::Invalid {
                var: PNG_COMPRESSION,
                value: png_compression.to_string(),
            });
        }

        Ok(Self {
            dashboard_url,
            token,
            request_timeout,
            failure_policy,
            png_compression,
            debug_image_path: get(ENCODED_IMAGE_PATH).map(PathBuf::from),
        })
    }

    /// Image encoder configured with the compression level and debug dump.
    pub fn image_encoder(&self) -> ImageEncoder {
        let encoder = ImageEncoder::new(self.png_compression);
        match &self.debug_image_path {
            Some(path) => encoder.with_debug_dump(path),
            None => encoder,
        }
    }

    /// Dashboard client for the configured endpoint.
    pub fn dashboard_client(&self) -> Result<DashboardClient, DeliveryError> {
        match self.request_timeout {
            Some(timeout) => {
                DashboardClient::with_timeout(&self.dashboard_url, &self.token, timeout)
            }
            None => Ok(DashboardClient::new(&self.dashboard_url, &self.token)),
        }
    }
}

/// Logs the outcome of loading an env file. Returns true if it was loaded.
fn report_env_file<T: std::fmt::Debug>(result: Result<T, dotenvy::Error>) -> bool {
    match result {
        Ok(loaded) => {
            debug!("Loaded environment file {:?}", loaded);
            true
        }
        Err(e) if e.not_found() => false,
        Err(e) => {
            warn!("Ignoring environment file: {}", e);
            false
        }
    }
}

fn parse_var<T: FromStr>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| ConfigError::Invalid { var, value })
        })
        .transpose()
}
