//! S3 driver configuration.

use serde::Deserialize;

use crate::retry::RetryConfig;
use crate::types::KvError;

use super::validate::is_valid_bucket_name;

/// Rates for the per-class token-bucket gates, in operations per second.
/// A missing or zero rate leaves that class unlimited.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimiterConfig {
    #[serde(default)]
    pub read_rate: usize,
    #[serde(default)]
    pub write_rate: usize,
}

/// Configuration record for an S3 driver instance.
///
/// Bindable from JSON; unknown fields are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Config {
    /// Target bucket. Required; validated against S3 naming rules.
    pub bucket: String,

    /// Emit `x-amz-request-payer: requester` on every request.
    #[serde(default)]
    pub requester_pays: bool,

    /// Host header override. Defaults to the endpoint authority.
    #[serde(default)]
    pub host: Option<String>,

    /// Full endpoint URL (`http` or `https`, no query or fragment). When
    /// absent, a virtual-hosted AWS endpoint is synthesized from the region,
    /// discovering the region first if necessary.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Credential profile name.
    #[serde(default = "default_profile")]
    pub profile: String,

    /// AWS region. May be empty when the endpoint carries its own region
    /// semantics.
    #[serde(default)]
    pub aws_region: String,

    /// Maximum concurrent in-flight requests.
    #[serde(default = "default_request_concurrency")]
    pub request_concurrency: usize,

    /// Optional read/write rate limits.
    #[serde(default)]
    pub rate_limiter: Option<RateLimiterConfig>,

    /// Retry policy.
    #[serde(default)]
    pub retries: RetryConfig,
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_request_concurrency() -> usize {
    32
}

impl S3Config {
    /// A config with defaults for everything but the bucket.
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            requester_pays: false,
            host: None,
            endpoint: None,
            profile: default_profile(),
            aws_region: String::new(),
            request_concurrency: default_request_concurrency(),
            rate_limiter: None,
            retries: RetryConfig::default(),
        }
    }

    /// Bind a config from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, KvError> {
        let config: S3Config = serde_json::from_str(json)
            .map_err(|e| KvError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KvError> {
        if !is_valid_bucket_name(&self.bucket) {
            return Err(KvError::InvalidConfig(format!(
                "invalid S3 bucket name: {:?}",
                self.bucket
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = S3Config::from_json(r#"{"bucket": "my-bucket"}"#).unwrap();
        assert_eq!(config.bucket, "my-bucket");
        assert!(!config.requester_pays);
        assert_eq!(config.profile, "default");
        assert_eq!(config.aws_region, "");
        assert_eq!(config.request_concurrency, 32);
        assert!(config.endpoint.is_none());
        assert!(config.rate_limiter.is_none());
        assert_eq!(config.retries.max_retries, 3);
    }

    #[test]
    fn test_full_config() {
        let config = S3Config::from_json(
            r#"{
                "bucket": "data",
                "requester_pays": true,
                "host": "storage.internal",
                "endpoint": "https://storage.internal:9000",
                "profile": "ci",
                "aws_region": "eu-west-1",
                "request_concurrency": 8,
                "rate_limiter": {"read_rate": 100, "write_rate": 50},
                "retries": {"max_retries": 5, "initial_delay_ms": 200, "max_delay_ms": 5000}
            }"#,
        )
        .unwrap();
        assert!(config.requester_pays);
        assert_eq!(config.host.as_deref(), Some("storage.internal"));
        assert_eq!(config.profile, "ci");
        assert_eq!(config.request_concurrency, 8);
        let limits = config.rate_limiter.unwrap();
        assert_eq!(limits.read_rate, 100);
        assert_eq!(limits.write_rate, 50);
        assert_eq!(config.retries.max_retries, 5);
    }

    #[test]
    fn test_invalid_bucket_rejected() {
        let err = S3Config::from_json(r#"{"bucket": "AB"}"#).unwrap_err();
        assert!(matches!(err, KvError::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = S3Config::from_json(r#"{"bucket": "ok-bucket", "buckets": 1}"#).unwrap_err();
        assert!(matches!(err, KvError::InvalidConfig(_)));
    }

    #[test]
    fn test_missing_bucket_rejected() {
        let err = S3Config::from_json(r#"{}"#).unwrap_err();
        assert!(matches!(err, KvError::InvalidConfig(_)));
    }
}
