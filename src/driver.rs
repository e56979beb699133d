//! The key-value store driver abstraction.
//!
//! Storage backends implement [`KvStoreDriver`], and callers address them
//! with `s3://bucket/prefix` URLs through [`open_url`]. Listing streams
//! keys into a [`ListReceiver`] rather than buffering them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::s3::config::S3Config;
use crate::s3::validate::{is_valid_bucket_name, uri_encode_key};
use crate::s3::S3Driver;
use crate::transport::HttpTransport;
use crate::types::{
    KeyRange, KvError, ListOptions, ReadOptions, ReadResult, TimestampedGeneration, WriteOptions,
};

/// URL scheme for the S3 driver.
pub const S3_URI_SCHEME: &str = "s3";

/// Unified driver interface for key-value storage backends.
#[async_trait]
pub trait KvStoreDriver: Send + Sync {
    /// Read an object, subject to byte-range and generation conditions.
    async fn read(&self, key: &str, options: ReadOptions) -> Result<ReadResult, KvError>;

    /// Write an object, subject to a generation condition.
    async fn write(
        &self,
        key: &str,
        value: Bytes,
        options: WriteOptions,
    ) -> Result<TimestampedGeneration, KvError>;

    /// Delete an object, subject to a generation condition.
    async fn delete(
        &self,
        key: &str,
        options: WriteOptions,
    ) -> Result<TimestampedGeneration, KvError>;

    /// Delete every key in `range`.
    async fn delete_range(&self, range: KeyRange) -> Result<(), KvError>;

    /// Stream the keys in `options.range` to `receiver`.
    ///
    /// All outcomes, including errors, arrive through the receiver.
    async fn list(&self, options: ListOptions, receiver: &mut dyn ListReceiver);
}

/// Receives the signals of one list operation.
///
/// The protocol is `starting`, zero or more `value`s, exactly one of
/// `done` or `error`, then `stopping`. Cancellation via the handle given
/// to `starting` terminates the stream with `done`.
pub trait ListReceiver: Send {
    fn starting(&mut self, cancel: CancelHandle);
    fn value(&mut self, key: String);
    fn done(&mut self);
    fn error(&mut self, error: KvError);
    fn stopping(&mut self);
}

/// Cancels an in-flight list operation.
///
/// Cloneable and callable from any thread; the list task polls the flag
/// between HTTP round trips and between emitted keys.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Parse an `s3://bucket/prefix` URL into a driver config and key prefix.
///
/// The prefix is percent-decoded; query strings and fragments are not
/// supported.
pub fn parse_s3_url(url: &str) -> Result<(S3Config, String), KvError> {
    let rest = url
        .strip_prefix("s3://")
        .ok_or_else(|| KvError::InvalidArgument(format!("not an s3:// URL: {url:?}")))?;
    if rest.contains('?') {
        return Err(KvError::InvalidArgument(
            "query string not supported in s3 URLs".to_string(),
        ));
    }
    if rest.contains('#') {
        return Err(KvError::InvalidArgument(
            "fragment identifier not supported in s3 URLs".to_string(),
        ));
    }

    let (bucket, path) = match rest.split_once('/') {
        Some((bucket, path)) => (bucket, path),
        None => (rest, ""),
    };
    if !is_valid_bucket_name(bucket) {
        return Err(KvError::InvalidArgument(format!(
            "invalid S3 bucket name: {bucket:?}"
        )));
    }
    let path = urlencoding::decode(path)
        .map_err(|e| KvError::InvalidArgument(format!("invalid percent-encoding: {e}")))?
        .into_owned();

    Ok((S3Config::for_bucket(bucket), path))
}

/// Format the `s3://bucket/key` form of an object.
pub fn format_s3_url(bucket: &str, key: &str) -> String {
    format!("{S3_URI_SCHEME}://{bucket}/{}", uri_encode_key(key))
}

/// Open a driver from an `s3://bucket/prefix` URL.
///
/// Returns the driver and the decoded key prefix from the URL path.
pub async fn open_url(
    url: &str,
    transport: Arc<dyn HttpTransport>,
) -> Result<(S3Driver, String), KvError> {
    let (config, path) = parse_s3_url(url)?;
    let driver = S3Driver::open(config, transport).await?;
    Ok((driver, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_url() {
        let (config, path) = parse_s3_url("s3://my-bucket/some/prefix").unwrap();
        assert_eq!(config.bucket, "my-bucket");
        assert_eq!(path, "some/prefix");
    }

    #[test]
    fn test_parse_s3_url_no_path() {
        let (config, path) = parse_s3_url("s3://my-bucket").unwrap();
        assert_eq!(config.bucket, "my-bucket");
        assert_eq!(path, "");
    }

    #[test]
    fn test_parse_s3_url_percent_decoding() {
        let (_, path) = parse_s3_url("s3://my-bucket/a%20b/c").unwrap();
        assert_eq!(path, "a b/c");
    }

    #[test]
    fn test_parse_s3_url_rejects_query_and_fragment() {
        assert!(matches!(
            parse_s3_url("s3://my-bucket/k?versionId=1"),
            Err(KvError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_s3_url("s3://my-bucket/k#frag"),
            Err(KvError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_parse_s3_url_rejects_bad_scheme_and_bucket() {
        assert!(matches!(
            parse_s3_url("http://my-bucket/k"),
            Err(KvError::InvalidArgument(_))
        ));
        assert!(matches!(
            parse_s3_url("s3://AB/k"),
            Err(KvError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_format_url_round_trip() {
        let url = format_s3_url("my-bucket", "a b/c");
        assert_eq!(url, "s3://my-bucket/a%20b/c");
        let (config, path) = parse_s3_url(&url).unwrap();
        assert_eq!(config.bucket, "my-bucket");
        assert_eq!(path, "a b/c");
    }

    #[test]
    fn test_cancel_handle() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());
        clone.cancel();
        assert!(handle.is_cancelled());
    }
}
