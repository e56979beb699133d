//! Amazon S3 key-value store driver.
//!
//! Implements the driver interface over the S3 REST API with reqwest and
//! AWS Signature Version 4, avoiding the heavyweight aws-sdk-s3 dependency.
//! Works against AWS S3 and S3-compatible services (MinIO, Ceph, R2, ...).
//!
//! S3 has no conditional PUT or DELETE, so conditional writes and deletes
//! are emulated with a HEAD probe of the `if-match` condition before the
//! mutating request. Another writer can slip in between the probe and the
//! mutation; callers relying on compare-and-swap must tolerate that window.

pub mod config;
pub mod credentials;
pub mod sign;
pub mod validate;
pub mod xml;

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::Utc;
use reqwest::Method;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::admission::{AdmissionQueue, RateGate};
use crate::driver::{format_s3_url, CancelHandle, KvStoreDriver, ListReceiver};
use crate::metrics;
use crate::retry::backoff_for_attempt;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::{
    KeyRange, KvError, ListOptions, ReadOptions, ReadResult, StorageGeneration,
    TimestampedGeneration, WriteOptions,
};

use async_trait::async_trait;
use config::S3Config;
use credentials::{resolve_chain, CredentialState, Credentials};
use sign::{payload_sha256, RequestBuilder, EMPTY_PAYLOAD_SHA256};
use validate::{is_valid_object_key, uri_encode_key};

const AMAZON_AWS_SUFFIX: &str = ".amazonaws.com";
const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";

struct DriverState {
    config: S3Config,
    endpoint: String,
    host: String,
    region: String,
    transport: Arc<dyn HttpTransport>,
    admission: AdmissionQueue,
    read_gate: RateGate,
    write_gate: RateGate,
    credentials: Mutex<CredentialState>,
}

/// S3-backed key-value store driver. Cheap to clone; clones share one
/// request context.
#[derive(Clone)]
pub struct S3Driver {
    state: Arc<DriverState>,
}

impl std::fmt::Debug for S3Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Driver").finish_non_exhaustive()
    }
}

impl S3Driver {
    /// Open a driver: validate the config, resolve the endpoint (probing
    /// the bucket's home region when neither endpoint nor region is
    /// configured), and set up the admission pipeline.
    pub async fn open(
        config: S3Config,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<S3Driver, KvError> {
        config.validate()?;
        let (endpoint, host, region) = resolve_endpoint(&config, transport.as_ref()).await?;
        info!(endpoint = %endpoint, region = %region, bucket = %config.bucket, "S3 driver opened");

        let (read_gate, write_gate) = match config.rate_limiter {
            Some(ref limits) => (
                RateGate::per_second(limits.read_rate),
                RateGate::per_second(limits.write_rate),
            ),
            None => (RateGate::unlimited(), RateGate::unlimited()),
        };
        let admission = AdmissionQueue::new(config.request_concurrency);

        Ok(S3Driver {
            state: Arc::new(DriverState {
                endpoint,
                host,
                region,
                transport,
                admission,
                read_gate,
                write_gate,
                credentials: Mutex::new(CredentialState::Unresolved),
                config,
            }),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.state.config.bucket
    }

    pub fn endpoint(&self) -> &str {
        &self.state.endpoint
    }

    /// The `s3://bucket/key` URL of an object in this driver's bucket.
    pub fn object_url(&self, key: &str) -> String {
        format_s3_url(&self.state.config.bucket, key)
    }

    fn resource_url(&self, encoded_key: &str) -> String {
        format!("{}/{}", self.state.endpoint, encoded_key)
    }

    /// Resolve credentials, at most once per driver. A chain miss is
    /// cached as anonymous; chain errors are returned and left uncached.
    async fn credentials(&self) -> Result<Option<Credentials>, KvError> {
        let mut state = self.state.credentials.lock().await;
        match &*state {
            CredentialState::Ready(credentials) => Ok(Some(credentials.clone())),
            CredentialState::Anonymous => Ok(None),
            CredentialState::Unresolved => match resolve_chain(&self.state.config.profile)? {
                Some(credentials) => {
                    *state = CredentialState::Ready(credentials.clone());
                    Ok(Some(credentials))
                }
                None => {
                    debug!(
                        profile = %self.state.config.profile,
                        "no credentials found; issuing anonymous requests"
                    );
                    *state = CredentialState::Anonymous;
                    Ok(None)
                }
            },
        }
    }

    /// Sleep out the backoff for retry number `attempt`, or convert the
    /// error once the budget is spent.
    async fn backoff_or_abort(&self, attempt: &mut u32, error: KvError) -> Result<(), KvError> {
        let retries = &self.state.config.retries;
        if *attempt >= retries.max_retries {
            return Err(KvError::Aborted {
                attempts: *attempt,
                last: error.to_string(),
            });
        }
        metrics::increment(&metrics::metrics().retries);
        let delay = backoff_for_attempt(*attempt, retries);
        warn!(
            attempt = *attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "retrying S3 request"
        );
        *attempt += 1;
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn read_impl(&self, key: &str, options: ReadOptions) -> Result<ReadResult, KvError> {
        let url = self.resource_url(&uri_encode_key(key));
        self.state.read_gate.admit().await;
        let _slot = self.state.admission.admit().await;

        let mut attempt = 0u32;
        loop {
            let credentials = self.credentials().await?;
            let start_time = SystemTime::now();
            let request = RequestBuilder::new(Method::GET, &url)
                .generation_header("if-none-match", &options.if_not_equal)
                .generation_header("if-match", &options.if_equal)
                .requester_payer(self.state.config.requester_pays)
                .byte_range(&options.byte_range)
                .build(
                    &self.state.host,
                    credentials.as_ref(),
                    &self.state.region,
                    EMPTY_PAYLOAD_SHA256,
                    Utc::now(),
                    Bytes::new(),
                )?;
            debug!(url = %url, "GET object");

            let response = match self.state.transport.issue(request).await {
                Ok(response) => response,
                Err(error) if error.is_retryable() => {
                    self.backoff_or_abort(&mut attempt, error).await?;
                    continue;
                }
                Err(error) => return Err(error),
            };

            match response.status {
                // Conditional outcomes resolve the read; they are not errors.
                204 | 304 | 404 | 412 => {
                    return self.finish_read(response, &options, start_time)
                }
                status if (200..300).contains(&status) => {
                    return self.finish_read(response, &options, start_time)
                }
                _ => {
                    let error = error_from_response(&response);
                    if error.is_retryable() {
                        self.backoff_or_abort(&mut attempt, error).await?;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    fn finish_read(
        &self,
        response: HttpResponse,
        options: &ReadOptions,
        start_time: SystemTime,
    ) -> Result<ReadResult, KvError> {
        let sinks = metrics::metrics();
        metrics::add(&sinks.bytes_read, response.body.len() as u64);
        sinks
            .read_latency_ms
            .observe(start_time.elapsed().unwrap_or_default());

        match response.status {
            204 | 404 => Ok(ReadResult::Missing { time: start_time }),
            412 => Ok(ReadResult::Unsatisfied { time: start_time }),
            304 => Ok(ReadResult::Unchanged {
                generation: options.if_not_equal.clone(),
                time: start_time,
            }),
            206 => {
                let start = content_range_start(&response)?;
                if let Some(offset) = options.byte_range.offset {
                    if offset != start {
                        return Err(KvError::OutOfRange(format!(
                            "requested offset {offset} but response starts at {start}"
                        )));
                    }
                }
                if let Some(length) = options.byte_range.length {
                    if length != response.body.len() as u64 {
                        return Err(KvError::OutOfRange(format!(
                            "requested {length} bytes but response carries {}",
                            response.body.len()
                        )));
                    }
                }
                Ok(ReadResult::Value {
                    value: response.body.clone(),
                    generation: generation_from_response(&response)?,
                    time: start_time,
                })
            }
            _ => {
                // A full response to what may have been a range request;
                // take the requested sub-range ourselves.
                let value = options.byte_range.slice(&response.body)?;
                Ok(ReadResult::Value {
                    value,
                    generation: generation_from_response(&response)?,
                    time: start_time,
                })
            }
        }
    }

    async fn write_impl(
        &self,
        key: &str,
        value: Bytes,
        options: WriteOptions,
    ) -> Result<TimestampedGeneration, KvError> {
        let url = self.resource_url(&uri_encode_key(key));
        self.state.write_gate.admit().await;
        let _slot = self.state.admission.admit().await;

        let content_sha256 = payload_sha256(&value);
        let mut attempt = 0u32;
        loop {
            let credentials = self.credentials().await?;

            if !options.if_equal.is_unknown() {
                if let Some(result) = self
                    .peek_precondition(&url, &options, credentials.as_ref())
                    .await?
                {
                    return Ok(result);
                }
            }

            let start_time = SystemTime::now();
            let request = RequestBuilder::new(Method::PUT, &url)
                .header("content-type", "application/octet-stream")
                .header("content-length", value.len().to_string())
                .requester_payer(self.state.config.requester_pays)
                .build(
                    &self.state.host,
                    credentials.as_ref(),
                    &self.state.region,
                    &content_sha256,
                    Utc::now(),
                    value.clone(),
                )?;
            debug!(url = %url, size = value.len(), "PUT object");

            let response = match self.state.transport.issue(request).await {
                Ok(response) => response,
                Err(error) if error.is_retryable() => {
                    self.backoff_or_abort(&mut attempt, error).await?;
                    continue;
                }
                Err(error) => return Err(error),
            };

            if response.is_success() || response.status == 404 {
                return self.finish_write(response, &options, start_time, value.len());
            }
            let error = error_from_response(&response);
            if error.is_retryable() {
                self.backoff_or_abort(&mut attempt, error).await?;
                continue;
            }
            return Err(error);
        }
    }

    /// Probe the `if-match` condition with a HEAD request.
    ///
    /// Returns the terminal precondition-failed outcome, or `None` when the
    /// mutation should proceed. A transport failure here is terminal.
    async fn peek_precondition(
        &self,
        url: &str,
        options: &WriteOptions,
        credentials: Option<&Credentials>,
    ) -> Result<Option<TimestampedGeneration>, KvError> {
        let request = RequestBuilder::new(Method::HEAD, url)
            .generation_header("if-match", &options.if_equal)
            .requester_payer(self.state.config.requester_pays)
            .build(
                &self.state.host,
                credentials,
                &self.state.region,
                EMPTY_PAYLOAD_SHA256,
                Utc::now(),
                Bytes::new(),
            )?;
        debug!(url = %url, "HEAD precondition probe");
        let response = self.state.transport.issue(request).await?;

        match response.status {
            304 | 412 => Ok(Some(TimestampedGeneration::precondition_failed(
                SystemTime::now(),
            ))),
            // Absent object: fine when absence was asserted, fatal when a
            // concrete generation was demanded.
            404 if !options.if_equal.is_no_value() => Ok(Some(
                TimestampedGeneration::precondition_failed(SystemTime::now()),
            )),
            _ => Ok(None),
        }
    }

    fn finish_write(
        &self,
        response: HttpResponse,
        options: &WriteOptions,
        start_time: SystemTime,
        bytes_written: usize,
    ) -> Result<TimestampedGeneration, KvError> {
        if response.status == 404 && !options.if_equal.is_unknown() {
            return Ok(TimestampedGeneration::precondition_failed(start_time));
        }
        let sinks = metrics::metrics();
        sinks
            .write_latency_ms
            .observe(start_time.elapsed().unwrap_or_default());
        metrics::add(&sinks.bytes_written, bytes_written as u64);

        let generation = generation_from_response(&response)?;
        Ok(TimestampedGeneration::new(generation, start_time))
    }

    async fn delete_impl(
        &self,
        key: &str,
        options: WriteOptions,
    ) -> Result<TimestampedGeneration, KvError> {
        let url = self.resource_url(&uri_encode_key(key));
        self.state.write_gate.admit().await;
        let _slot = self.state.admission.admit().await;

        let mut attempt = 0u32;
        loop {
            let credentials = self.credentials().await?;

            if !options.if_equal.is_unknown() {
                if let Some(result) = self
                    .peek_precondition(&url, &options, credentials.as_ref())
                    .await?
                {
                    return Ok(result);
                }
            }

            let start_time = SystemTime::now();
            let request = RequestBuilder::new(Method::DELETE, &url)
                .requester_payer(self.state.config.requester_pays)
                .build(
                    &self.state.host,
                    credentials.as_ref(),
                    &self.state.region,
                    EMPTY_PAYLOAD_SHA256,
                    Utc::now(),
                    Bytes::new(),
                )?;
            debug!(url = %url, "DELETE object");

            let response = match self.state.transport.issue(request).await {
                Ok(response) => response,
                Err(error) if error.is_retryable() => {
                    self.backoff_or_abort(&mut attempt, error).await?;
                    continue;
                }
                Err(error) => return Err(error),
            };

            // Deleting an absent object is success at the HTTP layer.
            if response.is_success() || response.status == 404 {
                let generation = if response.status == 404
                    && !options.if_equal.is_unknown()
                    && !options.if_equal.is_no_value()
                {
                    StorageGeneration::Unknown
                } else {
                    StorageGeneration::NoValue
                };
                return Ok(TimestampedGeneration::new(generation, start_time));
            }
            let error = error_from_response(&response);
            if error.is_retryable() {
                self.backoff_or_abort(&mut attempt, error).await?;
                continue;
            }
            return Err(error);
        }
    }

    async fn list_impl(&self, options: ListOptions, receiver: &mut dyn ListReceiver) {
        if options.range.is_empty() {
            receiver.starting(CancelHandle::new());
            receiver.done();
            receiver.stopping();
            return;
        }

        let cancel = CancelHandle::new();
        receiver.starting(cancel.clone());
        match self.list_pages(&options, &cancel, receiver).await {
            // Cancellation is a clean termination, not an error signal.
            Ok(()) | Err(KvError::Cancelled) => receiver.done(),
            Err(error) => receiver.error(error),
        }
        receiver.stopping();
    }

    async fn list_pages(
        &self,
        options: &ListOptions,
        cancel: &CancelHandle,
        receiver: &mut dyn ListReceiver,
    ) -> Result<(), KvError> {
        self.state.read_gate.admit().await;
        let _slot = self.state.admission.admit().await;

        let url = format!("{}/", self.state.endpoint);
        let prefix = list_prefix(options);

        let mut continuation_token: Option<String> = None;
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(KvError::Cancelled);
            }
            let credentials = self.credentials().await?;

            let mut builder =
                RequestBuilder::new(Method::GET, &url).query_param("list-type", "2");
            if !prefix.is_empty() {
                builder = builder.query_param("prefix", &prefix);
            }
            if let Some(ref token) = continuation_token {
                builder = builder.query_param("continuation-token", token);
            }
            let request = builder
                .requester_payer(self.state.config.requester_pays)
                .build(
                    &self.state.host,
                    credentials.as_ref(),
                    &self.state.region,
                    EMPTY_PAYLOAD_SHA256,
                    Utc::now(),
                    Bytes::new(),
                )?;
            debug!(url = %url, prefix = %prefix, "LIST page");

            let response = match self.state.transport.issue(request).await {
                Ok(response) if response.is_success() => response,
                Ok(response) => {
                    let error = error_from_response(&response);
                    if error.is_retryable() {
                        self.backoff_or_abort(&mut attempt, error).await?;
                        continue;
                    }
                    return Err(error);
                }
                Err(error) if error.is_retryable() => {
                    self.backoff_or_abort(&mut attempt, error).await?;
                    continue;
                }
                Err(error) => return Err(error),
            };

            let body = String::from_utf8_lossy(&response.body);
            let page = xml::parse_list_page(&body)?;

            for key in page.keys {
                if cancel.is_cancelled() {
                    return Err(KvError::Cancelled);
                }
                if options.range.contains(&key) {
                    receiver.value(strip_prefix(key, options.strip_prefix_length));
                }
            }

            // Backoff tracks consecutive failures, not pages.
            attempt = 0;
            match page.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => return Ok(()),
            }
        }
    }

    async fn delete_range_impl(&self, range: KeyRange) -> Result<(), KvError> {
        if range.is_empty() {
            return Ok(());
        }
        let mut receiver = DeleteRangeReceiver {
            driver: self.clone(),
            deletes: JoinSet::new(),
            failure: None,
        };
        let options = ListOptions {
            range,
            strip_prefix_length: 0,
        };
        self.list(options, &mut receiver).await;
        receiver.finish().await
    }
}

#[async_trait]
impl KvStoreDriver for S3Driver {
    async fn read(&self, key: &str, options: ReadOptions) -> Result<ReadResult, KvError> {
        metrics::increment(&metrics::metrics().read);
        validate_key(key)?;
        validate_generation(&options.if_equal)?;
        validate_generation(&options.if_not_equal)?;
        self.read_impl(key, options).await
    }

    async fn write(
        &self,
        key: &str,
        value: Bytes,
        options: WriteOptions,
    ) -> Result<TimestampedGeneration, KvError> {
        metrics::increment(&metrics::metrics().write);
        validate_key(key)?;
        validate_generation(&options.if_equal)?;
        self.write_impl(key, value, options).await
    }

    async fn delete(
        &self,
        key: &str,
        options: WriteOptions,
    ) -> Result<TimestampedGeneration, KvError> {
        metrics::increment(&metrics::metrics().write);
        validate_key(key)?;
        validate_generation(&options.if_equal)?;
        self.delete_impl(key, options).await
    }

    async fn delete_range(&self, range: KeyRange) -> Result<(), KvError> {
        metrics::increment(&metrics::metrics().delete_range);
        self.delete_range_impl(range).await
    }

    async fn list(&self, options: ListOptions, receiver: &mut dyn ListReceiver) {
        metrics::increment(&metrics::metrics().list);
        self.list_impl(options, receiver).await
    }
}

/// Wires a list stream into per-key delete tasks.
///
/// Deletes are spawned as keys arrive; nothing slows the listing down if
/// deletes fall behind.
struct DeleteRangeReceiver {
    driver: S3Driver,
    deletes: JoinSet<Result<TimestampedGeneration, KvError>>,
    failure: Option<KvError>,
}

impl ListReceiver for DeleteRangeReceiver {
    fn starting(&mut self, _cancel: CancelHandle) {}

    fn value(&mut self, key: String) {
        let driver = self.driver.clone();
        self.deletes.spawn(async move {
            driver.delete(&key, WriteOptions::default()).await
        });
    }

    fn done(&mut self) {}

    fn error(&mut self, error: KvError) {
        self.failure = Some(error);
    }

    fn stopping(&mut self) {}
}

impl DeleteRangeReceiver {
    /// Wait out every spawned delete, surfacing the listing error or the
    /// first delete failure.
    async fn finish(mut self) -> Result<(), KvError> {
        let mut first_failure = self.failure.take();
        while let Some(joined) = self.deletes.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => Err(KvError::Network(format!(
                    "delete task failed: {join_error}"
                ))),
            };
            if let Err(error) = outcome {
                first_failure.get_or_insert(error);
            }
        }
        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn validate_key(key: &str) -> Result<(), KvError> {
    if is_valid_object_key(key) {
        Ok(())
    } else {
        Err(KvError::InvalidArgument(format!(
            "invalid S3 object name: {key:?}"
        )))
    }
}

fn validate_generation(generation: &StorageGeneration) -> Result<(), KvError> {
    if generation.is_well_formed() {
        Ok(())
    } else {
        Err(KvError::InvalidArgument(
            "malformed storage generation".to_string(),
        ))
    }
}

/// The ListObjectsV2 `prefix` parameter: the range's lower bound, cut down
/// to the strip length so stripped and unstripped keys share pages.
fn list_prefix(options: &ListOptions) -> String {
    let mut prefix = options.range.inclusive_min.clone();
    let strip = options.strip_prefix_length;
    if strip > 0 && strip < prefix.len() {
        let mut cut = strip;
        while !prefix.is_char_boundary(cut) {
            cut -= 1;
        }
        prefix.truncate(cut);
    }
    prefix
}

fn strip_prefix(key: String, strip: usize) -> String {
    if strip == 0 {
        return key;
    }
    match key.get(strip..) {
        Some(stripped) => stripped.to_string(),
        None => key,
    }
}

/// Resolve `(endpoint, host, region)` for a driver instance.
async fn resolve_endpoint(
    config: &S3Config,
    transport: &dyn HttpTransport,
) -> Result<(String, String, String), KvError> {
    if let Some(ref endpoint) = config.endpoint {
        let parsed = url::Url::parse(endpoint)
            .map_err(|e| KvError::InvalidConfig(format!("endpoint {endpoint:?}: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(KvError::InvalidConfig(format!(
                "endpoint {endpoint:?} has scheme {:?}; must be http or https",
                parsed.scheme()
            )));
        }
        if parsed.query().is_some() {
            return Err(KvError::InvalidConfig(format!(
                "query in endpoint unsupported: {endpoint:?}"
            )));
        }
        if parsed.fragment().is_some() {
            return Err(KvError::InvalidConfig(format!(
                "fragment in endpoint unsupported: {endpoint:?}"
            )));
        }
        let host = match config.host {
            Some(ref host) => host.clone(),
            None => {
                let mut authority = parsed.host_str().unwrap_or_default().to_string();
                if let Some(port) = parsed.port() {
                    authority.push_str(&format!(":{port}"));
                }
                authority
            }
        };
        let endpoint = endpoint.trim_end_matches('/').to_string();
        return Ok((endpoint, host, config.aws_region.clone()));
    }

    if !config.aws_region.is_empty() {
        let host = format!(
            "{}.s3.{}{AMAZON_AWS_SUFFIX}",
            config.bucket, config.aws_region
        );
        return Ok((
            format!("https://{host}"),
            host,
            config.aws_region.clone(),
        ));
    }

    // No endpoint and no region: assume AWS and probe the bucket's home
    // region with an unsigned HEAD against the global endpoint.
    let probe_url = format!("https://{}.s3{AMAZON_AWS_SUFFIX}", config.bucket);
    debug!(url = %probe_url, "probing bucket region");
    let response = transport
        .issue(HttpRequest::new(Method::HEAD, &probe_url))
        .await?;
    match response.header(BUCKET_REGION_HEADER) {
        Some(region) => {
            let region = region.to_string();
            let host = format!("{}.s3.{region}{AMAZON_AWS_SUFFIX}", config.bucket);
            Ok((format!("https://{host}"), host, region))
        }
        None => Err(KvError::BucketNotFound(config.bucket.clone())),
    }
}

fn generation_from_response(response: &HttpResponse) -> Result<StorageGeneration, KvError> {
    match response.header("etag") {
        Some(etag) => Ok(StorageGeneration::from_etag_header(etag)),
        None => Err(KvError::Parse("missing ETag header".to_string())),
    }
}

/// Parse the start offset out of a `Content-Range: bytes a-b/n` header.
fn content_range_start(response: &HttpResponse) -> Result<u64, KvError> {
    let value = response
        .header("content-range")
        .ok_or_else(|| KvError::Parse("206 response without Content-Range".to_string()))?;
    let positions = value
        .strip_prefix("bytes ")
        .ok_or_else(|| KvError::Parse(format!("unparseable Content-Range {value:?}")))?;
    let start = positions
        .split('-')
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| KvError::Parse(format!("unparseable Content-Range {value:?}")))?;
    Ok(start)
}

/// Build a driver error from a non-success response, pulling the S3 error
/// code and message out of the XML body when there is one. The code feeds
/// retry classification (403 + RequestTimeTooSkewed is retryable).
fn error_from_response(response: &HttpResponse) -> KvError {
    let body = String::from_utf8_lossy(&response.body);
    let code = xml::extract_tag(&body, "Code");
    let message = xml::extract_tag(&body, "Message")
        .or_else(|| code.clone())
        .unwrap_or_else(|| sanitize_error_body(&body));
    KvError::Server {
        status: response.status,
        code,
        message,
    }
}

/// First line of an error body, truncated so huge payloads stay out of
/// error chains and logs.
fn sanitize_error_body(body: &str) -> String {
    let first_line = body.lines().next().unwrap_or("").trim();
    if first_line.is_empty() {
        return "no error detail".to_string();
    }
    let mut end = first_line.len().min(200);
    while !first_line.is_char_boundary(end) {
        end -= 1;
    }
    first_line[..end].to_string()
}
