//! SigV4 request construction and signing.
//!
//! A [`RequestBuilder`] accumulates the method, URL, query parameters and
//! headers for one S3 request, then [`build`](RequestBuilder::build) signs
//! it with AWS Signature Version 4 and produces the transport request.
//! Anonymous requests (no resolved credentials) are built without any
//! authentication headers.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha2::{Digest, Sha256};

use crate::transport::HttpRequest;
use crate::types::{ByteRange, KvError, StorageGeneration};

use super::credentials::Credentials;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of an empty payload, used for all bodyless verbs.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Hex-encoded SHA-256 of a request payload.
pub fn payload_sha256(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Builder for one signed S3 request.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl RequestBuilder {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn query_param(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a header. Names are lowercased so canonicalization is uniform.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Add a conditional header encoding a storage generation. An `Unknown`
    /// generation adds nothing.
    pub fn generation_header(self, name: &str, generation: &StorageGeneration) -> Self {
        match generation.header_value() {
            Some(value) => self.header(name, value),
            None => self,
        }
    }

    /// Add `x-amz-request-payer: requester` when requester-pays is on.
    pub fn requester_payer(self, enabled: bool) -> Self {
        if enabled {
            self.header("x-amz-request-payer", "requester")
        } else {
            self
        }
    }

    /// Add a `Range` header when the byte range constrains either end.
    pub fn byte_range(self, range: &ByteRange) -> Self {
        match range.header_value() {
            Some(value) => self.header("range", value),
            None => self,
        }
    }

    /// Sign and assemble the transport request.
    ///
    /// With credentials, adds `x-amz-date`, `x-amz-content-sha256`, the
    /// session token when present, and the `Authorization` header over all
    /// accumulated headers. Without credentials the request goes out bare.
    pub fn build(
        self,
        host: &str,
        credentials: Option<&Credentials>,
        region: &str,
        content_sha256: &str,
        time: DateTime<Utc>,
        body: Bytes,
    ) -> Result<HttpRequest, KvError> {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            let query_string = self
                .query
                .iter()
                .map(|(name, value)| {
                    format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
                })
                .collect::<Vec<_>>()
                .join("&");
            url = format!("{url}?{query_string}");
        }

        let mut headers = self.headers;
        headers.push(("host".to_string(), host.to_string()));

        if let Some(credentials) = credentials {
            let amz_date = time.format("%Y%m%dT%H%M%SZ").to_string();
            let date_stamp = time.format("%Y%m%d").to_string();

            headers.push(("x-amz-date".to_string(), amz_date.clone()));
            headers.push((
                "x-amz-content-sha256".to_string(),
                content_sha256.to_string(),
            ));
            if let Some(ref token) = credentials.session_token {
                headers.push(("x-amz-security-token".to_string(), token.clone()));
            }

            let authorization = sign(
                self.method.as_str(),
                &self.url,
                &self.query,
                &headers,
                credentials,
                region,
                content_sha256,
                &amz_date,
                &date_stamp,
            )?;
            headers.push(("authorization".to_string(), authorization));
        }

        Ok(HttpRequest {
            method: self.method,
            url,
            headers,
            body,
        })
    }
}

/// Compute the SigV4 `Authorization` header value.
#[allow(clippy::too_many_arguments)]
fn sign(
    method: &str,
    url: &str,
    query: &[(String, String)],
    headers: &[(String, String)],
    credentials: &Credentials,
    region: &str,
    content_sha256: &str,
    amz_date: &str,
    date_stamp: &str,
) -> Result<String, KvError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| KvError::InvalidConfig(format!("unparseable request URL {url:?}: {e}")))?;

    // The path arrives already percent-encoded by the driver; S3 canonical
    // URIs must use it as-is, without a second encoding pass.
    let canonical_uri = match parsed.path() {
        "" => "/",
        path => path,
    };

    // Canonical query: sorted by name, then value, both encoded.
    let canonical_query = {
        let mut pairs: Vec<(String, String)> = query
            .iter()
            .map(|(name, value)| {
                (
                    urlencoding::encode(name).into_owned(),
                    urlencoding::encode(value).into_owned(),
                )
            })
            .collect();
        pairs.sort();
        pairs
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    };

    // Canonical headers: sorted by name, values trimmed.
    let mut sorted: Vec<(&str, &str)> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    sorted.sort();

    let signed_headers = sorted
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers = sorted
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect::<String>();

    let canonical_request = format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers}\n{content_sha256}"
    );

    let credential_scope = format!("{date_stamp}/{region}/s3/aws4_request");
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
        payload_sha256(canonical_request.as_bytes())
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", credentials.signing_secret()).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, b"s3");
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

    Ok(format!(
        "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.access_key_id,
    ))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
