//! AeroKV: an Amazon S3-backed key-value store driver.
//!
//! Exposes a generic object-store abstraction (read / write / delete /
//! range-delete / list) over the S3 REST API, speaking HTTP directly with
//! AWS Signature Version 4 instead of pulling in aws-sdk-s3.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                KvStoreDriver trait                 │
//! │        read, write, delete, delete_range, list     │
//! └────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌────────────────────────────────────────────────────┐
//! │                     S3Driver                       │
//! │  rate gates → admission queue → sign → issue →     │
//! │  classify → retry with backoff                     │
//! └────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//!            HttpTransport (reqwest / test double)
//! ```
//!
//! Conditional reads ride S3's `if-match`/`if-none-match` support;
//! conditional writes and deletes are emulated with a HEAD probe first,
//! since S3 has neither a conditional PUT nor a conditional DELETE.

pub mod admission;
pub mod driver;
pub mod metrics;
pub mod retry;
pub mod s3;
pub mod transport;
pub mod types;

pub use driver::{
    format_s3_url, open_url, parse_s3_url, CancelHandle, KvStoreDriver, ListReceiver,
};
pub use retry::RetryConfig;
pub use s3::config::{RateLimiterConfig, S3Config};
pub use s3::S3Driver;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{
    ByteRange, KeyRange, KvError, ListOptions, ReadOptions, ReadResult, StorageGeneration,
    TimestampedGeneration, WriteOptions,
};
