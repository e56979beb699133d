//! Shared types for the key-value store surface
//!
//! This module contains the types every driver operation speaks in:
//! storage generations, read results, byte and key ranges, per-operation
//! options, and the driver error type.

use std::time::SystemTime;

use bytes::Bytes;
use thiserror::Error;

/// An empty quoted ETag, used as the wire encoding of [`StorageGeneration::NoValue`].
pub const EMPTY_ETAG: &str = "\"\"";

/// A version token for a stored object.
///
/// S3 identifies object versions by ETag. A generation either makes no
/// assertion (`Unknown`), asserts that the object is absent (`NoValue`),
/// or names a concrete version (`ETag`). The ETag is kept in its quoted
/// wire form exactly as S3 returns it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageGeneration {
    /// No assertion about the object's version.
    #[default]
    Unknown,
    /// Asserts the object does not exist.
    NoValue,
    /// A concrete version, as a quoted ETag string.
    ETag(String),
}

impl StorageGeneration {
    pub fn is_unknown(&self) -> bool {
        matches!(self, StorageGeneration::Unknown)
    }

    pub fn is_no_value(&self) -> bool {
        matches!(self, StorageGeneration::NoValue)
    }

    /// Value for a conditional header (`if-match` / `if-none-match`).
    ///
    /// `Unknown` means the header is omitted entirely. `NoValue` encodes as
    /// an empty quoted string, which cannot collide with a real ETag.
    pub fn header_value(&self) -> Option<&str> {
        match self {
            StorageGeneration::Unknown => None,
            StorageGeneration::NoValue => Some(EMPTY_ETAG),
            StorageGeneration::ETag(etag) => Some(etag),
        }
    }

    /// Parse a generation from a response `ETag` header value.
    pub fn from_etag_header(raw: &str) -> StorageGeneration {
        if raw.is_empty() || raw == EMPTY_ETAG {
            StorageGeneration::NoValue
        } else if raw.starts_with('"') {
            StorageGeneration::ETag(raw.to_string())
        } else {
            // Some S3-compatible services omit the quotes.
            StorageGeneration::ETag(format!("\"{raw}\""))
        }
    }

    /// A concrete generation must carry a non-empty ETag; the empty quoted
    /// string is reserved for the `NoValue` encoding.
    pub fn is_well_formed(&self) -> bool {
        match self {
            StorageGeneration::ETag(etag) => !etag.is_empty() && etag != EMPTY_ETAG,
            _ => true,
        }
    }
}

/// A generation paired with the time it was observed.
///
/// Write and delete operations resolve to this. `generation == Unknown`
/// means the operation's precondition did not hold and nothing was changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedGeneration {
    pub generation: StorageGeneration,
    pub time: SystemTime,
}

impl TimestampedGeneration {
    pub fn new(generation: StorageGeneration, time: SystemTime) -> Self {
        Self { generation, time }
    }

    /// The outcome of a conditional write or delete whose precondition failed.
    pub fn precondition_failed(time: SystemTime) -> Self {
        Self::new(StorageGeneration::Unknown, time)
    }

    pub fn precondition_ok(&self) -> bool {
        !self.generation.is_unknown()
    }
}

/// The outcome of a read.
///
/// Conditional outcomes are results, not errors: a missing object, a failed
/// `if_equal`, and an unchanged `if_not_equal` all resolve the read. The
/// timestamp is always the request start time, so it is a valid lower bound
/// for the returned generation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    /// The object exists and the value was read.
    Value {
        value: Bytes,
        generation: StorageGeneration,
        time: SystemTime,
    },
    /// The object does not exist.
    Missing { time: SystemTime },
    /// The `if_equal` condition did not hold.
    Unsatisfied { time: SystemTime },
    /// The `if_not_equal` condition did not hold; the object still has
    /// that generation.
    Unchanged {
        generation: StorageGeneration,
        time: SystemTime,
    },
}

impl ReadResult {
    pub fn time(&self) -> SystemTime {
        match self {
            ReadResult::Value { time, .. }
            | ReadResult::Missing { time }
            | ReadResult::Unsatisfied { time }
            | ReadResult::Unchanged { time, .. } => *time,
        }
    }
}

/// A byte range of an object, possibly open on either end.
///
/// `offset` without `length` reads to the end of the object; `length`
/// without `offset` reads the final `length` bytes (a suffix request).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    pub offset: Option<u64>,
    pub length: Option<u64>,
}

impl ByteRange {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn is_full(&self) -> bool {
        self.offset.is_none() && self.length.is_none()
    }

    /// `Range` header value, or `None` when the range is unconstrained.
    pub fn header_value(&self) -> Option<String> {
        match (self.offset, self.length) {
            (None, None) => None,
            (Some(offset), None) => Some(format!("bytes={offset}-")),
            (Some(offset), Some(length)) => {
                Some(format!("bytes={offset}-{}", offset + length.saturating_sub(1)))
            }
            (None, Some(length)) => Some(format!("bytes=-{length}")),
        }
    }

    /// Extract this range from a full-object payload.
    ///
    /// Used when the server ignored the `Range` header and returned the
    /// whole object. A suffix request is clamped to the payload size; an
    /// explicit offset or length that does not fit is an error.
    pub fn slice(&self, payload: &Bytes) -> Result<Bytes, KvError> {
        let len = payload.len() as u64;
        match (self.offset, self.length) {
            (None, None) => Ok(payload.clone()),
            (None, Some(suffix)) => {
                let start = len.saturating_sub(suffix);
                Ok(payload.slice(start as usize..))
            }
            (Some(offset), length) => {
                let end = match length {
                    Some(length) => offset.checked_add(length).ok_or_else(|| {
                        KvError::OutOfRange(format!("byte range {self:?} overflows"))
                    })?,
                    None => len,
                };
                if offset > len || end > len {
                    return Err(KvError::OutOfRange(format!(
                        "byte range {self:?} exceeds object size {len}"
                    )));
                }
                Ok(payload.slice(offset as usize..end as usize))
            }
        }
    }
}

/// A half-open range of keys, `[inclusive_min, exclusive_max)`.
///
/// An empty `exclusive_max` means the range is unbounded above.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyRange {
    pub inclusive_min: String,
    pub exclusive_max: String,
}

impl KeyRange {
    pub fn new(inclusive_min: impl Into<String>, exclusive_max: impl Into<String>) -> Self {
        Self {
            inclusive_min: inclusive_min.into(),
            exclusive_max: exclusive_max.into(),
        }
    }

    /// The range containing every key.
    pub fn all() -> Self {
        Self::default()
    }

    /// The range of keys beginning with `prefix`.
    ///
    /// The upper bound is the key successor of the prefix: the last
    /// non-0xff byte incremented, trailing 0xff bytes dropped. A prefix of
    /// all 0xff bytes has no successor and yields an unbounded range.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let exclusive_max = key_successor(prefix.as_bytes());
        Self {
            inclusive_min: prefix,
            exclusive_max,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.exclusive_max.is_empty() && self.inclusive_min >= self.exclusive_max
    }

    pub fn contains(&self, key: &str) -> bool {
        key >= self.inclusive_min.as_str()
            && (self.exclusive_max.is_empty() || key < self.exclusive_max.as_str())
    }
}

fn key_successor(prefix: &[u8]) -> String {
    let mut bytes = prefix.to_vec();
    while let Some(last) = bytes.pop() {
        if last != 0xff {
            bytes.push(last + 1);
            break;
        }
    }
    // An increment at a multi-byte boundary can leave invalid UTF-8;
    // treat that the same as "no successor".
    String::from_utf8(bytes).unwrap_or_default()
}

/// Options for a read.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    pub byte_range: ByteRange,
    /// The read only succeeds if the object currently has this generation.
    pub if_equal: StorageGeneration,
    /// The value is only returned if the object's generation differs.
    pub if_not_equal: StorageGeneration,
}

/// Options for a write or delete.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// The operation only proceeds if the object currently has this
    /// generation (`NoValue` asserts absence).
    pub if_equal: StorageGeneration,
}

/// Options for a list.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub range: KeyRange,
    /// Number of leading bytes stripped from each emitted key.
    pub strip_prefix_length: usize,
}

/// Driver error type.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("bucket {0:?} not found")]
    BucketNotFound(String),

    #[error("all {attempts} retry attempts failed: {last}")]
    Aborted { attempts: u32, last: String },

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("credential error: {0}")]
    Credentials(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server error ({status}): {message}")]
    Server {
        status: u16,
        /// S3 error code from the XML body, when one was present.
        code: Option<String>,
        message: String,
    },

    #[error("malformed response: {0}")]
    Parse(String),
}

impl KvError {
    /// Whether a fresh attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            KvError::Network(_) => true,
            KvError::Server { status, code, .. } => {
                crate::retry::is_retryable_status(*status)
                    || crate::retry::is_clock_skew(*status, code.as_deref())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_header_encoding() {
        assert_eq!(StorageGeneration::Unknown.header_value(), None);
        assert_eq!(StorageGeneration::NoValue.header_value(), Some("\"\""));
        assert_eq!(
            StorageGeneration::ETag("\"abc123\"".to_string()).header_value(),
            Some("\"abc123\"")
        );
    }

    #[test]
    fn test_generation_from_etag_header() {
        assert_eq!(
            StorageGeneration::from_etag_header("\"abc\""),
            StorageGeneration::ETag("\"abc\"".to_string())
        );
        assert_eq!(
            StorageGeneration::from_etag_header("abc"),
            StorageGeneration::ETag("\"abc\"".to_string())
        );
        assert_eq!(
            StorageGeneration::from_etag_header("\"\""),
            StorageGeneration::NoValue
        );
        assert_eq!(
            StorageGeneration::from_etag_header(""),
            StorageGeneration::NoValue
        );
    }

    #[test]
    fn test_generation_well_formed() {
        assert!(StorageGeneration::Unknown.is_well_formed());
        assert!(StorageGeneration::NoValue.is_well_formed());
        assert!(StorageGeneration::ETag("\"abc\"".to_string()).is_well_formed());
        assert!(!StorageGeneration::ETag(String::new()).is_well_formed());
        assert!(!StorageGeneration::ETag("\"\"".to_string()).is_well_formed());
    }

    #[test]
    fn test_byte_range_header() {
        assert_eq!(ByteRange::full().header_value(), None);
        let from = ByteRange {
            offset: Some(100),
            length: None,
        };
        assert_eq!(from.header_value(), Some("bytes=100-".to_string()));
        let bounded = ByteRange {
            offset: Some(100),
            length: Some(50),
        };
        assert_eq!(bounded.header_value(), Some("bytes=100-149".to_string()));
        let suffix = ByteRange {
            offset: None,
            length: Some(16),
        };
        assert_eq!(suffix.header_value(), Some("bytes=-16".to_string()));
    }

    #[test]
    fn test_byte_range_slice() {
        let payload = Bytes::from_static(b"0123456789");
        let bounded = ByteRange {
            offset: Some(2),
            length: Some(3),
        };
        assert_eq!(bounded.slice(&payload).unwrap(), Bytes::from_static(b"234"));

        let from = ByteRange {
            offset: Some(7),
            length: None,
        };
        assert_eq!(from.slice(&payload).unwrap(), Bytes::from_static(b"789"));

        let suffix = ByteRange {
            offset: None,
            length: Some(4),
        };
        assert_eq!(suffix.slice(&payload).unwrap(), Bytes::from_static(b"6789"));

        // Suffix longer than the object is clamped, never an error.
        let long_suffix = ByteRange {
            offset: None,
            length: Some(100),
        };
        assert_eq!(long_suffix.slice(&payload).unwrap(), payload);
    }

    #[test]
    fn test_byte_range_slice_out_of_bounds() {
        let payload = Bytes::from_static(b"0123456789");
        let past_end = ByteRange {
            offset: Some(8),
            length: Some(5),
        };
        assert!(matches!(
            past_end.slice(&payload),
            Err(KvError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_key_range_contains() {
        let range = KeyRange::new("p/", "p/~");
        assert!(range.contains("p/"));
        assert!(range.contains("p/123"));
        assert!(!range.contains("p/~"));
        assert!(!range.contains("q"));
        assert!(!range.contains("o"));
    }

    #[test]
    fn test_key_range_unbounded() {
        let range = KeyRange::new("m", "");
        assert!(range.contains("m"));
        assert!(range.contains("zzz"));
        assert!(!range.contains("a"));
        assert!(!range.is_empty());
    }

    #[test]
    fn test_key_range_empty() {
        assert!(KeyRange::new("b", "a").is_empty());
        assert!(KeyRange::new("a", "a").is_empty());
        assert!(!KeyRange::all().is_empty());
    }

    #[test]
    fn test_prefix_range() {
        let range = KeyRange::prefix("p/");
        assert_eq!(range.inclusive_min, "p/");
        assert_eq!(range.exclusive_max, "p0");
        assert!(range.contains("p/1"));
        assert!(range.contains("p/zzz"));
        assert!(!range.contains("p0"));
        assert!(!range.contains("q"));
    }

    #[test]
    fn test_prefix_range_empty_prefix_is_unbounded() {
        let range = KeyRange::prefix("");
        assert_eq!(range.exclusive_max, "");
        assert!(range.contains("anything"));
    }

    #[test]
    fn test_read_result_time() {
        let now = SystemTime::now();
        assert_eq!(ReadResult::Missing { time: now }.time(), now);
    }

    #[test]
    fn test_error_retryability() {
        assert!(KvError::Network("reset".into()).is_retryable());
        assert!(KvError::Server {
            status: 503,
            code: Some("SlowDown".into()),
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!KvError::Server {
            status: 403,
            code: Some("AccessDenied".into()),
            message: "denied".into()
        }
        .is_retryable());
        assert!(!KvError::InvalidArgument("bad key".into()).is_retryable());
        assert!(!KvError::Cancelled.is_retryable());
    }

    #[test]
    fn test_clock_skew_rejection_is_retryable() {
        // A skewed clock yields 403, but re-signing with a fresh
        // timestamp can succeed.
        assert!(KvError::Server {
            status: 403,
            code: Some("RequestTimeTooSkewed".into()),
            message: "request time too skewed".into()
        }
        .is_retryable());
        assert!(!KvError::Server {
            status: 403,
            code: None,
            message: "forbidden".into()
        }
        .is_retryable());
    }
}
