//! Bucket and object-key validation, plus object-key URI encoding.

/// Check a bucket name against S3 naming rules.
///
/// Standard names are 3-63 characters of lowercase letters, digits, dots
/// and hyphens, starting and ending alphanumeric, with no `..` and no
/// IPv4-address form. Names of 64-255 characters are accepted under the
/// legacy us-east-1 rules, which additionally allow uppercase letters and
/// underscores.
pub fn is_valid_bucket_name(bucket: &str) -> bool {
    let len = bucket.len();
    if !(3..=255).contains(&len) {
        return false;
    }

    let legacy = len > 63;
    let valid_char = |c: char| {
        c.is_ascii_lowercase()
            || c.is_ascii_digit()
            || c == '-'
            || c == '.'
            || (legacy && (c.is_ascii_uppercase() || c == '_'))
    };
    if !bucket.chars().all(valid_char) {
        return false;
    }

    let first = bucket.chars().next();
    let last = bucket.chars().last();
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !edge_ok(first) || !edge_ok(last) {
        return false;
    }

    if bucket.contains("..") || bucket.contains(".-") || bucket.contains("-.") {
        return false;
    }

    // Reject names that look like an IPv4 address.
    if !legacy && bucket.split('.').count() == 4 {
        let all_numeric = bucket
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        if all_numeric {
            return false;
        }
    }

    true
}

/// Check an object key: non-empty, at most 1024 bytes, no control
/// characters, and no `.` or `..` path segments.
pub fn is_valid_object_key(key: &str) -> bool {
    if key.is_empty() || key.len() > 1024 {
        return false;
    }
    if key.chars().any(|c| c.is_control()) {
        return false;
    }
    if key.split('/').any(|segment| segment == "." || segment == "..") {
        return false;
    }
    true
}

/// Percent-encode an object key for use in a request path.
///
/// Each segment is encoded independently so the `/` separators survive.
pub fn uri_encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_bucket_names() {
        assert!(is_valid_bucket_name("my-bucket"));
        assert!(is_valid_bucket_name("abc"));
        assert!(is_valid_bucket_name("bucket.with.dots"));
        assert!(is_valid_bucket_name("b1234567890"));
    }

    #[test]
    fn test_invalid_bucket_names() {
        assert!(!is_valid_bucket_name(""));
        assert!(!is_valid_bucket_name("ab"));
        assert!(!is_valid_bucket_name("-leading-hyphen"));
        assert!(!is_valid_bucket_name("trailing-hyphen-"));
        assert!(!is_valid_bucket_name(".leading.dot"));
        assert!(!is_valid_bucket_name("double..dot"));
        assert!(!is_valid_bucket_name("dash-.dot"));
        assert!(!is_valid_bucket_name("192.168.0.1"));
        assert!(!is_valid_bucket_name("Uppercase"));
        assert!(!is_valid_bucket_name("under_score"));
        assert!(!is_valid_bucket_name("spaces no"));
    }

    #[test]
    fn test_legacy_long_bucket_names() {
        let legacy = format!("Legacy_Bucket_{}", "x".repeat(60));
        assert!(legacy.len() > 63);
        assert!(is_valid_bucket_name(&legacy));

        let too_long = "a".repeat(256);
        assert!(!is_valid_bucket_name(&too_long));
    }

    #[test]
    fn test_valid_object_keys() {
        assert!(is_valid_object_key("a"));
        assert!(is_valid_object_key("a/b/c"));
        assert!(is_valid_object_key("tmp/data.bin"));
        assert!(is_valid_object_key("unicode/\u{00e9}t\u{00e9}"));
        assert!(is_valid_object_key("has space"));
        assert!(is_valid_object_key("dotted.file..name")); // dots inside a segment are fine
    }

    #[test]
    fn test_invalid_object_keys() {
        assert!(!is_valid_object_key(""));
        assert!(!is_valid_object_key("."));
        assert!(!is_valid_object_key(".."));
        assert!(!is_valid_object_key("a/../b"));
        assert!(!is_valid_object_key("./a"));
        assert!(!is_valid_object_key("a/."));
        assert!(!is_valid_object_key("tab\there"));
        assert!(!is_valid_object_key(&"k".repeat(1025)));
    }

    #[test]
    fn test_uri_encode_key_preserves_separators() {
        assert_eq!(uri_encode_key("a/b/c"), "a/b/c");
        assert_eq!(uri_encode_key("a b/c"), "a%20b/c");
        assert_eq!(uri_encode_key("k=v/x&y"), "k%3Dv/x%26y");
        assert_eq!(uri_encode_key("caf\u{00e9}"), "caf%C3%A9");
    }
}
