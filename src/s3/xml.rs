//! ListObjectsV2 response parsing.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::types::KvError;

/// One parsed page of a ListObjectsV2 result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    /// Object keys in document order.
    pub keys: Vec<String>,
    /// Continuation token for the next page, when the result was truncated.
    pub next_continuation_token: Option<String>,
}

/// Parse a `ListBucketResult` XML payload.
pub fn parse_list_page(xml: &str) -> Result<ListPage, KvError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut saw_result_tag = false;
    let mut in_contents = false;
    let mut current_tag = String::new();

    let mut key_count: Option<u64> = None;
    let mut keys: Vec<String> = Vec::new();
    let mut is_truncated: Option<bool> = None;
    let mut next_token: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let tag_name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag_name.as_str() {
                    "ListBucketResult" => saw_result_tag = true,
                    "Contents" => in_contents = true,
                    _ => current_tag = tag_name,
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| KvError::Parse(format!("XML unescape error: {e}")))?
                    .trim()
                    .to_string();
                if text.is_empty() {
                    buf.clear();
                    continue;
                }
                match current_tag.as_str() {
                    "Key" if in_contents => keys.push(text),
                    "KeyCount" if !in_contents => {
                        let count = text.parse::<u64>().map_err(|_| {
                            KvError::Parse(format!("malformed KeyCount {text:?}"))
                        })?;
                        key_count = Some(count);
                    }
                    "IsTruncated" if !in_contents => {
                        is_truncated = Some(text == "true");
                    }
                    "NextContinuationToken" if !in_contents => {
                        next_token = Some(text);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"Contents" {
                    in_contents = false;
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(KvError::Parse(format!("XML parse error: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_result_tag {
        return Err(KvError::Parse("missing ListBucketResult element".to_string()));
    }
    let key_count =
        key_count.ok_or_else(|| KvError::Parse("missing KeyCount element".to_string()))?;
    if keys.len() as u64 != key_count {
        return Err(KvError::Parse(format!(
            "KeyCount {key_count} does not match {} Contents entries",
            keys.len()
        )));
    }
    let truncated = is_truncated
        .ok_or_else(|| KvError::Parse("missing IsTruncated element".to_string()))?;

    let next_continuation_token = if truncated {
        Some(next_token.ok_or_else(|| {
            KvError::Parse("truncated result without NextContinuationToken".to_string())
        })?)
    } else {
        None
    };

    Ok(ListPage {
        keys,
        next_continuation_token,
    })
}

/// Extract the text content of the first `tag` element, if any.
///
/// Used to pull `Code`/`Message` out of S3 error payloads.
pub fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut inside = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == tag.as_bytes() {
                    inside = true;
                }
            }
            Ok(Event::Text(ref e)) => {
                if inside {
                    if let Ok(text) = e.unescape() {
                        let trimmed = text.trim().to_string();
                        if !trimmed.is_empty() {
                            return Some(trimmed);
                        }
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == tag.as_bytes() {
                    inside = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">{body}</ListBucketResult>"
        )
    }

    #[test]
    fn test_parse_single_page() {
        let xml = page(
            "<Name>bucket</Name><Prefix>p/</Prefix><KeyCount>2</KeyCount>\
             <MaxKeys>1000</MaxKeys><IsTruncated>false</IsTruncated>\
             <Contents><Key>p/1</Key><Size>3</Size><ETag>\"e1\"</ETag></Contents>\
             <Contents><Key>p/2</Key><Size>4</Size><ETag>\"e2\"</ETag></Contents>",
        );
        let parsed = parse_list_page(&xml).unwrap();
        assert_eq!(parsed.keys, vec!["p/1", "p/2"]);
        assert!(parsed.next_continuation_token.is_none());
    }

    #[test]
    fn test_parse_truncated_page() {
        let xml = page(
            "<KeyCount>1</KeyCount><IsTruncated>true</IsTruncated>\
             <NextContinuationToken>tok123</NextContinuationToken>\
             <Contents><Key>a</Key></Contents>",
        );
        let parsed = parse_list_page(&xml).unwrap();
        assert_eq!(parsed.keys, vec!["a"]);
        assert_eq!(parsed.next_continuation_token.as_deref(), Some("tok123"));
    }

    #[test]
    fn test_parse_empty_page() {
        let xml = page("<KeyCount>0</KeyCount><IsTruncated>false</IsTruncated>");
        let parsed = parse_list_page(&xml).unwrap();
        assert!(parsed.keys.is_empty());
        assert!(parsed.next_continuation_token.is_none());
    }

    #[test]
    fn test_parse_escaped_key() {
        let xml = page(
            "<KeyCount>1</KeyCount><IsTruncated>false</IsTruncated>\
             <Contents><Key>a&amp;b</Key></Contents>",
        );
        let parsed = parse_list_page(&xml).unwrap();
        assert_eq!(parsed.keys, vec!["a&b"]);
    }

    #[test]
    fn test_malformed_key_count() {
        let xml = page("<KeyCount>lots</KeyCount><IsTruncated>false</IsTruncated>");
        let err = parse_list_page(&xml).unwrap_err();
        assert!(matches!(err, KvError::Parse(_)), "{err}");
    }

    #[test]
    fn test_key_count_mismatch() {
        let xml = page(
            "<KeyCount>3</KeyCount><IsTruncated>false</IsTruncated>\
             <Contents><Key>a</Key></Contents>",
        );
        assert!(matches!(parse_list_page(&xml), Err(KvError::Parse(_))));
    }

    #[test]
    fn test_missing_root_element() {
        let err = parse_list_page("<Error><Code>NoSuchBucket</Code></Error>").unwrap_err();
        assert!(matches!(err, KvError::Parse(_)));
    }

    #[test]
    fn test_truncated_without_token() {
        let xml = page(
            "<KeyCount>1</KeyCount><IsTruncated>true</IsTruncated>\
             <Contents><Key>a</Key></Contents>",
        );
        assert!(matches!(parse_list_page(&xml), Err(KvError::Parse(_))));
    }

    #[test]
    fn test_keys_outside_contents_ignored() {
        // CommonPrefixes and owner blocks must not contribute keys.
        let xml = page(
            "<KeyCount>1</KeyCount><IsTruncated>false</IsTruncated>\
             <CommonPrefixes><Prefix>dir/</Prefix></CommonPrefixes>\
             <Contents><Key>file</Key></Contents>",
        );
        let parsed = parse_list_page(&xml).unwrap();
        assert_eq!(parsed.keys, vec!["file"]);
    }

    #[test]
    fn test_extract_tag() {
        let xml = "<Error><Code>SlowDown</Code><Message>Reduce your rate.</Message></Error>";
        assert_eq!(extract_tag(xml, "Code").as_deref(), Some("SlowDown"));
        assert_eq!(extract_tag(xml, "Message").as_deref(), Some("Reduce your rate."));
        assert_eq!(extract_tag(xml, "RequestId"), None);
    }
}
