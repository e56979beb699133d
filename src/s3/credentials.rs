//! AWS credential resolution.
//!
//! Credentials come from the environment or the shared credentials file,
//! keyed by profile. Resolution happens once, lazily, on the first request
//! that needs to sign; the outcome is cached for the driver's lifetime.
//! "No credentials anywhere" is a valid outcome and is cached too: the
//! driver then issues anonymous (unsigned) requests.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use crate::types::KvError;

/// A set of AWS credentials. The secret key never appears in `Debug`
/// output or logs.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::new(secret_access_key.into()),
            session_token,
        }
    }

    /// The raw secret, exposed only for HMAC key derivation.
    pub(crate) fn signing_secret(&self) -> &str {
        self.secret_access_key.expose_secret()
    }
}

/// Cached credential resolution state.
#[derive(Debug, Default)]
pub(crate) enum CredentialState {
    #[default]
    Unresolved,
    /// The chain found nothing; requests go out unsigned.
    Anonymous,
    Ready(Credentials),
}

/// Resolve credentials for `profile` from the environment, then the shared
/// credentials file. Returns `Ok(None)` when neither source has them.
pub fn resolve_chain(profile: &str) -> Result<Option<Credentials>, KvError> {
    // Environment variables only apply to the default profile.
    if profile == "default" {
        if let Some(credentials) = from_environment() {
            return Ok(Some(credentials));
        }
    }
    from_shared_file(profile)
}

fn from_environment() -> Option<Credentials> {
    let access_key_id = non_empty_env("AWS_ACCESS_KEY_ID")?;
    let secret_access_key = non_empty_env("AWS_SECRET_ACCESS_KEY")?;
    let session_token = non_empty_env("AWS_SESSION_TOKEN");
    Some(Credentials::new(
        access_key_id,
        secret_access_key,
        session_token,
    ))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn shared_credentials_path() -> Option<PathBuf> {
    if let Some(path) = non_empty_env("AWS_SHARED_CREDENTIALS_FILE") {
        return Some(PathBuf::from(path));
    }
    let home = non_empty_env("HOME")?;
    Some(PathBuf::from(home).join(".aws").join("credentials"))
}

fn from_shared_file(profile: &str) -> Result<Option<Credentials>, KvError> {
    let Some(path) = shared_credentials_path() else {
        return Ok(None);
    };
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(KvError::Credentials(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        }
    };
    Ok(parse_shared_file(&contents, profile))
}

/// Pull one profile's keys out of an INI-style credentials file.
fn parse_shared_file(contents: &str, profile: &str) -> Option<Credentials> {
    let mut in_profile = false;
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_profile = section.trim() == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "aws_access_key_id" => access_key_id = Some(value.to_string()),
            "aws_secret_access_key" => secret_access_key = Some(value.to_string()),
            "aws_session_token" => session_token = Some(value.to_string()),
            _ => {}
        }
    }

    Some(Credentials::new(
        access_key_id?,
        secret_access_key?,
        session_token,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# shared credentials
[default]
aws_access_key_id = AKIDEFAULT
aws_secret_access_key = defaultsecret

[ci]
aws_access_key_id=AKICI
aws_secret_access_key=cisecret
aws_session_token=citoken
";

    #[test]
    fn test_parse_default_profile() {
        let credentials = parse_shared_file(SAMPLE, "default").unwrap();
        assert_eq!(credentials.access_key_id, "AKIDEFAULT");
        assert_eq!(credentials.signing_secret(), "defaultsecret");
        assert!(credentials.session_token.is_none());
    }

    #[test]
    fn test_parse_named_profile_with_token() {
        let credentials = parse_shared_file(SAMPLE, "ci").unwrap();
        assert_eq!(credentials.access_key_id, "AKICI");
        assert_eq!(credentials.signing_secret(), "cisecret");
        assert_eq!(credentials.session_token.as_deref(), Some("citoken"));
    }

    #[test]
    fn test_parse_missing_profile() {
        assert!(parse_shared_file(SAMPLE, "absent").is_none());
    }

    #[test]
    fn test_parse_incomplete_profile() {
        let partial = "[default]\naws_access_key_id = AKIONLY\n";
        assert!(parse_shared_file(partial, "default").is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credentials = Credentials::new("AKI", "supersecret", None);
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("supersecret"));
    }
}
