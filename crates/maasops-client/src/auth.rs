use crate::ClientError;
use std::sync::atomic::{AtomicU64, Ordering};

static NONCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A MAAS API key: `<consumer_key>:<token_key>:<token_secret>`.
///
/// MAAS authenticates API clients with OAuth 1.0 using the PLAINTEXT
/// signature method, so the key maps directly onto an `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    consumer_key: String,
    token_key: String,
    token_secret: String,
}

impl ApiKey {
    pub fn parse(key: &str) -> Result<Self, ClientError> {
        let parts: Vec<&str> = key.trim().split(':').collect();
        match parts.as_slice() {
            [consumer, token, secret]
                if !consumer.is_empty() && !token.is_empty() && !secret.is_empty() =>
            {
                Ok(Self {
                    consumer_key: (*consumer).to_owned(),
                    token_key: (*token).to_owned(),
                    token_secret: (*secret).to_owned(),
                })
            }
            _ => Err(ClientError::Config(
                "API key must have the form <consumer_key>:<token_key>:<token_secret>".to_owned(),
            )),
        }
    }

    /// Build the `Authorization` header value for one request.
    pub fn authorization_header(&self) -> String {
        self.header_with(chrono::Utc::now().timestamp(), &next_nonce())
    }

    fn header_with(&self, timestamp: i64, nonce: &str) -> String {
        format!(
            "OAuth oauth_version=\"1.0\", oauth_signature_method=\"PLAINTEXT\", \
             oauth_consumer_key=\"{}\", oauth_token=\"{}\", oauth_signature=\"&{}\", \
             oauth_nonce=\"{nonce}\", oauth_timestamp=\"{timestamp}\"",
            self.consumer_key, self.token_key, self.token_secret
        )
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("consumer_key", &self.consumer_key)
            .field("token_key", &self.token_key)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

/// Nonces only need to be unique per timestamp; hash the clock, pid and a
/// process-local counter.
fn next_nonce() -> String {
    let seq = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let now = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(&now.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&seq.to_le_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..32].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_key() {
        let key = ApiKey::parse("ck:tk:secret").unwrap();
        assert_eq!(key.consumer_key, "ck");
        assert_eq!(key.token_key, "tk");
    }

    #[test]
    fn parse_rejects_malformed_keys() {
        for bad in ["", "ck", "ck:tk", "ck:tk:", "ck::secret", "a:b:c:d"] {
            assert!(
                matches!(ApiKey::parse(bad), Err(ClientError::Config(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn header_uses_plaintext_signature() {
        let key = ApiKey::parse("ck:tk:secret").unwrap();
        let header = key.header_with(1_700_000_000, "abc");
        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_signature_method=\"PLAINTEXT\""));
        assert!(header.contains("oauth_consumer_key=\"ck\""));
        assert!(header.contains("oauth_token=\"tk\""));
        assert!(header.contains("oauth_signature=\"&secret\""));
        assert!(header.contains("oauth_nonce=\"abc\""));
        assert!(header.contains("oauth_timestamp=\"1700000000\""));
    }

    #[test]
    fn nonces_are_unique() {
        let a = next_nonce();
        let b = next_nonce();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn debug_redacts_secret() {
        let key = ApiKey::parse("ck:tk:topsecret").unwrap();
        let dbg = format!("{key:?}");
        assert!(!dbg.contains("topsecret"));
        assert!(dbg.contains("<redacted>"));
    }
}
