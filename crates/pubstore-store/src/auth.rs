//! Bearer-token providers for [`GcsBlobStore`](crate::GcsBlobStore).
//!
//! pubstore does not implement OAuth flows. It either takes a token it is
//! handed, asks the compute metadata server for one, or sends no
//! credentials at all (emulators).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Default metadata server host on Google compute environments.
const METADATA_HOST: &str = "metadata.google.internal";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Source of access tokens for store requests.
pub trait TokenProvider: Send + Sync {
    /// The bearer token to send, or `None` to send no `Authorization` header.
    fn token(&self) -> StoreResult<Option<String>>;
}

/// Sends requests unauthenticated.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAuth;

impl TokenProvider for NoAuth {
    fn token(&self) -> StoreResult<Option<String>> {
        Ok(None)
    }
}

/// A fixed access token, e.g. from `gcloud auth print-access-token`.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> StoreResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(StoreError::Auth("empty access token".into()));
        }
        Ok(Self(token))
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> StoreResult<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Tokens for the default service account, from the compute metadata server.
///
/// Tokens are cached until shortly before they expire.
pub struct MetadataServerToken {
    client: reqwest::blocking::Client,
    url: String,
    cached: Mutex<Option<(String, Instant)>>,
}

impl MetadataServerToken {
    /// Provider for the metadata server named by `GCE_METADATA_HOST`, or the
    /// default host.
    pub fn new() -> Self {
        let host = std::env::var("GCE_METADATA_HOST").unwrap_or_else(|_| METADATA_HOST.into());
        Self::with_host(&host)
    }

    /// Provider for a specific metadata host (`host[:port]`).
    pub fn with_host(host: &str) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            url: format!(
                "http://{host}/computeMetadata/v1/instance/service-accounts/default/token"
            ),
            cached: Mutex::new(None),
        }
    }

    /// Fetch a token now, failing if the metadata server cannot supply one.
    ///
    /// Used at construction time to reject environments with no identity.
    pub fn probe(self) -> StoreResult<Self> {
        self.token()?;
        Ok(self)
    }

    fn fetch(&self) -> StoreResult<(String, Instant)> {
        debug!(url = %self.url, "requesting token from metadata server");
        let resp = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .map_err(|e| StoreError::Auth(format!("metadata server unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(StoreError::Auth(format!(
                "metadata server returned {}",
                resp.status()
            )));
        }
        let body: TokenResponse = resp
            .json()
            .map_err(|e| StoreError::Decode(format!("metadata token response: {e}")))?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(EXPIRY_MARGIN);
        Ok((body.access_token, Instant::now() + lifetime))
    }
}

impl Default for MetadataServerToken {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenProvider for MetadataServerToken {
    fn token(&self) -> StoreResult<Option<String>> {
        let mut cached = self.cached.lock().expect("lock poisoned");
        if let Some((token, expires)) = cached.as_ref() {
            if Instant::now() < *expires {
                return Ok(Some(token.clone()));
            }
        }
        let (token, expires) = self.fetch()?;
        *cached = Some((token.clone(), expires));
        Ok(Some(token))
    }
}

impl std::fmt::Debug for MetadataServerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataServerToken")
            .field("url", &self.url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_auth_sends_nothing() {
        assert_eq!(NoAuth.token().unwrap(), None);
    }

    #[test]
    fn static_token_is_returned_verbatim() {
        let provider = StaticToken::new("ya29.token").unwrap();
        assert_eq!(provider.token().unwrap().as_deref(), Some("ya29.token"));
    }

    #[test]
    fn static_token_rejects_empty() {
        assert!(matches!(StaticToken::new("  "), Err(StoreError::Auth(_))));
    }

    #[test]
    fn static_token_debug_is_redacted() {
        let provider = StaticToken::new("secret").unwrap();
        assert!(!format!("{provider:?}").contains("secret"));
    }

    #[test]
    fn metadata_url_uses_host() {
        let provider = MetadataServerToken::with_host("127.0.0.1:9");
        assert_eq!(
            provider.url,
            "http://127.0.0.1:9/computeMetadata/v1/instance/service-accounts/default/token"
        );
    }

    #[test]
    fn token_response_parses() {
        let body: TokenResponse = serde_json::from_str(
            r#"{"access_token":"abc","expires_in":3599,"token_type":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(body.access_token, "abc");
        assert_eq!(body.expires_in, 3599);
    }
}
