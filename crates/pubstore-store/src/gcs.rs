//! Cloud Storage JSON API backend.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{MetadataServerToken, NoAuth, StaticToken, TokenProvider};
use crate::error::{StoreError, StoreResult};
use crate::object::{ListPage, ObjectMeta, Precondition, UploadBody};
use crate::traits::BlobStore;

/// Public Cloud Storage endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Connection options for [`GcsBlobStore::connect`].
#[derive(Clone, Debug, Default)]
pub struct GcsOptions {
    /// API base URL. Falls back to `STORAGE_EMULATOR_HOST`, then
    /// [`DEFAULT_ENDPOINT`].
    pub endpoint: Option<String>,
    /// Fixed bearer token. Falls back to `GOOGLE_OAUTH_ACCESS_TOKEN`, then
    /// the metadata server.
    pub access_token: Option<String>,
}

// ---- Wire types ----

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    #[serde(default)]
    name: String,
    #[serde(default)]
    bucket: String,
    #[serde(default, deserialize_with = "string_u64")]
    generation: u64,
    #[serde(default, deserialize_with = "string_u64")]
    size: u64,
    #[serde(default)]
    md5_hash: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    updated: Option<DateTime<Utc>>,
}

impl From<GcsObject> for ObjectMeta {
    fn from(obj: GcsObject) -> Self {
        ObjectMeta {
            name: obj.name,
            bucket: obj.bucket,
            generation: obj.generation,
            size: obj.size,
            md5_hash: obj.md5_hash.filter(|h| !h.is_empty()),
            content_type: obj.content_type,
            metadata: obj.metadata.unwrap_or_default(),
            updated: obj.updated,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RewriteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "is_empty_map")]
    metadata: &'a BTreeMap<String, String>,
}

fn is_empty_map(map: &&BTreeMap<String, String>) -> bool {
    map.is_empty()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewriteResponse {
    done: bool,
    #[serde(default)]
    rewrite_token: Option<String>,
    #[serde(default)]
    resource: Option<GcsObject>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// The JSON API encodes 64-bit integers as strings.
fn string_u64<'de, D: serde::Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let s = String::deserialize(d)?;
    s.parse().map_err(serde::de::Error::custom)
}

// ---- Client ----

/// Blob store backed by the Cloud Storage JSON API.
pub struct GcsBlobStore {
    client: Client,
    endpoint: String,
    tokens: Box<dyn TokenProvider>,
}

impl GcsBlobStore {
    /// Create a store for `endpoint` using the given token provider.
    pub fn new(endpoint: impl Into<String>, tokens: Box<dyn TokenProvider>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Create a store from ambient configuration.
    ///
    /// Fails with [`StoreError::Auth`] when no identity can be found; this
    /// is unrecoverable for the store, but exiting is left to the caller.
    pub fn from_env() -> StoreResult<Self> {
        Self::connect(&GcsOptions::default())
    }

    /// Create a store, resolving anything `options` leaves unset from the
    /// environment.
    pub fn connect(options: &GcsOptions) -> StoreResult<Self> {
        let emulator = std::env::var("STORAGE_EMULATOR_HOST")
            .ok()
            .filter(|h| !h.is_empty());

        let endpoint = options
            .endpoint
            .clone()
            .or_else(|| emulator.as_deref().map(with_scheme))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let env_token = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        let tokens: Box<dyn TokenProvider> = if let Some(token) = &options.access_token {
            Box::new(StaticToken::new(token.clone())?)
        } else if emulator.is_some() {
            Box::new(NoAuth)
        } else if let Some(token) = env_token {
            Box::new(StaticToken::new(token)?)
        } else {
            Box::new(MetadataServerToken::new().probe().map_err(|e| {
                StoreError::Auth(format!("no usable credentials found: {e}"))
            })?)
        };

        debug!(endpoint = %endpoint, "connected Cloud Storage client");
        Ok(Self::new(endpoint, tokens))
    }

    /// API base URL in use.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        )
    }

    fn authorize(&self, req: RequestBuilder) -> StoreResult<RequestBuilder> {
        Ok(match self.tokens.token()? {
            Some(token) => req.bearer_auth(token),
            None => req,
        })
    }

    fn send(&self, req: RequestBuilder, bucket: &str, key: &str) -> StoreResult<Response> {
        let resp = self
            .authorize(req)?
            .send()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        check_status(resp, bucket, key)
    }
}

fn with_scheme(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", host.trim_end_matches('/'))
    }
}

fn precondition_query(precondition: Option<Precondition>) -> Vec<(&'static str, String)> {
    match precondition {
        Some(Precondition::IfGenerationMatch(g)) => vec![("ifGenerationMatch", g.to_string())],
        Some(Precondition::IfGenerationNotMatch(g)) => {
            vec![("ifGenerationNotMatch", g.to_string())]
        }
        None => Vec::new(),
    }
}

fn check_status(resp: Response, bucket: &str, key: &str) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().unwrap_or_default();
    Err(status_error(status, bucket, key, api_message(status, text)))
}

/// Map a non-success status onto the store's error kinds.
fn status_error(status: StatusCode, bucket: &str, key: &str, message: String) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        StatusCode::NOT_MODIFIED | StatusCode::PRECONDITION_FAILED => {
            StoreError::PreconditionFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Auth(message),
        _ => StoreError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

/// The `error.message` of a JSON API error body, else the raw body, else
/// the status line.
fn api_message(status: StatusCode, text: String) -> String {
    serde_json::from_str::<ApiError>(&text)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| {
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        })
}

fn list_query(prefix: &str, page_size: usize, page_token: &str) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("prefix", prefix.to_string()),
        ("maxResults", page_size.to_string()),
        ("fields", "items(name),nextPageToken".to_string()),
    ];
    if !page_token.is_empty() {
        query.push(("pageToken", page_token.to_string()));
    }
    query
}

/// Where a rewrite stands after one call.
#[derive(Debug)]
enum RewriteStep {
    Done(ObjectMeta),
    Resume(String),
}

fn rewrite_step(resp: RewriteResponse) -> StoreResult<RewriteStep> {
    if resp.done {
        return resp
            .resource
            .map(|obj| RewriteStep::Done(obj.into()))
            .ok_or_else(|| StoreError::Decode("rewrite finished without resource".into()));
    }
    match resp.rewrite_token {
        Some(t) if !t.is_empty() => Ok(RewriteStep::Resume(t)),
        _ => Err(StoreError::Decode("rewrite incomplete without token".into())),
    }
}

fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> StoreResult<T> {
    resp.json().map_err(|e| StoreError::Decode(e.to_string()))
}

impl BlobStore for GcsBlobStore {
    fn name(&self) -> &str {
        "GCS"
    }

    fn get(
        &self,
        bucket: &str,
        key: &str,
        precondition: Option<Precondition>,
    ) -> StoreResult<ObjectMeta> {
        debug!(bucket, key, ?precondition, "get object metadata");
        let req = self
            .client
            .get(self.object_url(bucket, key))
            .query(&precondition_query(precondition));
        let obj: GcsObject = decode(self.send(req, bucket, key)?)?;
        Ok(obj.into())
    }

    fn insert(&self, bucket: &str, key: &str, body: UploadBody) -> StoreResult<ObjectMeta> {
        debug!(bucket, key, len = ?body.len_hint(), "upload object");
        let url = format!(
            "{}/upload/storage/v1/b/{}/o",
            self.endpoint,
            urlencoding::encode(bucket)
        );
        let body = match body.into_parts() {
            (reader, Some(len)) => Body::sized(reader, len),
            (reader, None) => Body::new(reader),
        };
        let req = self
            .client
            .post(url)
            .query(&[("uploadType", "media"), ("name", key)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body);
        let obj: GcsObject = decode(self.send(req, bucket, key)?)?;
        Ok(obj.into())
    }

    fn delete(&self, bucket: &str, key: &str) -> StoreResult<()> {
        debug!(bucket, key, "delete object");
        let req = self.client.delete(self.object_url(bucket, key));
        self.send(req, bucket, key)?;
        Ok(())
    }

    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        page_size: usize,
        page_token: &str,
    ) -> StoreResult<ListPage> {
        debug!(bucket, prefix, page_size, "list objects");
        let url = format!(
            "{}/storage/v1/b/{}/o",
            self.endpoint,
            urlencoding::encode(bucket)
        );
        let req = self
            .client
            .get(url)
            .query(&list_query(prefix, page_size, page_token));
        let resp: ListResponse = decode(self.send(req, bucket, prefix)?)?;
        Ok(ListPage {
            names: resp.items.into_iter().map(|item| item.name).collect(),
            next_page_token: resp.next_page_token.unwrap_or_default(),
        })
    }

    fn rewrite(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        basis: &ObjectMeta,
    ) -> StoreResult<ObjectMeta> {
        let url = format!(
            "{}/rewriteTo/b/{}/o/{}",
            self.object_url(src_bucket, src_key),
            urlencoding::encode(dst_bucket),
            urlencoding::encode(dst_key)
        );
        let request = RewriteRequest {
            content_type: basis.content_type.as_deref(),
            metadata: &basis.metadata,
        };

        // Large objects are copied over several calls, each resuming from
        // the previous call's rewrite token.
        let mut token: Option<String> = None;
        loop {
            debug!(src_key, dst_key, resumed = token.is_some(), "rewrite object");
            let mut req = self.client.post(&url).json(&request);
            if let Some(t) = &token {
                req = req.query(&[("rewriteToken", t.as_str())]);
            }
            let resp: RewriteResponse = decode(self.send(req, src_bucket, src_key)?)?;
            match rewrite_step(resp)? {
                RewriteStep::Done(meta) => return Ok(meta),
                RewriteStep::Resume(t) => token = Some(t),
            }
        }
    }
}

impl fmt::Debug for GcsBlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcsBlobStore")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GcsBlobStore {
        GcsBlobStore::new("http://localhost:4443/", Box::new(NoAuth))
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        assert_eq!(store().endpoint(), "http://localhost:4443");
    }

    #[test]
    fn object_urls_percent_encode_keys() {
        assert_eq!(
            store().object_url("my-bucket", "repo/pool/main/a b.deb"),
            "http://localhost:4443/storage/v1/b/my-bucket/o/repo%2Fpool%2Fmain%2Fa%20b.deb"
        );
    }

    #[test]
    fn emulator_host_gets_scheme() {
        assert_eq!(with_scheme("localhost:4443"), "http://localhost:4443");
        assert_eq!(with_scheme("https://gcs.example/"), "https://gcs.example");
    }

    #[test]
    fn precondition_query_params() {
        assert!(precondition_query(None).is_empty());
        assert_eq!(
            precondition_query(Some(Precondition::IfGenerationNotMatch(0))),
            vec![("ifGenerationNotMatch", "0".to_string())]
        );
        assert_eq!(
            precondition_query(Some(Precondition::IfGenerationMatch(12))),
            vec![("ifGenerationMatch", "12".to_string())]
        );
    }

    #[test]
    fn object_resource_parses() {
        let obj: GcsObject = serde_json::from_str(
            r#"{
                "kind": "storage#object",
                "name": "repo/dists/stable/Release",
                "bucket": "b",
                "generation": "1700000000000000",
                "size": "1234",
                "md5Hash": "XUFAKrxLKna5cZ2REBfFkg==",
                "contentType": "text/plain",
                "metadata": {"origin": "pubstore"},
                "updated": "2024-01-02T03:04:05.678Z"
            }"#,
        )
        .unwrap();
        let meta = ObjectMeta::from(obj);
        assert_eq!(meta.generation, 1_700_000_000_000_000);
        assert_eq!(meta.size, 1234);
        assert_eq!(
            meta.md5_digest().unwrap().to_hex(),
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(meta.metadata.get("origin").map(String::as_str), Some("pubstore"));
        assert!(meta.updated.is_some());
    }

    #[test]
    fn composite_object_has_no_md5() {
        let obj: GcsObject = serde_json::from_str(
            r#"{"name": "c", "bucket": "b", "generation": "3", "size": "10", "componentCount": 2}"#,
        )
        .unwrap();
        assert!(ObjectMeta::from(obj).md5_digest().is_none());
    }

    #[test]
    fn list_response_parses_last_page() {
        let resp: ListResponse =
            serde_json::from_str(r#"{"items": [{"name": "a"}, {"name": "b"}]}"#).unwrap();
        assert_eq!(resp.items.len(), 2);
        assert!(resp.next_page_token.is_none());

        let empty: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.items.is_empty());
    }

    #[test]
    fn rewrite_request_omits_empty_fields() {
        let metadata = BTreeMap::new();
        let req = RewriteRequest {
            content_type: None,
            metadata: &metadata,
        };
        assert_eq!(serde_json::to_string(&req).unwrap(), "{}");
    }

    #[test]
    fn rewrite_response_in_progress() {
        let resp: RewriteResponse = serde_json::from_str(
            r#"{"done": false, "rewriteToken": "tok", "totalBytesRewritten": "1"}"#,
        )
        .unwrap();
        assert!(!resp.done);
        assert_eq!(resp.rewrite_token.as_deref(), Some("tok"));
        assert!(resp.resource.is_none());
    }

    // -----------------------------------------------------------------------
    // Status mapping
    // -----------------------------------------------------------------------

    fn mapped(status: StatusCode) -> StoreError {
        status_error(status, "b", "k", "denied".into())
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let err = mapped(StatusCode::NOT_FOUND);
        assert!(err.is_not_found());
        assert!(!err.is_precondition_failed());
    }

    #[test]
    fn failed_preconditions_map_to_precondition_failed() {
        for status in [StatusCode::NOT_MODIFIED, StatusCode::PRECONDITION_FAILED] {
            let err = mapped(status);
            assert!(err.is_precondition_failed(), "{status}");
            assert!(!err.is_not_found(), "{status}");
        }
    }

    #[test]
    fn auth_failures_are_neither_absent_nor_precondition() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = mapped(status);
            assert!(matches!(&err, StoreError::Auth(msg) if msg == "denied"), "{status}");
            assert!(!err.is_not_found());
            assert!(!err.is_precondition_failed());
        }
    }

    #[test]
    fn other_statuses_map_to_http() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = mapped(status);
            assert!(
                matches!(err, StoreError::Http { status: code, .. } if code == status.as_u16()),
                "{status}"
            );
        }
    }

    #[test]
    fn api_message_prefers_json_error() {
        let body = r#"{"error": {"code": 403, "message": "caller lacks storage.objects.get"}}"#;
        assert_eq!(
            api_message(StatusCode::FORBIDDEN, body.to_string()),
            "caller lacks storage.objects.get"
        );
        assert_eq!(api_message(StatusCode::BAD_GATEWAY, "upstream".into()), "upstream");
        assert_eq!(
            api_message(StatusCode::BAD_GATEWAY, String::new()),
            StatusCode::BAD_GATEWAY.to_string()
        );
    }

    // -----------------------------------------------------------------------
    // Pagination and rewrite continuation
    // -----------------------------------------------------------------------

    #[test]
    fn list_query_carries_page_token_only_when_set() {
        let first = list_query("repo/dists/", 1000, "");
        assert!(first.iter().all(|(k, _)| *k != "pageToken"));
        assert!(first.contains(&("prefix", "repo/dists/".to_string())));
        assert!(first.contains(&("maxResults", "1000".to_string())));

        let next = list_query("repo/dists/", 1000, "CgRhL2Iv");
        assert!(next.contains(&("pageToken", "CgRhL2Iv".to_string())));
    }

    #[test]
    fn list_response_carries_next_token() {
        let resp: ListResponse =
            serde_json::from_str(r#"{"items": [{"name": "a"}], "nextPageToken": "tok"}"#).unwrap();
        assert_eq!(resp.next_page_token.as_deref(), Some("tok"));
    }

    #[test]
    fn rewrite_step_resumes_with_token() {
        let resp: RewriteResponse =
            serde_json::from_str(r#"{"done": false, "rewriteToken": "tok"}"#).unwrap();
        assert!(matches!(rewrite_step(resp).unwrap(), RewriteStep::Resume(t) if t == "tok"));
    }

    #[test]
    fn rewrite_step_finishes_with_resource() {
        let resp: RewriteResponse = serde_json::from_str(
            r#"{
                "done": true,
                "resource": {"name": "new", "bucket": "b", "generation": "7", "size": "3"}
            }"#,
        )
        .unwrap();
        match rewrite_step(resp).unwrap() {
            RewriteStep::Done(meta) => {
                assert_eq!(meta.name, "new");
                assert_eq!(meta.generation, 7);
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn rewrite_step_rejects_malformed_progress() {
        let no_token: RewriteResponse = serde_json::from_str(r#"{"done": false}"#).unwrap();
        assert!(matches!(rewrite_step(no_token), Err(StoreError::Decode(_))));

        let empty_token: RewriteResponse =
            serde_json::from_str(r#"{"done": false, "rewriteToken": ""}"#).unwrap();
        assert!(matches!(rewrite_step(empty_token), Err(StoreError::Decode(_))));

        let no_resource: RewriteResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert!(matches!(rewrite_step(no_resource), Err(StoreError::Decode(_))));
    }
}
