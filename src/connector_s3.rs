//! Amazon S3 object-storage source.
//!
//! Lists every object under a prefix and downloads it into the staging
//! directory. Zero-size entries are "directory" placeholders and become local
//! directories; everything else is downloaded to
//! `<staging>/<final key segment>`.
//!
//! The production client talks to the S3 REST API directly with
//! [AWS Signature Version 4](https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-auth-using-authorization-header.html)
//! signing (`hmac` + `sha2`), follows `ListObjectsV2` continuation tokens,
//! and supports custom endpoints for S3-compatible services (MinIO,
//! LocalStack) using path-style addressing.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::FetchError;
use crate::ingest::StagingArea;

/// One entry of an object listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
}

/// An authenticated object-storage client.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object in `bucket` whose key starts with `prefix`.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectEntry>, FetchError>;

    /// Download one object to `local_path`.
    async fn download(&self, bucket: &str, key: &str, local_path: &Path)
        -> Result<(), FetchError>;
}

/// Builds an [`ObjectStore`] for a key pair.
pub trait ObjectStoreProvider: Send + Sync {
    fn client(&self, key_id: &str, key_secret: &str) -> Result<Box<dyn ObjectStore>, FetchError>;
}

/// Copy everything under `prefix` in `bucket` into the staging directory.
///
/// Entries are processed one at a time in listing order.
pub async fn fetch_object_storage(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    staging: &mut StagingArea<'_>,
) -> Result<(), FetchError> {
    let entries = store.list(bucket, prefix).await?;
    if entries.is_empty() {
        return Err(FetchError::Transfer(format!(
            "no objects found under s3://{}/{}",
            bucket, prefix
        )));
    }

    for entry in &entries {
        let Some(name) = local_name(&entry.key) else {
            tracing::debug!(key = %entry.key, "skipping object with no usable name");
            continue;
        };
        let local_path = staging.root().join(name);

        if entry.size > 0 {
            store.download(bucket, &entry.key, &local_path).await?;
            staging.file_written(&local_path);
        } else {
            std::fs::create_dir_all(&local_path)?;
            staging.dir_created(&local_path);
        }
    }
    Ok(())
}

/// Final non-empty `/`-separated segment of an object key.
///
/// `"team/"` → `"team"`, `"team/x.md"` → `"x.md"`. Segments that would
/// escape the staging directory yield `None`.
pub fn local_name(key: &str) -> Option<&str> {
    let name = key.trim_end_matches('/').rsplit('/').next()?;
    match name {
        "" | "." | ".." => None,
        n => Some(n),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// S3 REST client
// ═══════════════════════════════════════════════════════════════════════

/// Builds [`S3Client`]s for a fixed region and optional custom endpoint.
pub struct S3Provider {
    region: String,
    endpoint_url: Option<String>,
}

impl S3Provider {
    pub fn new(region: String, endpoint_url: Option<String>) -> Self {
        Self {
            region,
            endpoint_url,
        }
    }
}

impl ObjectStoreProvider for S3Provider {
    fn client(&self, key_id: &str, key_secret: &str) -> Result<Box<dyn ObjectStore>, FetchError> {
        let creds = AwsCredentials::new(key_id, key_secret)?;
        Ok(Box::new(S3Client {
            creds,
            region: self.region.clone(),
            endpoint_url: self.endpoint_url.clone(),
            http: reqwest::Client::new(),
        }))
    }
}

/// AWS key pair supplied by the user.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
}

impl AwsCredentials {
    fn new(access_key_id: &str, secret_access_key: &str) -> Result<Self, FetchError> {
        if access_key_id.is_empty() || secret_access_key.is_empty() {
            return Err(FetchError::Credentials(
                "unable to locate credentials: key id and key secret are required".to_string(),
            ));
        }
        Ok(Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
        })
    }
}

type HmacSha256 = Hmac<Sha256>;

/// S3 REST client using SigV4-signed GET requests.
pub struct S3Client {
    creds: AwsCredentials,
    region: String,
    endpoint_url: Option<String>,
    http: reqwest::Client,
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectEntry>, FetchError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut query_params = vec![
                ("list-type".to_string(), "2".to_string()),
                ("max-keys".to_string(), "1000".to_string()),
            ];
            if !prefix.is_empty() {
                query_params.push(("prefix".to_string(), prefix.to_string()));
            }
            if let Some(ref token) = continuation_token {
                query_params.push(("continuation-token".to_string(), token.clone()));
            }

            // Canonical query string must be sorted
            query_params.sort_by(|a, b| a.0.cmp(&b.0));
            let canonical_querystring: String = query_params
                .iter()
                .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
                .collect::<Vec<_>>()
                .join("&");

            let resp = self
                .signed_get(bucket, "", &canonical_querystring)
                .await
                .map_err(|e| {
                    FetchError::Transfer(format!(
                        "failed to list s3://{}/{}: {}",
                        bucket, prefix, e
                    ))
                })?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(status_error("ListObjectsV2", status, &body));
            }

            let xml_body = resp
                .text()
                .await
                .map_err(|e| FetchError::Transfer(e.to_string()))?;
            let (batch, is_truncated, next_token) = parse_list_objects_response(&xml_body);
            objects.extend(batch);

            if is_truncated && next_token.is_some() {
                continuation_token = next_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    async fn download(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), FetchError> {
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let resp = self
            .signed_get(bucket, &encoded_key, "")
            .await
            .map_err(|e| FetchError::Transfer(format!("failed to get s3://{}/{}: {}", bucket, key, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error("GetObject", status, &body));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FetchError::Transfer(e.to_string()))?;
        tokio::fs::write(local_path, &bytes).await?;
        Ok(())
    }
}

impl S3Client {
    /// Send a SigV4-signed GET for `encoded_key` (empty for the bucket root).
    async fn signed_get(
        &self,
        bucket: &str,
        encoded_key: &str,
        canonical_querystring: &str,
    ) -> reqwest::Result<reqwest::Response> {
        let (scheme, host, canonical_uri) = self.address(bucket, encoded_key);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(b"");

        // Header names are already in sorted order
        let headers = [
            ("host", host.as_str()),
            ("x-amz-content-sha256", payload_hash.as_str()),
            ("x-amz-date", amz_date.as_str()),
        ];
        let signed_headers = headers
            .iter()
            .map(|(k, _)| *k)
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "GET\n{}\n{}\n{}\n{}\n{}",
            canonical_uri, canonical_querystring, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut url = format!("{}://{}{}", scheme, host, canonical_uri);
        if !canonical_querystring.is_empty() {
            url.push('?');
            url.push_str(canonical_querystring);
        }

        self.http
            .get(&url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .send()
            .await
    }

    /// Scheme, host, and canonical URI for a request.
    ///
    /// AWS uses virtual-hosted addressing (`<bucket>.s3.<region>.amazonaws.com`);
    /// custom endpoints use path-style addressing (`<endpoint>/<bucket>/<key>`).
    fn address(&self, bucket: &str, encoded_key: &str) -> (String, String, String) {
        match self.endpoint_url {
            Some(ref endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                let uri = if encoded_key.is_empty() {
                    format!("/{}", uri_encode(bucket))
                } else {
                    format!("/{}/{}", uri_encode(bucket), encoded_key)
                };
                (scheme.to_string(), host, uri)
            }
            None => (
                "https".to_string(),
                format!("{}.s3.{}.amazonaws.com", bucket, self.region),
                format!("/{}", encoded_key),
            ),
        }
    }
}

/// Map a non-success S3 response to a [`FetchError`].
fn status_error(operation: &str, status: reqwest::StatusCode, body: &str) -> FetchError {
    let code = extract_xml_value(body, "Code").unwrap_or_default();
    let message = format!(
        "S3 {} failed (HTTP {}){}",
        operation,
        status,
        if code.is_empty() {
            String::new()
        } else {
            format!(": {}", code)
        }
    );
    match code.as_str() {
        "InvalidAccessKeyId" | "SignatureDoesNotMatch" => FetchError::Authentication(message),
        _ if status == reqwest::StatusCode::UNAUTHORIZED => FetchError::Authentication(message),
        _ => FetchError::Transfer(message),
    }
}

// ============ AWS SigV4 Helpers ============

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the AWS SigV4 signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986 (unreserved: `A-Z a-z 0-9 - _ . ~`).
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

// ============ XML Parsing (minimal) ============

/// Parse a `ListObjectsV2` response into entries, the truncation flag, and
/// the next continuation token. Directory markers (keys ending in `/`) are
/// kept.
fn parse_list_objects_response(xml: &str) -> (Vec<ObjectEntry>, bool, Option<String>) {
    let mut objects = Vec::new();
    let is_truncated = extract_xml_value(xml, "IsTruncated")
        .map(|v| v == "true")
        .unwrap_or(false);
    let next_token = extract_xml_value(xml, "NextContinuationToken");

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];

        let key = extract_xml_value(block, "Key").map(|k| unescape_xml(&k));
        let size = extract_xml_value(block, "Size")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            objects.push(ObjectEntry { key, size });
        }

        remaining = &remaining[block_start + end + "</Contents>".len()..];
    }

    (objects, is_truncated, next_token)
}

/// Extract the text content of an XML tag (simple, non-nested).
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml[start..start + end].to_string())
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_names() {
        assert_eq!(local_name("team/"), Some("team"));
        assert_eq!(local_name("team/x.md"), Some("x.md"));
        assert_eq!(local_name("a/b/c/"), Some("c"));
        assert_eq!(local_name("top.txt"), Some("top.txt"));
        assert_eq!(local_name("/"), None);
        assert_eq!(local_name("a/../"), None);
    }

    #[test]
    fn parses_listing_with_markers() {
        let xml = r#"<ListBucketResult>
            <IsTruncated>true</IsTruncated>
            <NextContinuationToken>tok==</NextContinuationToken>
            <Contents><Key>team/</Key><Size>0</Size></Contents>
            <Contents><Key>team/x &amp; y.md</Key><Size>42</Size></Contents>
        </ListBucketResult>"#;
        let (objs, truncated, token) = parse_list_objects_response(xml);
        assert!(truncated);
        assert_eq!(token.as_deref(), Some("tok=="));
        assert_eq!(
            objs,
            vec![
                ObjectEntry {
                    key: "team/".into(),
                    size: 0
                },
                ObjectEntry {
                    key: "team/x & y.md".into(),
                    size: 42
                },
            ]
        );
    }

    #[test]
    fn uri_encoding() {
        assert_eq!(uri_encode("a b/c"), "a%20b%2Fc");
        assert_eq!(uri_encode("safe-_.~"), "safe-_.~");
    }

    #[test]
    fn signing_key_matches_aws_example() {
        // From the AWS SigV4 documentation example.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn status_mapping() {
        let body = "<Error><Code>InvalidAccessKeyId</Code></Error>";
        assert!(matches!(
            status_error("ListObjectsV2", reqwest::StatusCode::FORBIDDEN, body),
            FetchError::Authentication(_)
        ));
        let body = "<Error><Code>NoSuchBucket</Code></Error>";
        assert!(matches!(
            status_error("ListObjectsV2", reqwest::StatusCode::NOT_FOUND, body),
            FetchError::Transfer(_)
        ));
    }

    #[test]
    fn empty_keys_are_credentials_error() {
        let provider = S3Provider::new("us-east-1".into(), None);
        assert!(matches!(
            provider.client("", "secret"),
            Err(FetchError::Credentials(_))
        ));
    }

    #[test]
    fn custom_endpoint_uses_path_style() {
        let client = S3Client {
            creds: AwsCredentials::new("a", "b").unwrap(),
            region: "us-east-1".into(),
            endpoint_url: Some("http://localhost:9000/".into()),
            http: reqwest::Client::new(),
        };
        let (scheme, host, uri) = client.address("docs", "team/x.md");
        assert_eq!(scheme, "http");
        assert_eq!(host, "localhost:9000");
        assert_eq!(uri, "/docs/team/x.md");
    }
}
