//! Azure Blob Storage client over the Blob REST API.
//!
//! Requests are authorized with Shared Key: an HMAC-SHA256 over a canonical
//! string built from the verb, standard headers, `x-ms-*` headers and the
//! canonical resource, keyed with the base64-decoded account key.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::{header, Method, StatusCode, Url};
use sha2::Sha256;

use crate::utils::AppError;

const STORAGE_API_VERSION: &str = "2021-08-06";

// Well-known Azurite development account
const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Account credentials and endpoint parsed from a connection string
#[derive(Debug, Clone, PartialEq)]
pub struct StorageAccount {
    pub name: String,
    pub key: Vec<u8>,
    pub blob_endpoint: String,
}

impl StorageAccount {
    pub fn from_connection_string(conn: &str) -> Result<Self, AppError> {
        let mut parts: BTreeMap<String, String> = BTreeMap::new();
        for pair in conn.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Account keys end with '=' padding, so only split on the first one
            let (k, v) = pair
                .split_once('=')
                .ok_or_else(|| AppError::Internal(format!("Malformed connection string segment: {}", pair)))?;
            parts.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }

        let dev = parts
            .get("usedevelopmentstorage")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let (name, key_b64) = if dev {
            (DEV_ACCOUNT_NAME.to_string(), DEV_ACCOUNT_KEY.to_string())
        } else {
            let name = parts
                .get("accountname")
                .cloned()
                .ok_or_else(|| AppError::Internal("Connection string has no AccountName".to_string()))?;
            let key = parts
                .get("accountkey")
                .cloned()
                .ok_or_else(|| AppError::Internal("Connection string has no AccountKey".to_string()))?;
            (name, key)
        };

        let key = base64::engine::general_purpose::STANDARD
            .decode(key_b64.as_bytes())
            .map_err(|e| AppError::Internal(format!("AccountKey is not valid base64: {}", e)))?;

        let blob_endpoint = match parts.get("blobendpoint") {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None if dev => DEV_BLOB_ENDPOINT.to_string(),
            None => {
                let protocol = parts
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or("https");
                let suffix = parts
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or("core.windows.net");
                format!("{}://{}.blob.{}", protocol, name, suffix)
            }
        };

        Ok(Self { name, key, blob_endpoint })
    }
}

/// Downloaded blob body
#[derive(Debug)]
pub struct BlobContent {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct BlobStorage {
    http: reqwest::Client,
    account: Arc<StorageAccount>,
    container: String,
}

impl BlobStorage {
    pub fn new(http: reqwest::Client, connection_string: &str, container: &str) -> Result<Self, AppError> {
        let account = StorageAccount::from_connection_string(connection_string)?;
        Ok(Self {
            http,
            account: Arc::new(account),
            container: container.to_string(),
        })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn blob_url(&self, blob_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.account.blob_endpoint,
            self.container,
            urlencoding::encode(blob_name)
        )
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.account.blob_endpoint, self.container)
    }

    /// Creates the container when it does not exist yet
    pub async fn ensure_container(&self) -> Result<(), AppError> {
        let url = format!("{}?restype=container", self.container_url());
        let response = self
            .signed(Method::PUT, &url, BTreeMap::new(), 0, None)?
            .header(header::CONTENT_LENGTH, "0")
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED => {
                log::info!("🪣 Created blob container '{}'", self.container);
                Ok(())
            }
            StatusCode::CONFLICT => {
                log::debug!("🪣 Blob container '{}' already exists", self.container);
                Ok(())
            }
            status => Err(AppError::External(format!(
                "Blob Storage create container returned {}",
                status
            ))),
        }
    }

    /// Uploads bytes as a block blob and returns its URL
    pub async fn put_blob(&self, blob_name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, AppError> {
        let url = self.blob_url(blob_name);
        let length = bytes.len() as u64;

        let mut ms_headers = BTreeMap::new();
        ms_headers.insert("x-ms-blob-type".to_string(), "BlockBlob".to_string());

        let response = self
            .signed(Method::PUT, &url, ms_headers, length, Some(content_type))?
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, length.to_string())
            .body(bytes)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(AppError::External(format!(
                "Blob Storage upload of '{}' returned {}",
                blob_name,
                response.status()
            )));
        }

        log::info!("☁️  Uploaded blob {} ({} bytes)", blob_name, length);
        Ok(url)
    }

    /// Confirms the blob exists and, when given, has the expected size. Returns the stored length.
    pub async fn verify_blob(&self, blob_name: &str, expected_size: Option<u64>) -> Result<u64, AppError> {
        let url = self.blob_url(blob_name);
        let response = self.signed(Method::HEAD, &url, BTreeMap::new(), 0, None)?.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::External(format!("Blob '{}' not found after upload", blob_name)));
        }
        if !response.status().is_success() {
            return Err(AppError::External(format!(
                "Blob Storage properties of '{}' returned {}",
                blob_name,
                response.status()
            )));
        }

        // HEAD bodies are empty, so read the header rather than the body hint
        let content_length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        check_stored_size(blob_name, content_length, expected_size)
    }

    pub async fn get_blob(&self, blob_name: &str) -> Result<BlobContent, AppError> {
        let url = self.blob_url(blob_name);
        let response = self.signed(Method::GET, &url, BTreeMap::new(), 0, None)?.send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound("File content not found".to_string()));
        }
        if !response.status().is_success() {
            return Err(AppError::External(format!(
                "Blob Storage download of '{}' returned {}",
                blob_name,
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response.bytes().await?.to_vec();

        Ok(BlobContent { bytes, content_type })
    }

    /// Deletes a blob; a missing blob counts as deleted
    pub async fn delete_blob(&self, blob_name: &str) -> Result<(), AppError> {
        let url = self.blob_url(blob_name);
        let response = self.signed(Method::DELETE, &url, BTreeMap::new(), 0, None)?.send().await?;

        match response.status() {
            StatusCode::ACCEPTED | StatusCode::OK | StatusCode::NOT_FOUND => {
                log::info!("🗑️  Deleted blob {}", blob_name);
                Ok(())
            }
            status => Err(AppError::External(format!(
                "Blob Storage delete of '{}' returned {}",
                blob_name, status
            ))),
        }
    }

    /// Builds a request carrying `x-ms-date`, `x-ms-version` and the SharedKey header
    fn signed(
        &self,
        method: Method,
        url: &str,
        mut ms_headers: BTreeMap<String, String>,
        content_length: u64,
        content_type: Option<&str>,
    ) -> Result<reqwest::RequestBuilder, AppError> {
        let parsed = Url::parse(url).map_err(|e| AppError::Internal(format!("Invalid blob URL {}: {}", url, e)))?;

        ms_headers.insert("x-ms-date".to_string(), rfc1123_now());
        ms_headers.insert("x-ms-version".to_string(), STORAGE_API_VERSION.to_string());

        let resource = canonical_resource(&self.account.name, &parsed);
        let to_sign = string_to_sign(method.as_str(), content_length, content_type, &ms_headers, &resource);
        let signature = sign(&self.account.key, &to_sign)?;

        let mut builder = self.http.request(method, parsed);
        for (name, value) in &ms_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        Ok(builder.header(
            header::AUTHORIZATION,
            format!("SharedKey {}:{}", self.account.name, signature),
        ))
    }
}

fn rfc1123_now() -> String {
    chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `/{account}{path}` followed by one `\nname:value` line per query parameter, sorted by name
pub fn canonical_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, v) in url.query_pairs() {
        params.entry(k.to_ascii_lowercase()).or_default().push(v.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        resource.push('\n');
        resource.push_str(&name);
        resource.push(':');
        resource.push_str(&values.join(","));
    }

    resource
}

pub fn string_to_sign(
    verb: &str,
    content_length: u64,
    content_type: Option<&str>,
    ms_headers: &BTreeMap<String, String>,
    canonical_resource: &str,
) -> String {
    // Zero length is signed as an empty string
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let canonical_headers: String = ms_headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k.to_ascii_lowercase(), v.trim()))
        .collect();

    format!(
        "{verb}\n\n\n{length}\n\n{ctype}\n\n\n\n\n\n\n{canonical_headers}{canonical_resource}",
        verb = verb,
        length = length,
        ctype = content_type.unwrap_or(""),
        canonical_headers = canonical_headers,
        canonical_resource = canonical_resource,
    )
}

pub fn sign(key: &[u8], string_to_sign: &str) -> Result<String, AppError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| AppError::Internal(format!("Invalid storage key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Unique blob name for an uploaded file: `<uuid>-<sanitized name>`
pub fn blob_name_for(file_name: &str) -> String {
    let sanitized: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .take(200)
        .collect();
    let sanitized = if sanitized.trim_matches('_').is_empty() {
        "file".to_string()
    } else {
        sanitized
    };
    format!("{}-{}", uuid::Uuid::new_v4(), sanitized)
}

fn check_stored_size(blob_name: &str, stored: u64, expected: Option<u64>) -> Result<u64, AppError> {
    match expected {
        Some(expected) if expected != stored => Err(AppError::External(format!(
            "Blob '{}' size mismatch: expected {} bytes, found {}",
            blob_name, expected, stored
        ))),
        _ => Ok(stored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_size_must_match_upload() {
        assert_eq!(check_stored_size("a.pdf", 42, Some(42)).unwrap(), 42);
        assert_eq!(check_stored_size("a.pdf", 42, None).unwrap(), 42);
        assert!(matches!(check_stored_size("a.pdf", 40, Some(42)), Err(AppError::External(_))));
    }

    const CONN: &str = "DefaultEndpointsProtocol=https;AccountName=archivestore;AccountKey=c2VjcmV0LWtleS1ieXRlcw==;EndpointSuffix=core.windows.net";

    #[test]
    fn parses_standard_connection_string() {
        let account = StorageAccount::from_connection_string(CONN).unwrap();
        assert_eq!(account.name, "archivestore");
        assert_eq!(account.key, b"secret-key-bytes".to_vec());
        assert_eq!(account.blob_endpoint, "https://archivestore.blob.core.windows.net");
    }

    #[test]
    fn explicit_blob_endpoint_wins() {
        let conn = format!("{};BlobEndpoint=http://localhost:10000/archivestore/", CONN);
        let account = StorageAccount::from_connection_string(&conn).unwrap();
        assert_eq!(account.blob_endpoint, "http://localhost:10000/archivestore");
    }

    #[test]
    fn development_storage_uses_azurite_account() {
        let account = StorageAccount::from_connection_string("UseDevelopmentStorage=true").unwrap();
        assert_eq!(account.name, DEV_ACCOUNT_NAME);
        assert_eq!(account.blob_endpoint, DEV_BLOB_ENDPOINT);
        assert_eq!(account.key.len(), 64);
    }

    #[test]
    fn rejects_connection_string_without_key() {
        let err = StorageAccount::from_connection_string("AccountName=x").unwrap_err();
        assert!(err.to_string().contains("AccountKey"));
    }

    #[test]
    fn canonical_resource_includes_sorted_query() {
        let url = Url::parse("https://acct.blob.core.windows.net/archives?restype=container&comp=list").unwrap();
        assert_eq!(
            canonical_resource("acct", &url),
            "/acct/archives\ncomp:list\nrestype:container"
        );
    }

    #[test]
    fn canonical_resource_for_path_style_endpoint() {
        let url = Url::parse("http://127.0.0.1:10000/devstoreaccount1/archives/a.pdf").unwrap();
        assert_eq!(
            canonical_resource("devstoreaccount1", &url),
            "/devstoreaccount1/devstoreaccount1/archives/a.pdf"
        );
    }

    #[test]
    fn string_to_sign_layout() {
        let mut headers = BTreeMap::new();
        headers.insert("x-ms-version".to_string(), "2021-08-06".to_string());
        headers.insert("x-ms-blob-type".to_string(), "BlockBlob".to_string());
        headers.insert("x-ms-date".to_string(), "Mon, 01 Jan 2024 00:00:00 GMT".to_string());

        let s = string_to_sign("PUT", 11, Some("application/pdf"), &headers, "/acct/archives/a.pdf");
        let expected = "PUT\n\n\n11\n\napplication/pdf\n\n\n\n\n\n\n\
            x-ms-blob-type:BlockBlob\n\
            x-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\n\
            x-ms-version:2021-08-06\n\
            /acct/archives/a.pdf";
        assert_eq!(s, expected);
    }

    #[test]
    fn zero_length_is_signed_empty() {
        let s = string_to_sign("GET", 0, None, &BTreeMap::new(), "/acct/c/b");
        assert!(s.starts_with("GET\n\n\n\n\n\n"));
    }

    #[test]
    fn signature_is_deterministic_base64() {
        let a = sign(b"key", "payload").unwrap();
        let b = sign(b"key", "payload").unwrap();
        let c = sign(b"other", "payload").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        // 32-byte MAC encodes to 44 base64 characters
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn blob_names_are_sanitized_and_unique() {
        let a = blob_name_for("Constitution of Kenya (2010).pdf");
        let b = blob_name_for("Constitution of Kenya (2010).pdf");
        assert_ne!(a, b);
        assert!(a.ends_with("-Constitution_of_Kenya__2010_.pdf"));
        assert!(blob_name_for("???").ends_with("-file"));
    }

    #[test]
    fn blob_url_is_under_container() {
        let storage = BlobStorage::new(reqwest::Client::new(), CONN, "archives").unwrap();
        assert_eq!(
            storage.blob_url("abc-file.pdf"),
            "https://archivestore.blob.core.windows.net/archives/abc-file.pdf"
        );
    }
}
