//! Photo hosting: the `PhotoHost` contract, the ImageKit client, upload
//! limits, and batch helpers with compensating deletes.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use reqwest::Url;
use serde::Deserialize;

use crate::config::ImageKitConfig;
use crate::error::AppError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A file received from a client, not yet hosted.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// A hosted photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPhoto {
    pub url: String,
    pub file_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PhotoError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Photo host returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Photo hosting is not configured")]
    NotConfigured,

    #[error("Photo host rejected the upload: {0}")]
    Rejected(String),
}

impl From<PhotoError> for AppError {
    fn from(e: PhotoError) -> Self {
        AppError::Internal(format!("Photo upload failed: {e}"))
    }
}

#[async_trait]
pub trait PhotoHost: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, folder: &str) -> Result<StoredPhoto, PhotoError>;

    /// Deleting an id that no longer exists is not an error.
    async fn delete(&self, file_id: &str) -> Result<(), PhotoError>;

    /// Whether `url` points at a photo this host serves.
    fn serves(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https") && url.host().is_some()
    }
}

/// True when `raw` is an absolute URL served by `host`.
pub fn is_hosted_url(host: &dyn PhotoHost, raw: &str) -> bool {
    Url::parse(raw.trim()).is_ok_and(|url| host.serves(&url))
}

// ---------- limits ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_size: usize,
    pub max_files: usize,
    /// Lowercase MIME subtypes (`png`, `jpeg`, ...).
    pub allowed_types: Vec<String>,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: 5 * 1024 * 1024,
            max_files: 10,
            allowed_types: vec!["jpg".into(), "jpeg".into(), "png".into()],
        }
    }
}

impl UploadLimits {
    /// Largest multipart body a photo request can legitimately carry.
    pub fn body_limit(&self) -> usize {
        self.max_file_size
            .saturating_mul(self.max_files)
            .saturating_add(1024 * 1024)
    }

    /// Check a batch of files against count, type and size limits.
    /// `required` rejects an empty batch.
    pub fn check(&self, files: &[PhotoUpload], required: bool) -> Result<(), AppError> {
        if required && files.is_empty() {
            return Err(AppError::invalid("photos", "At least one photo must be uploaded"));
        }
        if files.len() > self.max_files {
            return Err(AppError::invalid(
                "photos",
                format!("At most {} photos per upload", self.max_files),
            ));
        }
        for file in files {
            if !self.type_allowed(file) {
                return Err(AppError::invalid(
                    "photos",
                    format!(
                        "File type not allowed for {}. Only {} are allowed",
                        file.file_name,
                        self.allowed_types.join(", ")
                    ),
                ));
            }
            if file.bytes.len() > self.max_file_size {
                return Err(AppError::invalid(
                    "photos",
                    format!(
                        "{} exceeds the maximum size of {} bytes",
                        file.file_name, self.max_file_size
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Matches the MIME subtype; without a content type, falls back to the
    /// file extension.
    fn type_allowed(&self, file: &PhotoUpload) -> bool {
        let kind = match file.content_type.as_deref() {
            Some(ct) => ct.split('/').nth(1).unwrap_or_default(),
            None => file.file_name.rsplit('.').next().unwrap_or_default(),
        };
        let kind = kind.split(';').next().unwrap_or_default().trim().to_lowercase();
        self.allowed_types.iter().any(|t| *t == kind)
    }
}

// ---------- batch helpers ----------

/// Upload every file concurrently into `folder`. If any upload fails, the
/// ones that succeeded are deleted again and the first error is returned.
pub async fn upload_all(
    host: &dyn PhotoHost,
    files: Vec<PhotoUpload>,
    folder: &str,
) -> Result<Vec<StoredPhoto>, AppError> {
    let stamp = Utc::now().timestamp_millis();
    let uploads = files.into_iter().map(|file| {
        let name = format!("{stamp}-{}", file.file_name);
        async move { host.upload(file.bytes, &name, folder).await }
    });

    let mut stored = Vec::new();
    let mut first_err = None;
    for result in join_all(uploads).await {
        match result {
            Ok(photo) => stored.push(photo),
            Err(e) => {
                tracing::warn!(folder, error = %e, "photo upload failed");
                first_err.get_or_insert(e);
            }
        }
    }

    match first_err {
        None => Ok(stored),
        Some(e) => {
            delete_best_effort(host, &stored).await;
            Err(e.into())
        }
    }
}

/// Delete hosted photos, logging failures instead of propagating them.
pub async fn delete_best_effort(host: &dyn PhotoHost, photos: &[StoredPhoto]) {
    let deletes = photos.iter().map(|p| async move { (p, host.delete(&p.file_id).await) });
    for (photo, result) in join_all(deletes).await {
        if let Err(e) = result {
            tracing::warn!(file_id = %photo.file_id, error = %e, "photo cleanup failed");
        }
    }
}

// ---------- ImageKit ----------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageKitUploadResponse {
    file_id: String,
    url: String,
}

/// ImageKit media API client. Authenticates with HTTP basic auth using the
/// private key as the username.
pub struct ImageKitHost {
    client: reqwest::Client,
    private_key: String,
    upload_url: String,
    api_url: String,
    /// Delivery prefix, e.g. `https://ik.imagekit.io/acme`.
    url_endpoint: Option<String>,
}

impl ImageKitHost {
    pub fn new(
        private_key: String,
        upload_url: String,
        api_url: String,
        url_endpoint: Option<String>,
    ) -> Result<Self, PhotoError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            private_key,
            upload_url,
            api_url: api_url.trim_end_matches('/').to_string(),
            url_endpoint: url_endpoint.map(|e| e.trim_end_matches('/').to_string()),
        })
    }
}

#[async_trait]
impl PhotoHost for ImageKitHost {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, folder: &str) -> Result<StoredPhoto, PhotoError> {
        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string()),
            )
            .text("fileName", file_name.to_string())
            .text("folder", folder.to_string())
            .text("useUniqueFileName", "true");

        let response = self
            .client
            .post(&self.upload_url)
            .basic_auth(&self.private_key, Some(""))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PhotoError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ImageKitUploadResponse = response.json().await?;
        if parsed.url.is_empty() {
            return Err(PhotoError::Rejected("empty url in response".into()));
        }
        Ok(StoredPhoto {
            url: parsed.url,
            file_id: parsed.file_id,
        })
    }

    async fn delete(&self, file_id: &str) -> Result<(), PhotoError> {
        let response = self
            .client
            .delete(format!("{}/files/{file_id}", self.api_url))
            .basic_auth(&self.private_key, Some(""))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(PhotoError::HttpStatus {
            status: status.as_u16(),
            body,
        })
    }

    fn serves(&self, url: &Url) -> bool {
        if url.scheme() != "https" {
            return false;
        }
        match &self.url_endpoint {
            Some(endpoint) => url
                .as_str()
                .strip_prefix(endpoint.as_str())
                .is_some_and(|rest| rest.starts_with('/')),
            None => url
                .host_str()
                .is_some_and(|h| h == "imagekit.io" || h.ends_with(".imagekit.io")),
        }
    }
}

/// Stand-in used when no ImageKit key is configured. Every upload fails.
pub struct UnconfiguredHost;

#[async_trait]
impl PhotoHost for UnconfiguredHost {
    async fn upload(&self, _bytes: Vec<u8>, _file_name: &str, _folder: &str) -> Result<StoredPhoto, PhotoError> {
        Err(PhotoError::NotConfigured)
    }

    async fn delete(&self, _file_id: &str) -> Result<(), PhotoError> {
        Ok(())
    }
}

/// Build the photo host for the given settings.
pub fn host_from_config(cfg: &ImageKitConfig) -> Result<Box<dyn PhotoHost>, PhotoError> {
    match &cfg.private_key {
        Some(key) => Ok(Box::new(ImageKitHost::new(
            key.clone(),
            cfg.upload_url.clone(),
            cfg.api_url.clone(),
            cfg.url_endpoint.clone(),
        )?)),
        None => {
            tracing::warn!("TT_IMAGEKIT_PRIVATE_KEY not set, photo uploads are disabled");
            Ok(Box::new(UnconfiguredHost))
        }
    }
}

/// In-process host that keeps uploads in memory. URLs look like
/// `memory://{folder}/{file_name}`.
#[derive(Default)]
pub struct MemoryHost {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    stored: Vec<(StoredPhoto, usize)>,
    deleted: Vec<String>,
    fail_uploads_named: Option<String>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make uploads whose file name contains `needle` fail.
    pub fn fail_uploads_named(&self, needle: &str) {
        if let Ok(mut state) = self.inner.lock() {
            state.fail_uploads_named = Some(needle.to_string());
        }
    }

    /// Photos currently hosted (uploaded and not deleted).
    pub fn stored(&self) -> Vec<StoredPhoto> {
        self.inner
            .lock()
            .map(|s| {
                s.stored
                    .iter()
                    .filter(|(p, _)| !s.deleted.contains(&p.file_id))
                    .map(|(p, _)| p.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.inner.lock().map(|s| s.deleted.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PhotoHost for MemoryHost {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str, folder: &str) -> Result<StoredPhoto, PhotoError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| PhotoError::Rejected("memory host poisoned".into()))?;
        if let Some(needle) = &state.fail_uploads_named
            && file_name.contains(needle.as_str())
        {
            return Err(PhotoError::Rejected(format!("refusing {file_name}")));
        }
        state.next_id += 1;
        let photo = StoredPhoto {
            url: format!("memory://{folder}/{file_name}"),
            file_id: format!("mem-{}", state.next_id),
        };
        state.stored.push((photo.clone(), bytes.len()));
        Ok(photo)
    }

    async fn delete(&self, file_id: &str) -> Result<(), PhotoError> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| PhotoError::Rejected("memory host poisoned".into()))?;
        state.deleted.push(file_id.to_string());
        Ok(())
    }

    fn serves(&self, url: &Url) -> bool {
        url.scheme() == "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(name: &str, size: usize) -> PhotoUpload {
        PhotoUpload {
            file_name: name.to_string(),
            content_type: Some("image/jpeg".into()),
            bytes: vec![0u8; size],
        }
    }

    #[test]
    fn limits_reject_empty_when_required() {
        let limits = UploadLimits::default();
        let err = limits.check(&[], true).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "photos");
        assert!(limits.check(&[], false).is_ok());
    }

    #[test]
    fn limits_reject_too_many_and_too_large() {
        let limits = UploadLimits {
            max_file_size: 10,
            max_files: 2,
            ..UploadLimits::default()
        };
        let three = vec![jpeg("a.jpg", 1), jpeg("b.jpg", 1), jpeg("c.jpg", 1)];
        assert!(limits.check(&three, true).is_err());
        assert!(limits.check(&[jpeg("big.jpg", 11)], true).is_err());
        assert!(limits.check(&[jpeg("ok.jpg", 10)], true).is_ok());
    }

    #[test]
    fn limits_check_mime_subtype() {
        let limits = UploadLimits::default();
        let gif = PhotoUpload {
            file_name: "anim.gif".into(),
            content_type: Some("image/gif".into()),
            bytes: vec![1],
        };
        assert!(limits.check(&[gif], true).is_err());

        let untyped_png = PhotoUpload {
            file_name: "site.PNG".into(),
            content_type: None,
            bytes: vec![1],
        };
        assert!(limits.check(&[untyped_png], true).is_ok());
    }

    #[tokio::test]
    async fn upload_all_rolls_back_on_failure() {
        let host = MemoryHost::new();
        host.fail_uploads_named("broken");

        let err = upload_all(
            &host,
            vec![jpeg("one.jpg", 1), jpeg("broken.jpg", 1), jpeg("two.jpg", 1)],
            "tender-photos/x",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Internal(_)));
        assert!(host.stored().is_empty(), "successful uploads must be removed");
        assert_eq!(host.deleted().len(), 2);
    }

    #[tokio::test]
    async fn upload_all_keeps_input_order() {
        let host = MemoryHost::new();
        let stored = upload_all(&host, vec![jpeg("a.jpg", 1), jpeg("b.jpg", 1)], "f")
            .await
            .unwrap();
        assert!(stored[0].url.ends_with("-a.jpg"));
        assert!(stored[1].url.ends_with("-b.jpg"));
        assert!(stored[0].url.starts_with("memory://f/"));
    }

    #[tokio::test]
    async fn unconfigured_host_fails_uploads() {
        let err = UnconfiguredHost.upload(vec![1], "a.jpg", "f").await.unwrap_err();
        assert!(matches!(err, PhotoError::NotConfigured));
        assert!(UnconfiguredHost.delete("anything").await.is_ok());
    }

    #[test]
    fn hosted_urls_must_match_the_host() {
        let memory = MemoryHost::new();
        assert!(is_hosted_url(&memory, "memory://tender-photos/general/1-a.jpg"));
        assert!(!is_hosted_url(&memory, "https://cdn.example.com/a.jpg"));
        assert!(!is_hosted_url(&memory, "not a url"));

        let pinned = ImageKitHost::new(
            "key".into(),
            "https://upload.imagekit.io/api/v1/files/upload".into(),
            "https://api.imagekit.io/v1".into(),
            Some("https://ik.imagekit.io/acme/".into()),
        )
        .unwrap();
        assert!(is_hosted_url(&pinned, "https://ik.imagekit.io/acme/tender-photos/a.jpg"));
        assert!(!is_hosted_url(&pinned, "https://ik.imagekit.io/acmex/a.jpg"));
        assert!(!is_hosted_url(&pinned, "http://ik.imagekit.io/acme/a.jpg"));

        let open = ImageKitHost::new("key".into(), "u".into(), "a".into(), None).unwrap();
        assert!(is_hosted_url(&open, "https://ik.imagekit.io/other/a.jpg"));
        assert!(!is_hosted_url(&open, "https://evil.example/imagekit.io/a.jpg"));

        assert!(is_hosted_url(&UnconfiguredHost, "https://cdn.example.com/a.jpg"));
        assert!(!is_hosted_url(&UnconfiguredHost, "ftp://cdn.example.com/a.jpg"));
    }
}
