use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageStoreError {
    #[error("duplicate")]
    Duplicate,
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Object storage consumed by upload and by the expiry reclaimer. Listings
/// persist public URLs; `path_for_url` recovers the object path (the URL
/// segment after the bucket name) so reclamation can delete by path.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store bytes under their content hash; returns the public URL.
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<String, ImageStoreError>;
    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError>;
    /// Delete by object path. Deleting an already-absent object is Ok.
    async fn delete(&self, path: &str) -> Result<(), ImageStoreError>;
    fn url_for(&self, hash: &str) -> String;
    fn path_for_url(&self, url: &str) -> Option<String>;
}

/// Content hashes are ASCII hex (sha-256 of the bytes). Anything else
/// never names a stored object and must be refused before key
/// derivation, which slices the first two characters.
pub fn is_content_hash(s: &str) -> bool {
    s.len() >= 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Object path for a public URL of shape `{base}/{bucket}/{path}`.
pub fn object_path<'a>(url: &'a str, bucket: &str) -> Option<&'a str> {
    let marker = format!("/{bucket}/");
    let idx = url.find(&marker)?;
    let path = &url[idx + marker.len()..];
    if path.is_empty() {
        None
    } else {
        Some(path)
    }
}

// ---------------- S3 Implementation (MinIO compatible) ----------------
pub struct S3ImageStore {
    bucket: String,
    client: aws_sdk_s3::Client,
    prefix: String,
    public_base: String,
}

impl S3ImageStore {
    pub async fn new() -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let bucket = std::env::var("S3_BUCKET").unwrap_or_else(|_| "listings".into());
        let endpoint = std::env::var("S3_ENDPOINT")
            .map_err(|_| anyhow::anyhow!("S3_ENDPOINT must be set (MinIO / S3 endpoint)"))?;
        // Public URLs stored on listings; may differ from the API endpoint
        // when a CDN sits in front of the bucket.
        let public_base = std::env::var("S3_PUBLIC_URL").unwrap_or_else(|_| endpoint.clone());
        let region = std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let access = std::env::var("S3_ACCESS_KEY").unwrap_or_default();
        let secret = std::env::var("S3_SECRET_KEY").unwrap_or_default();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region));
        loader = loader.endpoint_url(endpoint);
        if !access.is_empty() && !secret.is_empty() {
            let creds = Credentials::new(access, secret, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // Path-style addressing is required for most MinIO/local endpoints
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3/MinIO client (path-style addressing enabled)");

        // Ensure bucket exists (create if missing)
        if let Err(e) = client.head_bucket().bucket(&bucket).send().await {
            warn!("head_bucket failed for '{bucket}' (will attempt create): {e:?}");
            let mut attempt = 0u32;
            let max_attempts = 8;
            loop {
                attempt += 1;
                match client.create_bucket().bucket(&bucket).send().await {
                    Ok(_) => {
                        info!("created bucket '{bucket}' (attempt {attempt})");
                        break;
                    }
                    Err(e2) => {
                        if attempt >= max_attempts {
                            error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e2:?}");
                            return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e2}"));
                        }
                        let backoff_ms = 200 * attempt.pow(2); // quadratic backoff
                        warn!("create_bucket attempt {attempt} failed for '{bucket}': {e2:?} (retrying in {backoff_ms}ms)");
                        tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                    }
                }
            }
        }

        Ok(Self {
            bucket,
            client,
            prefix: "listings".into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    fn key_for(&self, hash: &str) -> String {
        format!("{}/{}/{}", self.prefix, &hash[0..2], hash)
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn save(&self, hash: &str, mime: &str, bytes: &[u8]) -> Result<String, ImageStoreError> {
        use aws_sdk_s3::primitives::ByteStream;
        let key = self.key_for(hash);
        // HEAD to detect duplicate (idempotent upload)
        if self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .is_ok()
        {
            return Err(ImageStoreError::Duplicate);
        }
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(mime);
        if let Err(e) = put.send().await {
            error!(
                "put_object failed hash={hash} key={key} bucket={} err={:?}",
                self.bucket, e
            );
            return Err(ImageStoreError::Other(e.to_string()));
        }
        Ok(self.url_for(hash))
    }

    async fn load(&self, hash: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        let key = self.key_for(hash);
        let obj = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|_| ImageStoreError::NotFound)?;
        let data = obj
            .body
            .collect()
            .await
            .map_err(|e| ImageStoreError::Other(e.to_string()))?;
        let bytes = Vec::from(data.into_bytes().as_ref());
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }

    async fn delete(&self, path: &str) -> Result<(), ImageStoreError> {
        // S3 DeleteObject is a no-op for absent keys, which is exactly the
        // contract the reclaimer needs.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| ImageStoreError::Other(e.to_string()))?;
        Ok(())
    }

    fn url_for(&self, hash: &str) -> String {
        format!("{}/{}/{}", self.public_base, self.bucket, self.key_for(hash))
    }

    fn path_for_url(&self, url: &str) -> Option<String> {
        object_path(url, &self.bucket).map(str::to_string)
    }
}

// Factory helper used in main (S3-only; fail early if misconfigured)
pub async fn build_image_store() -> Arc<dyn ImageStore> {
    match S3ImageStore::new().await {
        Ok(store) => Arc::new(store),
        Err(e) => panic!("Failed to initialize S3 image store: {e}"),
    }
}
