//! Object storage client.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info, warn};

use sborr_core::{Error, ObjectStorage, Result};

use crate::http::{error_message, HttpCore};

/// Storage API client: objects live at `/storage/v1/object/{bucket}/{path}`.
pub struct RestStorage {
    http: HttpCore,
}

impl RestStorage {
    pub fn new(http: HttpCore) -> Self {
        Self { http }
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/object/{}/{}",
            self.http.config().storage_url(),
            urlencoding::encode(bucket),
            encode_path(path)
        )
    }
}

/// Percent-encode each segment of an object path, keeping the separators.
pub fn encode_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ObjectStorage for RestStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> Result<()> {
        debug!(bucket, storage_path = path, size = data.len(), content_type, "storage: upload");
        let response = self
            .http
            .authorized(Method::POST, &self.object_url(bucket, path))
            .await?
            .header("Content-Type", content_type)
            .header("x-upsert", if upsert { "true" } else { "false" })
            .body(data.to_vec())
            .send()
            .await?;
        if !response.status().is_success() {
            let message = error_message(response).await;
            warn!(bucket, storage_path = path, error = %message, "storage: upload failed");
            return Err(Error::Storage(message));
        }
        info!(bucket, storage_path = path, "storage: uploaded");
        Ok(())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let url = format!(
            "{}/object/{}",
            self.http.config().storage_url(),
            urlencoding::encode(bucket)
        );
        let response = self
            .http
            .authorized(Method::DELETE, &url)
            .await?
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;
        if !response.status().is_success() {
            let message = error_message(response).await;
            warn!(bucket, error = %message, "storage: remove failed");
            return Err(Error::Storage(message));
        }
        debug!(bucket, count = paths.len(), "storage: removed");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.http.config().storage_url(),
            urlencoding::encode(bucket),
            encode_path(path)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(
            encode_path("avatars/u-1 copy.jpg"),
            "avatars/u-1%20copy.jpg"
        );
        assert_eq!(encode_path("/documents/1.pdf"), "documents/1.pdf");
    }
}
