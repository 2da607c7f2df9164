// src/storage.rs - Blob storage for scene and lecture artifacts
use async_trait::async_trait;
use reqwest::Client;

/// Storage buckets: per-scene artifacts vs final lecture artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBucket {
    Lectures,
    Scenes,
}

impl StorageBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBucket::Lectures => "lectures",
            StorageBucket::Scenes => "scenes",
        }
    }
}

/// Seam for blob storage: write bytes, get back a public URL.
/// Uploads to the same path overwrite, which is what makes re-running
/// assembly idempotent.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn upload(
        &self,
        bucket: StorageBucket,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, String>;

    async fn download(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Supabase storage over HTTP.
#[derive(Clone)]
pub struct StorageClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl StorageClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl ArtifactStore for StorageClient {
    async fn upload(
        &self,
        bucket: StorageBucket,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, String> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            bucket.as_str(),
            path
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", content_type)
            // upsert so re-publishing overwrites instead of duplicating
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| format!("Storage upload request error: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("Storage upload error ({}): {}", status, error_text));
        }

        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            bucket.as_str(),
            path
        ))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Storage download request error: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("Storage download error ({})", response.status()));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| format!("Storage download read error: {}", e))
    }
}

/// Deterministic object key for a scene artifact at a given version.
/// Version-tagged so a stale render can never be read back as current.
pub fn scene_artifact_path(lecture_id: uuid::Uuid, index: i32, version: i32, ext: &str) -> String {
    format!("{}/scene_{}_v{}.{}", lecture_id, index, version, ext)
}

/// Deterministic object key for a final lecture artifact.
pub fn lecture_artifact_path(lecture_id: uuid::Uuid, name: &str) -> String {
    format!("{}/{}", lecture_id, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_paths_are_deterministic_and_version_tagged() {
        let id = uuid::Uuid::nil();
        let a = scene_artifact_path(id, 2, 3, "mp4");
        let b = scene_artifact_path(id, 2, 3, "mp4");
        assert_eq!(a, b);
        assert!(a.contains("scene_2_v3"));

        // bumping the version changes the key, so old artifacts are superseded
        let c = scene_artifact_path(id, 2, 4, "mp4");
        assert_ne!(a, c);

        assert_eq!(
            lecture_artifact_path(id, "final.mp4"),
            format!("{}/final.mp4", id)
        );
    }
}
