//! TikTok video publishing.
//!
//! Push protocol: initialize an upload session, PUT the video in fixed
//! 5 MB chunks (sequential, the platform rejects out-of-order ranges),
//! then commit the post.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{PublishError, PublishResult};

/// Upload chunk size. The platform requires all chunks except the last
/// to be exactly this size.
pub const CHUNK_SIZE_BYTES: usize = 5 * 1024 * 1024;

/// TikTok client configuration.
#[derive(Debug, Clone)]
pub struct TikTokConfig {
    /// Open API base URL
    pub base_url: String,
}

impl Default for TikTokConfig {
    fn default() -> Self {
        Self {
            base_url: "https://open.tiktokapis.com/v2/post/publish".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InitResponse {
    upload_id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    publish_id: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

/// TikTok Open API client.
#[derive(Clone)]
pub struct TikTokClient {
    http: Client,
    config: TikTokConfig,
}

impl TikTokClient {
    pub fn new(config: TikTokConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    /// Number of chunks a video of `size` bytes uploads as.
    pub fn chunk_count(size: usize) -> usize {
        size.div_ceil(CHUNK_SIZE_BYTES)
    }

    /// Publish a video. Returns the platform-side publish ID.
    pub async fn publish(
        &self,
        access_token: &str,
        video: &[u8],
        title: Option<&str>,
    ) -> PublishResult<String> {
        let session = self.init_upload(access_token, video.len()).await?;
        debug!(
            "Initialized upload {} ({} chunks)",
            session.upload_id,
            Self::chunk_count(video.len())
        );

        self.upload_chunks(&session.upload_url, video).await?;

        let publish_id = self
            .commit(access_token, &session.upload_id, title)
            .await?;
        info!("Published TikTok video {}", publish_id);
        Ok(publish_id)
    }

    async fn init_upload(&self, access_token: &str, video_size: usize) -> PublishResult<InitResponse> {
        let url = format!("{}/video/init", self.config.base_url);

        let body = serde_json::json!({
            "source_info": {
                "source": "FILE_UPLOAD",
                "video_size": video_size,
                "chunk_size": CHUNK_SIZE_BYTES,
                "total_chunk_count": Self::chunk_count(video_size),
            }
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| PublishError::MalformedResponse(e.to_string()))
    }

    /// PUT the video chunk by chunk, in order.
    async fn upload_chunks(&self, upload_url: &str, video: &[u8]) -> PublishResult<()> {
        let total = video.len();

        for (index, chunk) in video.chunks(CHUNK_SIZE_BYTES).enumerate() {
            let start = index * CHUNK_SIZE_BYTES;
            let end = start + chunk.len() - 1;

            let response = self
                .http
                .put(upload_url)
                .header("Content-Type", "video/mp4")
                .header("Content-Length", chunk.len())
                .header("Content-Range", format!("bytes {}-{}/{}", start, end, total))
                .body(chunk.to_vec())
                .send()
                .await
                .map_err(|e| PublishError::ChunkUploadFailed {
                    index: index as u32,
                    message: e.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PublishError::ChunkUploadFailed {
                    index: index as u32,
                    message: format!("status {}: {}", status, body),
                });
            }

            debug!("Uploaded chunk {} ({} bytes)", index, chunk.len());
        }

        Ok(())
    }

    async fn commit(
        &self,
        access_token: &str,
        upload_id: &str,
        title: Option<&str>,
    ) -> PublishResult<String> {
        let url = format!("{}/video/publish", self.config.base_url);

        let body = serde_json::json!({
            "upload_id": upload_id,
            "post_info": {
                "title": title.unwrap_or(""),
            }
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status(status.as_u16(), body));
        }

        let parsed: PublishResponse = response
            .json()
            .await
            .map_err(|e| PublishError::MalformedResponse(e.to_string()))?;
        Ok(parsed.publish_id)
    }

    /// Exchange a refresh token for a new token pair. Returns
    /// (access_token, refresh_token, expires_in_secs).
    pub async fn refresh_token(
        &self,
        client_key: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> PublishResult<(String, String, i64)> {
        let url = format!("{}/oauth/token", self.config.base_url);

        let params = [
            ("client_key", client_key),
            ("client_secret", client_secret),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self.http.post(&url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::TokenRefreshFailed(format!(
                "status {}: {}",
                status, body
            )));
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| PublishError::MalformedResponse(e.to_string()))?;
        Ok((parsed.access_token, parsed.refresh_token, parsed.expires_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TikTokClient {
        TikTokClient::new(TikTokConfig {
            base_url: server.uri(),
        })
    }

    #[test]
    fn chunk_math() {
        assert_eq!(TikTokClient::chunk_count(1), 1);
        assert_eq!(TikTokClient::chunk_count(CHUNK_SIZE_BYTES), 1);
        assert_eq!(TikTokClient::chunk_count(CHUNK_SIZE_BYTES + 1), 2);
        // A 10 MB video uploads as exactly two chunks
        assert_eq!(TikTokClient::chunk_count(10 * 1024 * 1024), 2);
    }

    #[tokio::test]
    async fn ten_megabyte_video_uploads_as_two_chunks() {
        let server = MockServer::start().await;
        let upload_url = format!("{}/upload/u1", server.uri());

        Mock::given(method("POST"))
            .and(path("/video/init"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "upload_id": "u1",
                "upload_url": upload_url,
            })))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/upload/u1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/video/publish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "publish_id": "p1"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let video = vec![0u8; 10 * 1024 * 1024];
        let id = client.publish("tok", &video, Some("title")).await.unwrap();
        assert_eq!(id, "p1");
    }

    #[tokio::test]
    async fn first_chunk_carries_full_range_header() {
        let server = MockServer::start().await;
        let upload_url = format!("{}/upload/u2", server.uri());

        Mock::given(method("POST"))
            .and(path("/video/init"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "upload_id": "u2",
                "upload_url": upload_url,
            })))
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/upload/u2"))
            .and(header("Content-Range", "bytes 0-9/10"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/video/publish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "publish_id": "p2"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.publish("tok", &[1u8; 10], None).await.unwrap();
    }

    #[tokio::test]
    async fn chunk_failure_reports_index() {
        let server = MockServer::start().await;
        let upload_url = format!("{}/upload/u3", server.uri());

        Mock::given(method("POST"))
            .and(path("/video/init"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "upload_id": "u3",
                "upload_url": upload_url,
            })))
            .mount(&server)
            .await;

        // First chunk succeeds, second is rejected
        Mock::given(method("PUT"))
            .and(path("/upload/u3"))
            .and(header("Content-Range", format!("bytes 0-{}/{}", CHUNK_SIZE_BYTES - 1, CHUNK_SIZE_BYTES + 1).as_str()))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload/u3"))
            .respond_with(ResponseTemplate::new(500).set_body_string("disk full"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let video = vec![0u8; CHUNK_SIZE_BYTES + 1];
        let err = client.publish("tok", &video, None).await.unwrap_err();
        match err {
            PublishError::ChunkUploadFailed { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            PublishError::ChunkUploadFailed { index: 1, message: String::new() }.code(),
            "CHUNK_UPLOAD_FAILED"
        );
    }

    #[tokio::test]
    async fn rate_limit_on_init_surfaces() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/video/init"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.publish("tok", &[0u8; 10], None).await.unwrap_err();
        assert_eq!(err.code(), "RATE_LIMITED");
    }
}
