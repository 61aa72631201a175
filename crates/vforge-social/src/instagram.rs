//! Instagram Reels publishing.
//!
//! Three-step protocol against the Graph API: create a media container
//! from a public video URL, poll the container until the platform finishes
//! processing, then publish it. The platform pulls the video itself, so we
//! hand it a presigned URL instead of uploading bytes. The caption is
//! attached after publish and is best-effort: the post already exists, so
//! a caption failure must not fail the job.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{PublishError, PublishResult};

/// Instagram client configuration.
#[derive(Debug, Clone)]
pub struct InstagramConfig {
    /// Graph API base URL
    pub base_url: String,
    /// Delay between container status polls
    pub poll_interval: Duration,
    /// Maximum number of status polls before giving up
    pub max_poll_attempts: u32,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.instagram.com/v21.0".to_string(),
            poll_interval: Duration::from_secs(10),
            max_poll_attempts: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    status_code: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: i64,
}

/// Instagram Graph API client.
#[derive(Clone)]
pub struct InstagramClient {
    http: Client,
    config: InstagramConfig,
}

impl InstagramClient {
    pub fn new(config: InstagramConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    /// Publish a video as a Reel. Returns the platform-side media ID.
    pub async fn publish(
        &self,
        access_token: &str,
        ig_user_id: &str,
        video_url: &str,
        caption: Option<&str>,
    ) -> PublishResult<String> {
        let container_id = self
            .create_container(access_token, ig_user_id, video_url)
            .await?;
        debug!("Created media container {}", container_id);

        self.wait_for_processing(access_token, &container_id).await?;

        let media_id = self
            .publish_container(access_token, ig_user_id, &container_id)
            .await?;
        info!("Published Instagram media {}", media_id);

        if let Some(caption) = caption {
            if let Err(e) = self.attach_caption(access_token, &media_id, caption).await {
                warn!("Caption attach failed for media {}: {}", media_id, e);
            }
        }

        Ok(media_id)
    }

    async fn create_container(
        &self,
        access_token: &str,
        ig_user_id: &str,
        video_url: &str,
    ) -> PublishResult<String> {
        let url = format!("{}/{}/media", self.config.base_url, ig_user_id);

        let params = vec![
            ("media_type", "REELS".to_string()),
            ("video_url", video_url.to_string()),
            ("access_token", access_token.to_string()),
        ];

        let response = self.http.post(&url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status(status.as_u16(), body));
        }

        let parsed: IdResponse = response
            .json()
            .await
            .map_err(|e| PublishError::MalformedResponse(e.to_string()))?;
        Ok(parsed.id)
    }

    /// Poll the container until FINISHED, or fail on ERROR / timeout.
    async fn wait_for_processing(
        &self,
        access_token: &str,
        container_id: &str,
    ) -> PublishResult<()> {
        let url = format!(
            "{}/{}?fields=status_code&access_token={}",
            self.config.base_url, container_id, access_token
        );

        for attempt in 1..=self.config.max_poll_attempts {
            let response = self.http.get(&url).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(PublishError::from_status(status.as_u16(), body));
            }

            let parsed: ContainerStatus = response
                .json()
                .await
                .map_err(|e| PublishError::MalformedResponse(e.to_string()))?;

            match parsed.status_code.as_str() {
                "FINISHED" => return Ok(()),
                "ERROR" => {
                    return Err(PublishError::VideoProcessingError(format!(
                        "container {} reported ERROR",
                        container_id
                    )));
                }
                other => {
                    debug!(
                        "Container {} status {} (poll {}/{})",
                        container_id, other, attempt, self.config.max_poll_attempts
                    );
                }
            }

            if attempt < self.config.max_poll_attempts {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        warn!(
            "Container {} not processed after {} polls",
            container_id, self.config.max_poll_attempts
        );
        Err(PublishError::VideoProcessingTimeout)
    }

    async fn publish_container(
        &self,
        access_token: &str,
        ig_user_id: &str,
        container_id: &str,
    ) -> PublishResult<String> {
        let url = format!("{}/{}/media_publish", self.config.base_url, ig_user_id);

        let params = [
            ("creation_id", container_id.to_string()),
            ("access_token", access_token.to_string()),
        ];

        let response = self.http.post(&url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status(status.as_u16(), body));
        }

        let parsed: IdResponse = response
            .json()
            .await
            .map_err(|e| PublishError::MalformedResponse(e.to_string()))?;
        Ok(parsed.id)
    }

    async fn attach_caption(
        &self,
        access_token: &str,
        media_id: &str,
        caption: &str,
    ) -> PublishResult<()> {
        let url = format!("{}/{}", self.config.base_url, media_id);

        let params = [
            ("caption", caption.to_string()),
            ("access_token", access_token.to_string()),
        ];

        let response = self.http.post(&url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::from_status(status.as_u16(), body));
        }
        Ok(())
    }

    /// Refresh a long-lived token. Returns the new token and its validity
    /// in seconds.
    pub async fn refresh_token(&self, access_token: &str) -> PublishResult<(String, i64)> {
        let url = format!(
            "{}/refresh_access_token?grant_type=ig_refresh_token&access_token={}",
            self.config.base_url, access_token
        );

        let response = self.http.get(&url).send().await?;
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
        Ok((parsed.access_token, parsed.expires_in))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, max_polls: u32) -> InstagramClient {
        InstagramClient::new(InstagramConfig {
            base_url: server.uri(),
            poll_interval: Duration::from_millis(1),
            max_poll_attempts: max_polls,
        })
    }

    #[test]
    fn default_poll_budget_is_five_minutes() {
        let config = InstagramConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.max_poll_attempts, 30);
    }

    #[tokio::test]
    async fn publish_happy_path() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ig_user/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "container_1"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/container_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status_code": "FINISHED"
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/ig_user/media_publish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "media_9"
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/media_9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 30);
        let media_id = client
            .publish("tok", "ig_user", "https://cdn.example/render.mp4", Some("hi"))
            .await
            .unwrap();
        assert_eq!(media_id, "media_9");
    }

    #[tokio::test]
    async fn container_create_hands_the_platform_a_url() {
        use wiremock::matchers::{body_string_contains, header};

        let server = MockServer::start().await;

        // The platform pulls the video itself; the create call is a form
        // POST carrying the URL, not an upload of the bytes.
        Mock::given(method("POST"))
            .and(path("/ig_user/media"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("media_type=REELS"))
            .and(body_string_contains(
                "video_url=https%3A%2F%2Fcdn.example%2Frender.mp4",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "container_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/container_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status_code": "FINISHED"
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/ig_user/media_publish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "media_9"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, 30);
        let media_id = client
            .publish("tok", "ig_user", "https://cdn.example/render.mp4", None)
            .await
            .unwrap();
        assert_eq!(media_id, "media_9");
    }

    #[tokio::test]
    async fn caption_failure_does_not_fail_the_publish() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ig_user/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "container_1"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/container_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status_code": "FINISHED"
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/ig_user/media_publish"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "media_9"
            })))
            .mount(&server)
            .await;

        // Caption attach blows up; the post still counts as published
        Mock::given(method("POST"))
            .and(path("/media_9"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 30);
        let media_id = client
            .publish("tok", "ig_user", "https://cdn.example/render.mp4", Some("hi"))
            .await
            .unwrap();
        assert_eq!(media_id, "media_9");
    }

    #[tokio::test]
    async fn processing_error_on_first_poll_fails_immediately() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ig_user/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "container_err"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/container_err"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status_code": "ERROR"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, 30);
        let err = client
            .publish("tok", "ig_user", "https://cdn.example/render.mp4", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VIDEO_PROCESSING_ERROR");
    }

    #[tokio::test]
    async fn stuck_processing_times_out_after_poll_budget() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/ig_user/media"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "container_slow"
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/container_slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status_code": "IN_PROGRESS"
            })))
            .expect(5)
            .mount(&server)
            .await;

        let client = client_for(&server, 5);
        let err = client
            .publish("tok", "ig_user", "https://cdn.example/render.mp4", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VIDEO_PROCESSING_TIMEOUT");
    }

    #[tokio::test]
    async fn auth_failure_surfaces_as_auth_failed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(r"^/.*/media$"))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let client = client_for(&server, 30);
        let err = client
            .publish("tok", "ig_user", "https://cdn.example/render.mp4", None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "AUTH_FAILED");
    }
}
