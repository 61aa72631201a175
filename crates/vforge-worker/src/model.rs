//! Vision/generation model client.
//!
//! Single client for both model calls the pipeline makes: per-frame scene
//! analysis (text + image) and template schema generation (text only).
//! Responses are free text expected to contain one JSON object, possibly
//! wrapped in a markdown code fence; [`extract_json_object`] digs it out.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

/// Model client configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

impl ModelConfig {
    /// Load from `MODEL_API_KEY`, `MODEL_BASE_URL`, `MODEL_NAME`.
    pub fn from_env() -> WorkerResult<Self> {
        let api_key = std::env::var("MODEL_API_KEY")
            .map_err(|_| WorkerError::config_error("MODEL_API_KEY not set"))?;
        Ok(Self {
            base_url: std::env::var("MODEL_BASE_URL").unwrap_or_else(|_| {
                "https://generativelanguage.googleapis.com/v1beta".to_string()
            }),
            model: std::env::var("MODEL_NAME").unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
            api_key,
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

/// Model API client.
#[derive(Clone)]
pub struct ModelClient {
    http: Client,
    config: ModelConfig,
}

impl ModelClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub fn from_env() -> WorkerResult<Self> {
        Ok(Self::new(ModelConfig::from_env()?))
    }

    /// Text-only generation call. Returns the raw response text.
    pub async fn generate(&self, prompt: &str) -> WorkerResult<String> {
        self.call(vec![Part::Text {
            text: prompt.to_string(),
        }])
        .await
    }

    /// Vision call: instruction text plus one JPEG image.
    pub async fn analyze_image(&self, prompt: &str, jpeg: &[u8]) -> WorkerResult<String> {
        self.call(vec![
            Part::Text {
                text: prompt.to_string(),
            },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: "image/jpeg".to_string(),
                    data: BASE64.encode(jpeg),
                },
            },
        ])
        .await
    }

    async fn call(&self, parts: Vec<Part>) -> WorkerResult<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url, self.config.model, self.config.api_key
        );

        let request = GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| WorkerError::transport(format!("Model request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::from_model_status(status.as_u16(), body));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| WorkerError::model_failed(format!("Malformed model response: {}", e)))?;

        let text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| WorkerError::model_failed("Model response had no content"))?;

        debug!("Model returned {} chars", text.len());
        Ok(text)
    }
}

/// Extract the first balanced top-level `{...}` span from model output.
///
/// Tolerates markdown code fences and prose around the object. Returns
/// None when no balanced object exists.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_object() {
        assert_eq!(extract_json_object(r#"{"a":1}"#), Some(r#"{"a":1}"#));
    }

    #[test]
    fn extracts_from_code_fence() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn extracts_with_surrounding_prose() {
        let text = "Here is the schema you asked for:\n{\"slots\": []}\nLet me know!";
        assert_eq!(extract_json_object(text), Some("{\"slots\": []}"));
    }

    #[test]
    fn handles_nested_objects() {
        let text = r#"{"a": {"b": {"c": 1}}, "d": 2} trailing"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"a": {"b": {"c": 1}}, "d": 2}"#)
        );
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_depth() {
        let text = r#"{"label": "use { and } freely"}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn no_object_returns_none() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{unbalanced"), None);
    }

    fn client_for(server: &wiremock::MockServer) -> ModelClient {
        ModelClient::new(ModelConfig {
            base_url: server.uri(),
            model: "test-model".to_string(),
            api_key: "k".to_string(),
        })
    }

    #[tokio::test]
    async fn response_text_is_extracted() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/test-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [
                    {"content": {"parts": [{"text": "{\"ok\":true}"}]}}
                ]
            })))
            .mount(&server)
            .await;

        let text = client_for(&server).generate("hi").await.unwrap();
        assert_eq!(text, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn rate_limit_status_maps_to_rate_limited() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/test-model:generateContent"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("hi").await.unwrap_err();
        assert!(matches!(err, WorkerError::RateLimited(_)));
    }

    #[tokio::test]
    async fn empty_candidates_is_a_model_failure() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/test-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": []
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("hi").await.unwrap_err();
        assert!(matches!(err, WorkerError::ModelFailed(_)));
    }
}
