// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Gemini API client for text generation

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::ModelConfig;
use crate::{Result, SiftError};

const SERVICE: &str = "Gemini";
const GENERATE_METHOD: &str = "generateContent";

/// A single-turn text completion service
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Model identifier, used in logs
    fn name(&self) -> &str;

    /// Complete `prompt` and return the raw response text
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Gemini API client
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: &ModelConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            model: normalize_model_name(&config.name),
            api_key,
        })
    }

    /// Build a client from config, or `None` when no API key is set
    pub fn from_config(config: &ModelConfig) -> Result<Option<Self>> {
        match config.api_key() {
            Some(key) => Ok(Some(Self::new(config, key)?)),
            None => Ok(None),
        }
    }

    /// List models that support `generateContent`
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .header("x-goog-api-key", &self.api_key)
                .query(&[("pageSize", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(upstream_error(response).await);
            }

            let page: ModelsResponse = response.json().await?;
            names.extend(
                page.models
                    .into_iter()
                    .filter(|m| m.supported_generation_methods.iter().any(|g| g == GENERATE_METHOD))
                    .map(|m| m.name),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(names)
    }
}

#[async_trait]
impl TextModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/{}:{}", self.base_url, self.model, GENERATE_METHOD);

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        debug!("Sending request to Gemini: model={}", self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let result: GenerateResponse = response.json().await?;
        result.into_text()
    }
}

impl GenerateResponse {
    fn into_text(self) -> Result<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(SiftError::ModelUnavailable(format!("empty response ({})", reason)));
        }

        Ok(text)
    }
}

async fn upstream_error(response: reqwest::Response) -> SiftError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    SiftError::Upstream {
        service: SERVICE,
        status,
        message,
    }
}

/// Gemini addresses models as `models/<id>`
fn normalize_model_name(name: &str) -> String {
    let name = name.trim().trim_matches('/');
    if name.starts_with("models/") || name.starts_with("tunedModels/") {
        name.to_string()
    } else {
        format!("models/{}", name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses in order and records every prompt
    pub(crate) struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        pub fn call_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SiftError::ModelUnavailable("script exhausted".to_string())))
        }
    }

    #[test]
    fn test_model_name_normalized() {
        assert_eq!(normalize_model_name("gemini-2.5-flash"), "models/gemini-2.5-flash");
        assert_eq!(normalize_model_name("models/gemini-2.5-flash"), "models/gemini-2.5-flash");
        assert_eq!(normalize_model_name("/models/x/"), "models/x");
    }

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: "hello" }],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"contents": [{"parts": [{"text": "hello"}]}]}));
    }

    #[test]
    fn test_response_text_joined() {
        let json = r#"{"candidates": [{"content": {"role": "model", "parts": [{"text": "```json\n"}, {"text": "{}\n```"}]}, "finishReason": "STOP"}]}"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.into_text().unwrap(), "```json\n{}\n```");
    }

    #[test]
    fn test_blocked_response_is_error() {
        let json = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let response: GenerateResponse = serde_json::from_str(json).unwrap();
        let err = response.into_text().unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_models_filtered_by_generation_method() {
        let json = r#"{"models": [
            {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]},
            {"name": "models/gemini-2.5-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]}
        ]}"#;
        let page: ModelsResponse = serde_json::from_str(json).unwrap();
        let names: Vec<_> = page
            .models
            .into_iter()
            .filter(|m| m.supported_generation_methods.iter().any(|g| g == GENERATE_METHOD))
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["models/gemini-2.5-flash"]);
        assert!(page.next_page_token.is_none());
    }
}
