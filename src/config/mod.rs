// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Sift

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Web server settings
    #[serde(default)]
    pub web: WebConfig,

    /// OAuth client settings
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Gmail API settings
    #[serde(default)]
    pub gmail: GmailConfig,

    /// Generative model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// SMS export settings
    #[serde(default)]
    pub sms: SmsConfig,

    /// Model call throttling
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Prompt templates
    #[serde(default)]
    pub prompts: PromptConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Idle sessions older than this are discarded
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OAuthConfig {
    /// Google `client_secret.json` downloaded from the cloud console
    #[serde(default = "default_client_secrets")]
    pub client_secrets_path: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Used when the secrets file does not name one
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// Used when the secrets file does not name one
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GmailConfig {
    #[serde(default = "default_gmail_url")]
    pub api_url: String,
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_max_items")]
    pub max_results: u32,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_url")]
    pub api_url: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SmsConfig {
    #[serde(default = "default_sms_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    /// Model calls allowed per interval
    #[serde(default = "default_calls")]
    pub calls: u32,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

/// Prompt templates. `{sender}` and `{body}` are substituted per message.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_inbox_prompt")]
    pub inbox: String,
    #[serde(default = "default_sms_prompt")]
    pub sms: String,
}

// Default value functions
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 5000 }
fn default_session_ttl() -> u64 { 24 * 60 * 60 }
fn default_max_upload() -> usize { 16 * 1024 * 1024 }
fn default_client_secrets() -> String { "client_secret.json".to_string() }
fn default_redirect_url() -> String { "http://localhost:5000/callback".to_string() }
fn default_scopes() -> Vec<String> {
    vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()]
}
fn default_auth_url() -> String { "https://accounts.google.com/o/oauth2/auth".to_string() }
fn default_token_url() -> String { "https://oauth2.googleapis.com/token".to_string() }
fn default_http_timeout() -> u64 { 30 }
fn default_gmail_url() -> String { "https://gmail.googleapis.com/gmail/v1".to_string() }
fn default_label() -> String { "INBOX".to_string() }
fn default_max_items() -> u32 { 20 }
fn default_sms_limit() -> usize { 20 }
fn default_model_url() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_model_name() -> String { "models/gemini-2.5-flash".to_string() }
fn default_api_key_env() -> String { "GEMINI_API_KEY".to_string() }
fn default_model_timeout() -> u64 { 120 }
fn default_calls() -> u32 { 1 }
fn default_interval() -> u64 { 6 }

fn default_inbox_prompt() -> String {
    "Analyze the following email snippet and sender.\n\
     First, check if it is an urgent notification (like a bank alert, 2FA code, password reset, \
     or payment confirmation). If it is, classify it as \"Alert\".\n\n\
     If it is not an Alert, then classify its priority as \"High\", \"Medium\", or \"Low\" \
     based on its general importance.\n\n\
     Respond ONLY with a valid JSON object in this format:\n\
     {\"priority\": \"Alert\" or \"High\" or \"Medium\" or \"Low\", \"from\": \"Sender Name\", \
     \"summary\": \"One-sentence summary\"}\n\n\
     ---\n\
     Email from: {sender}\n\
     Snippet: {body}\n\
     ---\n".to_string()
}

fn default_sms_prompt() -> String {
    "Analyze the following SMS message. Classify its priority as \"Urgent\" (e.g., 2FA codes, \
     bank alerts, emergency), \"Important\" (e.g., personal conversation, plans), or \"Other\" \
     (e.g., spam, marketing, promotions).\n\n\
     Respond ONLY with a valid JSON object in this format:\n\
     {\"priority\": \"Urgent\" or \"Important\" or \"Other\", \"from\": \"Sender\", \
     \"summary\": \"One-sentence summary\"}\n\n\
     ---\n\
     From: {sender}\n\
     Message: {body}\n\
     ---\n".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            session_ttl_secs: default_session_ttl(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_secrets_path: default_client_secrets(),
            redirect_url: default_redirect_url(),
            scopes: default_scopes(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_url: default_gmail_url(),
            label: default_label(),
            max_results: default_max_items(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_url: default_model_url(),
            name: default_model_name(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_model_timeout(),
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            limit: default_sms_limit(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls: default_calls(),
            interval_secs: default_interval(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            inbox: default_inbox_prompt(),
            sms: default_sms_prompt(),
        }
    }
}

impl ModelConfig {
    /// Read the API key from the configured environment variable.
    /// Empty values count as unset.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::SiftError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> crate::Result<()> {
        if self.rate_limit.calls == 0 {
            return Err(crate::SiftError::Config(
                "rate_limit.calls must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.interval_secs > crate::rate_limit::MAX_INTERVAL.as_secs() {
            return Err(crate::SiftError::Config(format!(
                "rate_limit.interval_secs must be at most {}",
                crate::rate_limit::MAX_INTERVAL.as_secs()
            )));
        }
        if self.web.session_ttl_secs == 0 {
            return Err(crate::SiftError::Config(
                "web.session_ttl_secs must be at least 1".to_string(),
            ));
        }
        for (name, template) in [("inbox", &self.prompts.inbox), ("sms", &self.prompts.sms)] {
            if !template.contains("{sender}") || !template.contains("{body}") {
                return Err(crate::SiftError::Config(format!(
                    "prompts.{} must contain {{sender}} and {{body}}",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.web.port, 5000);
        assert_eq!(config.gmail.max_results, 20);
        assert_eq!(config.sms.limit, 20);
        assert_eq!(config.rate_limit.interval_secs, 6);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"web": {"port": 8081}, "sms": {"limit": 5}}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.web.port, 8081);
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.sms.limit, 5);
        assert_eq!(config.model.name, "models/gemini-2.5-flash");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.gmail.label = "IMPORTANT".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.gmail.label, "IMPORTANT");
    }

    #[test]
    fn test_oversized_rate_limit_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"rate_limit": {"interval_secs": 18446744073709551615}}"#).unwrap();

        assert!(matches!(AppConfig::load(&path), Err(crate::SiftError::Config(_))));
    }

    #[test]
    fn test_day_long_rate_limit_interval_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"rate_limit": {"calls": 5, "interval_secs": 86400}}"#).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap().rate_limit.interval_secs, 86_400);
    }

    #[test]
    fn test_zero_session_ttl_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"web": {"session_ttl_secs": 0}}"#).unwrap();

        assert!(matches!(AppConfig::load(&path), Err(crate::SiftError::Config(_))));
    }

    #[test]
    fn test_prompt_without_placeholders_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"prompts": {"sms": "classify this"}}"#).unwrap();

        assert!(matches!(AppConfig::load(&path), Err(crate::SiftError::Config(_))));
    }

    #[test]
    fn test_default_prompts_have_placeholders() {
        let prompts = PromptConfig::default();
        assert!(prompts.inbox.contains("{sender}") && prompts.inbox.contains("{body}"));
        assert!(prompts.sms.contains("{sender}") && prompts.sms.contains("{body}"));
    }
}
