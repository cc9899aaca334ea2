// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Google OAuth 2.0 web-server flow
//!
//! Builds the consent URL, exchanges the returned authorization code for
//! tokens, and refreshes expired access tokens.

use reqwest::{Client, Url};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::OAuthConfig;
use crate::session::Credentials;
use crate::{Result, SiftError};

/// Client identity as issued by the Google cloud console
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct SecretsFile {
    web: Option<SecretsSection>,
    installed: Option<SecretsSection>,
}

#[derive(Deserialize)]
struct SecretsSection {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl ClientSecrets {
    /// Read a `client_secret.json` file. Either the `web` or the `installed`
    /// section is accepted; missing endpoints fall back to `config`.
    pub fn load(path: &Path, config: &OAuthConfig) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, config)
    }

    fn parse(content: &str, config: &OAuthConfig) -> Result<Self> {
        let file: SecretsFile = serde_json::from_str(content)
            .map_err(|e| SiftError::Config(format!("Invalid client secrets: {}", e)))?;
        let section = file.web.or(file.installed).ok_or_else(|| {
            SiftError::Config("Client secrets have neither a web nor an installed section".to_string())
        })?;

        Ok(Self {
            client_id: section.client_id,
            client_secret: section.client_secret,
            auth_uri: section.auth_uri.unwrap_or_else(|| config.auth_url.clone()),
            token_uri: section.token_uri.unwrap_or_else(|| config.token_url.clone()),
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// OAuth client bound to one registered redirect URL
pub struct OAuthClient {
    client: Client,
    secrets: ClientSecrets,
    redirect_url: String,
    scopes: Vec<String>,
}

impl OAuthClient {
    pub fn new(secrets: ClientSecrets, config: &OAuthConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            secrets,
            redirect_url: config.redirect_url.clone(),
            scopes: config.scopes.clone(),
        })
    }

    /// Build a client from config, or `None` when the secrets file is absent
    pub fn from_config(config: &OAuthConfig) -> Result<Option<Self>> {
        let path = Path::new(&config.client_secrets_path);
        if !path.exists() {
            return Ok(None);
        }
        let secrets = ClientSecrets::load(path, config)?;
        info!("Loaded OAuth client {}", secrets.client_id);
        Ok(Some(Self::new(secrets, config)?))
    }

    /// Consent page URL carrying the anti-forgery `state`
    pub fn authorization_url(&self, state: &str) -> Result<String> {
        let scope = self.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.secrets.auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.secrets.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("scope", scope.as_str()),
                ("state", state),
                ("access_type", "offline"),
                ("include_granted_scopes", "true"),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| SiftError::Config(format!("Invalid auth URL: {}", e)))?;
        Ok(url.into())
    }

    /// Trade an authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> Result<Credentials> {
        let params = [
            ("code", code),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("redirect_uri", self.redirect_url.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let token = self.request_token(&params).await?;
        info!("Exchanged authorization code for tokens");
        Ok(self.credentials_from(token, None))
    }

    /// Get a new access token, keeping the refresh token when Google does
    /// not issue a fresh one
    pub async fn refresh(&self, credentials: &Credentials) -> Result<Credentials> {
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .ok_or_else(|| SiftError::OAuth("No refresh token available".to_string()))?;

        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let token = self.request_token(&params).await?;
        debug!("Refreshed access token");
        Ok(self.credentials_from(token, Some(refresh_token)))
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .client
            .post(&self.secrets.token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| SiftError::OAuth(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SiftError::OAuth(format!("Token endpoint returned {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| SiftError::OAuth(format!("Unreadable token response: {}", e)))
    }

    fn credentials_from(&self, token: TokenResponse, previous_refresh: Option<&str>) -> Credentials {
        let scopes = match token.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => self.scopes.clone(),
        };

        Credentials {
            token: token.access_token,
            refresh_token: token.refresh_token.or_else(|| previous_refresh.map(str::to_string)),
            token_uri: self.secrets.token_uri.clone(),
            client_id: self.secrets.client_id.clone(),
            client_secret: self.secrets.client_secret.clone(),
            scopes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRETS: &str = r#"{"web": {
        "client_id": "abc.apps.googleusercontent.com",
        "project_id": "sift",
        "auth_uri": "https://accounts.google.com/o/oauth2/auth",
        "token_uri": "https://oauth2.googleapis.com/token",
        "client_secret": "s3cret",
        "redirect_uris": ["http://localhost:5000/callback"]
    }}"#;

    fn client() -> OAuthClient {
        let config = OAuthConfig::default();
        OAuthClient::new(ClientSecrets::parse(SECRETS, &config).unwrap(), &config).unwrap()
    }

    #[test]
    fn test_parse_web_secrets() {
        let secrets = ClientSecrets::parse(SECRETS, &OAuthConfig::default()).unwrap();
        assert_eq!(secrets.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secrets.client_secret, "s3cret");
    }

    #[test]
    fn test_installed_secrets_fall_back_to_config_urls() {
        let json = r#"{"installed": {"client_id": "id", "client_secret": "x"}}"#;
        let config = OAuthConfig {
            token_url: "http://127.0.0.1:9/token".to_string(),
            ..OAuthConfig::default()
        };
        let secrets = ClientSecrets::parse(json, &config).unwrap();
        assert_eq!(secrets.token_uri, "http://127.0.0.1:9/token");
        assert_eq!(secrets.auth_uri, config.auth_url);
    }

    #[test]
    fn test_secrets_without_section_rejected() {
        let err = ClientSecrets::parse(r#"{"other": {}}"#, &OAuthConfig::default()).unwrap_err();
        assert!(matches!(err, SiftError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client_secret.json");
        std::fs::write(&path, SECRETS).unwrap();

        let secrets = ClientSecrets::load(&path, &OAuthConfig::default()).unwrap();
        assert_eq!(secrets.client_id, "abc.apps.googleusercontent.com");
    }

    #[test]
    fn test_missing_secrets_file_means_no_client() {
        let dir = tempfile::tempdir().unwrap();
        let config = OAuthConfig {
            client_secrets_path: dir.path().join("absent.json").to_string_lossy().into_owned(),
            ..OAuthConfig::default()
        };
        assert!(OAuthClient::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_authorization_url_parameters() {
        let url = Url::parse(&client().authorization_url("xyz").unwrap()).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["state"], "xyz");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["access_type"], "offline");
        assert_eq!(params["include_granted_scopes"], "true");
        assert_eq!(params["prompt"], "select_account");
        assert_eq!(params["redirect_uri"], "http://localhost:5000/callback");
        assert_eq!(params["scope"], "https://www.googleapis.com/auth/gmail.readonly");
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let token = TokenResponse {
            access_token: "new".to_string(),
            refresh_token: None,
            scope: Some("a b".to_string()),
        };
        let creds = client().credentials_from(token, Some("old-refresh"));
        assert_eq!(creds.token, "new");
        assert_eq!(creds.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(creds.scopes, vec!["a", "b"]);
        assert_eq!(creds.client_secret, "s3cret");
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails() {
        let mut creds = crate::session::tests::sample_credentials();
        creds.refresh_token = None;
        assert!(matches!(client().refresh(&creds).await, Err(SiftError::OAuth(_))));
    }
}
