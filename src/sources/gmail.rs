// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Gmail API v1 inbox reader
//!
//! Lists the newest message ids under a label, then fetches the `From`
//! header and snippet of each one.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ItemError, MessageSource, RawMessage, SourceItem};
use crate::config::GmailConfig;
use crate::{Result, SiftError};

const SERVICE: &str = "Gmail";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageDetail {
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

/// Read-only view of a mailbox, keyed by the caller's access token
#[async_trait]
pub trait MailApi: Send + Sync {
    /// Ids of the newest `max_results` messages carrying `label`
    async fn list_message_ids(
        &self,
        access_token: &str,
        label: &str,
        max_results: u32,
    ) -> Result<Vec<String>>;

    /// Sender and snippet of one message
    async fn get_message(&self, access_token: &str, id: &str) -> Result<RawMessage>;
}

/// Gmail REST client
pub struct GmailClient {
    client: Client,
    base_url: String,
}

impl GmailClient {
    pub fn new(config: &GmailConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SiftError::Unauthorized(SERVICE));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SiftError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl MailApi for GmailClient {
    async fn list_message_ids(
        &self,
        access_token: &str,
        label: &str,
        max_results: u32,
    ) -> Result<Vec<String>> {
        let url = format!("{}/users/me/messages", self.base_url);
        let max_results = max_results.to_string();
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("labelIds", label), ("maxResults", max_results.as_str())])
            .send()
            .await?;

        let list: MessageListResponse = Self::check(response).await?.json().await?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, access_token: &str, id: &str) -> Result<RawMessage> {
        let url = format!("{}/users/me/messages/{}", self.base_url, id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("format", "metadata"), ("metadataHeaders", "From")])
            .send()
            .await?;

        let detail: MessageDetail = Self::check(response).await?.json().await?;
        Ok(detail.into_raw())
    }
}

impl MessageDetail {
    fn into_raw(self) -> RawMessage {
        let sender = self
            .payload
            .as_ref()
            .and_then(|p| p.headers.iter().find(|h| h.name.eq_ignore_ascii_case("From")))
            .map(|h| h.value.clone())
            .unwrap_or_default();

        RawMessage::new(sender, unescape_snippet(&self.snippet))
    }
}

/// Longest entity name looked at when decoding a snippet piecewise
const MAX_ENTITY_LEN: usize = 32;

/// Gmail returns snippets HTML-escaped (`&#39;`, `&amp;`, `&rsquo;`).
/// Entities that do not decode are kept as written.
fn unescape_snippet(snippet: &str) -> String {
    if let Ok(text) = quick_xml::escape::unescape(snippet) {
        return text.into_owned();
    }

    let mut out = String::with_capacity(snippet.len());
    let mut rest = snippet;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        let decoded = rest[1..]
            .find(|c: char| c == ';' || c == '&' || c.is_whitespace())
            .filter(|&end| end <= MAX_ENTITY_LEN && rest.as_bytes()[end + 1] == b';')
            .and_then(|end| {
                let entity = &rest[..end + 2];
                quick_xml::escape::unescape(entity)
                    .ok()
                    .map(|text| (entity.len(), text.into_owned()))
            });

        match decoded {
            Some((len, text)) => {
                out.push_str(&text);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// The newest messages of one label, read with the session's access token
pub struct InboxSource<'a> {
    api: &'a dyn MailApi,
    access_token: &'a str,
    label: &'a str,
    max_results: u32,
}

impl<'a> InboxSource<'a> {
    pub fn new(api: &'a dyn MailApi, access_token: &'a str, config: &'a GmailConfig) -> Self {
        Self {
            api,
            access_token,
            label: &config.label,
            max_results: config.max_results,
        }
    }
}

#[async_trait]
impl<'a> MessageSource for InboxSource<'a> {
    fn name(&self) -> &'static str {
        "gmail"
    }

    async fn fetch(&self) -> Result<Vec<SourceItem>> {
        let ids = self
            .api
            .list_message_ids(self.access_token, self.label, self.max_results)
            .await?;
        info!("Listed {} messages under {}", ids.len(), self.label);

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            match self.api.get_message(self.access_token, &id).await {
                Ok(message) => {
                    debug!("Fetched message {}", id);
                    items.push(Ok(message));
                }
                Err(e) => {
                    warn!("Failed to fetch message {}: {}", id, e);
                    items.push(Err(ItemError {
                        origin: id,
                        reason: e.to_string(),
                    }));
                }
            }
        }

        Ok(items)
    }
}
