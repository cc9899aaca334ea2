// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Priority tiers and message classification
//!
//! Each digest mode has its own closed set of tiers. The model is asked for a
//! small JSON object `{"priority", "from", "summary"}`; anything it returns
//! that cannot be read falls back to the lowest tier of that mode.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::hash::Hash;
use tracing::{debug, warn};

use crate::gemini::TextModel;
use crate::rate_limit::RateLimiter;
use crate::sources::RawMessage;

const NO_SUMMARY: &str = "Could not summarize.";

/// Body characters shown alongside a failed entry
pub const EXCERPT_CHARS: usize = 200;

/// A closed, ordered set of priority labels
pub trait Tier: Copy + Eq + Ord + Hash + fmt::Debug + Serialize + Send + Sync + 'static {
    /// All tiers, in display order
    const ALL: &'static [Self];

    /// Tier for anything unrecognized
    const LOWEST: Self;

    /// Noun used for error entries ("email", "SMS")
    const NOUN: &'static str;

    /// Label as the model is asked to produce it
    fn label(self) -> &'static str;

    /// Case-insensitive label lookup with the lowest tier as default
    fn parse(label: &str) -> Self {
        let wanted = label.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.label().eq_ignore_ascii_case(wanted))
            .unwrap_or(Self::LOWEST)
    }
}

/// Tiers for inbox digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InboxPriority {
    High,
    Medium,
    Low,
    Alert,
}

impl Tier for InboxPriority {
    const ALL: &'static [Self] = &[Self::High, Self::Medium, Self::Low, Self::Alert];
    const LOWEST: Self = Self::Low;
    const NOUN: &'static str = "email";

    fn label(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Alert => "Alert",
        }
    }
}

/// Tiers for SMS digests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SmsPriority {
    Urgent,
    Important,
    Other,
}

impl Tier for SmsPriority {
    const ALL: &'static [Self] = &[Self::Urgent, Self::Important, Self::Other];
    const LOWEST: Self = Self::Other;
    const NOUN: &'static str = "SMS";

    fn label(self) -> &'static str {
        match self {
            Self::Urgent => "Urgent",
            Self::Important => "Important",
            Self::Other => "Other",
        }
    }
}

/// A message after classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedMessage<T: Tier> {
    pub priority: T,
    pub from: String,
    pub summary: String,
    /// Set when the summary is an error description rather than model output
    pub failed: bool,
    /// Start of the message body, kept on failed entries so the reader can
    /// still see what the message was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl<T: Tier> ClassifiedMessage<T> {
    /// Entry for an item that could not be fetched or classified
    pub fn failure(from: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            priority: T::LOWEST,
            from: from.into(),
            summary: format!("Error processing {}: {}", T::NOUN, reason),
            failed: true,
            excerpt: None,
        }
    }

    /// Attach the first `EXCERPT_CHARS` characters of `body`
    pub fn with_excerpt(mut self, body: &str) -> Self {
        let body = body.trim();
        if !body.is_empty() {
            self.excerpt = Some(body.chars().take(EXCERPT_CHARS).collect());
        }
        self
    }
}

/// Why a model reply could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    InvalidJson(String),
    NotAnObject,
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(e) => write!(f, "model reply is not valid JSON: {}", e),
            Self::NotAnObject => write!(f, "model reply is not a JSON object"),
        }
    }
}

/// Fill a prompt template's `{sender}` and `{body}` placeholders in one pass,
/// so placeholder text inside the message itself is left alone.
pub fn render_prompt(template: &str, message: &RawMessage) -> String {
    let mut out = String::with_capacity(template.len() + message.sender.len() + message.body.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{sender}") {
            out.push_str(&message.sender);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{body}") {
            out.push_str(&message.body);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Remove markdown code-fence decoration around a model reply
pub fn strip_code_fences(raw: &str) -> String {
    raw.trim().replace("```json", "").replace("```", "").trim().to_string()
}

/// Read a model reply into a classified message.
///
/// Missing or non-string fields take defaults: the lowest tier, the sender
/// as pulled from the source, and a stock summary.
pub fn parse_reply<T: Tier>(raw: &str, message: &RawMessage) -> Result<ClassifiedMessage<T>, ReplyError> {
    let cleaned = strip_code_fences(raw);
    let value: Value =
        serde_json::from_str(&cleaned).map_err(|e| ReplyError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(ReplyError::NotAnObject)?;

    let text = |key: &str| object.get(key).and_then(Value::as_str);

    Ok(ClassifiedMessage {
        priority: text("priority").map(T::parse).unwrap_or(T::LOWEST),
        from: text("from").unwrap_or(&message.sender).to_string(),
        summary: text("summary").unwrap_or(NO_SUMMARY).to_string(),
        failed: false,
        excerpt: None,
    })
}

/// Classifies messages one at a time through a throttled model
pub struct Classifier<'a> {
    model: &'a dyn TextModel,
    limiter: &'a RateLimiter,
    template: &'a str,
}

impl<'a> Classifier<'a> {
    pub fn new(model: &'a dyn TextModel, limiter: &'a RateLimiter, template: &'a str) -> Self {
        Self {
            model,
            limiter,
            template,
        }
    }

    /// Classify one message. Never fails: model and parse errors become a
    /// lowest-tier entry carrying the error text.
    pub async fn classify<T: Tier>(&self, message: &RawMessage) -> ClassifiedMessage<T> {
        let prompt = render_prompt(self.template, message);

        self.limiter.acquire().await;
        let raw = match self.model.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Model call failed for {}: {}", message.sender, e);
                return ClassifiedMessage::failure(&message.sender, e).with_excerpt(&message.body);
            }
        };

        match parse_reply::<T>(&raw, message) {
            Ok(classified) => {
                debug!("Classified {} as {:?}", message.sender, classified.priority);
                classified
            }
            Err(e) => {
                warn!("Unusable reply from {} for {}: {}", self.model.name(), message.sender, e);
                ClassifiedMessage::failure(&message.sender, e).with_excerpt(&message.body)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::tests::ScriptedModel;
    use crate::SiftError;

    fn msg() -> RawMessage {
        RawMessage::new("Bank <alerts@bank.example>", "Your code is 123456")
    }

    #[test]
    fn test_parse_labels_case_insensitive() {
        assert_eq!(InboxPriority::parse("alert"), InboxPriority::Alert);
        assert_eq!(InboxPriority::parse(" HIGH "), InboxPriority::High);
        assert_eq!(SmsPriority::parse("Urgent"), SmsPriority::Urgent);
        assert_eq!(SmsPriority::parse("important"), SmsPriority::Important);
    }

    #[test]
    fn test_unknown_label_is_lowest() {
        assert_eq!(InboxPriority::parse("Critical"), InboxPriority::Low);
        assert_eq!(InboxPriority::parse(""), InboxPriority::Low);
        assert_eq!(SmsPriority::parse("High"), SmsPriority::Other);
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn test_parse_full_reply() {
        let raw = "```json\n{\"priority\": \"Alert\", \"from\": \"Bank\", \"summary\": \"A login code.\"}\n```";
        let c = parse_reply::<InboxPriority>(raw, &msg()).unwrap();
        assert_eq!(c.priority, InboxPriority::Alert);
        assert_eq!(c.from, "Bank");
        assert_eq!(c.summary, "A login code.");
        assert!(!c.failed);
    }

    #[test]
    fn test_parse_defaults_missing_fields() {
        let c = parse_reply::<SmsPriority>("{}", &msg()).unwrap();
        assert_eq!(c.priority, SmsPriority::Other);
        assert_eq!(c.from, "Bank <alerts@bank.example>");
        assert_eq!(c.summary, "Could not summarize.");
    }

    #[test]
    fn test_parse_defaults_wrong_types() {
        let c = parse_reply::<InboxPriority>(r#"{"priority": 3, "from": null, "summary": ["x"]}"#, &msg()).unwrap();
        assert_eq!(c.priority, InboxPriority::Low);
        assert_eq!(c.from, "Bank <alerts@bank.example>");
        assert_eq!(c.summary, "Could not summarize.");
    }

    #[test]
    fn test_parse_rejects_non_json_and_non_objects() {
        assert!(matches!(
            parse_reply::<InboxPriority>("Sure! Here is the JSON you asked for", &msg()),
            Err(ReplyError::InvalidJson(_))
        ));
        assert_eq!(
            parse_reply::<InboxPriority>("[1, 2]", &msg()),
            Err(ReplyError::NotAnObject)
        );
    }

    #[test]
    fn test_render_prompt_single_pass() {
        let m = RawMessage::new("{body}", "hi {sender}");
        assert_eq!(render_prompt("From: {sender}\nMsg: {body}\n{\"x\": 1}", &m), "From: {body}\nMsg: hi {sender}\n{\"x\": 1}");
    }

    #[test]
    fn test_failure_entry() {
        let c = ClassifiedMessage::<SmsPriority>::failure("+1555", "boom");
        assert_eq!(c.priority, SmsPriority::Other);
        assert_eq!(c.summary, "Error processing SMS: boom");
        assert!(c.failed);
        assert!(c.excerpt.is_none());
    }

    #[test]
    fn test_excerpt_truncates_by_chars() {
        let body = "é".repeat(EXCERPT_CHARS + 50);
        let c = ClassifiedMessage::<SmsPriority>::failure("+1555", "boom").with_excerpt(&body);
        assert_eq!(c.excerpt.unwrap().chars().count(), EXCERPT_CHARS);

        let c = ClassifiedMessage::<SmsPriority>::failure("+1555", "boom").with_excerpt("  ");
        assert!(c.excerpt.is_none());
    }

    #[tokio::test]
    async fn test_classify_uses_template_and_model() {
        let model = ScriptedModel::replying(&[r#"{"priority": "High", "from": "Boss", "summary": "Meeting moved."}"#]);
        let limiter = RateLimiter::unlimited();
        let classifier = Classifier::new(&model, &limiter, "S={sender} B={body}");

        let c: ClassifiedMessage<InboxPriority> = classifier.classify(&msg()).await;
        assert_eq!(c.priority, InboxPriority::High);
        assert_eq!(c.from, "Boss");
        assert_eq!(
            model.prompts.lock().unwrap()[0],
            "S=Bank <alerts@bank.example> B=Your code is 123456"
        );
    }

    #[tokio::test]
    async fn test_classify_model_error_demotes() {
        let model = ScriptedModel::new(vec![Err(SiftError::ModelUnavailable("quota".to_string()))]);
        let limiter = RateLimiter::unlimited();
        let classifier = Classifier::new(&model, &limiter, "{sender} {body}");

        let c: ClassifiedMessage<SmsPriority> = classifier.classify(&msg()).await;
        assert_eq!(c.priority, SmsPriority::Other);
        assert!(c.failed);
        assert!(c.summary.contains("quota"));
        assert_eq!(c.excerpt.as_deref(), Some("Your code is 123456"));
    }

    #[tokio::test]
    async fn test_classify_bad_json_demotes() {
        let model = ScriptedModel::replying(&["not json at all"]);
        let limiter = RateLimiter::unlimited();
        let classifier = Classifier::new(&model, &limiter, "{sender} {body}");

        let c: ClassifiedMessage<InboxPriority> = classifier.classify(&msg()).await;
        assert_eq!(c.priority, InboxPriority::Low);
        assert!(c.failed);
        assert!(c.summary.starts_with("Error processing email: model reply is not valid JSON"));
        assert_eq!(c.excerpt.as_deref(), Some("Your code is 123456"));
    }
}
