// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Web UI: Google sign-in, inbox digest, and SMS upload

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::{Classifier, InboxPriority, SmsPriority, Tier};
use crate::config::AppConfig;
use crate::digest::{self, Digest};
use crate::gemini::{GeminiClient, TextModel};
use crate::oauth::OAuthClient;
use crate::rate_limit::RateLimiter;
use crate::session::{Credentials, SessionStore};
use crate::sources::gmail::{GmailClient, InboxSource, MailApi};
use crate::sources::sms::SmsExport;
use crate::{Result, SiftError};

const SESSION_COOKIE: &str = "sift_session";
const UPLOAD_FIELD: &str = "sms_file";

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub sessions: SessionStore,
    pub oauth: Option<OAuthClient>,
    pub mail: Arc<dyn MailApi>,
    pub model: Option<Arc<dyn TextModel>>,
    pub limiter: RateLimiter,
    templates: Environment<'static>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        oauth: Option<OAuthClient>,
        mail: Arc<dyn MailApi>,
        model: Option<Arc<dyn TextModel>>,
    ) -> Result<Self> {
        Ok(Self {
            sessions: SessionStore::new(Duration::from_secs(config.web.session_ttl_secs)),
            limiter: RateLimiter::from_config(&config.rate_limit),
            templates: load_templates()?,
            config,
            oauth,
            mail,
            model,
        })
    }

    /// Wire up the real Google clients. A missing client secrets file or
    /// API key leaves that feature disabled rather than failing startup.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let oauth = OAuthClient::from_config(&config.oauth)?;
        if oauth.is_none() {
            warn!(
                "No OAuth client secrets at {}, sign-in is disabled",
                config.oauth.client_secrets_path
            );
        }

        let model = GeminiClient::from_config(&config.model)?
            .map(|client| Arc::new(client) as Arc<dyn TextModel>);
        if model.is_none() {
            warn!("{} is not set, summaries are disabled", config.model.api_key_env);
        }

        let mail = Arc::new(GmailClient::new(&config.gmail)?);
        Self::new(config, oauth, mail, model)
    }

    fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<Html<String>> {
        Ok(Html(self.templates.get_template(name)?.render(ctx)?))
    }

    fn model(&self) -> Result<&dyn TextModel> {
        self.model.as_deref().ok_or_else(|| {
            SiftError::ModelUnavailable(format!(
                "set {} to enable summaries",
                self.config.model.api_key_env
            ))
        })
    }

    /// The live session named by the request cookie
    async fn session(&self, headers: &HeaderMap) -> Option<String> {
        let id = session_cookie(headers)?;
        self.sessions.exists(&id).await.then_some(id)
    }

    /// The live session and its credentials, if signed in
    async fn signed_in(&self, headers: &HeaderMap) -> Option<(String, Credentials)> {
        let id = session_cookie(headers)?;
        let credentials = self.sessions.credentials(&id).await?;
        Some((id, credentials))
    }
}

fn load_templates() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template("base.html", include_str!("templates/base.html"))?;
    env.add_template("home.html", include_str!("templates/home.html"))?;
    env.add_template("sms_upload.html", include_str!("templates/sms_upload.html"))?;
    env.add_template("summaries.html", include_str!("templates/summaries.html"))?;
    Ok(env)
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let max_upload = state.config.web.max_upload_bytes;

    Router::new()
        .route("/", get(home))
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", get(logout))
        .route("/get-emails", get(get_emails))
        .route("/sms", get(sms_page))
        .route("/process-sms", post(process_sms))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Sessions ===

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn with_session_cookie(mut response: Response, id: &str, ttl_secs: u64) -> Response {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, id, ttl_secs
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

fn to_login() -> Response {
    Redirect::to("/login").into_response()
}

// === Page Handlers ===

async fn home(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Html<String>> {
    let logged_in = state.signed_in(&headers).await.is_some();
    state.render("home.html", context! { logged_in => logged_in })
}

async fn login(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response> {
    let Some(oauth) = &state.oauth else {
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            "Google sign-in is not configured. Add a client_secret.json and restart.",
        )
            .into_response());
    };

    let (id, fresh) = match state.session(&headers).await {
        Some(id) => (id, false),
        None => (state.sessions.create().await, true),
    };

    let csrf = Uuid::new_v4().simple().to_string();
    state.sessions.set_oauth_state(&id, csrf.clone()).await;
    let url = oauth.authorization_url(&csrf)?;

    let response = Redirect::to(&url).into_response();
    Ok(if fresh {
        with_session_cookie(response, &id, state.config.web.session_ttl_secs)
    } else {
        response
    })
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response> {
    let Some(id) = state.session(&headers).await else {
        warn!("OAuth callback without a session");
        return Ok(to_login());
    };

    let expected = state.sessions.take_oauth_state(&id).await;
    if expected.is_none() || expected != params.state {
        warn!("OAuth callback with missing or mismatched state");
        return Ok(to_login());
    }

    if let Some(error) = params.error {
        return Err(SiftError::OAuth(format!("sign-in was not completed: {}", error)));
    }
    let code = params
        .code
        .ok_or_else(|| SiftError::OAuth("callback carried no authorization code".to_string()))?;
    let oauth = state
        .oauth
        .as_ref()
        .ok_or_else(|| SiftError::OAuth("sign-in is not configured".to_string()))?;

    let credentials = oauth.exchange_code(&code).await?;
    state.sessions.set_credentials(&id, credentials).await;
    info!("User signed in");

    Ok(Redirect::to("/").into_response())
}

async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Redirect {
    if let Some(id) = state.session(&headers).await {
        state.sessions.clear_credentials(&id).await;
        info!("User signed out");
    }
    Redirect::to("/")
}

async fn get_emails(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response> {
    let Some((id, credentials)) = state.signed_in(&headers).await else {
        return Ok(to_login());
    };
    let model = state.model()?;

    let digest = match inbox_digest(&state, model, &credentials.token).await {
        Err(SiftError::Unauthorized(service)) => {
            let Some(oauth) = &state.oauth else {
                return Err(SiftError::Unauthorized(service));
            };
            info!("{} rejected the access token, refreshing", service);
            let refreshed = oauth.refresh(&credentials).await?;
            let token = refreshed.token.clone();
            state.sessions.set_credentials(&id, refreshed).await;
            inbox_digest(&state, model, &token).await?
        }
        other => other?,
    };

    let view = DigestView::new("Your Summaries", &digest);
    Ok(state.render("summaries.html", view)?.into_response())
}

async fn inbox_digest(
    state: &AppState,
    model: &dyn TextModel,
    access_token: &str,
) -> Result<Digest<InboxPriority>> {
    let source = InboxSource::new(state.mail.as_ref(), access_token, &state.config.gmail);
    let classifier = Classifier::new(model, &state.limiter, &state.config.prompts.inbox);
    digest::build(&source, &classifier).await
}

async fn sms_page(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response> {
    if state.signed_in(&headers).await.is_none() {
        return Ok(to_login());
    }
    let limit = state.config.sms.limit;
    Ok(state.render("sms_upload.html", context! { limit => limit })?.into_response())
}

async fn process_sms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    if state.signed_in(&headers).await.is_none() {
        return to_login();
    }
    let Ok(mut multipart) = multipart else {
        return (StatusCode::BAD_REQUEST, "No file uploaded.").into_response();
    };

    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(UPLOAD_FIELD) => {
                let filename = field.file_name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(data) => upload = Some((filename, data)),
                    Err(e) => return e.into_response(),
                }
                break;
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return e.into_response(),
        }
    }

    let Some((filename, data)) = upload else {
        return (StatusCode::BAD_REQUEST, "No file uploaded.").into_response();
    };
    if filename.is_empty() || data.is_empty() {
        return (StatusCode::BAD_REQUEST, "No file selected.").into_response();
    }

    info!("Processing SMS upload {} ({} bytes)", filename, data.len());
    sms_digest(&state, data.to_vec()).await.into_response()
}

async fn sms_digest(state: &AppState, data: Vec<u8>) -> Result<Html<String>> {
    let model = state.model()?;
    let source = SmsExport::new(data, state.config.sms.limit);
    let classifier = Classifier::new(model, &state.limiter, &state.config.prompts.sms);
    let digest = digest::build::<SmsPriority>(&source, &classifier).await?;

    state.render("summaries.html", DigestView::new("Your SMS Summaries", &digest))
}

// === View Models ===

/// Per-tier presentation on the summaries page
trait TabStyle: Tier {
    fn icon(self) -> &'static str;
    fn heading(self) -> &'static str;
    fn css_class(self) -> &'static str;
    fn empty_text(self) -> &'static str;
}

impl TabStyle for InboxPriority {
    fn icon(self) -> &'static str {
        match self {
            Self::High => "🔥",
            Self::Medium => "🟠",
            Self::Low => "🟢",
            Self::Alert => "🔔",
        }
    }

    fn heading(self) -> &'static str {
        match self {
            Self::High => "High Priority",
            Self::Medium => "Medium Priority",
            Self::Low => "Low Priority",
            Self::Alert => "Alerts & Notifications",
        }
    }

    fn css_class(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Alert => "alert",
        }
    }

    fn empty_text(self) -> &'static str {
        match self {
            Self::High => "No high priority emails found.",
            Self::Medium => "No medium priority emails found.",
            Self::Low => "No low priority emails found.",
            Self::Alert => "No alerts or notifications found.",
        }
    }
}

impl TabStyle for SmsPriority {
    fn icon(self) -> &'static str {
        match self {
            Self::Urgent => "🔥",
            Self::Important => "🟠",
            Self::Other => "🟢",
        }
    }

    fn heading(self) -> &'static str {
        self.label()
    }

    fn css_class(self) -> &'static str {
        match self {
            Self::Urgent => "high",
            Self::Important => "medium",
            Self::Other => "low",
        }
    }

    fn empty_text(self) -> &'static str {
        match self {
            Self::Urgent => "No urgent messages found.",
            Self::Important => "No important messages found.",
            Self::Other => "No other messages found.",
        }
    }
}

#[derive(Debug, Serialize)]
struct DigestView {
    title: &'static str,
    generated_at: String,
    tabs: Vec<TabView>,
}

#[derive(Debug, Serialize)]
struct TabView {
    id: &'static str,
    label: String,
    heading: &'static str,
    class: &'static str,
    empty_text: &'static str,
    count: usize,
    items: Vec<ItemView>,
}

#[derive(Debug, Serialize)]
struct ItemView {
    sender: String,
    summary: String,
    failed: bool,
    excerpt: Option<String>,
}

impl DigestView {
    fn new<T: TabStyle>(title: &'static str, digest: &Digest<T>) -> Self {
        let tabs = digest
            .tiers()
            .map(|(tier, items)| TabView {
                id: tier.label(),
                label: format!("{} {}", tier.icon(), tier.heading()),
                heading: tier.heading(),
                class: tier.css_class(),
                empty_text: tier.empty_text(),
                count: items.len(),
                items: items
                    .iter()
                    .map(|c| ItemView {
                        sender: c.from.clone(),
                        summary: c.summary.clone(),
                        failed: c.failed,
                        excerpt: c.excerpt.clone(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            title,
            generated_at: digest.generated_at().format("%Y-%m-%d %H:%M").to_string(),
            tabs,
        }
    }
}

/// Start the web server with config
pub async fn start_server(config: AppConfig) -> Result<()> {
    let addr = format!("{}:{}", config.web.host, config.web.port);
    let state = Arc::new(AppState::from_config(config)?);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Web UI available at http://{}", addr);

    let router = create_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| SiftError::Config(format!("Server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
