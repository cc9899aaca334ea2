// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Sift

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

/// Result type alias for Sift operations
pub type Result<T> = std::result::Result<T, SiftError>;

/// Sift error types
#[derive(Error, Debug)]
pub enum SiftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("{service} returned status {status}: {message}")]
    Upstream {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("{0} rejected the access token")]
    Unauthorized(&'static str),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Generative model not available: {0}")]
    ModelUnavailable(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
}

impl SiftError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Api(_) | Self::Upstream { .. } | Self::Unauthorized(_) | Self::OAuth(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Xml(_) | Self::InvalidUpload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Config(_)
            | Self::FileSystem(_)
            | Self::Json(_)
            | Self::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SiftError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}
