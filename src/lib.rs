// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Sift: AI-prioritised inbox and SMS digests
//!
//! Signs a user in to Gmail, pulls their newest messages (or an uploaded SMS
//! backup), has a generative model label and summarize each one, and serves
//! the result as a tabbed page grouped by priority.

pub mod classifier;
pub mod config;
pub mod digest;
pub mod error;
pub mod gemini;
pub mod oauth;
pub mod rate_limit;
pub mod session;
pub mod sources;
pub mod web;

pub use config::AppConfig;
pub use error::{Result, SiftError};
