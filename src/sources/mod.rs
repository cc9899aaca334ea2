// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Message sources: the Gmail inbox and uploaded SMS backups

pub mod gmail;
pub mod sms;

use async_trait::async_trait;

use crate::Result;

/// A message as pulled from a source, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub sender: String,
    pub body: String,
}

impl RawMessage {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
        }
    }
}

/// Extraction of one message failed, the rest of the batch is unaffected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    /// Whatever identifies the item to a reader (sender, message id)
    pub origin: String,
    pub reason: String,
}

/// One entry yielded by a source
pub type SourceItem = std::result::Result<RawMessage, ItemError>;

/// Trait for message sources
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Name of this source, used in logs
    fn name(&self) -> &'static str;

    /// Fetch all items in source order.
    ///
    /// An `Err` aborts the whole batch; per-item failures come back as
    /// `Err` entries inside the vector.
    async fn fetch(&self) -> Result<Vec<SourceItem>>;
}
