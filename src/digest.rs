// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Priority buckets and the fetch-classify-sort pipeline

use chrono::{DateTime, Local};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::classifier::{ClassifiedMessage, Classifier, Tier};
use crate::sources::MessageSource;
use crate::Result;

/// Classified messages grouped by tier, each bucket in source order
#[derive(Debug, Clone)]
pub struct Digest<T: Tier> {
    buckets: BTreeMap<T, Vec<ClassifiedMessage<T>>>,
    generated_at: DateTime<Local>,
}

impl<T: Tier> Digest<T> {
    /// An empty digest with every tier present
    pub fn new() -> Self {
        Self {
            buckets: T::ALL.iter().map(|t| (*t, Vec::new())).collect(),
            generated_at: Local::now(),
        }
    }

    /// Route an item to the bucket of its priority
    pub fn push(&mut self, item: ClassifiedMessage<T>) {
        self.buckets.entry(item.priority).or_default().push(item);
    }

    pub fn bucket(&self, tier: T) -> &[ClassifiedMessage<T>] {
        self.buckets.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Buckets in display order
    pub fn tiers(&self) -> impl Iterator<Item = (T, &[ClassifiedMessage<T>])> + '_ {
        T::ALL.iter().map(move |t| (*t, self.bucket(*t)))
    }

    /// Number of items across all buckets
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generated_at(&self) -> DateTime<Local> {
        self.generated_at
    }
}

impl<T: Tier> Default for Digest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Tier> Extend<ClassifiedMessage<T>> for Digest<T> {
    fn extend<I: IntoIterator<Item = ClassifiedMessage<T>>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

impl<T: Tier> Serialize for Digest<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(T::ALL.len()))?;
        for (tier, items) in self.tiers() {
            map.serialize_entry(tier.label(), items)?;
        }
        map.end()
    }
}

/// Fetch every item from `source`, classify it, and sort it into tiers.
///
/// Fails only when the source itself fails. Items the source could not read
/// go to the lowest tier without a model call.
pub async fn build<T: Tier>(
    source: &dyn MessageSource,
    classifier: &Classifier<'_>,
) -> Result<Digest<T>> {
    let items = source.fetch().await?;
    info!("Classifying {} items from {}", items.len(), source.name());

    let mut digest = Digest::new();
    for item in items {
        let classified = match item {
            Ok(message) => classifier.classify::<T>(&message).await,
            Err(e) => ClassifiedMessage::failure(e.origin, e.reason),
        };
        digest.push(classified);
    }

    info!(
        "Digest ready: {}",
        digest
            .tiers()
            .map(|(t, items)| format!("{}={}", t.label(), items.len()))
            .collect::<Vec<_>>()
            .join(" ")
    );
    Ok(digest)
}
