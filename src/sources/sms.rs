// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! SMS Backup & Restore XML exports
//!
//! The export is a `<smses>` root holding one `<sms>` element per message,
//! with the counterpart number in `address` and the text in `body`. Other
//! elements (`<mms>`, `<call>`) are skipped.

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info};

use super::{ItemError, MessageSource, RawMessage, SourceItem};
use crate::{Result, SiftError};

const UNKNOWN_SENDER: &str = "Unknown";
const EMPTY_BODY: &str = "No content";

/// An uploaded export held in memory
pub struct SmsExport {
    data: Vec<u8>,
    limit: usize,
}

impl SmsExport {
    pub fn new(data: Vec<u8>, limit: usize) -> Self {
        Self { data, limit }
    }
}

#[async_trait]
impl MessageSource for SmsExport {
    fn name(&self) -> &'static str {
        "sms"
    }

    async fn fetch(&self) -> Result<Vec<SourceItem>> {
        let items = parse_export(&self.data, self.limit)?;
        info!("Read {} SMS entries from upload ({} bytes)", items.len(), self.data.len());
        Ok(items)
    }
}

/// Collect up to `limit` `<sms>` entries in document order.
///
/// The whole document is still read to the end so that a malformed file is
/// rejected even when the cap is reached early.
pub fn parse_export(data: &[u8], limit: usize) -> Result<Vec<SourceItem>> {
    let mut reader = Reader::from_reader(data);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut saw_root = false;
    let mut seen = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(element) => {
                saw_root = true;
                depth += 1;
                if is_sms(&element) {
                    seen += 1;
                    if items.len() < limit {
                        items.push(read_sms(&reader, &element, seen));
                    }
                }
            }
            Event::Empty(element) => {
                saw_root = true;
                if is_sms(&element) {
                    seen += 1;
                    if items.len() < limit {
                        items.push(read_sms(&reader, &element, seen));
                    }
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(SiftError::InvalidUpload("document has no root element".to_string()));
    }
    if depth != 0 {
        return Err(SiftError::InvalidUpload("document ends inside an open element".to_string()));
    }
    if seen > items.len() {
        debug!("Export holds {} messages, keeping the first {}", seen, items.len());
    }

    Ok(items)
}

fn is_sms(element: &BytesStart<'_>) -> bool {
    element.local_name().as_ref() == b"sms"
}

fn read_sms(reader: &Reader<&[u8]>, element: &BytesStart<'_>, position: usize) -> SourceItem {
    let mut sender: Option<String> = None;
    let mut body: Option<String> = None;

    let fail = |sender: &Option<String>, reason: String| ItemError {
        origin: sender
            .clone()
            .unwrap_or_else(|| format!("message #{}", position)),
        reason,
    };

    for attr in element.attributes() {
        let attr = attr.map_err(|e| fail(&sender, e.to_string()))?;
        let key = attr.key.as_ref();
        if key != b"address" && key != b"body" {
            continue;
        }
        let value = attr
            .decode_and_unescape_value(reader)
            .map_err(|e| fail(&sender, e.to_string()))?
            .into_owned();
        if key == b"address" {
            sender = Some(value);
        } else {
            body = Some(value);
        }
    }

    Ok(RawMessage::new(
        sender.unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
        body.unwrap_or_else(|| EMPTY_BODY.to_string()),
    ))
}
