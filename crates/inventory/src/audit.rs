//! Audit / notification log entries.
//!
//! Messages are rendered once, at write time, and stored as text.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use brapool_core::{LogEntryId, SystemId};

use crate::item::InventoryItem;

/// Entry type tags.
pub mod kinds {
    pub const CREATION_SUMMARY: &str = "CREATION_SUMMARY";
    pub const STORE_IN_SUMMARY: &str = "STORE_IN_SUMMARY";
    pub const ISSUE_OUT_SUMMARY: &str = "ISSUE_OUT_SUMMARY";
    pub const MANUAL: &str = "MANUAL";
    pub const STALENESS_WARNING: &str = "STALENESS_WARNING";
}

/// Advisory colour of an entry. Not an error code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Green,
    Yellow,
    Red,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Green => "GREEN",
            Severity::Yellow => "YELLOW",
            Severity::Red => "RED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Severity::Info),
            "GREEN" => Some(Severity::Green),
            "YELLOW" => Some(Severity::Yellow),
            "RED" => Some(Severity::Red),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: LogEntryId,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    /// Lookup only; the item may since have been deleted.
    pub related_item_id: Option<SystemId>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        kind: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        related_item_id: Option<SystemId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LogEntryId::new(),
            kind: kind.into(),
            severity,
            message: message.into(),
            related_item_id,
            created_at,
        }
    }

    pub fn created(items: &[InventoryItem], now: DateTime<Utc>) -> Self {
        Self::new(
            kinds::CREATION_SUMMARY,
            Severity::Green,
            format!(
                "{} new items created and stored on {}: {}.",
                items.len(),
                stamp(now),
                summarize_groups(items)
            ),
            None,
            now,
        )
    }

    pub fn stored_in(items: &[InventoryItem], now: DateTime<Utc>) -> Self {
        Self::new(
            kinds::STORE_IN_SUMMARY,
            Severity::Green,
            format!(
                "{} items stored on {}: {}.",
                items.len(),
                stamp(now),
                summarize_groups(items)
            ),
            None,
            now,
        )
    }

    pub fn issued_out(items: &[InventoryItem], issued_by: &str, issued_to: &str, now: DateTime<Utc>) -> Self {
        Self::new(
            kinds::ISSUE_OUT_SUMMARY,
            Severity::Red,
            format!(
                "{issued_by} issued {} to {issued_to} on {}.",
                summarize_groups(items),
                stamp(now)
            ),
            None,
            now,
        )
    }

    pub fn edited(item: &InventoryItem, now: DateTime<Utc>) -> Self {
        Self::new(
            kinds::MANUAL,
            Severity::Info,
            format!(
                "Item {} ({}) [{}] was edited.",
                item.category, item.size, item.barcode
            ),
            Some(item.system_id),
            now,
        )
    }

    pub fn deleted(item: &InventoryItem, now: DateTime<Utc>) -> Self {
        Self::new(
            kinds::MANUAL,
            Severity::Info,
            format!(
                "Item {} ({}) [{}] with system id {} was deleted.",
                item.category, item.size, item.barcode, item.system_id
            ),
            Some(item.system_id),
            now,
        )
    }

    pub fn stale(item: &InventoryItem, now: DateTime<Utc>) -> Self {
        let weeks = (now - item.circulation_reference()).num_weeks();
        Self::new(
            kinds::STALENESS_WARNING,
            Severity::Yellow,
            format!(
                "Category {} with barcode {} has been circulating for {weeks} weeks.",
                item.category, item.barcode
            ),
            Some(item.system_id),
            now,
        )
    }

    pub fn is_staleness_warning(&self) -> bool {
        self.kind == kinds::STALENESS_WARNING
    }
}

/// `"3x HOSE L, 1x POLO M"`: counts per category+size, largest first, ties in
/// order of first appearance.
pub fn summarize_groups(items: &[InventoryItem]) -> String {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, usize)> = Vec::new();
    for item in items {
        let label = item.group_label();
        match index.get(&label) {
            Some(&i) => groups[i].1 += 1,
            None => {
                index.insert(label.clone(), groups.len());
                groups.push((label, 1));
            }
        }
    }
    // Stable sort keeps insertion order among equal counts.
    groups.sort_by(|a, b| b.1.cmp(&a.1));
    groups
        .iter()
        .map(|(label, count)| format!("{count}x {label}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%d.%m.%Y %H:%M").to_string()
}
