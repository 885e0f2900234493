use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use brapool_core::{DomainError, DomainResult, SystemId};

use crate::barcode::HasBarcode;

/// Garment category.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Hose,
    Polo,
    Sweatjacke,
    Softshelljacke,
    Hardshelljacke,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Hose,
        Category::Polo,
        Category::Sweatjacke,
        Category::Softshelljacke,
        Category::Hardshelljacke,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Hose => "HOSE",
            Category::Polo => "POLO",
            Category::Sweatjacke => "SWEATJACKE",
            Category::Softshelljacke => "SOFTSHELLJACKE",
            Category::Hardshelljacke => "HARDSHELLJACKE",
        }
    }

    /// Lenient parse for imported sheets: ignores case and whitespace and
    /// accepts the short labels printed on delivery notes.
    pub fn from_label(label: &str) -> Option<Self> {
        let raw: String = label
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        match raw.as_str() {
            "HOSE" => Some(Category::Hose),
            "POLO" | "POLOSHIRT" => Some(Category::Polo),
            "SWEATJACKE" => Some(Category::Sweatjacke),
            "SOFTSHELL" | "SOFTSHELLJACKE" => Some(Category::Softshelljacke),
            "HARDSHELL" | "HARDSHELLJACKE" => Some(Category::Hardshelljacke),
            _ => None,
        }
    }
}

impl core::fmt::Display for Category {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| DomainError::validation(format!("unrecognized category: {s:?}")))
    }
}

/// Lifecycle status of a garment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Stored,
    Circulating,
    DefectiveRepair,
    DefectiveDisposed,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 4] = [
        ItemStatus::Stored,
        ItemStatus::Circulating,
        ItemStatus::DefectiveRepair,
        ItemStatus::DefectiveDisposed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Stored => "STORED",
            ItemStatus::Circulating => "CIRCULATING",
            ItemStatus::DefectiveRepair => "DEFECTIVE_REPAIR",
            ItemStatus::DefectiveDisposed => "DEFECTIVE_DISPOSED",
        }
    }
}

impl core::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s.trim())
            .ok_or_else(|| DomainError::validation(format!("unrecognized status: {s:?}")))
    }
}

/// A garment tracked by the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub system_id: SystemId,
    pub barcode: String,
    pub category: Category,
    pub size: String,
    /// Known to the external laundry partner. Informational only.
    #[serde(rename = "knownToExternalPartner", alias = "cws")]
    pub known_to_partner: bool,
    pub status: ItemStatus,
    pub remark: Option<String>,
    pub stored_at: Option<DateTime<Utc>>,
    pub issued_by: Option<String>,
    pub issued_to: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HasBarcode for InventoryItem {
    fn barcode(&self) -> &str {
        &self.barcode
    }
}

/// Input for bulk creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub barcode: String,
    pub category: Category,
    pub size: String,
    #[serde(default, rename = "knownToExternalPartner", alias = "cws")]
    pub known_to_partner: bool,
}

impl NewItem {
    /// Trim free-text fields and reject blanks.
    pub fn cleaned(&self) -> DomainResult<NewItem> {
        let barcode = self.barcode.trim();
        let size = self.size.trim();
        if barcode.is_empty() {
            return Err(DomainError::validation("barcode cannot be empty"));
        }
        if size.is_empty() {
            return Err(DomainError::validation(format!(
                "size cannot be empty (barcode {barcode})"
            )));
        }
        Ok(NewItem {
            barcode: barcode.to_string(),
            category: self.category,
            size: size.to_string(),
            known_to_partner: self.known_to_partner,
        })
    }
}

/// Manual edit: every `Some` field overwrites the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEdit {
    pub category: Option<Category>,
    pub size: Option<String>,
    pub barcode: Option<String>,
    #[serde(rename = "knownToExternalPartner", alias = "cws")]
    pub known_to_partner: Option<bool>,
    pub status: Option<ItemStatus>,
    pub remark: Option<String>,
    pub issued_by: Option<String>,
    pub issued_to: Option<String>,
}

impl InventoryItem {
    /// Creation always enters `Stored`.
    pub fn create(system_id: SystemId, new: NewItem, now: DateTime<Utc>) -> Self {
        Self {
            system_id,
            barcode: new.barcode,
            category: new.category,
            size: new.size,
            known_to_partner: new.known_to_partner,
            status: ItemStatus::Stored,
            remark: None,
            stored_at: Some(now),
            issued_by: None,
            issued_to: None,
            issued_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move into `Stored` from any status; issue fields are cleared.
    pub fn store_in(&mut self, now: DateTime<Utc>) {
        self.status = ItemStatus::Stored;
        self.stored_at = Some(now);
        self.issued_by = None;
        self.issued_to = None;
        self.issued_at = None;
        self.updated_at = now;
    }

    /// Hand the item out. `issued_by` and `issued_to` must be non-blank.
    pub fn issue_out(&mut self, issued_by: &str, issued_to: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let (issued_by, issued_to) = validate_issue(issued_by, issued_to)?;
        self.status = ItemStatus::Circulating;
        self.issued_by = Some(issued_by.to_string());
        self.issued_to = Some(issued_to.to_string());
        self.issued_at = Some(now);
        self.stored_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Apply a manual edit.
    ///
    /// `issued_at` is refreshed on every save, whether or not circulation
    /// fields changed.
    pub fn apply_edit(&mut self, edit: &ItemEdit, now: DateTime<Utc>) -> DomainResult<()> {
        let barcode = edit.barcode.as_deref().map(str::trim);
        if barcode.is_some_and(str::is_empty) {
            return Err(DomainError::validation("barcode cannot be empty"));
        }
        let size = edit.size.as_deref().map(str::trim);
        if size.is_some_and(str::is_empty) {
            return Err(DomainError::validation("size cannot be empty"));
        }

        if let Some(barcode) = barcode {
            self.barcode = barcode.to_string();
        }
        if let Some(category) = edit.category {
            self.category = category;
        }
        if let Some(size) = size {
            self.size = size.to_string();
        }
        if let Some(flag) = edit.known_to_partner {
            self.known_to_partner = flag;
        }
        if let Some(status) = edit.status {
            self.status = status;
        }
        if let Some(remark) = &edit.remark {
            self.remark = non_blank(remark);
        }
        if let Some(by) = &edit.issued_by {
            self.issued_by = non_blank(by);
        }
        if let Some(to) = &edit.issued_to {
            self.issued_to = non_blank(to);
        }
        self.issued_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Timestamp circulation age is measured from.
    pub fn circulation_reference(&self) -> DateTime<Utc> {
        self.issued_at.unwrap_or(self.updated_at)
    }

    /// `category size` grouping key used in batch summaries.
    pub fn group_label(&self) -> String {
        format!("{} {}", self.category, self.size)
    }
}

/// Trim and check the issue-out pair.
pub fn validate_issue<'a>(issued_by: &'a str, issued_to: &'a str) -> DomainResult<(&'a str, &'a str)> {
    let by = issued_by.trim();
    let to = issued_to.trim();
    if by.is_empty() || to.is_empty() {
        return Err(DomainError::validation("issued_by and issued_to are required"));
    }
    Ok((by, to))
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}
