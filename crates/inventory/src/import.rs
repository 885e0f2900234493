//! Map already-split spreadsheet rows onto new items.
//!
//! Column headers vary between exports ("Größe", "size", "Bei CWS bekannt"),
//! so each field is looked up through a list of aliases after folding the
//! header to lowercase ASCII without separators.

use std::collections::HashMap;

use crate::item::{Category, NewItem};

const BARCODE_ALIASES: &[&str] = &["barcode", "bar_code", "code", "strichcode", "ean"];
const SIZE_ALIASES: &[&str] = &["groesse", "größe", "size"];
const CATEGORY_ALIASES: &[&str] = &["kategorie", "category", "typ"];
const PARTNER_ALIASES: &[&str] = &["cws", "bei cws bekannt", "cws bekannt"];

/// Rows that mapped cleanly plus one message per rejected row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub items: Vec<NewItem>,
    pub errors: Vec<String>,
}

/// Map header→cell rows. Row numbers in errors are 1-based.
pub fn map_rows(rows: &[HashMap<String, String>]) -> ImportResult {
    let mut result = ImportResult::default();

    for (idx, row) in rows.iter().enumerate() {
        let index: HashMap<String, &str> = row
            .iter()
            .map(|(k, v)| (fold_header(k), v.trim()))
            .collect();

        let barcode = lookup(&index, BARCODE_ALIASES);
        let size = lookup(&index, SIZE_ALIASES);
        let category = Category::from_label(lookup(&index, CATEGORY_ALIASES));
        let known_to_partner = is_truthy(lookup(&index, PARTNER_ALIASES));

        match category {
            Some(category) if !barcode.is_empty() && !size.is_empty() => {
                result.items.push(NewItem {
                    barcode: barcode.to_string(),
                    category,
                    size: size.to_string(),
                    known_to_partner,
                });
            }
            _ => result.errors.push(format!(
                "row {}: needs barcode, category and size (category e.g. HOSE/POLO/SWEATJACKE)",
                idx + 1
            )),
        }
    }

    result
}

fn lookup<'a>(index: &HashMap<String, &'a str>, aliases: &[&str]) -> &'a str {
    aliases
        .iter()
        .find_map(|alias| index.get(&fold_header(alias)).copied())
        .unwrap_or("")
}

fn fold_header(input: &str) -> String {
    input
        .trim()
        .to_lowercase()
        .replace('ä', "ae")
        .replace('ö', "oe")
        .replace('ü', "ue")
        .replace('ß', "ss")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "ja" | "yes" | "y" | "x" | "bekannt"
    )
}
