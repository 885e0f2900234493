//! Barcode normalization and reconciliation.
//!
//! Scanners, CSV exports and people typing at a keyboard all produce slightly
//! different spellings of the same label: `00042`, `042` and `42`, or `ab12`
//! and `AB12`. [`normalize`] folds those into one comparison key and
//! [`match_incoming`] reconciles an incoming batch against stored rows.

use std::collections::{HashMap, HashSet};

/// Anything that carries a stored barcode.
pub trait HasBarcode {
    fn barcode(&self) -> &str;
}

/// Canonical comparison key for a raw barcode.
///
/// - surrounding whitespace is trimmed; blank input yields `""`
/// - all-digit codes lose their leading zeros (`"0000"` becomes `"0"`)
/// - anything else is uppercased
pub fn normalize(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        let stripped = s.trim_start_matches('0');
        if stripped.is_empty() {
            return "0".to_string();
        }
        return stripped.to_string();
    }
    s.to_uppercase()
}

/// Outcome of reconciling incoming codes with stored rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeMatch<'a, T> {
    /// Stored rows hit by at least one incoming code, each at most once, in
    /// order of first hit.
    pub matched: Vec<&'a T>,
    /// Trimmed incoming codes without a stored counterpart, in input order.
    pub missing: Vec<String>,
}

/// Reconcile `incoming` codes against `stored` rows.
///
/// Each trimmed, non-blank incoming code is looked up by its exact spelling
/// first and by its normalized key second. Exact lookup wins so a caller who
/// typed the precise stored value never lands on a different row that merely
/// normalizes the same way. On index collisions the first stored row wins.
pub fn match_incoming<'a, T, S>(incoming: &[S], stored: &'a [T]) -> BarcodeMatch<'a, T>
where
    T: HasBarcode,
    S: AsRef<str>,
{
    let mut by_exact: HashMap<&'a str, usize> = HashMap::with_capacity(stored.len());
    let mut by_normalized: HashMap<String, usize> = HashMap::with_capacity(stored.len());

    for (idx, row) in stored.iter().enumerate() {
        let exact = row.barcode().trim();
        if !exact.is_empty() {
            by_exact.entry(exact).or_insert(idx);
        }
        let key = normalize(row.barcode());
        if !key.is_empty() {
            by_normalized.entry(key).or_insert(idx);
        }
    }

    // Dedup by the stored row's canonical barcode, keeping first-hit order.
    let mut seen: HashSet<&'a str> = HashSet::new();
    let mut matched = Vec::new();
    let mut missing = Vec::new();

    for raw in incoming {
        let exact = raw.as_ref().trim();
        if exact.is_empty() {
            continue;
        }

        let hit = by_exact.get(exact).copied().or_else(|| {
            let key = normalize(exact);
            if key.is_empty() {
                None
            } else {
                by_normalized.get(&key).copied()
            }
        });

        match hit {
            Some(idx) => {
                let row = &stored[idx];
                if seen.insert(row.barcode()) {
                    matched.push(row);
                }
            }
            None => missing.push(exact.to_string()),
        }
    }

    BarcodeMatch { matched, missing }
}
