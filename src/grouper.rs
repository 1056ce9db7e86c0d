// 🗂️ Disposition Grouper - rows → one group per legal transaction
//
// DVF repeats the price of a disposition on every parcel/local row it
// touches. Grouping by (document, disposition) is what prevents summing the
// same price several times.

use crate::error::Anomaly;
use crate::parser::{MutationType, Price, RawRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ============================================================================
// TRANSACTION KEY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionKey {
    pub document_id: String,
    pub disposition: u32,
}

/// How rows without a document identifier are keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Use the (possibly blank) document identifier verbatim
    Strict,
    /// Replace a blank identifier by a surrogate from date and commune
    #[default]
    Fallback,
}

impl TransactionKey {
    pub fn new(document_id: &str, disposition: u32) -> Self {
        TransactionKey {
            document_id: document_id.to_string(),
            disposition,
        }
    }

    pub fn for_row(row: &RawRow, policy: KeyPolicy) -> Self {
        let document_id = match (&row.document_id, policy) {
            (Some(id), _) => id.clone(),
            (None, KeyPolicy::Strict) => String::new(),
            (None, KeyPolicy::Fallback) => surrogate_document_id(row),
        };

        TransactionKey {
            document_id,
            disposition: row.disposition,
        }
    }

    /// True when the document part was derived rather than published
    pub fn is_surrogate(&self) -> bool {
        self.document_id.starts_with('~')
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.document_id, self.disposition)
    }
}

// "~" never starts a published identifier. The price stays out of the key so
// that rows disagreeing on it still meet in one group.
fn surrogate_document_id(row: &RawRow) -> String {
    format!(
        "~{}~{}{}",
        row.date.format("%Y%m%d"),
        row.department_code(),
        row.commune_code()
    )
}

// ============================================================================
// GROUPS
// ============================================================================

/// Immutable key → rows map, iterated in first-seen key order
#[derive(Debug, Clone, Default)]
pub struct DispositionGroups {
    order: Vec<TransactionKey>,
    groups: HashMap<TransactionKey, Vec<RawRow>>,
}

impl DispositionGroups {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, key: &TransactionKey) -> Option<&[RawRow]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &TransactionKey> {
        self.order.iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TransactionKey, &[RawRow])> {
        self.order
            .iter()
            .filter_map(move |k| self.groups.get(k).map(|rows| (k, rows.as_slice())))
    }

    pub fn row_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Consume into (key, rows) pairs in first-seen order
    pub fn into_groups(self) -> Vec<(TransactionKey, Vec<RawRow>)> {
        let DispositionGroups { order, mut groups } = self;
        order
            .into_iter()
            .filter_map(|k| groups.remove(&k).map(|rows| (k, rows)))
            .collect()
    }
}

/// Fold rows into groups; row order inside a group follows input order
pub fn group_rows<I>(rows: I, policy: KeyPolicy) -> DispositionGroups
where
    I: IntoIterator<Item = RawRow>,
{
    rows.into_iter()
        .fold(DispositionGroups::default(), |mut acc, row| {
            let key = TransactionKey::for_row(&row, policy);
            match acc.groups.get_mut(&key) {
                Some(rows) => rows.push(row),
                None => {
                    acc.order.push(key.clone());
                    acc.groups.insert(key, vec![row]);
                }
            }
            acc
        })
}

// ============================================================================
// GROUP CONSISTENCY
// ============================================================================

/// Fields every row of a disposition must share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedFields {
    pub price: Option<Price>,
    pub date: NaiveDate,
    pub mutation_type: MutationType,
}

/// Check price, then date and mutation type, across one group
pub fn validate_group(key: &TransactionKey, rows: &[RawRow]) -> Result<SharedFields, Anomaly> {
    let first = match rows.first() {
        Some(row) => row,
        None => {
            return Err(Anomaly::EmptyGroup {
                key: key.clone(),
                lines: Vec::new(),
            })
        }
    };
    let lines = || rows.iter().map(|r| r.line).collect::<Vec<_>>();

    if rows.iter().any(|r| r.price != first.price) {
        return Err(Anomaly::PriceConsistency {
            key: key.clone(),
            prices: distinct(rows.iter().map(|r| r.price)),
            lines: lines(),
        });
    }

    if rows.iter().any(|r| r.date != first.date) {
        return Err(Anomaly::InconsistentField {
            key: key.clone(),
            field: "date".to_string(),
            values: distinct(rows.iter().map(|r| r.date.format("%d/%m/%Y").to_string())),
            lines: lines(),
        });
    }

    if rows.iter().any(|r| r.mutation_type != first.mutation_type) {
        return Err(Anomaly::InconsistentField {
            key: key.clone(),
            field: "mutation_type".to_string(),
            values: distinct(rows.iter().map(|r| r.mutation_type.label().to_string())),
            lines: lines(),
        });
    }

    Ok(SharedFields {
        price: first.price,
        date: first.date,
        mutation_type: first.mutation_type,
    })
}

// First-seen distinct values
fn distinct<T: PartialEq>(values: impl Iterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================
