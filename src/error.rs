// ⚠️ Anomaly taxonomy - recoverable per-row / per-group problems
//
// Fatal problems (file cannot be opened, header is missing a column, SQLite
// failure) go through anyhow::Result. Everything here is collected and
// reported next to the successfully aggregated transactions.

use crate::grouper::TransactionKey;
use crate::parser::Price;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single field of a single row could not be interpreted
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("line {line}: invalid {field} {value:?} ({reason})")]
pub struct ParseError {
    pub line: usize,
    pub field: String,
    pub value: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(line: usize, field: &str, value: &str, reason: impl Into<String>) -> Self {
        ParseError {
            line,
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Anomaly {
    /// Row rejected by the parser
    #[error(transparent)]
    Parse(ParseError),

    /// Rows of one disposition carry different prices
    #[error("{key}: rows disagree on price ({})", display_prices(.prices))]
    PriceConsistency {
        key: TransactionKey,
        prices: Vec<Option<Price>>,
        lines: Vec<usize>,
    },

    /// Rows of one disposition disagree on date or mutation type
    #[error("{key}: rows disagree on {field} ({})", .values.join(", "))]
    InconsistentField {
        key: TransactionKey,
        field: String,
        values: Vec<String>,
        lines: Vec<usize>,
    },

    /// Disposition has neither a built nor a land component
    #[error("{key}: no built or land component in {} row(s)", .lines.len())]
    EmptyGroup {
        key: TransactionKey,
        lines: Vec<usize>,
    },
}

impl Anomaly {
    /// Stable short name used in stats and in the SQLite store
    pub fn kind(&self) -> &'static str {
        match self {
            Anomaly::Parse(_) => "parse",
            Anomaly::PriceConsistency { .. } => "price_consistency",
            Anomaly::InconsistentField { .. } => "inconsistent_field",
            Anomaly::EmptyGroup { .. } => "empty_group",
        }
    }

    /// Transaction the anomaly belongs to (None for unparsed rows)
    pub fn key(&self) -> Option<&TransactionKey> {
        match self {
            Anomaly::Parse(_) => None,
            Anomaly::PriceConsistency { key, .. }
            | Anomaly::InconsistentField { key, .. }
            | Anomaly::EmptyGroup { key, .. } => Some(key),
        }
    }

    /// Source lines involved
    pub fn lines(&self) -> Vec<usize> {
        match self {
            Anomaly::Parse(err) => vec![err.line],
            Anomaly::PriceConsistency { lines, .. }
            | Anomaly::InconsistentField { lines, .. }
            | Anomaly::EmptyGroup { lines, .. } => lines.clone(),
        }
    }
}

impl From<ParseError> for Anomaly {
    fn from(err: ParseError) -> Self {
        Anomaly::Parse(err)
    }
}

fn display_prices(prices: &[Option<Price>]) -> String {
    prices
        .iter()
        .map(|p| match p {
            Some(price) => price.to_string(),
            None => "blank".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TransactionKey {
        TransactionKey::new("2023P01234", 1)
    }

    #[test]
    fn test_parse_error_display_names_field() {
        let err = ParseError::new(12, "Valeur fonciere", "12a,00", "not a number");
        let text = err.to_string();

        assert!(text.contains("line 12"));
        assert!(text.contains("Valeur fonciere"));
        assert!(text.contains("12a,00"));
    }

    #[test]
    fn test_price_consistency_display() {
        let anomaly = Anomaly::PriceConsistency {
            key: key(),
            prices: vec![Some(Price::from_cents(100_000)), None],
            lines: vec![2, 3],
        };

        assert_eq!(
            anomaly.to_string(),
            "2023P01234/1: rows disagree on price (1000.00, blank)"
        );
        assert_eq!(anomaly.kind(), "price_consistency");
        assert_eq!(anomaly.lines(), vec![2, 3]);
    }

    #[test]
    fn test_parse_anomaly_has_no_key() {
        let anomaly: Anomaly = ParseError::new(4, "Date mutation", "", "required").into();

        assert_eq!(anomaly.kind(), "parse");
        assert!(anomaly.key().is_none());
        assert_eq!(anomaly.lines(), vec![4]);
    }

    #[test]
    fn test_anomaly_serializes_with_kind_tag() {
        let anomaly = Anomaly::EmptyGroup {
            key: key(),
            lines: vec![7],
        };

        let json = serde_json::to_value(&anomaly).unwrap();
        assert_eq!(json["kind"], "empty_group");
        assert_eq!(json["key"]["disposition"], 1);
    }
}
