// 🏠 Property Aggregator - one disposition group → one Transaction
//
// Pure mapping from a validated group to an immutable record, plus the
// whole-file pipeline that collects anomalies instead of stopping.

use crate::config::AggregatorConfig;
use crate::error::Anomaly;
use crate::grouper::{group_rows, validate_group, TransactionKey};
use crate::parser::{
    load_rows, read_rows, BuiltComponent, CadastralParcel, LandComponent, Lot, MutationType,
    ParsedRows, Price, RawRow,
};
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

// ============================================================================
// TRANSACTION
// ============================================================================

/// One legal transaction folded from all of its rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub key: TransactionKey,
    pub price: Option<Price>,
    pub date: NaiveDate,
    pub mutation_type: MutationType,

    // Location of the first row
    pub department_code: String,
    pub commune_code: String,
    pub postal_code: Option<String>,
    pub commune_name: Option<String>,

    pub parcels: BTreeSet<CadastralParcel>,
    pub built: Vec<BuiltComponent>,
    /// Distinct locals: `built` without the repeats DVF emits per culture line
    pub premises: Vec<BuiltComponent>,
    pub land: Vec<LandComponent>,
    pub lots: Vec<Lot>,
    pub lot_count: Option<u32>,

    /// Lines of the rows this transaction was built from
    pub source_lines: Vec<usize>,
}

impl Transaction {
    /// SHA-256 of the key, used for idempotent storage
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}|{}", self.key.document_id, self.key.disposition));
        format!("{:x}", hasher.finalize())
    }

    /// Built surface of the distinct premises
    pub fn built_surface_m2(&self) -> Option<f64> {
        let surfaces: Vec<f64> = self.premises.iter().filter_map(|b| b.surface_m2).collect();
        if surfaces.is_empty() {
            None
        } else {
            Some(surfaces.iter().sum())
        }
    }

    pub fn land_surface_m2(&self) -> Option<f64> {
        let surfaces: Vec<f64> = self.land.iter().filter_map(|l| l.surface_m2).collect();
        if surfaces.is_empty() {
            None
        } else {
            Some(surfaces.iter().sum())
        }
    }

    /// Price divided by total built surface, when both are known and non-zero
    pub fn price_per_built_m2(&self) -> Option<f64> {
        let price = self.price?;
        let surface = self.built_surface_m2()?;
        if surface > 0.0 {
            Some(price.euros() / surface)
        } else {
            None
        }
    }
}

// Same local: equal identifiers when both are published, otherwise an
// identical component on the same parcel
fn same_premises(
    a: (&CadastralParcel, &BuiltComponent),
    b: (&CadastralParcel, &BuiltComponent),
) -> bool {
    match (&a.1.local_id, &b.1.local_id) {
        (Some(x), Some(y)) => x == y,
        _ => a.0 == b.0 && a.1 == b.1,
    }
}

/// Fold one group into a Transaction
///
/// Fails on inconsistent shared fields or when no row carries a built or land
/// component.
pub fn aggregate_group(
    key: &TransactionKey,
    rows: &[RawRow],
    collapse_repeated: bool,
) -> Result<Transaction, Anomaly> {
    let shared = validate_group(key, rows)?;

    let mut parcels = BTreeSet::new();
    let mut built: Vec<BuiltComponent> = Vec::new();
    let mut premises: Vec<(&CadastralParcel, &BuiltComponent)> = Vec::new();
    let mut land: Vec<LandComponent> = Vec::new();
    let mut seen_land: Vec<(&CadastralParcel, &LandComponent)> = Vec::new();
    let mut lots: Vec<Lot> = Vec::new();

    for row in rows {
        parcels.insert(row.parcel.clone());

        if let Some(component) = &row.built {
            let repeated = premises
                .iter()
                .any(|seen| same_premises(*seen, (&row.parcel, component)));
            if !repeated {
                premises.push((&row.parcel, component));
            }
            if !(collapse_repeated && repeated) {
                built.push(component.clone());
            }
        }

        if let Some(component) = &row.land {
            let repeated = collapse_repeated
                && seen_land
                    .iter()
                    .any(|(p, l)| *p == &row.parcel && *l == component);
            if !repeated {
                land.push(component.clone());
                seen_land.push((&row.parcel, component));
            }
        }

        for lot in &row.lots {
            if !lots.iter().any(|l| l.number == lot.number) {
                lots.push(lot.clone());
            }
        }
    }

    if built.is_empty() && land.is_empty() {
        return Err(Anomaly::EmptyGroup {
            key: key.clone(),
            lines: rows.iter().map(|r| r.line).collect(),
        });
    }

    // validate_group guarantees at least one row
    let first = &rows[0];

    Ok(Transaction {
        key: key.clone(),
        price: shared.price,
        date: shared.date,
        mutation_type: shared.mutation_type,
        department_code: first.department_code().to_string(),
        commune_code: first.commune_code().to_string(),
        postal_code: first.postal_code.clone(),
        commune_name: first.address.commune_name.clone(),
        parcels,
        built,
        premises: premises.into_iter().map(|(_, b)| b.clone()).collect(),
        land,
        lots,
        lot_count: rows.iter().filter_map(|r| r.lot_count).max(),
        source_lines: rows.iter().map(|r| r.line).collect(),
    })
}

// ============================================================================
// AGGREGATION REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationStats {
    pub rows_read: usize,
    pub rows_parsed: usize,
    pub groups: usize,
    pub transactions: usize,
    pub anomalies_by_kind: BTreeMap<String, usize>,
}

impl AggregationStats {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies_by_kind.values().sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows read, {} parsed, {} dispositions → {} transactions, {} anomalies",
            self.rows_read,
            self.rows_parsed,
            self.groups,
            self.transactions,
            self.anomaly_count()
        )
    }
}

/// Successful transactions next to everything that was rejected
#[derive(Debug, Clone, Default)]
pub struct AggregationReport {
    pub transactions: Vec<Transaction>,
    pub anomalies: Vec<Anomaly>,
    pub stats: AggregationStats,
}

impl AggregationReport {
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }

    /// Sum of transaction prices, each disposition counted once
    pub fn total_value(&self) -> Price {
        Price::from_cents(
            self.transactions
                .iter()
                .filter_map(|t| t.price)
                .map(|p| p.cents())
                .sum(),
        )
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Aggregator { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Group and fold already-parsed rows
    pub fn aggregate(&self, rows: Vec<RawRow>) -> AggregationReport {
        let rows_parsed = rows.len();
        let groups = group_rows(rows, self.config.key_policy);
        let group_count = groups.len();

        let mut transactions = Vec::with_capacity(group_count);
        let mut anomalies = Vec::new();

        for (key, rows) in groups.iter() {
            match aggregate_group(key, rows, self.config.collapse_repeated_components) {
                Ok(tx) => transactions.push(tx),
                Err(anomaly) => {
                    debug!(%key, kind = anomaly.kind(), "disposition rejected: {}", anomaly);
                    anomalies.push(anomaly);
                }
            }
        }

        let mut report = AggregationReport {
            transactions,
            anomalies,
            stats: AggregationStats {
                rows_read: rows_parsed,
                rows_parsed,
                groups: group_count,
                ..AggregationStats::default()
            },
        };
        report.refresh_stats();
        report
    }

    /// Aggregate parsed rows and carry their parse errors into the report
    pub fn aggregate_parsed(&self, parsed: ParsedRows) -> AggregationReport {
        let ParsedRows {
            rows,
            errors,
            rows_read,
        } = parsed;

        let mut report = self.aggregate(rows);

        let mut anomalies: Vec<Anomaly> = errors.into_iter().map(Anomaly::from).collect();
        anomalies.append(&mut report.anomalies);
        report.anomalies = anomalies;
        report.stats.rows_read = rows_read;
        report.refresh_stats();

        if !report.is_clean() {
            warn!(
                anomalies = report.anomalies.len(),
                "aggregation finished with anomalies"
            );
        }
        info!("{}", report.stats.summary());

        report
    }

    pub fn aggregate_reader<R: Read>(&self, source: R) -> Result<AggregationReport> {
        let parsed = read_rows(source)?;
        Ok(self.aggregate_parsed(parsed))
    }

    pub fn aggregate_file(&self, path: &Path) -> Result<AggregationReport> {
        let parsed = load_rows(path)?;
        Ok(self.aggregate_parsed(parsed))
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

impl AggregationReport {
    fn refresh_stats(&mut self) {
        self.stats.transactions = self.transactions.len();
        let mut by_kind = BTreeMap::new();
        for anomaly in &self.anomalies {
            *by_kind.entry(anomaly.kind().to_string()).or_insert(0) += 1;
        }
        self.stats.anomalies_by_kind = by_kind;
    }
}

// ============================================================================
// TESTS
// ============================================================================
