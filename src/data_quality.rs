// ✅ Data Quality Engine - per-transaction checks on aggregated DVF records
//
// Each check yields a ValidationResult; failed checks become QualityIssues
// with a severity. BatchSummary gives the dataset-level picture.

use crate::aggregator::Transaction;
use crate::config::AggregatorConfig;
use serde::{Deserialize, Serialize};

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub rule_name: String,
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl ValidationResult {
    pub fn pass(rule_name: &str, field: &str, message: &str) -> Self {
        ValidationResult {
            passed: true,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            severity: Severity::Info,
        }
    }

    pub fn fail(rule_name: &str, field: &str, message: &str, severity: Severity) -> Self {
        ValidationResult {
            passed: false,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            message: message.to_string(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Record cannot be used for price statistics
    Warning,  // Record is usable but incomplete
    Info,     // Record is valid but unusual
}

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub field: String,
    pub issue: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub transaction_key: String,
    pub overall_quality: f64,
    pub validations: Vec<ValidationResult>,
    pub issues: Vec<QualityIssue>,
}

impl QualityReport {
    pub fn has_critical_issues(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }

    pub fn is_high_quality(&self) -> bool {
        self.overall_quality >= 0.8 && !self.has_critical_issues()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: quality {:.1}%, {} issue(s)",
            self.transaction_key,
            self.overall_quality * 100.0,
            self.issues.len()
        )
    }
}

// ============================================================================
// DATA QUALITY ENGINE
// ============================================================================

pub struct DataQualityEngine {
    min_price_per_m2: f64,
    max_price_per_m2: f64,
}

impl DataQualityEngine {
    pub fn new(config: &AggregatorConfig) -> Self {
        DataQualityEngine {
            min_price_per_m2: config.min_price_per_m2,
            max_price_per_m2: config.max_price_per_m2,
        }
    }

    pub fn validate(&self, tx: &Transaction) -> QualityReport {
        let validations = vec![
            self.validate_price(tx),
            self.validate_price_per_m2(tx),
            self.validate_postal_code(tx.postal_code.as_deref()),
            self.validate_built_surfaces(tx),
            self.validate_parcels(tx),
        ];

        let issues: Vec<QualityIssue> = validations
            .iter()
            .filter(|v| !v.passed)
            .map(|v| QualityIssue {
                severity: v.severity,
                field: v.field.clone(),
                issue: v.message.clone(),
            })
            .collect();

        let passed = validations.iter().filter(|v| v.passed).count();

        QualityReport {
            transaction_key: tx.key.to_string(),
            overall_quality: passed as f64 / validations.len() as f64,
            validations,
            issues,
        }
    }

    pub fn validate_batch(&self, transactions: &[Transaction]) -> Vec<QualityReport> {
        transactions.iter().map(|tx| self.validate(tx)).collect()
    }

    pub fn batch_summary(&self, reports: &[QualityReport]) -> BatchSummary {
        let total = reports.len();
        let average_quality = if total == 0 {
            0.0
        } else {
            reports.iter().map(|r| r.overall_quality).sum::<f64>() / total as f64
        };

        let count_severity = |severity: Severity| {
            reports
                .iter()
                .filter(|r| r.issues.iter().any(|i| i.severity == severity))
                .count()
        };

        BatchSummary {
            total_transactions: total,
            high_quality_count: reports.iter().filter(|r| r.is_high_quality()).count(),
            critical_count: count_severity(Severity::Critical),
            warning_count: count_severity(Severity::Warning),
            info_count: count_severity(Severity::Info),
            average_quality,
        }
    }

    // ========================================================================
    // VALIDATION RULES
    // ========================================================================

    fn validate_price(&self, tx: &Transaction) -> ValidationResult {
        match tx.price {
            None => ValidationResult::fail(
                "price_missing",
                "price",
                "Valeur fonciere is blank",
                Severity::Warning,
            ),
            Some(price) if price.cents() <= 0 => ValidationResult::fail(
                "price_not_positive",
                "price",
                &format!("Price is not positive: {}", price),
                Severity::Critical,
            ),
            Some(price) => {
                ValidationResult::pass("price_valid", "price", &format!("Price: {} €", price))
            }
        }
    }

    fn validate_price_per_m2(&self, tx: &Transaction) -> ValidationResult {
        let per_m2 = match tx.price_per_built_m2() {
            Some(v) => v,
            None => {
                return ValidationResult::pass(
                    "price_per_m2_na",
                    "price_per_m2",
                    "No built surface to compare against",
                )
            }
        };

        if per_m2 < self.min_price_per_m2 || per_m2 > self.max_price_per_m2 {
            return ValidationResult::fail(
                "price_per_m2_outlier",
                "price_per_m2",
                &format!(
                    "{:.0} €/m² outside {:.0}..{:.0}",
                    per_m2, self.min_price_per_m2, self.max_price_per_m2
                ),
                Severity::Info,
            );
        }

        ValidationResult::pass(
            "price_per_m2_plausible",
            "price_per_m2",
            &format!("{:.0} €/m²", per_m2),
        )
    }

    fn validate_postal_code(&self, postal_code: Option<&str>) -> ValidationResult {
        match postal_code {
            None => ValidationResult::fail(
                "postal_code_missing",
                "postal_code",
                "Code postal is blank",
                Severity::Warning,
            ),
            Some(code) if code.len() != 5 || !code.chars().all(|c| c.is_ascii_digit()) => {
                ValidationResult::fail(
                    "postal_code_invalid",
                    "postal_code",
                    &format!("Code postal should be 5 digits: {}", code),
                    Severity::Warning,
                )
            }
            Some(code) => ValidationResult::pass(
                "postal_code_valid",
                "postal_code",
                &format!("Code postal: {}", code),
            ),
        }
    }

    fn validate_built_surfaces(&self, tx: &Transaction) -> ValidationResult {
        let zero_surfaces = tx
            .built
            .iter()
            .filter(|b| matches!(b.surface_m2, Some(s) if s <= 0.0))
            .count();

        if zero_surfaces > 0 {
            return ValidationResult::fail(
                "built_surface_zero",
                "built_surface",
                &format!("{} built component(s) with zero surface", zero_surfaces),
                Severity::Warning,
            );
        }

        ValidationResult::pass("built_surface_valid", "built_surface", "Built surfaces valid")
    }

    fn validate_parcels(&self, tx: &Transaction) -> ValidationResult {
        if tx.parcels.is_empty() {
            return ValidationResult::fail(
                "parcels_missing",
                "parcels",
                "Transaction touches no parcel",
                Severity::Critical,
            );
        }

        ValidationResult::pass(
            "parcels_present",
            "parcels",
            &format!("{} parcel(s)", tx.parcels.len()),
        )
    }
}

impl Default for DataQualityEngine {
    fn default() -> Self {
        Self::new(&AggregatorConfig::default())
    }
}

// ============================================================================
// BATCH SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_transactions: usize,
    pub high_quality_count: usize,
    pub critical_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    pub average_quality: f64,
}

impl BatchSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} transactions: {:.1}% quality | {} high quality, {} critical, {} warning, {} info",
            self.total_transactions,
            self.average_quality * 100.0,
            self.high_quality_count,
            self.critical_count,
            self.warning_count,
            self.info_count
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::grouper::KeyPolicy;
    use crate::parser::tests::{dvf_line, dvf_text};
    use crate::parser::Price;

    fn transaction(price: &str, local_type: &str, culture: &str) -> Transaction {
        let aggregator = Aggregator::new(AggregatorConfig {
            key_policy: KeyPolicy::Strict,
            ..AggregatorConfig::default()
        });
        let text = dvf_text(&[dvf_line("D1", "1", price, "12", local_type, culture)]);
        let report = aggregator.aggregate_reader(text.as_bytes()).unwrap();
        report.transactions[0].clone()
    }

    #[test]
    fn test_validate_clean_transaction() {
        let engine = DataQualityEngine::default();
        // 95 m² house
        let tx = transaction("285000,00", "Maison", "S");

        let report = engine.validate(&tx);

        println!("Report: {}", report.summary());
        assert!(report.issues.is_empty());
        assert!(report.is_high_quality());
        assert_eq!(report.overall_quality, 1.0);
    }

    #[test]
    fn test_validate_missing_price() {
        let engine = DataQualityEngine::default();
        let tx = transaction("", "Maison", "");

        let report = engine.validate(&tx);

        assert!(report.issues.iter().any(|i| i.field == "price"));
        assert!(report.issues.iter().all(|i| i.severity == Severity::Warning));
        assert!(!report.has_critical_issues());
    }

    #[test]
    fn test_validate_zero_price_is_critical() {
        let engine = DataQualityEngine::default();
        let mut tx = transaction("1000,00", "", "S");
        tx.price = Some(Price::from_cents(0));

        let report = engine.validate(&tx);

        assert!(report.has_critical_issues());
        assert!(!report.is_high_quality());
    }

    #[test]
    fn test_validate_price_per_m2_outlier() {
        let engine = DataQualityEngine::default();
        // 1 € for a 48 m² apartment
        let tx = transaction("1,00", "Appartement", "");

        let report = engine.validate(&tx);

        let outlier = report
            .issues
            .iter()
            .find(|i| i.field == "price_per_m2")
            .expect("outlier issue");
        assert_eq!(outlier.severity, Severity::Info);
    }

    #[test]
    fn test_validate_bad_postal_code() {
        let engine = DataQualityEngine::default();
        let mut tx = transaction("285000,00", "Maison", "");
        tx.postal_code = Some("1A00".to_string());

        let report = engine.validate(&tx);

        assert!(report.issues.iter().any(|i| i.field == "postal_code"));
    }

    #[test]
    fn test_batch_summary() {
        let engine = DataQualityEngine::default();
        let transactions = vec![
            transaction("285000,00", "Maison", "S"),
            transaction("285000,00", "Maison", "S"),
            transaction("", "Maison", ""),
        ];

        let reports = engine.validate_batch(&transactions);
        let summary = engine.batch_summary(&reports);

        println!("Batch summary: {}", summary.summary());
        assert_eq!(summary.total_transactions, 3);
        assert_eq!(summary.high_quality_count, 3);
        assert_eq!(summary.warning_count, 1);
        assert_eq!(summary.critical_count, 0);
    }

    #[test]
    fn test_batch_summary_empty() {
        let engine = DataQualityEngine::default();
        let summary = engine.batch_summary(&[]);

        assert_eq!(summary.total_transactions, 0);
        assert_eq!(summary.average_quality, 0.0);
    }
}
