// DVF Disposition Aggregator - Core Library
// Exposes all modules for use in the CLI and tests

pub mod parser;       // Row Parser: DVF text → RawRow
pub mod grouper;      // Disposition Grouper: RawRow → groups per TransactionKey
pub mod aggregator;   // Property Aggregator + whole-file pipeline
pub mod error;        // Recoverable anomaly taxonomy
pub mod config;       // JSON configuration
pub mod data_quality; // Per-transaction quality checks
pub mod db;           // SQLite store
pub mod export;       // JSON-lines output

// Re-export commonly used types
pub use parser::{
    BuiltComponent, CadastralParcel, LandComponent, LocalType, MutationType, ParsedRows, Price,
    RawRow, RowParser,
    load_rows, read_rows,
};
pub use grouper::{
    DispositionGroups, KeyPolicy, SharedFields, TransactionKey,
    group_rows, validate_group,
};
pub use aggregator::{
    AggregationReport, AggregationStats, Aggregator, Transaction,
    aggregate_group,
};
pub use error::{Anomaly, ParseError};
pub use config::{AggregatorConfig, ConfigOverrides};
pub use data_quality::{BatchSummary, DataQualityEngine, QualityIssue, QualityReport, Severity};
pub use db::{
    DepartmentStat, Event,
    setup_database, insert_transactions, insert_anomalies, record_import_run,
    get_all_transactions, get_department_stats, verify_count,
};
pub use export::{write_jsonl, write_jsonl_file};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
