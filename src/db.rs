// 🗄️ SQLite store - aggregated transactions, anomalies, import events
//
// Transactions are keyed by the SHA-256 of their TransactionKey, so importing
// the same file twice leaves the table unchanged.

use crate::aggregator::{AggregationStats, Transaction};
use crate::error::Anomaly;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Event for the import audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            document_id TEXT NOT NULL,
            disposition INTEGER NOT NULL,
            date_mutation TEXT NOT NULL,
            mutation_type TEXT NOT NULL,
            price_cents INTEGER,
            department_code TEXT NOT NULL,
            commune_code TEXT NOT NULL,
            postal_code TEXT,
            parcel_count INTEGER NOT NULL,
            built_count INTEGER NOT NULL,
            land_count INTEGER NOT NULL,
            payload TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS anomalies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            transaction_key TEXT,
            lines TEXT NOT NULL,
            message TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_commune ON transactions(department_code, commune_code)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_date ON transactions(date_mutation)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_anomalies_run ON anomalies(run_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert transactions, skipping keys already stored; returns the number inserted
pub fn insert_transactions(conn: &Connection, transactions: &[Transaction]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for tx in transactions {
        let hash = tx.compute_idempotency_hash();
        let payload = serde_json::to_string(tx)?;

        let result = conn.execute(
            "INSERT INTO transactions (
                idempotency_hash, document_id, disposition, date_mutation, mutation_type,
                price_cents, department_code, commune_code, postal_code,
                parcel_count, built_count, land_count, payload
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                hash,
                tx.key.document_id,
                tx.key.disposition,
                tx.date.format("%Y-%m-%d").to_string(),
                tx.mutation_type.label(),
                tx.price.map(|p| p.cents()),
                tx.department_code,
                tx.commune_code,
                tx.postal_code,
                tx.parcels.len() as i64,
                tx.built.len() as i64,
                tx.land.len() as i64,
                payload,
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                debug!(key = %tx.key, "transaction already stored");
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(inserted, duplicates, "stored transactions");

    Ok(inserted)
}

/// Store the anomalies of one run
pub fn insert_anomalies(conn: &Connection, run_id: &str, anomalies: &[Anomaly]) -> Result<usize> {
    for anomaly in anomalies {
        conn.execute(
            "INSERT INTO anomalies (run_id, kind, transaction_key, lines, message, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                anomaly.kind(),
                anomaly.key().map(|k| k.to_string()),
                serde_json::to_string(&anomaly.lines())?,
                anomaly.to_string(),
                serde_json::to_string(anomaly)?,
            ],
        )?;
    }

    Ok(anomalies.len())
}

/// Persist a whole aggregation run and log it; returns the run id
///
/// Everything is written in one SQLite transaction: a failed run stores nothing.
pub fn record_import_run(
    conn: &Connection,
    source: &str,
    transactions: &[Transaction],
    anomalies: &[Anomaly],
    stats: &AggregationStats,
) -> Result<String> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let db_tx = conn
        .unchecked_transaction()
        .context("Failed to begin import transaction")?;

    let inserted = insert_transactions(&db_tx, transactions)?;
    insert_anomalies(&db_tx, &run_id, anomalies)?;

    let event = Event::new(
        "import_completed",
        "import_run",
        &run_id,
        serde_json::json!({
            "source": source,
            "inserted": inserted,
            "stats": stats,
        }),
        "dvf_aggregator",
    );
    insert_event(&db_tx, &event)?;

    db_tx.commit().context("Failed to commit import run")?;
    Ok(run_id)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

pub fn get_all_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT payload FROM transactions ORDER BY date_mutation, document_id, disposition",
    )?;

    let payloads = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    payloads
        .iter()
        .map(|p| serde_json::from_str::<Transaction>(p).context("Failed to decode stored transaction"))
        .collect()
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    Ok(count)
}

/// Per-department statistics, one price per disposition
#[derive(Debug, Clone, Serialize)]
pub struct DepartmentStat {
    pub department_code: String,
    pub transaction_count: i64,
    pub priced_count: i64,
    pub total_value: f64,
    pub date_range: String,
}

pub fn get_department_stats(conn: &Connection) -> Result<Vec<DepartmentStat>> {
    let mut stmt = conn.prepare(
        "SELECT
            department_code,
            COUNT(*) as count,
            COUNT(price_cents) as priced,
            COALESCE(SUM(price_cents), 0) as total_cents,
            MIN(date_mutation) || ' - ' || MAX(date_mutation) as date_range
         FROM transactions
         GROUP BY department_code
         ORDER BY department_code",
    )?;

    let stats = stmt
        .query_map([], |row| {
            let total_cents: i64 = row.get(3)?;
            Ok(DepartmentStat {
                department_code: row.get(0)?,
                transaction_count: row.get(1)?,
                priced_count: row.get(2)?,
                total_value: total_cents as f64 / 100.0,
                date_range: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(stats)
}
