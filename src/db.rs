// SQLite persistence layer
//
// Free functions over &Connection, one table per aggregate. Amounts are
// stored as canonical decimal TEXT, dates and timestamps as ISO-8601 TEXT.
// Multi-row mutations run inside a sqlite transaction so callers get
// all-or-nothing semantics.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use std::path::Path;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::intake::{FileKind, SourceFileRef};
use crate::model::{
    Currency, EntrySide, ImpactEntry, Invoice, LedgerEntry, VerifiedTransaction,
};

/// Open (or create) the database at `path` and ensure the schema exists.
pub fn open_database(path: &Path) -> Result<Connection, LedgerError> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<(), LedgerError> {
    // WAL for crash recovery, foreign keys for referential integrity
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS invoices (
            id BLOB PRIMARY KEY,
            date TEXT NOT NULL,
            supplier TEXT NOT NULL,
            description TEXT NOT NULL,
            amount TEXT NOT NULL,
            currency TEXT NOT NULL,
            source_filename TEXT NOT NULL,
            source_kind TEXT NOT NULL,
            source_size INTEGER NOT NULL,
            uploaded_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS ledger_entries (
            id BLOB PRIMARY KEY,
            invoice_id BLOB NOT NULL REFERENCES invoices(id),
            account TEXT NOT NULL,
            date TEXT NOT NULL,
            amount TEXT NOT NULL,
            side TEXT NOT NULL,
            sealed INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    // seq fixes the canonical chain order; UNIQUE(invoice_id) backs
    // seal idempotence at the store level
    conn.execute(
        "CREATE TABLE IF NOT EXISTS verified_transactions (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id BLOB UNIQUE NOT NULL,
            invoice_id BLOB UNIQUE NOT NULL REFERENCES invoices(id),
            supplier TEXT NOT NULL,
            amount TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            prev_hash TEXT NOT NULL,
            hash TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS impact_entries (
            id BLOB PRIMARY KEY,
            invoice_id BLOB UNIQUE NOT NULL REFERENCES invoices(id),
            water_usage REAL NOT NULL,
            co2_emissions REAL NOT NULL,
            labor_score INTEGER NOT NULL,
            recycling_rate REAL NOT NULL,
            recorded_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entries_invoice ON ledger_entries(invoice_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_invoices_uploaded ON invoices(uploaded_at)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// COLUMN CODECS
// ============================================================================

fn conversion_error(
    index: usize,
    source: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(source))
}

fn decimal_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(index)?;
    text.parse().map_err(|e| conversion_error(index, e))
}

fn side_column(row: &Row<'_>, index: usize) -> rusqlite::Result<EntrySide> {
    let text: String = row.get(index)?;
    text.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, e.into())
    })
}

fn kind_column(row: &Row<'_>, index: usize) -> rusqlite::Result<FileKind> {
    let text: String = row.get(index)?;
    text.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, e.into())
    })
}

fn currency_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Currency> {
    let text: String = row.get(index)?;
    text.parse().map_err(|e| conversion_error(index, e))
}

// ============================================================================
// INVOICES
// ============================================================================

pub fn insert_invoice(conn: &Connection, invoice: &Invoice) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO invoices (
            id, date, supplier, description, amount, currency,
            source_filename, source_kind, source_size, uploaded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            invoice.id,
            invoice.date,
            invoice.supplier,
            invoice.description,
            invoice.amount.to_string(),
            invoice.currency.code(),
            invoice.source_file.filename,
            invoice.source_file.kind.as_str(),
            invoice.source_file.size_bytes as i64,
            invoice.uploaded_at,
        ],
    )?;
    Ok(())
}

fn invoice_from_row(row: &Row<'_>) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        id: row.get(0)?,
        date: row.get::<_, NaiveDate>(1)?,
        supplier: row.get(2)?,
        description: row.get(3)?,
        amount: decimal_column(row, 4)?,
        currency: currency_column(row, 5)?,
        source_file: SourceFileRef {
            filename: row.get(6)?,
            kind: kind_column(row, 7)?,
            size_bytes: row.get::<_, i64>(8)? as u64,
        },
        uploaded_at: row.get::<_, DateTime<Utc>>(9)?,
    })
}

const INVOICE_COLUMNS: &str = "id, date, supplier, description, amount, currency,
     source_filename, source_kind, source_size, uploaded_at";

pub fn get_invoice(conn: &Connection, id: Uuid) -> Result<Option<Invoice>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![id], invoice_from_row)?;
    Ok(rows.next().transpose()?)
}

pub fn get_all_invoices(conn: &Connection) -> Result<Vec<Invoice>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY uploaded_at DESC"
    ))?;
    let invoices = stmt
        .query_map([], invoice_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(invoices)
}

pub fn count_invoices(conn: &Connection) -> Result<i64, LedgerError> {
    let count = conn.query_row("SELECT COUNT(*) FROM invoices", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// LEDGER ENTRIES
// ============================================================================

/// Append a batch of entries atomically: either every entry is committed
/// or none are.
pub fn insert_ledger_entries(
    conn: &Connection,
    entries: &[LedgerEntry],
) -> Result<(), LedgerError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO ledger_entries (id, invoice_id, account, date, amount, side, sealed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for entry in entries {
            stmt.execute(params![
                entry.id,
                entry.invoice_id,
                entry.account,
                entry.date,
                entry.amount.to_string(),
                entry.side.as_str(),
                entry.sealed,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        invoice_id: row.get(1)?,
        account: row.get(2)?,
        date: row.get::<_, NaiveDate>(3)?,
        amount: decimal_column(row, 4)?,
        side: side_column(row, 5)?,
        sealed: row.get(6)?,
    })
}

const ENTRY_COLUMNS: &str = "id, invoice_id, account, date, amount, side, sealed";

pub fn get_entries_for_invoice(
    conn: &Connection,
    invoice_id: Uuid,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE invoice_id = ?1 ORDER BY rowid"
    ))?;
    let entries = stmt
        .query_map(params![invoice_id], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn get_all_ledger_entries(conn: &Connection) -> Result<Vec<LedgerEntry>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ledger_entries ORDER BY rowid"
    ))?;
    let entries = stmt
        .query_map([], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

// ============================================================================
// VERIFIED TRANSACTIONS
// ============================================================================

pub fn insert_verified_transaction(
    conn: &Connection,
    tx: &VerifiedTransaction,
) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO verified_transactions (
            id, invoice_id, supplier, amount, timestamp, prev_hash, hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            tx.id,
            tx.invoice_id,
            tx.supplier,
            tx.amount.to_string(),
            tx.timestamp,
            tx.prev_hash,
            tx.hash,
        ],
    )?;
    Ok(())
}

/// Flip the invoice's entries to read-only. Runs inside the caller's
/// sealing transaction.
pub fn mark_entries_sealed(conn: &Connection, invoice_id: Uuid) -> Result<(), LedgerError> {
    conn.execute(
        "UPDATE ledger_entries SET sealed = 1 WHERE invoice_id = ?1",
        params![invoice_id],
    )?;
    Ok(())
}

fn verified_from_row(row: &Row<'_>) -> rusqlite::Result<VerifiedTransaction> {
    Ok(VerifiedTransaction {
        id: row.get(0)?,
        invoice_id: row.get(1)?,
        supplier: row.get(2)?,
        amount: decimal_column(row, 3)?,
        timestamp: row.get::<_, DateTime<Utc>>(4)?,
        prev_hash: row.get(5)?,
        hash: row.get(6)?,
    })
}

const VERIFIED_COLUMNS: &str = "id, invoice_id, supplier, amount, timestamp, prev_hash, hash";

pub fn get_verified_for_invoice(
    conn: &Connection,
    invoice_id: Uuid,
) -> Result<Option<VerifiedTransaction>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VERIFIED_COLUMNS} FROM verified_transactions WHERE invoice_id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![invoice_id], verified_from_row)?;
    Ok(rows.next().transpose()?)
}

/// The full chain in canonical (insertion) order.
pub fn get_chain(conn: &Connection) -> Result<Vec<VerifiedTransaction>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VERIFIED_COLUMNS} FROM verified_transactions ORDER BY seq"
    ))?;
    let chain = stmt
        .query_map([], verified_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(chain)
}

pub fn count_verified_transactions(conn: &Connection) -> Result<i64, LedgerError> {
    let count = conn.query_row("SELECT COUNT(*) FROM verified_transactions", [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

// ============================================================================
// IMPACT ENTRIES
// ============================================================================

/// Insert or replace the impact entry for an invoice. On replacement the
/// original entry id is preserved; only the metrics and timestamp move.
/// Returns the stored row.
pub fn upsert_impact_entry(
    conn: &Connection,
    entry: &ImpactEntry,
) -> Result<ImpactEntry, LedgerError> {
    conn.execute(
        "INSERT INTO impact_entries (
            id, invoice_id, water_usage, co2_emissions, labor_score, recycling_rate, recorded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(invoice_id) DO UPDATE SET
            water_usage = excluded.water_usage,
            co2_emissions = excluded.co2_emissions,
            labor_score = excluded.labor_score,
            recycling_rate = excluded.recycling_rate,
            recorded_at = excluded.recorded_at",
        params![
            entry.id,
            entry.invoice_id,
            entry.water_usage,
            entry.co2_emissions,
            entry.labor_score as i64,
            entry.recycling_rate,
            entry.recorded_at,
        ],
    )?;

    get_impact_for_invoice(conn, entry.invoice_id)?
        .ok_or_else(|| rusqlite::Error::QueryReturnedNoRows.into())
}

fn impact_from_row(row: &Row<'_>) -> rusqlite::Result<ImpactEntry> {
    Ok(ImpactEntry {
        id: row.get(0)?,
        invoice_id: row.get(1)?,
        water_usage: row.get(2)?,
        co2_emissions: row.get(3)?,
        labor_score: row.get::<_, i64>(4)? as u8,
        recycling_rate: row.get(5)?,
        recorded_at: row.get::<_, DateTime<Utc>>(6)?,
    })
}

const IMPACT_COLUMNS: &str =
    "id, invoice_id, water_usage, co2_emissions, labor_score, recycling_rate, recorded_at";

pub fn get_impact_for_invoice(
    conn: &Connection,
    invoice_id: Uuid,
) -> Result<Option<ImpactEntry>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {IMPACT_COLUMNS} FROM impact_entries WHERE invoice_id = ?1"
    ))?;
    let mut rows = stmt.query_map(params![invoice_id], impact_from_row)?;
    Ok(rows.next().transpose()?)
}

pub fn get_all_impact_entries(conn: &Connection) -> Result<Vec<ImpactEntry>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {IMPACT_COLUMNS} FROM impact_entries ORDER BY recorded_at DESC"
    ))?;
    let entries = stmt
        .query_map([], impact_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

// ============================================================================
// TESTS
// ============================================================================
