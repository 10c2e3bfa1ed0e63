// End-to-end pipeline tests against an on-disk database

use rusqlite::params;
use serde_json::{json, Value};
use tempfile::TempDir;

use quadledger::{
    db, impact::link_impact, pipeline::process_upload, verify_chain, ChainSequencer,
    ChartOfAccounts, FieldExtractor, FileKind, ImpactMetrics, LedgerError, RawInvoice, RuleSet,
};

fn open_workspace_db() -> (TempDir, rusqlite::Connection) {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let conn = db::open_database(&temp_dir.path().join("quadledger.db")).expect("open database");
    (temp_dir, conn)
}

/// Stand-in for the external AI/OCR collaborator: returns fixed fields.
struct StaticExtractor(Value);

impl FieldExtractor for StaticExtractor {
    fn extract(&self, _bytes: &[u8], _kind: FileKind) -> Result<RawInvoice, LedgerError> {
        match &self.0 {
            Value::Object(map) => Ok(RawInvoice::new(map.clone())),
            _ => unreachable!("test payloads are objects"),
        }
    }
}

fn extractor(supplier: &str, amount: f64, description: &str) -> StaticExtractor {
    StaticExtractor(json!({
        "date": "2024-01-10",
        "supplier": supplier,
        "amount": amount,
        "description": description,
    }))
}

fn upload(
    conn: &rusqlite::Connection,
    sequencer: &ChainSequencer,
    supplier: &str,
    amount: f64,
    description: &str,
) -> quadledger::ProcessedInvoice {
    process_upload(
        conn,
        sequencer,
        &extractor(supplier, amount, description),
        &RuleSet::standard(),
        &ChartOfAccounts::standard(),
        "invoice.pdf",
        Some("application/pdf"),
        b"%PDF-1.4 content",
    )
    .expect("process upload")
}

#[test]
fn upload_posts_balanced_entries_and_seals_one_transaction() {
    let (_tmp, conn) = open_workspace_db();
    let sequencer = ChainSequencer::new();

    let processed = upload(&conn, &sequencer, "Acme", 120.00, "office software");

    assert_eq!(processed.entries.len(), 2);
    let entries = db::get_entries_for_invoice(&conn, processed.invoice.id).expect("entries");
    let debits: rust_decimal::Decimal = entries
        .iter()
        .filter(|e| e.side == quadledger::EntrySide::Debit)
        .map(|e| e.amount)
        .sum();
    let credits: rust_decimal::Decimal = entries
        .iter()
        .filter(|e| e.side == quadledger::EntrySide::Credit)
        .map(|e| e.amount)
        .sum();
    assert_eq!(debits, credits);
    assert!(entries.iter().all(|e| e.sealed));

    assert_eq!(db::count_verified_transactions(&conn).expect("count"), 1);
    assert_eq!(processed.transaction.supplier, "Acme");
    assert_eq!(processed.transaction.prev_hash, quadledger::GENESIS_HASH);
}

#[test]
fn chain_links_across_uploads_and_survives_restart() {
    let (tmp, conn) = open_workspace_db();
    let sequencer = ChainSequencer::new();

    let first = upload(&conn, &sequencer, "Acme", 120.00, "office software");
    let second = upload(&conn, &sequencer, "Globex", 45.10, "consulting");
    assert_eq!(second.transaction.prev_hash, first.transaction.hash);

    // Reopen everything, as a process restart would
    drop(conn);
    let conn = db::open_database(&tmp.path().join("quadledger.db")).expect("reopen");
    let sequencer = ChainSequencer::load(&conn).expect("reload sequencer");
    assert_eq!(sequencer.head_hash(), second.transaction.hash);

    let third = upload(&conn, &sequencer, "Initech", 9.99, "materials");
    assert_eq!(third.transaction.prev_hash, second.transaction.hash);

    verify_chain(&db::get_chain(&conn).expect("chain")).expect("chain verifies clean");
}

#[test]
fn tampering_is_located_at_the_divergent_transaction() {
    let (_tmp, conn) = open_workspace_db();
    let sequencer = ChainSequencer::new();

    upload(&conn, &sequencer, "Acme", 120.00, "office software");
    let tampered = upload(&conn, &sequencer, "Globex", 45.10, "consulting");
    upload(&conn, &sequencer, "Initech", 9.99, "materials");

    conn.execute(
        "UPDATE verified_transactions SET amount = '45000' WHERE id = ?1",
        params![tampered.transaction.id],
    )
    .expect("tamper");

    let err = verify_chain(&db::get_chain(&conn).expect("chain")).expect_err("must detect");
    match err {
        LedgerError::ChainIntegrity {
            index,
            transaction_id,
            ..
        } => {
            assert_eq!(index, 1);
            assert_eq!(transaction_id, tampered.transaction.id);
        }
        other => panic!("expected ChainIntegrity, got {other:?}"),
    }
}

#[test]
fn impact_entries_upsert_per_invoice() {
    let (_tmp, conn) = open_workspace_db();
    let sequencer = ChainSequencer::new();

    let processed = upload(&conn, &sequencer, "Acme", 120.00, "office software");
    let metrics = |labor_score| ImpactMetrics {
        water_usage: 500.0,
        co2_emissions: 2.1,
        labor_score,
        recycling_rate: 80.0,
    };

    let first = link_impact(&conn, processed.invoice.id, &metrics(6)).expect("first");
    let second = link_impact(&conn, processed.invoice.id, &metrics(8)).expect("second");

    assert_eq!(first.id, second.id);
    let all = db::get_all_impact_entries(&conn).expect("all");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].labor_score, 8);

    // Impact linking never touches the chain
    verify_chain(&db::get_chain(&conn).expect("chain")).expect("chain untouched");
}

#[test]
fn dashboard_reflects_stores() {
    let (_tmp, conn) = open_workspace_db();
    let sequencer = ChainSequencer::new();

    let a = upload(&conn, &sequencer, "Acme", 100.00, "office software");
    upload(&conn, &sequencer, "Globex", 20.00, "consulting");
    link_impact(
        &conn,
        a.invoice.id,
        &ImpactMetrics {
            water_usage: 10.0,
            co2_emissions: 1.0,
            labor_score: 7,
            recycling_rate: 30.0,
        },
    )
    .expect("impact");

    let dashboard = quadledger::summarize(&conn).expect("summarize");
    assert_eq!(dashboard.summary.total_invoices, 2);
    assert_eq!(dashboard.summary.verified_transactions, 2);
    assert_eq!(dashboard.summary.impact_entries, 1);
    // Only the invoice with impact data counts toward the mean
    assert_eq!(dashboard.summary.avg_labor_score, 7.0);
    assert_eq!(dashboard.recent_invoices.len(), 2);
}

#[test]
fn oversized_and_unknown_uploads_are_rejected_at_intake() {
    let (_tmp, conn) = open_workspace_db();
    let sequencer = ChainSequencer::new();
    let rules = RuleSet::standard();
    let chart = ChartOfAccounts::standard();

    let oversized = vec![0u8; quadledger::MAX_UPLOAD_BYTES + 1];
    let err = process_upload(
        &conn,
        &sequencer,
        &extractor("Acme", 1.0, "x"),
        &rules,
        &chart,
        "big.pdf",
        None,
        &oversized,
    )
    .expect_err("oversize rejected");
    assert!(err.is_validation());

    let err = process_upload(
        &conn,
        &sequencer,
        &extractor("Acme", 1.0, "x"),
        &rules,
        &chart,
        "note.txt",
        Some("text/plain"),
        b"plain text",
    )
    .expect_err("unknown kind rejected");
    assert!(err.is_validation());

    // Nothing persisted by either attempt
    assert_eq!(db::count_invoices(&conn).expect("count"), 0);
}
