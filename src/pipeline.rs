// Upload processing pipeline
//
// intake -> extract -> normalize -> persist -> classify -> post -> seal.
// Shared by the upload endpoint and any batch caller. The invoice is
// persisted before classification so an unclassifiable upload is retained
// for manual handling rather than discarded.

use rusqlite::Connection;

use crate::chain::{seal_invoice, ChainSequencer};
use crate::classifier::RuleSet;
use crate::db;
use crate::error::LedgerError;
use crate::intake::{check_upload, FieldExtractor};
use crate::ledger::post_invoice;
use crate::model::{ChartOfAccounts, Invoice, LedgerEntry, VerifiedTransaction};
use crate::normalizer::normalize;

/// Everything a successful upload produces.
#[derive(Debug)]
pub struct ProcessedInvoice {
    pub invoice: Invoice,
    pub entries: Vec<LedgerEntry>,
    pub transaction: VerifiedTransaction,
}

/// Run one uploaded file through the full pipeline.
///
/// Failures before the invoice is persisted leave no trace. An
/// `UnclassifiableInvoice` failure leaves the invoice stored, unposted.
pub fn process_upload(
    conn: &Connection,
    sequencer: &ChainSequencer,
    extractor: &dyn FieldExtractor,
    rules: &RuleSet,
    chart: &ChartOfAccounts,
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<ProcessedInvoice, LedgerError> {
    let source = check_upload(filename, content_type, bytes)?;
    let kind = source.kind;

    let raw = extractor.extract(bytes, kind)?;
    let invoice = normalize(&raw, source)?;

    db::insert_invoice(conn, &invoice)?;
    tracing::info!(
        invoice_id = %invoice.id,
        supplier = %invoice.supplier,
        amount = %invoice.amount,
        "normalized uploaded invoice"
    );

    let allocations = rules.classify(&invoice, chart)?;
    let entries = post_invoice(conn, &invoice, &allocations)?;
    let transaction = seal_invoice(conn, sequencer, invoice.id)?;

    Ok(ProcessedInvoice {
        invoice,
        entries,
        transaction,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{FallbackExtractor, FileKind, RawInvoice};
    use crate::ledger::balance_totals;
    use serde_json::{json, Value};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        conn
    }

    /// Extractor returning fixed fields, standing in for the external
    /// AI/OCR collaborator.
    struct StaticExtractor(Value);

    impl FieldExtractor for StaticExtractor {
        fn extract(&self, _bytes: &[u8], _kind: FileKind) -> Result<RawInvoice, LedgerError> {
            match &self.0 {
                Value::Object(map) => Ok(RawInvoice::new(map.clone())),
                _ => unreachable!("test payloads are objects"),
            }
        }
    }

    #[test]
    fn test_full_pipeline() {
        let conn = test_db();
        let sequencer = ChainSequencer::new();
        let extractor = StaticExtractor(json!({
            "date": "2024-01-10",
            "supplier": "Acme",
            "amount": 120.00,
            "description": "office software",
        }));

        let processed = process_upload(
            &conn,
            &sequencer,
            &extractor,
            &RuleSet::standard(),
            &ChartOfAccounts::standard(),
            "acme.pdf",
            Some("application/pdf"),
            b"%PDF-1.4 test",
        )
        .unwrap();

        assert_eq!(processed.entries.len(), 2);
        let (debits, credits) = balance_totals(&processed.entries);
        assert_eq!(debits, credits);
        assert_eq!(processed.transaction.supplier, "Acme");
        assert_eq!(
            db::get_verified_for_invoice(&conn, processed.invoice.id)
                .unwrap()
                .unwrap()
                .hash,
            processed.transaction.hash
        );
    }

    #[test]
    fn test_unclassifiable_upload_retains_invoice() {
        let conn = test_db();
        let sequencer = ChainSequencer::new();
        let extractor = StaticExtractor(json!({
            "date": "2024-01-10",
            "supplier": "Mystery Vendor",
            "amount": 10,
            "description": "unmatched",
        }));
        let strict_rules = RuleSet::new(vec![], "accounts-payable", None);

        let err = process_upload(
            &conn,
            &sequencer,
            &extractor,
            &strict_rules,
            &ChartOfAccounts::standard(),
            "mystery.pdf",
            None,
            b"%PDF-1.4 test",
        )
        .unwrap_err();

        assert!(matches!(err, LedgerError::UnclassifiableInvoice { .. }));
        // Invoice persisted unposted, awaiting manual classification
        let invoices = db::get_all_invoices(&conn).unwrap();
        assert_eq!(invoices.len(), 1);
        assert!(db::get_entries_for_invoice(&conn, invoices[0].id)
            .unwrap()
            .is_empty());
        assert_eq!(db::count_verified_transactions(&conn).unwrap(), 0);
    }

    #[test]
    fn test_invalid_fields_leave_no_trace() {
        let conn = test_db();
        let sequencer = ChainSequencer::new();
        let extractor = StaticExtractor(json!({
            "date": "not-a-date",
            "supplier": "Acme",
            "amount": 10,
        }));

        let err = process_upload(
            &conn,
            &sequencer,
            &extractor,
            &RuleSet::standard(),
            &ChartOfAccounts::standard(),
            "acme.pdf",
            None,
            b"%PDF-1.4 test",
        )
        .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(db::count_invoices(&conn).unwrap(), 0);
    }

    #[test]
    fn test_fallback_extractor_flows_through() {
        let conn = test_db();
        let sequencer = ChainSequencer::new();

        let processed = process_upload(
            &conn,
            &sequencer,
            &FallbackExtractor,
            &RuleSet::standard(),
            &ChartOfAccounts::standard(),
            "scan.png",
            Some("image/png"),
            &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00],
        )
        .unwrap();

        assert_eq!(processed.invoice.supplier, "Auto-detected Supplier");
        assert_eq!(processed.entries.len(), 2);
    }
}
