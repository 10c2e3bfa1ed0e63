// Ledger Posting Engine
//
// Turns classified allocations into committed double-entry batches.
// Append-only: committed entries are never edited or removed; corrections
// go through reversing pairs.

use rusqlite::Connection;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::classifier::AccountAllocation;
use crate::db;
use crate::error::LedgerError;
use crate::model::{EntrySide, Invoice, LedgerEntry};

/// Sum the debit and credit sides of an entry set.
pub fn balance_totals(entries: &[LedgerEntry]) -> (Decimal, Decimal) {
    let mut debit_total = Decimal::ZERO;
    let mut credit_total = Decimal::ZERO;
    for entry in entries {
        match entry.side {
            EntrySide::Debit => debit_total += entry.amount,
            EntrySide::Credit => credit_total += entry.amount,
        }
    }
    (debit_total, credit_total)
}

/// The balance invariant: debit and credit totals may diverge by at most
/// one minor unit of the invoice currency (rounding slack), nothing more.
pub fn check_balanced(
    invoice_id: Uuid,
    tolerance: Decimal,
    entries: &[LedgerEntry],
) -> Result<(), LedgerError> {
    let (debit_total, credit_total) = balance_totals(entries);
    if (debit_total - credit_total).abs() > tolerance {
        return Err(LedgerError::BalanceViolation {
            invoice_id,
            debit_total,
            credit_total,
        });
    }
    Ok(())
}

/// Post a classified invoice to the ledger.
///
/// Builds one entry per allocation, re-checks the balance invariant as a
/// post-condition, and appends the batch atomically. On any failure the
/// ledger is untouched.
pub fn post_invoice(
    conn: &Connection,
    invoice: &Invoice,
    allocations: &[AccountAllocation],
) -> Result<Vec<LedgerEntry>, LedgerError> {
    if allocations.is_empty() {
        return Err(LedgerError::validation(
            "allocations",
            "classification produced no allocations",
        ));
    }

    if !db::get_entries_for_invoice(conn, invoice.id)?.is_empty() {
        return Err(LedgerError::validation(
            "invoice_id",
            format!("invoice {} is already posted", invoice.id),
        ));
    }

    let entries: Vec<LedgerEntry> = allocations
        .iter()
        .map(|allocation| LedgerEntry {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            account: allocation.account.clone(),
            date: invoice.date,
            amount: allocation.amount,
            side: allocation.side,
            sealed: false,
        })
        .collect();

    for entry in &entries {
        if entry.amount <= Decimal::ZERO {
            return Err(LedgerError::validation(
                "amount",
                format!("entry amounts must be positive, got {}", entry.amount),
            ));
        }
    }

    check_balanced(invoice.id, invoice.currency.minor_unit(), &entries)?;

    db::insert_ledger_entries(conn, &entries)?;
    tracing::debug!(invoice_id = %invoice.id, entries = entries.len(), "posted invoice");
    Ok(entries)
}

/// Post a reversing batch for a previously posted invoice: the same
/// accounts and amounts with debit and credit swapped. The original
/// entries stay in place. Sealed invoices cannot be reversed.
pub fn post_reversal(
    conn: &Connection,
    invoice: &Invoice,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    let existing = db::get_entries_for_invoice(conn, invoice.id)?;
    if existing.is_empty() {
        return Err(LedgerError::validation(
            "invoice_id",
            format!("invoice {} has no ledger entries to reverse", invoice.id),
        ));
    }
    if existing.iter().any(|e| e.sealed) {
        return Err(LedgerError::validation(
            "invoice_id",
            format!("invoice {} is sealed; its entries are read-only", invoice.id),
        ));
    }

    let reversals: Vec<LedgerEntry> = existing
        .iter()
        .map(|entry| LedgerEntry {
            id: Uuid::new_v4(),
            side: entry.side.opposite(),
            sealed: false,
            ..entry.clone()
        })
        .collect();

    db::insert_ledger_entries(conn, &reversals)?;
    tracing::debug!(invoice_id = %invoice.id, entries = reversals.len(), "posted reversal");
    Ok(reversals)
}

// ============================================================================
// TESTS
// ============================================================================
