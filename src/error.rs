// Error taxonomy for the posting and verification engine

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in ledger operations.
///
/// Mutating operations are atomic: any error means nothing was partially
/// committed. `Store` errors are transient and eligible for retry by the
/// caller; everything else is a definitive verdict on the input or the data.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Bad input field. Recoverable; no state change occurred.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// No classification rule matched. The invoice stays persisted,
    /// unposted, awaiting manual classification.
    #[error("no classification rule matches invoice {invoice_id} ({supplier})")]
    UnclassifiableInvoice { invoice_id: Uuid, supplier: String },

    /// Debit and credit totals diverge by more than one minor unit.
    /// Fatal to the posting attempt; the whole entry batch is discarded.
    #[error("unbalanced posting for invoice {invoice_id}: debits {debit_total}, credits {credit_total}")]
    BalanceViolation {
        invoice_id: Uuid,
        debit_total: Decimal,
        credit_total: Decimal,
    },

    /// The hash chain diverged at `index`. Reported, never auto-repaired.
    #[error("chain integrity failure at index {index} (transaction {transaction_id}): {reason}")]
    ChainIntegrity {
        index: usize,
        transaction_id: Uuid,
        reason: String,
    },

    #[error("invoice {0} not found")]
    InvoiceNotFound(Uuid),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

impl LedgerError {
    /// Shorthand for a field-level validation failure.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, LedgerError::Validation { .. })
    }
}
