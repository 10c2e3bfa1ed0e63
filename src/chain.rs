// Verification Chain - sealing and integrity checking
//
// Seals a posted invoice's entries into a VerifiedTransaction and extends
// the hash chain. The chain head is the single piece of global mutable
// state in the engine; it lives in an explicitly owned ChainSequencer so
// tests can substitute an isolated instance, and it only advances inside
// the sequencer's critical section.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use uuid::Uuid;

use crate::db;
use crate::error::LedgerError;
use crate::ledger::check_balanced;
use crate::model::{VerifiedTransaction, GENESIS_HASH};

// ============================================================================
// HASHING
// ============================================================================

/// The canonical payload a transaction's hash covers. Embedding the
/// predecessor hash is what chains the records together.
pub fn canonical_payload(
    invoice_id: Uuid,
    supplier: &str,
    amount: Decimal,
    timestamp: DateTime<Utc>,
    prev_hash: &str,
) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        invoice_id,
        supplier,
        amount.normalize(),
        timestamp.to_rfc3339(),
        prev_hash
    )
}

/// SHA-256 over the canonical payload, hex encoded.
pub fn transaction_hash(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

fn recompute_hash(tx: &VerifiedTransaction) -> String {
    transaction_hash(&canonical_payload(
        tx.invoice_id,
        &tx.supplier,
        tx.amount,
        tx.timestamp,
        &tx.prev_hash,
    ))
}

// ============================================================================
// SEQUENCER
// ============================================================================

struct Head {
    prev_hash: String,
    last_timestamp: DateTime<Utc>,
}

/// Owner of the chain head. Sealing is strictly serialized through the
/// head lock: every transaction observes the true immediately-preceding
/// hash, and the head only advances after the seal has committed.
pub struct ChainSequencer {
    head: Mutex<Head>,
}

impl ChainSequencer {
    /// A sequencer for an empty chain, rooted at the genesis hash.
    pub fn new() -> Self {
        ChainSequencer {
            head: Mutex::new(Head {
                prev_hash: GENESIS_HASH.to_string(),
                last_timestamp: DateTime::<Utc>::UNIX_EPOCH,
            }),
        }
    }

    /// Resume from the stored chain tail.
    pub fn load(conn: &Connection) -> Result<Self, LedgerError> {
        let sequencer = ChainSequencer::new();
        if let Some(tail) = db::get_chain(conn)?.last() {
            let mut head = sequencer.head.lock().expect("chain head lock poisoned");
            head.prev_hash = tail.hash.clone();
            head.last_timestamp = tail.timestamp;
        }
        Ok(sequencer)
    }

    /// Current head hash (the hash the next sealed transaction will embed).
    pub fn head_hash(&self) -> String {
        self.head
            .lock()
            .expect("chain head lock poisoned")
            .prev_hash
            .clone()
    }
}

impl Default for ChainSequencer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SEALING
// ============================================================================

/// Seal a posted invoice into the chain.
///
/// Idempotent per invoice: an already-sealed invoice returns its existing
/// transaction untouched. Otherwise the invoice's entries are re-verified
/// against the balance invariant, a transaction is built against the
/// current head, and the insert plus the entries' sealed flags commit as
/// one store transaction. The head advances only after that commit, so a
/// failed seal leaves no trace.
pub fn seal_invoice(
    conn: &Connection,
    sequencer: &ChainSequencer,
    invoice_id: Uuid,
) -> Result<VerifiedTransaction, LedgerError> {
    let mut head = sequencer.head.lock().expect("chain head lock poisoned");

    if let Some(existing) = db::get_verified_for_invoice(conn, invoice_id)? {
        return Ok(existing);
    }

    let invoice = db::get_invoice(conn, invoice_id)?
        .ok_or(LedgerError::InvoiceNotFound(invoice_id))?;

    let entries = db::get_entries_for_invoice(conn, invoice_id)?;
    if entries.is_empty() {
        return Err(LedgerError::validation(
            "invoice_id",
            format!("invoice {invoice_id} has no ledger entries to seal"),
        ));
    }
    check_balanced(invoice_id, invoice.currency.minor_unit(), &entries)?;

    // Monotonic within the chain even if the wall clock steps backwards
    let timestamp = Utc::now().max(head.last_timestamp);
    let prev_hash = head.prev_hash.clone();
    let hash = transaction_hash(&canonical_payload(
        invoice_id,
        &invoice.supplier,
        invoice.amount,
        timestamp,
        &prev_hash,
    ));

    let transaction = VerifiedTransaction {
        id: Uuid::new_v4(),
        invoice_id,
        supplier: invoice.supplier.clone(),
        amount: invoice.amount,
        timestamp,
        prev_hash,
        hash,
    };

    let store_tx = conn.unchecked_transaction()?;
    db::insert_verified_transaction(&store_tx, &transaction)?;
    db::mark_entries_sealed(&store_tx, invoice_id)?;
    store_tx.commit()?;

    head.prev_hash = transaction.hash.clone();
    head.last_timestamp = timestamp;

    tracing::info!(
        invoice_id = %invoice_id,
        hash = %transaction.hash,
        "sealed invoice into verification chain"
    );
    Ok(transaction)
}

// ============================================================================
// VERIFICATION
// ============================================================================

/// Recompute every hash from genesis and compare against the stored chain.
///
/// Read-only. Reports the first divergence: either a `prev_hash` that does
/// not match the predecessor's stored hash, or a stored hash that no longer
/// matches its recomputed payload digest.
pub fn verify_chain(chain: &[VerifiedTransaction]) -> Result<(), LedgerError> {
    let mut prev_hash = GENESIS_HASH;

    for (index, tx) in chain.iter().enumerate() {
        if tx.prev_hash != prev_hash {
            return Err(LedgerError::ChainIntegrity {
                index,
                transaction_id: tx.id,
                reason: format!(
                    "previous-hash link broken: expected {prev_hash}, found {}",
                    tx.prev_hash
                ),
            });
        }

        let recomputed = recompute_hash(tx);
        if tx.hash != recomputed {
            return Err(LedgerError::ChainIntegrity {
                index,
                transaction_id: tx.id,
                reason: format!(
                    "stored hash does not match payload: expected {recomputed}, found {}",
                    tx.hash
                ),
            });
        }

        prev_hash = &tx.hash;
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
