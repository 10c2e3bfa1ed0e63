// Impact Linker - ESG metrics keyed to invoices
//
// Independent of the ledger and the chain: linking impact data never
// touches balances or hashes.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db;
use crate::error::LedgerError;
use crate::model::ImpactEntry;

/// Submitted ESG metrics, before range validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactMetrics {
    /// Liters
    #[serde(default)]
    pub water_usage: f64,
    /// Tons
    #[serde(default)]
    pub co2_emissions: f64,
    /// 1-10
    pub labor_score: i64,
    /// Percent, 0-100
    #[serde(default)]
    pub recycling_rate: f64,
}

fn validate(metrics: &ImpactMetrics) -> Result<(), LedgerError> {
    if !metrics.water_usage.is_finite() || metrics.water_usage < 0.0 {
        return Err(LedgerError::validation(
            "water_usage",
            format!("must be >= 0 liters, got {}", metrics.water_usage),
        ));
    }
    if !metrics.co2_emissions.is_finite() || metrics.co2_emissions < 0.0 {
        return Err(LedgerError::validation(
            "co2_emissions",
            format!("must be >= 0 tons, got {}", metrics.co2_emissions),
        ));
    }
    if !(1..=10).contains(&metrics.labor_score) {
        return Err(LedgerError::validation(
            "labor_score",
            format!("must be between 1 and 10, got {}", metrics.labor_score),
        ));
    }
    if !metrics.recycling_rate.is_finite()
        || !(0.0..=100.0).contains(&metrics.recycling_rate)
    {
        return Err(LedgerError::validation(
            "recycling_rate",
            format!("must be a percentage 0-100, got {}", metrics.recycling_rate),
        ));
    }
    Ok(())
}

/// Attach (or replace) the impact entry for an invoice.
///
/// Ranges are validated before any store mutation. Upserts are keyed by
/// invoice id: a second submission replaces the first, last-write-wins,
/// no history kept.
pub fn link_impact(
    conn: &Connection,
    invoice_id: Uuid,
    metrics: &ImpactMetrics,
) -> Result<ImpactEntry, LedgerError> {
    validate(metrics)?;

    if db::get_invoice(conn, invoice_id)?.is_none() {
        return Err(LedgerError::InvoiceNotFound(invoice_id));
    }

    let entry = ImpactEntry {
        id: Uuid::new_v4(),
        invoice_id,
        water_usage: metrics.water_usage,
        co2_emissions: metrics.co2_emissions,
        labor_score: metrics.labor_score as u8,
        recycling_rate: metrics.recycling_rate,
        recorded_at: Utc::now(),
    };

    let stored = db::upsert_impact_entry(conn, &entry)?;
    tracing::debug!(invoice_id = %invoice_id, "linked impact entry");
    Ok(stored)
}

// ============================================================================
// TESTS
// ============================================================================
