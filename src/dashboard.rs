// Dashboard Aggregator - derived, never persisted
//
// Pure read/reduce over the invoice, chain, and impact stores. Recomputed
// on demand; the only failure mode is a store error.

use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db;
use crate::error::LedgerError;
use crate::model::Invoice;

/// Size of the most-recent-invoices window.
pub const RECENT_WINDOW: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total_invoices: usize,
    pub total_amount: Decimal,
    pub verified_transactions: usize,
    pub impact_entries: usize,
    pub total_co2_emissions: f64,
    /// Mean over invoices that have an impact entry; invoices without one
    /// are excluded, not counted as zero. 0.0 when no impact data exists.
    pub avg_labor_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub summary: DashboardSummary,
    pub recent_invoices: Vec<Invoice>,
}

/// Compute the dashboard from the stores.
pub fn summarize(conn: &Connection) -> Result<Dashboard, LedgerError> {
    // Newest first already; the recent window is a prefix
    let invoices = db::get_all_invoices(conn)?;
    let impact_entries = db::get_all_impact_entries(conn)?;
    let verified = db::count_verified_transactions(conn)? as usize;

    let total_amount: Decimal = invoices.iter().map(|i| i.amount).sum();
    let total_co2_emissions: f64 = impact_entries.iter().map(|e| e.co2_emissions).sum();

    let avg_labor_score = if impact_entries.is_empty() {
        0.0
    } else {
        let total: f64 = impact_entries.iter().map(|e| f64::from(e.labor_score)).sum();
        let mean = total / impact_entries.len() as f64;
        (mean * 10.0).round() / 10.0
    };

    let summary = DashboardSummary {
        total_invoices: invoices.len(),
        total_amount,
        verified_transactions: verified,
        impact_entries: impact_entries.len(),
        total_co2_emissions,
        avg_labor_score,
    };

    let recent_invoices = invoices.into_iter().take(RECENT_WINDOW).collect();

    Ok(Dashboard {
        summary,
        recent_invoices,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impact::{link_impact, ImpactMetrics};
    use crate::intake::{FileKind, SourceFileRef};
    use crate::model::Currency;
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        conn
    }

    fn add_invoice(conn: &Connection, supplier: &str, amount: Decimal, age_minutes: i64) -> Uuid {
        let invoice = Invoice {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            supplier: supplier.to_string(),
            description: String::new(),
            amount,
            currency: Currency::Usd,
            source_file: SourceFileRef {
                filename: "invoice.pdf".to_string(),
                kind: FileKind::Pdf,
                size_bytes: 100,
            },
            uploaded_at: Utc::now() - Duration::minutes(age_minutes),
        };
        db::insert_invoice(conn, &invoice).unwrap();
        invoice.id
    }

    fn impact(labor_score: i64, co2: f64) -> ImpactMetrics {
        ImpactMetrics {
            water_usage: 0.0,
            co2_emissions: co2,
            labor_score,
            recycling_rate: 0.0,
        }
    }

    #[test]
    fn test_totals() {
        let conn = test_db();
        add_invoice(&conn, "Acme", dec!(120.00), 2);
        add_invoice(&conn, "Globex", dec!(30.50), 1);

        let dashboard = summarize(&conn).unwrap();
        assert_eq!(dashboard.summary.total_invoices, 2);
        assert_eq!(dashboard.summary.total_amount, dec!(150.50));
        assert_eq!(dashboard.summary.verified_transactions, 0);
    }

    #[test]
    fn test_avg_labor_score_excludes_missing_entries() {
        let conn = test_db();
        let with_impact_a = add_invoice(&conn, "Acme", dec!(10), 3);
        let with_impact_b = add_invoice(&conn, "Globex", dec!(10), 2);
        add_invoice(&conn, "Initech", dec!(10), 1); // no impact entry

        link_impact(&conn, with_impact_a, &impact(4, 1.0)).unwrap();
        link_impact(&conn, with_impact_b, &impact(8, 0.5)).unwrap();

        let dashboard = summarize(&conn).unwrap();
        // (4 + 8) / 2, not (4 + 8 + 0) / 3
        assert_eq!(dashboard.summary.avg_labor_score, 6.0);
        assert_eq!(dashboard.summary.impact_entries, 2);
        assert_eq!(dashboard.summary.total_co2_emissions, 1.5);
    }

    #[test]
    fn test_avg_labor_score_zero_without_data() {
        let conn = test_db();
        add_invoice(&conn, "Acme", dec!(10), 1);
        let dashboard = summarize(&conn).unwrap();
        assert_eq!(dashboard.summary.avg_labor_score, 0.0);
    }

    #[test]
    fn test_recent_window_is_bounded_and_newest_first() {
        let conn = test_db();
        for age in 0..15 {
            add_invoice(&conn, &format!("Supplier {age}"), dec!(1), age);
        }

        let dashboard = summarize(&conn).unwrap();
        assert_eq!(dashboard.recent_invoices.len(), RECENT_WINDOW);
        assert_eq!(dashboard.recent_invoices[0].supplier, "Supplier 0");
        for pair in dashboard.recent_invoices.windows(2) {
            assert!(pair[0].uploaded_at >= pair[1].uploaded_at);
        }
    }
}
