// Invoice Normalizer - untyped extraction payload -> validated Invoice
//
// Every field is checked here; a failure names the offending field and
// nothing is persisted. Construction only, no side effects.

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::intake::{RawInvoice, SourceFileRef};
use crate::model::{Currency, Invoice};

/// Validate and canonicalize a raw extracted payload into an `Invoice`.
///
/// Rules:
/// - `date` must parse as a `%Y-%m-%d` calendar date
/// - `amount` must be a non-negative decimal with at most the currency's
///   minor-unit precision
/// - `supplier` must be non-empty after trimming
/// - `currency` defaults to USD when absent
/// - `description` defaults to empty
pub fn normalize(raw: &RawInvoice, source: SourceFileRef) -> Result<Invoice, LedgerError> {
    let currency = parse_currency(raw)?;
    let date = parse_date(raw)?;
    let supplier = parse_supplier(raw)?;
    let amount = parse_amount(raw, &currency)?;

    let description = raw
        .get_str("description")
        .unwrap_or_default()
        .trim()
        .to_string();

    Ok(Invoice {
        id: Uuid::new_v4(),
        date,
        supplier,
        description,
        amount,
        currency,
        source_file: source,
        uploaded_at: Utc::now(),
    })
}

fn parse_date(raw: &RawInvoice) -> Result<NaiveDate, LedgerError> {
    let text = raw
        .get_str("date")
        .ok_or_else(|| LedgerError::validation("date", "missing"))?;

    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| LedgerError::validation("date", format!("not a YYYY-MM-DD date: {text}")))
}

fn parse_supplier(raw: &RawInvoice) -> Result<String, LedgerError> {
    let supplier = raw
        .get_str("supplier")
        .map(str::trim)
        .unwrap_or_default();

    if supplier.is_empty() {
        return Err(LedgerError::validation("supplier", "must be non-empty"));
    }

    Ok(supplier.to_string())
}

fn parse_currency(raw: &RawInvoice) -> Result<Currency, LedgerError> {
    match raw.get("currency") {
        None | Some(Value::Null) => Ok(Currency::Usd),
        Some(Value::String(code)) => code
            .parse()
            .map_err(|e| LedgerError::validation("currency", format!("{e}"))),
        Some(other) => Err(LedgerError::validation(
            "currency",
            format!("expected a currency code string, got {other}"),
        )),
    }
}

fn parse_amount(raw: &RawInvoice, currency: &Currency) -> Result<Decimal, LedgerError> {
    let value = raw
        .get("amount")
        .ok_or_else(|| LedgerError::validation("amount", "missing"))?;

    let amount = match value {
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                Decimal::from(int)
            } else {
                n.as_f64()
                    .and_then(Decimal::from_f64)
                    .ok_or_else(|| {
                        LedgerError::validation("amount", format!("not a finite number: {n}"))
                    })?
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| LedgerError::validation("amount", format!("not a decimal: {s}")))?,
        other => {
            return Err(LedgerError::validation(
                "amount",
                format!("expected a number, got {other}"),
            ))
        }
    };

    if amount.is_sign_negative() {
        return Err(LedgerError::validation(
            "amount",
            format!("must be non-negative, got {amount}"),
        ));
    }

    let amount = amount.normalize();
    if amount.scale() > currency.minor_units() {
        return Err(LedgerError::validation(
            "amount",
            format!(
                "{amount} has more precision than {} allows ({} minor units)",
                currency.code(),
                currency.minor_units()
            ),
        ));
    }

    Ok(amount)
}

// ============================================================================
// TESTS
// ============================================================================
