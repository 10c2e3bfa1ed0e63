// Core domain types: invoices, accounts, ledger entries, verified
// transactions, impact entries.
//
// Loose typing from extraction stops at the normalizer; everything in this
// module is strongly typed and validated at construction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::intake::SourceFileRef;

/// Root of the verification chain: the `prev_hash` of the first sealed
/// transaction. Hash-width so stored chains stay uniformly hex.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

// ============================================================================
// CURRENCY
// ============================================================================

/// Supported currency codes.
///
/// Minor-unit exponents drive amount-scale validation and the balance
/// tolerance. Unknown codes fall back to `Other` with two minor units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Jpy,
    Mxn,
    /// Any other alphabetic code
    Other(String),
}

impl Currency {
    pub fn code(&self) -> &str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Jpy => "JPY",
            Currency::Mxn => "MXN",
            Currency::Other(s) => s.as_str(),
        }
    }

    /// Number of decimal places in the currency's minor unit.
    pub fn minor_units(&self) -> u32 {
        match self {
            Currency::Jpy => 0,
            _ => 2,
        }
    }

    /// One minor unit as a decimal (e.g. 0.01 for USD). Used as the
    /// rounding tolerance for the balance invariant.
    pub fn minor_unit(&self) -> Decimal {
        Decimal::new(1, self.minor_units())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyParseError(pub String);

impl fmt::Display for CurrencyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid currency code: {}", self.0)
    }
}

impl std::error::Error for CurrencyParseError {}

impl FromStr for Currency {
    type Err = CurrencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();

        if s.is_empty() || s.len() > 10 || !s.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CurrencyParseError(s));
        }

        Ok(match s.as_str() {
            "USD" => Currency::Usd,
            "EUR" => Currency::Eur,
            "GBP" => Currency::Gbp,
            "JPY" => Currency::Jpy,
            "MXN" => Currency::Mxn,
            _ => Currency::Other(s),
        })
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.code().to_string()
    }
}

// ============================================================================
// ACCOUNTS
// ============================================================================

/// Flat account-type vocabulary. The account set is fixed reference data,
/// not an extensible hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Expense,
    Revenue,
    Equity,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Expense => "expense",
            AccountType::Revenue => "revenue",
            AccountType::Equity => "equity",
        }
    }
}

/// Static reference data: one ledger account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Stable slug used as the foreign key in ledger entries
    pub id: String,
    /// Human label for display
    pub label: String,
    pub account_type: AccountType,
}

/// The fixed chart of accounts. The classifier looks accounts up here and
/// never creates them implicitly.
#[derive(Debug, Clone)]
pub struct ChartOfAccounts {
    accounts: Vec<Account>,
}

impl ChartOfAccounts {
    pub fn new(accounts: Vec<Account>) -> Self {
        ChartOfAccounts { accounts }
    }

    /// The default chart: the expense accounts the classifier targets plus
    /// the payables account credited on every invoice.
    pub fn standard() -> Self {
        let account = |id: &str, label: &str, account_type| Account {
            id: id.to_string(),
            label: label.to_string(),
            account_type,
        };

        ChartOfAccounts::new(vec![
            account("office-expenses", "Office Expenses", AccountType::Expense),
            account("inventory", "Inventory", AccountType::Expense),
            account(
                "professional-services",
                "Professional Services",
                AccountType::Expense,
            ),
            account("general-expenses", "General Expenses", AccountType::Expense),
            account("accounts-payable", "Accounts Payable", AccountType::Liability),
        ])
    }

    pub fn get(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }
}

// ============================================================================
// INVOICE
// ============================================================================

/// A normalized invoice. Immutable after normalization, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    /// Issue date from the invoice document
    pub date: NaiveDate,
    pub supplier: String,
    #[serde(default)]
    pub description: String,
    /// Non-negative, at most the currency's minor-unit scale
    pub amount: Decimal,
    pub currency: Currency,
    pub source_file: SourceFileRef,
    pub uploaded_at: DateTime<Utc>,
}

// ============================================================================
// LEDGER ENTRIES
// ============================================================================

/// Debit or credit. Closed vocabulary, serialized lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySide::Debit => "debit",
            EntrySide::Credit => "credit",
        }
    }

    /// The side a reversing entry takes.
    pub fn opposite(&self) -> EntrySide {
        match self {
            EntrySide::Debit => EntrySide::Credit,
            EntrySide::Credit => EntrySide::Debit,
        }
    }
}

impl FromStr for EntrySide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(EntrySide::Debit),
            "credit" => Ok(EntrySide::Credit),
            other => Err(format!("unknown entry side: {other}")),
        }
    }
}

/// One half of a double-entry pair. Created in balanced sets per invoice;
/// read-only once `sealed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub invoice_id: Uuid,
    /// Account slug from the chart of accounts
    pub account: String,
    pub date: NaiveDate,
    /// Strictly positive; the side carries the sign semantics
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub side: EntrySide,
    pub sealed: bool,
}

// ============================================================================
// VERIFIED TRANSACTIONS
// ============================================================================

/// One sealed link of the hash chain. Immutable from creation; insertion
/// order is chain order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedTransaction {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub supplier: String,
    pub amount: Decimal,
    /// Assigned at sealing time, non-decreasing along the chain
    pub timestamp: DateTime<Utc>,
    /// Predecessor's hash, or `GENESIS_HASH` for the first link
    pub prev_hash: String,
    /// SHA-256 over the canonical payload, hex encoded
    pub hash: String,
}

// ============================================================================
// IMPACT ENTRIES
// ============================================================================

/// ESG metrics linked to an invoice. One per invoice, last-write-wins.
/// Does not participate in the hash chain or the balance invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactEntry {
    pub id: Uuid,
    pub invoice_id: Uuid,
    /// Liters
    pub water_usage: f64,
    /// Tons
    pub co2_emissions: f64,
    /// 1-10
    pub labor_score: u8,
    /// Percent, 0-100
    pub recycling_rate: f64,
    pub recorded_at: DateTime<Utc>,
}

// ============================================================================
// TESTS
// ============================================================================
