// Account Classifier - rules as data
//
// Maps an invoice's description/supplier onto ledger accounts and
// debit/credit roles. Deterministic: rules are tried in descending
// priority and the first keyword hit wins.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::LedgerError;
use crate::model::{ChartOfAccounts, EntrySide, Invoice};

// ============================================================================
// RULE DEFINITION
// ============================================================================

/// One classification rule: if any keyword appears in the invoice text,
/// debit the named account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Rule ID for tracking
    pub id: String,

    /// Keywords matched case-insensitively against description then supplier
    pub keywords: Vec<String>,

    /// Account slug to debit
    pub account: String,

    /// Priority (higher = tried first)
    #[serde(default)]
    pub priority: i32,
}

impl ClassificationRule {
    /// Check whether any keyword occurs in the given text.
    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(&k.to_lowercase()))
    }
}

// ============================================================================
// ALLOCATIONS
// ============================================================================

/// One (account, role, amount) slice of an invoice. The classifier emits
/// these in debit-then-credit order with equal totals on both sides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountAllocation {
    pub account: String,
    pub side: EntrySide,
    pub amount: Decimal,
}

// ============================================================================
// RULE SET
// ============================================================================

/// The classifier's rule table plus the fixed credit side.
///
/// Most invoices create payables, so every allocation credits
/// `credit_account` for the full amount. `fallback_account` is the
/// catch-all debit target; a rule set without one can fail with
/// `UnclassifiableInvoice`, in which case the caller keeps the invoice
/// persisted unposted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<ClassificationRule>,
    credit_account: String,
    fallback_account: Option<String>,
}

impl RuleSet {
    pub fn new(
        mut rules: Vec<ClassificationRule>,
        credit_account: impl Into<String>,
        fallback_account: Option<String>,
    ) -> Self {
        // Sort by priority (higher first)
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        RuleSet {
            rules,
            credit_account: credit_account.into(),
            fallback_account,
        }
    }

    /// Load a rule set from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            LedgerError::validation("rules", format!("cannot read {:?}: {e}", path.as_ref()))
        })?;
        let set: RuleSet = serde_json::from_str(&content)
            .map_err(|e| LedgerError::validation("rules", format!("invalid rules JSON: {e}")))?;
        Ok(RuleSet::new(set.rules, set.credit_account, set.fallback_account))
    }

    /// The stock rule table: expense keyword buckets debiting expense
    /// accounts, everything else falling through to general expenses,
    /// always crediting accounts payable.
    pub fn standard() -> Self {
        let rule = |id: &str, keywords: &[&str], account: &str, priority: i32| {
            ClassificationRule {
                id: id.to_string(),
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                account: account.to_string(),
                priority,
            }
        };

        RuleSet::new(
            vec![
                rule(
                    "office",
                    &["office", "supplies", "equipment", "software"],
                    "office-expenses",
                    10,
                ),
                rule(
                    "inventory",
                    &["inventory", "materials", "goods"],
                    "inventory",
                    10,
                ),
                rule(
                    "services",
                    &["service", "consulting", "professional"],
                    "professional-services",
                    10,
                ),
            ],
            "accounts-payable",
            Some("general-expenses".to_string()),
        )
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Classify an invoice into balanced account allocations.
    ///
    /// The matched rule's account is debited for the full amount and the
    /// credit account is credited for the full amount, so debit and credit
    /// shares are equal by construction. Accounts are looked up in the
    /// chart, never created.
    pub fn classify(
        &self,
        invoice: &Invoice,
        chart: &ChartOfAccounts,
    ) -> Result<Vec<AccountAllocation>, LedgerError> {
        let text = format!("{} {}", invoice.description, invoice.supplier);

        let debit_account = self
            .rules
            .iter()
            .find(|rule| rule.matches(&text))
            .map(|rule| rule.account.as_str())
            .or(self.fallback_account.as_deref())
            .ok_or_else(|| LedgerError::UnclassifiableInvoice {
                invoice_id: invoice.id,
                supplier: invoice.supplier.clone(),
            })?;

        for account in [debit_account, self.credit_account.as_str()] {
            if chart.get(account).is_none() {
                return Err(LedgerError::validation(
                    "account",
                    format!("rule references unknown account {account}"),
                ));
            }
        }

        Ok(vec![
            AccountAllocation {
                account: debit_account.to_string(),
                side: EntrySide::Debit,
                amount: invoice.amount,
            },
            AccountAllocation {
                account: self.credit_account.clone(),
                side: EntrySide::Credit,
                amount: invoice.amount,
            },
        ])
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{FileKind, SourceFileRef};
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn invoice(supplier: &str, description: &str, amount: Decimal) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            supplier: supplier.to_string(),
            description: description.to_string(),
            amount,
            currency: crate::model::Currency::Usd,
            source_file: SourceFileRef {
                filename: "invoice.pdf".to_string(),
                kind: FileKind::Pdf,
                size_bytes: 100,
            },
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_keyword_routes_to_office_expenses() {
        let set = RuleSet::standard();
        let chart = ChartOfAccounts::standard();
        let allocations = set
            .classify(&invoice("Acme", "Software licenses Q1", dec!(120.00)), &chart)
            .unwrap();

        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].account, "office-expenses");
        assert_eq!(allocations[0].side, EntrySide::Debit);
        assert_eq!(allocations[1].account, "accounts-payable");
        assert_eq!(allocations[1].side, EntrySide::Credit);
    }

    #[test]
    fn test_balanced_shares() {
        let set = RuleSet::standard();
        let chart = ChartOfAccounts::standard();
        let allocations = set
            .classify(&invoice("Acme", "consulting retainer", dec!(99.95)), &chart)
            .unwrap();

        let debits: Decimal = allocations
            .iter()
            .filter(|a| a.side == EntrySide::Debit)
            .map(|a| a.amount)
            .sum();
        let credits: Decimal = allocations
            .iter()
            .filter(|a| a.side == EntrySide::Credit)
            .map(|a| a.amount)
            .sum();
        assert_eq!(debits, credits);
    }

    #[test]
    fn test_fallback_catches_unmatched() {
        let set = RuleSet::standard();
        let chart = ChartOfAccounts::standard();
        let allocations = set
            .classify(&invoice("Mystery Vendor", "miscellaneous", dec!(10)), &chart)
            .unwrap();
        assert_eq!(allocations[0].account, "general-expenses");
    }

    #[test]
    fn test_no_fallback_is_unclassifiable() {
        let set = RuleSet::new(
            vec![ClassificationRule {
                id: "office".to_string(),
                keywords: vec!["office".to_string()],
                account: "office-expenses".to_string(),
                priority: 0,
            }],
            "accounts-payable",
            None,
        );
        let chart = ChartOfAccounts::standard();
        let err = set
            .classify(&invoice("Mystery Vendor", "miscellaneous", dec!(10)), &chart)
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnclassifiableInvoice { .. }));
    }

    #[test]
    fn test_priority_order() {
        let mk = |id: &str, keyword: &str, account: &str, priority: i32| ClassificationRule {
            id: id.to_string(),
            keywords: vec![keyword.to_string()],
            account: account.to_string(),
            priority,
        };
        let set = RuleSet::new(
            vec![
                mk("generic", "software", "general-expenses", 1),
                mk("specific", "software", "office-expenses", 100),
            ],
            "accounts-payable",
            None,
        );
        let chart = ChartOfAccounts::standard();
        let allocations = set
            .classify(&invoice("Acme", "software subscription", dec!(50)), &chart)
            .unwrap();
        assert_eq!(allocations[0].account, "office-expenses");
    }

    #[test]
    fn test_unknown_account_rejected() {
        let set = RuleSet::new(
            vec![],
            "accounts-payable",
            Some("petty-cash".to_string()),
        );
        let chart = ChartOfAccounts::standard();
        let err = set
            .classify(&invoice("Acme", "anything", dec!(10)), &chart)
            .unwrap_err();
        assert!(err.is_validation());
    }
}
