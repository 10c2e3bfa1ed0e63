// QuadLedger - Core Library
// Exposes all engine modules for use in the CLI, API server, and tests

pub mod chain;
pub mod classifier;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod impact;
pub mod intake;
pub mod ledger;
pub mod model;
pub mod normalizer;
pub mod pipeline;

// Re-export commonly used types
pub use chain::{seal_invoice, verify_chain, ChainSequencer};
pub use classifier::{AccountAllocation, ClassificationRule, RuleSet};
pub use dashboard::{summarize, Dashboard, DashboardSummary};
pub use error::LedgerError;
pub use impact::{link_impact, ImpactMetrics};
pub use intake::{
    check_upload, detect_file_kind, FallbackExtractor, FieldExtractor, FileKind, RawInvoice,
    SourceFileRef, MAX_UPLOAD_BYTES,
};
pub use ledger::{post_invoice, post_reversal};
pub use model::{
    Account, AccountType, ChartOfAccounts, Currency, EntrySide, ImpactEntry, Invoice,
    LedgerEntry, VerifiedTransaction, GENESIS_HASH,
};
pub use normalizer::normalize;
pub use pipeline::{process_upload, ProcessedInvoice};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
