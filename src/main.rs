use anyhow::Result;
use std::env;
use std::path::PathBuf;

// Use library instead of local modules
use quadledger::{db, verify_chain};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init()?,
        Some("verify") => run_verify()?,
        Some("stats") | None => run_stats()?,
        Some(other) => {
            eprintln!("Unknown command: {other}");
            eprintln!("Usage: quadledger [init|verify|stats]");
            std::process::exit(2);
        }
    }

    Ok(())
}

fn db_path() -> PathBuf {
    env::var("QUADLEDGER_DB")
        .unwrap_or_else(|_| "quadledger.db".to_string())
        .into()
}

fn run_init() -> Result<()> {
    println!("QuadLedger - Database Init");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let path = db_path();
    db::open_database(&path)?;
    println!("✓ Database initialized with WAL mode: {path:?}");

    Ok(())
}

fn run_verify() -> Result<()> {
    println!("QuadLedger - Chain Verification");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let path = db_path();
    if !path.exists() {
        eprintln!("Database not found at {path:?}");
        eprintln!("   Run: quadledger init");
        std::process::exit(1);
    }

    let conn = db::open_database(&path)?;
    let chain = db::get_chain(&conn)?;
    println!("✓ Loaded {} verified transactions", chain.len());

    match verify_chain(&chain) {
        Ok(()) => {
            println!("✓ Chain intact: every hash recomputes from genesis");
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ {e}");
            std::process::exit(1);
        }
    }
}

fn run_stats() -> Result<()> {
    println!("QuadLedger - Ledger Stats");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━");

    let path = db_path();
    if !path.exists() {
        eprintln!("Database not found at {path:?}");
        eprintln!("   Run: quadledger init");
        std::process::exit(1);
    }

    let conn = db::open_database(&path)?;
    let dashboard = quadledger::summarize(&conn)?;
    let summary = &dashboard.summary;

    println!("✓ Invoices:              {}", summary.total_invoices);
    println!("✓ Total amount:          {}", summary.total_amount);
    println!("✓ Verified transactions: {}", summary.verified_transactions);
    println!("✓ Impact entries:        {}", summary.impact_entries);
    println!("✓ Total CO2 (tons):      {}", summary.total_co2_emissions);
    println!("✓ Avg labor score:       {}", summary.avg_labor_score);

    Ok(())
}
