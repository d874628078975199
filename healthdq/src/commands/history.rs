// healthdq/src/commands/history.rs
//
// USE CASE: Inspect the audit ledger.

use anyhow::Context;
use std::path::PathBuf;

use healthdq_core::domain::audit::AuditEntry;
use healthdq_core::infrastructure::store::load_ledger;

use crate::output;

pub fn execute(
    ledger: PathBuf,
    record: Option<String>,
    field: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    if !ledger.exists() {
        anyhow::bail!(
            "❌ Ledger not found at: {}\n👉 Have you run 'healthdq run'?",
            ledger.display()
        );
    }
    let book = load_ledger(&ledger).with_context(|| format!("Failed to read {:?}", ledger))?;

    let entries: Vec<&AuditEntry> = book
        .entries()
        .filter(|e| record.as_deref().is_none_or(|r| e.correction.record_id.0 == r))
        .filter(|e| field.as_deref().is_none_or(|f| e.correction.field == f))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("\n📜 {} of {} ledger entries", entries.len(), book.len());
    if let (Some(r), Some(f)) = (&record, &field)
        && let Some(active) = book.active(&r.as_str().into(), f)
    {
        println!(
            "   Active value: seq {} ({})",
            active.seq, active.correction.status
        );
    }
    println!("{}", output::history_table(&entries));
    Ok(())
}
