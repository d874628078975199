// healthdq/src/output.rs
//
// Terminal rendering shared by the commands.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use std::path::Path;

use healthdq_core::application::{MetricsReport, RunArtifacts};
use healthdq_core::domain::audit::AuditEntry;
use healthdq_core::domain::correction::Correction;

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// `+18.75%`, `-50%`, or `n/a` when the before value was zero.
pub fn format_delta(delta_pct: Option<f64>) -> String {
    match delta_pct {
        Some(d) if d > 0.0 => format!("+{}%", d),
        Some(d) => format!("{}%", d),
        None => "n/a".to_string(),
    }
}

pub fn metrics_table(report: &MetricsReport) -> Table {
    let mut t = table(vec!["Metric", "Before", "After", "Delta"]);
    for d in &report.delta {
        t.add_row(vec![
            Cell::new(d.metric),
            Cell::new(format!("{:.4}", d.before)),
            Cell::new(format!("{:.4}", d.after)),
            Cell::new(format_delta(d.delta_pct)),
        ]);
    }
    t
}

pub fn pending_table(pending: &[Correction]) -> Table {
    let mut t = table(vec![
        "Id", "Record", "Field", "Original", "Proposed", "Strategy", "Depends on",
    ]);
    for c in pending {
        let deps: Vec<String> = c.depends_on.iter().map(ToString::to_string).collect();
        t.add_row(vec![
            Cell::new(c.id),
            Cell::new(&c.record_id),
            Cell::new(&c.field),
            Cell::new(&c.original_value),
            Cell::new(&c.proposed_value),
            Cell::new(c.strategy),
            Cell::new(deps.join(", ")),
        ]);
    }
    t
}

pub fn history_table(entries: &[&AuditEntry]) -> Table {
    let mut t = table(vec![
        "Seq", "Run", "Correction", "Record", "Field", "Status", "Value", "By", "Supersedes",
    ]);
    for e in entries {
        let c = &e.correction;
        let value = c
            .applied_value()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        t.add_row(vec![
            Cell::new(e.seq),
            Cell::new(&e.calc_version.run_id),
            Cell::new(c.id),
            Cell::new(&c.record_id),
            Cell::new(&c.field),
            Cell::new(c.status),
            Cell::new(value),
            Cell::new(e.decided_by),
            Cell::new(e.supersedes.map_or_else(String::new, |s| s.to_string())),
        ]);
    }
    t
}

pub fn print_done(artifacts: &RunArtifacts, out: &Path) {
    let meta = &artifacts.metadata;
    println!("\n📊 Quality metrics ({} records)", meta.record_count);
    println!("{}", metrics_table(&artifacts.metrics));
    println!(
        "   Violations: {} | Unresolved: {} | Corrections: {} accepted, {} overridden, {} rejected, {} left proposed",
        meta.violations,
        meta.unresolved,
        meta.corrections.accepted,
        meta.corrections.overridden,
        meta.corrections.rejected,
        meta.corrections.proposed,
    );
    println!("   calc_version: {}", meta.calc_version);
    println!("\n✨ SUCCESS! Artifacts written to {}", out.display());
}

pub fn print_waiting(pending: &[Correction], out: &Path) {
    println!("\n⏸️  {} corrections waiting for review", pending.len());
    println!("{}", pending_table(pending));
    println!(
        "👉 healthdq decide <id> --status accept|override|reject [--value V] --out {}",
        out.display()
    );
    println!("👉 then: healthdq resume --out {}", out.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_formatting() {
        assert_eq!(format_delta(Some(18.75)), "+18.75%");
        assert_eq!(format_delta(Some(-50.0)), "-50%");
        assert_eq!(format_delta(None), "n/a");
    }
}
