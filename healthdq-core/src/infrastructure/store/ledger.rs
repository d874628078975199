// healthdq-core/src/infrastructure/store/ledger.rs

use std::path::Path;
use tracing::{info, instrument};

use crate::domain::audit::AuditLedger;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::read_json;

/// Reads a `ledger.json` written by an earlier run. A missing file is an empty ledger.
#[instrument]
pub fn load_ledger(path: &Path) -> Result<AuditLedger, InfrastructureError> {
    let ledger: AuditLedger = read_json(path)?.unwrap_or_default();
    info!(entries = ledger.len(), "Ledger loaded");
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::CalcVersion;
    use crate::domain::correction::{Correction, CorrectionId, DecidedBy, Decision, Dimension, Strategy};
    use crate::domain::dataset::Value;
    use crate::infrastructure::fs::write_json;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_ledger_survives_the_filesystem() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("ledger.json");
        assert!(load_ledger(&path)?.is_empty());

        let mut c = Correction::propose(
            CorrectionId(1),
            "p1".into(),
            "height_cm",
            0,
            Dimension::Completeness,
            Value::Null,
            Value::Number(170.0),
            Strategy::Median,
            vec![],
        );
        c.decide(Decision::Accept, DecidedBy::Automatic)?;
        let mut ledger = AuditLedger::new();
        ledger.record(&c, DecidedBy::Automatic, &CalcVersion::new("1", "abc", "r1"))?;
        write_json(&path, &ledger)?;

        let back = load_ledger(&path)?;
        assert_eq!(back, ledger);
        assert!(back.active(&"p1".into(), "height_cm").is_some());
        Ok(())
    }
}
