use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{FunJumper, FunJumperId, Tickets};

/// A fun-jumper whose cached balance disagrees with the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDrift {
    pub funjumper_id: FunJumperId,
    pub name: String,
    pub cached: Tickets,
    pub ledger: Tickets,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub fun_jumper_count: usize,
    pub entry_count: i64,
    pub drifts: Vec<BalanceDrift>,
    /// Entries whose subject columns are not exactly one non-null reference.
    pub malformed_subjects: i64,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Compare cached balances with ledger sums. Jumpers missing from
/// `ledger_balances` have no qualifying entries and must be at zero.
pub fn build_integrity_report(
    jumpers: &[FunJumper],
    ledger_balances: &HashMap<FunJumperId, Tickets>,
    entry_count: i64,
    malformed_subjects: i64,
) -> IntegrityReport {
    let drifts: Vec<BalanceDrift> = jumpers
        .iter()
        .filter_map(|jumper| {
            let ledger = ledger_balances.get(&jumper.id).copied().unwrap_or(0);
            (ledger != jumper.jump_ticket_balance).then(|| BalanceDrift {
                funjumper_id: jumper.id,
                name: jumper.full_name(),
                cached: jumper.jump_ticket_balance,
                ledger,
            })
        })
        .collect();

    let mut issues = Vec::new();
    for drift in &drifts {
        issues.push(format!(
            "{} (#{}) has cached balance {} but ledger says {}",
            drift.name, drift.funjumper_id, drift.cached, drift.ledger
        ));
    }
    if malformed_subjects > 0 {
        issues.push(format!(
            "{} ledger entries do not reference exactly one subject",
            malformed_subjects
        ));
    }

    IntegrityReport {
        fun_jumper_count: jumpers.len(),
        entry_count,
        drifts,
        malformed_subjects,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn jumper(id: FunJumperId, balance: Tickets) -> FunJumper {
        FunJumper {
            id,
            first_name: "Test".into(),
            last_name: format!("Jumper{}", id),
            license_number: None,
            email: None,
            jump_ticket_balance: balance,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_consistent_ledger_is_healthy() {
        let jumpers = vec![jumper(1, 4), jumper(2, 0)];
        let balances = HashMap::from([(1, 4)]);

        let report = build_integrity_report(&jumpers, &balances, 5, 0);

        assert!(report.is_healthy());
        assert!(report.drifts.is_empty());
        assert_eq!(report.fun_jumper_count, 2);
    }

    #[test]
    fn test_drift_is_reported() {
        let jumpers = vec![jumper(1, 10), jumper(2, 3)];
        let balances = HashMap::from([(1, 9)]);

        let report = build_integrity_report(&jumpers, &balances, 2, 0);

        assert!(!report.is_healthy());
        assert_eq!(report.drifts.len(), 2);
        assert_eq!(report.drifts[0].ledger, 9);
        assert_eq!(report.drifts[1].ledger, 0);
    }

    #[test]
    fn test_malformed_subjects_are_reported() {
        let report = build_integrity_report(&[], &HashMap::new(), 1, 1);
        assert!(!report.is_healthy());
        assert_eq!(report.issues.len(), 1);
    }
}
