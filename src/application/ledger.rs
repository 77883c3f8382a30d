use sqlx::sqlite::SqliteConnection;
use tracing::{debug, info, instrument, warn};

use crate::domain::{
    build_integrity_report, EntryId, EntryKind, FunJumper, FunJumperId, IntegrityReport,
    LedgerEntry, NewLedgerEntry, Subject, Tickets,
};
use crate::storage::{Repository, WriteTransaction};

use super::{AppError, DropzoneService};

/// An appended entry, plus the fun-jumper's refreshed balance when the
/// entry moved it.
#[derive(Debug, Clone)]
pub struct RecordedEntry {
    pub entry: LedgerEntry,
    pub ticket_balance: Option<Tickets>,
}

/// Cached and recomputed balance of one fun-jumper.
#[derive(Debug, Clone)]
pub struct TicketBalance {
    pub fun_jumper: FunJumper,
    pub cached: Tickets,
    pub ledger: Tickets,
}

impl TicketBalance {
    pub fn is_consistent(&self) -> bool {
        self.cached == self.ledger
    }
}

/// Append `entry` and, for a fun-jumper ticket entry, overwrite the cached
/// balance with a fresh ledger sum. Runs on the caller's transaction so that
/// the append, the balance and any surrounding manifest change commit together.
pub(super) async fn record_in(
    conn: &mut SqliteConnection,
    entry: &NewLedgerEntry,
) -> Result<RecordedEntry, AppError> {
    let appended = Repository::append_entry(conn, entry).await?;

    let ticket_balance = match entry.subject.fun_jumper() {
        Some(funjumper_id) if entry.moves_ticket_balance() => {
            let balance = Repository::ticket_balance_on(conn, funjumper_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("fun-jumper {}", funjumper_id)))?;
            Repository::store_ticket_balance(conn, funjumper_id, balance).await?;
            debug!(funjumper_id, balance, "refreshed cached ticket balance");
            Some(balance)
        }
        _ => None,
    };

    Ok(RecordedEntry {
        entry: appended,
        ticket_balance,
    })
}

/// Commit `tx` if `outcome` succeeded, otherwise roll it back.
pub(super) async fn finish<T>(
    tx: WriteTransaction,
    outcome: Result<T, AppError>,
) -> Result<T, AppError> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %format!("{:#}", rollback_err), "rollback failed");
            }
            Err(err)
        }
    }
}

fn check_quantity(quantity: Tickets) -> Result<(), AppError> {
    if quantity <= 0 {
        return Err(AppError::InvalidAmount(
            "Ticket quantity must be positive".to_string(),
        ));
    }
    Ok(())
}

impl DropzoneService {
    // ========================
    // Ledger operations
    // ========================

    /// Record a ledger entry atomically with its balance refresh.
    /// On any failure nothing is persisted.
    #[instrument(skip(self, entry), fields(subject = %entry.subject, kind = %entry.kind, amount = entry.amount))]
    pub async fn record(&self, entry: NewLedgerEntry) -> Result<RecordedEntry, AppError> {
        let mut tx = self.repo.begin().await?;
        let outcome = record_in(&mut tx, &entry).await;
        if let Err(err) = &outcome {
            warn!(error = %err, "ledger entry rolled back");
        }
        let recorded = finish(tx, outcome).await?;

        info!(
            entry_id = recorded.entry.id,
            balance = ?recorded.ticket_balance,
            "recorded ledger entry"
        );
        Ok(recorded)
    }

    /// Sell jump tickets to a fun-jumper.
    pub async fn buy_jump_tickets(
        &self,
        funjumper_id: FunJumperId,
        quantity: Tickets,
        notes: Option<String>,
    ) -> Result<RecordedEntry, AppError> {
        check_quantity(quantity)?;
        self.ticket_entry(funjumper_id, EntryKind::BuyJumpticket, quantity, notes)
            .await
    }

    /// Refund previously bought jump tickets.
    pub async fn cancel_jump_tickets(
        &self,
        funjumper_id: FunJumperId,
        quantity: Tickets,
        notes: Option<String>,
    ) -> Result<RecordedEntry, AppError> {
        check_quantity(quantity)?;
        self.ticket_entry(funjumper_id, EntryKind::CancelJumpticket, -quantity, notes)
            .await
    }

    async fn ticket_entry(
        &self,
        funjumper_id: FunJumperId,
        kind: EntryKind,
        amount: Tickets,
        notes: Option<String>,
    ) -> Result<RecordedEntry, AppError> {
        let mut entry = NewLedgerEntry::new(Subject::FunJumper(funjumper_id), kind, amount);
        if let Some(notes) = notes {
            entry = entry.with_notes(notes);
        }
        self.record(entry).await
    }

    /// Cached balance next to a fresh ledger sum.
    pub async fn get_ticket_balance(
        &self,
        funjumper_id: FunJumperId,
    ) -> Result<TicketBalance, AppError> {
        let fun_jumper = self.get_fun_jumper(funjumper_id).await?;
        let ledger = self
            .repo
            .compute_ticket_balance(funjumper_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("fun-jumper {}", funjumper_id)))?;

        Ok(TicketBalance {
            cached: fun_jumper.jump_ticket_balance,
            ledger,
            fun_jumper,
        })
    }

    pub async fn get_entry(&self, id: EntryId) -> Result<LedgerEntry, AppError> {
        self.repo
            .get_entry(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("ledger entry {}", id)))
    }

    /// Newest entries first, optionally for one subject.
    pub async fn list_entries(
        &self,
        subject: Option<Subject>,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        Ok(self.repo.list_entries(subject, limit).await?)
    }

    /// The whole ledger in insertion order.
    pub async fn list_all_entries(&self) -> Result<Vec<LedgerEntry>, AppError> {
        Ok(self.repo.list_all_entries().await?)
    }

    /// Compare every cached balance with the ledger.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let jumpers = self.repo.list_fun_jumpers().await?;
        let ledger_balances = self.repo.compute_all_ticket_balances().await?;
        let stats = self.repo.get_ledger_stats().await?;

        let report = build_integrity_report(
            &jumpers,
            &ledger_balances,
            stats.entry_count,
            stats.malformed_subjects,
        );
        if !report.is_healthy() {
            warn!(issues = report.issues.len(), "ledger integrity check failed");
        }
        Ok(report)
    }

    /// Overwrite every cached balance with its ledger sum.
    /// Returns how many balances changed.
    pub async fn rebuild_balances(&self) -> Result<usize, AppError> {
        let jumpers = self.repo.list_fun_jumpers().await?;
        let mut tx = self.repo.begin().await?;
        let outcome = rebuild_in(&mut tx, &jumpers).await;
        finish(tx, outcome).await
    }
}

async fn rebuild_in(conn: &mut SqliteConnection, jumpers: &[FunJumper]) -> Result<usize, AppError> {
    let mut changed = 0;
    for jumper in jumpers {
        let Some(balance) = Repository::ticket_balance_on(conn, jumper.id).await? else {
            continue;
        };
        // Re-stored even when equal, so a balance moved since `jumpers` was read is still fixed
        Repository::store_ticket_balance(conn, jumper.id, balance).await?;
        if balance != jumper.jump_ticket_balance {
            info!(
                funjumper_id = jumper.id,
                from = jumper.jump_ticket_balance,
                to = balance,
                "rebuilt ticket balance"
            );
            changed += 1;
        }
    }
    Ok(changed)
}
