use sqlx::sqlite::SqliteConnection;
use tracing::{info, instrument, warn};

use crate::domain::{
    EntryKind, FunJumperId, InstructorId, JumpId, Jumper, LedgerEntry, LoadId, NewLedgerEntry,
    PassengerId, Subject, TandemBooking, TandemId, Tickets,
};
use crate::storage::{is_unique_violation, Repository};

use super::ledger::{finish, record_in};
use super::{AppError, DropzoneService};

/// Where and how a fun-jumper jumps.
#[derive(Debug, Clone, Default)]
pub struct JumpDetails {
    /// Exit altitude in feet; resolved to a jump type when one matches.
    pub exit_altitude_ft: Option<i64>,
    pub group_id: Option<String>,
    pub notes: Option<String>,
}

/// Result of putting a fun-jumper on a load.
#[derive(Debug, Clone)]
pub struct FunJumperManifested {
    pub jump_id: JumpId,
    pub entry: LedgerEntry,
    pub balance: Tickets,
}

/// Result of taking a fun-jumper off a load.
#[derive(Debug, Clone)]
pub struct FunJumperRemoved {
    pub funjumper_id: FunJumperId,
    pub entry: LedgerEntry,
    pub balance: Tickets,
}

/// Result of putting a tandem on a load.
#[derive(Debug, Clone)]
pub struct TandemManifested {
    pub booking: TandemBooking,
    pub jump_id: JumpId,
    /// Compensation credited to the instructor.
    pub entries: Vec<LedgerEntry>,
}

impl DropzoneService {
    // ========================
    // Manifest operations
    // ========================

    /// Put a fun-jumper on a load and debit one jump ticket.
    ///
    /// The balance is allowed to go negative. A second add of the same
    /// fun-jumper to the same load fails with
    /// [`AppError::DuplicateManifest`] and leaves the ledger untouched.
    #[instrument(skip(self, details))]
    pub async fn add_funjumper_to_load(
        &self,
        load_id: LoadId,
        funjumper_id: FunJumperId,
        details: JumpDetails,
    ) -> Result<FunJumperManifested, AppError> {
        // Existence checks give NotFound instead of a foreign key failure
        self.get_load(load_id).await?;
        self.get_fun_jumper(funjumper_id).await?;

        let mut tx = self.repo.begin().await?;
        let outcome = add_funjumper_in(&mut tx, load_id, funjumper_id, &details).await;
        let manifested = finish(tx, outcome).await?;

        info!(
            jump_id = manifested.jump_id,
            balance = manifested.balance,
            "fun-jumper manifested"
        );
        Ok(manifested)
    }

    /// Take a fun-jumper off a load and credit the ticket back.
    #[instrument(skip(self))]
    pub async fn remove_funjumper_from_load(
        &self,
        load_id: LoadId,
        jump_id: JumpId,
    ) -> Result<FunJumperRemoved, AppError> {
        let mut tx = self.repo.begin().await?;
        let outcome = remove_funjumper_in(&mut tx, load_id, jump_id).await;
        let removed = finish(tx, outcome).await?;

        info!(
            funjumper_id = removed.funjumper_id,
            balance = removed.balance,
            "fun-jumper removed from load"
        );
        Ok(removed)
    }

    /// Assign an instructor to the passenger's pending booking, put the
    /// tandem on the load and credit the instructor.
    #[instrument(skip(self, notes))]
    pub async fn add_tandem_to_load(
        &self,
        load_id: LoadId,
        passenger_id: PassengerId,
        instructor_id: InstructorId,
        notes: Option<String>,
    ) -> Result<TandemManifested, AppError> {
        self.get_load(load_id).await?;

        let mut tx = self.repo.begin().await?;
        let outcome = add_tandem_in(
            &mut tx,
            load_id,
            passenger_id,
            instructor_id,
            notes.as_deref(),
        )
        .await;
        let manifested = finish(tx, outcome).await?;

        info!(
            tandem_id = manifested.booking.id,
            jump_id = manifested.jump_id,
            credits = manifested.entries.len(),
            "tandem manifested"
        );
        Ok(manifested)
    }

    /// Take a tandem off a load and release its instructor.
    ///
    /// Compensation already credited stays on the ledger unless
    /// `reverse_tandem_compensation` is enabled, in which case the
    /// offsetting entries are returned.
    #[instrument(skip(self))]
    pub async fn remove_tandem_from_load(
        &self,
        load_id: LoadId,
        tandem_id: TandemId,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let reverse = self.config.reverse_tandem_compensation;

        let mut tx = self.repo.begin().await?;
        let outcome = remove_tandem_in(&mut tx, load_id, tandem_id, reverse).await;
        let reversals = finish(tx, outcome).await?;

        info!(reversals = reversals.len(), "tandem removed from load");
        Ok(reversals)
    }
}

async fn add_funjumper_in(
    conn: &mut SqliteConnection,
    load_id: LoadId,
    funjumper_id: FunJumperId,
    details: &JumpDetails,
) -> Result<FunJumperManifested, AppError> {
    // The unique (load, fun-jumper) index decides duplicates, so the insert
    // goes first and no ticket is debited for a rejected add.
    let jump_id = match Repository::insert_fun_jump(
        conn,
        load_id,
        funjumper_id,
        details.exit_altitude_ft,
        details.group_id.as_deref(),
        details.notes.as_deref(),
    )
    .await
    {
        Ok(jump_id) => jump_id,
        Err(err) if is_unique_violation(&err) => {
            warn!(load_id, funjumper_id, "duplicate manifest rejected");
            return Err(AppError::DuplicateManifest {
                load_id,
                funjumper_id,
            });
        }
        Err(err) => return Err(err.into()),
    };

    let entry = NewLedgerEntry::new(Subject::FunJumper(funjumper_id), EntryKind::Jump, -1)
        .with_notes(format!("Jump ticket used for load {}", load_id));
    let recorded = record_in(conn, &entry).await?;

    Ok(FunJumperManifested {
        jump_id,
        balance: recorded.ticket_balance.unwrap_or_default(),
        entry: recorded.entry,
    })
}

async fn remove_funjumper_in(
    conn: &mut SqliteConnection,
    load_id: LoadId,
    jump_id: JumpId,
) -> Result<FunJumperRemoved, AppError> {
    let jump = Repository::get_jump(conn, jump_id)
        .await?
        .filter(|jump| jump.load_id == load_id);
    let funjumper_id = match jump.map(|jump| jump.jumper) {
        Some(Jumper::FunJumper(id)) => id,
        _ => {
            return Err(AppError::NotFound(format!(
                "fun-jumper jump {} on load {}",
                jump_id, load_id
            )));
        }
    };

    let entry = NewLedgerEntry::new(Subject::FunJumper(funjumper_id), EntryKind::CancelJump, 1)
        .with_notes(format!("Taken out of manifest from load {}", load_id));
    let recorded = record_in(conn, &entry).await?;
    Repository::delete_jump(conn, jump_id).await?;

    Ok(FunJumperRemoved {
        funjumper_id,
        balance: recorded.ticket_balance.unwrap_or_default(),
        entry: recorded.entry,
    })
}

async fn add_tandem_in(
    conn: &mut SqliteConnection,
    load_id: LoadId,
    passenger_id: PassengerId,
    instructor_id: InstructorId,
    notes: Option<&str>,
) -> Result<TandemManifested, AppError> {
    let booking = Repository::claim_pending_booking(conn, passenger_id, instructor_id)
        .await?
        .ok_or(AppError::NoBookingFound(passenger_id))?;

    let jump_id = Repository::insert_tandem_jump(conn, load_id, booking.id, notes).await?;

    let mut entries = Vec::new();
    for entry in booking.compensation_entries(instructor_id, load_id) {
        entries.push(record_in(conn, &entry).await?.entry);
    }

    Ok(TandemManifested {
        booking,
        jump_id,
        entries,
    })
}

async fn remove_tandem_in(
    conn: &mut SqliteConnection,
    load_id: LoadId,
    tandem_id: TandemId,
    reverse: bool,
) -> Result<Vec<LedgerEntry>, AppError> {
    let booking = Repository::get_tandem_booking(conn, tandem_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("tandem {}", tandem_id)))?;

    let removed = Repository::delete_tandem_jump(conn, load_id, tandem_id).await?;
    if removed == 0 {
        return Err(AppError::NotFound(format!(
            "tandem {} on load {}",
            tandem_id, load_id
        )));
    }

    let mut reversals = Vec::new();
    if let Some(instructor_id) = booking.instructor_id.filter(|_| reverse) {
        for entry in booking.reversal_entries(instructor_id, load_id) {
            reversals.push(record_in(conn, &entry).await?.entry);
        }
    }
    Repository::release_booking(conn, tandem_id).await?;

    Ok(reversals)
}
