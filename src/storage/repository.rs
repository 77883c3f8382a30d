use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::domain::{
    Airplane, AirplaneId, EntryId, EntryKind, FuelType, FuelTypeId, FunJumper, FunJumperId,
    InstructorId, InstructorProfile, JumpId, JumpType, Jumper, LedgerEntry, Load, LoadId,
    LoadStatus, ManifestJump, NewLedgerEntry, Passenger, PassengerId, Pilot, PilotId, Refuel,
    RefuelQuote, Subject, TandemBooking, TandemId, TandemInstructor, Tickets,
};

use super::{
    WriteTransaction, MIGRATION_001_ROSTER_LEDGER, MIGRATION_002_OPERATIONS, MIGRATION_003_REFUELS,
};

const LEDGER_COLUMNS: &str = "id, transaction_type, funjumper_id, pilot_id, tandem_instructor_id, amount, notes, transaction_datetime";

/// Ledger statistics for integrity verification.
#[derive(Debug, Clone)]
pub struct LedgerStats {
    pub entry_count: i64,
    pub malformed_subjects: i64,
}

/// A fun-jumper's seat on a load, as shown on the manifest.
#[derive(Debug, Clone)]
pub struct FunJumperSlot {
    pub jump_id: JumpId,
    pub funjumper_id: FunJumperId,
    pub name: String,
    pub jump_ticket_balance: Tickets,
    pub jump_type: Option<String>,
    pub group_id: Option<String>,
    pub notes: Option<String>,
}

/// A tandem pair's seats on a load, as shown on the manifest.
#[derive(Debug, Clone)]
pub struct TandemSlot {
    pub jump_id: JumpId,
    pub tandem_id: TandemId,
    pub passenger_name: String,
    pub instructor_name: Option<String>,
    pub photos: bool,
    pub videos: bool,
    pub notes: Option<String>,
}

/// One entry of a fun-jumper's jump log.
#[derive(Debug, Clone)]
pub struct JumpHistoryEntry {
    pub jump_id: JumpId,
    pub load_id: LoadId,
    pub takeoff_at: DateTime<Utc>,
    pub tail_number: String,
    /// Exit height of the resolved jump type, if any.
    pub height_feet: Option<i64>,
    pub group_id: Option<String>,
}

/// A load with its pilot's name and the airplane's tail number.
#[derive(Debug, Clone)]
pub struct LoadOverview {
    pub load: Load,
    pub pilot_name: String,
    pub tail_number: String,
}

/// Total per instructor and compensation kind.
#[derive(Debug, Clone)]
pub struct CompensationRow {
    pub instructor_id: InstructorId,
    pub name: String,
    pub kind: EntryKind,
    pub total: i64,
}

/// Repository for persisting and querying the roster, the manifest and the ledger.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        for (name, sql) in [
            ("001", MIGRATION_001_ROSTER_LEDGER),
            ("002", MIGRATION_002_OPERATIONS),
            ("003", MIGRATION_003_REFUELS),
        ] {
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to run migration {}", name))?;
        }
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a write transaction.
    ///
    /// The write lock is taken up front, so concurrent writers queue on
    /// SQLite's busy timeout instead of failing when a deferred transaction
    /// tries to upgrade from a shared lock.
    pub async fn begin(&self) -> Result<WriteTransaction> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .context("Failed to begin write transaction")
    }

    // ========================
    // Ledger store
    // ========================

    /// Append a ledger entry. Schema triggers reject any later UPDATE or DELETE.
    pub async fn append_entry(
        conn: &mut SqliteConnection,
        entry: &NewLedgerEntry,
    ) -> Result<LedgerEntry> {
        let recorded_at = Utc::now();
        let (funjumper_id, pilot_id, instructor_id) = entry.subject.to_columns();

        let row = sqlx::query(
            r#"
            INSERT INTO transactions (transaction_type, funjumper_id, pilot_id, tandem_instructor_id, amount, notes, transaction_datetime)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(entry.kind.as_str())
        .bind(funjumper_id)
        .bind(pilot_id)
        .bind(instructor_id)
        .bind(entry.amount)
        .bind(&entry.notes)
        .bind(recorded_at.to_rfc3339())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to append ledger entry")?;

        Ok(LedgerEntry {
            id: row.get("id"),
            subject: entry.subject,
            kind: entry.kind,
            amount: entry.amount,
            notes: entry.notes.clone(),
            recorded_at,
        })
    }

    /// Sum the ticket-kind entries of a fun-jumper.
    /// `None` means the fun-jumper does not exist; no entries yields `Some(0)`.
    pub async fn ticket_balance_on(
        conn: &mut SqliteConnection,
        funjumper_id: FunJumperId,
    ) -> Result<Option<Tickets>> {
        let query = format!(
            r#"
            SELECT COALESCE((
                SELECT SUM(t.amount)
                FROM transactions t
                WHERE t.funjumper_id = f.id AND t.transaction_type IN ({})
            ), 0) AS balance
            FROM fun_jumpers f
            WHERE f.id = ?
            "#,
            ticket_kind_list()
        );

        let row = sqlx::query(&query)
            .bind(funjumper_id)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to compute ticket balance")?;

        Ok(row.map(|row| row.get("balance")))
    }

    /// Overwrite the cached balance. Never increments in place.
    pub async fn store_ticket_balance(
        conn: &mut SqliteConnection,
        funjumper_id: FunJumperId,
        balance: Tickets,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE fun_jumpers SET jump_ticket_balance = ? WHERE id = ?")
            .bind(balance)
            .bind(funjumper_id)
            .execute(&mut *conn)
            .await
            .context("Failed to store ticket balance")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("Fun-jumper {} vanished during balance update", funjumper_id);
        }
        Ok(())
    }

    /// Pool-level variant of [`Repository::ticket_balance_on`].
    pub async fn compute_ticket_balance(&self, funjumper_id: FunJumperId) -> Result<Option<Tickets>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        Self::ticket_balance_on(&mut *conn, funjumper_id).await
    }

    /// Ledger balances of every fun-jumper with qualifying entries.
    pub async fn compute_all_ticket_balances(&self) -> Result<HashMap<FunJumperId, Tickets>> {
        let query = format!(
            r#"
            SELECT funjumper_id, SUM(amount) AS balance
            FROM transactions
            WHERE funjumper_id IS NOT NULL AND transaction_type IN ({})
            GROUP BY funjumper_id
            "#,
            ticket_kind_list()
        );

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to compute all ticket balances")?;

        Ok(rows
            .iter()
            .map(|row| (row.get("funjumper_id"), row.get("balance")))
            .collect())
    }

    /// Get a ledger entry by ID.
    pub async fn get_entry(&self, id: EntryId) -> Result<Option<LedgerEntry>> {
        let query = format!("SELECT {} FROM transactions WHERE id = ?", LEDGER_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch ledger entry")?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    /// List ledger entries, newest first, optionally for one subject.
    pub async fn list_entries(
        &self,
        subject: Option<Subject>,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerEntry>> {
        let mut query = format!("SELECT {} FROM transactions", LEDGER_COLUMNS);
        if let Some(subject) = subject {
            query.push_str(&format!(" WHERE {} = ?", subject_column(&subject)));
        }
        query.push_str(" ORDER BY id DESC");
        if limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let mut sql_query = sqlx::query(&query);
        if let Some(subject) = subject {
            sql_query = sql_query.bind(subject.id());
        }
        if let Some(lim) = limit {
            // Anything past i64::MAX is already "no limit" for SQLite
            sql_query = sql_query.bind(i64::try_from(lim).unwrap_or(i64::MAX));
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list ledger entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// All ledger entries in insertion order.
    pub async fn list_all_entries(&self) -> Result<Vec<LedgerEntry>> {
        let query = format!("SELECT {} FROM transactions ORDER BY id", LEDGER_COLUMNS);
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list ledger entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    pub async fn count_entries_for_subject(&self, subject: Subject) -> Result<i64> {
        let query = format!(
            "SELECT COUNT(*) AS count FROM transactions WHERE {} = ?",
            subject_column(&subject)
        );
        let row = sqlx::query(&query)
            .bind(subject.id())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count ledger entries")?;

        Ok(row.get("count"))
    }

    /// Entry count and total amount per transaction type.
    pub async fn summarize_by_kind(&self) -> Result<Vec<(EntryKind, i64, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_type, COUNT(*) AS count, COALESCE(SUM(amount), 0) AS total
            FROM transactions
            GROUP BY transaction_type
            ORDER BY transaction_type
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to summarize ledger")?;

        rows.iter()
            .map(|row| {
                let kind_str: String = row.get("transaction_type");
                let kind = EntryKind::from_str(&kind_str)
                    .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", kind_str))?;
                Ok((kind, row.get("count"), row.get("total")))
            })
            .collect()
    }

    /// Net instructor credits per compensation kind.
    pub async fn instructor_compensation(&self) -> Result<Vec<CompensationRow>> {
        let rows = sqlx::query(
            r#"
            SELECT ti.id AS instructor_id,
                   f.first_name || ' ' || f.last_name AS name,
                   t.transaction_type,
                   SUM(t.amount) AS total
            FROM transactions t
            JOIN tandem_instructors ti ON t.tandem_instructor_id = ti.id
            JOIN fun_jumpers f ON ti.funjumper_id = f.id
            GROUP BY ti.id, t.transaction_type
            ORDER BY name, t.transaction_type
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute instructor compensation")?;

        rows.iter()
            .map(|row| {
                let kind_str: String = row.get("transaction_type");
                Ok(CompensationRow {
                    instructor_id: row.get("instructor_id"),
                    name: row.get("name"),
                    kind: EntryKind::from_str(&kind_str)
                        .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", kind_str))?,
                    total: row.get("total"),
                })
            })
            .collect()
    }

    /// Get statistics for integrity checking.
    pub async fn get_ledger_stats(&self) -> Result<LedgerStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS entry_count,
                COALESCE(SUM(CASE WHEN
                    (funjumper_id IS NOT NULL)
                    + (pilot_id IS NOT NULL)
                    + (tandem_instructor_id IS NOT NULL) != 1
                THEN 1 ELSE 0 END), 0) AS malformed
            FROM transactions
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to get ledger stats")?;

        Ok(LedgerStats {
            entry_count: row.get("entry_count"),
            malformed_subjects: row.get("malformed"),
        })
    }

    fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry> {
        let kind_str: String = row.get("transaction_type");
        let recorded_at_str: String = row.get("transaction_datetime");
        let id: EntryId = row.get("id");

        Ok(LedgerEntry {
            id,
            subject: Subject::from_columns(
                row.get("funjumper_id"),
                row.get("pilot_id"),
                row.get("tandem_instructor_id"),
            )
            .ok_or_else(|| anyhow::anyhow!("Ledger entry {} has no single subject", id))?,
            kind: EntryKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", kind_str))?,
            amount: row.get("amount"),
            notes: row.get("notes"),
            recorded_at: parse_timestamp(&recorded_at_str)?,
        })
    }

    // ========================
    // Roster operations
    // ========================

    pub async fn insert_fun_jumper(
        &self,
        first_name: &str,
        last_name: &str,
        license_number: Option<&str>,
        email: Option<&str>,
    ) -> Result<FunJumper> {
        let created_at = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO fun_jumpers (first_name, last_name, license_number, email, jump_ticket_balance, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            RETURNING id
            "#,
        )
        .bind(first_name)
        .bind(last_name)
        .bind(license_number)
        .bind(email)
        .bind(created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .context("Failed to save fun-jumper")?;

        Ok(FunJumper {
            id: row.get("id"),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            license_number: license_number.map(str::to_string),
            email: email.map(str::to_string),
            jump_ticket_balance: 0,
            created_at,
        })
    }

    pub async fn get_fun_jumper(&self, id: FunJumperId) -> Result<Option<FunJumper>> {
        let row = sqlx::query(
            r#"
            SELECT id, first_name, last_name, license_number, email, jump_ticket_balance, created_at
            FROM fun_jumpers
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch fun-jumper")?;

        row.as_ref().map(Self::row_to_fun_jumper).transpose()
    }

    pub async fn list_fun_jumpers(&self) -> Result<Vec<FunJumper>> {
        let rows = sqlx::query(
            r#"
            SELECT id, first_name, last_name, license_number, email, jump_ticket_balance, created_at
            FROM fun_jumpers
            ORDER BY last_name, first_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list fun-jumpers")?;

        rows.iter().map(Self::row_to_fun_jumper).collect()
    }

    /// Find fun-jumpers whose full name contains `term`.
    pub async fn search_fun_jumpers(&self, term: &str) -> Result<Vec<FunJumper>> {
        let rows = sqlx::query(
            r#"
            SELECT id, first_name, last_name, license_number, email, jump_ticket_balance, created_at
            FROM fun_jumpers
            WHERE first_name || ' ' || last_name LIKE ?
            ORDER BY last_name, first_name
            "#,
        )
        .bind(format!("%{}%", term))
        .fetch_all(&self.pool)
        .await
        .context("Failed to search fun-jumpers")?;

        rows.iter().map(Self::row_to_fun_jumper).collect()
    }

    fn row_to_fun_jumper(row: &SqliteRow) -> Result<FunJumper> {
        let created_at_str: String = row.get("created_at");
        Ok(FunJumper {
            id: row.get("id"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            license_number: row.get("license_number"),
            email: row.get("email"),
            jump_ticket_balance: row.get("jump_ticket_balance"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }

    pub async fn insert_pilot(
        &self,
        first_name: &str,
        last_name: &str,
        license_number: Option<&str>,
    ) -> Result<Pilot> {
        let created_at = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO pilots (first_name, last_name, license_number, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(first_name)
        .bind(last_name)
        .bind(license_number)
        .bind(created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .context("Failed to save pilot")?;

        Ok(Pilot {
            id: row.get("id"),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            license_number: license_number.map(str::to_string),
            created_at,
        })
    }

    pub async fn list_pilots(&self) -> Result<Vec<Pilot>> {
        let rows = sqlx::query(
            "SELECT id, first_name, last_name, license_number, created_at FROM pilots ORDER BY last_name, first_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pilots")?;

        rows.iter()
            .map(|row| {
                let created_at_str: String = row.get("created_at");
                Ok(Pilot {
                    id: row.get("id"),
                    first_name: row.get("first_name"),
                    last_name: row.get("last_name"),
                    license_number: row.get("license_number"),
                    created_at: parse_timestamp(&created_at_str)?,
                })
            })
            .collect()
    }

    pub async fn insert_instructor(
        &self,
        funjumper_id: FunJumperId,
        tandem_rating: bool,
        camera_rating: bool,
        notes: Option<&str>,
    ) -> Result<TandemInstructor> {
        let row = sqlx::query(
            r#"
            INSERT INTO tandem_instructors (funjumper_id, tandem_rating, camera_rating, notes)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(funjumper_id)
        .bind(tandem_rating)
        .bind(camera_rating)
        .bind(notes)
        .fetch_one(&self.pool)
        .await
        .context("Failed to save tandem instructor")?;

        Ok(TandemInstructor {
            id: row.get("id"),
            funjumper_id,
            tandem_rating,
            camera_rating,
            notes: notes.map(str::to_string),
        })
    }

    pub async fn list_instructors(&self) -> Result<Vec<InstructorProfile>> {
        let rows = sqlx::query(
            r#"
            SELECT ti.id, ti.funjumper_id, ti.tandem_rating, ti.camera_rating, ti.notes,
                   f.first_name || ' ' || f.last_name AS name
            FROM tandem_instructors ti
            JOIN fun_jumpers f ON ti.funjumper_id = f.id
            ORDER BY f.last_name, f.first_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tandem instructors")?;

        Ok(rows
            .iter()
            .map(|row| InstructorProfile {
                instructor: TandemInstructor {
                    id: row.get("id"),
                    funjumper_id: row.get("funjumper_id"),
                    tandem_rating: row.get::<i32, _>("tandem_rating") != 0,
                    camera_rating: row.get::<i32, _>("camera_rating") != 0,
                    notes: row.get("notes"),
                },
                name: row.get("name"),
            })
            .collect())
    }

    // ========================
    // Aircraft and load operations
    // ========================

    pub async fn insert_fuel_type(
        &self,
        name: &str,
        density_g_per_l: i64,
        price_per_liter: i64,
    ) -> Result<FuelType> {
        let row = sqlx::query(
            "INSERT INTO fuel_types (name, density_g_per_l, price_per_liter) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(name)
        .bind(density_g_per_l)
        .bind(price_per_liter)
        .fetch_one(&self.pool)
        .await
        .context("Failed to save fuel type")?;

        Ok(FuelType {
            id: row.get("id"),
            name: name.to_string(),
            density_g_per_l,
            price_per_liter,
        })
    }

    pub async fn get_fuel_type(&self, id: FuelTypeId) -> Result<Option<FuelType>> {
        let row = sqlx::query(
            "SELECT id, name, density_g_per_l, price_per_liter FROM fuel_types WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch fuel type")?;

        Ok(row.as_ref().map(Self::row_to_fuel_type))
    }

    pub async fn list_fuel_types(&self) -> Result<Vec<FuelType>> {
        let rows = sqlx::query(
            "SELECT id, name, density_g_per_l, price_per_liter FROM fuel_types ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list fuel types")?;

        Ok(rows.iter().map(Self::row_to_fuel_type).collect())
    }

    fn row_to_fuel_type(row: &SqliteRow) -> FuelType {
        FuelType {
            id: row.get("id"),
            name: row.get("name"),
            density_g_per_l: row.get("density_g_per_l"),
            price_per_liter: row.get("price_per_liter"),
        }
    }

    pub async fn insert_airplane(
        &self,
        tail_number: &str,
        aircraft_type: Option<&str>,
        slots: i64,
        fuel_type_id: Option<FuelTypeId>,
    ) -> Result<Airplane> {
        let row = sqlx::query(
            r#"
            INSERT INTO airplanes (tail_number, aircraft_type, slots, fuel_type_id)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(tail_number)
        .bind(aircraft_type)
        .bind(slots)
        .bind(fuel_type_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to save airplane")?;

        Ok(Airplane {
            id: row.get("id"),
            tail_number: tail_number.to_string(),
            aircraft_type: aircraft_type.map(str::to_string),
            slots,
            fuel_type_id,
        })
    }

    pub async fn get_airplane(&self, id: AirplaneId) -> Result<Option<Airplane>> {
        let row = sqlx::query(
            "SELECT id, tail_number, aircraft_type, slots, fuel_type_id FROM airplanes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch airplane")?;

        Ok(row.as_ref().map(Self::row_to_airplane))
    }

    pub async fn list_airplanes(&self) -> Result<Vec<Airplane>> {
        let rows = sqlx::query(
            "SELECT id, tail_number, aircraft_type, slots, fuel_type_id FROM airplanes ORDER BY tail_number",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list airplanes")?;

        Ok(rows.iter().map(Self::row_to_airplane).collect())
    }

    fn row_to_airplane(row: &SqliteRow) -> Airplane {
        Airplane {
            id: row.get("id"),
            tail_number: row.get("tail_number"),
            aircraft_type: row.get("aircraft_type"),
            slots: row.get("slots"),
            fuel_type_id: row.get("fuel_type_id"),
        }
    }

    pub async fn insert_jump_type(&self, name: &str, height_feet: i64) -> Result<JumpType> {
        let row = sqlx::query("INSERT INTO jump_types (name, height_feet) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(height_feet)
            .fetch_one(&self.pool)
            .await
            .context("Failed to save jump type")?;

        Ok(JumpType {
            id: row.get("id"),
            name: name.to_string(),
            height_feet,
        })
    }

    pub async fn list_jump_types(&self) -> Result<Vec<JumpType>> {
        let rows = sqlx::query("SELECT id, name, height_feet FROM jump_types ORDER BY height_feet")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list jump types")?;

        Ok(rows
            .iter()
            .map(|row| JumpType {
                id: row.get("id"),
                name: row.get("name"),
                height_feet: row.get("height_feet"),
            })
            .collect())
    }

    pub async fn insert_load(
        &self,
        airplane_id: AirplaneId,
        pilot_id: PilotId,
        takeoff_at: DateTime<Utc>,
        status: LoadStatus,
        notes: Option<&str>,
    ) -> Result<Load> {
        let row = sqlx::query(
            r#"
            INSERT INTO loads (airplane_id, pilot_id, takeoff_at, status, notes)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(airplane_id)
        .bind(pilot_id)
        .bind(takeoff_at.to_rfc3339())
        .bind(status.as_str())
        .bind(notes)
        .fetch_one(&self.pool)
        .await
        .context("Failed to save load")?;

        Ok(Load {
            id: row.get("id"),
            airplane_id,
            pilot_id,
            takeoff_at,
            status,
            notes: notes.map(str::to_string),
        })
    }

    pub async fn get_load(&self, id: LoadId) -> Result<Option<Load>> {
        let row = sqlx::query(
            "SELECT id, airplane_id, pilot_id, takeoff_at, status, notes FROM loads WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch load")?;

        row.as_ref().map(Self::row_to_load).transpose()
    }

    /// List loads by takeoff time, optionally only those with `status`.
    pub async fn list_loads(&self, status: Option<LoadStatus>) -> Result<Vec<Load>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT id, airplane_id, pilot_id, takeoff_at, status, notes FROM loads WHERE status = ? ORDER BY takeoff_at",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, airplane_id, pilot_id, takeoff_at, status, notes FROM loads ORDER BY takeoff_at",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list loads")?;

        rows.iter().map(Self::row_to_load).collect()
    }

    pub async fn set_load_status(&self, id: LoadId, status: LoadStatus) -> Result<()> {
        sqlx::query("UPDATE loads SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update load status")?;
        Ok(())
    }

    /// Move a load to a new takeoff time. Returns the number of loads changed.
    pub async fn set_load_takeoff(&self, id: LoadId, takeoff_at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("UPDATE loads SET takeoff_at = ? WHERE id = ?")
            .bind(takeoff_at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update load takeoff time")?;
        Ok(result.rows_affected())
    }

    /// Loads taking off on `date` (UTC), in takeoff order, whatever their status.
    pub async fn list_loads_on(&self, date: NaiveDate) -> Result<Vec<LoadOverview>> {
        // Takeoff times are stored as UTC RFC 3339, so the first ten characters are the day
        let rows = sqlx::query(
            r#"
            SELECT l.id, l.airplane_id, l.pilot_id, l.takeoff_at, l.status, l.notes,
                   p.first_name || ' ' || p.last_name AS pilot_name,
                   a.tail_number
            FROM loads l
            JOIN pilots p ON l.pilot_id = p.id
            JOIN airplanes a ON l.airplane_id = a.id
            WHERE substr(l.takeoff_at, 1, 10) = ?
            ORDER BY l.takeoff_at, l.id
            "#,
        )
        .bind(date.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list loads for day")?;

        rows.iter()
            .map(|row| {
                Ok(LoadOverview {
                    load: Self::row_to_load(row)?,
                    pilot_name: row.get("pilot_name"),
                    tail_number: row.get("tail_number"),
                })
            })
            .collect()
    }

    fn row_to_load(row: &SqliteRow) -> Result<Load> {
        let takeoff_str: String = row.get("takeoff_at");
        let status_str: String = row.get("status");
        Ok(Load {
            id: row.get("id"),
            airplane_id: row.get("airplane_id"),
            pilot_id: row.get("pilot_id"),
            takeoff_at: parse_timestamp(&takeoff_str)?,
            status: LoadStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid load status: {}", status_str))?,
            notes: row.get("notes"),
        })
    }

    // ========================
    // Tandem bookings
    // ========================

    pub async fn insert_passenger(
        conn: &mut SqliteConnection,
        first_name: &str,
        last_name: &str,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Passenger> {
        let row = sqlx::query(
            r#"
            INSERT INTO passengers (first_name, last_name, email, phone_number, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(phone_number)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to save passenger")?;

        Ok(Passenger {
            id: row.get("id"),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.map(str::to_string),
            phone_number: phone_number.map(str::to_string),
        })
    }

    pub async fn insert_tandem_booking(
        conn: &mut SqliteConnection,
        passenger_id: PassengerId,
        waiver_signed: bool,
        photos: bool,
        videos: bool,
        notes: Option<&str>,
    ) -> Result<TandemBooking> {
        let row = sqlx::query(
            r#"
            INSERT INTO tandems (passenger_id, waiver_signed, photos, videos, notes)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(passenger_id)
        .bind(waiver_signed)
        .bind(photos)
        .bind(videos)
        .bind(notes)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to save tandem booking")?;

        Ok(TandemBooking {
            id: row.get("id"),
            passenger_id,
            instructor_id: None,
            waiver_signed,
            photos,
            videos,
            notes: notes.map(str::to_string),
        })
    }

    pub async fn get_tandem_booking(
        conn: &mut SqliteConnection,
        id: TandemId,
    ) -> Result<Option<TandemBooking>> {
        let row = sqlx::query(
            r#"
            SELECT id, passenger_id, tandem_instructor_id, waiver_signed, photos, videos, notes
            FROM tandems
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch tandem booking")?;

        Ok(row.as_ref().map(Self::row_to_booking))
    }

    /// Bookings still waiting for an instructor, with passenger names.
    pub async fn list_pending_bookings(&self) -> Result<Vec<(TandemBooking, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.passenger_id, t.tandem_instructor_id, t.waiver_signed, t.photos, t.videos, t.notes,
                   p.first_name || ' ' || p.last_name AS passenger_name
            FROM tandems t
            JOIN passengers p ON t.passenger_id = p.id
            WHERE t.tandem_instructor_id IS NULL
            ORDER BY t.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pending tandem bookings")?;

        Ok(rows
            .iter()
            .map(|row| (Self::row_to_booking(row), row.get("passenger_name")))
            .collect())
    }

    /// Assign `instructor_id` to the oldest pending booking of a passenger.
    /// Claiming and reading happen in one statement, so two callers cannot
    /// both claim the same booking.
    pub async fn claim_pending_booking(
        conn: &mut SqliteConnection,
        passenger_id: PassengerId,
        instructor_id: InstructorId,
    ) -> Result<Option<TandemBooking>> {
        let row = sqlx::query(
            r#"
            UPDATE tandems
            SET tandem_instructor_id = ?
            WHERE id = (
                SELECT id FROM tandems
                WHERE passenger_id = ? AND tandem_instructor_id IS NULL
                ORDER BY id
                LIMIT 1
            )
            RETURNING id, passenger_id, tandem_instructor_id, waiver_signed, photos, videos, notes
            "#,
        )
        .bind(instructor_id)
        .bind(passenger_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to assign tandem instructor")?;

        Ok(row.as_ref().map(Self::row_to_booking))
    }

    pub async fn release_booking(conn: &mut SqliteConnection, tandem_id: TandemId) -> Result<()> {
        sqlx::query("UPDATE tandems SET tandem_instructor_id = NULL WHERE id = ?")
            .bind(tandem_id)
            .execute(&mut *conn)
            .await
            .context("Failed to clear tandem instructor")?;
        Ok(())
    }

    fn row_to_booking(row: &SqliteRow) -> TandemBooking {
        TandemBooking {
            id: row.get("id"),
            passenger_id: row.get("passenger_id"),
            instructor_id: row.get("tandem_instructor_id"),
            waiver_signed: row.get::<i32, _>("waiver_signed") != 0,
            photos: row.get::<i32, _>("photos") != 0,
            videos: row.get::<i32, _>("videos") != 0,
            notes: row.get("notes"),
        }
    }

    // ========================
    // Manifest operations
    // ========================

    /// Put a fun-jumper on a load. The exit altitude is resolved to a jump
    /// type by height; unknown heights leave the jump type empty.
    pub async fn insert_fun_jump(
        conn: &mut SqliteConnection,
        load_id: LoadId,
        funjumper_id: FunJumperId,
        exit_altitude_ft: Option<i64>,
        group_id: Option<&str>,
        notes: Option<&str>,
    ) -> Result<JumpId> {
        let row = sqlx::query(
            r#"
            INSERT INTO jumps (load_id, funjumper_id, jump_type_id, group_id, notes)
            VALUES (?, ?, (SELECT id FROM jump_types WHERE height_feet = ?), ?, ?)
            RETURNING id
            "#,
        )
        .bind(load_id)
        .bind(funjumper_id)
        .bind(exit_altitude_ft)
        .bind(group_id)
        .bind(notes)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to add fun-jumper to load")?;

        Ok(row.get("id"))
    }

    pub async fn insert_tandem_jump(
        conn: &mut SqliteConnection,
        load_id: LoadId,
        tandem_id: TandemId,
        notes: Option<&str>,
    ) -> Result<JumpId> {
        let row = sqlx::query(
            "INSERT INTO jumps (load_id, tandem_id, notes) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(load_id)
        .bind(tandem_id)
        .bind(notes)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to add tandem to load")?;

        Ok(row.get("id"))
    }

    pub async fn get_jump(conn: &mut SqliteConnection, id: JumpId) -> Result<Option<ManifestJump>> {
        let row = sqlx::query(
            "SELECT id, load_id, funjumper_id, tandem_id, jump_type_id, group_id, notes FROM jumps WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch jump")?;

        row.as_ref().map(Self::row_to_jump).transpose()
    }

    pub async fn delete_jump(conn: &mut SqliteConnection, id: JumpId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM jumps WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .context("Failed to delete jump")?;
        Ok(result.rows_affected())
    }

    pub async fn delete_tandem_jump(
        conn: &mut SqliteConnection,
        load_id: LoadId,
        tandem_id: TandemId,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM jumps WHERE tandem_id = ? AND load_id = ?")
            .bind(tandem_id)
            .bind(load_id)
            .execute(&mut *conn)
            .await
            .context("Failed to delete tandem jump")?;
        Ok(result.rows_affected())
    }

    fn row_to_jump(row: &SqliteRow) -> Result<ManifestJump> {
        let id: JumpId = row.get("id");
        let jumper = match (
            row.get::<Option<i64>, _>("funjumper_id"),
            row.get::<Option<i64>, _>("tandem_id"),
        ) {
            (Some(funjumper_id), None) => Jumper::FunJumper(funjumper_id),
            (None, Some(tandem_id)) => Jumper::Tandem(tandem_id),
            _ => anyhow::bail!("Jump {} has no single jumper", id),
        };

        Ok(ManifestJump {
            id,
            load_id: row.get("load_id"),
            jumper,
            jump_type_id: row.get("jump_type_id"),
            group_id: row.get("group_id"),
            notes: row.get("notes"),
        })
    }

    pub async fn list_fun_jumper_slots(&self, load_id: LoadId) -> Result<Vec<FunJumperSlot>> {
        let rows = sqlx::query(
            r#"
            SELECT j.id AS jump_id, f.id AS funjumper_id,
                   f.first_name || ' ' || f.last_name AS name,
                   f.jump_ticket_balance, jt.name AS jump_type, j.group_id, j.notes
            FROM jumps j
            JOIN fun_jumpers f ON j.funjumper_id = f.id
            LEFT JOIN jump_types jt ON j.jump_type_id = jt.id
            WHERE j.load_id = ?
            ORDER BY j.group_id, j.id
            "#,
        )
        .bind(load_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list manifested fun-jumpers")?;

        Ok(rows
            .iter()
            .map(|row| FunJumperSlot {
                jump_id: row.get("jump_id"),
                funjumper_id: row.get("funjumper_id"),
                name: row.get("name"),
                jump_ticket_balance: row.get("jump_ticket_balance"),
                jump_type: row.get("jump_type"),
                group_id: row.get("group_id"),
                notes: row.get("notes"),
            })
            .collect())
    }

    pub async fn list_tandem_slots(&self, load_id: LoadId) -> Result<Vec<TandemSlot>> {
        let rows = sqlx::query(
            r#"
            SELECT j.id AS jump_id, t.id AS tandem_id,
                   p.first_name || ' ' || p.last_name AS passenger_name,
                   f.first_name || ' ' || f.last_name AS instructor_name,
                   t.photos, t.videos, j.notes
            FROM jumps j
            JOIN tandems t ON j.tandem_id = t.id
            JOIN passengers p ON t.passenger_id = p.id
            LEFT JOIN tandem_instructors ti ON t.tandem_instructor_id = ti.id
            LEFT JOIN fun_jumpers f ON ti.funjumper_id = f.id
            WHERE j.load_id = ?
            ORDER BY j.id
            "#,
        )
        .bind(load_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list manifested tandems")?;

        Ok(rows
            .iter()
            .map(|row| TandemSlot {
                jump_id: row.get("jump_id"),
                tandem_id: row.get("tandem_id"),
                passenger_name: row.get("passenger_name"),
                instructor_name: row.get("instructor_name"),
                photos: row.get::<i32, _>("photos") != 0,
                videos: row.get::<i32, _>("videos") != 0,
                notes: row.get("notes"),
            })
            .collect())
    }

    /// Every load a fun-jumper was manifested on, newest jump first.
    pub async fn list_jumps_for_fun_jumper(
        &self,
        funjumper_id: FunJumperId,
    ) -> Result<Vec<JumpHistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT j.id AS jump_id, l.id AS load_id, l.takeoff_at, a.tail_number,
                   jt.height_feet, j.group_id
            FROM jumps j
            JOIN loads l ON j.load_id = l.id
            JOIN airplanes a ON l.airplane_id = a.id
            LEFT JOIN jump_types jt ON j.jump_type_id = jt.id
            WHERE j.funjumper_id = ?
            ORDER BY j.id DESC
            "#,
        )
        .bind(funjumper_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list jumps for fun-jumper")?;

        rows.iter()
            .map(|row| {
                let takeoff_str: String = row.get("takeoff_at");
                Ok(JumpHistoryEntry {
                    jump_id: row.get("jump_id"),
                    load_id: row.get("load_id"),
                    takeoff_at: parse_timestamp(&takeoff_str)?,
                    tail_number: row.get("tail_number"),
                    height_feet: row.get("height_feet"),
                    group_id: row.get("group_id"),
                })
            })
            .collect()
    }

    // ========================
    // Refuel operations
    // ========================

    pub async fn insert_refuel(
        &self,
        airplane_id: AirplaneId,
        fuel_type_id: FuelTypeId,
        pilot_id: Option<PilotId>,
        quote: &RefuelQuote,
    ) -> Result<Refuel> {
        let refueled_at = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO refuels (airplane_id, fuel_type_id, pilot_id, liters, price_per_liter, cost, added_mass, refueled_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(airplane_id)
        .bind(fuel_type_id)
        .bind(pilot_id)
        .bind(quote.liters)
        .bind(quote.price_per_liter)
        .bind(quote.cost)
        .bind(quote.added_mass)
        .bind(refueled_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .context("Failed to save refuel")?;

        Ok(Refuel {
            id: row.get("id"),
            airplane_id,
            fuel_type_id,
            pilot_id,
            liters: quote.liters,
            price_per_liter: quote.price_per_liter,
            cost: quote.cost,
            added_mass: quote.added_mass,
            refueled_at,
        })
    }

    pub async fn list_refuels(&self, airplane_id: Option<AirplaneId>) -> Result<Vec<Refuel>> {
        let mut query = String::from(
            "SELECT id, airplane_id, fuel_type_id, pilot_id, liters, price_per_liter, cost, added_mass, refueled_at FROM refuels",
        );
        if airplane_id.is_some() {
            query.push_str(" WHERE airplane_id = ?");
        }
        query.push_str(" ORDER BY id DESC");

        let mut sql_query = sqlx::query(&query);
        if let Some(id) = airplane_id {
            sql_query = sql_query.bind(id);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list refuels")?;

        rows.iter()
            .map(|row| {
                let refueled_at_str: String = row.get("refueled_at");
                Ok(Refuel {
                    id: row.get("id"),
                    airplane_id: row.get("airplane_id"),
                    fuel_type_id: row.get("fuel_type_id"),
                    pilot_id: row.get("pilot_id"),
                    liters: row.get("liters"),
                    price_per_liter: row.get("price_per_liter"),
                    cost: row.get("cost"),
                    added_mass: row.get("added_mass"),
                    refueled_at: parse_timestamp(&refueled_at_str)?,
                })
            })
            .collect()
    }
}

/// The ledger column that references a subject of this kind.
fn subject_column(subject: &Subject) -> &'static str {
    match subject {
        Subject::FunJumper(_) => "funjumper_id",
        Subject::Pilot(_) => "pilot_id",
        Subject::Instructor(_) => "tandem_instructor_id",
    }
}

/// `'jump', 'cancel_jump', ...` for use in an SQL `IN (...)` clause.
fn ticket_kind_list() -> String {
    EntryKind::TICKET_KINDS
        .iter()
        .map(|kind| format!("'{}'", kind.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid timestamp: {}", value))?
        .with_timezone(&Utc))
}

fn database_error(err: &anyhow::Error) -> Option<&dyn sqlx::error::DatabaseError> {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) => Some(db.as_ref()),
        _ => None,
    }
}

/// True if the root cause is a UNIQUE or PRIMARY KEY violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    database_error(err).is_some_and(|db| db.is_unique_violation())
}

/// True if the root cause is any integrity constraint the schema declares
/// (foreign key, unique, not-null or check).
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    database_error(err).is_some_and(|db| {
        db.is_foreign_key_violation()
            || db.is_unique_violation()
            || db.is_check_violation()
            || matches!(db.kind(), sqlx::error::ErrorKind::NotNullViolation)
    })
}
