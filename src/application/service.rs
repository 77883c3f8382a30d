use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::ServiceConfig;
use crate::domain::{
    used_slots, Airplane, AirplaneId, FuelType, FuelTypeId, FunJumper, FunJumperId,
    InstructorProfile, JumpType, LedgerEntry, Load, LoadId, LoadStatus, Passenger, Pilot, PilotId,
    Refuel, Subject, TandemBooking, TandemInstructor,
};
use crate::storage::{FunJumperSlot, JumpHistoryEntry, Repository, TandemSlot};

use super::AppError;

/// Application service providing every operation of the dropzone backend.
/// This is the primary interface for any client (CLI, API, etc.).
pub struct DropzoneService {
    pub(super) repo: Repository,
    pub(super) config: ServiceConfig,
}

/// Everything on one load, as the manifest desk sees it
pub struct LoadManifest {
    pub load: Load,
    pub airplane: Airplane,
    pub fun_jumpers: Vec<FunJumperSlot>,
    pub tandems: Vec<TandemSlot>,
    pub used_slots: i64,
}

impl LoadManifest {
    pub fn free_slots(&self) -> i64 {
        self.airplane.slots - self.used_slots
    }
}

/// A fun-jumper's jump log next to their ledger entries
pub struct FunJumperDetail {
    pub fun_jumper: FunJumper,
    pub jumps: Vec<JumpHistoryEntry>,
    /// Newest first.
    pub entries: Vec<LedgerEntry>,
}

/// Result of a tandem check-in
pub struct CheckIn {
    pub passenger: Passenger,
    pub booking: TandemBooking,
}

/// Passenger details captured at tandem check-in
pub struct PassengerDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

/// Add-ons and paperwork captured at tandem check-in
#[derive(Debug, Clone, Copy, Default)]
pub struct BookingOptions {
    pub waiver_signed: bool,
    pub photos: bool,
    pub videos: bool,
}

impl DropzoneService {
    /// Create a new service with the given repository.
    pub fn new(repo: Repository, config: ServiceConfig) -> Self {
        Self { repo, config }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        Self::init_with(database_path, ServiceConfig::default()).await
    }

    pub async fn init_with(database_path: &str, config: ServiceConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, config: ServiceConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo, config))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Direct access to storage, for maintenance tooling and tests.
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Roster operations
    // ========================

    /// Register a fun-jumper. The jump-ticket balance starts at zero.
    pub async fn register_fun_jumper(
        &self,
        first_name: &str,
        last_name: &str,
        license_number: Option<&str>,
        email: Option<&str>,
    ) -> Result<FunJumper, AppError> {
        let jumper = self
            .repo
            .insert_fun_jumper(first_name, last_name, license_number, email)
            .await?;
        info!(funjumper_id = jumper.id, name = %jumper.full_name(), "registered fun-jumper");
        Ok(jumper)
    }

    pub async fn get_fun_jumper(&self, id: FunJumperId) -> Result<FunJumper, AppError> {
        self.repo
            .get_fun_jumper(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("fun-jumper {}", id)))
    }

    pub async fn list_fun_jumpers(&self) -> Result<Vec<FunJumper>, AppError> {
        Ok(self.repo.list_fun_jumpers().await?)
    }

    pub async fn search_fun_jumpers(&self, term: &str) -> Result<Vec<FunJumper>, AppError> {
        Ok(self.repo.search_fun_jumpers(term).await?)
    }

    pub async fn register_pilot(
        &self,
        first_name: &str,
        last_name: &str,
        license_number: Option<&str>,
    ) -> Result<Pilot, AppError> {
        let pilot = self
            .repo
            .insert_pilot(first_name, last_name, license_number)
            .await?;
        info!(pilot_id = pilot.id, "registered pilot");
        Ok(pilot)
    }

    pub async fn list_jumps_for_fun_jumper(
        &self,
        funjumper_id: FunJumperId,
    ) -> Result<Vec<JumpHistoryEntry>, AppError> {
        self.get_fun_jumper(funjumper_id).await?;
        Ok(self.repo.list_jumps_for_fun_jumper(funjumper_id).await?)
    }

    pub async fn fun_jumper_detail(
        &self,
        funjumper_id: FunJumperId,
    ) -> Result<FunJumperDetail, AppError> {
        let fun_jumper = self.get_fun_jumper(funjumper_id).await?;
        let jumps = self.repo.list_jumps_for_fun_jumper(funjumper_id).await?;
        let entries = self
            .repo
            .list_entries(Some(Subject::FunJumper(funjumper_id)), None)
            .await?;

        Ok(FunJumperDetail {
            fun_jumper,
            jumps,
            entries,
        })
    }

    pub async fn list_pilots(&self) -> Result<Vec<Pilot>, AppError> {
        Ok(self.repo.list_pilots().await?)
    }

    /// Rate an existing fun-jumper as tandem instructor.
    pub async fn register_instructor(
        &self,
        funjumper_id: FunJumperId,
        tandem_rating: bool,
        camera_rating: bool,
        notes: Option<&str>,
    ) -> Result<TandemInstructor, AppError> {
        // Surface a missing fun-jumper as NotFound rather than a bare FK error
        self.get_fun_jumper(funjumper_id).await?;
        let instructor = self
            .repo
            .insert_instructor(funjumper_id, tandem_rating, camera_rating, notes)
            .await?;
        info!(
            instructor_id = instructor.id,
            funjumper_id, "registered tandem instructor"
        );
        Ok(instructor)
    }

    pub async fn list_instructors(&self) -> Result<Vec<InstructorProfile>, AppError> {
        Ok(self.repo.list_instructors().await?)
    }

    // ========================
    // Aircraft operations
    // ========================

    pub async fn register_fuel_type(
        &self,
        name: &str,
        density_g_per_l: i64,
        price_per_liter: i64,
    ) -> Result<FuelType, AppError> {
        if density_g_per_l <= 0 {
            return Err(AppError::InvalidAmount(
                "Density must be positive".to_string(),
            ));
        }
        if price_per_liter < 0 {
            return Err(AppError::InvalidAmount(
                "Price per liter cannot be negative".to_string(),
            ));
        }
        Ok(self
            .repo
            .insert_fuel_type(name, density_g_per_l, price_per_liter)
            .await?)
    }

    pub async fn list_fuel_types(&self) -> Result<Vec<FuelType>, AppError> {
        Ok(self.repo.list_fuel_types().await?)
    }

    pub async fn register_airplane(
        &self,
        tail_number: &str,
        aircraft_type: Option<&str>,
        slots: i64,
        fuel_type_id: Option<FuelTypeId>,
    ) -> Result<Airplane, AppError> {
        if slots <= 0 {
            return Err(AppError::InvalidAmount(
                "An airplane needs at least one slot".to_string(),
            ));
        }
        Ok(self
            .repo
            .insert_airplane(tail_number, aircraft_type, slots, fuel_type_id)
            .await?)
    }

    pub async fn get_airplane(&self, id: AirplaneId) -> Result<Airplane, AppError> {
        self.repo
            .get_airplane(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("airplane {}", id)))
    }

    pub async fn list_airplanes(&self) -> Result<Vec<Airplane>, AppError> {
        Ok(self.repo.list_airplanes().await?)
    }

    pub async fn register_jump_type(
        &self,
        name: &str,
        height_feet: i64,
    ) -> Result<JumpType, AppError> {
        Ok(self.repo.insert_jump_type(name, height_feet).await?)
    }

    pub async fn list_jump_types(&self) -> Result<Vec<JumpType>, AppError> {
        Ok(self.repo.list_jump_types().await?)
    }

    /// Record a refuel at the fuel type's current price.
    pub async fn record_refuel(
        &self,
        airplane_id: AirplaneId,
        fuel_type_id: FuelTypeId,
        pilot_id: Option<PilotId>,
        liters: i64,
    ) -> Result<Refuel, AppError> {
        if liters <= 0 {
            return Err(AppError::InvalidAmount(
                "Refuel quantity must be positive".to_string(),
            ));
        }
        let fuel_type = self
            .repo
            .get_fuel_type(fuel_type_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("fuel type {}", fuel_type_id)))?;

        let quote = fuel_type.quote(liters);
        let refuel = self
            .repo
            .insert_refuel(airplane_id, fuel_type_id, pilot_id, &quote)
            .await?;
        info!(
            refuel_id = refuel.id,
            airplane_id,
            liters,
            cost = refuel.cost,
            "recorded refuel"
        );
        Ok(refuel)
    }

    pub async fn list_refuels(
        &self,
        airplane_id: Option<AirplaneId>,
    ) -> Result<Vec<Refuel>, AppError> {
        Ok(self.repo.list_refuels(airplane_id).await?)
    }

    // ========================
    // Load operations
    // ========================

    /// Schedule a new, active load.
    pub async fn create_load(
        &self,
        airplane_id: AirplaneId,
        pilot_id: PilotId,
        takeoff_at: DateTime<Utc>,
        notes: Option<&str>,
    ) -> Result<Load, AppError> {
        let load = self
            .repo
            .insert_load(airplane_id, pilot_id, takeoff_at, LoadStatus::Active, notes)
            .await?;
        info!(load_id = load.id, airplane_id, pilot_id, "created load");
        Ok(load)
    }

    pub async fn get_load(&self, id: LoadId) -> Result<Load, AppError> {
        self.repo
            .get_load(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("load {}", id)))
    }

    pub async fn list_loads(&self, status: Option<LoadStatus>) -> Result<Vec<Load>, AppError> {
        Ok(self.repo.list_loads(status).await?)
    }

    /// Flip a load between active and inactive. Returns the new status.
    pub async fn toggle_load_status(&self, id: LoadId) -> Result<LoadStatus, AppError> {
        let load = self.get_load(id).await?;
        let status = load.status.toggled();
        self.repo.set_load_status(id, status).await?;
        info!(load_id = id, status = %status, "toggled load status");
        Ok(status)
    }

    /// Move a load to a new takeoff time.
    pub async fn update_takeoff_time(
        &self,
        id: LoadId,
        takeoff_at: DateTime<Utc>,
    ) -> Result<Load, AppError> {
        let mut load = self.get_load(id).await?;
        self.repo.set_load_takeoff(id, takeoff_at).await?;
        info!(load_id = id, takeoff_at = %takeoff_at, "updated load takeoff time");

        load.takeoff_at = takeoff_at;
        Ok(load)
    }

    /// Everyone on a load, with slot usage.
    pub async fn get_load_manifest(&self, id: LoadId) -> Result<LoadManifest, AppError> {
        let load = self.get_load(id).await?;
        let airplane = self.get_airplane(load.airplane_id).await?;
        let fun_jumpers = self.repo.list_fun_jumper_slots(id).await?;
        let tandems = self.repo.list_tandem_slots(id).await?;
        let used_slots = used_slots(fun_jumpers.len(), tandems.len());

        Ok(LoadManifest {
            load,
            airplane,
            fun_jumpers,
            tandems,
            used_slots,
        })
    }

    // ========================
    // Tandem check-in
    // ========================

    /// Register a passenger together with a pending tandem booking.
    pub async fn check_in_tandem(
        &self,
        passenger: PassengerDetails,
        options: BookingOptions,
        notes: Option<&str>,
    ) -> Result<CheckIn, AppError> {
        let mut tx = self.repo.begin().await?;
        let passenger = Repository::insert_passenger(
            &mut *tx,
            &passenger.first_name,
            &passenger.last_name,
            passenger.email.as_deref(),
            passenger.phone_number.as_deref(),
        )
        .await?;
        let booking = Repository::insert_tandem_booking(
            &mut *tx,
            passenger.id,
            options.waiver_signed,
            options.photos,
            options.videos,
            notes,
        )
        .await?;
        tx.commit().await?;

        info!(
            passenger_id = passenger.id,
            tandem_id = booking.id,
            photos = booking.photos,
            videos = booking.videos,
            "tandem checked in"
        );
        Ok(CheckIn { passenger, booking })
    }

    /// Bookings waiting for an instructor, with passenger names.
    pub async fn list_pending_bookings(&self) -> Result<Vec<(TandemBooking, String)>, AppError> {
        Ok(self.repo.list_pending_bookings().await?)
    }
}
