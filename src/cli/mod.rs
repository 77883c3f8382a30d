use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand};

use crate::application::{BookingOptions, DropzoneService, JumpDetails, PassengerDetails};
use crate::config::{ServiceConfig, DATABASE_ENV, REVERSE_TANDEM_ENV};
use crate::domain::{
    format_cents, format_kg, parse_cents, parse_scaled, EntryKind, LoadStatus, NewLedgerEntry,
    Subject,
};

/// Dropzone - skydiving operations backend
#[derive(Parser)]
#[command(name = "dropzone")]
#[command(about = "Manifest, jump-ticket ledger and aircraft operations for a skydiving dropzone")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = DATABASE_ENV, default_value = "dropzone.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Record offsetting entries when a tandem is taken off a load
    #[arg(long, global = true, env = REVERSE_TANDEM_ENV)]
    pub reverse_tandem_compensation: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Fun-jumper management commands
    #[command(subcommand)]
    Jumper(JumperCommands),

    /// Pilot management commands
    #[command(subcommand)]
    Pilot(PilotCommands),

    /// Tandem instructor management commands
    #[command(subcommand)]
    Instructor(InstructorCommands),

    /// Airplane management commands
    #[command(subcommand)]
    Airplane(AirplaneCommands),

    /// Jump type management commands
    #[command(name = "jump-type", subcommand)]
    JumpType(JumpTypeCommands),

    /// Fuel type management commands
    #[command(name = "fuel-type", subcommand)]
    FuelType(FuelTypeCommands),

    /// Tandem check-in commands
    #[command(subcommand)]
    Tandem(TandemCommands),

    /// Load management commands
    #[command(subcommand)]
    Load(LoadCommands),

    /// Add or remove jumpers on a load
    #[command(subcommand)]
    Manifest(ManifestCommands),

    /// Sell or refund jump tickets
    #[command(subcommand)]
    Tickets(TicketCommands),

    /// Record a raw ledger entry
    Record {
        /// Subject as <kind>:<id>, e.g. funjumper:12, pilot:3, instructor:7
        subject: String,

        /// Transaction type, e.g. jump, buy_jumpticket, tandem_jump, other
        kind: String,

        /// Signed amount
        #[arg(allow_hyphen_values = true)]
        amount: i64,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Ledger inspection commands
    #[command(subcommand)]
    Ledger(LedgerCommands),

    /// Show jump-ticket balance for a fun-jumper or all fun-jumpers
    Balance {
        /// Fun-jumper ID (omit for all fun-jumpers)
        funjumper_id: Option<i64>,
    },

    /// Verify cached balances against the ledger
    Check,

    /// Overwrite every cached balance with its ledger sum
    RebuildBalances,

    /// Refuel commands
    #[command(subcommand)]
    Refuel(RefuelCommands),

    /// Generate reports
    #[command(subcommand)]
    Report(ReportCommands),

    /// Export data to CSV or JSON
    Export {
        /// What to export: ledger, balances, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum JumperCommands {
    /// Register a fun-jumper
    Add {
        first_name: String,
        last_name: String,

        /// License number
        #[arg(short, long)]
        license: Option<String>,

        /// Email address
        #[arg(short, long)]
        email: Option<String>,
    },

    /// List all fun-jumpers
    List,

    /// Show fun-jumper details, jump log and recent ledger entries
    Show {
        /// Fun-jumper ID
        id: i64,
    },

    /// Search fun-jumpers by name
    Search { term: String },
}

#[derive(Subcommand)]
pub enum PilotCommands {
    /// Register a pilot
    Add {
        first_name: String,
        last_name: String,

        /// License number
        #[arg(short, long)]
        license: Option<String>,
    },

    /// List all pilots
    List,
}

#[derive(Subcommand)]
pub enum InstructorCommands {
    /// Rate a fun-jumper as tandem instructor
    Add {
        /// Fun-jumper ID
        funjumper_id: i64,

        /// Holds a camera rating
        #[arg(long)]
        camera: bool,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List all tandem instructors
    List,
}

#[derive(Subcommand)]
pub enum AirplaneCommands {
    /// Register an airplane
    Add {
        /// Tail number (must be unique)
        tail_number: String,

        /// Jumper slots per load
        #[arg(short, long)]
        slots: i64,

        /// Aircraft type, e.g. "Cessna 208"
        #[arg(short = 't', long = "type")]
        aircraft_type: Option<String>,

        /// Fuel type ID
        #[arg(short, long)]
        fuel_type: Option<i64>,
    },

    /// List all airplanes
    List,
}

#[derive(Subcommand)]
pub enum JumpTypeCommands {
    /// Register a jump type
    Add {
        name: String,

        /// Exit altitude in feet (must be unique)
        height_feet: i64,
    },

    /// List all jump types
    List,
}

#[derive(Subcommand)]
pub enum FuelTypeCommands {
    /// Register a fuel type
    Add {
        name: String,

        /// Density in kg per liter (e.g., "0.8")
        #[arg(short, long)]
        density: String,

        /// Price per liter (e.g., "1.85")
        #[arg(short, long)]
        price: String,
    },

    /// List all fuel types
    List,
}

#[derive(Subcommand)]
pub enum TandemCommands {
    /// Check in a tandem passenger
    Checkin {
        first_name: String,
        last_name: String,

        /// Email address
        #[arg(short, long)]
        email: Option<String>,

        /// Phone number
        #[arg(long)]
        phone: Option<String>,

        /// Waiver has been signed
        #[arg(long)]
        waiver: bool,

        /// Booked photos
        #[arg(long)]
        photos: bool,

        /// Booked video
        #[arg(long)]
        videos: bool,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List bookings waiting for an instructor
    Pending,
}

#[derive(Subcommand)]
pub enum LoadCommands {
    /// Schedule a new load
    Create {
        /// Airplane ID
        #[arg(short, long)]
        airplane: i64,

        /// Pilot ID
        #[arg(short, long)]
        pilot: i64,

        /// Takeoff time (YYYY-MM-DD HH:MM or RFC 3339, defaults to now)
        #[arg(short, long)]
        takeoff: Option<String>,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List loads
    List {
        /// Only active loads
        #[arg(long)]
        active: bool,
    },

    /// Move a load to a new takeoff time
    Takeoff {
        /// Load ID
        id: i64,

        /// New takeoff time (YYYY-MM-DD HH:MM or RFC 3339)
        time: String,
    },

    /// Switch a load between active and inactive
    Toggle {
        /// Load ID
        id: i64,
    },

    /// Show everyone on a load
    Show {
        /// Load ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ManifestCommands {
    /// Put a fun-jumper on a load (uses one jump ticket)
    AddJumper {
        /// Load ID
        load_id: i64,

        /// Fun-jumper ID
        funjumper_id: i64,

        /// Exit altitude in feet
        #[arg(short, long)]
        altitude: Option<i64>,

        /// Group identifier for jumpers exiting together
        #[arg(short, long)]
        group: Option<String>,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Take a fun-jumper off a load (credits the ticket back)
    RemoveJumper {
        /// Load ID
        load_id: i64,

        /// Jump ID as shown by `load show`
        jump_id: i64,
    },

    /// Put a checked-in tandem on a load with an instructor
    AddTandem {
        /// Load ID
        load_id: i64,

        /// Passenger ID
        passenger_id: i64,

        /// Tandem instructor ID
        instructor_id: i64,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Take a tandem off a load
    RemoveTandem {
        /// Load ID
        load_id: i64,

        /// Tandem booking ID
        tandem_id: i64,
    },
}

#[derive(Subcommand)]
pub enum TicketCommands {
    /// Sell jump tickets
    Buy {
        /// Fun-jumper ID
        funjumper_id: i64,

        /// Number of tickets
        quantity: i64,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Refund jump tickets
    Cancel {
        /// Fun-jumper ID
        funjumper_id: i64,

        /// Number of tickets
        quantity: i64,

        /// Notes
        #[arg(short, long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// List recent ledger entries
    List {
        /// Filter by subject (<kind>:<id>)
        #[arg(short, long)]
        subject: Option<String>,

        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one ledger entry
    Show {
        /// Entry ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum RefuelCommands {
    /// Record a refuel at the fuel type's current price
    Add {
        /// Airplane ID
        airplane_id: i64,

        /// Fuel type ID
        fuel_type_id: i64,

        /// Liters added
        liters: i64,

        /// Pilot ID
        #[arg(short, long)]
        pilot: Option<i64>,
    },

    /// List refuels
    List {
        /// Filter by airplane ID
        #[arg(long)]
        airplane: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Entry count and total per transaction type
    Kinds {
        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Tandem, photo and video credits per instructor
    Instructors {
        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Resume of one day of operations
    Daily {
        /// Day (YYYY-MM-DD, UTC), defaults to today
        date: Option<String>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },
}

impl Cli {
    fn service_config(&self) -> ServiceConfig {
        ServiceConfig::default().with_tandem_reversal(self.reverse_tandem_compensation)
    }

    pub async fn run(self) -> Result<()> {
        if matches!(self.command, Commands::Init) {
            DropzoneService::init(&self.database).await?;
            println!("Database initialized: {}", self.database);
            return Ok(());
        }

        let service = DropzoneService::connect(&self.database, self.service_config())
            .await
            .with_context(|| format!("Failed to open {} (run `dropzone init` first?)", self.database))?;

        match self.command {
            Commands::Init => {}
            Commands::Jumper(cmd) => run_jumper_command(&service, cmd).await?,
            Commands::Pilot(cmd) => run_pilot_command(&service, cmd).await?,
            Commands::Instructor(cmd) => run_instructor_command(&service, cmd).await?,
            Commands::Airplane(cmd) => run_airplane_command(&service, cmd).await?,
            Commands::JumpType(cmd) => run_jump_type_command(&service, cmd).await?,
            Commands::FuelType(cmd) => run_fuel_type_command(&service, cmd).await?,
            Commands::Tandem(cmd) => run_tandem_command(&service, cmd).await?,
            Commands::Load(cmd) => run_load_command(&service, cmd).await?,
            Commands::Manifest(cmd) => run_manifest_command(&service, cmd).await?,
            Commands::Tickets(cmd) => run_ticket_command(&service, cmd).await?,

            Commands::Record {
                subject,
                kind,
                amount,
                notes,
            } => {
                let subject: Subject = subject
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid subject: {}", e))?;
                let kind: EntryKind = kind.parse().map_err(|e| {
                    anyhow::anyhow!(
                        "{}. Valid types: {}",
                        e,
                        EntryKind::ALL.map(|k| k.as_str()).join(", ")
                    )
                })?;

                let mut entry = NewLedgerEntry::new(subject, kind, amount);
                if let Some(notes) = notes {
                    entry = entry.with_notes(notes);
                }
                let recorded = service.record(entry).await?;

                println!(
                    "Recorded entry #{}: {} {:+} for {}",
                    recorded.entry.id, recorded.entry.kind, recorded.entry.amount, subject
                );
                if let Some(balance) = recorded.ticket_balance {
                    println!("Jump-ticket balance: {}", balance);
                }
            }

            Commands::Ledger(cmd) => run_ledger_command(&service, cmd).await?,
            Commands::Balance { funjumper_id } => run_balance_command(&service, funjumper_id).await?,
            Commands::Check => run_check_command(&service).await?,

            Commands::RebuildBalances => {
                let changed = service.rebuild_balances().await?;
                println!("Rebuilt balances: {} changed", changed);
            }

            Commands::Refuel(cmd) => run_refuel_command(&service, cmd).await?,
            Commands::Report(cmd) => run_report_command(&service, cmd).await?,

            Commands::Export {
                export_type,
                output,
            } => run_export_command(&service, &export_type, output.as_deref()).await?,
        }

        Ok(())
    }
}

async fn run_jumper_command(service: &DropzoneService, cmd: JumperCommands) -> Result<()> {
    match cmd {
        JumperCommands::Add {
            first_name,
            last_name,
            license,
            email,
        } => {
            let jumper = service
                .register_fun_jumper(&first_name, &last_name, license.as_deref(), email.as_deref())
                .await?;
            println!("Registered fun-jumper: {} (#{})", jumper.full_name(), jumper.id);
        }

        JumperCommands::List => {
            let jumpers = service.list_fun_jumpers().await?;
            print_jumpers(&jumpers);
        }

        JumperCommands::Search { term } => {
            let jumpers = service.search_fun_jumpers(&term).await?;
            print_jumpers(&jumpers);
        }

        JumperCommands::Show { id } => {
            let balance = service.get_ticket_balance(id).await?;
            let detail = service.fun_jumper_detail(id).await?;
            let jumper = &detail.fun_jumper;

            println!("Fun-jumper: {}", jumper.full_name());
            println!("  ID:       {}", jumper.id);
            if let Some(license) = &jumper.license_number {
                println!("  License:  {}", license);
            }
            if let Some(email) = &jumper.email {
                println!("  Email:    {}", email);
            }
            println!(
                "  Created:  {}",
                jumper.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("  Tickets:  {}", balance.cached);
            if !balance.is_consistent() {
                println!("  WARNING:  ledger says {}", balance.ledger);
            }

            if !detail.jumps.is_empty() {
                println!();
                println!("  Jumps ({}):", detail.jumps.len());
                for jump in &detail.jumps {
                    let height = jump
                        .height_feet
                        .map(|ft| format!("{} ft", ft))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "    {} load #{:<5} {:<10} {:>9}  {}",
                        jump.takeoff_at.format("%Y-%m-%d %H:%M"),
                        jump.load_id,
                        jump.tail_number,
                        height,
                        jump.group_id.as_deref().unwrap_or("")
                    );
                }
            }

            if !detail.entries.is_empty() {
                println!();
                println!("  Recent entries:");
                for entry in detail.entries.iter().take(10) {
                    println!(
                        "    {} {:<18} {:>4}  {}",
                        entry.recorded_at.format("%Y-%m-%d"),
                        entry.kind.as_str(),
                        entry.amount,
                        entry.notes.as_deref().unwrap_or("")
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_jumpers(jumpers: &[crate::domain::FunJumper]) {
    if jumpers.is_empty() {
        println!("No fun-jumpers found.");
        return;
    }
    println!("{:>5} {:<28} {:<12} {:>8}", "ID", "NAME", "LICENSE", "TICKETS");
    println!("{}", "-".repeat(56));
    for jumper in jumpers {
        println!(
            "{:>5} {:<28} {:<12} {:>8}",
            jumper.id,
            truncate(&jumper.full_name(), 28),
            jumper.license_number.as_deref().unwrap_or("-"),
            jumper.jump_ticket_balance
        );
    }
}

async fn run_pilot_command(service: &DropzoneService, cmd: PilotCommands) -> Result<()> {
    match cmd {
        PilotCommands::Add {
            first_name,
            last_name,
            license,
        } => {
            let pilot = service
                .register_pilot(&first_name, &last_name, license.as_deref())
                .await?;
            println!("Registered pilot: {} (#{})", pilot.full_name(), pilot.id);
        }

        PilotCommands::List => {
            let pilots = service.list_pilots().await?;
            if pilots.is_empty() {
                println!("No pilots found.");
            } else {
                println!("{:>5} {:<28} {:<12}", "ID", "NAME", "LICENSE");
                println!("{}", "-".repeat(47));
                for pilot in pilots {
                    println!(
                        "{:>5} {:<28} {:<12}",
                        pilot.id,
                        truncate(&pilot.full_name(), 28),
                        pilot.license_number.as_deref().unwrap_or("-")
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_instructor_command(service: &DropzoneService, cmd: InstructorCommands) -> Result<()> {
    match cmd {
        InstructorCommands::Add {
            funjumper_id,
            camera,
            notes,
        } => {
            let instructor = service
                .register_instructor(funjumper_id, true, camera, notes.as_deref())
                .await?;
            println!(
                "Registered tandem instructor #{} for fun-jumper #{}",
                instructor.id, instructor.funjumper_id
            );
        }

        InstructorCommands::List => {
            let instructors = service.list_instructors().await?;
            if instructors.is_empty() {
                println!("No tandem instructors found.");
            } else {
                println!("{:>5} {:<28} {:<8} {:<8}", "ID", "NAME", "TANDEM", "CAMERA");
                println!("{}", "-".repeat(52));
                for profile in instructors {
                    let i = &profile.instructor;
                    println!(
                        "{:>5} {:<28} {:<8} {:<8}",
                        i.id,
                        truncate(&profile.name, 28),
                        yes_no(i.tandem_rating),
                        yes_no(i.camera_rating)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_airplane_command(service: &DropzoneService, cmd: AirplaneCommands) -> Result<()> {
    match cmd {
        AirplaneCommands::Add {
            tail_number,
            slots,
            aircraft_type,
            fuel_type,
        } => {
            let airplane = service
                .register_airplane(&tail_number, aircraft_type.as_deref(), slots, fuel_type)
                .await?;
            println!(
                "Registered airplane: {} with {} slots (#{})",
                airplane.tail_number, airplane.slots, airplane.id
            );
        }

        AirplaneCommands::List => {
            let airplanes = service.list_airplanes().await?;
            if airplanes.is_empty() {
                println!("No airplanes found.");
            } else {
                println!("{:>5} {:<10} {:<20} {:>6}", "ID", "TAIL", "TYPE", "SLOTS");
                println!("{}", "-".repeat(44));
                for airplane in airplanes {
                    println!(
                        "{:>5} {:<10} {:<20} {:>6}",
                        airplane.id,
                        airplane.tail_number,
                        truncate(airplane.aircraft_type.as_deref().unwrap_or("-"), 20),
                        airplane.slots
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_jump_type_command(service: &DropzoneService, cmd: JumpTypeCommands) -> Result<()> {
    match cmd {
        JumpTypeCommands::Add { name, height_feet } => {
            let jump_type = service.register_jump_type(&name, height_feet).await?;
            println!(
                "Registered jump type: {} at {} ft (#{})",
                jump_type.name, jump_type.height_feet, jump_type.id
            );
        }

        JumpTypeCommands::List => {
            let jump_types = service.list_jump_types().await?;
            if jump_types.is_empty() {
                println!("No jump types found.");
            } else {
                println!("{:>5} {:<20} {:>8}", "ID", "NAME", "FEET");
                println!("{}", "-".repeat(35));
                for jt in jump_types {
                    println!("{:>5} {:<20} {:>8}", jt.id, truncate(&jt.name, 20), jt.height_feet);
                }
            }
        }
    }
    Ok(())
}

async fn run_fuel_type_command(service: &DropzoneService, cmd: FuelTypeCommands) -> Result<()> {
    match cmd {
        FuelTypeCommands::Add {
            name,
            density,
            price,
        } => {
            // kg/L with three decimals is g/L
            let density_g_per_l = parse_scaled(&density, 3)
                .map_err(|e| anyhow::anyhow!("Invalid density '{}': {}", density, e))?;
            let price_cents = parse_cents(&price)
                .map_err(|e| anyhow::anyhow!("Invalid price '{}': {}", price, e))?;

            let fuel_type = service
                .register_fuel_type(&name, density_g_per_l, price_cents)
                .await?;
            println!(
                "Registered fuel type: {} at {}/L (#{})",
                fuel_type.name,
                format_cents(fuel_type.price_per_liter),
                fuel_type.id
            );
        }

        FuelTypeCommands::List => {
            let fuel_types = service.list_fuel_types().await?;
            if fuel_types.is_empty() {
                println!("No fuel types found.");
            } else {
                println!("{:>5} {:<16} {:>10} {:>10}", "ID", "NAME", "KG/L", "PRICE/L");
                println!("{}", "-".repeat(44));
                for ft in fuel_types {
                    println!(
                        "{:>5} {:<16} {:>10} {:>10}",
                        ft.id,
                        truncate(&ft.name, 16),
                        format_kg(ft.density_g_per_l),
                        format_cents(ft.price_per_liter)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_tandem_command(service: &DropzoneService, cmd: TandemCommands) -> Result<()> {
    match cmd {
        TandemCommands::Checkin {
            first_name,
            last_name,
            email,
            phone,
            waiver,
            photos,
            videos,
            notes,
        } => {
            let check_in = service
                .check_in_tandem(
                    PassengerDetails {
                        first_name,
                        last_name,
                        email,
                        phone_number: phone,
                    },
                    BookingOptions {
                        waiver_signed: waiver,
                        photos,
                        videos,
                    },
                    notes.as_deref(),
                )
                .await?;
            println!(
                "Checked in {} (passenger #{}, tandem #{})",
                check_in.passenger.full_name(),
                check_in.passenger.id,
                check_in.booking.id
            );
            if !check_in.booking.waiver_signed {
                println!("Waiver not signed yet.");
            }
        }

        TandemCommands::Pending => {
            let pending = service.list_pending_bookings().await?;
            if pending.is_empty() {
                println!("No pending tandems.");
            } else {
                println!(
                    "{:>6} {:>9} {:<28} {:<7} {:<7} {:<7}",
                    "TANDEM", "PASSENGER", "NAME", "WAIVER", "PHOTOS", "VIDEOS"
                );
                println!("{}", "-".repeat(69));
                for (booking, name) in pending {
                    println!(
                        "{:>6} {:>9} {:<28} {:<7} {:<7} {:<7}",
                        booking.id,
                        booking.passenger_id,
                        truncate(&name, 28),
                        yes_no(booking.waiver_signed),
                        yes_no(booking.photos),
                        yes_no(booking.videos)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_load_command(service: &DropzoneService, cmd: LoadCommands) -> Result<()> {
    match cmd {
        LoadCommands::Create {
            airplane,
            pilot,
            takeoff,
            notes,
        } => {
            let takeoff_at = match takeoff {
                Some(s) => parse_datetime(&s)
                    .with_context(|| format!("Invalid takeoff time '{}'", s))?,
                None => Utc::now(),
            };
            let load = service
                .create_load(airplane, pilot, takeoff_at, notes.as_deref())
                .await?;
            println!(
                "Created load #{} at {}",
                load.id,
                load.takeoff_at.format("%Y-%m-%d %H:%M")
            );
        }

        LoadCommands::List { active } => {
            let status = active.then_some(LoadStatus::Active);
            let loads = service.list_loads(status).await?;
            if loads.is_empty() {
                println!("No loads found.");
            } else {
                println!(
                    "{:>5} {:<17} {:>8} {:>6} {:<9}",
                    "ID", "TAKEOFF", "AIRPLANE", "PILOT", "STATUS"
                );
                println!("{}", "-".repeat(49));
                for load in loads {
                    println!(
                        "{:>5} {:<17} {:>8} {:>6} {:<9}",
                        load.id,
                        load.takeoff_at.format("%Y-%m-%d %H:%M"),
                        load.airplane_id,
                        load.pilot_id,
                        load.status.as_str()
                    );
                }
            }
        }

        LoadCommands::Takeoff { id, time } => {
            let takeoff_at = parse_datetime(&time)
                .with_context(|| format!("Invalid takeoff time '{}'", time))?;
            let load = service.update_takeoff_time(id, takeoff_at).await?;
            println!(
                "Load #{} now takes off at {}",
                load.id,
                load.takeoff_at.format("%Y-%m-%d %H:%M")
            );
        }

        LoadCommands::Toggle { id } => {
            let status = service.toggle_load_status(id).await?;
            println!("Load #{} is now {}", id, status);
        }

        LoadCommands::Show { id } => {
            let manifest = service.get_load_manifest(id).await?;
            let load = &manifest.load;

            println!("Load #{} ({})", load.id, load.status);
            println!(
                "  Takeoff:  {}",
                load.takeoff_at.format("%Y-%m-%d %H:%M")
            );
            println!("  Airplane: {}", manifest.airplane.tail_number);
            println!(
                "  Slots:    {} of {} used, {} free",
                manifest.used_slots,
                manifest.airplane.slots,
                manifest.free_slots()
            );
            if let Some(notes) = &load.notes {
                println!("  Notes:    {}", notes);
            }

            if !manifest.fun_jumpers.is_empty() {
                println!();
                println!(
                    "  {:>5} {:<28} {:<12} {:<8} {:>7}",
                    "JUMP", "FUN-JUMPER", "TYPE", "GROUP", "TICKETS"
                );
                for slot in &manifest.fun_jumpers {
                    println!(
                        "  {:>5} {:<28} {:<12} {:<8} {:>7}",
                        slot.jump_id,
                        truncate(&slot.name, 28),
                        slot.jump_type.as_deref().unwrap_or("-"),
                        slot.group_id.as_deref().unwrap_or("-"),
                        slot.jump_ticket_balance
                    );
                }
            }

            if !manifest.tandems.is_empty() {
                println!();
                println!(
                    "  {:>5} {:>6} {:<22} {:<22} {:<6}",
                    "JUMP", "TANDEM", "PASSENGER", "INSTRUCTOR", "MEDIA"
                );
                for slot in &manifest.tandems {
                    let media = match (slot.photos, slot.videos) {
                        (true, true) => "P+V",
                        (true, false) => "P",
                        (false, true) => "V",
                        (false, false) => "-",
                    };
                    println!(
                        "  {:>5} {:>6} {:<22} {:<22} {:<6}",
                        slot.jump_id,
                        slot.tandem_id,
                        truncate(&slot.passenger_name, 22),
                        truncate(slot.instructor_name.as_deref().unwrap_or("-"), 22),
                        media
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_manifest_command(service: &DropzoneService, cmd: ManifestCommands) -> Result<()> {
    match cmd {
        ManifestCommands::AddJumper {
            load_id,
            funjumper_id,
            altitude,
            group,
            notes,
        } => {
            let result = service
                .add_funjumper_to_load(
                    load_id,
                    funjumper_id,
                    JumpDetails {
                        exit_altitude_ft: altitude,
                        group_id: group,
                        notes,
                    },
                )
                .await?;
            println!(
                "Manifested fun-jumper #{} on load #{} (jump #{})",
                funjumper_id, load_id, result.jump_id
            );
            println!("Jump-ticket balance: {}", result.balance);
            if result.balance < 0 {
                println!("Balance is negative: tickets are owed.");
            }
        }

        ManifestCommands::RemoveJumper { load_id, jump_id } => {
            let result = service.remove_funjumper_from_load(load_id, jump_id).await?;
            println!(
                "Removed fun-jumper #{} from load #{}",
                result.funjumper_id, load_id
            );
            println!("Jump-ticket balance: {}", result.balance);
        }

        ManifestCommands::AddTandem {
            load_id,
            passenger_id,
            instructor_id,
            notes,
        } => {
            let result = service
                .add_tandem_to_load(load_id, passenger_id, instructor_id, notes)
                .await?;
            println!(
                "Manifested tandem #{} on load #{} with instructor #{} (jump #{})",
                result.booking.id, load_id, instructor_id, result.jump_id
            );
            for entry in &result.entries {
                println!("  Credited {} {:+}", entry.kind, entry.amount);
            }
        }

        ManifestCommands::RemoveTandem { load_id, tandem_id } => {
            let reversals = service.remove_tandem_from_load(load_id, tandem_id).await?;
            println!("Removed tandem #{} from load #{}", tandem_id, load_id);
            for entry in &reversals {
                println!("  Reversed {} {:+}", entry.kind, entry.amount);
            }
        }
    }
    Ok(())
}

async fn run_ticket_command(service: &DropzoneService, cmd: TicketCommands) -> Result<()> {
    let (recorded, verb) = match cmd {
        TicketCommands::Buy {
            funjumper_id,
            quantity,
            notes,
        } => (
            service.buy_jump_tickets(funjumper_id, quantity, notes).await?,
            "Sold",
        ),
        TicketCommands::Cancel {
            funjumper_id,
            quantity,
            notes,
        } => (
            service
                .cancel_jump_tickets(funjumper_id, quantity, notes)
                .await?,
            "Refunded",
        ),
    };

    println!(
        "{} {} jump ticket(s) for {} (entry #{})",
        verb,
        recorded.entry.amount.abs(),
        recorded.entry.subject,
        recorded.entry.id
    );
    if let Some(balance) = recorded.ticket_balance {
        println!("Jump-ticket balance: {}", balance);
    }
    Ok(())
}

async fn run_ledger_command(service: &DropzoneService, cmd: LedgerCommands) -> Result<()> {
    match cmd {
        LedgerCommands::List { subject, limit } => {
            let subject = subject
                .map(|s| s.parse::<Subject>())
                .transpose()
                .map_err(|e| anyhow::anyhow!("Invalid subject: {}", e))?;
            let entries = service.list_entries(subject, limit).await?;

            if entries.is_empty() {
                println!("No ledger entries found.");
            } else {
                println!(
                    "{:>6} {:<17} {:<18} {:<16} {:>6} NOTES",
                    "ID", "DATE", "TYPE", "SUBJECT", "AMOUNT"
                );
                println!("{}", "-".repeat(80));
                for entry in entries {
                    println!(
                        "{:>6} {:<17} {:<18} {:<16} {:>6} {}",
                        entry.id,
                        entry.recorded_at.format("%Y-%m-%d %H:%M"),
                        entry.kind.as_str(),
                        entry.subject.to_string(),
                        entry.amount,
                        truncate(entry.notes.as_deref().unwrap_or(""), 40)
                    );
                }
            }
        }

        LedgerCommands::Show { id } => {
            let entry = service.get_entry(id).await?;
            println!("Ledger entry #{}", entry.id);
            println!("  Type:     {}", entry.kind);
            println!("  Subject:  {}", entry.subject);
            println!("  Amount:   {:+}", entry.amount);
            println!(
                "  Recorded: {}",
                entry.recorded_at.format("%Y-%m-%d %H:%M:%S")
            );
            if let Some(notes) = &entry.notes {
                println!("  Notes:    {}", notes);
            }
            if entry.kind.affects_ticket_balance() {
                println!("  Counts toward the jump-ticket balance.");
            }
        }
    }
    Ok(())
}

async fn run_balance_command(service: &DropzoneService, funjumper_id: Option<i64>) -> Result<()> {
    match funjumper_id {
        Some(id) => {
            let balance = service.get_ticket_balance(id).await?;
            println!(
                "{}: {} ticket(s)",
                balance.fun_jumper.full_name(),
                balance.cached
            );
            if !balance.is_consistent() {
                println!(
                    "Cached balance disagrees with ledger ({}). Run `dropzone rebuild-balances`.",
                    balance.ledger
                );
            }
        }
        None => {
            let jumpers = service.list_fun_jumpers().await?;
            if jumpers.is_empty() {
                println!("No fun-jumpers found.");
            } else {
                println!("{:<28} {:>8}", "FUN-JUMPER", "TICKETS");
                println!("{}", "-".repeat(37));
                for jumper in jumpers {
                    println!(
                        "{:<28} {:>8}",
                        truncate(&jumper.full_name(), 28),
                        jumper.jump_ticket_balance
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_check_command(service: &DropzoneService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Fun-jumpers: {}", report.fun_jumper_count);
    println!("Entries:     {}", report.entry_count);
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_refuel_command(service: &DropzoneService, cmd: RefuelCommands) -> Result<()> {
    match cmd {
        RefuelCommands::Add {
            airplane_id,
            fuel_type_id,
            liters,
            pilot,
        } => {
            let refuel = service
                .record_refuel(airplane_id, fuel_type_id, pilot, liters)
                .await?;
            println!(
                "Recorded refuel #{}: {} L for {} (+{} kg)",
                refuel.id,
                refuel.liters,
                format_cents(refuel.cost),
                format_kg(refuel.added_mass)
            );
        }

        RefuelCommands::List { airplane } => {
            let refuels = service.list_refuels(airplane).await?;
            if refuels.is_empty() {
                println!("No refuels found.");
            } else {
                println!(
                    "{:>5} {:<17} {:>8} {:>7} {:>10} {:>10}",
                    "ID", "DATE", "AIRPLANE", "LITERS", "COST", "KG"
                );
                println!("{}", "-".repeat(62));
                for refuel in refuels {
                    println!(
                        "{:>5} {:<17} {:>8} {:>7} {:>10} {:>10}",
                        refuel.id,
                        refuel.refueled_at.format("%Y-%m-%d %H:%M"),
                        refuel.airplane_id,
                        refuel.liters,
                        format_cents(refuel.cost),
                        format_kg(refuel.added_mass)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_report_command(service: &DropzoneService, cmd: ReportCommands) -> Result<()> {
    match cmd {
        ReportCommands::Kinds { format } => {
            let summary = service.ledger_summary().await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{:<20} {:>8} {:>10}", "TYPE", "COUNT", "TOTAL");
                println!("{}", "-".repeat(40));
                for row in summary {
                    println!("{:<20} {:>8} {:>10}", row.kind.as_str(), row.count, row.total);
                }
            }
        }

        ReportCommands::Instructors { format } => {
            let compensation = service.instructor_compensation().await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&compensation)?);
            } else if compensation.is_empty() {
                println!("No instructor credits recorded.");
            } else {
                println!(
                    "{:<28} {:>8} {:>8} {:>8}",
                    "INSTRUCTOR", "TANDEMS", "PHOTOS", "VIDEOS"
                );
                println!("{}", "-".repeat(55));
                for row in compensation {
                    println!(
                        "{:<28} {:>8} {:>8} {:>8}",
                        truncate(&row.name, 28),
                        row.tandem_jumps,
                        row.photos,
                        row.videos
                    );
                }
            }
        }

        ReportCommands::Daily { date, format } => {
            let date = match date {
                Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))?,
                None => Utc::now().date_naive(),
            };
            let resume = service.daily_operations(date).await?;

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&resume)?);
            } else if resume.loads.is_empty() {
                println!("No loads on {}.", resume.date);
            } else {
                println!("Operations on {}", resume.date);
                for load in &resume.loads {
                    println!();
                    println!(
                        "Load #{} at {} - {} flown by {} ({})",
                        load.load_id,
                        load.takeoff_at.format("%H:%M"),
                        load.tail_number,
                        load.pilot_name,
                        load.status.as_str()
                    );
                    for name in &load.fun_jumpers {
                        println!("  {}", name);
                    }
                    for tandem in &load.tandems {
                        println!(
                            "  {} (tandem with {})",
                            tandem.passenger,
                            tandem.instructor.as_deref().unwrap_or("no instructor")
                        );
                    }
                }
                println!();
                println!(
                    "Total: {} fun-jumper jump(s), {} tandem(s)",
                    resume.total_fun_jumpers, resume.total_tandems
                );
            }
        }
    }
    Ok(())
}

async fn run_export_command(
    service: &DropzoneService,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "ledger" => {
            let count = exporter.export_ledger_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} ledger entries", count);
            }
        }
        "balances" => {
            let count = exporter.export_balances_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} balances", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_snapshot_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported snapshot: {} fun-jumpers, {} ledger entries",
                    snapshot.fun_jumpers.len(),
                    snapshot.entries.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: ledger, balances, full",
                export_type
            );
        }
    }

    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM`, the latter read as UTC.
fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M")
        .context("Time must be RFC 3339 or YYYY-MM-DD HH:MM")?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime() {
        let dt = parse_datetime("2024-06-01 14:30").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-06-01T14:30:00+00:00");

        let dt = parse_datetime("2024-06-01T14:30:00+02:00").unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "12:30");

        assert!(parse_datetime("tomorrow").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long name indeed", 10), "a very ...");
    }

    #[test]
    fn test_cli_parses_manifest_command() {
        let cli = Cli::try_parse_from([
            "dropzone",
            "--database",
            "test.db",
            "manifest",
            "add-jumper",
            "3",
            "12",
            "--altitude",
            "13000",
        ])
        .unwrap();

        assert_eq!(cli.database, "test.db");
        match cli.command {
            Commands::Manifest(ManifestCommands::AddJumper {
                load_id,
                funjumper_id,
                altitude,
                ..
            }) => {
                assert_eq!((load_id, funjumper_id, altitude), (3, 12, Some(13000)));
            }
            _ => panic!("expected manifest add-jumper"),
        }
    }

    #[test]
    fn test_cli_parses_takeoff_and_daily_report() {
        let cli =
            Cli::try_parse_from(["dropzone", "load", "takeoff", "7", "2024-06-01 15:45"]).unwrap();
        match cli.command {
            Commands::Load(LoadCommands::Takeoff { id, time }) => {
                assert_eq!(id, 7);
                assert_eq!(
                    parse_datetime(&time).unwrap().to_rfc3339(),
                    "2024-06-01T15:45:00+00:00"
                );
            }
            _ => panic!("expected load takeoff"),
        }

        let cli = Cli::try_parse_from([
            "dropzone",
            "report",
            "daily",
            "2024-06-01",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Report(ReportCommands::Daily { date, format }) => {
                assert_eq!(date.as_deref(), Some("2024-06-01"));
                assert_eq!(format, "json");
            }
            _ => panic!("expected report daily"),
        }
    }
}
