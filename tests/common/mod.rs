// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use dropzone::application::{BookingOptions, DropzoneService, PassengerDetails};
use dropzone::config::ServiceConfig;
use dropzone::domain::{FunJumper, InstructorId, LoadId, PassengerId, Subject, TandemId};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(DropzoneService, TempDir)> {
    test_service_with(ServiceConfig::default()).await
}

pub async fn test_service_with(config: ServiceConfig) -> Result<(DropzoneService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = DropzoneService::init_with(db_path.to_str().unwrap(), config).await?;
    Ok((service, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
        .and_utc()
}

/// Register a fun-jumper and sell them `tickets` jump tickets.
pub async fn jumper_with_tickets(
    service: &DropzoneService,
    first_name: &str,
    tickets: i64,
) -> Result<FunJumper> {
    let jumper = service
        .register_fun_jumper(first_name, "Tester", None, None)
        .await?;
    if tickets > 0 {
        service.buy_jump_tickets(jumper.id, tickets, None).await?;
    }
    Ok(service.get_fun_jumper(jumper.id).await?)
}

/// Number of ledger rows booked against `subject`, straight from storage.
pub async fn entry_count(service: &DropzoneService, subject: Subject) -> Result<i64> {
    Ok(service
        .repository()
        .count_entries_for_subject(subject)
        .await?)
}

/// Test fixture: one airplane, one pilot and one active load
pub struct Airfield {
    pub airplane_id: i64,
    pub pilot_id: i64,
    pub load_id: LoadId,
}

impl Airfield {
    pub async fn create(service: &DropzoneService) -> Result<Self> {
        let airplane = service
            .register_airplane("D-FLY1", Some("Cessna 208"), 16, None)
            .await?;
        let pilot = service.register_pilot("Paula", "Pilot", Some("CPL-1")).await?;
        let load = service
            .create_load(airplane.id, pilot.id, parse_date("2024-06-01"), None)
            .await?;
        Ok(Self {
            airplane_id: airplane.id,
            pilot_id: pilot.id,
            load_id: load.id,
        })
    }

    pub async fn another_load(&self, service: &DropzoneService) -> Result<LoadId> {
        let load = service
            .create_load(self.airplane_id, self.pilot_id, parse_date("2024-06-02"), None)
            .await?;
        Ok(load.id)
    }
}

/// Register a fun-jumper rated as tandem instructor.
pub async fn instructor(service: &DropzoneService, first_name: &str) -> Result<InstructorId> {
    let jumper = service
        .register_fun_jumper(first_name, "Instructor", Some("TI-1"), None)
        .await?;
    let instructor = service
        .register_instructor(jumper.id, true, false, None)
        .await?;
    Ok(instructor.id)
}

/// Check in a tandem passenger with the given media add-ons.
pub async fn check_in(
    service: &DropzoneService,
    first_name: &str,
    photos: bool,
    videos: bool,
) -> Result<(PassengerId, TandemId)> {
    let check_in = service
        .check_in_tandem(
            PassengerDetails {
                first_name: first_name.to_string(),
                last_name: "Passenger".to_string(),
                email: None,
                phone_number: None,
            },
            BookingOptions {
                waiver_signed: true,
                photos,
                videos,
            },
            None,
        )
        .await?;
    Ok((check_in.passenger.id, check_in.booking.id))
}
