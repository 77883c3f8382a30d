mod common;

use anyhow::Result;
use chrono::NaiveDate;
use common::{check_in, instructor, jumper_with_tickets, parse_date, test_service, Airfield};
use dropzone::application::{AppError, JumpDetails};
use dropzone::domain::{EntryKind, LoadStatus};
use dropzone::io::{Exporter, LedgerSnapshot};

#[tokio::test]
async fn test_roster_registration_and_search() -> Result<()> {
    let (service, _temp) = test_service().await?;

    service
        .register_fun_jumper("Anna", "Berg", Some("D-12345"), Some("anna@example.com"))
        .await?;
    service
        .register_fun_jumper("Carl", "Dahl", None, None)
        .await?;

    let all = service.list_fun_jumpers().await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].last_name, "Berg");

    let found = service.search_fun_jumpers("carl").await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].full_name(), "Carl Dahl");

    let missing = service.get_fun_jumper(999).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_instructor_requires_existing_fun_jumper() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service.register_instructor(999, true, false, None).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let jumper = service
        .register_fun_jumper("Tara", "Tandem", None, None)
        .await?;
    service
        .register_instructor(jumper.id, true, true, Some("AFF too"))
        .await?;

    // One instructor rating per fun-jumper
    let result = service.register_instructor(jumper.id, true, false, None).await;
    assert!(matches!(result, Err(AppError::ConstraintViolation(_))));

    let instructors = service.list_instructors().await?;
    assert_eq!(instructors.len(), 1);
    assert_eq!(instructors[0].name, "Tara Tandem");
    assert!(instructors[0].instructor.camera_rating);

    Ok(())
}

#[tokio::test]
async fn test_load_status_toggle_and_filter() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let second = field.another_load(&service).await?;

    let load = service.get_load(field.load_id).await?;
    assert_eq!(load.status, LoadStatus::Active);
    assert_eq!(load.takeoff_at, parse_date("2024-06-01"));

    assert_eq!(
        service.toggle_load_status(field.load_id).await?,
        LoadStatus::Inactive
    );

    let active = service.list_loads(Some(LoadStatus::Active)).await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second);
    assert_eq!(service.list_loads(None).await?.len(), 2);

    assert_eq!(
        service.toggle_load_status(field.load_id).await?,
        LoadStatus::Active
    );

    let result = service.toggle_load_status(999).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_update_takeoff_time() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let later = parse_date("2024-06-01") + chrono::Duration::hours(3);

    let load = service.update_takeoff_time(field.load_id, later).await?;
    assert_eq!(load.takeoff_at, later);
    assert_eq!(service.get_load(field.load_id).await?.takeoff_at, later);

    let result = service.update_takeoff_time(999, later).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_fun_jumper_jump_history_and_detail() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    service.register_jump_type("Full altitude", 13000).await?;
    let jumper = jumper_with_tickets(&service, "Logbook", 5).await?;

    service
        .add_funjumper_to_load(
            field.load_id,
            jumper.id,
            JumpDetails {
                exit_altitude_ft: Some(13000),
                group_id: Some("B".into()),
                notes: None,
            },
        )
        .await?;
    let second = field.another_load(&service).await?;
    service
        .add_funjumper_to_load(second, jumper.id, JumpDetails::default())
        .await?;

    let jumps = service.list_jumps_for_fun_jumper(jumper.id).await?;
    assert_eq!(jumps.len(), 2);
    assert_eq!(jumps[0].load_id, second);
    assert_eq!(jumps[0].height_feet, None);
    assert_eq!(jumps[1].load_id, field.load_id);
    assert_eq!(jumps[1].height_feet, Some(13000));
    assert_eq!(jumps[1].tail_number, "D-FLY1");
    assert_eq!(jumps[1].group_id.as_deref(), Some("B"));
    assert_eq!(jumps[1].takeoff_at, parse_date("2024-06-01"));

    let detail = service.fun_jumper_detail(jumper.id).await?;
    assert_eq!(detail.fun_jumper.jump_ticket_balance, 3);
    assert_eq!(detail.jumps.len(), 2);
    assert_eq!(detail.entries.len(), 3);
    assert_eq!(detail.entries[0].kind, EntryKind::Jump);
    assert_eq!(detail.entries[2].kind, EntryKind::BuyJumpticket);

    let result = service.list_jumps_for_fun_jumper(999).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
    let result = service.fun_jumper_detail(999).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_daily_operations_report() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let tara = instructor(&service, "Tara").await?;
    let (passenger, _) = check_in(&service, "Penny", false, false).await?;

    let anna = jumper_with_tickets(&service, "Anna", 2).await?;
    let ben = jumper_with_tickets(&service, "Ben", 2).await?;
    service
        .add_funjumper_to_load(field.load_id, anna.id, JumpDetails::default())
        .await?;
    service
        .add_funjumper_to_load(field.load_id, ben.id, JumpDetails::default())
        .await?;
    service
        .add_tandem_to_load(field.load_id, passenger, tara, None)
        .await?;

    // Same day, later, inactive: still part of the day
    let afternoon = service
        .create_load(
            field.airplane_id,
            field.pilot_id,
            parse_date("2024-06-01") + chrono::Duration::hours(5),
            Some("Sunset"),
        )
        .await?;
    service.toggle_load_status(afternoon.id).await?;

    // Next day, not part of the resume
    let tomorrow = field.another_load(&service).await?;
    service
        .add_funjumper_to_load(tomorrow, anna.id, JumpDetails::default())
        .await?;

    let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let resume = service.daily_operations(day).await?;

    assert_eq!(resume.date, day);
    assert_eq!(resume.loads.len(), 2);
    assert_eq!(resume.total_fun_jumpers, 2);
    assert_eq!(resume.total_tandems, 1);

    let first = &resume.loads[0];
    assert_eq!(first.load_id, field.load_id);
    assert_eq!(first.pilot_name, "Paula Pilot");
    assert_eq!(first.tail_number, "D-FLY1");
    assert_eq!(first.fun_jumpers, vec!["Anna Tester", "Ben Tester"]);
    assert_eq!(first.tandems.len(), 1);
    assert_eq!(first.tandems[0].passenger, "Penny Passenger");
    assert_eq!(first.tandems[0].instructor.as_deref(), Some("Tara Instructor"));

    let second = &resume.loads[1];
    assert_eq!(second.load_id, afternoon.id);
    assert_eq!(second.status, LoadStatus::Inactive);
    assert_eq!(second.notes.as_deref(), Some("Sunset"));
    assert!(second.fun_jumpers.is_empty());

    let quiet = service
        .daily_operations(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap())
        .await?;
    assert!(quiet.loads.is_empty());
    assert_eq!(quiet.total_fun_jumpers, 0);

    Ok(())
}

#[tokio::test]
async fn test_airplane_validation_and_uniqueness() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let result = service.register_airplane("D-ZERO", None, 0, None).await;
    assert!(matches!(result, Err(AppError::InvalidAmount(_))));

    service.register_airplane("D-ONE", None, 4, None).await?;
    let result = service.register_airplane("D-ONE", None, 4, None).await;
    assert!(matches!(result, Err(AppError::ConstraintViolation(_))));

    assert_eq!(service.list_airplanes().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_refuel_freezes_price_and_computes_mass() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let jet_a1 = service.register_fuel_type("Jet A-1", 800, 185).await?;

    let refuel = service
        .record_refuel(field.airplane_id, jet_a1.id, Some(field.pilot_id), 200)
        .await?;

    assert_eq!(refuel.liters, 200);
    assert_eq!(refuel.price_per_liter, 185);
    assert_eq!(refuel.cost, 37_000);
    assert_eq!(refuel.added_mass, 160_000);

    let refuels = service.list_refuels(Some(field.airplane_id)).await?;
    assert_eq!(refuels.len(), 1);
    assert_eq!(refuels[0].cost, 37_000);
    assert_eq!(refuels[0].pilot_id, Some(field.pilot_id));

    let result = service
        .record_refuel(field.airplane_id, jet_a1.id, None, 0)
        .await;
    assert!(matches!(result, Err(AppError::InvalidAmount(_))));

    let result = service.record_refuel(field.airplane_id, 999, None, 10).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_ledger_summary_by_kind() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let jumper = jumper_with_tickets(&service, "Summary", 10).await?;

    service
        .add_funjumper_to_load(field.load_id, jumper.id, JumpDetails::default())
        .await?;
    let second = field.another_load(&service).await?;
    service
        .add_funjumper_to_load(second, jumper.id, JumpDetails::default())
        .await?;

    let summary = service.ledger_summary().await?;
    let jumps = summary
        .iter()
        .find(|row| row.kind == EntryKind::Jump)
        .unwrap();
    assert_eq!((jumps.count, jumps.total), (2, -2));

    let bought = summary
        .iter()
        .find(|row| row.kind == EntryKind::BuyJumpticket)
        .unwrap();
    assert_eq!((bought.count, bought.total), (1, 10));

    Ok(())
}

#[tokio::test]
async fn test_export_ledger_and_balances_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let jumper = jumper_with_tickets(&service, "Export", 3).await?;
    service
        .add_funjumper_to_load(field.load_id, jumper.id, JumpDetails::default())
        .await?;

    let exporter = Exporter::new(&service);

    let mut ledger = Vec::new();
    let count = exporter.export_ledger_csv(&mut ledger).await?;
    assert_eq!(count, 2);
    let ledger = String::from_utf8(ledger)?;
    let lines: Vec<&str> = ledger.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("id,transaction_datetime,transaction_type"));
    assert!(lines[1].contains(",buy_jumpticket,funjumper,"));
    assert!(lines[2].contains(",jump,funjumper,"));

    let mut balances = Vec::new();
    exporter.export_balances_csv(&mut balances).await?;
    let balances = String::from_utf8(balances)?;
    assert!(balances.contains(&format!("{},Export Tester,2,2", jumper.id)));

    Ok(())
}

#[tokio::test]
async fn test_export_snapshot_json() -> Result<()> {
    let (service, _temp) = test_service().await?;
    jumper_with_tickets(&service, "Snap", 4).await?;

    let mut out = Vec::new();
    let snapshot = Exporter::new(&service).export_snapshot_json(&mut out).await?;
    assert_eq!(snapshot.fun_jumpers.len(), 1);
    assert_eq!(snapshot.entries.len(), 1);

    let parsed: LedgerSnapshot = serde_json::from_slice(&out)?;
    assert_eq!(parsed.fun_jumpers[0].jump_ticket_balance, 4);
    assert_eq!(parsed.entries[0].kind, EntryKind::BuyJumpticket);
    assert_eq!(parsed.entries, snapshot.entries);

    Ok(())
}
