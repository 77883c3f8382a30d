mod common;

use anyhow::Result;
use common::{check_in, entry_count, instructor, test_service, test_service_with, Airfield};
use dropzone::application::AppError;
use dropzone::config::ServiceConfig;
use dropzone::domain::{EntryKind, Subject};

#[tokio::test]
async fn test_check_in_creates_pending_booking() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let (passenger, tandem) = check_in(&service, "Penny", true, false).await?;

    let pending = service.list_pending_bookings().await?;
    assert_eq!(pending.len(), 1);
    let (booking, name) = &pending[0];
    assert_eq!(booking.id, tandem);
    assert_eq!(booking.passenger_id, passenger);
    assert!(booking.is_pending());
    assert!(booking.photos);
    assert!(!booking.videos);
    assert_eq!(name, "Penny Passenger");

    Ok(())
}

#[tokio::test]
async fn test_tandem_with_photos_credits_jump_and_photos() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let instructor_id = instructor(&service, "Ivan").await?;
    let (passenger, tandem) = check_in(&service, "Photo", true, false).await?;

    let result = service
        .add_tandem_to_load(field.load_id, passenger, instructor_id, None)
        .await?;

    assert_eq!(result.booking.id, tandem);
    assert_eq!(result.booking.instructor_id, Some(instructor_id));

    let kinds: Vec<EntryKind> = result.entries.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EntryKind::TandemJump, EntryKind::TandemPhotos]);
    assert!(result.entries.iter().all(|e| e.amount == 1));

    let subject = Subject::Instructor(instructor_id);
    assert_eq!(entry_count(&service, subject).await?, 2);
    let stored = service.list_entries(Some(subject), None).await?;
    assert!(!stored.iter().any(|e| e.kind == EntryKind::TandemVideos));

    // Booking is no longer pending
    assert!(service.list_pending_bookings().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_failed_media_credit_rolls_back_tandem() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let instructor_id = instructor(&service, "Ingo").await?;
    let (passenger, tandem) = check_in(&service, "Flash", true, false).await?;

    sqlx::raw_sql(
        r#"
        CREATE TRIGGER fail_photo_credit
        BEFORE INSERT ON transactions
        WHEN NEW.transaction_type = 'tandem_photos'
        BEGIN
            SELECT RAISE(ABORT, 'injected photo credit failure');
        END;
        "#,
    )
    .execute(service.repository().pool())
    .await?;

    let result = service
        .add_tandem_to_load(field.load_id, passenger, instructor_id, None)
        .await;
    assert!(matches!(result, Err(AppError::Persistence(_))));

    // Neither the tandem credit nor the jump survived
    assert_eq!(entry_count(&service, Subject::Instructor(instructor_id)).await?, 0);
    let jumps: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jumps")
        .fetch_one(service.repository().pool())
        .await?;
    assert_eq!(jumps, 0);
    assert!(service.get_load_manifest(field.load_id).await?.tandems.is_empty());

    // Booking is still waiting for a load
    let pending = service.list_pending_bookings().await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].0.id, tandem);
    assert_eq!(pending[0].0.instructor_id, None);

    Ok(())
}

#[tokio::test]
async fn test_tandem_credits_do_not_touch_ticket_balances() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let instructor_id = instructor(&service, "Ivy").await?;
    let (passenger, _) = check_in(&service, "Media", true, true).await?;

    let result = service
        .add_tandem_to_load(field.load_id, passenger, instructor_id, None)
        .await?;
    assert_eq!(result.entries.len(), 3);

    let profile = service
        .list_instructors()
        .await?
        .into_iter()
        .find(|p| p.instructor.id == instructor_id)
        .unwrap();
    let balance = service
        .get_ticket_balance(profile.instructor.funjumper_id)
        .await?;
    assert_eq!(balance.cached, 0);
    assert_eq!(balance.ledger, 0);

    Ok(())
}

#[tokio::test]
async fn test_tandem_without_pending_booking_fails() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let instructor_id = instructor(&service, "Ida").await?;
    let (passenger, _) = check_in(&service, "Once", false, false).await?;

    service
        .add_tandem_to_load(field.load_id, passenger, instructor_id, None)
        .await?;

    // The only booking is already assigned
    let result = service
        .add_tandem_to_load(field.load_id, passenger, instructor_id, None)
        .await;
    assert!(matches!(result, Err(AppError::NoBookingFound(p)) if p == passenger));

    let result = service
        .add_tandem_to_load(field.load_id, 999, instructor_id, None)
        .await;
    assert!(matches!(result, Err(AppError::NoBookingFound(999))));

    assert_eq!(
        entry_count(&service, Subject::Instructor(instructor_id)).await?,
        1
    );

    Ok(())
}

#[tokio::test]
async fn test_remove_tandem_keeps_compensation_by_default() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let instructor_id = instructor(&service, "Otto").await?;
    let (passenger, tandem) = check_in(&service, "Keep", true, true).await?;

    service
        .add_tandem_to_load(field.load_id, passenger, instructor_id, None)
        .await?;
    let reversals = service
        .remove_tandem_from_load(field.load_id, tandem)
        .await?;

    assert!(reversals.is_empty());
    assert_eq!(
        entry_count(&service, Subject::Instructor(instructor_id)).await?,
        3
    );

    let manifest = service.get_load_manifest(field.load_id).await?;
    assert!(manifest.tandems.is_empty());

    // The booking is pending again and can be reassigned
    let pending = service.list_pending_bookings().await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].0.id, tandem);

    Ok(())
}

#[tokio::test]
async fn test_remove_tandem_reverses_compensation_when_enabled() -> Result<()> {
    let config = ServiceConfig::default().with_tandem_reversal(true);
    let (service, _temp) = test_service_with(config).await?;
    let field = Airfield::create(&service).await?;
    let instructor_id = instructor(&service, "Rita").await?;
    let (passenger, tandem) = check_in(&service, "Undo", true, false).await?;

    service
        .add_tandem_to_load(field.load_id, passenger, instructor_id, None)
        .await?;
    let reversals = service
        .remove_tandem_from_load(field.load_id, tandem)
        .await?;

    let kinds: Vec<EntryKind> = reversals.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EntryKind::TandemJump, EntryKind::TandemPhotos]);
    assert!(reversals.iter().all(|e| e.amount == -1));

    let compensation = service.instructor_compensation().await?;
    assert_eq!(compensation.len(), 1);
    assert_eq!(compensation[0].tandem_jumps, 0);
    assert_eq!(compensation[0].photos, 0);

    Ok(())
}

#[tokio::test]
async fn test_remove_tandem_not_on_load_is_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let (_, tandem) = check_in(&service, "Ground", false, false).await?;

    let result = service.remove_tandem_from_load(field.load_id, tandem).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let result = service.remove_tandem_from_load(field.load_id, 999).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_instructor_compensation_report() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let field = Airfield::create(&service).await?;
    let ivan = instructor(&service, "Ivan").await?;
    let (first, _) = check_in(&service, "First", true, true).await?;
    let (second, _) = check_in(&service, "Second", false, true).await?;

    service
        .add_tandem_to_load(field.load_id, first, ivan, None)
        .await?;
    let next_load = field.another_load(&service).await?;
    service
        .add_tandem_to_load(next_load, second, ivan, None)
        .await?;

    let compensation = service.instructor_compensation().await?;
    assert_eq!(compensation.len(), 1);
    let row = &compensation[0];
    assert_eq!(row.instructor_id, ivan);
    assert_eq!(row.name, "Ivan Instructor");
    assert_eq!((row.tandem_jumps, row.photos, row.videos), (2, 1, 2));

    Ok(())
}
