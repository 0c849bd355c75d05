use assert_matches::assert_matches;
use chrono::Duration;
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentError, CreateAppointmentRequest, CreateRescheduleRequest, RescheduleDayRequest,
    ResolveRescheduleRequest,
};
use appointment_cell::{AppointmentLifecycleService, RescheduleCoordinator};
use shared_config::{BulkReschedulePolicy, SchedulingRules};
use shared_database::SchedulingStore;
use shared_models::scheduling::{
    AppointmentRequest, AppointmentStatus, DayOfWeek, ParticipantRole, RescheduleSource,
    RescheduleStatus,
};
use shared_utils::test_utils::{next_weekday, TestContext, TestUser};
use shared_utils::SchedulingEvent;

async fn book(
    ctx: &TestContext,
    patient: &TestUser,
    doctor: &TestUser,
    day: DayOfWeek,
    time: &str,
) -> AppointmentRequest {
    AppointmentLifecycleService::new(&ctx.state)
        .create_request(
            &patient.actor(),
            CreateAppointmentRequest {
                patient_id: patient.id.clone(),
                doctor_id: doctor.id.clone(),
                requested_date: next_weekday(day).to_string(),
                requested_time: time.to_string(),
                reason: "Consultation".to_string(),
                priority: None,
                notes: None,
            },
        )
        .await
        .unwrap()
}

async fn book_confirmed(
    ctx: &TestContext,
    patient: &TestUser,
    doctor: &TestUser,
    day: DayOfWeek,
    time: &str,
) -> AppointmentRequest {
    let appointment = book(ctx, patient, doctor, day, time).await;
    AppointmentLifecycleService::new(&ctx.state)
        .update_status(appointment.id, AppointmentStatus::Confirmed, &doctor.actor(), None)
        .await
        .unwrap()
        .appointment
}

fn proposal(new_date: &str, new_time: &str) -> CreateRescheduleRequest {
    CreateRescheduleRequest {
        new_date: new_date.to_string(),
        new_time: new_time.to_string(),
        reason: "Travel".to_string(),
        notes: None,
    }
}

fn decision(status: &str) -> ResolveRescheduleRequest {
    ResolveRescheduleRequest {
        status: status.to_string(),
        notes: None,
    }
}

#[tokio::test]
async fn test_pending_appointment_cannot_be_rescheduled() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;
    let appointment = book(&ctx, &patient, &doctor, DayOfWeek::Monday, "10:00").await;

    let result = RescheduleCoordinator::new(&ctx.state)
        .request_reschedule(appointment.id, &patient.actor(), proposal("2031-01-06", "11:00"))
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidState(msg)) if msg == "Can only reschedule confirmed appointments");
}

#[tokio::test]
async fn test_request_leaves_appointment_untouched() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;
    let appointment = book_confirmed(&ctx, &patient, &doctor, DayOfWeek::Monday, "10:00").await;

    let request = RescheduleCoordinator::new(&ctx.state)
        .request_reschedule(appointment.id, &patient.actor(), proposal("2031-01-06", "11:00"))
        .await
        .unwrap();

    assert_eq!(request.status, RescheduleStatus::Pending);
    assert_eq!(request.requested_by_role, ParticipantRole::Patient);
    assert_eq!(request.proposed_by, RescheduleSource::Single);
    assert_eq!(request.current_date, appointment.requested_date);
    assert_eq!(request.current_time, "10:00");
    assert_eq!(request.new_time, "11:00");

    let stored = ctx.store.get_appointment(appointment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Confirmed);
    assert_eq!(stored.requested_time, "10:00");
}

#[tokio::test]
async fn test_request_rejects_strangers_and_bad_input() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    let stranger = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;
    let appointment = book_confirmed(&ctx, &patient, &doctor, DayOfWeek::Monday, "10:00").await;
    let coordinator = RescheduleCoordinator::new(&ctx.state);

    assert_matches!(
        coordinator
            .request_reschedule(appointment.id, &stranger.actor(), proposal("2031-01-06", "11:00"))
            .await,
        Err(AppointmentError::Forbidden(_))
    );
    assert_matches!(
        coordinator
            .request_reschedule(appointment.id, &doctor.actor(), proposal("2031-01-06", "7pm"))
            .await,
        Err(AppointmentError::Validation(_))
    );
    assert_matches!(
        coordinator
            .request_reschedule(uuid::Uuid::new_v4(), &doctor.actor(), proposal("2031-01-06", "11:00"))
            .await,
        Err(AppointmentError::NotFound(_))
    );
}

#[tokio::test]
async fn test_approval_moves_appointment_and_marks_rescheduled() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;
    let appointment = book_confirmed(&ctx, &patient, &doctor, DayOfWeek::Monday, "10:00").await;
    let coordinator = RescheduleCoordinator::new(&ctx.state);

    let new_date = appointment.requested_date + Duration::days(7);
    let request = coordinator
        .request_reschedule(appointment.id, &patient.actor(), proposal(&new_date.to_string(), "13:30"))
        .await
        .unwrap();

    let (resolved, moved) = coordinator
        .resolve_reschedule(request.id, &doctor.actor(), decision("approved"))
        .await
        .unwrap();

    assert_eq!(resolved.status, RescheduleStatus::Approved);
    assert!(resolved.resolved_at.is_some());
    assert_eq!(moved.status, AppointmentStatus::Rescheduled);
    assert_eq!(moved.requested_date, new_date);
    assert_eq!(moved.requested_time, "13:30");

    // A resolved request stays resolved.
    assert_matches!(
        coordinator
            .resolve_reschedule(request.id, &patient.actor(), decision("REJECTED"))
            .await,
        Err(AppointmentError::InvalidState(_))
    );

    // Re-confirming keeps the consultation created on first confirmation.
    let reconfirmed = AppointmentLifecycleService::new(&ctx.state)
        .update_status(appointment.id, AppointmentStatus::Confirmed, &doctor.actor(), None)
        .await
        .unwrap();
    assert_eq!(reconfirmed.appointment.status, AppointmentStatus::Confirmed);
    let original = ctx
        .store
        .find_consultation_by_appointment(appointment.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reconfirmed.consultation.unwrap().id, original.id);
}

#[tokio::test]
async fn test_rejection_keeps_slot() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;
    let appointment = book_confirmed(&ctx, &patient, &doctor, DayOfWeek::Monday, "10:00").await;
    let coordinator = RescheduleCoordinator::new(&ctx.state);

    let request = coordinator
        .request_reschedule(appointment.id, &doctor.actor(), proposal("2031-01-06", "11:00"))
        .await
        .unwrap();
    assert_eq!(request.requested_by_role, ParticipantRole::Doctor);

    let (resolved, current) = coordinator
        .resolve_reschedule(request.id, &patient.actor(), decision("REJECTED"))
        .await
        .unwrap();

    assert_eq!(resolved.status, RescheduleStatus::Rejected);
    assert_eq!(current.status, AppointmentStatus::Confirmed);
    assert_eq!(current.requested_time, "10:00");

    let events = ctx.events.events().await;
    assert_matches!(
        events.last(),
        Some(SchedulingEvent::RescheduleResolved { status: RescheduleStatus::Rejected, .. })
    );
}

#[tokio::test]
async fn test_resolve_validates_decision_and_state() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    let stranger = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;
    let appointment = book_confirmed(&ctx, &patient, &doctor, DayOfWeek::Monday, "10:00").await;
    let coordinator = RescheduleCoordinator::new(&ctx.state);

    let request = coordinator
        .request_reschedule(appointment.id, &patient.actor(), proposal("2031-01-06", "11:00"))
        .await
        .unwrap();

    assert_matches!(
        coordinator
            .resolve_reschedule(request.id, &doctor.actor(), decision("MAYBE"))
            .await,
        Err(AppointmentError::Validation(_))
    );
    assert_matches!(
        coordinator
            .resolve_reschedule(request.id, &stranger.actor(), decision("APPROVED"))
            .await,
        Err(AppointmentError::Forbidden(_))
    );

    AppointmentLifecycleService::new(&ctx.state)
        .cancel(appointment.id, &patient.actor(), "Moved away")
        .await
        .unwrap();
    assert_matches!(
        coordinator
            .resolve_reschedule(request.id, &doctor.actor(), decision("APPROVED"))
            .await,
        Err(AppointmentError::InvalidState(_))
    );
}

#[tokio::test]
async fn test_history_is_newest_first() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    let stranger = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;
    let appointment = book_confirmed(&ctx, &patient, &doctor, DayOfWeek::Monday, "10:00").await;
    let coordinator = RescheduleCoordinator::new(&ctx.state);

    let first = coordinator
        .request_reschedule(appointment.id, &patient.actor(), proposal("2031-01-06", "11:00"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = coordinator
        .request_reschedule(appointment.id, &doctor.actor(), proposal("2031-01-13", "12:00"))
        .await
        .unwrap();

    let history = coordinator
        .list_for_appointment(appointment.id, &patient.actor())
        .await
        .unwrap();
    let ids: Vec<_> = history.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    assert_matches!(
        coordinator.list_for_appointment(appointment.id, &stranger.actor()).await,
        Err(AppointmentError::Forbidden(_))
    );
}

#[tokio::test]
async fn test_day_sweep_marks_appointments_rescheduled() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let first = ctx.patient().await;
    let second = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Thursday, "09:00", "17:00").await;
    ctx.open_day(&doctor, DayOfWeek::Friday, "09:00", "17:00").await;

    let pending = book(&ctx, &first, &doctor, DayOfWeek::Thursday, "09:00").await;
    let confirmed = book_confirmed(&ctx, &second, &doctor, DayOfWeek::Thursday, "14:00").await;
    let friday = book(&ctx, &first, &doctor, DayOfWeek::Friday, "09:00").await;
    let cancelled = book(&ctx, &second, &doctor, DayOfWeek::Thursday, "11:00").await;
    AppointmentLifecycleService::new(&ctx.state)
        .cancel(cancelled.id, &second.actor(), "Not needed")
        .await
        .unwrap();

    let count = RescheduleCoordinator::new(&ctx.state)
        .reschedule_day(
            &doctor.actor(),
            RescheduleDayRequest {
                day_of_week: "Thursday".to_string(),
                reason: "Conference".to_string(),
                new_date: None,
                new_time: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(count, 2);

    for id in [pending.id, confirmed.id] {
        let stored = ctx.store.get_appointment(id).await.unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Rescheduled);

        let proposals = ctx.store.list_reschedules(id).await.unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].proposed_by, RescheduleSource::DaySweep);
        assert_eq!(proposals[0].reason, "Conference");
        // Same-date placeholder when no new slot is given.
        assert_eq!(proposals[0].new_date, stored.requested_date);
    }

    let untouched = ctx.store.get_appointment(friday.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, AppointmentStatus::Pending);
    let still_cancelled = ctx.store.get_appointment(cancelled.id).await.unwrap().unwrap();
    assert_eq!(still_cancelled.status, AppointmentStatus::Cancelled);

    let events = ctx.events.events().await;
    assert_matches!(
        events.last(),
        Some(SchedulingEvent::DaySwept { day_of_week: DayOfWeek::Thursday, patient_ids, .. }) if patient_ids.len() == 2
    );
}

#[tokio::test]
async fn test_day_sweep_with_patient_approval_policy_only_proposes() {
    let ctx = TestContext::with_rules(SchedulingRules {
        bulk_policy: BulkReschedulePolicy::PatientApproval,
        ..SchedulingRules::default()
    });
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Thursday, "09:00", "17:00").await;
    let confirmed = book_confirmed(&ctx, &patient, &doctor, DayOfWeek::Thursday, "10:00").await;
    let coordinator = RescheduleCoordinator::new(&ctx.state);

    let new_date = confirmed.requested_date + Duration::days(1);
    let count = coordinator
        .reschedule_day(
            &doctor.actor(),
            RescheduleDayRequest {
                day_of_week: "Thursday".to_string(),
                reason: "Leave".to_string(),
                new_date: Some(new_date.to_string()),
                new_time: Some("15:00".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(count, 1);

    let stored = ctx.store.get_appointment(confirmed.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Confirmed);

    let proposals = ctx.store.list_reschedules(confirmed.id).await.unwrap();
    assert_eq!(proposals[0].status, RescheduleStatus::Pending);
    assert_eq!(proposals[0].new_date, new_date);
    assert_eq!(proposals[0].new_time, "15:00");

    // The patient approves the proposal through the single path.
    let (_, moved) = coordinator
        .resolve_reschedule(proposals[0].id, &patient.actor(), decision("APPROVED"))
        .await
        .unwrap();
    assert_eq!(moved.status, AppointmentStatus::Rescheduled);
    assert_eq!(moved.requested_date, new_date);
}

#[tokio::test]
async fn test_day_sweep_ignores_appointments_past_lookahead() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    ctx.open_day(&doctor, DayOfWeek::Monday, "09:00", "17:00").await;
    let near = book_confirmed(&ctx, &patient, &doctor, DayOfWeek::Monday, "10:00").await;
    // Five Mondays later, beyond the 28-day lookahead.
    let far = ctx
        .store
        .insert_appointment(AppointmentRequest {
            id: Uuid::new_v4(),
            requested_date: near.requested_date + Duration::days(35),
            ..near.clone()
        })
        .await
        .unwrap();

    let count = RescheduleCoordinator::new(&ctx.state)
        .reschedule_day(
            &doctor.actor(),
            RescheduleDayRequest {
                day_of_week: "Monday".to_string(),
                reason: "Conference".to_string(),
                new_date: None,
                new_time: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(count, 1);

    let swept = ctx.store.get_appointment(near.id).await.unwrap().unwrap();
    assert_eq!(swept.status, AppointmentStatus::Rescheduled);
    let untouched = ctx.store.get_appointment(far.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, AppointmentStatus::Confirmed);
    assert!(ctx.store.list_reschedules(far.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_day_sweep_guards() {
    let ctx = TestContext::default();
    let doctor = ctx.doctor().await;
    let patient = ctx.patient().await;
    let coordinator = RescheduleCoordinator::new(&ctx.state);

    let request = |day: &str, reason: &str| RescheduleDayRequest {
        day_of_week: day.to_string(),
        reason: reason.to_string(),
        new_date: None,
        new_time: None,
    };

    assert_matches!(
        coordinator.reschedule_day(&patient.actor(), request("Monday", "Off")).await,
        Err(AppointmentError::Forbidden(_))
    );
    assert_matches!(
        coordinator.reschedule_day(&doctor.actor(), request("Funday", "Off")).await,
        Err(AppointmentError::Validation(_))
    );
    assert_matches!(
        coordinator.reschedule_day(&doctor.actor(), request("Monday", " ")).await,
        Err(AppointmentError::Validation(_))
    );
    assert_eq!(
        coordinator
            .reschedule_day(&doctor.actor(), request("Monday", "Off"))
            .await
            .unwrap(),
        0
    );
}
