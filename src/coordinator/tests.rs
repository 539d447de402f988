use super::*;
use crate::db::test_support::temp_repository;
use crate::models::{
    AnimalCondition, AnimalDetails, AnimalKind, CaseDetails, CaseType, CreateUserRequest,
    FloodDetails, NotificationType, PageQuery, Urgency,
};
use crate::notify::testing::RecordingTransport;
use tempfile::TempDir;

const SAIGON_CENTER: (f64, f64) = (10.7769, 106.7009);
const SAIGON_NEARBY: (f64, f64) = (10.7900, 106.7100);
const HANOI: (f64, f64) = (21.0285, 105.8542);

struct Fixture {
    repo: Arc<Repository>,
    transport: Arc<RecordingTransport>,
    tasks: BackgroundTasks,
    coordinator: CaseCoordinator,
    _dir: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        let (repo, dir) = temp_repository().await;
        let repo = Arc::new(repo);
        let transport = Arc::new(RecordingTransport::default());
        let tasks = BackgroundTasks::new();
        let matcher = VolunteerMatcher::with_settings(repo.clone(), 10.0, 50, 0);
        let dispatcher = NotificationDispatcher::new(transport.clone(), 500);
        let coordinator = CaseCoordinator::new(repo.clone(), matcher, dispatcher, tasks.clone());
        Self {
            repo,
            transport,
            tasks,
            coordinator,
            _dir: dir,
        }
    }

    async fn user(&self, name: &str, at: Option<(f64, f64)>) -> Uuid {
        let user = self
            .repo
            .create_user(&CreateUserRequest {
                display_name: name.to_string(),
                email: None,
                phone: Some("0900000000".to_string()),
            })
            .await
            .unwrap();
        if let Some((lat, lng)) = at {
            self.repo
                .update_location(user.id, GeoPoint::new(lat, lng))
                .await
                .unwrap();
        }
        user.id
    }

    async fn case(&self, reporter: Option<Uuid>, max_volunteers: Option<i64>) -> Case {
        self.coordinator
            .create_case(draft(CaseType::Flood, SAIGON_CENTER, max_volunteers), reporter)
            .await
            .unwrap()
    }
}

fn draft(case_type: CaseType, at: (f64, f64), max_volunteers: Option<i64>) -> CreateCaseRequest {
    CreateCaseRequest {
        case_type,
        urgency: Urgency::High,
        latitude: at.0,
        longitude: at.1,
        address: Some("District 1".to_string()),
        location_note: None,
        title: "Family on the roof".to_string(),
        description: None,
        reporter_name: None,
        reporter_phone: None,
        is_anonymous: false,
        max_volunteers,
        details: None,
    }
}

fn code<T: std::fmt::Debug>(result: Result<T, AppError>) -> &'static str {
    result.unwrap_err().error_code()
}

#[tokio::test]
async fn test_create_case_defaults_and_timeline() {
    let f = Fixture::new().await;
    let reporter = f.user("Lan", None).await;

    let case = f.case(Some(reporter), None).await;
    assert_eq!(case.status, CaseStatus::Pending);
    assert_eq!(case.volunteer_count, 0);
    assert_eq!(case.max_volunteers, DEFAULT_MAX_VOLUNTEERS);
    assert_eq!(case.reporter_name.as_deref(), Some("Lan"));

    let updates = f
        .repo
        .list_updates(case.id, &PageQuery::default())
        .await
        .unwrap();
    assert_eq!(updates.items.len(), 1);
    assert_eq!(updates.items[0].update_type, UpdateType::System);

    f.tasks.drain().await;
    let reporter = f.repo.require_user(reporter).await.unwrap();
    assert_eq!(reporter.total_cases_reported, 1);
}

#[tokio::test]
async fn test_create_case_validation() {
    let f = Fixture::new().await;

    let mut blank = draft(CaseType::Flood, SAIGON_CENTER, None);
    blank.title = "   ".to_string();
    assert_eq!(code(f.coordinator.create_case(blank, None).await), "VALIDATION_ERROR");

    let off_map = draft(CaseType::Flood, (95.0, 10.0), None);
    assert_eq!(code(f.coordinator.create_case(off_map, None).await), "VALIDATION_ERROR");

    let crowded = draft(CaseType::Flood, SAIGON_CENTER, Some(0));
    assert_eq!(code(f.coordinator.create_case(crowded, None).await), "VALIDATION_ERROR");

    let mut mismatched = draft(CaseType::Flood, SAIGON_CENTER, None);
    mismatched.details = Some(CaseDetails::Animal(AnimalDetails {
        animal_type: AnimalKind::Dog,
        animal_type_other: None,
        condition: AnimalCondition::Injured,
        condition_description: None,
        estimated_count: 1,
    }));
    assert_eq!(
        code(f.coordinator.create_case(mismatched, None).await),
        "VALIDATION_ERROR"
    );

    assert_eq!(
        code(f.coordinator.create_case(draft(CaseType::Flood, SAIGON_CENTER, None), Some(Uuid::new_v4())).await),
        codes::USER_NOT_FOUND
    );
}

#[tokio::test]
async fn test_create_case_stores_details() {
    let f = Fixture::new().await;
    let mut request = draft(CaseType::Flood, SAIGON_CENTER, None);
    request.details = Some(CaseDetails::Flood(FloodDetails {
        people_count: Some(4),
        has_children: true,
        ..Default::default()
    }));

    let case = f.coordinator.create_case(request, None).await.unwrap();
    let stored = f.repo.require_case(case.id).await.unwrap();
    match stored.details {
        Some(CaseDetails::Flood(d)) => {
            assert_eq!(d.people_count, Some(4));
            assert!(d.has_children);
        }
        other => panic!("unexpected details {:?}", other),
    }
}

#[tokio::test]
async fn test_new_case_alerts_nearby_volunteers_only() {
    let f = Fixture::new().await;
    let reporter = f.user("Reporter", Some(SAIGON_CENTER)).await;
    let nearby = f.user("Minh", Some(SAIGON_NEARBY)).await;
    let far = f.user("Hoa", Some(HANOI)).await;
    let resting = f.user("Tuan", Some(SAIGON_NEARBY)).await;
    f.repo.set_availability(resting, false).await.unwrap();

    let case = f.case(Some(reporter), None).await;
    f.tasks.drain().await;

    let alerts = f.transport.sent_to(nearby);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, NotificationType::NewCaseNearby);
    assert_eq!(alerts[0].case_id, Some(case.id));
    let distance = alerts[0].distance_km.unwrap();
    assert!(distance > 1.0 && distance < 2.0, "distance {}", distance);

    assert!(f.transport.sent_to(far).is_empty());
    assert!(f.transport.sent_to(resting).is_empty());
    assert!(f.transport.sent_to(reporter).is_empty());
}

#[tokio::test]
async fn test_full_lifecycle_resolves_case() {
    let f = Fixture::new().await;
    let reporter = f.user("Reporter", None).await;
    let volunteer = f.user("Minh", Some(SAIGON_NEARBY)).await;
    let case = f.case(Some(reporter), Some(2)).await;

    let record = f
        .coordinator
        .accept_case(case.id, volunteer, Some(GeoPoint::new(SAIGON_NEARBY.0, SAIGON_NEARBY.1)))
        .await
        .unwrap();
    assert_eq!(record.status, VolunteerStatus::Accepted);
    assert!(record.distance_km.is_some());

    let accepted = f.repo.require_case(case.id).await.unwrap();
    assert_eq!(accepted.status, CaseStatus::Accepted);
    assert_eq!(accepted.volunteer_count, 1);
    assert!(accepted.accepted_at.is_some());

    f.coordinator
        .update_volunteer_status(case.id, volunteer, VolunteerStatus::EnRoute, None)
        .await
        .unwrap();
    let on_site = f
        .coordinator
        .update_volunteer_status(case.id, volunteer, VolunteerStatus::OnSite, None)
        .await
        .unwrap();
    assert!(on_site.arrived_at.is_some());
    assert_eq!(
        f.repo.require_case(case.id).await.unwrap().status,
        CaseStatus::InProgress
    );

    let done = f
        .coordinator
        .update_volunteer_status(
            case.id,
            volunteer,
            VolunteerStatus::Completed,
            Some("Everyone is safe".to_string()),
        )
        .await
        .unwrap();
    assert!(done.completed_at.is_some());
    assert_eq!(done.note.as_deref(), Some("Everyone is safe"));

    let resolved = f.repo.require_case(case.id).await.unwrap();
    assert_eq!(resolved.status, CaseStatus::Resolved);
    assert!(resolved.resolved_at.is_some());

    f.tasks.drain().await;
    assert_eq!(
        f.repo.require_user(volunteer).await.unwrap().total_cases_resolved,
        1
    );
    let reporter_inbox = f.transport.sent_to(reporter);
    assert!(reporter_inbox
        .iter()
        .any(|p| p.kind == NotificationType::CaseAccepted));
    assert!(reporter_inbox
        .iter()
        .any(|p| p.kind == NotificationType::CaseResolved));

    // created, joined, en route, on site, completed
    let timeline = f
        .repo
        .list_updates(case.id, &PageQuery::default())
        .await
        .unwrap();
    assert_eq!(timeline.meta.total, 5);
    let latest = &timeline.items[0];
    assert_eq!(latest.update_type, UpdateType::VolunteerUpdate);
    assert_eq!(latest.old_status.as_deref(), Some("on_site"));
    assert_eq!(latest.new_status.as_deref(), Some("completed"));

    assert_eq!(
        code(f.coordinator.accept_case(case.id, volunteer, None).await),
        codes::CASE_CLOSED
    );
}

#[tokio::test]
async fn test_accept_conflicts() {
    let f = Fixture::new().await;
    let first = f.user("A", None).await;
    let second = f.user("B", None).await;
    let case = f.case(None, Some(1)).await;

    assert_eq!(
        code(f.coordinator.accept_case(Uuid::new_v4(), first, None).await),
        codes::CASE_NOT_FOUND
    );
    assert_eq!(
        code(f.coordinator.accept_case(case.id, Uuid::new_v4(), None).await),
        codes::USER_NOT_FOUND
    );

    f.coordinator.accept_case(case.id, first, None).await.unwrap();
    // Full case reports capacity before the duplicate
    assert_eq!(
        code(f.coordinator.accept_case(case.id, first, None).await),
        codes::MAX_VOLUNTEERS
    );
    assert_eq!(
        code(f.coordinator.accept_case(case.id, second, None).await),
        codes::MAX_VOLUNTEERS
    );

    let roomy = f.case(None, Some(3)).await;
    f.coordinator.accept_case(roomy.id, first, None).await.unwrap();
    assert_eq!(
        code(f.coordinator.accept_case(roomy.id, first, None).await),
        codes::ALREADY_ACCEPTED
    );
}

#[tokio::test]
async fn test_concurrent_accepts_respect_capacity() {
    let f = Fixture::new().await;
    let case = f.case(None, Some(3)).await;

    let mut volunteers = Vec::new();
    for i in 0..8 {
        volunteers.push(f.user(&format!("V{}", i), None).await);
    }

    let mut handles = Vec::new();
    for volunteer in volunteers {
        let coordinator = f.coordinator.clone();
        let case_id = case.id;
        handles.push(tokio::spawn(async move {
            coordinator.accept_case(case_id, volunteer, None).await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(e) => assert_eq!(e.error_code(), codes::MAX_VOLUNTEERS),
        }
    }

    assert_eq!(accepted, 3);
    let stored = f.repo.require_case(case.id).await.unwrap();
    assert_eq!(stored.volunteer_count, 3);
    assert_eq!(f.repo.list_volunteers(case.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_withdraw_and_reaccept_reuses_record() {
    let f = Fixture::new().await;
    let volunteer = f.user("Minh", None).await;
    let case = f.case(None, None).await;

    let first = f.coordinator.accept_case(case.id, volunteer, None).await.unwrap();
    f.coordinator
        .update_volunteer_status(case.id, volunteer, VolunteerStatus::EnRoute, None)
        .await
        .unwrap();
    f.coordinator.withdraw(case.id, volunteer).await.unwrap();

    let after_withdraw = f.repo.require_case(case.id).await.unwrap();
    assert_eq!(after_withdraw.volunteer_count, 0);
    // Nobody finished, so the case stays open
    assert_eq!(after_withdraw.status, CaseStatus::Accepted);
    assert!(f.repo.list_volunteers(case.id).await.unwrap().is_empty());

    assert_eq!(
        code(f.coordinator.withdraw(case.id, volunteer).await),
        codes::NOT_ACCEPTED
    );
    assert_eq!(
        code(
            f.coordinator
                .update_volunteer_status(case.id, volunteer, VolunteerStatus::OnSite, None)
                .await
        ),
        codes::NOT_ACCEPTED
    );

    let again = f.coordinator.accept_case(case.id, volunteer, None).await.unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.status, VolunteerStatus::Accepted);
    assert_eq!(f.repo.require_case(case.id).await.unwrap().volunteer_count, 1);
}

#[tokio::test]
async fn test_resolution_waits_for_every_volunteer() {
    let f = Fixture::new().await;
    let a = f.user("A", None).await;
    let b = f.user("B", None).await;
    let c = f.user("C", None).await;
    let case = f.case(None, None).await;

    f.coordinator.accept_case(case.id, a, None).await.unwrap();
    f.coordinator.accept_case(case.id, b, None).await.unwrap();

    f.coordinator
        .update_volunteer_status(case.id, a, VolunteerStatus::Completed, None)
        .await
        .unwrap();
    assert_eq!(
        f.repo.require_case(case.id).await.unwrap().status,
        CaseStatus::InProgress
    );

    // Leaving never closes the case, even when everyone left is done
    f.coordinator.withdraw(case.id, b).await.unwrap();
    let stored = f.repo.require_case(case.id).await.unwrap();
    assert_eq!(stored.status, CaseStatus::InProgress);
    assert_eq!(stored.volunteer_count, 1);
    assert!(stored.resolved_at.is_none());

    f.coordinator.accept_case(case.id, c, None).await.unwrap();
    f.coordinator
        .update_volunteer_status(case.id, c, VolunteerStatus::Completed, None)
        .await
        .unwrap();
    let stored = f.repo.require_case(case.id).await.unwrap();
    assert_eq!(stored.status, CaseStatus::Resolved);
    assert!(stored.resolved_at.is_some());

    f.tasks.drain().await;
    assert_eq!(f.repo.require_user(a).await.unwrap().total_cases_resolved, 1);
    assert_eq!(f.repo.require_user(b).await.unwrap().total_cases_resolved, 0);
    assert_eq!(f.repo.require_user(c).await.unwrap().total_cases_resolved, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_all_succeed() {
    let f = Fixture::new().await;
    let case = f.case(None, Some(8)).await;

    let mut volunteers = Vec::new();
    for i in 0..8 {
        let volunteer = f.user(&format!("V{}", i), None).await;
        f.coordinator.accept_case(case.id, volunteer, None).await.unwrap();
        volunteers.push(volunteer);
    }

    let mut handles = Vec::new();
    for volunteer in volunteers {
        let coordinator = f.coordinator.clone();
        let case_id = case.id;
        handles.push(tokio::spawn(async move {
            coordinator.withdraw(case_id, volunteer).await
        }));
    }

    let outcome = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    })
    .await
    .expect("withdrawals stalled");

    for result in outcome {
        result.unwrap();
    }

    let stored = f.repo.require_case(case.id).await.unwrap();
    assert_eq!(stored.volunteer_count, 0);
    assert!(f.repo.list_volunteers(case.id).await.unwrap().is_empty());

    let updates = f
        .repo
        .list_updates(case.id, &PageQuery::default())
        .await
        .unwrap();
    let withdrawn = updates
        .items
        .iter()
        .filter(|u| u.update_type == UpdateType::VolunteerWithdrawn)
        .count();
    assert_eq!(withdrawn, 8);
    assert!(updates
        .items
        .iter()
        .filter(|u| u.update_type == UpdateType::VolunteerWithdrawn)
        .all(|u| u.content.starts_with('V')));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completions_resolve_once() {
    let f = Fixture::new().await;
    let reporter = f.user("Lan", None).await;
    let a = f.user("A", None).await;
    let b = f.user("B", None).await;
    let case = f.case(Some(reporter), None).await;

    for volunteer in [a, b] {
        f.coordinator.accept_case(case.id, volunteer, None).await.unwrap();
        f.coordinator
            .update_volunteer_status(case.id, volunteer, VolunteerStatus::Handling, None)
            .await
            .unwrap();
    }
    f.tasks.drain().await;

    let mut handles = Vec::new();
    for volunteer in [a, b] {
        let coordinator = f.coordinator.clone();
        let case_id = case.id;
        handles.push(tokio::spawn(async move {
            coordinator
                .update_volunteer_status(case_id, volunteer, VolunteerStatus::Completed, None)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    f.tasks.drain().await;

    let stored = f.repo.require_case(case.id).await.unwrap();
    assert_eq!(stored.status, CaseStatus::Resolved);

    assert_eq!(f.repo.require_user(a).await.unwrap().total_cases_resolved, 1);
    assert_eq!(f.repo.require_user(b).await.unwrap().total_cases_resolved, 1);

    let resolved: Vec<Uuid> = f
        .transport
        .sent()
        .into_iter()
        .filter(|(_, p)| p.kind == NotificationType::CaseResolved)
        .map(|(user, _)| user)
        .collect();
    assert_eq!(resolved.len(), 3);
    for user in [reporter, a, b] {
        assert_eq!(resolved.iter().filter(|id| **id == user).count(), 1);
    }
}

#[tokio::test]
async fn test_volunteer_status_rules() {
    let f = Fixture::new().await;
    let volunteer = f.user("Minh", None).await;
    let case = f.case(None, None).await;
    f.coordinator.accept_case(case.id, volunteer, None).await.unwrap();

    f.coordinator
        .update_volunteer_status(case.id, volunteer, VolunteerStatus::OnSite, None)
        .await
        .unwrap();
    assert_eq!(
        code(
            f.coordinator
                .update_volunteer_status(case.id, volunteer, VolunteerStatus::EnRoute, None)
                .await
        ),
        codes::INVALID_TRANSITION
    );
    assert_eq!(
        code(
            f.coordinator
                .update_volunteer_status(case.id, volunteer, VolunteerStatus::Withdrawn, None)
                .await
        ),
        codes::INVALID_TRANSITION
    );
}

#[tokio::test]
async fn test_only_reporter_edits_case() {
    let f = Fixture::new().await;
    let reporter = f.user("Reporter", None).await;
    let stranger = f.user("Stranger", None).await;
    let case = f.case(Some(reporter), None).await;

    let patch = UpdateCaseRequest {
        urgency: Some(Urgency::Critical),
        ..Default::default()
    };
    assert_eq!(
        code(f.coordinator.update_case(case.id, stranger, patch.clone()).await),
        "FORBIDDEN"
    );
    assert_eq!(
        code(f.coordinator.delete_case(case.id, stranger).await),
        "FORBIDDEN"
    );

    let updated = f.coordinator.update_case(case.id, reporter, patch).await.unwrap();
    assert_eq!(updated.urgency, Urgency::Critical);
    assert_eq!(updated.status, CaseStatus::Pending);

    // Field edits leave no trace in the timeline
    let timeline = f
        .repo
        .list_updates(case.id, &PageQuery::default())
        .await
        .unwrap();
    assert_eq!(timeline.meta.total, 1);

    let anonymous = f.case(None, None).await;
    assert_eq!(
        code(f.coordinator.delete_case(anonymous.id, reporter).await),
        "FORBIDDEN"
    );
}

#[tokio::test]
async fn test_reporter_status_override() {
    let f = Fixture::new().await;
    let reporter = f.user("Reporter", None).await;
    let case = f.case(Some(reporter), None).await;

    let expire = UpdateCaseRequest {
        status: Some(CaseStatus::Expired),
        ..Default::default()
    };
    assert_eq!(
        code(f.coordinator.update_case(case.id, reporter, expire).await),
        codes::INVALID_TRANSITION
    );

    let resolve = UpdateCaseRequest {
        status: Some(CaseStatus::Resolved),
        ..Default::default()
    };
    let resolved = f.coordinator.update_case(case.id, reporter, resolve).await.unwrap();
    assert_eq!(resolved.status, CaseStatus::Resolved);
    assert!(resolved.resolved_at.is_some());

    let timeline = f
        .repo
        .list_updates(case.id, &PageQuery::default())
        .await
        .unwrap();
    assert_eq!(timeline.items[0].update_type, UpdateType::StatusChange);
    assert_eq!(timeline.items[0].new_status.as_deref(), Some("resolved"));

    assert_eq!(
        code(f.coordinator.delete_case(case.id, reporter).await),
        codes::CASE_CLOSED
    );
}

#[tokio::test]
async fn test_delete_cancels_case() {
    let f = Fixture::new().await;
    let reporter = f.user("Reporter", None).await;
    let volunteer = f.user("Minh", None).await;
    let case = f.case(Some(reporter), None).await;
    f.coordinator.accept_case(case.id, volunteer, None).await.unwrap();

    f.coordinator.delete_case(case.id, reporter).await.unwrap();

    let stored = f.repo.require_case(case.id).await.unwrap();
    assert_eq!(stored.status, CaseStatus::Cancelled);
    assert_eq!(
        code(f.coordinator.withdraw(case.id, volunteer).await),
        codes::CASE_CLOSED
    );
    assert_eq!(
        code(f.coordinator.delete_case(Uuid::new_v4(), reporter).await),
        codes::CASE_NOT_FOUND
    );
}

#[tokio::test]
async fn test_post_update_permissions() {
    let f = Fixture::new().await;
    let reporter = f.user("Reporter", None).await;
    let volunteer = f.user("Minh", None).await;
    let stranger = f.user("Stranger", None).await;
    let case = f.case(Some(reporter), None).await;
    f.coordinator.accept_case(case.id, volunteer, None).await.unwrap();

    let from_reporter = f
        .coordinator
        .post_update(case.id, reporter, "Water is rising")
        .await
        .unwrap();
    assert_eq!(from_reporter.update_type, UpdateType::ReporterUpdate);

    let from_volunteer = f
        .coordinator
        .post_update(case.id, volunteer, "Bringing a boat")
        .await
        .unwrap();
    assert_eq!(from_volunteer.update_type, UpdateType::VolunteerUpdate);

    assert_eq!(
        code(f.coordinator.post_update(case.id, stranger, "Hi").await),
        "FORBIDDEN"
    );
    assert_eq!(
        code(f.coordinator.post_update(case.id, reporter, "  ").await),
        "VALIDATION_ERROR"
    );
}
