//! Case lifecycle orchestration.
//!
//! Every mutation runs in a single SQLite transaction that starts by writing
//! the case row ([`db::lock_case`]), so the checks that follow (capacity,
//! duplicate accept, completion aggregation) see a state no other writer can
//! change before commit. Notifications and counters run afterwards as
//! background tasks and never affect the result of the call.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::db::{self, Repository};
use crate::errors::{codes, AppError};
use crate::geo::{distance_km, GeoPoint};
use crate::lifecycle;
use crate::matcher::VolunteerMatcher;
use crate::models::{
    Case, CaseStatus, CaseUpdate, CaseVolunteer, CreateCaseRequest, NewCaseUpdate,
    UpdateCaseRequest, UpdateType, VolunteerStatus, DEFAULT_MAX_VOLUNTEERS,
};
use crate::notify::{self, NotificationDispatcher};
use crate::tasks::BackgroundTasks;

const MAX_VOLUNTEERS_LIMIT: i64 = 50;
const MAX_TITLE_LEN: usize = 200;

#[derive(Clone)]
pub struct CaseCoordinator {
    repo: Arc<Repository>,
    matcher: VolunteerMatcher,
    dispatcher: NotificationDispatcher,
    tasks: BackgroundTasks,
}

impl CaseCoordinator {
    pub fn new(
        repo: Arc<Repository>,
        matcher: VolunteerMatcher,
        dispatcher: NotificationDispatcher,
        tasks: BackgroundTasks,
    ) -> Self {
        Self {
            repo,
            matcher,
            dispatcher,
            tasks,
        }
    }

    // ==================== CREATE ====================

    /// Persist a new case with its details and timeline entry, then alert
    /// nearby volunteers in the background.
    pub async fn create_case(
        &self,
        request: CreateCaseRequest,
        reporter_id: Option<Uuid>,
    ) -> Result<Case, AppError> {
        validate_draft(&request)?;

        let reporter = match reporter_id {
            Some(id) => Some(self.repo.require_user(id).await?),
            None => None,
        };

        let now = Utc::now();
        let case = Case {
            id: Uuid::new_v4(),
            case_type: request.case_type,
            status: CaseStatus::Pending,
            urgency: request.urgency,
            location: GeoPoint::new(request.latitude, request.longitude),
            address: request.address,
            location_note: request.location_note,
            title: request.title.trim().to_string(),
            description: request.description,
            reporter_id,
            reporter_name: request
                .reporter_name
                .or_else(|| reporter.as_ref().map(|u| u.display_name.clone())),
            reporter_phone: request
                .reporter_phone
                .or_else(|| reporter.as_ref().and_then(|u| u.phone.clone())),
            is_anonymous: request.is_anonymous,
            volunteer_count: 0,
            max_volunteers: request.max_volunteers.unwrap_or(DEFAULT_MAX_VOLUNTEERS),
            details: request.details,
            created_at: now,
            updated_at: now,
            accepted_at: None,
            resolved_at: None,
        };

        let mut tx = self.repo.begin().await?;
        db::insert_case(&mut *tx, &case).await?;
        let mut created = NewCaseUpdate::new(case.id, UpdateType::System, "Case created");
        if let Some(id) = reporter_id {
            created = created.by(id);
        }
        db::insert_update(&mut *tx, &created, &now).await?;
        tx.commit().await?;

        tracing::info!(
            case_id = %case.id,
            case_type = case.case_type.as_str(),
            urgency = case.urgency.as_str(),
            "Case created"
        );

        if let Some(reporter_id) = reporter_id {
            let repo = self.repo.clone();
            self.tasks.spawn("count_reported_case", async move {
                repo.increment_reported(reporter_id).await
            });
        }

        let matcher = self.matcher.clone();
        let dispatcher = self.dispatcher.clone();
        let new_case = case.clone();
        self.tasks.spawn("alert_nearby_volunteers", async move {
            let matches: Vec<_> = matcher
                .find_volunteers(&new_case)
                .await?
                .into_iter()
                .filter(|m| Some(m.user_id) != new_case.reporter_id)
                .collect();
            dispatcher.notify_matches(&new_case, &matches).await;
            Ok(())
        });

        Ok(case)
    }

    // ==================== VOLUNTEER FLOW ====================

    /// Join a case, or rejoin it after withdrawing.
    pub async fn accept_case(
        &self,
        case_id: Uuid,
        volunteer_id: Uuid,
        location: Option<GeoPoint>,
    ) -> Result<CaseVolunteer, AppError> {
        if location.is_some_and(|p| !p.is_valid()) {
            return Err(AppError::Validation("Location is out of range".to_string()));
        }
        let volunteer = self.repo.require_user(volunteer_id).await?;
        let now = Utc::now();

        let mut tx = self.repo.begin().await?;
        db::lock_case(&mut *tx, case_id, &now).await?;
        let case = db::fetch_case(&mut *tx, case_id)
            .await?
            .ok_or_else(|| AppError::case_not_found(case_id))?;

        lifecycle::ensure_accepting(&case)?;

        let existing = db::fetch_volunteer(&mut *tx, case_id, volunteer_id).await?;
        let distance = location.map(|p| distance_km(&p, &case.location));

        match existing {
            Some(record) if record.status != VolunteerStatus::Withdrawn => {
                return Err(AppError::conflict(
                    codes::ALREADY_ACCEPTED,
                    "You have already accepted this case",
                ));
            }
            Some(record) => {
                db::reactivate_volunteer(&mut *tx, record.id, location, distance, &now).await?;
            }
            None => {
                let record = CaseVolunteer {
                    id: Uuid::new_v4(),
                    case_id,
                    volunteer_id,
                    volunteer_name: None,
                    status: VolunteerStatus::Accepted,
                    accepted_location: location,
                    distance_km: distance,
                    accepted_at: now,
                    arrived_at: None,
                    completed_at: None,
                    note: None,
                };
                db::insert_volunteer(&mut *tx, &record).await?;
            }
        }

        db::adjust_volunteer_count(&mut *tx, case_id, 1).await?;

        let next = lifecycle::status_after_accept(case.status);
        if next != case.status {
            db::transition_case(&mut *tx, case_id, case.status, next, &now).await?;
        }

        let joined = NewCaseUpdate::new(
            case_id,
            UpdateType::VolunteerJoined,
            format!(
                "{} {}",
                volunteer.display_name,
                VolunteerStatus::Accepted.describe()
            ),
        )
        .by(volunteer_id);
        db::insert_update(&mut *tx, &joined, &now).await?;

        let record = db::fetch_volunteer(&mut *tx, case_id, volunteer_id)
            .await?
            .ok_or_else(|| AppError::Internal("Volunteer record vanished".to_string()))?;
        tx.commit().await?;

        tracing::info!(
            case_id = %case_id,
            volunteer_id = %volunteer_id,
            volunteers = case.volunteer_count + 1,
            "Volunteer accepted case"
        );

        if let Some(reporter_id) = case.reporter_id.filter(|id| *id != volunteer_id) {
            let dispatcher = self.dispatcher.clone();
            let payload = notify::volunteer_joined_payload(&case, &volunteer.display_name);
            self.tasks.spawn("notify_reporter_accepted", async move {
                dispatcher.notify_user(reporter_id, &payload).await
            });
        }

        Ok(record)
    }

    /// Leave a case. The record is kept as `withdrawn` so a later accept
    /// reactivates it. Withdrawing never resolves the case; only a completion
    /// does.
    pub async fn withdraw(&self, case_id: Uuid, volunteer_id: Uuid) -> Result<(), AppError> {
        let now = Utc::now();

        let mut tx = self.repo.begin().await?;
        db::lock_case(&mut *tx, case_id, &now).await?;
        let case = db::fetch_case(&mut *tx, case_id)
            .await?
            .ok_or_else(|| AppError::case_not_found(case_id))?;

        if !case.status.is_active() {
            return Err(AppError::conflict(
                codes::CASE_CLOSED,
                format!("Case is {}", case.status.as_str()),
            ));
        }

        // Everything below stays on the transaction's connection; a second pool
        // checkout here would wait behind the writers queued on our lock.
        let record = db::fetch_volunteer(&mut *tx, case_id, volunteer_id)
            .await?
            .filter(|r| r.status != VolunteerStatus::Withdrawn)
            .ok_or_else(not_accepted)?;
        if !db::withdraw_volunteer(&mut *tx, case_id, volunteer_id).await? {
            return Err(not_accepted());
        }
        db::adjust_volunteer_count(&mut *tx, case_id, -1).await?;

        let name = record
            .volunteer_name
            .unwrap_or_else(|| "A volunteer".to_string());
        let left = NewCaseUpdate::new(
            case_id,
            UpdateType::VolunteerWithdrawn,
            format!("{} {}", name, VolunteerStatus::Withdrawn.describe()),
        )
        .by(volunteer_id);
        db::insert_update(&mut *tx, &left, &now).await?;

        tx.commit().await?;

        tracing::info!(case_id = %case_id, volunteer_id = %volunteer_id, "Volunteer withdrew");
        Ok(())
    }

    /// Record a volunteer's progress; resolves the case when the last
    /// engaged volunteer completes.
    pub async fn update_volunteer_status(
        &self,
        case_id: Uuid,
        volunteer_id: Uuid,
        status: VolunteerStatus,
        note: Option<String>,
    ) -> Result<CaseVolunteer, AppError> {
        let now = Utc::now();

        let mut tx = self.repo.begin().await?;
        db::lock_case(&mut *tx, case_id, &now).await?;
        let case = db::fetch_case(&mut *tx, case_id)
            .await?
            .ok_or_else(|| AppError::case_not_found(case_id))?;

        if !case.status.is_active() {
            return Err(AppError::conflict(
                codes::CASE_CLOSED,
                format!("Case is {}", case.status.as_str()),
            ));
        }

        let record = db::fetch_volunteer(&mut *tx, case_id, volunteer_id)
            .await?
            .ok_or_else(not_accepted)?;
        lifecycle::check_volunteer_transition(record.status, status)?;

        db::set_volunteer_status(&mut *tx, record.id, status, note.as_deref(), &now).await?;

        let mut current = case.status;
        let next = lifecycle::status_after_progress(current, status);
        if next != current {
            db::transition_case(&mut *tx, case_id, current, next, &now).await?;
            current = next;
        }

        let mut statuses = Vec::new();
        let mut resolved = false;
        if status == VolunteerStatus::Completed {
            statuses = db::volunteer_statuses(&mut *tx, case_id).await?;
            if lifecycle::should_resolve(statuses.iter().map(|(_, s)| *s)) {
                resolved =
                    db::transition_case(&mut *tx, case_id, current, CaseStatus::Resolved, &now)
                        .await?;
            }
        }

        let name = record
            .volunteer_name
            .clone()
            .unwrap_or_else(|| "A volunteer".to_string());
        let content = match note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(note) => format!("{} {}: {}", name, status.describe(), note),
            None => format!("{} {}", name, status.describe()),
        };
        let progress = NewCaseUpdate::new(case_id, UpdateType::VolunteerUpdate, content)
            .by(volunteer_id)
            .statuses(record.status.as_str(), status.as_str());
        db::insert_update(&mut *tx, &progress, &now).await?;

        let updated = db::fetch_volunteer(&mut *tx, case_id, volunteer_id)
            .await?
            .ok_or_else(|| AppError::Internal("Volunteer record vanished".to_string()))?;
        tx.commit().await?;

        tracing::info!(
            case_id = %case_id,
            volunteer_id = %volunteer_id,
            from = record.status.as_str(),
            to = status.as_str(),
            resolved,
            "Volunteer status updated"
        );

        if resolved {
            self.after_resolution(&case, &statuses);
        }
        Ok(updated)
    }

    // ==================== REPORTER ACTIONS ====================

    /// Reporter-only edit. A status in the patch is an explicit override and is
    /// logged as a status change.
    pub async fn update_case(
        &self,
        case_id: Uuid,
        requester_id: Uuid,
        patch: UpdateCaseRequest,
    ) -> Result<Case, AppError> {
        if patch
            .title
            .as_deref()
            .is_some_and(|t| t.trim().is_empty() || t.len() > MAX_TITLE_LEN)
        {
            return Err(AppError::Validation(format!(
                "title must be 1 to {} characters",
                MAX_TITLE_LEN
            )));
        }

        let now = Utc::now();
        let mut tx = self.repo.begin().await?;
        db::lock_case(&mut *tx, case_id, &now).await?;
        let case = db::fetch_case(&mut *tx, case_id)
            .await?
            .ok_or_else(|| AppError::case_not_found(case_id))?;

        if !case.is_reported_by(requester_id) {
            return Err(AppError::Forbidden(
                "Only the reporter can edit this case".to_string(),
            ));
        }

        db::update_case_fields(&mut *tx, case_id, &patch, &now).await?;

        let mut resolved = false;
        if let Some(to) = patch.status.filter(|s| *s != case.status) {
            lifecycle::check_case_transition(case.status, to)?;
            db::transition_case(&mut *tx, case_id, case.status, to, &now).await?;
            let change = NewCaseUpdate::new(
                case_id,
                UpdateType::StatusChange,
                format!(
                    "Reporter changed status from {} to {}",
                    case.status.as_str(),
                    to.as_str()
                ),
            )
            .by(requester_id)
            .statuses(case.status.as_str(), to.as_str());
            db::insert_update(&mut *tx, &change, &now).await?;
            resolved = to == CaseStatus::Resolved;
        }

        let statuses = if resolved {
            db::volunteer_statuses(&mut *tx, case_id).await?
        } else {
            Vec::new()
        };
        let updated = db::fetch_case(&mut *tx, case_id)
            .await?
            .ok_or_else(|| AppError::case_not_found(case_id))?;
        tx.commit().await?;

        if resolved {
            self.after_resolution(&updated, &statuses);
        }
        Ok(updated)
    }

    /// Reporter-only soft delete: the case is cancelled and its history kept.
    pub async fn delete_case(&self, case_id: Uuid, requester_id: Uuid) -> Result<(), AppError> {
        let now = Utc::now();
        let mut tx = self.repo.begin().await?;
        db::lock_case(&mut *tx, case_id, &now).await?;
        let case = db::fetch_case(&mut *tx, case_id)
            .await?
            .ok_or_else(|| AppError::case_not_found(case_id))?;

        if !case.is_reported_by(requester_id) {
            return Err(AppError::Forbidden(
                "Only the reporter can cancel this case".to_string(),
            ));
        }
        lifecycle::check_case_transition(case.status, CaseStatus::Cancelled)?;

        db::transition_case(&mut *tx, case_id, case.status, CaseStatus::Cancelled, &now).await?;
        let cancelled = NewCaseUpdate::new(
            case_id,
            UpdateType::StatusChange,
            "Case cancelled by reporter",
        )
        .by(requester_id)
        .statuses(case.status.as_str(), CaseStatus::Cancelled.as_str());
        db::insert_update(&mut *tx, &cancelled, &now).await?;
        tx.commit().await?;

        tracing::info!(case_id = %case_id, "Case cancelled");
        Ok(())
    }

    /// Free-text timeline entry from the reporter or an engaged volunteer.
    pub async fn post_update(
        &self,
        case_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<CaseUpdate, AppError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("content must not be empty".to_string()));
        }

        let case = self.repo.require_case(case_id).await?;
        let update_type = if case.is_reported_by(user_id) {
            UpdateType::ReporterUpdate
        } else {
            match self.repo.get_volunteer(case_id, user_id).await? {
                Some(record) if record.status != VolunteerStatus::Withdrawn => {
                    UpdateType::VolunteerUpdate
                }
                _ => {
                    return Err(AppError::Forbidden(
                        "Only the reporter or an engaged volunteer can post updates".to_string(),
                    ))
                }
            }
        };

        self.repo
            .append_update(&NewCaseUpdate::new(case_id, update_type, content).by(user_id))
            .await
    }

    // ==================== SIDE EFFECTS ====================

    /// Credit completed volunteers and tell everyone involved the case is done.
    fn after_resolution(&self, case: &Case, statuses: &[(Uuid, VolunteerStatus)]) {
        let completed: Vec<Uuid> = statuses
            .iter()
            .filter(|(_, s)| *s == VolunteerStatus::Completed)
            .map(|(id, _)| *id)
            .collect();

        tracing::info!(case_id = %case.id, completed = completed.len(), "Case resolved");

        let repo = self.repo.clone();
        let credited = completed.clone();
        self.tasks.spawn("credit_resolved_case", async move {
            let mut failure = None;
            for volunteer_id in credited {
                if let Err(e) = repo.increment_resolved(volunteer_id).await {
                    tracing::warn!(volunteer_id = %volunteer_id, error = %e, "Could not credit volunteer");
                    failure = Some(e);
                }
            }
            failure.map_or(Ok(()), Err)
        });

        let mut recipients = completed;
        if let Some(reporter_id) = case.reporter_id {
            if !recipients.contains(&reporter_id) {
                recipients.push(reporter_id);
            }
        }
        let dispatcher = self.dispatcher.clone();
        let payload = notify::case_resolved_payload(case);
        self.tasks.spawn("notify_case_resolved", async move {
            dispatcher.notify_users(&recipients, &payload).await;
            Ok(())
        });
    }
}

fn not_accepted() -> AppError {
    AppError::conflict(codes::NOT_ACCEPTED, "You have not accepted this case")
}

fn validate_draft(request: &CreateCaseRequest) -> Result<(), AppError> {
    let title = request.title.trim();
    if title.is_empty() || title.len() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "title must be 1 to {} characters",
            MAX_TITLE_LEN
        )));
    }
    if !GeoPoint::new(request.latitude, request.longitude).is_valid() {
        return Err(AppError::Validation("Location is out of range".to_string()));
    }
    if let Some(max) = request.max_volunteers {
        if !(1..=MAX_VOLUNTEERS_LIMIT).contains(&max) {
            return Err(AppError::Validation(format!(
                "maxVolunteers must be between 1 and {}",
                MAX_VOLUNTEERS_LIMIT
            )));
        }
    }
    if let Some(details) = &request.details {
        if details.case_type() != request.case_type {
            return Err(AppError::Validation(format!(
                "{} details do not match a {} case",
                details.case_type().as_str(),
                request.case_type.as_str()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
