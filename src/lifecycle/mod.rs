//! Case and volunteer state machines.
//!
//! Case: `pending -> accepted -> in_progress -> resolved`, any active state may
//! move to `cancelled`, and `expired` is set only by an external scheduler.
//!
//! Volunteer: `accepted -> en_route -> on_site -> handling -> completed`, with
//! `withdrawn` reachable from any state. A withdrawn record is reactivated by a
//! new accept, never by a status update.

use crate::errors::{codes, AppError};
use crate::models::{Case, CaseStatus, VolunteerStatus};

fn case_rank(status: CaseStatus) -> u8 {
    match status {
        CaseStatus::Pending => 0,
        CaseStatus::Accepted => 1,
        CaseStatus::InProgress => 2,
        CaseStatus::Resolved => 3,
        CaseStatus::Cancelled | CaseStatus::Expired => 4,
    }
}

fn volunteer_rank(status: VolunteerStatus) -> u8 {
    match status {
        VolunteerStatus::Accepted => 0,
        VolunteerStatus::EnRoute => 1,
        VolunteerStatus::OnSite => 2,
        VolunteerStatus::Handling => 3,
        VolunteerStatus::Completed => 4,
        VolunteerStatus::Withdrawn => 5,
    }
}

/// Whether `case` can take one more volunteer.
pub fn ensure_accepting(case: &Case) -> Result<(), AppError> {
    if !case.status.is_active() {
        return Err(AppError::conflict(
            codes::CASE_CLOSED,
            format!("Case is {}", case.status.as_str()),
        ));
    }
    if !case.has_capacity() {
        return Err(AppError::conflict(
            codes::MAX_VOLUNTEERS,
            format!("Case already has {} volunteers", case.volunteer_count),
        ));
    }
    Ok(())
}

/// Case status after a volunteer joins.
pub fn status_after_accept(current: CaseStatus) -> CaseStatus {
    match current {
        CaseStatus::Pending => CaseStatus::Accepted,
        other => other,
    }
}

/// Case status after a volunteer reports progress: once someone is working the
/// scene an accepted case is in progress.
pub fn status_after_progress(current: CaseStatus, volunteer: VolunteerStatus) -> CaseStatus {
    match (current, volunteer) {
        (
            CaseStatus::Accepted,
            VolunteerStatus::OnSite | VolunteerStatus::Handling | VolunteerStatus::Completed,
        ) => CaseStatus::InProgress,
        (current, _) => current,
    }
}

/// Validate a reporter-driven status change.
///
/// Moves go forward along `pending -> accepted -> in_progress -> resolved`
/// (skipping is allowed) or to `cancelled` from any active state, never
/// backwards. Closed cases do not move; `expired` belongs to the scheduler.
pub fn check_case_transition(from: CaseStatus, to: CaseStatus) -> Result<(), AppError> {
    if !from.is_active() {
        return Err(AppError::conflict(
            codes::CASE_CLOSED,
            format!("Case is {}", from.as_str()),
        ));
    }
    let allowed = match to {
        CaseStatus::Expired => false,
        CaseStatus::Cancelled => true,
        to => case_rank(to) > case_rank(from),
    };
    if allowed {
        Ok(())
    } else {
        Err(invalid_transition(from.as_str(), to.as_str()))
    }
}

/// Validate a volunteer progress update.
///
/// Progress moves forward only, skipping is allowed. `accepted` and `withdrawn`
/// are reached through accept and withdraw, not here.
pub fn check_volunteer_transition(
    from: VolunteerStatus,
    to: VolunteerStatus,
) -> Result<(), AppError> {
    if from == VolunteerStatus::Withdrawn {
        return Err(AppError::conflict(
            codes::NOT_ACCEPTED,
            "Volunteer has withdrawn from this case",
        ));
    }
    if matches!(to, VolunteerStatus::Accepted | VolunteerStatus::Withdrawn) {
        return Err(invalid_transition(from.as_str(), to.as_str()));
    }
    if volunteer_rank(to) <= volunteer_rank(from) {
        return Err(invalid_transition(from.as_str(), to.as_str()));
    }
    Ok(())
}

/// A case resolves once it has volunteers and every one of them is done,
/// either completed or withdrawn.
pub fn should_resolve<I>(statuses: I) -> bool
where
    I: IntoIterator<Item = VolunteerStatus>,
{
    let mut any = false;
    for status in statuses {
        any = true;
        if !matches!(
            status,
            VolunteerStatus::Completed | VolunteerStatus::Withdrawn
        ) {
            return false;
        }
    }
    any
}

fn invalid_transition(from: &str, to: &str) -> AppError {
    AppError::conflict(
        codes::INVALID_TRANSITION,
        format!("Cannot move from {} to {}", from, to),
    )
}
