//! Notification fan-out.
//!
//! The dispatcher builds payloads for case events and hands them to a
//! [`NotificationTransport`] in provider-sized batches. Delivery is best
//! effort: a failing batch is counted and logged, the rest still go out.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::Repository;
use crate::errors::AppError;
use crate::matcher::VolunteerMatch;
use crate::models::{Case, NotificationPayload, NotificationType};

/// Delivery counts for one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub delivered: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for BatchOutcome {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Something that can deliver a payload to users.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Deliver to a single user.
    async fn send_to_user(
        &self,
        user_id: Uuid,
        payload: &NotificationPayload,
    ) -> Result<(), AppError>;

    /// Deliver to a batch of users. The default sends one by one and counts
    /// individual failures.
    async fn send_to_users(
        &self,
        user_ids: &[Uuid],
        payload: &NotificationPayload,
    ) -> Result<BatchOutcome, AppError> {
        let mut outcome = BatchOutcome::default();
        for user_id in user_ids {
            match self.send_to_user(*user_id, payload).await {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    tracing::debug!(user_id = %user_id, error = %e, "Notification not delivered");
                    outcome.failed += 1;
                }
            }
        }
        Ok(outcome)
    }
}

/// Default transport: writes an in-app inbox row per recipient.
pub struct InboxTransport {
    repo: Arc<Repository>,
}

impl InboxTransport {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl NotificationTransport for InboxTransport {
    async fn send_to_user(
        &self,
        user_id: Uuid,
        payload: &NotificationPayload,
    ) -> Result<(), AppError> {
        self.repo.insert_notifications(&[user_id], payload).await
    }

    async fn send_to_users(
        &self,
        user_ids: &[Uuid],
        payload: &NotificationPayload,
    ) -> Result<BatchOutcome, AppError> {
        self.repo.insert_notifications(user_ids, payload).await?;
        Ok(BatchOutcome {
            delivered: user_ids.len(),
            failed: 0,
        })
    }
}

/// Builds event payloads and fans them out through a transport.
#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn NotificationTransport>,
    batch_size: usize,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn NotificationTransport>, batch_size: usize) -> Self {
        Self {
            transport,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn notify_user(
        &self,
        user_id: Uuid,
        payload: &NotificationPayload,
    ) -> Result<(), AppError> {
        self.transport.send_to_user(user_id, payload).await
    }

    /// Send `payload` to every user in batches of at most `batch_size`.
    /// A failing batch does not stop the remaining ones.
    pub async fn notify_users(&self, user_ids: &[Uuid], payload: &NotificationPayload) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for batch in user_ids.chunks(self.batch_size) {
            match self.transport.send_to_users(batch, payload).await {
                Ok(result) => outcome += result,
                Err(e) => {
                    tracing::warn!(recipients = batch.len(), error = %e, "Notification batch failed");
                    outcome.failed += batch.len();
                }
            }
        }

        if outcome.failed > 0 {
            tracing::warn!(
                kind = payload.kind.as_str(),
                delivered = outcome.delivered,
                failed = outcome.failed,
                "Some notifications were not delivered"
            );
        }
        outcome
    }

    /// Tell each matched volunteer about a new case, with their own distance.
    pub async fn notify_matches(&self, case: &Case, matches: &[VolunteerMatch]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for m in matches {
            let payload = new_case_payload(case, m.distance_km);
            match self.transport.send_to_user(m.user_id, &payload).await {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    tracing::debug!(user_id = %m.user_id, error = %e, "New case alert not delivered");
                    outcome.failed += 1;
                }
            }
        }

        tracing::info!(
            case_id = %case.id,
            delivered = outcome.delivered,
            failed = outcome.failed,
            "New case fan-out finished"
        );
        outcome
    }
}

pub fn new_case_payload(case: &Case, distance_km: f64) -> NotificationPayload {
    NotificationPayload::new(
        NotificationType::NewCaseNearby,
        format!("New {} case nearby", case.case_type.as_str()),
        format!("{} ({:.1} km away)", case.title, distance_km),
    )
    .for_case(case)
    .with_distance(distance_km)
}

pub fn volunteer_joined_payload(case: &Case, volunteer_name: &str) -> NotificationPayload {
    NotificationPayload::new(
        NotificationType::CaseAccepted,
        "A volunteer is on the way",
        format!("{} accepted your case \"{}\"", volunteer_name, case.title),
    )
    .for_case(case)
}

pub fn case_resolved_payload(case: &Case) -> NotificationPayload {
    NotificationPayload::new(
        NotificationType::CaseResolved,
        "Case resolved",
        format!("\"{}\" has been resolved. Thank you!", case.title),
    )
    .for_case(case)
}
