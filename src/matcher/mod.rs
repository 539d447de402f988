//! Volunteer matching and the nearby-cases query.
//!
//! Storage narrows the candidates with a bounding box sized by the scan radius,
//! never smaller than the largest personal notification radius; everything
//! after that is exact and runs in [`rank_candidates`] /
//! [`rank_cases`], which are pure so they can be tested without a database.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::db::Repository;
use crate::errors::AppError;
use crate::geo::{distance_km, BoundingBox, GeoPoint};
use crate::models::{Case, CaseType, NearbyCase, VolunteerCandidate, MAX_NOTIFICATION_RADIUS_KM};

pub const DEFAULT_NEARBY_LIMIT: usize = 20;
pub const MAX_NEARBY_LIMIT: usize = 100;

/// A volunteer eligible for a case alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolunteerMatch {
    pub user_id: Uuid,
    pub display_name: String,
    pub distance_km: f64,
}

/// Filter and rank candidates for a case at `location` of type `case_type`.
///
/// A candidate is kept when it has a usable location, the case is inside its
/// own notification radius, its preferences accept the case type, push is on
/// and `local_time` is outside its quiet hours. Results are nearest first.
pub fn rank_candidates(
    candidates: Vec<VolunteerCandidate>,
    location: &GeoPoint,
    case_type: CaseType,
    local_time: NaiveTime,
    limit: usize,
) -> Vec<VolunteerMatch> {
    let mut matches: Vec<VolunteerMatch> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let prefs = &candidate.preferences;
            let point = prefs.effective_location(candidate.location)?;

            let distance = distance_km(location, &point);
            if distance > prefs.notification_radius_km {
                return None;
            }
            if !prefs.push_enabled || !prefs.accepts(case_type) {
                return None;
            }
            if prefs
                .quiet_hours
                .is_some_and(|quiet| quiet.contains(local_time))
            {
                return None;
            }

            Some(VolunteerMatch {
                user_id: candidate.user_id,
                display_name: candidate.display_name,
                distance_km: distance,
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
    });
    matches.truncate(limit);
    matches
}

/// Keep cases within `radius_km` of `center`, most urgent first and nearest
/// first within the same urgency.
pub fn rank_cases(
    cases: Vec<Case>,
    center: &GeoPoint,
    radius_km: f64,
    limit: usize,
) -> Vec<NearbyCase> {
    let mut nearby: Vec<NearbyCase> = cases
        .into_iter()
        .filter(|case| case.status.is_active())
        .filter_map(|case| {
            let distance = distance_km(center, &case.location);
            (distance <= radius_km).then(|| NearbyCase {
                id: case.id,
                case_type: case.case_type,
                title: case.title,
                urgency: case.urgency,
                status: case.status,
                location: case.location,
                distance_km: distance,
                volunteer_count: case.volunteer_count,
                created_at: case.created_at,
            })
        })
        .collect();

    nearby.sort_by(|a, b| {
        a.urgency
            .priority()
            .cmp(&b.urgency.priority())
            .then_with(|| {
                a.distance_km
                    .partial_cmp(&b.distance_km)
                    .unwrap_or(Ordering::Equal)
            })
    });
    nearby.truncate(limit);
    nearby
}

/// Matching front end over the repository.
#[derive(Clone)]
pub struct VolunteerMatcher {
    repo: Arc<Repository>,
    scan_radius_km: f64,
    limit: usize,
    local_offset: FixedOffset,
}

impl VolunteerMatcher {
    pub fn new(repo: Arc<Repository>, config: &Config) -> Self {
        Self::with_settings(
            repo,
            config.scan_radius_km,
            config.match_limit,
            config.quiet_hours_utc_offset_minutes,
        )
    }

    pub fn with_settings(
        repo: Arc<Repository>,
        scan_radius_km: f64,
        limit: usize,
        utc_offset_minutes: i32,
    ) -> Self {
        let local_offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| {
            tracing::warn!(
                offset_minutes = utc_offset_minutes,
                "Quiet hours offset out of range, using UTC"
            );
            Utc.fix()
        });

        Self {
            repo,
            scan_radius_km,
            limit,
            local_offset,
        }
    }

    /// Radius of the storage prefilter. A volunteer may opt into alerts up to
    /// [`MAX_NOTIFICATION_RADIUS_KM`] away, so the box never shrinks below it.
    fn candidate_radius_km(&self) -> f64 {
        self.scan_radius_km.max(MAX_NOTIFICATION_RADIUS_KM)
    }

    /// Time of day used for quiet-hours checks.
    fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.local_offset).time()
    }

    /// Eligible volunteers for `case`, nearest first, at most the configured limit.
    pub async fn find_volunteers(&self, case: &Case) -> Result<Vec<VolunteerMatch>, AppError> {
        self.find_volunteers_at(case, Utc::now()).await
    }

    pub async fn find_volunteers_at(
        &self,
        case: &Case,
        now: DateTime<Utc>,
    ) -> Result<Vec<VolunteerMatch>, AppError> {
        let bbox = BoundingBox::around(&case.location, self.candidate_radius_km());
        let candidates = self.repo.find_candidates(&bbox).await?;
        let scanned = candidates.len();

        let matches = rank_candidates(
            candidates,
            &case.location,
            case.case_type,
            self.local_time(now),
            self.limit,
        );

        tracing::debug!(
            case_id = %case.id,
            scanned,
            matched = matches.len(),
            "Matched volunteers"
        );
        Ok(matches)
    }

    /// Active cases around `center`, ranked by urgency then distance.
    pub async fn nearby_cases(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        types: &[CaseType],
        limit: usize,
    ) -> Result<Vec<NearbyCase>, AppError> {
        let bbox = BoundingBox::around(center, radius_km);
        let cases = self.repo.active_cases_in_box(&bbox, types).await?;
        Ok(rank_cases(cases, center, radius_km, limit))
    }
}
