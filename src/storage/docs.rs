use std::path::PathBuf;

use anyhow::Result;
use chrono::Duration;

use crate::clock::Clock;
use crate::models::{
    AnalysisCooldown, AnalysisSnapshot, IdeaEvaluation, Id, Milestone, MonthlyMetrics,
    MudraDprRecord, ProjectReport, UserXp,
};

use super::collection::Collection;

const ANALYSIS_COOLDOWN_DAYS: i64 = 7;

pub struct DocsStore {
    pub analysis_snapshots: Collection<AnalysisSnapshot>,
    pub milestones: Collection<Milestone>,
    pub idea_evaluations: Collection<IdeaEvaluation>,
    pub mudra_dprs: Collection<MudraDprRecord>,
    pub project_reports: Collection<ProjectReport>,
    pub monthly_metrics: Collection<MonthlyMetrics>,
}

impl DocsStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            analysis_snapshots: Collection::new(base_dir.join("analysis_snapshots")),
            milestones: Collection::new(base_dir.join("milestones")),
            idea_evaluations: Collection::new(base_dir.join("idea_evaluations")),
            mudra_dprs: Collection::new(base_dir.join("mudra_dprs")),
            project_reports: Collection::new(base_dir.join("project_reports")),
            monthly_metrics: Collection::new(base_dir.join("monthly_metrics")),
        }
    }

    pub async fn user_milestones(&self, user_id: &Id) -> Result<Vec<Milestone>> {
        Ok(self
            .milestones
            .list_values()
            .await?
            .into_iter()
            .filter(|m| &m.user_id == user_id)
            .collect())
    }

    pub async fn user_xp(&self, user_id: &Id) -> Result<UserXp> {
        Ok(UserXp::from_achieved(&self.user_milestones(user_id).await?))
    }

    /// Checks the user's most recent snapshot against the 7-day cooldown
    /// before an analysis run is allowed to start.
    pub async fn analysis_cooldown(&self, user_id: &Id, clock: &dyn Clock) -> Result<AnalysisCooldown> {
        let snapshots = self
            .analysis_snapshots
            .list_values()
            .await?
            .into_iter()
            .filter(|s| &s.user_id == user_id)
            .max_by_key(|s| s.created_at);

        let Some(last) = snapshots else {
            return Ok(AnalysisCooldown {
                can_analyze: true,
                next_analysis_date: None,
                days_remaining: 0,
                hours_remaining: 0,
            });
        };

        let next_analysis_date = last.created_at + Duration::days(ANALYSIS_COOLDOWN_DAYS);
        let now = clock.now();
        if now >= next_analysis_date {
            return Ok(AnalysisCooldown {
                can_analyze: true,
                next_analysis_date: None,
                days_remaining: 0,
                hours_remaining: 0,
            });
        }

        let remaining = next_analysis_date - now;
        Ok(AnalysisCooldown {
            can_analyze: false,
            next_analysis_date: Some(next_analysis_date),
            days_remaining: remaining.num_days(),
            hours_remaining: remaining.num_hours(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn cooldown_allows_analysis_when_no_prior_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocsStore::new(dir.path().to_path_buf());
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());

        let cooldown = store.analysis_cooldown(&Id::from_string("u1"), &clock).await.unwrap();
        assert!(cooldown.can_analyze);
    }

    #[tokio::test]
    async fn cooldown_blocks_within_seven_days() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocsStore::new(dir.path().to_path_buf());
        let user = Id::from_string("u1");

        store
            .analysis_snapshots
            .put(
                &Id::from_string("s1"),
                &AnalysisSnapshot {
                    id: Id::from_string("s1"),
                    user_id: user.clone(),
                    created_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
                    month: "2026-03".into(),
                    metrics: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap());
        let cooldown = store.analysis_cooldown(&user, &clock).await.unwrap();
        assert!(!cooldown.can_analyze);
        assert_eq!(cooldown.days_remaining, 4);
    }

    #[tokio::test]
    async fn cooldown_clears_after_seven_days() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocsStore::new(dir.path().to_path_buf());
        let user = Id::from_string("u1");

        store
            .analysis_snapshots
            .put(
                &Id::from_string("s1"),
                &AnalysisSnapshot {
                    id: Id::from_string("s1"),
                    user_id: user.clone(),
                    created_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
                    month: "2026-03".into(),
                    metrics: serde_json::json!({}),
                },
            )
            .await
            .unwrap();

        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap());
        let cooldown = store.analysis_cooldown(&user, &clock).await.unwrap();
        assert!(cooldown.can_analyze);
    }
}
