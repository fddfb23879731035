use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Id;

/// A point-in-time analytics result, persisted so `HealthScore` history and
/// the milestone cooldown can both read it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub id: Id,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    /// Month this snapshot covers, `YYYY-MM`.
    pub month: String,
    pub metrics: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub user_id: Id,
    pub milestone_id: String,
    pub title: String,
    pub icon: String,
    pub xp: u32,
    pub order: u32,
    pub achieved: bool,
    pub achieved_at: Option<DateTime<Utc>>,
}

/// Never stored directly; always derived on read from the user's achieved
/// milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserXp {
    pub total_xp: u32,
    pub level: u32,
}

impl UserXp {
    pub fn from_achieved(milestones: &[Milestone]) -> Self {
        let total_xp: u32 = milestones
            .iter()
            .filter(|m| m.achieved)
            .map(|m| m.xp)
            .sum();
        Self {
            total_xp,
            level: total_xp / 100 + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnalysisCooldown {
    pub can_analyze: bool,
    pub next_analysis_date: Option<DateTime<Utc>>,
    pub days_remaining: i64,
    pub hours_remaining: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaEvaluation {
    pub id: Id,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    pub idea_summary: String,
    /// Per-persona verdicts keyed by persona name (`neutral`, `critic`,
    /// `analyst`, `investor`, `customer`).
    pub persona_verdicts: serde_json::Value,
    pub reverse_brainstorm: Vec<String>,
    pub canvas: serde_json::Value,
}

/// Upsert key is `(user_id, month)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyMetrics {
    pub user_id: Id,
    pub month: String,
    pub total_income: crate::money::Money,
    pub total_expenses: crate::money::Money,
    pub savings: crate::money::Money,
    pub health_score: Option<f64>,
}

/// A persisted Detailed Project Report. The pure computation that produces
/// `output` lives in `crate::mudra`; this is just the storage envelope,
/// upserted on `(user_id, month)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MudraDprRecord {
    pub user_id: Id,
    pub month: String,
    pub created_at: DateTime<Utc>,
    pub input: crate::mudra::MudraDprInput,
    pub output: crate::mudra::MudraDprOutput,
}

/// A generic project report produced by the brainstorm/scheme flow, distinct
/// from a Mudra-specific DPR in that it has no bank-ready financial
/// projections attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectReport {
    pub id: Id,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub summary: String,
    pub recommended_schemes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestone(id: &str, xp: u32, achieved: bool) -> Milestone {
        Milestone {
            user_id: Id::from_string("u1"),
            milestone_id: id.to_string(),
            title: id.to_string(),
            icon: "🏅".into(),
            xp,
            order: 0,
            achieved,
            achieved_at: achieved.then(|| Utc::now()),
        }
    }

    #[test]
    fn xp_and_level_derive_from_achieved_milestones_only() {
        let milestones = vec![
            milestone("first_transaction", 10, true),
            milestone("first_budget", 20, true),
            milestone("ten_transactions", 50, false),
        ];
        let xp = UserXp::from_achieved(&milestones);
        assert_eq!(xp.total_xp, 30);
        assert_eq!(xp.level, 1);
    }

    #[test]
    fn level_is_integer_division_by_100_plus_one() {
        let milestones = vec![milestone("big", 250, true)];
        let xp = UserXp::from_achieved(&milestones);
        assert_eq!(xp.total_xp, 250);
        assert_eq!(xp.level, 3);
    }
}
