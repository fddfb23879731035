//! Fixed catalog of 14 milestones (C1 sub-feature, §4.11) plus the
//! transition logic run on every analysis-snapshot write.

use anyhow::Result;
use serde_json::Value;

use crate::clock::Clock;
use crate::models::{Id, IdGenerator, Milestone};
use crate::storage::docs::DocsStore;

pub struct MilestoneDef {
    pub id: &'static str,
    pub title: &'static str,
    pub icon: &'static str,
    pub xp: u32,
    pub order: u32,
    pub predicate: fn(&Value) -> bool,
}

fn num(metrics: &Value, key: &str) -> f64 {
    metrics.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn flag(metrics: &Value, key: &str) -> bool {
    metrics.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub const CATALOG: &[MilestoneDef] = &[
    MilestoneDef { id: "first_transaction", title: "First Steps", icon: "\u{1F463}", xp: 10, order: 1, predicate: |m| num(m, "transaction_count") >= 1.0 },
    MilestoneDef { id: "ten_transactions", title: "Getting Organized", icon: "\u{1F4D2}", xp: 20, order: 2, predicate: |m| num(m, "transaction_count") >= 10.0 },
    MilestoneDef { id: "fifty_transactions", title: "Habit Formed", icon: "\u{1F4C8}", xp: 30, order: 3, predicate: |m| num(m, "transaction_count") >= 50.0 },
    MilestoneDef { id: "first_budget", title: "Budgeter", icon: "\u{1F4B0}", xp: 15, order: 4, predicate: |m| num(m, "budget_count") >= 1.0 },
    MilestoneDef { id: "three_budgets", title: "Planner", icon: "\u{1F4CB}", xp: 25, order: 5, predicate: |m| num(m, "budget_count") >= 3.0 },
    MilestoneDef { id: "first_goal", title: "Dreamer", icon: "\u{1F3AF}", xp: 15, order: 6, predicate: |m| num(m, "goal_count") >= 1.0 },
    MilestoneDef { id: "first_completed_goal", title: "Achiever", icon: "\u{1F3C6}", xp: 50, order: 7, predicate: |m| num(m, "completed_goal_count") >= 1.0 },
    MilestoneDef { id: "positive_savings_rate", title: "In the Black", icon: "\u{1F4B5}", xp: 20, order: 8, predicate: |m| num(m, "savings_rate") > 0.0 },
    MilestoneDef { id: "healthy_savings_rate", title: "Saver", icon: "\u{1F3E6}", xp: 40, order: 9, predicate: |m| num(m, "savings_rate") >= 0.2 },
    MilestoneDef { id: "emergency_fund_three_months", title: "Cushioned", icon: "\u{1F6E1}\u{FE0F}", xp: 40, order: 10, predicate: |m| num(m, "emergency_fund_months") >= 3.0 },
    MilestoneDef { id: "emergency_fund_six_months", title: "Fortress", icon: "\u{1F3F0}", xp: 60, order: 11, predicate: |m| num(m, "emergency_fund_months") >= 6.0 },
    MilestoneDef { id: "health_score_grade_b", title: "On Track", icon: "\u{2705}", xp: 30, order: 12, predicate: |m| num(m, "health_score") >= 70.0 },
    MilestoneDef { id: "health_score_grade_a", title: "Financially Fit", icon: "\u{1F31F}", xp: 70, order: 13, predicate: |m| num(m, "health_score") >= 85.0 },
    MilestoneDef { id: "scheduled_payment_autopay", title: "On Autopilot", icon: "\u{1F916}", xp: 20, order: 14, predicate: |m| flag(m, "has_autopay_scheduled_payment") },
];

/// Runs every predicate against `metrics`; any predicate that transitions
/// from false to true (no existing `achieved = true` row for that
/// `milestone_id`) yields a freshly-stamped `Milestone`. Already-achieved
/// milestones are left untouched — re-achieving is a no-op (I4).
pub async fn apply_snapshot(
    docs: &DocsStore,
    user_id: &Id,
    metrics: &Value,
    ids: &dyn IdGenerator,
    clock: &dyn Clock,
) -> Result<Vec<Milestone>> {
    let existing = docs.user_milestones(user_id).await?;
    let mut newly_achieved = Vec::new();

    for def in CATALOG {
        let already_achieved = existing
            .iter()
            .any(|m| m.milestone_id == def.id && m.achieved);
        if already_achieved {
            continue;
        }
        if !(def.predicate)(metrics) {
            continue;
        }

        let milestone = Milestone {
            user_id: user_id.clone(),
            milestone_id: def.id.to_string(),
            title: def.title.to_string(),
            icon: def.icon.to_string(),
            xp: def.xp,
            order: def.order,
            achieved: true,
            achieved_at: Some(clock.now()),
        };
        let storage_id = Id::from_string(format!("{user_id}_{}", def.id));
        docs.milestones.put(&storage_id, &milestone).await?;
        newly_achieved.push(milestone);
    }

    let _ = ids;
    Ok(newly_achieved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::UuidIdGenerator;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[tokio::test]
    async fn first_transaction_milestone_fires_once() {
        let dir = tempfile::tempdir().unwrap();
        let docs = DocsStore::new(dir.path().to_path_buf());
        let user = Id::from_string("u1");
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        let ids = UuidIdGenerator;

        let metrics = json!({ "transaction_count": 1 });
        let first = apply_snapshot(&docs, &user, &metrics, &ids, &clock).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].milestone_id, "first_transaction");

        let second = apply_snapshot(&docs, &user, &metrics, &ids, &clock).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn multiple_thresholds_crossed_in_one_snapshot_all_fire() {
        let dir = tempfile::tempdir().unwrap();
        let docs = DocsStore::new(dir.path().to_path_buf());
        let user = Id::from_string("u1");
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        let ids = UuidIdGenerator;

        let metrics = json!({ "transaction_count": 60, "budget_count": 1 });
        let achieved = apply_snapshot(&docs, &user, &metrics, &ids, &clock).await.unwrap();
        let ids_achieved: Vec<&str> = achieved.iter().map(|m| m.milestone_id.as_str()).collect();
        assert!(ids_achieved.contains(&"first_transaction"));
        assert!(ids_achieved.contains(&"ten_transactions"));
        assert!(ids_achieved.contains(&"fifty_transactions"));
        assert!(ids_achieved.contains(&"first_budget"));
    }
}
