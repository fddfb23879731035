//! Analytics (C4): derived views over the ledger. `RebuildDailyTrends` lives
//! on the storage facade (`crate::storage::rebuild_daily_trends`) since it
//! only touches one store; everything here reads across stores and is kept
//! separate.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::OnceLock;

use crate::clock::Clock;
use crate::models::{
    AnalysisSnapshot, Id, IdGenerator, Milestone, TransactionFilter, TransactionType,
};
use crate::money::Money;
use crate::storage::Store;

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct MonthlyTrend {
    pub income: Money,
    pub expenses: Money,
    pub savings: Money,
}

/// `MonthlyTrends(user_id, months)`: read straight from the ledger (never
/// the `DailyTrend` cache) to avoid staleness, grouped by `YYYY-MM`,
/// ascending, keeping only the most recent `months` buckets.
pub async fn monthly_trends(store: &Store, user_id: &Id, months: usize) -> Result<Vec<(String, MonthlyTrend)>> {
    let rows = store
        .ledger
        .query_transactions(TransactionFilter {
            user_id: Some(user_id),
            ..Default::default()
        })
        .await?;

    let mut by_month: BTreeMap<String, MonthlyTrend> = BTreeMap::new();
    for row in &rows {
        let key = row.date.format("%Y-%m").to_string();
        let entry = by_month.entry(key).or_insert(MonthlyTrend {
            income: Money::zero(),
            expenses: Money::zero(),
            savings: Money::zero(),
        });
        match row.kind {
            TransactionType::Income => entry.income = entry.income + row.amount,
            TransactionType::Expense => entry.expenses = entry.expenses + row.amount,
        }
        entry.savings = entry.income - entry.expenses;
    }

    let mut sorted: Vec<(String, MonthlyTrend)> = by_month.into_iter().collect();
    if sorted.len() > months {
        sorted = sorted.split_off(sorted.len() - months);
    }
    Ok(sorted)
}

/// `PredictNextMonth(user_id)`: 3-month simple moving average of monthly
/// expense totals, taken from the most recent months present in the ledger.
pub async fn predict_next_month_expense(store: &Store, user_id: &Id) -> Result<Money> {
    let trends = monthly_trends(store, user_id, 3).await?;
    if trends.is_empty() {
        return Ok(Money::zero());
    }
    let total: Money = trends.iter().map(|(_, t)| t.expenses).sum();
    Ok(total.scale(rust_decimal::Decimal::ONE / rust_decimal::Decimal::from(trends.len() as u64)))
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct HealthScoreInputs {
    pub savings_rate: f64,
    pub debt_to_income: f64,
    pub emergency_fund_months: f64,
    pub investment_coverage: f64,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct SubScores {
    pub savings: f64,
    pub debt: f64,
    pub liquidity: f64,
    pub investment: f64,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct HealthScoreResult {
    pub overall: f64,
    pub grade: char,
    pub sub_scores: SubScores,
}

const SAVINGS_WEIGHT: f64 = 0.30;
const DEBT_WEIGHT: f64 = 0.25;
const LIQUIDITY_WEIGHT: f64 = 0.25;
const INVESTMENT_WEIGHT: f64 = 0.20;

/// Weighted sum of four sub-scores, each clamped to `[0, 100]`. A savings
/// rate of 30%+, zero debt-servicing, 6+ months of emergency cover, and a
/// 20%+ investment allocation each max out their own sub-score; weights sum
/// to 1.0. Grade bands per spec: `A>=85, B>=70, C>=55, D>=40, else F`.
pub fn compute_health_score(inputs: HealthScoreInputs) -> HealthScoreResult {
    let savings = (inputs.savings_rate.max(0.0) / 0.30 * 100.0).min(100.0);
    let debt = (100.0 - inputs.debt_to_income.max(0.0) * 200.0).clamp(0.0, 100.0);
    let liquidity = (inputs.emergency_fund_months.max(0.0) / 6.0 * 100.0).min(100.0);
    let investment = (inputs.investment_coverage.max(0.0) / 0.20 * 100.0).min(100.0);

    let overall = SAVINGS_WEIGHT * savings + DEBT_WEIGHT * debt + LIQUIDITY_WEIGHT * liquidity + INVESTMENT_WEIGHT * investment;
    let grade = match overall {
        o if o >= 85.0 => 'A',
        o if o >= 70.0 => 'B',
        o if o >= 55.0 => 'C',
        o if o >= 40.0 => 'D',
        _ => 'F',
    };

    HealthScoreResult {
        overall: round2(overall),
        grade,
        sub_scores: SubScores {
            savings: round2(savings),
            debt: round2(debt),
            liquidity: round2(liquidity),
            investment: round2(investment),
        },
    }
}

const EMERGENCY_FUND_GOAL_MARKER: &str = "emergency";
const EMI_CATEGORY: &str = "EMI & Loans";
const INVESTMENT_CATEGORY: &str = "Investment";

/// Derives [`HealthScoreInputs`] from the ledger (last 3 months) and the
/// user's goals, then scores them. Goals whose name contains "emergency"
/// (case-insensitive) count toward the emergency-fund total.
pub async fn health_score(store: &Store, user_id: &Id) -> Result<HealthScoreResult> {
    let trends = monthly_trends(store, user_id, 3).await?;
    let total_income: Money = trends.iter().map(|(_, t)| t.income).sum();
    let total_expenses: Money = trends.iter().map(|(_, t)| t.expenses).sum();
    let months = trends.len().max(1) as f64;

    let savings_rate = if total_income.is_zero() {
        0.0
    } else {
        f64_of(total_income - total_expenses) / f64_of(total_income)
    };

    let rows = store
        .ledger
        .query_transactions(TransactionFilter {
            user_id: Some(user_id),
            kind: Some(TransactionType::Expense),
            ..Default::default()
        })
        .await?;
    let recent: Vec<_> = rows
        .iter()
        .filter(|t| trends.iter().any(|(month, _)| *month == t.date.format("%Y-%m").to_string()))
        .collect();

    let emi_total: Money = recent.iter().filter(|t| t.category == EMI_CATEGORY).map(|t| t.amount).sum();
    let investment_total: Money = recent.iter().filter(|t| t.category == INVESTMENT_CATEGORY).map(|t| t.amount).sum();

    let debt_to_income = if total_income.is_zero() { 0.0 } else { f64_of(emi_total) / f64_of(total_income) };
    let investment_coverage = if total_income.is_zero() { 0.0 } else { f64_of(investment_total) / f64_of(total_income) };

    let goals = store.planning.goals.list_values().await?;
    let emergency_fund_total: Money = goals
        .iter()
        .filter(|g| &g.user_id == user_id && g.name.to_lowercase().contains(EMERGENCY_FUND_GOAL_MARKER))
        .map(|g| g.current_amount)
        .sum();
    let monthly_expense_avg = f64_of(total_expenses) / months;
    let emergency_fund_months = if monthly_expense_avg <= 0.0 {
        0.0
    } else {
        f64_of(emergency_fund_total) / monthly_expense_avg
    };

    Ok(compute_health_score(HealthScoreInputs {
        savings_rate,
        debt_to_income,
        emergency_fund_months,
        investment_coverage,
    }))
}

/// Runs an analysis pass for `user_id` (§4.11): checks the 7-day cooldown,
/// snapshots the current metrics, stores it, and runs those metrics through
/// the milestone catalog. Returns `Ok(None)` instead of writing anything
/// when the cooldown has not yet elapsed.
pub async fn run_analysis(
    store: &Store,
    user_id: &Id,
    ids: &dyn IdGenerator,
    clock: &dyn Clock,
) -> Result<Option<(AnalysisSnapshot, Vec<Milestone>)>> {
    let cooldown = store.docs.analysis_cooldown(user_id, clock).await?;
    if !cooldown.can_analyze {
        return Ok(None);
    }

    let trends = monthly_trends(store, user_id, 1).await?;
    let total_income: Money = trends.iter().map(|(_, t)| t.income).sum();
    let total_expenses: Money = trends.iter().map(|(_, t)| t.expenses).sum();

    let transaction_count = store
        .ledger
        .query_transactions(TransactionFilter {
            user_id: Some(user_id),
            ..Default::default()
        })
        .await?
        .len();
    let budgets = store.planning.budgets.list_values().await?;
    let budget_count = budgets.iter().filter(|b| &b.user_id == user_id).count();
    let goals = store.planning.goals.list_values().await?;
    let user_goals: Vec<_> = goals.iter().filter(|g| &g.user_id == user_id).collect();
    let goal_count = user_goals.len();
    let completed_goal_count = user_goals
        .iter()
        .filter(|g| g.status == crate::models::GoalStatus::Completed)
        .count();
    let scheduled_payments = store.planning.scheduled_payments.list_values().await?;
    let has_autopay_scheduled_payment = scheduled_payments
        .iter()
        .any(|p| &p.user_id == user_id && p.is_autopay);

    let health = health_score(store, user_id).await?;
    let savings_rate = if total_income.is_zero() {
        0.0
    } else {
        f64_of(total_income - total_expenses) / f64_of(total_income)
    };

    let metrics = serde_json::json!({
        "transaction_count": transaction_count,
        "budget_count": budget_count,
        "goal_count": goal_count,
        "completed_goal_count": completed_goal_count,
        "savings_rate": savings_rate,
        "health_score": health.overall,
        "emergency_fund_months": health.sub_scores.liquidity / 100.0 * 6.0,
        "has_autopay_scheduled_payment": has_autopay_scheduled_payment,
    });

    let month = clock.today().format("%Y-%m").to_string();
    let snapshot = AnalysisSnapshot {
        id: ids.new_id(),
        user_id: user_id.clone(),
        created_at: clock.now(),
        month,
        metrics: metrics.clone(),
    };
    store
        .docs
        .analysis_snapshots
        .put(&snapshot.id, &snapshot)
        .await
        .context("failed to persist analysis snapshot")?;

    let newly_achieved = crate::milestones::apply_snapshot(&store.docs, user_id, &metrics, ids, clock).await?;

    Ok(Some((snapshot, newly_achieved)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionLabel {
    Subscription,
    RecurringHabit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyBucket {
    Weekly,
    BiWeekly,
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
    Irregular,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SubscriptionMatch {
    pub merchant_key: String,
    pub occurrences: usize,
    pub mean_amount: Money,
    pub amount_cv: f64,
    pub mean_interval_days: f64,
    pub inter_arrival_std_days: f64,
    pub label: SubscriptionLabel,
    pub frequency: FrequencyBucket,
    pub confidence: f64,
}

/// `SubscriptionDetection(user_id, lookback)`: group expense transactions by
/// normalized merchant key, then label groups that look periodic.
pub async fn detect_subscriptions(store: &Store, user_id: &Id, lookback_months: i64) -> Result<Vec<SubscriptionMatch>> {
    let rows = store
        .ledger
        .query_transactions(TransactionFilter {
            user_id: Some(user_id),
            kind: Some(TransactionType::Expense),
            ..Default::default()
        })
        .await?;

    let cutoff = rows.iter().map(|t| t.date).max().map(|latest| latest - chrono::Duration::days(lookback_months * 30));

    let mut groups: BTreeMap<String, Vec<(chrono::NaiveDate, f64)>> = BTreeMap::new();
    for row in &rows {
        if let Some(cutoff) = cutoff {
            if row.date < cutoff {
                continue;
            }
        }
        let key = normalize_merchant_key(row.merchant.as_deref().unwrap_or(&row.description));
        groups.entry(key).or_default().push((row.date, f64_of(row.amount)));
    }

    let mut matches = Vec::new();
    for (merchant_key, mut occurrences) in groups {
        if occurrences.len() < 2 {
            continue;
        }
        occurrences.sort_by_key(|(date, _)| *date);

        let amounts: Vec<f64> = occurrences.iter().map(|(_, a)| *a).collect();
        let mean_amount = mean(&amounts);
        let amount_cv = if mean_amount == 0.0 { 0.0 } else { std_dev(&amounts, mean_amount) / mean_amount };

        let intervals: Vec<f64> = occurrences
            .windows(2)
            .map(|pair| (pair[1].0 - pair[0].0).num_days() as f64)
            .collect();
        let mean_interval = mean(&intervals);
        let inter_arrival_std = std_dev(&intervals, mean_interval);

        let is_subscription = inter_arrival_std <= 3.0 && amount_cv <= 0.10;
        let is_recurring_habit = !is_subscription && mean_interval <= 35.0 && occurrences.len() >= 3;
        if !is_subscription && !is_recurring_habit {
            continue;
        }

        let frequency = frequency_bucket(mean_interval);
        let occurrence_score = (occurrences.len() as f64 / 6.0).min(1.0);
        let time_regularity = (1.0 - inter_arrival_std / 30.0).clamp(0.0, 1.0);
        let amount_consistency = (1.0 - amount_cv).clamp(0.0, 1.0);
        let frequency_reasonableness = match frequency {
            FrequencyBucket::Weekly | FrequencyBucket::BiWeekly | FrequencyBucket::Monthly | FrequencyBucket::Quarterly => 1.0,
            FrequencyBucket::SemiAnnual | FrequencyBucket::Annual => 0.5,
            FrequencyBucket::Irregular => 0.0,
        };
        let confidence = (occurrence_score + time_regularity + amount_consistency + frequency_reasonableness) / 4.0;

        matches.push(SubscriptionMatch {
            merchant_key,
            occurrences: occurrences.len(),
            mean_amount: Money::from_decimal(rust_decimal::Decimal::from_f64_retain(mean_amount).unwrap_or_default()),
            amount_cv: round2(amount_cv),
            mean_interval_days: round2(mean_interval),
            inter_arrival_std_days: round2(inter_arrival_std),
            label: if is_subscription { SubscriptionLabel::Subscription } else { SubscriptionLabel::RecurringHabit },
            frequency,
            confidence: round2(confidence),
        });
    }

    Ok(matches)
}

fn frequency_bucket(mean_interval_days: f64) -> FrequencyBucket {
    match mean_interval_days {
        d if d <= 8.0 => FrequencyBucket::Weekly,
        d if d <= 16.0 => FrequencyBucket::BiWeekly,
        d if d <= 35.0 => FrequencyBucket::Monthly,
        d if d <= 100.0 => FrequencyBucket::Quarterly,
        d if d <= 200.0 => FrequencyBucket::SemiAnnual,
        d if d <= 400.0 => FrequencyBucket::Annual,
        _ => FrequencyBucket::Irregular,
    }
}

/// Lowercase, strip digits and punctuation, drop common company suffixes.
/// Distinct from `categorizer::normalize_merchant`: subscription grouping
/// needs a coarser key than categorization does.
fn normalize_merchant_key(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped = digits_and_punctuation().replace_all(&lowered, " ");
    let collapsed: String = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_suffix = suffix_words().replace_all(&collapsed, "").trim().to_string();
    without_suffix
}

fn digits_and_punctuation() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-z\s]").expect("valid regex"))
}

fn suffix_words() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s*(private limited|pvt ltd|ltd|india)\s*$").expect("valid regex"))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn f64_of(value: Money) -> f64 {
    use std::str::FromStr;
    f64::from_str(&value.as_decimal().to_string()).unwrap_or(0.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Goal, GoalStatus, Transaction, TransactionType};
    use chrono::NaiveDate;

    #[tokio::test]
    async fn monthly_trends_groups_by_calendar_month_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        let user = Id::from_string("u1");

        store
            .create_transaction(Transaction::draft(
                user.clone(),
                Money::from_paise(100_000_00),
                TransactionType::Income,
                NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                "Salary & Income",
                "Salary",
            ))
            .await
            .unwrap();
        store
            .create_transaction(Transaction::draft(
                user.clone(),
                Money::from_paise(30_000_00),
                TransactionType::Expense,
                NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
                "Rent & Housing",
                "Rent",
            ))
            .await
            .unwrap();

        let trends = monthly_trends(&store, &user, 6).await.unwrap();
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].0, "2026-01");
        assert_eq!(trends[1].0, "2026-02");
    }

    #[tokio::test]
    async fn predict_next_month_averages_last_three_months() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        let user = Id::from_string("u1");

        for month in 1..=3u32 {
            store
                .create_transaction(Transaction::draft(
                    user.clone(),
                    Money::from_paise(10_000_00),
                    TransactionType::Expense,
                    NaiveDate::from_ymd_opt(2026, month, 5).unwrap(),
                    "Food & Dining",
                    "Groceries",
                ))
                .await
                .unwrap();
        }

        let predicted = predict_next_month_expense(&store, &user).await.unwrap();
        assert_eq!(predicted.to_string(), "10000.00");
    }

    #[test]
    fn health_score_grades_a_strong_profile() {
        let result = compute_health_score(HealthScoreInputs {
            savings_rate: 0.35,
            debt_to_income: 0.0,
            emergency_fund_months: 6.0,
            investment_coverage: 0.25,
        });
        assert_eq!(result.grade, 'A');
        assert!(result.overall >= 85.0);
    }

    #[test]
    fn health_score_grades_f_weak_profile() {
        let result = compute_health_score(HealthScoreInputs {
            savings_rate: 0.0,
            debt_to_income: 1.0,
            emergency_fund_months: 0.0,
            investment_coverage: 0.0,
        });
        assert_eq!(result.grade, 'F');
    }

    #[tokio::test]
    async fn health_score_counts_emergency_named_goals() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        let user = Id::from_string("u1");

        store
            .planning
            .goals
            .put(
                &Id::from_string("g1"),
                &Goal {
                    id: Id::from_string("g1"),
                    user_id: user.clone(),
                    name: "Emergency Fund".into(),
                    target_amount: Money::from_paise(600_000_00),
                    current_amount: Money::from_paise(300_000_00),
                    deadline: None,
                    status: GoalStatus::Active,
                    icon: "\u{1F6E1}\u{FE0F}".into(),
                    notes: None,
                },
            )
            .await
            .unwrap();

        store
            .create_transaction(Transaction::draft(
                user.clone(),
                Money::from_paise(50_000_00),
                TransactionType::Expense,
                NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                "Rent & Housing",
                "Rent",
            ))
            .await
            .unwrap();

        let result = health_score(&store, &user).await.unwrap();
        assert!(result.sub_scores.liquidity > 0.0);
    }

    #[tokio::test]
    async fn detects_netflix_style_monthly_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        let user = Id::from_string("u1");

        for month in 1..=6u32 {
            store
                .create_transaction(
                    Transaction::draft(
                        user.clone(),
                        Money::from_paise(199_00),
                        TransactionType::Expense,
                        NaiveDate::from_ymd_opt(2026, month, 5).unwrap(),
                        "Entertainment",
                        "Netflix subscription",
                    )
                    .with_merchant("Netflix"),
                )
                .await
                .unwrap();
        }

        let matches = detect_subscriptions(&store, &user, 6).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].label, SubscriptionLabel::Subscription);
        assert_eq!(matches[0].frequency, FrequencyBucket::Monthly);
        assert!(matches[0].confidence >= 0.8);
    }

    #[test]
    fn merchant_key_normalization_strips_digits_and_suffix() {
        assert_eq!(normalize_merchant_key("Netflix123 Pvt Ltd"), "netflix");
    }

    #[tokio::test]
    async fn run_analysis_stores_snapshot_and_awards_milestones_once() {
        use crate::clock::FixedClock;
        use crate::models::{FixedIdGenerator, UuidIdGenerator};
        use chrono::{TimeZone, Utc};

        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        let user = Id::from_string("u1");
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let ids = FixedIdGenerator::new([Id::from_string("snap-1")]);

        store
            .create_transaction(Transaction::draft(
                user.clone(),
                Money::from_paise(500_00),
                TransactionType::Expense,
                NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                "Food & Dining",
                "Lunch",
            ))
            .await
            .unwrap();

        let first = run_analysis(&store, &user, &ids, &clock).await.unwrap();
        let (snapshot, milestones) = first.expect("cooldown should allow the first analysis");
        assert_eq!(snapshot.month, "2026-03");
        assert!(milestones.iter().any(|m| m.milestone_id == "first_transaction"));

        let second = run_analysis(&store, &user, &UuidIdGenerator, &clock).await.unwrap();
        assert!(second.is_none(), "cooldown should block a second analysis the same day");
    }
}
