pub mod collection;
pub mod docs;
pub mod fs_helpers;
pub mod ledger;
pub mod planning;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::{Period, Transaction, TransactionType};

pub use docs::DocsStore;
pub use ledger::{JsonLedger, Ledger};
pub use planning::PlanningStore;

/// Composition root for the three stores. Crossing stores (I1: a ledger
/// insert bumps the matching budget's `spent`) happens here rather than
/// inside any one store, since no store is supposed to know about the
/// others (§4.1: "no foreign-key constraint is enforced across stores").
pub struct Store {
    pub ledger: Arc<dyn Ledger>,
    pub planning: Arc<PlanningStore>,
    pub docs: Arc<DocsStore>,
}

impl Store {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            ledger: Arc::new(JsonLedger::new(data_dir.join("ledger"))),
            planning: Arc::new(PlanningStore::new(data_dir.join("planning"))),
            docs: Arc::new(DocsStore::new(data_dir.join("docs"))),
        }
    }

    /// `Ledger.CreateTransaction`: inserts the row, then applies I1 for
    /// expenses. Budget deletion on the reverse path is intentionally not
    /// implemented — see the data model's documented discrepancy.
    pub async fn create_transaction(&self, draft: Transaction) -> Result<Transaction> {
        let inserted = self.ledger.insert_transaction(draft).await?;

        if inserted.kind == TransactionType::Expense {
            if let Some((budget_id, mut budget)) = self.find_matching_budget(&inserted).await? {
                budget.record_expense(inserted.amount);
                self.planning.budgets.put(&budget_id, &budget).await?;
            }
        }

        Ok(inserted)
    }

    async fn find_matching_budget(
        &self,
        transaction: &Transaction,
    ) -> Result<Option<(crate::models::Id, crate::models::Budget)>> {
        let budgets = self.planning.budgets.list().await?;
        Ok(budgets.into_iter().find(|(_, b)| {
            b.user_id == transaction.user_id && b.category == transaction.category
        }))
    }
}

/// `RebuildDailyTrends(user_id)`: discards the cache and recomputes it from
/// the ledger directly, restoring I2 after any drift.
pub async fn rebuild_daily_trends(store: &Store, user_id: &crate::models::Id) -> Result<()> {
    use crate::models::{DailyTrend, TransactionFilter};
    use std::collections::BTreeMap;

    let rows = store
        .ledger
        .query_transactions(TransactionFilter {
            user_id: Some(user_id),
            ..Default::default()
        })
        .await
        .context("failed to read transactions for rebuild")?;

    let mut by_day: BTreeMap<chrono::NaiveDate, DailyTrend> = BTreeMap::new();
    for row in &rows {
        by_day
            .entry(row.date)
            .or_insert_with(|| DailyTrend::zero(row.date))
            .add(row);
    }

    let trends: Vec<DailyTrend> = by_day.into_values().collect();
    store.ledger.rewrite_daily_trends(user_id, trends).await
}

/// `RebuildBudgetSpent(user_id)`: §9's chosen repair strategy for I1 drift.
/// The ledger is authoritative; `Budget.spent` is a cache recomputed here as
/// the sum of expenses in the budget's category since its `start_date` (or
/// `end_date`, if set and in the past), rather than decremented on delete.
pub async fn rebuild_budget_spent(store: &Store, user_id: &crate::models::Id) -> Result<()> {
    use crate::models::{TransactionFilter, TransactionType};

    let budgets = store.planning.budgets.list().await?;
    let transactions = store
        .ledger
        .query_transactions(TransactionFilter {
            user_id: Some(user_id),
            kind: Some(TransactionType::Expense),
            ..Default::default()
        })
        .await
        .context("failed to read expenses for budget reconciliation")?;

    for (budget_id, mut budget) in budgets {
        if budget.user_id != *user_id {
            continue;
        }
        let spent = transactions
            .iter()
            .filter(|t| {
                t.category == budget.category
                    && t.date >= budget.start_date
                    && budget.end_date.map(|end| t.date <= end).unwrap_or(true)
            })
            .map(|t| t.amount)
            .sum();
        budget.spent = spent;
        store.planning.budgets.put(&budget_id, &budget).await?;
    }

    Ok(())
}

/// Adds one period to `date`, clamping at month-end rather than overflowing
/// into the next month (e.g. Jan 31 + 1 month -> Feb 28/29).
pub fn advance_period(date: chrono::NaiveDate, period: Period) -> chrono::NaiveDate {
    use chrono::Datelike;

    match period {
        Period::Weekly => date + chrono::Duration::days(7),
        Period::Yearly => date
            .with_year(date.year() + 1)
            .unwrap_or_else(|| clamp_to_valid_day(date.year() + 1, date.month(), date.day())),
        Period::Monthly => {
            let (year, month) = if date.month() == 12 {
                (date.year() + 1, 1)
            } else {
                (date.year(), date.month() + 1)
            };
            clamp_to_valid_day(year, month, date.day())
        }
    }
}

fn clamp_to_valid_day(year: i32, month: u32, day: u32) -> chrono::NaiveDate {
    (1..=day)
        .rev()
        .find_map(|d| chrono::NaiveDate::from_ymd_opt(year, month, d))
        .expect("month always has at least one valid day")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Budget, Period as BudgetPeriod, Transaction, TransactionType};
    use crate::money::Money;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn create_transaction_bumps_matching_budget_spent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        let user_id = crate::models::Id::from_string("u1");

        let budget = Budget {
            id: crate::models::Id::from_string("b1"),
            user_id: user_id.clone(),
            name: "Food".into(),
            category: "Food & Dining".into(),
            amount: Money::from_paise(1_000_00),
            spent: Money::zero(),
            period: BudgetPeriod::Monthly,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: None,
            icon: "\u{1F37D}\u{FE0F}".into(),
        };
        store.planning.budgets.put(&budget.id.clone(), &budget).await.unwrap();

        store
            .create_transaction(Transaction::draft(
                user_id.clone(),
                Money::from_paise(250_00),
                TransactionType::Expense,
                NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
                "Food & Dining",
                "Groceries",
            ))
            .await
            .unwrap();

        let updated = store.planning.budgets.get(&budget.id).await.unwrap().unwrap();
        assert_eq!(updated.spent.to_string(), "250.00");
    }

    #[tokio::test]
    async fn rebuild_daily_trends_matches_ledger_totals() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        let user_id = crate::models::Id::from_string("u1");

        store
            .create_transaction(Transaction::draft(
                user_id.clone(),
                Money::from_paise(100_00),
                TransactionType::Expense,
                NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
                "Transport",
                "Cab",
            ))
            .await
            .unwrap();
        store
            .create_transaction(Transaction::draft(
                user_id.clone(),
                Money::from_paise(50_00),
                TransactionType::Expense,
                NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
                "Transport",
                "Auto",
            ))
            .await
            .unwrap();

        rebuild_daily_trends(&store, &user_id).await.unwrap();

        let trends = store.ledger.get_daily_trends(&user_id).await.unwrap();
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].total_spent.to_string(), "150.00");
    }

    #[tokio::test]
    async fn rebuild_budget_spent_repairs_drift_after_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        let user_id = crate::models::Id::from_string("u1");

        let budget = Budget {
            id: crate::models::Id::from_string("b1"),
            user_id: user_id.clone(),
            name: "Food".into(),
            category: "Food & Dining".into(),
            amount: Money::from_paise(1_000_00),
            spent: Money::from_paise(999_00),
            period: BudgetPeriod::Monthly,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: None,
            icon: "\u{1F37D}\u{FE0F}".into(),
        };
        store.planning.budgets.put(&budget.id.clone(), &budget).await.unwrap();

        store
            .create_transaction(Transaction::draft(
                user_id.clone(),
                Money::from_paise(250_00),
                TransactionType::Expense,
                NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
                "Food & Dining",
                "Groceries",
            ))
            .await
            .unwrap();

        rebuild_budget_spent(&store, &user_id).await.unwrap();

        let repaired = store.planning.budgets.get(&budget.id).await.unwrap().unwrap();
        assert_eq!(repaired.spent.to_string(), "250.00");
    }

    #[tokio::test]
    async fn rebuild_budget_spent_ignores_other_users_budgets() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path());
        let user_id = crate::models::Id::from_string("u1");
        let other_id = crate::models::Id::from_string("u2");

        let other_budget = Budget {
            id: crate::models::Id::from_string("b2"),
            user_id: other_id.clone(),
            name: "Food".into(),
            category: "Food & Dining".into(),
            amount: Money::from_paise(1_000_00),
            spent: Money::from_paise(500_00),
            period: BudgetPeriod::Monthly,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: None,
            icon: "\u{1F37D}\u{FE0F}".into(),
        };
        store.planning.budgets.put(&other_budget.id.clone(), &other_budget).await.unwrap();

        rebuild_budget_spent(&store, &user_id).await.unwrap();

        let untouched = store.planning.budgets.get(&other_budget.id).await.unwrap().unwrap();
        assert_eq!(untouched.spent.to_string(), "500.00");
    }

    #[test]
    fn advance_period_clamps_month_end() {
        let jan_31 = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        let next = advance_period(jan_31, Period::Monthly);
        assert_eq!(next, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }

    #[test]
    fn advance_period_leap_year_february() {
        let jan_31 = NaiveDate::from_ymd_opt(2028, 1, 31).unwrap();
        let next = advance_period(jan_31, Period::Monthly);
        assert_eq!(next, NaiveDate::from_ymd_opt(2028, 2, 29).unwrap());
    }
}
