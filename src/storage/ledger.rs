use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::models::{
    CashflowPoint, DailyTrend, Id, IdGenerator, SpendingSummary, Transaction, TransactionFilter,
    TransactionType, UuidIdGenerator,
};
use crate::money::Money;

use super::fs_helpers;

/// Transactions (immutable once posted) plus the `DailyTrend` derived cache.
/// `create_transaction` only inserts the row and stamps it — the I1 budget
/// bump is cross-store and lives on the top-level `Store` facade, not here.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn insert_transaction(&self, transaction: Transaction) -> Result<Transaction>;
    async fn query_transactions(&self, filter: TransactionFilter<'_>) -> Result<Vec<Transaction>>;
    async fn get_spending_summary(
        &self,
        user_id: &Id,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SpendingSummary>;
    async fn get_cashflow(
        &self,
        user_id: &Id,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CashflowPoint>>;
    async fn get_daily_trends(&self, user_id: &Id) -> Result<Vec<DailyTrend>>;
    async fn rewrite_daily_trends(&self, user_id: &Id, trends: Vec<DailyTrend>) -> Result<()>;
}

pub struct JsonLedger {
    base_dir: PathBuf,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl JsonLedger {
    pub fn new(base_dir: PathBuf) -> Self {
        Self::with_collaborators(base_dir, Arc::new(UuidIdGenerator), Arc::new(SystemClock))
    }

    pub fn with_collaborators(
        base_dir: PathBuf,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            base_dir,
            ids,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    fn transactions_file(&self, user_id: &Id) -> PathBuf {
        self.base_dir.join("transactions").join(format!("{user_id}.jsonl"))
    }

    fn daily_trends_file(&self, user_id: &Id) -> PathBuf {
        self.base_dir.join("daily_trends").join(format!("{user_id}.jsonl"))
    }
}

#[async_trait]
impl Ledger for JsonLedger {
    async fn insert_transaction(&self, transaction: Transaction) -> Result<Transaction> {
        let stamped = transaction.stamp(self.ids.as_ref(), self.clock.as_ref());
        let _guard = self.write_lock.lock().await;
        fs_helpers::append_jsonl(&self.transactions_file(&stamped.user_id), &[stamped.clone()]).await?;
        Ok(stamped)
    }

    async fn query_transactions(&self, filter: TransactionFilter<'_>) -> Result<Vec<Transaction>> {
        let Some(user_id) = filter.user_id else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<Transaction> =
            fs_helpers::read_jsonl(&self.transactions_file(user_id)).await?;

        rows.retain(|t| {
            filter.category.map(|c| t.category == c).unwrap_or(true)
                && filter.kind.map(|k| t.kind == k).unwrap_or(true)
                && filter.start.map(|s| t.date >= s).unwrap_or(true)
                && filter.end.map(|e| t.date <= e).unwrap_or(true)
        });

        rows.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.time.cmp(&a.time))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let offset = filter.offset.unwrap_or(0);
        let rows: Vec<Transaction> = rows.into_iter().skip(offset).collect();
        Ok(match filter.limit {
            Some(limit) => rows.into_iter().take(limit).collect(),
            None => rows,
        })
    }

    async fn get_spending_summary(
        &self,
        user_id: &Id,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<SpendingSummary> {
        let rows = self
            .query_transactions(TransactionFilter {
                user_id: Some(user_id),
                start: Some(start),
                end: Some(end),
                ..Default::default()
            })
            .await?;

        let mut summary = SpendingSummary::default();
        let mut by_category: std::collections::BTreeMap<String, Money> = Default::default();
        for row in &rows {
            match row.kind {
                TransactionType::Income => summary.total_income = summary.total_income + row.amount,
                TransactionType::Expense => {
                    summary.total_expenses = summary.total_expenses + row.amount;
                    let entry = by_category.entry(row.category.clone()).or_insert(Money::zero());
                    *entry = *entry + row.amount;
                }
            }
        }
        summary.net = summary.total_income - summary.total_expenses;
        summary.savings_rate = if summary.total_income.is_zero() {
            0.0
        } else {
            let net = f64_of(summary.net);
            let income = f64_of(summary.total_income);
            net / income
        };
        summary.by_category = by_category;
        Ok(summary)
    }

    async fn get_cashflow(
        &self,
        user_id: &Id,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CashflowPoint>> {
        let all = self
            .query_transactions(TransactionFilter {
                user_id: Some(user_id),
                ..Default::default()
            })
            .await?;

        let mut running = Money::zero();
        for row in all.iter().filter(|t| t.date < start) {
            running = apply(running, row);
        }

        let mut by_day: std::collections::BTreeMap<NaiveDate, (Money, Money)> = Default::default();
        for row in all.iter().filter(|t| t.date >= start && t.date <= end) {
            let entry = by_day.entry(row.date).or_insert((Money::zero(), Money::zero()));
            match row.kind {
                TransactionType::Income => entry.0 = entry.0 + row.amount,
                TransactionType::Expense => entry.1 = entry.1 + row.amount,
            }
        }

        let mut points = Vec::new();
        for (date, (income, expenses)) in by_day {
            running = running + income - expenses;
            points.push(CashflowPoint {
                date,
                income,
                expenses,
                running_balance: running,
            });
        }
        Ok(points)
    }

    async fn get_daily_trends(&self, user_id: &Id) -> Result<Vec<DailyTrend>> {
        fs_helpers::read_jsonl(&self.daily_trends_file(user_id)).await
    }

    async fn rewrite_daily_trends(&self, user_id: &Id, trends: Vec<DailyTrend>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        fs_helpers::rewrite_jsonl(&self.daily_trends_file(user_id), &trends).await
    }
}

fn apply(running: Money, transaction: &Transaction) -> Money {
    match transaction.kind {
        TransactionType::Income => running + transaction.amount,
        TransactionType::Expense => running - transaction.amount,
    }
}

fn f64_of(value: Money) -> f64 {
    use std::str::FromStr;
    f64::from_str(&value.as_decimal().to_string()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FixedIdGenerator, Transaction};
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    fn ledger(dir: &std::path::Path) -> JsonLedger {
        JsonLedger::with_collaborators(
            dir.to_path_buf(),
            Arc::new(FixedIdGenerator::new([
                Id::from_string("t1"),
                Id::from_string("t2"),
            ])),
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap())),
        )
    }

    #[tokio::test]
    async fn insert_then_query_returns_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = ledger(dir.path());
        let user = Id::from_string("u1");

        store
            .insert_transaction(Transaction::draft(
                user.clone(),
                Money::from_paise(10_000),
                TransactionType::Expense,
                NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                "Food & Dining",
                "Lunch",
            ))
            .await
            .unwrap();
        store
            .insert_transaction(Transaction::draft(
                user.clone(),
                Money::from_paise(20_000),
                TransactionType::Expense,
                NaiveDate::from_ymd_opt(2026, 2, 5).unwrap(),
                "Food & Dining",
                "Dinner",
            ))
            .await
            .unwrap();

        let rows = store
            .query_transactions(TransactionFilter {
                user_id: Some(&user),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description, "Dinner");
    }

    #[tokio::test]
    async fn spending_summary_splits_income_and_expense() {
        let dir = tempfile::tempdir().unwrap();
        let store = ledger(dir.path());
        let user = Id::from_string("u1");

        store
            .insert_transaction(Transaction::draft(
                user.clone(),
                Money::from_paise(500_000),
                TransactionType::Income,
                NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                "Salary & Income",
                "Salary",
            ))
            .await
            .unwrap();
        store
            .insert_transaction(Transaction::draft(
                user.clone(),
                Money::from_paise(100_000),
                TransactionType::Expense,
                NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
                "Rent & Housing",
                "Rent",
            ))
            .await
            .unwrap();

        let summary = store
            .get_spending_summary(
                &user,
                NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(summary.total_income.to_string(), "5000.00");
        assert_eq!(summary.total_expenses.to_string(), "1000.00");
        assert_eq!(summary.net.to_string(), "4000.00");
    }

    #[tokio::test]
    async fn cashflow_seeds_running_balance_from_prior_transactions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ledger(dir.path());
        let user = Id::from_string("u1");

        store
            .insert_transaction(Transaction::draft(
                user.clone(),
                Money::from_paise(1_000_00),
                TransactionType::Income,
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                "Salary & Income",
                "Salary",
            ))
            .await
            .unwrap();
        store
            .insert_transaction(Transaction::draft(
                user.clone(),
                Money::from_paise(100_00),
                TransactionType::Expense,
                NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                "Food & Dining",
                "Lunch",
            ))
            .await
            .unwrap();

        let points = store
            .get_cashflow(
                &user,
                NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(points.len(), 1);
        assert_eq!(points[0].running_balance.to_string(), "900.00");
    }
}
