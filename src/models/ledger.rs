use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::money::Money;

use super::{Id, IdGenerator, UuidIdGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Income,
    Expense,
}

/// A single ledger entry. `id`, `user_id`, and `created_at` are immutable
/// once assigned; `category`, `description`, and `notes` are the only fields
/// a later edit may touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Id,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,

    pub amount: Money,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,

    pub category: String,
    pub description: String,
    pub notes: Option<String>,

    pub merchant: Option<String>,
    pub payment_method: Option<String>,
    pub receipt_url: Option<String>,
    pub is_recurring: bool,
}

impl Transaction {
    /// Builds a pending transaction with no `id`/`created_at` assigned yet —
    /// `Ledger::create_transaction` is what stamps those, so the invariants
    /// around I1 (budget `spent` bump) stay in one place.
    #[allow(clippy::too_many_arguments)]
    pub fn draft(
        user_id: Id,
        amount: Money,
        kind: TransactionType,
        date: NaiveDate,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Id::from_string(""),
            user_id,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            amount,
            kind,
            date,
            time: None,
            category: category.into(),
            description: description.into(),
            notes: None,
            merchant: None,
            payment_method: None,
            receipt_url: None,
            is_recurring: false,
        }
    }

    pub fn stamp(mut self, ids: &dyn IdGenerator, clock: &dyn Clock) -> Self {
        self.id = ids.new_id();
        self.created_at = clock.now();
        self
    }

    pub fn stamp_default(self) -> Self {
        self.stamp(&UuidIdGenerator, &SystemClock)
    }

    pub fn with_time(mut self, time: NaiveTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_receipt_url(mut self, url: impl Into<String>) -> Self {
        self.receipt_url = Some(url.into());
        self
    }

    pub fn with_recurring(mut self, is_recurring: bool) -> Self {
        self.is_recurring = is_recurring;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Derived cache keyed by `(user_id, date)`. Rebuilt wholesale by the
/// analytics rebuild routine rather than incrementally maintained, since
/// incremental maintenance is what lets it drift from the ledger in the
/// first place (see I2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub total_spent: Money,
    pub total_income: Money,
}

impl DailyTrend {
    pub fn zero(date: NaiveDate) -> Self {
        Self {
            date,
            total_spent: Money::zero(),
            total_income: Money::zero(),
        }
    }

    pub fn add(&mut self, transaction: &Transaction) {
        match transaction.kind {
            TransactionType::Expense => self.total_spent = self.total_spent + transaction.amount,
            TransactionType::Income => self.total_income = self.total_income + transaction.amount,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionFilter<'a> {
    pub user_id: Option<&'a Id>,
    pub category: Option<&'a str>,
    pub kind: Option<TransactionType>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpendingSummary {
    pub total_income: Money,
    pub total_expenses: Money,
    pub net: Money,
    pub savings_rate: f64,
    pub by_category: std::collections::BTreeMap<String, Money>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CashflowPoint {
    pub date: NaiveDate,
    pub income: Money,
    pub expenses: Money,
    pub running_balance: Money,
}
