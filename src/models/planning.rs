use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::money::Money;

use super::{Id, IdGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: Id,
    pub user_id: Id,
    pub name: String,
    pub category: String,
    pub amount: Money,
    pub spent: Money,
    pub period: Period,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub icon: String,
}

impl Budget {
    /// Applies invariant I1: every expense posted against this category
    /// bumps `spent`. Deletion of the originating transaction is not
    /// required to decrement it back (documented, not fixed — see I1 in the
    /// data model).
    pub fn record_expense(&mut self, amount: Money) {
        self.spent = self.spent + amount;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Completed,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Id,
    pub user_id: Id,
    pub name: String,
    pub target_amount: Money,
    pub current_amount: Money,
    pub deadline: Option<NaiveDate>,
    pub status: GoalStatus,
    pub icon: String,
    pub notes: Option<String>,
}

impl Goal {
    /// Invariant I3: `status == Completed` iff `current_amount >=
    /// target_amount`, re-checked after every `add_funds`. A goal already
    /// `Paused` by the user is left alone rather than silently reactivated.
    pub fn add_funds(&mut self, amount: Money) {
        self.current_amount = self.current_amount + amount;
        if self.status != GoalStatus::Paused {
            self.status = if self.current_amount >= self.target_amount {
                GoalStatus::Completed
            } else {
                GoalStatus::Active
            };
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFrequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledPaymentStatus {
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Regular,
    Loan,
    Emi,
}

/// Loan/EMI-only amortization fields. `None` for `PaymentType::Regular`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoanTerms {
    pub interest_rate: f64,
    pub total_tenure: u32,
    pub principal_outstanding: Money,
    pub total_interest_paid: Money,
    pub total_principal_paid: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPayment {
    pub id: Id,
    pub user_id: Id,
    pub name: String,
    pub amount: Money,
    pub category: String,
    pub frequency: PaymentFrequency,
    pub due_date: NaiveDate,
    pub next_due_date: NaiveDate,
    pub is_autopay: bool,
    pub status: ScheduledPaymentStatus,
    pub reminder_days: u32,
    pub last_paid_date: Option<NaiveDate>,
    pub payment_type: PaymentType,
    pub loan: Option<LoanTerms>,
}

/// A single MerchantRule, the user-edited override layer the categorizer
/// consults before the built-in keyword table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantRule {
    pub id: Id,
    pub user_id: Id,
    /// Normalized upper-case token derived from a raw description. Unique
    /// per user.
    pub keyword: String,
    pub category: String,
    pub is_auto: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: Id,
    pub user_id: Id,
    pub name: String,
    pub contact: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorPayment {
    pub id: Id,
    pub user_id: Id,
    pub vendor_id: Id,
    pub bill_amount: Money,
    pub paid_amount: Money,
    pub due_date: Option<NaiveDate>,
    pub payment_status: PaymentStatus,
}

impl VendorPayment {
    pub fn outstanding(&self) -> Money {
        (self.bill_amount - self.paid_amount).abs()
    }

    /// `paid_amount` only ever grows, and `payment_status` only ever moves
    /// forward: `pending -> partial -> paid`. `paid` is terminal until a new
    /// bill (a fresh `VendorPayment`) is created.
    pub fn make_payment(&mut self, amount: Money, ids: &dyn IdGenerator, clock: &dyn Clock) -> PaymentHistory {
        self.paid_amount = self.paid_amount + amount;
        self.payment_status = if self.paid_amount >= self.bill_amount {
            PaymentStatus::Paid
        } else if !self.paid_amount.is_zero() {
            PaymentStatus::Partial
        } else {
            self.payment_status
        };

        PaymentHistory {
            id: ids.new_id(),
            vendor_payment_id: self.id.clone(),
            amount,
            paid_at: clock.now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentHistory {
    pub id: Id,
    pub vendor_payment_id: Id,
    pub amount: Money,
    pub paid_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Id,
    pub user_id: Id,
    pub name: String,
    pub gstin: Option<String>,
    pub state: String,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub user_id: Id,
    pub legal_name: String,
    pub gstin: Option<String>,
    pub state: String,
    pub next_invoice_sequence: u64,
}

impl BusinessProfile {
    /// Sequential invoice numbering, e.g. `INV-2026-000042`. The sequence is
    /// per-business, not per-customer.
    pub fn next_invoice_number(&mut self, year: i32) -> String {
        let number = format!("INV-{year}-{:06}", self.next_invoice_sequence);
        self.next_invoice_sequence += 1;
        number
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: Id,
    pub invoice_id: Id,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
    pub gst_rate: Decimal,
}

impl InvoiceItem {
    pub fn taxable_value(&self) -> Money {
        self.unit_price.scale(self.quantity)
    }

    pub fn tax(&self) -> Money {
        self.taxable_value().scale(self.gst_rate / Decimal::from(100))
    }

    pub fn total(&self) -> Money {
        self.taxable_value() + self.tax()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GstSplit {
    pub cgst: Money,
    pub sgst: Money,
    pub igst: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Id,
    pub user_id: Id,
    pub customer_id: Id,
    pub invoice_number: String,
    pub date: NaiveDate,
    pub items: Vec<InvoiceItem>,
}

impl Invoice {
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(InvoiceItem::taxable_value).sum()
    }

    pub fn total_tax(&self) -> Money {
        self.items.iter().map(InvoiceItem::tax).sum()
    }

    pub fn total(&self) -> Money {
        self.subtotal() + self.total_tax()
    }

    /// Intra-state sales split the tax evenly into CGST/SGST; inter-state
    /// sales charge the whole rate as IGST instead.
    pub fn gst_split(&self, business_state: &str, customer_state: &str) -> GstSplit {
        let tax = self.total_tax();
        if business_state.eq_ignore_ascii_case(customer_state) {
            let half = tax.scale(Decimal::new(5, 1));
            GstSplit {
                cgst: half,
                sgst: tax - half,
                igst: Money::zero(),
            }
        } else {
            GstSplit {
                cgst: Money::zero(),
                sgst: Money::zero(),
                igst: tax,
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillItem {
    pub id: Id,
    pub bill_split_id: Id,
    pub description: String,
    pub amount: Money,
    pub participant: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitItem {
    pub id: Id,
    pub bill_split_id: Id,
    pub participant: String,
    pub share: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillSplit {
    pub id: Id,
    pub user_id: Id,
    pub title: String,
    pub total_amount: Money,
    pub tax_percent: Decimal,
    pub tip_percent: Decimal,
    pub items: Vec<BillItem>,
    pub splits: Vec<SplitItem>,
}

impl BillSplit {
    /// Derives each participant's share from the items assigned to them,
    /// then adds a proportional slice of the bill-level tax/tip percentages
    /// on top of their pre-tax subtotal. Mirrors `bill_split_service.py`'s
    /// by-item split (sum of `assigned_to` items per participant), extended
    /// with the GST-style tax/tip surcharge the original doesn't compute.
    pub fn compute_splits(&self, ids: &dyn IdGenerator) -> Vec<SplitItem> {
        let surcharge = (self.tax_percent + self.tip_percent) / Decimal::from(100);
        let mut subtotals: Vec<(String, Money)> = Vec::new();
        for item in &self.items {
            match subtotals.iter_mut().find(|(participant, _)| *participant == item.participant) {
                Some((_, subtotal)) => *subtotal = *subtotal + item.amount,
                None => subtotals.push((item.participant.clone(), item.amount)),
            }
        }
        subtotals
            .into_iter()
            .map(|(participant, subtotal)| SplitItem {
                id: ids.new_id(),
                bill_split_id: self.id.clone(),
                participant,
                share: subtotal + subtotal.scale(surcharge),
            })
            .collect()
    }

    /// Per-participant shares must sum to `total_amount` within 0.01.
    pub fn reconciles(&self) -> bool {
        let sum: Money = self.splits.iter().map(|s| s.share).sum();
        sum.abs_diff(&self.total_amount) <= Money::from_paise(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::FixedIdGenerator;
    use chrono::{TimeZone, Utc};

    #[test]
    fn goal_completes_when_target_reached() {
        let mut goal = Goal {
            id: Id::from_string("g1"),
            user_id: Id::from_string("u1"),
            name: "Emergency fund".into(),
            target_amount: Money::from_paise(1_000_00),
            current_amount: Money::from_paise(900_00),
            deadline: None,
            status: GoalStatus::Active,
            icon: "🎯".into(),
            notes: None,
        };
        goal.add_funds(Money::from_paise(100_00));
        assert_eq!(goal.status, GoalStatus::Completed);
    }

    #[test]
    fn paused_goal_stays_paused_after_add_funds() {
        let mut goal = Goal {
            id: Id::from_string("g1"),
            user_id: Id::from_string("u1"),
            name: "Trip".into(),
            target_amount: Money::from_paise(1_000_00),
            current_amount: Money::from_paise(100_00),
            deadline: None,
            status: GoalStatus::Paused,
            icon: "✈️".into(),
            notes: None,
        };
        goal.add_funds(Money::from_paise(2_000_00));
        assert_eq!(goal.status, GoalStatus::Paused);
    }

    #[test]
    fn vendor_payment_transitions_are_monotonic() {
        let ids = FixedIdGenerator::new([Id::from_string("ph-1")]);
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let mut payment = VendorPayment {
            id: Id::from_string("vp-1"),
            user_id: Id::from_string("u1"),
            vendor_id: Id::from_string("v1"),
            bill_amount: Money::from_paise(10_000_00),
            paid_amount: Money::zero(),
            due_date: None,
            payment_status: PaymentStatus::Pending,
        };

        payment.make_payment(Money::from_paise(4_000_00), &ids, &clock);
        assert_eq!(payment.payment_status, PaymentStatus::Partial);

        payment.make_payment(Money::from_paise(6_000_00), &ids, &clock);
        assert_eq!(payment.payment_status, PaymentStatus::Paid);
        assert_eq!(payment.outstanding(), Money::zero());
    }

    #[test]
    fn invoice_gst_split_intra_state_splits_evenly() {
        let invoice = Invoice {
            id: Id::from_string("inv-1"),
            user_id: Id::from_string("u1"),
            customer_id: Id::from_string("c1"),
            invoice_number: "INV-2026-000001".into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            items: vec![InvoiceItem {
                id: Id::from_string("ii-1"),
                invoice_id: Id::from_string("inv-1"),
                description: "Consulting".into(),
                quantity: Decimal::from(1),
                unit_price: Money::from_paise(10_000_00),
                gst_rate: Decimal::from(18),
            }],
        };

        let split = invoice.gst_split("Maharashtra", "Maharashtra");
        assert_eq!(split.cgst, split.sgst);
        assert!(split.igst.is_zero());
        assert_eq!(split.cgst + split.sgst, invoice.total_tax());
    }

    #[test]
    fn invoice_gst_split_inter_state_is_all_igst() {
        let invoice = Invoice {
            id: Id::from_string("inv-1"),
            user_id: Id::from_string("u1"),
            customer_id: Id::from_string("c1"),
            invoice_number: "INV-2026-000002".into(),
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            items: vec![InvoiceItem {
                id: Id::from_string("ii-1"),
                invoice_id: Id::from_string("inv-1"),
                description: "Consulting".into(),
                quantity: Decimal::from(1),
                unit_price: Money::from_paise(10_000_00),
                gst_rate: Decimal::from(18),
            }],
        };

        let split = invoice.gst_split("Maharashtra", "Karnataka");
        assert!(split.cgst.is_zero());
        assert!(split.sgst.is_zero());
        assert_eq!(split.igst, invoice.total_tax());
    }

    #[test]
    fn bill_split_reconciles_within_one_paisa() {
        let split = BillSplit {
            id: Id::from_string("bs-1"),
            user_id: Id::from_string("u1"),
            title: "Dinner".into(),
            total_amount: Money::from_paise(10_000),
            tax_percent: Decimal::from(5),
            tip_percent: Decimal::from(10),
            items: vec![],
            splits: vec![
                SplitItem {
                    id: Id::from_string("si-1"),
                    bill_split_id: Id::from_string("bs-1"),
                    participant: "A".into(),
                    share: Money::from_paise(5_000),
                },
                SplitItem {
                    id: Id::from_string("si-2"),
                    bill_split_id: Id::from_string("bs-1"),
                    participant: "B".into(),
                    share: Money::from_paise(5_000),
                },
            ],
        };
        assert!(split.reconciles());
    }

    #[test]
    fn bill_split_computes_shares_from_items_plus_proportional_surcharge() {
        let ids = FixedIdGenerator::new([Id::from_string("si-1"), Id::from_string("si-2")]);
        let split = BillSplit {
            id: Id::from_string("bs-1"),
            user_id: Id::from_string("u1"),
            title: "Dinner".into(),
            total_amount: Money::from_paise(13_800),
            tax_percent: Decimal::from(5),
            tip_percent: Decimal::from(10),
            items: vec![
                BillItem {
                    id: Id::from_string("bi-1"),
                    bill_split_id: Id::from_string("bs-1"),
                    description: "Pasta".into(),
                    amount: Money::from_paise(6_000),
                    participant: "A".into(),
                },
                BillItem {
                    id: Id::from_string("bi-2"),
                    bill_split_id: Id::from_string("bs-1"),
                    description: "Steak".into(),
                    amount: Money::from_paise(4_000),
                    participant: "B".into(),
                },
                BillItem {
                    id: Id::from_string("bi-3"),
                    bill_split_id: Id::from_string("bs-1"),
                    description: "Garlic bread".into(),
                    amount: Money::from_paise(2_000),
                    participant: "A".into(),
                },
            ],
            splits: vec![],
        };

        let splits = split.compute_splits(&ids);
        assert_eq!(splits.len(), 2);
        let a = splits.iter().find(|s| s.participant == "A").unwrap();
        let b = splits.iter().find(|s| s.participant == "B").unwrap();
        // A's pre-tax subtotal is 8000 (6000 + 2000), B's is 4000; 15%
        // surcharge on top of each.
        assert_eq!(a.share, Money::from_paise(9_200));
        assert_eq!(b.share, Money::from_paise(4_600));

        let mut reconciled = split.clone();
        reconciled.splits = splits;
        assert!(reconciled.reconciles());
    }
}
