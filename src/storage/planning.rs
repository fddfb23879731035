use std::path::PathBuf;

use anyhow::Result;

use crate::models::{
    Budget, BusinessProfile, BillSplit, Customer, Goal, Invoice, MerchantRule, PaymentHistory,
    ScheduledPayment, Vendor, VendorPayment,
};
use crate::money::Money;

use super::collection::Collection;

/// Budgets, goals, scheduled payments, merchant rules, and the GST/vendor
/// sub-modules. Each member is a `Collection` — directory-of-JSON-files CRUD
/// — since the spec notes these entities "follow the same CRUD shape" as
/// the Ledger store.
pub struct PlanningStore {
    pub budgets: Collection<Budget>,
    pub goals: Collection<Goal>,
    pub scheduled_payments: Collection<ScheduledPayment>,
    pub merchant_rules: Collection<MerchantRule>,
    pub vendors: Collection<Vendor>,
    pub vendor_payments: Collection<VendorPayment>,
    pub payment_history: Collection<PaymentHistory>,
    pub customers: Collection<Customer>,
    pub invoices: Collection<Invoice>,
    pub business_profiles: Collection<BusinessProfile>,
    pub bill_splits: Collection<BillSplit>,
}

impl PlanningStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            budgets: Collection::new(base_dir.join("budgets")),
            goals: Collection::new(base_dir.join("goals")),
            scheduled_payments: Collection::new(base_dir.join("scheduled_payments")),
            merchant_rules: Collection::new(base_dir.join("merchant_rules")),
            vendors: Collection::new(base_dir.join("vendors")),
            vendor_payments: Collection::new(base_dir.join("vendor_payments")),
            payment_history: Collection::new(base_dir.join("payment_history")),
            customers: Collection::new(base_dir.join("customers")),
            invoices: Collection::new(base_dir.join("invoices")),
            business_profiles: Collection::new(base_dir.join("business_profile")),
            bill_splits: Collection::new(base_dir.join("bill_splits")),
        }
    }

    /// Sum of unpaid `VendorPayment.outstanding()` for one vendor, across
    /// every bill issued to them.
    pub async fn vendor_outstanding_balance(&self, vendor_id: &crate::models::Id) -> Result<Money> {
        let payments = self.vendor_payments.list_values().await?;
        Ok(payments
            .into_iter()
            .filter(|p| &p.vendor_id == vendor_id)
            .map(|p| p.outstanding())
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Id, PaymentStatus};

    #[tokio::test]
    async fn vendor_outstanding_balance_sums_unpaid_bills() {
        let dir = tempfile::tempdir().unwrap();
        let store = PlanningStore::new(dir.path().to_path_buf());
        let vendor_id = Id::from_string("v1");

        store
            .vendor_payments
            .put(
                &Id::from_string("vp1"),
                &VendorPayment {
                    id: Id::from_string("vp1"),
                    user_id: Id::from_string("u1"),
                    vendor_id: vendor_id.clone(),
                    bill_amount: Money::from_paise(10_000_00),
                    paid_amount: Money::from_paise(4_000_00),
                    due_date: None,
                    payment_status: PaymentStatus::Partial,
                },
            )
            .await
            .unwrap();
        store
            .vendor_payments
            .put(
                &Id::from_string("vp2"),
                &VendorPayment {
                    id: Id::from_string("vp2"),
                    user_id: Id::from_string("u1"),
                    vendor_id: vendor_id.clone(),
                    bill_amount: Money::from_paise(2_000_00),
                    paid_amount: Money::zero(),
                    due_date: None,
                    payment_status: PaymentStatus::Pending,
                },
            )
            .await
            .unwrap();

        let outstanding = store.vendor_outstanding_balance(&vendor_id).await.unwrap();
        assert_eq!(outstanding.to_string(), "8000.00");
    }
}
