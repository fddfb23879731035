//! `ScheduledPayment` lifecycle (§4.2): advancing the due date, amortizing
//! loan/EMI terms, and posting the synthetic ledger entry.

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::clock::Clock;
use crate::models::{
    Id, PaymentFrequency, PaymentType, ScheduledPayment, ScheduledPaymentStatus, Transaction,
    TransactionType,
};
use crate::storage::{advance_period, Store};

pub struct MarkPaidOutcome {
    pub payment: ScheduledPayment,
    pub transaction: Transaction,
}

pub async fn mark_paid(
    store: &Store,
    payment_id: &Id,
    user_id: &Id,
    clock: &dyn Clock,
) -> Result<MarkPaidOutcome> {
    let mut payment = store
        .planning
        .scheduled_payments
        .get(payment_id)
        .await?
        .filter(|p| &p.user_id == user_id)
        .context("scheduled payment not found")?;

    let next_due_date = match payment.frequency {
        PaymentFrequency::Daily => payment.next_due_date + chrono::Duration::days(1),
        PaymentFrequency::Weekly => advance_period(payment.next_due_date, crate::models::Period::Weekly),
        PaymentFrequency::Monthly => advance_period(payment.next_due_date, crate::models::Period::Monthly),
        PaymentFrequency::Yearly => advance_period(payment.next_due_date, crate::models::Period::Yearly),
    };

    let mut description = payment.name.clone();
    if let (PaymentType::Loan | PaymentType::Emi, Some(terms)) =
        (payment.payment_type, payment.loan.as_mut())
    {
        if terms.interest_rate > 0.0 {
            let rate = Decimal::from_f64_retain(terms.interest_rate).unwrap_or(Decimal::ZERO);
            let interest_component = terms.principal_outstanding.scale(rate / Decimal::from(1200));
            let principal_component = if payment.amount > interest_component {
                payment.amount - interest_component
            } else {
                crate::money::Money::zero()
            };

            terms.principal_outstanding = if terms.principal_outstanding > principal_component {
                terms.principal_outstanding - principal_component
            } else {
                crate::money::Money::zero()
            };
            terms.total_interest_paid = terms.total_interest_paid + interest_component;
            terms.total_principal_paid = terms.total_principal_paid + principal_component;

            description = format!(
                "EMI: {} (principal {}, interest {})",
                payment.name, principal_component, interest_component
            );

            if terms.principal_outstanding.is_zero() {
                payment.status = ScheduledPaymentStatus::Completed;
            }
        }
    }

    payment.last_paid_date = Some(clock.today());
    payment.next_due_date = next_due_date;

    let transaction = store
        .create_transaction(
            Transaction::draft(
                user_id.clone(),
                payment.amount,
                TransactionType::Expense,
                clock.today(),
                payment.category.clone(),
                description,
            )
            .with_recurring(true),
        )
        .await?;

    store
        .planning
        .scheduled_payments
        .put(payment_id, &payment)
        .await?;

    Ok(MarkPaidOutcome { payment, transaction })
}
