//! Pure retail-finance calculators (§4.5, "Pure calculators"): SIP, FD, RD,
//! EMI, CAGR, lumpsum, compound interest, emergency fund, savings rate, and
//! old/new-regime income tax. Every function here is deterministic and
//! collaborator-free, so none of them ever sets `needs_confirmation`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::Money;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SipResult {
    pub future_value: Money,
    pub total_invested: Money,
    pub wealth_gained: Money,
}

/// `FV = P * ((1+r)^n - 1)/r * (1+r)`, `r` the monthly rate.
pub fn calculate_sip(monthly_investment: Money, expected_annual_rate_pct: Decimal, duration_months: u32) -> SipResult {
    let p = f64_of(monthly_investment.as_decimal());
    let r = f64_of(expected_annual_rate_pct) / 100.0 / 12.0;
    let n = duration_months as f64;

    let future_value = if r == 0.0 {
        p * n
    } else {
        p * (((1.0 + r).powf(n) - 1.0) / r) * (1.0 + r)
    };
    let total_invested = p * n;

    SipResult {
        future_value: money_of(future_value),
        total_invested: money_of(total_invested),
        wealth_gained: money_of(future_value - total_invested),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GoalSipResult {
    pub required_monthly_investment: Money,
}

/// The inverse of [`calculate_sip`]: solve `P` for a target `future_value`.
pub fn calculate_goal_sip(target_amount: Money, expected_annual_rate_pct: Decimal, duration_months: u32) -> GoalSipResult {
    let target = f64_of(target_amount.as_decimal());
    let r = f64_of(expected_annual_rate_pct) / 100.0 / 12.0;
    let n = duration_months as f64;

    let required = if r == 0.0 {
        target / n
    } else {
        target / ((((1.0 + r).powf(n) - 1.0) / r) * (1.0 + r))
    };

    GoalSipResult {
        required_monthly_investment: money_of(required),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LumpsumResult {
    pub future_value: Money,
    pub wealth_gained: Money,
}

/// `FV = P * (1+r)^n`, `r` the annual rate, `n` in years.
pub fn calculate_lumpsum(principal: Money, expected_annual_rate_pct: Decimal, duration_years: u32) -> LumpsumResult {
    let p = f64_of(principal.as_decimal());
    let r = f64_of(expected_annual_rate_pct) / 100.0;
    let future_value = p * (1.0 + r).powi(duration_years as i32);

    LumpsumResult {
        future_value: money_of(future_value),
        wealth_gained: money_of(future_value - p),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FdResult {
    pub maturity_value: Money,
    pub interest_earned: Money,
}

/// Quarterly-compounded fixed deposit: `A = P * (1 + r/4)^(4t)`.
pub fn calculate_fd(principal: Money, annual_rate_pct: Decimal, tenure_months: u32) -> FdResult {
    let p = f64_of(principal.as_decimal());
    let r = f64_of(annual_rate_pct) / 100.0;
    let quarters = tenure_months as f64 / 3.0;
    let maturity = p * (1.0 + r / 4.0).powf(quarters);

    FdResult {
        maturity_value: money_of(maturity),
        interest_earned: money_of(maturity - p),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RdResult {
    pub maturity_value: Money,
    pub total_deposited: Money,
    pub interest_earned: Money,
}

/// Recurring deposit, quarterly-compounded per installment: each of the `n`
/// monthly deposits earns compound interest for its own remaining tenure.
pub fn calculate_rd(monthly_deposit: Money, annual_rate_pct: Decimal, tenure_months: u32) -> RdResult {
    let deposit = f64_of(monthly_deposit.as_decimal());
    let r = f64_of(annual_rate_pct) / 100.0;

    let mut maturity = 0.0;
    for installment in 1..=tenure_months {
        let remaining_months = (tenure_months - installment + 1) as f64;
        let quarters = remaining_months / 3.0;
        maturity += deposit * (1.0 + r / 4.0).powf(quarters);
    }
    let total_deposited = deposit * tenure_months as f64;

    RdResult {
        maturity_value: money_of(maturity),
        total_deposited: money_of(total_deposited),
        interest_earned: money_of(maturity - total_deposited),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EmiResult {
    pub emi: Money,
    pub total_payment: Money,
    pub total_interest: Money,
}

/// Standard reducing-balance EMI. `emi = loan / tenure_months` when `rate = 0`.
pub fn calculate_emi(principal: Money, annual_rate_pct: Decimal, tenure_months: u32) -> EmiResult {
    let p = f64_of(principal.as_decimal());
    let r = f64_of(annual_rate_pct) / 100.0 / 12.0;
    let n = tenure_months as f64;

    let emi = if r == 0.0 {
        p / n
    } else {
        p * r * (1.0 + r).powf(n) / ((1.0 + r).powf(n) - 1.0)
    };
    let total_payment = emi * n;

    EmiResult {
        emi: money_of(emi),
        total_payment: money_of(total_payment),
        total_interest: money_of(total_payment - p),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CagrResult {
    pub cagr_pct: Decimal,
}

/// `CAGR = (final/initial)^(1/years) - 1`, as a percentage.
pub fn calculate_cagr(initial_value: Money, final_value: Money, years: u32) -> CagrResult {
    let initial = f64_of(initial_value.as_decimal());
    let finale = f64_of(final_value.as_decimal());

    let cagr_pct = if initial <= 0.0 || years == 0 {
        0.0
    } else {
        ((finale / initial).powf(1.0 / years as f64) - 1.0) * 100.0
    };

    CagrResult {
        cagr_pct: decimal_of(round2(cagr_pct)),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompoundInterestResult {
    pub amount: Money,
    pub interest: Money,
}

/// `A = P * (1 + r/m)^(m*t)`, `m` the number of times compounded per year.
pub fn calculate_compound_interest(
    principal: Money,
    annual_rate_pct: Decimal,
    times_compounded_per_year: u32,
    years: Decimal,
) -> CompoundInterestResult {
    let p = f64_of(principal.as_decimal());
    let r = f64_of(annual_rate_pct) / 100.0;
    let m = times_compounded_per_year.max(1) as f64;
    let t = f64_of(years);

    let amount = p * (1.0 + r / m).powf(m * t);

    CompoundInterestResult {
        amount: money_of(amount),
        interest: money_of(amount - p),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EmergencyFundResult {
    pub recommended_amount: Money,
    pub months_covered: u32,
}

/// `recommended = monthly_expenses * months` (default 6 months' cover).
pub fn calculate_emergency_fund(monthly_expenses: Money, months: Option<u32>) -> EmergencyFundResult {
    let months = months.unwrap_or(6);
    EmergencyFundResult {
        recommended_amount: monthly_expenses.scale(Decimal::from(months)),
        months_covered: months,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SavingsRateResult {
    pub savings_rate_pct: Decimal,
    pub savings: Money,
}

/// `rate = (income - expenses) / income * 100`; `0` when income is zero.
pub fn calculate_savings_rate(income: Money, expenses: Money) -> SavingsRateResult {
    let savings = income - expenses;
    let rate = if income.is_zero() {
        Decimal::ZERO
    } else {
        (savings.as_decimal() / income.as_decimal() * Decimal::from(100)).round_dp(2)
    };

    SavingsRateResult {
        savings_rate_pct: rate,
        savings,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxRegime {
    Old,
    New,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxSlab {
    pub upto: Option<Money>,
    pub rate_pct: Decimal,
    pub tax_in_slab: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxResult {
    pub regime: TaxRegime,
    pub taxable_income: Money,
    pub tax_before_cess: Money,
    pub cess: Money,
    pub total_tax: Money,
    pub effective_rate_pct: Decimal,
    pub slabs: Vec<TaxSlab>,
}

const CESS_RATE_PCT: i64 = 4;

/// New-regime slabs (FY2024-25): the standard deduction is applied by the
/// caller before `gross_income` reaches here if applicable; `deductions`
/// (80C/80D/etc, only meaningful under the old regime) are subtracted first.
pub fn calculate_tax(gross_income: Money, regime: TaxRegime, deductions: Money) -> TaxResult {
    let taxable_income = match regime {
        TaxRegime::New => gross_income,
        TaxRegime::Old => {
            let reduced = gross_income - deductions;
            if reduced.is_negative() {
                Money::zero()
            } else {
                reduced
            }
        }
    };

    let slabs_table: &[(i64, i64, i64)] = match regime {
        // (slab upper bound in rupees, rate pct; i64::MAX sentinel for "no cap")
        TaxRegime::New => &[
            (300_000, 0, 0),
            (700_000, 5, 0),
            (1_000_000, 10, 0),
            (1_200_000, 15, 0),
            (1_500_000, 20, 0),
            (i64::MAX, 30, 0),
        ],
        TaxRegime::Old => &[
            (250_000, 0, 0),
            (500_000, 5, 0),
            (1_000_000, 20, 0),
            (i64::MAX, 30, 0),
        ],
    };

    let income = taxable_income.as_decimal();
    let mut tax_before_cess = Decimal::ZERO;
    let mut lower = Decimal::ZERO;
    let mut slabs = Vec::with_capacity(slabs_table.len());

    for (upto, rate, _) in slabs_table {
        let upper = if *upto == i64::MAX {
            None
        } else {
            Some(Decimal::from(*upto))
        };
        let slab_width = match upper {
            Some(u) if income > u => u - lower,
            Some(u) => (income - lower).max(Decimal::ZERO).min(u - lower),
            None => (income - lower).max(Decimal::ZERO),
        };
        let rate = Decimal::from(*rate);
        let slab_tax = (slab_width * rate / Decimal::from(100)).round_dp(2);
        tax_before_cess += slab_tax;

        slabs.push(TaxSlab {
            upto: upper.map(Money::from_decimal),
            rate_pct: rate,
            tax_in_slab: Money::from_decimal(slab_tax),
        });

        if let Some(u) = upper {
            if income <= u {
                break;
            }
            lower = u;
        }
    }

    // Section 87A rebate: nil tax up to the zero-tax threshold for both regimes,
    // implemented here as a floor rather than a full rebate table.
    let rebate_threshold = match regime {
        TaxRegime::New => Decimal::from(700_000),
        TaxRegime::Old => Decimal::from(500_000),
    };
    if income <= rebate_threshold {
        tax_before_cess = Decimal::ZERO;
        for slab in &mut slabs {
            slab.tax_in_slab = Money::zero();
        }
    }

    let cess = (tax_before_cess * Decimal::from(CESS_RATE_PCT) / Decimal::from(100)).round_dp(2);
    let total_tax = tax_before_cess + cess;
    let effective_rate_pct = if income.is_zero() {
        Decimal::ZERO
    } else {
        (total_tax / income * Decimal::from(100)).round_dp(2)
    };

    TaxResult {
        regime,
        taxable_income,
        tax_before_cess: Money::from_decimal(tax_before_cess),
        cess: Money::from_decimal(cess),
        total_tax: Money::from_decimal(total_tax),
        effective_rate_pct,
        slabs,
    }
}

fn f64_of(value: Decimal) -> f64 {
    use std::str::FromStr;
    f64::from_str(&value.to_string()).unwrap_or(0.0)
}

fn decimal_of(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn money_of(value: f64) -> Money {
    Money::from_decimal(decimal_of(value))
}
