//! Mudra-compliant DPR financial engine: pure, deterministic project-report
//! math for PMMY/Mudra loan applications. No collaborator calls here — every
//! number is derived from the input alone, which is what makes `what_if`
//! cheap (re-run the whole pipeline against a patched input).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::money::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedAsset {
    pub name: String,
    pub amount: Money,
    /// Straight-line depreciation period. Defaults to 10 years when absent.
    pub life_years: Option<u32>,
}

impl FixedAsset {
    fn life_years(&self) -> u32 {
        self.life_years.unwrap_or(10)
    }

    fn annual_depreciation(&self) -> Money {
        self.amount.scale(Decimal::ONE / Decimal::from(self.life_years()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MudraDprInput {
    pub fixed_assets: Vec<FixedAsset>,
    pub rent: Money,
    pub wages: Money,
    pub utilities: Money,
    pub other: Money,
    pub raw_material_per_unit: Money,
    /// Monthly production capacity at 100% utilization.
    pub units_full_capacity: u64,
    /// Capacity utilization fraction (0..1) for years 1..5, oldest first.
    pub utilization_by_year: [Decimal; 5],
    pub working_capital_months: Decimal,
    /// Promoter's contribution, as a percent of total project cost.
    pub promoter_pct: Decimal,
    /// Annual interest rate, as a percent.
    pub interest_rate: Decimal,
    pub tenure_months: u32,
    pub selling_price: Money,
    /// Annual inflation rate, as a fraction (e.g. 0.06).
    pub inflation: Decimal,
    /// Corporate tax rate, as a percent.
    pub tax_rate: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MudraCategory {
    Shishu,
    Kishore,
    Tarun,
}

impl MudraCategory {
    pub fn classify(total: Money) -> Self {
        if total <= Money::from_paise(50_000_00) {
            Self::Shishu
        } else if total <= Money::from_paise(500_000_00) {
            Self::Kishore
        } else {
            Self::Tarun
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProjectCost {
    pub total_fixed: Money,
    pub monthly_opex: Money,
    pub working_capital: Money,
    pub subtotal: Money,
    pub preliminary_expenses: Money,
    pub contingency: Money,
    pub total: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MeansOfFinance {
    pub promoter_contribution: Money,
    pub loan_amount: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct YearlyLoanRow {
    pub year: u32,
    pub opening_balance: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub closing_balance: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct YearlyDepreciation {
    pub year: u32,
    pub depreciation: Money,
    pub accumulated: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct YearPnl {
    pub year: u32,
    pub revenue: Money,
    pub costs: Money,
    pub ebitda: Money,
    pub depreciation: Money,
    pub interest: Money,
    pub pbt: Money,
    pub tax: Money,
    pub pat: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct YearBalanceSheet {
    pub year: u32,
    pub gross_fixed_assets: Money,
    pub accumulated_depreciation: Money,
    pub net_fixed_assets: Money,
    pub current_assets: Money,
    pub loan_outstanding: Money,
    pub promoter_equity: Money,
    pub retained_earnings: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DscrBand {
    Excellent,
    Good,
    Marginal,
    Weak,
    Poor,
}

impl DscrBand {
    fn classify(value: f64) -> Self {
        if value >= 2.0 {
            Self::Excellent
        } else if value >= 1.5 {
            Self::Good
        } else if value >= 1.25 {
            Self::Marginal
        } else if value >= 1.0 {
            Self::Weak
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DscrYear {
    pub year: u32,
    pub dscr: f64,
    pub band: DscrBand,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakEven {
    pub achievable: bool,
    pub break_even_units: Option<u64>,
    pub break_even_revenue: Option<Money>,
    pub break_even_months: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MudraDprOutput {
    pub project_cost: ProjectCost,
    pub category: MudraCategory,
    pub means_of_finance: MeansOfFinance,
    pub emi: Money,
    pub loan_schedule: Vec<YearlyLoanRow>,
    pub depreciation_schedule: Vec<YearlyDepreciation>,
    pub profit_and_loss: Vec<YearPnl>,
    pub balance_sheet: Vec<YearBalanceSheet>,
    pub dscr: Vec<DscrYear>,
    pub average_dscr: f64,
    pub irr_percent: f64,
    pub break_even: BreakEven,
    pub is_bankable: bool,
    pub recommendation: String,
}

/// 5% expressed as a fraction (scale 2: `5 * 10^-2`).
const FIVE_PERCENT_FRACTION: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

pub fn run(input: &MudraDprInput) -> MudraDprOutput {
    let project_cost = compute_project_cost(input);
    let category = MudraCategory::classify(project_cost.total);
    let means_of_finance = compute_means_of_finance(input, project_cost.total);
    let emi = compute_emi(means_of_finance.loan_amount, input.interest_rate, input.tenure_months);
    let loan_schedule = simulate_loan_schedule(means_of_finance.loan_amount, input.interest_rate, input.tenure_months, emi);
    let depreciation_schedule = simulate_depreciation(&input.fixed_assets);
    let profit_and_loss = project_pnl(input, &depreciation_schedule, &loan_schedule);
    let balance_sheet = project_balance_sheet(
        input,
        project_cost,
        means_of_finance,
        &depreciation_schedule,
        &profit_and_loss,
        &loan_schedule,
    );
    let dscr = compute_dscr(&profit_and_loss, &depreciation_schedule, &loan_schedule);
    let average_dscr = average_finite_dscr(&dscr);
    let irr_percent = compute_irr(project_cost.total, &profit_and_loss, &depreciation_schedule);
    let break_even = compute_break_even(input, &depreciation_schedule, &loan_schedule);
    let is_bankable = average_dscr >= 1.5;
    let recommendation = recommend(average_dscr, is_bankable);

    MudraDprOutput {
        project_cost,
        category,
        means_of_finance,
        emi,
        loan_schedule,
        depreciation_schedule,
        profit_and_loss,
        balance_sheet,
        dscr,
        average_dscr,
        irr_percent,
        break_even,
        is_bankable,
        recommendation,
    }
}

/// Re-runs the full pipeline against a patched copy of `input`, for
/// "what happens if rent goes up 20%"-style agent queries.
pub fn what_if(input: &MudraDprInput, patch: impl FnOnce(&mut MudraDprInput)) -> MudraDprOutput {
    let mut patched = input.clone();
    patch(&mut patched);
    run(&patched)
}

fn compute_project_cost(input: &MudraDprInput) -> ProjectCost {
    let total_fixed: Money = input.fixed_assets.iter().map(|a| a.amount).sum();

    let raw_material_monthly = input
        .raw_material_per_unit
        .scale(Decimal::from(input.units_full_capacity) * input.utilization_by_year[0]);
    let monthly_opex = input.rent + input.wages + input.utilities + input.other + raw_material_monthly;

    let working_capital = monthly_opex.scale(input.working_capital_months);
    let subtotal = total_fixed + working_capital;
    let preliminary_expenses = subtotal.scale(FIVE_PERCENT_FRACTION);
    let contingency = subtotal.scale(FIVE_PERCENT_FRACTION);
    let total = subtotal + preliminary_expenses + contingency;

    ProjectCost {
        total_fixed,
        monthly_opex,
        working_capital,
        subtotal,
        preliminary_expenses,
        contingency,
        total,
    }
}

fn compute_means_of_finance(input: &MudraDprInput, total: Money) -> MeansOfFinance {
    let promoter_contribution = total.scale(input.promoter_pct / Decimal::from(100));
    MeansOfFinance {
        promoter_contribution,
        loan_amount: total - promoter_contribution,
    }
}

fn compute_emi(loan: Money, annual_rate_pct: Decimal, tenure_months: u32) -> Money {
    if tenure_months == 0 {
        return Money::zero();
    }
    if annual_rate_pct.is_zero() {
        return loan.scale(Decimal::ONE / Decimal::from(tenure_months));
    }
    let monthly_rate = annual_rate_pct / Decimal::from(1200);
    let n = tenure_months as i64;
    let one_plus_r = 1.0 + f64_of(monthly_rate);
    let factor = one_plus_r.powi(n as i32);
    let principal = f64_of(loan.as_decimal());
    let emi = principal * f64_of(monthly_rate) * factor / (factor - 1.0);
    Money::from_decimal(decimal_of(emi))
}

fn simulate_loan_schedule(
    loan: Money,
    annual_rate_pct: Decimal,
    tenure_months: u32,
    emi: Money,
) -> Vec<YearlyLoanRow> {
    let monthly_rate = annual_rate_pct / Decimal::from(1200);
    let mut balance = loan;
    let mut rows = Vec::with_capacity(5);

    for year in 1..=5u32 {
        let opening_balance = balance;
        let mut interest_year = Money::zero();
        let mut principal_year = Money::zero();

        for month_in_year in 0..12 {
            let month_index = (year - 1) * 12 + month_in_year;
            if month_index >= tenure_months || balance.is_zero() {
                continue;
            }
            let interest_m = balance.scale(monthly_rate);
            let principal_m = if (emi - interest_m) < balance {
                emi - interest_m
            } else {
                balance
            };
            balance = balance - principal_m;
            interest_year = interest_year + interest_m;
            principal_year = principal_year + principal_m;
        }

        rows.push(YearlyLoanRow {
            year,
            opening_balance,
            principal_paid: principal_year,
            interest_paid: interest_year,
            closing_balance: balance,
        });
    }

    rows
}

fn simulate_depreciation(assets: &[FixedAsset]) -> Vec<YearlyDepreciation> {
    let annual: Money = assets.iter().map(FixedAsset::annual_depreciation).sum();
    let mut rows = Vec::with_capacity(5);
    let mut accumulated = Money::zero();
    for year in 1..=5u32 {
        accumulated = accumulated + annual;
        rows.push(YearlyDepreciation {
            year,
            depreciation: annual,
            accumulated,
        });
    }
    rows
}

fn project_pnl(
    input: &MudraDprInput,
    depreciation: &[YearlyDepreciation],
    loan_schedule: &[YearlyLoanRow],
) -> Vec<YearPnl> {
    let mut rows = Vec::with_capacity(5);
    let mut inflation_factor = Decimal::ONE;

    for year in 1..=5u32 {
        if year > 1 {
            inflation_factor *= Decimal::ONE + input.inflation;
        }
        let util = input.utilization_by_year[(year - 1) as usize];
        let units = Decimal::from(input.units_full_capacity) * Decimal::from(12) * util;

        let revenue = input.selling_price.scale(units);
        let raw_material_cost = input.raw_material_per_unit.scale(units * inflation_factor);
        let fixed_opex_annual = (input.rent + input.wages + input.utilities + input.other)
            .scale(Decimal::from(12) * inflation_factor);
        let costs = raw_material_cost + fixed_opex_annual;

        let ebitda = revenue - costs;
        let dep = depreciation[(year - 1) as usize].depreciation;
        let interest = loan_schedule[(year - 1) as usize].interest_paid;
        let pbt = ebitda - dep - interest;
        let tax = if pbt.is_negative() {
            Money::zero()
        } else {
            pbt.scale(input.tax_rate / Decimal::from(100))
        };
        let pat = pbt - tax;

        rows.push(YearPnl {
            year,
            revenue,
            costs,
            ebitda,
            depreciation: dep,
            interest,
            pbt,
            tax,
            pat,
        });
    }

    rows
}

fn project_balance_sheet(
    input: &MudraDprInput,
    project_cost: ProjectCost,
    means_of_finance: MeansOfFinance,
    depreciation: &[YearlyDepreciation],
    pnl: &[YearPnl],
    loan_schedule: &[YearlyLoanRow],
) -> Vec<YearBalanceSheet> {
    let gross_fixed_assets = project_cost.total_fixed;
    let mut retained_earnings = Money::zero();
    let mut rows = Vec::with_capacity(5);

    for year in 1..=5u32 {
        let idx = (year - 1) as usize;
        retained_earnings = retained_earnings + pnl[idx].pat;
        let accumulated_depreciation = depreciation[idx].accumulated;
        let net_fixed_assets = gross_fixed_assets - accumulated_depreciation;
        let current_assets = project_cost.working_capital
            + if retained_earnings.is_negative() {
                Money::zero()
            } else {
                retained_earnings
            };

        rows.push(YearBalanceSheet {
            year,
            gross_fixed_assets,
            accumulated_depreciation,
            net_fixed_assets,
            current_assets,
            loan_outstanding: loan_schedule[idx].closing_balance,
            promoter_equity: means_of_finance.promoter_contribution,
            retained_earnings,
        });
    }

    let _ = input;
    rows
}

fn compute_dscr(
    pnl: &[YearPnl],
    depreciation: &[YearlyDepreciation],
    loan_schedule: &[YearlyLoanRow],
) -> Vec<DscrYear> {
    (0..5)
        .map(|idx| {
            let numerator = f64_of(pnl[idx].pat.as_decimal())
                + f64_of(depreciation[idx].depreciation.as_decimal())
                + f64_of(loan_schedule[idx].interest_paid.as_decimal());
            let denominator = f64_of(loan_schedule[idx].principal_paid.as_decimal())
                + f64_of(loan_schedule[idx].interest_paid.as_decimal());
            let dscr = if denominator == 0.0 { f64::INFINITY } else { numerator / denominator };
            DscrYear {
                year: (idx + 1) as u32,
                dscr,
                band: DscrBand::classify(dscr),
            }
        })
        .collect()
}

fn average_finite_dscr(dscr: &[DscrYear]) -> f64 {
    let finite: Vec<f64> = dscr.iter().map(|d| d.dscr).filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        0.0
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    }
}

/// Newton-Raphson on `NPV(r) = -total + sum((PAT_y + Dep_y) / (1+r)^y)`.
fn compute_irr(total: Money, pnl: &[YearPnl], depreciation: &[YearlyDepreciation]) -> f64 {
    let cash_flows: Vec<f64> = (0..5)
        .map(|idx| f64_of(pnl[idx].pat.as_decimal()) + f64_of(depreciation[idx].depreciation.as_decimal()))
        .collect();
    let total = f64_of(total.as_decimal());

    let mut rate = 0.1_f64;
    for _ in 0..200 {
        let mut npv = -total;
        let mut dnpv = 0.0_f64;
        for (year, cf) in cash_flows.iter().enumerate() {
            let y = (year + 1) as i32;
            let discount = (1.0 + rate).powi(y);
            npv += cf / discount;
            dnpv -= (y as f64) * cf / ((1.0 + rate).powi(y + 1));
        }
        if npv.abs() < 1e-7 {
            break;
        }
        if dnpv == 0.0 {
            break;
        }
        rate -= npv / dnpv;
    }
    round2(rate * 100.0)
}

fn compute_break_even(
    input: &MudraDprInput,
    depreciation: &[YearlyDepreciation],
    loan_schedule: &[YearlyLoanRow],
) -> BreakEven {
    let fixed_costs = input.rent + input.wages + input.utilities + input.other
        + depreciation[0].depreciation
        + loan_schedule[0].interest_paid;
    let contribution = input.selling_price - input.raw_material_per_unit;

    if contribution.is_zero() || contribution.is_negative() {
        return BreakEven {
            achievable: false,
            break_even_units: None,
            break_even_revenue: None,
            break_even_months: None,
        };
    }

    let be_units_f = f64_of(fixed_costs.as_decimal()) / f64_of(contribution.as_decimal());
    let be_units = be_units_f.ceil() as u64;
    let be_revenue = input.selling_price.scale(Decimal::from(be_units));
    let monthly_capacity_y1 = (input.units_full_capacity as f64) * f64_of(input.utilization_by_year[0]);
    let be_months = if monthly_capacity_y1 > 0.0 {
        (be_units_f / monthly_capacity_y1).ceil() as u64
    } else {
        0
    };

    BreakEven {
        achievable: true,
        break_even_units: Some(be_units),
        break_even_revenue: Some(be_revenue),
        break_even_months: Some(be_months),
    }
}

fn recommend(average_dscr: f64, is_bankable: bool) -> String {
    if !is_bankable {
        return "Average DSCR is below 1.5; strengthen promoter contribution or trim project cost before applying.".to_string();
    }
    if average_dscr >= 2.0 {
        "Strong repayment capacity; proceed with the application as projected.".to_string()
    } else {
        "Adequate repayment capacity; a bank may request additional collateral or a guarantor.".to_string()
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

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> MudraDprInput {
        MudraDprInput {
            fixed_assets: vec![FixedAsset {
                name: "Machinery".into(),
                amount: Money::from_paise(200_000_00),
                life_years: Some(10),
            }],
            rent: Money::from_paise(10_000_00),
            wages: Money::from_paise(20_000_00),
            utilities: Money::from_paise(5_000_00),
            other: Money::from_paise(2_000_00),
            raw_material_per_unit: Money::from_paise(50_00),
            units_full_capacity: 500,
            utilization_by_year: [
                Decimal::new(6, 1),
                Decimal::new(7, 1),
                Decimal::new(8, 1),
                Decimal::new(85, 2),
                Decimal::new(9, 1),
            ],
            working_capital_months: Decimal::from(3),
            promoter_pct: Decimal::from(20),
            interest_rate: Decimal::from(10),
            tenure_months: 60,
            selling_price: Money::from_paise(100_00),
            inflation: Decimal::new(6, 2),
            tax_rate: Decimal::from(25),
        }
    }

    #[test]
    fn classifies_kishore_for_mid_range_total() {
        let input = sample_input();
        let output = run(&input);
        assert_eq!(output.category, MudraCategory::Kishore);
    }

    #[test]
    fn emi_is_constant_across_the_tenure_for_zero_rate() {
        let mut input = sample_input();
        input.interest_rate = Decimal::ZERO;
        let output = run(&input);
        let expected = output.means_of_finance.loan_amount.scale(Decimal::ONE / Decimal::from(60));
        assert_eq!(output.emi, expected);
    }

    #[test]
    fn loan_schedule_has_five_years_and_amortizes_to_zero_or_less() {
        let output = run(&sample_input());
        assert_eq!(output.loan_schedule.len(), 5);
        let last = output.loan_schedule.last().unwrap();
        assert!(last.closing_balance.as_decimal() >= Decimal::ZERO);
    }

    #[test]
    fn break_even_is_unachievable_when_selling_price_below_raw_material_cost() {
        let mut input = sample_input();
        input.selling_price = Money::from_paise(10_00);
        input.raw_material_per_unit = Money::from_paise(50_00);
        let output = run(&input);
        assert!(!output.break_even.achievable);
    }

    #[test]
    fn bankability_follows_the_1_5_dscr_threshold() {
        let output = run(&sample_input());
        assert_eq!(output.is_bankable, output.average_dscr >= 1.5);
    }

    #[test]
    fn what_if_reruns_with_patched_rent() {
        let input = sample_input();
        let baseline = run(&input);
        let patched = what_if(&input, |i| i.rent = i.rent.scale(Decimal::from(2)));
        assert!(patched.project_cost.total > baseline.project_cost.total);
    }
}
