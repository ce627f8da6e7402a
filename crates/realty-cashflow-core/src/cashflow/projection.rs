use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::RealtyError;
use crate::loan::amortization::{self, AmortizationEntry};
use crate::loan::tranches::{self, TrancheFunding};
use crate::scenario::InvestmentScenario;
use crate::types::*;
use crate::RealtyResult;

/// Largest absolute gap tolerated between reconciled totals.
pub const RECONCILIATION_TOLERANCE: Money = dec!(0.01);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CashflowCategory {
    /// Buyer's equity share of a construction tranche
    Disbursement,
    Emi,
    Rent,
    Maintenance,
    Tax,
    /// Settlement of outstanding loan balances at sale
    LoanPayoff,
    Sale,
}

/// A signed amount in one month (negative = outflow).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowEvent {
    pub month: Month,
    pub amount: Money,
    pub category: CashflowCategory,
}

/// All events of one month and their sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowPeriod {
    pub month: Month,
    pub events: Vec<CashflowEvent>,
    pub net: Money,
}

impl CashflowPeriod {
    pub fn new(month: Month, events: Vec<CashflowEvent>) -> Self {
        let net = events.iter().map(|e| e.amount).sum();
        Self { month, events, net }
    }

    pub fn total(&self, category: CashflowCategory) -> Money {
        self.events
            .iter()
            .filter(|e| e.category == category)
            .map(|e| e.amount)
            .sum()
    }
}

/// Expected against actual flow totals over the whole projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reconciliation {
    pub total_disbursed: Money,
    pub interest_paid: Money,
    pub maintenance: Money,
    pub tax: Money,
    pub gross_rent: Money,
    pub net_rent: Money,
    pub sale_value: Money,
    /// disbursed + interest + maintenance + tax
    pub expected_outflow: Money,
    pub actual_outflow: Money,
    /// net rent + maintenance + tax + sale value
    pub expected_inflow: Money,
    pub actual_inflow: Money,
    pub balanced: bool,
}

/// Monthly cash-flow series for months `0..=horizon` plus the loan detail behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashflowProjection {
    pub periods: Vec<CashflowPeriod>,
    pub funding: Vec<TrancheFunding>,
    /// Consolidated loan rows for months `1..=sale_month`
    pub loan_ledger: Vec<AmortizationEntry>,
    /// Interest the loans would cost over their full tenure
    pub lifetime_interest: Money,
    pub outstanding_at_sale: Money,
    pub sale_value: Money,
    pub reconciliation: Reconciliation,
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl CashflowProjection {
    /// Net flow per month, index = month.
    pub fn net_series(&self) -> Vec<Money> {
        self.periods.iter().map(|p| p.net).collect()
    }

    pub fn total_outflow(&self) -> Money {
        self.flows().filter(|a| a.is_sign_negative()).map(|a| -a).sum()
    }

    pub fn total_inflow(&self) -> Money {
        self.flows().filter(|a| a.is_sign_positive()).sum()
    }

    pub fn total(&self, category: CashflowCategory) -> Money {
        self.periods.iter().map(|p| p.total(category)).sum()
    }

    fn flows(&self) -> impl Iterator<Item = Money> + '_ {
        self.periods
            .iter()
            .flat_map(|p| p.events.iter().map(|e| e.amount))
    }
}

/// Loan obligations of a scenario, single-loan or multi-tranche.
struct LoanSchedule {
    funding: Vec<TrancheFunding>,
    rows: Vec<AmortizationEntry>,
    lifetime_interest: Money,
    outstanding_at_sale: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build the signed monthly cash-flow series of a scenario.
pub fn project(scenario: &InvestmentScenario) -> RealtyResult<CashflowProjection> {
    let mut warnings: Vec<String> = Vec::new();
    let sale_month = scenario.sale_month();
    let loans = loan_schedule(scenario, &mut warnings)?;
    let sale_value = sale_value(
        scenario.property_price(),
        scenario.appreciation_rate(),
        sale_month,
    )?;

    let rent_start = scenario.possession_month().max(1);
    if rent_start > sale_month {
        warnings.push(format!(
            "Possession at month {} is after the sale at month {sale_month}; no rent is earned",
            scenario.possession_month()
        ));
    }

    let mut periods = Vec::with_capacity(scenario.horizon_months() as usize + 1);
    let mut maintenance_capped = false;

    for month in 0..=scenario.horizon_months() {
        let mut events: Vec<CashflowEvent> = Vec::new();
        if month > sale_month {
            periods.push(CashflowPeriod::new(month, events));
            continue;
        }

        for f in loans.funding.iter().filter(|f| f.month == month) {
            push_event(&mut events, month, -f.equity, CashflowCategory::Disbursement);
        }

        if month >= 1 {
            if let Some(row) = loans.rows.get(month as usize - 1) {
                push_event(&mut events, month, -row.installment, CashflowCategory::Emi);
            }
        }

        if month >= rent_start {
            let gross = gross_rent(
                scenario.monthly_rent(),
                scenario.rent_escalation(),
                month - rent_start,
            )?;
            let maintenance = scenario.monthly_maintenance().min(gross);
            if maintenance < scenario.monthly_maintenance() {
                maintenance_capped = true;
            }
            let tax = (gross - maintenance) * pct_to_rate(scenario.rental_tax_rate());

            push_event(&mut events, month, gross, CashflowCategory::Rent);
            push_event(&mut events, month, -maintenance, CashflowCategory::Maintenance);
            push_event(&mut events, month, -tax, CashflowCategory::Tax);
        }

        if month == sale_month {
            push_event(
                &mut events,
                month,
                -loans.outstanding_at_sale,
                CashflowCategory::LoanPayoff,
            );
            push_event(&mut events, month, sale_value, CashflowCategory::Sale);
        }

        periods.push(CashflowPeriod::new(month, events));
    }

    if maintenance_capped {
        warnings.push(
            "Maintenance exceeds rent in some months; net rent floored at zero".into(),
        );
    }

    let interest_paid = loans.rows.iter().map(|r| r.interest_paid).sum();
    let reconciliation = reconcile(&periods, scenario.property_price(), interest_paid);

    let projection = CashflowProjection {
        periods,
        funding: loans.funding,
        loan_ledger: loans.rows,
        lifetime_interest: loans.lifetime_interest,
        outstanding_at_sale: loans.outstanding_at_sale,
        sale_value,
        reconciliation,
        warnings,
    };

    Ok(projection)
}

/// Gross monthly rent `months_let` months after rent starts.
///
/// Escalation compounds once per completed year of letting.
pub fn gross_rent(base_monthly_rent: Money, annual_growth: Percent, months_let: u32) -> RealtyResult<Money> {
    let years = i64::from(months_let / MONTHS_PER_YEAR);
    let factor = (Decimal::ONE + pct_to_rate(annual_growth))
        .checked_powi(years)
        .ok_or_else(|| RealtyError::domain("rent_escalation", "Rent escalation overflows"))?;
    Ok(base_monthly_rent * factor)
}

/// Appreciated property value after `months_held` months.
pub fn sale_value(price: Money, appreciation: Percent, months_held: Month) -> RealtyResult<Money> {
    let growth = Decimal::ONE + pct_to_rate(appreciation);
    let factor = if months_held % MONTHS_PER_YEAR == 0 {
        growth.checked_powi(i64::from(months_held / MONTHS_PER_YEAR))
    } else {
        let years = Decimal::from(months_held) / Decimal::from(MONTHS_PER_YEAR);
        growth.checked_powd(years)
    };
    factor
        .map(|f| price * f)
        .ok_or_else(|| RealtyError::domain("appreciation_rate", "Appreciation overflows"))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn push_event(events: &mut Vec<CashflowEvent>, month: Month, amount: Money, category: CashflowCategory) {
    if !amount.is_zero() {
        events.push(CashflowEvent {
            month,
            amount,
            category,
        });
    }
}

fn loan_schedule(
    scenario: &InvestmentScenario,
    warnings: &mut Vec<String>,
) -> RealtyResult<LoanSchedule> {
    let sale_month = scenario.sale_month();

    let Some(financing) = scenario.financing() else {
        let funding = tranches::split_funding(
            scenario.disbursements(),
            Decimal::ZERO,
            Default::default(),
        )?;
        return Ok(LoanSchedule {
            funding,
            rows: tranches::consolidate(&[], sale_month),
            lifetime_interest: Decimal::ZERO,
            outstanding_at_sale: Decimal::ZERO,
        });
    };

    let schedule = if scenario.is_staggered() {
        let consolidated = tranches::project(scenario.disbursements(), financing, sale_month)?;
        let outstanding = consolidated.outstanding_at(sale_month);
        LoanSchedule {
            lifetime_interest: consolidated.lifetime_interest(),
            outstanding_at_sale: outstanding,
            funding: consolidated.funding,
            rows: consolidated.monthly,
        }
    } else {
        let ledger = amortization::ledger(
            financing.loan_amount,
            financing.annual_rate,
            financing.tenure_months,
        )?;
        let price = scenario.property_price();
        let outstanding = ledger
            .get(sale_month as usize - 1)
            .map(|e| e.balance)
            .unwrap_or(Decimal::ZERO);
        let rows = (1..=sale_month)
            .map(|month| {
                ledger
                    .get(month as usize - 1)
                    .cloned()
                    .unwrap_or(AmortizationEntry {
                        period: month,
                        installment: Decimal::ZERO,
                        interest_paid: Decimal::ZERO,
                        principal_paid: Decimal::ZERO,
                        balance: Decimal::ZERO,
                    })
            })
            .collect();
        LoanSchedule {
            funding: vec![TrancheFunding {
                month: 0,
                amount: price,
                equity: price - financing.loan_amount,
                financed: financing.loan_amount,
            }],
            rows,
            lifetime_interest: amortization::total_interest(&ledger),
            outstanding_at_sale: outstanding,
        }
    };

    if schedule.outstanding_at_sale > Decimal::ZERO {
        warnings.push(format!(
            "Loan balance of {} is still outstanding at the sale in month {sale_month}; settled from sale proceeds",
            schedule.outstanding_at_sale.round_dp(2)
        ));
    }

    Ok(schedule)
}

fn reconcile(periods: &[CashflowPeriod], total_disbursed: Money, interest_paid: Money) -> Reconciliation {
    let total = |category| periods.iter().map(|p| p.total(category)).sum::<Money>();
    let maintenance = -total(CashflowCategory::Maintenance);
    let tax = -total(CashflowCategory::Tax);
    let gross_rent = total(CashflowCategory::Rent);
    let net_rent = gross_rent - maintenance - tax;
    let sale_value = total(CashflowCategory::Sale);

    let (mut actual_outflow, mut actual_inflow) = (Decimal::ZERO, Decimal::ZERO);
    for event in periods.iter().flat_map(|p| &p.events) {
        if event.amount.is_sign_negative() {
            actual_outflow -= event.amount;
        } else {
            actual_inflow += event.amount;
        }
    }

    let expected_outflow = total_disbursed + interest_paid + maintenance + tax;
    let expected_inflow = net_rent + maintenance + tax + sale_value;

    let balanced = (expected_outflow - actual_outflow).abs() <= RECONCILIATION_TOLERANCE
        && (expected_inflow - actual_inflow).abs() <= RECONCILIATION_TOLERANCE;

    Reconciliation {
        total_disbursed,
        interest_paid,
        maintenance,
        tax,
        gross_rent,
        net_rent,
        sale_value,
        expected_outflow,
        actual_outflow,
        expected_inflow,
        actual_inflow,
        balanced,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
