use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::cashflow::aggregation::{self, AnnualCashflow, AnnualEntry};
use crate::cashflow::projection::{self, CashflowCategory, CashflowPeriod, Reconciliation};
use crate::construction::disbursement::Disbursement;
use crate::error::RealtyError;
use crate::loan::amortization::{AmortizationEntry, LedgerView};
use crate::loan::tranches::TrancheFunding;
use crate::returns::solver;
use crate::scenario::{InvestmentScenario, ScenarioInput};
use crate::types::*;
use crate::RealtyResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Headline figures of an investment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentSummary {
    pub currency: Currency,
    /// First non-zero consolidated monthly installment
    pub emi: Money,
    /// Highest consolidated installment over the holding period
    pub peak_emi: Money,
    pub equity_invested: Money,
    pub loan_financed: Money,
    pub total_outflow: Money,
    pub total_inflow: Money,
    pub net_profit: Money,
    /// Net profit over total outflow, as a percentage
    pub roi_pct: Percent,
    /// First-year rent over price
    pub gross_rental_yield_pct: Percent,
    /// First-year rent after maintenance and tax over price
    pub net_rental_yield_pct: Percent,
    pub projected_property_value: Money,
    pub total_gross_rent: Money,
    pub total_net_rent: Money,
    /// Interest paid while the property is held
    pub interest_paid: Money,
    /// Interest over the loans' full tenure
    pub lifetime_interest: Money,
    pub outstanding_loan_at_sale: Money,
    pub possession_month: Month,
    pub sale_month: Month,
    /// Annual-flow IRR; `None` when indeterminate
    pub irr: Option<Rate>,
    /// Date-weighted IRR on monthly flows; needs a start date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xirr: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted: Option<ConvertedSummary>,
}

/// Summary figures restated at a fixed exchange rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertedSummary {
    pub currency: Currency,
    pub exchange_rate: Decimal,
    pub emi: Money,
    pub total_outflow: Money,
    pub total_inflow: Money,
    pub net_profit: Money,
    pub projected_property_value: Money,
}

/// Loan ledger in the requested view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanLedger {
    pub view: LedgerView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<Vec<AmortizationEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual: Option<Vec<AnnualEntry>>,
}

/// Complete engine output for one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentAnalysis {
    pub summary: InvestmentSummary,
    pub disbursements: Vec<Disbursement>,
    pub funding: Vec<TrancheFunding>,
    pub ledger: LoanLedger,
    pub cashflows: Vec<CashflowPeriod>,
    pub annual_cashflows: Vec<AnnualCashflow>,
    pub reconciliation: Reconciliation,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Validate raw parameters and run the full analysis.
pub fn analyze(input: ScenarioInput) -> RealtyResult<ComputationOutput<InvestmentAnalysis>> {
    analyze_investment(&InvestmentScenario::new(input)?)
}

/// Run amortisation, cash-flow projection and return metrics for a scenario.
pub fn analyze_investment(
    scenario: &InvestmentScenario,
) -> RealtyResult<ComputationOutput<InvestmentAnalysis>> {
    let start = Instant::now();

    let projection = projection::project(scenario)?;
    let mut warnings = projection.warnings.clone();

    let annual_cashflows = aggregation::annual_cashflows(&projection.periods);

    let irr = match solver::irr(&aggregation::annual_net_flows(&projection.periods)) {
        Ok(rate) => Some(rate),
        Err(e) => {
            warnings.push(format!("IRR indeterminate: {e}"));
            None
        }
    };

    let xirr = match scenario.start_date() {
        Some(date) => match dated_flows(date, &projection.periods).and_then(|f| solver::xirr(&f)) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warnings.push(format!("XIRR indeterminate: {e}"));
                None
            }
        },
        None => None,
    };

    if !projection.reconciliation.balanced {
        warnings.push("Cash-flow totals do not reconcile with disbursed principal and interest".into());
    }

    let summary = summarise(scenario, &projection, irr, xirr);

    let ledger = match scenario.ledger_view() {
        LedgerView::Monthly => LoanLedger {
            view: LedgerView::Monthly,
            monthly: Some(projection.loan_ledger.clone()),
            annual: None,
        },
        LedgerView::Annual => LoanLedger {
            view: LedgerView::Annual,
            monthly: None,
            annual: Some(aggregation::to_annual(&projection.loan_ledger)),
        },
    };

    let output = InvestmentAnalysis {
        summary,
        disbursements: scenario.disbursements().to_vec(),
        funding: projection.funding,
        ledger,
        cashflows: projection.periods,
        annual_cashflows,
        reconciliation: projection.reconciliation,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Leveraged real-estate cash-flow projection with tranche amortisation and IRR",
        scenario.input(),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn summarise(
    scenario: &InvestmentScenario,
    projection: &projection::CashflowProjection,
    irr: Option<Rate>,
    xirr: Option<Rate>,
) -> InvestmentSummary {
    let price = scenario.property_price();
    let total_outflow = projection.total_outflow();
    let total_inflow = projection.total_inflow();
    let net_profit = total_inflow - total_outflow;

    let roi_pct = if total_outflow.is_zero() {
        Decimal::ZERO
    } else {
        net_profit / total_outflow * Decimal::ONE_HUNDRED
    };

    let annual_rent = scenario.monthly_rent() * Decimal::from(MONTHS_PER_YEAR);
    let monthly_net = (scenario.monthly_rent() - scenario.monthly_maintenance()).max(Decimal::ZERO)
        * (Decimal::ONE - pct_to_rate(scenario.rental_tax_rate()));
    let annual_net_rent = monthly_net * Decimal::from(MONTHS_PER_YEAR);

    let emi = projection
        .loan_ledger
        .iter()
        .map(|r| r.installment)
        .find(|i| !i.is_zero())
        .unwrap_or(Decimal::ZERO);
    let peak_emi = projection
        .loan_ledger
        .iter()
        .map(|r| r.installment)
        .max()
        .unwrap_or(Decimal::ZERO);

    let converted = scenario.reporting().map(|conv| ConvertedSummary {
        currency: conv.currency.clone(),
        exchange_rate: conv.rate,
        emi: emi * conv.rate,
        total_outflow: total_outflow * conv.rate,
        total_inflow: total_inflow * conv.rate,
        net_profit: net_profit * conv.rate,
        projected_property_value: projection.sale_value * conv.rate,
    });

    InvestmentSummary {
        currency: scenario.input().currency.clone(),
        emi,
        peak_emi,
        equity_invested: projection.funding.iter().map(|f| f.equity).sum(),
        loan_financed: projection.funding.iter().map(|f| f.financed).sum(),
        total_outflow,
        total_inflow,
        net_profit,
        roi_pct,
        gross_rental_yield_pct: annual_rent / price * Decimal::ONE_HUNDRED,
        net_rental_yield_pct: annual_net_rent / price * Decimal::ONE_HUNDRED,
        projected_property_value: projection.sale_value,
        total_gross_rent: projection.total(CashflowCategory::Rent),
        total_net_rent: projection.reconciliation.net_rent,
        interest_paid: projection.reconciliation.interest_paid,
        lifetime_interest: projection.lifetime_interest,
        outstanding_loan_at_sale: projection.outstanding_at_sale,
        possession_month: scenario.possession_month(),
        sale_month: scenario.sale_month(),
        irr,
        xirr,
        converted,
    }
}

/// Non-zero monthly net flows dated from `start`.
fn dated_flows(start: NaiveDate, periods: &[CashflowPeriod]) -> RealtyResult<Vec<(NaiveDate, Money)>> {
    periods
        .iter()
        .filter(|p| !p.net.is_zero())
        .map(|p| {
            start
                .checked_add_months(Months::new(p.month))
                .map(|d| (d, p.net))
                .ok_or_else(|| {
                    RealtyError::DateError(format!("Month {} past {start} is out of range", p.month))
                })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
