//! Property-based checks for the amortisation, disbursement and solver invariants.

use proptest::prelude::*;
use realty_cashflow_core::cashflow::{aggregation, projection};
use realty_cashflow_core::construction::disbursement::{self, DisbursementTranche};
use realty_cashflow_core::loan::amortization;
use realty_cashflow_core::loan::tranches::{self, FinancingMode, FinancingTerms};
use realty_cashflow_core::returns::solver;
use realty_cashflow_core::scenario::{InvestmentScenario, PaymentPlan, ScenarioInput};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn principal_strat() -> impl Strategy<Value = Decimal> {
    (1_000u64..=10_000_000u64).prop_map(Decimal::from)
}

/// Annual rates 0.0%..=20.0% in 0.1 steps.
fn rate_strat() -> impl Strategy<Value = Decimal> {
    (0u32..=200u32).prop_map(|n| Decimal::new(n as i64, 1))
}

/// Two to six tranches with integer percentages summing to 100.
fn tranche_strat() -> impl Strategy<Value = Vec<DisbursementTranche>> {
    prop::collection::vec((1u32..=50u32, 0u32..=60u32), 1..=5).prop_map(|parts| {
        let mut remaining = 100u32;
        let mut tranches = Vec::new();
        for (pct, month) in parts {
            if remaining <= 1 {
                break;
            }
            let pct = pct.min(remaining - 1);
            remaining -= pct;
            tranches.push(DisbursementTranche::new(Decimal::from(pct), month));
        }
        tranches.push(DisbursementTranche::new(Decimal::from(remaining), 0));
        tranches
    })
}

/// Tranches in thousandths of a percent, zero shares allowed, summing to
/// 100 off by up to the 0.01 tolerance either way.
fn fractional_tranche_strat() -> impl Strategy<Value = Vec<DisbursementTranche>> {
    (
        prop::collection::vec((0u32..=60_000u32, 0u32..=60u32), 1..=5),
        -10i64..=10i64,
        any::<bool>(),
    )
        .prop_map(|(parts, offset, trailing_zero)| {
            // Keeps at least 0.01% back so a negative offset stays non-negative
            let mut remaining = 100_000u32;
            let mut tranches = Vec::new();
            for (share, month) in parts {
                let share = share.min(remaining.saturating_sub(10));
                remaining -= share;
                tranches.push(DisbursementTranche::new(Decimal::new(share as i64, 3), month));
            }
            let last = (remaining as i64 + offset).min(100_000);
            tranches.push(DisbursementTranche::new(Decimal::new(last, 3), 0));
            if trailing_zero {
                tranches.push(DisbursementTranche::new(Decimal::ZERO, 60));
            }
            tranches
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ledger_closes_at_zero(
        principal in principal_strat(),
        rate in rate_strat(),
        tenure in 1u32..=360u32,
    ) {
        let rows = amortization::ledger(principal, rate, tenure).unwrap();
        prop_assert_eq!(rows.len(), tenure as usize);
        prop_assert_eq!(rows.last().unwrap().balance, Decimal::ZERO);

        let repaid: Decimal = rows.iter().map(|r| r.principal_paid).sum();
        prop_assert!((repaid - principal).abs() < dec!(0.000001));

        for pair in rows.windows(2) {
            prop_assert!(pair[1].balance <= pair[0].balance);
        }
        for r in &rows {
            prop_assert!(r.interest_paid >= Decimal::ZERO);
            prop_assert!((r.interest_paid + r.principal_paid - r.installment).abs() < dec!(0.000001));
        }
    }

    #[test]
    fn annual_view_preserves_totals(
        principal in principal_strat(),
        rate in rate_strat(),
        tenure in 1u32..=360u32,
    ) {
        let rows = amortization::ledger(principal, rate, tenure).unwrap();
        let annual = aggregation::to_annual(&rows);
        prop_assert_eq!(annual.len(), tenure.div_ceil(12) as usize);

        let monthly_interest: Decimal = rows.iter().map(|r| r.interest_paid).sum();
        let annual_interest: Decimal = annual.iter().map(|a| a.interest_paid).sum();
        prop_assert!((monthly_interest - annual_interest).abs() < dec!(0.000001));
        prop_assert_eq!(annual.last().unwrap().closing_balance, Decimal::ZERO);
    }

    #[test]
    fn schedule_sums_to_price_in_month_order(
        price in principal_strat(),
        plan in tranche_strat(),
    ) {
        let events = disbursement::schedule(price, &plan).unwrap();
        prop_assert_eq!(events.len(), plan.len());

        let total: Decimal = events.iter().map(|d| d.amount).sum();
        prop_assert_eq!(total, price);
        for pair in events.windows(2) {
            prop_assert!(pair[0].month <= pair[1].month);
        }
    }

    #[test]
    fn off_hundred_plans_disburse_price_exactly(
        price in principal_strat(),
        plan in fractional_tranche_strat(),
    ) {
        let events = disbursement::schedule(price, &plan).unwrap();

        let total: Decimal = events.iter().map(|d| d.amount).sum();
        prop_assert_eq!(total, price);
        for d in &events {
            prop_assert!(d.amount >= Decimal::ZERO, "month {} amount {}", d.month, d.amount);
        }
    }

    #[test]
    fn off_hundred_plans_reconcile(
        price in principal_strat(),
        plan in fractional_tranche_strat(),
        ltv in 0u32..=80u32,
    ) {
        let input = ScenarioInput {
            property_price: price,
            payment_plan: PaymentPlan::Staggered(plan),
            loan_amount: price * Decimal::from(ltv) / Decimal::ONE_HUNDRED,
            ..ScenarioInput::default()
        };
        let scenario = InvestmentScenario::new(input).unwrap();
        let proj = projection::project(&scenario).unwrap();

        prop_assert!(proj.reconciliation.balanced);
        for f in &proj.funding {
            prop_assert!(f.equity >= Decimal::ZERO);
            prop_assert!(f.financed >= Decimal::ZERO);
        }
    }

    #[test]
    fn funding_splits_draw_the_whole_loan(
        price in principal_strat(),
        plan in tranche_strat(),
        ltv in 0u32..=90u32,
        pro_rata in any::<bool>(),
    ) {
        let events = disbursement::schedule(price, &plan).unwrap();
        let loan = price * Decimal::from(ltv) / Decimal::ONE_HUNDRED;
        let mode = if pro_rata { FinancingMode::ProRata } else { FinancingMode::EquityFirst };

        let funding = tranches::split_funding(&events, loan, mode).unwrap();
        let financed: Decimal = funding.iter().map(|f| f.financed).sum();
        prop_assert!((financed - loan).abs() < dec!(0.000001));
        for f in &funding {
            prop_assert!((f.equity + f.financed - f.amount).abs() < dec!(0.000001));
        }
    }

    #[test]
    fn single_tranche_matches_plain_loan(
        principal in principal_strat(),
        rate in rate_strat(),
        tenure in 1u32..=240u32,
    ) {
        let events = disbursement::schedule(principal, &[DisbursementTranche::new(dec!(100), 0)]).unwrap();
        let financing = FinancingTerms {
            loan_amount: principal,
            annual_rate: rate,
            tenure_months: tenure,
            mode: FinancingMode::EquityFirst,
        };
        let consolidated = tranches::project(&events, &financing, tenure).unwrap();
        let plain = amortization::ledger(principal, rate, tenure).unwrap();

        for (a, b) in consolidated.monthly.iter().zip(plain.iter()) {
            prop_assert_eq!(a.installment, b.installment);
            prop_assert_eq!(a.balance, b.balance);
        }
    }

    #[test]
    fn irr_recovers_single_period_rate(
        invest in 1_000u64..=1_000_000u64,
        pct in -50i64..=100i64,
    ) {
        let outlay = Decimal::from(invest);
        let rate = Decimal::new(pct, 2);
        let flows = [-outlay, outlay * (Decimal::ONE + rate)];

        let found = solver::irr(&flows).unwrap();
        prop_assert!((found - rate).abs() < dec!(0.000001), "found {} expected {}", found, rate);
    }
}
