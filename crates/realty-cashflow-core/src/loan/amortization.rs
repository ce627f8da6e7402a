use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::cashflow::aggregation::{self, AnnualEntry};
use crate::error::RealtyError;
use crate::types::*;
use crate::RealtyResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Terms of a single fixed-rate annuity loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Amount borrowed
    pub principal: Money,
    /// Annual nominal rate as a percentage (8.6 = 8.6%)
    pub annual_rate: Percent,
    /// Number of monthly installments
    pub tenure_months: u32,
}

impl LoanTerms {
    /// Build loan terms, rejecting non-positive principal/tenure and rates outside 0–100.
    pub fn new(principal: Money, annual_rate: Percent, tenure_months: u32) -> RealtyResult<Self> {
        validate_terms(principal, annual_rate, tenure_months)?;
        Ok(Self {
            principal,
            annual_rate,
            tenure_months,
        })
    }

    pub fn installment(&self) -> RealtyResult<Money> {
        installment(self.principal, self.annual_rate, self.tenure_months)
    }

    pub fn ledger(&self) -> RealtyResult<Vec<AmortizationEntry>> {
        ledger(self.principal, self.annual_rate, self.tenure_months)
    }
}

/// One month of an amortisation ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationEntry {
    /// 1-based period index
    pub period: u32,
    /// Amount paid this period (interest + principal)
    pub installment: Money,
    pub interest_paid: Money,
    pub principal_paid: Money,
    /// Outstanding balance after this period's payment
    pub balance: Money,
}

/// Monthly or annual presentation of a ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerView {
    Monthly,
    #[default]
    Annual,
}

/// Input for a standalone amortisation schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmortizationInput {
    pub principal: Money,
    pub annual_rate: Percent,
    pub tenure_months: u32,
    #[serde(default)]
    pub view: LedgerView,
}

/// Output of a standalone amortisation schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmortizationOutput {
    /// Fixed monthly installment (EMI)
    pub installment: Money,
    pub total_interest: Money,
    pub total_paid: Money,
    /// Populated when the monthly view is requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<Vec<AmortizationEntry>>,
    /// Populated when the annual view is requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual: Option<Vec<AnnualEntry>>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Fixed monthly installment of an annuity loan.
///
/// `r = annual_rate / 12 / 100`; for `r == 0` the principal is spread evenly,
/// otherwise `P * r * (1+r)^n / ((1+r)^n - 1)`.
pub fn installment(principal: Money, annual_rate: Percent, term_months: u32) -> RealtyResult<Money> {
    validate_terms(principal, annual_rate, term_months)?;

    let r = monthly_rate(annual_rate);
    if r.is_zero() {
        return Ok(principal / Decimal::from(term_months));
    }

    let compound = (Decimal::ONE + r)
        .checked_powi(i64::from(term_months))
        .ok_or_else(|| {
            RealtyError::domain(
                "tenure_months",
                format!("Compounding {annual_rate}% over {term_months} months overflows"),
            )
        })?;
    let denominator = compound - Decimal::ONE;

    if denominator.is_zero() {
        return Err(RealtyError::domain(
            "annual_rate",
            "Annuity denominator vanished; rate too small for decimal precision",
        ));
    }

    Ok(principal * r * compound / denominator)
}

/// Full month-by-month ledger for a single loan.
///
/// The final period repays whatever balance is left, so the ledger always
/// closes at exactly zero and principal paid sums to the original principal.
pub fn ledger(
    principal: Money,
    annual_rate: Percent,
    term_months: u32,
) -> RealtyResult<Vec<AmortizationEntry>> {
    let emi = installment(principal, annual_rate, term_months)?;
    let r = monthly_rate(annual_rate);

    let mut entries = Vec::with_capacity(term_months as usize);
    let mut balance = principal;

    for period in 1..=term_months {
        let interest = balance * r;
        let (principal_paid, paid) = if period == term_months || emi - interest >= balance {
            (balance, interest + balance)
        } else {
            (emi - interest, emi)
        };
        balance -= principal_paid;

        entries.push(AmortizationEntry {
            period,
            installment: paid,
            interest_paid: interest,
            principal_paid,
            balance,
        });
    }

    Ok(entries)
}

/// Total interest across a ledger.
pub fn total_interest(entries: &[AmortizationEntry]) -> Money {
    entries.iter().map(|e| e.interest_paid).sum()
}

/// Build a standalone amortisation schedule in the requested view.
pub fn build_amortization_schedule(
    input: &AmortizationInput,
) -> RealtyResult<ComputationOutput<AmortizationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let terms = LoanTerms::new(input.principal, input.annual_rate, input.tenure_months)?;
    let emi = terms.installment()?;
    let entries = terms.ledger()?;

    if terms.annual_rate.is_zero() {
        warnings.push("Zero interest rate: principal is repaid in equal instalments".into());
    }

    let total_interest = total_interest(&entries);
    let total_paid = total_interest + terms.principal;

    let (monthly, annual) = match input.view {
        LedgerView::Monthly => (Some(entries), None),
        LedgerView::Annual => (None, Some(aggregation::to_annual(&entries))),
    };

    let output = AmortizationOutput {
        installment: emi,
        total_interest,
        total_paid,
        monthly,
        annual,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Fixed-rate annuity amortisation (EMI)",
        input,
        warnings,
        elapsed,
        output,
    ))
}

fn validate_terms(principal: Money, annual_rate: Percent, term_months: u32) -> RealtyResult<()> {
    if principal <= Decimal::ZERO {
        return Err(RealtyError::domain("principal", "Principal must be positive"));
    }
    if term_months == 0 {
        return Err(RealtyError::domain(
            "tenure_months",
            "Tenure must be at least one month",
        ));
    }
    if annual_rate < Decimal::ZERO || annual_rate > Decimal::ONE_HUNDRED {
        return Err(RealtyError::domain(
            "annual_rate",
            "Annual rate must be a percentage between 0 and 100",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reference_home_loan_emi() {
        // 30 lakh at 8.6% over 20 years
        let emi = installment(dec!(3000000), dec!(8.6), 240).unwrap();
        assert_eq!(emi.round(), dec!(26225));
    }

    #[test]
    fn test_first_month_split() {
        let entries = ledger(dec!(3000000), dec!(8.6), 240).unwrap();
        let first = &entries[0];
        assert_eq!(first.period, 1);
        assert!((first.interest_paid - dec!(21500)).abs() < dec!(0.0001));
        assert!((first.principal_paid - dec!(4725)).abs() < dec!(1));
    }

    #[test]
    fn test_zero_rate_straight_line() {
        let emi = installment(dec!(1200), Decimal::ZERO, 12).unwrap();
        assert_eq!(emi, dec!(100));

        let entries = ledger(dec!(1200), Decimal::ZERO, 12).unwrap();
        assert!(entries.iter().all(|e| e.interest_paid.is_zero()));
        assert_eq!(entries[5].balance, dec!(600));
    }

    #[test]
    fn test_final_balance_exactly_zero() {
        let entries = ledger(dec!(987654.32), dec!(11.37), 97).unwrap();
        assert_eq!(entries.len(), 97);
        assert_eq!(entries.last().unwrap().balance, Decimal::ZERO);

        let principal: Decimal = entries.iter().map(|e| e.principal_paid).sum();
        assert!((principal - dec!(987654.32)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_installment_matches_components() {
        let entries = ledger(dec!(500000), dec!(9.25), 60).unwrap();
        let emi = installment(dec!(500000), dec!(9.25), 60).unwrap();
        for e in &entries {
            assert!((e.installment - e.interest_paid - e.principal_paid).abs() < dec!(0.000001));
        }
        assert!(entries[..59].iter().all(|e| e.installment == emi));
    }

    #[test]
    fn test_balance_non_increasing() {
        let entries = ledger(dec!(250000), dec!(7), 120).unwrap();
        for pair in entries.windows(2) {
            assert!(pair[1].balance <= pair[0].balance);
        }
    }

    #[test]
    fn test_invalid_terms_rejected() {
        assert!(matches!(
            installment(Decimal::ZERO, dec!(8), 12),
            Err(RealtyError::Domain { .. })
        ));
        assert!(matches!(
            installment(dec!(1000), dec!(8), 0),
            Err(RealtyError::Domain { .. })
        ));
        assert!(matches!(
            installment(dec!(1000), dec!(-1), 12),
            Err(RealtyError::Domain { .. })
        ));
        assert!(LoanTerms::new(dec!(1000), dec!(101), 12).is_err());
    }

    #[test]
    fn test_schedule_annual_view() {
        let input = AmortizationInput {
            principal: dec!(3000000),
            annual_rate: dec!(8.6),
            tenure_months: 240,
            view: LedgerView::Annual,
        };
        let out = build_amortization_schedule(&input).unwrap();
        let annual = out.result.annual.as_ref().unwrap();
        assert_eq!(annual.len(), 20);
        assert!(out.result.monthly.is_none());
        assert_eq!(annual.last().unwrap().closing_balance, Decimal::ZERO);
        assert_eq!(
            out.result.total_paid,
            out.result.total_interest + dec!(3000000)
        );
    }
}
