use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::construction::disbursement::Disbursement;
use crate::error::RealtyError;
use crate::loan::amortization::{self, AmortizationEntry, LoanTerms};
use crate::types::*;
use crate::RealtyResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How each disbursement is split between the buyer's equity and the loan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinancingMode {
    /// Equity pays the earliest tranches; the loan is drawn only once equity runs out
    #[default]
    EquityFirst,
    /// Every tranche is financed at the same loan-to-price ratio
    ProRata,
}

/// Sanctioned loan applied across a disbursement schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancingTerms {
    /// Total loan sanctioned; zero means an all-cash purchase
    pub loan_amount: Money,
    pub annual_rate: Percent,
    pub tenure_months: u32,
    #[serde(default)]
    pub mode: FinancingMode,
}

/// Equity/loan split of a single disbursement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrancheFunding {
    pub month: Month,
    pub amount: Money,
    pub equity: Money,
    pub financed: Money,
}

/// An independently amortising loan drawn at one disbursement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrancheLoan {
    pub origination_month: Month,
    pub terms: LoanTerms,
    pub installment: Money,
    /// Full-tenure ledger, period 1 falls in `origination_month + 1`
    pub ledger: Vec<AmortizationEntry>,
}

impl TrancheLoan {
    fn originate(origination_month: Month, terms: LoanTerms) -> RealtyResult<Self> {
        let installment = terms.installment()?;
        let ledger = terms.ledger()?;
        debug!(
            month = origination_month,
            principal = %terms.principal,
            installment = %installment,
            "tranche loan originated"
        );
        Ok(Self {
            origination_month,
            terms,
            installment,
            ledger,
        })
    }

    /// Last calendar month with an installment.
    pub fn final_month(&self) -> Month {
        self.origination_month + self.terms.tenure_months
    }

    /// Whether an installment falls due in `month`.
    pub fn is_active(&self, month: Month) -> bool {
        month > self.origination_month && month <= self.final_month()
    }

    /// Ledger row paid in calendar `month`, if the loan is active then.
    pub fn entry_at(&self, month: Month) -> Option<&AmortizationEntry> {
        if !self.is_active(month) {
            return None;
        }
        self.ledger
            .get((month - self.origination_month - 1) as usize)
    }

    /// Outstanding balance at the end of calendar `month`.
    pub fn balance_at(&self, month: Month) -> Money {
        if month < self.origination_month {
            Decimal::ZERO
        } else if month == self.origination_month {
            self.terms.principal
        } else {
            self.entry_at(month)
                .map(|e| e.balance)
                .unwrap_or(Decimal::ZERO)
        }
    }
}

/// Result of consolidating every tranche loan over the horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedLedger {
    pub funding: Vec<TrancheFunding>,
    /// Arena of tranche loans in origination order
    pub loans: Vec<TrancheLoan>,
    /// One summed row per month `1..=horizon_months`; `balance` is the total outstanding
    pub monthly: Vec<AmortizationEntry>,
}

impl ConsolidatedLedger {
    /// Consolidated EMI per month, index 0 = month 1.
    pub fn emi_series(&self) -> Vec<Money> {
        self.monthly.iter().map(|e| e.installment).collect()
    }

    pub fn total_equity(&self) -> Money {
        self.funding.iter().map(|f| f.equity).sum()
    }

    pub fn total_financed(&self) -> Money {
        self.funding.iter().map(|f| f.financed).sum()
    }

    /// Outstanding balance across all loans at the end of `month`.
    pub fn outstanding_at(&self, month: Month) -> Money {
        self.loans.iter().map(|l| l.balance_at(month)).sum()
    }

    /// Interest every loan would pay over its full tenure, ignoring the horizon.
    pub fn lifetime_interest(&self) -> Money {
        self.loans
            .iter()
            .map(|l| amortization::total_interest(&l.ledger))
            .sum()
    }

    /// Highest consolidated installment within the horizon.
    pub fn peak_installment(&self) -> Money {
        self.monthly
            .iter()
            .map(|e| e.installment)
            .max()
            .unwrap_or(Decimal::ZERO)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Split each disbursement into equity and financed portions.
pub fn split_funding(
    schedule: &[Disbursement],
    loan_amount: Money,
    mode: FinancingMode,
) -> RealtyResult<Vec<TrancheFunding>> {
    let total: Money = schedule.iter().map(|d| d.amount).sum();

    if loan_amount < Decimal::ZERO {
        return Err(RealtyError::domain("loan_amount", "Loan amount cannot be negative"));
    }
    if loan_amount > total {
        return Err(RealtyError::domain(
            "loan_amount",
            format!("Loan {loan_amount} exceeds the total disbursed price {total}"),
        ));
    }

    let mut funding: Vec<TrancheFunding> = match mode {
        FinancingMode::EquityFirst => {
            let mut equity_left = total - loan_amount;
            schedule
                .iter()
                .map(|d| {
                    let equity = equity_left.min(d.amount);
                    equity_left -= equity;
                    TrancheFunding {
                        month: d.month,
                        amount: d.amount,
                        equity,
                        financed: d.amount - equity,
                    }
                })
                .collect()
        }
        FinancingMode::ProRata => {
            let ltv = if total.is_zero() {
                Decimal::ZERO
            } else {
                loan_amount / total
            };
            schedule
                .iter()
                .map(|d| {
                    let financed = d.amount * ltv;
                    TrancheFunding {
                        month: d.month,
                        amount: d.amount,
                        equity: d.amount - financed,
                        financed,
                    }
                })
                .collect()
        }
    };

    // Division residue lands on the last tranche so the loan is drawn exactly
    let drawn: Money = funding.iter().map(|f| f.financed).sum();
    if let Some(last) = funding.last_mut() {
        let residue = loan_amount - drawn;
        last.financed += residue;
        last.equity -= residue;
    }

    Ok(funding)
}

/// Consolidate independently amortising tranche loans into one monthly ledger.
///
/// Each financed portion becomes its own loan starting at its disbursement
/// month and running the full tenure; installments of overlapping loans are
/// summed per month and clipped to `horizon_months`.
pub fn project(
    schedule: &[Disbursement],
    financing: &FinancingTerms,
    horizon_months: Month,
) -> RealtyResult<ConsolidatedLedger> {
    if horizon_months == 0 {
        return Err(RealtyError::domain(
            "horizon_months",
            "Horizon must be at least one month",
        ));
    }

    let funding = split_funding(schedule, financing.loan_amount, financing.mode)?;

    let mut loans: Vec<TrancheLoan> = Vec::new();
    for f in funding.iter().filter(|f| f.financed > Decimal::ZERO) {
        let terms = LoanTerms::new(f.financed, financing.annual_rate, financing.tenure_months)?;
        loans.push(TrancheLoan::originate(f.month, terms)?);
    }

    let monthly = consolidate(&loans, horizon_months);

    Ok(ConsolidatedLedger {
        funding,
        loans,
        monthly,
    })
}

/// Sum every active loan's ledger row month by month.
pub fn consolidate(loans: &[TrancheLoan], horizon_months: Month) -> Vec<AmortizationEntry> {
    (1..=horizon_months)
        .map(|month| {
            let mut row = AmortizationEntry {
                period: month,
                installment: Decimal::ZERO,
                interest_paid: Decimal::ZERO,
                principal_paid: Decimal::ZERO,
                balance: Decimal::ZERO,
            };
            for loan in loans {
                if let Some(e) = loan.entry_at(month) {
                    row.installment += e.installment;
                    row.interest_paid += e.interest_paid;
                    row.principal_paid += e.principal_paid;
                }
                row.balance += loan.balance_at(month);
            }
            row
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construction::disbursement::{schedule, DisbursementTranche};
    use rust_decimal_macros::dec;

    fn reference_schedule() -> Vec<Disbursement> {
        schedule(
            dec!(8500000),
            &[
                DisbursementTranche::new(dec!(10), 0),
                DisbursementTranche::new(dec!(20), 1),
                DisbursementTranche::new(dec!(30), 9),
                DisbursementTranche::new(dec!(40), 36),
            ],
        )
        .unwrap()
    }

    fn financing(loan: Money, mode: FinancingMode) -> FinancingTerms {
        FinancingTerms {
            loan_amount: loan,
            annual_rate: dec!(8.6),
            tenure_months: 240,
            mode,
        }
    }

    #[test]
    fn test_single_tranche_matches_single_ledger() {
        let sched = schedule(dec!(3000000), &[DisbursementTranche::new(dec!(100), 0)]).unwrap();
        let out = project(&sched, &financing(dec!(3000000), FinancingMode::EquityFirst), 240)
            .unwrap();

        let single = amortization::ledger(dec!(3000000), dec!(8.6), 240).unwrap();
        let expected: Vec<Money> = single.iter().map(|e| e.installment).collect();
        assert_eq!(out.emi_series(), expected);
        assert_eq!(out.monthly.last().unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_equity_first_split() {
        let funding = split_funding(
            &reference_schedule(),
            dec!(3000000),
            FinancingMode::EquityFirst,
        )
        .unwrap();
        let financed: Vec<Money> = funding.iter().map(|f| f.financed).collect();
        assert_eq!(
            financed,
            vec![Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, dec!(3000000)]
        );
        assert_eq!(funding[3].equity, dec!(400000));
    }

    #[test]
    fn test_pro_rata_split_draws_exact_loan() {
        let funding =
            split_funding(&reference_schedule(), dec!(3000000), FinancingMode::ProRata).unwrap();
        let drawn: Money = funding.iter().map(|f| f.financed).sum();
        assert!((drawn - dec!(3000000)).abs() < dec!(0.000001));
        assert!(funding.iter().all(|f| f.financed > Decimal::ZERO));
    }

    #[test]
    fn test_overlapping_tranches_are_summed() {
        let out = project(
            &reference_schedule(),
            &financing(dec!(3000000), FinancingMode::ProRata),
            120,
        )
        .unwrap();
        assert_eq!(out.loans.len(), 4);

        // Month 10: loans from months 0, 1 and 9 are all paying
        let expected: Money = out.loans[..3].iter().map(|l| l.installment).sum();
        assert_eq!(out.monthly[9].installment, expected);

        // Month 37 adds the possession-stage loan
        let all: Money = out.loans.iter().map(|l| l.installment).sum();
        assert_eq!(out.monthly[36].installment, all);
        assert_eq!(out.peak_installment(), all);
    }

    #[test]
    fn test_loan_not_paying_in_origination_month() {
        let out = project(
            &reference_schedule(),
            &financing(dec!(3000000), FinancingMode::EquityFirst),
            120,
        )
        .unwrap();
        assert_eq!(out.monthly[35].installment, Decimal::ZERO);
        assert_eq!(out.monthly[35].balance, dec!(3000000));
        assert!(out.monthly[36].installment > Decimal::ZERO);
    }

    #[test]
    fn test_horizon_clipping() {
        let out = project(
            &reference_schedule(),
            &financing(dec!(3000000), FinancingMode::EquityFirst),
            60,
        )
        .unwrap();
        assert_eq!(out.monthly.len(), 60);
        assert!(out.outstanding_at(60) > Decimal::ZERO);
        assert_eq!(out.outstanding_at(60), out.monthly[59].balance);
    }

    #[test]
    fn test_all_cash_has_no_loans() {
        let out = project(
            &reference_schedule(),
            &financing(Decimal::ZERO, FinancingMode::EquityFirst),
            24,
        )
        .unwrap();
        assert!(out.loans.is_empty());
        assert!(out.emi_series().iter().all(|e| e.is_zero()));
        assert_eq!(out.total_equity(), dec!(8500000));
    }

    #[test]
    fn test_loan_above_price_rejected() {
        let err = split_funding(
            &reference_schedule(),
            dec!(9000000),
            FinancingMode::EquityFirst,
        )
        .unwrap_err();
        assert!(matches!(err, RealtyError::Domain { .. }));
    }
}
