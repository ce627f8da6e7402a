use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cashflow::projection::{CashflowCategory, CashflowPeriod};
use crate::loan::amortization::AmortizationEntry;
use crate::types::{Money, MONTHS_PER_YEAR};

/// One year of an amortisation ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualEntry {
    /// 1-based year index, `ceil(month / 12)`
    pub year: u32,
    /// Months aggregated into this row (12 except possibly the last)
    pub months: u32,
    pub installment: Money,
    pub interest_paid: Money,
    pub principal_paid: Money,
    /// Balance at the end of the block's last month
    pub closing_balance: Money,
}

/// One year of a cash-flow projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualCashflow {
    /// Year 0 holds month 0 only; year `k` holds months `12(k-1)+1 ..= 12k`
    pub year: u32,
    pub outflow: Money,
    pub inflow: Money,
    pub rent: Money,
    pub emi: Money,
    pub net: Money,
}

/// Year index of a month: `ceil(month / 12)`, so month 0 maps to year 0.
pub fn year_of_month(month: u32) -> u32 {
    month.div_ceil(MONTHS_PER_YEAR)
}

/// Re-bucket a monthly ledger into annual rows.
///
/// Flow quantities are summed; the balance is taken from the block's last
/// month. A trailing partial year is aggregated over the months it has.
pub fn to_annual(monthly: &[AmortizationEntry]) -> Vec<AnnualEntry> {
    let mut annual: Vec<AnnualEntry> = Vec::new();

    for entry in monthly {
        let year = year_of_month(entry.period);
        match annual.last_mut() {
            Some(row) if row.year == year => {
                row.months += 1;
                row.installment += entry.installment;
                row.interest_paid += entry.interest_paid;
                row.principal_paid += entry.principal_paid;
                row.closing_balance = entry.balance;
            }
            _ => annual.push(AnnualEntry {
                year,
                months: 1,
                installment: entry.installment,
                interest_paid: entry.interest_paid,
                principal_paid: entry.principal_paid,
                closing_balance: entry.balance,
            }),
        }
    }

    annual
}

/// Re-bucket a monthly cash-flow projection into annual totals.
pub fn annual_cashflows(periods: &[CashflowPeriod]) -> Vec<AnnualCashflow> {
    let mut annual: Vec<AnnualCashflow> = Vec::new();

    for period in periods {
        let year = year_of_month(period.month);
        if annual.last().is_none_or(|row| row.year != year) {
            annual.push(AnnualCashflow {
                year,
                outflow: Decimal::ZERO,
                inflow: Decimal::ZERO,
                rent: Decimal::ZERO,
                emi: Decimal::ZERO,
                net: Decimal::ZERO,
            });
        }
        // Pushed above when missing
        let Some(row) = annual.last_mut() else {
            continue;
        };

        for event in &period.events {
            if event.amount.is_sign_negative() {
                row.outflow += -event.amount;
            } else {
                row.inflow += event.amount;
            }
            match event.category {
                CashflowCategory::Rent => row.rent += event.amount,
                CashflowCategory::Emi => row.emi += -event.amount,
                _ => {}
            }
        }
        row.net += period.net;
    }

    annual
}

/// Annual net cash flows indexed by year, ready for an equal-period IRR.
pub fn annual_net_flows(periods: &[CashflowPeriod]) -> Vec<Money> {
    annual_cashflows(periods).iter().map(|row| row.net).collect()
}
