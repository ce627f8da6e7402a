use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::RealtyError;
use crate::types::*;
use crate::RealtyResult;

/// Allowed deviation of the tranche percentage sum from 100.
pub const PERCENT_SUM_TOLERANCE: Decimal = dec!(0.01);

/// A construction-linked payment milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisbursementTranche {
    /// Share of the total price, 0–100
    pub percentage: Percent,
    /// Months after deal start
    pub month: Month,
}

impl DisbursementTranche {
    pub fn new(percentage: Percent, month: Month) -> Self {
        Self { percentage, month }
    }

    /// Pair up separately collected percentages and timings.
    pub fn from_parts(percentages: &[Percent], months: &[Month]) -> RealtyResult<Vec<Self>> {
        if percentages.len() != months.len() {
            return Err(RealtyError::schedule(format!(
                "{} percentages but {} timings",
                percentages.len(),
                months.len()
            )));
        }
        Ok(percentages
            .iter()
            .zip(months)
            .map(|(&percentage, &month)| Self { percentage, month })
            .collect())
    }
}

/// A scheduled payment of part of the property price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disbursement {
    pub month: Month,
    pub amount: Money,
    pub percentage: Percent,
    /// Position of the originating tranche in the input
    pub tranche_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInput {
    pub total_price: Money,
    pub tranches: Vec<DisbursementTranche>,
    /// Optional holding horizon; tranches beyond it are rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizon_months: Option<Month>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOutput {
    pub disbursements: Vec<Disbursement>,
    pub total_disbursed: Money,
    /// Month of the last disbursement (construction completion)
    pub completion_month: Month,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Map a price and a tranche plan to disbursement events sorted by month.
///
/// Simultaneous tranches keep their input order. Percentages are scaled by
/// their actual sum, so a plan within tolerance of 100 still disburses the
/// whole price; the largest disbursement absorbs any rounding residue.
/// Amounts are never negative.
pub fn schedule(
    total_price: Money,
    tranches: &[DisbursementTranche],
) -> RealtyResult<Vec<Disbursement>> {
    validate_tranches(tranches, None)?;
    if total_price <= Decimal::ZERO {
        return Err(RealtyError::domain(
            "total_price",
            "Property price must be positive",
        ));
    }

    // Validation guarantees a sum within tolerance of 100, hence positive
    let percent_sum: Percent = tranches.iter().map(|t| t.percentage).sum();

    let mut disbursements: Vec<Disbursement> = tranches
        .iter()
        .enumerate()
        .map(|(tranche_index, t)| Disbursement {
            month: t.month,
            amount: total_price * t.percentage / percent_sum,
            percentage: t.percentage,
            tranche_index,
        })
        .collect();
    disbursements.sort_by_key(|d| d.month);

    let allocated: Money = disbursements.iter().map(|d| d.amount).sum();
    if let Some(largest) = disbursements.iter_mut().max_by_key(|d| d.amount) {
        largest.amount += total_price - allocated;
    }

    Ok(disbursements)
}

/// Same as [`schedule`], additionally rejecting tranches after `horizon_months`.
pub fn schedule_within(
    total_price: Money,
    tranches: &[DisbursementTranche],
    horizon_months: Month,
) -> RealtyResult<Vec<Disbursement>> {
    validate_tranches(tranches, Some(horizon_months))?;
    schedule(total_price, tranches)
}

/// Check percentages and timings of a tranche plan.
pub fn validate_tranches(
    tranches: &[DisbursementTranche],
    horizon_months: Option<Month>,
) -> RealtyResult<()> {
    if tranches.is_empty() {
        return Err(RealtyError::schedule("At least one tranche is required"));
    }

    for (i, t) in tranches.iter().enumerate() {
        if t.percentage < Decimal::ZERO || t.percentage > Decimal::ONE_HUNDRED {
            return Err(RealtyError::schedule(format!(
                "Tranche {} percentage {} is outside 0–100",
                i + 1,
                t.percentage
            )));
        }
        if let Some(horizon) = horizon_months {
            if t.month > horizon {
                return Err(RealtyError::schedule(format!(
                    "Tranche {} at month {} falls after the {horizon}-month horizon",
                    i + 1,
                    t.month
                )));
            }
        }
    }

    let total: Percent = tranches.iter().map(|t| t.percentage).sum();
    if (total - Decimal::ONE_HUNDRED).abs() > PERCENT_SUM_TOLERANCE {
        return Err(RealtyError::schedule(format!(
            "Tranche percentages sum to {total}, expected 100"
        )));
    }

    Ok(())
}

/// Build a disbursement schedule wrapped in the standard output envelope.
pub fn build_disbursement_schedule(
    input: &ScheduleInput,
) -> RealtyResult<ComputationOutput<ScheduleOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let disbursements = match input.horizon_months {
        Some(h) => schedule_within(input.total_price, &input.tranches, h)?,
        None => schedule(input.total_price, &input.tranches)?,
    };

    let mut months: Vec<Month> = disbursements.iter().map(|d| d.month).collect();
    months.dedup();
    if months.len() < disbursements.len() {
        warnings.push("Several tranches share a disbursement month".into());
    }

    let total_disbursed = disbursements.iter().map(|d| d.amount).sum();
    let completion_month = disbursements.last().map(|d| d.month).unwrap_or_default();

    let output = ScheduleOutput {
        disbursements,
        total_disbursed,
        completion_month,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Construction-linked disbursement schedule",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
